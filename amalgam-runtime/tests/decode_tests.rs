//! Core response decoding.

use amalgam_runtime::*;
use amalgam_types::{CoreMessage, UNKNOWN_CORE_ERROR};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Value, json};

fn decode(raw: &str) -> amalgam_types::CoreResponse {
    decode_core_response(raw).unwrap().expect("response present")
}

#[test]
fn ok_status_yields_payload() {
    let response = decode(r#"{"status":"ok","payload":{"a":1},"warnings":[]}"#);
    assert_eq!(response.content, Some(json!({"a": 1})));
    assert!(response.errors.is_empty());
    assert!(response.warnings.is_empty());
}

#[test]
fn error_status_yields_errors_without_content() {
    let response = decode(r#"{"status":"error","errors":[{"detail":"bad","code":"E1"}]}"#);
    assert_eq!(response.errors, vec![CoreMessage::new("bad", Some("E1".into()))]);
    assert_eq!(response.content, None);
}

#[test]
fn error_status_keeps_partial_content() {
    let response = decode(r#"{"status":"error","payload":[1,2],"errors":[{"detail":"partial"}]}"#);
    assert_eq!(response.content, Some(json!([1, 2])));
    assert_eq!(response.errors.len(), 1);
}

#[test]
fn error_status_without_errors_synthesizes_one() {
    let response = decode(r#"{"status":"error"}"#);
    assert_eq!(response.errors, vec![CoreMessage::new(UNKNOWN_CORE_ERROR, None)]);
}

#[test]
fn missing_status_is_an_error() {
    let response = decode(r#"{"payload":5}"#);
    assert_eq!(response.content, Some(json!(5)));
    assert_eq!(response.errors[0].detail, UNKNOWN_CORE_ERROR);
}

#[test]
fn warnings_are_decoded_on_success() {
    let response = decode(
        r#"{"status":"ok","payload":null,"warnings":[{"detail":"slow","code":7},{"code":"W2"}]}"#,
    );
    assert_eq!(
        response.warnings,
        vec![
            CoreMessage::new("slow", Some("7".into())),
            CoreMessage::new("", Some("W2".into())),
        ]
    );
    assert_eq!(response.content, None);
    assert!(response.errors.is_empty());
}

#[test]
fn bare_scalars_are_content() {
    assert_eq!(decode("42").content, Some(json!(42)));
    assert_eq!(decode("true").content, Some(json!(true)));
    assert_eq!(decode(r#""text""#).content, Some(json!("text")));
    assert_eq!(decode("18446744073709551615").content, Some(json!(u64::MAX)));

    let response = decode("42");
    assert!(response.errors.is_empty());
    assert!(response.warnings.is_empty());
}

#[test]
fn empty_output_is_absent() {
    assert!(decode_core_response("").unwrap().is_none());
    assert!(decode_core_response("  ").unwrap().is_none());
}

#[test]
fn arrays_and_null_are_malformed() {
    assert!(matches!(decode_core_response("[1,2]"), Err(RuntimeError::MalformedResponse)));
    assert!(matches!(decode_core_response("null"), Err(RuntimeError::MalformedResponse)));
}

#[test]
fn invalid_json_is_a_serialization_error() {
    let err = decode_core_response("{not json").unwrap_err();
    assert!(matches!(err, RuntimeError::Json(_)));
    assert_eq!(err.kind(), amalgam_types::ErrorKind::Serialization);
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        ".*".prop_map(Value::from),
    ]
}

proptest! {
    #[test]
    fn bare_scalars_become_content(value in scalar()) {
        let raw = serde_json::to_string(&value).unwrap();
        let response = decode_core_response(&raw).unwrap().unwrap();
        prop_assert_eq!(response.content, Some(value));
        prop_assert!(response.errors.is_empty());
        prop_assert!(response.warnings.is_empty());
    }

    #[test]
    fn ok_envelope_passes_any_scalar_payload(value in scalar()) {
        let raw = json!({"status": "ok", "payload": value}).to_string();
        let response = decode_core_response(&raw).unwrap().unwrap();
        prop_assert_eq!(response.content, Some(value));
        prop_assert!(response.errors.is_empty());
    }
}
