use amalgam_types::*;
use pretty_assertions::assert_eq;
use serde_json::json;

// ── EntityStatus ────────────────────────────────────────────────

#[test]
fn entity_status_serializes_camel_case() {
    let status = EntityStatus::loaded("1.2.3").with_entity_path(vec!["a".into(), "b".into()]);
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(
        value,
        json!({"loaded": true, "message": "", "version": "1.2.3", "entityPath": ["a", "b"]})
    );
}

#[test]
fn entity_status_missing_fields_default() {
    let status: EntityStatus = serde_json::from_value(json!({"loaded": false})).unwrap();
    assert_eq!(status, EntityStatus::failed(""));
    assert!(status.is_top_level());
}

// ── CoreMessage ─────────────────────────────────────────────────

#[test]
fn core_message_lenient_decode() {
    let msg = CoreMessage::from_value(&json!({"detail": "bad", "code": "E1"}));
    assert_eq!(msg, CoreMessage::new("bad", Some("E1".into())));

    let numeric = CoreMessage::from_value(&json!({"detail": "x", "code": 42}));
    assert_eq!(numeric.code.as_deref(), Some("42"));

    let empty = CoreMessage::from_value(&json!(null));
    assert_eq!(empty, CoreMessage::default());
}

#[test]
fn core_message_from_non_array_is_empty() {
    assert!(CoreMessage::from_array(Some(&json!({"detail": "x"}))).is_empty());
    assert!(CoreMessage::from_array(None).is_empty());
}

// ── CoreResponse ────────────────────────────────────────────────

#[test]
fn core_response_skips_absent_content() {
    let resp: CoreResponse = CoreResponse {
        content: None,
        errors: vec![CoreMessage::new("bad", None)],
        warnings: vec![],
    };
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value, json!({"errors": [{"detail": "bad"}], "warnings": []}));
    assert!(!resp.is_ok());
}

#[test]
fn core_response_map_keeps_messages() {
    let resp = CoreResponse {
        content: Some(2),
        errors: vec![],
        warnings: vec![CoreMessage::new("careful", None)],
    };
    let mapped = resp.map(|n| n * 10);
    assert_eq!(mapped.content, Some(20));
    assert_eq!(mapped.warnings.len(), 1);
}

// ── EntityPermissions ───────────────────────────────────────────

#[test]
fn permissions_partial_json_defaults_to_denied() {
    let perms: EntityPermissions = serde_json::from_value(json!({"load": true})).unwrap();
    assert!(perms.load);
    assert!(!perms.store);
    assert!(!perms.is_empty());
    assert!(EntityPermissions::none().is_empty());
}

#[test]
fn permissions_use_camel_case_keys() {
    let value = serde_json::to_value(EntityPermissions::all()).unwrap();
    assert_eq!(
        value,
        json!({
            "stdOutAndStdErr": true,
            "stdIn": true,
            "load": true,
            "store": true,
            "environment": true,
            "alterPerformance": true,
            "system": true,
        })
    );

    let perms: EntityPermissions =
        serde_json::from_value(json!({"stdIn": true, "alterPerformance": true})).unwrap();
    assert!(perms.std_in);
    assert!(perms.alter_performance);
    assert!(!perms.std_out_and_std_err);
}

// ── ErrorBody ───────────────────────────────────────────────────

#[test]
fn error_body_roundtrips_kind() {
    let body = ErrorBody::new(ErrorKind::NotInitialized, "Runtime not initialized.", None);
    assert_eq!(body.name, "NotInitialized");
    assert_eq!(body.kind(), Some(ErrorKind::NotInitialized));
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(
        value,
        json!({"detail": "Runtime not initialized.", "name": "NotInitialized"})
    );
}

#[test]
fn error_body_display_includes_code() {
    let body = ErrorBody::new(ErrorKind::Initialization, "boom", Some("1000".into()));
    assert_eq!(body.to_string(), "Initialization: boom (1000)");
}

#[test]
fn unknown_error_kind_name() {
    assert_eq!(ErrorKind::parse("Nope"), None);
}
