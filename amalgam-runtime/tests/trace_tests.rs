//! Call trace output of the facade.

use amalgam_runtime::mock::MockModule;
use amalgam_runtime::*;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn traced(mock: MockModule) -> (Amalgam<MockModule>, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let trace = Trace::with_sink(move |line| sink.lock().unwrap().push(line.to_string()));
    let amlg = Amalgam::with_trace(mock, AmalgamOptions::default(), trace).unwrap();
    lines.lock().unwrap().clear();
    (amlg, lines)
}

#[test]
fn load_entity_command_and_result() {
    let (amlg, lines) = traced(MockModule::new().with_file("m.caml", "1.0.0"));
    amlg.load_entity(&LoadEntityParams::new("h", "m.caml")).unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], r#"LOAD_ENTITY "h" "m.caml" "" false "" "" "" null"#);
    assert_eq!(
        lines[1],
        r#"# RESULT >b'{"loaded":true,"message":"","version":"1.0.0","entityPath":[]}'"#
    );
}

#[test]
fn execute_entity_json_is_bracketed_by_time_markers() {
    let (amlg, lines) = traced(MockModule::new().with_response("h", "l", "42"));
    amlg.execute_entity_json("h", "l", Some(&json!({"a": 1}))).unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("# TIME EXECUTION START "));
    assert_eq!(lines[1], r#"EXECUTE_ENTITY_JSON "h" "l" "{\"a\":1}""#);
    assert!(lines[2].starts_with("# TIME EXECUTION STOP "));
    assert_eq!(lines[3], r#"# RESULT >b'{"content":42,"errors":[],"warnings":[]}'"#);
}

#[test]
fn raw_execution_traces_the_raw_output() {
    let (amlg, lines) = traced(MockModule::new().with_response("h", "l", "42"));
    assert_eq!(amlg.execute_entity_json_raw("h", "l", "{}").unwrap(), "42");
    assert_eq!(lines.lock().unwrap()[3], r#"# RESULT >b'"42"'"#);
}

#[test]
fn label_reads_trace_the_decoded_value() {
    let (amlg, lines) = traced(MockModule::new().with_entity("h"));
    amlg.set_json_to_label("h", "x", Some(&json!({"n": [1, 2]}))).unwrap();
    lines.lock().unwrap().clear();

    assert_eq!(amlg.get_json_from_label("h", "x").unwrap(), Some(json!({"n": [1, 2]})));
    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], r#"GET_JSON_FROM_LABEL "h" "x""#);
    assert_eq!(lines[1], r#"# RESULT >b'{"n":[1,2]}'"#);
}

#[test]
fn failures_emit_error_line() {
    let (amlg, lines) = traced(MockModule::new());
    amlg.module().fail_next(EntryPoint::DestroyEntity);
    assert!(amlg.destroy_entity("h").is_err());

    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], r#"DESTROY_ENTITY "h""#);
    assert_eq!(
        lines[1],
        "# ERROR > native call DestroyEntity failed: injected failure"
    );
}

#[test]
fn unit_operations_reply_null() {
    let (amlg, lines) = traced(MockModule::new());
    amlg.set_max_num_threads(4).unwrap();
    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], "SET_MAX_NUM_THREADS 4");
    assert_eq!(lines[1], "# RESULT >b'null'");
}

#[test]
fn panicking_sink_does_not_change_results() {
    let trace = Trace::with_sink(|_| panic!("sink is broken"));
    let amlg = Amalgam::with_trace(MockModule::new().with_entity("h"), AmalgamOptions::default(), trace)
        .unwrap();

    let response = amlg.execute_entity_json("h", "l", Some(&json!(7))).unwrap().unwrap();
    assert_eq!(response.content, Some(json!(7)));
    assert_eq!(amlg.get_entities().unwrap(), vec!["h"]);
    assert_eq!(amlg.module().outstanding(), 0);
}

#[test]
fn trace_option_uses_default_sink() {
    let options = AmalgamOptions {
        trace: true,
        ..Default::default()
    };
    let amlg = Amalgam::new(MockModule::new(), options).unwrap();
    assert!(amlg.options().trace);
    assert_eq!(amlg.get_version().unwrap(), mock_version());
}

fn mock_version() -> &'static str {
    amalgam_runtime::mock::MOCK_VERSION
}
