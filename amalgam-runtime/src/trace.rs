//! Replayable call trace.
//!
//! When enabled, every facade operation writes a command line before it
//! dispatches and a result (or error) line afterwards:
//!
//! ```text
//! LOAD_ENTITY "h" "model.caml" "" false "" "" "" null
//! # RESULT >b'{"loaded":true,"message":"","version":"1.0.0","entityPath":[]}'
//! # TIME EXECUTION START 2026-01-01T00:00:00.000Z
//! # ERROR > native call ExecuteEntityJsonPtr failed: unreachable
//! ```
//!
//! Lines go to `tracing` under [`TRACE_TARGET`] unless a custom sink is
//! installed. Tracing never affects the result of an operation: values that
//! fail to serialize are written as `null`, and a panicking sink is caught.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

pub const TRACE_TARGET: &str = "amalgam_runtime::trace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceCommand {
    LoadEntity,
    VerifyEntity,
    CloneEntity,
    StoreEntity,
    ExecuteEntity,
    ExecuteEntityJson,
    DestroyEntity,
    GetEntities,
    SetRandomSeed,
    SetJsonToLabel,
    GetJsonFromLabel,
    SetSbfDatastoreEnabled,
    IsSbfDatastoreEnabled,
    SetMaxNumThreads,
    GetMaxNumThreads,
    SetEntityPermissions,
    GetEntityPermissions,
    Version,
    ConcurrencyType,
}

impl TraceCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadEntity => "LOAD_ENTITY",
            Self::VerifyEntity => "VERIFY_ENTITY",
            Self::CloneEntity => "CLONE_ENTITY",
            Self::StoreEntity => "STORE_ENTITY",
            Self::ExecuteEntity => "EXECUTE_ENTITY",
            Self::ExecuteEntityJson => "EXECUTE_ENTITY_JSON",
            Self::DestroyEntity => "DESTROY_ENTITY",
            Self::GetEntities => "GET_ENTITIES",
            Self::SetRandomSeed => "SET_RANDOM_SEED",
            Self::SetJsonToLabel => "SET_JSON_TO_LABEL",
            Self::GetJsonFromLabel => "GET_JSON_FROM_LABEL",
            Self::SetSbfDatastoreEnabled => "SET_SBF_DATASTORE_ENABLED",
            Self::IsSbfDatastoreEnabled => "IS_SBF_DATASTORE_ENABLED",
            Self::SetMaxNumThreads => "SET_MAX_NUM_THREADS",
            Self::GetMaxNumThreads => "GET_MAX_NUM_THREADS",
            Self::SetEntityPermissions => "SET_ENTITY_PERMISSIONS",
            Self::GetEntityPermissions => "GET_ENTITY_PERMISSIONS",
            Self::Version => "VERSION",
            Self::ConcurrencyType => "CONCURRENCY_TYPE",
        }
    }
}

impl fmt::Display for TraceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Sink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct Trace {
    enabled: bool,
    sink: Option<Sink>,
}

impl Trace {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, sink: None }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// An enabled trace writing each line to `sink`.
    pub fn with_sink(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            enabled: true,
            sink: Some(Arc::new(sink)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn emit(&self, line: String) {
        if !self.enabled {
            return;
        }
        let written = panic::catch_unwind(AssertUnwindSafe(|| match &self.sink {
            Some(sink) => sink(&line),
            None => info!(target: TRACE_TARGET, "{line}"),
        }));
        if written.is_err() {
            warn!("Trace sink panicked, line dropped");
        }
    }

    /// `COMMAND part part ...` with every part JSON-encoded.
    pub fn log_command<I>(&self, command: TraceCommand, parts: I)
    where
        I: IntoIterator<Item = Value>,
    {
        if !self.enabled {
            return;
        }
        let mut line = command.as_str().to_string();
        for part in parts {
            line.push(' ');
            line.push_str(&encode(&part));
        }
        self.emit(line);
    }

    pub fn log_reply<T: Serialize + ?Sized>(&self, reply: &T) {
        if self.enabled {
            self.emit(format!("# RESULT >b'{}'", encode(reply)));
        }
    }

    pub fn log_time(&self, label: &str) {
        if self.enabled {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            self.emit(format!("# TIME {label} {now}"));
        }
    }

    pub fn log_comment(&self, comment: &str) {
        if self.enabled {
            self.emit(format!("# {comment}"));
        }
    }

    pub fn log_error(&self, error: &dyn fmt::Display) {
        if self.enabled {
            self.emit(format!("# ERROR > {error}"));
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("enabled", &self.enabled)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn capture() -> (Trace, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        let trace = Trace::with_sink(move |line| sink_lines.lock().unwrap().push(line.to_string()));
        (trace, lines)
    }

    #[test]
    fn command_parts_are_json_encoded() {
        let (trace, lines) = capture();
        trace.log_command(
            TraceCommand::SetJsonToLabel,
            [json!("h"), json!("x"), Value::Null, json!(3)],
        );
        assert_eq!(lines.lock().unwrap()[0], r#"SET_JSON_TO_LABEL "h" "x" null 3"#);
    }

    #[test]
    fn reply_and_error_lines() {
        let (trace, lines) = capture();
        trace.log_reply(&json!({"a": 1}));
        trace.log_error(&"boom");
        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], r#"# RESULT >b'{"a":1}'"#);
        assert_eq!(lines[1], "# ERROR > boom");
    }

    #[test]
    fn time_marker_is_iso8601() {
        let (trace, lines) = capture();
        trace.log_time("EXECUTION START");
        let line = lines.lock().unwrap()[0].clone();
        let stamp = line.strip_prefix("# TIME EXECUTION START ").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn disabled_trace_writes_nothing() {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink_lines = Arc::clone(&lines);
        let mut trace = Trace::with_sink(move |line| sink_lines.lock().unwrap().push(line.into()));
        trace.enabled = false;
        trace.log_comment("hidden");
        assert!(lines.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_sink_is_contained() {
        let trace = Trace::with_sink(|_| panic!("sink failure"));
        trace.log_comment("still fine");
    }
}
