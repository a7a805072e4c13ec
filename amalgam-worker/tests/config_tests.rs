use amalgam_worker::{DEFAULT_MAX_MEMORY_BYTES, ServiceOptions, WorkerConfig};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn load_config_from_str(contents: &str) -> WorkerConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker.toml");
    std::fs::write(&path, contents).unwrap();
    WorkerConfig::load_from(&path)
}

#[test]
fn defaults() {
    let config = WorkerConfig::default();
    assert_eq!(config.log_level, "info");
    assert!(!config.debug);
    assert_eq!(config.request_timeout(), None);
    assert_eq!(config.fs_root, PathBuf::from("."));
    assert_eq!(config.module_path, None);
    assert_eq!(config.max_memory_bytes, DEFAULT_MAX_MEMORY_BYTES);
    assert!(!config.runtime.trace);
    assert!(config.runtime.sbf_datastore_enabled);
}

#[test]
fn load_from_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig::load_from(&dir.path().join("absent.toml"));
    assert_eq!(config, WorkerConfig::default());
}

#[test]
fn load_from_full_file() {
    let config = load_config_from_str(
        r#"
log_level = "debug"
debug = true
request_timeout_ms = 2500
fs_root = "/var/lib/amalgam"
module_path = "/opt/amalgam/amalgam-st.wasm"
max_memory_bytes = 1048576

[runtime]
trace = true
sbfDatastoreEnabled = false
"#,
    );
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));
    assert_eq!(config.service_options(), ServiceOptions { debug: true });
    assert_eq!(config.fs_root, PathBuf::from("/var/lib/amalgam"));
    assert_eq!(config.module_path.as_deref(), Some(Path::new("/opt/amalgam/amalgam-st.wasm")));
    assert_eq!(config.max_memory_bytes, 1_048_576);
    assert!(config.runtime.trace);
    assert!(!config.runtime.sbf_datastore_enabled);
    assert_eq!(config.host_file_system().root(), Path::new("/var/lib/amalgam"));
}

#[test]
fn partial_file_keeps_other_defaults() {
    let config = load_config_from_str("debug = true\n");
    assert!(config.debug);
    assert_eq!(config.log_level, "info");
    assert!(config.runtime.sbf_datastore_enabled);
}

#[test]
fn load_from_malformed_file_uses_defaults() {
    let config = load_config_from_str("this is not valid toml {{{{");
    assert_eq!(config, WorkerConfig::default());
}

#[test]
fn load_from_unreadable_path_uses_defaults() {
    // A directory exists but cannot be read as a file.
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(WorkerConfig::load_from(dir.path()), WorkerConfig::default());
}

#[test]
fn from_toml_str_reports_type_errors() {
    assert!(WorkerConfig::from_toml_str("request_timeout_ms = \"soon\"").is_err());
}
