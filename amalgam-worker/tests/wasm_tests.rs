#![cfg(feature = "wasm")]

use amalgam_worker::wasm::WasmInitializer;
use amalgam_worker::*;
use serde_json::json;

const MODULE: &str = r#"
(module
  (memory (export "memory") i64 1)
  (global $next (mut i64) (i64.const 1024))
  (global $sbf (mut i32) (i32.const 0))
  (data (i64.const 16) "9.9.9\00")

  (func (export "malloc") (param $size i64) (result i64)
    (local $ptr i64)
    global.get $next
    local.set $ptr
    global.get $next
    local.get $size
    i64.add
    i64.const 7
    i64.add
    i64.const -8
    i64.and
    global.set $next
    local.get $ptr)

  (func (export "free") (param i64))

  (func (export "SetSBFDataStoreEnabled") (param i32)
    local.get 0
    global.set $sbf)

  (func (export "IsSBFDataStoreEnabled") (result i32)
    global.get $sbf)

  (func (export "GetVersionString") (result i64)
    i64.const 16)
)
"#;

async fn request(svc: &mut WorkerService<WasmInitializer>, command: &str) -> Response {
    let (port, receiver) = reply_channel();
    svc.dispatch(MessageEvent::request(&Request::new(command, vec![]), port)).await;
    receiver.recv().await.unwrap()
}

#[tokio::test]
async fn initializes_from_module_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("amalgam.wat");
    std::fs::write(&path, MODULE).unwrap();

    let mut svc = WorkerService::new(WasmInitializer::new(&path, DEFAULT_MAX_MEMORY_BYTES));
    assert_eq!(request(&mut svc, "initialize").await.body, Some(json!(false)));
    assert_eq!(request(&mut svc, "getVersion").await.body, Some(json!("9.9.9")));
    assert_eq!(request(&mut svc, "isSBFDatastoreEnabled").await.body, Some(json!(true)));

    let missing = request(&mut svc, "getEntities").await;
    assert_eq!(missing.error.unwrap().name, "Native");
}

#[tokio::test]
async fn missing_module_is_an_initialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let init = WasmInitializer::new(dir.path().join("absent.wasm"), DEFAULT_MAX_MEMORY_BYTES);
    let mut svc = WorkerService::new(init);

    let response = request(&mut svc, "initialize").await;
    let error = response.error.unwrap();
    assert_eq!(error.name, "Initialization");
    assert_eq!(error.code.as_deref(), Some("1000"));
    assert_eq!(svc.state(), ServiceState::Uninitialized);
}

#[test]
fn initializer_from_config() {
    let config = WorkerConfig::default();
    assert!(WasmInitializer::from_config(&config).is_none());

    let config = WorkerConfig::from_toml_str("module_path = \"amalgam.wasm\"").unwrap();
    assert!(WasmInitializer::from_config(&config).is_some());
}
