#![allow(dead_code)]

use amalgam_runtime::mock::{CallLog, MockModule};
use amalgam_runtime::{Amalgam, AmalgamOptions, RuntimeError, RuntimeResult};
use amalgam_worker::{
    CommandExtension, Initializer, MessageEvent, Request, Response, WorkerService, reply_channel,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OK_RESPONSE: &str = r#"{"status":"ok","payload":{"a":1},"warnings":[]}"#;

/// Builds a fresh mock runtime on every initialize and records its call log.
#[derive(Clone, Default)]
pub struct MockInitializer {
    pub calls: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub log: Arc<Mutex<Option<CallLog>>>,
}

impl MockInitializer {
    pub fn failing() -> Self {
        let init = Self::default();
        init.fail.store(true, Ordering::SeqCst);
        init
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_log(&self) -> Option<CallLog> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Initializer for MockInitializer {
    type Module = MockModule;

    async fn initialize(&self, options: AmalgamOptions) -> RuntimeResult<Amalgam<MockModule>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RuntimeError::Instantiation("module rejected".into()));
        }
        let module = MockModule::new()
            .with_file("m.caml", "1.2.3")
            .with_response("h", "l", OK_RESPONSE);
        *self.log.lock().unwrap() = Some(module.call_log());
        Amalgam::new(module, options)
    }
}

pub async fn send<E: CommandExtension>(
    service: &mut WorkerService<MockInitializer, E>,
    command: &str,
    parameters: Vec<Value>,
) -> Response {
    let (port, receiver) = reply_channel();
    let request = Request::new(command, parameters);
    service.dispatch(MessageEvent::request(&request, port)).await;
    receiver.recv().await.unwrap()
}

pub async fn send_data<E: CommandExtension>(
    service: &mut WorkerService<MockInitializer, E>,
    data: Value,
) -> Response {
    let (port, receiver) = reply_channel();
    service.dispatch(MessageEvent::new(data, Some(port))).await;
    receiver.recv().await.unwrap()
}

/// Error detail and name of a failed response.
pub fn failure(response: Response) -> (String, String) {
    assert!(!response.success, "expected a failure, got {response:?}");
    let error = response.error.expect("error body");
    (error.detail, error.name)
}
