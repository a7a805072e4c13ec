//! Caller side of the worker channel.

use crate::command::{Command, Operation};
use crate::error::{ClientError, ClientResult};
use crate::messages::{MessageEvent, Request, Response, reply_channel};
use crate::service::{CommandExtension, Initializer, WorkerService};
use amalgam_runtime::{AmalgamOptions, CloneEntityParams, LoadEntityParams, StoreEntityParams};
use amalgam_types::{CoreResponse, EntityPermissions, EntityStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Default capacity of the service channel created by [`spawn_worker`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Runs `service` on its own task and returns a client connected to it.
///
/// The task ends once every clone of the client has been dropped.
pub fn spawn_worker<I, E>(service: WorkerService<I, E>, capacity: usize) -> (WorkerClient, JoinHandle<()>)
where
    I: Initializer + 'static,
    E: CommandExtension + 'static,
{
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(service.run(receiver));
    (WorkerClient::new(sender), handle)
}

/// Sends requests to a worker and awaits their replies.
#[derive(Clone)]
pub struct WorkerClient {
    sender: mpsc::Sender<MessageEvent>,
    timeout: Option<Duration>,
}

impl WorkerClient {
    pub fn new(sender: mpsc::Sender<MessageEvent>) -> Self {
        Self { sender, timeout: None }
    }

    /// Fails requests that get no reply within `timeout`. A reply arriving
    /// later is discarded; the worker still finishes the request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sends raw message data and returns the reply as-is.
    pub async fn send_data(&self, command: &str, data: Value) -> ClientResult<Response> {
        let (mut port, receiver) = reply_channel();
        port.set_command(command);
        self.sender
            .send(MessageEvent::new(data, Some(port)))
            .await
            .map_err(|_| ClientError::Disconnected)?;

        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver.recv()).await {
                Ok(reply) => reply,
                Err(_) => {
                    warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "Worker request timed out");
                    Err(ClientError::Timeout {
                        command: command.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
            None => receiver.recv().await,
        }
    }

    /// Sends `command` and returns the response body.
    pub async fn request(&self, command: &str, parameters: Vec<Value>) -> ClientResult<Option<Value>> {
        let request = Request::new(command, parameters);
        let response = self.send_data(command, request.to_data()).await?;
        response.into_result().map_err(ClientError::Remote)
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, parameters: Vec<Value>) -> ClientResult<T> {
        let body = self.request(command, parameters).await?;
        decode_body(command, body)
    }

    async fn operation<T: DeserializeOwned>(&self, operation: Operation) -> ClientResult<T> {
        self.call(operation.kind().as_str(), operation.to_parameters()).await
    }

    /// Returns whether the worker was already initialized.
    pub async fn initialize(&self, options: Option<&AmalgamOptions>) -> ClientResult<bool> {
        let parameters = match options {
            Some(options) => vec![serde_json::to_value(options)?],
            None => Vec::new(),
        };
        self.call(Command::INITIALIZE, parameters).await
    }

    pub async fn load_entity(&self, params: LoadEntityParams) -> ClientResult<EntityStatus> {
        self.operation(Operation::LoadEntity(params)).await
    }

    pub async fn verify_entity(&self, path: &str) -> ClientResult<EntityStatus> {
        self.operation(Operation::VerifyEntity { path: path.into() }).await
    }

    pub async fn clone_entity(&self, params: CloneEntityParams) -> ClientResult<bool> {
        self.operation(Operation::CloneEntity(params)).await
    }

    pub async fn store_entity(&self, params: StoreEntityParams) -> ClientResult<()> {
        self.operation(Operation::StoreEntity(params)).await
    }

    pub async fn execute_entity(&self, handle: &str, label: &str) -> ClientResult<()> {
        self.operation(Operation::ExecuteEntity {
            handle: handle.into(),
            label: label.into(),
        })
        .await
    }

    pub async fn execute_entity_json<D: Serialize + ?Sized>(
        &self,
        handle: &str,
        label: &str,
        data: Option<&D>,
    ) -> ClientResult<Option<CoreResponse>> {
        self.operation(Operation::ExecuteEntityJson {
            handle: handle.into(),
            label: label.into(),
            data: data.map(serde_json::to_value).transpose()?,
        })
        .await
    }

    pub async fn destroy_entity(&self, handle: &str) -> ClientResult<()> {
        self.operation(Operation::DestroyEntity { handle: handle.into() }).await
    }

    pub async fn get_entities(&self) -> ClientResult<Vec<String>> {
        self.operation(Operation::GetEntities).await
    }

    pub async fn set_random_seed(&self, handle: &str, seed: &str) -> ClientResult<bool> {
        self.operation(Operation::SetRandomSeed {
            handle: handle.into(),
            seed: seed.into(),
        })
        .await
    }

    pub async fn set_json_to_label<D: Serialize + ?Sized>(
        &self,
        handle: &str,
        label: &str,
        data: Option<&D>,
    ) -> ClientResult<()> {
        self.operation(Operation::SetJsonToLabel {
            handle: handle.into(),
            label: label.into(),
            data: data.map(serde_json::to_value).transpose()?,
        })
        .await
    }

    pub async fn get_json_from_label(&self, handle: &str, label: &str) -> ClientResult<Option<Value>> {
        self.operation(Operation::GetJsonFromLabel {
            handle: handle.into(),
            label: label.into(),
        })
        .await
    }

    pub async fn set_sbf_datastore_enabled(&self, enabled: bool) -> ClientResult<()> {
        self.operation(Operation::SetSbfDatastoreEnabled { enabled }).await
    }

    pub async fn is_sbf_datastore_enabled(&self) -> ClientResult<bool> {
        self.operation(Operation::IsSbfDatastoreEnabled).await
    }

    pub async fn set_max_num_threads(&self, threads: u64) -> ClientResult<()> {
        self.operation(Operation::SetMaxNumThreads { threads }).await
    }

    pub async fn get_max_num_threads(&self) -> ClientResult<u64> {
        self.operation(Operation::GetMaxNumThreads).await
    }

    pub async fn set_entity_permissions(&self, handle: &str, permissions: EntityPermissions) -> ClientResult<bool> {
        self.operation(Operation::SetEntityPermissions {
            handle: handle.into(),
            permissions,
        })
        .await
    }

    pub async fn get_entity_permissions(&self, handle: &str) -> ClientResult<EntityPermissions> {
        self.operation(Operation::GetEntityPermissions { handle: handle.into() }).await
    }

    pub async fn get_version(&self) -> ClientResult<String> {
        self.operation(Operation::GetVersion).await
    }

    pub async fn get_concurrency_type(&self) -> ClientResult<String> {
        self.operation(Operation::GetConcurrencyType).await
    }

    // File-system commands

    pub async fn create_lazy_file(
        &self,
        parent: &str,
        name: &str,
        url: &str,
        can_read: bool,
        can_write: bool,
    ) -> ClientResult<()> {
        self.call(
            "createLazyFile",
            vec![json!(parent), json!(name), json!(url), json!(can_read), json!(can_write)],
        )
        .await
    }

    pub async fn write_file(&self, path: &str, data: &[u8]) -> ClientResult<()> {
        self.call("writeFile", vec![json!(path), json!(data)]).await
    }

    pub async fn append_file(&self, path: &str, data: &[u8]) -> ClientResult<()> {
        self.call("writeFile", vec![json!(path), json!(data), json!({"flags": "a"})])
            .await
    }

    pub async fn read_file(&self, path: &str) -> ClientResult<Vec<u8>> {
        self.call("readFile", vec![json!(path)]).await
    }

    pub async fn read_file_utf8(&self, path: &str) -> ClientResult<String> {
        self.call("readFile", vec![json!(path), json!({"encoding": "utf8"})])
            .await
    }

    pub async fn unlink(&self, path: &str) -> ClientResult<()> {
        self.call("unlink", vec![json!(path)]).await
    }

    pub async fn mkdir(&self, path: &str, mode: Option<u32>) -> ClientResult<()> {
        self.call("mkdir", vec![json!(path), json!(mode)]).await
    }

    pub async fn rmdir(&self, path: &str) -> ClientResult<()> {
        self.call("rmdir", vec![json!(path)]).await
    }

    pub async fn readdir(&self, path: &str) -> ClientResult<Vec<String>> {
        self.call("readdir", vec![json!(path)]).await
    }
}

/// An absent body decodes as JSON `null`, which covers `()` and `Option`.
fn decode_body<T: DeserializeOwned>(command: &str, body: Option<Value>) -> ClientResult<T> {
    serde_json::from_value(body.unwrap_or(Value::Null)).map_err(|e| ClientError::UnexpectedBody {
        command: command.to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_body_decodes_as_unit_or_none() {
        decode_body::<()>("destroyEntity", None).unwrap();
        assert_eq!(decode_body::<Option<Value>>("getJsonFromLabel", None).unwrap(), None);
    }

    #[test]
    fn mismatched_body_is_unexpected() {
        let err = decode_body::<bool>("getVersion", Some(json!("1.0"))).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedBody { .. }));
    }

    #[tokio::test]
    async fn closed_worker_is_disconnected() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let err = WorkerClient::new(sender).get_version().await.unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));
    }
}
