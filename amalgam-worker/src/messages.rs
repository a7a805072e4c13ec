//! Wire envelopes and per-request reply channels.
//!
//! Every request travels with its own [`ReplyPort`]. A port carries exactly
//! one [`Response`]: `send` consumes it, and a port dropped without a reply
//! sends a "No response was produced" failure instead.

use crate::error::{ClientError, ClientResult, ServiceError};
use amalgam_types::ErrorBody;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// Any message crossing the channel, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameters: Vec<Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Request {
    pub fn new(command: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            parameters,
        }
    }

    /// Reads a request out of raw message data.
    ///
    /// Anything that is not a `{type: "request"}` envelope with a string
    /// command is rejected.
    pub fn from_data(data: &Value) -> Option<Self> {
        match serde_json::from_value::<ProtocolMessage>(data.clone()) {
            Ok(ProtocolMessage::Request(request)) => Some(request),
            _ => None,
        }
    }

    pub fn to_data(&self) -> Value {
        serde_json::to_value(ProtocolMessage::Request(self.clone())).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(command: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            command: command.into(),
            success: true,
            body,
            error: None,
        }
    }

    pub fn failure(command: impl Into<String>, error: ErrorBody) -> Self {
        Self {
            command: command.into(),
            success: false,
            body: None,
            error: Some(error),
        }
    }

    /// Splits the response into its body or its error.
    ///
    /// A failure without an error body is reported as a transport error so
    /// the caller never sees a silent failure.
    pub fn into_result(self) -> Result<Option<Value>, ErrorBody> {
        if self.success {
            return Ok(self.body);
        }
        Err(self
            .error
            .unwrap_or_else(|| ServiceError::NoResponse.to_error_body()))
    }
}

/// Unsolicited notification. Never sent on a reply port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// One delivery on the service channel: raw data plus an optional port.
#[derive(Debug)]
pub struct MessageEvent {
    pub data: Value,
    pub port: Option<ReplyPort>,
}

impl MessageEvent {
    pub fn new(data: Value, port: Option<ReplyPort>) -> Self {
        Self { data, port }
    }

    pub fn request(request: &Request, port: ReplyPort) -> Self {
        Self::new(request.to_data(), Some(port))
    }
}

/// Creates a dedicated reply channel for a single request.
pub fn reply_channel() -> (ReplyPort, ReplyReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        ReplyPort {
            sender: Some(tx),
            command: String::new(),
        },
        ReplyReceiver { receiver: rx },
    )
}

/// Sending half of a reply channel.
#[derive(Debug)]
pub struct ReplyPort {
    sender: Option<oneshot::Sender<Response>>,
    command: String,
}

impl ReplyPort {
    /// Records the command echoed by the fallback reply.
    pub fn set_command(&mut self, command: &str) {
        self.command = command.to_string();
    }

    /// Delivers the single reply. A closed receiver is not an error: the
    /// caller stopped waiting, so the reply is discarded.
    pub fn send(mut self, response: Response) {
        if let Some(tx) = self.sender.take() {
            if tx.send(response).is_err() {
                debug!(command = %self.command, "Reply receiver gone, discarding response");
            }
        }
    }
}

impl Drop for ReplyPort {
    fn drop(&mut self) {
        if let Some(tx) = self.sender.take() {
            let command = std::mem::take(&mut self.command);
            debug!(command = %command, "Reply port dropped without a response");
            let _ = tx.send(Response::failure(command, ServiceError::NoResponse.to_error_body()));
        }
    }
}

/// Receiving half of a reply channel.
#[derive(Debug)]
pub struct ReplyReceiver {
    receiver: oneshot::Receiver<Response>,
}

impl ReplyReceiver {
    pub async fn recv(self) -> ClientResult<Response> {
        self.receiver.await.map_err(|_| ClientError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_shape() {
        let request = Request::new("getVersion", vec![]);
        assert_eq!(
            request.to_data(),
            json!({"type": "request", "command": "getVersion", "parameters": []})
        );
    }

    #[test]
    fn null_or_missing_parameters_are_empty() {
        let with_null = json!({"type": "request", "command": "getEntities", "parameters": null});
        assert_eq!(Request::from_data(&with_null).unwrap().parameters, Vec::<Value>::new());

        let missing = json!({"type": "request", "command": "getEntities"});
        assert!(Request::from_data(&missing).unwrap().parameters.is_empty());
    }

    #[test]
    fn non_requests_are_rejected() {
        assert!(Request::from_data(&json!({"command": "x"})).is_none());
        assert!(Request::from_data(&json!({"type": "event", "event": "x"})).is_none());
        assert!(Request::from_data(&json!({"type": "request", "command": 5})).is_none());
        assert!(Request::from_data(&json!("initialize")).is_none());
    }

    #[test]
    fn response_omits_absent_fields() {
        let ok = serde_json::to_value(ProtocolMessage::Response(Response::success("x", None))).unwrap();
        assert_eq!(ok, json!({"type": "response", "command": "x", "success": true}));
    }

    #[test]
    fn failure_without_error_body_is_still_an_error() {
        let response = Response {
            command: "x".into(),
            success: false,
            body: None,
            error: None,
        };
        let err = response.into_result().unwrap_err();
        assert_eq!(err.detail, "No response was produced");
    }

    #[tokio::test]
    async fn port_delivers_exactly_one_reply() {
        let (port, receiver) = reply_channel();
        port.send(Response::success("getVersion", Some(json!("1.0"))));
        let response = receiver.recv().await.unwrap();
        assert_eq!(response.body, Some(json!("1.0")));
    }

    #[tokio::test]
    async fn dropped_port_sends_fallback() {
        let (mut port, receiver) = reply_channel();
        port.set_command("readFile");
        drop(port);
        let response = receiver.recv().await.unwrap();
        assert!(!response.success);
        assert_eq!(response.command, "readFile");
        assert_eq!(response.error.unwrap().detail, "No response was produced");
    }
}
