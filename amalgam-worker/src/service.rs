//! The request dispatch state machine.
//!
//! A [`WorkerService`] owns at most one [`Amalgam`] facade. It starts
//! uninitialized, becomes ready after the first successful `initialize`,
//! and from then on routes every request to either the facade or its
//! [`CommandExtension`].

use crate::command::{Command, Operation, decode_initialize};
use crate::error::{ServiceError, ServiceResult};
use crate::messages::{MessageEvent, ReplyPort, Request, Response};
use amalgam_runtime::{Amalgam, AmalgamOptions, NativeModule, RuntimeResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Builds the facade the first time `initialize` is received.
#[async_trait]
pub trait Initializer: Send + Sync {
    type Module: NativeModule + Send + 'static;

    async fn initialize(&self, options: AmalgamOptions) -> RuntimeResult<Amalgam<Self::Module>>;
}

/// Hook for commands outside the operation allow-list.
///
/// Returning `None` means the command is not handled here, and the service
/// replies with an invalid-operation error.
#[async_trait]
pub trait CommandExtension: Send + Sync {
    async fn handle(&self, request: &Request) -> Option<ServiceResult<Option<Value>>>;
}

/// Claims nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtension;

#[async_trait]
impl CommandExtension for NoExtension {
    async fn handle(&self, _request: &Request) -> Option<ServiceResult<Option<Value>>> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Log every error reply at error level instead of debug.
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
}

pub struct WorkerService<I: Initializer, E: CommandExtension = NoExtension> {
    initializer: I,
    extension: E,
    options: ServiceOptions,
    amalgam: Option<Amalgam<I::Module>>,
}

impl<I: Initializer> WorkerService<I, NoExtension> {
    pub fn new(initializer: I) -> Self {
        Self::with_extension(initializer, NoExtension)
    }
}

impl<I: Initializer, E: CommandExtension> WorkerService<I, E> {
    pub fn with_extension(initializer: I, extension: E) -> Self {
        Self {
            initializer,
            extension,
            options: ServiceOptions::default(),
            amalgam: None,
        }
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> ServiceState {
        match self.amalgam {
            Some(_) => ServiceState::Ready,
            None => ServiceState::Uninitialized,
        }
    }

    /// The facade, once initialized.
    pub fn amalgam(&self) -> Option<&Amalgam<I::Module>> {
        self.amalgam.as_ref()
    }

    pub fn extension(&self) -> &E {
        &self.extension
    }

    /// Consumes messages in delivery order until every sender is gone.
    pub async fn run(mut self, mut receiver: mpsc::Receiver<MessageEvent>) {
        info!("Amalgam worker started");
        while let Some(event) = receiver.recv().await {
            self.dispatch(event).await;
        }
        info!("Amalgam worker channel closed, shutting down");
    }

    /// Handles one message and sends its reply, if it has a port.
    pub async fn dispatch(&mut self, event: MessageEvent) {
        let MessageEvent { data, port } = event;
        let Some(mut port) = port else {
            debug!("Discarding message without a reply port");
            return;
        };

        let Some(request) = Request::from_data(&data) else {
            self.reply_error(port, "", ServiceError::MalformedRequest);
            return;
        };
        port.set_command(&request.command);

        match self.handle(&request).await {
            Ok(body) => port.send(Response::success(request.command, body)),
            Err(e) => self.reply_error(port, &request.command, e),
        }
    }

    async fn handle(&mut self, request: &Request) -> ServiceResult<Option<Value>> {
        let command = Command::parse(&request.command);
        if command == Command::Initialize {
            return self.initialize(&request.parameters).await.map(|b| Some(Value::Bool(b)));
        }

        if self.amalgam.is_none() {
            return Err(ServiceError::NotInitialized);
        }

        // The facade is not Sync, so it is never borrowed across an await.
        match command {
            Command::Operation(kind) => {
                let operation = Operation::decode(kind, &request.parameters)?;
                let amalgam = self.amalgam.as_ref().ok_or(ServiceError::NotInitialized)?;
                debug!(command = %kind, "Invoking operation");
                operation.invoke(amalgam)
            }
            _ => match self.extension.handle(request).await {
                Some(result) => result,
                None => Err(ServiceError::InvalidOperation {
                    command: request.command.clone(),
                }),
            },
        }
    }

    /// Returns whether the runtime was already initialized.
    async fn initialize(&mut self, parameters: &[Value]) -> ServiceResult<bool> {
        if self.amalgam.is_some() {
            debug!("Runtime already initialized");
            return Ok(true);
        }
        let options = decode_initialize(parameters)?;
        let amalgam = self.initializer.initialize(options).await?;
        info!("Amalgam runtime initialized");
        self.amalgam = Some(amalgam);
        Ok(false)
    }

    fn reply_error(&self, port: ReplyPort, command: &str, e: ServiceError) {
        if self.options.debug {
            error!(command = %command, error = %e, "Request failed");
        } else if matches!(e, ServiceError::MalformedRequest) {
            warn!("Received malformed request");
        } else {
            debug!(command = %command, error = %e, "Request failed");
        }
        port.send(Response::failure(command, e.to_error_body()));
    }
}
