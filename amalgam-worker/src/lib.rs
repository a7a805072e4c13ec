//! Asynchronous request/response service hosting an Amalgam runtime.
//!
//! A [`WorkerService`] owns the facade and consumes [`MessageEvent`]s from a
//! channel, one at a time. Each request carries its own [`ReplyPort`] and
//! gets exactly one [`Response`]. [`WorkerClient`] is the typed caller side.
//!
//! ```text
//! WorkerClient ──(mpsc: MessageEvent)──▶ WorkerService ──▶ Amalgam
//!      ▲                                      │
//!      └──────────(oneshot: Response)─────────┘
//! ```

mod client;
mod command;
mod config;
mod error;
mod files;
mod messages;
mod service;

pub mod logging;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use client::{DEFAULT_CHANNEL_CAPACITY, WorkerClient, spawn_worker};
pub use command::{Command, Operation, OperationKind, Params};
pub use config::{DEFAULT_MAX_MEMORY_BYTES, WorkerConfig};
pub use error::{
    ClientError, ClientResult, FsError, FsResult, INVALID_OPERATION, MALFORMED_REQUEST, NO_RESPONSE,
    NOT_INITIALIZED, ServiceError, ServiceResult,
};
pub use files::{Encoding, FileSystem, FileSystemExtension, FileSystemOperation, HostFileSystem};
pub use messages::{Event, MessageEvent, ProtocolMessage, ReplyPort, ReplyReceiver, Request, Response, reply_channel};
pub use service::{CommandExtension, Initializer, NoExtension, ServiceOptions, ServiceState, WorkerService};
