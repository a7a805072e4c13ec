//! Error types for the worker service and its client.

use amalgam_runtime::RuntimeError;
use amalgam_types::{ErrorBody, ErrorKind};
use std::io;
use thiserror::Error;

pub const MALFORMED_REQUEST: &str = "Malformed Amalgam request.";
pub const NOT_INITIALIZED: &str = "Runtime not initialized.";
pub const INVALID_OPERATION: &str = "Invalid Amalgam operation.";
pub const NO_RESPONSE: &str = "No response was produced";

/// Failures of proxied file-system commands, named by POSIX error code.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, '{0}'")]
    NotFound(String),

    #[error("EEXIST: file already exists, '{0}'")]
    AlreadyExists(String),

    #[error("ENOTEMPTY: directory not empty, '{0}'")]
    NotEmpty(String),

    #[error("EACCES: permission denied, '{0}'")]
    PermissionDenied(String),

    #[error("ENOTDIR: not a directory, '{0}'")]
    NotADirectory(String),

    #[error("EISDIR: illegal operation on a directory, '{0}'")]
    IsADirectory(String),

    #[error("EINVAL: invalid path, '{0}'")]
    InvalidPath(String),

    #[error("EIO: fetching '{url}' failed: {detail}")]
    Fetch { url: String, detail: String },

    #[error("EIO: '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    pub fn from_io(path: &str, source: io::Error) -> Self {
        let path = path.to_string();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path),
            _ => Self::Io { path, source },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ENOENT",
            Self::AlreadyExists(_) => "EEXIST",
            Self::NotEmpty(_) => "ENOTEMPTY",
            Self::PermissionDenied(_) => "EACCES",
            Self::NotADirectory(_) => "ENOTDIR",
            Self::IsADirectory(_) => "EISDIR",
            Self::InvalidPath(_) => "EINVAL",
            Self::Fetch { .. } | Self::Io { .. } => "EIO",
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Any failure while handling a request inside the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Malformed Amalgam request.")]
    MalformedRequest,

    #[error("Runtime not initialized.")]
    NotInitialized,

    #[error("Invalid Amalgam operation.")]
    InvalidOperation { command: String },

    #[error("invalid parameters for {command}: {detail}")]
    InvalidParameters { command: String, detail: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    FileSystem(#[from] FsError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No response was produced")]
    NoResponse,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest => ErrorKind::MalformedRequest,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            Self::Runtime(e) => e.kind(),
            Self::FileSystem(_) => ErrorKind::FileSystem,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::NoResponse => ErrorKind::Transport,
        }
    }

    pub fn code(&self) -> Option<String> {
        match self {
            Self::Runtime(e) => e.code().map(str::to_string),
            Self::FileSystem(e) => Some(e.code().to_string()),
            _ => None,
        }
    }

    /// The transferable form placed in an error response.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody::new(self.kind(), self.to_string(), self.code())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures seen by a [`WorkerClient`](crate::WorkerClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("worker disconnected")]
    Disconnected,

    #[error("request '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("{0}")]
    Remote(ErrorBody),

    #[error("unexpected response body for '{command}': {detail}")]
    UnexpectedBody { command: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Disconnected | Self::Timeout { .. } => ErrorKind::Transport,
            Self::Remote(body) => body.kind().unwrap_or(ErrorKind::Transport),
            Self::UnexpectedBody { .. } | Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// The error reported by the service, if the failure happened there.
    pub fn remote(&self) -> Option<&ErrorBody> {
        match self {
            Self::Remote(body) => Some(body),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
