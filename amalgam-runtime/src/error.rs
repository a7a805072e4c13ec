//! Error types for the runtime client.

use amalgam_marshal::MarshalError;
use amalgam_types::ErrorKind;
use thiserror::Error;

/// Code attached to instantiation failures.
pub const INSTANTIATION_ERROR_CODE: &str = "1000";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("marshaling error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("native call {entry} failed: {detail}")]
    Native { entry: &'static str, detail: String },

    #[error("entry point not exported by the native module: {0}")]
    MissingEntryPoint(&'static str),

    #[error("signature mismatch calling {entry}: {detail}")]
    Signature { entry: &'static str, detail: String },

    #[error("Failed to instantiate Amalgam runtime: {0}")]
    Instantiation(String),

    #[error("Malformed response received from core.")]
    MalformedResponse,

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Marshal(_) => ErrorKind::Marshal,
            Self::Native { .. } | Self::MissingEntryPoint(_) | Self::Signature { .. } => {
                ErrorKind::Native
            }
            Self::Instantiation(_) => ErrorKind::Initialization,
            Self::MalformedResponse => ErrorKind::MalformedResponse,
            Self::Json(_) => ErrorKind::Serialization,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Instantiation(_) => Some(INSTANTIATION_ERROR_CODE),
            _ => None,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
