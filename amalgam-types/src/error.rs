//! Transferable error shape.
//!
//! Host error values do not survive a channel boundary, so every failure is
//! flattened into an [`ErrorBody`] before it is placed in a reply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure categories reported across the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Message was not a well-formed request.
    MalformedRequest,
    /// The native module failed to instantiate.
    Initialization,
    /// An operation arrived before a successful initialize.
    NotInitialized,
    /// Command is neither an allow-listed operation nor claimed by an extension.
    InvalidOperation,
    /// Positional parameters did not match the operation.
    InvalidParameters,
    /// A native call failed (trap, missing entry point, signature mismatch).
    Native,
    /// Native memory could not be allocated, read or decoded.
    Marshal,
    /// The core returned a payload that violates the response contract.
    MalformedResponse,
    /// JSON encoding or decoding failed.
    Serialization,
    /// A proxied file-system command failed.
    FileSystem,
    /// The channel itself failed (disconnect, timeout, missing reply).
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "MalformedRequest",
            Self::Initialization => "Initialization",
            Self::NotInitialized => "NotInitialized",
            Self::InvalidOperation => "InvalidOperation",
            Self::InvalidParameters => "InvalidParameters",
            Self::Native => "Native",
            Self::Marshal => "Marshal",
            Self::MalformedResponse => "MalformedResponse",
            Self::Serialization => "Serialization",
            Self::FileSystem => "FileSystem",
            Self::Transport => "Transport",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "MalformedRequest" => Self::MalformedRequest,
            "Initialization" => Self::Initialization,
            "NotInitialized" => Self::NotInitialized,
            "InvalidOperation" => Self::InvalidOperation,
            "InvalidParameters" => Self::InvalidParameters,
            "Native" => Self::Native,
            "Marshal" => Self::Marshal,
            "MalformedResponse" => Self::MalformedResponse,
            "Serialization" => Self::Serialization,
            "FileSystem" => Self::FileSystem,
            "Transport" => Self::Transport,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical `{detail, code?, name}` error placed in response envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub name: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, detail: impl Into<String>, code: Option<String>) -> Self {
        Self {
            detail: detail.into(),
            code,
            name: kind.as_str().to_string(),
        }
    }

    /// The category named by `name`, if it is one this crate knows.
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::parse(&self.name)
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {} ({})", self.name, self.detail, code),
            None => write!(f, "{}: {}", self.name, self.detail),
        }
    }
}

impl std::error::Error for ErrorBody {}
