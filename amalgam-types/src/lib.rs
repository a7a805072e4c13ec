//! Core type definitions for the Amalgam runtime client.
//!
//! This crate defines the values that cross every layer of the client:
//! - Entity load/verify status records
//! - Decoded core responses (content plus errors and warnings)
//! - Entity permission sets
//! - The transferable error shape used at channel boundaries
//!
//! Nothing in here touches native memory; see `amalgam-marshal` for that.

mod error;
mod permissions;
mod response;
mod status;

pub use error::{ErrorBody, ErrorKind};
pub use permissions::EntityPermissions;
pub use response::{CoreMessage, CoreResponse, UNKNOWN_CORE_ERROR};
pub use status::EntityStatus;
