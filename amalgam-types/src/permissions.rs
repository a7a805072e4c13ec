//! Entity permission flags as exchanged with the runtime.
//!
//! The runtime encodes permissions as a JSON object of booleans. Missing keys
//! are treated as not granted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityPermissions {
    pub std_out_and_std_err: bool,
    pub std_in: bool,
    pub load: bool,
    pub store: bool,
    pub environment: bool,
    pub alter_performance: bool,
    pub system: bool,
}

impl EntityPermissions {
    /// Every permission granted.
    pub fn all() -> Self {
        Self {
            std_out_and_std_err: true,
            std_in: true,
            load: true,
            store: true,
            environment: true,
            alter_performance: true,
            system: true,
        }
    }

    /// No permission granted.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true when nothing is granted.
    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }
}
