use serde::{Deserialize, Serialize};

/// Default ceiling for native linear memory growth (256MB).
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 256 * 1024 * 1024;

/// Options applied when an [`Amalgam`](crate::Amalgam) facade is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmalgamOptions {
    /// Emit a call trace for every operation.
    pub trace: bool,
    /// Pushed to the native side as soon as the facade is constructed.
    pub sbf_datastore_enabled: bool,
}

impl Default for AmalgamOptions {
    fn default() -> Self {
        Self {
            trace: false,
            sbf_datastore_enabled: true,
        }
    }
}
