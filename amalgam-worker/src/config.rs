//! Worker configuration, read from a TOML file.
//!
//! ```toml
//! log_level = "debug"
//! debug = true
//! request_timeout_ms = 30000
//! fs_root = "/var/lib/amalgam"
//! module_path = "/opt/amalgam/amalgam-st.wasm"
//! max_memory_bytes = 536870912
//!
//! [runtime]
//! trace = true
//! sbfDatastoreEnabled = false
//! ```

use crate::files::HostFileSystem;
use crate::service::ServiceOptions;
use amalgam_runtime::AmalgamOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub use amalgam_runtime::DEFAULT_MAX_MEMORY_BYTES;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub log_level: String,
    pub debug: bool,
    pub request_timeout_ms: Option<u64>,
    pub fs_root: PathBuf,
    pub module_path: Option<PathBuf>,
    pub max_memory_bytes: usize,
    pub runtime: AmalgamOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            request_timeout_ms: None,
            fs_root: PathBuf::from("."),
            module_path: None,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            runtime: AmalgamOptions::default(),
        }
    }
}

impl WorkerConfig {
    /// Loads the configuration at `path`.
    ///
    /// A missing file yields the defaults. So does a file that cannot be
    /// read or parsed, with a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No worker config found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded worker config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse worker config {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read worker config {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions { debug: self.debug }
    }

    pub fn host_file_system(&self) -> HostFileSystem {
        HostFileSystem::new(self.fs_root.clone())
    }
}
