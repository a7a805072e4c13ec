//! Initializer backed by a wasm build of the runtime.

use crate::config::WorkerConfig;
use crate::service::Initializer;
use amalgam_runtime::wasm::WasmModule;
use amalgam_runtime::{Amalgam, AmalgamOptions, RuntimeError, RuntimeResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Compiles and instantiates the module at `module_path` on a blocking
/// thread, then builds the facade there.
#[derive(Debug, Clone)]
pub struct WasmInitializer {
    module_path: PathBuf,
    max_memory_bytes: usize,
}

impl WasmInitializer {
    pub fn new(module_path: impl Into<PathBuf>, max_memory_bytes: usize) -> Self {
        Self {
            module_path: module_path.into(),
            max_memory_bytes,
        }
    }

    /// `None` when the config names no module.
    pub fn from_config(config: &WorkerConfig) -> Option<Self> {
        config
            .module_path
            .as_ref()
            .map(|path| Self::new(path.clone(), config.max_memory_bytes))
    }
}

#[async_trait]
impl Initializer for WasmInitializer {
    type Module = WasmModule;

    async fn initialize(&self, options: AmalgamOptions) -> RuntimeResult<Amalgam<WasmModule>> {
        let path = self.module_path.clone();
        let max_memory_bytes = self.max_memory_bytes;
        info!(path = %path.display(), "Instantiating wasm runtime");
        tokio::task::spawn_blocking(move || {
            let module = WasmModule::from_file(&path, max_memory_bytes)?;
            Amalgam::new(module, options)
        })
        .await
        .map_err(|e| RuntimeError::Instantiation(e.to_string()))?
    }
}
