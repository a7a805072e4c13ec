//! Client for the Amalgam native runtime.
//!
//! Layers, bottom up:
//! - [`NativeModule`]: a loaded module (linear memory plus the raw binding
//!   table declared by [`EntryPoint`])
//! - [`NativeRuntime`]: one marshaled method per entry point, releasing
//!   every native allocation on every path
//! - [`Amalgam`]: the typed facade with call tracing and core response
//!   decoding
//!
//! Backends: [`mock::MockModule`] for tests and, with the `wasm` feature,
//! [`wasm::WasmModule`] on wasmtime.

mod api;
mod binding;
mod error;
mod native;
mod options;
mod params;
mod trace;

pub mod mock;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use api::{Amalgam, decode_core_response};
pub use binding::{EntryPoint, NativeModule, NativeValue, ValueKind};
pub use error::{INSTANTIATION_ERROR_CODE, RuntimeError, RuntimeResult};
pub use native::NativeRuntime;
pub use options::{AmalgamOptions, DEFAULT_MAX_MEMORY_BYTES};
pub use params::{CloneEntityParams, LoadEntityParams, StoreEntityParams};
pub use trace::{TRACE_TARGET, Trace, TraceCommand};
