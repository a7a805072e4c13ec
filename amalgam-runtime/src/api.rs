//! The typed client facade.

use crate::binding::NativeModule;
use crate::error::{RuntimeError, RuntimeResult};
use crate::native::NativeRuntime;
use crate::options::AmalgamOptions;
use crate::params::{CloneEntityParams, LoadEntityParams, StoreEntityParams};
use crate::trace::{Trace, TraceCommand};
use amalgam_types::{CoreMessage, CoreResponse, EntityPermissions, EntityStatus, UNKNOWN_CORE_ERROR};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

/// Typed, traced access to one native runtime instance.
///
/// Construction pushes [`AmalgamOptions::sbf_datastore_enabled`] to the
/// native side, so a module that cannot take that call fails here rather
/// than on first use.
pub struct Amalgam<M: NativeModule> {
    runtime: NativeRuntime<M>,
    options: AmalgamOptions,
    trace: Trace,
}

impl<M: NativeModule> Amalgam<M> {
    pub fn new(module: M, options: AmalgamOptions) -> RuntimeResult<Self> {
        let trace = Trace::new(options.trace);
        Self::with_trace(module, options, trace)
    }

    /// Builds the facade with an explicit trace, ignoring `options.trace`.
    pub fn with_trace(module: M, options: AmalgamOptions, trace: Trace) -> RuntimeResult<Self> {
        let amalgam = Self {
            runtime: NativeRuntime::new(module),
            options,
            trace,
        };
        amalgam.set_sbf_datastore_enabled(amalgam.options.sbf_datastore_enabled)?;
        Ok(amalgam)
    }

    pub fn options(&self) -> &AmalgamOptions {
        &self.options
    }

    pub fn runtime(&self) -> &NativeRuntime<M> {
        &self.runtime
    }

    pub fn module(&self) -> &M {
        self.runtime.module()
    }

    /// Traces `command`, runs `call`, then traces its reply or error.
    fn traced<T, F>(&self, command: TraceCommand, parts: Vec<Value>, call: F) -> RuntimeResult<T>
    where
        T: Serialize,
        F: FnOnce(&NativeRuntime<M>) -> RuntimeResult<T>,
    {
        self.trace.log_command(command, parts);
        match call(&self.runtime) {
            Ok(value) => {
                self.trace.log_reply(&value);
                Ok(value)
            }
            Err(e) => {
                debug!(command = %command, error = %e, "Operation failed");
                self.trace.log_error(&e);
                Err(e)
            }
        }
    }

    pub fn load_entity(&self, params: &LoadEntityParams) -> RuntimeResult<EntityStatus> {
        self.traced(
            TraceCommand::LoadEntity,
            vec![
                json!(params.handle),
                json!(params.path),
                json!(params.file_type),
                json!(params.persistent),
                json!(params.json_file_params),
                json!(params.write_log),
                json!(params.print_log),
                json!(params.entity_path),
            ],
            |rt| rt.load_entity(params),
        )
    }

    pub fn verify_entity(&self, path: &str) -> RuntimeResult<EntityStatus> {
        self.traced(TraceCommand::VerifyEntity, vec![json!(path)], |rt| rt.verify_entity(path))
    }

    pub fn clone_entity(&self, params: &CloneEntityParams) -> RuntimeResult<bool> {
        self.traced(
            TraceCommand::CloneEntity,
            vec![
                json!(params.handle),
                json!(params.clone_handle),
                json!(params.path),
                json!(params.file_type),
                json!(params.persistent),
                json!(params.json_file_params),
                json!(params.write_log),
                json!(params.print_log),
            ],
            |rt| rt.clone_entity(params),
        )
    }

    pub fn store_entity(&self, params: &StoreEntityParams) -> RuntimeResult<()> {
        self.traced(
            TraceCommand::StoreEntity,
            vec![
                json!(params.handle),
                json!(params.path),
                json!(params.file_type),
                json!(params.persistent),
                json!(params.json_file_params),
                json!(params.entity_path),
            ],
            |rt| rt.store_entity(params),
        )
    }

    pub fn execute_entity(&self, handle: &str, label: &str) -> RuntimeResult<()> {
        self.traced(
            TraceCommand::ExecuteEntity,
            vec![json!(handle), json!(label)],
            |rt| rt.execute_entity(handle, label),
        )
    }

    /// Executes `label` with `data` as its JSON input and decodes the core
    /// response.
    ///
    /// `Ok(None)` means the core produced no output at all. Errors reported
    /// by the core are returned as data inside the response, not as `Err`.
    pub fn execute_entity_json<D: Serialize + ?Sized>(
        &self,
        handle: &str,
        label: &str,
        data: Option<&D>,
    ) -> RuntimeResult<Option<CoreResponse>> {
        let payload = serde_json::to_string(&data)?;
        self.execute_json(handle, label, &payload, |raw| decode_core_response(&raw))
    }

    /// Executes `label` with an already-encoded payload and returns the raw
    /// core output.
    pub fn execute_entity_json_raw(&self, handle: &str, label: &str, payload: &str) -> RuntimeResult<String> {
        self.execute_json(handle, label, payload, Ok)
    }

    /// Runs the execution between time markers, then traces the value
    /// produced by `decode`.
    fn execute_json<T, F>(&self, handle: &str, label: &str, payload: &str, decode: F) -> RuntimeResult<T>
    where
        T: Serialize,
        F: FnOnce(String) -> RuntimeResult<T>,
    {
        self.trace.log_time("EXECUTION START");
        self.trace.log_command(
            TraceCommand::ExecuteEntityJson,
            [json!(handle), json!(label), json!(payload)],
        );
        let raw = self.runtime.execute_entity_json(handle, label, payload);
        self.trace.log_time("EXECUTION STOP");
        match raw.and_then(decode) {
            Ok(value) => {
                self.trace.log_reply(&value);
                Ok(value)
            }
            Err(e) => {
                self.trace.log_error(&e);
                Err(e)
            }
        }
    }

    pub fn destroy_entity(&self, handle: &str) -> RuntimeResult<()> {
        self.traced(TraceCommand::DestroyEntity, vec![json!(handle)], |rt| {
            rt.destroy_entity(handle)
        })
    }

    pub fn get_entities(&self) -> RuntimeResult<Vec<String>> {
        self.traced(TraceCommand::GetEntities, Vec::new(), |rt| rt.get_entities())
    }

    pub fn set_random_seed(&self, handle: &str, seed: &str) -> RuntimeResult<bool> {
        self.traced(
            TraceCommand::SetRandomSeed,
            vec![json!(handle), json!(seed)],
            |rt| rt.set_random_seed(handle, seed),
        )
    }

    /// Stores `data` under `label`; `None` stores JSON `null`.
    pub fn set_json_to_label<D: Serialize + ?Sized>(
        &self,
        handle: &str,
        label: &str,
        data: Option<&D>,
    ) -> RuntimeResult<()> {
        let payload = serde_json::to_string(&data)?;
        self.traced(
            TraceCommand::SetJsonToLabel,
            vec![json!(handle), json!(label), json!(payload)],
            |rt| rt.set_json_to_label(handle, label, &payload),
        )
    }

    /// Reads the value of `label`; `None` when the core returns nothing.
    pub fn get_json_from_label(&self, handle: &str, label: &str) -> RuntimeResult<Option<Value>> {
        self.traced(
            TraceCommand::GetJsonFromLabel,
            vec![json!(handle), json!(label)],
            |rt| {
                let raw = rt.get_json_from_label(handle, label)?;
                if raw.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_str(&raw)?))
            },
        )
    }

    pub fn set_sbf_datastore_enabled(&self, enabled: bool) -> RuntimeResult<()> {
        self.traced(TraceCommand::SetSbfDatastoreEnabled, vec![json!(enabled)], |rt| {
            rt.set_sbf_datastore_enabled(enabled)
        })
    }

    pub fn is_sbf_datastore_enabled(&self) -> RuntimeResult<bool> {
        self.traced(TraceCommand::IsSbfDatastoreEnabled, Vec::new(), |rt| {
            rt.is_sbf_datastore_enabled()
        })
    }

    pub fn set_max_num_threads(&self, threads: u64) -> RuntimeResult<()> {
        self.traced(TraceCommand::SetMaxNumThreads, vec![json!(threads)], |rt| {
            rt.set_max_num_threads(threads)
        })
    }

    pub fn get_max_num_threads(&self) -> RuntimeResult<u64> {
        self.traced(TraceCommand::GetMaxNumThreads, Vec::new(), |rt| rt.get_max_num_threads())
    }

    pub fn set_entity_permissions(&self, handle: &str, permissions: &EntityPermissions) -> RuntimeResult<bool> {
        let encoded = serde_json::to_string(permissions)?;
        self.traced(
            TraceCommand::SetEntityPermissions,
            vec![json!(handle), json!(encoded)],
            |rt| rt.set_entity_permissions(handle, &encoded),
        )
    }

    /// Permissions of `handle`; nothing granted when the core returns nothing.
    pub fn get_entity_permissions(&self, handle: &str) -> RuntimeResult<EntityPermissions> {
        self.traced(TraceCommand::GetEntityPermissions, vec![json!(handle)], |rt| {
            let raw = rt.get_entity_permissions(handle)?;
            if raw.trim().is_empty() {
                return Ok(EntityPermissions::none());
            }
            Ok(serde_json::from_str(&raw)?)
        })
    }

    pub fn get_version(&self) -> RuntimeResult<String> {
        self.traced(TraceCommand::Version, Vec::new(), |rt| rt.get_version())
    }

    pub fn get_concurrency_type(&self) -> RuntimeResult<String> {
        self.traced(TraceCommand::ConcurrencyType, Vec::new(), |rt| rt.get_concurrency_type())
    }
}

/// Decodes the raw output of a JSON-carrying core call.
///
/// - empty output: `Ok(None)`
/// - object: `payload` becomes the content; `warnings` are always decoded;
///   unless `status` is `"ok"`, `errors` are decoded too, with a generic
///   error synthesized when the core lists none
/// - bare string, number or boolean: the value itself is the content
/// - anything else: [`RuntimeError::MalformedResponse`]
pub fn decode_core_response(raw: &str) -> RuntimeResult<Option<CoreResponse>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Object(object) => {
            let content = object.get("payload").filter(|v| !v.is_null()).cloned();
            let warnings = CoreMessage::from_array(object.get("warnings"));
            let errors = if object.get("status").and_then(Value::as_str) == Some("ok") {
                Vec::new()
            } else {
                let errors = CoreMessage::from_array(object.get("errors"));
                if errors.is_empty() {
                    vec![CoreMessage::new(UNKNOWN_CORE_ERROR, None)]
                } else {
                    errors
                }
            };
            Ok(Some(CoreResponse {
                content,
                errors,
                warnings,
            }))
        }
        scalar @ (Value::String(_) | Value::Number(_) | Value::Bool(_)) => {
            Ok(Some(CoreResponse::content(scalar)))
        }
        Value::Array(_) | Value::Null => Err(RuntimeError::MalformedResponse),
    }
}
