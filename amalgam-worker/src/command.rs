//! Command names and positional parameter decoding.

use crate::error::{ServiceError, ServiceResult};
use amalgam_runtime::{Amalgam, AmalgamOptions, CloneEntityParams, LoadEntityParams, NativeModule, StoreEntityParams};
use amalgam_types::EntityPermissions;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;

/// A request command, classified once at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Initialize,
    Operation(OperationKind),
    Other(String),
}

impl Command {
    pub const INITIALIZE: &'static str = "initialize";

    pub fn parse(name: &str) -> Self {
        if name == Self::INITIALIZE {
            return Self::Initialize;
        }
        match OperationKind::parse(name) {
            Some(kind) => Self::Operation(kind),
            None => Self::Other(name.to_string()),
        }
    }
}

/// The allow-listed facade operations reachable over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    LoadEntity,
    VerifyEntity,
    CloneEntity,
    StoreEntity,
    ExecuteEntity,
    ExecuteEntityJson,
    DestroyEntity,
    GetEntities,
    SetRandomSeed,
    SetJsonToLabel,
    GetJsonFromLabel,
    SetSbfDatastoreEnabled,
    IsSbfDatastoreEnabled,
    SetMaxNumThreads,
    GetMaxNumThreads,
    SetEntityPermissions,
    GetEntityPermissions,
    GetVersion,
    GetConcurrencyType,
}

impl OperationKind {
    pub const ALL: [OperationKind; 19] = [
        Self::LoadEntity,
        Self::VerifyEntity,
        Self::CloneEntity,
        Self::StoreEntity,
        Self::ExecuteEntity,
        Self::ExecuteEntityJson,
        Self::DestroyEntity,
        Self::GetEntities,
        Self::SetRandomSeed,
        Self::SetJsonToLabel,
        Self::GetJsonFromLabel,
        Self::SetSbfDatastoreEnabled,
        Self::IsSbfDatastoreEnabled,
        Self::SetMaxNumThreads,
        Self::GetMaxNumThreads,
        Self::SetEntityPermissions,
        Self::GetEntityPermissions,
        Self::GetVersion,
        Self::GetConcurrencyType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadEntity => "loadEntity",
            Self::VerifyEntity => "verifyEntity",
            Self::CloneEntity => "cloneEntity",
            Self::StoreEntity => "storeEntity",
            Self::ExecuteEntity => "executeEntity",
            Self::ExecuteEntityJson => "executeEntityJson",
            Self::DestroyEntity => "destroyEntity",
            Self::GetEntities => "getEntities",
            Self::SetRandomSeed => "setRandomSeed",
            Self::SetJsonToLabel => "setJsonToLabel",
            Self::GetJsonFromLabel => "getJsonFromLabel",
            Self::SetSbfDatastoreEnabled => "setSBFDatastoreEnabled",
            Self::IsSbfDatastoreEnabled => "isSBFDatastoreEnabled",
            Self::SetMaxNumThreads => "setMaxNumThreads",
            Self::GetMaxNumThreads => "getMaxNumThreads",
            Self::SetEntityPermissions => "setEntityPermissions",
            Self::GetEntityPermissions => "getEntityPermissions",
            Self::GetVersion => "getVersion",
            Self::GetConcurrencyType => "getConcurrencyType",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cursor over a request's positional parameters.
///
/// Missing and `null` entries are the same thing: optional slots fall back
/// to their default, required slots fail with `InvalidParameters`. Extra
/// trailing parameters are ignored.
pub struct Params<'a> {
    command: &'a str,
    values: &'a [Value],
    index: usize,
}

impl<'a> Params<'a> {
    pub fn new(command: &'a str, values: &'a [Value]) -> Self {
        Self {
            command,
            values,
            index: 0,
        }
    }

    fn next_value(&mut self) -> Option<&'a Value> {
        let value = self.values.get(self.index);
        self.index += 1;
        value.filter(|v| !v.is_null())
    }

    fn invalid(&self, name: &str, detail: impl fmt::Display) -> ServiceError {
        ServiceError::InvalidParameters {
            command: self.command.to_string(),
            detail: format!("parameter {} ({name}): {detail}", self.index),
        }
    }

    pub fn required<T: DeserializeOwned>(&mut self, name: &str) -> ServiceResult<T> {
        match self.next_value() {
            Some(value) => T::deserialize(value).map_err(|e| self.invalid(name, e)),
            None => Err(self.invalid(name, "missing")),
        }
    }

    pub fn optional<T: DeserializeOwned>(&mut self, name: &str) -> ServiceResult<Option<T>> {
        match self.next_value() {
            Some(value) => T::deserialize(value).map(Some).map_err(|e| self.invalid(name, e)),
            None => Ok(None),
        }
    }

    pub fn or_default<T: DeserializeOwned + Default>(&mut self, name: &str) -> ServiceResult<T> {
        Ok(self.optional(name)?.unwrap_or_default())
    }

    /// Takes the slot as raw JSON, for payloads forwarded untouched.
    pub fn raw(&mut self) -> Option<Value> {
        self.next_value().cloned()
    }
}

/// A decoded operation with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    LoadEntity(LoadEntityParams),
    VerifyEntity { path: String },
    CloneEntity(CloneEntityParams),
    StoreEntity(StoreEntityParams),
    ExecuteEntity { handle: String, label: String },
    ExecuteEntityJson { handle: String, label: String, data: Option<Value> },
    DestroyEntity { handle: String },
    GetEntities,
    SetRandomSeed { handle: String, seed: String },
    SetJsonToLabel { handle: String, label: String, data: Option<Value> },
    GetJsonFromLabel { handle: String, label: String },
    SetSbfDatastoreEnabled { enabled: bool },
    IsSbfDatastoreEnabled,
    SetMaxNumThreads { threads: u64 },
    GetMaxNumThreads,
    SetEntityPermissions { handle: String, permissions: EntityPermissions },
    GetEntityPermissions { handle: String },
    GetVersion,
    GetConcurrencyType,
}

impl Operation {
    pub fn decode(kind: OperationKind, values: &[Value]) -> ServiceResult<Self> {
        let mut p = Params::new(kind.as_str(), values);
        Ok(match kind {
            OperationKind::LoadEntity => Self::LoadEntity(LoadEntityParams {
                handle: p.required("handle")?,
                path: p.required("path")?,
                file_type: p.or_default("fileType")?,
                persistent: p.or_default("persistent")?,
                json_file_params: p.or_default("jsonFileParams")?,
                write_log: p.or_default("writeLog")?,
                print_log: p.or_default("printLog")?,
                entity_path: p.optional("entityPath")?,
            }),
            OperationKind::VerifyEntity => Self::VerifyEntity {
                path: p.required("path")?,
            },
            OperationKind::CloneEntity => Self::CloneEntity(CloneEntityParams {
                handle: p.required("handle")?,
                clone_handle: p.required("cloneHandle")?,
                path: p.or_default("path")?,
                file_type: p.or_default("fileType")?,
                persistent: p.or_default("persistent")?,
                json_file_params: p.or_default("jsonFileParams")?,
                write_log: p.or_default("writeLog")?,
                print_log: p.or_default("printLog")?,
            }),
            OperationKind::StoreEntity => Self::StoreEntity(StoreEntityParams {
                handle: p.required("handle")?,
                path: p.required("path")?,
                file_type: p.or_default("fileType")?,
                persistent: p.or_default("persistent")?,
                json_file_params: p.or_default("jsonFileParams")?,
                entity_path: p.optional("entityPath")?,
            }),
            OperationKind::ExecuteEntity => Self::ExecuteEntity {
                handle: p.required("handle")?,
                label: p.required("label")?,
            },
            OperationKind::ExecuteEntityJson => Self::ExecuteEntityJson {
                handle: p.required("handle")?,
                label: p.required("label")?,
                data: p.raw(),
            },
            OperationKind::DestroyEntity => Self::DestroyEntity {
                handle: p.required("handle")?,
            },
            OperationKind::GetEntities => Self::GetEntities,
            OperationKind::SetRandomSeed => Self::SetRandomSeed {
                handle: p.required("handle")?,
                seed: p.required("seed")?,
            },
            OperationKind::SetJsonToLabel => Self::SetJsonToLabel {
                handle: p.required("handle")?,
                label: p.required("label")?,
                data: p.raw(),
            },
            OperationKind::GetJsonFromLabel => Self::GetJsonFromLabel {
                handle: p.required("handle")?,
                label: p.required("label")?,
            },
            OperationKind::SetSbfDatastoreEnabled => Self::SetSbfDatastoreEnabled {
                enabled: p.required("enabled")?,
            },
            OperationKind::IsSbfDatastoreEnabled => Self::IsSbfDatastoreEnabled,
            OperationKind::SetMaxNumThreads => Self::SetMaxNumThreads {
                threads: p.required("threads")?,
            },
            OperationKind::GetMaxNumThreads => Self::GetMaxNumThreads,
            OperationKind::SetEntityPermissions => Self::SetEntityPermissions {
                handle: p.required("handle")?,
                permissions: p.required("permissions")?,
            },
            OperationKind::GetEntityPermissions => Self::GetEntityPermissions {
                handle: p.required("handle")?,
            },
            OperationKind::GetVersion => Self::GetVersion,
            OperationKind::GetConcurrencyType => Self::GetConcurrencyType,
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::LoadEntity(_) => OperationKind::LoadEntity,
            Self::VerifyEntity { .. } => OperationKind::VerifyEntity,
            Self::CloneEntity(_) => OperationKind::CloneEntity,
            Self::StoreEntity(_) => OperationKind::StoreEntity,
            Self::ExecuteEntity { .. } => OperationKind::ExecuteEntity,
            Self::ExecuteEntityJson { .. } => OperationKind::ExecuteEntityJson,
            Self::DestroyEntity { .. } => OperationKind::DestroyEntity,
            Self::GetEntities => OperationKind::GetEntities,
            Self::SetRandomSeed { .. } => OperationKind::SetRandomSeed,
            Self::SetJsonToLabel { .. } => OperationKind::SetJsonToLabel,
            Self::GetJsonFromLabel { .. } => OperationKind::GetJsonFromLabel,
            Self::SetSbfDatastoreEnabled { .. } => OperationKind::SetSbfDatastoreEnabled,
            Self::IsSbfDatastoreEnabled => OperationKind::IsSbfDatastoreEnabled,
            Self::SetMaxNumThreads { .. } => OperationKind::SetMaxNumThreads,
            Self::GetMaxNumThreads => OperationKind::GetMaxNumThreads,
            Self::SetEntityPermissions { .. } => OperationKind::SetEntityPermissions,
            Self::GetEntityPermissions { .. } => OperationKind::GetEntityPermissions,
            Self::GetVersion => OperationKind::GetVersion,
            Self::GetConcurrencyType => OperationKind::GetConcurrencyType,
        }
    }

    /// Encodes the arguments in the positional order `decode` reads them.
    pub fn to_parameters(&self) -> Vec<Value> {
        match self {
            Self::LoadEntity(p) => vec![
                json!(p.handle),
                json!(p.path),
                json!(p.file_type),
                json!(p.persistent),
                json!(p.json_file_params),
                json!(p.write_log),
                json!(p.print_log),
                json!(p.entity_path),
            ],
            Self::VerifyEntity { path } => vec![json!(path)],
            Self::CloneEntity(p) => vec![
                json!(p.handle),
                json!(p.clone_handle),
                json!(p.path),
                json!(p.file_type),
                json!(p.persistent),
                json!(p.json_file_params),
                json!(p.write_log),
                json!(p.print_log),
            ],
            Self::StoreEntity(p) => vec![
                json!(p.handle),
                json!(p.path),
                json!(p.file_type),
                json!(p.persistent),
                json!(p.json_file_params),
                json!(p.entity_path),
            ],
            Self::ExecuteEntity { handle, label } | Self::GetJsonFromLabel { handle, label } => {
                vec![json!(handle), json!(label)]
            }
            Self::ExecuteEntityJson { handle, label, data } | Self::SetJsonToLabel { handle, label, data } => {
                vec![json!(handle), json!(label), data.clone().unwrap_or(Value::Null)]
            }
            Self::DestroyEntity { handle } | Self::GetEntityPermissions { handle } => vec![json!(handle)],
            Self::SetRandomSeed { handle, seed } => vec![json!(handle), json!(seed)],
            Self::SetSbfDatastoreEnabled { enabled } => vec![json!(enabled)],
            Self::SetMaxNumThreads { threads } => vec![json!(threads)],
            Self::SetEntityPermissions { handle, permissions } => vec![json!(handle), json!(permissions)],
            Self::GetEntities
            | Self::IsSbfDatastoreEnabled
            | Self::GetMaxNumThreads
            | Self::GetVersion
            | Self::GetConcurrencyType => Vec::new(),
        }
    }

    /// Runs the operation against `amalgam`.
    ///
    /// Unit operations produce no body. Everything else is serialized as
    /// the response body.
    pub fn invoke<M: NativeModule>(&self, amalgam: &Amalgam<M>) -> ServiceResult<Option<Value>> {
        match self {
            Self::LoadEntity(params) => body(amalgam.load_entity(params)?),
            Self::VerifyEntity { path } => body(amalgam.verify_entity(path)?),
            Self::CloneEntity(params) => body(amalgam.clone_entity(params)?),
            Self::StoreEntity(params) => unit(amalgam.store_entity(params)?),
            Self::ExecuteEntity { handle, label } => unit(amalgam.execute_entity(handle, label)?),
            Self::ExecuteEntityJson { handle, label, data } => {
                optional(amalgam.execute_entity_json(handle, label, data.as_ref())?)
            }
            Self::DestroyEntity { handle } => unit(amalgam.destroy_entity(handle)?),
            Self::GetEntities => body(amalgam.get_entities()?),
            Self::SetRandomSeed { handle, seed } => body(amalgam.set_random_seed(handle, seed)?),
            Self::SetJsonToLabel { handle, label, data } => {
                unit(amalgam.set_json_to_label(handle, label, data.as_ref())?)
            }
            Self::GetJsonFromLabel { handle, label } => Ok(amalgam.get_json_from_label(handle, label)?),
            Self::SetSbfDatastoreEnabled { enabled } => unit(amalgam.set_sbf_datastore_enabled(*enabled)?),
            Self::IsSbfDatastoreEnabled => body(amalgam.is_sbf_datastore_enabled()?),
            Self::SetMaxNumThreads { threads } => unit(amalgam.set_max_num_threads(*threads)?),
            Self::GetMaxNumThreads => body(amalgam.get_max_num_threads()?),
            Self::SetEntityPermissions { handle, permissions } => {
                body(amalgam.set_entity_permissions(handle, permissions)?)
            }
            Self::GetEntityPermissions { handle } => body(amalgam.get_entity_permissions(handle)?),
            Self::GetVersion => body(amalgam.get_version()?),
            Self::GetConcurrencyType => body(amalgam.get_concurrency_type()?),
        }
    }
}

fn body<T: Serialize>(value: T) -> ServiceResult<Option<Value>> {
    Ok(Some(serde_json::to_value(value)?))
}

fn optional<T: Serialize>(value: Option<T>) -> ServiceResult<Option<Value>> {
    value.map(serde_json::to_value).transpose().map_err(ServiceError::from)
}

fn unit(_: ()) -> ServiceResult<Option<Value>> {
    Ok(None)
}

/// Decodes the optional `initialize` argument.
pub fn decode_initialize(values: &[Value]) -> ServiceResult<AmalgamOptions> {
    Params::new(Command::INITIALIZE, values).or_default("options")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(Command::parse(kind.as_str()), Command::Operation(kind));
        }
        assert_eq!(Command::parse("initialize"), Command::Initialize);
        assert_eq!(Command::parse("readFile"), Command::Other("readFile".into()));
    }

    #[test]
    fn optional_slots_take_defaults() {
        let op = Operation::decode(OperationKind::LoadEntity, &[json!("h"), json!("m.caml")]).unwrap();
        assert_eq!(op, Operation::LoadEntity(LoadEntityParams::new("h", "m.caml")));

        let op = Operation::decode(
            OperationKind::LoadEntity,
            &[json!("h"), json!("m.caml"), Value::Null, json!(true)],
        )
        .unwrap();
        assert_eq!(op, Operation::LoadEntity(LoadEntityParams::new("h", "m.caml").persistent(true)));
    }

    #[test]
    fn missing_required_slot_is_invalid_parameters() {
        let err = Operation::decode(OperationKind::SetRandomSeed, &[json!("h")]).unwrap_err();
        match err {
            ServiceError::InvalidParameters { command, detail } => {
                assert_eq!(command, "setRandomSeed");
                assert!(detail.contains("seed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_invalid_parameters() {
        let err = Operation::decode(OperationKind::SetMaxNumThreads, &[json!("four")]).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameters { .. }));
    }

    #[test]
    fn parameters_encode_in_decode_order() {
        let ops = [
            Operation::LoadEntity(LoadEntityParams::new("h", "p").entity_path(vec!["a".into()])),
            Operation::CloneEntity(CloneEntityParams::new("h", "c").path("out.caml")),
            Operation::StoreEntity(StoreEntityParams::new("h", "p").persistent(true)),
            Operation::ExecuteEntityJson {
                handle: "h".into(),
                label: "l".into(),
                data: Some(json!({"x": 1})),
            },
            Operation::SetEntityPermissions {
                handle: "h".into(),
                permissions: EntityPermissions::all(),
            },
            Operation::SetMaxNumThreads { threads: 8 },
        ];
        for op in ops {
            let decoded = Operation::decode(op.kind(), &op.to_parameters()).unwrap();
            assert_eq!(decoded, op);
        }
    }

    #[test]
    fn initialize_options_are_optional() {
        assert_eq!(decode_initialize(&[]).unwrap(), AmalgamOptions::default());
        let options = decode_initialize(&[json!({"trace": true})]).unwrap();
        assert!(options.trace);
        assert!(options.sbf_datastore_enabled);
    }
}
