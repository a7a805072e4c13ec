//! The raw binding table.
//!
//! Every native symbol the client calls is declared here once, with its
//! ordered parameter kinds and return kind. Backends resolve entry points by
//! [`EntryPoint::symbol`]; [`NativeRuntime`](crate::NativeRuntime) checks
//! arguments against [`EntryPoint::params`] before every call.

use crate::error::{RuntimeError, RuntimeResult};
use amalgam_marshal::{NativeMemory, NativePtr};
use std::fmt;

/// Kind of a value crossing the native boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 64-bit address into native memory.
    Ptr,
    /// C `bool` (a 32-bit integer at the wasm boundary).
    Bool,
    /// 64-bit `size_t`.
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeValue {
    Ptr(NativePtr),
    Bool(bool),
    Size(u64),
}

impl NativeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Ptr(_) => ValueKind::Ptr,
            Self::Bool(_) => ValueKind::Bool,
            Self::Size(_) => ValueKind::Size,
        }
    }

    pub fn as_ptr(&self) -> Option<NativePtr> {
        match self {
            Self::Ptr(ptr) => Some(*ptr),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_size(&self) -> Option<u64> {
        match self {
            Self::Size(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryPoint {
    LoadEntity,
    VerifyEntity,
    CloneEntity,
    StoreEntity,
    ExecuteEntity,
    ExecuteEntityJsonPtr,
    DestroyEntity,
    GetEntities,
    SetRandomSeed,
    SetJsonToLabel,
    GetJsonPtrFromLabel,
    SetSbfDataStoreEnabled,
    IsSbfDataStoreEnabled,
    SetMaxNumThreads,
    GetMaxNumThreads,
    SetEntityPermissions,
    GetEntityPermissions,
    GetVersionString,
    GetConcurrencyTypeString,
}

use ValueKind::{Bool, Ptr, Size};

impl EntryPoint {
    pub const ALL: [EntryPoint; 19] = [
        Self::LoadEntity,
        Self::VerifyEntity,
        Self::CloneEntity,
        Self::StoreEntity,
        Self::ExecuteEntity,
        Self::ExecuteEntityJsonPtr,
        Self::DestroyEntity,
        Self::GetEntities,
        Self::SetRandomSeed,
        Self::SetJsonToLabel,
        Self::GetJsonPtrFromLabel,
        Self::SetSbfDataStoreEnabled,
        Self::IsSbfDataStoreEnabled,
        Self::SetMaxNumThreads,
        Self::GetMaxNumThreads,
        Self::SetEntityPermissions,
        Self::GetEntityPermissions,
        Self::GetVersionString,
        Self::GetConcurrencyTypeString,
    ];

    /// Exported symbol name.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::LoadEntity => "LoadEntity",
            Self::VerifyEntity => "VerifyEntity",
            Self::CloneEntity => "CloneEntity",
            Self::StoreEntity => "StoreEntity",
            Self::ExecuteEntity => "ExecuteEntity",
            Self::ExecuteEntityJsonPtr => "ExecuteEntityJsonPtr",
            Self::DestroyEntity => "DestroyEntity",
            Self::GetEntities => "GetEntities",
            Self::SetRandomSeed => "SetRandomSeed",
            Self::SetJsonToLabel => "SetJSONToLabel",
            Self::GetJsonPtrFromLabel => "GetJSONPtrFromLabel",
            Self::SetSbfDataStoreEnabled => "SetSBFDataStoreEnabled",
            Self::IsSbfDataStoreEnabled => "IsSBFDataStoreEnabled",
            Self::SetMaxNumThreads => "SetMaxNumThreads",
            Self::GetMaxNumThreads => "GetMaxNumThreads",
            Self::SetEntityPermissions => "SetEntityPermissions",
            Self::GetEntityPermissions => "GetEntityPermissions",
            Self::GetVersionString => "GetVersionString",
            Self::GetConcurrencyTypeString => "GetConcurrencyTypeString",
        }
    }

    /// Ordered parameter kinds.
    pub fn params(self) -> &'static [ValueKind] {
        match self {
            // out, handle, path, file_type, persistent, json_file_params,
            // write_log, print_log, entity_path, entity_path_len
            Self::LoadEntity => &[Ptr, Ptr, Ptr, Ptr, Bool, Ptr, Ptr, Ptr, Ptr, Size],
            Self::VerifyEntity => &[Ptr, Ptr],
            // handle, clone_handle, path, file_type, persistent,
            // json_file_params, write_log, print_log
            Self::CloneEntity => &[Ptr, Ptr, Ptr, Ptr, Bool, Ptr, Ptr, Ptr],
            // handle, path, file_type, persistent, json_file_params,
            // entity_path, entity_path_len
            Self::StoreEntity => &[Ptr, Ptr, Ptr, Bool, Ptr, Ptr, Size],
            Self::ExecuteEntity => &[Ptr, Ptr],
            Self::ExecuteEntityJsonPtr => &[Ptr, Ptr, Ptr],
            Self::DestroyEntity => &[Ptr],
            Self::GetEntities => &[Ptr],
            Self::SetRandomSeed => &[Ptr, Ptr],
            Self::SetJsonToLabel => &[Ptr, Ptr, Ptr],
            Self::GetJsonPtrFromLabel => &[Ptr, Ptr],
            Self::SetSbfDataStoreEnabled => &[Bool],
            Self::IsSbfDataStoreEnabled => &[],
            Self::SetMaxNumThreads => &[Size],
            Self::GetMaxNumThreads => &[],
            Self::SetEntityPermissions => &[Ptr, Ptr],
            Self::GetEntityPermissions => &[Ptr],
            Self::GetVersionString => &[],
            Self::GetConcurrencyTypeString => &[],
        }
    }

    /// Return kind, `None` for `void`.
    pub fn returns(self) -> Option<ValueKind> {
        match self {
            Self::LoadEntity
            | Self::VerifyEntity
            | Self::StoreEntity
            | Self::ExecuteEntity
            | Self::DestroyEntity
            | Self::SetJsonToLabel
            | Self::SetSbfDataStoreEnabled
            | Self::SetMaxNumThreads => None,
            Self::CloneEntity
            | Self::SetRandomSeed
            | Self::IsSbfDataStoreEnabled
            | Self::SetEntityPermissions => Some(Bool),
            Self::GetMaxNumThreads => Some(Size),
            Self::ExecuteEntityJsonPtr
            | Self::GetEntities
            | Self::GetJsonPtrFromLabel
            | Self::GetEntityPermissions
            | Self::GetVersionString
            | Self::GetConcurrencyTypeString => Some(Ptr),
        }
    }

    /// Fails unless `args` match [`params`](Self::params) exactly.
    pub fn check_args(self, args: &[NativeValue]) -> RuntimeResult<()> {
        let expected = self.params();
        if args.len() != expected.len() {
            return Err(RuntimeError::Signature {
                entry: self.symbol(),
                detail: format!("expected {} arguments, got {}", expected.len(), args.len()),
            });
        }
        for (index, (arg, kind)) in args.iter().zip(expected).enumerate() {
            if arg.kind() != *kind {
                return Err(RuntimeError::Signature {
                    entry: self.symbol(),
                    detail: format!("argument {index} is {:?}, expected {kind:?}", arg.kind()),
                });
            }
        }
        Ok(())
    }

    /// Fails unless `value` matches [`returns`](Self::returns).
    pub fn check_return(self, value: Option<NativeValue>) -> RuntimeResult<Option<NativeValue>> {
        let actual = value.as_ref().map(NativeValue::kind);
        if actual != self.returns() {
            return Err(RuntimeError::Signature {
                entry: self.symbol(),
                detail: format!("returned {actual:?}, expected {:?}", self.returns()),
            });
        }
        Ok(value)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A loaded native module: its linear memory plus the binding table.
///
/// Calls are synchronous and take `&self`; at most one is in flight per
/// module. Pointer ownership follows the native contract of each entry
/// point: string returns are owned by the caller, arguments stay owned by
/// the caller.
pub trait NativeModule: NativeMemory {
    fn call(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>>;
}

impl<M: NativeModule + ?Sized> NativeModule for &M {
    fn call(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        (**self).call(entry, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn symbols_are_unique() {
        let symbols: HashSet<_> = EntryPoint::ALL.iter().map(|e| e.symbol()).collect();
        assert_eq!(symbols.len(), EntryPoint::ALL.len());
    }

    #[test]
    fn load_entity_signature() {
        let params = EntryPoint::LoadEntity.params();
        assert_eq!(params.len(), 10);
        assert_eq!(params[4], ValueKind::Bool);
        assert_eq!(params[9], ValueKind::Size);
        assert_eq!(EntryPoint::LoadEntity.returns(), None);
    }

    #[test]
    fn check_args_rejects_wrong_kind() {
        let err = EntryPoint::SetMaxNumThreads
            .check_args(&[NativeValue::Bool(true)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Signature { entry: "SetMaxNumThreads", .. }));
    }

    #[test]
    fn check_args_rejects_wrong_arity() {
        assert!(EntryPoint::GetVersionString
            .check_args(&[NativeValue::Size(1)])
            .is_err());
        assert!(EntryPoint::GetVersionString.check_args(&[]).is_ok());
    }

    #[test]
    fn check_return_rejects_unexpected_value() {
        assert!(EntryPoint::DestroyEntity
            .check_return(Some(NativeValue::Bool(true)))
            .is_err());
        assert!(EntryPoint::GetMaxNumThreads
            .check_return(Some(NativeValue::Size(4)))
            .is_ok());
    }
}
