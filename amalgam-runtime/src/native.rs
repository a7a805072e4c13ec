//! Marshaled adapter over a [`NativeModule`].
//!
//! Each method converts host values into native memory, makes exactly one
//! native call, decodes the result, and releases every allocation it made
//! (and every pointer the native side handed over) before returning. All
//! allocations are held by guards, so a failed call leaks nothing either.

use crate::binding::{EntryPoint, NativeModule, NativeValue};
use crate::error::{RuntimeError, RuntimeResult};
use crate::params::{CloneEntityParams, LoadEntityParams, StoreEntityParams};
use amalgam_marshal::{
    CharPtrArray, NativeBuffer, NativeMemory, NativePtr, NativeString, SIZE_SLOT_BYTES,
    StatusLayout, decode_status, decode_string_array, pointer_to_string,
};
use amalgam_types::EntityStatus;
use tracing::trace;

use NativeValue::{Bool, Ptr, Size};

pub struct NativeRuntime<M: NativeModule> {
    module: M,
}

impl<M: NativeModule> NativeRuntime<M> {
    pub fn new(module: M) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn into_module(self) -> M {
        self.module
    }

    fn invoke(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        entry.check_args(args)?;
        trace!(entry = entry.symbol(), args = args.len(), "Native call");
        let value = self.module.call(entry, args)?;
        entry.check_return(value)
    }

    fn invoke_void(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<()> {
        self.invoke(entry, args).map(|_| ())
    }

    fn invoke_bool(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<bool> {
        self.invoke(entry, args)?
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing_return(entry))
    }

    fn invoke_size(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<u64> {
        self.invoke(entry, args)?
            .and_then(|v| v.as_size())
            .ok_or_else(|| missing_return(entry))
    }

    fn invoke_ptr(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<NativePtr> {
        self.invoke(entry, args)?
            .and_then(|v| v.as_ptr())
            .ok_or_else(|| missing_return(entry))
    }

    /// Calls an entry point returning a caller-owned string and frees it.
    fn invoke_string(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<String> {
        let ptr = self.invoke_ptr(entry, args)?;
        Ok(pointer_to_string(&self.module, ptr)?)
    }

    fn string(&self, value: &str) -> RuntimeResult<NativeString<'_, M>> {
        Ok(NativeString::new(&self.module, value)?)
    }

    pub fn load_entity(&self, params: &LoadEntityParams) -> RuntimeResult<EntityStatus> {
        let layout = StatusLayout::WITH_ENTITY_PATH;
        let status = NativeBuffer::alloc(&self.module, layout.size)?;
        let handle = self.string(&params.handle)?;
        let path = self.string(&params.path)?;
        let file_type = self.string(&params.file_type)?;
        let json_file_params = self.string(&params.json_file_params)?;
        let write_log = self.string(&params.write_log)?;
        let print_log = self.string(&params.print_log)?;
        let entity_path = CharPtrArray::alloc(&self.module, params.entity_path.as_deref())?;

        self.invoke_void(
            EntryPoint::LoadEntity,
            &[
                Ptr(status.ptr()),
                Ptr(handle.ptr()),
                Ptr(path.ptr()),
                Ptr(file_type.ptr()),
                Bool(params.persistent),
                Ptr(json_file_params.ptr()),
                Ptr(write_log.ptr()),
                Ptr(print_log.ptr()),
                Ptr(entity_path.base()),
                Size(entity_path.count()),
            ],
        )?;
        Ok(decode_status(&self.module, status.ptr(), layout)?)
    }

    pub fn verify_entity(&self, path: &str) -> RuntimeResult<EntityStatus> {
        let layout = StatusLayout::BASIC;
        let status = NativeBuffer::alloc(&self.module, layout.size)?;
        let path = self.string(path)?;
        self.invoke_void(EntryPoint::VerifyEntity, &[Ptr(status.ptr()), Ptr(path.ptr())])?;
        Ok(decode_status(&self.module, status.ptr(), layout)?)
    }

    pub fn clone_entity(&self, params: &CloneEntityParams) -> RuntimeResult<bool> {
        let handle = self.string(&params.handle)?;
        let clone_handle = self.string(&params.clone_handle)?;
        let path = self.string(&params.path)?;
        let file_type = self.string(&params.file_type)?;
        let json_file_params = self.string(&params.json_file_params)?;
        let write_log = self.string(&params.write_log)?;
        let print_log = self.string(&params.print_log)?;
        self.invoke_bool(
            EntryPoint::CloneEntity,
            &[
                Ptr(handle.ptr()),
                Ptr(clone_handle.ptr()),
                Ptr(path.ptr()),
                Ptr(file_type.ptr()),
                Bool(params.persistent),
                Ptr(json_file_params.ptr()),
                Ptr(write_log.ptr()),
                Ptr(print_log.ptr()),
            ],
        )
    }

    pub fn store_entity(&self, params: &StoreEntityParams) -> RuntimeResult<()> {
        let handle = self.string(&params.handle)?;
        let path = self.string(&params.path)?;
        let file_type = self.string(&params.file_type)?;
        let json_file_params = self.string(&params.json_file_params)?;
        let entity_path = CharPtrArray::alloc(&self.module, params.entity_path.as_deref())?;
        self.invoke_void(
            EntryPoint::StoreEntity,
            &[
                Ptr(handle.ptr()),
                Ptr(path.ptr()),
                Ptr(file_type.ptr()),
                Bool(params.persistent),
                Ptr(json_file_params.ptr()),
                Ptr(entity_path.base()),
                Size(entity_path.count()),
            ],
        )
    }

    pub fn execute_entity(&self, handle: &str, label: &str) -> RuntimeResult<()> {
        let handle = self.string(handle)?;
        let label = self.string(label)?;
        self.invoke_void(EntryPoint::ExecuteEntity, &[Ptr(handle.ptr()), Ptr(label.ptr())])
    }

    /// Raw JSON in, raw JSON out. A null result decodes to `""`.
    pub fn execute_entity_json(&self, handle: &str, label: &str, json: &str) -> RuntimeResult<String> {
        let handle = self.string(handle)?;
        let label = self.string(label)?;
        let json = self.string(json)?;
        self.invoke_string(
            EntryPoint::ExecuteEntityJsonPtr,
            &[Ptr(handle.ptr()), Ptr(label.ptr()), Ptr(json.ptr())],
        )
    }

    pub fn destroy_entity(&self, handle: &str) -> RuntimeResult<()> {
        let handle = self.string(handle)?;
        self.invoke_void(EntryPoint::DestroyEntity, &[Ptr(handle.ptr())])
    }

    pub fn get_entities(&self) -> RuntimeResult<Vec<String>> {
        let size = NativeBuffer::alloc(&self.module, SIZE_SLOT_BYTES)?;
        let base = self.invoke_ptr(EntryPoint::GetEntities, &[Ptr(size.ptr())])?;
        let count = match self.module.read_u64(size.ptr()) {
            Ok(count) => count,
            Err(e) => {
                self.module.free(base);
                return Err(e.into());
            }
        };
        Ok(decode_string_array(&self.module, base, count)?)
    }

    pub fn set_random_seed(&self, handle: &str, seed: &str) -> RuntimeResult<bool> {
        let handle = self.string(handle)?;
        let seed = self.string(seed)?;
        self.invoke_bool(EntryPoint::SetRandomSeed, &[Ptr(handle.ptr()), Ptr(seed.ptr())])
    }

    pub fn set_json_to_label(&self, handle: &str, label: &str, json: &str) -> RuntimeResult<()> {
        let handle = self.string(handle)?;
        let label = self.string(label)?;
        let json = self.string(json)?;
        self.invoke_void(
            EntryPoint::SetJsonToLabel,
            &[Ptr(handle.ptr()), Ptr(label.ptr()), Ptr(json.ptr())],
        )
    }

    /// Raw JSON of a label. A null result decodes to `""`.
    pub fn get_json_from_label(&self, handle: &str, label: &str) -> RuntimeResult<String> {
        let handle = self.string(handle)?;
        let label = self.string(label)?;
        self.invoke_string(EntryPoint::GetJsonPtrFromLabel, &[Ptr(handle.ptr()), Ptr(label.ptr())])
    }

    pub fn set_sbf_datastore_enabled(&self, enabled: bool) -> RuntimeResult<()> {
        self.invoke_void(EntryPoint::SetSbfDataStoreEnabled, &[Bool(enabled)])
    }

    pub fn is_sbf_datastore_enabled(&self) -> RuntimeResult<bool> {
        self.invoke_bool(EntryPoint::IsSbfDataStoreEnabled, &[])
    }

    pub fn set_max_num_threads(&self, threads: u64) -> RuntimeResult<()> {
        self.invoke_void(EntryPoint::SetMaxNumThreads, &[Size(threads)])
    }

    pub fn get_max_num_threads(&self) -> RuntimeResult<u64> {
        self.invoke_size(EntryPoint::GetMaxNumThreads, &[])
    }

    pub fn set_entity_permissions(&self, handle: &str, json: &str) -> RuntimeResult<bool> {
        let handle = self.string(handle)?;
        let json = self.string(json)?;
        self.invoke_bool(EntryPoint::SetEntityPermissions, &[Ptr(handle.ptr()), Ptr(json.ptr())])
    }

    pub fn get_entity_permissions(&self, handle: &str) -> RuntimeResult<String> {
        let handle = self.string(handle)?;
        self.invoke_string(EntryPoint::GetEntityPermissions, &[Ptr(handle.ptr())])
    }

    pub fn get_version(&self) -> RuntimeResult<String> {
        self.invoke_string(EntryPoint::GetVersionString, &[])
    }

    pub fn get_concurrency_type(&self) -> RuntimeResult<String> {
        self.invoke_string(EntryPoint::GetConcurrencyTypeString, &[])
    }
}

fn missing_return(entry: EntryPoint) -> RuntimeError {
    RuntimeError::Signature {
        entry: entry.symbol(),
        detail: "no return value".into(),
    }
}
