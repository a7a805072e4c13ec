//! A scriptable in-process native module for tests.
//!
//! `MockModule` implements the binding table on top of a [`LinearHeap`], so
//! it reads arguments and hands back results through real linear memory
//! exactly like a compiled module would. Tests can then assert that every
//! facade operation leaves no outstanding allocation.

use crate::binding::{EntryPoint, NativeModule, NativeValue};
use crate::error::{RuntimeError, RuntimeResult};
use amalgam_marshal::{
    LinearHeap, MarshalResult, NativeMemory, NativePtr, POINTER_BYTES, StatusLayout, encode_status,
    read_c_string, string_to_pointer,
};
use amalgam_types::{EntityPermissions, EntityStatus};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

pub const MOCK_VERSION: &str = "0.0.0-mock";
pub const MOCK_CONCURRENCY: &str = "SingleThreaded";

/// Shared record of the entry points a [`MockModule`] was called with.
///
/// Clones observe the same log, so a test can keep one after the module
/// has been moved into a facade or a service.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<EntryPoint>>>);

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<EntryPoint>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, entry: EntryPoint) {
        self.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<EntryPoint> {
        self.lock().clone()
    }

    pub fn count(&self, entry: EntryPoint) -> usize {
        self.lock().iter().filter(|e| **e == entry).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct MockEntity {
    labels: BTreeMap<String, String>,
    permissions: EntityPermissions,
    seed: Option<String>,
}

struct MockState {
    /// Loadable paths and the version they report.
    files: BTreeMap<String, String>,
    entities: BTreeMap<String, MockEntity>,
    /// Scripted raw outputs for `ExecuteEntityJsonPtr`, keyed by (handle, label).
    responses: HashMap<(String, String), String>,
    fail_next: Option<EntryPoint>,
    version: String,
    sbf_enabled: bool,
    max_threads: u64,
}

pub struct MockModule {
    heap: LinearHeap,
    state: RefCell<MockState>,
    calls: CallLog,
}

impl MockModule {
    pub fn new() -> Self {
        Self::with_heap(LinearHeap::new())
    }

    pub fn with_heap(heap: LinearHeap) -> Self {
        Self {
            heap,
            state: RefCell::new(MockState {
                files: BTreeMap::new(),
                entities: BTreeMap::new(),
                responses: HashMap::new(),
                fail_next: None,
                version: MOCK_VERSION.to_string(),
                sbf_enabled: false,
                max_threads: 1,
            }),
            calls: CallLog::default(),
        }
    }

    /// Makes `path` loadable, reporting `version`.
    pub fn with_file(self, path: impl Into<String>, version: impl Into<String>) -> Self {
        self.state.borrow_mut().files.insert(path.into(), version.into());
        self
    }

    /// Starts with `handle` already loaded.
    pub fn with_entity(self, handle: impl Into<String>) -> Self {
        self.state
            .borrow_mut()
            .entities
            .insert(handle.into(), MockEntity::default());
        self
    }

    /// Scripts the raw output of executing `label` on `handle`. An empty
    /// string makes the call return a null pointer.
    pub fn with_response(self, handle: &str, label: &str, raw: impl Into<String>) -> Self {
        self.state
            .borrow_mut()
            .responses
            .insert((handle.to_string(), label.to_string()), raw.into());
        self
    }

    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.state.borrow_mut().version = version.into();
        self
    }

    /// Makes the next call to `entry` fail as a trap would, before it
    /// touches memory.
    pub fn fail_next(&self, entry: EntryPoint) {
        self.state.borrow_mut().fail_next = Some(entry);
    }

    pub fn heap(&self) -> &LinearHeap {
        &self.heap
    }

    /// Native allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.heap.outstanding()
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    pub fn has_entity(&self, handle: &str) -> bool {
        self.state.borrow().entities.contains_key(handle)
    }

    pub fn label(&self, handle: &str, label: &str) -> Option<String> {
        self.state
            .borrow()
            .entities
            .get(handle)
            .and_then(|e| e.labels.get(label).cloned())
    }

    pub fn seed(&self, handle: &str) -> Option<String> {
        self.state.borrow().entities.get(handle).and_then(|e| e.seed.clone())
    }

    pub fn sbf_enabled(&self) -> bool {
        self.state.borrow().sbf_enabled
    }

    pub fn is_loadable(&self, path: &str) -> bool {
        self.state.borrow().files.contains_key(path)
    }

    fn ptr_arg(&self, entry: EntryPoint, args: &[NativeValue], index: usize) -> RuntimeResult<NativePtr> {
        args.get(index)
            .and_then(NativeValue::as_ptr)
            .ok_or_else(|| bad_arg(entry, index))
    }

    fn str_arg(&self, entry: EntryPoint, args: &[NativeValue], index: usize) -> RuntimeResult<String> {
        let ptr = self.ptr_arg(entry, args, index)?;
        Ok(read_c_string(&self.heap, ptr)?)
    }

    fn bool_arg(&self, entry: EntryPoint, args: &[NativeValue], index: usize) -> RuntimeResult<bool> {
        args.get(index)
            .and_then(NativeValue::as_bool)
            .ok_or_else(|| bad_arg(entry, index))
    }

    fn size_arg(&self, entry: EntryPoint, args: &[NativeValue], index: usize) -> RuntimeResult<u64> {
        args.get(index)
            .and_then(NativeValue::as_size)
            .ok_or_else(|| bad_arg(entry, index))
    }

    /// Reads a caller-owned `char**` argument without freeing it.
    fn str_list_arg(&self, entry: EntryPoint, args: &[NativeValue], index: usize) -> RuntimeResult<Vec<String>> {
        let base = self.ptr_arg(entry, args, index)?;
        let count = self.size_arg(entry, args, index + 1)?;
        let mut values = Vec::with_capacity(count as usize);
        for i in 0..count {
            let element = self.heap.read_ptr(base.offset(i * POINTER_BYTES)?)?;
            values.push(read_c_string(&self.heap, element)?);
        }
        Ok(values)
    }

    /// Returns a string whose ownership passes to the caller.
    fn give(&self, value: Option<&str>) -> RuntimeResult<Option<NativeValue>> {
        let ptr = match value {
            Some(value) => string_to_pointer(&self.heap, value)?,
            None => NativePtr::NULL,
        };
        Ok(Some(NativeValue::Ptr(ptr)))
    }

    fn give_list(&self, values: &[String]) -> MarshalResult<NativePtr> {
        let base = self.heap.malloc(values.len() as u64 * POINTER_BYTES)?;
        for (i, value) in values.iter().enumerate() {
            let element = string_to_pointer(&self.heap, value)?;
            self.heap.write_ptr(base.offset(i as u64 * POINTER_BYTES)?, element)?;
        }
        Ok(base)
    }

    fn load_entity(&self, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        let entry = EntryPoint::LoadEntity;
        let out = self.ptr_arg(entry, args, 0)?;
        let handle = self.str_arg(entry, args, 1)?;
        let path = self.str_arg(entry, args, 2)?;
        let entity_path = self.str_list_arg(entry, args, 8)?;

        let status = {
            let mut state = self.state.borrow_mut();
            match state.files.get(&path).cloned() {
                Some(version) => {
                    state.entities.insert(handle, MockEntity::default());
                    EntityStatus::loaded(version).with_entity_path(entity_path)
                }
                None => EntityStatus::failed(format!("Failed to load entity: {path} not found")),
            }
        };
        encode_status(&self.heap, out, StatusLayout::WITH_ENTITY_PATH, &status)?;
        Ok(None)
    }

    fn verify_entity(&self, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        let entry = EntryPoint::VerifyEntity;
        let out = self.ptr_arg(entry, args, 0)?;
        let path = self.str_arg(entry, args, 1)?;
        let status = match self.state.borrow().files.get(&path) {
            Some(version) => EntityStatus::loaded(version.clone()),
            None => EntityStatus::failed(format!("File not found: {path}")),
        };
        encode_status(&self.heap, out, StatusLayout::BASIC, &status)?;
        Ok(None)
    }

    fn execute_entity_json(&self, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        let entry = EntryPoint::ExecuteEntityJsonPtr;
        let handle = self.str_arg(entry, args, 0)?;
        let label = self.str_arg(entry, args, 1)?;
        let input = self.str_arg(entry, args, 2)?;

        let raw = {
            let state = self.state.borrow();
            if let Some(scripted) = state.responses.get(&(handle.clone(), label)) {
                scripted.clone()
            } else if state.entities.contains_key(&handle) {
                let payload: Value = serde_json::from_str(&input).unwrap_or(Value::Null);
                json!({"status": "ok", "payload": payload, "warnings": []}).to_string()
            } else {
                json!({
                    "status": "error",
                    "errors": [{"detail": format!("Entity not found: {handle}")}],
                })
                .to_string()
            }
        };
        self.give(Some(&raw).filter(|r| !r.is_empty()).map(String::as_str))
    }

    fn get_entities(&self, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        let size_out = self.ptr_arg(EntryPoint::GetEntities, args, 0)?;
        let handles: Vec<String> = self.state.borrow().entities.keys().cloned().collect();
        let base = self.give_list(&handles)?;
        self.heap.write_u64(size_out, handles.len() as u64)?;
        Ok(Some(NativeValue::Ptr(base)))
    }
}

impl Default for MockModule {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_arg(entry: EntryPoint, index: usize) -> RuntimeError {
    RuntimeError::Signature {
        entry: entry.symbol(),
        detail: format!("bad argument {index}"),
    }
}

impl NativeMemory for MockModule {
    fn malloc(&self, size: u64) -> MarshalResult<NativePtr> {
        self.heap.malloc(size)
    }

    fn free(&self, ptr: NativePtr) {
        self.heap.free(ptr)
    }

    fn read(&self, ptr: NativePtr, buf: &mut [u8]) -> MarshalResult<()> {
        self.heap.read(ptr, buf)
    }

    fn write(&self, ptr: NativePtr, bytes: &[u8]) -> MarshalResult<()> {
        self.heap.write(ptr, bytes)
    }

    fn read_c_str(&self, ptr: NativePtr) -> MarshalResult<Vec<u8>> {
        self.heap.read_c_str(ptr)
    }
}

impl NativeModule for MockModule {
    fn call(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        self.calls.push(entry);
        {
            let mut state = self.state.borrow_mut();
            if state.fail_next == Some(entry) {
                state.fail_next = None;
                return Err(RuntimeError::Native {
                    entry: entry.symbol(),
                    detail: "injected failure".into(),
                });
            }
        }
        entry.check_args(args)?;

        match entry {
            EntryPoint::LoadEntity => self.load_entity(args),
            EntryPoint::VerifyEntity => self.verify_entity(args),
            EntryPoint::CloneEntity => {
                let handle = self.str_arg(entry, args, 0)?;
                let clone_handle = self.str_arg(entry, args, 1)?;
                let mut state = self.state.borrow_mut();
                let cloned = state.entities.get(&handle).cloned();
                let ok = match cloned {
                    Some(entity) => {
                        state.entities.insert(clone_handle, entity);
                        true
                    }
                    None => false,
                };
                Ok(Some(NativeValue::Bool(ok)))
            }
            EntryPoint::StoreEntity => {
                let handle = self.str_arg(entry, args, 0)?;
                let path = self.str_arg(entry, args, 1)?;
                self.str_list_arg(entry, args, 5)?;
                let mut state = self.state.borrow_mut();
                if state.entities.contains_key(&handle) {
                    let version = state.version.clone();
                    state.files.insert(path, version);
                }
                Ok(None)
            }
            EntryPoint::ExecuteEntity => {
                self.str_arg(entry, args, 0)?;
                self.str_arg(entry, args, 1)?;
                Ok(None)
            }
            EntryPoint::ExecuteEntityJsonPtr => self.execute_entity_json(args),
            EntryPoint::DestroyEntity => {
                let handle = self.str_arg(entry, args, 0)?;
                self.state.borrow_mut().entities.remove(&handle);
                Ok(None)
            }
            EntryPoint::GetEntities => self.get_entities(args),
            EntryPoint::SetRandomSeed => {
                let handle = self.str_arg(entry, args, 0)?;
                let seed = self.str_arg(entry, args, 1)?;
                let mut state = self.state.borrow_mut();
                let ok = match state.entities.get_mut(&handle) {
                    Some(entity) => {
                        entity.seed = Some(seed);
                        true
                    }
                    None => false,
                };
                Ok(Some(NativeValue::Bool(ok)))
            }
            EntryPoint::SetJsonToLabel => {
                let handle = self.str_arg(entry, args, 0)?;
                let label = self.str_arg(entry, args, 1)?;
                let json = self.str_arg(entry, args, 2)?;
                if let Some(entity) = self.state.borrow_mut().entities.get_mut(&handle) {
                    entity.labels.insert(label, json);
                }
                Ok(None)
            }
            EntryPoint::GetJsonPtrFromLabel => {
                let handle = self.str_arg(entry, args, 0)?;
                let label = self.str_arg(entry, args, 1)?;
                let value = self.label(&handle, &label);
                self.give(value.as_deref())
            }
            EntryPoint::SetSbfDataStoreEnabled => {
                let enabled = self.bool_arg(entry, args, 0)?;
                self.state.borrow_mut().sbf_enabled = enabled;
                Ok(None)
            }
            EntryPoint::IsSbfDataStoreEnabled => {
                Ok(Some(NativeValue::Bool(self.state.borrow().sbf_enabled)))
            }
            EntryPoint::SetMaxNumThreads => {
                let threads = self.size_arg(entry, args, 0)?;
                self.state.borrow_mut().max_threads = threads;
                Ok(None)
            }
            EntryPoint::GetMaxNumThreads => {
                Ok(Some(NativeValue::Size(self.state.borrow().max_threads)))
            }
            EntryPoint::SetEntityPermissions => {
                let handle = self.str_arg(entry, args, 0)?;
                let json = self.str_arg(entry, args, 1)?;
                let Ok(permissions) = serde_json::from_str::<EntityPermissions>(&json) else {
                    return Ok(Some(NativeValue::Bool(false)));
                };
                let mut state = self.state.borrow_mut();
                let ok = match state.entities.get_mut(&handle) {
                    Some(entity) => {
                        entity.permissions = permissions;
                        true
                    }
                    None => false,
                };
                Ok(Some(NativeValue::Bool(ok)))
            }
            EntryPoint::GetEntityPermissions => {
                let handle = self.str_arg(entry, args, 0)?;
                let encoded = match self.state.borrow().entities.get(&handle) {
                    Some(entity) => Some(serde_json::to_string(&entity.permissions)?),
                    None => None,
                };
                self.give(encoded.as_deref())
            }
            EntryPoint::GetVersionString => {
                let version = self.state.borrow().version.clone();
                self.give(Some(version.as_str()))
            }
            EntryPoint::GetConcurrencyTypeString => self.give(Some(MOCK_CONCURRENCY)),
        }
    }
}
