//! Wasmtime backend for a memory64 core module.
//!
//! The module must export `memory`, `malloc(i64) -> i64` and `free(i64)`.
//! Entry points are looked up by symbol on first use, so a module that
//! lacks one only fails when that operation is called. Imports the host
//! does not provide are linked as traps.

use crate::binding::{EntryPoint, NativeModule, NativeValue, ValueKind};
use crate::error::{RuntimeError, RuntimeResult};
use amalgam_marshal::{MarshalError, MarshalResult, NativeMemory, NativePtr};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use wasmtime::{
    Config, Engine, Func, Instance, Linker, Memory, Module, ResourceLimiter, Store, TypedFunc, Val,
};

/// Caps linear memory growth.
pub struct MemoryLimiter {
    max_memory: usize,
}

impl MemoryLimiter {
    pub fn new(max_memory: usize) -> Self {
        Self { max_memory }
    }
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired <= self.max_memory {
            Ok(true)
        } else {
            debug!(
                current = current,
                desired = desired,
                max = self.max_memory,
                "Memory growth denied - would exceed limit"
            );
            Ok(false)
        }
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(desired <= 100_000)
    }
}

struct WasmState {
    limiter: MemoryLimiter,
}

struct WasmInner {
    store: Store<WasmState>,
    instance: Instance,
    memory: Memory,
    malloc: TypedFunc<u64, u64>,
    free: TypedFunc<u64, ()>,
    entries: HashMap<EntryPoint, Func>,
}

pub struct WasmModule {
    inner: RefCell<WasmInner>,
}

fn instantiation(context: &str, e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Instantiation(format!("{context}: {e}"))
}

impl WasmModule {
    pub fn from_file(path: &Path, max_memory_bytes: usize) -> RuntimeResult<Self> {
        info!(path = %path.display(), "Loading native module");
        let bytes = std::fs::read(path)
            .map_err(|e| instantiation(&format!("failed to read {}", path.display()), e))?;
        Self::new(&bytes, max_memory_bytes)
    }

    /// Compiles and instantiates `bytes` (binary wasm or text format).
    pub fn new(bytes: &[u8], max_memory_bytes: usize) -> RuntimeResult<Self> {
        let mut config = Config::new();
        config.wasm_memory64(true);
        let engine = Engine::new(&config).map_err(|e| instantiation("engine", e))?;
        let module = Module::new(&engine, bytes).map_err(|e| instantiation("compile", e))?;

        let mut linker = Linker::new(&engine);
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| instantiation("link", e))?;

        let mut store = Store::new(
            &engine,
            WasmState {
                limiter: MemoryLimiter::new(max_memory_bytes),
            },
        );
        store.limiter(|s| &mut s.limiter);

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| instantiation("instantiate", e))?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| RuntimeError::Instantiation("module does not export memory".into()))?;
        let malloc = instance
            .get_typed_func::<u64, u64>(&mut store, "malloc")
            .map_err(|e| instantiation("malloc export", e))?;
        let free = instance
            .get_typed_func::<u64, ()>(&mut store, "free")
            .map_err(|e| instantiation("free export", e))?;

        info!(
            memory_bytes = memory.data_size(&store),
            "Native module instantiated"
        );
        Ok(Self {
            inner: RefCell::new(WasmInner {
                store,
                instance,
                memory,
                malloc,
                free,
                entries: HashMap::new(),
            }),
        })
    }

    /// Bytes of linear memory currently reserved by the module.
    pub fn memory_bytes(&self) -> usize {
        let inner = self.inner.borrow();
        inner.memory.data_size(&inner.store)
    }
}

impl WasmInner {
    fn entry(&mut self, entry: EntryPoint) -> RuntimeResult<Func> {
        if let Some(func) = self.entries.get(&entry) {
            return Ok(*func);
        }
        let func = self
            .instance
            .get_func(&mut self.store, entry.symbol())
            .ok_or(RuntimeError::MissingEntryPoint(entry.symbol()))?;
        let arity = func.ty(&self.store).params().len();
        if arity != entry.params().len() {
            return Err(RuntimeError::Signature {
                entry: entry.symbol(),
                detail: format!("export takes {arity} parameters, expected {}", entry.params().len()),
            });
        }
        self.entries.insert(entry, func);
        Ok(func)
    }
}

fn to_val(value: &NativeValue) -> Val {
    match value {
        NativeValue::Ptr(ptr) => Val::I64(ptr.addr() as i64),
        NativeValue::Bool(b) => Val::I32(i32::from(*b)),
        NativeValue::Size(n) => Val::I64(*n as i64),
    }
}

fn from_val(entry: EntryPoint, kind: ValueKind, value: &Val) -> RuntimeResult<NativeValue> {
    match (kind, value) {
        (ValueKind::Ptr, Val::I64(v)) => Ok(NativeValue::Ptr(NativePtr::from_addr(*v as u64))),
        (ValueKind::Size, Val::I64(v)) => Ok(NativeValue::Size(*v as u64)),
        (ValueKind::Bool, Val::I32(v)) => Ok(NativeValue::Bool(*v != 0)),
        _ => Err(RuntimeError::Signature {
            entry: entry.symbol(),
            detail: format!("unexpected return value {value:?}"),
        }),
    }
}

impl NativeModule for WasmModule {
    fn call(&self, entry: EntryPoint, args: &[NativeValue]) -> RuntimeResult<Option<NativeValue>> {
        let mut inner = self.inner.borrow_mut();
        let func = inner.entry(entry)?;
        let params: Vec<Val> = args.iter().map(to_val).collect();
        let mut results = match entry.returns() {
            None => Vec::new(),
            Some(ValueKind::Bool) => vec![Val::I32(0)],
            Some(_) => vec![Val::I64(0)],
        };
        func.call(&mut inner.store, &params, &mut results)
            .map_err(|e| RuntimeError::Native {
                entry: entry.symbol(),
                detail: e.to_string(),
            })?;
        match (entry.returns(), results.first()) {
            (Some(kind), Some(value)) => from_val(entry, kind, value).map(Some),
            _ => Ok(None),
        }
    }
}

impl NativeMemory for WasmModule {
    fn malloc(&self, size: u64) -> MarshalResult<NativePtr> {
        let mut inner = self.inner.borrow_mut();
        let WasmInner { store, malloc, .. } = &mut *inner;
        let addr = malloc
            .call(store, size)
            .map_err(|e| MarshalError::Allocator(e.to_string()))?;
        if addr == 0 {
            return Err(MarshalError::OutOfMemory { requested: size });
        }
        Ok(NativePtr::from_addr(addr))
    }

    fn free(&self, ptr: NativePtr) {
        if ptr.is_null() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        let WasmInner { store, free, .. } = &mut *inner;
        if let Err(e) = free.call(store, ptr.addr()) {
            warn!(ptr = %ptr, error = %e, "Native free trapped");
        }
    }

    fn read(&self, ptr: NativePtr, buf: &mut [u8]) -> MarshalResult<()> {
        let inner = self.inner.borrow();
        inner
            .memory
            .read(&inner.store, ptr.addr() as usize, buf)
            .map_err(|_| MarshalError::OutOfBounds {
                ptr,
                len: buf.len() as u64,
            })
    }

    fn write(&self, ptr: NativePtr, bytes: &[u8]) -> MarshalResult<()> {
        let mut inner = self.inner.borrow_mut();
        let WasmInner { store, memory, .. } = &mut *inner;
        memory
            .write(store, ptr.addr() as usize, bytes)
            .map_err(|_| MarshalError::OutOfBounds {
                ptr,
                len: bytes.len() as u64,
            })
    }

    fn read_c_str(&self, ptr: NativePtr) -> MarshalResult<Vec<u8>> {
        let inner = self.inner.borrow();
        let data = inner.memory.data(&inner.store);
        let start = usize::try_from(ptr.addr())
            .ok()
            .filter(|start| *start < data.len())
            .ok_or(MarshalError::OutOfBounds { ptr, len: 1 })?;
        match data[start..].iter().position(|&b| b == 0) {
            Some(len) => Ok(data[start..start + len].to_vec()),
            None => Err(MarshalError::Unterminated(ptr)),
        }
    }
}
