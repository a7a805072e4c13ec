//! In-process linear memory with allocation tracking.
//!
//! `LinearHeap` behaves like a native module's memory: addresses are plain
//! offsets, address zero is null, and every access must fall inside a live
//! allocation. It never reuses freed space, so a stale pointer is always
//! detected as an out-of-bounds access rather than silently aliasing.

use crate::error::{MarshalError, MarshalResult};
use crate::memory::{NativeMemory, NativePtr};
use std::cell::RefCell;
use std::collections::BTreeMap;
use tracing::warn;

const HEAP_BASE: u64 = 16;
const ALIGN: u64 = 8;

/// Allocation counters for a [`LinearHeap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Allocations not yet freed.
    pub live: usize,
    /// Bytes held by live allocations.
    pub live_bytes: u64,
    pub allocations: u64,
    pub frees: u64,
    /// Frees of pointers that were not live (double free or foreign pointer).
    pub invalid_frees: u64,
}

struct HeapInner {
    memory: Vec<u8>,
    next: u64,
    live: BTreeMap<u64, u64>,
    limit: Option<u64>,
    stats: HeapStats,
}

pub struct LinearHeap {
    inner: RefCell<HeapInner>,
}

impl LinearHeap {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(HeapInner {
                memory: vec![0; HEAP_BASE as usize],
                next: HEAP_BASE,
                live: BTreeMap::new(),
                limit: None,
                stats: HeapStats::default(),
            }),
        }
    }

    /// A heap that refuses allocations once `limit` live bytes are held.
    pub fn with_limit(limit: u64) -> Self {
        let heap = Self::new();
        heap.inner.borrow_mut().limit = Some(limit);
        heap
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.borrow().stats
    }

    /// Number of allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.inner.borrow().stats.live
    }

    pub fn is_live(&self, ptr: NativePtr) -> bool {
        self.inner.borrow().live.contains_key(&ptr.addr())
    }
}

impl Default for LinearHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapInner {
    /// Checks that `[addr, addr + len)` lies inside one live allocation and
    /// returns the end of that allocation.
    fn check_range(&self, ptr: NativePtr, len: u64) -> MarshalResult<u64> {
        let out_of_bounds = MarshalError::OutOfBounds { ptr, len };
        let addr = ptr.addr();
        let (&start, &size) = self.live.range(..=addr).next_back().ok_or(out_of_bounds)?;
        let end = start + size;
        match addr.checked_add(len) {
            Some(access_end) if access_end <= end => Ok(end),
            _ => Err(MarshalError::OutOfBounds { ptr, len }),
        }
    }
}

impl NativeMemory for LinearHeap {
    fn malloc(&self, size: u64) -> MarshalResult<NativePtr> {
        let mut inner = self.inner.borrow_mut();
        if let Some(limit) = inner.limit {
            if inner.stats.live_bytes.saturating_add(size) > limit {
                return Err(MarshalError::OutOfMemory { requested: size });
            }
        }

        let reserved = size.max(1).div_ceil(ALIGN) * ALIGN;
        let addr = inner.next;
        inner.next += reserved;
        let new_len = inner.next as usize;
        inner.memory.resize(new_len, 0);
        inner.live.insert(addr, size);
        inner.stats.live += 1;
        inner.stats.live_bytes += size;
        inner.stats.allocations += 1;
        Ok(NativePtr::from_addr(addr))
    }

    fn free(&self, ptr: NativePtr) {
        if ptr.is_null() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        match inner.live.remove(&ptr.addr()) {
            Some(size) => {
                inner.stats.live -= 1;
                inner.stats.live_bytes -= size;
                inner.stats.frees += 1;
            }
            None => {
                warn!(ptr = %ptr, "Free of a pointer that is not a live allocation");
                inner.stats.invalid_frees += 1;
            }
        }
    }

    fn read(&self, ptr: NativePtr, buf: &mut [u8]) -> MarshalResult<()> {
        let inner = self.inner.borrow();
        inner.check_range(ptr, buf.len() as u64)?;
        let start = ptr.addr() as usize;
        buf.copy_from_slice(&inner.memory[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, ptr: NativePtr, bytes: &[u8]) -> MarshalResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_range(ptr, bytes.len() as u64)?;
        let start = ptr.addr() as usize;
        inner.memory[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_c_str(&self, ptr: NativePtr) -> MarshalResult<Vec<u8>> {
        let inner = self.inner.borrow();
        let end = inner.check_range(ptr, 0)? as usize;
        let start = ptr.addr() as usize;
        let region = &inner.memory[start..end];
        match region.iter().position(|&b| b == 0) {
            Some(len) => Ok(region[..len].to_vec()),
            None => Err(MarshalError::Unterminated(ptr)),
        }
    }
}
