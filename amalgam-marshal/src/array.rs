//! Dynamic `char**` string lists in both directions.

use crate::error::{MarshalError, MarshalResult};
use crate::memory::{NativeMemory, NativePtr, POINTER_BYTES};
use crate::strings::{pointer_to_string, string_to_pointer};
use tracing::trace;

/// Upper bound on the up-front reservation for a decoded list.
const MAX_PREALLOCATED: u64 = 1024;

/// A `char**` argument list allocated in native memory.
///
/// Three shapes are distinguished:
/// - no array: null base, zero count, nothing to release
/// - empty array: one zero-length allocation, still released
/// - populated array: one allocation per string plus the pointer block
///
/// Everything is released exactly once when the value is dropped, including
/// when allocation fails part-way through [`CharPtrArray::alloc`].
pub struct CharPtrArray<'m, M: NativeMemory + ?Sized> {
    memory: &'m M,
    base: NativePtr,
    elements: Vec<NativePtr>,
    allocated: bool,
}

impl<'m, M: NativeMemory + ?Sized> CharPtrArray<'m, M> {
    pub fn alloc<S: AsRef<str>>(memory: &'m M, values: Option<&[S]>) -> MarshalResult<Self> {
        let mut array = Self {
            memory,
            base: NativePtr::NULL,
            elements: Vec::new(),
            allocated: false,
        };
        let Some(values) = values else {
            return Ok(array);
        };

        array.elements.reserve(values.len());
        for value in values {
            let ptr = string_to_pointer(memory, value.as_ref())?;
            array.elements.push(ptr);
        }

        array.base = memory.malloc(values.len() as u64 * POINTER_BYTES)?;
        array.allocated = true;

        if !array.elements.is_empty() {
            let block: Vec<u8> = array
                .elements
                .iter()
                .flat_map(|ptr| ptr.addr().to_le_bytes())
                .collect();
            memory.write(array.base, &block)?;
        }
        Ok(array)
    }

    /// Address of the pointer block (null for the no-array shape).
    pub fn base(&self) -> NativePtr {
        self.base
    }

    /// Number of strings, as passed alongside the base pointer.
    pub fn count(&self) -> u64 {
        self.elements.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// True for the no-array placeholder.
    pub fn is_placeholder(&self) -> bool {
        !self.allocated
    }
}

impl<M: NativeMemory + ?Sized> Drop for CharPtrArray<'_, M> {
    fn drop(&mut self) {
        trace!(base = %self.base, count = self.elements.len(), "Releasing char pointer array");
        for ptr in self.elements.drain(..) {
            self.memory.free(ptr);
        }
        if self.allocated {
            self.memory.free(self.base);
        }
    }
}

/// Decodes `count` native strings from a pointer block handed to the caller.
///
/// Every element is decoded and freed, then the block itself is freed. All
/// releases happen even if an element fails to decode; the first failure is
/// returned afterwards.
pub fn decode_string_array<M: NativeMemory + ?Sized>(
    memory: &M,
    base: NativePtr,
    count: u64,
) -> MarshalResult<Vec<String>> {
    let Some(len) = count.checked_mul(POINTER_BYTES) else {
        memory.free(base);
        return Err(MarshalError::OutOfBounds { ptr: base, len: u64::MAX });
    };
    if base.is_null() {
        return if count == 0 {
            Ok(Vec::new())
        } else {
            Err(MarshalError::OutOfBounds { ptr: base, len })
        };
    }

    let mut values = Vec::with_capacity(count.min(MAX_PREALLOCATED) as usize);
    let mut first_error = None;
    for index in 0..count {
        // Slots are contiguous: once one is unreadable the rest are too.
        let slot = match base.offset(index * POINTER_BYTES).and_then(|slot| memory.read_ptr(slot)) {
            Ok(ptr) => ptr,
            Err(e) => {
                first_error.get_or_insert(e);
                break;
            }
        };
        match pointer_to_string(memory, slot) {
            Ok(value) => values.push(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    memory.free(base);

    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}
