//! Host string <-> native `char*` conversion.

use crate::error::MarshalResult;
use crate::memory::{NativeMemory, NativePtr};
use tracing::trace;

/// Copies `value` into a fresh native allocation as a NUL-terminated UTF-8
/// string and returns its address.
///
/// The caller owns the allocation and must free it, or hand it to a native
/// call documented to take ownership. Prefer [`NativeString`], which frees
/// on drop.
pub fn string_to_pointer<M: NativeMemory + ?Sized>(memory: &M, value: &str) -> MarshalResult<NativePtr> {
    let bytes = value.as_bytes();
    let mut encoded = Vec::with_capacity(bytes.len() + 1);
    encoded.extend_from_slice(bytes);
    encoded.push(0);

    let ptr = memory.malloc(encoded.len() as u64)?;
    if let Err(e) = memory.write(ptr, &encoded) {
        memory.free(ptr);
        return Err(e);
    }
    Ok(ptr)
}

/// Decodes a native string whose ownership has been handed to the caller,
/// then frees it.
///
/// The pointer is released even when decoding fails. A null pointer decodes
/// to an empty string. `ptr` must come from this memory's allocator.
pub fn pointer_to_string<M: NativeMemory + ?Sized>(memory: &M, ptr: NativePtr) -> MarshalResult<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    let bytes = memory.read_c_str(ptr);
    memory.free(ptr);
    Ok(String::from_utf8(bytes?)?)
}

/// Decodes a native string without taking ownership of it.
///
/// Used on the native side of the boundary to read caller-owned arguments.
pub fn read_c_string<M: NativeMemory + ?Sized>(memory: &M, ptr: NativePtr) -> MarshalResult<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    Ok(String::from_utf8(memory.read_c_str(ptr)?)?)
}

/// A host-created native string, freed when dropped.
pub struct NativeString<'m, M: NativeMemory + ?Sized> {
    memory: &'m M,
    ptr: NativePtr,
}

impl<'m, M: NativeMemory + ?Sized> NativeString<'m, M> {
    pub fn new(memory: &'m M, value: &str) -> MarshalResult<Self> {
        let ptr = string_to_pointer(memory, value)?;
        Ok(Self { memory, ptr })
    }

    pub fn ptr(&self) -> NativePtr {
        self.ptr
    }

    /// Gives up ownership, e.g. to a callee that frees the string itself.
    pub fn into_raw(self) -> NativePtr {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl<M: NativeMemory + ?Sized> Drop for NativeString<'_, M> {
    fn drop(&mut self) {
        trace!(ptr = %self.ptr, "Releasing native string");
        self.memory.free(self.ptr);
    }
}
