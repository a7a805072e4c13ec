//! Fixed-layout out-parameter structs.
//!
//! Native calls that return a composite status write it into a buffer the
//! caller pre-allocates and passes by address. The byte layout is declared
//! once here and used by both the encoding (native) and decoding (host)
//! side.

use crate::array::decode_string_array;
use crate::error::MarshalResult;
use crate::memory::{NativeMemory, NativePtr, POINTER_BYTES};
use crate::strings::{pointer_to_string, string_to_pointer};
use amalgam_types::EntityStatus;

/// Bytes reserved for a `size_t` out-parameter.
pub const SIZE_SLOT_BYTES: u64 = 8;

/// Byte offsets of the entity-path fields inside a status struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityPathFields {
    pub array: u64,
    pub len: u64,
}

/// Byte layout of a load/verify status struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLayout {
    pub size: u64,
    pub loaded: u64,
    pub message: u64,
    pub version: u64,
    pub entity_path: Option<EntityPathFields>,
}

impl StatusLayout {
    /// `{bool loaded; /* 7 padding */ char* message; char* version;}`
    pub const BASIC: StatusLayout = StatusLayout {
        size: 24,
        loaded: 0,
        message: 8,
        version: 16,
        entity_path: None,
    };

    /// `BASIC` followed by `{char** entity_path; size_t entity_path_len;}`
    pub const WITH_ENTITY_PATH: StatusLayout = StatusLayout {
        size: 40,
        loaded: 0,
        message: 8,
        version: 16,
        entity_path: Some(EntityPathFields { array: 24, len: 32 }),
    };
}

/// A zeroed scratch allocation, freed on drop.
pub struct NativeBuffer<'m, M: NativeMemory + ?Sized> {
    memory: &'m M,
    ptr: NativePtr,
    size: u64,
}

impl<'m, M: NativeMemory + ?Sized> NativeBuffer<'m, M> {
    pub fn alloc(memory: &'m M, size: u64) -> MarshalResult<Self> {
        let ptr = memory.malloc(size)?;
        let buffer = Self { memory, ptr, size };
        memory.write(ptr, &vec![0u8; size as usize])?;
        Ok(buffer)
    }

    pub fn ptr(&self) -> NativePtr {
        self.ptr
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<M: NativeMemory + ?Sized> Drop for NativeBuffer<'_, M> {
    fn drop(&mut self) {
        self.memory.free(self.ptr);
    }
}

/// Reads a status struct written by the native side.
///
/// Embedded strings and the entity-path array are owned by the caller after
/// the call; they are all decoded and freed here, even if one of them fails
/// to decode. The struct buffer itself is not freed.
pub fn decode_status<M: NativeMemory + ?Sized>(
    memory: &M,
    ptr: NativePtr,
    layout: StatusLayout,
) -> MarshalResult<EntityStatus> {
    let loaded = memory.read_u8(ptr.offset(layout.loaded)?)? != 0;
    let message_ptr = memory.read_ptr(ptr.offset(layout.message)?)?;
    let version_ptr = memory.read_ptr(ptr.offset(layout.version)?)?;
    let path_fields = match layout.entity_path {
        Some(fields) => Some((
            memory.read_ptr(ptr.offset(fields.array)?)?,
            memory.read_u64(ptr.offset(fields.len)?)?,
        )),
        None => None,
    };

    let message = pointer_to_string(memory, message_ptr);
    let version = pointer_to_string(memory, version_ptr);
    let entity_path = match path_fields {
        Some((base, len)) => decode_string_array(memory, base, len),
        None => Ok(Vec::new()),
    };

    Ok(EntityStatus {
        loaded,
        message: message?,
        version: version?,
        entity_path: entity_path?,
    })
}

/// Writes a status struct into `ptr`, allocating its strings with the
/// native allocator. Ownership of those strings passes to whoever decodes
/// the struct. The entity path is ignored for layouts without one.
pub fn encode_status<M: NativeMemory + ?Sized>(
    memory: &M,
    ptr: NativePtr,
    layout: StatusLayout,
    status: &EntityStatus,
) -> MarshalResult<()> {
    memory.write(ptr.offset(layout.loaded)?, &[u8::from(status.loaded)])?;

    let message = string_to_pointer(memory, &status.message)?;
    memory.write_ptr(ptr.offset(layout.message)?, message)?;
    let version = string_to_pointer(memory, &status.version)?;
    memory.write_ptr(ptr.offset(layout.version)?, version)?;

    if let Some(fields) = layout.entity_path {
        let count = status.entity_path.len() as u64;
        let base = memory.malloc(count * POINTER_BYTES)?;
        for (index, segment) in status.entity_path.iter().enumerate() {
            let element = string_to_pointer(memory, segment)?;
            memory.write_ptr(base.offset(index as u64 * POINTER_BYTES)?, element)?;
        }
        memory.write_ptr(ptr.offset(fields.array)?, base)?;
        memory.write_u64(ptr.offset(fields.len)?, count)?;
    }
    Ok(())
}
