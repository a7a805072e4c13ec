//! Native pointers and the linear-memory contract.

use crate::error::{MarshalError, MarshalResult};
use std::fmt;

/// Width of a native pointer or `size_t` slot (memory64 ABI).
pub const POINTER_BYTES: u64 = 8;

/// Opaque address inside a native module's linear memory.
///
/// Host code never dereferences one of these; it is only meaningful to the
/// [`NativeMemory`] it came from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativePtr(u64);

impl NativePtr {
    pub const NULL: NativePtr = NativePtr(0);

    /// Wraps a raw address. Only ABI implementations should need this.
    pub const fn from_addr(addr: u64) -> Self {
        Self(addr)
    }

    /// The raw address, for passing across the ABI.
    pub const fn addr(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` past this one.
    pub fn offset(self, bytes: u64) -> MarshalResult<Self> {
        self.0
            .checked_add(bytes)
            .map(Self)
            .ok_or(MarshalError::OutOfBounds { ptr: self, len: bytes })
    }
}

impl fmt::Debug for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePtr({:#x})", self.0)
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A native module's linear memory and allocator.
///
/// Methods take `&self`: implementations hold their store behind interior
/// mutability so that scoped guards can borrow the memory while a native
/// call is made through the same module.
pub trait NativeMemory {
    /// Allocates `size` bytes with the native allocator.
    fn malloc(&self, size: u64) -> MarshalResult<NativePtr>;

    /// Releases an allocation. Freeing null is a no-op.
    fn free(&self, ptr: NativePtr);

    /// Copies `buf.len()` bytes out of native memory.
    fn read(&self, ptr: NativePtr, buf: &mut [u8]) -> MarshalResult<()>;

    /// Copies `bytes` into native memory.
    fn write(&self, ptr: NativePtr, bytes: &[u8]) -> MarshalResult<()>;

    /// Reads the bytes of a NUL-terminated string, excluding the terminator.
    fn read_c_str(&self, ptr: NativePtr) -> MarshalResult<Vec<u8>>;

    fn read_u8(&self, ptr: NativePtr) -> MarshalResult<u8> {
        let mut buf = [0u8; 1];
        self.read(ptr, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u64(&self, ptr: NativePtr) -> MarshalResult<u64> {
        let mut buf = [0u8; 8];
        self.read(ptr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u64(&self, ptr: NativePtr, value: u64) -> MarshalResult<()> {
        self.write(ptr, &value.to_le_bytes())
    }

    fn read_ptr(&self, ptr: NativePtr) -> MarshalResult<NativePtr> {
        self.read_u64(ptr).map(NativePtr::from_addr)
    }

    fn write_ptr(&self, ptr: NativePtr, value: NativePtr) -> MarshalResult<()> {
        self.write_u64(ptr, value.addr())
    }
}

impl<M: NativeMemory + ?Sized> NativeMemory for &M {
    fn malloc(&self, size: u64) -> MarshalResult<NativePtr> {
        (**self).malloc(size)
    }

    fn free(&self, ptr: NativePtr) {
        (**self).free(ptr)
    }

    fn read(&self, ptr: NativePtr, buf: &mut [u8]) -> MarshalResult<()> {
        (**self).read(ptr, buf)
    }

    fn write(&self, ptr: NativePtr, bytes: &[u8]) -> MarshalResult<()> {
        (**self).write(ptr, bytes)
    }

    fn read_c_str(&self, ptr: NativePtr) -> MarshalResult<Vec<u8>> {
        (**self).read_c_str(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer() {
        assert!(NativePtr::NULL.is_null());
        assert!(!NativePtr::from_addr(8).is_null());
    }

    #[test]
    fn offset_overflow_is_out_of_bounds() {
        let ptr = NativePtr::from_addr(u64::MAX);
        assert!(matches!(ptr.offset(1), Err(MarshalError::OutOfBounds { .. })));
        assert_eq!(NativePtr::from_addr(8).offset(8).unwrap().addr(), 16);
    }

    #[test]
    fn debug_is_hex() {
        assert_eq!(format!("{:?}", NativePtr::from_addr(255)), "NativePtr(0xff)");
    }
}
