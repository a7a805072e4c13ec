//! Foreign memory marshaling for the Amalgam native runtime.
//!
//! The native module owns a linear memory and exposes its own allocator.
//! Everything that crosses the boundary is copied into that memory before a
//! call and copied back out (and released) afterwards:
//!
//! - [`NativeString`] / [`string_to_pointer`]: host string into native memory
//! - [`pointer_to_string`]: native string back to the host, always freed
//! - [`CharPtrArray`]: dynamic `char**` argument lists
//! - [`StatusLayout`] / [`NativeBuffer`]: fixed-layout out-parameter structs
//!
//! Every allocation made here is owned by a guard that releases it on drop,
//! so early returns and propagated errors cannot leak native memory.
//! [`LinearHeap`] is an in-process linear memory that tracks allocations and
//! is used to verify that discipline.

mod array;
mod error;
mod heap;
mod layout;
mod memory;
mod strings;

pub use array::{CharPtrArray, decode_string_array};
pub use error::{MarshalError, MarshalResult};
pub use heap::{HeapStats, LinearHeap};
pub use layout::{
    EntityPathFields, NativeBuffer, SIZE_SLOT_BYTES, StatusLayout, decode_status, encode_status,
};
pub use memory::{NativeMemory, NativePtr, POINTER_BYTES};
pub use strings::{NativeString, pointer_to_string, read_c_string, string_to_pointer};
