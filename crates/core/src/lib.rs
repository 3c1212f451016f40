//! Tagged values, the object heap, and the global environment shared by the
//! compiler and runtime crates.
//!
//! This crate owns everything that must agree bit-for-bit between a
//! compiled `code` object and the interpreter that runs it: the value
//! encoding, the heap layout and collector, the dynamic root stack, the
//! global variable table, and the snapshot wire format.

pub mod global;
pub mod header;
pub mod heap;
pub mod opcodes;
pub mod roots;
pub mod save_load;
pub mod value;

pub use global::{GlobalEnv, VarClass};
pub use header::{TypeTag, ALIGN, HEADER_SIZE};
pub use heap::{CodeHeader, Heap, OutOfMemory, WriteToReadOnly, DEFAULT_HEAP_SIZE};
pub use roots::{GcPro, GcProMany, RootHandle, RootStack};
pub use save_load::{gc_load, gc_save, SaveLoadError, MAGIC};
pub use value::{Value, INT_BITS, MAXINT, MININT};
