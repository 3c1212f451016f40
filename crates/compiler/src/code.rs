//! A heap-independent representation of a compiled function.
//!
//! The emitter builds these bottom-up (innermost lambda first) and never
//! touches a [`quill_core::Heap`] directly; materializing a `CompiledCode`
//! into an actual `code` object is the runtime's job, once it owns the heap
//! the object will live on.

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Str(String),
    Code(Box<CompiledCode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCode {
    pub argc: u8,
    pub varargs: bool,
    pub nlocals: usize,
    pub stackdepth: usize,
    pub seclevel: u8,
    pub consts: Vec<ConstValue>,
    pub bytecode: Vec<u8>,
}
