//! Lexical resolution, closure capture synthesis, and bytecode emission.
//!
//! This crate turns source text into a [`code::CompiledCode`] the runtime
//! crate can materialize onto its heap and run. It never touches a heap
//! itself: [`code::ConstValue::Code`] constants nest as plain Rust values
//! until the runtime walks them during `alloc_code`.

pub mod ast;
pub mod code;
pub mod compile;
pub mod diagnostics;
pub mod emitter;
pub mod reader;
pub mod resolver;

pub use code::{CompiledCode, ConstValue};
pub use compile::compile_source;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use reader::{read_one, read_program, ReaderError};
