//! Materializing a [`quill_compiler::CompiledCode`] onto the heap as a
//! `code` object, recursively for nested lambdas.
//!
//! Constant-pool entries are turned into heap `Value`s bottom-up: integers
//! need no allocation, strings are interned as fresh string objects, and a
//! nested `Code` constant is loaded first so the outer code object's
//! constant pool can refer to an already-materialized heap value.

use crate::error::{ErrorCode, RuntimeError};
use crate::gc_util;
use crate::primitives::alloc_string;
use quill_compiler::{CompiledCode, ConstValue};
use quill_core::{CodeHeader, GlobalEnv, Heap, RootStack, Value};

pub fn load(
    heap: &mut Heap,
    globals: &mut GlobalEnv,
    roots: &mut RootStack,
    code: &CompiledCode,
) -> Result<Value, RuntimeError> {
    let depth = roots.depth();
    let mut handles = Vec::with_capacity(code.consts.len());
    for c in &code.consts {
        let v = match c {
            ConstValue::Int(n) => Value::make_int(*n),
            ConstValue::Str(s) => alloc_string(heap, s, |visit| {
                globals.for_each_root(visit);
                roots.for_each_root(visit);
            })
            .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?,
            ConstValue::Code(inner) => load(heap, globals, roots, inner)?,
        };
        handles.push(roots.push(v));
    }
    // Re-read after the loop, not inline: any of those allocations could
    // have collected and relocated an earlier constant already computed.
    let consts: Vec<Value> = handles.iter().map(|&h| roots.get(h)).collect();
    roots.truncate(depth);

    let header = CodeHeader {
        argc: code.argc,
        seclevel: code.seclevel,
        nlocals: code.nlocals as u16,
        stack_depth: code.stackdepth as u16,
    };
    gc_util::alloc_code(heap, globals, roots, header, &consts, &code.bytecode)
        .map_err(|_| RuntimeError::new(ErrorCode::BadValue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::TypeTag;

    #[test]
    fn loads_a_literal_into_a_code_object() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let compiled = quill_compiler::compile_source("42", &mut globals).unwrap();
        let code = load(&mut heap, &mut globals, &mut roots, &compiled).unwrap();
        assert_eq!(heap.tag(code), TypeTag::Code);
    }

    #[test]
    fn loads_nested_lambdas_as_nested_code_constants() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let compiled = quill_compiler::compile_source("(lambda (x) x)", &mut globals).unwrap();
        let code = load(&mut heap, &mut globals, &mut roots, &compiled).unwrap();
        assert_eq!(heap.code_nconsts(code), 1);
        assert_eq!(heap.tag(heap.code_const(code, 0)), TypeTag::Code);
    }
}
