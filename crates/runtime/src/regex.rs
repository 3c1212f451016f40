//! `make-regexp`/`regexp-exec`: a worked example of a primitive that needs
//! more than the bare value-in-value-out protocol — it needs an external
//! library (`regex`) plumbed through the same arity/type-checking idiom as
//! [`crate::primitives`]'s string primitives.
//!
//! A compiled pattern is represented as an [`quill_core::TypeTag::Object`]
//! (an opaque host-engine reference per the value model) whose payload is
//! just the pattern's source text; `regexp-exec` recompiles it on every
//! call rather than caching a `regex::Regex` behind the value, which would
//! need a side table the GC doesn't know how to trace. Recompilation cost
//! is the deliberate, acceptable price of keeping a worked example this
//! small.
//!
//! `make-regexp(pattern, flags)` accepts and arity-checks a `flags`
//! argument but does not yet interpret it (no case-insensitive/multiline
//! mode); `regexp-exec(compiled, subject, start, flags)` searches `subject`
//! from byte offset `start` and returns a vector of the whole match
//! followed by each capture group's matched substring (`null` for a group
//! that did not participate), or `null` if nothing matched.

use crate::error::{ErrorCode, RuntimeError};
use crate::primitives::{alloc_string, string_str, PrimCtx};
use quill_core::{TypeTag, Value};

fn check_string(ctx: &PrimCtx, v: Value) -> Result<(), RuntimeError> {
    if v.is_ref() && ctx.heap.tag(v) == TypeTag::String {
        Ok(())
    } else {
        Err(RuntimeError::new(ErrorCode::BadType))
    }
}

pub fn prim_make_regexp(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    check_string(ctx, args[0])?;
    if !args[1].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    let pattern = string_str(ctx.heap, args[0]).to_string();
    regex::Regex::new(&pattern).map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
    let roots = &mut *ctx.roots;
    ctx.heap
        .alloc_bytes(TypeTag::Object, pattern.as_bytes(), |visit| roots.for_each_root(visit))
        .map_err(|_| RuntimeError::new(ErrorCode::BadValue))
}

pub fn prim_regexp_exec(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args[0].is_ref() || ctx.heap.tag(args[0]) != TypeTag::Object {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    check_string(ctx, args[1])?;
    if !args[2].is_int() || !args[3].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    let pattern_bytes = ctx.heap.payload(args[0]).to_vec();
    let pattern = std::str::from_utf8(&pattern_bytes).map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
    let re = regex::Regex::new(pattern).map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
    let subject = string_str(ctx.heap, args[1]).to_string();
    let start = args[2].as_int();
    if start < 0 || start as usize > subject.len() {
        return Err(RuntimeError::new(ErrorCode::BadIndex));
    }
    let Some(caps) = re.captures(&subject[start as usize..]) else {
        return Ok(Value::NULL);
    };

    let depth = ctx.roots.depth();
    let mut handles = Vec::with_capacity(caps.len());
    for i in 0..caps.len() {
        let handle = match caps.get(i) {
            Some(m) => {
                let matched = m.as_str().to_string();
                let roots = &mut *ctx.roots;
                let v = alloc_string(ctx.heap, &matched, |visit| roots.for_each_root(visit))
                    .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
                ctx.roots.push(v)
            }
            None => ctx.roots.push(Value::NULL),
        };
        handles.push(handle);
    }
    let cells: Vec<Value> = handles.iter().map(|&h| ctx.roots.get(h)).collect();
    ctx.roots.truncate(depth);
    crate::gc_util::alloc_cells(ctx.heap, ctx.globals, ctx.roots, TypeTag::Vector, &cells)
        .map_err(|_| RuntimeError::new(ErrorCode::BadValue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::session::Session;
    use quill_core::{GlobalEnv, Heap, RootStack};

    fn make(ctx: &mut PrimCtx, pattern: &str) -> Value {
        let p = alloc_string(ctx.heap, pattern, |visit| ctx.roots.for_each_root(visit)).unwrap();
        prim_make_regexp(ctx, &[p, Value::make_int(0)]).unwrap()
    }

    #[test]
    fn exec_returns_the_whole_match_and_its_capture_group() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut session = Session::new(&VmConfig::default());
        let mut ctx = PrimCtx { heap: &mut heap, roots: &mut roots, globals: &mut globals, session: &mut session };
        let compiled = make(&mut ctx, "^a(.)c$");
        let subject = alloc_string(ctx.heap, "abc", |visit| ctx.roots.for_each_root(visit)).unwrap();
        let result = prim_regexp_exec(&mut ctx, &[compiled, subject, Value::make_int(0), Value::make_int(0)]).unwrap();
        assert_eq!(ctx.heap.tag(result), TypeTag::Vector);
        assert_eq!(ctx.heap.cell_count(result), 2);
        assert_eq!(string_str(ctx.heap, ctx.heap.get_cell(result, 0)), "abc");
        assert_eq!(string_str(ctx.heap, ctx.heap.get_cell(result, 1)), "b");
    }

    #[test]
    fn exec_returns_null_on_no_match() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut session = Session::new(&VmConfig::default());
        let mut ctx = PrimCtx { heap: &mut heap, roots: &mut roots, globals: &mut globals, session: &mut session };
        let compiled = make(&mut ctx, "[0-9]+");
        let subject = alloc_string(ctx.heap, "no digits here", |visit| ctx.roots.for_each_root(visit)).unwrap();
        let result = prim_regexp_exec(&mut ctx, &[compiled, subject, Value::make_int(0), Value::make_int(0)]).unwrap();
        assert_eq!(result, Value::NULL);
    }

    #[test]
    fn exec_honours_a_nonzero_start_offset() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut session = Session::new(&VmConfig::default());
        let mut ctx = PrimCtx { heap: &mut heap, roots: &mut roots, globals: &mut globals, session: &mut session };
        let compiled = make(&mut ctx, "[0-9]+");
        let subject = alloc_string(ctx.heap, "a1 b2", |visit| ctx.roots.for_each_root(visit)).unwrap();
        let result = prim_regexp_exec(&mut ctx, &[compiled, subject, Value::make_int(3), Value::make_int(0)]).unwrap();
        assert_eq!(string_str(ctx.heap, ctx.heap.get_cell(result, 0)), "2");
    }
}
