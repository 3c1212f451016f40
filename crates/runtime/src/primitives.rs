//! The primitive-call protocol and a handful of worked-example primitives.
//!
//! Individual primitives are out of scope; what's in scope is the protocol
//! a native function is invoked through — arity checking, security-level
//! checking, and the args-as-an-explicit-slice calling convention — so this
//! module carries just enough concrete primitives (grounded on a string
//! library's argument-checking idiom: type-check each argument, then
//! compute) to exercise that protocol end to end, plus `global-list`.

use crate::error::{ErrorCode, RuntimeError};
use quill_core::{GlobalEnv, Heap, RootStack, TypeTag, Value, VarClass};

pub struct PrimCtx<'a> {
    pub heap: &'a mut Heap,
    pub roots: &'a mut RootStack,
    pub globals: &'a mut GlobalEnv,
    pub session: &'a mut crate::session::Session,
}

impl PrimCtx<'_> {
    pub(crate) fn check_type(&self, v: Value, tag: TypeTag) -> Result<(), RuntimeError> {
        if v.is_ref() && self.heap.tag(v) == tag {
            Ok(())
        } else {
            Err(RuntimeError::new(ErrorCode::BadType))
        }
    }
}

pub type PrimitiveFn = fn(&mut PrimCtx, &[Value]) -> Result<Value, RuntimeError>;

#[derive(Clone, Copy)]
pub struct PrimitiveDescriptor {
    pub name: &'static str,
    pub min_args: u8,
    pub max_args: u8,
    pub seclevel: u8,
    pub varargs: bool,
    pub func: PrimitiveFn,
}

#[derive(Default)]
pub struct PrimitiveRegistry {
    descriptors: Vec<PrimitiveDescriptor>,
}

impl PrimitiveRegistry {
    pub fn get(&self, idx: usize) -> &PrimitiveDescriptor {
        &self.descriptors[idx]
    }

    fn push(&mut self, d: PrimitiveDescriptor) -> usize {
        self.descriptors.push(d);
        self.descriptors.len() - 1
    }
}

/// Allocate a string object, appending the terminating zero the header's
/// length field does not count.
pub fn alloc_string<F>(heap: &mut Heap, s: &str, visit_roots: F) -> Result<Value, quill_core::OutOfMemory>
where
    F: FnMut(&mut dyn FnMut(&mut Value)),
{
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    heap.alloc_bytes(TypeTag::String, &bytes, visit_roots)
}

/// The string's content, with the terminating zero stripped.
pub fn string_str(heap: &Heap, v: Value) -> &str {
    let bytes = heap.payload(v);
    let without_nul = &bytes[..bytes.len() - 1];
    std::str::from_utf8(without_nul).unwrap_or("")
}

fn prim_string_length(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    ctx.check_type(args[0], TypeTag::String)?;
    let len = ctx.heap.payload(args[0]).len() - 1;
    Ok(Value::make_int(len as i64))
}

fn prim_string_append(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    ctx.check_type(args[0], TypeTag::String)?;
    ctx.check_type(args[1], TypeTag::String)?;
    let mut combined = String::new();
    combined.push_str(string_str(ctx.heap, args[0]));
    combined.push_str(string_str(ctx.heap, args[1]));
    let roots = ctx.roots;
    alloc_string(ctx.heap, &combined, |visit| roots.for_each_root(visit))
        .map_err(|_| RuntimeError::new(ErrorCode::BadValue))
}

fn prim_substring(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    ctx.check_type(args[0], TypeTag::String)?;
    if !args[1].is_int() || !args[2].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    let s = string_str(ctx.heap, args[0]);
    let chars: Vec<char> = s.chars().collect();
    let start = args[1].as_int();
    let len = args[2].as_int();
    if start < 0 || len < 0 || (start + len) as usize > chars.len() {
        return Err(RuntimeError::new(ErrorCode::BadIndex));
    }
    let slice: String = chars[start as usize..(start + len) as usize].iter().collect();
    let roots = ctx.roots;
    alloc_string(ctx.heap, &slice, |visit| roots.for_each_root(visit))
        .map_err(|_| RuntimeError::new(ErrorCode::BadValue))
}

fn prim_string_eq(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    ctx.check_type(args[0], TypeTag::String)?;
    ctx.check_type(args[1], TypeTag::String)?;
    let eq = string_str(ctx.heap, args[0]) == string_str(ctx.heap, args[1]);
    Ok(Value::make_bool(eq))
}

fn prim_string_compare(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    ctx.check_type(args[0], TypeTag::String)?;
    ctx.check_type(args[1], TypeTag::String)?;
    let ordering = string_str(ctx.heap, args[0]).cmp(string_str(ctx.heap, args[1]));
    Ok(Value::make_int(ordering as i64))
}

/// Every global's name, as a list of fresh string objects (cons'd as a
/// pair chain).
fn prim_global_list(ctx: &mut PrimCtx, _args: &[Value]) -> Result<Value, RuntimeError> {
    let names: Vec<String> = ctx.globals.list().to_vec();
    let mut result = Value::NULL;
    for name in names.into_iter().rev() {
        let depth = ctx.roots.depth();
        let result_root = ctx.roots.push(result);
        let s = alloc_string(ctx.heap, &name, |visit| ctx.roots.for_each_root(visit))
            .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
        let result_now = ctx.roots.get(result_root);
        ctx.roots.truncate(depth);
        result = crate::gc_util::alloc_cells(ctx.heap, ctx.globals, ctx.roots, TypeTag::Pair, &[s, result_now])
            .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
    }
    Ok(result)
}

/// Register every worked-example primitive as a `Primitive` heap object
/// bound to a system-writable global of the same name, returning the
/// registry the interpreter's `execute`/`execute_primitive` dispatch
/// consults to find the native function back from the object's payload.
pub fn register_builtins(heap: &mut Heap, globals: &mut GlobalEnv, roots: &mut RootStack) -> PrimitiveRegistry {
    let mut registry = PrimitiveRegistry::default();
    let table: &[(&str, u8, u8, PrimitiveFn)] = &[
        ("string-length", 1, 1, prim_string_length),
        ("string-append", 2, 2, prim_string_append),
        ("substring", 3, 3, prim_substring),
        ("string-equal?", 2, 2, prim_string_eq),
        ("string-compare", 2, 2, prim_string_compare),
        ("global-list", 0, 0, prim_global_list),
        ("+", 2, 2, crate::operators::prim_add),
        ("-", 2, 2, crate::operators::prim_sub),
        ("*", 2, 2, crate::operators::prim_mul),
        ("/", 2, 2, crate::operators::prim_div),
        ("%", 2, 2, crate::operators::prim_mod),
        ("negate", 1, 1, crate::operators::prim_negate),
        ("abs", 1, 1, crate::operators::prim_abs),
        ("<", 2, 2, crate::operators::prim_lt),
        ("<=", 2, 2, crate::operators::prim_le),
        (">", 2, 2, crate::operators::prim_gt),
        (">=", 2, 2, crate::operators::prim_ge),
        ("=", 2, 2, crate::operators::prim_eq),
        ("!=", 2, 2, crate::operators::prim_neq),
        ("&", 2, 2, crate::operators::prim_bitand),
        ("|", 2, 2, crate::operators::prim_bitor),
        ("not", 1, 1, crate::operators::prim_not),
        ("ref", 2, 2, crate::operators::prim_ref),
        ("set", 2, 2, crate::operators::prim_set),
        #[cfg(feature = "regex")]
        ("make-regexp", 2, 2, crate::regex::prim_make_regexp),
        #[cfg(feature = "regex")]
        ("regexp-exec", 4, 4, crate::regex::prim_regexp_exec),
        #[cfg(not(feature = "regex"))]
        ("make-regexp", 2, 2, crate::regex_stub::prim_make_regexp),
        #[cfg(not(feature = "regex"))]
        ("regexp-exec", 4, 4, crate::regex_stub::prim_regexp_exec),
    ];
    for &(name, min_args, max_args, func) in table {
        let idx = registry.push(PrimitiveDescriptor {
            name,
            min_args,
            max_args,
            seclevel: 0,
            varargs: false,
            func,
        });
        let payload = (idx as u32).to_be_bytes();
        let value = heap
            .alloc_bytes(TypeTag::Primitive, &payload, |visit| roots.for_each_root(visit))
            .expect("registering a builtin primitive should never exhaust a fresh heap");
        let gidx = globals.lookup(name);
        globals.set(gidx, value);
        globals.set_class(gidx, VarClass::SystemWritable);
    }
    registry
}

/// The registry index a `Primitive`/`VarargsPrimitive`/`SecurePrimitive`
/// object's payload stores.
pub fn primitive_index(heap: &Heap, v: Value) -> usize {
    u32::from_be_bytes(heap.payload(v)[0..4].try_into().unwrap()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::session::Session;

    #[test]
    fn string_length_counts_bytes_not_the_terminator() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let registry = register_builtins(&mut heap, &mut globals, &mut roots);
        let mut session = Session::new(&VmConfig::default());
        let s = alloc_string(&mut heap, "hello", |visit| roots.for_each_root(visit)).unwrap();
        let idx = primitive_index(&heap, globals_value(&globals, "string-length"));
        let mut ctx = PrimCtx { heap: &mut heap, roots: &mut roots, globals: &mut globals, session: &mut session };
        let result = (registry.get(idx).func)(&mut ctx, &[s]).unwrap();
        assert_eq!(result.as_int(), 5);
    }

    fn globals_value(globals: &GlobalEnv, name: &str) -> Value {
        globals.get(globals.find(name).unwrap())
    }
}
