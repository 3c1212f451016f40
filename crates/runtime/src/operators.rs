//! The global primitives backing every `builtin_X` fast-path opcode
//! (`+`, `-`, `&`, `|`, `not`, `=`, `!=`, `<`, `<=`, `>`, `>=`, `ref`,
//! `set`) plus the handful of `arithmetic.rs` operations with no dedicated
//! opcode at all (`*`, `/`, `%`, `negate`, `abs`).
//!
//! `builtin_X` is a fast path over two tagged integers; the
//! interpreter falls back to calling the matching primitive here by name
//! whenever an operand isn't a tagged integer, so `(+ 1 2.0)` and `(< "a"
//! "b")`-shaped bad-type errors both go through the same arity/type
//! checking idiom as every other primitive (grounded on `primitives.rs`'s
//! string-library argument-checking pattern) instead of a second, bytecode
//! -only code path.

use crate::arithmetic;
use crate::error::{ErrorCode, RuntimeError};
use crate::primitives::PrimCtx;
use quill_core::{TypeTag, Value};

/// An operand widened to `f64` if it is a tagged integer or a boxed
/// float; `None` for anything else.
fn as_number(ctx: &PrimCtx, v: Value) -> Option<f64> {
    if v.is_int() {
        Some(v.as_int() as f64)
    } else if v.is_ref() && ctx.heap.tag(v) == TypeTag::Float {
        Some(arithmetic::float_from_bytes(ctx.heap.payload(v)))
    } else {
        None
    }
}

fn alloc_float(ctx: &mut PrimCtx, f: f64) -> Result<Value, RuntimeError> {
    let roots = &mut *ctx.roots;
    ctx.heap
        .alloc_bytes(TypeTag::Float, &arithmetic::float_bytes(f), |visit| roots.for_each_root(visit))
        .map_err(|_| RuntimeError::new(ErrorCode::BadValue))
}

/// `a OP b` where both operands are tagged integers does the exact
/// wraparound-aware integer op; where either is a float, promotes both to
/// `f64` and does float arithmetic; anything else is `bad_type`.
fn numeric_binop(
    ctx: &mut PrimCtx,
    args: &[Value],
    int_op: fn(i64, i64) -> Value,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    if args[0].is_int() && args[1].is_int() {
        return Ok(int_op(args[0].as_int(), args[1].as_int()));
    }
    let a = as_number(ctx, args[0]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    let b = as_number(ctx, args[1]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    alloc_float(ctx, float_op(a, b))
}

fn numeric_cmp(ctx: &PrimCtx, args: &[Value], int_cmp: fn(i64, i64) -> bool, float_cmp: fn(f64, f64) -> bool) -> Result<Value, RuntimeError> {
    if args[0].is_int() && args[1].is_int() {
        return Ok(Value::make_bool(int_cmp(args[0].as_int(), args[1].as_int())));
    }
    let a = as_number(ctx, args[0]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    let b = as_number(ctx, args[1]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    Ok(Value::make_bool(float_cmp(a, b)))
}

pub fn prim_add(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_binop(ctx, args, arithmetic::add, |a, b| a + b)
}

pub fn prim_sub(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_binop(ctx, args, arithmetic::sub, |a, b| a - b)
}

pub fn prim_mul(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_binop(ctx, args, arithmetic::mul, |a, b| a * b)
}

pub fn prim_div(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if args[0].is_int() && args[1].is_int() {
        return arithmetic::div(args[0].as_int(), args[1].as_int());
    }
    let a = as_number(ctx, args[0]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    let b = as_number(ctx, args[1]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    if b == 0.0 {
        return Err(RuntimeError::new(ErrorCode::DivideByZero));
    }
    alloc_float(ctx, a / b)
}

pub fn prim_mod(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args[0].is_int() || !args[1].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    arithmetic::modulo(args[0].as_int(), args[1].as_int())
}

pub fn prim_negate(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if args[0].is_int() {
        return Ok(arithmetic::neg(args[0].as_int()));
    }
    let a = as_number(ctx, args[0]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    alloc_float(ctx, -a)
}

pub fn prim_abs(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if args[0].is_int() {
        return Ok(arithmetic::abs(args[0].as_int()));
    }
    let a = as_number(ctx, args[0]).ok_or_else(|| RuntimeError::new(ErrorCode::BadType))?;
    alloc_float(ctx, a.abs())
}

pub fn prim_lt(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_cmp(ctx, args, |a, b| a < b, |a, b| a < b)
}

pub fn prim_le(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_cmp(ctx, args, |a, b| a <= b, |a, b| a <= b)
}

pub fn prim_gt(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_cmp(ctx, args, |a, b| a > b, |a, b| a > b)
}

pub fn prim_ge(ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    numeric_cmp(ctx, args, |a, b| a >= b, |a, b| a >= b)
}

/// Raw bit-equality on any pair of values, matching `builtin_eq`'s inline
/// fast path exactly — not restricted to numbers.
pub fn prim_eq(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::make_bool(args[0].0 == args[1].0))
}

pub fn prim_neq(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::make_bool(args[0].0 != args[1].0))
}

pub fn prim_bitand(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args[0].is_int() || !args[1].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    Ok(arithmetic::bitand(args[0].as_int(), args[1].as_int()))
}

pub fn prim_bitor(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args[0].is_int() || !args[1].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    Ok(arithmetic::bitor(args[0].as_int(), args[1].as_int()))
}

pub fn prim_not(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::make_bool(!args[0].is_truthy()))
}

/// Bit `y` of tagged integer `x`, as a boolean. Matches `builtin_ref`'s
/// inline fast path.
pub fn prim_ref(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args[0].is_int() || !args[1].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    let (x, y) = (args[0].as_int(), args[1].as_int());
    Ok(Value::make_bool((x >> y) & 1 == 1))
}

/// `x` with bit `y` set, matching `builtin_set`'s inline fast path.
pub fn prim_set(_ctx: &mut PrimCtx, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args[0].is_int() || !args[1].is_int() {
        return Err(RuntimeError::new(ErrorCode::BadType));
    }
    let (x, y) = (args[0].as_int(), args[1].as_int());
    Ok(Value::make_int(x | (1 << y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::session::Session;
    use quill_core::{GlobalEnv, Heap, RootStack};

    fn ctx<'a>(heap: &'a mut Heap, roots: &'a mut RootStack, globals: &'a mut GlobalEnv, session: &'a mut Session) -> PrimCtx<'a> {
        PrimCtx { heap, roots, globals, session }
    }

    #[test]
    fn integer_addition_wraps_at_the_tagged_width() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut session = Session::new(&VmConfig::default());
        let mut c = ctx(&mut heap, &mut roots, &mut globals, &mut session);
        let result = prim_add(&mut c, &[Value::make_int(quill_core::MAXINT), Value::make_int(1)]).unwrap();
        assert_eq!(result.as_int(), quill_core::MININT);
    }

    #[test]
    fn mixed_int_and_float_promotes_to_float() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut session = Session::new(&VmConfig::default());
        let mut c = ctx(&mut heap, &mut roots, &mut globals, &mut session);
        let half = alloc_float(&mut c, 0.5).unwrap();
        let result = prim_add(&mut c, &[Value::make_int(1), half]).unwrap();
        assert_eq!(c.heap.tag(result), TypeTag::Float);
        assert_eq!(arithmetic::float_from_bytes(c.heap.payload(result)), 1.5);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut session = Session::new(&VmConfig::default());
        let mut c = ctx(&mut heap, &mut roots, &mut globals, &mut session);
        let err = prim_div(&mut c, &[Value::make_int(1), Value::make_int(0)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::DivideByZero);
    }
}
