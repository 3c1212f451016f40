//! Integer and float arithmetic, with the exact wraparound, truncation, and
//! floor-division rules a builtin fast-path or a `+`/`-`/`*`/`/`/`%`
//! primitive must honour.
//!
//! Tagged-integer width is one bit narrower than the machine word
//! ([`quill_core::INT_BITS`]); [`quill_core::Value::make_int`] already
//! performs the sign-extending wraparound, so every function here works in
//! ordinary 64-bit arithmetic and lets `make_int` fold the result back into
//! range. This is what makes `negate(MININT) == MININT` and
//! `abs(MININT) == MININT` true: negating or taking the absolute value of
//! `MININT` (roughly `-2^62`) produces `2^62`, one past `MAXINT`, which
//! `make_int` wraps straight back to `MININT`.

use crate::error::{ErrorCode, RuntimeError};
use quill_core::Value;

pub fn add(a: i64, b: i64) -> Value {
    Value::make_int(a + b)
}

pub fn sub(a: i64, b: i64) -> Value {
    Value::make_int(a - b)
}

pub fn neg(a: i64) -> Value {
    Value::make_int(-a)
}

pub fn abs(a: i64) -> Value {
    Value::make_int(a.abs())
}

pub fn mul(a: i64, b: i64) -> Value {
    Value::make_int(a.wrapping_mul(b))
}

/// Truncated division (`a / b`, Rust's native semantics: rounds toward
/// zero), satisfying `(a/b)*b + (a%b) = a` together with [`rem`].
pub fn div(a: i64, b: i64) -> Result<Value, RuntimeError> {
    if b == 0 {
        return Err(RuntimeError::new(ErrorCode::DivideByZero));
    }
    Ok(Value::make_int(a / b))
}

/// Truncated remainder, same sign as `a`.
pub fn rem(a: i64, b: i64) -> Result<Value, RuntimeError> {
    if b == 0 {
        return Err(RuntimeError::new(ErrorCode::DivideByZero));
    }
    Ok(Value::make_int(a % b))
}

/// Division rounding toward negative infinity, satisfying
/// `floor(a/b)*b + modulo(a,b) = a` together with [`modulo`].
pub fn floor_div(a: i64, b: i64) -> Result<Value, RuntimeError> {
    if b == 0 {
        return Err(RuntimeError::new(ErrorCode::DivideByZero));
    }
    let q = a / b;
    let r = a % b;
    let q = if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q };
    Ok(Value::make_int(q))
}

/// Remainder matching floor division: same sign as `b`, never `a`.
pub fn modulo(a: i64, b: i64) -> Result<Value, RuntimeError> {
    if b == 0 {
        return Err(RuntimeError::new(ErrorCode::DivideByZero));
    }
    let r = a % b;
    let r = if r != 0 && (r < 0) != (b < 0) { r + b } else { r };
    Ok(Value::make_int(r))
}

pub fn bitand(a: i64, b: i64) -> Value {
    Value::make_int(a & b)
}

pub fn bitor(a: i64, b: i64) -> Value {
    Value::make_int(a | b)
}

/// A boxed IEEE-754 double, stored as its 8 big-endian bytes in a
/// [`quill_core::TypeTag::Float`] object's payload.
pub fn float_bytes(f: f64) -> [u8; 8] {
    f.to_be_bytes()
}

pub fn float_from_bytes(bytes: &[u8]) -> f64 {
    f64::from_be_bytes(bytes[0..8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{MAXINT, MININT};

    #[test]
    fn add_wraps_past_maxint() {
        assert_eq!(add(MAXINT, 1).as_int(), MININT);
    }

    #[test]
    fn sub_wraps_past_minint() {
        assert_eq!(sub(MININT, 1).as_int(), MAXINT);
    }

    #[test]
    fn negate_minint_is_minint() {
        assert_eq!(neg(MININT).as_int(), MININT);
    }

    #[test]
    fn abs_minint_is_minint() {
        assert_eq!(abs(MININT).as_int(), MININT);
    }

    #[test]
    fn div_by_zero_is_an_error() {
        assert!(div(1, 0).is_err());
        assert!(modulo(1, 0).is_err());
    }

    #[test]
    fn truncated_division_identity_holds() {
        let (a, b) = (-7, 2);
        let q = div(a, b).unwrap().as_int();
        let r = rem(a, b).unwrap().as_int();
        assert_eq!(q * b + r, a);
        assert_eq!(q, -3); // truncates toward zero
    }

    #[test]
    fn floor_division_identity_holds() {
        let (a, b) = (-7, 2);
        let q = floor_div(a, b).unwrap().as_int();
        let m = modulo(a, b).unwrap().as_int();
        assert_eq!(q * b + m, a);
        assert_eq!(q, -4); // rounds toward negative infinity
        assert_eq!(m, 1); // same sign as the divisor
    }

    #[test]
    fn float_bytes_roundtrip() {
        let f = 3.5_f64;
        assert_eq!(float_from_bytes(&float_bytes(f)), f);
    }
}
