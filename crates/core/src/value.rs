//! The tagged value: a single machine word that is either a small signed
//! integer or a reference to a heap object.
//!
//! The low-order bit discriminates: set means "the rest is a tagged
//! integer"; clear means "this word is the canonical null, or the byte
//! offset of a heap object in the currently active semispace". Heap objects
//! are always allocated at an offset that is a multiple of [`crate::header::ALIGN`]
//! (8), so a real heap reference never has its low bit set and can never be
//! confused with an integer.

use std::fmt;

/// Width, in bits, of a tagged integer (one bit narrower than the word).
pub const INT_BITS: u32 = 63;

/// Largest representable tagged integer.
pub const MAXINT: i64 = (1i64 << (INT_BITS - 1)) - 1;

/// Smallest representable tagged integer.
pub const MININT: i64 = -(1i64 << (INT_BITS - 1));

/// Sign-extend `n` as though it only had [`INT_BITS`] bits, producing the
/// wraparound behaviour required of tagged-integer arithmetic
/// (`MAXINT + 1 == MININT`).
#[inline]
pub fn wrap_to_tagged(n: i64) -> i64 {
    let shift = 64 - INT_BITS;
    (n << shift) >> shift
}

/// A tagged value: either a small integer or a reference to a heap object.
///
/// `Value` is `Copy` and carries no lifetime; it is meaningful only relative
/// to a particular [`crate::heap::Heap`] generation, because heap references
/// are offsets that a collection cycle may rewrite. Code that holds a
/// `Value` across an allocation call must re-register it as a root (see
/// [`crate::roots::RootStack`]) or re-read it from wherever the GC is known
/// to update it in place.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(pub u64);

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "Value::Int({})", self.as_int())
        } else if self.is_null() {
            write!(f, "Value::Null")
        } else {
            write!(f, "Value::Ref(@{:#x})", self.0)
        }
    }
}

impl Value {
    /// The canonical null/empty-list value.
    pub const NULL: Value = Value(0);

    #[inline]
    pub fn is_int(self) -> bool {
        self.0 & 1 == 1
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_ref(self) -> bool {
        !self.is_int() && !self.is_null()
    }

    /// Build a tagged integer, wrapping at [`INT_BITS`] rather than
    /// panicking.
    #[inline]
    pub fn make_int(n: i64) -> Value {
        let n = wrap_to_tagged(n);
        Value(((n as u64) << 1) | 1)
    }

    /// Extract the integer payload. Caller must have checked [`is_int`].
    #[inline]
    pub fn as_int(self) -> i64 {
        debug_assert!(self.is_int());
        (self.0 as i64) >> 1
    }

    /// `false` is the tagged integer zero; every other value (including
    /// `null`, any nonzero integer, and every heap reference) is truthy.
    #[inline]
    pub fn is_truthy(self) -> bool {
        !(self.is_int() && self.as_int() == 0)
    }

    #[inline]
    pub fn make_bool(b: bool) -> Value {
        Value::make_int(if b { 1 } else { 0 })
    }

    /// Construct a heap reference from a raw, alignment-checked byte offset.
    /// Only the allocator should call this.
    #[inline]
    pub(crate) fn from_offset(offset: u32) -> Value {
        debug_assert!(offset != 0, "offset 0 is reserved for null");
        debug_assert!(offset % 8 == 0, "heap offsets must be 8-aligned");
        Value(offset as u64)
    }

    /// The byte offset of the referenced object. Caller must have checked
    /// [`is_ref`].
    #[inline]
    pub(crate) fn offset(self) -> u32 {
        debug_assert!(self.is_ref());
        self.0 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        for n in [-1, 0, 1, 42, MAXINT, MININT, MAXINT - 1, MININT + 1] {
            let v = Value::make_int(n);
            assert!(v.is_int());
            assert_eq!(v.as_int(), n);
        }
    }

    #[test]
    fn wraparound_at_width() {
        assert_eq!(Value::make_int(MAXINT.wrapping_add(1)).as_int(), MININT);
        assert_eq!(Value::make_int(MININT.wrapping_sub(1)).as_int(), MAXINT);
    }

    #[test]
    fn null_is_not_int() {
        assert!(Value::NULL.is_null());
        assert!(!Value::NULL.is_int());
        assert!(!Value::NULL.is_ref());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::make_int(0).is_truthy());
        assert!(Value::make_int(1).is_truthy());
        assert!(Value::make_int(-1).is_truthy());
        // null is truthy: only integer zero is false.
        assert!(Value::NULL.is_truthy());
    }

    #[test]
    fn bool_encoding() {
        assert_eq!(Value::make_bool(false), Value::make_int(0));
        assert_eq!(Value::make_bool(true), Value::make_int(1));
    }
}
