//! The opcode table shared by the emitter (`quill-compiler`) and the
//! interpreter (`quill-runtime`), so the two crates can never disagree
//! about what a byte in a bytecode stream means.
//!
//! Each mnemonic is a one-byte opcode, optionally followed by an immediate.
//! `recall`/`assign`/`closure-var` each come in three contiguous variants
//! (local/closure/global) sharing a base opcode plus an offset of 0/1/2, so
//! the interpreter can decode the variable class with one subtraction
//! instead of a match per mnemonic.

#![allow(non_upper_case_globals)]

pub const VAR_LOCAL: u8 = 0;
pub const VAR_CLOSURE: u8 = 1;
pub const VAR_GLOBAL: u8 = 2;

pub const Recall: u8 = 0x00; // + VAR_*, operand: B (local/closure) or W (global)
pub const Assign: u8 = 0x03; // + VAR_*
pub const ClosureVar: u8 = 0x06; // + VAR_*

pub const Constant1: u8 = 0x09; // B
pub const Constant2: u8 = 0x0A; // W
pub const Integer1: u8 = 0x0B; // b
pub const Integer2: u8 = 0x0C; // w

pub const Closure: u8 = 0x0D; // B: capture count
pub const ClosureCode1: u8 = 0x0E; // B: constant-pool index of a code object
pub const ClosureCode2: u8 = 0x0F; // W

pub const Execute: u8 = 0x10; // B: arg count
pub const ExecutePrimitive: u8 = 0x11; // B
pub const ExecuteSecure: u8 = 0x12; // B
pub const ExecuteVarargs: u8 = 0x13; // B
pub const ExecuteGlobal1: u8 = 0x14; // W (one immediate width used; kept distinct from ExecuteGlobal2 for symmetry with the other paired opcodes)
pub const ExecuteGlobal2: u8 = 0x15; // W

pub const Argcheck: u8 = 0x16; // B
pub const Varargs: u8 = 0x17; // -

pub const Discard: u8 = 0x18; // -
pub const PopN: u8 = 0x19; // B
pub const ExitN: u8 = 0x1A; // B

pub const Branch1: u8 = 0x1B; // b
pub const Branch2: u8 = 0x1C; // w
pub const BranchZ1: u8 = 0x1D; // b
pub const BranchZ2: u8 = 0x1E; // w
pub const BranchNz1: u8 = 0x1F; // b
pub const BranchNz2: u8 = 0x20; // w
pub const Loop1: u8 = 0x21; // b
pub const Loop2: u8 = 0x22; // w

pub const ClearLocal: u8 = 0x23; // B

pub const Typecheck: u8 = 0x24; // + type tag (0..=18), 19 opcodes wide

pub const BuiltinBase: u8 = Typecheck + crate::header::TypeTag::COUNT; // contiguous range of 13
pub const BuiltinEq: u8 = BuiltinBase;
pub const BuiltinNeq: u8 = BuiltinBase + 1;
pub const BuiltinLt: u8 = BuiltinBase + 2;
pub const BuiltinLe: u8 = BuiltinBase + 3;
pub const BuiltinGt: u8 = BuiltinBase + 4;
pub const BuiltinGe: u8 = BuiltinBase + 5;
pub const BuiltinRef: u8 = BuiltinBase + 6;
pub const BuiltinSet: u8 = BuiltinBase + 7;
pub const BuiltinAdd: u8 = BuiltinBase + 8;
pub const BuiltinSub: u8 = BuiltinBase + 9;
pub const BuiltinBitAnd: u8 = BuiltinBase + 10;
pub const BuiltinBitOr: u8 = BuiltinBase + 11;
pub const BuiltinNot: u8 = BuiltinBase + 12;

pub const Return: u8 = BuiltinBase + 13;
pub const Define: u8 = Return + 1;

/// One past the highest opcode actually in use; useful for a disassembler's
/// bounds check.
pub const OPCODE_COUNT: u8 = Define + 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_classes_are_contiguous_and_distinct() {
        assert_eq!(Recall + VAR_LOCAL, Recall);
        assert_eq!(Recall + VAR_CLOSURE, Recall + 1);
        assert_eq!(Recall + VAR_GLOBAL, Recall + 2);
        assert_ne!(Recall, Assign);
        assert_ne!(Assign, ClosureVar);
    }

    #[test]
    fn typecheck_spans_exactly_one_opcode_per_tag() {
        assert_eq!(BuiltinBase, Typecheck + 19);
    }

    #[test]
    fn opcode_count_is_in_byte_range() {
        assert!(OPCODE_COUNT < 255);
    }
}
