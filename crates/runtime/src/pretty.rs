//! Value and code pretty-printing at three escalating levels, plus bytecode
//! disassembly built on the same opcode table the interpreter dispatches
//! on.
//!
//! `display` is the least decorated (unquoted strings, no type markers,
//! opaque objects shown as a placeholder and not descended into); `print`
//! adds quoting and structural brackets; `examine` additionally unfolds a
//! closure's captured values and a code object's disassembly. A single
//! per-call atom budget (`MAX_PRINT_ATOMS`, carried over from the reference
//! implementation's `MAX_PRINT_COUNT`) bounds the work printing a huge or
//! cyclic value can do: exhausting it aborts the whole call with a
//! `<complex>` marker rather than the partial output built so far, mirroring
//! a long-jump back to the top-level print call.
//!
//! Cycles are caught separately, by an identity-based (heap-offset-keyed)
//! "currently being printed" set: printing the same object twice in
//! unrelated positions (shared substructure) is fine and common, but
//! re-entering an object still on the current print path means a cycle and
//! is rendered as `<cycle>` instead of recursing forever.

use quill_core::{opcodes as op, Heap, TypeTag, Value};
use std::collections::HashSet;
use std::fmt::Write as _;

pub const MAX_PRINT_ATOMS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Display,
    Print,
    Examine,
}

struct TooComplex;

struct Printer<'a> {
    heap: &'a Heap,
    level: Level,
    budget: usize,
    on_stack: HashSet<u64>,
}

impl Printer<'_> {
    fn charge(&mut self) -> Result<(), TooComplex> {
        if self.budget == 0 {
            return Err(TooComplex);
        }
        self.budget -= 1;
        Ok(())
    }

    fn write(&mut self, out: &mut String, v: Value) -> Result<(), TooComplex> {
        self.charge()?;
        if v.is_int() {
            write!(out, "{}", v.as_int()).unwrap();
            return Ok(());
        }
        if v.is_null() {
            out.push_str("()");
            return Ok(());
        }
        let key = v.0;
        if !self.on_stack.insert(key) {
            out.push_str("<cycle>");
            return Ok(());
        }
        let result = self.write_ref(out, v);
        self.on_stack.remove(&key);
        result
    }

    fn write_ref(&mut self, out: &mut String, v: Value) -> Result<(), TooComplex> {
        match self.heap.tag(v) {
            TypeTag::String => self.write_string(out, v),
            TypeTag::Pair => self.write_pair(out, v),
            TypeTag::Vector => self.write_cells(out, v, '[', ']'),
            TypeTag::Symbol => self.write_cells(out, v, '{', '}'),
            TypeTag::Table => self.write_cells(out, v, '{', '}'),
            TypeTag::Variable => {
                out.push_str("&");
                self.write(out, self.heap.variable_get(v))
            }
            TypeTag::Closure => self.write_closure(out, v),
            TypeTag::Code => self.write_code(out, v),
            TypeTag::Primitive | TypeTag::VarargsPrimitive | TypeTag::SecurePrimitive => {
                out.push_str("<primitive>");
                Ok(())
            }
            TypeTag::Float => {
                write!(out, "{}", crate::arithmetic::float_from_bytes(self.heap.payload(v))).unwrap();
                Ok(())
            }
            TypeTag::Bigint => {
                out.push_str("<bigint>");
                Ok(())
            }
            TypeTag::Character | TypeTag::Object | TypeTag::OutputPort | TypeTag::Internal
            | TypeTag::Private => {
                out.push_str("<opaque>");
                Ok(())
            }
            TypeTag::Integer => unreachable!("Integer is a pseudo-tag, never a header tag"),
        }
    }

    fn write_string(&mut self, out: &mut String, v: Value) -> Result<(), TooComplex> {
        let s = crate::primitives::string_str(self.heap, v);
        if self.level == Level::Display {
            out.push_str(s);
        } else {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }
        Ok(())
    }

    fn write_pair(&mut self, out: &mut String, v: Value) -> Result<(), TooComplex> {
        out.push('(');
        self.write(out, self.heap.get_cell(v, 0))?;
        out.push_str(" . ");
        self.write(out, self.heap.get_cell(v, 1))?;
        out.push(')');
        Ok(())
    }

    fn write_cells(&mut self, out: &mut String, v: Value, open: char, close: char) -> Result<(), TooComplex> {
        out.push(open);
        let n = self.heap.cell_count(v);
        for i in 0..n {
            if i > 0 {
                out.push(' ');
            }
            self.write(out, self.heap.get_cell(v, i))?;
        }
        out.push(close);
        Ok(())
    }

    fn write_closure(&mut self, out: &mut String, v: Value) -> Result<(), TooComplex> {
        out.push_str("#<closure");
        if self.level == Level::Examine {
            out.push(' ');
            let code = self.heap.get_cell(v, 0);
            self.write_code(out, code)?;
            let ncaptures = self.heap.cell_count(v) - 1;
            for i in 0..ncaptures {
                out.push(' ');
                let boxed = self.heap.get_cell(v, i + 1);
                self.write(out, self.heap.variable_get(boxed))?;
            }
        }
        out.push('>');
        Ok(())
    }

    fn write_code(&mut self, out: &mut String, v: Value) -> Result<(), TooComplex> {
        let header = self.heap.code_header(v);
        write!(out, "#<code argc={}>", header.argc).unwrap();
        if self.level == Level::Examine {
            out.push('\n');
            out.push_str(&disassemble(self.heap, v));
        }
        Ok(())
    }
}

/// Render `v` at `level`, bounded by [`MAX_PRINT_ATOMS`]. A value (or
/// subgraph) that exhausts the budget renders as `<complex>` in its
/// entirety rather than partial output, mirroring the reference
/// implementation's long-jump back to the top-level print call.
pub fn format_value(heap: &Heap, v: Value, level: Level) -> String {
    let mut printer = Printer { heap, level, budget: MAX_PRINT_ATOMS, on_stack: HashSet::new() };
    let mut out = String::new();
    match printer.write(&mut out, v) {
        Ok(()) => out,
        Err(TooComplex) => "<complex>".to_string(),
    }
}

fn variable_class_name(class: u8) -> &'static str {
    match class {
        op::VAR_LOCAL => "local",
        op::VAR_CLOSURE => "closure",
        _ => "global",
    }
}

fn builtin_mnemonic(opcode: u8) -> &'static str {
    match opcode {
        o if o == op::BuiltinEq => "eq",
        o if o == op::BuiltinNeq => "neq",
        o if o == op::BuiltinLt => "lt",
        o if o == op::BuiltinLe => "le",
        o if o == op::BuiltinGt => "gt",
        o if o == op::BuiltinGe => "ge",
        o if o == op::BuiltinRef => "ref",
        o if o == op::BuiltinSet => "set",
        o if o == op::BuiltinAdd => "add",
        o if o == op::BuiltinSub => "sub",
        o if o == op::BuiltinBitAnd => "bitand",
        o if o == op::BuiltinBitOr => "bitor",
        o if o == op::BuiltinNot => "not",
        _ => "?",
    }
}

/// Disassemble a code object's bytecode, one instruction per line: each
/// family named by its mnemonic, variable ops additionally named by
/// class, branches shown as both the signed relative offset and the
/// resolved absolute target.
pub fn disassemble(heap: &Heap, code: Value) -> String {
    let bytecode = heap.code_bytecode(code);
    let mut out = String::new();
    let mut pc = 0usize;
    while pc < bytecode.len() {
        let start = pc;
        let opcode = bytecode[pc];
        pc += 1;
        write!(out, "{start:4}: ").unwrap();

        let class = |base: u8| opcode >= base && opcode <= base + 2;

        if class(op::Recall) {
            let c = opcode - op::Recall;
            let name = variable_class_name(c);
            if c == op::VAR_GLOBAL {
                let idx = u16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
                pc += 2;
                writeln!(out, "recall[{name}] {idx}").unwrap();
            } else {
                let idx = bytecode[pc];
                pc += 1;
                writeln!(out, "recall[{name}] {idx}").unwrap();
            }
        } else if class(op::Assign) {
            let c = opcode - op::Assign;
            let name = variable_class_name(c);
            if c == op::VAR_GLOBAL {
                let idx = u16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
                pc += 2;
                writeln!(out, "assign[{name}] {idx}").unwrap();
            } else {
                let idx = bytecode[pc];
                pc += 1;
                writeln!(out, "assign[{name}] {idx}").unwrap();
            }
        } else if class(op::ClosureVar) {
            let c = opcode - op::ClosureVar;
            let name = variable_class_name(c);
            let idx = bytecode[pc];
            pc += 1;
            writeln!(out, "closure-var[{name}] {idx}").unwrap();
        } else if opcode == op::Constant1 {
            let idx = bytecode[pc];
            pc += 1;
            writeln!(out, "constant {idx}").unwrap();
        } else if opcode == op::Constant2 {
            let idx = u16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
            pc += 2;
            writeln!(out, "constant {idx}").unwrap();
        } else if opcode == op::Integer1 {
            let n = bytecode[pc] as i8;
            pc += 1;
            writeln!(out, "integer {n}").unwrap();
        } else if opcode == op::Integer2 {
            let n = i16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
            pc += 2;
            writeln!(out, "integer {n}").unwrap();
        } else if opcode == op::Closure {
            let n = bytecode[pc];
            pc += 1;
            writeln!(out, "closure {n}").unwrap();
        } else if opcode == op::ClosureCode1 {
            let idx = bytecode[pc];
            pc += 1;
            writeln!(out, "closure-code {idx}").unwrap();
        } else if opcode == op::ClosureCode2 {
            let idx = u16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
            pc += 2;
            writeln!(out, "closure-code {idx}").unwrap();
        } else if opcode == op::Execute {
            let argc = bytecode[pc];
            pc += 1;
            writeln!(out, "execute {argc}").unwrap();
        } else if opcode == op::ExecutePrimitive {
            let argc = bytecode[pc];
            pc += 1;
            writeln!(out, "execute-primitive {argc}").unwrap();
        } else if opcode == op::ExecuteSecure {
            let argc = bytecode[pc];
            pc += 1;
            writeln!(out, "execute-secure {argc}").unwrap();
        } else if opcode == op::ExecuteVarargs {
            let argc = bytecode[pc];
            pc += 1;
            writeln!(out, "execute-varargs {argc}").unwrap();
        } else if opcode == op::ExecuteGlobal1 || opcode == op::ExecuteGlobal2 {
            let idx = u16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
            pc += 2;
            let argc = bytecode[pc];
            pc += 1;
            writeln!(out, "execute-global {idx} {argc}").unwrap();
        } else if opcode == op::Argcheck {
            let n = bytecode[pc];
            pc += 1;
            writeln!(out, "argcheck {n}").unwrap();
        } else if opcode == op::Varargs {
            writeln!(out, "varargs").unwrap();
        } else if opcode == op::Discard {
            writeln!(out, "discard").unwrap();
        } else if opcode == op::PopN {
            let n = bytecode[pc];
            pc += 1;
            writeln!(out, "pop-n {n}").unwrap();
        } else if opcode == op::ExitN {
            let n = bytecode[pc];
            pc += 1;
            writeln!(out, "exit-n {n}").unwrap();
        } else if matches!(
            opcode,
            o if o == op::Branch1 || o == op::Branch2
                || o == op::BranchZ1 || o == op::BranchZ2
                || o == op::BranchNz1 || o == op::BranchNz2
                || o == op::Loop1 || o == op::Loop2
        ) {
            let short = matches!(opcode, o if o == op::Branch1 || o == op::BranchZ1 || o == op::BranchNz1 || o == op::Loop1);
            // The emitter always reserves a fixed 3-byte footprint (opcode +
            // 2 operand bytes) for a branch, padding the unused byte with a
            // zero rather than shrinking the instruction, so the anchor and
            // the pc advancement are both `+2` regardless of form.
            let rel: isize = if short {
                bytecode[pc] as i8 as isize
            } else {
                i16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]) as isize
            };
            let anchor = pc + 2;
            pc += 2;
            let target = (anchor as isize + rel) as usize;
            let mnemonic = if opcode == op::Branch1 || opcode == op::Branch2 {
                "branch"
            } else if opcode == op::BranchZ1 || opcode == op::BranchZ2 {
                "branch-if-zero"
            } else if opcode == op::BranchNz1 || opcode == op::BranchNz2 {
                "branch-if-nonzero"
            } else {
                "loop"
            };
            writeln!(out, "{mnemonic} {rel:+} -> {target}").unwrap();
        } else if opcode == op::ClearLocal {
            let idx = bytecode[pc];
            pc += 1;
            writeln!(out, "clear-local {idx}").unwrap();
        } else if (op::Typecheck..op::BuiltinBase).contains(&opcode) {
            let tag = TypeTag::from_u8(opcode - op::Typecheck);
            writeln!(out, "typecheck {tag:?}").unwrap();
        } else if (op::BuiltinBase..op::Return).contains(&opcode) {
            writeln!(out, "builtin-{}", builtin_mnemonic(opcode)).unwrap();
        } else if opcode == op::Return {
            writeln!(out, "return").unwrap();
        } else if opcode == op::Define {
            let idx = u16::from_be_bytes([bytecode[pc], bytecode[pc + 1]]);
            pc += 2;
            writeln!(out, "define {idx}").unwrap();
        } else {
            writeln!(out, "??? ({opcode:#04x})").unwrap();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{GlobalEnv, RootStack};

    #[test]
    fn display_omits_quotes_print_adds_them() {
        let mut heap = Heap::new(4096);
        let mut roots = RootStack::new();
        let s = crate::primitives::alloc_string(&mut heap, "hi", |visit| roots.for_each_root(visit)).unwrap();
        assert_eq!(format_value(&heap, s, Level::Display), "hi");
        assert_eq!(format_value(&heap, s, Level::Print), "\"hi\"");
    }

    #[test]
    fn integers_print_plainly_at_every_level() {
        let heap = Heap::new(4096);
        let v = Value::make_int(42);
        assert_eq!(format_value(&heap, v, Level::Display), "42");
        assert_eq!(format_value(&heap, v, Level::Examine), "42");
    }

    #[test]
    fn null_prints_as_the_empty_list() {
        let heap = Heap::new(4096);
        assert_eq!(format_value(&heap, Value::NULL, Level::Print), "()");
    }

    #[test]
    fn a_self_referencing_pair_prints_a_cycle_marker_not_an_infinite_string() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let placeholder = crate::gc_util::alloc_cells(
            &mut heap, &mut globals, &mut roots, TypeTag::Pair, &[Value::NULL, Value::NULL],
        )
        .unwrap();
        heap.set_cell(placeholder, 0, placeholder).unwrap();
        heap.set_cell(placeholder, 1, Value::NULL).unwrap();
        let rendered = format_value(&heap, placeholder, Level::Print);
        assert!(rendered.contains("<cycle>"));
    }

    #[test]
    fn a_huge_list_bails_out_to_complex_instead_of_printing_everything() {
        let mut heap = Heap::new(1 << 20);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let mut list = Value::NULL;
        for i in 0..(MAX_PRINT_ATOMS * 2) {
            let depth = roots.depth();
            let tail_root = roots.push(list);
            let tail = roots.get(tail_root);
            list = crate::gc_util::alloc_cells(
                &mut heap, &mut globals, &mut roots, TypeTag::Pair, &[Value::make_int(i as i64), tail],
            )
            .unwrap();
            roots.truncate(depth);
        }
        assert_eq!(format_value(&heap, list, Level::Print), "<complex>");
    }

    #[test]
    fn disassembly_resolves_a_branch_target_absolutely() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        // branch_if_zero (short) always occupies its full 3-byte footprint
        // (opcode + operand + zero pad), matching the emitter's actual
        // output, jumping to the `Return` past an intervening `Integer1`.
        let bytecode = vec![op::BranchZ1, 2, 0, op::Integer1, 0, op::Return];
        let header = quill_core::CodeHeader { argc: 0, seclevel: 0, nlocals: 0, stack_depth: 1 };
        let code = crate::gc_util::alloc_code(&mut heap, &mut globals, &mut roots, header, &[], &bytecode).unwrap();
        let text = disassemble(&heap, code);
        assert!(text.contains("-> 5"));
    }
}
