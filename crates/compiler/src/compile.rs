//! Ties the reader, resolver, and emitter together: AST in, a
//! [`CompiledCode`] out, or a non-empty [`Diagnostics`] buffer.
//!
//! A whole compiled unit is itself a zero-argument function whose body is
//! every top-level form run in sequence, so the runtime always has a single
//! entry point to invoke regardless of how many top-level defines a source
//! text contains.

use crate::ast::Expr;
use crate::code::CompiledCode;
use crate::diagnostics::Diagnostics;
use crate::emitter::Emitter;
use crate::reader::{read_program, ReaderError};
use crate::resolver::{CaptureSource, ClosureSlot, Resolved, Resolver};
use quill_core::{opcodes as op, GlobalEnv};

/// The `BuiltinX` opcode a call to global `name` with `arity` arguments
/// compiles straight to, bypassing `execute_global` entirely — or `None` if
/// `name` isn't one of the fast-path operators. Kept in sync with the
/// primitives of the same name that `builtin_X`'s interpreter-side fallback
/// calls when an operand isn't a tagged integer.
fn builtin_opcode_for(name: &str, arity: usize) -> Option<u8> {
    if arity == 1 && name == "not" {
        return Some(op::BuiltinNot);
    }
    if arity != 2 {
        return None;
    }
    Some(match name {
        "=" => op::BuiltinEq,
        "!=" => op::BuiltinNeq,
        "<" => op::BuiltinLt,
        "<=" => op::BuiltinLe,
        ">" => op::BuiltinGt,
        ">=" => op::BuiltinGe,
        "+" => op::BuiltinAdd,
        "-" => op::BuiltinSub,
        "&" => op::BuiltinBitAnd,
        "|" => op::BuiltinBitOr,
        "ref" => op::BuiltinRef,
        "set" => op::BuiltinSet,
        _ => return None,
    })
}

pub fn compile_source(src: &str, globals: &mut GlobalEnv) -> Result<CompiledCode, Diagnostics> {
    let forms = match read_program(src) {
        Ok(forms) => forms,
        Err(ReaderError { message }) => {
            let mut diags = Diagnostics::new();
            diags.error(message);
            return Err(diags);
        }
    };
    let body = if forms.len() == 1 { forms.into_iter().next().unwrap() } else { Expr::Begin(forms) };
    let mut diags = Diagnostics::new();
    let mut resolver = Resolver::new(globals);
    let (code, captures) = compile_lambda(&[], &body, &mut resolver, &mut diags);
    debug_assert!(captures.is_empty(), "a top-level unit cannot capture anything");
    if diags.is_empty() {
        Ok(code)
    } else {
        Err(diags)
    }
}

/// Compile one function body, returning its code object and the list of
/// outer-frame slots it captures, in the order the `closure` instruction at
/// its use site must reference them.
fn compile_lambda(
    params: &[String],
    body: &Expr,
    resolver: &mut Resolver<'_>,
    diags: &mut Diagnostics,
) -> (CompiledCode, Vec<ClosureSlot>) {
    resolver.push_frame();
    resolver.enter_block(params); // params always occupy the frame's first slots
    let mut emitter = Emitter::new(params.len() as u8, false, 0);
    emitter.argcheck(params.len() as u8);
    compile_expr(body, resolver, &mut emitter, diags);
    emitter.return_();
    resolver.exit_block();
    let frame = resolver.pop_frame();
    emitter.set_nlocals(frame.max_local());
    (emitter.finish(), frame.closure_list)
}

/// Compile `e`, leaving exactly one value on the stack.
fn compile_expr(e: &Expr, resolver: &mut Resolver<'_>, emitter: &mut Emitter, diags: &mut Diagnostics) {
    match e {
        Expr::Int(n) => emitter.integer(*n),
        Expr::Str(s) => emitter.string_const(s.clone()),
        Expr::Var(name) => match resolver.resolve(name) {
            Resolved::Local(o) => emitter.recall_local(o),
            Resolved::Closure(o) => emitter.recall_closure(o),
            Resolved::Global(idx) => emitter.recall_global(idx),
        },
        Expr::GlobalVar(name) => {
            let idx = resolver.resolve_global(name);
            emitter.recall_global(idx);
        }
        Expr::If(cond, then_branch, else_branch) => {
            compile_expr(cond, resolver, emitter, diags);
            let else_label = emitter.new_label();
            let end_label = emitter.new_label();
            emitter.branch_if_zero(else_label);
            compile_expr(then_branch, resolver, emitter, diags);
            emitter.branch(end_label);
            emitter.place_label(else_label);
            compile_expr(else_branch, resolver, emitter, diags);
            emitter.place_label(end_label);
        }
        Expr::While(cond, body) => {
            resolver.enter_loop();
            let top = emitter.new_label();
            let end = emitter.new_label();
            emitter.place_label(top);
            compile_expr(cond, resolver, emitter, diags);
            emitter.branch_if_zero(end);
            compile_expr(body, resolver, emitter, diags);
            emitter.discard();
            emitter.loop_back(top);
            emitter.place_label(end);
            resolver.exit_loop();
            // A loop's value is never meaningful; an integer 0 keeps every
            // expression's "leaves one value" invariant intact.
            emitter.integer(0);
        }
        Expr::Begin(exprs) => {
            if exprs.is_empty() {
                emitter.integer(0);
                return;
            }
            let (last, init) = exprs.split_last().unwrap();
            for e in init {
                compile_expr(e, resolver, emitter, diags);
                emitter.discard();
            }
            compile_expr(last, resolver, emitter, diags);
        }
        Expr::Let(bindings, body) => {
            let names: Vec<String> = bindings.iter().map(|(n, _)| n.clone()).collect();
            let entry = resolver.enter_block(&names);
            if entry.needs_clear {
                for &offset in &entry.offsets {
                    emitter.clear_local(offset);
                }
            }
            for ((_, value), &offset) in bindings.iter().zip(entry.offsets.iter()) {
                compile_expr(value, resolver, emitter, diags);
                emitter.assign_local(offset);
                emitter.discard();
            }
            compile_expr(body, resolver, emitter, diags);
            resolver.exit_block();
        }
        Expr::Assign(name, value) => {
            compile_expr(value, resolver, emitter, diags);
            match resolver.resolve(name) {
                Resolved::Local(o) => emitter.assign_local(o),
                Resolved::Closure(o) => emitter.assign_closure(o),
                Resolved::Global(idx) => {
                    if !resolver.global_writable(name) {
                        diags.error(format!("cannot assign to read-only global '{name}'"));
                    }
                    emitter.assign_global(idx);
                }
            }
        }
        Expr::Lambda(params, body) => {
            let (code, captures) = compile_lambda(params, body, resolver, diags);
            emitter.closure_code(code);
            for slot in &captures {
                match slot.source {
                    CaptureSource::Local(o) => emitter.closure_var_local(o),
                    CaptureSource::Closure(o) => emitter.closure_var_closure(o),
                }
            }
            emitter.closure(captures.len());
        }
        Expr::Call(callee, args) => {
            if let Expr::GlobalVar(name) = callee.as_ref() {
                if let Some(opcode) = builtin_opcode_for(name, args.len()) {
                    for a in args {
                        compile_expr(a, resolver, emitter, diags);
                    }
                    emitter.builtin(opcode);
                    return;
                }
                let idx = resolver.resolve_global(name);
                for a in args {
                    compile_expr(a, resolver, emitter, diags);
                }
                emitter.execute_global(idx, args.len());
                return;
            }
            if let Expr::Var(name) = callee.as_ref() {
                match resolver.resolve(name) {
                    Resolved::Global(idx) => {
                        if let Some(opcode) = builtin_opcode_for(name, args.len()) {
                            for a in args {
                                compile_expr(a, resolver, emitter, diags);
                            }
                            emitter.builtin(opcode);
                            return;
                        }
                        emitter.recall_global(idx);
                    }
                    Resolved::Local(o) => emitter.recall_local(o),
                    Resolved::Closure(o) => emitter.recall_closure(o),
                }
                for a in args {
                    compile_expr(a, resolver, emitter, diags);
                }
                emitter.execute(args.len());
                return;
            }
            compile_expr(callee, resolver, emitter, diags);
            for a in args {
                compile_expr(a, resolver, emitter, diags);
            }
            emitter.execute(args.len());
        }
        Expr::Define(name, value) => {
            let idx = resolver.resolve_global(name);
            compile_expr(value, resolver, emitter, diags);
            emitter.define(idx);
            emitter.recall_global(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_literal() {
        let mut globals = GlobalEnv::new();
        let code = compile_source("42", &mut globals).unwrap();
        assert_eq!(code.argc, 0);
        assert!(!code.bytecode.is_empty());
    }

    #[test]
    fn compiles_a_lambda_and_call() {
        let mut globals = GlobalEnv::new();
        let code = compile_source("((lambda (x) x) 5)", &mut globals).unwrap();
        assert_eq!(code.consts.len(), 1);
        assert!(matches!(code.consts[0], crate::code::ConstValue::Code(_)));
    }

    #[test]
    fn compiles_a_closure_over_an_outer_let() {
        let mut globals = GlobalEnv::new();
        let code =
            compile_source("(let ((x 1)) (lambda () x))", &mut globals).unwrap();
        let crate::code::ConstValue::Code(inner) = &code.consts[0] else {
            panic!("expected the inner lambda to be compiled as a code constant");
        };
        assert_eq!(inner.nlocals, 0);
        assert!(code.bytecode.contains(&quill_core::opcodes::ClosureVar));
    }

    #[test]
    fn rejects_assignment_to_a_system_writable_global() {
        let mut globals = GlobalEnv::new();
        let idx = globals.lookup("locked");
        globals.set_class(idx, quill_core::VarClass::SystemWritable);
        let err = compile_source("(set! locked 1)", &mut globals).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn while_loop_compiles_with_a_backward_branch() {
        let mut globals = GlobalEnv::new();
        let code = compile_source("(while 0 1)", &mut globals).unwrap();
        assert!(code.bytecode.contains(&quill_core::opcodes::Loop1)
            || code.bytecode.contains(&quill_core::opcodes::Loop2));
    }

    #[test]
    fn reader_error_becomes_a_diagnostic() {
        let mut globals = GlobalEnv::new();
        let err = compile_source("(if 1 2", &mut globals).unwrap_err();
        assert!(!err.is_empty());
    }
}
