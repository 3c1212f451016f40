//! The bytecode interpreter: `Interp` threads the heap, the global
//! environment, the dynamic root stack, the session, and the primitive
//! registry through a recursive `apply`/`call_closure`, one Rust call
//! frame per nested invocation.
//!
//! A frame's callee, raw arguments, locals, captured-variable references,
//! and operand stack are not kept in a separate, unrooted `Vec` — they all
//! live directly on the shared [`RootStack`], in a contiguous region
//! established when the frame is entered and torn down (by truncating back
//! to the recorded base depth) on every exit, normal or thrown. This is
//! what makes "every stack is a root" true without a second rooting
//! mechanism: the interpreter's own call stack, addressed positionally
//! rather than through scoped guards, *is* the dynamic root storage.
//!
//! Every local is uniformly boxed as a one-cell `Variable` object at frame
//! entry, not just the ones a later-compiled nested lambda turns out to
//! capture. A single-pass compiler can't know in advance whether a
//! not-yet-compiled lambda will close over a given local, so selective
//! boxing needs a second analysis pass; uniform boxing sidesteps that at
//! the cost of one extra allocation per local. `clear_local` nulls a box's
//! cell in place rather than replacing the box, so a captured loop
//! variable is shared across iterations (closer to a mutable `var` than a
//! fresh per-iteration binding) — a deliberate, documented choice.

use crate::error::{ErrorCode, RuntimeError, TraceFrame};
use crate::gc_util;
use crate::primitives::{primitive_index, PrimCtx, PrimitiveRegistry};
use crate::session::Session;
use quill_core::{opcodes as op, GlobalEnv, Heap, RootStack, TypeTag, Value};

pub struct Interp<'a> {
    pub heap: &'a mut Heap,
    pub globals: &'a mut GlobalEnv,
    pub roots: &'a mut RootStack,
    pub session: &'a mut Session,
    pub registry: &'a PrimitiveRegistry,
}

fn prim_ctx<'b>(
    heap: &'b mut Heap,
    roots: &'b mut RootStack,
    globals: &'b mut GlobalEnv,
    session: &'b mut Session,
) -> PrimCtx<'b> {
    PrimCtx { heap, roots, globals, session }
}

/// Bumps the session's recursion counter on entry, restores it on drop so
/// an early `?` still pays the budget back.
struct RecursionGuard<'a> {
    session: &'a mut Session,
}

impl<'a> RecursionGuard<'a> {
    fn enter(session: &'a mut Session) -> Result<RecursionGuard<'a>, RuntimeError> {
        session.enter_recursion()?;
        Ok(RecursionGuard { session })
    }
}

impl Drop for RecursionGuard<'_> {
    fn drop(&mut self) {
        self.session.exit_recursion();
    }
}

fn read_u8(heap: &Heap, code: Value, pc: usize) -> u8 {
    heap.code_bytecode(code)[pc]
}

fn read_i8(heap: &Heap, code: Value, pc: usize) -> i8 {
    read_u8(heap, code, pc) as i8
}

fn read_u16(heap: &Heap, code: Value, pc: usize) -> u16 {
    let b = heap.code_bytecode(code);
    u16::from_be_bytes([b[pc], b[pc + 1]])
}

fn read_i16(heap: &Heap, code: Value, pc: usize) -> i16 {
    read_u16(heap, code, pc) as i16
}

/// `Some(0|1|2)` (local/closure/global) if `opcode` falls in the
/// contiguous three-opcode family based at `base`.
fn class_of(base: u8, opcode: u8) -> Option<u8> {
    if opcode >= base && opcode <= base + 2 {
        Some(opcode - base)
    } else {
        None
    }
}

impl<'a> Interp<'a> {
    /// Apply any callable value — `closure`, `primitive`,
    /// `varargs-primitive`, or `secure-primitive` — to `args`.
    pub fn apply(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if !callee.is_ref() {
            return Err(RuntimeError::new(ErrorCode::BadFunction));
        }
        match self.heap.tag(callee) {
            TypeTag::Closure => self.call_closure(callee, args),
            TypeTag::Primitive | TypeTag::VarargsPrimitive | TypeTag::SecurePrimitive => {
                self.call_primitive(callee, &args)
            }
            _ => Err(RuntimeError::new(ErrorCode::BadFunction)),
        }
    }

    fn call_primitive(&mut self, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let _guard = RecursionGuard::enter(self.session)?;
        self.session.tick_fast_call()?;
        let idx = primitive_index(self.heap, callee);
        let descriptor = *self.registry.get(idx);
        let n = args.len() as u8;
        let arity_ok = if descriptor.varargs {
            n >= descriptor.min_args
        } else {
            n >= descriptor.min_args && n <= descriptor.max_args
        };
        if !arity_ok {
            return Err(RuntimeError::new(ErrorCode::WrongParameters));
        }
        if self.heap.tag(callee) == TypeTag::SecurePrimitive && self.session.seclevel < descriptor.seclevel {
            return Err(RuntimeError::new(ErrorCode::SecurityViolation));
        }
        let mut ctx = prim_ctx(self.heap, self.roots, self.globals, self.session);
        (descriptor.func)(&mut ctx, args)
    }

    /// Run one invocation of `closure` against `args`, catching any thrown
    /// error just long enough to append this frame's code object and
    /// program counter to its call trace before propagating it further.
    fn call_closure(&mut self, closure: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let _guard = RecursionGuard::enter(self.session)?;
        let frame_base = self.roots.depth();

        let closure_slot = frame_base;
        self.roots.push(closure);
        let nargs = args.len();
        let args_base = closure_slot + 1;
        for a in args {
            self.roots.push(a);
        }

        let code = self.heap.get_cell(self.roots.get_at(closure_slot), 0);
        let ncaptures = self.heap.cell_count(self.roots.get_at(closure_slot)) - 1;
        let header = self.heap.code_header(code);
        let nlocals = header.nlocals as usize;

        let code_slot = args_base + nargs;
        self.roots.push(code);

        let locals_base = code_slot + 1;
        let alloc_result: Result<(), RuntimeError> = (|| {
            for i in 0..nlocals {
                let init = if i < nargs { self.roots.get_at(args_base + i) } else { Value::NULL };
                let boxed = gc_util::alloc_variable(self.heap, self.globals, self.roots, init)
                    .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
                self.roots.push(boxed);
            }
            Ok(())
        })();
        if let Err(e) = alloc_result {
            self.roots.truncate(frame_base);
            return Err(e);
        }

        let captures_base = locals_base + nlocals;
        for i in 0..ncaptures {
            let current_closure = self.roots.get_at(closure_slot);
            let boxed = self.heap.get_cell(current_closure, i + 1);
            self.roots.push(boxed);
        }
        let stack_base = captures_base + ncaptures;
        debug_assert_eq!(self.roots.depth(), stack_base);

        let result = self.run(code_slot, args_base, locals_base, captures_base, stack_base, nargs);
        let result = result.map_err(|mut e| {
            e.trace.push(TraceFrame { code, pc: 0 });
            e
        });
        self.roots.truncate(frame_base);
        result
    }

    /// The bytecode dispatch loop for one frame.
    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        code_slot: usize,
        args_base: usize,
        locals_base: usize,
        captures_base: usize,
        stack_base: usize,
        nargs: usize,
    ) -> Result<Value, RuntimeError> {
        let mut pc: usize = 0;
        loop {
            self.session.tick_call()?;
            let code = self.roots.get_at(code_slot);
            let opcode = read_u8(self.heap, code, pc);
            pc += 1;

            if let Some(class) = class_of(op::Recall, opcode) {
                let v = match class {
                    op::VAR_LOCAL => {
                        let offset = read_u8(self.heap, code, pc) as usize;
                        pc += 1;
                        let boxed = self.roots.get_at(locals_base + offset);
                        self.heap.variable_get(boxed)
                    }
                    op::VAR_CLOSURE => {
                        let offset = read_u8(self.heap, code, pc) as usize;
                        pc += 1;
                        let boxed = self.roots.get_at(captures_base + offset);
                        self.heap.variable_get(boxed)
                    }
                    _ => {
                        let idx = read_u16(self.heap, code, pc) as usize;
                        pc += 2;
                        self.globals.get(idx)
                    }
                };
                self.roots.push(v);
                continue;
            }

            if let Some(class) = class_of(op::Assign, opcode) {
                match class {
                    op::VAR_LOCAL => {
                        let offset = read_u8(self.heap, code, pc) as usize;
                        pc += 1;
                        let boxed = self.roots.get_at(locals_base + offset);
                        self.heap.variable_set(boxed, self.roots.top());
                    }
                    op::VAR_CLOSURE => {
                        let offset = read_u8(self.heap, code, pc) as usize;
                        pc += 1;
                        let boxed = self.roots.get_at(captures_base + offset);
                        self.heap.variable_set(boxed, self.roots.top());
                    }
                    _ => {
                        let idx = read_u16(self.heap, code, pc) as usize;
                        pc += 2;
                        self.globals.set(idx, self.roots.top());
                    }
                }
                continue;
            }

            if let Some(class) = class_of(op::ClosureVar, opcode) {
                let v = match class {
                    op::VAR_LOCAL => {
                        let offset = read_u8(self.heap, code, pc) as usize;
                        pc += 1;
                        self.roots.get_at(locals_base + offset)
                    }
                    _ => {
                        let offset = read_u8(self.heap, code, pc) as usize;
                        pc += 1;
                        self.roots.get_at(captures_base + offset)
                    }
                };
                self.roots.push(v);
                continue;
            }

            match opcode {
                o if o == op::Constant1 => {
                    let idx = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    self.roots.push(self.heap.code_const(code, idx));
                }
                o if o == op::Constant2 => {
                    let idx = read_u16(self.heap, code, pc) as usize;
                    pc += 2;
                    self.roots.push(self.heap.code_const(code, idx));
                }
                o if o == op::Integer1 => {
                    let n = read_i8(self.heap, code, pc);
                    pc += 1;
                    self.roots.push(Value::make_int(n as i64));
                }
                o if o == op::Integer2 => {
                    let n = read_i16(self.heap, code, pc);
                    pc += 2;
                    self.roots.push(Value::make_int(n as i64));
                }
                o if o == op::Closure => {
                    let n = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    let mut cells = vec![Value::NULL; n + 1];
                    for i in (0..n).rev() {
                        cells[i + 1] = self.roots.pop();
                    }
                    cells[0] = self.roots.pop();
                    let closure =
                        gc_util::alloc_cells(self.heap, self.globals, self.roots, TypeTag::Closure, &cells)
                            .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
                    self.roots.push(closure);
                }
                o if o == op::ClosureCode1 => {
                    let idx = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    self.roots.push(self.heap.code_const(code, idx));
                }
                o if o == op::ClosureCode2 => {
                    let idx = read_u16(self.heap, code, pc) as usize;
                    pc += 2;
                    self.roots.push(self.heap.code_const(code, idx));
                }
                o if o == op::Execute => {
                    let argc = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    let args = self.pop_args(argc);
                    let callee = self.roots.pop();
                    let result = self.apply(callee, args)?;
                    self.roots.push(result);
                }
                o if o == op::ExecutePrimitive || o == op::ExecuteSecure || o == op::ExecuteVarargs => {
                    let argc = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    let args = self.pop_args(argc);
                    let callee = self.roots.pop();
                    let result = self.call_primitive(callee, &args)?;
                    self.roots.push(result);
                }
                o if o == op::ExecuteGlobal1 || o == op::ExecuteGlobal2 => {
                    let idx = read_u16(self.heap, code, pc) as usize;
                    pc += 2;
                    let argc = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    let args = self.pop_args(argc);
                    let callee = self.globals.get(idx);
                    let result = self.apply(callee, args)?;
                    self.roots.push(result);
                }
                o if o == op::Argcheck => {
                    let k = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    if nargs != k {
                        return Err(RuntimeError::new(ErrorCode::WrongParameters));
                    }
                }
                o if o == op::Varargs => {
                    let header = self.heap.code_header(code);
                    let fixed = header.argc as usize;
                    let rest: Vec<Value> =
                        (fixed..nargs).map(|i| self.roots.get_at(args_base + i)).collect();
                    let vec_obj =
                        gc_util::alloc_cells(self.heap, self.globals, self.roots, TypeTag::Vector, &rest)
                            .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;
                    let boxed = self.roots.get_at(locals_base + fixed);
                    self.heap.variable_set(boxed, vec_obj);
                }
                o if o == op::Discard => {
                    self.roots.pop();
                }
                o if o == op::PopN => {
                    let n = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    for _ in 0..n {
                        self.roots.pop();
                    }
                }
                o if o == op::ExitN => {
                    let n = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    let top = self.roots.pop();
                    for _ in 0..n {
                        self.roots.pop();
                    }
                    self.roots.push(top);
                }
                o if o == op::Branch1 || o == op::Branch2 => {
                    pc = self.branch_target(code, pc, o == op::Branch1);
                }
                o if o == op::BranchZ1 || o == op::BranchZ2 => {
                    let target = self.branch_target(code, pc, o == op::BranchZ1);
                    // The emitter always reserves a fixed 3-byte footprint
                    // (opcode + 2 operand bytes) for a branch, even when the
                    // short form is chosen, so the fallthrough skips both
                    // operand bytes regardless of form.
                    let skip = pc + 2;
                    let cond = self.roots.pop();
                    pc = if cond.is_truthy() { skip } else { target };
                }
                o if o == op::BranchNz1 || o == op::BranchNz2 => {
                    let target = self.branch_target(code, pc, o == op::BranchNz1);
                    let skip = pc + 2;
                    let cond = self.roots.pop();
                    pc = if cond.is_truthy() { target } else { skip };
                }
                o if o == op::Loop1 || o == op::Loop2 => {
                    self.session.check_interrupt()?;
                    pc = self.branch_target(code, pc, o == op::Loop1);
                }
                o if o == op::ClearLocal => {
                    let offset = read_u8(self.heap, code, pc) as usize;
                    pc += 1;
                    let boxed = self.roots.get_at(locals_base + offset);
                    self.heap.variable_set(boxed, Value::NULL);
                }
                o if o == op::Return => {
                    let v = self.roots.pop();
                    debug_assert_eq!(self.roots.depth(), stack_base);
                    return Ok(v);
                }
                o if o == op::Define => {
                    let idx = read_u16(self.heap, code, pc) as usize;
                    pc += 2;
                    let v = self.roots.pop();
                    self.globals.set(idx, v);
                }
                o if (op::Typecheck..op::BuiltinBase).contains(&o) => {
                    let tag_u8 = o - op::Typecheck;
                    let v = self.roots.top();
                    let ok = if tag_u8 == TypeTag::Integer as u8 {
                        v.is_int()
                    } else {
                        v.is_ref() && self.heap.tag(v) == TypeTag::from_u8(tag_u8)
                    };
                    if !ok {
                        return Err(RuntimeError::new(ErrorCode::BadType));
                    }
                }
                o if (op::BuiltinBase..op::Return).contains(&o) => {
                    self.dispatch_builtin(o)?;
                }
                _other => {
                    return Err(RuntimeError::new(ErrorCode::Compile));
                }
            }
        }
    }

    fn pop_args(&mut self, argc: usize) -> Vec<Value> {
        let mut args = vec![Value::NULL; argc];
        for i in (0..argc).rev() {
            args[i] = self.roots.pop();
        }
        args
    }

    /// Decode a branch's relative operand (short or wide, chosen by
    /// `short_form`) and return the absolute pc it targets, anchored at the
    /// byte immediately after the instruction's fixed 3-byte footprint —
    /// matching the emitter's `at + 3` anchor exactly.
    fn branch_target(&self, code: Value, operand_pc: usize, short_form: bool) -> usize {
        let anchor = operand_pc + 2; // operand_pc is already one past the opcode byte
        let rel = if short_form {
            read_i8(self.heap, code, operand_pc) as isize
        } else {
            read_i16(self.heap, code, operand_pc) as isize
        };
        (anchor as isize + rel) as usize
    }

    fn dispatch_builtin(&mut self, opcode: u8) -> Result<(), RuntimeError> {
        if opcode == op::BuiltinNot {
            let a = self.roots.pop();
            self.roots.push(Value::make_bool(!a.is_truthy()));
            return Ok(());
        }
        if opcode == op::BuiltinEq || opcode == op::BuiltinNeq {
            let b = self.roots.pop();
            let a = self.roots.pop();
            let eq = a.0 == b.0;
            self.roots.push(Value::make_bool(if opcode == op::BuiltinEq { eq } else { !eq }));
            return Ok(());
        }
        let b = self.roots.pop();
        let a = self.roots.pop();
        if !a.is_int() || !b.is_int() {
            let result = self.fall_back_to_primitive(opcode, a, b)?;
            self.roots.push(result);
            return Ok(());
        }
        let (x, y) = (a.as_int(), b.as_int());
        let result = if opcode == op::BuiltinLt {
            Value::make_bool(x < y)
        } else if opcode == op::BuiltinLe {
            Value::make_bool(x <= y)
        } else if opcode == op::BuiltinGt {
            Value::make_bool(x > y)
        } else if opcode == op::BuiltinGe {
            Value::make_bool(x >= y)
        } else if opcode == op::BuiltinAdd {
            crate::arithmetic::add(x, y)
        } else if opcode == op::BuiltinSub {
            crate::arithmetic::sub(x, y)
        } else if opcode == op::BuiltinBitAnd {
            crate::arithmetic::bitand(x, y)
        } else if opcode == op::BuiltinBitOr {
            crate::arithmetic::bitor(x, y)
        } else if opcode == op::BuiltinRef {
            Value::make_bool((x >> y) & 1 == 1)
        } else if opcode == op::BuiltinSet {
            Value::make_int(x | (1 << y))
        } else {
            unreachable!("dispatch_builtin called with a non-builtin opcode");
        };
        self.roots.push(result);
        Ok(())
    }

    /// `builtin_X`'s tagged-integer fast path only covers two tagged
    /// integers; anything else (a boxed float, a string for `ref`/`set`
    /// misuse, and so on) falls back to the full primitive of the same
    /// name, re-entering through the ordinary `apply` machinery rather than
    /// duplicating type dispatch here.
    fn fall_back_to_primitive(&mut self, opcode: u8, a: Value, b: Value) -> Result<Value, RuntimeError> {
        let name = if opcode == op::BuiltinLt {
            "<"
        } else if opcode == op::BuiltinLe {
            "<="
        } else if opcode == op::BuiltinGt {
            ">"
        } else if opcode == op::BuiltinGe {
            ">="
        } else if opcode == op::BuiltinAdd {
            "+"
        } else if opcode == op::BuiltinSub {
            "-"
        } else if opcode == op::BuiltinBitAnd {
            "&"
        } else if opcode == op::BuiltinBitOr {
            "|"
        } else if opcode == op::BuiltinRef {
            "ref"
        } else if opcode == op::BuiltinSet {
            "set"
        } else {
            unreachable!("fall_back_to_primitive called with a non-builtin opcode");
        };
        let idx = self.globals.find(name).ok_or_else(|| RuntimeError::new(ErrorCode::BadFunction))?;
        let primitive = self.globals.get(idx);
        self.apply(primitive, vec![a, b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::loader::load;
    use crate::primitives::register_builtins;

    fn run_source(src: &str) -> Result<Value, RuntimeError> {
        let mut heap = Heap::new(1 << 16);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let registry = register_builtins(&mut heap, &mut globals, &mut roots);
        let mut session = Session::new(&VmConfig::default());
        let compiled = quill_compiler::compile_source(src, &mut globals).unwrap();
        let code = load(&mut heap, &mut globals, &mut roots, &compiled).unwrap();
        let closure = gc_util::alloc_cells(&mut heap, &mut globals, &mut roots, TypeTag::Closure, &[code])
            .unwrap();
        let mut interp =
            Interp { heap: &mut heap, globals: &mut globals, roots: &mut roots, session: &mut session, registry: &registry };
        interp.apply(closure, vec![])
    }

    #[test]
    fn evaluates_a_literal() {
        assert_eq!(run_source("42").unwrap().as_int(), 42);
    }

    #[test]
    fn applies_a_lambda() {
        assert_eq!(run_source("((lambda (x) (+ x 1)) 41)").unwrap().as_int(), 42);
    }

    #[test]
    fn if_chooses_the_right_branch() {
        assert_eq!(run_source("(if 0 1 2)").unwrap().as_int(), 2);
        assert_eq!(run_source("(if 1 1 2)").unwrap().as_int(), 1);
    }

    #[test]
    fn a_while_loop_runs_to_completion() {
        let src = "(let ((i 0) (acc 0)) (while (< i 5) (begin (set! acc (+ acc i)) (set! i (+ i 1)))) acc)";
        assert_eq!(run_source(src).unwrap().as_int(), 10);
    }

    #[test]
    fn three_calls_share_a_captured_variable() {
        let src = "\
            (let ((counter (let ((n 0)) (lambda () (begin (set! n (+ n 1)) n)))))\n\
              (begin (counter) (counter) (counter)))";
        assert_eq!(run_source(src).unwrap().as_int(), 3);
    }

    #[test]
    fn division_by_zero_throws_divide_by_zero() {
        let err = run_source("(/ 1 0)").unwrap_err();
        assert_eq!(err.code, ErrorCode::DivideByZero);
    }

    #[test]
    fn a_tight_loop_exhausts_the_call_quota() {
        let mut heap = Heap::new(1 << 16);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let registry = register_builtins(&mut heap, &mut globals, &mut roots);
        let mut session = Session::new(&VmConfig { call_quota: 50, ..VmConfig::default() });
        let compiled =
            quill_compiler::compile_source("(let ((i 0)) (while 1 (set! i (+ i 1))))", &mut globals).unwrap();
        let code = load(&mut heap, &mut globals, &mut roots, &compiled).unwrap();
        let closure =
            gc_util::alloc_cells(&mut heap, &mut globals, &mut roots, TypeTag::Closure, &[code]).unwrap();
        let mut interp =
            Interp { heap: &mut heap, globals: &mut globals, roots: &mut roots, session: &mut session, registry: &registry };
        let err = interp.apply(closure, vec![]).unwrap_err();
        assert_eq!(err.code, ErrorCode::Loop);
    }
}
