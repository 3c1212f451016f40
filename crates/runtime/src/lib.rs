//! Bytecode interpreter, session/error context, and pretty-printer for the
//! Quill language.
//!
//! This crate owns everything that runs compiled code: loading a
//! [`quill_compiler::CompiledCode`] onto a [`quill_core::Heap`], the
//! `Interp` dispatch loop, the primitive-call protocol, the dynamically
//! scoped [`session::Session`] (quotas, recursion, interrupts, catch), and
//! the pretty-printer/disassembler an embedding REPL calls for `display`,
//! `print`, and `examine`.

pub mod arithmetic;
pub mod config;
pub mod error;
pub mod gc_util;
pub mod interp;
pub mod loader;
pub mod operators;
pub mod ports;
pub mod pretty;
pub mod primitives;
pub mod session;
pub mod snapshot;

#[cfg(feature = "regex")]
pub mod regex;
#[cfg(not(feature = "regex"))]
#[path = "regex_stub.rs"]
pub mod regex;

#[cfg(feature = "diagnostics")]
pub mod report;
#[cfg(not(feature = "diagnostics"))]
#[path = "report_stub.rs"]
pub mod report;

#[cfg(feature = "diagnostics")]
pub mod signal;
#[cfg(not(feature = "diagnostics"))]
#[path = "signal_stub.rs"]
pub mod signal;

pub use config::VmConfig;
pub use error::{ErrorCode, RuntimeError, TraceFrame};
pub use interp::Interp;
pub use ports::{OutputPort, Ports};
pub use pretty::{disassemble, format_value, Level, MAX_PRINT_ATOMS};
pub use primitives::{alloc_string, primitive_index, register_builtins, string_str, PrimCtx, PrimitiveFn, PrimitiveRegistry};
pub use session::{InterruptFlag, Session, SessionState};
pub use snapshot::{SnapshotError, TypedValue};

use quill_compiler::compile_source;
use quill_core::{GlobalEnv, Heap, RootStack, Value};

/// Everything a single embedding program needs: a heap, the global
/// environment, the dynamic root stack backing every live interpreter
/// frame, the session (quotas/recursion/ports), and the registered
/// primitive table. Most embedders want exactly one of these.
pub struct Vm {
    pub heap: Heap,
    pub globals: GlobalEnv,
    pub roots: RootStack,
    pub session: Session,
    pub registry: PrimitiveRegistry,
    pub config: VmConfig,
}

impl Vm {
    pub fn new(config: VmConfig) -> Vm {
        let mut heap = Heap::new(config.initial_heap_size).with_max_capacity(usize::MAX);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let registry = register_builtins(&mut heap, &mut globals, &mut roots);
        let session = Session::new(&config);
        Vm { heap, globals, roots, session, registry, config }
    }

    /// Compile `source`, load it onto the heap, and apply it as a
    /// zero-argument top-level closure, bracketed by a session.
    pub fn eval(&mut self, source: &str) -> Result<Value, RuntimeError> {
        let compiled = compile_source(source, &mut self.globals).map_err(|_| RuntimeError::new(ErrorCode::Compile))?;
        let code = loader::load(&mut self.heap, &mut self.globals, &mut self.roots, &compiled)?;
        let closure = gc_util::alloc_cells(&mut self.heap, &mut self.globals, &mut self.roots, quill_core::TypeTag::Closure, &[code])
            .map_err(|_| RuntimeError::new(ErrorCode::BadValue))?;

        self.session.start(&self.roots, 0);
        let mut interp = Interp {
            heap: &mut self.heap,
            globals: &mut self.globals,
            roots: &mut self.roots,
            session: &mut self.session,
            registry: &self.registry,
        };
        let result = interp.apply(closure, vec![]);
        self.session.end(&mut self.roots);
        result
    }

    /// `display`/`print`/`examine` a value without mutating anything.
    pub fn format(&self, v: Value, level: Level) -> String {
        format_value(&self.heap, v, level)
    }

    /// Emit the `QUILL_REPORT`-gated KPI report for this VM's session, if
    /// one was requested.
    pub fn maybe_report(&self) {
        report::maybe_emit(&self.heap, &self.session, &self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_vm_evaluates_a_literal() {
        let mut vm = Vm::new(VmConfig::default());
        let result = vm.eval("42").unwrap();
        assert_eq!(result.as_int(), 42);
    }

    #[test]
    fn a_fresh_vm_applies_a_lambda() {
        let mut vm = Vm::new(VmConfig::default());
        let result = vm.eval("((lambda (x) (+ x 1)) 41)").unwrap();
        assert_eq!(result.as_int(), 42);
    }
}
