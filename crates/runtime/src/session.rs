//! The dynamically-scoped execution bracket: `session_start`/`session_end`,
//! execution quotas, user-interrupt checking, and `catch_error`.
//!
//! A session's state machine is `idle -> running -> (returning | throwing)`.
//! The transition into `running` snapshots the current dynamic-root-stack
//! depth so that `throwing` can restore it on the way back out — in
//! practice this restoration mostly happens for free, since every interior
//! frame's [`quill_core::GcPro`] guard truncates its own roots on drop
//! whether the frame returns normally or via `?`; the explicit truncate in
//! [`Session::catch_error`] only matters for roots a primitive pushed
//! without a matching scoped guard.

use crate::error::{ErrorCode, RuntimeError};
use quill_core::{RootStack, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Returning,
    Throwing,
}

/// The asynchronously-set "user interrupt" flag. Cheap to clone and
/// share with a signal handler; checked only at loop/branch opcodes.
#[derive(Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> InterruptFlag {
        InterruptFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// The backing `Arc<AtomicBool>`, for registering directly with a
    /// signal handler (`signal_hook::flag::register` wants one to raise in
    /// place on delivery).
    pub fn shared_flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

pub struct Session {
    state: SessionState,
    pub seclevel: u8,
    root_depth_at_entry: usize,
    call_budget: u64,
    fast_call_budget: u64,
    recursion_depth: usize,
    recursion_limit: usize,
    interrupt: InterruptFlag,
    pub ports: crate::ports::Ports,
}

impl Session {
    pub fn new(config: &crate::config::VmConfig) -> Session {
        Session {
            state: SessionState::Idle,
            seclevel: 0,
            root_depth_at_entry: 0,
            call_budget: config.call_quota,
            fast_call_budget: config.fast_call_quota,
            recursion_depth: 0,
            recursion_limit: config.recursion_limit,
            interrupt: InterruptFlag::new(),
            ports: crate::ports::Ports::default(),
        }
    }

    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `session_start`: enter `running`, recording the dynamic-root-stack
    /// depth so `session_end`/an uncaught throw can restore it.
    pub fn start(&mut self, roots: &RootStack, seclevel: u8) {
        debug_assert_eq!(self.state, SessionState::Idle, "sessions do not nest");
        tracing::debug!(seclevel, "session: start");
        self.state = SessionState::Running;
        self.seclevel = seclevel;
        self.root_depth_at_entry = roots.depth();
    }

    /// `session_end`, reached either by a normal return or by an uncaught
    /// throw unwinding all the way out.
    pub fn end(&mut self, roots: &mut RootStack) {
        tracing::debug!(state = ?self.state, "session: end");
        roots.truncate(self.root_depth_at_entry);
        self.state = SessionState::Idle;
    }

    /// Charge one dispatched instruction against the call quota.
    pub fn tick_call(&mut self) -> Result<(), RuntimeError> {
        if self.call_budget == 0 {
            return Err(RuntimeError::new(ErrorCode::Loop));
        }
        self.call_budget -= 1;
        Ok(())
    }

    /// Charge one primitive invocation against the fast-call quota.
    pub fn tick_fast_call(&mut self) -> Result<(), RuntimeError> {
        if self.fast_call_budget == 0 {
            return Err(RuntimeError::new(ErrorCode::Loop));
        }
        self.fast_call_budget -= 1;
        Ok(())
    }

    /// Checked at loop-branch opcodes: if a user interrupt has been
    /// signalled, throw from this checkpoint.
    pub fn check_interrupt(&self) -> Result<(), RuntimeError> {
        if self.interrupt.take() {
            return Err(RuntimeError::new(ErrorCode::UserInterrupt));
        }
        Ok(())
    }

    /// Bracket a nested native call, bumping and later restoring the
    /// recursion depth; exhausting `recursion_limit` throws `error_recurse`.
    pub fn enter_recursion(&mut self) -> Result<(), RuntimeError> {
        if self.recursion_depth >= self.recursion_limit {
            return Err(RuntimeError::new(ErrorCode::Recurse));
        }
        self.recursion_depth += 1;
        Ok(())
    }

    pub fn exit_recursion(&mut self) {
        self.recursion_depth -= 1;
    }

    /// Dispatched-instruction quota left before [`Self::tick_call`] throws.
    pub fn call_budget_remaining(&self) -> u64 {
        self.call_budget
    }

    /// Primitive-invocation quota left before [`Self::tick_fast_call`] throws.
    pub fn fast_call_budget_remaining(&self) -> u64 {
        self.fast_call_budget
    }

    /// Current nested-native-call depth (for reporting; zero between calls).
    pub fn recursion_depth(&self) -> usize {
        self.recursion_depth
    }

    /// Run `f`, catching any catchable error and yielding its code as a
    /// tagged integer instead. `error_loop`/`error_recurse` are re-thrown
    /// unchanged. Unless `suppress` is set, a caught error is also reported
    /// to the session's error port, mirroring an uncaught error's report
    /// without terminating the session.
    pub fn catch_error<F>(&mut self, roots: &mut RootStack, suppress: bool, f: F) -> Result<Value, RuntimeError>
    where
        F: FnOnce(&mut Session, &mut RootStack) -> Result<Value, RuntimeError>,
    {
        let depth = roots.depth();
        match f(self, roots) {
            Ok(v) => Ok(v),
            Err(e) if !e.code.is_catchable() => Err(e),
            Err(e) => {
                roots.truncate(depth);
                if !suppress {
                    let _ = self.ports.err.write_str(&format!("{}\n", e.code));
                }
                Ok(Value::make_int(e.code as u8 as i64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    #[test]
    fn quota_exhaustion_throws_loop() {
        let mut session = Session::new(&VmConfig { call_quota: 1, ..VmConfig::default() });
        session.tick_call().unwrap();
        assert_eq!(session.tick_call().unwrap_err().code, ErrorCode::Loop);
    }

    #[test]
    fn recursion_limit_throws_recurse() {
        let mut session = Session::new(&VmConfig { recursion_limit: 1, ..VmConfig::default() });
        session.enter_recursion().unwrap();
        assert_eq!(session.enter_recursion().unwrap_err().code, ErrorCode::Recurse);
    }

    #[test]
    fn catch_error_yields_the_code_for_a_catchable_error() {
        let mut session = Session::new(&VmConfig::default());
        let mut roots = RootStack::new();
        let result = session.catch_error(&mut roots, true, |_s, _r| {
            Err(RuntimeError::new(ErrorCode::DivideByZero))
        });
        assert_eq!(result.unwrap().as_int(), ErrorCode::DivideByZero as u8 as i64);
    }

    #[test]
    fn catch_error_rethrows_loop_and_recurse() {
        let mut session = Session::new(&VmConfig::default());
        let mut roots = RootStack::new();
        let result =
            session.catch_error(&mut roots, true, |_s, _r| Err(RuntimeError::new(ErrorCode::Loop)));
        assert!(result.is_err());
    }

    #[test]
    fn session_end_restores_root_depth() {
        let mut session = Session::new(&VmConfig::default());
        let mut roots = RootStack::new();
        session.start(&roots, 0);
        roots.push(Value::make_int(1));
        roots.push(Value::make_int(2));
        session.end(&mut roots);
        assert_eq!(roots.depth(), 0);
    }

    #[test]
    fn interrupt_flag_fires_once() {
        let session = Session::new(&VmConfig::default());
        let flag = session.interrupt_flag();
        flag.raise();
        assert!(session.check_interrupt().is_err());
        assert!(session.check_interrupt().is_ok());
    }
}
