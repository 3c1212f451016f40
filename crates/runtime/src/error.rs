//! The closed taxonomy of runtime error codes and the session-visible
//! [`RuntimeError`] type that carries one plus a captured call trace.
//!
//! Hand-rolled `Display`/`Error` rather than a derive crate: the error set
//! is small, closed, and each variant's message is worth writing out by
//! hand.

use std::fmt;

/// A stable, embeddable error code. Ordering is part of the external
/// interface: embedders may persist these as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    BadFunction = 0,
    StackUnderflow = 1,
    BadType = 2,
    DivideByZero = 3,
    BadIndex = 4,
    BadValue = 5,
    VariableReadOnly = 6,
    Loop = 7,
    Recurse = 8,
    WrongParameters = 9,
    SecurityViolation = 10,
    ValueReadOnly = 11,
    UserInterrupt = 12,
    NoMatch = 13,
    Compile = 14,
}

impl ErrorCode {
    pub const COUNT: u8 = 15;

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::BadFunction => "bad_function",
            ErrorCode::StackUnderflow => "stack_underflow",
            ErrorCode::BadType => "bad_type",
            ErrorCode::DivideByZero => "divide_by_zero",
            ErrorCode::BadIndex => "bad_index",
            ErrorCode::BadValue => "bad_value",
            ErrorCode::VariableReadOnly => "variable_read_only",
            ErrorCode::Loop => "loop",
            ErrorCode::Recurse => "recurse",
            ErrorCode::WrongParameters => "wrong_parameters",
            ErrorCode::SecurityViolation => "security_violation",
            ErrorCode::ValueReadOnly => "value_read_only",
            ErrorCode::UserInterrupt => "user_interrupt",
            ErrorCode::NoMatch => "no_match",
            ErrorCode::Compile => "compile",
        }
    }

    /// `error_loop` and `error_recurse` are fatal to the current session: a
    /// `catch_error` handler observes them re-thrown rather than swallowed.
    pub fn is_catchable(self) -> bool {
        !matches!(self, ErrorCode::Loop | ErrorCode::Recurse)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One frame of a captured call trace: the code object running and the
/// bytecode offset the program counter had reached.
#[derive(Debug, Clone, Copy)]
pub struct TraceFrame {
    pub code: quill_core::Value,
    pub pc: usize,
}

#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub code: ErrorCode,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(code: ErrorCode) -> RuntimeError {
        RuntimeError { code, trace: Vec::new() }
    }

    pub fn with_trace(code: ErrorCode, trace: Vec<TraceFrame>) -> RuntimeError {
        RuntimeError { code, trace }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        for frame in &self.trace {
            write!(f, "\n  at pc={}", frame.pc)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_and_recurse_are_uncatchable() {
        assert!(!ErrorCode::Loop.is_catchable());
        assert!(!ErrorCode::Recurse.is_catchable());
        assert!(ErrorCode::DivideByZero.is_catchable());
    }

    #[test]
    fn names_match_the_external_taxonomy() {
        assert_eq!(ErrorCode::BadFunction.name(), "bad_function");
        assert_eq!(ErrorCode::Compile.name(), "compile");
    }
}
