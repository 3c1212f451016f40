//! Stand-in for [`crate::regex`] when the `regex` feature is off: both
//! primitives throw `bad_function` instead of refusing to link, so a
//! program that never actually calls `make-regexp`/`regexp-exec` still runs
//! unmodified against a build without the dependency.

use crate::error::{ErrorCode, RuntimeError};
use crate::primitives::PrimCtx;
use quill_core::Value;

pub fn prim_make_regexp(_ctx: &mut PrimCtx, _args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::new(ErrorCode::BadFunction))
}

pub fn prim_regexp_exec(_ctx: &mut PrimCtx, _args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::new(ErrorCode::BadFunction))
}
