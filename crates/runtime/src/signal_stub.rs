//! No-op fallback for [`crate::signal`] when the `diagnostics` feature is
//! disabled: an embedder built without it can still call `install` (e.g.
//! from shared setup code gated on a different condition) without a `cfg`
//! at every call site; it simply does nothing.

#![cfg(not(feature = "diagnostics"))]

use crate::session::InterruptFlag;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub fn install(_interrupt: &InterruptFlag) -> io::Result<Arc<AtomicBool>> {
    Ok(Arc::new(AtomicBool::new(false)))
}
