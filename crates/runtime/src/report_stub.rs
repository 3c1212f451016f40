//! No-op fallback for [`crate::report`] when the `diagnostics` feature is
//! disabled: `maybe_emit` does nothing, so shared embedder setup code can
//! call it unconditionally without a `cfg` at the call site.

#![cfg(not(feature = "diagnostics"))]

use crate::config::VmConfig;
use crate::session::Session;
use quill_core::Heap;

pub fn maybe_emit(_heap: &Heap, _session: &Session, _config: &VmConfig) {}
