//! Wiring process signals into a session's [`crate::session::InterruptFlag`].
//!
//! Grounded on the reference signal-handling idiom: a signal handler must do
//! as little as possible, so it only ever flips an atomic flag; all actual
//! interrupt handling happens later, at a safe point the interpreter already
//! polls (the loop/branch opcodes, via `Session::check_interrupt`). This
//! module just gives an embedder a way to make SIGINT/SIGTERM raise that
//! same flag instead of hand-rolling a `signal`/`sigaction` call, using
//! `signal-hook`'s async-signal-safe registration rather than `libc::signal`
//! directly.
//!
//! Requires the `diagnostics` feature; see [`crate::signal_stub`] for the
//! no-op fallback used when it's off.

#![cfg(feature = "diagnostics")]

use crate::session::InterruptFlag;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::io;
use std::sync::Arc;

/// Register `flag` to be raised (and kept raised until
/// [`InterruptFlag::take`] clears it) on `SIGINT`/`SIGTERM`.
///
/// Returns the underlying `Arc<AtomicBool>` `signal_hook` was handed, purely
/// so the caller can keep it alive for as long as the registration should
/// stay active — `signal_hook::flag::register` does not itself keep the
/// handler installed once every clone of the flag it was given is dropped.
pub fn install(interrupt: &InterruptFlag) -> io::Result<Arc<std::sync::atomic::AtomicBool>> {
    let shared = interrupt.shared_flag();
    flag::register(SIGINT, Arc::clone(&shared))?;
    flag::register(SIGTERM, Arc::clone(&shared))?;
    Ok(shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_succeeds_on_a_fresh_process() {
        let interrupt = InterruptFlag::new();
        assert!(install(&interrupt).is_ok());
    }
}
