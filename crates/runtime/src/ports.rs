//! Output ports: the mutable I/O buffers a session's user/out/err streams
//! write through.
//!
//! Two backing stores are supported: an in-memory buffer (used by tests and
//! by string ports) and the process's real stdout/stderr. Both are reached
//! through the same [`OutputPort`] enum so the pretty-printer and the
//! session's error reporting never need to know which one they have.

use std::io::{self, Write};

pub enum OutputPort {
    Memory(Vec<u8>),
    Stdout,
    Stderr,
}

impl OutputPort {
    pub fn memory() -> OutputPort {
        OutputPort::Memory(Vec::new())
    }

    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        match self {
            OutputPort::Memory(buf) => {
                buf.extend_from_slice(s.as_bytes());
                Ok(())
            }
            OutputPort::Stdout => {
                print!("{s}");
                io::stdout().flush()
            }
            OutputPort::Stderr => {
                eprint!("{s}");
                io::stderr().flush()
            }
        }
    }

    /// The buffered text, for an in-memory port. Always empty for the
    /// stdio variants, which don't retain what they wrote.
    pub fn contents(&self) -> &[u8] {
        match self {
            OutputPort::Memory(buf) => buf,
            OutputPort::Stdout | OutputPort::Stderr => &[],
        }
    }
}

/// The three ports a session carries: where ordinary output, diagnostic
/// output, and (for an embedding that supports it) prompted user output go.
pub struct Ports {
    pub user: OutputPort,
    pub out: OutputPort,
    pub err: OutputPort,
}

impl Default for Ports {
    fn default() -> Self {
        Ports { user: OutputPort::Stdout, out: OutputPort::Stdout, err: OutputPort::Stderr }
    }
}

impl Ports {
    pub fn in_memory() -> Ports {
        Ports { user: OutputPort::memory(), out: OutputPort::memory(), err: OutputPort::memory() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_port_accumulates_writes() {
        let mut port = OutputPort::memory();
        port.write_str("hello, ").unwrap();
        port.write_str("world").unwrap();
        assert_eq!(port.contents(), b"hello, world");
    }
}
