//! Fail-fast: the only way this crate ever releases the process.

use std::fmt;

/// Why the process is being failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailFast {
    /// The session stayed down for the whole window and resetting is disabled.
    NotReconnected,
    /// The reconnect attempt did not finish within its window.
    ReconnectTimedOut,
    /// The reconnect attempt reported a fault.
    ReconnectFaulted(String),
    /// A handler reported an environment-level failure.
    HandlerFatal { handler: String, error: String },
}

impl fmt::Display for FailFast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReconnected => f.write_str("client did not reconnect in time"),
            Self::ReconnectTimedOut => f.write_str("client reset timed out (task deadlocked?)"),
            Self::ReconnectFaulted(reason) => write!(f, "client reset faulted: {reason}"),
            Self::HandlerFatal { handler, error } => {
                write!(f, "handler {handler} hit a fatal error: {error}")
            }
        }
    }
}

/// Terminates the process on unrecoverable failure.
///
/// Restarting is left to whatever supervises the process.
pub trait Terminator: Send + Sync + 'static {
    fn terminate(&self, reason: FailFast);
}

/// Exits the process with a non-zero status.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExit {
    code: i32,
}

impl ProcessExit {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

impl Default for ProcessExit {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Terminator for ProcessExit {
    fn terminate(&self, reason: FailFast) {
        tracing::error!(fatal = true, code = self.code, "{}, killing process", reason);
        std::process::exit(self.code);
    }
}
