//! The error taxonomy a task callback can report, and its translation into
//! a reschedule hint. See `spec.md` §7.
//!
//! Callbacks never throw across the schedule boundary -- [`CoreError`] is
//! always caught at the task-execution boundary and turned into a
//! [`crate::scheduler::task::TaskOutcome`] by `TaskKind::perform`.

use std::fmt;

/// An internal precondition was violated. Fatal: the process should abort
/// rather than attempt to continue in an inconsistent state.
#[derive(Debug)]
pub struct AssertionFailure(pub String);

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal precondition violated: {}", self.0)
    }
}

impl std::error::Error for AssertionFailure {}

/// Error kinds the core must distinguish (`spec.md` §7).
#[derive(Debug, Clone)]
pub enum CoreError {
    /// Internal precondition violated; fatal, would abort if not caught at
    /// a task boundary (callbacks catch it and log instead of aborting the
    /// whole daemon, since one bad zone should not take others down).
    Assert(String),
    /// Policy or zonelist unusable; reported to the operator, no reschedule.
    Config(String),
    /// Database or keystore error; caller should back off exponentially.
    Backend(String),
    /// Optimistic-concurrency collision; caller should retry promptly on a
    /// fresh snapshot.
    Conflict(String),
    /// Requested entity absent.
    NotFound(String),
    /// Zone file / pipe / socket error; caller should back off.
    Io(String),
    /// Non-error signal: nothing to do (FIFO full, nothing to sign).
    Unchanged(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, msg) = match self {
            Self::Assert(m) => ("ASSERT", m),
            Self::Config(m) => ("CONFIG", m),
            Self::Backend(m) => ("BACKEND", m),
            Self::Conflict(m) => ("CONFLICT", m),
            Self::NotFound(m) => ("NOT_FOUND", m),
            Self::Io(m) => ("IO", m),
            Self::Unchanged(m) => ("UNCHANGED", m),
        };
        write!(f, "{kind}: {msg}")
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// A fatal error surfaced to `main`, causing the daemon to exit with a
/// non-zero status. Distinct from [`CoreError`], which is always handled
/// internally by the scheduler.
#[derive(Debug)]
pub struct ExitError {
    pub message: String,
    pub code: u8,
}

impl ExitError {
    pub fn new(message: impl Into<String>, code: u8) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExitError {}
