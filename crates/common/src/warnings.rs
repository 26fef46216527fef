use std::fmt;
use std::sync::{Arc, Mutex};

/// A recoverable problem surfaced outside the error path — typically a
/// malformed row or line that a permissive reader degraded to nulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Source path or locator the warning originated from.
    pub source: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Shared warning sink handed to every reader a query opens.
///
/// Cloning shares the underlying buffer; callers consult the snapshot
/// after (or during) iteration.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    buf: Arc<Mutex<Vec<Warning>>>,
}

impl Warnings {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn push(&self, source: impl Into<String>, message: impl Into<String>) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.push(Warning {
                source: source.into(),
                message: message.into(),
            });
        }
    }

    /// Copies out everything recorded so far.
    pub fn snapshot(&self) -> Vec<Warning> {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Number of warnings recorded so far.
    pub fn len(&self) -> usize {
        self.buf.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
