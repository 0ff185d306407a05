//! Diagnostic message collection
//!
//! Warnings are advisory: they never change an operation's outcome by
//! themselves. Each open handle collects its own warnings so callers can
//! inspect them after the fact; every warning is also emitted as a
//! `tracing` event at `WARN` level.

/// Warnings collected by one archive handle.
#[derive(Debug, Default)]
pub struct Warnings {
    messages: Vec<String>,
}

impl Warnings {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, message: String) {
        tracing::warn!(target: "cabaret", "{message}");
        self.messages.push(message);
    }

    pub(crate) fn append(&mut self, mut other: Warnings) {
        self.messages.append(&mut other.messages);
    }

    /// All messages recorded so far, oldest first.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of recorded messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
