use super::entry::HandlerEntry;
use super::locator::BoundHandler;
use serde::Serialize;
use std::fmt;

/// How a bound handler must be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    /// Runs to completion on the calling thread
    Blocking,
    /// Returns a future that may suspend before completing
    Suspendable,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionKind::Blocking => f.write_str("blocking"),
            ExecutionKind::Suspendable => f.write_str("suspendable"),
        }
    }
}

/// Classify a handler by its declared calling convention.
#[must_use]
pub fn classify(handler: &BoundHandler) -> ExecutionKind {
    match handler.entry() {
        HandlerEntry::Blocking(_) => ExecutionKind::Blocking,
        HandlerEntry::Suspendable(_) => ExecutionKind::Suspendable,
    }
}
