//! Error types for Horizon Palette core.

use std::fmt;

/// Dispatch-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatch queue was dropped; nothing will ever run the invocation.
    QueueClosed,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueClosed => write!(f, "Dispatch queue has been closed"),
        }
    }
}

impl std::error::Error for DispatchError {}
