//! Error types for the worker-node execution core.

use std::fmt;

/// Errors surfaced by the worker core.
///
/// Pipeline errors on a single comparison are *not* represented here —
/// those are folded into a per-thread counter (see `ThreadState::errors`)
/// and never abort the search. `WorkerError` is reserved for the failure
/// kinds that the main thread must act on: fatal setup failures, resource
/// exhaustion mid-search, and malformed protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Shard load, thread creation, or lock initialization failed at
    /// startup. Fatal: the process should abort with this diagnostic.
    Setup { detail: String },
    /// A pool allocation failed mid-search (out of memory). Fatal to the
    /// current search: the main thread reports this to the master and
    /// initiates shutdown without uploading a partial result.
    ResourceExhausted { detail: String },
    /// A malformed or out-of-sequence message arrived from the master.
    /// Fatal: initiates shutdown.
    Protocol { detail: String },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Setup { detail } => write!(f, "setup failure: {detail}"),
            WorkerError::ResourceExhausted { detail } => {
                write!(f, "resource exhausted: {detail}")
            }
            WorkerError::Protocol { detail } => write!(f, "protocol error: {detail}"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl WorkerError {
    #[must_use]
    pub fn setup(detail: impl Into<String>) -> Self {
        WorkerError::Setup {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn resource_exhausted(detail: impl Into<String>) -> Self {
        WorkerError::ResourceExhausted {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn protocol(detail: impl Into<String>) -> Self {
        WorkerError::Protocol {
            detail: detail.into(),
        }
    }

    /// Whether this error should cause the main loop to initiate
    /// shutdown (true for all variants today, but kept as a method so
    /// call sites read by intent rather than by matching variants).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }
}
