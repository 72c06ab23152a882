//! Error types for the Coordinator.

use blockctl_core::ProtocolError;
use blockctl_store::StoreError;
use std::fmt;

/// Main error type for Coordinator operations, wrapping the lower-level
/// store and protocol errors and adding the control-plane-specific cases.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    Store(StoreError),
    Protocol(ProtocolError),
    /// No `Alive` worker with a free task slot when the scheduler tried to
    /// place a block.
    NoFreeWorker,
    UnknownWorker { id: String },
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::Store(e) => write!(f, "store error: {e}"),
            CoordinatorError::Protocol(e) => write!(f, "protocol error: {e}"),
            CoordinatorError::NoFreeWorker => write!(f, "no free worker available"),
            CoordinatorError::UnknownWorker { id } => write!(f, "unknown worker '{id}'"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        CoordinatorError::Store(e)
    }
}

impl From<ProtocolError> for CoordinatorError {
    fn from(e: ProtocolError) -> Self {
        CoordinatorError::Protocol(e)
    }
}

impl CoordinatorError {
    pub fn is_not_found(&self) -> bool {
        match self {
            CoordinatorError::Store(e) => e.is_not_found(),
            CoordinatorError::UnknownWorker { .. } => true,
            _ => false,
        }
    }
}
