pub mod config;
pub mod error;
pub mod ids;
pub mod protocol;
pub mod telemetry;

pub use error::ProtocolError;
pub use ids::{BlockId, BlockStatus, NodeId, ProcessingStatus, Role, TaskSlot, WorkerStatus};

// Re-export logging macros for consistent usage across the workspace.
pub use log::{debug, error, info, trace, warn};
