//! The Coordinator: node registry, block metadata, failure detection,
//! scheduling, recovery, and the control-plane TCP server.

pub mod coordinator;
pub mod error;
pub mod failure_detector;
pub mod push;
pub mod recovery;
pub mod scheduler;
pub mod server;

pub use coordinator::Coordinator;
pub use error::CoordinatorError;

pub use log::{debug, error, info, trace, warn};
