//! The Worker: registers with the Coordinator, processes pushed block
//! tasks (download, analyze, upload), and promotes itself to leader when
//! told to.

pub mod analyzer;
pub mod artifact_client;
pub mod control_client;
pub mod error;
pub mod runtime;

pub use error::WorkerError;
pub use runtime::WorkerRuntime;
