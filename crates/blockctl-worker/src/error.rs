use blockctl_core::ProtocolError;
use std::fmt;

/// Errors from the Worker runtime: talking to the artifact service, running
/// the analyzer, or talking to the Coordinator.
#[derive(Debug)]
pub enum WorkerError {
    Download { context: String, reason: String },
    Upload { context: String, reason: String },
    Analyze { context: String, reason: String },
    Protocol(ProtocolError),
    Io { context: String, reason: String },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Download { context, reason } => {
                write!(f, "download failed in {context}: {reason}")
            }
            WorkerError::Upload { context, reason } => {
                write!(f, "upload failed in {context}: {reason}")
            }
            WorkerError::Analyze { context, reason } => {
                write!(f, "analysis failed in {context}: {reason}")
            }
            WorkerError::Protocol(e) => write!(f, "protocol error: {e}"),
            WorkerError::Io { context, reason } => write!(f, "I/O error in {context}: {reason}"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<ProtocolError> for WorkerError {
    fn from(e: ProtocolError) -> Self {
        WorkerError::Protocol(e)
    }
}

impl WorkerError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        WorkerError::Io {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_reqwest_error(e: reqwest::Error, context: &str) -> Self {
        if e.is_builder() || e.is_request() {
            WorkerError::Download {
                context: context.to_string(),
                reason: e.to_string(),
            }
        } else {
            WorkerError::Upload {
                context: context.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
