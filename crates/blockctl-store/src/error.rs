use std::fmt;

/// Errors from the Node Registry and Block Metadata Store, covering both the
/// in-memory and file-backed implementations.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    NotFound {
        context: String,
    },
    ReadFailed {
        context: String,
        source: Box<StoreErrorSource>,
    },
    WriteFailed {
        context: String,
        source: Box<StoreErrorSource>,
    },
    DataCorruption {
        context: String,
        details: String,
    },
    DirectoryLocked {
        context: String,
        pid: Option<u32>,
    },
    LockAcquisitionFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreErrorSource {
    Io(String),
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { context } => write!(f, "not found: {context}"),
            StoreError::ReadFailed { context, source } => {
                write!(f, "read failed in {context}: {source}")
            }
            StoreError::WriteFailed { context, source } => {
                write!(f, "write failed in {context}: {source}")
            }
            StoreError::DataCorruption { context, details } => {
                write!(f, "data corruption in {context}: {details}")
            }
            StoreError::DirectoryLocked { context, pid } => match pid {
                Some(pid) => write!(f, "directory locked in {context} (pid: {pid})"),
                None => write!(f, "directory locked in {context}"),
            },
            StoreError::LockAcquisitionFailed => {
                write!(f, "failed to acquire exclusive lock on data directory")
            }
        }
    }
}

impl fmt::Display for StoreErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorSource::Io(msg) => write!(f, "I/O error: {msg}"),
            StoreErrorSource::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}
impl std::error::Error for StoreErrorSource {}

impl StoreError {
    pub fn not_found(context: impl Into<String>) -> Self {
        StoreError::NotFound {
            context: context.into(),
        }
    }

    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        StoreError::WriteFailed {
            context: context.to_string(),
            source: Box::new(StoreErrorSource::Io(e.to_string())),
        }
    }

    pub fn from_serialization_error(e: impl std::fmt::Display, context: &str) -> Self {
        StoreError::DataCorruption {
            context: context.to_string(),
            details: e.to_string(),
        }
    }

    /// Whether this error represents a missing entity, the way
    /// `ClusterError::is_not_found` lets callers distinguish "absent" from
    /// a real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
