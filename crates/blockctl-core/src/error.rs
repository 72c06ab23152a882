use std::fmt;

/// Errors from the line-oriented JSON framing used by both the Coordinator's
/// control port and the Worker's task-listen port.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The connection was closed before a full line arrived.
    ConnectionClosed,
    /// A line exceeded the 8 KiB framing limit.
    LineTooLong { limit: usize },
    /// The line did not parse as JSON, or parsed but didn't match any known message.
    Malformed { reason: String },
    /// Transport-level I/O failure reading or writing the socket.
    Io { context: String, reason: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ConnectionClosed => write!(f, "connection closed mid-message"),
            ProtocolError::LineTooLong { limit } => {
                write!(f, "message exceeded the {limit}-byte framing limit")
            }
            ProtocolError::Malformed { reason } => write!(f, "malformed message: {reason}"),
            ProtocolError::Io { context, reason } => {
                write!(f, "I/O error in {context}: {reason}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        ProtocolError::Io {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_json_error(e: serde_json::Error) -> Self {
        ProtocolError::Malformed {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_protocol_error_correctly() {
        let error = ProtocolError::LineTooLong { limit: 8192 };
        assert_eq!(
            error.to_string(),
            "message exceeded the 8192-byte framing limit"
        );
    }

    #[test]
    fn wraps_json_error() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let error = ProtocolError::from_json_error(bad.unwrap_err());
        matches!(error, ProtocolError::Malformed { .. });
    }
}
