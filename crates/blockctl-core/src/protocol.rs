//! Wire messages and line framing for both the Coordinator's control port and
//! the Worker's task-listen port.
//!
//! Framing is newline-delimited JSON: one `serde_json`-encoded object per
//! line, capped at [`MAX_LINE_BYTES`], implemented over a
//! `tokio::net::TcpStream`.

use crate::error::ProtocolError;
use crate::ids::{BlockId, NodeId, ProcessingStatus, Role};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Maximum bytes permitted in a single framed line.
pub const MAX_LINE_BYTES: usize = 8192;

/// Messages a Worker or client sends to the Coordinator's control port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorRequest {
    Register {
        id: NodeId,
    },
    Heartbeat {
        id: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_task: Option<BlockId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        processing_status: Option<ProcessingStatus>,
    },
    TaskComplete {
        id: NodeId,
        block_id: BlockId,
        role: Role,
        success: bool,
        timestamp: String,
    },
    /// Keyed on `node_id` rather than `id`, unlike every other request variant.
    NodeFree {
        #[serde(rename = "node_id")]
        node_id: NodeId,
        file: String,
    },
    /// Sent by a client (not a Worker) to kick off scheduling for a dataset
    /// that has already been split into blocks by the upload service.
    Compute {
        file: String,
    },
}

/// The Coordinator's reply to a single control-port message, carrying one
/// of: `registered`, `alive`, `unknown_node`, `ok`, `error`,
/// `task_complete_ack`, `task_failed_ack`, `bad_request`, each with whatever
/// extra fields that status needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoordinatorReply {
    Registered,
    Alive,
    UnknownNode,
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    Error {
        error: String,
    },
    TaskCompleteAck,
    TaskFailedAck,
    BadRequest {
        reason: String,
    },
}

impl CoordinatorReply {
    pub fn ok() -> Self {
        CoordinatorReply::Ok { file: None }
    }

    pub fn ok_for_file(file: impl Into<String>) -> Self {
        CoordinatorReply::Ok {
            file: Some(file.into()),
        }
    }
}

/// Messages the Coordinator pushes to a Worker's task-listen port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerPush {
    Task {
        role: Role,
        block_id: BlockId,
        file: String,
    },
    /// Advisory request to delete a locally held copy of a completed block.
    Release {
        block_id: BlockId,
        role: Role,
    },
    /// Keyed `file_base`, distinct from `Task`'s `file`.
    PromoteToLeader {
        block_id: BlockId,
        file_base: String,
    },
}

/// A Worker's acknowledgement of a pushed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerAck {
    Ok,
    BadRequest { reason: String },
}

/// Reads one newline-delimited JSON message from `reader`, enforcing
/// [`MAX_LINE_BYTES`]. Returns `Ok(None)` on a clean EOF before any bytes
/// were read (the other side closed the connection between messages).
pub async fn read_message<R, T>(reader: &mut BufReader<R>) -> Result<Option<T>, ProtocolError>
where
    R: tokio::io::AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut line = String::new();
    let bytes_read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| ProtocolError::from_io_error(e, "reading framed message"))?;

    if bytes_read == 0 {
        return Ok(None);
    }

    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLong {
            limit: MAX_LINE_BYTES,
        });
    }

    let trimmed = line.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Err(ProtocolError::ConnectionClosed);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(ProtocolError::from_json_error)
}

/// Writes `message` as one newline-terminated JSON line to `writer`.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_string(message).map_err(ProtocolError::from_json_error)?;
    encoded.push('\n');
    writer
        .write_all(encoded.as_bytes())
        .await
        .map_err(|e| ProtocolError::from_io_error(e, "writing framed message"))?;
    writer
        .flush()
        .await
        .map_err(|e| ProtocolError::from_io_error(e, "flushing framed message"))
}
