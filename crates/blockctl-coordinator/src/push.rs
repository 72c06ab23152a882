//! Outbound pushes from the Coordinator to a Worker's task-listen port.
//!
//! Always called with the Coordinator's mutex already released — the
//! [`crate::scheduler::Placement`]/[`crate::recovery::RecoveryOutcome`]
//! values carry everything needed without touching shared state again.

use crate::error::CoordinatorError;
use blockctl_core::protocol::{read_message, write_message, WorkerAck, WorkerPush};
use blockctl_core::{BlockId, NodeId, Role};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::debug;

async fn send(target: &NodeId, message: &WorkerPush) -> Result<(), CoordinatorError> {
    let (host, port) = target
        .host_port()
        .ok_or_else(|| CoordinatorError::UnknownWorker {
            id: target.to_string(),
        })?;
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| CoordinatorError::from(blockctl_core::ProtocolError::from_io_error(
            e,
            "connecting to worker task-listen port",
        )))?;
    let (read_half, mut write_half) = stream.into_split();
    write_message(&mut write_half, message).await?;

    let mut reader = BufReader::new(read_half);
    let ack: WorkerAck = read_message(&mut reader)
        .await?
        .ok_or(blockctl_core::ProtocolError::ConnectionClosed)?;

    match ack {
        WorkerAck::Ok => {
            debug!(worker = %target, "push acknowledged");
            Ok(())
        }
        WorkerAck::BadRequest { reason } => {
            Err(blockctl_core::ProtocolError::Malformed { reason }.into())
        }
    }
}

/// Pushes a fresh task assignment to `target`.
pub async fn push_task(
    target: &NodeId,
    role: Role,
    block_id: BlockId,
    file: String,
) -> Result<(), CoordinatorError> {
    send(
        target,
        &WorkerPush::Task {
            role,
            block_id,
            file,
        },
    )
    .await
}

/// Tells `target` to promote itself from storage replica to leader.
pub async fn push_promote(
    target: &NodeId,
    block_id: BlockId,
    file_base: String,
) -> Result<(), CoordinatorError> {
    send(target, &WorkerPush::PromoteToLeader { block_id, file_base }).await
}

/// Asks `target` to delete its locally held copy of `block_id`. Advisory —
/// loss of this message only wastes disk, never safety.
pub async fn push_release(
    target: &NodeId,
    block_id: BlockId,
    role: Role,
) -> Result<(), CoordinatorError> {
    send(target, &WorkerPush::Release { block_id, role }).await
}
