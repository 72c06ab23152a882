//! Outbound connection from a Worker to the Coordinator's control port.
//! One-message-per-connection: each call opens a fresh connection, sends
//! one message, reads the reply, and closes.

use crate::error::WorkerError;
use blockctl_core::protocol::{read_message, write_message, CoordinatorReply, CoordinatorRequest};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::warn;

/// Starting delay for [`send_with_backoff`]'s exponential retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
/// Delay never grows past this.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub async fn send(coordinator_addr: &str, request: CoordinatorRequest) -> Result<(), WorkerError> {
    let stream = TcpStream::connect(coordinator_addr)
        .await
        .map_err(|e| WorkerError::from_io_error(e, "connecting to coordinator"))?;
    let (read_half, mut write_half) = stream.into_split();
    write_message(&mut write_half, &request).await?;

    let mut reader = BufReader::new(read_half);
    let reply: CoordinatorReply = read_message(&mut reader)
        .await?
        .ok_or(blockctl_core::ProtocolError::ConnectionClosed)?;

    match reply {
        CoordinatorReply::Registered
        | CoordinatorReply::Alive
        | CoordinatorReply::Ok { .. }
        | CoordinatorReply::TaskCompleteAck
        | CoordinatorReply::TaskFailedAck => Ok(()),
        CoordinatorReply::UnknownNode => {
            Err(blockctl_core::ProtocolError::Malformed {
                reason: "coordinator does not recognize this worker; re-register".to_string(),
            }
            .into())
        }
        CoordinatorReply::Error { error } => {
            Err(blockctl_core::ProtocolError::Malformed { reason: error }.into())
        }
        CoordinatorReply::BadRequest { reason } => {
            Err(blockctl_core::ProtocolError::Malformed { reason }.into())
        }
    }
}

/// Retries [`send`] on connection loss with exponential backoff, doubling
/// from [`INITIAL_BACKOFF`] and capped at [`MAX_BACKOFF`]. `max_attempts` of
/// `None` retries forever; `Some(n)` gives up and returns the last error
/// after `n` attempts.
pub async fn send_with_backoff(
    coordinator_addr: &str,
    request: CoordinatorRequest,
    max_attempts: Option<u32>,
) -> Result<(), WorkerError> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0u32;
    loop {
        match send(coordinator_addr, request.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(e);
                }
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "control connection failed, retrying with backoff"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
