//! A thin client for the Coordinator's control port, used by the CLI test
//! client and by integration tests that want to drive a running Coordinator
//! without pulling in the full Worker runtime.

use blockctl_core::protocol::{read_message, write_message, CoordinatorReply, CoordinatorRequest};
use tokio::io::BufReader;
use tokio::net::TcpStream;

pub struct ControlClient {
    addr: String,
}

impl ControlClient {
    pub fn new(addr: impl Into<String>) -> Self {
        ControlClient { addr: addr.into() }
    }

    /// Sends one request and returns the Coordinator's reply. Opens and
    /// closes its own connection, matching the protocol's one-message
    /// framing.
    pub async fn send(
        &self,
        request: CoordinatorRequest,
    ) -> Result<CoordinatorReply, blockctl_core::ProtocolError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| blockctl_core::ProtocolError::from_io_error(e, "connecting to coordinator"))?;
        let (read_half, mut write_half) = stream.into_split();
        write_message(&mut write_half, &request).await?;

        let mut reader = BufReader::new(read_half);
        read_message(&mut reader)
            .await?
            .ok_or(blockctl_core::ProtocolError::ConnectionClosed)
    }
}
