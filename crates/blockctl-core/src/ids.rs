//! Core identifiers and small enums shared by the Coordinator and Worker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a worker: `host:port`, where `port` is the worker's task-listener port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeId(format!("{}:{port}", host.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split back into `(host, port)`. Returns `None` if the id isn't `host:port`.
    pub fn host_port(&self) -> Option<(&str, u16)> {
        let (host, port) = self.0.rsplit_once(':')?;
        Some((host, port.parse().ok()?))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Identity of a block within a dataset: `{file_base}_block{N}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(file_base: &str, n: u32, ext: &str) -> Self {
        BlockId(format!("{file_base}_block{n}.{ext}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the owning dataset's `file_base` from a block id, using the
    /// `{file_base}_block{N}.{ext}` naming convention.
    pub fn file_base(&self) -> Option<&str> {
        let without_ext = match self.0.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => &self.0,
        };
        without_ext.rsplit_once("_block").map(|(base, _n)| base)
    }

    /// The file extension carried by this block id, e.g. `"csv"` for
    /// `orders_block3.csv`. Needed to rebuild the artifact service's
    /// `/download/{file}.ext/blocks/{block_id}` URL.
    pub fn ext(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_stem, ext)| ext)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        BlockId(s)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        BlockId(s.to_string())
    }
}

/// A leader replicates and computes; a storage replica just holds a follower copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Leader,
    Storage,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Storage => write!(f, "storage"),
        }
    }
}

/// Liveness as tracked by the Coordinator's failure detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Alive,
    Dead,
}

/// A worker's current assignment: either free, or leading exactly one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSlot {
    Free,
    Assigned(BlockId),
}

impl TaskSlot {
    pub fn is_free(&self) -> bool {
        matches!(self, TaskSlot::Free)
    }

    pub fn block_id(&self) -> Option<&BlockId> {
        match self {
            TaskSlot::Free => None,
            TaskSlot::Assigned(id) => Some(id),
        }
    }
}

/// Worker-reported status of its currently active task, carried on `heartbeat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Idle,
    Processing,
}

/// Lifecycle state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Pending,
    Processing,
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_round_trips_host_port() {
        let id = NodeId::new("127.0.0.1", 7000);
        assert_eq!(id.as_str(), "127.0.0.1:7000");
        assert_eq!(id.host_port(), Some(("127.0.0.1", 7000)));
    }

    #[test]
    fn block_id_recovers_file_base() {
        let id = BlockId::new("orders", 3, "csv");
        assert_eq!(id.as_str(), "orders_block3.csv");
        assert_eq!(id.file_base(), Some("orders"));
        assert_eq!(id.ext(), Some("csv"));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Leader).unwrap(), "\"leader\"");
        assert_eq!(
            serde_json::to_string(&Role::Storage).unwrap(),
            "\"storage\""
        );
    }

    #[test]
    fn task_slot_distinguishes_free_from_assigned() {
        assert!(TaskSlot::Free.is_free());
        let assigned = TaskSlot::Assigned(BlockId::from("orders_block1.csv"));
        assert!(!assigned.is_free());
        assert_eq!(assigned.block_id().unwrap().as_str(), "orders_block1.csv");
    }
}
