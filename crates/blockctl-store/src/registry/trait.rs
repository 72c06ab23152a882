use crate::error::StoreError;
use blockctl_core::{BlockId, NodeId, TaskSlot, WorkerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Worker's entry in the Node Registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub id: NodeId,
    pub status: WorkerStatus,
    pub task: TaskSlot,
    pub last_heartbeat: DateTime<Utc>,
    /// Number of blocks this worker currently holds a replica of (leader or
    /// storage), used to pick least-loaded followers.
    pub storage_load: u64,
}

impl WorkerEntry {
    pub fn new(id: NodeId, now: DateTime<Utc>) -> Self {
        WorkerEntry {
            id,
            status: WorkerStatus::Alive,
            task: TaskSlot::Free,
            last_heartbeat: now,
            storage_load: 0,
        }
    }
}

/// C1 Node Registry: tracks liveness and current assignment for every
/// Worker the Coordinator knows about.
pub trait NodeRegistry: Send + Sync {
    /// Adds a new worker, or resets an existing one to `Alive`/free on
    /// re-registration.
    fn register(&self, id: NodeId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Records a heartbeat, setting `status` back to `Alive`.
    fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Removes a worker entirely (used when an operator decommissions a node).
    fn remove(&self, id: &NodeId) -> Result<(), StoreError>;

    /// Marks a worker `Dead`. Does not remove the entry — its last known
    /// assignment is still needed for recovery.
    fn mark_dead(&self, id: &NodeId) -> Result<(), StoreError>;

    /// Assigns `block` to `id` as its current task.
    fn mark_assigned(&self, id: &NodeId, block: BlockId) -> Result<(), StoreError>;

    /// Clears a worker's current task, returning it to the free pool.
    fn mark_free(&self, id: &NodeId) -> Result<(), StoreError>;

    /// Increments or decrements a worker's replica count, used to rank
    /// follower candidates by load.
    fn adjust_storage_load(&self, id: &NodeId, delta: i64) -> Result<(), StoreError>;

    /// Workers currently `Alive` with `TaskSlot::Free`, ordered ascending by
    /// `NodeId` — the deterministic leader-placement rule.
    fn free_workers(&self) -> Vec<NodeId>;

    /// Up to `count` `Alive` workers other than `exclude`, ranked by
    /// ascending `storage_load` (least-loaded first).
    fn candidates_for_follower(&self, exclude: &NodeId, count: usize) -> Vec<NodeId>;

    /// All entries older than `timeout`'s cutoff among currently `Alive`
    /// workers — the failure detector's sweep target.
    fn stale_workers(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<NodeId>;

    fn get(&self, id: &NodeId) -> Result<WorkerEntry, StoreError>;

    fn list(&self) -> Vec<WorkerEntry>;
}
