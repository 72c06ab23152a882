use crate::error::StoreError;
use blockctl_core::{BlockId, BlockStatus, NodeId};
use serde::{Deserialize, Serialize};

/// A block's placement and lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub dataset: String,
    /// The dataset's `file_base` identity, used to reconstruct the artifact
    /// service's `/download/{file}.ext/blocks/{id}` URL. Ordinarily equal to
    /// `dataset`.
    pub file: String,
    pub status: BlockStatus,
    pub leader: Option<NodeId>,
    pub followers: Vec<NodeId>,
}

impl Block {
    pub fn new(id: BlockId, dataset: impl Into<String>, file: impl Into<String>) -> Self {
        Block {
            id,
            dataset: dataset.into(),
            file: file.into(),
            status: BlockStatus::Pending,
            leader: None,
            followers: Vec::new(),
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.leader.is_none()
    }
}

/// C2 Block Metadata Store: tracks every block's dataset membership, file
/// location, lifecycle status, and current leader/follower placement.
pub trait BlockMetadataStore: Send + Sync {
    /// Registers a new block, or overwrites an existing one with the same id.
    fn upsert_block(&self, block: Block) -> Result<(), StoreError>;

    fn get_block(&self, block_id: &BlockId) -> Result<Block, StoreError>;

    fn list_blocks(&self, dataset: &str) -> Vec<Block>;

    /// All blocks across all datasets with no leader assigned yet.
    fn list_unassigned(&self) -> Vec<Block>;

    /// Blocks of `dataset` with no leader assigned yet, ascending by
    /// `block_id` — the order `compute`'s initial scheduling pass offers
    /// them to the scheduler in.
    fn list_unassigned_in(&self, dataset: &str) -> Vec<Block> {
        let mut blocks: Vec<Block> = self
            .list_blocks(dataset)
            .into_iter()
            .filter(Block::is_unassigned)
            .collect();
        blocks.sort_by(|a, b| a.id.cmp(&b.id));
        blocks
    }

    /// Assigns `leader`/`followers` to a block and marks it `Processing`.
    fn set_placement(
        &self,
        block_id: &BlockId,
        leader: NodeId,
        followers: Vec<NodeId>,
    ) -> Result<(), StoreError>;

    /// Resets a block to `Pending` with no placement — used when a block's
    /// leader and sole follower are both lost, or when its leader reports a
    /// task failure.
    fn clear_block(&self, block_id: &BlockId) -> Result<(), StoreError>;

    /// Marks a block `Completed` and clears its placement, per the §3
    /// invariant `completed ⇒ leader = null ∧ followers = []`.
    fn complete_block(&self, block_id: &BlockId) -> Result<(), StoreError>;

    fn mark_status(&self, block_id: &BlockId, status: BlockStatus) -> Result<(), StoreError>;

    /// Removes `node` from every block's follower list across every dataset
    /// — used after a leader promotion retires the old leader's replica.
    fn remove_node_from_followers(&self, node: &NodeId) -> Result<(), StoreError>;

    /// Finds the block currently led by `node`, if any.
    fn block_led_by(&self, node: &NodeId) -> Option<Block>;
}
