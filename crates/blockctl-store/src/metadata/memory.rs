use super::r#trait::{Block, BlockMetadataStore};
use crate::error::StoreError;
use blockctl_core::{BlockId, BlockStatus, NodeId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory Block Metadata Store, keyed by block id.
#[derive(Default)]
pub struct InMemoryBlockMetadataStore {
    blocks: RwLock<HashMap<BlockId, Block>>,
}

impl InMemoryBlockMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All blocks across all datasets, for snapshotting by the file backend.
    pub fn list_all(&self) -> Vec<Block> {
        self.blocks.read().values().cloned().collect()
    }
}

impl BlockMetadataStore for InMemoryBlockMetadataStore {
    fn upsert_block(&self, block: Block) -> Result<(), StoreError> {
        self.blocks.write().insert(block.id.clone(), block);
        Ok(())
    }

    fn get_block(&self, block_id: &BlockId) -> Result<Block, StoreError> {
        self.blocks
            .read()
            .get(block_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("block {block_id}")))
    }

    fn list_blocks(&self, dataset: &str) -> Vec<Block> {
        self.blocks
            .read()
            .values()
            .filter(|b| b.dataset == dataset)
            .cloned()
            .collect()
    }

    fn list_unassigned(&self) -> Vec<Block> {
        self.blocks
            .read()
            .values()
            .filter(|b| b.is_unassigned())
            .cloned()
            .collect()
    }

    fn set_placement(
        &self,
        block_id: &BlockId,
        leader: NodeId,
        followers: Vec<NodeId>,
    ) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        let block = blocks
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {block_id}")))?;
        block.leader = Some(leader);
        block.followers = followers;
        block.status = BlockStatus::Processing;
        Ok(())
    }

    fn clear_block(&self, block_id: &BlockId) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        let block = blocks
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {block_id}")))?;
        block.leader = None;
        block.followers.clear();
        block.status = BlockStatus::Pending;
        Ok(())
    }

    fn complete_block(&self, block_id: &BlockId) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        let block = blocks
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {block_id}")))?;
        block.status = BlockStatus::Completed;
        block.leader = None;
        block.followers.clear();
        Ok(())
    }

    fn mark_status(&self, block_id: &BlockId, status: BlockStatus) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        let block = blocks
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {block_id}")))?;
        block.status = status;
        Ok(())
    }

    fn remove_node_from_followers(&self, node: &NodeId) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write();
        for block in blocks.values_mut() {
            block.followers.retain(|f| f != node);
        }
        Ok(())
    }

    fn block_led_by(&self, node: &NodeId) -> Option<Block> {
        self.blocks
            .read()
            .values()
            .find(|b| b.leader.as_ref() == Some(node))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_get_round_trips() {
        let store = InMemoryBlockMetadataStore::new();
        let block = Block::new(
            BlockId::from("orders_block1.csv"),
            "orders",
            "s3://bucket/orders_block1.csv",
        );
        store.upsert_block(block.clone()).unwrap();
        assert_eq!(store.get_block(&block.id).unwrap(), block);
    }

    #[test]
    fn unassigned_until_placement_is_set() {
        let store = InMemoryBlockMetadataStore::new();
        let id = BlockId::from("orders_block1.csv");
        store
            .upsert_block(Block::new(id.clone(), "orders", "file"))
            .unwrap();
        assert_eq!(store.list_unassigned().len(), 1);

        store
            .set_placement(
                &id,
                NodeId::from("a:9100"),
                vec![NodeId::from("b:9100"), NodeId::from("c:9100")],
            )
            .unwrap();
        assert!(store.list_unassigned().is_empty());
        let block = store.get_block(&id).unwrap();
        assert_eq!(block.status, BlockStatus::Processing);
        assert_eq!(block.leader, Some(NodeId::from("a:9100")));
    }

    #[test]
    fn clear_block_reverts_to_pending() {
        let store = InMemoryBlockMetadataStore::new();
        let id = BlockId::from("orders_block1.csv");
        store
            .upsert_block(Block::new(id.clone(), "orders", "file"))
            .unwrap();
        store
            .set_placement(&id, NodeId::from("a:9100"), vec![])
            .unwrap();
        store.clear_block(&id).unwrap();
        let block = store.get_block(&id).unwrap();
        assert_eq!(block.status, BlockStatus::Pending);
        assert!(block.leader.is_none());
    }

    #[test]
    fn remove_node_from_followers_scans_all_blocks() {
        let store = InMemoryBlockMetadataStore::new();
        let dead = NodeId::from("dead:9100");
        for n in 1..=2 {
            let id = BlockId::from(format!("orders_block{n}.csv"));
            store
                .upsert_block(Block::new(id.clone(), "orders", "file"))
                .unwrap();
            store
                .set_placement(&id, NodeId::from("leader:9100"), vec![dead.clone()])
                .unwrap();
        }
        store.remove_node_from_followers(&dead).unwrap();
        for n in 1..=2 {
            let id = BlockId::from(format!("orders_block{n}.csv"));
            assert!(store.get_block(&id).unwrap().followers.is_empty());
        }
    }

    #[test]
    fn complete_block_clears_placement() {
        let store = InMemoryBlockMetadataStore::new();
        let id = BlockId::from("orders_block1.csv");
        store
            .upsert_block(Block::new(id.clone(), "orders", "file"))
            .unwrap();
        store
            .set_placement(&id, NodeId::from("a:9100"), vec![NodeId::from("b:9100")])
            .unwrap();
        store.complete_block(&id).unwrap();
        let block = store.get_block(&id).unwrap();
        assert_eq!(block.status, BlockStatus::Completed);
        assert!(block.leader.is_none());
        assert!(block.followers.is_empty());
    }

    #[test]
    fn list_unassigned_in_scopes_to_dataset_and_sorts_by_id() {
        let store = InMemoryBlockMetadataStore::new();
        store
            .upsert_block(Block::new(BlockId::from("orders_block2.csv"), "orders", "f"))
            .unwrap();
        store
            .upsert_block(Block::new(BlockId::from("orders_block1.csv"), "orders", "f"))
            .unwrap();
        store
            .upsert_block(Block::new(BlockId::from("other_block1.csv"), "other", "f"))
            .unwrap();
        let unassigned = store.list_unassigned_in("orders");
        assert_eq!(
            unassigned.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["orders_block1.csv", "orders_block2.csv"]
        );
    }

    #[test]
    fn block_led_by_finds_the_leader() {
        let store = InMemoryBlockMetadataStore::new();
        let id = BlockId::from("orders_block1.csv");
        store
            .upsert_block(Block::new(id.clone(), "orders", "file"))
            .unwrap();
        let leader = NodeId::from("a:9100");
        store.set_placement(&id, leader.clone(), vec![]).unwrap();
        let found = store.block_led_by(&leader).unwrap();
        assert_eq!(found.id, id);
        assert!(store.block_led_by(&NodeId::from("ghost:1")).is_none());
    }
}
