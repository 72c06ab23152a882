use super::memory::InMemoryBlockMetadataStore;
use super::r#trait::{Block, BlockMetadataStore};
use crate::error::StoreError;
use crate::lock::acquire_directory_lock;
use blockctl_core::{BlockId, BlockStatus, NodeId};
use std::fs::File;
use std::path::{Path, PathBuf};

/// File-backed Block Metadata Store: wraps [`InMemoryBlockMetadataStore`] and
/// persists a full JSON snapshot to `<data_dir>/blocks.json` after every
/// mutation, rather than append-logging each change.
pub struct FileBlockMetadataStore {
    inner: InMemoryBlockMetadataStore,
    snapshot_path: PathBuf,
    _directory_lock: File,
}

impl FileBlockMetadataStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::from_io_error(e, "creating metadata data directory"))?;
        let directory_lock = acquire_directory_lock(data_dir)?;

        let snapshot_path = data_dir.join("blocks.json");
        let inner = InMemoryBlockMetadataStore::new();
        if snapshot_path.exists() {
            let contents = std::fs::read_to_string(&snapshot_path)
                .map_err(|e| StoreError::from_io_error(e, "reading metadata snapshot"))?;
            let blocks: Vec<Block> = serde_json::from_str(&contents)
                .map_err(|e| StoreError::from_serialization_error(e, "metadata snapshot"))?;
            for block in blocks {
                inner.upsert_block(block)?;
            }
        }

        Ok(FileBlockMetadataStore {
            inner,
            snapshot_path,
            _directory_lock: directory_lock,
        })
    }

    fn persist(&self) -> Result<(), StoreError> {
        let blocks: Vec<Block> = self.inner.list_all();
        let encoded = serde_json::to_string_pretty(&blocks)
            .map_err(|e| StoreError::from_serialization_error(e, "metadata snapshot"))?;
        std::fs::write(&self.snapshot_path, encoded)
            .map_err(|e| StoreError::from_io_error(e, "writing metadata snapshot"))
    }
}

impl BlockMetadataStore for FileBlockMetadataStore {
    fn upsert_block(&self, block: Block) -> Result<(), StoreError> {
        self.inner.upsert_block(block)?;
        self.persist()
    }

    fn get_block(&self, block_id: &BlockId) -> Result<Block, StoreError> {
        self.inner.get_block(block_id)
    }

    fn list_blocks(&self, dataset: &str) -> Vec<Block> {
        self.inner.list_blocks(dataset)
    }

    fn list_unassigned(&self) -> Vec<Block> {
        self.inner.list_unassigned()
    }

    fn set_placement(
        &self,
        block_id: &BlockId,
        leader: NodeId,
        followers: Vec<NodeId>,
    ) -> Result<(), StoreError> {
        self.inner.set_placement(block_id, leader, followers)?;
        self.persist()
    }

    fn clear_block(&self, block_id: &BlockId) -> Result<(), StoreError> {
        self.inner.clear_block(block_id)?;
        self.persist()
    }

    fn complete_block(&self, block_id: &BlockId) -> Result<(), StoreError> {
        self.inner.complete_block(block_id)?;
        self.persist()
    }

    fn mark_status(&self, block_id: &BlockId, status: BlockStatus) -> Result<(), StoreError> {
        self.inner.mark_status(block_id, status)?;
        self.persist()
    }

    fn remove_node_from_followers(&self, node: &NodeId) -> Result<(), StoreError> {
        self.inner.remove_node_from_followers(node)?;
        self.persist()
    }

    fn block_led_by(&self, node: &NodeId) -> Option<Block> {
        self.inner.block_led_by(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = BlockId::from("orders_block1.csv");
        {
            let store = FileBlockMetadataStore::open(dir.path()).unwrap();
            store
                .upsert_block(Block::new(id.clone(), "orders", "file"))
                .unwrap();
        }
        let store = FileBlockMetadataStore::open(dir.path()).unwrap();
        assert_eq!(store.get_block(&id).unwrap().id, id);
    }
}
