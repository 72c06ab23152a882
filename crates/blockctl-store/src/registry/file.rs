use super::memory::InMemoryNodeRegistry;
use super::r#trait::{NodeRegistry, WorkerEntry};
use crate::error::StoreError;
use crate::lock::acquire_directory_lock;
use blockctl_core::{BlockId, NodeId};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};

/// File-backed Node Registry: wraps [`InMemoryNodeRegistry`] for all state
/// and logic, and persists a full JSON snapshot to `<data_dir>/registry.json`
/// after every mutation rather than append-logging each change.
pub struct FileNodeRegistry {
    inner: InMemoryNodeRegistry,
    snapshot_path: PathBuf,
    _directory_lock: File,
}

impl FileNodeRegistry {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::from_io_error(e, "creating registry data directory"))?;
        let directory_lock = acquire_directory_lock(data_dir)?;

        let snapshot_path = data_dir.join("registry.json");
        let inner = InMemoryNodeRegistry::new();
        if snapshot_path.exists() {
            let contents = std::fs::read_to_string(&snapshot_path)
                .map_err(|e| StoreError::from_io_error(e, "reading registry snapshot"))?;
            let entries: Vec<WorkerEntry> = serde_json::from_str(&contents)
                .map_err(|e| StoreError::from_serialization_error(e, "registry snapshot"))?;
            for entry in entries {
                inner.register(entry.id.clone(), entry.last_heartbeat)?;
                if !entry.task.is_free() {
                    inner.mark_assigned(&entry.id, entry.task.block_id().unwrap().clone())?;
                }
                inner.adjust_storage_load(&entry.id, entry.storage_load as i64)?;
            }
        }

        Ok(FileNodeRegistry {
            inner,
            snapshot_path,
            _directory_lock: directory_lock,
        })
    }

    fn persist(&self) -> Result<(), StoreError> {
        let entries = self.inner.list();
        let encoded = serde_json::to_string_pretty(&entries)
            .map_err(|e| StoreError::from_serialization_error(e, "registry snapshot"))?;
        std::fs::write(&self.snapshot_path, encoded)
            .map_err(|e| StoreError::from_io_error(e, "writing registry snapshot"))
    }
}

impl NodeRegistry for FileNodeRegistry {
    fn register(&self, id: NodeId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.register(id, now)?;
        self.persist()
    }

    fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.heartbeat(id, now)?;
        self.persist()
    }

    fn remove(&self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.remove(id)?;
        self.persist()
    }

    fn mark_dead(&self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.mark_dead(id)?;
        self.persist()
    }

    fn mark_assigned(&self, id: &NodeId, block: BlockId) -> Result<(), StoreError> {
        self.inner.mark_assigned(id, block)?;
        self.persist()
    }

    fn mark_free(&self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.mark_free(id)?;
        self.persist()
    }

    fn adjust_storage_load(&self, id: &NodeId, delta: i64) -> Result<(), StoreError> {
        self.inner.adjust_storage_load(id, delta)?;
        self.persist()
    }

    fn free_workers(&self) -> Vec<NodeId> {
        self.inner.free_workers()
    }

    fn candidates_for_follower(&self, exclude: &NodeId, count: usize) -> Vec<NodeId> {
        self.inner.candidates_for_follower(exclude, count)
    }

    fn stale_workers(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<NodeId> {
        self.inner.stale_workers(now, timeout)
    }

    fn get(&self, id: &NodeId) -> Result<WorkerEntry, StoreError> {
        self.inner.get(id)
    }

    fn list(&self) -> Vec<WorkerEntry> {
        self.inner.list()
    }
}
