use super::r#trait::{NodeRegistry, WorkerEntry};
use crate::error::StoreError;
use blockctl_core::{BlockId, NodeId, TaskSlot, WorkerStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory Node Registry. State is lost on restart; suitable for tests and
/// for deployments that accept re-registration after a Coordinator restart.
#[derive(Default)]
pub struct InMemoryNodeRegistry {
    workers: RwLock<HashMap<NodeId, WorkerEntry>>,
}

impl InMemoryNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeRegistry for InMemoryNodeRegistry {
    fn register(&self, id: NodeId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        workers
            .entry(id.clone())
            .and_modify(|w| {
                w.status = WorkerStatus::Alive;
                w.task = TaskSlot::Free;
                w.last_heartbeat = now;
            })
            .or_insert_with(|| WorkerEntry::new(id, now));
        Ok(())
    }

    fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))?;
        entry.status = WorkerStatus::Alive;
        entry.last_heartbeat = now;
        Ok(())
    }

    fn remove(&self, id: &NodeId) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        workers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))
    }

    fn mark_dead(&self, id: &NodeId) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))?;
        entry.status = WorkerStatus::Dead;
        Ok(())
    }

    fn mark_assigned(&self, id: &NodeId, block: BlockId) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))?;
        entry.task = TaskSlot::Assigned(block);
        Ok(())
    }

    fn mark_free(&self, id: &NodeId) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))?;
        entry.task = TaskSlot::Free;
        Ok(())
    }

    fn adjust_storage_load(&self, id: &NodeId, delta: i64) -> Result<(), StoreError> {
        let mut workers = self.workers.write();
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))?;
        entry.storage_load = entry.storage_load.saturating_add_signed(delta);
        Ok(())
    }

    fn free_workers(&self) -> Vec<NodeId> {
        let workers = self.workers.read();
        let mut ids: Vec<NodeId> = workers
            .values()
            .filter(|w| w.status == WorkerStatus::Alive && w.task.is_free())
            .map(|w| w.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn candidates_for_follower(&self, exclude: &NodeId, count: usize) -> Vec<NodeId> {
        let workers = self.workers.read();
        let mut candidates: Vec<&WorkerEntry> = workers
            .values()
            .filter(|w| w.status == WorkerStatus::Alive && &w.id != exclude)
            .collect();
        candidates.sort_by(|a, b| {
            a.storage_load
                .cmp(&b.storage_load)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates
            .into_iter()
            .take(count)
            .map(|w| w.id.clone())
            .collect()
    }

    fn stale_workers(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<NodeId> {
        let workers = self.workers.read();
        workers
            .values()
            .filter(|w| w.status == WorkerStatus::Alive && now - w.last_heartbeat > timeout)
            .map(|w| w.id.clone())
            .collect()
    }

    fn get(&self, id: &NodeId) -> Result<WorkerEntry, StoreError> {
        let workers = self.workers.read();
        workers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("worker {id}")))
    }

    fn list(&self) -> Vec<WorkerEntry> {
        self.workers.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn register_then_heartbeat_keeps_worker_alive() {
        let registry = InMemoryNodeRegistry::new();
        let id = NodeId::from("127.0.0.1:9100");
        registry.register(id.clone(), now()).unwrap();
        registry.heartbeat(&id, now()).unwrap();
        let entry = registry.get(&id).unwrap();
        assert_eq!(entry.status, WorkerStatus::Alive);
    }

    #[test]
    fn free_workers_are_sorted_by_node_id() {
        let registry = InMemoryNodeRegistry::new();
        registry
            .register(NodeId::from("host-b:9100"), now())
            .unwrap();
        registry
            .register(NodeId::from("host-a:9100"), now())
            .unwrap();
        let free = registry.free_workers();
        assert_eq!(
            free,
            vec![NodeId::from("host-a:9100"), NodeId::from("host-b:9100")]
        );
    }

    #[test]
    fn assigned_worker_is_not_free() {
        let registry = InMemoryNodeRegistry::new();
        let id = NodeId::from("127.0.0.1:9100");
        registry.register(id.clone(), now()).unwrap();
        registry
            .mark_assigned(&id, BlockId::from("orders_block1.csv"))
            .unwrap();
        assert!(registry.free_workers().is_empty());
        registry.mark_free(&id).unwrap();
        assert_eq!(registry.free_workers(), vec![id]);
    }

    #[test]
    fn candidates_for_follower_ranks_by_load_then_id() {
        let registry = InMemoryNodeRegistry::new();
        let a = NodeId::from("a:9100");
        let b = NodeId::from("b:9100");
        let c = NodeId::from("c:9100");
        for id in [&a, &b, &c] {
            registry.register(id.clone(), now()).unwrap();
        }
        registry.adjust_storage_load(&b, 5).unwrap();
        registry.adjust_storage_load(&c, 1).unwrap();
        let candidates = registry.candidates_for_follower(&a, 2);
        assert_eq!(candidates, vec![c, b]);
    }

    #[test]
    fn stale_workers_detected_past_timeout() {
        let registry = InMemoryNodeRegistry::new();
        let id = NodeId::from("127.0.0.1:9100");
        registry.register(id.clone(), now()).unwrap();
        let later = now() + chrono::Duration::seconds(20);
        let stale = registry.stale_workers(later, chrono::Duration::seconds(15));
        assert_eq!(stale, vec![id]);
    }

    #[test]
    fn mark_dead_does_not_remove_entry() {
        let registry = InMemoryNodeRegistry::new();
        let id = NodeId::from("127.0.0.1:9100");
        registry.register(id.clone(), now()).unwrap();
        registry.mark_dead(&id).unwrap();
        let entry = registry.get(&id).unwrap();
        assert_eq!(entry.status, WorkerStatus::Dead);
    }

    #[test]
    fn unknown_worker_is_not_found() {
        let registry = InMemoryNodeRegistry::new();
        let err = registry.heartbeat(&NodeId::from("ghost:1"), now()).unwrap_err();
        assert!(err.is_not_found());
    }
}
