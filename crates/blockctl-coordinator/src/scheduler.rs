//! C4 Scheduler: assigns unassigned blocks to free workers.
//!
//! Placement follows a fixed rule: the leader is the
//! first free worker (ordered by node id), followers are the two
//! least-storage-loaded remaining alive workers. A block with no free
//! worker available is left `Pending` for the next drainer tick.

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use blockctl_core::{BlockId, NodeId};
use blockctl_store::{BlockMetadataStore, NodeRegistry};
use std::collections::BTreeSet;
use tracing::info;

const FOLLOWER_COUNT: usize = 2;

/// A block's computed placement, ready to be pushed to its leader and
/// followers outside the Coordinator's mutex.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub block_id: BlockId,
    pub file: String,
    pub leader: NodeId,
    pub followers: Vec<NodeId>,
}

/// Assigns one specific block to a leader plus up to two followers.
/// Returns `Err(NoFreeWorker)` when the cluster has no free worker right
/// now — the caller decides whether to stop an initial pass or let the
/// background drainer retry later.
pub async fn assign_next(
    coordinator: &Coordinator,
    block_id: &BlockId,
) -> Result<Placement, CoordinatorError> {
    let guard = coordinator.lock().await;

    let block = guard.metadata.get_block(block_id)?;

    let mut free = guard.registry.free_workers();
    free.sort();
    let Some(leader) = free.into_iter().next() else {
        return Err(CoordinatorError::NoFreeWorker);
    };

    // Followers replicate the block; the leader does not add to its own
    // storage load — storage_load counts only follower replicas.
    let followers = guard
        .registry
        .candidates_for_follower(&leader, FOLLOWER_COUNT);

    guard.registry.mark_assigned(&leader, block.id.clone())?;
    for follower in &followers {
        guard.registry.adjust_storage_load(follower, 1)?;
    }
    guard
        .metadata
        .set_placement(&block.id, leader.clone(), followers.clone())?;

    info!(
        block = %block.id,
        leader = %leader,
        followers = ?followers,
        "placed block"
    );

    Ok(Placement {
        block_id: block.id,
        file: block.file,
        leader,
        followers,
    })
}

/// Assigns every currently-`pending` block of `dataset`, in ascending
/// `block_id` order, stopping the initial pass the moment no free worker
/// remains. The background drainer (see [`drain_all`]) retries the rest on
/// its own cadence.
pub async fn assign_many(
    coordinator: &Coordinator,
    dataset: &str,
) -> Result<Vec<Placement>, CoordinatorError> {
    let unassigned = {
        let guard = coordinator.lock().await;
        guard.metadata.list_unassigned_in(dataset)
    };

    let mut placements = Vec::new();
    for block in unassigned {
        match assign_next(coordinator, &block.id).await {
            Ok(placement) => placements.push(placement),
            Err(CoordinatorError::NoFreeWorker) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(placements)
}

/// Retries scheduling across every dataset with at least one unassigned
/// block. Run on `POLL_INTERVAL` by the background drainer; re-reads the
/// block list each pass, so blocks completed or placed since the last tick
/// are naturally skipped.
pub async fn drain_all(coordinator: &Coordinator) -> Result<Vec<Placement>, CoordinatorError> {
    let datasets: BTreeSet<String> = {
        let guard = coordinator.lock().await;
        guard
            .metadata
            .list_unassigned()
            .into_iter()
            .map(|b| b.dataset)
            .collect()
    };

    let mut placements = Vec::new();
    for dataset in datasets {
        placements.extend(assign_many(coordinator, &dataset).await?);
    }
    Ok(placements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use blockctl_core::config::Config;
    use blockctl_store::{Block, BlockMetadataStore, InMemoryBlockMetadataStore, InMemoryNodeRegistry, NodeRegistry};
    use chrono::Utc;
    use std::sync::Arc;

    async fn seeded_coordinator(worker_count: usize) -> Coordinator {
        let registry = Arc::new(InMemoryNodeRegistry::new());
        let metadata = Arc::new(InMemoryBlockMetadataStore::new());
        for n in 0..worker_count {
            registry
                .register(NodeId::from(format!("host{n}:9100")), Utc::now())
                .unwrap();
        }
        Coordinator::new(registry, metadata, Config::default())
    }

    #[tokio::test]
    async fn assigns_leader_and_two_followers() {
        let coordinator = seeded_coordinator(4).await;
        let block_id = BlockId::from("orders_block1.csv");
        coordinator
            .metadata
            .upsert_block(Block::new(block_id.clone(), "orders", "file1"))
            .unwrap();

        let placement = assign_next(&coordinator, &block_id).await.unwrap();
        assert_eq!(placement.leader, NodeId::from("host0:9100"));
        assert_eq!(placement.followers.len(), 2);
        assert!(!placement.followers.contains(&placement.leader));
    }

    #[tokio::test]
    async fn leader_does_not_accrue_storage_load() {
        let coordinator = seeded_coordinator(4).await;
        let block_id = BlockId::from("orders_block1.csv");
        coordinator
            .metadata
            .upsert_block(Block::new(block_id.clone(), "orders", "file1"))
            .unwrap();
        let placement = assign_next(&coordinator, &block_id).await.unwrap();
        let leader_entry = coordinator.registry.get(&placement.leader).unwrap();
        assert_eq!(leader_entry.storage_load, 0);
        for follower in &placement.followers {
            let entry = coordinator.registry.get(follower).unwrap();
            assert_eq!(entry.storage_load, 1);
        }
    }

    #[tokio::test]
    async fn no_free_workers_errors_and_leaves_block_pending() {
        let coordinator = seeded_coordinator(0).await;
        let block_id = BlockId::from("a_block1.csv");
        coordinator
            .metadata
            .upsert_block(Block::new(block_id.clone(), "a", "file"))
            .unwrap();
        let err = assign_next(&coordinator, &block_id).await.unwrap_err();
        assert_eq!(err, CoordinatorError::NoFreeWorker);
        assert_eq!(coordinator.metadata.list_unassigned().len(), 1);
    }

    #[tokio::test]
    async fn assign_many_drains_all_placeable_blocks_in_a_dataset() {
        let coordinator = seeded_coordinator(6).await;
        for n in 1..=3 {
            coordinator
                .metadata
                .upsert_block(Block::new(
                    BlockId::from(format!("orders_block{n}.csv")),
                    "orders",
                    "file",
                ))
                .unwrap();
        }
        let placements = assign_many(&coordinator, "orders").await.unwrap();
        assert_eq!(placements.len(), 3);
        assert!(coordinator.metadata.list_unassigned().is_empty());
    }

    #[tokio::test]
    async fn assign_many_stops_initial_pass_when_workers_run_out() {
        let coordinator = seeded_coordinator(1).await;
        for n in 1..=2 {
            coordinator
                .metadata
                .upsert_block(Block::new(
                    BlockId::from(format!("orders_block{n}.csv")),
                    "orders",
                    "file",
                ))
                .unwrap();
        }
        let placements = assign_many(&coordinator, "orders").await.unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(coordinator.metadata.list_unassigned().len(), 1);
    }

    #[tokio::test]
    async fn drain_all_covers_every_dataset_with_pending_blocks() {
        let coordinator = seeded_coordinator(6).await;
        coordinator
            .metadata
            .upsert_block(Block::new(BlockId::from("orders_block1.csv"), "orders", "f"))
            .unwrap();
        coordinator
            .metadata
            .upsert_block(Block::new(BlockId::from("events_block1.csv"), "events", "f"))
            .unwrap();
        let placements = drain_all(&coordinator).await.unwrap();
        assert_eq!(placements.len(), 2);
        assert!(coordinator.metadata.list_unassigned().is_empty());
    }
}
