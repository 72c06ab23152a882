//! C7 Recovery: promotes a follower to leader when a block's leader is
//! detected dead, and reverts a block to `Pending` when no viable follower
//! remains (the simultaneous leader-and-sole-follower-death case).

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use blockctl_core::{BlockId, NodeId};
use blockctl_store::{BlockMetadataStore, NodeRegistry};
use tracing::info;

/// What happened to a block after its leader was found dead.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// The first follower was promoted to leader; the old leader is retired
    /// from every block's follower list.
    Promoted {
        block_id: BlockId,
        new_leader: NodeId,
        file_base: String,
        remaining_followers: Vec<NodeId>,
    },
    /// No alive follower was available; the block is back to `Pending` with
    /// no placement, for the scheduler to pick up again.
    Reverted { block_id: BlockId },
}

/// Handles one dead worker: finds the block it was leading (if any),
/// promotes a follower or reverts the block, retires the dead worker from
/// every other block's follower list, and finally removes it from the
/// registry. Returns `Ok(None)` if the dead worker was not leading anything
/// (it is still removed from the registry in that case).
pub async fn handle_worker_failure(
    coordinator: &Coordinator,
    dead_id: &NodeId,
) -> Result<Option<RecoveryOutcome>, CoordinatorError> {
    let guard = coordinator.lock().await;

    let outcome = match guard.metadata.block_led_by(dead_id) {
        None => None,
        Some(block) => {
            let mut followers = block.followers.clone();
            let promotable = followers.first().cloned().filter(|candidate| {
                guard
                    .registry
                    .get(candidate)
                    .map(|entry| entry.status == blockctl_core::WorkerStatus::Alive)
                    .unwrap_or(false)
            });

            match promotable {
                Some(new_leader) => {
                    followers.remove(0);
                    guard.metadata.set_placement(
                        &block.id,
                        new_leader.clone(),
                        followers.clone(),
                    )?;
                    guard
                        .registry
                        .mark_assigned(&new_leader, block.id.clone())?;
                    // The promoted worker no longer holds this block as a
                    // follower replica; it is now the leader of it.
                    guard.registry.adjust_storage_load(&new_leader, -1)?;
                    info!(block = %block.id, new_leader = %new_leader, "promoted follower to leader");
                    Some(RecoveryOutcome::Promoted {
                        block_id: block.id.clone(),
                        new_leader,
                        file_base: block.id.file_base().unwrap_or(&block.dataset).to_string(),
                        remaining_followers: followers,
                    })
                }
                None => {
                    guard.metadata.clear_block(&block.id)?;
                    info!(block = %block.id, "no viable follower, reverted block to pending");
                    Some(RecoveryOutcome::Reverted {
                        block_id: block.id.clone(),
                    })
                }
            }
        }
    };

    guard.metadata.remove_node_from_followers(dead_id)?;
    guard.registry.remove(dead_id)?;
    info!(worker = %dead_id, "removed dead worker from registry");
    Ok(outcome)
}
