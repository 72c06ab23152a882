//! C5 Coordinator Server: the TCP control port Workers and clients talk to.
//!
//! One spawned task per connection; each connection is read as a stream of
//! newline-delimited JSON messages until the peer closes it. An oversized or
//! malformed line gets `{"status":"bad_request"}` back without the
//! connection being closed.

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use crate::{push, scheduler};
use blockctl_core::protocol::{read_message, write_message, CoordinatorReply, CoordinatorRequest};
use blockctl_core::Role;
use blockctl_store::{BlockMetadataStore, NodeRegistry};
use chrono::Utc;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn};

/// Runs the control server until the listener errors. Accepts connections
/// forever, spawning one task per connection.
pub async fn run(coordinator: Arc<Coordinator>, addr: impl ToSocketAddrs) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(local_addr = ?listener.local_addr().ok(), "coordinator control server listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(coordinator, stream).await {
                debug!(peer = %peer_addr, error = %e, "control connection ended");
            }
        });
    }
}

async fn handle_connection(
    coordinator: Arc<Coordinator>,
    stream: TcpStream,
) -> Result<(), CoordinatorError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let message = match read_message::<_, CoordinatorRequest>(&mut reader).await {
            Ok(Some(m)) => m,
            Ok(None) => return Ok(()),
            Err(e) => {
                let reply = CoordinatorReply::BadRequest {
                    reason: e.to_string(),
                };
                write_message(&mut write_half, &reply).await?;
                continue;
            }
        };

        debug!(?message, "dispatching control message");
        let reply = dispatch(&coordinator, message).await;
        write_message(&mut write_half, &reply).await?;
    }
}

/// Applies one message's full effect: mutates the Coordinator's state under
/// its lock, then performs whatever pushes to workers that mutation implies
/// (task placement, release, promotion) after the lock is released, and
/// returns the reply owed to the sender. Errors from the Coordinator's state
/// are turned into `bad_request`/`error` replies rather than propagated —
/// a malformed or inapplicable message must not kill the connection.
async fn dispatch(coordinator: &Coordinator, message: CoordinatorRequest) -> CoordinatorReply {
    match message {
        CoordinatorRequest::Register { id } => {
            let now = Utc::now();
            match coordinator.lock().await.registry.register(id, now) {
                Ok(()) => {
                    push_placements(scheduler::drain_all(coordinator).await).await;
                    CoordinatorReply::Registered
                }
                Err(e) => CoordinatorReply::BadRequest {
                    reason: e.to_string(),
                },
            }
        }

        CoordinatorRequest::Heartbeat {
            id,
            current_task,
            processing_status: _,
        } => {
            let guard = coordinator.lock().await;
            let now = Utc::now();
            match guard.registry.heartbeat(&id, now) {
                Ok(()) => {
                    if let Some(task) = current_task {
                        if let Ok(entry) = guard.registry.get(&id) {
                            if entry.task.block_id() != Some(&task) {
                                let _ = guard.registry.mark_assigned(&id, task);
                            }
                        }
                    }
                    CoordinatorReply::Alive
                }
                Err(e) if e.is_not_found() => CoordinatorReply::UnknownNode,
                Err(e) => CoordinatorReply::BadRequest {
                    reason: e.to_string(),
                },
            }
        }

        CoordinatorRequest::Compute { file } => match scheduler::assign_many(coordinator, &file).await
        {
            Ok(placements) => {
                push_placements(Ok(placements)).await;
                CoordinatorReply::ok_for_file(file)
            }
            Err(e) => CoordinatorReply::Error {
                error: e.to_string(),
            },
        },

        CoordinatorRequest::TaskComplete {
            id,
            block_id,
            role,
            success,
            ..
        } => handle_task_complete(coordinator, id, block_id, role, success).await,

        CoordinatorRequest::NodeFree { node_id, file } => {
            if let Err(e) = coordinator.lock().await.registry.mark_free(&node_id) {
                warn!(worker = %node_id, error = %e, "node_free for unknown worker");
            }
            push_placements(scheduler::assign_many(coordinator, &file).await).await;
            CoordinatorReply::ok()
        }
    }
}

/// Handles `task_complete`. On a successful leader report,
/// the block completes and every ex-replica (leader included) is sent an
/// advisory `release`; on failure (any role) the block reverts to `pending`.
/// Either way the reporting worker becomes free and an immediate drain is
/// attempted for its dataset.
async fn handle_task_complete(
    coordinator: &Coordinator,
    id: blockctl_core::NodeId,
    block_id: blockctl_core::BlockId,
    role: Role,
    success: bool,
) -> CoordinatorReply {
    let outcome = {
        let guard = coordinator.lock().await;
        let block = match guard.metadata.get_block(&block_id) {
            Ok(b) => b,
            Err(e) => {
                return CoordinatorReply::BadRequest {
                    reason: e.to_string(),
                }
            }
        };

        if success && role == Role::Leader {
            for follower in &block.followers {
                let _ = guard.registry.adjust_storage_load(follower, -1);
            }
            if let Err(e) = guard.metadata.complete_block(&block_id) {
                return CoordinatorReply::BadRequest {
                    reason: e.to_string(),
                };
            }
            if let Err(e) = guard.registry.mark_free(&id) {
                warn!(worker = %id, error = %e, "task_complete for unknown worker");
            }
            TaskCompleteOutcome::Completed {
                dataset: block.dataset,
                leader: id,
                followers: block.followers,
            }
        } else if success {
            // A follower has nothing further to report; just free it.
            if let Err(e) = guard.registry.mark_free(&id) {
                warn!(worker = %id, error = %e, "task_complete for unknown worker");
            }
            TaskCompleteOutcome::FollowerAcked
        } else {
            warn!(block = %block_id, worker = %id, role = %role, "worker reported task failure");
            if let Err(e) = guard.metadata.clear_block(&block_id) {
                return CoordinatorReply::BadRequest {
                    reason: e.to_string(),
                };
            }
            if let Err(e) = guard.registry.mark_free(&id) {
                warn!(worker = %id, error = %e, "task_complete for unknown worker");
            }
            TaskCompleteOutcome::Reverted {
                dataset: block.dataset,
            }
        }
    };

    match outcome {
        TaskCompleteOutcome::Completed {
            dataset,
            leader,
            followers,
        } => {
            for replica in std::iter::once((leader.clone(), Role::Leader))
                .chain(followers.into_iter().map(|f| (f, Role::Storage)))
            {
                let (worker, replica_role) = replica;
                if let Err(e) =
                    push::push_release(&worker, block_id.clone(), replica_role).await
                {
                    warn!(worker = %worker, error = %e, "failed to push release");
                }
            }
            push_placements(scheduler::assign_many(coordinator, &dataset).await).await;
            CoordinatorReply::TaskCompleteAck
        }
        TaskCompleteOutcome::FollowerAcked => CoordinatorReply::TaskCompleteAck,
        TaskCompleteOutcome::Reverted { dataset } => {
            push_placements(scheduler::assign_many(coordinator, &dataset).await).await;
            CoordinatorReply::TaskFailedAck
        }
    }
}

enum TaskCompleteOutcome {
    Completed {
        dataset: String,
        leader: blockctl_core::NodeId,
        followers: Vec<blockctl_core::NodeId>,
    },
    FollowerAcked,
    Reverted {
        dataset: String,
    },
}

/// Pushes every resulting placement to its leader and followers. Logged
/// but not fatal on push failure — a worker that doesn't ack will be caught
/// by the next failure-detector sweep. Shared with the background drainer
/// in `bin/coordinator.rs`.
pub async fn push_placements(result: Result<Vec<scheduler::Placement>, CoordinatorError>) {
    let placements = match result {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "scheduling pass failed");
            return;
        }
    };

    for placement in placements {
        if let Err(e) = push::push_task(
            &placement.leader,
            Role::Leader,
            placement.block_id.clone(),
            placement.file.clone(),
        )
        .await
        {
            warn!(worker = %placement.leader, error = %e, "failed to push leader task");
        }
        for follower in &placement.followers {
            if let Err(e) = push::push_task(
                follower,
                Role::Storage,
                placement.block_id.clone(),
                placement.file.clone(),
            )
            .await
            {
                warn!(worker = %follower, error = %e, "failed to push follower task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockctl_core::config::Config;
    use blockctl_core::{BlockId, NodeId};
    use blockctl_store::{Block, BlockMetadataStore, InMemoryBlockMetadataStore, InMemoryNodeRegistry, NodeRegistry};

    fn test_coordinator() -> Coordinator {
        Coordinator::new(
            Arc::new(InMemoryNodeRegistry::new()),
            Arc::new(InMemoryBlockMetadataStore::new()),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn register_replies_registered() {
        let coordinator = test_coordinator();
        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::Register {
                id: NodeId::from("host0:9100"),
            },
        )
        .await;
        assert_eq!(reply, CoordinatorReply::Registered);
        assert_eq!(coordinator.registry.list().len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_worker_replies_unknown_node() {
        let coordinator = test_coordinator();
        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::Heartbeat {
                id: NodeId::from("ghost:1"),
                current_task: None,
                processing_status: None,
            },
        )
        .await;
        assert_eq!(reply, CoordinatorReply::UnknownNode);
    }

    #[tokio::test]
    async fn heartbeat_for_known_worker_replies_alive() {
        let coordinator = test_coordinator();
        let id = NodeId::from("host0:9100");
        coordinator.registry.register(id.clone(), Utc::now()).unwrap();
        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::Heartbeat {
                id,
                current_task: None,
                processing_status: None,
            },
        )
        .await;
        assert_eq!(reply, CoordinatorReply::Alive);
    }

    #[tokio::test]
    async fn compute_replies_ok_with_file() {
        let coordinator = test_coordinator();
        let id = NodeId::from("host0:9100");
        coordinator.registry.register(id, Utc::now()).unwrap();
        coordinator
            .metadata
            .upsert_block(Block::new(BlockId::from("orders_block1.csv"), "orders", "file"))
            .unwrap();

        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::Compute {
                file: "orders".to_string(),
            },
        )
        .await;
        assert_eq!(reply, CoordinatorReply::ok_for_file("orders"));
        assert!(coordinator.metadata.list_unassigned().is_empty());
    }

    #[tokio::test]
    async fn successful_leader_completion_marks_block_completed_and_acks() {
        let coordinator = test_coordinator();
        let id = NodeId::from("host0:9100");
        coordinator.registry.register(id.clone(), Utc::now()).unwrap();
        let block_id = BlockId::from("orders_block1.csv");
        coordinator
            .metadata
            .upsert_block(Block::new(block_id.clone(), "orders", "file"))
            .unwrap();
        coordinator
            .metadata
            .set_placement(&block_id, id.clone(), vec![])
            .unwrap();
        coordinator.registry.mark_assigned(&id, block_id.clone()).unwrap();

        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::TaskComplete {
                id: id.clone(),
                block_id: block_id.clone(),
                role: Role::Leader,
                success: true,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
        .await;

        assert_eq!(reply, CoordinatorReply::TaskCompleteAck);
        let block = coordinator.metadata.get_block(&block_id).unwrap();
        assert_eq!(block.status, blockctl_core::BlockStatus::Completed);
        assert!(block.leader.is_none());
        assert!(coordinator.registry.free_workers().contains(&id));
    }

    #[tokio::test]
    async fn failed_leader_completion_reverts_block_and_acks_failure() {
        let coordinator = test_coordinator();
        let id = NodeId::from("host0:9100");
        coordinator.registry.register(id.clone(), Utc::now()).unwrap();
        let block_id = BlockId::from("orders_block1.csv");
        coordinator
            .metadata
            .upsert_block(Block::new(block_id.clone(), "orders", "file"))
            .unwrap();
        coordinator
            .metadata
            .set_placement(&block_id, id.clone(), vec![])
            .unwrap();

        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::TaskComplete {
                id,
                block_id: block_id.clone(),
                role: Role::Leader,
                success: false,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
        .await;

        assert_eq!(reply, CoordinatorReply::TaskFailedAck);
        let block = coordinator.metadata.get_block(&block_id).unwrap();
        assert!(block.leader.is_none());
        assert_eq!(block.status, blockctl_core::BlockStatus::Pending);
    }

    #[tokio::test]
    async fn node_free_replies_ok_and_retries_scheduling() {
        let coordinator = test_coordinator();
        let id = NodeId::from("host0:9100");
        coordinator.registry.register(id.clone(), Utc::now()).unwrap();
        coordinator
            .metadata
            .upsert_block(Block::new(BlockId::from("orders_block1.csv"), "orders", "f"))
            .unwrap();

        let reply = dispatch(
            &coordinator,
            CoordinatorRequest::NodeFree {
                node_id: id.clone(),
                file: "orders".to_string(),
            },
        )
        .await;

        assert_eq!(reply, CoordinatorReply::ok());
        assert!(coordinator.metadata.list_unassigned().is_empty());
        assert_eq!(
            coordinator.registry.get(&id).unwrap().task,
            blockctl_core::TaskSlot::Assigned(BlockId::from("orders_block1.csv"))
        );
    }
}
