//! C3 Failure Detector: periodically sweeps the Node Registry for workers
//! that have missed their heartbeat deadline.

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use blockctl_core::NodeId;
use blockctl_store::NodeRegistry;
use chrono::Utc;
use tracing::warn;

/// Marks every currently-`Alive` worker whose last heartbeat is older than
/// the configured timeout as `Dead`, and returns the ids newly marked this
/// sweep (workers already `Dead` are not re-reported).
pub async fn sweep(coordinator: &Coordinator) -> Result<Vec<NodeId>, CoordinatorError> {
    let guard = coordinator.lock().await;
    let timeout = chrono::Duration::from_std(guard.config.heartbeat_timeout())
        .unwrap_or_else(|_| chrono::Duration::seconds(15));
    let stale = guard.registry.stale_workers(Utc::now(), timeout);

    for id in &stale {
        guard.registry.mark_dead(id)?;
        warn!(worker = %id, "worker missed heartbeat deadline, marking dead");
    }

    Ok(stale)
}

/// Runs [`sweep`] on `config.monitor_interval()`, invoking `on_failure` for
/// every worker newly detected dead. Runs until the process exits; intended
/// to be spawned as its own task.
pub async fn run_forever<F, Fut>(coordinator: &Coordinator, mut on_failure: F)
where
    F: FnMut(NodeId) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(coordinator.config.monitor_interval());
    loop {
        ticker.tick().await;
        match sweep(coordinator).await {
            Ok(dead) => {
                for id in dead {
                    on_failure(id).await;
                }
            }
            Err(e) => warn!(error = %e, "failure detector sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockctl_core::config::Config;
    use blockctl_store::{InMemoryBlockMetadataStore, InMemoryNodeRegistry, NodeRegistry};
    use std::sync::Arc;

    #[tokio::test]
    async fn sweep_marks_stale_worker_dead() {
        let registry = Arc::new(InMemoryNodeRegistry::new());
        let id = NodeId::from("host0:9100");
        let stale_time = Utc::now() - chrono::Duration::seconds(30);
        registry.register(id.clone(), stale_time).unwrap();

        let mut config = Config::default();
        config.heartbeat_timeout_secs = 15;
        let coordinator = Coordinator::new(registry, Arc::new(InMemoryBlockMetadataStore::new()), config);

        let dead = sweep(&coordinator).await.unwrap();
        assert_eq!(dead, vec![id.clone()]);

        let dead_again = sweep(&coordinator).await.unwrap();
        assert!(dead_again.is_empty());
    }

    #[tokio::test]
    async fn recent_heartbeat_is_not_stale() {
        let registry = Arc::new(InMemoryNodeRegistry::new());
        let id = NodeId::from("host0:9100");
        registry.register(id, Utc::now()).unwrap();

        let coordinator = Coordinator::new(
            registry,
            Arc::new(InMemoryBlockMetadataStore::new()),
            Config::default(),
        );
        assert!(sweep(&coordinator).await.unwrap().is_empty());
    }
}
