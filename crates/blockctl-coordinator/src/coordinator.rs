//! The Coordinator's shared state: the Node Registry and Block Metadata
//! Store behind one logical mutex.
//!
//! Every multi-step mutation (placing a block, promoting a leader, retiring
//! a dead worker) runs inside a single `lock().await`, so a concurrent
//! heartbeat or completion message can never observe it half-applied. Only
//! the in-process data structures are touched while the guard is held —
//! pushing tasks to workers over the network always happens afterward, on a
//! snapshot captured before the guard was dropped.

use crate::error::CoordinatorError;
use blockctl_core::config::Config;
use blockctl_store::{BlockMetadataStore, NodeRegistry};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub struct Coordinator {
    pub registry: Arc<dyn NodeRegistry>,
    pub metadata: Arc<dyn BlockMetadataStore>,
    pub config: Config,
    guard: Mutex<()>,
}

/// Holds the Coordinator's single logical mutex for the duration of a
/// compound registry+metadata mutation. `registry`/`metadata` are plain
/// references so callers read through the same `Coordinator` they locked.
pub struct CoordinatorGuard<'a> {
    pub registry: &'a dyn NodeRegistry,
    pub metadata: &'a dyn BlockMetadataStore,
    pub config: &'a Config,
    _permit: MutexGuard<'a, ()>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        metadata: Arc<dyn BlockMetadataStore>,
        config: Config,
    ) -> Self {
        Coordinator {
            registry,
            metadata,
            config,
            guard: Mutex::new(()),
        }
    }

    /// Acquires the Coordinator's single logical mutex. Hold the returned
    /// guard only across in-process state mutations, never across network
    /// I/O to a worker.
    pub async fn lock(&self) -> CoordinatorGuard<'_> {
        let permit = self.guard.lock().await;
        CoordinatorGuard {
            registry: self.registry.as_ref(),
            metadata: self.metadata.as_ref(),
            config: &self.config,
            _permit: permit,
        }
    }
}

impl From<CoordinatorError> for String {
    fn from(e: CoordinatorError) -> Self {
        e.to_string()
    }
}
