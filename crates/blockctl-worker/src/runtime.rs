//! C6 Worker Runtime: registration, heartbeating, the task-listen server,
//! and the single-active-task processing loop.

use crate::analyzer;
use crate::artifact_client::ArtifactClient;
use crate::control_client;
use crate::error::WorkerError;
use blockctl_core::config::Config;
use blockctl_core::protocol::{read_message, write_message, WorkerAck, WorkerPush};
use blockctl_core::{BlockId, NodeId, ProcessingStatus, Role};
use chrono::Utc;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// How long the drain step waits before retrying a promoted block that just
/// failed.
const PROMOTED_RETRY_BACKOFF: Duration = Duration::from_secs(2);
/// Bounded retry budget before a stuck promoted block is dropped with an
/// error log rather than retried forever.
const MAX_PROMOTED_RETRIES: u32 = 5;

pub struct WorkerRuntime {
    pub id: NodeId,
    coordinator_addr: String,
    artifact_client: ArtifactClient,
    storage_dir: PathBuf,
    config: Config,
    processing_status: Mutex<ProcessingStatus>,
    current_task: Mutex<Option<BlockId>>,
    /// Promoted blocks already on disk (in `storage/`) awaiting processing,
    /// oldest first. Only the control task and the task-listener task touch
    /// this, serialized by the mutex.
    promoted_queue: Mutex<VecDeque<(BlockId, String)>>,
}

impl WorkerRuntime {
    pub fn new(
        id: NodeId,
        coordinator_addr: String,
        artifact_service_url: String,
        storage_dir: PathBuf,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(WorkerRuntime {
            id,
            coordinator_addr,
            artifact_client: ArtifactClient::new(artifact_service_url),
            storage_dir,
            config,
            processing_status: Mutex::new(ProcessingStatus::Idle),
            current_task: Mutex::new(None),
            promoted_queue: Mutex::new(VecDeque::new()),
        })
    }

    /// The active leader working copy for `block_id` of dataset `file_base`,
    /// at `task/{dataset}/{block_id}`.
    fn task_path(&self, file_base: &str, block_id: &BlockId) -> PathBuf {
        self.storage_dir.join("task").join(file_base).join(block_id.as_str())
    }

    /// The follower replica for `block_id` of dataset `file_base`, at
    /// `storage/{dataset}/{block_id}`.
    fn storage_path(&self, file_base: &str, block_id: &BlockId) -> PathBuf {
        self.storage_dir.join("storage").join(file_base).join(block_id.as_str())
    }

    /// Registers with the Coordinator, then runs the heartbeat loop and the
    /// task-listen server until either fails.
    pub async fn run(self: Arc<Self>, bind_addr: impl ToSocketAddrs) -> std::io::Result<()> {
        // Retries forever with exponential backoff: there is nothing useful
        // to do until the coordinator has accepted this registration.
        if let Err(e) = control_client::send_with_backoff(
            &self.coordinator_addr,
            blockctl_core::protocol::CoordinatorRequest::Register {
                id: self.id.clone(),
            },
            None,
        )
        .await
        {
            error!(error = %e, "failed to register with coordinator");
        } else {
            info!(id = %self.id, "registered with coordinator");
        }

        let heartbeat_self = self.clone();
        tokio::spawn(async move { heartbeat_self.heartbeat_loop().await });

        let (tx, rx) = mpsc::unbounded_channel();
        let processing_self = self.clone();
        tokio::spawn(async move { processing_self.process_loop(rx).await });

        self.listen(bind_addr, tx).await
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        loop {
            ticker.tick().await;
            let current_task = self.current_task.lock().await.clone();
            let processing_status = *self.processing_status.lock().await;
            let request = blockctl_core::protocol::CoordinatorRequest::Heartbeat {
                id: self.id.clone(),
                current_task,
                processing_status: Some(processing_status),
            };
            if let Err(e) = control_client::send(&self.coordinator_addr, request.clone()).await {
                warn!(error = %e, "heartbeat failed, retrying with backoff");
                if let Err(e) =
                    control_client::send_with_backoff(&self.coordinator_addr, request, Some(5)).await
                {
                    warn!(error = %e, "heartbeat retries exhausted, waiting for next tick");
                }
            }
        }
    }

    async fn listen(
        self: Arc<Self>,
        bind_addr: impl ToSocketAddrs,
        tx: mpsc::UnboundedSender<WorkerPush>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(local_addr = ?listener.local_addr().ok(), "worker task-listen server listening");
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_push_connection(stream, tx).await {
                    debug!(peer = %peer_addr, error = %e, "push connection ended");
                }
            });
        }
    }

    async fn handle_push_connection(
        stream: TcpStream,
        tx: mpsc::UnboundedSender<WorkerPush>,
    ) -> Result<(), WorkerError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let message = match read_message::<_, WorkerPush>(&mut reader).await {
            Ok(Some(m)) => m,
            Ok(None) => return Ok(()),
            Err(e) => {
                let ack = WorkerAck::BadRequest {
                    reason: e.to_string(),
                };
                write_message(&mut write_half, &ack).await?;
                return Ok(());
            }
        };

        write_message(&mut write_half, &WorkerAck::Ok).await?;
        let _ = tx.send(message);
        Ok(())
    }

    async fn process_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<WorkerPush>) {
        while let Some(work) = rx.recv().await {
            self.process_work(work).await;
        }
    }

    async fn process_work(&self, work: WorkerPush) {
        match work {
            WorkerPush::Task {
                role: Role::Leader,
                block_id,
                file,
            } => self.process_leader_task(block_id, file).await,
            WorkerPush::Task {
                role: Role::Storage,
                block_id,
                file,
            } => self.process_storage_task(block_id, file).await,
            WorkerPush::PromoteToLeader {
                block_id,
                file_base,
            } => self.process_promotion(block_id, file_base).await,
            WorkerPush::Release { block_id, role } => self.process_release(block_id, role).await,
        }
    }

    /// Downloads the replica and acknowledges implicitly; no `task_complete`
    /// is sent for a storage (follower) task.
    async fn process_storage_task(&self, block_id: BlockId, file: String) {
        let dest = self.storage_path(&file, &block_id);
        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(block = %block_id, error = %e, "failed to create storage directory");
                return;
            }
        }
        if let Err(e) = self.artifact_client.download(&file, &block_id, &dest).await {
            error!(block = %block_id, error = %e, "follower download failed");
        }
    }

    /// Downloads, analyzes, uploads, reports completion, then drains any
    /// promoted work before freeing itself.
    async fn process_leader_task(&self, block_id: BlockId, file: String) {
        *self.processing_status.lock().await = ProcessingStatus::Processing;
        *self.current_task.lock().await = Some(block_id.clone());

        let dest = self.task_path(&file, &block_id);
        let success = match self.prepare_task_dir(&dest).await {
            Ok(()) => match self.artifact_client.download(&file, &block_id, &dest).await {
                Ok(()) => self.analyze_and_upload(&block_id, &file, &dest).await,
                Err(e) => {
                    error!(block = %block_id, error = %e, "leader download failed");
                    false
                }
            },
            Err(e) => {
                error!(block = %block_id, error = %e, "failed to prepare task directory");
                false
            }
        };

        self.report_task_complete(&block_id, Role::Leader, success).await;

        if success {
            let _ = tokio::fs::remove_file(&dest).await;
            self.drain_promoted_queue().await;
            self.free_self(&file).await;
        }

        *self.processing_status.lock().await = ProcessingStatus::Idle;
        *self.current_task.lock().await = None;
    }

    async fn prepare_task_dir(&self, dest: &Path) -> std::io::Result<()> {
        match dest.parent() {
            Some(parent) => tokio::fs::create_dir_all(parent).await,
            None => Ok(()),
        }
    }

    /// Runs `analyze` then uploads its report, returning whether both
    /// succeeded. Failure of either is reported as a task failure, never
    /// propagated as an error — the caller only needs the outcome.
    async fn analyze_and_upload(&self, block_id: &BlockId, file_base: &str, path: &Path) -> bool {
        match analyzer::analyze(path).await {
            Ok(report_path) => {
                match self.artifact_client.upload(block_id, file_base, &report_path).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(block = %block_id, error = %e, "report upload failed");
                        false
                    }
                }
            }
            Err(e) => {
                error!(block = %block_id, error = %e, "analysis failed");
                false
            }
        }
    }

    /// Queues the promoted block; if idle, the drain step below starts
    /// immediately.
    async fn process_promotion(&self, block_id: BlockId, file_base: String) {
        self.promoted_queue
            .lock()
            .await
            .push_back((block_id, file_base));
        if *self.processing_status.lock().await == ProcessingStatus::Idle {
            self.drain_promoted_queue().await;
        }
    }

    /// Processes promoted blocks from their existing `storage/` copy, oldest
    /// first, retrying a stuck head with backoff before dropping it.
    async fn drain_promoted_queue(&self) {
        loop {
            let head = { self.promoted_queue.lock().await.front().cloned() };
            let Some((block_id, file_base)) = head else {
                break;
            };

            *self.processing_status.lock().await = ProcessingStatus::Processing;
            *self.current_task.lock().await = Some(block_id.clone());

            let path = self.storage_path(&file_base, &block_id);
            let mut attempts = 0;
            let success = loop {
                if self.analyze_and_upload(&block_id, &file_base, &path).await {
                    break true;
                }
                attempts += 1;
                if attempts >= MAX_PROMOTED_RETRIES {
                    error!(block = %block_id, "dropping promoted block after exhausting retries");
                    break false;
                }
                tokio::time::sleep(PROMOTED_RETRY_BACKOFF).await;
            };

            self.report_task_complete(&block_id, Role::Leader, success).await;
            let _ = tokio::fs::remove_file(&path).await;
            self.promoted_queue.lock().await.pop_front();
        }

        *self.processing_status.lock().await = ProcessingStatus::Idle;
        *self.current_task.lock().await = None;
    }

    /// Deletes the local replica from the role-specific directory,
    /// idempotently.
    async fn process_release(&self, block_id: BlockId, role: Role) {
        let file_base = block_id.file_base().unwrap_or_else(|| block_id.as_str()).to_string();
        let path = match role {
            Role::Leader => self.task_path(&file_base, &block_id),
            Role::Storage => self.storage_path(&file_base, &block_id),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(block = %block_id, ?role, "released local replica"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(block = %block_id, error = %e, "failed to release local replica"),
        }
    }

    async fn report_task_complete(&self, block_id: &BlockId, role: Role, success: bool) {
        let request = blockctl_core::protocol::CoordinatorRequest::TaskComplete {
            id: self.id.clone(),
            block_id: block_id.clone(),
            role,
            success,
            timestamp: Utc::now().to_rfc3339(),
        };
        if let Err(e) = control_client::send(&self.coordinator_addr, request).await {
            error!(error = %e, "failed to report task completion");
        }
    }

    async fn free_self(&self, file: &str) {
        let request = blockctl_core::protocol::CoordinatorRequest::NodeFree {
            node_id: self.id.clone(),
            file: file.to_string(),
        };
        if let Err(e) = control_client::send(&self.coordinator_addr, request).await {
            error!(error = %e, "failed to report free status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_runtime(storage_dir: PathBuf) -> Arc<WorkerRuntime> {
        WorkerRuntime::new(
            NodeId::from("worker0:9200"),
            "127.0.0.1:1".to_string(),
            "http://127.0.0.1:1".to_string(),
            storage_dir,
            Config::default(),
        )
    }

    #[test]
    fn task_and_storage_paths_are_disjoint_per_dataset() {
        let runtime = test_runtime(PathBuf::from("/data/worker0"));
        let block_id = BlockId::from("orders_block1.csv");
        assert_eq!(
            runtime.task_path("orders", &block_id),
            PathBuf::from("/data/worker0/task/orders/orders_block1.csv")
        );
        assert_eq!(
            runtime.storage_path("orders", &block_id),
            PathBuf::from("/data/worker0/storage/orders/orders_block1.csv")
        );
    }

    #[tokio::test]
    async fn release_deletes_the_role_specific_replica() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = test_runtime(dir.path().to_path_buf());
        let block_id = BlockId::from("orders_block1.csv");

        let task_file = runtime.task_path("orders", &block_id);
        tokio::fs::create_dir_all(task_file.parent().unwrap()).await.unwrap();
        tokio::fs::write(&task_file, b"data").await.unwrap();

        runtime.process_release(block_id.clone(), Role::Leader).await;
        assert!(!task_file.exists());
    }

    #[tokio::test]
    async fn release_of_already_absent_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = test_runtime(dir.path().to_path_buf());
        runtime
            .process_release(BlockId::from("orders_block1.csv"), Role::Storage)
            .await;
    }

    #[tokio::test]
    async fn promoted_blocks_queue_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = test_runtime(dir.path().to_path_buf());
        let first = BlockId::from("orders_block1.csv");
        let second = BlockId::from("orders_block2.csv");

        {
            let mut queue = runtime.promoted_queue.lock().await;
            queue.push_back((first.clone(), "orders".to_string()));
            queue.push_back((second.clone(), "orders".to_string()));
        }

        let queue = runtime.promoted_queue.lock().await;
        assert_eq!(queue.front().unwrap().0, first);
        assert_eq!(queue.back().unwrap().0, second);
    }
}
