use blockctl_core::config::ConfigLoader;
use blockctl_coordinator::coordinator::Coordinator;
use blockctl_coordinator::{failure_detector, push, recovery, scheduler, server};
use blockctl_store::{
    BlockMetadataStore, FileBlockMetadataStore, FileNodeRegistry, InMemoryBlockMetadataStore,
    InMemoryNodeRegistry, NodeRegistry,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// The block-processing control plane's Coordinator daemon.
#[derive(Parser, Debug)]
#[command(name = "blockctl-coordinator", about = "Node registry, scheduler, and recovery for block processing")]
struct Cli {
    /// Optional JSON or YAML config file; see blockctl_core::config::Config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for file-backed registry/metadata persistence. Omit for
    /// in-memory state (lost on restart).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the control port from the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    blockctl_core::telemetry::init();
    let cli = Cli::parse();

    let mut config = ConfigLoader::load(cli.config.as_ref())?;
    if let Some(port) = cli.port {
        config.coordinator_port = port;
    }

    let (registry, metadata): (Arc<dyn NodeRegistry>, Arc<dyn BlockMetadataStore>) =
        match &cli.data_dir {
            Some(dir) => (
                Arc::new(FileNodeRegistry::open(dir.join("registry"))?),
                Arc::new(FileBlockMetadataStore::open(dir.join("metadata"))?),
            ),
            None => (
                Arc::new(InMemoryNodeRegistry::new()),
                Arc::new(InMemoryBlockMetadataStore::new()),
            ),
        };

    let coordinator = Arc::new(Coordinator::new(registry, metadata, config.clone()));

    let detector_coordinator = coordinator.clone();
    tokio::spawn(async move {
        failure_detector::run_forever(&detector_coordinator, |dead_id| {
            let coordinator = detector_coordinator.clone();
            async move {
                match recovery::handle_worker_failure(&coordinator, &dead_id).await {
                    Ok(Some(recovery::RecoveryOutcome::Promoted {
                        new_leader,
                        block_id,
                        file_base,
                        ..
                    })) => {
                        if let Err(e) =
                            push::push_promote(&new_leader, block_id, file_base).await
                        {
                            error!(worker = %new_leader, error = %e, "failed to push promotion");
                        }
                    }
                    Ok(Some(recovery::RecoveryOutcome::Reverted { block_id })) => {
                        info!(block = %block_id, "block reverted to pending after failure");
                    }
                    Ok(None) => {}
                    Err(e) => error!(worker = %dead_id, error = %e, "recovery handling failed"),
                }
            }
        })
        .await;
    });

    let drainer_coordinator = coordinator.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(drainer_coordinator.config.poll_interval());
        loop {
            ticker.tick().await;
            server::push_placements(scheduler::drain_all(&drainer_coordinator).await).await;
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.coordinator_port);
    server::run(coordinator, bind_addr).await?;
    Ok(())
}
