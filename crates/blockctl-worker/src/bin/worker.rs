use blockctl_core::config::ConfigLoader;
use blockctl_core::NodeId;
use blockctl_worker::WorkerRuntime;
use clap::Parser;
use std::path::PathBuf;

/// A block-processing Worker daemon: registers with the Coordinator, then
/// waits for pushed tasks.
#[derive(Parser, Debug)]
#[command(name = "blockctl-worker", about = "Downloads, analyzes, and stores pushed blocks")]
struct Cli {
    /// Optional JSON or YAML config file; see blockctl_core::config::Config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Coordinator control-port address, e.g. `127.0.0.1:9000`.
    #[arg(long)]
    coordinator: String,

    /// Address this worker advertises and binds its task-listen port on.
    #[arg(long)]
    host: String,

    /// Override the task-listen port from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Directory to store downloaded blocks and analysis reports in.
    #[arg(long, default_value = "./blockctl-worker-data")]
    storage_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    blockctl_core::telemetry::init();
    let cli = Cli::parse();

    let mut config = ConfigLoader::load(cli.config.as_ref())?;
    if let Some(port) = cli.port {
        config.task_listen_port = port;
    }

    std::fs::create_dir_all(&cli.storage_dir)?;

    let id = NodeId::new(cli.host.clone(), config.task_listen_port);
    let artifact_service_url = config.artifact_service_url.clone();
    let runtime = WorkerRuntime::new(
        id,
        cli.coordinator,
        artifact_service_url,
        cli.storage_dir,
        config.clone(),
    );

    let bind_addr = format!("0.0.0.0:{}", config.task_listen_port);
    runtime.run(bind_addr).await?;
    Ok(())
}
