use blockctl_client::ControlClient;
use blockctl_core::protocol::CoordinatorReply;
use blockctl_core::{BlockId, NodeId, ProcessingStatus, Role};
use clap::{Parser, Subcommand};

/// A command-line test client for a Coordinator's control port — sends one
/// message per invocation and prints the reply.
#[derive(Parser, Debug)]
#[command(name = "blockctl-client")]
struct Cli {
    /// Coordinator control-port address, e.g. `127.0.0.1:9000`.
    #[arg(long, default_value = "127.0.0.1:9000")]
    coordinator: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a worker.
    Register { id: String },
    /// Send a heartbeat for a worker.
    Heartbeat {
        id: String,
        #[arg(long)]
        current_task: Option<String>,
        #[arg(long)]
        processing: bool,
    },
    /// Report a task as complete.
    TaskComplete {
        id: String,
        block_id: String,
        #[arg(long, default_value = "leader")]
        role: String,
        #[arg(long)]
        failed: bool,
    },
    /// Free a worker outside of a task-completion flow.
    NodeFree { node_id: String, file: String },
    /// Kick off scheduling for a dataset already split into blocks.
    Compute { file: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = ControlClient::new(cli.coordinator);

    let request = match cli.command {
        Command::Register { id } => blockctl_core::protocol::CoordinatorRequest::Register {
            id: NodeId::from(id),
        },
        Command::Heartbeat {
            id,
            current_task,
            processing,
        } => blockctl_core::protocol::CoordinatorRequest::Heartbeat {
            id: NodeId::from(id),
            current_task: current_task.map(BlockId::from),
            processing_status: Some(if processing {
                ProcessingStatus::Processing
            } else {
                ProcessingStatus::Idle
            }),
        },
        Command::TaskComplete {
            id,
            block_id,
            role,
            failed,
        } => blockctl_core::protocol::CoordinatorRequest::TaskComplete {
            id: NodeId::from(id),
            block_id: BlockId::from(block_id),
            role: if role == "storage" {
                Role::Storage
            } else {
                Role::Leader
            },
            success: !failed,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
        Command::NodeFree { node_id, file } => {
            blockctl_core::protocol::CoordinatorRequest::NodeFree {
                node_id: NodeId::from(node_id),
                file,
            }
        }
        Command::Compute { file } => blockctl_core::protocol::CoordinatorRequest::Compute { file },
    };

    match client.send(request).await? {
        CoordinatorReply::Registered => println!("registered"),
        CoordinatorReply::Alive => println!("alive"),
        CoordinatorReply::UnknownNode => println!("unknown_node"),
        CoordinatorReply::Ok { file: Some(file) } => println!("ok: {file}"),
        CoordinatorReply::Ok { file: None } => println!("ok"),
        CoordinatorReply::Error { error } => println!("error: {error}"),
        CoordinatorReply::TaskCompleteAck => println!("task_complete_ack"),
        CoordinatorReply::TaskFailedAck => println!("task_failed_ack"),
        CoordinatorReply::BadRequest { reason } => println!("bad_request: {reason}"),
    }

    Ok(())
}
