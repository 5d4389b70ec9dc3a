//! Fleet daemon CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use fleet_foundation::{Workspace, DEFAULT_WORKSPACE};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fleetd - per-host AI task daemon
#[derive(Parser, Debug)]
#[command(name = "fleetd")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Workspace directory
    #[arg(long, global = true, default_value = DEFAULT_WORKSPACE)]
    workspace: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default daemon config into the workspace
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
    /// Run the daemon in the foreground until SIGINT/SIGTERM
    Start,
    /// Signal a running daemon to shut down
    Stop,
    /// Print daemon status as JSON
    Status,
    /// Submit a task
    CreateTask {
        /// Tool key from the tool table
        #[arg(long)]
        tool: String,
        /// Arguments passed to the tool
        #[arg(long = "command-name")]
        command_name: String,
        /// JSON object of parameters
        #[arg(long)]
        params: Option<String>,
        /// low | medium | high | critical
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        working_dir: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List tasks, newest first
    List {
        /// queued | running | completed | failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Print a task's log
    Logs { task_id: String },
    /// Kill a task
    Kill { task_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let workspace = Workspace::from_arg(&args.workspace);

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    let file_layer = match &args.command {
        Command::Start => {
            workspace.ensure()?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(workspace.daemon_log())?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        _ => None,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    match args.command {
        Command::Init { force } => cli::init(&workspace, force),
        Command::Start => cli::start(workspace).await,
        Command::Stop => cli::stop(&workspace),
        Command::Status => cli::status(workspace).await,
        Command::CreateTask {
            tool,
            command_name,
            params,
            priority,
            working_dir,
            timeout,
        } => cli::create_task(
            workspace,
            cli::CreateArgs {
                tool,
                command: command_name,
                params,
                priority,
                working_dir,
                timeout,
            },
        ),
        Command::List { status } => cli::list(workspace, status.as_deref()),
        Command::Logs { task_id } => cli::logs(workspace, &task_id).await,
        Command::Kill { task_id } => cli::kill(workspace, &task_id),
    }
}
