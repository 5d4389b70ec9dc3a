//! Command handlers
//!
//! `start` runs the daemon in this process. Every other command works on
//! the workspace directly through `WorkspaceClient`, so it behaves the same
//! whether or not a daemon is running.

use anyhow::{bail, Context};
use fleet_foundation::{DaemonConfig, Error, Workspace};
use fleet_task::guard::{process_alive, read_pid, signal_stop};
use fleet_task::{
    Daemon, Priority, SessionProvider, ShellRunner, TaskId, TaskRequest, TaskState, TmuxSessions,
    WorkspaceClient,
};
use std::sync::Arc;
use tracing::{error, info};

fn tmux(config: &DaemonConfig) -> Arc<dyn SessionProvider> {
    Arc::new(TmuxSessions::new(
        Arc::new(ShellRunner),
        config.command_timeout(),
    ))
}

fn client(workspace: Workspace) -> anyhow::Result<WorkspaceClient> {
    let config = DaemonConfig::load(&workspace).context("loading daemon config")?;
    let sessions = tmux(&config);
    Ok(WorkspaceClient::with_config(workspace, config, sessions))
}

fn parse_id(raw: &str) -> anyhow::Result<TaskId> {
    Ok(TaskId::parse(raw)?)
}

// ============================================================================
// Daemon
// ============================================================================

pub fn init(workspace: &Workspace, force: bool) -> anyhow::Result<()> {
    workspace.ensure()?;
    let path = workspace.config_file();
    if path.exists() && !force {
        println!("Config already exists: {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    DaemonConfig::default().save(workspace)?;
    println!("Wrote {}", path.display());
    Ok(())
}

pub async fn start(workspace: Workspace) -> anyhow::Result<()> {
    let config = DaemonConfig::load(&workspace).context("loading daemon config")?;
    let sessions = tmux(&config);
    let daemon = Daemon::open(workspace, config, sessions)?;

    match daemon.start().await {
        Ok(_) => {}
        Err(e @ Error::LockContention(_)) => {
            error!("Another daemon instance is already running: {}", e);
            bail!(e);
        }
        Err(e) => return Err(e).context("starting daemon"),
    }

    wait_for_signal().await?;
    info!("Received shutdown signal");
    daemon.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

pub fn stop(workspace: &Workspace) -> anyhow::Result<()> {
    match read_pid(&workspace.lock_file()) {
        Some(pid) if process_alive(pid) => {
            signal_stop(pid)?;
            println!("Stop signal sent to daemon (PID: {})", pid);
        }
        Some(_) => println!("No running daemon found"),
        None => println!("Daemon not running"),
    }
    Ok(())
}

pub async fn status(workspace: Workspace) -> anyhow::Result<()> {
    let status = client(workspace)?.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

// ============================================================================
// Tasks
// ============================================================================

pub struct CreateArgs {
    pub tool: String,
    pub command: String,
    pub params: Option<String>,
    pub priority: String,
    pub working_dir: Option<String>,
    pub timeout: Option<u64>,
}

pub fn create_task(workspace: Workspace, args: CreateArgs) -> anyhow::Result<()> {
    let priority: Priority = args.priority.parse().map_err(anyhow::Error::msg)?;
    let mut request = TaskRequest::new(args.tool, args.command).with_priority(priority);

    if let Some(raw) = args.params {
        let value: serde_json::Value =
            serde_json::from_str(&raw).context("Invalid JSON parameters")?;
        let serde_json::Value::Object(map) = value else {
            bail!("Invalid JSON parameters: expected an object");
        };
        request.parameters = map;
    }
    if let Some(dir) = args.working_dir {
        request = request.with_working_dir(dir);
    }
    if let Some(secs) = args.timeout {
        request = request.with_timeout(secs);
    }

    let id = client(workspace)?.submit(request)?;
    println!("Task created: {}", id);
    Ok(())
}

pub fn list(workspace: Workspace, status: Option<&str>) -> anyhow::Result<()> {
    let filter = status
        .map(|s| s.parse::<TaskState>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let tasks = client(workspace)?.list_tasks(filter)?;

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    println!(
        "{:<32} {:<10} {:<12} {:>5}  {:<20}",
        "ID", "Tool", "Status", "Prog", "Created"
    );
    println!("{}", "-".repeat(82));
    for task in tasks {
        println!(
            "{:<32} {:<10} {:<12} {:>4}%  {:<20}",
            task.id.as_str(),
            task.tool,
            format!("{} {}", task.status.symbol(), task.status.as_str()),
            task.progress,
            task.created_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(err) = &task.error_message {
            println!("    {}", err);
        }
    }
    Ok(())
}

pub async fn logs(workspace: Workspace, task_id: &str) -> anyhow::Result<()> {
    let id = parse_id(task_id)?;
    let text = client(workspace)?.get_logs(&id).await?;
    print!("{}", text);
    Ok(())
}

pub fn kill(workspace: Workspace, task_id: &str) -> anyhow::Result<()> {
    let id = parse_id(task_id)?;
    if client(workspace)?.request_kill(&id)? {
        println!("Kill requested for {}", id);
        Ok(())
    } else {
        bail!("Task {} not found", id)
    }
}
