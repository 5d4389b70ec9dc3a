//! # fleet-task
//!
//! Per-host task daemon for Fleet.
//! Accepts AI-tool tasks, runs each one in a detached persistent session and
//! infers its outcome from session liveness and log content.
//!
//! ## Components
//!
//! - `TaskStore` - one JSON record per task, atomic writes
//! - `TaskQueue` + `Worker` - FIFO dispatch under a running-slot cap
//! - `ExecutionDriver` - session setup, log capture, marker-wrapped invocation
//! - `SentinelInference` - completion markers and progress scraping
//! - `LifecycleMonitor` - liveness, timeouts, retention
//! - `SingletonGuard` - one daemon per workspace
//! - `Daemon` - facade; `WorkspaceClient` - out-of-process access

pub mod client;
pub mod daemon;
pub mod executor;
pub mod guard;
pub mod inference;
pub mod manager;
pub mod monitor;
pub mod queue;
pub mod session;
pub mod state;
pub mod store;
pub mod system;
pub mod task;
pub mod worker;

// Task model
pub use state::TaskState;
pub use task::{Parameters, Priority, Task, TaskId, TaskRequest};

// Daemon
pub use client::WorkspaceClient;
pub use daemon::{Daemon, RecoveryReport, StatusReport};
pub use guard::SingletonGuard;
pub use manager::{TaskCounts, TaskManager};
pub use monitor::{LifecycleMonitor, TickReport};
pub use queue::TaskQueue;
pub use store::{StoreScan, TaskStore};
pub use system::{SystemProbe, SystemSnapshot};
pub use worker::{spawn_workers, Worker};

// Execution
pub use executor::{ExecutionDriver, Executor};
pub use inference::{CompletionInference, Outcome, SentinelInference, Verdict};
pub use session::{CommandOutput, CommandRunner, InMemorySessions, SessionProvider, ShellRunner, TmuxSessions};
