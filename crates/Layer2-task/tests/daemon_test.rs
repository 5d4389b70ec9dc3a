//! End-to-end daemon behaviour against the in-memory session backend

use chrono::{SecondsFormat, Utc};
use fleet_foundation::{DaemonConfig, Error, Workspace};
use fleet_task::executor::command::with_markers;
use fleet_task::guard::read_pid;
use fleet_task::inference::{marker, COMPLETED_TAG, FAILED_TAG, MSG_FAILURE_STATUS};
use fleet_task::{
    Daemon, InMemorySessions, Task, TaskId, TaskRequest, TaskState, TaskStore, WorkspaceClient,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    sessions: Arc<InMemorySessions>,
    daemon: Daemon,
}

fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.input_delay_ms = 0;
    config.heartbeat_interval = 3600;
    config.shutdown_grace = 2;
    config
}

fn harness_with(config: DaemonConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let sessions = Arc::new(InMemorySessions::new());
    let daemon = Daemon::open(Workspace::new(dir.path()), config, sessions.clone()).unwrap();
    Harness {
        dir,
        sessions,
        daemon,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

/// One worker iteration, done by hand
async fn dispatch_next(daemon: &Daemon) -> TaskId {
    let manager = daemon.manager();
    let id = manager
        .queue()
        .dequeue(Duration::from_millis(100))
        .await
        .expect("queue empty");
    let permit = manager.slots().acquire_owned().await.unwrap();
    manager.execute(&id, permit).await;
    id
}

async fn task(daemon: &Daemon, id: &TaskId) -> Task {
    daemon.get_task(id).await.expect("unknown task")
}

fn append_log(task: &Task, text: &str) {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&task.log_file)
        .unwrap();
    writeln!(f, "{}", text).unwrap();
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_create_task_is_queued_and_persisted() {
    let h = harness();
    let id = h
        .daemon
        .create_task(TaskRequest::new("qwen", "generate"))
        .await
        .unwrap();

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Queued);
    assert!(t.started_at.is_none());

    let store = TaskStore::new(h.daemon.workspace().clone());
    assert_eq!(store.load(&id).unwrap().unwrap().status, TaskState::Queued);
}

#[tokio::test]
async fn test_create_task_rejects_invalid() {
    let h = harness();
    let err = h
        .daemon
        .create_task(TaskRequest::new("nope", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTask(_)));
    assert!(h.daemon.list_tasks(None).await.is_empty());
}

#[tokio::test]
async fn test_queue_full_leaves_no_record() {
    let mut config = test_config();
    config.queue_capacity = 1;
    let h = harness_with(config);
    h.daemon.create_task(TaskRequest::new("qwen", "a")).await.unwrap();
    let err = h
        .daemon
        .create_task(TaskRequest::new("qwen", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueueFull(_)));

    let store = TaskStore::new(h.daemon.workspace().clone());
    assert_eq!(store.list_ids().unwrap().len(), 1);
    assert_eq!(h.daemon.list_tasks(None).await.len(), 1);
}

#[tokio::test]
async fn test_list_tasks_newest_first_with_filter() {
    let h = harness();
    let first = h.daemon.create_task(TaskRequest::new("qwen", "a")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = h.daemon.create_task(TaskRequest::new("qwen", "b")).await.unwrap();
    h.daemon.kill_task(&first).await.unwrap();

    let all = h.daemon.list_tasks(None).await;
    assert_eq!(all[0].id, second);
    assert_eq!(all[1].id, first);

    let failed = h.daemon.list_tasks(Some(TaskState::Failed)).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, first);
}

// ============================================================================
// Completion inference through the monitor
// ============================================================================

#[tokio::test]
async fn test_success_marker_completes_task() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("crush", "build")).await.unwrap();
    dispatch_next(&h.daemon).await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Running);
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    append_log(&t, "Progress: 30%");
    append_log(&t, &marker(COMPLETED_TAG, &id, &stamp));
    h.sessions.end(&t.session_name);

    let report = h.daemon.monitor().tick().await;
    assert_eq!(report.completed, 1);

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Completed);
    assert_eq!(t.progress, 100);
    assert!(t.completed_at.unwrap() >= t.started_at.unwrap());
    assert!(t.error_message.is_none());
    assert_eq!(h.daemon.manager().held_slots(), 0);
}

#[tokio::test]
async fn test_failure_marker_reports_error_line() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;

    let t = task(&h.daemon, &id).await;
    append_log(&t, "Error: model not found");
    append_log(&t, &marker(FAILED_TAG, &id, "2024-01-01T00:00:00Z"));
    h.sessions.end(&t.session_name);
    h.daemon.monitor().tick().await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Failed);
    assert_eq!(t.error_message.as_deref(), Some("Error: model not found"));
    assert!(t.progress < 100);
}

#[tokio::test]
async fn test_error_output_before_success_marker_still_completes() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("crush", "build")).await.unwrap();
    dispatch_next(&h.daemon).await;

    let t = task(&h.daemon, &id).await;
    append_log(&t, "Error: rate limited, retrying...");
    append_log(&t, &marker(COMPLETED_TAG, &id, "2024-01-01T00:00:00Z"));
    h.sessions.end(&t.session_name);
    h.daemon.monitor().tick().await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Completed);
    assert_eq!(t.progress, 100);
    assert!(t.error_message.is_none());
}

#[tokio::test]
async fn test_echoed_marker_command_does_not_count_as_success() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;

    let t = task(&h.daemon, &id).await;
    // interactive shell echo of the typed line, in both the current and an
    // echo-style form, then the failure marker
    append_log(&t, &format!("user@host:~$ {}", with_markers(&id, "qwen-cli run")));
    append_log(
        &t,
        &format!(
            "user@host:~$ false && echo \"[{}:{}:$(date -u +%Y-%m-%dT%H:%M:%SZ)]\"",
            COMPLETED_TAG, id
        ),
    );
    append_log(&t, &marker(FAILED_TAG, &id, "2024-01-01T00:00:00Z"));
    h.sessions.end(&t.session_name);
    h.daemon.monitor().tick().await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Failed);
    assert_eq!(t.error_message.as_deref(), Some(MSG_FAILURE_STATUS));
}

#[tokio::test]
async fn test_session_end_without_marker_fails() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;

    let t = task(&h.daemon, &id).await;
    append_log(&t, "all good, trust me");
    h.sessions.end(&t.session_name);
    h.daemon.monitor().tick().await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Failed);
    assert_eq!(t.error_message, Some(Error::InferenceAmbiguous.to_string()));
}

#[tokio::test]
async fn test_session_end_without_log_fails() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;

    h.sessions.end(&task(&h.daemon, &id).await.session_name);
    h.daemon.monitor().tick().await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Failed);
    assert_eq!(t.error_message.as_deref(), Some("Log file not found"));
}

#[tokio::test]
async fn test_progress_tracks_latest_hint() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;
    let t = task(&h.daemon, &id).await;

    append_log(&t, "40% complete");
    h.daemon.monitor().tick().await;
    assert_eq!(task(&h.daemon, &id).await.progress, 40);

    append_log(&t, "41% complete");
    h.daemon.monitor().tick().await;
    let t = task(&h.daemon, &id).await;
    assert_eq!(t.progress, 41);
    assert_eq!(t.status, TaskState::Running);

    append_log(&t, "Progress: 100%");
    h.daemon.monitor().tick().await;
    assert_eq!(task(&h.daemon, &id).await.progress, 99);
}

#[tokio::test]
async fn test_timeout_kills_session() {
    let h = harness();
    let id = h
        .daemon
        .create_task(TaskRequest::new("qwen", "run").with_timeout(1))
        .await
        .unwrap();
    dispatch_next(&h.daemon).await;

    {
        let handle = h.daemon.manager().handle(&id).await.unwrap();
        let mut t = handle.lock().await;
        t.started_at = Some(Utc::now() - chrono::Duration::seconds(10));
    }

    let report = h.daemon.monitor().tick().await;
    assert_eq!(report.timed_out, 1);

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Failed);
    assert_eq!(t.error_message.as_deref(), Some("Task killed: timeout"));
    assert_eq!(h.sessions.live_count(), 0);
}

// ============================================================================
// Kill
// ============================================================================

#[tokio::test]
async fn test_kill_completed_task_is_noop() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;
    let t = task(&h.daemon, &id).await;
    append_log(&t, &marker(COMPLETED_TAG, &id, "2024-01-01T00:00:00Z"));
    h.sessions.end(&t.session_name);
    h.daemon.monitor().tick().await;
    let before = task(&h.daemon, &id).await;

    assert!(h.daemon.kill_task(&id).await.unwrap());
    assert_eq!(task(&h.daemon, &id).await, before);
    assert!(!h.daemon.kill_task(&TaskId::from("task-unknown")).await.unwrap());
}

#[tokio::test]
async fn test_kill_request_from_client() {
    let h = harness();
    let id = h.daemon.create_task(TaskRequest::new("qwen", "run")).await.unwrap();
    dispatch_next(&h.daemon).await;

    let client = WorkspaceClient::open(h.daemon.workspace().clone(), h.sessions.clone()).unwrap();
    assert!(client.request_kill(&id).unwrap());
    h.daemon.monitor().tick().await;

    let t = task(&h.daemon, &id).await;
    assert_eq!(t.status, TaskState::Failed);
    assert_eq!(t.error_message.as_deref(), Some("Task killed: manual"));
    assert_eq!(h.sessions.live_count(), 0);
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn test_retention_window_boundary() {
    let h = harness();
    let ws = h.daemon.workspace().clone();
    let store = TaskStore::new(ws.clone());
    let window = chrono::Duration::days(h.daemon.config().log_retention_days as i64);

    let mut expired = Task::from_request(TaskRequest::new("qwen", "old"), &ws);
    expired.start();
    expired.complete(None);
    expired.completed_at = Some(Utc::now() - window - chrono::Duration::seconds(1));
    store.save(&expired).unwrap();
    append_log(&expired, "old output");

    let mut fresh = Task::from_request(TaskRequest::new("qwen", "new"), &ws);
    fresh.start();
    fresh.fail("boom");
    fresh.completed_at = Some(Utc::now() - window + chrono::Duration::seconds(60));
    store.save(&fresh).unwrap();

    h.daemon.recover().await.unwrap();
    let report = h.daemon.monitor().tick().await;
    assert_eq!(report.purged, 1);

    assert!(h.daemon.get_task(&expired.id).await.is_none());
    assert!(store.load(&expired.id).unwrap().is_none());
    assert!(!expired.log_file.exists());
    assert!(h.daemon.get_task(&fresh.id).await.is_some());
}

#[tokio::test]
async fn test_huge_retention_window_purges_nothing() {
    let mut config = test_config();
    config.log_retention_days = 100_000_000;
    config.validate().unwrap();
    let h = harness_with(config);
    let ws = h.daemon.workspace().clone();

    let mut ancient = Task::from_request(TaskRequest::new("qwen", "old"), &ws);
    ancient.start();
    ancient.complete(None);
    ancient.completed_at = Some(Utc::now() - chrono::Duration::days(365 * 30));
    TaskStore::new(ws).save(&ancient).unwrap();

    h.daemon.recover().await.unwrap();
    let report = h.daemon.monitor().tick().await;
    assert_eq!(report.purged, 0);
    assert!(h.daemon.get_task(&ancient.id).await.is_some());
}

// ============================================================================
// Restart recovery
// ============================================================================

#[tokio::test]
async fn test_recovery_fails_queued_task_that_does_not_fit() {
    let mut config = test_config();
    config.queue_capacity = 1;
    let h = harness_with(config);
    let ws = h.daemon.workspace().clone();
    let store = TaskStore::new(ws.clone());

    let older = Task::from_request(TaskRequest::new("qwen", "first"), &ws);
    store.save(&older).unwrap();
    let mut newer = Task::from_request(TaskRequest::new("qwen", "second"), &ws);
    newer.created_at = older.created_at + chrono::Duration::seconds(1);
    store.save(&newer).unwrap();

    let report = h.daemon.recover().await.unwrap();
    assert_eq!(report.requeued, vec![older.id.clone()]);
    assert_eq!(report.dropped, vec![newer.id.clone()]);

    let dropped = task(&h.daemon, &newer.id).await;
    assert_eq!(dropped.status, TaskState::Failed);
    assert!(dropped.error_message.unwrap().starts_with("Failed to requeue"));
    assert_eq!(store.load(&newer.id).unwrap().unwrap().status, TaskState::Failed);
    assert_eq!(h.daemon.get_status().await.task_counts.queued, 1);
}

#[tokio::test]
async fn test_recovery_requeues_resumes_and_fails() {
    let h = harness();
    let ws = h.daemon.workspace().clone();
    let store = TaskStore::new(ws.clone());

    let older = Task::from_request(TaskRequest::new("qwen", "first"), &ws);
    let mut newer = Task::from_request(TaskRequest::new("qwen", "second"), &ws);
    newer.created_at = older.created_at + chrono::Duration::seconds(1);

    let mut alive = Task::from_request(TaskRequest::new("qwen", "alive"), &ws);
    alive.start();
    h.sessions.adopt(&alive.session_name);

    let mut dead = Task::from_request(TaskRequest::new("qwen", "dead"), &ws);
    dead.start();

    // saved out of order on purpose
    for t in [&newer, &alive, &older, &dead] {
        store.save(t).unwrap();
    }
    std::fs::write(ws.task_record("task-corrupt"), "{ truncated").unwrap();

    let report = h.daemon.recover().await.unwrap();
    assert_eq!(report.requeued, vec![older.id.clone(), newer.id.clone()]);
    assert_eq!(report.resumed, vec![alive.id.clone()]);
    assert_eq!(report.died, vec![dead.id.clone()]);
    assert_eq!(report.corrupt.len(), 1);

    let dead_now = store.load(&dead.id).unwrap().unwrap();
    assert_eq!(dead_now.status, TaskState::Failed);
    assert_eq!(dead_now.error_message.as_deref(), Some("Process died unexpectedly"));
    assert_eq!(h.daemon.manager().held_slots(), 1);

    // no second dispatch for the resumed task
    assert_eq!(h.sessions.created(), 0);
    assert_eq!(h.daemon.manager().queue().len(), 2);

    // recovering again changes nothing
    let again = h.daemon.recover().await.unwrap();
    assert!(again.requeued.is_empty() && again.resumed.is_empty() && again.died.is_empty());
}

#[tokio::test]
async fn test_second_daemon_is_locked_out() {
    let h = harness();
    h.daemon.start().await.unwrap();

    let other = Daemon::open(
        Workspace::new(h.dir.path()),
        test_config(),
        Arc::new(InMemorySessions::new()),
    )
    .unwrap();
    let err = other.start().await.unwrap_err();
    assert!(matches!(err, Error::LockContention(_)));
    assert!(err.is_fatal_at_startup());

    h.daemon.shutdown().await;
    assert_eq!(read_pid(&h.daemon.workspace().lock_file()), None);
    other.start().await.unwrap();
    other.shutdown().await;
}

// ============================================================================
// Worker pool
// ============================================================================

#[tokio::test]
async fn test_running_tasks_capped() {
    let mut config = test_config();
    config.max_concurrent_tasks = 2;
    let h = harness_with(config);
    h.daemon.start().await.unwrap();

    let mut ids = Vec::new();
    for i in 0..5 {
        let req = TaskRequest::new("qwen", format!("job-{}", i));
        ids.push(h.daemon.create_task(req).await.unwrap());
    }

    let sessions = h.sessions.clone();
    wait_for(|| sessions.live_count() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.sessions.live_count(), 2);
    let counts = h.daemon.get_status().await.task_counts;
    assert_eq!(counts.running, 2);
    assert_eq!(counts.queued, 3);

    // FIFO: the two oldest run first
    for id in &ids[..2] {
        assert_eq!(task(&h.daemon, id).await.status, TaskState::Running);
    }

    let first = task(&h.daemon, &ids[0]).await;
    append_log(&first, &marker(COMPLETED_TAG, &first.id, "2024-01-01T00:00:00Z"));
    h.sessions.end(&first.session_name);
    h.daemon.monitor().tick().await;

    wait_for(|| sessions.created() == 3).await;
    assert_eq!(h.sessions.live_count(), 2);
    assert_eq!(task(&h.daemon, &ids[2]).await.status, TaskState::Running);

    h.daemon.shutdown().await;
}

#[tokio::test]
async fn test_status_report() {
    let h = harness();
    h.daemon.create_task(TaskRequest::new("qwen", "a")).await.unwrap();
    h.sessions.adopt("ai-task-foreign");
    h.sessions.adopt("unrelated");

    let status = h.daemon.get_status().await;
    assert_eq!(status.daemon_pid, Some(std::process::id()));
    assert!(!status.daemon_running);
    assert_eq!(status.task_counts.queued, 1);
    assert_eq!(status.queue_size, 1);
    assert_eq!(status.active_sessions, 1);

    let json = serde_json::to_value(&status).unwrap();
    for key in ["daemon_pid", "uptime", "task_counts", "system", "queue_size", "active_sessions"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
}

#[tokio::test]
async fn test_client_submission_picked_up_by_monitor() {
    let h = harness();
    let client = WorkspaceClient::open(h.daemon.workspace().clone(), h.sessions.clone()).unwrap();
    let id = client.submit(TaskRequest::new("gemini", "summarize")).unwrap();

    assert!(h.daemon.get_task(&id).await.is_none());
    let report = h.daemon.monitor().tick().await;
    assert_eq!(report.ingested, 1);
    assert!(h.daemon.manager().queue().contains(&id));

    dispatch_next(&h.daemon).await;
    assert_eq!(task(&h.daemon, &id).await.status, TaskState::Running);
    assert!(h.daemon.get_logs(&id).await.is_err());
}
