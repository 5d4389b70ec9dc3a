//! Invocation building
//!
//! Turns a task plus its tool entry into the single shell line typed into
//! the session, and wraps it with the completion markers.

use crate::inference::{COMPLETED_TAG, FAILED_TAG};
use crate::session::shell_quote;
use crate::task::{Parameters, Task, TaskId};
use fleet_foundation::{atomic_write, ParameterStyle, Result, ToolConfig, Workspace};
use tracing::debug;

/// UTC timestamp evaluated by the session shell when the marker is echoed
const SHELL_TIMESTAMP: &str = "$(date -u +%Y-%m-%dT%H:%M:%SZ)";

/// printf format producing `[TAG:<id>:<timestamp>]` on a line of its own,
/// even after output that lacks a trailing newline
const MARKER_FORMAT: &str = "\\n[%s:%s:%s]\\n";

fn flag_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn inline_flags(parameters: &Parameters) -> Result<String> {
    let mut out = String::new();
    for (key, value) in parameters {
        out.push_str(&format!(" --{} {}", key, shell_quote(&flag_value(value))?));
    }
    Ok(out)
}

/// Write the parameter side-channel file and return the flag that points at it
fn config_file_flag(task: &Task, workspace: &Workspace) -> Result<String> {
    let path = workspace.task_params(task.id.as_str());
    let body = serde_json::to_vec_pretty(&task.parameters)?;
    atomic_write(&path, &body)?;
    debug!("Wrote parameters for {} to {}", task.id, path.display());
    Ok(format!(" --config {}", shell_quote(&path.to_string_lossy())?))
}

/// `[timeout <secs>] <base> <command><params>`
///
/// The tool's base command and the task command are operator-controlled
/// shell text and are passed through verbatim.
pub fn build_invocation(task: &Task, tool: &ToolConfig, workspace: &Workspace) -> Result<String> {
    let params = if task.parameters.is_empty() {
        String::new()
    } else {
        match tool.parameter_style(&task.tool) {
            ParameterStyle::Flags => inline_flags(&task.parameters)?,
            ParameterStyle::ConfigFile => config_file_flag(task, workspace)?,
        }
    };

    let body = format!("{} {}{}", tool.command, task.command, params);
    Ok(match task.timeout.or(tool.timeout) {
        Some(secs) => format!("timeout {} {}", secs, body),
        None => body,
    })
}

/// Success marker on zero exit, failure marker otherwise, then leave the
/// session so its liveness tracks the invocation.
///
/// The tag and the brackets are joined by `printf`, so the typed line (which
/// the shell echoes into the log) never contains a marker.
pub fn with_markers(id: &TaskId, invocation: &str) -> String {
    format!(
        "{inv} && printf '{fmt}' {ok} {id} \"{ts}\" || printf '{fmt}' {fail} {id} \"{ts}\"; exit",
        inv = invocation,
        fmt = MARKER_FORMAT,
        ok = COMPLETED_TAG,
        fail = FAILED_TAG,
        id = id,
        ts = SHELL_TIMESTAMP,
    )
}

/// Banner written at the top of every task log
pub fn banner(id: &TaskId) -> String {
    format!("echo \"[{}] Starting task {}\"", SHELL_TIMESTAMP, id)
}
