//! Daemon Config - `configs/daemon.json`
//!
//! Top-level keys present in the file replace the built-in defaults; keys
//! that are absent keep their default. The tool table is replaced as a whole
//! when the file provides one.

use crate::storage::JsonStore;
use crate::strings::DAEMON_CONFIG_FILE;
use crate::workspace::Workspace;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// Tool table
// ============================================================================

/// How operator-supplied parameters reach the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterStyle {
    /// ` --key 'value'` appended to the invocation
    Flags,
    /// Parameters written to a JSON file passed as `--config <path>`
    ConfigFile,
}

impl ParameterStyle {
    /// Style used when a tool entry does not name one
    pub fn for_tool(tool: &str) -> Self {
        match tool {
            "crush" => ParameterStyle::Flags,
            _ => ParameterStyle::ConfigFile,
        }
    }
}

/// One entry of the tool table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Base command (e.g. `qwen-cli`)
    pub command: String,

    /// Shell steps run in order before the invocation
    #[serde(default)]
    pub env_setup: Vec<String>,

    /// Default working directory (`~` allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Default timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_style: Option<ParameterStyle>,
}

impl ToolConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env_setup: Vec::new(),
            working_dir: None,
            timeout: None,
            parameter_style: None,
        }
    }

    pub fn with_env_setup(mut self, step: impl Into<String>) -> Self {
        self.env_setup.push(step.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_parameter_style(mut self, style: ParameterStyle) -> Self {
        self.parameter_style = Some(style);
        self
    }

    /// Explicit style, else the one inferred from the tool's name
    pub fn parameter_style(&self, tool: &str) -> ParameterStyle {
        self.parameter_style
            .unwrap_or_else(|| ParameterStyle::for_tool(tool))
    }
}

// ============================================================================
// Daemon Config
// ============================================================================

/// Per-host daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Worker pool size and running-slot count
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Default ceiling in seconds when neither task nor tool sets one
    #[serde(default = "default_task_timeout")]
    pub task_timeout: u64,

    /// Monitor tick in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval: u64,

    #[serde(default = "default_retention_days")]
    pub log_retention_days: u64,

    /// Bounded drain wait on shutdown, seconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,

    /// Timeout applied to every external command, seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Pause between successive inputs sent to a session
    #[serde(default = "default_input_delay_ms")]
    pub input_delay_ms: u64,

    /// Bound on queued task identifiers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Tool identifier → invocation template
    #[serde(default = "default_tools")]
    pub ai_tools: BTreeMap<String, ToolConfig>,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_task_timeout() -> u64 {
    3600
}

fn default_heartbeat() -> u64 {
    30
}

fn default_retention_days() -> u64 {
    7
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    10
}

fn default_input_delay_ms() -> u64 {
    200
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_tools() -> BTreeMap<String, ToolConfig> {
    let mut tools = BTreeMap::new();
    tools.insert(
        "crush".to_string(),
        ToolConfig::new("crush")
            .with_env_setup("source ~/.bashrc")
            .with_working_dir("~/projects")
            .with_timeout(1800)
            .with_parameter_style(ParameterStyle::Flags),
    );
    tools.insert(
        "blackbox".to_string(),
        ToolConfig::new("blackbox-cli")
            .with_env_setup("blackbox-cli auth")
            .with_working_dir("~/projects")
            .with_timeout(900)
            .with_parameter_style(ParameterStyle::ConfigFile),
    );
    tools.insert(
        "qwen".to_string(),
        ToolConfig::new("qwen-cli")
            .with_env_setup("source ~/qwen-env/bin/activate")
            .with_working_dir("~/projects")
            .with_timeout(2400)
            .with_parameter_style(ParameterStyle::ConfigFile),
    );
    tools.insert(
        "gemini".to_string(),
        ToolConfig::new("gemini-cli")
            .with_env_setup("export GEMINI_API_KEY=$GEMINI_KEY")
            .with_working_dir("~/projects")
            .with_timeout(1200)
            .with_parameter_style(ParameterStyle::ConfigFile),
    );
    tools
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            task_timeout: default_task_timeout(),
            heartbeat_interval: default_heartbeat(),
            log_retention_days: default_retention_days(),
            shutdown_grace: default_shutdown_grace(),
            command_timeout: default_command_timeout(),
            input_delay_ms: default_input_delay_ms(),
            queue_capacity: default_queue_capacity(),
            ai_tools: default_tools(),
        }
    }
}

impl DaemonConfig {
    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Load `configs/daemon.json` layered over the defaults, then validate
    pub fn load(workspace: &Workspace) -> Result<Self> {
        let store = JsonStore::new(workspace.configs_dir());
        let config = match store.load_optional::<serde_json::Value>(DAEMON_CONFIG_FILE)? {
            Some(overrides) => {
                info!(
                    "Loading daemon config from {}",
                    store.file_path(DAEMON_CONFIG_FILE).display()
                );
                Self::default().merged_with(overrides)?
            }
            None => {
                debug!("No daemon config file, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace top-level keys of `self` with those present in `overrides`
    pub fn merged_with(self, overrides: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(Error::Config(
                "daemon config must be a JSON object".to_string(),
            ));
        };
        let mut base = match serde_json::to_value(&self)? {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::Internal("config did not serialize to an object".into())),
        };
        for (key, value) in overrides {
            base.insert(key, value);
        }
        serde_json::from_value(serde_json::Value::Object(base))
            .map_err(|e| Error::Config(format!("Invalid daemon config: {}", e)))
    }

    pub fn save(&self, workspace: &Workspace) -> Result<()> {
        JsonStore::new(workspace.configs_dir()).save(DAEMON_CONFIG_FILE, self)
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(Error::Config(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval == 0 {
            return Err(Error::Config(
                "heartbeat_interval must be at least 1 second".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        for (name, tool) in &self.ai_tools {
            if tool.command.trim().is_empty() {
                return Err(Error::Config(format!("tool '{}' has an empty command", name)));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.ai_tools.get(name)
    }

    /// Task override, else tool default, else daemon default
    pub fn effective_timeout(&self, tool: &str, task_override: Option<u64>) -> u64 {
        task_override
            .or_else(|| self.tool(tool).and_then(|t| t.timeout))
            .unwrap_or(self.task_timeout)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    pub fn input_delay(&self) -> Duration {
        Duration::from_millis(self.input_delay_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_days.saturating_mul(24 * 60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.heartbeat_interval, 30);
        assert_eq!(config.ai_tools.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure().unwrap();

        let config = DaemonConfig::load(&ws).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_file_overrides_top_level_keys() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure().unwrap();
        std::fs::write(
            ws.config_file(),
            r#"{
                "max_concurrent_tasks": 2,
                "ai_tools": { "echo": { "command": "echo" } }
            }"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&ws).unwrap();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.log_retention_days, 7);
        assert_eq!(config.ai_tools.len(), 1);
        assert!(config.tool("crush").is_none());
    }

    #[test]
    fn test_retention_saturates() {
        let mut config = DaemonConfig::default();
        assert_eq!(config.retention(), Duration::from_secs(7 * 24 * 60 * 60));

        config.log_retention_days = u64::MAX;
        assert_eq!(config.retention(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure().unwrap();
        std::fs::write(ws.config_file(), r#"{ "max_concurrent_tasks": 0 }"#).unwrap();

        let err = DaemonConfig::load(&ws).unwrap_err();
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn test_parameter_style_inference() {
        let crush = ToolConfig::new("crush");
        assert_eq!(crush.parameter_style("crush"), ParameterStyle::Flags);
        assert_eq!(
            ToolConfig::new("new-tool").parameter_style("new-tool"),
            ParameterStyle::ConfigFile
        );
        let explicit = ToolConfig::new("x").with_parameter_style(ParameterStyle::Flags);
        assert_eq!(explicit.parameter_style("x"), ParameterStyle::Flags);
    }

    #[test]
    fn test_effective_timeout_precedence() {
        let config = DaemonConfig::default();
        assert_eq!(config.effective_timeout("qwen", Some(10)), 10);
        assert_eq!(config.effective_timeout("qwen", None), 2400);

        let mut no_tool_timeout = DaemonConfig::default();
        no_tool_timeout
            .ai_tools
            .insert("plain".into(), ToolConfig::new("plain"));
        assert_eq!(no_tool_timeout.effective_timeout("plain", None), 3600);
    }
}
