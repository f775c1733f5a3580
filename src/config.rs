use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime configuration for terminal sessions.
///
/// Loaded from `~/.terminal-sessions/config.yaml`. Every field has a default so
/// a partial (or missing) file is valid.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TerminalConfig {
    /// Shell to launch. Falls back to `$SHELL`, then a platform default.
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default = "default_cols")]
    pub default_cols: u16,
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    /// Executable used to start or resume the AI assistant inside a terminal.
    #[serde(default = "default_ai_command")]
    pub ai_command: String,
    /// Title shown for a terminal once the AI assistant is running in it.
    #[serde(default = "default_ai_title")]
    pub ai_title: String,
    /// Wait before typing the resume command into a freshly spawned shell.
    ///
    /// This is a timing heuristic: a slow shell rc file can still swallow the
    /// command. Raise it if resumed sessions come up without the AI running.
    #[serde(default = "default_settle_delay_ms")]
    pub ai_resume_settle_delay_ms: u64,
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
    #[serde(default = "default_max_output_buffer_bytes")]
    pub max_output_buffer_bytes: usize,
    #[serde(default = "default_session_retention_days")]
    pub session_retention_days: u32,
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Settings for the AI session-id watcher.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_capture_poll_interval_ms(),
            timeout_secs: default_capture_timeout_secs(),
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

fn default_ai_command() -> String {
    "claude".to_string()
}

fn default_ai_title() -> String {
    "Claude".to_string()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_autosave_interval_secs() -> u64 {
    30
}

fn default_max_output_buffer_bytes() -> usize {
    100_000
}

fn default_session_retention_days() -> u32 {
    30
}

fn default_capture_poll_interval_ms() -> u64 {
    1000
}

fn default_capture_timeout_secs() -> u64 {
    60
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            default_cols: default_cols(),
            default_rows: default_rows(),
            ai_command: default_ai_command(),
            ai_title: default_ai_title(),
            ai_resume_settle_delay_ms: default_settle_delay_ms(),
            autosave_interval_secs: default_autosave_interval_secs(),
            max_output_buffer_bytes: default_max_output_buffer_bytes(),
            session_retention_days: default_session_retention_days(),
            capture: CaptureConfig::default(),
        }
    }
}

impl TerminalConfig {
    /// Loads config from `~/.terminal-sessions/config.yaml`, or defaults if absent.
    pub fn load_default() -> Result<Self> {
        Self::load(&paths::config_path()?)
    }

    /// Loads config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to null, which serde_yaml rejects for structs.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_cols == 0 || self.default_rows == 0 {
            anyhow::bail!(
                "default terminal size must be positive, got {}x{}",
                self.default_cols,
                self.default_rows
            );
        }
        if self.ai_command.trim().is_empty() {
            anyhow::bail!("ai_command must not be empty");
        }
        if self.max_output_buffer_bytes == 0 {
            anyhow::bail!("max_output_buffer_bytes must be positive");
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.ai_resume_settle_delay_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
