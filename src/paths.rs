//! Centralized home-based storage paths for terminal-session persistence.
//!
//! Everything lives under `~/.terminal-sessions/`:
//! - `config.yaml` - optional configuration overrides
//! - `profiles.json` - credential profiles (active profile env overlay)
//! - `sessions/<terminal-id>.json` - persisted terminal sessions
//! - `logs/termsess.log` - tracing output
//! - `logs/lifecycle.jsonl` - lifecycle event log

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the application directory inside the user's home.
const APP_DIR: &str = ".terminal-sessions";

/// Returns the application home directory: `~/.terminal-sessions/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn app_home_dir() -> Result<PathBuf> {
    let dir = match home_override() {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("Could not determine home directory for session storage")?
            .join(APP_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create app directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the sessions directory: `~/.terminal-sessions/sessions/`
///
/// Creates the directory if it doesn't exist.
pub fn sessions_dir() -> Result<PathBuf> {
    let dir = app_home_dir()?.join("sessions");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create sessions directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the logs directory: `~/.terminal-sessions/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = app_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the tracing log path: `~/.terminal-sessions/logs/termsess.log`
pub fn debug_log_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join("termsess.log"))
}

/// Returns the lifecycle event log path: `~/.terminal-sessions/logs/lifecycle.jsonl`
pub fn lifecycle_log_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join("lifecycle.jsonl"))
}

/// Returns the config file path: `~/.terminal-sessions/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(app_home_dir()?.join("config.yaml"))
}

/// Returns the credential profiles path: `~/.terminal-sessions/profiles.json`
pub fn profiles_path() -> Result<PathBuf> {
    Ok(app_home_dir()?.join("profiles.json"))
}

/// Returns the directory where the Claude CLI keeps per-project transcripts:
/// `~/.claude/projects/`
///
/// This directory belongs to the AI tool, so it is never created here.
pub fn claude_projects_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".claude").join("projects"))
}

#[cfg(not(test))]
fn home_override() -> Option<PathBuf> {
    None
}

#[cfg(test)]
static HOME_OVERRIDE: std::sync::Mutex<Option<PathBuf>> = std::sync::Mutex::new(None);

#[cfg(test)]
fn home_override() -> Option<PathBuf> {
    HOME_OVERRIDE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Restores the previous home override when dropped.
#[cfg(test)]
pub struct TestHomeGuard {
    previous: Option<PathBuf>,
}

/// Points [`app_home_dir`] at `dir` until the returned guard is dropped.
///
/// The override is process-global, so tests using it must be `#[serial]`.
#[cfg(test)]
pub fn set_home_for_test(dir: PathBuf) -> TestHomeGuard {
    let mut slot = HOME_OVERRIDE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let previous = slot.replace(dir);
    TestHomeGuard { previous }
}

#[cfg(test)]
impl Drop for TestHomeGuard {
    fn drop(&mut self) {
        let mut slot = HOME_OVERRIDE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = self.previous.take();
    }
}
