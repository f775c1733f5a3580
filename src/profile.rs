//! Credential profiles for the AI assistant.
//!
//! The active profile contributes an environment overlay that every new
//! terminal receives, so an AI CLI started inside the shell authenticates as
//! the selected account.

use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Env var carrying the OAuth token of the active profile.
pub const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";
/// Env var pointing the AI CLI at a profile-specific config directory.
pub const CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

/// Supplies the environment overlay for newly spawned terminals.
pub trait ProfileEnvProvider: Send + Sync {
    fn active_profile_env(&self) -> HashMap<String, String>;
}

/// Provider with no profiles configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProfile;

impl ProfileEnvProvider for NoProfile {
    fn active_profile_env(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// One named credential profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub oauth_token: Option<String>,
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
    /// Extra variables exported into the terminal.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Profile {
    /// Environment overlay for this profile. Empty values are left out.
    pub fn env_overlay(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self
            .env
            .iter()
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(token) = self.oauth_token.as_deref().filter(|t| !t.is_empty()) {
            env.insert(OAUTH_TOKEN_ENV.to_string(), token.to_string());
        }
        if let Some(dir) = self
            .config_dir
            .as_ref()
            .filter(|d| !d.as_os_str().is_empty())
        {
            env.insert(CONFIG_DIR_ENV.to_string(), dir.display().to_string());
        }
        env
    }
}

/// Contents of `~/.terminal-sessions/profiles.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileFile {
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl ProfileFile {
    /// Loads the profile file at `path`; a missing file has no profiles.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profiles file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse profiles file: {}", path.display()))
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        let active = self.active.as_deref()?;
        self.profiles.iter().find(|p| p.name == active)
    }
}

/// [`ProfileEnvProvider`] that re-reads the profile file on every call, so a
/// profile switch applies to the next terminal without a restart.
#[derive(Debug, Clone)]
pub struct FileProfileProvider {
    path: PathBuf,
}

impl FileProfileProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(paths::profiles_path()?))
    }
}

impl ProfileEnvProvider for FileProfileProvider {
    fn active_profile_env(&self) -> HashMap<String, String> {
        let file = match ProfileFile::load(&self.path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Ignoring credential profiles: {:#}", e);
                return HashMap::new();
            }
        };
        match file.active_profile() {
            Some(profile) => {
                let env = profile.env_overlay();
                if env.contains_key(OAUTH_TOKEN_ENV) {
                    tracing::debug!(profile = %profile.name, "Injecting OAuth token from active profile");
                }
                env
            }
            None => HashMap::new(),
        }
    }
}
