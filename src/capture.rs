//! Discovery of the AI assistant's session id.
//!
//! When the assistant starts without a known session id, it creates a new
//! transcript whose file name is the id. Capture is fire-and-forget: results
//! come back through a [`CaptureReply`] channel tagged with the start time, so
//! the manager can discard results that belong to an earlier start.

use crate::config::CaptureConfig;
use crate::paths;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// What to look for and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub terminal_id: String,
    pub project_path: PathBuf,
    /// When the assistant was started; also the tag echoed in the result.
    pub start_time: DateTime<Utc>,
}

/// A discovered session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSessionId {
    pub terminal_id: String,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
}

/// Channel back into the lifecycle manager.
#[derive(Debug, Clone)]
pub struct CaptureReply {
    tx: mpsc::UnboundedSender<CapturedSessionId>,
}

impl CaptureReply {
    pub fn new(tx: mpsc::UnboundedSender<CapturedSessionId>) -> Self {
        Self { tx }
    }

    /// Returns false once the manager is gone.
    pub fn deliver(&self, captured: CapturedSessionId) -> bool {
        self.tx.send(captured).is_ok()
    }
}

/// Starts a background search for a session id. Must not block.
pub trait SessionIdCapture: Send + Sync {
    fn capture(&self, request: CaptureRequest, reply: CaptureReply);
}

/// Capture disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCapture;

impl SessionIdCapture for NoCapture {
    fn capture(&self, _request: CaptureRequest, _reply: CaptureReply) {}
}

/// Polls the Claude CLI's per-project transcript directory for a new session.
#[derive(Debug, Clone)]
pub struct ClaudeSessionWatcher {
    projects_dir: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl ClaudeSessionWatcher {
    pub fn new(projects_dir: PathBuf, config: &CaptureConfig) -> Self {
        Self {
            projects_dir,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }

    pub fn open_default(config: &CaptureConfig) -> anyhow::Result<Self> {
        Ok(Self::new(paths::claude_projects_dir()?, config))
    }

    /// Directory holding transcripts for `project_path`.
    pub fn transcript_dir(&self, project_path: &Path) -> PathBuf {
        self.projects_dir.join(encode_project_path(project_path))
    }
}

/// The Claude CLI names project directories by replacing every character
/// outside `[A-Za-z0-9]` with `-`.
pub fn encode_project_path(project_path: &Path) -> String {
    project_path
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Newest `<uuid>.jsonl` in `dir` modified at or after `since`.
pub fn find_newest_session(dir: &Path, since: DateTime<Utc>) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut newest: Option<(DateTime<Utc>, String)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if uuid::Uuid::parse_str(stem).is_err() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let modified = DateTime::<Utc>::from(modified);
        if modified < since {
            continue;
        }
        let is_newer = match &newest {
            None => true,
            Some((current, _)) => modified > *current,
        };
        if is_newer {
            newest = Some((modified, stem.to_string()));
        }
    }
    newest.map(|(_, id)| id)
}

impl SessionIdCapture for ClaudeSessionWatcher {
    fn capture(&self, request: CaptureRequest, reply: CaptureReply) {
        let dir = self.transcript_dir(&request.project_path);
        let poll_interval = self.poll_interval;
        let deadline = tokio::time::Instant::now() + self.timeout;

        tokio::spawn(async move {
            loop {
                if let Some(session_id) = find_newest_session(&dir, request.start_time) {
                    tracing::info!(terminal_id = %request.terminal_id, session_id = %session_id, "Captured AI session id");
                    reply.deliver(CapturedSessionId {
                        terminal_id: request.terminal_id,
                        session_id,
                        start_time: request.start_time,
                    });
                    return;
                }
                if tokio::time::Instant::now() >= deadline {
                    tracing::debug!(terminal_id = %request.terminal_id, dir = %dir.display(), "No AI session id found before timeout");
                    return;
                }
                tokio::time::sleep(poll_interval).await;
            }
        });
    }
}
