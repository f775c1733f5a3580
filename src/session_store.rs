//! Durable terminal session records.
//!
//! A [`TerminalSession`] is the persisted projection of a live terminal. The
//! store keeps one JSON document per terminal id and answers date/project
//! scoped queries used by bulk restore.
//!
//! ## Design Decisions
//!
//! - **One file per id**: `~/.terminal-sessions/sessions/<id>.json`. Sessions are
//!   independently keyed so concurrent writes for different terminals never
//!   contend.
//! - **Atomic writes**: each record is written to a uniquely named temp file and
//!   renamed into place.
//! - **Date grouping**: a session belongs to the local calendar date of its
//!   `created_at`.

use crate::paths;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default bound for persisted scrollback.
pub const DEFAULT_MAX_OUTPUT_BUFFER: usize = 100_000;

/// A persisted terminal session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalSession {
    pub id: String,
    pub cwd: PathBuf,
    pub title: String,
    #[serde(default)]
    pub is_ai_mode: bool,
    /// External AI session handle, `None` until captured.
    #[serde(default)]
    pub ai_session_id: Option<String>,
    /// Recent scrollback, bounded by the store.
    #[serde(default)]
    pub output_buffer: String,
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TerminalSession {
    /// Local calendar date the session is grouped under.
    pub fn created_date(&self) -> NaiveDate {
        self.created_at.with_timezone(&Local).date_naive()
    }

    /// Directory the AI assistant should be resumed in.
    pub fn project_dir(&self) -> &Path {
        if self.cwd.as_os_str().is_empty() {
            self.project_path.as_deref().unwrap_or(&self.cwd)
        } else {
            &self.cwd
        }
    }
}

/// Number of stored sessions for one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDateSummary {
    pub date: NaiveDate,
    pub session_count: usize,
}

/// Durable storage for terminal sessions.
///
/// Implementations must be safe to call from any thread; records for
/// different ids are independent.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<TerminalSession>>;

    /// Inserts or replaces the record for `session.id`, stamping `updated_at`.
    fn put(&self, session: TerminalSession) -> Result<()>;

    /// Removes the record for `id`. Removing an absent id is not an error.
    fn remove(&self, id: &str) -> Result<()>;

    /// Sessions created on `date` for `project_path`, oldest first.
    fn list_by_date(&self, date: NaiveDate, project_path: &Path) -> Result<Vec<TerminalSession>>;

    /// Dates that have sessions for `project_path`, newest first.
    fn list_dates(&self, project_path: &Path) -> Result<Vec<SessionDateSummary>>;

    /// Writes every session, attempting all of them before reporting failures.
    fn persist_all(&self, sessions: Vec<TerminalSession>) -> Result<()> {
        let total = sessions.len();
        let mut failures = Vec::new();
        for session in sessions {
            let id = session.id.clone();
            if let Err(e) = self.put(session) {
                failures.push(format!("{}: {:#}", id, e));
            }
        }
        if !failures.is_empty() {
            anyhow::bail!(
                "Failed to persist {} of {} sessions: {}",
                failures.len(),
                total,
                failures.join("; ")
            );
        }
        Ok(())
    }
}

/// Keeps only the last `max_bytes` bytes of `buffer`, cutting on a char boundary.
pub fn trim_to_tail(buffer: &mut String, max_bytes: usize) {
    if buffer.len() <= max_bytes {
        return;
    }
    let mut cut = buffer.len() - max_bytes;
    while !buffer.is_char_boundary(cut) {
        cut += 1;
    }
    buffer.drain(..cut);
}

/// File-backed [`SessionStore`].
pub struct FileSessionStore {
    dir: PathBuf,
    max_output_bytes: usize,
}

impl FileSessionStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create sessions directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BUFFER,
        })
    }

    /// Opens the store at `~/.terminal-sessions/sessions/`.
    pub fn open_default() -> Result<Self> {
        Self::new(paths::sessions_dir()?)
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || id.contains(['/', '\\'])
            || id == "."
            || id == ".."
            || id.starts_with('.')
        {
            anyhow::bail!("Invalid terminal id for storage: {:?}", id);
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Reads every parseable session. Unreadable or corrupt files are skipped.
    fn load_all(&self) -> Result<Vec<TerminalSession>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read sessions directory: {}", self.dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_session(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping unreadable session file: {:#}", e),
            }
        }
        Ok(sessions)
    }

    /// Deletes sessions whose `updated_at` is older than `days` days.
    ///
    /// Returns the ids that were removed.
    pub fn cleanup_older_than(&self, days: u32) -> Result<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let mut deleted = Vec::new();
        for session in self.load_all()? {
            if session.updated_at < cutoff {
                self.remove(&session.id)?;
                deleted.push(session.id);
            }
        }
        deleted.sort();
        Ok(deleted)
    }
}

fn read_session(path: &Path) -> Result<TerminalSession> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session file: {}", path.display()))
}

impl SessionStore for FileSessionStore {
    fn get(&self, id: &str) -> Result<Option<TerminalSession>> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_session(&path).map(Some)
    }

    fn put(&self, mut session: TerminalSession) -> Result<()> {
        let path = self.session_path(&session.id)?;
        session.updated_at = Utc::now();
        trim_to_tail(&mut session.output_buffer, self.max_output_bytes);

        let content =
            serde_json::to_string_pretty(&session).context("Failed to serialize terminal session")?;
        let temp_path = self
            .dir
            .join(format!(".{}.{}.tmp", session.id, uuid::Uuid::new_v4()));

        fs::write(&temp_path, &content).with_context(|| {
            format!("Failed to write temp session file: {}", temp_path.display())
        })?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e)
                .with_context(|| format!("Failed to rename temp file to: {}", path.display()));
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.session_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete session: {}", path.display()))
            }
        }
    }

    fn list_by_date(&self, date: NaiveDate, project_path: &Path) -> Result<Vec<TerminalSession>> {
        let mut sessions: Vec<TerminalSession> = self
            .load_all()?
            .into_iter()
            .filter(|s| s.created_date() == date && s.project_path.as_deref() == Some(project_path))
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    fn list_dates(&self, project_path: &Path) -> Result<Vec<SessionDateSummary>> {
        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for session in self.load_all()? {
            if session.project_path.as_deref() == Some(project_path) {
                *counts.entry(session.created_date()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .rev()
            .map(|(date, session_count)| SessionDateSummary {
                date,
                session_count,
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/session_store_tests.rs"]
mod tests;
