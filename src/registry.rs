//! In-memory table of live terminals.
//!
//! The registry is the sole owner of every process handle. Callers get
//! metadata snapshots ([`TerminalInfo`]) or closure access under the lock;
//! killers are handed out only for termination. The lock is a plain
//! `std::sync::Mutex` and must never be held across an `.await`.

use crate::session_store::TerminalSession;
use crate::spawner::{ProcessHandle, ProcessKiller};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Whether a terminal is serving input or being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Running,
    /// A destroy is in progress; exit events must not remove the terminal.
    Exiting,
}

/// A terminal with a live process.
pub struct LiveTerminal {
    pub id: String,
    /// Spawn generation, used to discard events from a previous process with the same id.
    pub instance: u64,
    pub process: Box<dyn ProcessHandle>,
    pub cwd: PathBuf,
    pub title: String,
    pub is_ai_mode: bool,
    pub ai_session_id: Option<String>,
    /// When the AI assistant was last started or resumed; tags capture results.
    pub ai_started_at: Option<DateTime<Utc>>,
    pub output_buffer: String,
    pub project_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub state: TerminalState,
}

impl LiveTerminal {
    /// Durable projection of this terminal.
    pub fn to_session(&self) -> TerminalSession {
        TerminalSession {
            id: self.id.clone(),
            cwd: self.cwd.clone(),
            title: self.title.clone(),
            is_ai_mode: self.is_ai_mode,
            ai_session_id: self.ai_session_id.clone(),
            output_buffer: self.output_buffer.clone(),
            project_path: self.project_path.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn info(&self) -> TerminalInfo {
        TerminalInfo {
            id: self.id.clone(),
            instance: self.instance,
            pid: self.process.pid(),
            cwd: self.cwd.clone(),
            title: self.title.clone(),
            is_ai_mode: self.is_ai_mode,
            ai_session_id: self.ai_session_id.clone(),
            project_path: self.project_path.clone(),
            created_at: self.created_at,
            state: self.state,
        }
    }
}

impl std::fmt::Debug for LiveTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTerminal")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("title", &self.title)
            .field("is_ai_mode", &self.is_ai_mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Metadata snapshot of a live terminal (no process access).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalInfo {
    pub id: String,
    pub instance: u64,
    pub pid: Option<u32>,
    pub cwd: PathBuf,
    pub title: String,
    pub is_ai_mode: bool,
    pub ai_session_id: Option<String>,
    pub project_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub state: TerminalState,
}

/// A terminal marked for shutdown and the means to terminate it.
pub struct ShutdownTarget {
    pub id: String,
    pub killer: Box<dyn ProcessKiller>,
}

/// Mutex-guarded map of id to [`LiveTerminal`].
#[derive(Default)]
pub struct TerminalRegistry {
    terminals: Mutex<HashMap<String, LiveTerminal>>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LiveTerminal>> {
        // A panic while holding the lock leaves the map structurally intact.
        self.terminals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn has(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<TerminalInfo> {
        self.lock().get(id).map(LiveTerminal::info)
    }

    /// Inserts `terminal` unless its id is taken; on conflict the terminal is
    /// handed back so the caller can dispose of its process.
    pub fn insert(&self, terminal: LiveTerminal) -> Result<(), Box<LiveTerminal>> {
        let mut terminals = self.lock();
        if terminals.contains_key(&terminal.id) {
            return Err(Box::new(terminal));
        }
        terminals.insert(terminal.id.clone(), terminal);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<LiveTerminal> {
        self.lock().remove(id)
    }

    /// Removes `id` only if it still holds spawn generation `instance` and no
    /// destroy has marked it `Exiting`.
    pub fn remove_instance(&self, id: &str, instance: u64) -> Option<LiveTerminal> {
        let mut terminals = self.lock();
        match terminals.get(id) {
            Some(t) if t.instance == instance && t.state == TerminalState::Running => {
                terminals.remove(id)
            }
            _ => None,
        }
    }

    /// Runs `f` against the terminal under the lock.
    pub fn with_terminal<R>(&self, id: &str, f: impl FnOnce(&mut LiveTerminal) -> R) -> Option<R> {
        self.lock().get_mut(id).map(f)
    }

    /// Projections of every terminal that passes `filter`, ordered by creation time.
    pub fn snapshot_sessions(
        &self,
        filter: impl Fn(&LiveTerminal) -> bool,
    ) -> Vec<TerminalSession> {
        let mut sessions: Vec<TerminalSession> = self
            .lock()
            .values()
            .filter(|t| filter(t))
            .map(LiveTerminal::to_session)
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn list(&self) -> Vec<TerminalInfo> {
        let mut infos: Vec<TerminalInfo> = self.lock().values().map(LiveTerminal::info).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        infos
    }

    /// Marks every terminal `Exiting` and returns their killers.
    pub fn begin_shutdown(&self) -> Vec<ShutdownTarget> {
        self.lock()
            .values_mut()
            .map(|t| {
                t.state = TerminalState::Exiting;
                ShutdownTarget {
                    id: t.id.clone(),
                    killer: t.process.killer(),
                }
            })
            .collect()
    }

    /// Removes every terminal, returning them so handles drop outside the lock.
    pub fn clear(&self) -> Vec<LiveTerminal> {
        self.lock().drain().map(|(_, t)| t).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
