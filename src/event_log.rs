//! Structured JSONL log of terminal lifecycle transitions.
//!
//! Each line carries:
//! - a monotonic sequence number for ordering
//! - an ISO 8601 timestamp with microsecond precision
//! - a run ID that correlates entries written by one process
//! - the emitting component and the structured event

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Append-only lifecycle event log.
pub struct LifecycleEventLog {
    run_id: String,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub ts: String,
    pub run_id: String,
    pub component: String,
    pub event: Value,
}

/// Lifecycle transitions worth reconstructing after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    Created {
        terminal_id: String,
        cwd: PathBuf,
        project_path: Option<PathBuf>,
    },
    Restored {
        terminal_id: String,
        ai_resumed: bool,
    },
    AiResumed {
        terminal_id: String,
        session_id: Option<String>,
    },
    AiInvoked {
        terminal_id: String,
    },
    SessionIdCaptured {
        terminal_id: String,
        session_id: String,
    },
    Destroyed {
        terminal_id: String,
    },
    Exited {
        terminal_id: String,
        exit_code: Option<u32>,
    },
    AllDestroyed {
        count: usize,
    },
}

impl LifecycleEventLog {
    /// Opens (appending) the log at `log_path`, creating parent directories.
    pub fn new(log_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path: log_path.to_path_buf(),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Writes one event as a single line. Thread-safe; write failures are dropped.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run_id: self.run_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn lifecycle(&self, event: LifecycleEvent) {
        self.log("Lifecycle", event);
    }
}
