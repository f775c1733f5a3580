//! Terminal lifecycle orchestration.
//!
//! [`TerminalManager`] owns the registry and drives every state transition:
//!
//! ```text
//! absent -> spawning -> running -> exiting -> absent
//!                         |
//!                         +-- plain <-> ai-active (session pending -> bound)
//! ```
//!
//! ## Design Decisions
//!
//! - **Registry membership is the idempotency check**: creating an id that is
//!   already live succeeds without spawning.
//! - **Destroy claims before tearing down**: the terminal is marked `Exiting`
//!   first so its exit event cannot race the teardown into deleting state twice.
//! - **Capture results re-enter through a channel**: the capture hook never
//!   touches the registry directly; results are tagged with the AI start time
//!   and applied only if they still match.

use crate::capture::{CaptureReply, CaptureRequest, CapturedSessionId, NoCapture, SessionIdCapture};
use crate::config::TerminalConfig;
use crate::error::{SpawnError, TerminalError, TerminalResult};
use crate::event_log::{LifecycleEvent, LifecycleEventLog};
use crate::profile::{NoProfile, ProfileEnvProvider};
use crate::registry::{LiveTerminal, ShutdownTarget, TerminalInfo, TerminalRegistry, TerminalState};
use crate::resume::{build_invoke_command, build_resume_command};
use crate::router::{spawn_event_router, CleanupHandler, DataHandler, Noop, RouterContext, UiNotifier};
use crate::session_store::{SessionStore, TerminalSession};
use crate::spawner::{write_input, ProcessSpawner, SharedWriter, SpawnRequest, SpawnedProcess};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Collaborators injected into the manager.
#[derive(Clone)]
pub struct TerminalDeps {
    pub spawner: Arc<dyn ProcessSpawner>,
    pub store: Arc<dyn SessionStore>,
    pub profile: Arc<dyn ProfileEnvProvider>,
    pub notifier: Arc<dyn UiNotifier>,
    pub data_handler: Arc<dyn DataHandler>,
    pub cleanup: Arc<dyn CleanupHandler>,
    pub capture: Arc<dyn SessionIdCapture>,
    pub event_log: Option<Arc<LifecycleEventLog>>,
}

impl TerminalDeps {
    /// Deps with no profile, no-op UI handlers, and capture disabled.
    pub fn new(spawner: Arc<dyn ProcessSpawner>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            spawner,
            store,
            profile: Arc::new(NoProfile),
            notifier: Arc::new(Noop),
            data_handler: Arc::new(Noop),
            cleanup: Arc::new(Noop),
            capture: Arc::new(NoCapture),
            event_log: None,
        }
    }
}

/// Parameters for [`TerminalManager::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub id: String,
    /// Falls back to the user's home directory.
    pub cwd: Option<PathBuf>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    /// Terminals with a project path are persisted.
    pub project_path: Option<PathBuf>,
}

impl CreateOptions {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The id was already live; nothing was spawned.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    pub resume_ai_session: bool,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub id: String,
    /// Scrollback stored with the session, for repainting.
    pub output_buffer: String,
    pub already_running: bool,
    pub ai_resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRestoreStatus {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkRestoreReport {
    pub restored: usize,
    pub failed: usize,
    pub sessions: Vec<SessionRestoreStatus>,
}

/// Values taken from [`TerminalConfig`] at construction.
struct Settings {
    default_cols: u16,
    default_rows: u16,
    ai_command: String,
    ai_title: String,
    settle_delay: Duration,
    autosave_interval: Duration,
}

struct AutosaveTask {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Result of the spawning half of create.
enum Spawned {
    New { instance: u64 },
    Existing,
}

struct ManagerInner {
    registry: Arc<TerminalRegistry>,
    router: Arc<RouterContext>,
    spawner: Arc<dyn ProcessSpawner>,
    store: Arc<dyn SessionStore>,
    profile: Arc<dyn ProfileEnvProvider>,
    notifier: Arc<dyn UiNotifier>,
    cleanup: Arc<dyn CleanupHandler>,
    capture: Arc<dyn SessionIdCapture>,
    event_log: Option<Arc<LifecycleEventLog>>,
    settings: Settings,
    next_instance: AtomicU64,
    autosave: Mutex<Option<AutosaveTask>>,
    capture_tx: mpsc::UnboundedSender<CapturedSessionId>,
}

/// Handle to the terminal lifecycle. Cheap to clone.
#[derive(Clone)]
pub struct TerminalManager {
    inner: Arc<ManagerInner>,
}

impl TerminalManager {
    /// Builds a manager. Must be called within a tokio runtime: the task that
    /// applies captured AI session ids is started here.
    pub fn new(deps: TerminalDeps, config: &TerminalConfig) -> Self {
        let registry = Arc::new(TerminalRegistry::new());
        let router = Arc::new(RouterContext {
            registry: Arc::clone(&registry),
            store: Arc::clone(&deps.store),
            notifier: Arc::clone(&deps.notifier),
            data_handler: Arc::clone(&deps.data_handler),
            event_log: deps.event_log.clone(),
            max_output_bytes: config.max_output_buffer_bytes.max(1),
        });
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ManagerInner {
            registry,
            router,
            spawner: deps.spawner,
            store: deps.store,
            profile: deps.profile,
            notifier: deps.notifier,
            cleanup: deps.cleanup,
            capture: deps.capture,
            event_log: deps.event_log,
            settings: Settings {
                default_cols: config.default_cols,
                default_rows: config.default_rows,
                ai_command: config.ai_command.clone(),
                ai_title: config.ai_title.clone(),
                settle_delay: config.settle_delay(),
                autosave_interval: config.autosave_interval(),
            },
            next_instance: AtomicU64::new(0),
            autosave: Mutex::new(None),
            capture_tx,
        });

        tokio::spawn(apply_captures(Arc::downgrade(&inner), capture_rx));
        Self { inner }
    }

    fn log_event(&self, event: LifecycleEvent) {
        if let Some(log) = &self.inner.event_log {
            log.lifecycle(event);
        }
    }

    fn capture_reply(&self) -> CaptureReply {
        CaptureReply::new(self.inner.capture_tx.clone())
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner.registry.has(id)
    }

    pub fn get(&self, id: &str) -> Option<TerminalInfo> {
        self.inner.registry.get(id)
    }

    /// Live terminals, oldest first.
    pub fn list(&self) -> Vec<TerminalInfo> {
        self.inner.registry.list()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Current scrollback of a live terminal.
    pub fn output_buffer(&self, id: &str) -> Option<String> {
        self.inner
            .registry
            .with_terminal(id, |t| t.output_buffer.clone())
    }

    /// Creates a terminal, or reports [`CreateOutcome::AlreadyRunning`] if the id is live.
    ///
    /// On a spawn error the registry is untouched. If the session cannot be
    /// persisted the new process is killed and the error returned.
    pub async fn create(&self, options: CreateOptions) -> TerminalResult<CreateOutcome> {
        match self.create_seeded(options, None).await? {
            Spawned::New { .. } => Ok(CreateOutcome::Created),
            Spawned::Existing => Ok(CreateOutcome::AlreadyRunning),
        }
    }

    /// Create, optionally seeding title, scrollback, creation time and AI
    /// session from a stored session.
    async fn create_seeded(
        &self,
        options: CreateOptions,
        seed: Option<&TerminalSession>,
    ) -> TerminalResult<Spawned> {
        let inner = &self.inner;
        if inner.registry.has(&options.id) {
            tracing::debug!(terminal_id = %options.id, "Terminal already running, skipping create");
            return Ok(Spawned::Existing);
        }

        let cwd = match options.cwd.filter(|c| !c.as_os_str().is_empty()) {
            Some(cwd) => cwd,
            None => dirs::home_dir().ok_or(SpawnError::InvalidWorkingDir {
                path: PathBuf::new(),
            })?,
        };
        let request = SpawnRequest {
            cwd: cwd.clone(),
            cols: options.cols.unwrap_or(inner.settings.default_cols),
            rows: options.rows.unwrap_or(inner.settings.default_rows),
            env: inner.profile.active_profile_env(),
        };

        let SpawnedProcess { handle, events } =
            inner.spawner.spawn(request).await.map_err(|e| {
                tracing::warn!(terminal_id = %options.id, "Failed to spawn terminal: {}", e);
                TerminalError::Spawn(e)
            })?;

        let instance = inner.next_instance.fetch_add(1, Ordering::SeqCst) + 1;
        let terminal = LiveTerminal {
            id: options.id.clone(),
            instance,
            process: handle,
            cwd: cwd.clone(),
            title: match seed {
                Some(session) => session.title.clone(),
                None => format!("Terminal {}", inner.registry.len() + 1),
            },
            is_ai_mode: seed.is_some_and(|s| s.is_ai_mode),
            ai_session_id: seed.and_then(|s| s.ai_session_id.clone()),
            ai_started_at: None,
            output_buffer: seed.map(|s| s.output_buffer.clone()).unwrap_or_default(),
            project_path: options.project_path.clone(),
            created_at: seed.map(|s| s.created_at).unwrap_or_else(Utc::now),
            state: TerminalState::Running,
        };

        if let Err(lost) = inner.registry.insert(terminal) {
            tracing::debug!(terminal_id = %lost.id, "Lost create race, discarding new process");
            drop(lost);
            return Ok(Spawned::Existing);
        }
        spawn_event_router(Arc::clone(&inner.router), options.id.clone(), instance, events);

        if options.project_path.is_some() {
            let snapshot = inner.registry.with_terminal(&options.id, |t| t.to_session());
            if let Some(session) = snapshot {
                if let Err(e) = inner.store.put(session) {
                    tracing::warn!(terminal_id = %options.id, "Failed to persist new terminal: {:#}", e);
                    drop(inner.registry.remove_instance(&options.id, instance));
                    return Err(TerminalError::persistence(&e));
                }
            }
        }

        tracing::info!(terminal_id = %options.id, cwd = %cwd.display(), "Terminal created");
        self.log_event(LifecycleEvent::Created {
            terminal_id: options.id,
            cwd,
            project_path: options.project_path,
        });
        Ok(Spawned::New { instance })
    }

    /// Brings a stored session back to life.
    ///
    /// An id that is already live short-circuits with `already_running` and no
    /// title or AI work. A terminal destroyed during the settle delay, or a
    /// failed resume write, is logged and does not fail the restore.
    pub async fn restore(
        &self,
        session: &TerminalSession,
        options: RestoreOptions,
    ) -> TerminalResult<RestoreOutcome> {
        let create = CreateOptions {
            id: session.id.clone(),
            cwd: Some(session.cwd.clone()),
            cols: options.cols,
            rows: options.rows,
            project_path: session.project_path.clone(),
        };
        let spawned = self
            .create_seeded(create, Some(session))
            .await
            .map_err(|e| match e {
                TerminalError::Spawn(source) => TerminalError::Restore {
                    id: session.id.clone(),
                    source,
                },
                other => other,
            })?;

        let mut outcome = RestoreOutcome {
            id: session.id.clone(),
            output_buffer: session.output_buffer.clone(),
            already_running: false,
            ai_resumed: false,
        };
        let instance = match spawned {
            Spawned::New { instance } => instance,
            Spawned::Existing => {
                outcome.already_running = true;
                return Ok(outcome);
            }
        };

        if session.is_ai_mode && options.resume_ai_session {
            outcome.ai_resumed = self.resume_ai(session, instance).await;
            if outcome.ai_resumed && session.project_path.is_some() {
                self.persist_terminal(&session.id);
            }
        }

        self.log_event(LifecycleEvent::Restored {
            terminal_id: session.id.clone(),
            ai_resumed: outcome.ai_resumed,
        });
        Ok(outcome)
    }

    /// Waits for the shell to settle, then types the resume line.
    async fn resume_ai(&self, session: &TerminalSession, instance: u64) -> bool {
        let inner = &self.inner;
        tokio::time::sleep(inner.settings.settle_delay).await;

        let start_time = Utc::now();
        let command = build_resume_command(
            &inner.settings.ai_command,
            session.project_dir(),
            session.ai_session_id.as_deref(),
        );
        let writer = inner
            .registry
            .with_terminal(&session.id, |t| {
                if t.instance != instance || t.state != TerminalState::Running {
                    return None;
                }
                t.ai_started_at = Some(start_time);
                t.title = inner.settings.ai_title.clone();
                Some(t.process.writer())
            })
            .flatten();

        let Some(writer) = writer else {
            tracing::warn!(terminal_id = %session.id, "Terminal went away before AI resume");
            return false;
        };
        if let Err(e) = write_blocking(writer, command.into_bytes()).await {
            tracing::warn!(terminal_id = %session.id, "Failed to write AI resume command: {}", e);
            return false;
        }

        inner
            .notifier
            .title_changed(&session.id, &inner.settings.ai_title);
        self.log_event(LifecycleEvent::AiResumed {
            terminal_id: session.id.clone(),
            session_id: session.ai_session_id.clone(),
        });
        if session.ai_session_id.is_none() {
            inner.capture.capture(
                CaptureRequest {
                    terminal_id: session.id.clone(),
                    project_path: session.project_dir().to_path_buf(),
                    start_time,
                },
                self.capture_reply(),
            );
        }
        true
    }

    /// Restores every session stored for `date` and `project_path`, one at a
    /// time in creation order. Individual failures are reported, not raised.
    pub async fn restore_sessions_from_date(
        &self,
        date: NaiveDate,
        project_path: &Path,
        options: RestoreOptions,
    ) -> TerminalResult<BulkRestoreReport> {
        let sessions = self
            .inner
            .store
            .list_by_date(date, project_path)
            .map_err(|e| TerminalError::persistence(&e))?;

        let mut report = BulkRestoreReport::default();
        for session in &sessions {
            match self.restore(session, options).await {
                Ok(_) => {
                    report.restored += 1;
                    report.sessions.push(SessionRestoreStatus {
                        id: session.id.clone(),
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(terminal_id = %session.id, "Failed to restore session: {}", e);
                    report.failed += 1;
                    report.sessions.push(SessionRestoreStatus {
                        id: session.id.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        tracing::info!(
            %date,
            restored = report.restored,
            failed = report.failed,
            "Bulk restore finished"
        );
        Ok(report)
    }

    /// Tears down one terminal.
    ///
    /// The persisted session is removed, the cleanup handler runs, the process
    /// is killed, and the terminal leaves the registry, in that order. A
    /// persistence failure is reported only after the teardown completes.
    pub async fn destroy(&self, id: &str) -> TerminalResult<()> {
        let inner = &self.inner;
        let mut killer = inner
            .registry
            .with_terminal(id, |t| {
                t.state = TerminalState::Exiting;
                t.process.killer()
            })
            .ok_or_else(|| TerminalError::NotFound { id: id.to_string() })?;

        let removed = inner.store.remove(id);
        if let Err(e) = &removed {
            tracing::warn!(terminal_id = %id, "Failed to remove persisted session: {:#}", e);
        }
        inner.cleanup.on_cleanup(id);
        if let Err(e) = killer.kill() {
            tracing::debug!(terminal_id = %id, "Kill reported an error (process may have exited): {}", e);
        }
        drop(inner.registry.remove(id));

        tracing::info!(terminal_id = %id, "Terminal destroyed");
        self.log_event(LifecycleEvent::Destroyed {
            terminal_id: id.to_string(),
        });
        removed.map_err(|e| TerminalError::persistence(&e))
    }

    /// Snapshots every terminal, stops autosave, kills all processes
    /// concurrently, and empties the registry. Failures are logged only.
    ///
    /// Returns the number of terminals torn down.
    pub async fn destroy_all(&self) -> usize {
        if let Err(e) = self.persist_all() {
            tracing::warn!("Failed to persist sessions before shutdown: {}", e);
        }
        self.stop_autosave().await;

        let kills = self
            .inner
            .registry
            .begin_shutdown()
            .into_iter()
            .map(|ShutdownTarget { id, mut killer }| {
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = killer.kill() {
                        tracing::debug!(terminal_id = %id, "Kill during shutdown failed: {}", e);
                    }
                })
            });
        for result in futures::future::join_all(kills).await {
            if let Err(e) = result {
                tracing::warn!("Kill task failed: {}", e);
            }
        }

        let terminals = self.inner.registry.clear();
        let count = terminals.len();
        drop(terminals);

        tracing::info!(count, "All terminals destroyed");
        self.log_event(LifecycleEvent::AllDestroyed { count });
        count
    }

    /// Persists every live terminal that belongs to a project.
    ///
    /// Returns the number of sessions written.
    pub fn persist_all(&self) -> TerminalResult<usize> {
        let sessions = self
            .inner
            .registry
            .snapshot_sessions(|t| t.project_path.is_some());
        let count = sessions.len();
        self.inner
            .store
            .persist_all(sessions)
            .map_err(|e| TerminalError::persistence(&e))?;
        Ok(count)
    }

    /// Best-effort persist of one project terminal.
    fn persist_terminal(&self, id: &str) {
        let snapshot = self
            .inner
            .registry
            .with_terminal(id, |t| t.project_path.is_some().then(|| t.to_session()))
            .flatten();
        if let Some(session) = snapshot {
            if let Err(e) = self.inner.store.put(session) {
                tracing::warn!(terminal_id = %id, "Failed to persist session: {:#}", e);
            }
        }
    }

    /// Starts periodic [`persist_all`](Self::persist_all). No-op if running.
    pub fn start_autosave(&self) {
        let mut slot = self
            .inner
            .autosave
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.autosave_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        match (TerminalManager { inner }).persist_all() {
                            Ok(count) => tracing::debug!(count, "Autosaved sessions"),
                            Err(e) => tracing::warn!("Autosave failed: {}", e),
                        }
                    }
                    _ = stop_rx.recv() => break,
                }
            }
        });
        *slot = Some(AutosaveTask { stop_tx, handle });
    }

    pub async fn stop_autosave(&self) {
        let task = self
            .inner
            .autosave
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.stop_tx.send(()).await;
            let _ = task.handle.await;
        }
    }

    pub fn autosave_running(&self) -> bool {
        self.inner
            .autosave
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Sends input to a live terminal. The write runs off the registry lock.
    pub async fn write(&self, id: &str, data: &[u8]) -> TerminalResult<()> {
        let writer = self
            .inner
            .registry
            .with_terminal(id, |t| t.process.writer())
            .ok_or_else(|| TerminalError::NotFound { id: id.to_string() })?;
        write_blocking(writer, data.to_vec())
            .await
            .map_err(|e| TerminalError::ProcessIo {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> TerminalResult<()> {
        self.inner
            .registry
            .with_terminal(id, |t| t.process.resize(cols, rows))
            .ok_or_else(|| TerminalError::NotFound { id: id.to_string() })?
            .map_err(|e| TerminalError::ProcessIo {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    pub fn set_title(&self, id: &str, title: &str) -> TerminalResult<()> {
        self.inner
            .registry
            .with_terminal(id, |t| t.title = title.to_string())
            .ok_or_else(|| TerminalError::NotFound { id: id.to_string() })?;
        self.inner.notifier.title_changed(id, title);
        Ok(())
    }

    /// Starts a new AI session in a running terminal and begins capturing its id.
    ///
    /// Any session id bound to an earlier AI start is released: the new start
    /// gets its own id, bound at most once by the capture that carries its tag.
    pub async fn invoke_ai(&self, id: &str) -> TerminalResult<()> {
        let inner = &self.inner;
        let not_found = || TerminalError::NotFound { id: id.to_string() };
        let (instance, cwd, writer) = inner
            .registry
            .with_terminal(id, |t| (t.instance, t.cwd.clone(), t.process.writer()))
            .ok_or_else(not_found)?;

        let start_time = Utc::now();
        let command = build_invoke_command(&inner.settings.ai_command, &cwd);
        write_blocking(writer, command.into_bytes())
            .await
            .map_err(|e| TerminalError::ProcessIo {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        inner
            .registry
            .with_terminal(id, |t| {
                if t.instance != instance {
                    return None;
                }
                t.is_ai_mode = true;
                t.ai_session_id = None;
                t.ai_started_at = Some(start_time);
                t.title = inner.settings.ai_title.clone();
                Some(())
            })
            .flatten()
            .ok_or_else(not_found)?;

        inner.notifier.title_changed(id, &inner.settings.ai_title);
        self.log_event(LifecycleEvent::AiInvoked {
            terminal_id: id.to_string(),
        });
        // The CLI keys its transcripts by the directory it was started in.
        inner.capture.capture(
            CaptureRequest {
                terminal_id: id.to_string(),
                project_path: cwd,
                start_time,
            },
            self.capture_reply(),
        );
        Ok(())
    }

    /// Binds a captured AI session id if it still belongs to the terminal's
    /// current AI start. Returns whether it was applied.
    pub fn apply_captured_session_id(&self, captured: &CapturedSessionId) -> bool {
        let applied = self
            .inner
            .registry
            .with_terminal(&captured.terminal_id, |t| {
                let matches = t.state == TerminalState::Running
                    && t.is_ai_mode
                    && t.ai_session_id.is_none()
                    && t.ai_started_at == Some(captured.start_time);
                if !matches {
                    return false;
                }
                t.ai_session_id = Some(captured.session_id.clone());
                true
            })
            .unwrap_or(false);

        if !applied {
            tracing::debug!(terminal_id = %captured.terminal_id, "Ignoring stale AI session id");
            return false;
        }
        self.persist_terminal(&captured.terminal_id);
        self.log_event(LifecycleEvent::SessionIdCaptured {
            terminal_id: captured.terminal_id.clone(),
            session_id: captured.session_id.clone(),
        });
        true
    }

    /// Spawn generation of a live terminal.
    pub fn instance_of(&self, id: &str) -> Option<u64> {
        self.inner.registry.with_terminal(id, |t| t.instance)
    }

    /// When the AI assistant was last started in `id`.
    pub fn ai_started_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .registry
            .with_terminal(id, |t| t.ai_started_at)
            .flatten()
    }
}

/// Writes on the blocking pool so a child that stops reading stdin never
/// stalls a runtime worker.
async fn write_blocking(writer: SharedWriter, data: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_input(&writer, &data))
        .await
        .map_err(|e| std::io::Error::other(format!("write task failed: {}", e)))?
}

async fn apply_captures(
    manager: Weak<ManagerInner>,
    mut results: mpsc::UnboundedReceiver<CapturedSessionId>,
) {
    while let Some(captured) = results.recv().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };
        TerminalManager { inner }.apply_captured_session_id(&captured);
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
