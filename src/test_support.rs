//! Test doubles for lifecycle tests.
//!
//! Every double that observes an ordering-relevant call records it in a shared
//! [`Timeline`] (`spawn:<cwd>`, `persist:<id>`, `remove:<id>`, `cleanup:<id>`,
//! `kill:<pid>`, `drop:<pid>`), so tests can assert cross-component ordering.

use crate::capture::{CaptureReply, CaptureRequest, CapturedSessionId, SessionIdCapture};
use crate::config::TerminalConfig;
use crate::error::SpawnError;
use crate::lifecycle::{TerminalDeps, TerminalManager};
use crate::profile::ProfileEnvProvider;
use crate::registry::TerminalInfo;
use crate::router::{CleanupHandler, DataHandler, UiNotifier};
use crate::session_store::{SessionDateSummary, SessionStore, TerminalSession};
use crate::spawner::{
    ProcessEvent, ProcessHandle, ProcessKiller, ProcessSpawner, SharedWriter, SpawnRequest,
    SpawnedProcess,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared, ordered record of side effects.
#[derive(Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<String>>>);

impl Timeline {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Entries starting with `prefix`, in order.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

/// Bookkeeping for one fake process.
struct FakeSpawn {
    request: SpawnRequest,
    pid: u32,
    events: mpsc::UnboundedSender<ProcessEvent>,
    written: Arc<Mutex<Vec<u8>>>,
    input: SharedWriter,
    resizes: Arc<Mutex<Vec<(u16, u16)>>>,
}

/// Spawner that hands out in-memory processes.
#[derive(Default)]
pub struct FakeSpawner {
    timeline: Timeline,
    next_pid: AtomicU32,
    failing_cwds: Mutex<HashSet<PathBuf>>,
    broken_writes: Arc<AtomicBool>,
    spawns: Mutex<Vec<FakeSpawn>>,
}

impl FakeSpawner {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    /// Makes every spawn in `cwd` fail.
    pub fn fail_for(&self, cwd: impl Into<PathBuf>) {
        self.failing_cwds.lock().unwrap().insert(cwd.into());
    }

    /// Makes every write to any process fail from now on.
    pub fn break_writes(&self) {
        self.broken_writes.store(true, Ordering::SeqCst);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.request.clone())
            .collect()
    }

    /// Everything written to the process with `pid`, lossily decoded.
    pub fn written(&self, pid: u32) -> String {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.pid == pid)
            .map(|s| String::from_utf8_lossy(&s.written.lock().unwrap()).into_owned())
            .unwrap_or_default()
    }

    /// The stdin handle of the process with `pid`. Holding its lock stalls writes.
    pub fn input(&self, pid: u32) -> SharedWriter {
        let spawns = self.spawns.lock().unwrap();
        let spawn = spawns.iter().find(|s| s.pid == pid).expect("unknown pid");
        Arc::clone(&spawn.input)
    }

    pub fn resizes(&self, pid: u32) -> Vec<(u16, u16)> {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.pid == pid)
            .map(|s| s.resizes.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Feeds an event into the process with `pid`.
    pub fn emit(&self, pid: u32, event: ProcessEvent) {
        let spawns = self.spawns.lock().unwrap();
        let spawn = spawns.iter().find(|s| s.pid == pid).expect("unknown pid");
        spawn.events.send(event).expect("router should be listening");
    }
}

#[async_trait]
impl ProcessSpawner for FakeSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess, SpawnError> {
        self.timeline
            .push(format!("spawn:{}", request.cwd.display()));
        if self.failing_cwds.lock().unwrap().contains(&request.cwd) {
            return Err(SpawnError::InvalidWorkingDir {
                path: request.cwd.clone(),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        let resizes = Arc::new(Mutex::new(Vec::new()));
        let input: SharedWriter = Arc::new(Mutex::new(Box::new(FakeInput {
            written: Arc::clone(&written),
            fail_writes: Arc::clone(&self.broken_writes),
        })));
        self.spawns.lock().unwrap().push(FakeSpawn {
            request,
            pid,
            events: tx.clone(),
            written,
            input: Arc::clone(&input),
            resizes: Arc::clone(&resizes),
        });

        Ok(SpawnedProcess {
            handle: Box::new(FakeProcess {
                pid,
                input,
                resizes,
                killer: FakeKiller {
                    pid,
                    timeline: self.timeline.clone(),
                    events: tx,
                },
            }),
            events: rx,
        })
    }
}

/// Stdin of a fake process; fails once the spawner's writes are broken.
struct FakeInput {
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
}

impl Write for FakeInput {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "process is gone",
            ));
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct FakeProcess {
    pid: u32,
    input: SharedWriter,
    resizes: Arc<Mutex<Vec<(u16, u16)>>>,
    killer: FakeKiller,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn writer(&self) -> SharedWriter {
        Arc::clone(&self.input)
    }

    fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()> {
        self.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    fn killer(&self) -> Box<dyn ProcessKiller> {
        Box::new(self.killer.clone())
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.killer.timeline.push(format!("drop:{}", self.pid));
    }
}

/// Records `kill:<pid>` and reports the process as exited, like a real PTY would.
#[derive(Clone)]
struct FakeKiller {
    pid: u32,
    timeline: Timeline,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl ProcessKiller for FakeKiller {
    fn kill(&mut self) -> std::io::Result<()> {
        self.timeline.push(format!("kill:{}", self.pid));
        let _ = self.events.send(ProcessEvent::Exited { exit_code: None });
        Ok(())
    }
}

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct MemoryStore {
    timeline: Timeline,
    sessions: Mutex<HashMap<String, TerminalSession>>,
    pub fail_puts: AtomicBool,
    pub fail_removes: AtomicBool,
}

impl MemoryStore {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            ..Self::default()
        }
    }

    /// Seeds a record without touching the timeline or `updated_at`.
    pub fn insert(&self, session: TerminalSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(id)
    }

    pub fn snapshot(&self, id: &str) -> Option<TerminalSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &str) -> anyhow::Result<Option<TerminalSession>> {
        Ok(self.snapshot(id))
    }

    fn put(&self, mut session: TerminalSession) -> anyhow::Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.timeline.push(format!("persist:{}", session.id));
        session.updated_at = Utc::now();
        self.insert(session);
        Ok(())
    }

    fn remove(&self, id: &str) -> anyhow::Result<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            anyhow::bail!("read-only file system");
        }
        self.timeline.push(format!("remove:{}", id));
        self.sessions.lock().unwrap().remove(id);
        Ok(())
    }

    fn list_by_date(
        &self,
        date: NaiveDate,
        project_path: &Path,
    ) -> anyhow::Result<Vec<TerminalSession>> {
        let mut sessions: Vec<TerminalSession> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.created_date() == date && s.project_path.as_deref() == Some(project_path))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    fn list_dates(&self, project_path: &Path) -> anyhow::Result<Vec<SessionDateSummary>> {
        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for session in self.sessions.lock().unwrap().values() {
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

#[derive(Default)]
pub struct RecordingNotifier {
    pub titles: Mutex<Vec<(String, String)>>,
    pub exits: Mutex<Vec<(String, Option<u32>)>>,
}

impl UiNotifier for RecordingNotifier {
    fn title_changed(&self, id: &str, title: &str) {
        self.titles
            .lock()
            .unwrap()
            .push((id.to_string(), title.to_string()));
    }

    fn terminal_exited(&self, id: &str, exit_code: Option<u32>) {
        self.exits.lock().unwrap().push((id.to_string(), exit_code));
    }
}

#[derive(Default)]
pub struct RecordingData {
    pub chunks: Mutex<Vec<(String, String)>>,
}

impl DataHandler for RecordingData {
    fn on_data(&self, terminal: &TerminalInfo, chunk: &str) {
        self.chunks
            .lock()
            .unwrap()
            .push((terminal.id.clone(), chunk.to_string()));
    }
}

pub struct TimelineCleanup(pub Timeline);

impl CleanupHandler for TimelineCleanup {
    fn on_cleanup(&self, id: &str) {
        self.0.push(format!("cleanup:{}", id));
    }
}

pub struct StaticProfile(pub HashMap<String, String>);

impl ProfileEnvProvider for StaticProfile {
    fn active_profile_env(&self) -> HashMap<String, String> {
        self.0.clone()
    }
}

/// Capture hook that only records requests; tests answer them by hand.
#[derive(Default)]
pub struct RecordingCapture {
    requests: Mutex<Vec<(CaptureRequest, CaptureReply)>>,
}

impl RecordingCapture {
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Answers request `index` with `session_id`, echoing its start tag.
    pub fn reply(&self, index: usize, session_id: &str) {
        let requests = self.requests.lock().unwrap();
        let (request, reply) = &requests[index];
        reply.deliver(CapturedSessionId {
            terminal_id: request.terminal_id.clone(),
            session_id: session_id.to_string(),
            start_time: request.start_time,
        });
    }
}

impl SessionIdCapture for RecordingCapture {
    fn capture(&self, request: CaptureRequest, reply: CaptureReply) {
        self.requests.lock().unwrap().push((request, reply));
    }
}

/// A manager wired to recording doubles.
pub struct Harness {
    pub manager: TerminalManager,
    pub timeline: Timeline,
    pub spawner: Arc<FakeSpawner>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub data: Arc<RecordingData>,
    pub capture: Arc<RecordingCapture>,
}

impl Harness {
    /// Config with a short settle delay.
    pub fn config() -> TerminalConfig {
        TerminalConfig {
            ai_resume_settle_delay_ms: 10,
            ..TerminalConfig::default()
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &TerminalConfig) -> Self {
        Self::build(config, HashMap::new())
    }

    pub fn build(config: &TerminalConfig, profile_env: HashMap<String, String>) -> Self {
        let timeline = Timeline::default();
        let spawner = Arc::new(FakeSpawner::new(timeline.clone()));
        let store = Arc::new(MemoryStore::new(timeline.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let data = Arc::new(RecordingData::default());
        let capture = Arc::new(RecordingCapture::default());

        let mut deps = TerminalDeps::new(spawner.clone(), store.clone());
        deps.notifier = notifier.clone();
        deps.data_handler = data.clone();
        deps.cleanup = Arc::new(TimelineCleanup(timeline.clone()));
        deps.capture = capture.clone();
        deps.profile = Arc::new(StaticProfile(profile_env));

        Self {
            manager: TerminalManager::new(deps, config),
            timeline,
            spawner,
            store,
            notifier,
            data,
            capture,
        }
    }

    pub fn pid(&self, id: &str) -> u32 {
        self.manager
            .get(id)
            .and_then(|info| info.pid)
            .expect("terminal should be live")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::with_config(&Self::config())
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
