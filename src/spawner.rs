//! PTY process spawning.
//!
//! [`PtySpawner`] launches the user's shell attached to a pseudo-terminal using
//! `portable-pty`. Output is streamed by a dedicated reader thread into an
//! unbounded tokio channel, followed by a single [`ProcessEvent::Exited`] once
//! the PTY reaches EOF and the child has been reaped.

use crate::error::SpawnError;
use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Bytes read from the PTY per chunk.
const READ_CHUNK_SIZE: usize = 4096;

/// Parameters for launching one terminal process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    /// Merged over the inherited environment; entries here win.
    pub env: HashMap<String, String>,
}

/// Events produced by a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(Vec<u8>),
    Exited { exit_code: Option<u32> },
}

/// Terminates a process. Obtained from [`ProcessHandle::killer`] so a kill can
/// run without holding the registry lock.
pub trait ProcessKiller: Send {
    fn kill(&mut self) -> std::io::Result<()>;
}

/// Process stdin, shared so writes can block without holding the registry lock.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes and flushes `data`. Blocks until the child accepts the input.
pub fn write_input(writer: &SharedWriter, data: &[u8]) -> std::io::Result<()> {
    let mut writer = writer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    writer.write_all(data)?;
    writer.flush()
}

/// Owned handle to a live process.
///
/// Dropping the handle terminates the process.
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;
    fn writer(&self) -> SharedWriter;
    fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()>;
    fn killer(&self) -> Box<dyn ProcessKiller>;
}

/// A freshly spawned process and its event stream.
pub struct SpawnedProcess {
    pub handle: Box<dyn ProcessHandle>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.handle.pid())
            .finish_non_exhaustive()
    }
}

/// Launches terminal processes.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawns a process. On error no process is left running.
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess, SpawnError>;
}

/// Spawns the user's shell on a native PTY.
#[derive(Debug, Clone, Default)]
pub struct PtySpawner {
    shell: Option<String>,
}

impl PtySpawner {
    /// `shell` overrides `$SHELL` and the platform default.
    pub fn new(shell: Option<String>) -> Self {
        Self { shell }
    }

    fn shell_name(&self) -> String {
        if let Some(shell) = self.shell.as_ref().filter(|s| !s.trim().is_empty()) {
            return shell.clone();
        }
        default_shell()
    }
}

#[cfg(windows)]
fn default_shell() -> String {
    if which::which("powershell.exe").is_ok() {
        "powershell.exe".to_string()
    } else {
        "cmd.exe".to_string()
    }
}

#[cfg(target_os = "macos")]
fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/zsh".to_string())
}

#[cfg(all(unix, not(target_os = "macos")))]
fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
}

/// Checks everything that can be rejected before touching the OS.
fn validate_request(request: &SpawnRequest) -> Result<(), SpawnError> {
    if !request.cwd.is_dir() {
        return Err(SpawnError::InvalidWorkingDir {
            path: request.cwd.clone(),
        });
    }
    if request.cols == 0 || request.rows == 0 {
        return Err(SpawnError::InvalidGeometry {
            cols: request.cols,
            rows: request.rows,
        });
    }
    Ok(())
}

fn pty_error(error: impl std::fmt::Display) -> SpawnError {
    SpawnError::Pty {
        message: error.to_string(),
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

#[async_trait]
impl ProcessSpawner for PtySpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess, SpawnError> {
        validate_request(&request)?;
        let shell_name = self.shell_name();
        let shell = which::which(&shell_name).map_err(|_| SpawnError::ShellNotFound {
            shell: shell_name.clone(),
        })?;

        match tokio::task::spawn_blocking(move || spawn_pty(shell, request)).await {
            Ok(result) => result,
            Err(e) => Err(pty_error(format!("spawn task failed: {}", e))),
        }
    }
}

fn spawn_pty(shell: PathBuf, request: SpawnRequest) -> Result<SpawnedProcess, SpawnError> {
    let pair = native_pty_system()
        .openpty(pty_size(request.cols, request.rows))
        .map_err(pty_error)?;

    let mut cmd = CommandBuilder::new(&shell);
    cmd.cwd(&request.cwd);
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    for (key, value) in &request.env {
        cmd.env(key, value);
    }

    let mut child = pair.slave.spawn_command(cmd).map_err(pty_error)?;
    drop(pair.slave);

    let killer = child.clone_killer();
    let pid = child.process_id();

    let setup = pair
        .master
        .try_clone_reader()
        .and_then(|reader| pair.master.take_writer().map(|writer| (reader, writer)));
    let (reader, writer) = match setup {
        Ok(io) => io,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(pty_error(e));
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let thread_name = format!("pty-reader-{}", pid.unwrap_or_default());
    let spawned = std::thread::Builder::new().name(thread_name).spawn(move || {
        read_until_exit(reader, &tx);
        let exit_code = child.wait().ok().map(|status| status.exit_code());
        let _ = tx.send(ProcessEvent::Exited { exit_code });
    });
    if let Err(e) = spawned {
        let mut killer = killer;
        let _ = killer.kill();
        return Err(pty_error(e));
    }

    tracing::debug!(pid = ?pid, shell = %shell.display(), cwd = %request.cwd.display(), "Spawned PTY process");

    Ok(SpawnedProcess {
        handle: Box::new(PtyProcess {
            master: pair.master,
            writer: Arc::new(Mutex::new(writer)),
            killer: PtyKiller(killer),
            pid,
        }),
        events: rx,
    })
}

fn read_until_exit(mut reader: Box<dyn Read + Send>, tx: &mpsc::UnboundedSender<ProcessEvent>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                // Keep draining even when nobody listens so the child never blocks on a full PTY.
                let _ = tx.send(ProcessEvent::Output(buf[..n].to_vec()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

struct PtyKiller(Box<dyn ChildKiller + Send + Sync>);

impl ProcessKiller for PtyKiller {
    fn kill(&mut self) -> std::io::Result<()> {
        self.0.kill()
    }
}

/// A shell running on a native PTY.
struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: SharedWriter,
    killer: PtyKiller,
    pid: Option<u32>,
}

impl ProcessHandle for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn writer(&self) -> SharedWriter {
        Arc::clone(&self.writer)
    }

    fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()> {
        if cols == 0 || rows == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid terminal size {}x{}", cols, rows),
            ));
        }
        self.master
            .resize(pty_size(cols, rows))
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    fn killer(&self) -> Box<dyn ProcessKiller> {
        Box::new(PtyKiller(self.killer.0.clone_killer()))
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        // Already-exited children report an error here.
        let _ = self.killer.kill();
    }
}
