//! `termsess` subcommands.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use terminal_sessions::capture::ClaudeSessionWatcher;
use terminal_sessions::config::TerminalConfig;
use terminal_sessions::event_log::LifecycleEventLog;
use terminal_sessions::paths;
use terminal_sessions::profile::FileProfileProvider;
use terminal_sessions::registry::TerminalInfo;
use terminal_sessions::router::{DataHandler, UiNotifier};
use terminal_sessions::spawner::PtySpawner;
use terminal_sessions::{
    CreateOptions, FileSessionStore, RestoreOptions, SessionStore, TerminalDeps, TerminalError,
    TerminalManager,
};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Copies terminal output to stdout.
struct StdoutData;

impl DataHandler for StdoutData {
    fn on_data(&self, _terminal: &TerminalInfo, chunk: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }
}

/// Reports title changes on stderr and forwards exits to the attach loop.
struct ConsoleNotifier {
    exits: mpsc::UnboundedSender<String>,
}

impl UiNotifier for ConsoleNotifier {
    fn title_changed(&self, id: &str, title: &str) {
        eprintln!("\r\n[termsess] {} is now \"{}\"", id, title);
    }

    fn terminal_exited(&self, id: &str, exit_code: Option<u32>) {
        match exit_code {
            Some(code) => eprintln!("\r\n[termsess] {} exited with code {}", id, code),
            None => eprintln!("\r\n[termsess] {} exited", id),
        }
        let _ = self.exits.send(id.to_string());
    }
}

fn open_store(config: &TerminalConfig) -> Result<FileSessionStore> {
    Ok(FileSessionStore::open_default()?.with_max_output_bytes(config.max_output_buffer_bytes))
}

/// Wires the manager to the PTY spawner, file-backed collaborators, and the console.
fn build_manager(
    config: &TerminalConfig,
) -> Result<(TerminalManager, mpsc::UnboundedReceiver<String>)> {
    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    let mut deps = TerminalDeps::new(
        Arc::new(PtySpawner::new(config.shell.clone())),
        Arc::new(open_store(config)?),
    );
    deps.profile = Arc::new(FileProfileProvider::open_default()?);
    deps.notifier = Arc::new(ConsoleNotifier { exits: exit_tx });
    deps.data_handler = Arc::new(StdoutData);
    deps.capture = Arc::new(ClaudeSessionWatcher::open_default(&config.capture)?);
    match paths::lifecycle_log_path().and_then(|path| LifecycleEventLog::new(&path)) {
        Ok(log) => deps.event_log = Some(Arc::new(log)),
        Err(e) => tracing::warn!("Lifecycle event log disabled: {:#}", e),
    }

    Ok((TerminalManager::new(deps, config), exit_rx))
}

pub fn dates(project: &Path, json: bool) -> Result<()> {
    let config = TerminalConfig::load_default()?;
    let summaries = open_store(&config)?.list_dates(project)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No stored sessions for {}", project.display());
    }
    for summary in summaries {
        println!("{}  {} session(s)", summary.date, summary.session_count);
    }
    Ok(())
}

pub fn list(project: &Path, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let config = TerminalConfig::load_default()?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let sessions = open_store(&config)?.list_by_date(date, project)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions stored for {} on {}", project.display(), date);
    }
    for session in sessions {
        let ai = match (session.is_ai_mode, session.ai_session_id.as_deref()) {
            (true, Some(id)) => format!("  [ai {}]", id),
            (true, None) => "  [ai]".to_string(),
            (false, _) => String::new(),
        };
        println!(
            "{}  {}  {}{}  {}",
            session.id,
            session.created_at.with_timezone(&Local).format("%H:%M"),
            session.title,
            ai,
            session.cwd.display()
        );
    }
    Ok(())
}

pub async fn open(project: &Path, id: Option<String>, ai: bool) -> Result<()> {
    let config = TerminalConfig::load_default()?;
    let (manager, exits) = build_manager(&config)?;
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    manager
        .create(CreateOptions {
            id: id.clone(),
            cwd: Some(project.to_path_buf()),
            project_path: Some(project.to_path_buf()),
            ..CreateOptions::default()
        })
        .await
        .with_context(|| format!("Failed to open terminal {}", id))?;
    if ai {
        manager.invoke_ai(&id).await?;
    }
    eprintln!("[termsess] Attached to {} (Ctrl-C to detach)", id);

    attach(&manager, &id, exits).await
}

pub async fn restore(
    project: &Path,
    id: Option<String>,
    date: Option<NaiveDate>,
    resume_ai: bool,
) -> Result<()> {
    let config = TerminalConfig::load_default()?;
    let (manager, exits) = build_manager(&config)?;
    let options = RestoreOptions {
        resume_ai_session: resume_ai,
        ..RestoreOptions::default()
    };

    let target = match id {
        Some(id) => {
            let session = open_store(&config)?
                .get(&id)?
                .with_context(|| format!("No stored session {}", id))?;
            let outcome = manager.restore(&session, options).await?;
            print!("{}", outcome.output_buffer);
            id
        }
        None => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let report = manager
                .restore_sessions_from_date(date, project, options)
                .await?;
            for status in &report.sessions {
                match &status.error {
                    None => eprintln!("[termsess] restored {}", status.id),
                    Some(e) => eprintln!("[termsess] failed {}: {}", status.id, e),
                }
            }
            eprintln!(
                "[termsess] {} restored, {} failed",
                report.restored, report.failed
            );
            match manager.list().pop() {
                Some(newest) => newest.id,
                None => return Ok(()),
            }
        }
    };
    eprintln!("[termsess] Attached to {} (Ctrl-C to detach)", target);

    attach(&manager, &target, exits).await
}

/// Forwards stdin lines to `id` until it exits, stdin closes, or Ctrl-C.
/// Every terminal is persisted and torn down on the way out.
async fn attach(
    manager: &TerminalManager,
    id: &str,
    mut exits: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    manager.start_autosave();
    let forwarded = forward_input(manager, id, &mut exits).await;

    let count = manager.destroy_all().await;
    tracing::info!(count, "Detached");
    forwarded
}

async fn forward_input(
    manager: &TerminalManager,
    id: &str,
    exits: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    return Ok(());
                };
                match manager.write(id, format!("{}\r", line).as_bytes()).await {
                    Ok(()) => {}
                    Err(TerminalError::NotFound { .. }) => return Ok(()),
                    Err(e) => tracing::warn!(terminal_id = %id, "Failed to forward input: {}", e),
                }
            }
            exited = exits.recv() => {
                if exited.is_none() || exited.as_deref() == Some(id) {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\r\n[termsess] Detaching");
                return Ok(());
            }
        }
    }
}

pub fn remove(id: &str) -> Result<()> {
    let config = TerminalConfig::load_default()?;
    open_store(&config)?.remove(id)?;
    println!("Removed {}", id);
    Ok(())
}

pub fn prune(days: Option<u32>) -> Result<()> {
    let config = TerminalConfig::load_default()?;
    let days = days.unwrap_or(config.session_retention_days);
    let removed = open_store(&config)?.cleanup_older_than(days)?;
    println!("Removed {} session(s) older than {} days", removed.len(), days);
    for id in removed {
        println!("  {}", id);
    }
    Ok(())
}
