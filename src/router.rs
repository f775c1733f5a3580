//! Routes process events to the registry and to UI-facing collaborators.
//!
//! One router task runs per spawned process. Output is decoded as UTF-8 across
//! chunk boundaries, appended to the terminal's bounded scrollback, and
//! forwarded to the [`DataHandler`]. An exit removes the terminal and its
//! persisted record, unless a destroy already claimed it.

use crate::event_log::{LifecycleEvent, LifecycleEventLog};
use crate::registry::{TerminalInfo, TerminalRegistry};
use crate::session_store::{trim_to_tail, SessionStore};
use crate::spawner::ProcessEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notifications for the UI layer.
pub trait UiNotifier: Send + Sync {
    fn title_changed(&self, id: &str, title: &str);
    fn terminal_exited(&self, id: &str, exit_code: Option<u32>);
}

/// Receives decoded terminal output.
pub trait DataHandler: Send + Sync {
    fn on_data(&self, terminal: &TerminalInfo, chunk: &str);
}

/// Releases per-terminal resources held outside this crate.
pub trait CleanupHandler: Send + Sync {
    fn on_cleanup(&self, id: &str);
}

/// Handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl UiNotifier for Noop {
    fn title_changed(&self, _id: &str, _title: &str) {}
    fn terminal_exited(&self, _id: &str, _exit_code: Option<u32>) {}
}

impl DataHandler for Noop {
    fn on_data(&self, _terminal: &TerminalInfo, _chunk: &str) {}
}

impl CleanupHandler for Noop {
    fn on_cleanup(&self, _id: &str) {}
}

/// Incremental UTF-8 decoder that carries incomplete trailing sequences
/// over to the next chunk. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = after.get(len..).unwrap_or_default();
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let carry = rest.to_vec();
        self.pending = carry;
        out
    }
}

/// Collaborators shared by every router task.
pub struct RouterContext {
    pub registry: Arc<TerminalRegistry>,
    pub store: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn UiNotifier>,
    pub data_handler: Arc<dyn DataHandler>,
    pub event_log: Option<Arc<LifecycleEventLog>>,
    pub max_output_bytes: usize,
}

/// Spawns the task that drains `events` for spawn generation `instance` of `id`.
pub fn spawn_event_router(
    ctx: Arc<RouterContext>,
    id: String,
    instance: u64,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
) -> JoinHandle<()> {
    tokio::spawn(route_events(ctx, id, instance, events))
}

async fn route_events(
    ctx: Arc<RouterContext>,
    id: String,
    instance: u64,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
) {
    let mut decoder = Utf8Decoder::default();
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Output(bytes) => {
                let text = decoder.decode(&bytes);
                if !text.is_empty() {
                    ctx.handle_output(&id, instance, &text);
                }
            }
            ProcessEvent::Exited { exit_code } => {
                ctx.handle_exit(&id, instance, exit_code);
                return;
            }
        }
    }
    tracing::debug!(terminal_id = %id, instance, "Process event stream closed without exit");
}

impl RouterContext {
    fn handle_output(&self, id: &str, instance: u64, text: &str) {
        let info = self
            .registry
            .with_terminal(id, |terminal| {
                if terminal.instance != instance {
                    return None;
                }
                terminal.output_buffer.push_str(text);
                trim_to_tail(&mut terminal.output_buffer, self.max_output_bytes);
                Some(terminal.info())
            })
            .flatten();

        if let Some(info) = info {
            self.data_handler.on_data(&info, text);
        }
    }

    fn handle_exit(&self, id: &str, instance: u64, exit_code: Option<u32>) {
        let Some(terminal) = self.registry.remove_instance(id, instance) else {
            tracing::debug!(terminal_id = %id, instance, "Exit left to destroyer or stale");
            return;
        };
        drop(terminal);

        tracing::info!(terminal_id = %id, exit_code = ?exit_code, "Terminal process exited");
        if let Err(e) = self.store.remove(id) {
            tracing::warn!(terminal_id = %id, "Failed to remove persisted session: {:#}", e);
        }
        if let Some(log) = &self.event_log {
            log.lifecycle(LifecycleEvent::Exited {
                terminal_id: id.to_string(),
                exit_code,
            });
        }
        self.notifier.terminal_exited(id, exit_code);
    }
}
