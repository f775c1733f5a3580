//! PTY-backed terminal sessions that survive application restarts.
//!
//! The crate is organised leaves-first:
//! - [`spawner`] launches shells attached to pseudo-terminals
//! - [`session_store`] persists [`session_store::TerminalSession`] records
//! - [`registry`] owns the live terminals and their process handles
//! - [`router`] turns process output/exit events into UI notifications
//! - [`lifecycle`] orchestrates create / restore / destroy and bulk restore

pub mod capture;
pub mod config;
pub mod error;
pub mod event_log;
pub mod lifecycle;
pub mod logging;
pub mod paths;
pub mod profile;
pub mod registry;
pub mod resume;
pub mod router;
pub mod session_store;
pub mod spawner;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{SpawnError, TerminalError, TerminalResult};
pub use lifecycle::{
    BulkRestoreReport, CreateOptions, CreateOutcome, RestoreOptions, RestoreOutcome,
    SessionRestoreStatus, TerminalDeps, TerminalManager,
};
pub use session_store::{FileSessionStore, SessionStore, TerminalSession};
