mod commands;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use terminal_sessions::logging;
use terminal_sessions::paths;

#[derive(Parser)]
#[command(name = "termsess")]
#[command(about = "PTY terminal sessions that survive restarts, with AI session resume")]
#[command(version = env!("TERMINAL_SESSIONS_GIT_SHA"))]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Project the sessions belong to (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List dates that have stored sessions, newest first
    Dates {
        #[arg(long)]
        json: bool,
    },
    /// List sessions stored for a date
    List {
        /// Date as YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Open a new terminal in the project and attach to it
    Open {
        /// Terminal id (defaults to a fresh UUID)
        #[arg(long)]
        id: Option<String>,
        /// Start the AI assistant right away
        #[arg(long)]
        ai: bool,
    },
    /// Restore one stored session, or every session from a date, and attach
    Restore {
        /// Session id to restore; without it the whole date is restored
        id: Option<String>,
        /// Date as YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Resume AI assistant sessions that were active
        #[arg(long)]
        resume_ai: bool,
    },
    /// Delete a stored session
    Remove { id: String },
    /// Delete sessions not updated for a number of days
    Prune {
        /// Defaults to `session_retention_days` from the config
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match paths::debug_log_path() {
        Ok(log_path) => {
            if let Err(e) = logging::init_global(&log_path) {
                eprintln!("[termsess] Warning: Failed to initialize logging: {:#}", e);
            }
        }
        Err(e) => eprintln!("[termsess] Warning: No log directory: {:#}", e),
    }
    tracing::info!(version = env!("TERMINAL_SESSIONS_GIT_SHA"), "termsess starting");

    let project = match cli.project {
        Some(project) => project,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Command::Dates { json } => commands::dates(&project, json),
        Command::List { date, json } => commands::list(&project, date, json),
        Command::Open { id, ai } => commands::open(&project, id, ai).await,
        Command::Restore {
            id,
            date,
            resume_ai,
        } => commands::restore(&project, id, date, resume_ai).await,
        Command::Remove { id } => commands::remove(&id),
        Command::Prune { days } => commands::prune(days),
    }
}
