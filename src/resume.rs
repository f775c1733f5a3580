//! Shell command lines that start or resume the AI assistant.

use std::path::Path;

/// Quotes `value` for a double-quoted shell argument.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') && cfg!(not(windows)) {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn clear_command() -> &'static str {
    if cfg!(windows) {
        "cls"
    } else {
        "clear"
    }
}

/// Line that clears the screen, enters `project_dir`, and resumes the AI session.
///
/// Without a known session id the assistant's interactive picker is opened.
/// The line ends with a carriage return so the shell executes it.
pub fn build_resume_command(
    ai_command: &str,
    project_dir: &Path,
    session_id: Option<&str>,
) -> String {
    let dir = quote(&project_dir.display().to_string());
    match session_id {
        Some(id) => format!(
            "{} && cd {} && {} --resume {}\r",
            clear_command(),
            dir,
            ai_command,
            quote(id)
        ),
        None => format!(
            "{} && cd {} && {} --resume\r",
            clear_command(),
            dir,
            ai_command
        ),
    }
}

/// Line that starts a fresh AI session in `cwd`.
pub fn build_invoke_command(ai_command: &str, cwd: &Path) -> String {
    format!(
        "cd {} && {}\r",
        quote(&cwd.display().to_string()),
        ai_command
    )
}
