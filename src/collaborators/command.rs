//! External command helpers shared by the git and pnpm collaborators.

use std::path::Path;
use std::process::{Command, ExitStatus};

#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("failed to run {command} (tried {tried}); ensure it is installed and on PATH")]
    NotFound { command: String, tried: String },

    #[error("{command} exited with {status}\nstdout: {stdout}\nstderr: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
}

impl CommandError {
    pub(crate) fn stderr(&self) -> &str {
        match self {
            CommandError::Failed { stderr, .. } => stderr,
            CommandError::NotFound { .. } => "",
        }
    }
}

/// Names to try for `command`. Windows ships node tooling as `.cmd` shims.
#[cfg(windows)]
pub(crate) fn command_candidates(command: &str) -> Vec<String> {
    vec![
        format!("{command}.cmd"),
        format!("{command}.exe"),
        command.to_string(),
    ]
}

#[cfg(not(windows))]
pub(crate) fn command_candidates(command: &str) -> Vec<String> {
    vec![command.to_string()]
}

#[cfg(windows)]
pub(crate) fn build_command(program: &str) -> Command {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(windows))]
pub(crate) fn build_command(program: &str) -> Command {
    Command::new(program)
}

/// Run `command args...` to completion and return its stdout.
///
/// Candidates that fail to spawn are skipped; the first one that starts decides the result.
pub(crate) fn run_command(
    command: &str,
    args: &[&str],
    working_dir: Option<&Path>,
) -> Result<String, CommandError> {
    let mut tried = Vec::new();

    for candidate in command_candidates(command) {
        let mut cmd = build_command(&candidate);
        cmd.args(args);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        tracing::debug!(command = %candidate, ?args, "running external command");

        match cmd.output() {
            Ok(output) if output.status.success() => {
                return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
            }
            Ok(output) => {
                return Err(CommandError::Failed {
                    command: format!("{candidate} {}", args.join(" ")),
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Err(e) => tried.push(format!("{candidate}: {e}")),
        }
    }

    Err(CommandError::NotFound {
        command: command.to_string(),
        tried: tried.join(", "),
    })
}
