//! Shell command execution with captured output.
//!
//! Every external tool the pipeline touches (git, tar, composer, npm, the
//! platform deploy CLI, hook commands) goes through a [`ProcessRunner`] so the
//! pipeline can be driven by a scripted runner in tests.

use serde::Serialize;
use std::path::Path;
use std::process::Command;

use crate::error::{CommandFailedDetails, Error, Result};

/// Captured result of one command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout.lines().filter(|line| !line.is_empty()).collect()
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Runs a shell command to completion.
///
/// `description` is the human label shown while the command runs.
pub trait ProcessRunner {
    fn execute(
        &self,
        command: &str,
        current_dir: Option<&Path>,
        description: Option<&str>,
    ) -> CommandOutput;
}

/// Runs commands through `sh -c` (or `cmd /C` on Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn execute(
        &self,
        command: &str,
        current_dir: Option<&Path>,
        description: Option<&str>,
    ) -> CommandOutput {
        if let Some(description) = description {
            log_status!("run", "{}", description);
        }

        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        };

        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        };

        if let Some(dir) = current_dir {
            cmd.current_dir(dir);
        }

        match cmd.output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput::failure(-1, format!("Command error: {}", e)),
        }
    }
}

/// Run a command and turn a non-zero exit into a process error.
///
/// The error message reads `Failed <description>` with the first letter
/// lower-cased, e.g. `Failed running composer install`.
pub fn run_checked(
    runner: &dyn ProcessRunner,
    command: &str,
    current_dir: Option<&Path>,
    description: &str,
) -> Result<CommandOutput> {
    let output = runner.execute(command, current_dir, Some(description));
    if output.success {
        return Ok(output);
    }

    Err(Error::command_failed(
        format!("Failed {}: {}", lower_first(description), output.error_text()),
        CommandFailedDetails {
            command: command.to_string(),
            description: Some(description.to_string()),
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        },
    ))
}

/// Name of the operator running the deploy, `unknown` when it cannot be determined.
pub fn current_user(runner: &dyn ProcessRunner) -> String {
    let output = runner.execute("whoami", None, None);
    if output.success {
        if let Some(name) = output.stdout_lines().first() {
            return name.trim().to_string();
        }
    }

    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_runner_captures_stdout() {
        let output = ShellRunner.execute("echo hello", None, None);
        assert!(output.success);
        assert_eq!(output.stdout_lines(), vec!["hello"]);
    }

    #[test]
    fn shell_runner_reports_exit_code() {
        let output = ShellRunner.execute("echo oops >&2; exit 3", None, None);
        assert!(!output.success);
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.error_text(), "oops");
    }

    #[test]
    fn shell_runner_honours_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = ShellRunner.execute("pwd", Some(dir.path()), None);
        assert!(output.success);
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn run_checked_maps_failure_to_process_error() {
        let err = run_checked(&ShellRunner, "exit 7", None, "Running npm install").unwrap_err();
        assert_eq!(err.code.as_str(), "process.command_failed");
        assert!(err.message.starts_with("Failed running npm install"));
        assert_eq!(err.details["exitCode"], 7);
        assert_eq!(err.details["command"], "exit 7");
    }

    #[test]
    fn error_text_falls_back_to_stdout() {
        let output = CommandOutput {
            stdout: "stdout content\n".to_string(),
            stderr: "  ".to_string(),
            success: false,
            exit_code: 1,
        };
        assert_eq!(output.error_text(), "stdout content");
    }

    #[test]
    fn current_user_is_never_empty() {
        assert!(!current_user(&ShellRunner).is_empty());
    }
}
