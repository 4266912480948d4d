//! Checkpoint hooks.
//!
//! Hooks are shell commands that run at named points of a deployment run.
//! Before execution each command has its `{{environment}}`, `{{directory}}`
//! and `{{branch}}` placeholders substituted; nothing else is interpolated.
//!
//! Commands run from the invoking process's current directory. The working
//! tree is reachable through `{{directory}}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::environment::Environment;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::process::ProcessRunner;
use crate::utils::template::{self, TemplateVars};

/// Named checkpoint in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    BeforeAll,
    BeforeDeploy,
    AfterSuccess,
    AfterFailed,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::BeforeAll => "before_all",
            HookPoint::BeforeDeploy => "before_deploy",
            HookPoint::AfterSuccess => "after_success",
            HookPoint::AfterFailed => "after_failed",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command templates per checkpoint, as read from `deploy.hooks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCommands {
    #[serde(default)]
    pub before_all: Vec<String>,
    #[serde(default)]
    pub before_deploy: Vec<String>,
    #[serde(default)]
    pub after_success: Vec<String>,
    #[serde(default)]
    pub after_failed: Vec<String>,
}

impl HookCommands {
    pub fn commands(&self, point: HookPoint) -> &[String] {
        match point {
            HookPoint::BeforeAll => &self.before_all,
            HookPoint::BeforeDeploy => &self.before_deploy,
            HookPoint::AfterSuccess => &self.after_success,
            HookPoint::AfterFailed => &self.after_failed,
        }
    }
}

/// Run-time values substituted into hook templates.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub environment: Environment,
    pub directory: &'a Path,
    pub branch: &'a str,
}

impl<'a> HookContext<'a> {
    pub fn new(environment: Environment, directory: &'a Path, branch: &'a str) -> Self {
        Self {
            environment,
            directory,
            branch,
        }
    }

    /// Substitute the three known placeholders. Unknown `{{...}}` stay verbatim.
    pub fn render(&self, command: &str) -> String {
        let directory = self.directory.to_string_lossy();
        template::render(
            command,
            &[
                (TemplateVars::ENVIRONMENT, self.environment.as_str()),
                (TemplateVars::DIRECTORY, directory.as_ref()),
                (TemplateVars::BRANCH, self.branch),
            ],
        )
    }
}

/// Result of running a single hook command.
#[derive(Debug, Clone, Serialize)]
pub struct HookCommandResult {
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Result of running all hooks for a checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HookRunResult {
    pub point: HookPoint,
    pub commands: Vec<HookCommandResult>,
    pub all_succeeded: bool,
}

/// Whether hook failures abort the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFailureMode {
    /// Non-zero exit stops remaining hooks and returns an error.
    Fatal,
    /// Failures are recorded but execution continues.
    NonFatal,
}

pub struct HookRunner<'a> {
    runner: &'a dyn ProcessRunner,
    hooks: &'a HookCommands,
}

impl<'a> HookRunner<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, hooks: &'a HookCommands) -> Self {
        Self { runner, hooks }
    }

    /// Run every command configured for `point`, in list order.
    pub fn run(
        &self,
        point: HookPoint,
        context: &HookContext<'_>,
        failure_mode: HookFailureMode,
    ) -> Result<HookRunResult> {
        let templates = self.hooks.commands(point);
        if templates.is_empty() {
            log_status!("hooks", "Skipped {} hooks", point);
        }

        let commands: Vec<String> = templates.iter().map(|c| context.render(c)).collect();
        run_commands(self.runner, &commands, point, failure_mode)
    }
}

/// Run already-rendered commands for a checkpoint.
pub fn run_commands(
    runner: &dyn ProcessRunner,
    commands: &[String],
    point: HookPoint,
    failure_mode: HookFailureMode,
) -> Result<HookRunResult> {
    let mut results = Vec::new();
    let mut all_succeeded = true;

    for command in commands {
        let description = format!("Running '{}'", command);
        let output = runner.execute(command, None, Some(&description));

        let result = HookCommandResult {
            command: command.clone(),
            success: output.success,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
        };
        results.push(result);

        if output.success {
            continue;
        }

        all_succeeded = false;
        match failure_mode {
            HookFailureMode::Fatal => {
                return Err(Error::command_failed(
                    format!(
                        "Hook '{}' command failed: {}\n{}",
                        point,
                        command,
                        output.error_text()
                    ),
                    CommandFailedDetails {
                        command: command.clone(),
                        description: Some(format!("{} hook", point)),
                        exit_code: output.exit_code,
                        stdout: output.stdout,
                        stderr: output.stderr,
                    },
                ));
            }
            HookFailureMode::NonFatal => {
                log_status!(
                    "hooks",
                    "Hook '{}' command failed (continuing): {}",
                    point,
                    command
                );
            }
        }
    }

    Ok(HookRunResult {
        point,
        commands: results,
        all_succeeded,
    })
}
