//! The deployment sequencer.
//!
//! [`Pipeline::run`] drives one deployment through a fixed order of steps.
//! The first failing step halts the run: a `Failed` notification goes out for
//! the active stage, the working directory is removed and the failure is
//! reported in the returned [`PipelineOutcome`]. Only configuration problems
//! detected before any side effect are returned as `Err`.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::cache::{CacheKind, CacheManager, CacheState};
use crate::config::DeployConfig;
use crate::confirm::{ConfirmationPrompt, Confirmer};
use crate::dependencies::{self, InstallOutcome};
use crate::environment::Environment;
use crate::error::{Error, ErrorCode, Result};
use crate::git::{self, GitWorkTree};
use crate::hooks::{HookContext, HookFailureMode, HookPoint, HookRunner};
use crate::manifest::Manifest;
use crate::notify::{EventType, NotificationEvent, Notifier, Stage};
use crate::process::{self, ProcessRunner};
use crate::utils::io;
use crate::version::{StampedVersion, VersionStamper};
use crate::workspace::WorkingDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Confirm,
    PrepareWorkspace,
    HooksBeforeAll,
    FetchSource,
    UpdateSubmodules,
    CopyPersistentFiles,
    LoadManifest,
    ComposerInstall,
    NpmInstall,
    StampVersion,
    HooksBeforeDeploy,
    Deploy,
    HooksAfterFailed,
    Push,
    HooksAfterSuccess,
    Cleanup,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Confirm => "confirm",
            PipelineStep::PrepareWorkspace => "prepare_workspace",
            PipelineStep::HooksBeforeAll => "hooks_before_all",
            PipelineStep::FetchSource => "fetch_source",
            PipelineStep::UpdateSubmodules => "update_submodules",
            PipelineStep::CopyPersistentFiles => "copy_persistent_files",
            PipelineStep::LoadManifest => "load_manifest",
            PipelineStep::ComposerInstall => "composer_install",
            PipelineStep::NpmInstall => "npm_install",
            PipelineStep::StampVersion => "stamp_version",
            PipelineStep::HooksBeforeDeploy => "hooks_before_deploy",
            PipelineStep::Deploy => "deploy",
            PipelineStep::HooksAfterFailed => "hooks_after_failed",
            PipelineStep::Push => "push",
            PipelineStep::HooksAfterSuccess => "hooks_after_success",
            PipelineStep::Cleanup => "cleanup",
        }
    }

    /// Notification stage the step belongs to.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineStep::Confirm | PipelineStep::Cleanup => None,
            PipelineStep::PrepareWorkspace
            | PipelineStep::HooksBeforeAll
            | PipelineStep::FetchSource
            | PipelineStep::UpdateSubmodules
            | PipelineStep::CopyPersistentFiles
            | PipelineStep::LoadManifest
            | PipelineStep::ComposerInstall
            | PipelineStep::NpmInstall
            | PipelineStep::StampVersion => Some(Stage::Building),
            PipelineStep::HooksBeforeDeploy
            | PipelineStep::Deploy
            | PipelineStep::HooksAfterFailed
            | PipelineStep::Push
            | PipelineStep::HooksAfterSuccess => Some(Stage::Deploying),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: PipelineStep,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Why a run failed: the step, the error code and the captured diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub step: PipelineStep,
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
}

impl FailureReport {
    fn new(step: PipelineStep, error: &Error) -> Self {
        Self {
            step,
            code: error.code,
            message: error.message.clone(),
            details: error.details.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub environment: Environment,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<StampedVersion>,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OutcomeStatus::Cancelled
    }

    pub fn step(&self, step: PipelineStep) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.step == step)
    }
}

/// One deployment: where to and with what configuration.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub environment: Environment,
    pub config: DeployConfig,
}

impl DeploymentRequest {
    pub fn new(environment: Environment, config: DeployConfig) -> Self {
        Self {
            environment,
            config,
        }
    }
}

type StepFailure = (PipelineStep, Error);

/// Ordered record of what each step did.
#[derive(Default)]
struct StepLog {
    steps: Vec<StepResult>,
}

impl StepLog {
    fn push(
        &mut self,
        step: PipelineStep,
        status: StepStatus,
        data: Option<Value>,
        error: Option<String>,
    ) {
        self.steps.push(StepResult {
            step,
            status,
            data,
            error,
        });
    }

    /// Record the outcome of `step`, keeping its value as step data.
    fn record<T: Serialize>(
        &mut self,
        step: PipelineStep,
        result: Result<T>,
    ) -> std::result::Result<T, StepFailure> {
        self.record_with(step, result, |value| {
            serde_json::to_value(value).ok().filter(|v| !v.is_null())
        })
    }

    fn record_with<T>(
        &mut self,
        step: PipelineStep,
        result: Result<T>,
        data: impl FnOnce(&T) -> Option<Value>,
    ) -> std::result::Result<T, StepFailure> {
        match result {
            Ok(value) => {
                let data = data(&value);
                self.push(step, StepStatus::Succeeded, data, None);
                Ok(value)
            }
            Err(error) => {
                log_status!("deploy", "{} failed: {}", step.as_str(), error.message);
                self.push(step, StepStatus::Failed, None, Some(error.message.clone()));
                Err((step, error))
            }
        }
    }

    fn skip(&mut self, step: PipelineStep, reason: &str) {
        log_status!("deploy", "Skipped {}: {}", step.as_str(), reason);
        self.push(
            step,
            StepStatus::Skipped,
            Some(serde_json::json!({ "reason": reason })),
            None,
        );
    }

    fn mark_last_skipped(&mut self) {
        if let Some(last) = self.steps.last_mut() {
            last.status = StepStatus::Skipped;
        }
    }
}

pub struct Pipeline<'a> {
    runner: &'a dyn ProcessRunner,
    confirmer: &'a dyn Confirmer,
    notifier: &'a dyn Notifier,
    archive_dir: PathBuf,
    workspace_root: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        confirmer: &'a dyn Confirmer,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            runner,
            confirmer,
            notifier,
            archive_dir: PathBuf::from("."),
            workspace_root: None,
        }
    }

    /// Directory holding the cache archives. Defaults to the current directory.
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    /// Parent of the per-run working directory. Defaults to the system temp dir.
    pub fn with_workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(dir.into());
        self
    }

    pub fn run(&self, request: &DeploymentRequest) -> Result<PipelineOutcome> {
        request.config.validate()?;

        let environment = request.environment;
        let config = &request.config;
        let mut log = StepLog::default();
        let mut outcome = PipelineOutcome {
            run_id: uuid::Uuid::new_v4().to_string(),
            environment,
            status: OutcomeStatus::Cancelled,
            working_dir: None,
            version: None,
            steps: Vec::new(),
            error: None,
        };

        let operator = process::current_user(self.runner);
        let prompt = ConfirmationPrompt::new(&config.name, environment, &operator);
        if !self.confirmer.confirm(&prompt) {
            log_status!("deploy", "Deploy aborted");
            log.push(PipelineStep::Confirm, StepStatus::Cancelled, None, None);
            log.skip(PipelineStep::Cleanup, "no working directory was created");
            outcome.steps = log.steps;
            return Ok(outcome);
        }
        log.push(
            PipelineStep::Confirm,
            StepStatus::Succeeded,
            serde_json::to_value(&prompt).ok(),
            None,
        );

        self.notify(Stage::Building, EventType::Started, request, None);

        let workspace = match log.record_with(
            PipelineStep::PrepareWorkspace,
            WorkingDirectory::create(self.workspace_root.as_deref()),
            |w| {
                log_status!("deploy", "Working dir: {}", w.display());
                Some(serde_json::json!({ "path": w.display() }))
            },
        ) {
            Ok(workspace) => workspace,
            Err((step, error)) => {
                self.fail(&mut outcome, request, step, &error);
                log.skip(PipelineStep::Cleanup, "no working directory was created");
                outcome.steps = log.steps;
                return Ok(outcome);
            }
        };
        outcome.working_dir = Some(workspace.display());

        match self.execute(&mut log, request, workspace.path(), &operator, &mut outcome.version) {
            Ok(()) => {
                outcome.status = OutcomeStatus::Succeeded;
                log_status!("deploy", "Successfully deployed {} to {}", config.name, environment);
            }
            Err((step, error)) => self.fail(&mut outcome, request, step, &error),
        }

        match workspace.close() {
            Ok(()) => log.push(PipelineStep::Cleanup, StepStatus::Succeeded, None, None),
            Err(error) => {
                log_status!("cleanup", "{}: {}", error.message, error.details);
                log.push(PipelineStep::Cleanup, StepStatus::Failed, None, Some(error.message));
            }
        }

        outcome.steps = log.steps;
        Ok(outcome)
    }

    fn execute(
        &self,
        log: &mut StepLog,
        request: &DeploymentRequest,
        dir: &Path,
        operator: &str,
        version: &mut Option<StampedVersion>,
    ) -> std::result::Result<(), StepFailure> {
        let environment = request.environment;
        let config = &request.config;
        let context = HookContext::new(environment, dir, &config.branch);
        let hooks = HookRunner::new(self.runner, &config.hooks);
        let cache = CacheManager::new(self.runner, &self.archive_dir, config.caching);

        log.record(
            PipelineStep::HooksBeforeAll,
            hooks.run(HookPoint::BeforeAll, &context, HookFailureMode::Fatal),
        )?;

        log.record(PipelineStep::FetchSource, self.fetch_source(&cache, config, dir))?;

        if config.submodules {
            log.record(
                PipelineStep::UpdateSubmodules,
                GitWorkTree::new(self.runner, dir).update_submodules(),
            )?;
        } else {
            log.skip(PipelineStep::UpdateSubmodules, "submodules are disabled");
        }

        if config.persistent.is_empty() {
            log.skip(PipelineStep::CopyPersistentFiles, "no persistent files configured");
        } else {
            log.record(
                PipelineStep::CopyPersistentFiles,
                copy_persistent_files(config, dir),
            )?;
        }

        let mut manifest = log.record_with(PipelineStep::LoadManifest, Manifest::load(dir), |m| {
            Some(serde_json::json!({
                "application": m.application().ok(),
                "version": m.version().ok(),
            }))
        })?;

        let composer = log.record(
            PipelineStep::ComposerInstall,
            dependencies::composer_install(self.runner, &cache, environment, dir),
        )?;
        if composer == InstallOutcome::Skipped {
            log.mark_last_skipped();
        }

        let npm = log.record(
            PipelineStep::NpmInstall,
            dependencies::npm_install(self.runner, &cache, environment, dir),
        )?;
        if npm == InstallOutcome::Skipped {
            log.mark_last_skipped();
        }

        let stamped = log.record(
            PipelineStep::StampVersion,
            VersionStamper::new(self.runner).stamp(
                environment,
                dir,
                &mut manifest,
                &config.branch,
                operator,
            ),
        )?;
        *version = Some(stamped);

        self.notify(Stage::Building, EventType::Succeeded, request, None);
        self.notify(Stage::Deploying, EventType::Started, request, None);

        log.record(
            PipelineStep::HooksBeforeDeploy,
            hooks.run(HookPoint::BeforeDeploy, &context, HookFailureMode::Fatal),
        )?;

        let deploy_command = context.render(&config.deploy_command);
        let deployed =
            process::run_checked(self.runner, &deploy_command, None, "Deploying the app");
        if let Err(error) = deployed {
            log.record::<()>(PipelineStep::Deploy, Err(error.clone())).ok();
            let after = hooks.run(HookPoint::AfterFailed, &context, HookFailureMode::NonFatal);
            if let Err((_, hook_error)) = log.record(PipelineStep::HooksAfterFailed, after) {
                log_status!("hooks", "after_failed hooks errored: {}", hook_error.message);
            }
            return Err((PipelineStep::Deploy, error));
        }
        log.record(PipelineStep::Deploy, Ok(serde_json::json!({ "command": deploy_command })))?;

        if environment.is_production() {
            let git = GitWorkTree::new(self.runner, dir);
            log.record(
                PipelineStep::Push,
                git.pull_rebase().and_then(|_| git.push_follow_tags()),
            )?;
        } else {
            log.skip(PipelineStep::Push, "only production releases are pushed");
        }

        log.record(
            PipelineStep::HooksAfterSuccess,
            hooks.run(HookPoint::AfterSuccess, &context, HookFailureMode::Fatal),
        )?;

        self.notify(Stage::Deploying, EventType::Succeeded, request, None);
        Ok(())
    }

    /// Clone, or bring a restored checkout up to date with the remote branch.
    fn fetch_source(
        &self,
        cache: &CacheManager<'_>,
        config: &DeployConfig,
        dir: &Path,
    ) -> Result<CacheState> {
        cache.restore_or_build(CacheKind::Source, dir, |state| {
            let tree = GitWorkTree::new(self.runner, dir);
            match state {
                CacheState::Restored => {
                    cache.verify_origin(tree.origin_url().as_deref(), &config.repository)?;
                    tree.checkout(&config.branch)?;
                    tree.fetch_origin()?;
                    tree.reset_to_origin(&config.branch)
                }
                CacheState::Fresh | CacheState::Disabled => {
                    git::clone_repo(self.runner, &config.repository, dir)?;
                    tree.checkout(&config.branch)
                }
            }
        })
    }

    fn fail(
        &self,
        outcome: &mut PipelineOutcome,
        request: &DeploymentRequest,
        step: PipelineStep,
        error: &Error,
    ) {
        let stage = step.stage().unwrap_or(Stage::Building);
        self.notify(stage, EventType::Failed, request, Some(error.message.clone()));
        outcome.status = OutcomeStatus::Failed;
        outcome.error = Some(FailureReport::new(step, error));
    }

    fn notify(
        &self,
        stage: Stage,
        event: EventType,
        request: &DeploymentRequest,
        details: Option<String>,
    ) -> bool {
        let mut notification =
            NotificationEvent::new(stage, event, &request.config.name, request.environment);
        if let Some(details) = details {
            notification = notification.with_details(details);
        }
        self.notifier.notify(&notification)
    }
}

/// Copy operator-side files into the working tree. Returns the destinations.
fn copy_persistent_files(config: &DeployConfig, dir: &Path) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    for file in &config.persistent {
        let source = shellexpand::tilde(&file.source).to_string();
        let source = Path::new(&source);
        if !source.is_file() {
            return Err(Error::config_invalid_value(
                format!("deploy.persistent.{}", file.source),
                Some(file.source.clone()),
                "persistent file does not exist",
            ));
        }
        io::copy_file(
            source,
            &dir.join(&file.destination),
            &format!("copy persistent file {}", file.source),
        )?;
        copied.push(file.destination.clone());
    }
    log_status!("deploy", "Copied {} persistent file(s)", copied.len());
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_map_to_notification_stages() {
        assert_eq!(PipelineStep::Confirm.stage(), None);
        assert_eq!(PipelineStep::HooksBeforeAll.stage(), Some(Stage::Building));
        assert_eq!(PipelineStep::StampVersion.stage(), Some(Stage::Building));
        assert_eq!(PipelineStep::HooksBeforeDeploy.stage(), Some(Stage::Deploying));
        assert_eq!(PipelineStep::Push.stage(), Some(Stage::Deploying));
    }

    #[test]
    fn step_log_records_data_and_failures() {
        let mut log = StepLog::default();
        let value = log
            .record(PipelineStep::LoadManifest, Ok(serde_json::json!({ "application": "shop" })))
            .unwrap();
        assert_eq!(value["application"], "shop");

        let err = log
            .record::<()>(PipelineStep::Deploy, Err(Error::internal_unexpected("boom")))
            .unwrap_err();
        assert_eq!(err.0, PipelineStep::Deploy);

        assert_eq!(log.steps[0].status, StepStatus::Succeeded);
        assert_eq!(log.steps[0].data.as_ref().unwrap()["application"], "shop");
        assert_eq!(log.steps[1].status, StepStatus::Failed);
        assert_eq!(log.steps[1].error.as_deref(), Some("Unexpected error"));
    }

    #[test]
    fn unit_results_carry_no_data() {
        let mut log = StepLog::default();
        log.record(PipelineStep::Push, Ok(())).unwrap();
        assert!(log.steps[0].data.is_none());
    }

    #[test]
    fn persistent_sources_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::new("shop", "repo.git");
        config.persistent.push(crate::config::PersistentFile {
            source: "/nonexistent/secret.json".to_string(),
            destination: "secret.json".to_string(),
        });
        let err = copy_persistent_files(&config, dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn persistent_files_land_in_working_tree() {
        let source_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("app.yaml");
        std::fs::write(&source, "application: shop\n").unwrap();

        let mut config = DeployConfig::new("shop", "repo.git");
        config.persistent.push(crate::config::PersistentFile {
            source: source.to_string_lossy().to_string(),
            destination: "config/app.yaml".to_string(),
        });
        let copied = copy_persistent_files(&config, work.path()).unwrap();
        assert_eq!(copied, vec!["config/app.yaml"]);
        assert!(work.path().join("config/app.yaml").is_file());
    }
}
