use serde::Serialize;

use launchpad::config;
use launchpad::notify::{Notifier, NullNotifier, SlackNotifier};
use launchpad::pipeline::OutcomeStatus;
use launchpad::process::ShellRunner;
use launchpad::{DeploymentRequest, Environment, Pipeline, PipelineOutcome};

use super::CmdResult;
use crate::tty::TtyConfirmer;

#[derive(Serialize)]
pub struct DeployOutput {
    pub command: String,
    pub config_path: String,
    pub outcome: PipelineOutcome,
}

pub fn run(
    environment: Environment,
    global: &crate::commands::GlobalArgs,
) -> CmdResult<DeployOutput> {
    let config_path = config::resolve_path(global.config.as_deref())?;
    let deploy_config = config::load(&config_path)?;

    let notifier: Box<dyn Notifier> = match &deploy_config.notification.slack {
        Some(slack) => Box::new(SlackNotifier::new(slack.clone())?),
        None => Box::new(NullNotifier),
    };

    let runner = ShellRunner;
    let outcome = Pipeline::new(&runner, &TtyConfirmer, notifier.as_ref())
        .run(&DeploymentRequest::new(environment, deploy_config))?;

    let exit_code = match outcome.status {
        OutcomeStatus::Succeeded | OutcomeStatus::Cancelled => 0,
        OutcomeStatus::Failed => outcome
            .error
            .as_ref()
            .map(|failure| crate::output::exit_code_for_error(failure.code))
            .unwrap_or(1),
    };

    Ok((
        DeployOutput {
            command: format!("deploy.{}", environment),
            config_path: config_path.to_string_lossy().to_string(),
            outcome,
        },
        exit_code,
    ))
}
