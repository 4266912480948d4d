//! Stage notifications.
//!
//! The pipeline reports `Started`, `Succeeded` and `Failed` for its two coarse
//! stages. Delivery is best-effort: a notifier answers whether the message was
//! delivered and never fails the run.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::SlackConfig;
use crate::environment::Environment;
use crate::error::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NEUTRAL_COLOR: &str = "#439FE0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Building,
    Deploying,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Building => "building",
            Stage::Deploying => "deploying",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "building" => Ok(Stage::Building),
            "deploying" => Ok(Stage::Deploying),
            _ => Err(Error::contract_violation(format!(
                "Unknown notification stage '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Started,
    Succeeded,
    Failed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Started => "started",
            EventType::Succeeded => "succeeded",
            EventType::Failed => "failed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            EventType::Started => Severity::Neutral,
            EventType::Succeeded => Severity::Positive,
            EventType::Failed => Severity::Negative,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "started" => Ok(EventType::Started),
            "succeeded" => Ok(EventType::Succeeded),
            "failed" => Ok(EventType::Failed),
            _ => Err(Error::contract_violation(format!(
                "Unknown notification event '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Positive,
    Negative,
    Neutral,
}

impl Severity {
    /// Attachment color understood by Slack-compatible webhooks.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Positive => "good",
            Severity::Negative => "danger",
            Severity::Neutral => NEUTRAL_COLOR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub stage: Stage,
    pub event: EventType,
    pub name: String,
    pub environment: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl NotificationEvent {
    pub fn new(
        stage: Stage,
        event: EventType,
        name: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            stage,
            event,
            name: name.into(),
            environment,
            details: None,
        }
    }

    /// Build an event from raw stage and event names.
    pub fn parse(
        stage: &str,
        event: &str,
        name: impl Into<String>,
        environment: Environment,
    ) -> Result<Self> {
        Ok(Self::new(stage.parse()?, event.parse()?, name, environment))
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn message(&self) -> String {
        message(self.stage, self.event, &self.name, self.environment)
    }

    pub fn severity(&self) -> Severity {
        self.event.severity()
    }
}

/// Human message for a stage transition.
pub fn message(stage: Stage, event: EventType, name: &str, environment: Environment) -> String {
    match (stage, event) {
        (Stage::Building, EventType::Started) => {
            format!("Started building {} for {}", name, environment)
        }
        (Stage::Building, EventType::Succeeded) => {
            format!("Finished building {} for {}", name, environment)
        }
        (Stage::Building, EventType::Failed) => {
            format!("Failed building {} for {}", name, environment)
        }
        (Stage::Deploying, EventType::Started) => {
            format!("Started deploying {} to {}", name, environment)
        }
        (Stage::Deploying, EventType::Succeeded) => {
            format!("Successfully deployed {} to {}", name, environment)
        }
        (Stage::Deploying, EventType::Failed) => {
            format!("Failed deploying {} to {}", name, environment)
        }
    }
}

pub trait Notifier {
    /// Deliver `event`. Returns whether it was delivered.
    fn notify(&self, event: &NotificationEvent) -> bool;
}

/// Used when no channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &NotificationEvent) -> bool {
        false
    }
}

/// Incoming-webhook payload for a Slack-compatible endpoint.
pub fn slack_payload(config: &SlackConfig, event: &NotificationEvent) -> Value {
    let text = event.message();
    let mut payload = json!({
        "text": text,
        "attachments": [{
            "fallback": text,
            "text": event.details.clone().unwrap_or_else(|| text.clone()),
            "color": event.severity().color(),
        }],
    });

    if let Some(map) = payload.as_object_mut() {
        if let Some(channel) = &config.channel {
            map.insert("channel".to_string(), json!(channel));
        }
        if let Some(username) = &config.username {
            map.insert("username".to_string(), json!(username));
        }
        if let Some(icon) = &config.icon {
            let key = if icon.starts_with(':') && icon.ends_with(':') {
                "icon_emoji"
            } else {
                "icon_url"
            };
            map.insert(key.to_string(), json!(icon));
        }
    }

    payload
}

pub struct SlackNotifier {
    config: SlackConfig,
    client: reqwest::blocking::Client,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("launchpad/{}", VERSION))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some("create HTTP client".to_string()))
            })?;
        Ok(Self { config, client })
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, event: &NotificationEvent) -> bool {
        let payload = slack_payload(&self.config, event);
        match self.client.post(&self.config.webhook).json(&payload).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log_status!("notify", "Slack rejected notification: HTTP {}", response.status());
                false
            }
            Err(e) => {
                log_status!("notify", "Failed sending notification: {}", e);
                false
            }
        }
    }
}
