use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::hooks::HookCommands;
use crate::utils::template::{self, TemplateVars};
use crate::utils::{io, validation};

pub const DEFAULT_BRANCH: &str = "master";

/// Platform deploy invocation, rendered with the hook placeholders.
pub const DEFAULT_DEPLOY_COMMAND: &str = "appcfg.py update \"{{directory}}/.\"";

/// Files looked up in the current directory when no `--config` is given.
pub const CONFIG_CANDIDATES: [&str; 3] = ["deploy.yaml", "deploy.yml", "deploy.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Validated deploy configuration. Read-only for the duration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployConfig {
    pub name: String,
    pub repository: String,
    pub branch: String,
    pub caching: bool,
    pub submodules: bool,
    pub persistent: Vec<PersistentFile>,
    pub deploy_command: String,
    pub hooks: HookCommands,
    pub notification: NotificationConfig,
}

/// A file copied from the operator's machine into the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistentFile {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlackConfig {
    #[serde(skip_serializing)]
    pub webhook: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

// ============================================================================
// Raw document shape (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    deploy: Option<RawDeploy>,
    #[serde(default)]
    notification: Option<RawNotification>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDeploy {
    name: Option<String>,
    repository: Option<String>,
    branch: Option<String>,
    #[serde(default = "default_caching")]
    caching: bool,
    #[serde(default)]
    submodules: bool,
    #[serde(default)]
    persistent: Option<BTreeMap<String, String>>,
    #[serde(default)]
    deploy_command: Option<String>,
    #[serde(default)]
    hooks: HookCommands,
    /// Checkpoint lists written directly under `deploy`.
    #[serde(flatten)]
    checkpoints: HookCommands,
    /// Single custom command list from older deploy files, runs before deploy.
    #[serde(default)]
    commands: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotification {
    #[serde(default)]
    slack: Option<RawSlack>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSlack {
    webhook: Option<String>,
    channel: Option<String>,
    username: Option<String>,
    icon: Option<String>,
}

fn default_caching() -> bool {
    true
}

// ============================================================================
// Loading
// ============================================================================

/// Resolve the configuration file: the explicit path, or the first existing candidate.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::config_not_found(path.to_string_lossy()));
    }

    CONFIG_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| Error::config_not_found(CONFIG_CANDIDATES[0]))
}

/// Load and validate a configuration file.
pub fn load(path: &Path) -> Result<DeployConfig> {
    let label = path.to_string_lossy().to_string();
    if !path.is_file() {
        return Err(Error::config_not_found(label));
    }
    let content = io::read_file(path, &format!("read {}", label))?;
    parse(&content, ConfigFormat::for_path(path), &label)
}

/// Parse and validate configuration content.
pub fn parse(content: &str, format: ConfigFormat, label: &str) -> Result<DeployConfig> {
    let document: Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::config_invalid_format(label, e.to_string()))?,
        ConfigFormat::Yaml => serde_yml::from_str(content)
            .map_err(|e| Error::config_invalid_format(label, e.to_string()))?,
    };

    let raw: RawConfig = serde_json::from_value(wrap_legacy_document(document))
        .map_err(|e| Error::config_invalid_format(label, e.to_string()))?;

    let config = raw.into_config(label)?;
    config.validate()?;
    Ok(config)
}

/// Older deploy files kept every key at the top level without a `deploy` section.
fn wrap_legacy_document(document: Value) -> Value {
    match document {
        Value::Object(map) if !map.contains_key("deploy") && map.contains_key("repository") => {
            serde_json::json!({ "deploy": Value::Object(map) })
        }
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

impl RawConfig {
    fn into_config(self, label: &str) -> Result<DeployConfig> {
        let path = Some(label);
        let deploy = validation::require(self.deploy, "deploy.name", path)?;

        let name = validation::require(deploy.name, "deploy.name", path)?;
        let repository = validation::require(deploy.repository, "deploy.repository", path)?;

        let mut hooks = deploy.hooks;
        hooks.before_all.extend(deploy.checkpoints.before_all);
        hooks.before_deploy.extend(deploy.checkpoints.before_deploy);
        hooks.before_deploy.extend(deploy.commands);
        hooks.after_success.extend(deploy.checkpoints.after_success);
        hooks.after_failed.extend(deploy.checkpoints.after_failed);

        let persistent = deploy
            .persistent
            .unwrap_or_default()
            .into_iter()
            .map(|(source, destination)| PersistentFile {
                source,
                destination,
            })
            .collect();

        let slack = match self.notification.and_then(|n| n.slack) {
            Some(raw) => Some(SlackConfig {
                webhook: validation::require(raw.webhook, "notification.slack.webhook", path)?,
                channel: raw.channel,
                username: raw.username,
                icon: raw.icon,
            }),
            None => None,
        };

        Ok(DeployConfig {
            name: name.trim().to_string(),
            repository: repository.trim().to_string(),
            branch: deploy
                .branch
                .map(|b| b.trim().to_string())
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            caching: deploy.caching,
            submodules: deploy.submodules,
            persistent,
            deploy_command: deploy
                .deploy_command
                .unwrap_or_else(|| DEFAULT_DEPLOY_COMMAND.to_string()),
            hooks,
            notification: NotificationConfig { slack },
        })
    }
}

impl DeployConfig {
    /// Minimal valid configuration, everything else defaulted.
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            branch: DEFAULT_BRANCH.to_string(),
            caching: true,
            submodules: false,
            persistent: Vec::new(),
            deploy_command: DEFAULT_DEPLOY_COMMAND.to_string(),
            hooks: HookCommands::default(),
            notification: NotificationConfig::default(),
        }
    }

    /// Check every recognized key up front, before the pipeline has any side effect.
    pub fn validate(&self) -> Result<()> {
        validation::require_non_empty(&self.name, "deploy.name")?;
        validation::require_non_empty(&self.repository, "deploy.repository")?;
        validation::require_non_empty(&self.branch, "deploy.branch")?;
        validation::require_non_empty(&self.deploy_command, "deploy.deploy_command")?;
        if !template::is_present(&self.deploy_command, TemplateVars::DIRECTORY) {
            log_status!(
                "config",
                "deploy_command does not reference {{{{directory}}}}; it runs from the current directory"
            );
        }

        if self.branch.starts_with('-') || self.branch.contains(char::is_whitespace) {
            return Err(Error::config_invalid_value(
                "deploy.branch",
                Some(self.branch.clone()),
                "must be a plain branch name",
            ));
        }

        for file in &self.persistent {
            let key = format!("deploy.persistent.{}", file.source);
            validation::require_non_empty(&file.source, "deploy.persistent")?;
            validation::require_non_empty(&file.destination, &key)?;
            if !is_relative_inside(Path::new(&file.destination)) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(file.destination.clone()),
                    "destination must be a relative path inside the working tree",
                ));
            }
        }

        if let Some(slack) = &self.notification.slack {
            validation::require_non_empty(&slack.webhook, "notification.slack.webhook")?;
        }

        Ok(())
    }
}

fn is_relative_inside(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"
deploy:
  name: shop
  repository: git@example.com:team/shop.git
  branch: release
  caching: false
  persistent:
    secrets/.env: .env
  hooks:
    before_all:
      - echo start
    before_deploy:
      - php artisan config:cache
  commands:
    - echo legacy
notification:
  slack:
    webhook: https://hooks.example.com/T000
    channel: "#deploys"
"##;

    #[test]
    fn checkpoint_keys_under_deploy_are_hooks() {
        let yaml = "deploy:\n  name: shop\n  repository: r.git\n  before_all:\n    - echo one\n  hooks:\n    before_all:\n      - echo zero\n  after_failed:\n    - echo rollback\n";
        let config = parse(yaml, ConfigFormat::Yaml, "deploy.yaml").unwrap();
        assert_eq!(config.hooks.before_all, vec!["echo zero", "echo one"]);
        assert_eq!(config.hooks.after_failed, vec!["echo rollback"]);
        assert!(config.hooks.after_success.is_empty());
    }

    #[test]
    fn parses_nested_yaml() {
        let config = parse(FULL, ConfigFormat::Yaml, "deploy.yaml").unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.branch, "release");
        assert!(!config.caching);
        assert_eq!(
            config.persistent,
            vec![PersistentFile {
                source: "secrets/.env".to_string(),
                destination: ".env".to_string(),
            }]
        );
        assert_eq!(config.hooks.before_all, vec!["echo start"]);
        assert_eq!(
            config.hooks.before_deploy,
            vec!["php artisan config:cache", "echo legacy"]
        );
        let slack = config.notification.slack.unwrap();
        assert_eq!(slack.channel.as_deref(), Some("#deploys"));
    }

    #[test]
    fn applies_defaults() {
        let config = parse(
            "deploy:\n  name: shop\n  repository: repo.git\n",
            ConfigFormat::Yaml,
            "deploy.yaml",
        )
        .unwrap();
        assert_eq!(config.branch, DEFAULT_BRANCH);
        assert!(config.caching);
        assert!(!config.submodules);
        assert_eq!(config.deploy_command, DEFAULT_DEPLOY_COMMAND);
        assert!(config.notification.slack.is_none());
        assert!(config.hooks.before_all.is_empty());
    }

    #[test]
    fn missing_repository_is_config_error() {
        let err = parse("deploy:\n  name: shop\n", ConfigFormat::Yaml, "deploy.yaml").unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
        assert_eq!(err.details["key"], "deploy.repository");
    }

    #[test]
    fn missing_deploy_section_reports_name() {
        let err = parse("notification: {}\n", ConfigFormat::Yaml, "deploy.yaml").unwrap_err();
        assert_eq!(err.details["key"], "deploy.name");
    }

    #[test]
    fn slack_requires_webhook() {
        let err = parse(
            "deploy:\n  name: a\n  repository: b\nnotification:\n  slack:\n    channel: x\n",
            ConfigFormat::Yaml,
            "deploy.yaml",
        )
        .unwrap_err();
        assert_eq!(err.details["key"], "notification.slack.webhook");
    }

    #[test]
    fn legacy_flat_json_is_accepted() {
        let json = r#"{
            "name": "shop",
            "repository": "repo.git",
            "branch": "master",
            "persistent": {},
            "caching": true,
            "commands": ["echo hi"]
        }"#;
        let config = parse(json, ConfigFormat::Json, "deploy.json").unwrap();
        assert_eq!(config.repository, "repo.git");
        assert_eq!(config.hooks.before_deploy, vec!["echo hi"]);
    }

    #[test]
    fn invalid_yaml_is_format_error() {
        let err = parse("deploy: [unclosed", ConfigFormat::Yaml, "deploy.yaml").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_format");
    }

    #[test]
    fn rejects_escaping_persistent_destination() {
        let mut config = DeployConfig::new("shop", "repo.git");
        config.persistent.push(PersistentFile {
            source: "secret".to_string(),
            destination: "../outside".to_string(),
        });
        let err = config.validate().unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");

        config.persistent[0].destination = "/etc/passwd".to_string();
        assert!(config.validate().is_err());

        config.persistent[0].destination = "config/secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_blank_name() {
        let config = DeployConfig::new("  ", "repo.git");
        let err = config.validate().unwrap_err();
        assert_eq!(err.details["key"], "deploy.name");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(Path::new("/nonexistent/deploy.yaml")).unwrap_err();
        assert_eq!(err.code.as_str(), "config.not_found");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::for_path(Path::new("deploy.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::for_path(Path::new("deploy.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::for_path(Path::new("deploy")), ConfigFormat::Yaml);
    }
}
