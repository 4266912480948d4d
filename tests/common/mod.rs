#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use launchpad::config::{DeployConfig, PersistentFile};
use launchpad::confirm::{ConfirmationPrompt, Confirmer};
use launchpad::notify::{EventType, NotificationEvent, Notifier, Stage};
use launchpad::process::{CommandOutput, ProcessRunner, ShellRunner};

pub const REPOSITORY: &str = "git@example.com:team/shop.git";
pub const HEAD: &str = "abc123";

/// Answers git, composer, npm and the platform CLI from a script and runs
/// everything else (tar, hook commands, whoami) for real.
pub struct ScriptedRunner {
    pub calls: RefCell<Vec<String>>,
    pub origin: String,
    pub failing: Vec<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            origin: REPOSITORY.to_string(),
            failing: Vec::new(),
        }
    }

    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.failing.push(fragment.to_string());
        self
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn position(&self, fragment: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.contains(fragment))
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.position(fragment).is_some()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn execute(
        &self,
        command: &str,
        current_dir: Option<&Path>,
        description: Option<&str>,
    ) -> CommandOutput {
        self.calls.borrow_mut().push(command.to_string());

        if self.failing.iter().any(|fragment| command.contains(fragment.as_str())) {
            return CommandOutput::failure(2, format!("scripted failure: {}", command));
        }

        if command.starts_with("git ") {
            if command.contains("config --get remote.origin.url") {
                return CommandOutput::success(format!("{}\n", self.origin));
            }
            if command.contains("rev-parse HEAD") {
                return CommandOutput::success(format!("{}\n", HEAD));
            }
            return CommandOutput::success("");
        }

        if command.starts_with("composer ")
            || command.starts_with("npm ")
            || command.starts_with("appcfg.py ")
        {
            return CommandOutput::success("");
        }

        ShellRunner.execute(command, current_dir, description)
    }
}

pub struct RecordingConfirmer {
    pub answer: bool,
    pub prompts: RefCell<Vec<ConfirmationPrompt>>,
}

impl RecordingConfirmer {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl Confirmer for RecordingConfirmer {
    fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        self.prompts.borrow_mut().push(prompt.clone());
        self.answer
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: RefCell<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn pairs(&self) -> Vec<(Stage, EventType)> {
        self.events.borrow().iter().map(|e| (e.stage, e.event)).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &NotificationEvent) -> bool {
        self.events.borrow_mut().push(event.clone());
        true
    }
}

/// Operator-side files, scratch directories and a config that copies the
/// fixture manifest into the working tree.
pub struct Fixture {
    pub project: tempfile::TempDir,
    pub archives: tempfile::TempDir,
    pub workspaces: tempfile::TempDir,
    pub captured: tempfile::TempDir,
}

pub const APP_YAML: &str = "application: shop\nversion: 1-2-3\nruntime: php55\nhandlers:\n  - url: /.*\n    script: index.php\n";

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            project: tempfile::tempdir().unwrap(),
            archives: tempfile::tempdir().unwrap(),
            workspaces: tempfile::tempdir().unwrap(),
            captured: tempfile::tempdir().unwrap(),
        };
        fixture.write("app.yaml", APP_YAML);
        fixture.write(".env", "APP_NAME=shop\nAPP_ENV=local\n");
        fixture
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.project.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> DeployConfig {
        let mut config = DeployConfig::new("shop", REPOSITORY);
        config.caching = false;
        for name in ["app.yaml", ".env"] {
            config.persistent.push(PersistentFile {
                source: self.project.path().join(name).to_string_lossy().to_string(),
                destination: name.to_string(),
            });
        }
        config
    }

    /// Hook command copying a file out of the working tree before it is removed.
    pub fn capture(&self, name: &str) -> String {
        format!(
            "cp '{{{{directory}}}}/{}' '{}'",
            name,
            self.captured.path().join(name).display()
        )
    }

    pub fn captured(&self, name: &str) -> String {
        fs::read_to_string(self.captured.path().join(name)).unwrap()
    }

    pub fn workspaces_empty(&self) -> bool {
        fs::read_dir(self.workspaces.path()).unwrap().next().is_none()
    }
}
