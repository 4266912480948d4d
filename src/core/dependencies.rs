//! Composer and npm installs, each behind its archive cache.

use serde::Serialize;
use std::path::Path;

use crate::cache::{CacheKind, CacheManager, CacheState};
use crate::environment::Environment;
use crate::error::Result;
use crate::process::{run_checked, ProcessRunner};
use crate::utils::shell::quote_path;

/// What an install step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// No package descriptor in the working tree.
    Skipped,
    Installed(CacheState),
}

pub fn composer_command(environment: Environment, directory: &Path) -> String {
    let mut command = format!(
        "composer --working-dir={} install",
        quote_path(&directory.to_string_lossy())
    );
    if environment.skips_dev_dependencies() {
        command.push_str(" --no-dev");
    }
    command
}

pub fn npm_command(environment: Environment, directory: &Path) -> String {
    let mut command = format!(
        "npm install --prefix {}",
        quote_path(&directory.to_string_lossy())
    );
    if environment.skips_dev_dependencies() {
        command.push_str(" --production");
    }
    command
}

/// `composer install` when `composer.json` exists.
pub fn composer_install(
    runner: &dyn ProcessRunner,
    cache: &CacheManager<'_>,
    environment: Environment,
    directory: &Path,
) -> Result<InstallOutcome> {
    if !directory.join("composer.json").is_file() {
        log_status!("composer", "Skipped composer install");
        return Ok(InstallOutcome::Skipped);
    }

    let state = cache.restore_or_build(CacheKind::Composer, directory, |_| {
        run_checked(
            runner,
            &composer_command(environment, directory),
            None,
            "Running composer install",
        )?;
        Ok(())
    })?;
    Ok(InstallOutcome::Installed(state))
}

/// `npm install` when `package.json` exists. A restored tree is pruned first.
pub fn npm_install(
    runner: &dyn ProcessRunner,
    cache: &CacheManager<'_>,
    environment: Environment,
    directory: &Path,
) -> Result<InstallOutcome> {
    if !directory.join("package.json").is_file() {
        log_status!("npm", "Skipped npm install");
        return Ok(InstallOutcome::Skipped);
    }

    let state = cache.restore_or_build(CacheKind::Npm, directory, |state| {
        if state == CacheState::Restored {
            run_checked(
                runner,
                &format!("npm prune --prefix {}", quote_path(&directory.to_string_lossy())),
                None,
                "Pruning cached npm install",
            )?;
        }
        run_checked(
            runner,
            &npm_command(environment, directory),
            None,
            "Running npm install",
        )?;
        Ok(())
    })?;
    Ok(InstallOutcome::Installed(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::cell::RefCell;
    use std::fs;

    #[derive(Default)]
    struct Recorder {
        commands: RefCell<Vec<String>>,
    }

    impl ProcessRunner for Recorder {
        fn execute(&self, command: &str, _: Option<&Path>, _: Option<&str>) -> CommandOutput {
            self.commands.borrow_mut().push(command.to_string());
            CommandOutput::success("")
        }
    }

    #[test]
    fn production_and_staging_skip_dev_packages() {
        let dir = Path::new("/w");
        assert_eq!(
            composer_command(Environment::Production, dir),
            "composer --working-dir='/w' install --no-dev"
        );
        assert!(npm_command(Environment::Staging, dir).ends_with("--production"));
        assert_eq!(
            npm_command(Environment::Development, dir),
            "npm install --prefix '/w'"
        );
    }

    #[test]
    fn missing_descriptor_skips_install() {
        let work = tempfile::tempdir().unwrap();
        let runner = Recorder::default();
        let cache = CacheManager::new(&runner, work.path(), false);

        let outcome = composer_install(&runner, &cache, Environment::Staging, work.path()).unwrap();
        assert_eq!(outcome, InstallOutcome::Skipped);
        let outcome = npm_install(&runner, &cache, Environment::Staging, work.path()).unwrap();
        assert_eq!(outcome, InstallOutcome::Skipped);
        assert!(runner.commands.borrow().is_empty());
    }

    #[test]
    fn uncached_npm_install_does_not_prune() {
        let work = tempfile::tempdir().unwrap();
        fs::write(work.path().join("package.json"), "{}").unwrap();
        let runner = Recorder::default();
        let cache = CacheManager::new(&runner, work.path(), false);

        let outcome = npm_install(&runner, &cache, Environment::Development, work.path()).unwrap();
        assert_eq!(outcome, InstallOutcome::Installed(CacheState::Disabled));
        let commands = runner.commands.borrow();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("npm install"));
    }
}
