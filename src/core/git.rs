//! Git operations against the run's working tree.
//!
//! Every command addresses the tree explicitly with `--git-dir` and
//! `--work-tree`, so nothing depends on the process's current directory.

use std::path::Path;

use crate::error::Result;
use crate::process::{run_checked, CommandOutput, ProcessRunner};
use crate::utils::shell::{quote_arg, quote_path};

/// Clone `repository` into `target_dir`.
pub fn clone_repo(runner: &dyn ProcessRunner, repository: &str, target_dir: &Path) -> Result<()> {
    let command = format!(
        "git clone {} {}",
        quote_arg(repository),
        quote_path(&target_dir.to_string_lossy())
    );
    run_checked(
        runner,
        &command,
        None,
        &format!("Cloning repository '{}'", repository),
    )?;
    Ok(())
}

/// A checked-out repository inside the working directory.
pub struct GitWorkTree<'a> {
    runner: &'a dyn ProcessRunner,
    dir: &'a Path,
}

impl<'a> GitWorkTree<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, dir: &'a Path) -> Self {
        Self { runner, dir }
    }

    /// Build the full command line for `git <args>` against this tree.
    pub fn command(&self, args: &str) -> String {
        let dir = self.dir.to_string_lossy();
        format!(
            "git --git-dir {} --work-tree {} {}",
            quote_path(&format!("{}/.git", dir)),
            quote_path(&dir),
            args
        )
    }

    fn run(&self, args: &str, description: &str) -> Result<CommandOutput> {
        run_checked(self.runner, &self.command(args), None, description)
    }

    /// Configured `remote.origin.url`, `None` when unset.
    pub fn origin_url(&self) -> Option<String> {
        let output = self.runner.execute(
            &self.command("config --get remote.origin.url"),
            None,
            Some("Checking cached git repository"),
        );
        if !output.success {
            return None;
        }
        output.stdout_lines().first().map(|line| line.trim().to_string())
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run(
            &format!("checkout {}", quote_arg(branch)),
            &format!("Checking out branch '{}'", branch),
        )?;
        Ok(())
    }

    pub fn fetch_origin(&self) -> Result<()> {
        self.run("fetch origin", "Fetching from origin")?;
        Ok(())
    }

    /// Hard reset to the remote-tracking branch.
    pub fn reset_to_origin(&self, branch: &str) -> Result<()> {
        self.run(
            &format!("reset --hard {}", quote_arg(&format!("origin/{}", branch))),
            "Resetting to origin",
        )?;
        Ok(())
    }

    /// Submodule commands need the work tree as the current directory.
    pub fn update_submodules(&self) -> Result<()> {
        let dir = self.dir.to_string_lossy();
        let command = format!(
            "git --git-dir {} submodule update --init --recursive",
            quote_path(&format!("{}/.git", dir))
        );
        run_checked(self.runner, &command, Some(self.dir), "Updating submodules")?;
        Ok(())
    }

    pub fn add(&self, path: &str) -> Result<()> {
        self.run(
            &format!("add {}", quote_arg(path)),
            &format!("Adding the updated {} to git", path),
        )?;
        Ok(())
    }

    pub fn commit(&self, title: &str, body: &str) -> Result<()> {
        self.run(
            &format!("commit -m {} -m {}", quote_path(title), quote_path(body)),
            "Committing the release to git",
        )?;
        Ok(())
    }

    /// Hash of the current `HEAD` commit.
    pub fn head(&self) -> Result<String> {
        let output = self.run("rev-parse HEAD", "Fetching the hash of the last commit")?;
        Ok(output
            .stdout_lines()
            .first()
            .map(|line| line.trim().to_string())
            .unwrap_or_default())
    }

    /// Annotated tag on `commit`.
    pub fn tag(&self, name: &str, message: &str, commit: &str) -> Result<()> {
        self.run(
            &format!(
                "tag -a {} -m {} {}",
                quote_arg(name),
                quote_path(message),
                quote_arg(commit)
            ),
            "Tagging the last commit as a new release",
        )?;
        Ok(())
    }

    pub fn pull_rebase(&self) -> Result<()> {
        self.run("pull --rebase", "Pulling git repository before pushing")?;
        Ok(())
    }

    pub fn push_follow_tags(&self) -> Result<()> {
        self.run("push --follow-tags", "Pushing new version to repository")?;
        Ok(())
    }
}
