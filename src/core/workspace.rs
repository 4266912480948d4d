//! The per-run working directory.
//!
//! A [`WorkingDirectory`] is created once per deployment run and removed when
//! the run reaches a terminal state. [`WorkingDirectory::close`] is the normal
//! release path and reports removal errors; `Drop` covers unwinding.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{Error, Result};

const PREFIX: &str = "launchpad-";

#[derive(Debug)]
pub struct WorkingDirectory {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkingDirectory {
    /// Create a fresh directory under `root`, or under the system temp dir when `None`.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);

        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::internal_io(e.to_string(), Some("create working directory".into())))?;

        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Remove the directory and everything inside it.
    pub fn close(mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|e| {
                Error::internal_io(
                    e.to_string(),
                    Some(format!("remove working directory {}", self.path.display())),
                )
            }),
            None => Ok(()),
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                log_status!(
                    "cleanup",
                    "Failed removing working directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let workspace = WorkingDirectory::create(Some(root.path())).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::create_dir_all(path.join("nested")).unwrap();
        std::fs::write(path.join("nested/file.txt"), "x").unwrap();

        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = WorkingDirectory::create(Some(root.path())).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn directories_are_prefixed() {
        let root = tempfile::tempdir().unwrap();
        let workspace = WorkingDirectory::create(Some(root.path())).unwrap();
        let name = workspace.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(PREFIX));
    }
}
