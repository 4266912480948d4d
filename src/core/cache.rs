//! Archive caches for expensive subtrees of the working tree.
//!
//! One tar archive per [`CacheKind`] lives in the archive directory (the
//! invoking process's current directory by default) next to a `.sha256`
//! sidecar in `sha256sum` format. Presence of the archive alone means the
//! cache exists; the sidecar is verified when present.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::{run_checked, ProcessRunner};
use crate::utils::io;
use crate::utils::shell::quote_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Source,
    Composer,
    Npm,
}

impl CacheKind {
    pub fn archive_name(&self) -> &'static str {
        match self {
            CacheKind::Source => "git.cache.tar",
            CacheKind::Composer => "composer.cache.tar",
            CacheKind::Npm => "npm.cache.tar",
        }
    }

    /// Subtree of the working directory captured in the archive.
    pub fn subtree(&self) -> &'static str {
        match self {
            CacheKind::Source => ".",
            CacheKind::Composer => "vendor",
            CacheKind::Npm => "node_modules",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CacheKind::Source => "git repository",
            CacheKind::Composer => "composer install",
            CacheKind::Npm => "npm install",
        }
    }
}

/// How the build closure finds the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Caching is off; no archive was touched.
    Disabled,
    /// No archive existed; build from scratch.
    Fresh,
    /// The archive was extracted into the working directory.
    Restored,
}

pub struct CacheManager<'a> {
    runner: &'a dyn ProcessRunner,
    archive_dir: PathBuf,
    enabled: bool,
}

impl<'a> CacheManager<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        archive_dir: impl Into<PathBuf>,
        enabled: bool,
    ) -> Self {
        Self {
            runner,
            archive_dir: archive_dir.into(),
            enabled,
        }
    }

    pub fn archive_path(&self, kind: CacheKind) -> PathBuf {
        self.archive_dir.join(kind.archive_name())
    }

    pub fn checksum_path(&self, kind: CacheKind) -> PathBuf {
        self.archive_dir
            .join(format!("{}.sha256", kind.archive_name()))
    }

    /// Restore `kind` into `workdir` if an archive exists, run `build`, then
    /// snapshot the subtree back into the archive.
    ///
    /// With caching disabled `build` runs with [`CacheState::Disabled`] and no
    /// archive is read or written. Extraction failure is fatal; there is no
    /// fallback to a fresh build.
    pub fn restore_or_build<F>(
        &self,
        kind: CacheKind,
        workdir: &Path,
        build: F,
    ) -> Result<CacheState>
    where
        F: FnOnce(CacheState) -> Result<()>,
    {
        if !self.enabled {
            build(CacheState::Disabled)?;
            return Ok(CacheState::Disabled);
        }

        let archive = self.archive_path(kind);
        let state = if archive.is_file() {
            self.verify(kind)?;
            self.extract(kind, workdir)?;
            CacheState::Restored
        } else {
            CacheState::Fresh
        };

        build(state)?;
        self.snapshot(kind, workdir)?;
        Ok(state)
    }

    fn extract(&self, kind: CacheKind, workdir: &Path) -> Result<()> {
        let command = format!(
            "tar xf {} -C {}",
            quote_path(&self.archive_path(kind).to_string_lossy()),
            quote_path(&workdir.to_string_lossy())
        );
        run_checked(
            self.runner,
            &command,
            None,
            &format!("Extracting cached {}", kind.label()),
        )?;
        Ok(())
    }

    fn snapshot(&self, kind: CacheKind, workdir: &Path) -> Result<()> {
        let archive = self.archive_path(kind);
        let command = format!(
            "tar cf {} -C {} {}",
            quote_path(&archive.to_string_lossy()),
            quote_path(&workdir.to_string_lossy()),
            kind.subtree()
        );
        run_checked(
            self.runner,
            &command,
            None,
            &format!("Caching {}", kind.label()),
        )?;

        let digest = file_digest(&archive)?;
        io::write_file_atomic(
            &self.checksum_path(kind),
            &format!("{}  {}\n", digest, kind.archive_name()),
            "write cache checksum",
        )
    }

    /// Compare the archive against its sidecar. A missing sidecar is accepted.
    fn verify(&self, kind: CacheKind) -> Result<()> {
        let sidecar = self.checksum_path(kind);
        if !sidecar.is_file() {
            log_status!("cache", "No checksum for {}, skipping verification", kind.archive_name());
            return Ok(());
        }

        let content = io::read_file(&sidecar, "read cache checksum")?;
        let expected = content
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let actual = file_digest(&self.archive_path(kind))?;

        if expected != actual {
            return Err(Error::cache_integrity(
                format!("Checksum of '{}' does not match its sidecar", kind.archive_name()),
                kind.archive_name(),
                expected,
                actual,
            ));
        }
        Ok(())
    }

    /// Ensure a restored source tree was cloned from `repository`.
    pub fn verify_origin(&self, origin: Option<&str>, repository: &str) -> Result<()> {
        let archive = CacheKind::Source.archive_name();
        match origin {
            Some(url) if url == repository => Ok(()),
            other => Err(Error::cache_integrity(
                format!(
                    "Failed as repository of '{}' != repository in the deploy configuration",
                    archive
                ),
                archive,
                repository,
                other.unwrap_or_default(),
            )),
        }
    }
}

/// Hex SHA-256 of a file's content.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("open {}", path.display())))
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("hash {}", path.display())))
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}
