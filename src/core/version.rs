//! Release version stamping.
//!
//! Every run bumps the manifest version's patch component. Production records
//! the bump as a tagged git commit; other environments get a suffixed
//! application name and an environment-marked manifest instead.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::git::GitWorkTree;
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::process::ProcessRunner;
use crate::utils::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse up to three digit groups separated by non-digits. Missing groups are 0.
    pub fn parse(raw: &str) -> Result<Self> {
        let pattern = Regex::new(r"^([0-9]*)[^0-9]*([0-9]*)[^0-9]*([0-9]*)$")
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;

        let raw = raw.trim();
        let captures = pattern.captures(raw).ok_or_else(|| {
            Error::manifest_invalid(
                MANIFEST_FILE,
                Some("version"),
                format!("Unrecognized version '{}'", raw),
            )
        })?;

        let group = |index: usize| -> Result<u64> {
            match captures.get(index).map(|m| m.as_str()) {
                Some(digits) if !digits.is_empty() => digits.parse().map_err(|_| {
                    Error::manifest_invalid(
                        MANIFEST_FILE,
                        Some("version"),
                        format!("Version component '{}' is out of range", digits),
                    )
                }),
                _ => Ok(0),
            }
        };

        Ok(Self::new(group(1)?, group(2)?, group(3)?))
    }

    /// Next patch release. Never yields `0.0.0`.
    pub fn increment(&self) -> Self {
        let next = Self::new(self.major, self.minor, self.patch.saturating_add(1));
        if next == Self::new(0, 0, 0) {
            Self::new(0, 0, 1)
        } else {
            next
        }
    }

    /// `1-2-4`, the form stored in the manifest.
    pub fn hyphenated(&self) -> String {
        format!("{}-{}-{}", self.major, self.minor, self.patch)
    }

    /// `1.2.4`, the form used in tags.
    pub fn dotted(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    pub fn tag_name(&self) -> String {
        format!("v{}", self.dotted())
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

/// Result of the stamping stage.
#[derive(Debug, Clone, Serialize)]
pub struct StampedVersion {
    pub previous: String,
    /// Hyphenated form written to the manifest.
    pub version: String,
    /// Dotted release number.
    pub release: String,
    /// Application name as deployed.
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_files: Vec<String>,
}

pub fn commit_title(branch: &str, at: DateTime<Utc>, operator: &str) -> String {
    format!(
        "Release of {} on {} UTC by {}",
        branch,
        at.format("%Y-%m-%d %H:%M:%S"),
        operator
    )
}

pub fn commit_body(application: &str, version: &str) -> String {
    format!("Released {} as version {}", application, version)
}

pub struct VersionStamper<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> VersionStamper<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub fn stamp(
        &self,
        environment: Environment,
        directory: &Path,
        manifest: &mut Manifest,
        branch: &str,
        operator: &str,
    ) -> Result<StampedVersion> {
        let previous = manifest.version()?;
        let next = VersionTriple::parse(&previous)?.increment();
        let application = manifest.application()?.to_string();

        let stamped = if environment.is_production() {
            self.stamp_release(directory, manifest, &application, next, branch, operator, previous)?
        } else {
            self.stamp_environment(environment, directory, manifest, &application, next, previous)?
        };

        log_status!(
            "version",
            "Stamped {} as version {}",
            stamped.application,
            stamped.version
        );
        Ok(stamped)
    }

    #[allow(clippy::too_many_arguments)]
    fn stamp_release(
        &self,
        directory: &Path,
        manifest: &mut Manifest,
        application: &str,
        next: VersionTriple,
        branch: &str,
        operator: &str,
        previous: String,
    ) -> Result<StampedVersion> {
        let version = next.hyphenated();
        manifest.replace_version_line(&version)?;

        let git = GitWorkTree::new(self.runner, directory);
        git.add(MANIFEST_FILE)?;

        let title = commit_title(branch, Utc::now(), operator);
        git.commit(&title, &commit_body(application, &version))?;

        let hash = git.head()?;
        let tag = next.tag_name();
        git.tag(&tag, &format!("Version {} ({})", next.dotted(), title), &hash)?;

        Ok(StampedVersion {
            previous,
            version,
            release: next.dotted(),
            application: application.to_string(),
            tag: Some(tag),
            commit: Some(hash),
            env_files: Vec::new(),
        })
    }

    fn stamp_environment(
        &self,
        environment: Environment,
        directory: &Path,
        manifest: &mut Manifest,
        application: &str,
        next: VersionTriple,
        previous: String,
    ) -> Result<StampedVersion> {
        let deployed = format!("{}-{}", application, environment);
        let version = next.hyphenated();

        manifest.set_application(&deployed);
        manifest.set_version(&version);
        manifest.set_env_variable("APP_ENV", environment.as_str());
        manifest.secure_handlers();
        manifest.save()?;

        let env_files = rewrite_env_files(directory, environment)?;

        Ok(StampedVersion {
            previous,
            version,
            release: next.dotted(),
            application: deployed,
            tag: None,
            commit: None,
            env_files: env_files
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
        })
    }
}

/// Point `APP_ENV` at `environment` in every top-level `.env*` file.
///
/// Returns the files that were examined. No matching files is not an error.
pub fn rewrite_env_files(directory: &Path, environment: Environment) -> Result<Vec<PathBuf>> {
    let line = Regex::new(r"(?m)^APP_ENV[ \t]*=[^\r\n]*")
        .map_err(|e| Error::internal_unexpected(e.to_string()))?;

    let pattern = format!(
        "{}/.env*",
        glob::Pattern::escape(&directory.to_string_lossy())
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::internal_unexpected(format!("Invalid glob '{}': {}", pattern, e)))?;

    let replacement = format!("APP_ENV={}", environment);
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| Error::internal_io(e.to_string(), Some("list .env files".into())))?;
        if !path.is_file() {
            continue;
        }

        let bytes = fs::read(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                log_status!("version", "Skipped non-text file {}", path.display());
                continue;
            }
        };
        let updated = line.replace_all(&content, regex::NoExpand(&replacement));
        if updated != content {
            io::write_file(&path, &updated, "write .env file")?;
        }
        files.push(path);
    }

    if !files.is_empty() {
        log_status!("version", "Updated {} .env file(s)", files.len());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn increments_patch() {
        let next = VersionTriple::parse("1.2.3").unwrap().increment();
        assert_eq!(next.hyphenated(), "1-2-4");
        assert_eq!(next.dotted(), "1.2.4");
        assert_eq!(next.tag_name(), "v1.2.4");
    }

    #[test]
    fn parses_any_separator_and_missing_groups() {
        assert_eq!(VersionTriple::parse("1-2-3").unwrap(), VersionTriple::new(1, 2, 3));
        assert_eq!(VersionTriple::parse("7").unwrap(), VersionTriple::new(7, 0, 0));
        assert_eq!(VersionTriple::parse("2.5").unwrap(), VersionTriple::new(2, 5, 0));
        assert_eq!(VersionTriple::parse("v").unwrap(), VersionTriple::new(0, 0, 0));
    }

    #[test]
    fn all_zero_yields_first_patch() {
        for raw in ["0", "0.0.0", "0-0-0", "x"] {
            let next = VersionTriple::parse(raw).unwrap().increment();
            assert_eq!(next, VersionTriple::new(0, 0, 1), "input {}", raw);
        }
    }

    #[test]
    fn increment_only_moves_patch() {
        for (major, minor, patch) in [(0, 0, 1), (1, 0, 0), (3, 9, 41), (10, 20, 30)] {
            let current = VersionTriple::new(major, minor, patch);
            let next = current.increment();
            assert_eq!((next.major, next.minor), (major, minor));
            assert_eq!(next.patch, patch + 1);
        }
    }

    #[test]
    fn rejects_four_groups() {
        let err = VersionTriple::parse("1.2.3.4").unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.invalid");
    }

    #[test]
    fn commit_title_uses_utc_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            commit_title("master", at, "jane"),
            "Release of master on 2024-03-09 14:05:07 UTC by jane"
        );
        assert_eq!(commit_body("shop", "1-2-4"), "Released shop as version 1-2-4");
    }

    #[test]
    fn rewrites_app_env_in_dot_env_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "APP_NAME=shop\nAPP_ENV = local\nAPP_DEBUG=true\n").unwrap();
        fs::write(dir.path().join(".env.example"), "APP_ENV=local\n").unwrap();
        fs::write(dir.path().join("env.txt"), "APP_ENV=local\n").unwrap();

        let files = rewrite_env_files(dir.path(), Environment::Staging).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "APP_NAME=shop\nAPP_ENV=staging\nAPP_DEBUG=true\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(".env.example")).unwrap(),
            "APP_ENV=staging\n"
        );
        assert_eq!(fs::read_to_string(dir.path().join("env.txt")).unwrap(), "APP_ENV=local\n");
    }

    #[test]
    fn crlf_env_files_keep_their_line_endings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "A=1\r\nAPP_ENV=local\r\nB=2\r\n").unwrap();

        rewrite_env_files(dir.path(), Environment::Staging).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "A=1\r\nAPP_ENV=staging\r\nB=2\r\n"
        );
    }

    #[test]
    fn binary_env_files_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let encrypted = [0x00u8, 0xff, 0xfe, b'A', b'P', b'P', 0x80];
        fs::write(dir.path().join(".env.enc"), encrypted).unwrap();
        fs::write(dir.path().join(".env"), "APP_ENV=local\n").unwrap();

        rewrite_env_files(dir.path(), Environment::Development).unwrap();
        assert_eq!(fs::read(dir.path().join(".env.enc")).unwrap(), encrypted);
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "APP_ENV=development\n"
        );
    }

    #[test]
    fn no_env_files_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rewrite_env_files(dir.path(), Environment::Development)
            .unwrap()
            .is_empty());
    }
}
