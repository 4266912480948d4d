//! The platform deployment descriptor (`app.yaml`).
//!
//! The document is kept as a generic YAML value so fields this crate does not
//! know about survive a load/save cycle.

use regex::Regex;
use serde_yml::{Mapping, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::io;

pub const MANIFEST_FILE: &str = "app.yaml";

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    document: Value,
    /// Source text of the top-level `version` scalar as written in the file.
    version_text: Option<String>,
}

impl Manifest {
    /// Load `app.yaml` from the root of `directory` and check its required fields.
    pub fn load(directory: &Path) -> Result<Self> {
        let path = directory.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::manifest_invalid(
                path.to_string_lossy(),
                None,
                format!("No '{}' found in the working tree", MANIFEST_FILE),
            ));
        }

        let content = io::read_file(&path, "read manifest")?;
        Self::parse(path, &content)
    }

    pub fn parse(path: PathBuf, content: &str) -> Result<Self> {
        let document: Value = serde_yml::from_str(content).map_err(|e| {
            Error::manifest_invalid(path.to_string_lossy(), None, format!("Invalid YAML: {}", e))
        })?;

        if !document.is_mapping() {
            return Err(Error::manifest_invalid(
                path.to_string_lossy(),
                None,
                "Manifest must be a mapping",
            ));
        }

        let manifest = Self {
            path,
            document,
            version_text: top_level_scalar(content, "version"),
        };
        manifest.application()?;
        manifest.version()?;
        Ok(manifest)
    }

    pub fn application(&self) -> Result<&str> {
        match self.document.get("application").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(self.invalid(
                "application",
                "Application was not set in app.yaml",
            )),
        }
    }

    /// The version scalar as text. Unquoted numbers keep their written
    /// form, so `1.10` stays `1.10` rather than the float `1.1`.
    pub fn version(&self) -> Result<String> {
        let version = match self.document.get("version") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => self
                .version_text
                .clone()
                .unwrap_or_else(|| n.to_string()),
            _ => String::new(),
        };
        if version.is_empty() {
            return Err(self.invalid("version", "Version was not set in app.yaml"));
        }
        Ok(version)
    }

    pub fn set_application(&mut self, application: &str) {
        self.set("application", Value::String(application.to_string()));
    }

    pub fn set_version(&mut self, version: &str) {
        self.set("version", Value::String(version.to_string()));
    }

    /// Set one entry of `env_variables`, creating the mapping when absent.
    pub fn set_env_variable(&mut self, key: &str, value: &str) {
        let needs_mapping = !matches!(self.document.get("env_variables"), Some(Value::Mapping(_)));
        if needs_mapping {
            self.set("env_variables", Value::Mapping(Mapping::new()));
        }
        if let Some(Value::Mapping(vars)) = self.document.get_mut("env_variables") {
            vars.insert(Value::String(key.to_string()), Value::String(value.to_string()));
        }
    }

    /// Require administrator login on every handler.
    pub fn secure_handlers(&mut self) {
        if let Some(Value::Sequence(handlers)) = self.document.get_mut("handlers") {
            for handler in handlers.iter_mut() {
                if let Value::Mapping(handler) = handler {
                    handler.insert(
                        Value::String("login".to_string()),
                        Value::String("admin".to_string()),
                    );
                }
            }
        }
    }

    /// Serialize the whole document back to disk.
    pub fn save(&self) -> Result<()> {
        let content = serde_yml::to_string(&self.document)
            .map_err(|e| Error::internal_yaml(e.to_string(), Some("serialize manifest".into())))?;
        io::write_file_atomic(&self.path, &content, "write manifest")
    }

    /// Rewrite only the top-level `version:` line in place, leaving the rest
    /// of the file byte for byte. Exactly one such line must exist.
    pub fn replace_version_line(&mut self, version: &str) -> Result<()> {
        let pattern = Regex::new(r"(?m)^version[ \t]*:.*$")
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;

        let content = io::read_file(&self.path, "read manifest")?;
        let matches = pattern.find_iter(&content).count();
        if matches != 1 {
            return Err(self.invalid(
                "version",
                format!("Expected one top-level version line in app.yaml, found {}", matches),
            ));
        }

        let replacement = format!("version: {}", version);
        let updated = pattern.replace(&content, regex::NoExpand(&replacement));
        io::write_file_atomic(&self.path, &updated, "write manifest")?;
        self.set_version(version);
        Ok(())
    }

    fn set(&mut self, key: &str, value: Value) {
        if let Value::Mapping(map) = &mut self.document {
            map.insert(Value::String(key.to_string()), value);
        }
    }

    fn invalid(&self, field: &str, problem: impl Into<String>) -> Error {
        Error::manifest_invalid(self.path.to_string_lossy(), Some(field), problem)
    }
}

/// Text of a top-level `key: value` line, without any trailing comment.
fn top_level_scalar(content: &str, key: &str) -> Option<String> {
    let pattern = format!(r"(?m)^{}[ \t]*:[ \t]*([^\r\n#]*)", regex::escape(key));
    let pattern = Regex::new(&pattern).ok()?;
    let text = pattern.captures(content)?.get(1)?.as_str().trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
