use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Target environment of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Production,
        Environment::Staging,
        Environment::Development,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Production and staging installs skip development-only packages.
    pub fn skips_dev_dependencies(&self) -> bool {
        matches!(self, Environment::Production | Environment::Staging)
    }

    /// Warnings shown to the operator before the run is confirmed.
    pub fn deploy_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.is_production() {
            warnings.push(
                "Do not push any changes to app.yaml whilst deploying the application!"
                    .to_string(),
            );
        }
        warnings.push("All database changes should be backwards compatible!".to_string());
        warnings
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Environment::ALL
            .iter()
            .copied()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "environment",
                    format!("Unknown environment '{}'", s),
                    Some(Environment::ALL.iter().map(|e| e.to_string()).collect()),
                )
            })
    }
}
