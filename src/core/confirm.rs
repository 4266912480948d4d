//! Pre-flight operator confirmation.

use serde::Serialize;

use crate::environment::Environment;

/// What the operator is asked to acknowledge before a run starts.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationPrompt {
    pub name: String,
    pub environment: Environment,
    pub operator: String,
    pub warnings: Vec<String>,
}

impl ConfirmationPrompt {
    pub fn new(
        name: impl Into<String>,
        environment: Environment,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            environment,
            operator: operator.into(),
            warnings: environment.deploy_warnings(),
        }
    }

    pub fn question(&self) -> String {
        format!(
            "{}, deploy {} to {}?",
            self.operator, self.name, self.environment
        )
    }
}

pub trait Confirmer {
    /// `true` when the operator approves the run.
    fn confirm(&self, prompt: &ConfirmationPrompt) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_environment_warnings() {
        let prompt = ConfirmationPrompt::new("shop", Environment::Production, "jane");
        assert_eq!(prompt.warnings, Environment::Production.deploy_warnings());
        assert_eq!(prompt.question(), "jane, deploy shop to production?");
    }
}
