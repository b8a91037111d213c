//! Progress and result records emitted by long-running operations

use serde::{Deserialize, Serialize};

/// One step of an install or uninstall run.
///
/// A run ends with exactly one record where `done` is true. A non-empty
/// `error` on that record means the run failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepProgress {
    pub step: String,
    pub message: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Degraded-but-continuing condition on a non-terminal record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub type InstallProgress = StepProgress;
pub type UninstallProgress = StepProgress;

impl StepProgress {
    pub fn step(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn warning(step: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            step: step.to_string(),
            warning: Some(message.clone()),
            message,
            ..Default::default()
        }
    }

    pub fn failed(step: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            step: step.to_string(),
            error: Some(message.clone()),
            message,
            done: true,
            warning: None,
        }
    }

    pub fn complete(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            message: message.into(),
            done: true,
            ..Default::default()
        }
    }

    /// True on a terminal record that carries an error
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.done && self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// Outcome of one remediation apply or remove attempt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemediationResult {
    pub name: String,
    pub applied: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemediationResult {
    pub fn failed(name: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            name: name.to_string(),
            applied: false,
            message: format!("Failed to process remediation {name}"),
            error: Some(error),
        }
    }
}
