//! Deployment models
//!
//! The request handed over by the transport for every deployment instruction,
//! and the result reported back once the engine has decided what to do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A deployment instruction received from the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Correlation id, matched against cancel requests
    pub id: i64,

    /// Declared artifact file name; the extension selects the installer
    #[serde(alias = "artifactFileName")]
    pub artifact_file_name: String,

    /// Raw update mode as sent by the backend: 'skip', 'attempt' or 'forced'
    #[serde(alias = "updateType", default)]
    pub update_type: String,

    /// Whether installation is currently permitted by the backend's schedule
    #[serde(alias = "isInMaintenanceWindow", default)]
    pub is_in_maintenance_window: bool,
}

impl DeploymentRequest {
    pub fn new(
        id: i64,
        artifact_file_name: impl Into<String>,
        update_type: impl Into<String>,
        is_in_maintenance_window: bool,
    ) -> Self {
        Self {
            id,
            artifact_file_name: artifact_file_name.into(),
            update_type: update_type.into(),
            is_in_maintenance_window,
        }
    }

    /// Lower-cased extension of the artifact, including the leading dot
    pub fn extension(&self) -> Option<String> {
        artifact_extension(&self.artifact_file_name)
    }
}

/// Extract the lower-cased extension (with leading dot) of a file name
pub fn artifact_extension(file_name: &str) -> Option<String> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => Some(name[idx..].to_lowercase()),
        _ => None,
    }
}

/// Update mode declared by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Download only, never install
    Skip,

    /// Offer the package to the operator; install once accepted
    Attempt,

    /// Install regardless of maintenance window
    Forced,
}

impl FromStr for UpdateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(UpdateType::Skip),
            "attempt" => Ok(UpdateType::Attempt),
            "forced" => Ok(UpdateType::Forced),
            _ => Err(format!("Unknown update type '{}'", s)),
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateType::Skip => "skip",
            UpdateType::Attempt => "attempt",
            UpdateType::Forced => "forced",
        };
        f.write_str(s)
    }
}

/// How far the deployment lifecycle got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Execution {
    Closed,
    Canceled,
    Downloaded,
    Rejected,
}

/// Final verdict of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Finished {
    Success,
    Failure,
    None,
}

/// Result reported back to the transport
///
/// Only the constructors below create results, which keeps
/// `Success => Closed` and `Rejected => Failure` true for every value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    execution: Execution,
    finished: Finished,
    message: String,
}

impl DeploymentResult {
    /// The lifecycle ended successfully
    pub fn closed_success(message: impl Into<String>) -> Self {
        Self {
            execution: Execution::Closed,
            finished: Finished::Success,
            message: message.into(),
        }
    }

    /// The lifecycle ended with a failure
    pub fn closed_failure(message: impl Into<String>) -> Self {
        Self {
            execution: Execution::Closed,
            finished: Finished::Failure,
            message: message.into(),
        }
    }

    /// Downloaded, installation deferred
    pub fn downloaded(message: impl Into<String>) -> Self {
        Self {
            execution: Execution::Downloaded,
            finished: Finished::None,
            message: message.into(),
        }
    }

    /// Preempted by a cancel request
    pub fn canceled(message: impl Into<String>) -> Self {
        Self {
            execution: Execution::Canceled,
            finished: Finished::None,
            message: message.into(),
        }
    }

    /// The request itself was invalid
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            execution: Execution::Rejected,
            finished: Finished::Failure,
            message: message.into(),
        }
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    pub fn finished(&self) -> Finished {
        self.finished
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.finished == Finished::Success
    }

    /// Check the pairing rules between execution, finished and message
    pub fn satisfies_invariants(&self) -> bool {
        let success_is_closed =
            self.finished != Finished::Success || self.execution == Execution::Closed;
        let rejected_is_failure =
            self.execution != Execution::Rejected || self.finished == Finished::Failure;
        let none_is_pending = self.finished != Finished::None
            || matches!(self.execution, Execution::Downloaded | Execution::Canceled);
        let explained = self.finished == Finished::Success || !self.message.is_empty();

        success_is_closed && rejected_is_failure && none_is_pending && explained
    }
}

impl fmt::Display for DeploymentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.execution, self.finished)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}
