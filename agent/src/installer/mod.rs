//! Package installers
//!
//! One installer per package format, selected by file extension through the
//! [`registry::InstallerRegistry`].

pub mod choco;
pub mod msi;
pub mod process;
pub mod registry;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Result of one installer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallOutcome {
    Success,

    /// Installed, but the device has to restart to finish
    RestartNeeded,

    PackageUnavailable,

    PackageNotSupported,

    SignatureVerificationFailed,

    /// The package manager needed for this format is missing
    ChocoNotInstalled,

    /// The package manager ran but failed to install the package
    FailedToInstallChocoPackage,

    CannotStartInstaller,

    GeneralInstallationError,
}

impl InstallOutcome {
    /// Whether the outcome counts as an installed package
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Success | InstallOutcome::RestartNeeded)
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Installer capability for one or more package formats
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Extensions handled by this installer, lower-case with leading dot
    fn extensions(&self) -> &[&'static str];

    /// Check whether this installer handles the given extension
    fn can_handle(&self, extension: &str) -> bool {
        let extension = normalize_extension(extension);
        self.extensions()
            .iter()
            .any(|e| normalize_extension(e) == extension)
    }

    /// Install the package at the given path
    async fn install(&self, package: &Path) -> Result<InstallOutcome, AgentError>;
}

/// Lower-case an extension and make sure it starts with a dot
pub fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim().to_lowercase();
    if extension.starts_with('.') {
        extension
    } else {
        format!(".{}", extension)
    }
}
