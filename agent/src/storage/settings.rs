//! Settings file management

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write logs to a daily rolling file in the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Package filter configuration
    #[serde(default)]
    pub packages: PackageSettings,

    /// Signature verification policy
    #[serde(default)]
    pub signature: SignatureSettings,

    /// Installer programs
    #[serde(default)]
    pub installers: InstallerSettings,

    /// Seconds after which an unmatched cancel request is forgotten
    #[serde(default = "default_cancellation_ttl")]
    pub cancellation_ttl_secs: u64,
}

fn default_cancellation_ttl() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            packages: PackageSettings::default(),
            signature: SignatureSettings::default(),
            installers: InstallerSettings::default(),
            cancellation_ttl_secs: default_cancellation_ttl(),
        }
    }
}

/// Package filter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSettings {
    /// Extensions the backend may deploy, e.g. ".msi"
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".msi".to_string(), ".nupkg".to_string()]
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Required strength of a package signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureVerificationLevel {
    /// Any signature is accepted
    SignedByAnyCertificate,

    /// The signing certificate must chain to a trusted root
    #[default]
    SignedByTrustedCertificate,

    /// The signing certificate must be on the whitelist
    SignedByWhitelistedCertificate,
}

impl fmt::Display for SignatureVerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Signature verification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureSettings {
    /// Verify package signatures before installing
    #[serde(default)]
    pub check_signature: bool,

    /// Verification level applied when checking is enabled
    #[serde(default)]
    pub level: SignatureVerificationLevel,

    /// Thumbprints of whitelisted signing certificates
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Installer program settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerSettings {
    /// Path to msiexec
    #[serde(default = "default_msiexec_path")]
    pub msiexec_path: String,

    /// Path to the Chocolatey CLI
    #[serde(default = "default_choco_path")]
    pub choco_path: String,
}

fn default_msiexec_path() -> String {
    "msiexec".to_string()
}

fn default_choco_path() -> String {
    "choco".to_string()
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            msiexec_path: default_msiexec_path(),
            choco_path: default_choco_path(),
        }
    }
}
