//! Finite State Machine for the package lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::installer::InstallOutcome;

/// Lifecycle state of a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageStatus {
    /// Never observed
    #[default]
    Unknown,

    Unavailable,

    /// Present in the packages folder, not yet part of a deployment
    Available,

    Downloading,

    Downloaded,

    Installing,

    Installed,

    Failed,

    /// Installed, the device has to restart to finish
    RestartNeeded,
}

impl PackageStatus {
    /// Installed, possibly pending a restart
    pub fn is_installed(&self) -> bool {
        matches!(self, PackageStatus::Installed | PackageStatus::RestartNeeded)
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Package lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEvent {
    /// Package file listed in the packages folder
    Discovered,

    /// A deployment started downloading the package
    DownloadStarted,

    /// Download completed
    DownloadFinished,

    /// Installer is about to run
    InstallStarted,

    /// Installer returned
    InstallFinished(InstallOutcome),

    /// Forget everything about the package
    Reset,
}

/// Package lifecycle FSM
#[derive(Debug, Clone, Default)]
pub struct PackageFsm {
    status: PackageStatus,
    error: Option<String>,
}

impl PackageFsm {
    /// Create a new FSM in unknown state
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume an FSM at a known status
    pub fn with_status(status: PackageStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// Attach a failure message, as restored from a snapshot
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Get current status
    pub fn status(&self) -> PackageStatus {
        self.status
    }

    /// Get the last install failure, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: &PackageEvent) -> Result<PackageStatus, String> {
        use PackageStatus::*;

        let new_status = match (self.status, event) {
            (Unknown | Unavailable, PackageEvent::Discovered) => Available,

            // A new delivery restarts the lifecycle
            (
                Unknown | Unavailable | Available | Downloading | Downloaded | Failed,
                PackageEvent::DownloadStarted,
            ) => Downloading,

            // Re-delivery of an applied package keeps its status
            (Installed | RestartNeeded, PackageEvent::DownloadStarted)
            | (Installed | RestartNeeded, PackageEvent::DownloadFinished) => self.status,

            (Downloading, PackageEvent::DownloadFinished) => Downloaded,

            (Downloaded, PackageEvent::InstallStarted) => {
                self.error = None;
                Installing
            }

            (Installing, PackageEvent::InstallFinished(outcome)) => match outcome {
                InstallOutcome::Success => Installed,
                InstallOutcome::RestartNeeded => RestartNeeded,
                failure => {
                    self.error = Some(failure.to_string());
                    Failed
                }
            },

            (_, PackageEvent::Reset) => {
                self.error = None;
                Unavailable
            }

            (status, event) => {
                return Err(format!("{:?} -> {:?}", status, event));
            }
        };

        self.status = new_status;
        Ok(new_status)
    }
}
