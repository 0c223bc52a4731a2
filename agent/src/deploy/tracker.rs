//! Package state tracker
//!
//! Keeps the lifecycle state of every package the agent has seen, keyed by
//! the lower-cased artifact file name. Each key is locked on its own, so
//! deployments of different packages never wait on each other.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::deploy::fsm::{PackageEvent, PackageFsm, PackageStatus};
use crate::errors::AgentError;
use crate::installer::InstallOutcome;

/// Tracker entry for one package
#[derive(Debug, Clone)]
struct PackageEntry {
    file_name: String,
    fsm: PackageFsm,
    suggested: bool,
    accepted: bool,
    digest: Option<String>,
    updated_at: DateTime<Utc>,
}

impl PackageEntry {
    fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            fsm: PackageFsm::new(),
            suggested: false,
            accepted: false,
            digest: None,
            updated_at: Utc::now(),
        }
    }

    fn to_record(&self) -> PackageRecord {
        PackageRecord {
            file_name: self.file_name.clone(),
            status: self.fsm.status(),
            suggested: self.suggested,
            accepted: self.accepted,
            error: self.fsm.error().map(str::to_string),
            digest: self.digest.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Snapshot of a package, as exposed to status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub file_name: String,
    pub status: PackageStatus,
    #[serde(default)]
    pub suggested: bool,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized identity of a package file
pub fn package_key(file_name: &str) -> String {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim()
        .to_lowercase()
}

/// Concurrent package state tracker
#[derive(Debug, Default)]
pub struct PackageTracker {
    entries: DashMap<String, PackageEntry>,
}

impl PackageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, file_name: &str, event: PackageEvent) -> Result<PackageStatus, AgentError> {
        let mut entry = self
            .entries
            .entry(package_key(file_name))
            .or_insert_with(|| PackageEntry::new(file_name));

        let before = entry.fsm.status();
        match entry.fsm.process(&event) {
            Ok(after) => {
                entry.updated_at = Utc::now();
                if before != after {
                    info!(package = %file_name, "Package status {} -> {}", before, after);
                } else {
                    debug!(package = %file_name, "Package status kept at {} on {:?}", after, event);
                }
                Ok(after)
            }
            Err(e) => {
                warn!(package = %file_name, "Rejected package transition: {}", e);
                Err(AgentError::InvalidTransition(e))
            }
        }
    }

    /// Record that a package file is present locally
    pub fn mark_available(&self, file_name: &str) -> Result<PackageStatus, AgentError> {
        self.apply(file_name, PackageEvent::Discovered)
    }

    pub fn mark_download_started(&self, file_name: &str) -> Result<PackageStatus, AgentError> {
        self.apply(file_name, PackageEvent::DownloadStarted)
    }

    pub fn mark_download_finished(&self, file_name: &str) -> Result<PackageStatus, AgentError> {
        self.apply(file_name, PackageEvent::DownloadFinished)
    }

    pub fn mark_install_started(&self, file_name: &str) -> Result<PackageStatus, AgentError> {
        self.apply(file_name, PackageEvent::InstallStarted)
    }

    /// Record the installer outcome; clears suggestion annotations
    pub fn mark_install_outcome(
        &self,
        file_name: &str,
        outcome: InstallOutcome,
    ) -> Result<PackageStatus, AgentError> {
        let status = self.apply(file_name, PackageEvent::InstallFinished(outcome))?;
        if let Some(mut entry) = self.entries.get_mut(&package_key(file_name)) {
            entry.suggested = false;
            entry.accepted = false;
        }
        Ok(status)
    }

    /// Annotate a package as offered to the operator; the status is unchanged
    pub fn mark_suggested(&self, file_name: &str) {
        let mut entry = self
            .entries
            .entry(package_key(file_name))
            .or_insert_with(|| PackageEntry::new(file_name));
        entry.suggested = true;
        entry.updated_at = Utc::now();
        info!(package = %file_name, "Package suggested for installation");
    }

    /// Operator approval of a suggested package
    pub fn accept_suggestion(&self, file_name: &str) -> Result<(), AgentError> {
        let mut entry = self
            .entries
            .get_mut(&package_key(file_name))
            .ok_or_else(|| AgentError::NotFound(format!("Package {}", file_name)))?;

        if !entry.suggested {
            return Err(AgentError::ValidationError(format!(
                "Package {} was not suggested for installation",
                file_name
            )));
        }

        entry.accepted = true;
        entry.updated_at = Utc::now();
        info!(package = %file_name, "Suggested package accepted for installation");
        Ok(())
    }

    /// Whether the operator accepted the package's suggestion
    pub fn is_accepted(&self, file_name: &str) -> bool {
        self.entries
            .get(&package_key(file_name))
            .map(|e| e.accepted)
            .unwrap_or(false)
    }

    pub fn is_suggested(&self, file_name: &str) -> bool {
        self.entries
            .get(&package_key(file_name))
            .map(|e| e.suggested)
            .unwrap_or(false)
    }

    /// Store the digest of the downloaded file
    pub fn set_digest(&self, file_name: &str, digest: String) {
        if let Some(mut entry) = self.entries.get_mut(&package_key(file_name)) {
            entry.digest = Some(digest);
        }
    }

    /// Current status, `Unknown` for packages never seen
    pub fn current_status(&self, file_name: &str) -> PackageStatus {
        self.entries
            .get(&package_key(file_name))
            .map(|e| e.fsm.status())
            .unwrap_or_default()
    }

    /// Installed, possibly pending a restart
    pub fn is_already_installed(&self, file_name: &str) -> bool {
        self.current_status(file_name).is_installed()
    }

    /// Forget the lifecycle of a package
    pub fn reset(&self, file_name: &str) -> Result<PackageStatus, AgentError> {
        let status = self.apply(file_name, PackageEvent::Reset)?;
        if let Some(mut entry) = self.entries.get_mut(&package_key(file_name)) {
            entry.suggested = false;
            entry.accepted = false;
            entry.digest = None;
        }
        Ok(status)
    }

    /// Snapshot of one package
    pub fn record(&self, file_name: &str) -> Option<PackageRecord> {
        self.entries
            .get(&package_key(file_name))
            .map(|e| e.to_record())
    }

    /// Snapshot of all packages, sorted by file name
    pub fn records(&self) -> Vec<PackageRecord> {
        let mut records: Vec<PackageRecord> =
            self.entries.iter().map(|e| e.value().to_record()).collect();
        records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        records
    }

    /// Load a persisted snapshot
    ///
    /// Operations in flight when the snapshot was taken did not complete:
    /// an interrupted download is forgotten and an interrupted install
    /// counts as failed.
    pub fn restore(&self, records: Vec<PackageRecord>) {
        for record in records {
            let (status, error) = match record.status {
                PackageStatus::Downloading => (PackageStatus::Unavailable, record.error),
                PackageStatus::Installing => (
                    PackageStatus::Failed,
                    Some("Installation interrupted".to_string()),
                ),
                status => (status, record.error),
            };

            let mut fsm = PackageFsm::with_status(status);
            if let Some(error) = error {
                fsm = fsm.with_error(error);
            }

            self.entries.insert(
                package_key(&record.file_name),
                PackageEntry {
                    file_name: record.file_name,
                    fsm,
                    suggested: record.suggested,
                    accepted: record.accepted,
                    digest: record.digest,
                    updated_at: record.updated_at,
                },
            );
        }
        debug!("Restored {} package records", self.entries.len());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
