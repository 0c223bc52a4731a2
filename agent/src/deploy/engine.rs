//! Deployment decision engine
//!
//! Turns one deployment request into a download / install sequence and a
//! result for the backend. Steps run strictly one after another:
//!
//! 1. extension gate
//! 2. update type validation
//! 3. cancellation check (the only one)
//! 4. already-installed short-circuit, previously failed package under `attempt`
//! 5. download
//! 6. update type policy
//! 7. signature check and install
//!
//! No error leaves [`DeploymentEngine::decide`]; every failure becomes a
//! [`DeploymentResult`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::deploy::cancel::CancellationRegistry;
use crate::deploy::download::{artifact_local_name, Downloader};
use crate::deploy::fsm::PackageStatus;
use crate::deploy::gate::PackageGate;
use crate::deploy::tracker::PackageTracker;
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::installer::registry::InstallerRegistry;
use crate::installer::InstallOutcome;
use crate::models::deployment::{DeploymentRequest, DeploymentResult, UpdateType};
use crate::storage::settings::SignatureVerificationLevel;

/// Deployment decision engine
pub struct DeploymentEngine {
    gate: PackageGate,
    registry: InstallerRegistry,
    tracker: Arc<PackageTracker>,
    cancellations: Arc<CancellationRegistry>,
    downloader: Arc<dyn Downloader>,
    packages_dir: PathBuf,
}

impl DeploymentEngine {
    pub fn new(
        gate: PackageGate,
        registry: InstallerRegistry,
        tracker: Arc<PackageTracker>,
        cancellations: Arc<CancellationRegistry>,
        downloader: Arc<dyn Downloader>,
        packages_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gate,
            registry,
            tracker,
            cancellations,
            downloader,
            packages_dir: packages_dir.into(),
        }
    }

    pub fn tracker(&self) -> &Arc<PackageTracker> {
        &self.tracker
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Decide and carry out one deployment
    pub async fn decide(&self, request: &DeploymentRequest) -> DeploymentResult {
        let package = request.artifact_file_name.as_str();
        info!(
            request_id = request.id,
            package,
            update_type = %request.update_type,
            maintenance_window = request.is_in_maintenance_window,
            "Deployment requested"
        );

        let result = self.run(request).await;

        if result.is_success() {
            info!(request_id = request.id, package, "Deployment finished: {}", result);
        } else {
            warn!(request_id = request.id, package, "Deployment finished: {}", result);
        }
        debug_assert!(result.satisfies_invariants(), "{}", result);

        result
    }

    async fn run(&self, request: &DeploymentRequest) -> DeploymentResult {
        let package = request.artifact_file_name.as_str();

        if let Err(rejection) = self.gate.admit(package) {
            return DeploymentResult::rejected(rejection.to_string());
        }

        let update_type = match request.update_type.parse::<UpdateType>() {
            Ok(update_type) => update_type,
            Err(e) => return DeploymentResult::rejected(format!("{} - deployment rejected", e)),
        };

        if self.cancellations.take(request.id) {
            return DeploymentResult::canceled("deployment canceled");
        }

        if self.tracker.is_already_installed(package) {
            debug!(package, "Package already installed, skipping download and install");
            self.note(package, self.tracker.mark_download_started(package));
            self.note(package, self.tracker.mark_download_finished(package));
            return DeploymentResult::closed_success("package already installed");
        }

        // a failed package stays failed until forced or reset
        if update_type == UpdateType::Attempt
            && self.tracker.current_status(package) == PackageStatus::Failed
        {
            return DeploymentResult::closed_failure("previous installation attempt failed");
        }

        if let Err(e) = self.tracker.mark_download_started(package) {
            return DeploymentResult::closed_failure(format!("cannot start download: {}", e));
        }

        info!(package, "Downloading...");
        match guarded(self.downloader.download(request, &self.packages_dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(package, "Download failed: {}", e);
                return DeploymentResult::closed_failure("download failed");
            }
            Err(panic) => {
                error!(package, "Downloader panicked: {}", panic);
                return DeploymentResult::closed_failure("download failed");
            }
        }
        if let Err(e) = self.tracker.mark_download_finished(package) {
            return DeploymentResult::closed_failure(format!("cannot complete download: {}", e));
        }
        self.record_digest(package).await;
        info!(package, "Download completed");

        match update_type {
            UpdateType::Skip if request.is_in_maintenance_window => {
                DeploymentResult::closed_success("skip installation - not requested")
            }
            UpdateType::Skip => {
                DeploymentResult::downloaded("installation deferred until maintenance window")
            }
            UpdateType::Attempt if self.tracker.is_accepted(package) => {
                info!(package, "Suggested package was accepted, installing");
                self.install(request).await
            }
            UpdateType::Attempt => match self.tracker.current_status(package) {
                PackageStatus::Downloaded => {
                    self.tracker.mark_suggested(package);
                    DeploymentResult::downloaded("package suggested for installation")
                }
                status => DeploymentResult::closed_failure(format!(
                    "unexpected package status after download: {}",
                    status
                )),
            },
            UpdateType::Forced => self.install(request).await,
        }
    }

    async fn install(&self, request: &DeploymentRequest) -> DeploymentResult {
        let package = request.artifact_file_name.as_str();
        let path = self.packages_dir.join(artifact_local_name(package));

        if let Err(e) = self.tracker.mark_install_started(package) {
            warn!(package, "Install not started: {}", e);
            return if self.tracker.is_already_installed(package) {
                DeploymentResult::closed_success("package already installed")
            } else {
                DeploymentResult::closed_failure("installation already in progress")
            };
        }
        info!(package, "Installing...");

        let outcome = match self.gate.verify(&path).await {
            Err(outcome) => outcome,
            Ok(()) => self.run_installer(request, &path).await,
        };

        self.note(package, self.tracker.mark_install_outcome(package, outcome));
        outcome_result(outcome, self.gate.level())
    }

    async fn run_installer(&self, request: &DeploymentRequest, path: &Path) -> InstallOutcome {
        let package = request.artifact_file_name.as_str();
        let Some(installer) = request
            .extension()
            .and_then(|extension| self.registry.resolve(&extension))
        else {
            warn!(package, "No installer resolved");
            return InstallOutcome::PackageNotSupported;
        };

        match guarded(installer.install(path)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(package, "Installer failed: {}", e);
                InstallOutcome::GeneralInstallationError
            }
            Err(panic) => {
                error!(package, "Installer panicked: {}", panic);
                InstallOutcome::GeneralInstallationError
            }
        }
    }

    async fn record_digest(&self, package: &str) {
        let file = File::new(self.packages_dir.join(artifact_local_name(package)));
        match file.sha256().await {
            Ok(digest) => {
                debug!(package, "sha256 {}", digest);
                self.tracker.set_digest(package, digest);
            }
            Err(e) => debug!(package, "Cannot hash downloaded package: {}", e),
        }
    }

    /// Tracker bookkeeping never changes the decision, failures are only logged
    fn note(&self, package: &str, transition: Result<PackageStatus, AgentError>) {
        if let Err(e) = transition {
            warn!(package, "Package state not updated: {}", e);
        }
    }
}

/// Await a collaborator call, turning a panic into an error message
async fn guarded<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

/// Message clause explaining a failed installation
pub fn failure_clause(outcome: InstallOutcome, level: SignatureVerificationLevel) -> Option<String> {
    let clause = match outcome {
        InstallOutcome::Success | InstallOutcome::RestartNeeded => return None,
        InstallOutcome::PackageUnavailable => "Package unavailable or unusable".to_string(),
        InstallOutcome::ChocoNotInstalled => "required package manager is not installed".to_string(),
        InstallOutcome::FailedToInstallChocoPackage => "Failed to install package".to_string(),
        InstallOutcome::GeneralInstallationError => "General installation error".to_string(),
        InstallOutcome::SignatureVerificationFailed => format!(
            "Signature verification for the package failed. Requested level: {}. Deployment rejected",
            level
        ),
        InstallOutcome::PackageNotSupported => "Package of this type is not supported".to_string(),
        InstallOutcome::CannotStartInstaller => "Failed to start installer process".to_string(),
    };
    Some(clause)
}

/// Map an installer outcome to the deployment result
pub fn outcome_result(outcome: InstallOutcome, level: SignatureVerificationLevel) -> DeploymentResult {
    match failure_clause(outcome, level) {
        Some(clause) => DeploymentResult::closed_failure(format!("Installation failed.\n{}", clause)),
        None if outcome == InstallOutcome::RestartNeeded => {
            DeploymentResult::closed_success("restart needed to complete installation")
        }
        None => DeploymentResult::closed_success(""),
    }
}
