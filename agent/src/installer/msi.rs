//! Windows Installer (.msi) packages

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::installer::process::{run_installer, ProcessExit};
use crate::installer::{InstallOutcome, PackageInstaller};

/// msiexec exit codes with a specific meaning
const ERROR_SUCCESS: i32 = 0;
const ERROR_INSTALL_PACKAGE_OPEN_FAILED: i32 = 1619;
const ERROR_INSTALL_PACKAGE_INVALID: i32 = 1620;
const ERROR_SUCCESS_REBOOT_INITIATED: i32 = 1641;
const ERROR_SUCCESS_REBOOT_REQUIRED: i32 = 3010;

/// Installs .msi packages through msiexec
#[derive(Debug, Clone)]
pub struct MsiInstaller {
    msiexec: String,
}

impl MsiInstaller {
    pub fn new(msiexec: impl Into<String>) -> Self {
        Self {
            msiexec: msiexec.into(),
        }
    }

    fn outcome(exit: ProcessExit) -> InstallOutcome {
        match exit {
            ProcessExit::Exited(ERROR_SUCCESS) => InstallOutcome::Success,
            ProcessExit::Exited(ERROR_SUCCESS_REBOOT_REQUIRED)
            | ProcessExit::Exited(ERROR_SUCCESS_REBOOT_INITIATED) => InstallOutcome::RestartNeeded,
            ProcessExit::Exited(ERROR_INSTALL_PACKAGE_OPEN_FAILED)
            | ProcessExit::Exited(ERROR_INSTALL_PACKAGE_INVALID) => InstallOutcome::PackageUnavailable,
            ProcessExit::Exited(_) | ProcessExit::Killed => InstallOutcome::GeneralInstallationError,
            ProcessExit::NotFound | ProcessExit::SpawnFailed(_) => InstallOutcome::CannotStartInstaller,
        }
    }
}

#[async_trait]
impl PackageInstaller for MsiInstaller {
    fn extensions(&self) -> &[&'static str] {
        &[".msi"]
    }

    async fn install(&self, package: &Path) -> Result<InstallOutcome, AgentError> {
        if tokio::fs::metadata(package).await.is_err() {
            warn!("MSI package not found: {:?}", package);
            return Ok(InstallOutcome::PackageUnavailable);
        }

        info!("Installing MSI package: {:?}", package);
        let args = vec![
            "/i".to_string(),
            package.to_string_lossy().into_owned(),
            "/qn".to_string(),
            "/norestart".to_string(),
        ];
        let exit = run_installer(&self.msiexec, &args).await;
        let outcome = Self::outcome(exit.clone());
        info!("msiexec finished with {:?} -> {}", exit, outcome);

        Ok(outcome)
    }
}
