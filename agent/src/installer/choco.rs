//! Chocolatey (.nupkg) packages

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::installer::process::{run_installer, ProcessExit};
use crate::installer::{InstallOutcome, PackageInstaller};

/// Installs .nupkg packages through the Chocolatey CLI
#[derive(Debug, Clone)]
pub struct ChocoInstaller {
    choco: String,
}

/// Package id and version encoded in a nupkg file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NupkgName {
    pub id: String,
    pub version: Option<String>,
}

impl NupkgName {
    /// Split 'Some.Package.1.2.3.nupkg' into id 'Some.Package' and version '1.2.3'
    pub fn parse(file_name: &str) -> Option<Self> {
        let split = file_name.len().checked_sub(".nupkg".len())?;
        if !file_name.is_char_boundary(split)
            || !file_name[split..].eq_ignore_ascii_case(".nupkg")
        {
            return None;
        }
        let stem = &file_name[..split];
        if stem.is_empty() {
            return None;
        }

        let parts: Vec<&str> = stem.split('.').collect();
        let version_start = parts
            .iter()
            .skip(1)
            .position(|p| p.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .map(|i| i + 1);

        let (id, version) = match version_start {
            Some(idx) => (parts[..idx].join("."), Some(parts[idx..].join("."))),
            None => (stem.to_string(), None),
        };

        Some(Self { id, version })
    }
}

impl ChocoInstaller {
    pub fn new(choco: impl Into<String>) -> Self {
        Self {
            choco: choco.into(),
        }
    }

    fn outcome(exit: ProcessExit) -> InstallOutcome {
        match exit {
            ProcessExit::Exited(0) => InstallOutcome::Success,
            ProcessExit::Exited(1641) | ProcessExit::Exited(3010) => InstallOutcome::RestartNeeded,
            ProcessExit::Exited(_) | ProcessExit::Killed => InstallOutcome::FailedToInstallChocoPackage,
            ProcessExit::NotFound => InstallOutcome::ChocoNotInstalled,
            ProcessExit::SpawnFailed(_) => InstallOutcome::CannotStartInstaller,
        }
    }
}

#[async_trait]
impl PackageInstaller for ChocoInstaller {
    fn extensions(&self) -> &[&'static str] {
        &[".nupkg"]
    }

    async fn install(&self, package: &Path) -> Result<InstallOutcome, AgentError> {
        if tokio::fs::metadata(package).await.is_err() {
            warn!("Chocolatey package not found: {:?}", package);
            return Ok(InstallOutcome::PackageUnavailable);
        }

        let file_name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(name) = NupkgName::parse(&file_name) else {
            warn!("Cannot derive package id from {}", file_name);
            return Ok(InstallOutcome::PackageUnavailable);
        };
        let source = package
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());

        let mut args = vec![
            "install".to_string(),
            name.id.clone(),
            "--source".to_string(),
            source,
            "--yes".to_string(),
            "--no-progress".to_string(),
            "--use-package-exit-codes".to_string(),
        ];
        if let Some(version) = &name.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }

        info!("Installing Chocolatey package: {} {:?}", name.id, name.version);
        let exit = run_installer(&self.choco, &args).await;
        let outcome = Self::outcome(exit.clone());
        info!("choco finished with {:?} -> {}", exit, outcome);

        Ok(outcome)
    }
}
