//! Package admission and signature checks

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::installer::normalize_extension;
use crate::installer::registry::InstallerRegistry;
use crate::installer::InstallOutcome;
use crate::models::deployment::artifact_extension;
use crate::storage::settings::{PackageSettings, SignatureSettings, SignatureVerificationLevel};
use crate::utils::normalize_thumbprint;

/// Why a package was refused before any I/O
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    #[error("Package is not allowed - deployment rejected")]
    NotAllowed,

    #[error("not supported - deployment rejected")]
    NotSupported,
}

/// Certificate that signed a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub subject: String,
    pub thumbprint: String,

    /// The certificate chains to a trusted root
    pub trusted: bool,
}

/// Reads the signature of a package file
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// The signer of the package, or `None` when it is unsigned
    async fn signer(&self, package: &Path) -> Result<Option<Signer>, AgentError>;
}

/// Verifier for platforms without signature support: nothing is signed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignatureVerifier;

#[async_trait]
impl SignatureVerifier for NoSignatureVerifier {
    async fn signer(&self, _package: &Path) -> Result<Option<Signer>, AgentError> {
        Ok(None)
    }
}

/// Admission gate applied to every deployment
pub struct PackageGate {
    allowed_extensions: BTreeSet<String>,
    supported_extensions: BTreeSet<String>,
    check_signature: bool,
    level: SignatureVerificationLevel,
    whitelist: BTreeSet<String>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl PackageGate {
    pub fn new(
        packages: &PackageSettings,
        signature: &SignatureSettings,
        registry: &InstallerRegistry,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            allowed_extensions: packages
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            supported_extensions: registry.extensions(),
            check_signature: signature.check_signature,
            level: signature.level,
            whitelist: signature
                .whitelist
                .iter()
                .map(|t| normalize_thumbprint(t))
                .filter(|t| !t.is_empty())
                .collect(),
            verifier,
        }
    }

    /// Configured signature level
    pub fn level(&self) -> SignatureVerificationLevel {
        self.level
    }

    /// Check the extension allow-list, then format support
    pub fn admit(&self, file_name: &str) -> Result<(), GateRejection> {
        let Some(extension) = artifact_extension(file_name) else {
            return Err(GateRejection::NotAllowed);
        };

        if !self.allowed_extensions.contains(&extension) {
            debug!("Extension {} not in allow-list", extension);
            return Err(GateRejection::NotAllowed);
        }

        if !self.supported_extensions.contains(&extension) {
            debug!("No installer for extension {}", extension);
            return Err(GateRejection::NotSupported);
        }

        Ok(())
    }

    /// Verify the package signature against the configured level
    ///
    /// Always passes when signature checking is disabled.
    pub async fn verify(&self, package: &Path) -> Result<(), InstallOutcome> {
        if !self.check_signature {
            return Ok(());
        }

        let signer = match self.verifier.signer(package).await {
            Ok(signer) => signer,
            Err(e) => {
                warn!("Cannot read signature of {:?}: {}", package, e);
                return Err(InstallOutcome::SignatureVerificationFailed);
            }
        };

        let Some(signer) = signer else {
            warn!("Package {:?} is not signed", package);
            return Err(InstallOutcome::SignatureVerificationFailed);
        };

        let accepted = match self.level {
            SignatureVerificationLevel::SignedByAnyCertificate => true,
            SignatureVerificationLevel::SignedByTrustedCertificate => signer.trusted,
            SignatureVerificationLevel::SignedByWhitelistedCertificate => self
                .whitelist
                .contains(&normalize_thumbprint(&signer.thumbprint)),
        };

        if accepted {
            debug!("Signature of {:?} accepted ({})", package, signer.subject);
            Ok(())
        } else {
            warn!(
                "Signature of {:?} by '{}' does not satisfy {}",
                package, signer.subject, self.level
            );
            Err(InstallOutcome::SignatureVerificationFailed)
        }
    }
}
