//! Installer registry

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::installer::choco::ChocoInstaller;
use crate::installer::msi::MsiInstaller;
use crate::installer::{normalize_extension, PackageInstaller};
use crate::storage::settings::InstallerSettings;

/// Maps file extensions to the installer able to handle them
///
/// Built once at startup; lookups are case-insensitive and the first
/// registered installer for an extension wins.
#[derive(Clone, Default)]
pub struct InstallerRegistry {
    installers: Vec<Arc<dyn PackageInstaller>>,
}

impl InstallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in installers configured from settings
    pub fn with_defaults(settings: &InstallerSettings) -> Self {
        Self::new()
            .register(Arc::new(MsiInstaller::new(&settings.msiexec_path)))
            .register(Arc::new(ChocoInstaller::new(&settings.choco_path)))
    }

    /// Register an installer; extensions already claimed stay with the earlier one
    pub fn register(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        for extension in installer.extensions() {
            if self.supports(extension) {
                debug!("Extension {} already registered, keeping first installer", extension);
            } else {
                debug!("Registered installer for {}", normalize_extension(extension));
            }
        }
        self.installers.push(installer);
        self
    }

    /// Find the installer for an extension
    pub fn resolve(&self, extension: &str) -> Option<Arc<dyn PackageInstaller>> {
        self.installers
            .iter()
            .find(|installer| installer.can_handle(extension))
            .cloned()
    }

    /// Check whether any installer handles the extension
    pub fn supports(&self, extension: &str) -> bool {
        self.resolve(extension).is_some()
    }

    /// All registered extensions
    pub fn extensions(&self) -> BTreeSet<String> {
        self.installers
            .iter()
            .flat_map(|installer| installer.extensions().iter().map(|e| normalize_extension(e)))
            .collect()
    }

    /// Number of registered installers
    pub fn len(&self) -> usize {
        self.installers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installers.is_empty()
    }
}

impl std::fmt::Debug for InstallerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}
