//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::client::Client;
use crate::deploy::cancel::CancellationRegistry;
use crate::deploy::download::Downloader;
use crate::deploy::engine::DeploymentEngine;
use crate::deploy::gate::{PackageGate, SignatureVerifier};
use crate::deploy::tracker::{PackageRecord, PackageTracker};
use crate::errors::AgentError;
use crate::installer::registry::InstallerRegistry;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::utils::version_info;

/// Main application state
pub struct AppState {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Shared package tracker
    pub tracker: Arc<PackageTracker>,

    /// Decision engine
    pub engine: Arc<DeploymentEngine>,

    /// Transport callbacks
    pub client: Arc<Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// Restores the tracker from the persisted snapshot and marks package
    /// files already present in the download directory as available.
    pub async fn init(
        settings: &Settings,
        layout: StorageLayout,
        downloader: Arc<dyn Downloader>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, AgentError> {
        info!("Initializing application state...");
        layout.setup().await?;

        let registry = InstallerRegistry::with_defaults(&settings.installers);
        let gate = PackageGate::new(&settings.packages, &settings.signature, &registry, verifier);

        let tracker = Arc::new(PackageTracker::new());
        let snapshot = layout.packages_file();
        if snapshot.exists().await {
            match snapshot.read_json::<Vec<PackageRecord>>().await {
                Ok(records) => {
                    debug!("Restoring {} package records", records.len());
                    tracker.restore(records);
                }
                Err(e) => warn!("Ignoring unreadable package snapshot: {}", e),
            }
        }

        for name in layout.packages_dir().list_file_names().await? {
            if gate.admit(&name).is_ok() {
                // only unknown packages move, the rest keep their restored status
                let _ = tracker.mark_available(&name);
            }
        }

        let cancellations = Arc::new(CancellationRegistry::new(Duration::from_secs(
            settings.cancellation_ttl_secs,
        )));

        let engine = Arc::new(DeploymentEngine::new(
            gate,
            registry,
            tracker.clone(),
            cancellations,
            downloader,
            layout.packages_dir().path(),
        ));
        let client = Arc::new(Client::new(engine.clone(), version_info().version));

        Ok(Self {
            layout,
            tracker,
            engine,
            client,
        })
    }

    /// Persist the tracker snapshot
    pub async fn save_snapshot(&self) -> Result<(), AgentError> {
        let records = self.tracker.records();
        self.layout.packages_file().write_json(&records).await?;
        debug!("Saved {} package records", records.len());
        Ok(())
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        self.save_snapshot().await
    }
}
