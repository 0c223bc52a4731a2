//! Application run options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::workers::deployer;

/// Options for a deployment run
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Deployer worker options
    pub deployer: deployer::Options,

    /// Maximum delay for the worker to finish in-flight deployments on shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            deployer: deployer::Options::default(),
            max_shutdown_delay: Duration::from_secs(300),
        }
    }
}
