//! First-time setup of the agent's storage

use tracing::info;

use crate::errors::AgentError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Create the storage layout and write default settings if none exist
///
/// Returns true when a new settings file was written.
pub async fn init(layout: &StorageLayout) -> Result<bool, AgentError> {
    info!("Setting up storage at {:?}", layout.base_dir);
    layout.setup().await?;

    let settings_file = layout.settings_file();
    if settings_file.exists().await {
        info!("Settings file already present at {:?}", settings_file.path());
        return Ok(false);
    }

    settings_file.write_json(&Settings::default()).await?;
    info!("Default settings written to {:?}", settings_file.path());
    Ok(true)
}

/// Read the settings file, falling back to defaults when it is missing
pub async fn load_settings(layout: &StorageLayout) -> Result<Settings, AgentError> {
    let settings_file = layout.settings_file();
    if !settings_file.exists().await {
        return Ok(Settings::default());
    }
    settings_file
        .read_json::<Settings>()
        .await
        .map_err(|e| AgentError::ConfigError(format!("{:?}: {}", settings_file.path(), e)))
}
