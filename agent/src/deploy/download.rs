//! Download collaborator

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentRequest;

/// Fetches the artifact of a deployment into a local directory
///
/// The transport provides the implementation; the file must end up at
/// `destination/<artifact file name>`.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, request: &DeploymentRequest, destination: &Path) -> Result<(), AgentError>;
}

/// Final path component of an artifact file name
pub fn artifact_local_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

/// Copies artifacts from a local staging directory
#[derive(Debug, Clone)]
pub struct LocalDownloader {
    source_dir: PathBuf,
}

impl LocalDownloader {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

#[async_trait]
impl Downloader for LocalDownloader {
    async fn download(&self, request: &DeploymentRequest, destination: &Path) -> Result<(), AgentError> {
        let name = artifact_local_name(&request.artifact_file_name);
        let source = File::new(self.source_dir.join(name));
        if !source.exists().await {
            return Err(AgentError::DownloadError(format!(
                "Artifact {} not found in {:?}",
                name, self.source_dir
            )));
        }

        let bytes = source.copy_to(&File::new(destination.join(name))).await?;
        debug!("Copied {} ({} bytes) into {:?}", name, bytes, destination);
        Ok(())
    }
}
