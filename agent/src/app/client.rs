//! Client callbacks invoked by the transport

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{debug, info};

use crate::deploy::engine::DeploymentEngine;
use crate::deploy::fsm::PackageStatus;
use crate::deploy::tracker::PackageRecord;
use crate::errors::AgentError;
use crate::models::deployment::{DeploymentRequest, DeploymentResult};

const CLIENT_TYPE: &str = "UP2DATE agent";

/// Key/value attribute reported when the backend requests the device config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAttribute {
    pub key: String,
    pub value: String,
}

impl ConfigAttribute {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// Callback surface handed to the transport
pub struct Client {
    engine: Arc<DeploymentEngine>,
    agent_version: String,
}

impl Client {
    pub fn new(engine: Arc<DeploymentEngine>, agent_version: impl Into<String>) -> Self {
        Self {
            engine,
            agent_version: agent_version.into(),
        }
    }

    /// Attributes describing this device
    pub fn on_config_request(&self) -> Vec<ConfigAttribute> {
        info!("Configuration requested");

        let unknown = || "unknown".to_string();
        let os_type = if cfg!(target_pointer_width = "64") {
            "64-bit"
        } else {
            "32-bit"
        };

        vec![
            ConfigAttribute::new("client", CLIENT_TYPE),
            ConfigAttribute::new("computer", System::host_name().unwrap_or_else(unknown)),
            ConfigAttribute::new("platform", System::name().unwrap_or_else(unknown)),
            ConfigAttribute::new("OS type", os_type),
            ConfigAttribute::new("version", System::os_version().unwrap_or_else(unknown)),
            ConfigAttribute::new("architecture", std::env::consts::ARCH),
            ConfigAttribute::new("agent version", self.agent_version.clone()),
        ]
    }

    /// Handle one deployment instruction
    pub async fn on_deployment(&self, request: &DeploymentRequest) -> DeploymentResult {
        debug!(package = %request.artifact_file_name, "Deployment received");
        self.engine.decide(request).await
    }

    /// Handle a cancel instruction; always acknowledged
    pub fn on_cancel(&self, id: i64) -> bool {
        self.engine.cancellations().request_cancel(id)
    }

    pub fn package_status(&self, package: &str) -> PackageStatus {
        let status = self.engine.tracker().current_status(package);
        debug!(package, "Status requested: {}", status);
        status
    }

    pub fn package_records(&self) -> Vec<PackageRecord> {
        self.engine.tracker().records()
    }

    /// Operator approval of a suggested package
    pub fn accept_suggestion(&self, package: &str) -> Result<(), AgentError> {
        info!(package, "Accepting suggested package");
        self.engine.tracker().accept_suggestion(package)
    }
}
