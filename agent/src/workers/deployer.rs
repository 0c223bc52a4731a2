//! Deployment worker
//!
//! Sits between the transport and the engine: cancel requests are answered
//! right away, every deployment runs on its own task so different packages
//! are processed concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::app::client::Client;
use crate::deploy::fsm::PackageStatus;
use crate::errors::AgentError;
use crate::models::deployment::{DeploymentRequest, DeploymentResult};

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Capacity of the instruction channel
    pub queue_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { queue_size: 32 }
    }
}

/// Instruction handed to the worker by the transport
#[derive(Debug)]
pub enum Instruction {
    Deploy {
        request: DeploymentRequest,
        reply: oneshot::Sender<DeploymentResult>,
    },
    Cancel {
        id: i64,
        reply: oneshot::Sender<bool>,
    },
    Status {
        package: String,
        reply: oneshot::Sender<PackageStatus>,
    },
}

/// Sending side of the worker's instruction channel
#[derive(Debug, Clone)]
pub struct DeployerHandle {
    tx: mpsc::Sender<Instruction>,
}

impl DeployerHandle {
    /// Submit a deployment and wait for its result
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentResult, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(Instruction::Deploy { request, reply }).await?;
        rx.await
            .map_err(|_| AgentError::ShutdownError("Deployment dropped by worker".to_string()))
    }

    /// Register a cancel request
    pub async fn cancel(&self, id: i64) -> Result<bool, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(Instruction::Cancel { id, reply }).await?;
        rx.await
            .map_err(|_| AgentError::ShutdownError("Cancel dropped by worker".to_string()))
    }

    /// Current status of a package
    pub async fn status(&self, package: &str) -> Result<PackageStatus, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(Instruction::Status {
            package: package.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| AgentError::ShutdownError("Status query dropped by worker".to_string()))
    }

    async fn send(&self, instruction: Instruction) -> Result<(), AgentError> {
        self.tx
            .send(instruction)
            .await
            .map_err(|_| AgentError::ShutdownError("Deployer worker is not running".to_string()))
    }
}

/// Create the instruction channel
pub fn channel(options: &Options) -> (DeployerHandle, mpsc::Receiver<Instruction>) {
    let (tx, rx) = mpsc::channel(options.queue_size.max(1));
    (DeployerHandle { tx }, rx)
}

/// Run the deployer worker
///
/// Stops on shutdown or when every handle is dropped, then waits for the
/// deployments already started.
pub async fn run(
    client: Arc<Client>,
    mut instructions: mpsc::Receiver<Instruction>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deployer worker starting...");
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                break;
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!("Deployment task failed: {}", e);
                }
            }
            instruction = instructions.recv() => {
                let Some(instruction) = instruction else {
                    debug!("Instruction channel closed");
                    break;
                };
                dispatch(&client, instruction, &mut in_flight);
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("Deployment task failed: {}", e);
        }
    }
    info!("Deployer worker stopped");
}

fn dispatch(client: &Arc<Client>, instruction: Instruction, in_flight: &mut JoinSet<()>) {
    match instruction {
        Instruction::Deploy { request, reply } => {
            let client = client.clone();
            in_flight.spawn(async move {
                let result = client.on_deployment(&request).await;
                if reply.send(result).is_err() {
                    debug!(request_id = request.id, "Result receiver dropped");
                }
            });
        }
        Instruction::Cancel { id, reply } => {
            let _ = reply.send(client.on_cancel(id));
        }
        Instruction::Status { package, reply } => {
            let _ = reply.send(client.package_status(&package));
        }
    }
}
