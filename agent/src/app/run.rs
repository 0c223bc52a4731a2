//! Deployment run loop

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::models::deployment::{DeploymentRequest, DeploymentResult};
use crate::workers::deployer;

/// Feed a batch of instructions through the deployer worker
///
/// Cancel ids are registered before any deployment is submitted. Results come
/// back in request order. The tracker snapshot is saved once the worker stops.
pub async fn run(
    app_state: Arc<AppState>,
    options: &AppOptions,
    requests: Vec<DeploymentRequest>,
    cancel_ids: Vec<i64>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<Vec<DeploymentResult>, AgentError> {
    info!("Running {} deployment(s)...", requests.len());

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let (handle, instructions) = deployer::channel(&options.deployer);

    let client = app_state.client.clone();
    let worker = tokio::spawn(async move {
        deployer::run(
            client,
            instructions,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    let forward = shutdown_tx.clone();
    let signal_watch = tokio::spawn(async move {
        shutdown_signal.await;
        let _ = forward.send(());
    });

    for id in cancel_ids {
        handle.cancel(id).await?;
    }

    let results = join_all(requests.into_iter().map(|request| {
        let handle = handle.clone();
        async move { handle.deploy(request).await }
    }))
    .await;

    drop(handle);
    signal_watch.abort();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(options.max_shutdown_delay, worker).await {
        Ok(joined) => joined.map_err(|e| AgentError::ShutdownError(e.to_string()))?,
        Err(_) => error!(
            "Deployer worker did not stop within {:?}",
            options.max_shutdown_delay
        ),
    }

    app_state.shutdown().await?;
    results.into_iter().collect()
}
