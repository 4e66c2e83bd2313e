use std::sync::Arc;

use farm_api::{HttpApi, SupervisorApiAdapter, axum};
use farm_runtime::SupervisorHandle;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

/// Serves the dashboard until the farm shuts down.
pub async fn spawn(addr: &str, handle: SupervisorHandle) -> anyhow::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    info!(target: "farm.dashboard", addr = %listener.local_addr()?, "dashboard listening");

    let router = HttpApi::new(Arc::new(SupervisorApiAdapter::new(handle.clone()))).router();
    let shutdown = handle.shutdown_token();
    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!(target: "farm.dashboard", error = %e, "dashboard stopped");
        }
    }))
}
