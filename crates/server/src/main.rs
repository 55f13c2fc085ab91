//! Process entrypoint: wires the Session Manager to an upstream client
//! factory, mounts the HTTP surface, and serves until SIGINT/SIGTERM.

use std::sync::Arc;

use api::AppState;
use gateway::{GatewayConfig, SessionManager};
use tracing_subscriber::EnvFilter;
use upstream::fake::FakeUpstreamClientFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    // The upstream protocol library is an external collaborator outside this
    // crate's scope; the in-memory fake stands in as the client factory
    // until a real implementation is wired in.
    let client_factory = Arc::new(FakeUpstreamClientFactory::new(false));
    let manager = Arc::new(SessionManager::new(
        config.session_manager_config(),
        client_factory,
    ));

    let state = AppState {
        manager: manager.clone(),
    };
    let router = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(manager))
        .await?;

    Ok(())
}

async fn wait_for_shutdown(manager: Arc<SessionManager>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
        tracing::info!("received ctrl-c, shutting down");
    }

    manager.shutdown().await;
}
