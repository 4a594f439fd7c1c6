use anyhow::Context;
use chatcore::{app, open_store, Config, Hub};
use tracing::info;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = Config::from_env()?;
    let store = open_store(&config.store)
        .await
        .context("failed to open chat store")?;
    let hub = Hub::init(store).await.context("failed to restore chat state")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Server is running on {}", config.bind_addr);

    axum::serve(listener, app(hub.clone()))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
            }
        })
        .await
        .context("server error")?;

    hub.teardown().await.context("failed to flush chat store")?;
    Ok(())
}
