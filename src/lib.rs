pub mod config;
pub mod db;
pub mod events;
pub mod fanout;
pub mod hub;
pub mod presence;
pub mod rooms;
pub mod store;

mod appresult;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};
pub use config::{Config, StoreConfig};
pub use hub::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

/// The administrative HTTP endpoints plus the `/ws` live session.
pub fn app(hub: Arc<Hub>) -> Router {
    Router::new()
        .merge(presence::router())
        .merge(rooms::router())
        .with_state(AppState { hub })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Opens the store selected by `config`.
pub async fn open_store(config: &StoreConfig) -> AppResult<Arc<dyn store::ChatStore>> {
    Ok(match config {
        StoreConfig::Memory => Arc::new(store::MemoryStore::new()),
        StoreConfig::Sqlite(url) => Arc::new(db::SqliteStore::connect(url).await?),
    })
}
