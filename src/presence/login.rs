use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;

use crate::{events::PresenceSnapshot, hub::Hub, AppResult};

use super::ConnectionHint;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    id: String,
    #[serde(flatten)]
    hint: ConnectionHint,
}

/// Registers the caller-supplied identity as online. Nothing is verified.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(hub): State<Arc<Hub>>,
    Json(LoginRequest { id, hint }): Json<LoginRequest>,
) -> AppResult<Json<PresenceSnapshot>> {
    Ok(Json(hub.login(&id, hint).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn online_users(State(hub): State<Arc<Hub>>) -> Json<PresenceSnapshot> {
    Json(hub.presence.snapshot().await)
}
