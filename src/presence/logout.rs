use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{hub::Hub, AppResult};

#[derive(Debug, Deserialize)]
pub(crate) struct LogoutRequest {
    id: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn logout(
    State(hub): State<Arc<Hub>>,
    Json(LogoutRequest { id }): Json<LogoutRequest>,
) -> AppResult<Json<Value>> {
    let success = hub.logout(&id).await?;
    Ok(Json(json!({ "success": success })))
}
