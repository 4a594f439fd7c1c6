use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{hub::Hub, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteRoomRequest {
    room_name: String,
    requester_id: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_group_chat(
    State(hub): State<Arc<Hub>>,
    Json(DeleteRoomRequest { room_name, requester_id }): Json<DeleteRoomRequest>,
) -> AppResult<Json<Value>> {
    hub.delete_group(&room_name, &requester_id).await?;
    Ok(Json(json!({ "success": true })))
}
