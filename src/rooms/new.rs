use std::{collections::BTreeMap, sync::Arc};

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{events::PrivateEntry, hub::Hub, AppResult};

use super::RoomTable;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewRoomRequest {
    room_name: String,
    creator_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomMembers {
    pub(crate) success: bool,
    pub(crate) room_name: String,
    pub(crate) members: Vec<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_group_chat(
    State(hub): State<Arc<Hub>>,
    Json(NewRoomRequest { room_name, creator_id }): Json<NewRoomRequest>,
) -> AppResult<Json<RoomMembers>> {
    let members = hub.create_group(&room_name, &creator_id).await?;
    Ok(Json(RoomMembers { success: true, room_name, members }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn group_chats(State(hub): State<Arc<Hub>>) -> Json<RoomTable> {
    Json(hub.group_chats().await)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn private_chats(
    State(hub): State<Arc<Hub>>,
) -> AppResult<Json<BTreeMap<String, Vec<PrivateEntry>>>> {
    Ok(Json(hub.private_chats().await?))
}
