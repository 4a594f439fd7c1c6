use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;

use crate::{hub::Hub, AppResult};

use super::new::RoomMembers;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InviteRequest {
    room_name: String,
    inviter_id: String,
    invitee_id: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn invite_to_group(
    State(hub): State<Arc<Hub>>,
    Json(InviteRequest { room_name, inviter_id, invitee_id }): Json<InviteRequest>,
) -> AppResult<Json<RoomMembers>> {
    let members = hub.invite(&room_name, &inviter_id, &invitee_id).await?;
    Ok(Json(RoomMembers { success: true, room_name, members }))
}
