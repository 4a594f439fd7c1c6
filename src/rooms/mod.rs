mod delete;
mod invite;
pub(crate) mod membership;
mod msg;
mod new;
mod room;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use membership::{GroupMembership, RoomTable};
pub use msg::MessageDispatcher;
pub use room::GroupRoom;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/group-chats", get(new::group_chats))
        .route("/private-chats", get(new::private_chats))
        .route("/create-group-chat", post(new::create_group_chat))
        .route("/invite-to-group", post(invite::invite_to_group))
        .route("/delete-group-chat", post(delete::delete_group_chat))
        .route("/ws", get(ws::chat_ws))
}
