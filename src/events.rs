//! Wire types for the live session.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{presence::PresenceRecord, AppResult};

/// Identifies one live connection. The presence registry only stores this id,
/// the connection itself is owned by the session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub type PresenceSnapshot = BTreeMap<String, PresenceRecord>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateEntry {
    pub from: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub from: String,
    pub message: String,
    pub timestamp: String,
}

impl GroupEntry {
    pub fn now(from: &str, message: &str) -> AppResult<Self> {
        let timestamp = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)?;
        Ok(Self {
            from: from.to_owned(),
            message: message.to_owned(),
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateMessage {
    pub from: String,
    pub to: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub room_name: String,
    pub from: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join(String),
    Leave(String),
    Message(PrivateMessage),
    GroupMessage(GroupMessage),
    /// `[roomName, identity]`
    JoinRoom(String, String),
    /// `[roomName, identity]`
    LeaveRoom(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionNotice {
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomNotice {
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorNotice {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Connected(ConnectionNotice),
    UpdateUsers(PresenceSnapshot),
    Message(PrivateEntry),
    NewGroupMessage(GroupEntry),
    InvitedToGroup(RoomNotice),
    GroupDeleted(RoomNotice),
    Error(ErrorNotice),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorNotice { message: message.into() })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::UpdateUsers(_) => "updateUsers",
            ServerEvent::Message(_) => "message",
            ServerEvent::NewGroupMessage(_) => "newGroupMessage",
            ServerEvent::InvitedToGroup(_) => "invitedToGroup",
            ServerEvent::GroupDeleted(_) => "groupDeleted",
            ServerEvent::Error(_) => "error",
        }
    }
}
