use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    events::{GroupEntry, PrivateEntry, ServerEvent},
    fanout::{ConnectionRouter, Delivery},
    store::ChatStore,
    AppError, AppResult,
};

use super::GroupMembership;

/// Entry point for send intents: persist first, then deliver best-effort.
pub struct MessageDispatcher {
    store: Arc<dyn ChatStore>,
    rooms: Arc<GroupMembership>,
    fanout: Arc<ConnectionRouter>,
}

impl MessageDispatcher {
    pub fn new(store: Arc<dyn ChatStore>, rooms: Arc<GroupMembership>, fanout: Arc<ConnectionRouter>) -> Self {
        Self { store, rooms, fanout }
    }

    /// Records the message in both conversations and pushes it to `to` if reachable.
    pub async fn send_private(&self, from: &str, to: &str, message: &str) -> AppResult<Delivery> {
        let entry = PrivateEntry {
            from: from.to_owned(),
            message: message.to_owned(),
        };
        self.store.append_private([from, to], &entry).await?;

        let delivery = self.fanout.deliver_to_identity(to, ServerEvent::Message(entry)).await;
        debug!(from, to, ?delivery, "private message");
        Ok(delivery)
    }

    /// Appends to the room log and fans out to the room's channel, sender
    /// included. Non-members get `Forbidden` and nothing is stored or sent.
    pub async fn send_group(&self, room: &str, from: &str, message: &str) -> AppResult<GroupEntry> {
        let mut rooms = self.rooms.lock().await;
        let Some(group) = rooms.get_mut(room).filter(|group| group.is_member(from)) else {
            warn!(room, from, "group message from non-member rejected");
            return Err(AppError::forbidden("you cannot take part in this chat room"));
        };

        let entry = GroupEntry::now(from, message)?;
        self.store.append_group(room, &entry).await?;
        group.messages.push(entry.clone());

        self.fanout
            .deliver_to_channel(room, ServerEvent::NewGroupMessage(entry.clone()))
            .await;
        Ok(entry)
    }
}
