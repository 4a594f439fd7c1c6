//! The process-wide chat context: one of each component, sharing one store.

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    events::{ClientEvent, ConnectionId, ConnectionNotice, PresenceSnapshot, PrivateEntry, ServerEvent},
    fanout::{ConnectionRouter, EventReceiver},
    presence::{ConnectionHint, PresenceRegistry},
    rooms::{GroupMembership, MessageDispatcher, RoomTable},
    store::ChatStore,
    AppError, AppResult,
};

pub struct Hub {
    pub presence: Arc<PresenceRegistry>,
    pub fanout: Arc<ConnectionRouter>,
    pub rooms: Arc<GroupMembership>,
    pub dispatcher: MessageDispatcher,
    store: Arc<dyn ChatStore>,
    /// Held across a presence change and its `updateUsers` broadcast, so
    /// broadcasts go out in the order the changes were applied.
    presence_gate: Mutex<()>,
}

impl Hub {
    /// Rebuilds presence and rooms from whatever `store` already holds.
    pub async fn init(store: Arc<dyn ChatStore>) -> AppResult<Arc<Self>> {
        let snapshot = store.read_all().await?;
        info!(
            users = snapshot.presence.len(),
            rooms = snapshot.groups.len(),
            "restored chat state"
        );

        let presence = Arc::new(PresenceRegistry::new(store.clone(), snapshot.presence));
        let fanout = Arc::new(ConnectionRouter::new(presence.clone()));
        let rooms = Arc::new(GroupMembership::new(store.clone(), fanout.clone(), snapshot.groups));
        let dispatcher = MessageDispatcher::new(store.clone(), rooms.clone(), fanout.clone());

        Ok(Arc::new(Self {
            presence,
            fanout,
            rooms,
            dispatcher,
            store,
            presence_gate: Mutex::new(()),
        }))
    }

    pub async fn teardown(&self) -> AppResult<()> {
        info!("flushing chat store");
        self.store.flush().await
    }

    pub async fn login(&self, identity: &str, hint: ConnectionHint) -> AppResult<PresenceSnapshot> {
        let _gate = self.presence_gate.lock().await;
        self.presence.register(identity, hint).await?;
        Ok(self.broadcast_presence().await)
    }

    pub async fn logout(&self, identity: &str) -> AppResult<bool> {
        let _gate = self.presence_gate.lock().await;
        let known = self.presence.mark_offline(identity).await?;
        if known {
            self.broadcast_presence().await;
        }
        Ok(known)
    }

    pub async fn create_group(&self, room: &str, creator: &str) -> AppResult<Vec<String>> {
        self.rooms.create(room, creator).await
    }

    pub async fn invite(&self, room: &str, inviter: &str, invitee: &str) -> AppResult<Vec<String>> {
        self.rooms.invite(room, inviter, invitee).await
    }

    pub async fn delete_group(&self, room: &str, requester: &str) -> AppResult<()> {
        self.rooms.delete(room, requester).await
    }

    pub async fn private_chats(&self) -> AppResult<BTreeMap<String, Vec<PrivateEntry>>> {
        Ok(self.store.read_all().await?.private)
    }

    pub async fn group_chats(&self) -> RoomTable {
        self.rooms.snapshot().await
    }

    /// Opens a live connection and greets it with its id.
    pub async fn connect(&self) -> (ConnectionId, EventReceiver) {
        let (connection, rx) = self.fanout.attach().await;
        let notice = ServerEvent::Connected(ConnectionNotice { connection_id: connection });
        self.fanout.send_to(connection, notice).await;
        info!(%connection, "client connected");
        (connection, rx)
    }

    /// Applies one inbound event. Failures are reported to `connection` only.
    pub async fn handle(&self, connection: ConnectionId, event: ClientEvent) {
        if let Err(err) = self.apply(connection, event).await {
            match &err {
                AppError::Forbidden(_) | AppError::NotFound(_) | AppError::Conflict(_) => {
                    warn!(%connection, "event rejected: {err}")
                }
                _ => error!(%connection, "event failed: {err}"),
            }
            self.fanout.send_to(connection, ServerEvent::error(err.to_string())).await;
        }
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        self.fanout.detach(connection).await;
        let _gate = self.presence_gate.lock().await;
        match self.presence.unbind_by_connection(connection).await {
            Ok(Some(_)) => {
                self.broadcast_presence().await;
            }
            Ok(None) => {}
            Err(err) => error!(%connection, "failed to record disconnect: {err}"),
        }
        info!(%connection, "client disconnected");
    }

    async fn apply(&self, connection: ConnectionId, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::Join(identity) => {
                let _gate = self.presence_gate.lock().await;
                if self.presence.bind_connection(&identity, connection).await? {
                    self.broadcast_presence().await;
                }
            }
            ClientEvent::Leave(identity) => {
                self.logout(&identity).await?;
            }
            ClientEvent::Message(msg) => {
                self.dispatcher.send_private(&msg.from, &msg.to, &msg.message).await?;
            }
            ClientEvent::GroupMessage(msg) => {
                self.dispatcher.send_group(&msg.room_name, &msg.from, &msg.message).await?;
            }
            ClientEvent::JoinRoom(room, identity) => {
                self.rooms.join_channel(&room, &identity, connection).await;
            }
            ClientEvent::LeaveRoom(room, identity) => {
                self.rooms.leave_channel(&room, &identity, connection).await;
            }
        }
        Ok(())
    }

    /// Callers must hold `presence_gate`.
    async fn broadcast_presence(&self) -> PresenceSnapshot {
        let snapshot = self.presence.snapshot().await;
        self.fanout.broadcast(ServerEvent::UpdateUsers(snapshot.clone())).await;
        snapshot
    }

    #[cfg(test)]
    pub(crate) async fn group_log(&self, room: &str) -> Vec<crate::events::GroupEntry> {
        self.rooms
            .snapshot()
            .await
            .remove(room)
            .map(|group| group.messages)
            .unwrap_or_default()
    }
}
