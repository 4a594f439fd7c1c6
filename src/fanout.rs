//! Best-effort delivery of server events to live connections.
//!
//! Nothing is queued for absent targets: a missing or closed connection is a
//! [`Delivery::Unreachable`] outcome, never an error.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::{events::{ConnectionId, ServerEvent}, presence::PresenceRegistry};

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Unreachable,
}

pub struct ConnectionRouter {
    presence: Arc<PresenceRegistry>,
    connections: RwLock<HashMap<ConnectionId, EventSender>>,
    channels: RwLock<BTreeMap<String, HashSet<ConnectionId>>>,
}

impl ConnectionRouter {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self {
            presence,
            connections: RwLock::default(),
            channels: RwLock::default(),
        }
    }

    /// Registers a new live connection and returns the receiving half of its outbox.
    pub async fn attach(&self) -> (ConnectionId, EventReceiver) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(id, tx);
        (id, rx)
    }

    /// Forgets the connection and every channel subscription it held.
    pub async fn detach(&self, connection: ConnectionId) {
        self.connections.write().await.remove(&connection);
        let mut channels = self.channels.write().await;
        for subscribers in channels.values_mut() {
            subscribers.remove(&connection);
        }
        channels.retain(|_, subscribers| !subscribers.is_empty());
    }

    pub async fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> Delivery {
        let connections = self.connections.read().await;
        match connections.get(&connection) {
            Some(tx) if tx.send(event).is_ok() => Delivery::Delivered,
            _ => Delivery::Unreachable,
        }
    }

    pub async fn deliver_to_identity(&self, identity: &str, event: ServerEvent) -> Delivery {
        let Some(connection) = self.presence.live_connection(identity).await else {
            debug!(identity, event = event.name(), "recipient offline, not delivered");
            return Delivery::Unreachable;
        };
        self.send_to(connection, event).await
    }

    /// Sends to every subscriber of `room`, returning how many received it.
    pub async fn deliver_to_channel(&self, room: &str, event: ServerEvent) -> usize {
        let channels = self.channels.read().await;
        let Some(subscribers) = channels.get(room) else {
            return 0;
        };

        let connections = self.connections.read().await;
        let delivered = subscribers
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count();
        debug!(room, event = event.name(), delivered, "channel fan-out");
        delivered
    }

    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn subscribe(&self, room: &str, connection: ConnectionId) {
        self.channels
            .write()
            .await
            .entry(room.to_owned())
            .or_default()
            .insert(connection);
    }

    pub async fn unsubscribe(&self, room: &str, connection: ConnectionId) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(room) {
            subscribers.remove(&connection);
            if subscribers.is_empty() {
                channels.remove(room);
            }
        }
    }

    /// Delivers `event` to the channel's subscribers, then drops the channel.
    pub async fn close_channel(&self, room: &str, event: ServerEvent) -> usize {
        let Some(subscribers) = self.channels.write().await.remove(room) else {
            return 0;
        };

        let connections = self.connections.read().await;
        subscribers
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    #[cfg(test)]
    pub(crate) async fn subscribers(&self, room: &str) -> HashSet<ConnectionId> {
        self.channels.read().await.get(room).cloned().unwrap_or_default()
    }
}
