//! Durable log of private and group messages, plus the presence and
//! room-membership tables the hub rebuilds itself from at startup.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    events::{GroupEntry, PrivateEntry},
    presence::PresenceRecord,
    rooms::GroupRoom,
    AppResult,
};

/// Everything a store holds, keyed by identity or room name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub presence: BTreeMap<String, PresenceRecord>,
    pub private: BTreeMap<String, Vec<PrivateEntry>>,
    pub groups: BTreeMap<String, GroupRoom>,
}

/// Writes must be durable when the call returns; callers deliver live events
/// only after a successful write.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Appends `entry` once under each owner's conversation.
    async fn append_private(&self, owners: [&str; 2], entry: &PrivateEntry) -> AppResult<()>;
    async fn append_group(&self, room: &str, entry: &GroupEntry) -> AppResult<()>;
    /// Replaces the stored member list, creating the room if needed.
    async fn save_room(&self, room: &str, members: &[String]) -> AppResult<()>;
    async fn delete_room(&self, room: &str) -> AppResult<()>;
    async fn save_presence(&self, identity: &str, record: &PresenceRecord) -> AppResult<()>;
    async fn read_all(&self) -> AppResult<StoreSnapshot>;
    async fn flush(&self) -> AppResult<()>;
}

/// Non-durable store, used by tests and `DATABASE_URL=memory`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self { inner: Mutex::new(snapshot) }
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append_private(&self, owners: [&str; 2], entry: &PrivateEntry) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        for owner in owners {
            inner
                .private
                .entry(owner.to_owned())
                .or_default()
                .push(entry.clone());
        }
        Ok(())
    }

    async fn append_group(&self, room: &str, entry: &GroupEntry) -> AppResult<()> {
        self.inner
            .lock()
            .await
            .groups
            .entry(room.to_owned())
            .or_default()
            .messages
            .push(entry.clone());
        Ok(())
    }

    async fn save_room(&self, room: &str, members: &[String]) -> AppResult<()> {
        self.inner
            .lock()
            .await
            .groups
            .entry(room.to_owned())
            .or_default()
            .members = members.to_vec();
        Ok(())
    }

    async fn delete_room(&self, room: &str) -> AppResult<()> {
        self.inner.lock().await.groups.remove(room);
        Ok(())
    }

    async fn save_presence(&self, identity: &str, record: &PresenceRecord) -> AppResult<()> {
        self.inner
            .lock()
            .await
            .presence
            .insert(identity.to_owned(), record.clone());
        Ok(())
    }

    async fn read_all(&self) -> AppResult<StoreSnapshot> {
        Ok(self.inner.lock().await.clone())
    }

    async fn flush(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(from: &str, message: &str) -> PrivateEntry {
        PrivateEntry { from: from.into(), message: message.into() }
    }

    #[tokio::test]
    async fn private_entries_are_duplicated_per_owner() {
        let store = MemoryStore::new();
        store.append_private(["alice", "bob"], &entry("alice", "hey")).await.unwrap();

        let all = store.read_all().await.unwrap();
        assert_eq!(all.private["alice"], vec![entry("alice", "hey")]);
        assert_eq!(all.private["bob"], vec![entry("alice", "hey")]);
    }

    #[tokio::test]
    async fn deleting_room_drops_members_and_log() {
        let store = MemoryStore::new();
        store.save_room("team", &["alice".to_owned()]).await.unwrap();
        store
            .append_group("team", &GroupEntry::now("alice", "hi").unwrap())
            .await
            .unwrap();
        store.delete_room("team").await.unwrap();

        assert!(store.read_all().await.unwrap().groups.is_empty());
    }
}
