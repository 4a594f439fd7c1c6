//! Who is reachable, and through which connection.
//!
//! A record is created at login and lives for the rest of the process; going
//! offline only flips `online`. At most one connection is tracked per
//! identity, and a newer bind silently replaces the older one.

mod login;
mod logout;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    events::{ConnectionId, PresenceSnapshot},
    store::ChatStore,
    AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
        .route("/online-users", get(login::online_users))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub online: bool,
    #[serde(rename = "socketId")]
    pub connection: Option<ConnectionId>,
}

/// Client-supplied metadata recorded at login.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHint {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub socket_id: Option<ConnectionId>,
}

pub struct PresenceRegistry {
    records: RwLock<PresenceSnapshot>,
    store: Arc<dyn ChatStore>,
}

impl PresenceRegistry {
    /// Restored records start offline and unbound: no connection outlives the process.
    pub fn new(store: Arc<dyn ChatStore>, restored: PresenceSnapshot) -> Self {
        let records = restored
            .into_iter()
            .map(|(identity, record)| {
                let record = PresenceRecord { online: false, connection: None, ..record };
                (identity, record)
            })
            .collect();

        Self { records: RwLock::new(records), store }
    }

    /// Creates or overwrites the record for `identity`. No ownership check.
    pub async fn register(&self, identity: &str, hint: ConnectionHint) -> AppResult<PresenceRecord> {
        let mut records = self.records.write().await;
        let record = PresenceRecord {
            ip: hint.ip,
            port: hint.port,
            online: true,
            connection: hint.socket_id,
        };
        self.store.save_presence(identity, &record).await?;
        records.insert(identity.to_owned(), record.clone());
        info!(identity, "registered");
        Ok(record)
    }

    /// Returns `false` when no record exists for `identity`.
    pub async fn mark_offline(&self, identity: &str) -> AppResult<bool> {
        self.update(identity, |record| record.online = false).await
    }

    /// Binds `connection` to an already registered identity, evicting any
    /// previous connection. Returns `false` for identities that never logged in.
    pub async fn bind_connection(&self, identity: &str, connection: ConnectionId) -> AppResult<bool> {
        let bound = self
            .update(identity, |record| {
                record.online = true;
                record.connection = Some(connection);
            })
            .await?;
        if bound {
            info!(identity, %connection, "joined");
        }
        Ok(bound)
    }

    /// Marks whichever identity is bound to `connection` offline and returns it.
    pub async fn unbind_by_connection(&self, connection: ConnectionId) -> AppResult<Option<String>> {
        let mut records = self.records.write().await;
        let Some((identity, record)) = records
            .iter()
            .find(|(_, record)| record.connection == Some(connection))
        else {
            debug!(%connection, "disconnect of unbound connection");
            return Ok(None);
        };

        let identity = identity.clone();
        let updated = PresenceRecord { online: false, connection: None, ..record.clone() };
        self.store.save_presence(&identity, &updated).await?;
        records.insert(identity.clone(), updated);
        info!(%identity, %connection, "went offline");
        Ok(Some(identity))
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        self.records.read().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn get(&self, identity: &str) -> Option<PresenceRecord> {
        self.records.read().await.get(identity).cloned()
    }

    /// The connection to deliver to, if `identity` is online and bound.
    pub async fn live_connection(&self, identity: &str) -> Option<ConnectionId> {
        self.records
            .read()
            .await
            .get(identity)
            .filter(|record| record.online)
            .and_then(|record| record.connection)
    }

    async fn update(&self, identity: &str, apply: impl FnOnce(&mut PresenceRecord)) -> AppResult<bool> {
        let mut records = self.records.write().await;
        let Some(current) = records.get(identity) else {
            return Ok(false);
        };

        let mut updated = current.clone();
        apply(&mut updated);
        self.store.save_presence(identity, &updated).await?;
        records.insert(identity.to_owned(), updated);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> (PresenceRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PresenceRegistry::new(store.clone(), PresenceSnapshot::new()), store)
    }

    #[tokio::test]
    async fn register_overwrites_previous_record() {
        let (registry, store) = registry();
        let hint = ConnectionHint { ip: Some("10.0.0.1".into()), port: Some(1), socket_id: None };
        registry.register("alice", hint).await.unwrap();
        registry.register("alice", ConnectionHint::default()).await.unwrap();

        let record = registry.get("alice").await.unwrap();
        assert!(record.online);
        assert_eq!(record.ip, None);
        assert_eq!(store.read_all().await.unwrap().presence["alice"], record);
    }

    #[tokio::test]
    async fn mark_offline_unknown_identity_fails_lookup() {
        let (registry, _) = registry();
        assert!(!registry.mark_offline("ghost").await.unwrap());
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn bind_requires_login_and_evicts_previous_connection() {
        let (registry, _) = registry();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        assert!(!registry.bind_connection("alice", first).await.unwrap());
        registry.register("alice", ConnectionHint::default()).await.unwrap();
        assert!(registry.bind_connection("alice", first).await.unwrap());
        assert!(registry.bind_connection("alice", second).await.unwrap());
        assert_eq!(registry.live_connection("alice").await, Some(second));

        // the evicted connection no longer maps to anyone
        assert_eq!(registry.unbind_by_connection(first).await.unwrap(), None);
        assert!(registry.get("alice").await.unwrap().online);
    }

    #[tokio::test]
    async fn unbind_marks_offline_and_drops_handle() {
        let (registry, _) = registry();
        let conn = ConnectionId::new();
        registry.register("alice", ConnectionHint::default()).await.unwrap();
        registry.bind_connection("alice", conn).await.unwrap();

        assert_eq!(registry.unbind_by_connection(conn).await.unwrap().as_deref(), Some("alice"));
        let record = registry.get("alice").await.unwrap();
        assert!(!record.online);
        assert_eq!(record.connection, None);
        assert_eq!(registry.live_connection("alice").await, None);
    }

    #[tokio::test]
    async fn leave_keeps_handle_but_stops_delivery() {
        let (registry, _) = registry();
        let conn = ConnectionId::new();
        registry.register("alice", ConnectionHint::default()).await.unwrap();
        registry.bind_connection("alice", conn).await.unwrap();
        registry.mark_offline("alice").await.unwrap();

        assert_eq!(registry.get("alice").await.unwrap().connection, Some(conn));
        assert_eq!(registry.live_connection("alice").await, None);
    }

    #[tokio::test]
    async fn restored_records_start_offline() {
        let store = Arc::new(MemoryStore::new());
        let mut restored = PresenceSnapshot::new();
        restored.insert(
            "alice".into(),
            PresenceRecord { ip: None, port: None, online: true, connection: Some(ConnectionId::new()) },
        );

        let registry = PresenceRegistry::new(store, restored);
        let record = registry.get("alice").await.unwrap();
        assert!(!record.online);
        assert_eq!(record.connection, None);
    }
}
