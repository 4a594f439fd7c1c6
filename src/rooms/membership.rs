use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info};

use crate::{
    events::{ConnectionId, RoomNotice, ServerEvent},
    fanout::ConnectionRouter,
    store::ChatStore,
    AppError, AppResult,
};

use super::GroupRoom;

pub type RoomTable = BTreeMap<String, GroupRoom>;

/// Owns every active room. A room is either present in the table (active) or
/// absent; deletion removes it outright, so its name can be taken again.
pub struct GroupMembership {
    rooms: RwLock<RoomTable>,
    store: Arc<dyn ChatStore>,
    fanout: Arc<ConnectionRouter>,
}

impl GroupMembership {
    pub fn new(store: Arc<dyn ChatStore>, fanout: Arc<ConnectionRouter>, restored: RoomTable) -> Self {
        Self {
            rooms: RwLock::new(restored),
            store,
            fanout,
        }
    }

    pub async fn create(&self, room: &str, creator: &str) -> AppResult<Vec<String>> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room) {
            return Err(AppError::conflict(format!("room {room} already exists")));
        }

        let group = GroupRoom::new(creator);
        self.store.save_room(room, &group.members).await?;
        let members = group.members.clone();
        rooms.insert(room.to_owned(), group);
        info!(room, creator, "room created");
        Ok(members)
    }

    /// Adds `invitee` to the room. Inviting an existing member succeeds without change.
    pub async fn invite(&self, room: &str, inviter: &str, invitee: &str) -> AppResult<Vec<String>> {
        let mut rooms = self.rooms.write().await;
        let group = rooms
            .get_mut(room)
            .ok_or_else(|| AppError::not_found(format!("room {room} does not exist")))?;
        if !group.is_member(inviter) {
            return Err(AppError::forbidden(format!("{inviter} may not invite to {room}")));
        }
        if group.is_member(invitee) {
            return Ok(group.members.clone());
        }

        let mut members = group.members.clone();
        members.push(invitee.to_owned());
        self.store.save_room(room, &members).await?;
        group.add_member(invitee);
        info!(room, inviter, invitee, "member invited");

        let notice = ServerEvent::InvitedToGroup(RoomNotice { room_name: room.to_owned() });
        self.fanout.deliver_to_identity(invitee, notice).await;
        Ok(members)
    }

    pub async fn delete(&self, room: &str, requester: &str) -> AppResult<()> {
        let mut rooms = self.rooms.write().await;
        let group = rooms
            .get(room)
            .ok_or_else(|| AppError::not_found(format!("room {room} does not exist")))?;
        if !group.is_member(requester) {
            return Err(AppError::forbidden(format!("{requester} may not delete {room}")));
        }

        self.store.delete_room(room).await?;
        rooms.remove(room);
        info!(room, requester, "room deleted");

        let notice = ServerEvent::GroupDeleted(RoomNotice { room_name: room.to_owned() });
        self.fanout.close_channel(room, notice).await;
        Ok(())
    }

    pub async fn is_member(&self, room: &str, identity: &str) -> bool {
        self.rooms
            .read()
            .await
            .get(room)
            .is_some_and(|group| group.is_member(identity))
    }

    #[cfg(test)]
    pub(crate) async fn members(&self, room: &str) -> AppResult<Vec<String>> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|group| group.members.clone())
            .ok_or_else(|| AppError::not_found(format!("room {room} does not exist")))
    }

    /// Subscribes `connection` to the room's live channel. Non-members are ignored.
    pub async fn join_channel(&self, room: &str, identity: &str, connection: ConnectionId) -> bool {
        let rooms = self.rooms.read().await;
        if !rooms.get(room).is_some_and(|group| group.is_member(identity)) {
            debug!(room, identity, "channel join refused");
            return false;
        }
        self.fanout.subscribe(room, connection).await;
        info!(room, identity, "joined channel");
        true
    }

    /// Leaves the live channel only; persisted membership is untouched.
    pub async fn leave_channel(&self, room: &str, identity: &str, connection: ConnectionId) -> bool {
        let rooms = self.rooms.read().await;
        if !rooms.get(room).is_some_and(|group| group.is_member(identity)) {
            return false;
        }
        self.fanout.unsubscribe(room, connection).await;
        info!(room, identity, "left channel");
        true
    }

    pub async fn snapshot(&self) -> RoomTable {
        self.rooms.read().await.clone()
    }

    /// Exclusive access to the table, held by the dispatcher while it appends
    /// and fans out so that per-room order is preserved.
    pub(crate) async fn lock(&self) -> RwLockWriteGuard<'_, RoomTable> {
        self.rooms.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::PresenceSnapshot,
        presence::{ConnectionHint, PresenceRegistry},
        store::MemoryStore,
    };

    struct Fixture {
        rooms: GroupMembership,
        fanout: Arc<ConnectionRouter>,
        presence: Arc<PresenceRegistry>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let presence = Arc::new(PresenceRegistry::new(store.clone(), PresenceSnapshot::new()));
        let fanout = Arc::new(ConnectionRouter::new(presence.clone()));
        let rooms = GroupMembership::new(store.clone(), fanout.clone(), RoomTable::new());
        Fixture { rooms, fanout, presence, store }
    }

    #[tokio::test]
    async fn duplicate_active_name_conflicts_until_deleted() {
        let f = fixture();
        assert_eq!(f.rooms.create("team", "alice").await.unwrap(), ["alice"]);
        assert!(matches!(f.rooms.create("team", "bob").await, Err(AppError::Conflict(_))));

        f.rooms.delete("team", "alice").await.unwrap();
        assert_eq!(f.rooms.create("team", "bob").await.unwrap(), ["bob"]);
    }

    #[tokio::test]
    async fn invite_checks_room_and_inviter() {
        let f = fixture();
        assert!(matches!(f.rooms.invite("team", "alice", "bob").await, Err(AppError::NotFound(_))));

        f.rooms.create("team", "alice").await.unwrap();
        assert!(matches!(f.rooms.invite("team", "carol", "bob").await, Err(AppError::Forbidden(_))));
        assert_eq!(f.rooms.invite("team", "alice", "bob").await.unwrap(), ["alice", "bob"]);
        assert_eq!(f.rooms.invite("team", "bob", "bob").await.unwrap(), ["alice", "bob"]);
        assert_eq!(f.store.read_all().await.unwrap().groups["team"].members, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn invite_notifies_reachable_invitee_once() {
        let f = fixture();
        let (conn, mut rx) = f.fanout.attach().await;
        f.presence.register("bob", ConnectionHint::default()).await.unwrap();
        f.presence.bind_connection("bob", conn).await.unwrap();
        f.rooms.create("team", "alice").await.unwrap();

        f.rooms.invite("team", "alice", "bob").await.unwrap();
        f.rooms.invite("team", "alice", "bob").await.unwrap();

        let expected = ServerEvent::InvitedToGroup(RoomNotice { room_name: "team".into() });
        assert_eq!(rx.try_recv().ok(), Some(expected));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_requires_membership_and_notifies_subscribers() {
        let f = fixture();
        f.rooms.create("team", "alice").await.unwrap();
        let (conn, mut rx) = f.fanout.attach().await;
        assert!(f.rooms.join_channel("team", "alice", conn).await);

        assert!(matches!(f.rooms.delete("team", "mallory").await, Err(AppError::Forbidden(_))));
        f.rooms.delete("team", "alice").await.unwrap();
        assert!(matches!(f.rooms.delete("team", "alice").await, Err(AppError::NotFound(_))));

        assert!(!f.rooms.is_member("team", "alice").await);
        assert!(matches!(f.rooms.members("team").await, Err(AppError::NotFound(_))));
        let expected = ServerEvent::GroupDeleted(RoomNotice { room_name: "team".into() });
        assert_eq!(rx.try_recv().ok(), Some(expected));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn channel_subscription_is_gated_and_separate_from_membership() {
        let f = fixture();
        f.rooms.create("team", "alice").await.unwrap();
        let (conn, _rx) = f.fanout.attach().await;

        assert!(!f.rooms.join_channel("team", "carol", conn).await);
        assert!(!f.rooms.join_channel("nowhere", "alice", conn).await);
        assert!(f.fanout.subscribers("team").await.is_empty());

        assert!(f.rooms.join_channel("team", "alice", conn).await);
        assert!(f.rooms.leave_channel("team", "alice", conn).await);
        assert!(f.fanout.subscribers("team").await.is_empty());
        assert!(f.rooms.is_member("team", "alice").await);
    }

    #[tokio::test]
    async fn concurrent_invites_do_not_duplicate_members() {
        let f = Arc::new(fixture());
        f.rooms.create("team", "alice").await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                tokio::spawn(async move { f.rooms.invite("team", "alice", "bob").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(f.rooms.members("team").await.unwrap(), ["alice", "bob"]);
    }
}
