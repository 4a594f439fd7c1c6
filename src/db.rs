use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use crate::{
    events::{ConnectionId, GroupEntry, PrivateEntry},
    presence::PresenceRecord,
    store::{ChatStore, StoreSnapshot},
    AppResult,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS presence (
    identity TEXT PRIMARY KEY,
    ip TEXT,
    port INTEGER,
    online INTEGER NOT NULL,
    socket_id TEXT
);
CREATE TABLE IF NOT EXISTS private_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    sender TEXT NOT NULL,
    message TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rooms (
    name TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS room_members (
    room TEXT NOT NULL,
    position INTEGER NOT NULL,
    member TEXT NOT NULL,
    PRIMARY KEY (room, member)
);
CREATE TABLE IF NOT EXISTS group_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    room TEXT NOT NULL,
    sender TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
"#;

pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Self::from_pool(db_pool).await
    }

    /// Single connection, since every `sqlite::memory:` connection is its own database.
    pub async fn in_memory() -> AppResult<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(db_pool).await
    }

    pub async fn from_pool(db_pool: SqlitePool) -> AppResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&db_pool).await?;
        Ok(Self { db_pool })
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn append_private(&self, owners: [&str; 2], entry: &PrivateEntry) -> AppResult<()> {
        let mut tx = self.db_pool.begin().await?;
        for owner in owners {
            sqlx::query("INSERT INTO private_messages (owner,sender,message) VALUES (?,?,?)")
                .bind(owner)
                .bind(&entry.from)
                .bind(&entry.message)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_group(&self, room: &str, entry: &GroupEntry) -> AppResult<()> {
        sqlx::query("INSERT INTO group_messages (room,sender,message,timestamp) VALUES (?,?,?,?)")
            .bind(room)
            .bind(&entry.from)
            .bind(&entry.message)
            .bind(&entry.timestamp)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn save_room(&self, room: &str, members: &[String]) -> AppResult<()> {
        let mut tx = self.db_pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO rooms (name) VALUES (?)")
            .bind(room)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM room_members WHERE room=?")
            .bind(room)
            .execute(&mut *tx)
            .await?;
        for (position, member) in members.iter().enumerate() {
            sqlx::query("INSERT INTO room_members (room,position,member) VALUES (?,?,?)")
                .bind(room)
                .bind(position as i64)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_room(&self, room: &str) -> AppResult<()> {
        let mut tx = self.db_pool.begin().await?;
        sqlx::query("DELETE FROM group_messages WHERE room=?")
            .bind(room)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM room_members WHERE room=?")
            .bind(room)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM rooms WHERE name=?")
            .bind(room)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_presence(&self, identity: &str, record: &PresenceRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO presence (identity,ip,port,online,socket_id) VALUES (?,?,?,?,?)
             ON CONFLICT(identity) DO UPDATE SET
                ip=excluded.ip, port=excluded.port, online=excluded.online, socket_id=excluded.socket_id",
        )
        .bind(identity)
        .bind(&record.ip)
        .bind(record.port.map(i64::from))
        .bind(record.online)
        .bind(record.connection.map(|c| c.to_string()))
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    async fn read_all(&self) -> AppResult<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::default();

        let presence: Vec<(String, Option<String>, Option<i64>, bool, Option<String>)> =
            sqlx::query_as("SELECT identity,ip,port,online,socket_id FROM presence")
                .fetch_all(&self.db_pool)
                .await?;
        for (identity, ip, port, online, socket_id) in presence {
            let record = PresenceRecord {
                ip,
                port: port.and_then(|p| u16::try_from(p).ok()),
                online,
                connection: socket_id
                    .and_then(|s| Uuid::parse_str(&s).ok())
                    .map(ConnectionId::from),
            };
            snapshot.presence.insert(identity, record);
        }

        let private: Vec<(String, String, String)> =
            sqlx::query_as("SELECT owner,sender,message FROM private_messages ORDER BY id")
                .fetch_all(&self.db_pool)
                .await?;
        for (owner, from, message) in private {
            snapshot
                .private
                .entry(owner)
                .or_default()
                .push(PrivateEntry { from, message });
        }

        let rooms: Vec<(String,)> = sqlx::query_as("SELECT name FROM rooms")
            .fetch_all(&self.db_pool)
            .await?;
        for (name,) in rooms {
            snapshot.groups.entry(name).or_default();
        }

        let members: Vec<(String, String)> =
            sqlx::query_as("SELECT room,member FROM room_members ORDER BY room,position")
                .fetch_all(&self.db_pool)
                .await?;
        for (room, member) in members {
            if let Some(group) = snapshot.groups.get_mut(&room) {
                group.members.push(member);
            }
        }

        let messages: Vec<(String, String, String, String)> =
            sqlx::query_as("SELECT room,sender,message,timestamp FROM group_messages ORDER BY id")
                .fetch_all(&self.db_pool)
                .await?;
        for (room, from, message, timestamp) in messages {
            if let Some(group) = snapshot.groups.get_mut(&room) {
                group.messages.push(GroupEntry { from, message, timestamp });
            }
        }

        Ok(snapshot)
    }

    async fn flush(&self) -> AppResult<()> {
        self.db_pool.close().await;
        Ok(())
    }
}
