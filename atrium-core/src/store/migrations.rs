//! Database migrations for the relational room store
//!
//! Versioned migrations applied atomically and tracked in the
//! room_schema_version table.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version for the room store
pub const CURRENT_ROOM_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial rooms, channels, messages, invites, files and audits schema",
        up_sql: r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS room_schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            -- Rooms (top-level tenant units)
            CREATE TABLE IF NOT EXISTS rooms (
                id BLOB PRIMARY KEY,                    -- RoomId (32 bytes)
                name TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL,
                rules TEXT NOT NULL,
                max_users INTEGER NOT NULL,
                max_channels INTEGER NOT NULL,
                total_files_bytes_allowed INTEGER NOT NULL,
                single_file_bytes_allowed INTEGER NOT NULL,
                message_days_to_live INTEGER NOT NULL,
                file_days_to_live INTEGER NOT NULL,
                welcome_message TEXT NOT NULL,
                announce_channel BLOB,                  -- ChannelId (optional)
                avatar_url TEXT,
                avatar_key TEXT,
                avatar_bytes INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Memberships (join table with roles)
            CREATE TABLE IF NOT EXISTS room_members (
                room_id BLOB NOT NULL,                  -- RoomId
                user_id TEXT NOT NULL,                  -- UserId
                role TEXT NOT NULL CHECK(role IN ('Admin', 'Moderator', 'Member')),
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (room_id, user_id),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_room_members_role ON room_members(room_id, role);

            -- Channels
            CREATE TABLE IF NOT EXISTS channels (
                id BLOB PRIMARY KEY,                    -- ChannelId (32 bytes)
                room_id BLOB NOT NULL,                  -- RoomId
                name TEXT NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('Text', 'Announcement')),
                avatar_url TEXT,
                avatar_key TEXT,
                avatar_bytes INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (room_id, kind, name),
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_channels_room ON channels(room_id);

            -- Messages
            CREATE TABLE IF NOT EXISTS messages (
                id BLOB PRIMARY KEY,                    -- MessageId (32 bytes)
                channel_id BLOB NOT NULL,               -- ChannelId
                author_user TEXT,                       -- UserId; NULL = system-authored
                body TEXT NOT NULL,
                upload_url TEXT,
                upload_key TEXT,
                upload_bytes INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id, created_at);

            -- Invite links
            CREATE TABLE IF NOT EXISTS room_invites (
                id BLOB PRIMARY KEY,                    -- InviteId (32 bytes)
                room_id BLOB NOT NULL,                  -- RoomId
                code TEXT NOT NULL UNIQUE,
                created_by TEXT NOT NULL,               -- UserId
                expires_at INTEGER,                     -- Optional expiration timestamp
                created_at INTEGER NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_invites_room ON room_invites(room_id);

            -- File records for externally stored artifacts
            CREATE TABLE IF NOT EXISTS room_files (
                id BLOB PRIMARY KEY,                    -- FileId (32 bytes)
                room_id BLOB NOT NULL,                  -- RoomId
                url TEXT NOT NULL,
                key TEXT NOT NULL,
                bytes INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('RoomAvatar', 'ChannelAvatar', 'MessageUpload')),
                created_at INTEGER NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_room_files_room ON room_files(room_id);

            -- Append-only audit logs
            CREATE TABLE IF NOT EXISTS room_audits (
                room_id BLOB NOT NULL,                  -- RoomId
                type_name TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS channel_audits (
                channel_id BLOB NOT NULL,               -- ChannelId
                type_name TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            );
        "#,
    }]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, rusqlite::Error> {
    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM room_schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), rusqlite::Error> {
    let current_version = get_current_version(pool)?;
    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as i64;

        tx.execute(
            "INSERT INTO room_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now],
        )?;

        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied room store migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        let manager = SqliteConnectionManager::memory();
        Pool::new(manager).expect("Failed to create pool")
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in [
            "rooms",
            "room_members",
            "channels",
            "messages",
            "room_invites",
            "room_files",
            "room_audits",
            "channel_audits",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = setup_test_pool();
        migrate(&pool).expect("First migration failed");
        migrate(&pool).expect("Second migration failed");

        let version = get_current_version(&pool).expect("Failed to get version");
        assert_eq!(version, CURRENT_ROOM_SCHEMA_VERSION);
    }

    #[test]
    fn test_cascade_room_to_channel() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let conn = pool.get().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();

        let room_id = vec![1u8; 32];
        conn.execute(
            "INSERT INTO rooms (id, name, category, rules, max_users, max_channels,
                total_files_bytes_allowed, single_file_bytes_allowed,
                message_days_to_live, file_days_to_live, welcome_message,
                created_at, updated_at)
             VALUES (?, 'r', 'c', '', 10, 10, 1000, 100, 0, 0, 'hi {name}', 0, 0)",
            params![room_id],
        )
        .unwrap();

        let channel_id = vec![2u8; 32];
        conn.execute(
            "INSERT INTO channels (id, room_id, name, kind, created_at, updated_at)
             VALUES (?, ?, 'general', 'Text', 0, 0)",
            params![channel_id, room_id],
        )
        .unwrap();

        conn.execute("DELETE FROM rooms WHERE id = ?", params![room_id])
            .unwrap();

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
