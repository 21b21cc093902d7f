//! SQLite-based store implementation

use chrono::{DateTime, Local};
use idlewarden_util::{ChannelId, ClientDbId, ClientId};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, ConnectionRecord, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("Store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Connection history (append-only)
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                client_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                database_id INTEGER NOT NULL,
                nickname TEXT NOT NULL,
                is_recording INTEGER NOT NULL,
                unique_identifier TEXT NOT NULL,
                version TEXT NOT NULL,
                platform TEXT NOT NULL,
                created TEXT,
                last_connected TEXT,
                country TEXT,
                ip TEXT NOT NULL
            );

            -- Moderation audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_connections_timestamp ON connections(timestamp);
            CREATE INDEX IF NOT EXISTS idx_connections_database_id ON connections(database_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .ok()
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    let timestamp: String = row.get(1)?;
    let created: Option<String> = row.get(10)?;
    let last_connected: Option<String> = row.get(11)?;

    Ok(ConnectionRecord {
        id: row.get(0)?,
        timestamp: parse_timestamp(&timestamp).unwrap_or_else(idlewarden_util::now),
        client_id: ClientId::new(row.get(2)?),
        channel_id: ChannelId::new(row.get(3)?),
        database_id: ClientDbId::new(row.get::<_, i64>(4)? as u64),
        nickname: row.get(5)?,
        is_recording: row.get(6)?,
        unique_identifier: row.get(7)?,
        version: row.get(8)?,
        platform: row.get(9)?,
        created: created.as_deref().and_then(parse_timestamp),
        last_connected: last_connected.as_deref().and_then(parse_timestamp),
        country: row.get(12)?,
        ip: row.get(13)?,
    })
}

impl Store for SqliteStore {
    fn append_connection(&self, record: &ConnectionRecord) -> StoreResult<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO connections (
                timestamp, client_id, channel_id, database_id, nickname, is_recording,
                unique_identifier, version, platform, created, last_connected, country, ip
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.timestamp.to_rfc3339(),
                record.client_id.get(),
                record.channel_id.get(),
                record.database_id.get() as i64,
                record.nickname,
                record.is_recording,
                record.unique_identifier,
                record.version,
                record.platform,
                record.created.map(|dt| dt.to_rfc3339()),
                record.last_connected.map(|dt| dt.to_rfc3339()),
                record.country,
                record.ip,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(row_id = id, client_id = %record.client_id, "Connection record appended");
        Ok(id)
    }

    fn recent_connections(&self, limit: usize) -> StoreResult<Vec<ConnectionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, client_id, channel_id, database_id, nickname, is_recording,
                   unique_identifier, version, platform, created, last_connected, country, ip
            FROM connections ORDER BY id DESC LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], connection_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn append_audit(&self, event: &AuditEvent) -> StoreResult<i64> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        let id = conn.last_insert_rowid();
        debug!(event_id = id, "Audit event appended");
        Ok(id)
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp =
                parse_timestamp(&timestamp_str).unwrap_or_else(idlewarden_util::now);
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
