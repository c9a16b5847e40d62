//! SQLite Storage for runtime data
//!
//! 런타임 데이터 저장:
//! - Events: 디스패처가 받은 모든 이벤트 (id 기준 upsert)
//! - Activity: 세션별 활동 집계
//!
//! 설정 데이터는 JSON (storage/json/)에서 관리
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on startup.
//! - Version 1: Initial schema (events, activity)
//! - Version 2: Index events by kind

use super::EventStore;
use crate::event::{ActivityRecord, EventKind, EventRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Database file name inside the data directory
pub const DB_FILE: &str = "plexus.db";

/// Storage service for persisting events
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open (or create) `<data_dir>/plexus.db`
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Hook invocations and `watch` may write concurrently
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Create an in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        storage.initialize_schema()?;
        storage.run_migrations()?;

        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    /// Initialize database schema (base tables)
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Events table
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                kind TEXT NOT NULL,
                source TEXT NOT NULL,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                version TEXT NOT NULL DEFAULT '1.0'
            );

            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_timestamp
                ON events(timestamp DESC);

            -- Per-session activity aggregate
            CREATE TABLE IF NOT EXISTS activity (
                session_id TEXT PRIMARY KEY,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                event_count INTEGER NOT NULL DEFAULT 0,
                last_event_type TEXT NOT NULL,
                ended INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_activity_last_seen
                ON activity(last_seen DESC);

            -- Insert initial schema version if not exists
            INSERT OR IGNORE INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run all pending migrations
    fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version >= CURRENT_SCHEMA_VERSION {
            debug!(
                "Database schema is up to date (version {})",
                current_version
            );
            return Ok(());
        }

        info!(
            "Running database migrations from version {} to {}",
            current_version, CURRENT_SCHEMA_VERSION
        );

        let conn = self.lock()?;

        for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
            match version {
                2 => Self::migrate_v2(&conn)?,
                _ => {
                    warn!("Unknown migration version: {}", version);
                }
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![version],
            )
            .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;

            info!("Applied migration to version {}", version);
        }

        Ok(())
    }

    /// Migration to version 2: kind index for `events --kind` style lookups
    fn migrate_v2(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind, timestamp)",
            [],
        )
        .map_err(|e| Error::Storage(format!("Migration v2 failed: {}", e)))?;
        Ok(())
    }

    // ========================================================================
    // Event Operations
    // ========================================================================

    /// Insert or replace an event by id.
    ///
    /// The activity aggregate is only touched the first time an id is seen,
    /// so re-delivering the same record leaves counts unchanged.
    pub fn upsert_event(&self, record: &EventRecord) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        let timestamp = format_ts(&record.timestamp);

        let inserted = tx
            .execute(
                r#"
                INSERT OR IGNORE INTO events
                    (id, event_type, kind, source, session_id, timestamp, payload, metadata, version)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    record.id,
                    record.event_type,
                    record.kind.as_str(),
                    record.source,
                    record.session_id,
                    timestamp,
                    record.payload,
                    record.metadata,
                    record.version,
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to insert event: {}", e)))?;

        if inserted == 0 {
            tx.execute(
                r#"
                UPDATE events SET
                    event_type = ?2, kind = ?3, source = ?4, session_id = ?5,
                    timestamp = ?6, payload = ?7, metadata = ?8, version = ?9
                WHERE id = ?1
                "#,
                params![
                    record.id,
                    record.event_type,
                    record.kind.as_str(),
                    record.source,
                    record.session_id,
                    timestamp,
                    record.payload,
                    record.metadata,
                    record.version,
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to update event: {}", e)))?;
        } else {
            tx.execute(
                r#"
                INSERT INTO activity
                    (session_id, first_seen, last_seen, event_count, last_event_type, ended)
                VALUES (?1, ?2, ?2, 1, ?3, ?4)
                ON CONFLICT(session_id) DO UPDATE SET
                    first_seen = MIN(first_seen, excluded.first_seen),
                    last_event_type = CASE
                        WHEN excluded.last_seen >= last_seen THEN excluded.last_event_type
                        ELSE last_event_type
                    END,
                    last_seen = MAX(last_seen, excluded.last_seen),
                    event_count = event_count + 1,
                    ended = MAX(ended, excluded.ended)
                "#,
                params![
                    record.session_id,
                    timestamp,
                    record.event_type,
                    record.kind.ends_session(),
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to update activity: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit event: {}", e)))?;

        debug!(id = %record.id, event_type = %record.event_type, "Stored event");
        Ok(())
    }

    /// Most recent events first
    pub fn get_recent_events(&self, limit: u32) -> Result<Vec<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{} ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
                SELECT_EVENT
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![limit], read_event_row)
            .map_err(|e| Error::Storage(format!("Failed to query events: {}", e)))?;

        collect_events(rows)
    }

    /// Events of one session in arrival order
    pub fn get_session_events(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE session_id = ?1 ORDER BY timestamp ASC, rowid ASC",
                SELECT_EVENT
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![session_id], read_event_row)
            .map_err(|e| Error::Storage(format!("Failed to query events: {}", e)))?;

        collect_events(rows)
    }

    /// Total number of stored events
    pub fn count_events(&self) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| Error::Storage(format!("Failed to count events: {}", e)))
    }

    // ========================================================================
    // Activity Operations
    // ========================================================================

    /// Activity aggregate for one session
    pub fn get_activity(&self, session_id: &str) -> Result<Option<ActivityRecord>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!("{} WHERE session_id = ?1", SELECT_ACTIVITY),
                params![session_id],
                read_activity_row,
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get activity: {}", e)))?;

        row.map(ActivityRow::into_record).transpose()
    }

    /// Sessions ordered by last activity, newest first
    pub fn list_activity(&self, limit: Option<u32>) -> Result<Vec<ActivityRecord>> {
        let conn = self.lock()?;

        let query = match limit {
            Some(n) => format!("{} ORDER BY last_seen DESC LIMIT {}", SELECT_ACTIVITY, n),
            None => format!("{} ORDER BY last_seen DESC", SELECT_ACTIVITY),
        };

        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], read_activity_row)
            .map_err(|e| Error::Storage(format!("Failed to query activity: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| Error::Storage(format!("Failed to read activity: {}", e)))?;
            records.push(row.into_record()?);
        }
        Ok(records)
    }
}

#[async_trait]
impl EventStore for Storage {
    async fn emit_event(&self, record: &EventRecord) -> Result<()> {
        let storage = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || storage.upsert_event(&record))
            .await
            .map_err(|e| Error::Internal(format!("Storage task failed: {}", e)))?
    }

    async fn recent_events(&self, limit: u32) -> Result<Vec<EventRecord>> {
        self.get_recent_events(limit)
    }

    async fn session_events(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        self.get_session_events(session_id)
    }

    async fn activity(&self, session_id: &str) -> Result<Option<ActivityRecord>> {
        self.get_activity(session_id)
    }

    async fn list_activity(&self, limit: Option<u32>) -> Result<Vec<ActivityRecord>> {
        Storage::list_activity(self, limit)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const SELECT_EVENT: &str = r#"
    SELECT id, event_type, kind, source, session_id, timestamp, payload, metadata, version
    FROM events
"#;

const SELECT_ACTIVITY: &str = r#"
    SELECT session_id, first_seen, last_seen, event_count, last_event_type, ended
    FROM activity
"#;

/// Fixed-width RFC 3339 so that string ordering in SQL matches time ordering
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Invalid timestamp '{}': {}", s, e)))
}

struct EventRow {
    id: String,
    event_type: String,
    kind: String,
    source: String,
    session_id: String,
    timestamp: String,
    payload: String,
    metadata: String,
    version: String,
}

fn read_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        event_type: row.get(1)?,
        kind: row.get(2)?,
        source: row.get(3)?,
        session_id: row.get(4)?,
        timestamp: row.get(5)?,
        payload: row.get(6)?,
        metadata: row.get(7)?,
        version: row.get(8)?,
    })
}

fn collect_events(
    rows: impl Iterator<Item = rusqlite::Result<EventRow>>,
) -> Result<Vec<EventRecord>> {
    let mut records = Vec::new();
    for row in rows {
        let row = row.map_err(|e| Error::Storage(format!("Failed to read event: {}", e)))?;
        records.push(EventRecord {
            timestamp: parse_ts(&row.timestamp)?,
            kind: EventKind::parse(&row.kind),
            id: row.id,
            event_type: row.event_type,
            source: row.source,
            session_id: row.session_id,
            payload: row.payload,
            metadata: row.metadata,
            version: row.version,
        });
    }
    Ok(records)
}

struct ActivityRow {
    session_id: String,
    first_seen: String,
    last_seen: String,
    event_count: i64,
    last_event_type: String,
    ended: bool,
}

impl ActivityRow {
    fn into_record(self) -> Result<ActivityRecord> {
        Ok(ActivityRecord {
            first_seen: parse_ts(&self.first_seen)?,
            last_seen: parse_ts(&self.last_seen)?,
            session_id: self.session_id,
            event_count: self.event_count.max(0) as u64,
            last_event_type: self.last_event_type,
            ended: self.ended,
        })
    }
}

fn read_activity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityRow> {
    Ok(ActivityRow {
        session_id: row.get(0)?,
        first_seen: row.get(1)?,
        last_seen: row.get(2)?,
        event_count: row.get(3)?,
        last_event_type: row.get(4)?,
        ended: row.get(5)?,
    })
}
