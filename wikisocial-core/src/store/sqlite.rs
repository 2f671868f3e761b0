//! SQLite collaborator adapter
//!
//! Persistent implementation of the activity log, relationship graph, and
//! privacy rules. Uses embedded migrations managed via PRAGMA
//! user_version. Timestamps are stored as RFC 3339 text in UTC; event
//! payloads are stored as tagged JSON so every kind round-trips without
//! per-kind columns.

use crate::error::{Error, Result};
use crate::store::{ActivityStore, GraphChange, PrivacyStore, RelationshipGraph};
use crate::types::{
    ActivityItem, ActivityPayload, ActorId, Deadline, RelationshipRecord, RelationshipType,
};
use crate::visibility::{PrivacyLevel, ProfileField};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS actors (
        id               INTEGER PRIMARY KEY,
        name             TEXT
    );

    CREATE TABLE IF NOT EXISTS activity (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        actor_id         INTEGER NOT NULL REFERENCES actors(id),
        kind             TEXT NOT NULL,
        ts               DATETIME NOT NULL,

        -- Second actor for friend/foe adds and message recipients;
        -- NULL when the kind has none
        related_id       INTEGER,

        -- Tagged payload, serialized whole
        payload          JSON NOT NULL
    );

    CREATE TABLE IF NOT EXISTS relationships (
        owner_id         INTEGER NOT NULL REFERENCES actors(id),
        other_id         INTEGER NOT NULL REFERENCES actors(id),
        rel_type         TEXT NOT NULL,
        established_at   DATETIME NOT NULL,

        PRIMARY KEY (owner_id, other_id, rel_type)
    );

    CREATE TABLE IF NOT EXISTS profile_privacy (
        owner_id         INTEGER NOT NULL REFERENCES actors(id),
        field            TEXT NOT NULL,
        level            TEXT NOT NULL,

        PRIMARY KEY (owner_id, field)
    );

    CREATE INDEX IF NOT EXISTS idx_activity_actor_ts ON activity(actor_id, ts DESC);
    CREATE INDEX IF NOT EXISTS idx_activity_related ON activity(related_id, kind);
    CREATE INDEX IF NOT EXISTS idx_relationships_owner
        ON relationships(owner_id, rel_type, established_at DESC);
    "#,
];

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<GraphChange>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self::wrap(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        run_migrations(&conn)
    }

    // ============================================
    // Write operations (host platform surface)
    // ============================================

    /// Insert or update an actor
    pub fn upsert_actor(&self, id: ActorId, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO actors (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id.0, name],
        )?;
        Ok(())
    }

    /// Append one event to the log
    pub fn insert_activity(&self, item: &ActivityItem) -> Result<()> {
        let related = match &item.payload {
            ActivityPayload::FriendAdded { other } | ActivityPayload::FoeAdded { other } => {
                Some(other.0)
            }
            ActivityPayload::UserMessage { to, .. } => Some(to.0),
            _ => None,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO activity (actor_id, kind, ts, related_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.actor_id.0,
                item.kind().as_str(),
                item.timestamp.to_rfc3339(),
                related,
                serde_json::to_string(&item.payload)?,
            ],
        )?;
        Ok(())
    }

    /// Add an edge from `owner` to `other` and broadcast the change
    pub fn add_relationship(
        &self,
        owner: ActorId,
        other: ActorId,
        rel_type: RelationshipType,
        established_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO relationships (owner_id, other_id, rel_type, established_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id, other_id, rel_type)
                DO UPDATE SET established_at = excluded.established_at",
            params![owner.0, other.0, rel_type.as_str(), established_at.to_rfc3339()],
        )?;
        drop(conn);
        let _ = self.changes.send(GraphChange { owner });
        Ok(())
    }

    /// Remove the edge from `owner` to `other` and broadcast the change
    pub fn remove_relationship(
        &self,
        owner: ActorId,
        other: ActorId,
        rel_type: RelationshipType,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM relationships
             WHERE owner_id = ?1 AND other_id = ?2 AND rel_type = ?3",
            params![owner.0, other.0, rel_type.as_str()],
        )?;
        drop(conn);
        let _ = self.changes.send(GraphChange { owner });
        Ok(())
    }

    /// Set one explicit privacy rule for an owner's field
    pub fn set_privacy(
        &self,
        owner: ActorId,
        field: ProfileField,
        level: PrivacyLevel,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profile_privacy (owner_id, field, level) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_id, field) DO UPDATE SET level = excluded.level",
            params![owner.0, field.as_str(), level.as_str()],
        )?;
        Ok(())
    }

    // ============================================
    // Row mapping
    // ============================================

    fn row_to_activity(row: &Row) -> rusqlite::Result<(i64, String, String)> {
        Ok((row.get("actor_id")?, row.get("ts")?, row.get("payload")?))
    }

    fn parse_activity(actor_id: i64, ts: String, payload: String) -> Result<ActivityItem> {
        let timestamp = DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| Error::Config(format!("bad timestamp {:?} in activity row: {}", ts, e)))?
            .with_timezone(&Utc);
        Ok(ActivityItem {
            actor_id: ActorId(actor_id as u64),
            timestamp,
            payload: serde_json::from_str(&payload)?,
        })
    }

    fn row_to_relationship(row: &Row) -> rusqlite::Result<(i64, String)> {
        Ok((row.get("other_id")?, row.get("established_at")?))
    }

    fn parse_relationship(other_id: i64, established_at: String) -> Result<RelationshipRecord> {
        let established_at = DateTime::parse_from_rfc3339(&established_at)
            .map_err(|e| {
                Error::Config(format!(
                    "bad timestamp {:?} in relationship row: {}",
                    established_at, e
                ))
            })?
            .with_timezone(&Utc);
        Ok(RelationshipRecord {
            actor_id: ActorId(other_id as u64),
            established_at,
        })
    }

    fn check_deadline(deadline: Deadline) -> Result<()> {
        if deadline.expired() {
            return Err(Error::unavailable("database", "request deadline expired"));
        }
        Ok(())
    }
}

impl ActivityStore for Database {
    fn query(
        &self,
        actors: &[ActorId],
        since: Option<DateTime<Utc>>,
        deadline: Deadline,
    ) -> Result<Vec<ActivityItem>> {
        Self::check_deadline(deadline)?;
        if actors.is_empty() {
            return Ok(Vec::new());
        }

        // Per-actor ids arrive as a generated placeholder list; rusqlite
        // has no array binding.
        let placeholders = vec!["?"; actors.len()].join(", ");
        let sql = format!(
            "SELECT actor_id, ts, payload FROM activity
             WHERE actor_id IN ({}) AND (?{} IS NULL OR ts >= ?{})
             ORDER BY ts DESC, id ASC",
            placeholders,
            actors.len() + 1,
            actors.len() + 1,
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = actors
            .iter()
            .map(|a| Box::new(a.0 as i64) as Box<dyn rusqlite::ToSql>)
            .collect();
        params.push(Box::new(since.map(|t| t.to_rfc3339())));

        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            Self::row_to_activity,
        )?;

        let mut items = Vec::new();
        for row in rows {
            let (actor_id, ts, payload) = row?;
            items.push(Self::parse_activity(actor_id, ts, payload)?);
        }
        Ok(items)
    }

    fn board_messages(&self, owner: ActorId, deadline: Deadline) -> Result<Vec<ActivityItem>> {
        Self::check_deadline(deadline)?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT actor_id, ts, payload FROM activity
             WHERE related_id = ?1 AND kind = ?2
             ORDER BY ts DESC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![owner.0, crate::types::ActivityKind::UserMessage.as_str()],
            Self::row_to_activity,
        )?;

        let mut items = Vec::new();
        for row in rows {
            let (actor_id, ts, payload) = row?;
            items.push(Self::parse_activity(actor_id, ts, payload)?);
        }
        Ok(items)
    }
}

impl RelationshipGraph for Database {
    fn list(
        &self,
        owner: ActorId,
        rel_type: RelationshipType,
        count: usize,
    ) -> Result<Vec<RelationshipRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT other_id, established_at FROM relationships
             WHERE owner_id = ?1 AND rel_type = ?2
             ORDER BY established_at DESC, other_id ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![owner.0, rel_type.as_str(), count as i64],
            Self::row_to_relationship,
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (other_id, established_at) = row?;
            records.push(Self::parse_relationship(other_id, established_at)?);
        }
        Ok(records)
    }

    fn count(&self, owner: ActorId, rel_type: RelationshipType) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE owner_id = ?1 AND rel_type = ?2",
            params![owner.0, rel_type.as_str()],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn related(&self, owner: ActorId, other: ActorId, rel_type: RelationshipType) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM relationships
                WHERE owner_id = ?1 AND other_id = ?2 AND rel_type = ?3
             )",
            params![owner.0, other.0, rel_type.as_str()],
            |r| r.get(0),
        )?;
        Ok(exists != 0)
    }

    fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }
}

impl PrivacyStore for Database {
    fn rules(&self, owner: ActorId) -> Result<HashMap<ProfileField, PrivacyLevel>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT field, level FROM profile_privacy WHERE owner_id = ?1")?;
        let rows = stmt.query_map(params![owner.0], |row| {
            Ok((row.get::<_, String>("field")?, row.get::<_, String>("level")?))
        })?;

        let mut rules = HashMap::new();
        for row in rows {
            let (field, level) = row?;
            match (field.parse::<ProfileField>(), level.parse::<PrivacyLevel>()) {
                (Ok(field), Ok(level)) => {
                    rules.insert(field, level);
                }
                _ => {
                    // Unknown rows are skipped, not fatal; the default
                    // policy covers the field.
                    tracing::warn!(owner = %owner, field, level, "skipping unparseable privacy rule");
                }
            }
        }
        Ok(rules)
    }
}
