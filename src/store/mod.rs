//! SQLite violation storage.
//!
//! Persists violations to a local SQLite database with four tables:
//! - resources: id, resource_key, name
//! - snapshots: id, resource_id, root_project_id, created_at, status, islast
//! - rules: id, repository_key, rule_key, name, enabled
//! - rule_failures: id, snapshot_id, rule_id, priority, line, message, cost
//!
//! The session and snapshot resolver handed out by a [`Database`] share its
//! connection, so violations and snapshots land in the same file.

pub mod diff;
pub mod session;
pub mod snapshot;

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::Config;
use crate::error::Result;
use crate::recorder::ViolationRecorder;

pub use session::{Session, SqliteSession};
pub use snapshot::{SnapshotResolver, SqliteSnapshots};

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_id INTEGER NOT NULL,
            root_project_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            islast INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(resource_id) REFERENCES resources(id),
            FOREIGN KEY(root_project_id) REFERENCES resources(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_key TEXT NOT NULL,
            rule_key TEXT NOT NULL,
            name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            UNIQUE(repository_key, rule_key)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rule_failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            rule_id INTEGER NOT NULL,
            priority TEXT,
            line INTEGER,
            message TEXT,
            cost REAL,
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE,
            FOREIGN KEY(rule_id) REFERENCES rules(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rule_failures_snapshot_id ON rule_failures(snapshot_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_resource_id ON snapshots(resource_id)",
        [],
    )?;

    Ok(())
}

/// Database handle. Open once per analysis run, hand its session and
/// snapshot resolver to a recorder.
pub struct Database {
    conn: Rc<Connection>,
}

impl Database {
    /// Open the database named by the config, creating its directory and schema
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.database_path)?;
        Self::setup(conn, config.foreign_keys, config.busy_timeout())
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config {
            database_path: path.to_path_buf(),
            ..Config::default()
        };
        Self::open(&config)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::setup(conn, true, Duration::from_millis(0))
    }

    fn setup(conn: Connection, foreign_keys: bool, busy_timeout: Duration) -> Result<Self> {
        if foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }
        conn.busy_timeout(busy_timeout)?;
        init_schema(&conn)?;
        tracing::debug!(foreign_keys, "opened violation database");
        Ok(Database { conn: Rc::new(conn) })
    }

    pub fn session(&self) -> SqliteSession {
        SqliteSession::new(Rc::clone(&self.conn))
    }

    /// Snapshot resolver for a new analysis run
    pub fn snapshots(&self) -> SqliteSnapshots {
        SqliteSnapshots::new(Rc::clone(&self.conn))
    }

    pub fn recorder(&self) -> ViolationRecorder<SqliteSession, SqliteSnapshots> {
        ViolationRecorder::new(self.session(), self.snapshots())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(db: &Database) -> Vec<String> {
        let mut stmt = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap();
        names
    }

    #[test]
    fn schema_is_created() {
        let db = Database::open_in_memory().unwrap();
        let tables = table_names(&db);
        for expected in ["resources", "rule_failures", "rules", "snapshots"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[test]
    fn schema_init_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        init_schema(&db.conn).unwrap();
        assert_eq!(table_names(&db).iter().filter(|t| *t == "rules").count(), 1);
    }
}
