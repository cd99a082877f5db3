use std::collections::HashMap;
use std::rc::Rc;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::model::{Project, Resource, Snapshot, SnapshotStatus};

/// Maps a resource to the snapshot of the running analysis and to the
/// snapshot of the last finished one.
pub trait SnapshotResolver {
    /// Snapshot of this run for the resource, if one was saved
    fn current_snapshot(&self, resource: &Resource) -> Result<Option<Snapshot>>;

    /// Get or create the snapshot of this run for a resource of the project
    fn save_resource(&mut self, project: &Project, resource: &Resource) -> Result<Option<Snapshot>>;

    /// Last processed snapshot of the same resource, other than the given one
    fn previous_last_snapshot(&self, snapshot: &Snapshot) -> Result<Option<Snapshot>>;
}

/// Snapshot resolver for one analysis run.
///
/// Snapshots created during the run stay unprocessed until [`finish_run`]
/// promotes them to "last", so the previous run stays visible until then.
///
/// [`finish_run`]: SqliteSnapshots::finish_run
pub struct SqliteSnapshots {
    conn: Rc<Connection>,
    created_at: i64,
    // resource key -> snapshot created in this run
    run: HashMap<String, Snapshot>,
}

const SNAPSHOT_COLUMNS: &str = "id, resource_id, root_project_id, created_at, status, islast";

impl SqliteSnapshots {
    pub(crate) fn new(conn: Rc<Connection>) -> Self {
        SqliteSnapshots {
            conn,
            created_at: chrono::Utc::now().timestamp(),
            run: HashMap::new(),
        }
    }

    /// Mark every snapshot of this run as processed and last, demoting the
    /// snapshots they replace. Returns how many snapshots were promoted.
    pub fn finish_run(&mut self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        for snapshot in self.run.values() {
            tx.execute(
                "UPDATE snapshots SET islast = 0 WHERE resource_id = ?1 AND id != ?2",
                params![snapshot.resource_id, snapshot.id],
            )?;
            tx.execute(
                "UPDATE snapshots SET islast = 1, status = ?2 WHERE id = ?1",
                params![snapshot.id, SnapshotStatus::Processed.as_str()],
            )?;
        }

        tx.commit()?;

        let promoted = self.run.len();
        self.run.clear();
        tracing::info!(promoted, "analysis run finished");
        Ok(promoted)
    }

    fn ensure_resource(&self, resource: &Resource) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO resources (resource_key, name) VALUES (?1, ?2)
             ON CONFLICT(resource_key) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![resource.key, resource.name],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

impl SnapshotResolver for SqliteSnapshots {
    fn current_snapshot(&self, resource: &Resource) -> Result<Option<Snapshot>> {
        Ok(self.run.get(&resource.key).cloned())
    }

    fn save_resource(&mut self, project: &Project, resource: &Resource) -> Result<Option<Snapshot>> {
        if let Some(snapshot) = self.run.get(&resource.key) {
            return Ok(Some(snapshot.clone()));
        }

        let root_project_id = self.ensure_resource(&project.resource)?;
        let resource_id = if resource.key == project.key() {
            root_project_id
        } else {
            self.ensure_resource(resource)?
        };

        let status = SnapshotStatus::Unprocessed;
        self.conn.execute(
            "INSERT INTO snapshots (resource_id, root_project_id, created_at, status, islast)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![resource_id, root_project_id, self.created_at, status.as_str()],
        )?;

        let snapshot = Snapshot {
            id: self.conn.last_insert_rowid(),
            resource_id,
            root_project_id,
            created_at: self.created_at,
            status,
            last: false,
        };
        tracing::debug!(resource = %resource.key, snapshot_id = snapshot.id, "created snapshot");

        self.run.insert(resource.key.clone(), snapshot.clone());
        Ok(Some(snapshot))
    }

    fn previous_last_snapshot(&self, snapshot: &Snapshot) -> Result<Option<Snapshot>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM snapshots
             WHERE resource_id = ?1 AND islast = 1 AND status = ?2 AND id != ?3
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))?;

        let previous = stmt
            .query_row(
                params![snapshot.resource_id, SnapshotStatus::Processed.as_str(), snapshot.id],
                snapshot_from_row,
            )
            .optional()?;

        Ok(previous)
    }
}

fn snapshot_from_row(row: &rusqlite::Row) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        root_project_id: row.get(2)?,
        created_at: row.get(3)?,
        status: SnapshotStatus::from_code(&row.get::<_, String>(4)?),
        last: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    fn project() -> Project {
        Project::new("org:app", "App")
    }

    #[test]
    fn save_resource_returns_same_snapshot_within_run() {
        let db = Database::open_in_memory().unwrap();
        let mut snapshots = db.snapshots();
        let file = Resource::new("org:app:src/lib.rs", "lib.rs");

        let first = snapshots.save_resource(&project(), &file).unwrap().unwrap();
        let second = snapshots.save_resource(&project(), &file).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, SnapshotStatus::Unprocessed);
        assert!(!first.last);
        assert_eq!(snapshots.current_snapshot(&file).unwrap(), Some(first));
    }

    #[test]
    fn current_snapshot_is_none_before_save() {
        let db = Database::open_in_memory().unwrap();
        let snapshots = db.snapshots();
        let file = Resource::new("org:app:src/lib.rs", "lib.rs");

        assert_eq!(snapshots.current_snapshot(&file).unwrap(), None);
    }

    #[test]
    fn project_snapshot_is_its_own_root() {
        let db = Database::open_in_memory().unwrap();
        let mut snapshots = db.snapshots();
        let project = project();

        let snapshot = snapshots.save_resource(&project, &project.resource).unwrap().unwrap();

        assert_eq!(snapshot.resource_id, snapshot.root_project_id);
    }

    #[test]
    fn no_previous_snapshot_on_first_run() {
        let db = Database::open_in_memory().unwrap();
        let mut snapshots = db.snapshots();
        let file = Resource::new("org:app:src/lib.rs", "lib.rs");

        let current = snapshots.save_resource(&project(), &file).unwrap().unwrap();

        assert_eq!(snapshots.previous_last_snapshot(&current).unwrap(), None);
    }

    #[test]
    fn finished_run_becomes_previous_of_next_run() {
        let db = Database::open_in_memory().unwrap();
        let file = Resource::new("org:app:src/lib.rs", "lib.rs");

        let mut first_run = db.snapshots();
        let first = first_run.save_resource(&project(), &file).unwrap().unwrap();
        assert_eq!(first_run.finish_run().unwrap(), 1);
        assert_eq!(first_run.current_snapshot(&file).unwrap(), None);

        let mut second_run = db.snapshots();
        let second = second_run.save_resource(&project(), &file).unwrap().unwrap();
        assert_ne!(first.id, second.id);

        let previous = second_run.previous_last_snapshot(&second).unwrap().unwrap();
        assert_eq!(previous.id, first.id);
        assert_eq!(previous.status, SnapshotStatus::Processed);
        assert!(previous.last);

        second_run.finish_run().unwrap();

        let mut third_run = db.snapshots();
        let third = third_run.save_resource(&project(), &file).unwrap().unwrap();
        let previous = third_run.previous_last_snapshot(&third).unwrap().unwrap();
        assert_eq!(previous.id, second.id);
    }

    #[test]
    fn previous_snapshot_is_per_resource() {
        let db = Database::open_in_memory().unwrap();
        let a = Resource::new("org:app:a.rs", "a.rs");
        let b = Resource::new("org:app:b.rs", "b.rs");

        let mut first_run = db.snapshots();
        first_run.save_resource(&project(), &a).unwrap();
        first_run.finish_run().unwrap();

        let mut second_run = db.snapshots();
        let current_b = second_run.save_resource(&project(), &b).unwrap().unwrap();

        assert_eq!(second_run.previous_last_snapshot(&current_b).unwrap(), None);
    }
}
