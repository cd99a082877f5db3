use std::rc::Rc;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, TallyError};
use crate::model::{PersistedViolation, Priority, Rule, RuleKey};

/// The persistence operations the recorder needs, and nothing else.
pub trait Session {
    /// All violation rows recorded against a snapshot
    fn violations_for_snapshot(&self, snapshot_id: i64) -> Result<Vec<PersistedViolation>>;

    /// Insert the row when it has no id yet (and assign one), update it otherwise
    fn save_violation(&self, row: &mut PersistedViolation) -> Result<()>;

    /// Reload a stored row so it can be mutated and saved again
    fn reattach_violation(&self, id: i64) -> Result<PersistedViolation>;

    /// Id of the enabled rule with this key, if there is one
    fn enabled_rule_id(&self, rule_key: &RuleKey) -> Result<Option<i64>>;
}

pub struct SqliteSession {
    conn: Rc<Connection>,
}

impl SqliteSession {
    pub(crate) fn new(conn: Rc<Connection>) -> Self {
        SqliteSession { conn }
    }

    /// Insert or update a rule and return its id
    pub fn register_rule(&self, rule: &Rule, enabled: bool) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO rules (repository_key, rule_key, name, enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(repository_key, rule_key)
             DO UPDATE SET name = excluded.name, enabled = excluded.enabled
             RETURNING id",
            params![rule.rule_key.repository_key, rule.rule_key.key, rule.name, enabled],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

const VIOLATION_COLUMNS: &str = "id, rule_id, snapshot_id, priority, line, message, cost";

impl Session for SqliteSession {
    fn violations_for_snapshot(&self, snapshot_id: i64) -> Result<Vec<PersistedViolation>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VIOLATION_COLUMNS} FROM rule_failures WHERE snapshot_id = ?1 ORDER BY id"
        ))?;

        let rows = stmt
            .query_map(params![snapshot_id], violation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn save_violation(&self, row: &mut PersistedViolation) -> Result<()> {
        let priority = row.priority.map(|p| p.as_str());

        match row.id {
            Some(id) => {
                let updated = self.conn.execute(
                    "UPDATE rule_failures
                     SET snapshot_id = ?2, rule_id = ?3, priority = ?4, line = ?5, message = ?6, cost = ?7
                     WHERE id = ?1",
                    params![id, row.snapshot_id, row.rule_id, priority, row.line, row.message, row.cost],
                )?;
                if updated == 0 {
                    return Err(TallyError::ViolationNotFound(id));
                }
            }
            None => {
                self.conn.execute(
                    "INSERT INTO rule_failures (snapshot_id, rule_id, priority, line, message, cost)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.snapshot_id, row.rule_id, priority, row.line, row.message, row.cost],
                )?;
                row.id = Some(self.conn.last_insert_rowid());
            }
        }

        Ok(())
    }

    fn reattach_violation(&self, id: i64) -> Result<PersistedViolation> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {VIOLATION_COLUMNS} FROM rule_failures WHERE id = ?1"))?;

        stmt.query_row(params![id], violation_from_row)
            .optional()?
            .ok_or(TallyError::ViolationNotFound(id))
    }

    fn enabled_rule_id(&self, rule_key: &RuleKey) -> Result<Option<i64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM rules WHERE repository_key = ?1 AND rule_key = ?2 AND enabled = 1",
        )?;

        let id = stmt
            .query_row(params![rule_key.repository_key, rule_key.key], |row| row.get(0))
            .optional()?;

        Ok(id)
    }
}

fn violation_from_row(row: &rusqlite::Row) -> rusqlite::Result<PersistedViolation> {
    Ok(PersistedViolation {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        snapshot_id: row.get(2)?,
        priority: row.get::<_, Option<String>>(3)?.map(|p| Priority::from_name(&p)),
        line: row.get(4)?,
        message: row.get(5)?,
        cost: row.get(6)?,
    })
}
