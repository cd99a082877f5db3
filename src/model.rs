//! Domain types shared by the recorder and the store.
//!
//! Violations are the in-memory findings of one analysis run, persisted
//! violations are their rows in the database, tied to a snapshot.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Info => "INFO",
            Priority::Minor => "MINOR",
            Priority::Major => "MAJOR",
            Priority::Critical => "CRITICAL",
            Priority::Blocker => "BLOCKER",
        }
    }

    /// Unknown names fall back to Major, the default severity of a rule.
    pub fn from_name(name: &str) -> Priority {
        match name {
            "INFO" => Priority::Info,
            "MINOR" => Priority::Minor,
            "CRITICAL" => Priority::Critical,
            "BLOCKER" => Priority::Blocker,
            _ => Priority::Major,
        }
    }
}

/// Identity of a rule: repository key plus rule key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    pub repository_key: String,
    pub key: String,
}

impl RuleKey {
    pub fn new(repository_key: impl Into<String>, key: impl Into<String>) -> Self {
        RuleKey {
            repository_key: repository_key.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository_key, self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_key: RuleKey,
    pub name: String,
    /// Persisted id, when the rule was loaded from the database
    pub id: Option<i64>,
}

impl Rule {
    pub fn new(repository_key: impl Into<String>, key: impl Into<String>) -> Self {
        let rule_key = RuleKey::new(repository_key, key);
        Rule {
            name: rule_key.key.clone(),
            rule_key,
            id: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

// two rules are the same rule when their keys match, whatever the id
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.rule_key == other.rule_key
    }
}

impl Eq for Rule {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub key: String,
    pub name: String,
}

impl Resource {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Resource {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// Root resource of an analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Project {
    pub resource: Resource,
}

impl Project {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Project {
            resource: Resource::new(key, name),
        }
    }

    pub fn key(&self) -> &str {
        &self.resource.key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: Rule,
    pub resource: Resource,
    pub line: Option<u32>,
    pub message: Option<String>,
    pub cost: Option<f64>,
    pub priority: Option<Priority>,
}

impl Violation {
    pub fn new(rule: Rule, resource: Resource) -> Self {
        Violation {
            rule,
            resource,
            line: None,
            message: None,
            cost: None,
            priority: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A violation row, always owned by exactly one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedViolation {
    /// None until the row is first saved
    pub id: Option<i64>,
    pub rule_id: i64,
    pub snapshot_id: i64,
    pub priority: Option<Priority>,
    pub line: Option<u32>,
    pub message: Option<String>,
    /// SQLite stores a NaN cost as NULL, so it reads back as None
    pub cost: Option<f64>,
}

impl PersistedViolation {
    /// Overwrite every mutable field from an observed violation.
    /// id and snapshot_id are left to the caller.
    pub fn merge(&mut self, rule_id: i64, violation: &Violation) {
        self.rule_id = rule_id;
        self.priority = violation.priority;
        self.line = violation.line;
        self.message = violation.message.clone();
        self.cost = violation.cost;
    }

    pub fn from_violation(rule_id: i64, snapshot_id: i64, violation: &Violation) -> Self {
        let mut row = PersistedViolation {
            id: None,
            rule_id,
            snapshot_id,
            priority: None,
            line: None,
            message: None,
            cost: None,
        };
        row.merge(rule_id, violation);
        row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotStatus {
    Unprocessed,
    Processed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Unprocessed => "U",
            SnapshotStatus::Processed => "P",
        }
    }

    pub fn from_code(code: &str) -> SnapshotStatus {
        if code == "P" {
            SnapshotStatus::Processed
        } else {
            SnapshotStatus::Unprocessed
        }
    }
}

/// One analysis run of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub resource_id: i64,
    pub root_project_id: i64,
    pub created_at: i64,
    pub status: SnapshotStatus,
    pub last: bool,
}
