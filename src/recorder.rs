//! Violation recorder.
//!
//! Links the violations of an analysis run to the snapshots of their
//! resources:
//! - reads the violations of the previous run for comparison
//! - inserts new violations, or moves tracked ones onto the current snapshot
//! - resolves rules to their persisted ids through a per-recorder cache

use std::collections::HashMap;

use crate::error::{Result, TallyError};
use crate::model::{PersistedViolation, Project, Resource, Rule, RuleKey, Violation};
use crate::store::diff::{self, DiffResult, TrackingKey};
use crate::store::{Session, SnapshotResolver};

/// Outcome counts of [`ViolationRecorder::record`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub gone: usize,
}

pub struct ViolationRecorder<S, R> {
    session: S,
    snapshots: R,
    // never invalidated, a rule disabled mid-run keeps its id
    rule_ids: HashMap<RuleKey, i64>,
}

impl<S: Session, R: SnapshotResolver> ViolationRecorder<S, R> {
    pub fn new(session: S, snapshots: R) -> Self {
        ViolationRecorder {
            session,
            snapshots,
            rule_ids: HashMap::new(),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn snapshots(&self) -> &R {
        &self.snapshots
    }

    pub fn snapshots_mut(&mut self) -> &mut R {
        &mut self.snapshots
    }

    /// Violations recorded against the previous last snapshot of the resource.
    /// Empty when the resource has no current or no previous snapshot.
    pub fn previous_violations(&self, resource: &Resource) -> Result<Vec<PersistedViolation>> {
        let Some(snapshot) = self.snapshots.current_snapshot(resource)? else {
            return Ok(Vec::new());
        };
        let Some(previous) = self.snapshots.previous_last_snapshot(&snapshot)? else {
            return Ok(Vec::new());
        };
        self.session.violations_for_snapshot(previous.id)
    }

    /// Save a violation on the current snapshot of its resource.
    ///
    /// With an `existing` row the stored row is reattached and overwritten,
    /// keeping its id. Returns the saved row, or `None` when the resource has
    /// no snapshot to attach to.
    pub fn save_or_update_violation(
        &mut self,
        project: &Project,
        violation: &Violation,
        existing: Option<&PersistedViolation>,
    ) -> Result<Option<PersistedViolation>> {
        let Some(snapshot) = self.snapshots.save_resource(project, &violation.resource)? else {
            // TODO: decide whether a resource without a snapshot should be an error instead
            tracing::debug!(resource = %violation.resource.key, "no snapshot for resource, violation not saved");
            return Ok(None);
        };

        let reattach_id = existing.and_then(|row| row.id);
        let mut row = match reattach_id {
            Some(id) => {
                let mut row = self.session.reattach_violation(id)?;
                let rule_id = self.rule_id(&violation.rule)?;
                row.merge(rule_id, violation);
                row
            }
            None => {
                let rule_id = self.rule_id(&violation.rule)?;
                PersistedViolation::from_violation(rule_id, snapshot.id, violation)
            }
        };

        row.snapshot_id = snapshot.id;
        self.session.save_violation(&mut row)?;
        tracing::debug!(
            violation_id = row.id,
            snapshot_id = snapshot.id,
            updated = reattach_id.is_some(),
            "saved violation"
        );
        Ok(Some(row))
    }

    /// Match the current violations of a resource against the previous run
    pub fn track(&mut self, resource: &Resource, violations: &[Violation]) -> Result<DiffResult> {
        let previous = self.previous_violations(resource)?;
        let keys = violations
            .iter()
            .map(|v| Ok(TrackingKey::new(self.rule_id(&v.rule)?, v)))
            .collect::<Result<Vec<_>>>()?;
        Ok(diff::compare_violations(&previous, &keys))
    }

    /// Track and save every violation of a resource. Tracked violations keep
    /// the id of the row they matched. Violations raised on another resource
    /// are skipped.
    pub fn record(
        &mut self,
        project: &Project,
        resource: &Resource,
        violations: &[Violation],
    ) -> Result<RecordSummary> {
        // the current snapshot must exist before the previous one can be found
        if self.snapshots.save_resource(project, resource)?.is_none() {
            return Ok(RecordSummary {
                skipped: violations.len(),
                ..RecordSummary::default()
            });
        }

        // previous rows belong to `resource`, they must not move to another one
        let own: Vec<Violation> = violations
            .iter()
            .filter(|v| v.resource == *resource)
            .cloned()
            .collect();
        let foreign = violations.len() - own.len();
        if foreign > 0 {
            tracing::warn!(resource = %resource.key, foreign, "skipped violations of other resources");
        }

        let diff = self.track(resource, &own)?;
        let mut summary = RecordSummary {
            gone: diff.gone.len(),
            skipped: foreign,
            ..RecordSummary::default()
        };

        for (index, violation) in own.iter().enumerate() {
            let existing = diff.previous_for(index);
            match self.save_or_update_violation(project, violation, existing)? {
                Some(_) if existing.is_some() => summary.updated += 1,
                Some(_) => summary.inserted += 1,
                None => summary.skipped += 1,
            }
        }

        Ok(summary)
    }

    fn rule_id(&mut self, rule: &Rule) -> Result<i64> {
        if let Some(&id) = self.rule_ids.get(&rule.rule_key) {
            return Ok(id);
        }

        let id = match rule.id {
            Some(id) => id,
            None => match self.session.enabled_rule_id(&rule.rule_key)? {
                Some(id) => id,
                None => {
                    tracing::warn!(rule = %rule.rule_key, "rule is not persisted or not enabled");
                    return Err(TallyError::RuleNotFound(rule.rule_key.to_string()));
                }
            },
        };

        tracing::debug!(rule = %rule.rule_key, rule_id = id, "cached rule id");
        self.rule_ids.insert(rule.rule_key.clone(), id);
        Ok(id)
    }
}
