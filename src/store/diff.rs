//! Violation tracking between two snapshots.
//!
//! Matches the violations of the current run against the rows of the
//! previous snapshot:
//! - first on rule, line and message
//! - then on rule and message only, for code that moved
//!
//! Each previous row is claimed at most once. Whatever is left over on the
//! current side is new, on the previous side is gone.

use std::collections::HashMap;

use crate::model::{PersistedViolation, Violation};

/// What a current violation is matched by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingKey {
    pub rule_id: i64,
    pub line: Option<u32>,
    pub message: Option<String>,
}

impl TrackingKey {
    pub fn new(rule_id: i64, violation: &Violation) -> Self {
        TrackingKey {
            rule_id,
            line: violation.line,
            message: violation.message.clone(),
        }
    }

    fn of_row(row: &PersistedViolation) -> Self {
        TrackingKey {
            rule_id: row.rule_id,
            line: row.line,
            message: row.message.clone(),
        }
    }

    fn without_line(&self) -> (i64, Option<&str>) {
        (self.rule_id, self.message.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// (index into the current violations, matching previous row)
    pub tracked: Vec<(usize, PersistedViolation)>,
    /// indices into the current violations
    pub new: Vec<usize>,
    pub gone: Vec<PersistedViolation>,
}

impl DiffResult {
    pub fn previous_for(&self, index: usize) -> Option<&PersistedViolation> {
        self.tracked
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, row)| row)
    }
}

/// Compare the current violations, reduced to their keys, with the previous rows
pub fn compare_violations(previous: &[PersistedViolation], current: &[TrackingKey]) -> DiffResult {
    let mut rows: Vec<&PersistedViolation> = previous.iter().collect();
    rows.sort_by_key(|row| row.id);

    let mut claimed = vec![false; rows.len()];
    let mut matches: Vec<Option<usize>> = vec![None; current.len()];

    // exact pass
    let mut exact: HashMap<TrackingKey, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        exact.entry(TrackingKey::of_row(row)).or_default().push(i);
    }
    for (index, key) in current.iter().enumerate() {
        if let Some(candidates) = exact.get(key) {
            if let Some(&i) = candidates.iter().find(|&&i| !claimed[i]) {
                claimed[i] = true;
                matches[index] = Some(i);
            }
        }
    }

    // line-insensitive pass
    let mut moved: HashMap<(i64, Option<&str>), Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if !claimed[i] {
            moved.entry((row.rule_id, row.message.as_deref())).or_default().push(i);
        }
    }
    for (index, key) in current.iter().enumerate() {
        if matches[index].is_some() {
            continue;
        }
        if let Some(candidates) = moved.get(&key.without_line()) {
            if let Some(&i) = candidates.iter().find(|&&i| !claimed[i]) {
                claimed[i] = true;
                matches[index] = Some(i);
            }
        }
    }

    let mut result = DiffResult::default();
    for (index, matched) in matches.into_iter().enumerate() {
        match matched {
            Some(i) => result.tracked.push((index, rows[i].clone())),
            None => result.new.push(index),
        }
    }
    result.gone = rows
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(row, _)| (*row).clone())
        .collect();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, rule_id: i64, line: u32, message: &str) -> PersistedViolation {
        PersistedViolation {
            id: Some(id),
            rule_id,
            snapshot_id: 1,
            priority: None,
            line: Some(line),
            message: Some(message.to_string()),
            cost: None,
        }
    }

    fn key(rule_id: i64, line: u32, message: &str) -> TrackingKey {
        TrackingKey {
            rule_id,
            line: Some(line),
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn new_violation_detected() {
        let result = compare_violations(&[], &[key(1, 10, "unused import")]);
        assert_eq!(result.new, vec![0]);
        assert!(result.tracked.is_empty());
        assert!(result.gone.is_empty());
    }

    #[test]
    fn gone_violation_detected() {
        let result = compare_violations(&[row(5, 1, 10, "unused import")], &[]);
        assert!(result.new.is_empty());
        assert_eq!(result.gone.len(), 1);
        assert_eq!(result.gone[0].id, Some(5));
    }

    #[test]
    fn exact_match_tracked() {
        let result = compare_violations(
            &[row(5, 1, 10, "unused import")],
            &[key(1, 10, "unused import")],
        );
        assert_eq!(result.tracked.len(), 1);
        assert_eq!(result.tracked[0].0, 0);
        assert_eq!(result.tracked[0].1.id, Some(5));
        assert_eq!(result.previous_for(0).and_then(|r| r.id), Some(5));
    }

    #[test]
    fn moved_line_tracked_by_message() {
        let result = compare_violations(
            &[row(5, 1, 10, "unused import")],
            &[key(1, 14, "unused import")],
        );
        assert_eq!(result.tracked.len(), 1);
        assert_eq!(result.tracked[0].1.line, Some(10));
        assert!(result.new.is_empty());
    }

    #[test]
    fn different_rule_not_tracked() {
        let result = compare_violations(
            &[row(5, 1, 10, "unused import")],
            &[key(2, 10, "unused import")],
        );
        assert_eq!(result.new, vec![0]);
        assert_eq!(result.gone.len(), 1);
    }

    #[test]
    fn exact_match_wins_over_moved_match() {
        // the moved candidate (id 5) comes first in id order, the exact one must still win
        let previous = vec![row(5, 1, 3, "magic number"), row(6, 1, 20, "magic number")];
        let result = compare_violations(&previous, &[key(1, 20, "magic number")]);

        assert_eq!(result.tracked.len(), 1);
        assert_eq!(result.tracked[0].1.id, Some(6));
        assert_eq!(result.gone.len(), 1);
        assert_eq!(result.gone[0].id, Some(5));
    }

    #[test]
    fn each_previous_row_claimed_once() {
        let previous = vec![row(5, 1, 10, "magic number")];
        let current = vec![key(1, 10, "magic number"), key(1, 10, "magic number")];

        let result = compare_violations(&previous, &current);

        assert_eq!(result.tracked.len(), 1);
        assert_eq!(result.new, vec![1]);
        assert!(result.gone.is_empty());
        assert_eq!(result.previous_for(1), None);
    }
}
