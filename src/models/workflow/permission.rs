//! Field permissions per status: whether an issue field is read-only or
//! required for a (tracker, role) while the issue sits in a given status.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::params::SubmittedPermission;
use super::types::{NO_CHANGE, RoleId, StatusId, TrackerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRule {
    Readonly,
    Required,
}

impl PermissionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionRule::Readonly => "readonly",
            PermissionRule::Required => "required",
        }
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" => Ok(PermissionRule::Readonly),
            "required" => Ok(PermissionRule::Required),
            other => Err(format!("unknown field permission '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRow {
    pub tracker_id: TrackerId,
    pub role_id: RoleId,
    pub status_id: StatusId,
    pub field_name: String,
    pub rule: PermissionRule,
}

/// Requested changes keyed by (field, status). `None` clears the rule.
pub type PermissionEdits = BTreeMap<(String, StatusId), Option<PermissionRule>>;

/// Drop `no_change` and malformed entries; an empty rule clears.
pub fn edits_from_submitted(entries: &[SubmittedPermission]) -> PermissionEdits {
    let mut edits = PermissionEdits::new();
    for entry in entries {
        if entry.rule == NO_CHANGE || entry.field_name.trim().is_empty() {
            continue;
        }
        let Ok(status_id) = entry.status.trim().parse::<StatusId>() else {
            continue;
        };
        let rule = if entry.rule.is_empty() {
            None
        } else {
            match entry.rule.parse::<PermissionRule>() {
                Ok(rule) => Some(rule),
                Err(e) => {
                    log::debug!("Dropping permission for {}: {e}", entry.field_name);
                    continue;
                }
            }
        };
        edits.insert((entry.field_name.clone(), status_id), rule);
    }
    edits
}

/// Status -> field -> distinct rules across every (tracker, role) in scope.
/// Every status in `statuses` gets an entry even when it has no rules.
pub type RulesByStatus = BTreeMap<StatusId, BTreeMap<String, BTreeSet<PermissionRule>>>;

pub fn rules_by_status(statuses: &[StatusId], rows: &[PermissionRow]) -> RulesByStatus {
    let mut by_status = RulesByStatus::new();
    for row in rows {
        by_status
            .entry(row.status_id)
            .or_default()
            .entry(row.field_name.clone())
            .or_default()
            .insert(row.rule);
    }
    for status_id in statuses {
        by_status.entry(*status_id).or_default();
    }
    by_status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(field_name: &str, status: &str, rule: &str) -> SubmittedPermission {
        SubmittedPermission {
            field_name: field_name.into(),
            status: status.into(),
            rule: rule.into(),
        }
    }

    fn row(tracker_id: TrackerId, role_id: RoleId, status_id: StatusId, field: &str, rule: PermissionRule) -> PermissionRow {
        PermissionRow {
            tracker_id,
            role_id,
            status_id,
            field_name: field.into(),
            rule,
        }
    }

    #[test]
    fn edits_drop_no_change_and_bad_entries() {
        let edits = edits_from_submitted(&[
            entry("due_date", "1", "required"),
            entry("due_date", "2", "no_change"),
            entry("due_date", "x", "required"),
            entry("assigned_to_id", "1", "hidden"),
            entry("12", "3", ""),
            entry("", "3", "readonly"),
        ]);
        assert_eq!(edits.len(), 2);
        assert_eq!(edits.get(&("due_date".to_string(), 1)), Some(&Some(PermissionRule::Required)));
        assert_eq!(edits.get(&("12".to_string(), 3)), Some(&None));
    }

    #[test]
    fn rules_are_grouped_and_every_status_is_present() {
        let rows = vec![
            row(1, 1, 1, "due_date", PermissionRule::Required),
            row(1, 2, 1, "due_date", PermissionRule::Readonly),
            row(2, 1, 1, "due_date", PermissionRule::Required),
            row(1, 1, 2, "priority_id", PermissionRule::Readonly),
        ];
        let grouped = rules_by_status(&[1, 2, 3], &rows);
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[&1]["due_date"].len(), 2);
        assert!(grouped[&2]["priority_id"].contains(&PermissionRule::Readonly));
        assert!(grouped[&3].is_empty());
    }
}
