use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type TrackerId = i64;
pub type RoleId = i64;
pub type StatusId = i64;

/// Synthetic old status used by issue-creation transitions.
pub const NEW_ISSUE_STATUS: StatusId = 0;

/// Wire value marking a cell the user left untouched.
pub const NO_CHANGE: &str = "no_change";

/// Who may perform a transition. The three conditions are independent:
/// a status pair may have any combination of them enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Always,
    Author,
    Assignee,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Always, Condition::Author, Condition::Assignee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Always => "always",
            Condition::Author => "author",
            Condition::Assignee => "assignee",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Condition::Always),
            "author" => Ok(Condition::Author),
            "assignee" => Ok(Condition::Assignee),
            other => Err(format!("unknown transition condition '{other}'")),
        }
    }
}

/// True when `old -> new` is a cell the editor can show: self-transitions
/// only exist for the creation status.
pub fn is_valid_pair(old_status_id: StatusId, new_status_id: StatusId) -> bool {
    old_status_id == NEW_ISSUE_STATUS || old_status_id != new_status_id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionKey {
    pub old_status_id: StatusId,
    pub new_status_id: StatusId,
    pub condition: Condition,
}

impl TransitionKey {
    pub fn new(old_status_id: StatusId, new_status_id: StatusId, condition: Condition) -> Self {
        TransitionKey { old_status_id, new_status_id, condition }
    }

    pub fn pair(&self) -> (StatusId, StatusId) {
        (self.old_status_id, self.new_status_id)
    }
}

/// A persisted transition rule: the row's existence means the cell is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionRule {
    pub tracker_id: TrackerId,
    pub role_id: RoleId,
    pub old_status_id: StatusId,
    pub new_status_id: StatusId,
    pub condition: Condition,
}

impl TransitionRule {
    pub fn key(&self) -> TransitionKey {
        TransitionKey::new(self.old_status_id, self.new_status_id, self.condition)
    }
}

/// Nested wire shape: `old_status_id -> new_status_id -> condition -> "0"|"1"`.
pub type NestedTransitions = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// Cell map keyed by (old, new, condition).
///
/// A matrix produced by [`crate::models::workflow::matrix::build`] is complete:
/// every valid status pair in scope carries all three conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMatrix {
    cells: BTreeMap<TransitionKey, bool>,
}

impl RuleMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: BTreeMap<TransitionKey, bool>) -> Self {
        RuleMatrix { cells }
    }

    pub fn insert(&mut self, key: TransitionKey, enabled: bool) {
        self.cells.insert(key, enabled);
    }

    pub fn get(&self, key: &TransitionKey) -> Option<bool> {
        self.cells.get(key).copied()
    }

    /// Overwrite an existing cell. Returns false (and changes nothing) when
    /// the matrix has no such cell.
    pub fn set(&mut self, key: &TransitionKey, enabled: bool) -> bool {
        match self.cells.get_mut(key) {
            Some(cell) => {
                *cell = enabled;
                true
            }
            None => false,
        }
    }

    pub fn contains_pair(&self, old_status_id: StatusId, new_status_id: StatusId) -> bool {
        self.cells
            .contains_key(&TransitionKey::new(old_status_id, new_status_id, Condition::Always))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransitionKey, &bool)> {
        self.cells.iter()
    }

    pub fn enabled_count(&self) -> usize {
        self.cells.values().filter(|enabled| **enabled).count()
    }

    /// Render back to the nested string-keyed wire shape.
    pub fn to_nested(&self) -> NestedTransitions {
        let mut nested = NestedTransitions::new();
        for (key, enabled) in &self.cells {
            nested
                .entry(key.old_status_id.to_string())
                .or_default()
                .entry(key.new_status_id.to_string())
                .or_default()
                .insert(key.condition.to_string(), if *enabled { "1" } else { "0" }.to_string());
        }
        nested
    }
}

/// The sparse set of cells a client changed. `no_change` values never get in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    cells: BTreeMap<TransitionKey, bool>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TransitionKey, enabled: bool) {
        self.cells.insert(key, enabled);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransitionKey, &bool)> {
        self.cells.iter()
    }

    /// Use the submitted cells as they are, for full-form updates.
    pub fn into_matrix(self) -> RuleMatrix {
        RuleMatrix::from_cells(self.cells)
    }
}

impl FromIterator<(TransitionKey, bool)> for Delta {
    fn from_iter<I: IntoIterator<Item = (TransitionKey, bool)>>(iter: I) -> Self {
        Delta { cells: iter.into_iter().collect() }
    }
}

/// Number of rules per (tracker, role), for the overview page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowCount {
    pub tracker_id: TrackerId,
    pub role_id: RoleId,
    pub count: i64,
}
