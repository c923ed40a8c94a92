//! In-process rule store.
//!
//! Writes are applied to a copy of the state and swapped in only when every
//! step succeeds, which gives the same all-or-nothing behaviour as a database
//! transaction. Foreign-key style checks mirror `schema.sql`.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::reference::{IssueStatus, Role, Tracker};
use super::permission::{PermissionEdits, PermissionRow, PermissionRule};
use super::store::RuleStore;
use super::types::*;

type TransitionTuple = (TrackerId, RoleId, StatusId, StatusId, Condition);
type PermissionKey = (TrackerId, RoleId, StatusId, String);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    trackers: Vec<Tracker>,
    roles: Vec<Role>,
    statuses: Vec<IssueStatus>,
    transitions: BTreeSet<TransitionTuple>,
    permissions: BTreeMap<PermissionKey, PermissionRule>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_scope(&self, trackers: &[TrackerId], roles: &[RoleId]) -> Result<(), AppError> {
        for tracker_id in trackers {
            if !self.trackers.iter().any(|t| t.id == *tracker_id) {
                return Err(AppError::Storage(format!("tracker {tracker_id} does not exist")));
            }
        }
        for role_id in roles {
            if !self.roles.iter().any(|r| r.id == *role_id) {
                return Err(AppError::Storage(format!("role {role_id} does not exist")));
            }
        }
        Ok(())
    }

    fn check_status(&self, status_id: StatusId) -> Result<(), AppError> {
        if self.statuses.iter().any(|s| s.id == status_id) {
            Ok(())
        } else {
            Err(AppError::Storage(format!("status {status_id} does not exist")))
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

fn sorted<T: Clone>(items: &[T], key: impl Fn(&T) -> (i64, i64)) -> Vec<T> {
    let mut items = items.to_vec();
    items.sort_by_key(|item| key(item));
    items
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tracker(&self, name: &str) -> TrackerId {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let position = state.trackers.len() as i64 + 1;
        state.trackers.push(Tracker { id, name: name.to_string(), position });
        id
    }

    pub async fn add_role(&self, name: &str, consider_workflow: bool) -> RoleId {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let position = state.roles.len() as i64 + 1;
        state.roles.push(Role {
            id,
            name: name.to_string(),
            position,
            consider_workflow,
        });
        id
    }

    pub async fn add_status(&self, name: &str) -> StatusId {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let position = state.statuses.len() as i64 + 1;
        state.statuses.push(IssueStatus {
            id,
            name: name.to_string(),
            position,
            is_closed: false,
        });
        id
    }

    /// Seed a rule directly, bypassing scope checks.
    pub async fn insert_transition(&self, rule: TransitionRule) {
        let mut state = self.state.write().await;
        state.transitions.insert((
            rule.tracker_id,
            rule.role_id,
            rule.old_status_id,
            rule.new_status_id,
            rule.condition,
        ));
    }

    pub async fn insert_permission(&self, row: PermissionRow) {
        let mut state = self.state.write().await;
        state
            .permissions
            .insert((row.tracker_id, row.role_id, row.status_id, row.field_name), row.rule);
    }

    /// Every stored transition, ordered by (tracker, role, old, new, condition).
    pub async fn all_transitions(&self) -> Vec<TransitionRule> {
        let state = self.state.read().await;
        state
            .transitions
            .iter()
            .map(|&(tracker_id, role_id, old_status_id, new_status_id, condition)| TransitionRule {
                tracker_id,
                role_id,
                old_status_id,
                new_status_id,
                condition,
            })
            .collect()
    }

    pub async fn all_permissions(&self) -> Vec<PermissionRow> {
        let state = self.state.read().await;
        state
            .permissions
            .iter()
            .map(|((tracker_id, role_id, status_id, field_name), rule)| PermissionRow {
                tracker_id: *tracker_id,
                role_id: *role_id,
                status_id: *status_id,
                field_name: field_name.clone(),
                rule: *rule,
            })
            .collect()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn trackers(&self) -> Result<Vec<Tracker>, AppError> {
        let state = self.state.read().await;
        Ok(sorted(&state.trackers, |t| (t.position, t.id)))
    }

    async fn roles(&self) -> Result<Vec<Role>, AppError> {
        let state = self.state.read().await;
        Ok(sorted(&state.roles, |r| (r.position, r.id)))
    }

    async fn statuses(&self) -> Result<Vec<IssueStatus>, AppError> {
        let state = self.state.read().await;
        Ok(sorted(&state.statuses, |s| (s.position, s.id)))
    }

    async fn transitions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<TransitionRule>, AppError> {
        Ok(self
            .all_transitions()
            .await
            .into_iter()
            .filter(|r| trackers.contains(&r.tracker_id) && roles.contains(&r.role_id))
            .collect())
    }

    async fn used_status_ids(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<StatusId>, AppError> {
        let used: BTreeSet<StatusId> = self
            .transitions_in_scope(trackers, roles)
            .await?
            .into_iter()
            .filter(|r| r.old_status_id != r.new_status_id)
            .flat_map(|r| [r.old_status_id, r.new_status_id])
            .collect();
        Ok(used.into_iter().collect())
    }

    async fn replace_transitions(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
        matrix: &RuleMatrix,
    ) -> Result<u64, AppError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        next.check_scope(trackers, roles)?;

        let mut written = 0u64;
        for (key, enabled) in matrix.iter() {
            if *enabled {
                next.check_status(key.new_status_id)?;
                if key.old_status_id != NEW_ISSUE_STATUS {
                    next.check_status(key.old_status_id)?;
                }
            }
            for &tracker_id in trackers {
                for &role_id in roles {
                    let tuple = (tracker_id, role_id, key.old_status_id, key.new_status_id, key.condition);
                    let touched = if *enabled {
                        next.transitions.insert(tuple)
                    } else {
                        next.transitions.remove(&tuple)
                    };
                    if touched {
                        written += 1;
                    }
                }
            }
        }

        *guard = next;
        Ok(written)
    }

    async fn workflow_counts(&self) -> Result<Vec<WorkflowCount>, AppError> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<(TrackerId, RoleId), i64> = BTreeMap::new();
        for (tracker_id, role_id, ..) in &state.transitions {
            *counts.entry((*tracker_id, *role_id)).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((tracker_id, role_id), count)| WorkflowCount { tracker_id, role_id, count })
            .collect())
    }

    async fn permissions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<PermissionRow>, AppError> {
        Ok(self
            .all_permissions()
            .await
            .into_iter()
            .filter(|p| trackers.contains(&p.tracker_id) && roles.contains(&p.role_id))
            .collect())
    }

    async fn replace_permissions(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
        edits: &PermissionEdits,
    ) -> Result<(), AppError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        next.check_scope(trackers, roles)?;

        for ((field_name, status_id), rule) in edits {
            next.check_status(*status_id)?;
            for &tracker_id in trackers {
                for &role_id in roles {
                    let key = (tracker_id, role_id, *status_id, field_name.clone());
                    match rule {
                        Some(rule) => next.permissions.insert(key, *rule),
                        None => next.permissions.remove(&key),
                    };
                }
            }
        }

        *guard = next;
        Ok(())
    }

    async fn copy_rules(
        &self,
        pairs: &[((TrackerId, RoleId), (TrackerId, RoleId))],
    ) -> Result<(), AppError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();

        for &((source_tracker, source_role), (target_tracker, target_role)) in pairs {
            next.check_scope(&[source_tracker, target_tracker], &[source_role, target_role])?;

            next.transitions
                .retain(|(t, r, ..)| !(*t == target_tracker && *r == target_role));
            next.permissions
                .retain(|(t, r, ..), _| !(*t == target_tracker && *r == target_role));

            let copied: Vec<TransitionTuple> = next
                .transitions
                .iter()
                .filter(|(t, r, ..)| *t == source_tracker && *r == source_role)
                .map(|&(_, _, old, new, condition)| (target_tracker, target_role, old, new, condition))
                .collect();
            next.transitions.extend(copied);

            let copied: Vec<(PermissionKey, PermissionRule)> = next
                .permissions
                .iter()
                .filter(|((t, r, ..), _)| *t == source_tracker && *r == source_role)
                .map(|((_, _, status_id, field_name), rule)| {
                    ((target_tracker, target_role, *status_id, field_name.clone()), *rule)
                })
                .collect();
            next.permissions.extend(copied);
        }

        *guard = next;
        Ok(())
    }
}
