//! Rule matrix builder.
//!
//! Enumerates every (old status, new status, condition) cell for a scope and
//! marks a cell enabled when any (tracker, role) in the scope has a persisted
//! rule for it. Old statuses are `{0} ∪ statuses`, new statuses are
//! `statuses`; self-transitions are skipped except from status 0.

use std::collections::HashSet;

use crate::errors::AppError;
use super::scope::Scope;
use super::store::RuleStore;
use super::types::*;

/// Build the complete matrix for `statuses` from an already loaded rule set.
pub fn build(
    trackers: &[TrackerId],
    roles: &[RoleId],
    statuses: &[StatusId],
    rules: &[TransitionRule],
) -> RuleMatrix {
    let existing: HashSet<TransitionKey> = rules
        .iter()
        .filter(|r| trackers.contains(&r.tracker_id) && roles.contains(&r.role_id))
        .map(TransitionRule::key)
        .collect();

    let mut matrix = RuleMatrix::new();
    let old_candidates = std::iter::once(NEW_ISSUE_STATUS).chain(statuses.iter().copied());
    for old_status_id in old_candidates {
        for &new_status_id in statuses {
            if !is_valid_pair(old_status_id, new_status_id) {
                continue;
            }
            for condition in Condition::ALL {
                let key = TransitionKey::new(old_status_id, new_status_id, condition);
                matrix.insert(key, existing.contains(&key));
            }
        }
    }
    matrix
}

/// Build the baseline matrix for a resolved scope from the store.
pub async fn build_from_store(store: &dyn RuleStore, scope: &Scope) -> Result<RuleMatrix, AppError> {
    let rules = store
        .transitions_in_scope(&scope.tracker_ids(), &scope.role_ids())
        .await?;
    let matrix = build(&scope.tracker_ids(), &scope.role_ids(), &scope.status_ids(), &rules);
    log::debug!(
        "Built rule matrix: {} cells ({} enabled) from {} rules",
        matrix.len(),
        matrix.enabled_count(),
        rules.len()
    );
    Ok(matrix)
}
