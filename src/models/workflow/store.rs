use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::reference::{IssueStatus, Role, Tracker};
use super::permission::{PermissionEdits, PermissionRow};
use super::types::*;

/// Persistence for workflow rules and the reference data they point at.
///
/// Every mutating method runs as a single transaction: either all of its
/// writes become visible or none do. Concurrent writers to the same scope
/// are last-writer-wins.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All trackers, sorted by position.
    async fn trackers(&self) -> Result<Vec<Tracker>, AppError>;

    /// All roles, sorted by position.
    async fn roles(&self) -> Result<Vec<Role>, AppError>;

    /// All issue statuses, sorted by position.
    async fn statuses(&self) -> Result<Vec<IssueStatus>, AppError>;

    async fn transitions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<TransitionRule>, AppError>;

    /// Distinct status ids used as either endpoint of a non-self transition.
    async fn used_status_ids(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<StatusId>, AppError>;

    /// Apply every cell in `matrix` to every (tracker, role) pair: enabled
    /// cells get a row, disabled cells lose theirs. Returns the number of
    /// rows inserted or deleted.
    async fn replace_transitions(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
        matrix: &RuleMatrix,
    ) -> Result<u64, AppError>;

    /// Transition rule counts per (tracker, role).
    async fn workflow_counts(&self) -> Result<Vec<WorkflowCount>, AppError>;

    async fn permissions_in_scope(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
    ) -> Result<Vec<PermissionRow>, AppError>;

    /// For each (field, status) edit, drop the scope's rows and insert the
    /// new rule for every (tracker, role) when it is `Some`.
    async fn replace_permissions(
        &self,
        trackers: &[TrackerId],
        roles: &[RoleId],
        edits: &PermissionEdits,
    ) -> Result<(), AppError>;

    /// Replace all rules of each target pair with the rules of its source pair.
    /// `pairs` holds `(source, target)` tuples of (tracker, role).
    async fn copy_rules(
        &self,
        pairs: &[((TrackerId, RoleId), (TrackerId, RoleId))],
    ) -> Result<(), AppError>;
}
