//! Update flows for transitions and field permissions.
//!
//! A transition update moves through `Idle -> Validating -> Reconciling ->
//! Persisting -> Done`, or stops at `Rejected` when the scope or the payload
//! is missing. Nothing is written before `Persisting`, and the store applies
//! the whole matrix in one transaction.

use serde::Serialize;

use crate::auth::session::RequestContext;
use crate::errors::AppError;
use super::delta::{Reconciled, delta_from_submitted, reconcile};
use super::matrix::build_from_store;
use super::params::{PermissionParams, TransitionParams};
use super::permission::edits_from_submitted;
use super::scope::resolve_scope;
use super::store::RuleStore;

pub const INVALID_PARAMETERS: &str = "Invalid parameters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePhase {
    Idle,
    Validating,
    Reconciling,
    Persisting,
    Done,
    Rejected,
}

impl UpdatePhase {
    pub fn can_advance_to(self, next: UpdatePhase) -> bool {
        use UpdatePhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Reconciling)
                | (Validating, Rejected)
                | (Reconciling, Persisting)
                | (Reconciling, Done)
                | (Persisting, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UpdatePhase::Done | UpdatePhase::Rejected)
    }
}

fn advance(phase: &mut UpdatePhase, next: UpdatePhase) {
    debug_assert!(phase.can_advance_to(next), "illegal update phase change {phase:?} -> {next:?}");
    log::debug!("Workflow update: {phase:?} -> {next:?}");
    *phase = next;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub phase: UpdatePhase,
    /// False when a delta update carried no effective changes and storage was skipped.
    pub changed: bool,
    pub cells_applied: usize,
    pub rows_written: u64,
}

/// Validate, reconcile and persist a transition update.
///
/// Delta mode (only honoured for JSON requests) merges the submitted cells
/// onto a freshly built baseline. Full-form mode applies the submitted cells
/// as they are once `no_change` entries are gone.
pub async fn update_transitions(
    store: &dyn RuleStore,
    ctx: &RequestContext,
    params: &TransitionParams,
    json_request: bool,
) -> Result<UpdateOutcome, AppError> {
    let mut phase = UpdatePhase::Idle;
    advance(&mut phase, UpdatePhase::Validating);

    let Some(cells) = params.transitions.as_ref().filter(|cells| !cells.is_empty()) else {
        advance(&mut phase, UpdatePhase::Rejected);
        return Err(AppError::Validation(INVALID_PARAMETERS.to_string()));
    };
    let Some(scope) = resolve_scope(store, &params.scope).await? else {
        advance(&mut phase, UpdatePhase::Rejected);
        return Err(AppError::Validation(INVALID_PARAMETERS.to_string()));
    };

    advance(&mut phase, UpdatePhase::Reconciling);
    let delta = delta_from_submitted(cells);
    let matrix = if params.delta_update && json_request {
        let baseline = build_from_store(store, &scope).await?;
        match reconcile(&baseline, &delta) {
            Reconciled::Changed(merged) => merged,
            Reconciled::NoChange => {
                advance(&mut phase, UpdatePhase::Done);
                log::info!("User {} submitted an empty workflow delta; nothing to update", ctx.user_id);
                return Ok(UpdateOutcome {
                    phase,
                    changed: false,
                    cells_applied: 0,
                    rows_written: 0,
                });
            }
        }
    } else {
        delta.into_matrix()
    };

    advance(&mut phase, UpdatePhase::Persisting);
    let tracker_ids = scope.tracker_ids();
    let role_ids = scope.role_ids();
    let rows_written = store
        .replace_transitions(&tracker_ids, &role_ids, &matrix)
        .await
        .map_err(|e| {
            log::error!("Workflow transition update failed: {e}");
            e
        })?;

    advance(&mut phase, UpdatePhase::Done);
    log::info!(
        "User {} updated workflow transitions for trackers {:?} / roles {:?}: {} cells, {} rows written",
        ctx.user_id,
        tracker_ids,
        role_ids,
        matrix.len(),
        rows_written
    );
    Ok(UpdateOutcome {
        phase,
        changed: true,
        cells_applied: matrix.len(),
        rows_written,
    })
}

/// Replace field permissions for the scope. Returns the number of (field, status) edits applied.
pub async fn update_permissions(
    store: &dyn RuleStore,
    ctx: &RequestContext,
    params: &PermissionParams,
) -> Result<usize, AppError> {
    let Some(entries) = params.permissions.as_ref().filter(|entries| !entries.is_empty()) else {
        return Err(AppError::Validation(INVALID_PARAMETERS.to_string()));
    };
    let Some(scope) = resolve_scope(store, &params.scope).await? else {
        return Err(AppError::Validation(INVALID_PARAMETERS.to_string()));
    };

    let edits = edits_from_submitted(entries);
    store
        .replace_permissions(&scope.tracker_ids(), &scope.role_ids(), &edits)
        .await?;

    log::info!(
        "User {} updated {} workflow field permissions for trackers {:?} / roles {:?}",
        ctx.user_id,
        edits.len(),
        scope.tracker_ids(),
        scope.role_ids()
    );
    Ok(edits.len())
}
