//! Copy the workflow of one tracker and/or role onto other trackers and roles.

use crate::auth::session::RequestContext;
use crate::errors::AppError;
use crate::models::reference::{Role, Tracker};
use super::params::{CopyParams, CopySource};
use super::store::RuleStore;
use super::types::{RoleId, TrackerId};

pub const MISSING_SOURCE: &str = "Please select a source tracker or role";
pub const MISSING_TARGET: &str = "Please select target tracker(s) and role(s)";

pub type CopyPair = ((TrackerId, RoleId), (TrackerId, RoleId));

/// Expand a copy request into `(source, target)` pairs.
///
/// A missing source tracker or role means "the target's own". Targets that
/// would copy onto themselves are skipped.
pub fn plan_copy(
    source_tracker: Option<TrackerId>,
    source_role: Option<RoleId>,
    target_trackers: &[TrackerId],
    target_roles: &[RoleId],
) -> Result<Vec<CopyPair>, AppError> {
    if source_tracker.is_none() && source_role.is_none() {
        return Err(AppError::Validation(MISSING_SOURCE.to_string()));
    }
    if target_trackers.is_empty() || target_roles.is_empty() {
        return Err(AppError::Validation(MISSING_TARGET.to_string()));
    }

    let mut pairs = Vec::new();
    for &target_tracker in target_trackers {
        for &target_role in target_roles {
            let source = (source_tracker.unwrap_or(target_tracker), source_role.unwrap_or(target_role));
            let target = (target_tracker, target_role);
            if source != target {
                pairs.push((source, target));
            }
        }
    }
    Ok(pairs)
}

/// Resolve ids against the store, then copy. Returns the number of target pairs rewritten.
///
/// Both sources must be sent; `any` or an unknown id stands for the target's own.
pub async fn copy_workflows(
    store: &dyn RuleStore,
    ctx: &RequestContext,
    params: &CopyParams,
) -> Result<usize, AppError> {
    if params.source_tracker == CopySource::Missing || params.source_role == CopySource::Missing {
        return Err(AppError::Validation(MISSING_SOURCE.to_string()));
    }
    let trackers = store.trackers().await?;
    let roles = store.roles().await?;

    let known_tracker = |id: TrackerId| trackers.iter().any(|t: &Tracker| t.id == id);
    let known_role = |id: RoleId| roles.iter().any(|r: &Role| r.id == id);

    let source_tracker = params.source_tracker.id().filter(|id| known_tracker(*id));
    let source_role = params.source_role.id().filter(|id| known_role(*id));
    let target_trackers: Vec<TrackerId> = params
        .target_tracker_ids
        .iter()
        .copied()
        .filter(|id| known_tracker(*id))
        .collect();
    let target_roles: Vec<RoleId> = params
        .target_role_ids
        .iter()
        .copied()
        .filter(|id| known_role(*id))
        .collect();

    let pairs = plan_copy(source_tracker, source_role, &target_trackers, &target_roles)?;
    store.copy_rules(&pairs).await?;

    log::info!(
        "User {} copied workflow from tracker {:?} / role {:?} onto {} tracker-role pairs",
        ctx.user_id,
        source_tracker,
        source_role,
        pairs.len()
    );
    Ok(pairs.len())
}
