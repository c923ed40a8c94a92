use serde::Serialize;

use crate::errors::AppError;
use crate::models::reference::{IssueStatus, Role, Tracker};
use super::params::{IdSelection, ScopeParams};
use super::store::RuleStore;
use super::types::*;

/// A resolved editing scope: at least one tracker and one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub trackers: Vec<Tracker>,
    pub roles: Vec<Role>,
    pub statuses: Vec<IssueStatus>,
    pub used_statuses_only: bool,
}

impl Scope {
    pub fn tracker_ids(&self) -> Vec<TrackerId> {
        self.trackers.iter().map(|t| t.id).collect()
    }

    pub fn role_ids(&self) -> Vec<RoleId> {
        self.roles.iter().map(|r| r.id).collect()
    }

    pub fn status_ids(&self) -> Vec<StatusId> {
        self.statuses.iter().map(|s| s.id).collect()
    }
}

/// `all` selects every tracker; unknown ids are dropped. `None` when nothing remains.
pub async fn resolve_trackers(
    store: &dyn RuleStore,
    selection: &IdSelection,
) -> Result<Option<Vec<Tracker>>, AppError> {
    if selection.is_empty() {
        return Ok(None);
    }
    let trackers: Vec<Tracker> = match selection {
        IdSelection::All => store.trackers().await?,
        IdSelection::Ids(ids) => store
            .trackers()
            .await?
            .into_iter()
            .filter(|t| ids.contains(&t.id))
            .collect(),
    };
    Ok((!trackers.is_empty()).then_some(trackers))
}

/// `all` selects every role taking part in workflows; explicit ids may name any role.
pub async fn resolve_roles(
    store: &dyn RuleStore,
    selection: &IdSelection,
) -> Result<Option<Vec<Role>>, AppError> {
    if selection.is_empty() {
        return Ok(None);
    }
    let roles: Vec<Role> = match selection {
        IdSelection::All => workflow_roles(store).await?,
        IdSelection::Ids(ids) => store
            .roles()
            .await?
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect(),
    };
    Ok((!roles.is_empty()).then_some(roles))
}

pub async fn workflow_roles(store: &dyn RuleStore) -> Result<Vec<Role>, AppError> {
    Ok(store
        .roles()
        .await?
        .into_iter()
        .filter(|r| r.consider_workflow)
        .collect())
}

/// With `used_only`, keep the statuses that some transition of these
/// trackers (for any workflow role) starts or ends in. Falls back to every
/// status when that leaves nothing.
pub async fn resolve_statuses(
    store: &dyn RuleStore,
    trackers: Option<&[Tracker]>,
    used_only: bool,
) -> Result<Vec<IssueStatus>, AppError> {
    let all = store.statuses().await?;
    let Some(trackers) = trackers.filter(|_| used_only) else {
        return Ok(all);
    };

    let tracker_ids: Vec<TrackerId> = trackers.iter().map(|t| t.id).collect();
    let role_ids: Vec<RoleId> = workflow_roles(store).await?.iter().map(|r| r.id).collect();
    let used = store.used_status_ids(&tracker_ids, &role_ids).await?;
    let statuses: Vec<IssueStatus> = all
        .iter()
        .filter(|s| used.contains(&s.id))
        .cloned()
        .collect();

    if statuses.is_empty() { Ok(all) } else { Ok(statuses) }
}

/// Resolve the full scope, or `None` when trackers or roles are missing.
pub async fn resolve_scope(store: &dyn RuleStore, params: &ScopeParams) -> Result<Option<Scope>, AppError> {
    let trackers = resolve_trackers(store, &params.trackers).await?;
    let roles = resolve_roles(store, &params.roles).await?;
    let statuses = resolve_statuses(store, trackers.as_deref(), params.used_statuses_only()).await?;

    match (trackers, roles) {
        (Some(trackers), Some(roles)) => Ok(Some(Scope {
            trackers,
            roles,
            statuses,
            used_statuses_only: params.used_statuses_only(),
        })),
        _ => Ok(None),
    }
}
