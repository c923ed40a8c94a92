use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate::auth::session::{RequestContext, WORKFLOW_MANAGE};
use crate::errors::AppError;
use crate::models::reference::{Role, Tracker};
use crate::models::workflow::scope::workflow_roles;
use crate::models::workflow::{RuleStore, WorkflowCount};

#[derive(Serialize)]
pub struct OverviewResponse {
    pub trackers: Vec<Tracker>,
    pub roles: Vec<Role>,
    pub counts: Vec<WorkflowCount>,
}

/// GET /workflows: transition counts for every (tracker, workflow role).
pub async fn index(store: web::Data<dyn RuleStore>, ctx: RequestContext) -> Result<HttpResponse, AppError> {
    ctx.require(WORKFLOW_MANAGE)?;
    let store: &dyn RuleStore = store.get_ref();

    let roles = workflow_roles(store).await?;
    let counts = store
        .workflow_counts()
        .await?
        .into_iter()
        .filter(|c| roles.iter().any(|r| r.id == c.role_id))
        .collect();

    Ok(HttpResponse::Ok().json(OverviewResponse {
        trackers: store.trackers().await?,
        roles,
        counts,
    }))
}
