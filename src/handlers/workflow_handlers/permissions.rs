use actix_session::Session;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

use crate::auth::session::{RequestContext, WORKFLOW_MANAGE, set_flash, take_flash};
use crate::errors::AppError;
use crate::models::reference::{Role, Tracker};
use crate::models::workflow::RuleStore;
use crate::models::workflow::params::{PermissionParams, ScopeParams};
use crate::models::workflow::permission::{RulesByStatus, rules_by_status};
use crate::models::workflow::scope::{Scope, resolve_scope, workflow_roles};
use crate::models::workflow::update::update_permissions;
use super::{
    Submission, flash_success, json_result, merge_query_scope, query_pairs, read_submission,
    redirect_back, scope_path, wants_json,
};

#[derive(Serialize)]
pub struct PermissionsResponse {
    pub trackers: Vec<Tracker>,
    pub roles: Vec<Role>,
    pub scope: Option<Scope>,
    pub permissions: RulesByStatus,
    pub flash: Option<String>,
}

/// GET /workflows/permissions?tracker_id[]=..&role_id[]=..
pub async fn show(
    store: web::Data<dyn RuleStore>,
    ctx: RequestContext,
    session: Session,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    ctx.require(WORKFLOW_MANAGE)?;
    let store: &dyn RuleStore = store.get_ref();

    let params = ScopeParams::from_form(&query_pairs(&req));
    let scope = resolve_scope(store, &params).await?;
    let permissions = match &scope {
        Some(scope) => {
            let rows = store
                .permissions_in_scope(&scope.tracker_ids(), &scope.role_ids())
                .await?;
            rules_by_status(&scope.status_ids(), &rows)
        }
        None => RulesByStatus::new(),
    };

    Ok(HttpResponse::Ok().json(PermissionsResponse {
        trackers: store.trackers().await?,
        roles: workflow_roles(store).await?,
        scope,
        permissions,
        flash: take_flash(&session),
    }))
}

/// POST|PATCH /workflows/permissions
pub async fn update(
    store: web::Data<dyn RuleStore>,
    ctx: RequestContext,
    session: Session,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    ctx.require(WORKFLOW_MANAGE)?;
    let store: &dyn RuleStore = store.get_ref();

    let submission = match read_submission(&req, &body) {
        Ok(submission) => submission,
        Err(e) if wants_json(&req) => return Ok(json_result(Err(e))),
        Err(e) => return Err(e),
    };
    let params = match submission {
        Submission::Json(value) => {
            let mut params = PermissionParams::from_json(&value);
            merge_query_scope(&mut params.scope, &req);
            params
        }
        Submission::Form(pairs) => PermissionParams::from_form(&pairs),
    };

    let result = update_permissions(store, &ctx, &params).await;

    if wants_json(&req) {
        return Ok(json_result(result.map(|applied| serde_json::json!({ "applied": applied }))));
    }

    let fallback = scope_path("/workflows/permissions", &params.scope);
    match result {
        Ok(_) => {
            flash_success(&session);
            Ok(redirect_back(&req, fallback))
        }
        Err(AppError::Validation(message)) => {
            set_flash(&session, &message);
            Ok(redirect_back(&req, fallback))
        }
        Err(e) => Err(e),
    }
}
