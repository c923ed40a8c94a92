use actix_session::Session;
use actix_web::{HttpRequest, HttpResponse, http::header, web};
use serde::Serialize;

use crate::auth::session::{RequestContext, WORKFLOW_MANAGE, set_flash, take_flash};
use crate::errors::AppError;
use crate::models::reference::{Role, Tracker};
use crate::models::workflow::RuleStore;
use crate::models::workflow::copy::copy_workflows;
use crate::models::workflow::params::CopyParams;
use crate::models::workflow::scope::workflow_roles;
use super::{Submission, flash_success, json_result, read_submission, wants_json};

#[derive(Serialize)]
pub struct CopyFormResponse {
    pub trackers: Vec<Tracker>,
    pub roles: Vec<Role>,
    pub flash: Option<String>,
}

/// GET /workflows/copy
pub async fn form(
    store: web::Data<dyn RuleStore>,
    ctx: RequestContext,
    session: Session,
) -> Result<HttpResponse, AppError> {
    ctx.require(WORKFLOW_MANAGE)?;
    let store: &dyn RuleStore = store.get_ref();

    Ok(HttpResponse::Ok().json(CopyFormResponse {
        trackers: store.trackers().await?,
        roles: workflow_roles(store).await?,
        flash: take_flash(&session),
    }))
}

fn copy_path(params: &CopyParams) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    if let Some(id) = params.source_tracker.id() {
        pairs.push(("source_tracker_id", id.to_string()));
    }
    if let Some(id) = params.source_role.id() {
        pairs.push(("source_role_id", id.to_string()));
    }
    match serde_urlencoded::to_string(&pairs) {
        Ok(query) if !query.is_empty() => format!("/workflows/copy?{query}"),
        _ => "/workflows/copy".to_string(),
    }
}

/// POST /workflows/duplicate
///
/// Copies rules from the source tracker/role onto every target pair, then
/// redirects back to the copy form with the source kept selected.
pub async fn duplicate(
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
        Submission::Json(value) => CopyParams::from_json(&value),
        Submission::Form(pairs) => CopyParams::from_form(&pairs),
    };

    let result = copy_workflows(store, &ctx, &params).await;

    if wants_json(&req) {
        return Ok(json_result(result.map(|copied| serde_json::json!({ "copied": copied }))));
    }

    match result {
        Ok(_) => flash_success(&session),
        Err(AppError::Validation(message)) => set_flash(&session, &message),
        Err(e) => return Err(e),
    }
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, copy_path(&params)))
        .finish())
}
