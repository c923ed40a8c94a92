use actix_session::Session;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

use crate::auth::session::{RequestContext, WORKFLOW_MANAGE, set_flash, take_flash};
use crate::errors::AppError;
use crate::models::reference::{Role, Tracker};
use crate::models::workflow::params::{ScopeParams, TransitionParams};
use crate::models::workflow::scope::{Scope, resolve_scope, workflow_roles};
use crate::models::workflow::update::update_transitions;
use crate::models::workflow::{NestedTransitions, RuleStore, build_from_store};
use super::{
    Submission, flash_success, json_result, merge_query_scope, query_pairs, read_submission,
    redirect_back, scope_path, wants_json,
};

#[derive(Serialize)]
pub struct EditResponse {
    pub trackers: Vec<Tracker>,
    pub roles: Vec<Role>,
    /// `None` until at least one tracker and one role are selected.
    pub scope: Option<Scope>,
    pub transitions: NestedTransitions,
    pub flash: Option<String>,
}

/// GET /workflows/edit?tracker_id[]=..&role_id[]=..&used_statuses_only=0|1
pub async fn edit(
    store: web::Data<dyn RuleStore>,
    ctx: RequestContext,
    session: Session,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    ctx.require(WORKFLOW_MANAGE)?;
    let store: &dyn RuleStore = store.get_ref();

    let params = ScopeParams::from_form(&query_pairs(&req));
    let scope = resolve_scope(store, &params).await?;
    let transitions = match &scope {
        Some(scope) if !scope.statuses.is_empty() => build_from_store(store, scope).await?.to_nested(),
        _ => NestedTransitions::new(),
    };

    Ok(HttpResponse::Ok().json(EditResponse {
        trackers: store.trackers().await?,
        roles: workflow_roles(store).await?,
        scope,
        transitions,
        flash: take_flash(&session),
    }))
}

/// POST|PATCH /workflows/edit
///
/// Form submissions carry every cell (`no_change` for untouched ones) and
/// get a redirect. JSON submissions with `delta_update: true` carry only
/// changed cells and get a status body.
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

    let (params, json_request) = match submission {
        Submission::Json(value) => {
            let mut params = TransitionParams::from_json(&value);
            merge_query_scope(&mut params.scope, &req);
            (params, true)
        }
        Submission::Form(pairs) => (TransitionParams::from_form(&pairs), false),
    };

    let result = update_transitions(store, &ctx, &params, json_request).await;
    let fallback = scope_path("/workflows/edit", &params.scope);

    if wants_json(&req) {
        return Ok(json_result(result.map(|outcome| {
            serde_json::json!({
                "changed": outcome.changed,
                "rows_written": outcome.rows_written,
                "redirect_url": fallback
            })
        })));
    }

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
