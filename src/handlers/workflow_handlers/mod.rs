pub mod copy;
pub mod overview;
pub mod permissions;
pub mod transitions;

use actix_web::{HttpRequest, HttpResponse, ResponseError, http::header, web};
use serde_json::Value;

use crate::auth::session::set_flash;
use crate::errors::AppError;
use crate::models::workflow::params::{IdSelection, ScopeParams};

pub const SUCCESSFUL_UPDATE: &str = "Successful update.";

/// Configure the workflow editor routes under `/workflows`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/workflows")
            .route("", web::get().to(overview::index))
            .route("/edit", web::get().to(transitions::edit))
            .route("/edit", web::post().to(transitions::update))
            .route("/edit", web::patch().to(transitions::update))
            .route("/permissions", web::get().to(permissions::show))
            .route("/permissions", web::post().to(permissions::update))
            .route("/permissions", web::patch().to(permissions::update))
            .route("/copy", web::get().to(copy::form))
            .route("/duplicate", web::post().to(copy::duplicate)),
    );
}

/// Fallback for unmatched routes.
pub async fn not_found() -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound)
}

/// Submitted body, decoded according to its content type.
pub(crate) enum Submission {
    Json(Value),
    Form(Vec<(String, String)>),
}

fn header_contains(req: &HttpRequest, name: header::HeaderName, needle: &str) -> bool {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains(needle))
        .unwrap_or(false)
}

pub(crate) fn has_json_body(req: &HttpRequest) -> bool {
    header_contains(req, header::CONTENT_TYPE, "application/json")
}

/// Whether the caller wants a JSON answer rather than a redirect.
pub(crate) fn wants_json(req: &HttpRequest) -> bool {
    has_json_body(req) || header_contains(req, header::ACCEPT, "application/json")
}

/// Query-string parameters as ordered pairs. A malformed query string yields none.
pub(crate) fn query_pairs(req: &HttpRequest) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(req.query_string()).unwrap_or_else(|e| {
        log::debug!("Ignoring malformed query string: {e}");
        Vec::new()
    })
}

/// Decode the body. Form bodies are merged after the query-string parameters.
pub(crate) fn read_submission(req: &HttpRequest, body: &[u8]) -> Result<Submission, AppError> {
    if has_json_body(req) {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Malformed JSON body: {e}")))?;
        return Ok(Submission::Json(value));
    }
    let mut pairs = query_pairs(req);
    let body_pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
        .map_err(|e| AppError::Validation(format!("Malformed form body: {e}")))?;
    pairs.extend(body_pairs);
    Ok(Submission::Form(pairs))
}

/// Fill scope parameters a JSON body left out from the query string.
pub(crate) fn merge_query_scope(scope: &mut ScopeParams, req: &HttpRequest) {
    scope.merge_missing(ScopeParams::from_form(&query_pairs(req)));
}

fn selection_values(selection: &IdSelection) -> Vec<String> {
    match selection {
        IdSelection::All => vec!["all".to_string()],
        IdSelection::Ids(ids) => ids.iter().map(|id| id.to_string()).collect(),
    }
}

/// `path?tracker_id[]=..&role_id[]=..&used_statuses_only=..` for a scope.
pub(crate) fn scope_path(path: &str, scope: &ScopeParams) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    for id in selection_values(&scope.trackers) {
        pairs.push(("tracker_id[]", id));
    }
    for id in selection_values(&scope.roles) {
        pairs.push(("role_id[]", id));
    }
    pairs.push(("used_statuses_only", if scope.used_statuses_only() { "1" } else { "0" }.to_string()));
    match serde_urlencoded::to_string(&pairs) {
        Ok(query) => format!("{path}?{query}"),
        Err(_) => path.to_string(),
    }
}

/// Redirect back to the referer, or to `fallback` when there is none.
pub(crate) fn redirect_back(req: &HttpRequest, fallback: String) -> HttpResponse {
    let location = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or(fallback);
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// JSON answer for an update outcome: success, 422 for bad input, 500 otherwise.
pub(crate) fn json_result(result: Result<Value, AppError>) -> HttpResponse {
    match result {
        Ok(extra) => {
            let mut body = serde_json::json!({ "status": "success", "message": SUCCESSFUL_UPDATE });
            if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
                body.extend(extra);
            }
            HttpResponse::Ok().json(body)
        }
        Err(AppError::Validation(message)) => {
            HttpResponse::UnprocessableEntity().json(serde_json::json!({ "status": "error", "message": message }))
        }
        Err(e) if e.is_client_error() => e.error_response(),
        Err(e) => {
            log::error!("{e}");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "status": "error", "message": "Update failed" }))
        }
    }
}

pub(crate) fn flash_success(session: &actix_session::Session) {
    set_flash(session, SUCCESSFUL_UPDATE);
}
