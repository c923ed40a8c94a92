use actix_session::{Session, SessionExt};
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use std::future::{Ready, ready};

use crate::errors::AppError;

/// Permission required for every workflow editing route.
pub const WORKFLOW_MANAGE: &str = "workflow.manage";

/// Wrapper around permission codes carried in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn has(&self, code: &str) -> bool {
        self.0.iter().any(|p| p == code)
    }

    pub fn from_csv(csv: &str) -> Self {
        let codes = csv
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Permissions(codes)
    }
}

pub fn get_user_id(session: &Session) -> Option<i64> {
    session.get::<i64>("user_id").unwrap_or(None)
}

pub fn get_permissions(session: &Session) -> Result<Permissions, String> {
    match session.get::<String>("permissions") {
        Ok(Some(csv)) => Ok(Permissions::from_csv(&csv)),
        Ok(None) => Err("No permissions in session".to_string()),
        Err(e) => Err(format!("Session error: {}", e)),
    }
}

pub fn set_flash(session: &Session, message: &str) {
    if let Err(e) = session.insert("flash", message) {
        log::warn!("Could not store flash message: {e}");
    }
}

/// Read the pending flash message and clear it.
pub fn take_flash(session: &Session) -> Option<String> {
    session.remove_as::<String>("flash").and_then(Result::ok)
}

/// Who is making the request, read once from the session and passed
/// explicitly to everything that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub permissions: Permissions,
}

impl RequestContext {
    pub fn from_session(session: &Session) -> Result<Self, AppError> {
        let user_id = get_user_id(session)
            .ok_or_else(|| AppError::Session("User not logged in".to_string()))?;
        let permissions = get_permissions(session)
            .map_err(|e| AppError::Session(format!("Failed to get permissions: {}", e)))?;
        Ok(RequestContext { user_id, permissions })
    }

    /// Check permission; returns Err(AppError) if denied.
    pub fn require(&self, code: &str) -> Result<(), AppError> {
        if self.permissions.has(code) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(code.to_string()))
        }
    }
}

impl FromRequest for RequestContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(RequestContext::from_session(&req.get_session()))
    }
}
