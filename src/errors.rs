use actix_web::{HttpResponse, ResponseError};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Db(sqlx::Error),
    Storage(String),
    Session(String),
    PermissionDenied(String),
    Validation(String),
    NotFound,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Storage(e) => write!(f, "Storage error: {e}"),
            AppError::Session(e) => write!(f, "Session error: {e}"),
            AppError::PermissionDenied(code) => write!(f, "Permission denied: {code}"),
            AppError::Validation(msg) => write!(f, "{msg}"),
            AppError::NotFound => write!(f, "Not found"),
        }
    }
}

impl AppError {
    /// True for failures caused by the request itself rather than by storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::PermissionDenied(_) | AppError::Session(_) | AppError::NotFound
        )
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::NotFound => HttpResponse::NotFound()
                .json(serde_json::json!({ "status": "error", "message": "Not found" })),
            AppError::PermissionDenied(code) => {
                log::warn!("Permission denied: {code}");
                HttpResponse::Forbidden().body("Forbidden")
            }
            AppError::Session(e) => {
                log::warn!("Session error: {e}");
                HttpResponse::Unauthorized().body("Unauthorized")
            }
            AppError::Validation(msg) => HttpResponse::UnprocessableEntity()
                .json(serde_json::json!({ "status": "error", "message": msg })),
            _ => {
                log::error!("{self}");
                HttpResponse::InternalServerError().body("Internal Server Error")
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Db(e)
    }
}
