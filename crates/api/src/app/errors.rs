use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowforge_auth::AuthzError;
use flowforge_core::DomainError;

/// Domain error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => Self(DomainError::Unauthorized),
            AuthzError::TenantMismatch => Self(DomainError::forbidden("tenant mismatch")),
            AuthzError::Forbidden(cap) => Self(DomainError::forbidden(format!("role lacks capability '{cap}'"))),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        domain_error_to_response(self.0)
    }
}

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::Unauthorized => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Expired(_) => StatusCode::GONE,
        DomainError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
        DomainError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    json_error(status_for(&err), err.code(), err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
