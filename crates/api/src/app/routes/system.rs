use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};

use flowforge_auth::Capability;
use flowforge_core::DomainError;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /whoami - the trusted context this request carries
pub async fn whoami(
    tenant: Option<Extension<TenantContext>>,
    principal: Option<Extension<PrincipalContext>>,
) -> Result<Json<dto::WhoAmIResponse>, ApiError> {
    let (Some(Extension(tenant)), Some(Extension(principal))) = (tenant, principal) else {
        return Err(ApiError(DomainError::Unauthorized));
    };
    Ok(Json(dto::WhoAmIResponse {
        user_id: principal.user_id(),
        org_id: tenant.org_id(),
        role: principal.role(),
        capabilities: authz::capabilities(&principal),
    }))
}

/// GET /authz/check/:capability - 200 if the caller's role grants it, 403 otherwise
pub async fn check_capability(
    principal: Option<Extension<PrincipalContext>>,
    Path(capability): Path<String>,
) -> Result<Json<dto::CapabilityCheckResponse>, ApiError> {
    let Some(Extension(principal)) = principal else {
        return Err(ApiError(DomainError::Unauthorized));
    };
    let capability: Capability = capability
        .parse()
        .map_err(|e: flowforge_auth::UnknownCapability| DomainError::validation(e.to_string()))?;

    authz::require(&principal, capability)?;
    Ok(Json(dto::CapabilityCheckResponse {
        capability,
        role: principal.role(),
    }))
}
