//! Identity endpoints: thin adapters over `IdentityService`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
};

use flowforge_auth::Capability;
use flowforge_core::{DomainError, OrgId};
use flowforge_identity::IdentityService;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::extract::ApiJson;
use crate::authz::{require_in_org, require_same_org};
use crate::context::PrincipalContext;

/// POST /auth/register
pub async fn register(
    Extension(identity): Extension<Arc<IdentityService>>,
    ApiJson(body): ApiJson<dto::RegisterRequest>,
) -> Result<Json<dto::AuthResponse>, ApiError> {
    let session = identity.register(&body.email, &body.password, &body.org_name).await?;
    Ok(Json(session.into()))
}

/// POST /auth/login
pub async fn login(
    Extension(identity): Extension<Arc<IdentityService>>,
    ApiJson(body): ApiJson<dto::LoginRequest>,
) -> Result<Json<dto::AuthResponse>, ApiError> {
    let session = identity.login(&body.email, &body.password).await?;
    Ok(Json(session.into()))
}

/// POST /auth/invites/accept
pub async fn accept_invite(
    Extension(identity): Extension<Arc<IdentityService>>,
    ApiJson(body): ApiJson<dto::AcceptInviteRequest>,
) -> Result<Json<dto::AuthResponse>, ApiError> {
    let session = identity.accept_invite(&body.token, &body.password).await?;
    Ok(Json(session.into()))
}

/// POST /auth/orgs/:org_id/invites
pub async fn create_invite(
    Extension(identity): Extension<Arc<IdentityService>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(org_id): Path<String>,
    ApiJson(body): ApiJson<dto::CreateInviteRequest>,
) -> Result<Json<dto::InviteResponse>, ApiError> {
    let caller = caller(principal)?;
    let org_id: OrgId = org_id.parse()?;
    require_in_org(&caller, org_id, Capability::InviteUsers)?;
    let issued = identity.create_invite(org_id, caller.user_id(), &body.email).await?;
    Ok(Json(issued.into()))
}

/// GET /auth/orgs/:org_id/invites
pub async fn list_invites(
    Extension(identity): Extension<Arc<IdentityService>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<dto::InviteSummary>>, ApiError> {
    let caller = caller(principal)?;
    let org_id: OrgId = org_id.parse()?;
    require_in_org(&caller, org_id, Capability::InviteUsers)?;
    let invites = identity.list_invites(org_id, caller.user_id()).await?;
    Ok(Json(invites.into_iter().map(Into::into).collect()))
}

/// GET /auth/orgs/:org_id/members
pub async fn list_members(
    Extension(identity): Extension<Arc<IdentityService>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<dto::MemberResponse>>, ApiError> {
    let caller = caller(principal)?;
    let org_id: OrgId = org_id.parse()?;
    require_same_org(&caller, org_id)?;
    let members = identity.list_members(org_id, caller.user_id()).await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

fn caller(principal: Option<Extension<PrincipalContext>>) -> Result<PrincipalContext, ApiError> {
    principal
        .map(|Extension(p)| p)
        .ok_or(ApiError(DomainError::Unauthorized))
}
