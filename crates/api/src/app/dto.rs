use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowforge_auth::{Capability, Role};
use flowforge_core::{InviteId, OrgId, UserId};
use flowforge_identity::{AuthSession, Invite, InviteIssued, Membership};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub org_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub token: String,
    #[serde(default)]
    pub password: String,
}

// -------------------------
// Response DTOs
// -------------------------

/// Body of register, login and accept-invite.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub token: String,
    pub role: Role,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user_id: session.user_id,
            org_id: session.org_id,
            token: session.token.into_string(),
            role: session.role,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub invite_id: InviteId,
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl From<InviteIssued> for InviteResponse {
    fn from(issued: InviteIssued) -> Self {
        Self {
            invite_id: issued.invite_id,
            token: issued.token,
            email: issued.email,
            expires_at: issued.expires_at,
        }
    }
}

/// Listing entry; never carries the invite token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteSummary {
    pub invite_id: InviteId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Invite> for InviteSummary {
    fn from(invite: Invite) -> Self {
        Self {
            invite_id: invite.id,
            email: invite.email,
            expires_at: invite.expires_at,
            accepted_at: invite.accepted_at,
            created_at: invite.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub user_id: UserId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl From<Membership> for MemberResponse {
    fn from(m: Membership) -> Self {
        Self {
            user_id: m.user_id,
            role: m.role,
            joined_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub role: Role,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityCheckResponse {
    pub capability: Capability,
    pub role: Role,
}
