//! Persisted credential records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowforge_auth::Role;
use flowforge_core::{DomainError, InviteId, MembershipId, OrgId, UserId};

/// Serializes without `password_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    /// Normalised (see [`normalize_email`]); unique across the system.
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub id: OrgId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A user's role in one org. `(org_id, user_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Time-bound, single-use invitation into an org. Serializes without `token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invite {
    pub id: InviteId,
    pub org_id: OrgId,
    pub email: String,
    /// Opaque, unique.
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Set exactly once, on acceptance.
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    /// Expiry is absolute: valid up to and including `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Canonical form used for every email lookup and insert.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(DomainError::validation("email must not be empty"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(DomainError::validation("email must look like local@domain")),
    }
}
