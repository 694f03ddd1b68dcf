use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowforge_core::{OrgId, UserId};

use crate::Role;

/// Allowed clock skew between issuing and verifying processes, in seconds.
pub const CLOCK_SKEW_LEEWAY_SECS: i64 = 60;

/// Signed claim set carried by a bearer token.
///
/// Timestamps are seconds since the Unix epoch. `exp` is absent when tokens
/// are issued without a lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id.
    pub sub: UserId,

    /// Organization the token is scoped to.
    pub org_id: OrgId,

    /// Role held in `org_id` at issuance.
    pub role: Role,

    /// Issued-at.
    pub iat: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of already-decoded claims.
///
/// Signature verification is done by the codec before this runs.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();

    if let Some(exp) = claims.exp {
        if exp <= claims.iat {
            return Err(TokenValidationError::InvalidTimeWindow);
        }
        if now >= exp {
            return Err(TokenValidationError::Expired);
        }
    }
    if now + CLOCK_SKEW_LEEWAY_SECS < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    Ok(())
}
