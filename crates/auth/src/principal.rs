use serde::{Deserialize, Serialize};

use flowforge_core::{OrgId, UserId};

use crate::{Role, TokenClaims};

/// An authenticated caller acting within one organization.
///
/// Built either from verified token claims (at the edge) or from the trusted
/// headers the edge injected (downstream).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, org_id: OrgId, role: Role) -> Self {
        Self {
            user_id,
            org_id,
            role,
        }
    }
}

impl From<&TokenClaims> for Principal {
    fn from(claims: &TokenClaims) -> Self {
        Self::new(claims.sub, claims.org_id, claims.role)
    }
}
