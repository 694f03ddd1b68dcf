use flowforge_auth::{Principal, Role};
use flowforge_core::{OrgId, UserId};

/// Tenant context for a request, taken from the trusted `X-Org-Id`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    org_id: OrgId,
}

impl TenantContext {
    pub fn new(org_id: OrgId) -> Self {
        Self { org_id }
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }
}

/// Principal context for a request (trusted user, org and role).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    org_id: OrgId,
    role: Role,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, org_id: OrgId, role: Role) -> Self {
        Self { user_id, org_id, role }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn to_principal(&self) -> Principal {
        Principal::new(self.user_id, self.org_id, self.role)
    }
}
