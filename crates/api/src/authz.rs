//! API-side authorization guard.
//!
//! Downstream handlers authorize against the role carried in the trusted
//! headers; the policy itself lives in `flowforge-auth`. Routes that name an
//! org in their path also require it to be the principal's own.

use flowforge_auth::{AuthzError, Capability, authorize, authorize_in_org};
use flowforge_core::OrgId;

use crate::context::PrincipalContext;

/// Check a capability for the current request's principal.
pub fn require(principal: &PrincipalContext, capability: Capability) -> Result<(), AuthzError> {
    authorize(Some(&principal.to_principal()), capability)
}

/// Check a capability for acting within `org_id`.
pub fn require_in_org(principal: &PrincipalContext, org_id: OrgId, capability: Capability) -> Result<(), AuthzError> {
    authorize_in_org(Some(&principal.to_principal()), org_id, capability)
}

/// Reject principals whose token names another org.
pub fn require_same_org(principal: &PrincipalContext, org_id: OrgId) -> Result<(), AuthzError> {
    if principal.org_id() == org_id {
        Ok(())
    } else {
        Err(AuthzError::TenantMismatch)
    }
}

/// Every capability the principal's role grants.
pub fn capabilities(principal: &PrincipalContext) -> Vec<Capability> {
    principal.role().capabilities()
}
