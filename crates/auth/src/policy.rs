use serde::Serialize;
use thiserror::Error;

use flowforge_core::OrgId;

use crate::{Principal, Role};

/// Named permission gated by role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreateWorkflow,
    UpdateWorkflow,
    DeleteWorkflow,
    RunWorkflow,
    InviteUsers,
    ManageOrgSettings,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::CreateWorkflow,
        Capability::UpdateWorkflow,
        Capability::DeleteWorkflow,
        Capability::RunWorkflow,
        Capability::InviteUsers,
        Capability::ManageOrgSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateWorkflow => "create_workflow",
            Capability::UpdateWorkflow => "update_workflow",
            Capability::DeleteWorkflow => "delete_workflow",
            Capability::RunWorkflow => "run_workflow",
            Capability::InviteUsers => "invite_users",
            Capability::ManageOrgSettings => "manage_org_settings",
        }
    }

    /// The role → capability matrix.
    pub(crate) fn allows(self, role: Role) -> bool {
        match self {
            Capability::CreateWorkflow | Capability::UpdateWorkflow | Capability::RunWorkflow => true,
            Capability::InviteUsers => matches!(role, Role::Owner | Role::Admin),
            Capability::DeleteWorkflow | Capability::ManageOrgSettings => role == Role::Owner,
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown capability '{0}'")]
pub struct UnknownCapability(pub String);

impl core::str::FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no authenticated principal")]
    Unauthenticated,

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: role lacks capability '{0}'")]
    Forbidden(Capability),
}

/// Pure role check. An absent role always denies.
pub fn is_allowed(role: Option<Role>, capability: Capability) -> bool {
    role.is_some_and(|role| capability.allows(role))
}

pub fn can_create_workflow(role: Option<Role>) -> bool {
    is_allowed(role, Capability::CreateWorkflow)
}

pub fn can_update_workflow(role: Option<Role>) -> bool {
    is_allowed(role, Capability::UpdateWorkflow)
}

/// OWNER only.
pub fn can_delete_workflow(role: Option<Role>) -> bool {
    is_allowed(role, Capability::DeleteWorkflow)
}

pub fn can_run_workflow(role: Option<Role>) -> bool {
    is_allowed(role, Capability::RunWorkflow)
}

/// ADMIN or OWNER.
pub fn can_invite_users(role: Option<Role>) -> bool {
    is_allowed(role, Capability::InviteUsers)
}

/// OWNER only.
pub fn can_manage_org_settings(role: Option<Role>) -> bool {
    is_allowed(role, Capability::ManageOrgSettings)
}

/// Authorize a principal for a capability.
///
/// - No IO
/// - No panics
pub fn authorize(principal: Option<&Principal>, capability: Capability) -> Result<(), AuthzError> {
    let principal = principal.ok_or(AuthzError::Unauthenticated)?;
    if is_allowed(Some(principal.role), capability) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(capability))
    }
}

/// Like [`authorize`], but also requires the principal to act within `org_id`.
pub fn authorize_in_org(
    principal: Option<&Principal>,
    org_id: OrgId,
    capability: Capability,
) -> Result<(), AuthzError> {
    let p = principal.ok_or(AuthzError::Unauthenticated)?;
    if p.org_id != org_id {
        return Err(AuthzError::TenantMismatch);
    }
    authorize(principal, capability)
}

#[cfg(test)]
mod tests {
    use flowforge_core::UserId;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn capability_matrix() {
        use Capability::*;
        let expected: [(Capability, [bool; 3]); 6] = [
            // (OWNER, ADMIN, MEMBER)
            (CreateWorkflow, [true, true, true]),
            (UpdateWorkflow, [true, true, true]),
            (DeleteWorkflow, [true, false, false]),
            (RunWorkflow, [true, true, true]),
            (InviteUsers, [true, true, false]),
            (ManageOrgSettings, [true, false, false]),
        ];

        for (cap, allowed) in expected {
            for (role, want) in Role::ALL.into_iter().zip(allowed) {
                assert_eq!(is_allowed(Some(role), cap), want, "{role} / {cap}");
            }
        }
    }

    #[test]
    fn capability_parses_from_wire_name() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert_eq!("INVITE_USERS".parse::<Capability>().unwrap(), Capability::InviteUsers);
        assert!("fly".parse::<Capability>().is_err());
    }

    #[test]
    fn named_predicates_agree_with_matrix() {
        assert!(can_delete_workflow(Some(Role::Owner)));
        assert!(!can_delete_workflow(Some(Role::Admin)));
        assert!(can_invite_users(Some(Role::Admin)));
        assert!(!can_invite_users(Some(Role::Member)));
        assert!(!can_manage_org_settings(Some(Role::Admin)));
        assert!(can_run_workflow(Some(Role::Member)));
        assert!(can_update_workflow(Some(Role::Member)));
        assert!(can_create_workflow(Some(Role::Member)));
    }

    #[test]
    fn authorize_reports_missing_capability() {
        let member = Principal::new(UserId::new(), OrgId::new(), Role::Member);
        assert_eq!(
            authorize(Some(&member), Capability::InviteUsers),
            Err(AuthzError::Forbidden(Capability::InviteUsers))
        );
        assert_eq!(authorize(Some(&member), Capability::RunWorkflow), Ok(()));
        assert_eq!(authorize(None, Capability::RunWorkflow), Err(AuthzError::Unauthenticated));
    }

    #[test]
    fn authorize_in_org_blocks_other_tenants() {
        let owner = Principal::new(UserId::new(), OrgId::new(), Role::Owner);
        assert_eq!(
            authorize_in_org(Some(&owner), OrgId::new(), Capability::CreateWorkflow),
            Err(AuthzError::TenantMismatch)
        );
        assert_eq!(
            authorize_in_org(Some(&owner), owner.org_id, Capability::DeleteWorkflow),
            Ok(())
        );
    }

    fn any_capability() -> impl Strategy<Value = Capability> {
        proptest::sample::select(Capability::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn absent_role_always_denies(cap in any_capability()) {
            prop_assert!(!is_allowed(None, cap));
        }

        #[test]
        fn owner_holds_every_capability(cap in any_capability()) {
            prop_assert!(is_allowed(Some(Role::Owner), cap));
        }
    }
}
