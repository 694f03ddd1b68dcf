//! `flowforge-auth`: token codec, roles and capability policy.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod claims;
pub mod codec;
pub mod keys;
pub mod password;
pub mod policy;
pub mod principal;
pub mod roles;

pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use codec::{InvalidReason, InvalidToken, Token, TokenCodec, TokenError};
pub use keys::{KeyError, SigningKeys};
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use policy::{
    AuthzError, Capability, UnknownCapability, authorize, authorize_in_org, can_create_workflow,
    can_delete_workflow, can_invite_users, can_manage_org_settings, can_run_workflow,
    can_update_workflow, is_allowed,
};
pub use principal::Principal;
pub use roles::{Role, UnknownRole};
