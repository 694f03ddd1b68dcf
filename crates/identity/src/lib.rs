//! `flowforge-identity`: registration, login and the invitation lifecycle.
//!
//! The identity service is the only issuer of bearer tokens. Persistence is
//! behind [`CredentialStore`]; this crate ships the in-memory implementation
//! and `flowforge-infra` the Postgres one.

pub mod memory;
pub mod model;
pub mod service;
pub mod store;

pub use memory::{InMemoryCredentialStore, StoreStats};
pub use model::{Invite, Membership, Org, User, normalize_email};
pub use service::{
    AuthSession, ExistingAccountPolicy, INVITE_TTL_DAYS, IdentityConfig, IdentityService,
    InviteIssued,
};
pub use store::{CredentialStore, InviteAcceptance, NewAccount, StoreError};
