//! Credential persistence contract.
//!
//! Pure data access: uniqueness and exactly-once rules are enforced here
//! because only the storage layer can serialise concurrent writers, but no
//! role or expiry policy lives in a store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use flowforge_core::{DomainError, InviteId, OrgId, UserId};

use crate::model::{Invite, Membership, Org, User};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique key or compare-and-set precondition was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (connection, serialisation, poisoned lock).
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::NotFound(msg) => DomainError::NotFound(msg),
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "credential store failure");
                DomainError::Internal
            }
        }
    }
}

/// Everything `register` writes, committed as one unit.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user: User,
    pub org: Org,
    pub membership: Membership,
}

/// Everything `accept_invite` writes, committed as one unit.
#[derive(Debug, Clone)]
pub struct InviteAcceptance {
    pub invite_id: InviteId,
    pub accepted_at: DateTime<Utc>,
    /// Present when the invitee has no account yet.
    pub new_user: Option<User>,
    pub membership: Membership,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_org(&self, id: OrgId) -> Result<Option<Org>, StoreError>;

    async fn find_membership(&self, org_id: OrgId, user_id: UserId) -> Result<Option<Membership>, StoreError>;

    /// Oldest first.
    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError>;

    /// Oldest first.
    async fn memberships_for_org(&self, org_id: OrgId) -> Result<Vec<Membership>, StoreError>;

    async fn find_invite_by_token(&self, token: &str) -> Result<Option<Invite>, StoreError>;

    /// Newest first.
    async fn invites_for_org(&self, org_id: OrgId) -> Result<Vec<Invite>, StoreError>;

    /// Insert user, org and membership atomically.
    ///
    /// `Conflict` (and nothing written) when the email is taken.
    async fn create_account(&self, account: NewAccount) -> Result<(), StoreError>;

    /// `Conflict` when the token is already in use.
    async fn insert_invite(&self, invite: Invite) -> Result<(), StoreError>;

    /// Stamp `accepted_at` and write the membership (plus new user) atomically.
    ///
    /// Compare-and-set on `accepted_at IS NULL`: of several concurrent callers
    /// exactly one succeeds and the rest get `Conflict`. Also `Conflict` when
    /// the new user's email or the membership already exists.
    async fn accept_invite(&self, acceptance: InviteAcceptance) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_email(email).await
    }

    async fn find_org(&self, id: OrgId) -> Result<Option<Org>, StoreError> {
        (**self).find_org(id).await
    }

    async fn find_membership(&self, org_id: OrgId, user_id: UserId) -> Result<Option<Membership>, StoreError> {
        (**self).find_membership(org_id, user_id).await
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError> {
        (**self).memberships_for_user(user_id).await
    }

    async fn memberships_for_org(&self, org_id: OrgId) -> Result<Vec<Membership>, StoreError> {
        (**self).memberships_for_org(org_id).await
    }

    async fn find_invite_by_token(&self, token: &str) -> Result<Option<Invite>, StoreError> {
        (**self).find_invite_by_token(token).await
    }

    async fn invites_for_org(&self, org_id: OrgId) -> Result<Vec<Invite>, StoreError> {
        (**self).invites_for_org(org_id).await
    }

    async fn create_account(&self, account: NewAccount) -> Result<(), StoreError> {
        (**self).create_account(account).await
    }

    async fn insert_invite(&self, invite: Invite) -> Result<(), StoreError> {
        (**self).insert_invite(invite).await
    }

    async fn accept_invite(&self, acceptance: InviteAcceptance) -> Result<(), StoreError> {
        (**self).accept_invite(acceptance).await
    }
}
