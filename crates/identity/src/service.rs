//! Identity service: registration, login and invitations.
//!
//! Every mutating operation builds its complete write set and signs the
//! caller's token *before* handing the writes to the store as one atomic
//! unit. A signing failure therefore writes nothing, and a rejected write
//! drops the already-signed token.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use tracing::{info, warn};

use flowforge_auth::{Capability, PasswordHasher, Role, Token, TokenCodec, is_allowed};
use flowforge_core::{
    Clock, DomainError, DomainResult, InviteId, MembershipId, OrgId, SystemClock, UserId,
};

use crate::model::{Invite, Membership, Org, User, normalize_email};
use crate::store::{CredentialStore, InviteAcceptance, NewAccount};

/// Invitations expire this many days after creation.
pub const INVITE_TTL_DAYS: i64 = 7;

const INVITE_TOKEN_BYTES: usize = 32;

/// What to do when an invite is accepted for an email that already has an account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingAccountPolicy {
    /// Attach the existing account and ignore the supplied password.
    ///
    /// Anyone holding the invite token can bind the existing account to the
    /// org without proving they own it.
    #[default]
    ReuseWithoutPassword,

    /// The supplied password must match the existing account's hash.
    RequirePassword,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub invite_ttl: Duration,
    pub existing_account_on_accept: ExistingAccountPolicy,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            invite_ttl: Duration::days(INVITE_TTL_DAYS),
            existing_account_on_accept: ExistingAccountPolicy::default(),
        }
    }
}

/// Result of register, login and accept-invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub token: Token,
    pub role: Role,
}

/// Result of create-invite. `token` is handed to the invitee out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteIssued {
    pub invite_id: InviteId,
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    config: IdentityConfig,
    /// Verified against on unknown-email logins so both failure paths hash.
    dummy_hash: Option<String>,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: TokenCodec,
    ) -> Self {
        let dummy_hash = hasher.hash("flowforge-dummy-password").ok();
        Self {
            store,
            hasher,
            codec,
            clock: Arc::new(SystemClock),
            config: IdentityConfig::default(),
            dummy_hash,
        }
    }

    pub fn with_config(mut self, config: IdentityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create a user, its org and an OWNER membership, and sign a token.
    pub async fn register(&self, email: &str, password: &str, org_name: &str) -> DomainResult<AuthSession> {
        let email = normalize_email(email)?;
        require_present(password, "password")?;
        let org_name = org_name.trim();
        require_present(org_name, "org name")?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(DomainError::conflict("email already registered"));
        }

        let now = self.clock.now();
        let user = User {
            id: UserId::new(),
            email,
            password_hash: self.hash(password)?,
            created_at: now,
        };
        let org = Org {
            id: OrgId::new(),
            name: org_name.to_string(),
            created_at: now,
        };
        let membership = Membership {
            id: MembershipId::new(),
            org_id: org.id,
            user_id: user.id,
            role: Role::Owner,
            created_at: now,
        };

        let session = self.session(user.id, org.id, Role::Owner)?;
        self.store
            .create_account(NewAccount { user, org, membership })
            .await?;

        info!(user_id = %session.user_id, org_id = %session.org_id, "account registered");
        Ok(session)
    }

    /// Authenticate and sign a token for the user's first membership.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> DomainResult<AuthSession> {
        let email = normalize_email(email).map_err(|_| DomainError::Unauthorized)?;

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            if let Some(dummy) = &self.dummy_hash {
                let _ = self.hasher.verify(password, dummy);
            }
            return Err(DomainError::Unauthorized);
        };
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(DomainError::Unauthorized);
        }

        // Switching orgs is not supported: a multi-org user always lands in the oldest one.
        let membership = self
            .store
            .memberships_for_user(user.id)
            .await?
            .into_iter()
            .min_by_key(|m| (m.created_at, m.id))
            .ok_or_else(|| DomainError::precondition("user has no organization memberships"))?;

        let session = self.session(user.id, membership.org_id, membership.role)?;
        info!(user_id = %session.user_id, org_id = %session.org_id, role = %session.role, "login");
        Ok(session)
    }

    /// Invite `email` into `org_id`. The inviter must hold `InviteUsers` there.
    pub async fn create_invite(&self, org_id: OrgId, inviter: UserId, email: &str) -> DomainResult<InviteIssued> {
        let email = normalize_email(email)?;

        let inviter_membership = self
            .store
            .find_membership(org_id, inviter)
            .await?
            .ok_or_else(|| DomainError::forbidden("not a member of this organization"))?;
        if !is_allowed(Some(inviter_membership.role), Capability::InviteUsers) {
            return Err(DomainError::forbidden("only ADMIN or OWNER can invite users"));
        }

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            if self.store.find_membership(org_id, existing.id).await?.is_some() {
                return Err(DomainError::conflict("user is already a member of this organization"));
            }
        }

        let now = self.clock.now();
        let invite = Invite {
            id: InviteId::new(),
            org_id,
            email,
            token: generate_invite_token(),
            expires_at: now + self.config.invite_ttl,
            accepted_at: None,
            created_at: now,
        };
        let issued = InviteIssued {
            invite_id: invite.id,
            token: invite.token.clone(),
            email: invite.email.clone(),
            expires_at: invite.expires_at,
        };

        self.store.insert_invite(invite).await?;

        info!(invite_id = %issued.invite_id, %org_id, inviter = %inviter, "invite created");
        Ok(issued)
    }

    /// Accept an invite exactly once, creating the account if needed.
    pub async fn accept_invite(&self, token: &str, password: &str) -> DomainResult<AuthSession> {
        let invite = self
            .store
            .find_invite_by_token(token.trim())
            .await?
            .ok_or_else(|| DomainError::not_found("invite"))?;

        if invite.is_accepted() {
            return Err(DomainError::conflict("invite has already been accepted"));
        }
        let now = self.clock.now();
        if invite.is_expired_at(now) {
            return Err(DomainError::expired("invite has expired"));
        }
        if self.store.find_org(invite.org_id).await?.is_none() {
            return Err(DomainError::not_found("organization"));
        }

        let (user_id, new_user) = match self.store.find_user_by_email(&invite.email).await? {
            Some(existing) => {
                match self.config.existing_account_on_accept {
                    ExistingAccountPolicy::ReuseWithoutPassword => {
                        warn!(
                            invite_id = %invite.id,
                            user_id = %existing.id,
                            "invite accepted for existing account without password check"
                        );
                    }
                    ExistingAccountPolicy::RequirePassword => {
                        if !self.hasher.verify(password, &existing.password_hash) {
                            return Err(DomainError::Unauthorized);
                        }
                    }
                }
                (existing.id, None)
            }
            None => {
                require_present(password, "password")?;
                let user = User {
                    id: UserId::new(),
                    email: invite.email.clone(),
                    password_hash: self.hash(password)?,
                    created_at: now,
                };
                (user.id, Some(user))
            }
        };

        let membership = Membership {
            id: MembershipId::new(),
            org_id: invite.org_id,
            user_id,
            role: Role::Member,
            created_at: now,
        };

        let session = self.session(user_id, invite.org_id, Role::Member)?;
        self.store
            .accept_invite(InviteAcceptance {
                invite_id: invite.id,
                accepted_at: now,
                new_user,
                membership,
            })
            .await?;

        info!(invite_id = %invite.id, user_id = %user_id, org_id = %invite.org_id, "invite accepted");
        Ok(session)
    }

    /// Members of an org, oldest first. The caller must be a member.
    pub async fn list_members(&self, org_id: OrgId, caller: UserId) -> DomainResult<Vec<Membership>> {
        self.require_membership(org_id, caller).await?;
        Ok(self.store.memberships_for_org(org_id).await?)
    }

    /// Invites of an org, newest first. The caller must be allowed to invite.
    pub async fn list_invites(&self, org_id: OrgId, caller: UserId) -> DomainResult<Vec<Invite>> {
        let membership = self.require_membership(org_id, caller).await?;
        if !is_allowed(Some(membership.role), Capability::InviteUsers) {
            return Err(DomainError::forbidden("only ADMIN or OWNER can view invites"));
        }
        Ok(self.store.invites_for_org(org_id).await?)
    }

    async fn require_membership(&self, org_id: OrgId, user_id: UserId) -> DomainResult<Membership> {
        self.store
            .find_membership(org_id, user_id)
            .await?
            .ok_or_else(|| DomainError::forbidden("not a member of this organization"))
    }

    fn hash(&self, password: &str) -> DomainResult<String> {
        self.hasher.hash(password).map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            DomainError::Internal
        })
    }

    fn session(&self, user_id: UserId, org_id: OrgId, role: Role) -> DomainResult<AuthSession> {
        let token = self.codec.issue(user_id, org_id, role).map_err(|e| {
            tracing::error!(error = %e, "token issuance failed");
            DomainError::Internal
        })?;
        Ok(AuthSession {
            user_id,
            org_id,
            token,
            role,
        })
    }
}

fn require_present(value: &str, field: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn generate_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
