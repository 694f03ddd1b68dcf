use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use flowforge_core::{InviteId, MembershipId, OrgId, UserId};

use crate::model::{Invite, Membership, Org, User};
use crate::store::{CredentialStore, InviteAcceptance, NewAccount, StoreError};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    user_by_email: HashMap<String, UserId>,
    orgs: HashMap<OrgId, Org>,
    memberships: HashMap<MembershipId, Membership>,
    membership_by_key: HashMap<(OrgId, UserId), MembershipId>,
    invites: HashMap<InviteId, Invite>,
    invite_by_token: HashMap<String, InviteId>,
}

/// Row counts, for tests and diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub orgs: usize,
    pub memberships: usize,
    pub invites: usize,
}

/// In-memory credential store for tests/dev.
///
/// A single lock guards every table, so each compound write is checked and
/// applied as one step and concurrent writers are fully serialised.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Tables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        match self.read() {
            Ok(t) => StoreStats {
                users: t.users.len(),
                orgs: t.orgs.len(),
                memberships: t.memberships.len(),
                invites: t.invites.len(),
            },
            Err(_) => StoreStats::default(),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".to_string()))
    }
}

fn sorted_by_creation<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

impl Tables {
    fn insert_user(&mut self, user: User) {
        self.user_by_email.insert(user.email.clone(), user.id);
        self.users.insert(user.id, user);
    }

    fn insert_membership(&mut self, membership: Membership) {
        self.membership_by_key
            .insert((membership.org_id, membership.user_id), membership.id);
        self.memberships.insert(membership.id, membership);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.read()?;
        Ok(t.user_by_email
            .get(email)
            .and_then(|id| t.users.get(id))
            .cloned())
    }

    async fn find_org(&self, id: OrgId) -> Result<Option<Org>, StoreError> {
        Ok(self.read()?.orgs.get(&id).cloned())
    }

    async fn find_membership(&self, org_id: OrgId, user_id: UserId) -> Result<Option<Membership>, StoreError> {
        let t = self.read()?;
        Ok(t.membership_by_key
            .get(&(org_id, user_id))
            .and_then(|id| t.memberships.get(id))
            .cloned())
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError> {
        let t = self.read()?;
        let rows: Vec<Membership> = t
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(rows, |m: &Membership| (m.created_at, m.id)))
    }

    async fn memberships_for_org(&self, org_id: OrgId) -> Result<Vec<Membership>, StoreError> {
        let t = self.read()?;
        let rows: Vec<Membership> = t
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(rows, |m: &Membership| (m.created_at, m.id)))
    }

    async fn find_invite_by_token(&self, token: &str) -> Result<Option<Invite>, StoreError> {
        let t = self.read()?;
        Ok(t.invite_by_token
            .get(token)
            .and_then(|id| t.invites.get(id))
            .cloned())
    }

    async fn invites_for_org(&self, org_id: OrgId) -> Result<Vec<Invite>, StoreError> {
        let t = self.read()?;
        let rows: Vec<Invite> = t
            .invites
            .values()
            .filter(|i| i.org_id == org_id)
            .cloned()
            .collect();
        let mut rows = sorted_by_creation(rows, |i: &Invite| (i.created_at, i.id));
        rows.reverse();
        Ok(rows)
    }

    async fn create_account(&self, account: NewAccount) -> Result<(), StoreError> {
        let mut t = self.write()?;

        if t.user_by_email.contains_key(&account.user.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        if t.orgs.contains_key(&account.org.id) {
            return Err(StoreError::Conflict("org id already exists".to_string()));
        }

        t.insert_user(account.user);
        t.orgs.insert(account.org.id, account.org);
        t.insert_membership(account.membership);
        Ok(())
    }

    async fn insert_invite(&self, invite: Invite) -> Result<(), StoreError> {
        let mut t = self.write()?;

        if t.invite_by_token.contains_key(&invite.token) {
            return Err(StoreError::Conflict("invite token already in use".to_string()));
        }

        t.invite_by_token.insert(invite.token.clone(), invite.id);
        t.invites.insert(invite.id, invite);
        Ok(())
    }

    async fn accept_invite(&self, acceptance: InviteAcceptance) -> Result<(), StoreError> {
        let mut t = self.write()?;

        // Validate every precondition before touching any table.
        let invite = t
            .invites
            .get(&acceptance.invite_id)
            .ok_or_else(|| StoreError::NotFound("invite".to_string()))?;
        if invite.accepted_at.is_some() {
            return Err(StoreError::Conflict("invite already accepted".to_string()));
        }
        if let Some(user) = &acceptance.new_user {
            if t.user_by_email.contains_key(&user.email) {
                return Err(StoreError::Conflict("email already registered".to_string()));
            }
        }
        let key = (acceptance.membership.org_id, acceptance.membership.user_id);
        if t.membership_by_key.contains_key(&key) {
            return Err(StoreError::Conflict("already a member of this organization".to_string()));
        }

        if let Some(invite) = t.invites.get_mut(&acceptance.invite_id) {
            invite.accepted_at = Some(acceptance.accepted_at);
        }
        if let Some(user) = acceptance.new_user {
            t.insert_user(user);
        }
        t.insert_membership(acceptance.membership);
        Ok(())
    }
}
