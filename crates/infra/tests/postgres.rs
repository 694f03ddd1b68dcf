//! Postgres-backed store and scope tests.
//!
//! Run against a disposable database:
//! `DATABASE_URL=postgres://... cargo test -p flowforge-infra --test postgres`.
//! Without `DATABASE_URL` every test returns early.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::OnceCell;
use uuid::Uuid;

use flowforge_auth::Role;
use flowforge_core::{InviteId, MembershipId, OrgId, UserId};
use flowforge_identity::{
    CredentialStore, Invite, InviteAcceptance, Membership, NewAccount, Org, StoreError, User,
};
use flowforge_infra::{PgCredentialStore, PgTenantScope, TenantScope, migrate};

static MIGRATED: OnceCell<()> = OnceCell::const_new();

async fn pool(max_connections: u32) -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping postgres test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(2))
        .connect(&url)
        .await
        .expect("failed to connect to DATABASE_URL");
    MIGRATED
        .get_or_init(|| async { migrate(&pool).await.expect("migration failed") })
        .await;
    Some(pool)
}

fn unique_email() -> String {
    format!("{}@example.test", Uuid::now_v7())
}

fn new_user(email: String) -> User {
    User {
        id: UserId::new(),
        email,
        password_hash: "hash".to_string(),
        created_at: Utc::now(),
    }
}

fn account(email: String) -> NewAccount {
    let user = new_user(email);
    let org = Org {
        id: OrgId::new(),
        name: "Acme".to_string(),
        created_at: Utc::now(),
    };
    let membership = Membership {
        id: MembershipId::new(),
        org_id: org.id,
        user_id: user.id,
        role: Role::Owner,
        created_at: Utc::now(),
    };
    NewAccount { user, org, membership }
}

fn invite(org_id: OrgId) -> Invite {
    let now = Utc::now();
    Invite {
        id: InviteId::new(),
        org_id,
        email: unique_email(),
        token: Uuid::now_v7().to_string(),
        expires_at: now + ChronoDuration::days(7),
        accepted_at: None,
        created_at: now,
    }
}

fn acceptance(invite: &Invite, email: String) -> InviteAcceptance {
    let user = new_user(email);
    InviteAcceptance {
        invite_id: invite.id,
        accepted_at: Utc::now(),
        membership: Membership {
            id: MembershipId::new(),
            org_id: invite.org_id,
            user_id: user.id,
            role: Role::Member,
            created_at: Utc::now(),
        },
        new_user: Some(user),
    }
}

async fn count(pool: &PgPool, sql: &str, org_id: OrgId) -> i64 {
    sqlx::query_scalar(sql)
        .bind(org_id.as_uuid())
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn concurrent_acceptance_commits_exactly_once() {
    let Some(pool) = pool(10).await else { return };
    let store = Arc::new(PgCredentialStore::new(pool.clone()));
    let owner = account(unique_email());
    let org_id = owner.org.id;
    store.create_account(owner).await.unwrap();
    let invite = invite(org_id);
    store.insert_invite(invite.clone()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let acceptance = acceptance(&invite, unique_email());
            tokio::spawn(async move { store.accept_invite(acceptance).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => accepted += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 1);

    let stored = store.find_invite_by_token(&invite.token).await.unwrap().unwrap();
    assert!(stored.is_accepted());
    let members = count(&pool, "SELECT COUNT(*) FROM memberships WHERE org_id = $1", org_id).await;
    assert_eq!(members, 2);
}

#[tokio::test]
async fn duplicate_email_account_writes_nothing() {
    let Some(pool) = pool(2).await else { return };
    let store = PgCredentialStore::new(pool.clone());
    let email = unique_email();
    store.create_account(account(email.clone())).await.unwrap();

    let second = account(email);
    let second_org = second.org.id;
    let err = store.create_account(second).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict("email already registered".to_string()));

    assert!(store.find_org(second_org).await.unwrap().is_none());
    let members = count(&pool, "SELECT COUNT(*) FROM memberships WHERE org_id = $1", second_org).await;
    assert_eq!(members, 0);
}

#[tokio::test]
async fn accepting_unknown_or_used_invites() {
    let Some(pool) = pool(2).await else { return };
    let store = PgCredentialStore::new(pool);
    let owner = account(unique_email());
    let org_id = owner.org.id;
    store.create_account(owner).await.unwrap();

    let unknown = invite(org_id);
    let err = store.accept_invite(acceptance(&unknown, unique_email())).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let invite = invite(org_id);
    store.insert_invite(invite.clone()).await.unwrap();
    store.accept_invite(acceptance(&invite, unique_email())).await.unwrap();
    let err = store.accept_invite(acceptance(&invite, unique_email())).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn scope_sets_the_current_org_for_its_transaction_only() {
    let Some(pool) = pool(2).await else { return };
    let scope = PgTenantScope::new(pool.clone());
    let org_id = OrgId::new();

    let guard = scope.enter(org_id).await.unwrap();
    {
        let mut locked = guard.lock().await;
        let tx = locked.as_mut().unwrap();
        let current: Option<Uuid> = sqlx::query_scalar("SELECT flowforge_current_org()")
            .fetch_one(&mut **tx)
            .await
            .unwrap();
        assert_eq!(current, Some(*org_id.as_uuid()));
    }

    let outside: Option<Uuid> = sqlx::query_scalar("SELECT flowforge_current_org()")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(outside, None);

    scope.exit(guard, true).await;
}

// One connection: a store call that bypassed the scope's transaction would
// wait on the pool and time out.
#[tokio::test]
async fn bound_store_calls_share_the_scope_transaction() {
    let Some(pool) = pool(1).await else { return };
    let store = PgCredentialStore::new(pool.clone());
    let scope = PgTenantScope::new(pool.clone());
    let owner = account(unique_email());
    let org_id = owner.org.id;
    store.create_account(owner).await.unwrap();

    let rolled_back = invite(org_id);
    let guard = scope.enter(org_id).await.unwrap();
    scope
        .bind(&guard, async {
            store.insert_invite(rolled_back.clone()).await.unwrap();
            let seen = store.find_invite_by_token(&rolled_back.token).await.unwrap();
            assert_eq!(seen.map(|i| i.id), Some(rolled_back.id));
            assert_eq!(store.invites_for_org(org_id).await.unwrap().len(), 1);
        })
        .await;
    scope.exit(guard, false).await;
    assert!(store.find_invite_by_token(&rolled_back.token).await.unwrap().is_none());

    let committed = invite(org_id);
    let guard = scope.enter(org_id).await.unwrap();
    scope
        .bind(&guard, async {
            store.insert_invite(committed.clone()).await.unwrap();
            store.accept_invite(acceptance(&committed, unique_email())).await.unwrap();
        })
        .await;
    scope.exit(guard, true).await;

    let stored = store.find_invite_by_token(&committed.token).await.unwrap().unwrap();
    assert!(stored.is_accepted());
    assert_eq!(store.memberships_for_org(org_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_write_inside_scope_leaves_the_transaction_usable() {
    let Some(pool) = pool(1).await else { return };
    let store = PgCredentialStore::new(pool.clone());
    let scope = PgTenantScope::new(pool.clone());
    let email = unique_email();
    let owner = account(email.clone());
    let org_id = owner.org.id;
    store.create_account(owner).await.unwrap();

    let invite = invite(org_id);
    let guard = scope.enter(org_id).await.unwrap();
    scope
        .bind(&guard, async {
            let err = store.create_account(account(email)).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
            store.insert_invite(invite.clone()).await.unwrap();
        })
        .await;
    scope.exit(guard, true).await;

    assert!(store.find_invite_by_token(&invite.token).await.unwrap().is_some());
}
