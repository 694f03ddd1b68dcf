//! Postgres-backed credential store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed, Io, Tls, ... | N/A | `Backend` |
//!
//! ## Connections
//!
//! Inside a bound tenant scope every call runs on the scope's transaction, so
//! the request uses one connection and its `app.org_id` setting applies.
//! Otherwise each call acquires its own pooled connection.
//!
//! ## Atomicity
//!
//! `create_account` and `accept_invite` run in one transaction each, which is
//! a savepoint when a scope is active. Invite acceptance claims the row with
//! `UPDATE ... WHERE accepted_at IS NULL` and checks `rows_affected`, so under
//! concurrent callers exactly one commits.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::sync::{OwnedMappedMutexGuard, OwnedMutexGuard};
use tracing::instrument;
use uuid::Uuid;

use flowforge_auth::Role;
use flowforge_core::{InviteId, MembershipId, OrgId, UserId};
use flowforge_identity::{
    CredentialStore, Invite, InviteAcceptance, Membership, NewAccount, Org, StoreError, User,
};

use crate::tenant_scope::postgres::active_tx;

const UNIQUE_VIOLATION: &str = "23505";

const MIGRATION: &str = include_str!("../../migrations/0001_identity.sql");

/// Apply the identity schema. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(MIGRATION)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: Arc<PgPool>,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The scope's transaction when one is bound and open, else a pooled connection.
    async fn conn(&self) -> Result<Conn, StoreError> {
        if let Some(scoped) = active_tx() {
            if let Ok(tx) = OwnedMutexGuard::try_map(scoped.lock_owned().await, Option::as_mut) {
                return Ok(Conn::Scoped(tx));
            }
        }
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))?;
        Ok(Conn::Pooled(conn))
    }
}

type ScopedTx = OwnedMappedMutexGuard<Option<Transaction<'static, Postgres>>, Transaction<'static, Postgres>>;

enum Conn {
    Scoped(ScopedTx),
    Pooled(PoolConnection<Postgres>),
}

impl Conn {
    fn get(&mut self) -> &mut PgConnection {
        match self {
            Conn::Scoped(tx) => &mut ***tx,
            Conn::Pooled(conn) => &mut **conn,
        }
    }

    async fn begin(&mut self) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.get()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, password_hash, created_at FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.conn().await?.get())
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, password_hash, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.conn().await?.get())
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_org(&self, id: OrgId) -> Result<Option<Org>, StoreError> {
        let row = sqlx::query("SELECT id, name, created_at FROM orgs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.conn().await?.get())
            .await
            .map_err(|e| map_sqlx_error("find_org", e))?;
        row.as_ref().map(org_from_row).transpose()
    }

    async fn find_membership(&self, org_id: OrgId, user_id: UserId) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, user_id, role, created_at
            FROM memberships
            WHERE org_id = $1 AND user_id = $2
            "#,
        )
        .bind(org_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(self.conn().await?.get())
        .await
        .map_err(|e| map_sqlx_error("find_membership", e))?;
        row.as_ref().map(membership_from_row).transpose()
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, user_id, role, created_at
            FROM memberships
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(self.conn().await?.get())
        .await
        .map_err(|e| map_sqlx_error("memberships_for_user", e))?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn memberships_for_org(&self, org_id: OrgId) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, user_id, role, created_at
            FROM memberships
            WHERE org_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(org_id.as_uuid())
        .fetch_all(self.conn().await?.get())
        .await
        .map_err(|e| map_sqlx_error("memberships_for_org", e))?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn find_invite_by_token(&self, token: &str) -> Result<Option<Invite>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, email, token, expires_at, accepted_at, created_at
            FROM invites
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(self.conn().await?.get())
        .await
        .map_err(|e| map_sqlx_error("find_invite_by_token", e))?;
        row.as_ref().map(invite_from_row).transpose()
    }

    async fn invites_for_org(&self, org_id: OrgId) -> Result<Vec<Invite>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, email, token, expires_at, accepted_at, created_at
            FROM invites
            WHERE org_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(org_id.as_uuid())
        .fetch_all(self.conn().await?.get())
        .await
        .map_err(|e| map_sqlx_error("invites_for_org", e))?;
        rows.iter().map(invite_from_row).collect()
    }

    #[instrument(skip(self, account), fields(user_id = %account.user.id, org_id = %account.org.id), err)]
    async fn create_account(&self, account: NewAccount) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let mut tx = conn.begin().await?;

        insert_user(&mut *tx, &account.user).await?;

        sqlx::query("INSERT INTO orgs (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(account.org.id.as_uuid())
            .bind(&account.org.name)
            .bind(account.org.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error("insert_org", "org id already exists", e))?;

        insert_membership(&mut *tx, &account.membership).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, invite), fields(invite_id = %invite.id, org_id = %invite.org_id), err)]
    async fn insert_invite(&self, invite: Invite) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invites (id, org_id, email, token, expires_at, accepted_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invite.id.as_uuid())
        .bind(invite.org_id.as_uuid())
        .bind(&invite.email)
        .bind(&invite.token)
        .bind(invite.expires_at)
        .bind(invite.accepted_at)
        .bind(invite.created_at)
        .execute(self.conn().await?.get())
        .await
        .map_err(|e| map_write_error("insert_invite", "invite token already in use", e))?;
        Ok(())
    }

    #[instrument(skip(self, acceptance), fields(invite_id = %acceptance.invite_id), err)]
    async fn accept_invite(&self, acceptance: InviteAcceptance) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let mut tx = conn.begin().await?;

        let claimed = sqlx::query("UPDATE invites SET accepted_at = $1 WHERE id = $2 AND accepted_at IS NULL")
            .bind(acceptance.accepted_at)
            .bind(acceptance.invite_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("claim_invite", e))?
            .rows_affected();

        if claimed == 0 {
            let exists = sqlx::query("SELECT 1 FROM invites WHERE id = $1")
                .bind(acceptance.invite_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("find_invite", e))?
                .is_some();
            // Dropping `tx` rolls back.
            return Err(if exists {
                StoreError::Conflict("invite already accepted".to_string())
            } else {
                StoreError::NotFound("invite".to_string())
            });
        }

        if let Some(user) = &acceptance.new_user {
            insert_user(&mut *tx, user).await?;
        }
        insert_membership(&mut *tx, &acceptance.membership).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn insert_user(conn: &mut PgConnection, user: &User) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES ($1, $2, $3, $4)")
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error("insert_user", "email already registered", e))?;
    Ok(())
}

async fn insert_membership(conn: &mut PgConnection, membership: &Membership) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO memberships (id, org_id, user_id, role, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(membership.id.as_uuid())
    .bind(membership.org_id.as_uuid())
    .bind(membership.user_id.as_uuid())
    .bind(membership.role.as_str())
    .bind(membership.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error("insert_membership", "already a member of this organization", e))?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let decode = |e| map_sqlx_error("decode_user", e);
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn org_from_row(row: &PgRow) -> Result<Org, StoreError> {
    let decode = |e| map_sqlx_error("decode_org", e);
    Ok(Org {
        id: OrgId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    let decode = |e| map_sqlx_error("decode_membership", e);
    let role: String = row.try_get("role").map_err(decode)?;
    Ok(Membership {
        id: MembershipId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        org_id: OrgId::from_uuid(row.try_get::<Uuid, _>("org_id").map_err(decode)?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(decode)?),
        role: Role::from_str(&role).map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn invite_from_row(row: &PgRow) -> Result<Invite, StoreError> {
    let decode = |e| map_sqlx_error("decode_invite", e);
    Ok(Invite {
        id: InviteId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        org_id: OrgId::from_uuid(row.try_get::<Uuid, _>("org_id").map_err(decode)?),
        email: row.try_get("email").map_err(decode)?,
        token: row.try_get("token").map_err(decode)?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at").map_err(decode)?,
        accepted_at: row.try_get::<Option<DateTime<Utc>>, _>("accepted_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// Like [`map_sqlx_error`], with `conflict` as the message for unique violations.
fn map_write_error(operation: &str, conflict: &str, err: sqlx::Error) -> StoreError {
    classify(operation, Some(conflict), err)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    classify(operation, None, err)
}

fn classify(operation: &str, conflict: Option<&str>, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == UNIQUE_VIOLATION => {
                    StoreError::Conflict(conflict.map_or(msg, str::to_string))
                }
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_map_to_backend() {
        let err = map_sqlx_error("find_user", sqlx::Error::PoolClosed);
        assert_eq!(err, StoreError::Backend("connection pool closed in find_user".to_string()));

        let err = map_write_error("insert_user", "email already registered", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend(_)));

        let err = map_sqlx_error("acquire_connection", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("acquire_connection")));
    }

    #[test]
    fn migration_declares_uniqueness_constraints() {
        assert!(MIGRATION.contains("email         TEXT NOT NULL UNIQUE"));
        assert!(MIGRATION.contains("token       TEXT NOT NULL UNIQUE"));
        assert!(MIGRATION.contains("UNIQUE (org_id, user_id)"));
        assert!(MIGRATION.contains("current_setting('app.org_id', true)"));
    }
}
