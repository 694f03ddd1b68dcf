//! Postgres tenant scope: one transaction per request with `app.org_id` set
//! transaction-locally, committed on success and rolled back otherwise.
//!
//! While a request future is bound to the scope, [`active_tx`] hands the
//! transaction to the credential store, so scoped requests hold exactly one
//! pooled connection and their writes share the request's outcome.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::{debug, error};

use flowforge_core::OrgId;

use super::{ScopeError, TenantScope};

/// The request's scoped transaction, shared between the middleware and handlers.
///
/// `None` once the scope has been exited.
#[derive(Clone)]
pub struct PgScopedTx(Arc<Mutex<Option<Transaction<'static, Postgres>>>>);

impl PgScopedTx {
    /// Lock the transaction for use by a handler.
    pub async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.0.lock().await
    }

    pub(crate) async fn lock_owned(&self) -> OwnedMutexGuard<Option<Transaction<'static, Postgres>>> {
        Arc::clone(&self.0).lock_owned().await
    }
}

tokio::task_local! {
    static ACTIVE_TX: PgScopedTx;
}

/// The transaction of the scope the current task is bound to, if any.
pub(crate) fn active_tx() -> Option<PgScopedTx> {
    ACTIVE_TX.try_with(Clone::clone).ok()
}

impl core::fmt::Debug for PgScopedTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PgScopedTx(..)")
    }
}

#[derive(Debug, Clone)]
pub struct PgTenantScope {
    pool: Arc<PgPool>,
}

impl PgTenantScope {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl TenantScope for PgTenantScope {
    type Guard = PgScopedTx;

    async fn enter(&self, org_id: OrgId) -> Result<PgScopedTx, ScopeError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ScopeError::Begin(e.to_string()))?;

        // `true`: local to this transaction, never leaks into a pooled connection.
        sqlx::query("SELECT set_config('app.org_id', $1, true)")
            .bind(org_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| ScopeError::Bind {
                org_id,
                reason: e.to_string(),
            })?;

        debug!(%org_id, "tenant scope entered");
        Ok(PgScopedTx(Arc::new(Mutex::new(Some(tx)))))
    }

    fn bind<F>(&self, guard: &PgScopedTx, fut: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
    {
        ACTIVE_TX.scope(guard.clone(), fut)
    }

    async fn exit(&self, guard: PgScopedTx, success: bool) {
        let Some(tx) = guard.0.lock().await.take() else {
            return;
        };
        let result = if success { tx.commit().await } else { tx.rollback().await };
        if let Err(e) = result {
            error!(error = %e, commit = success, "failed to close tenant scope");
        }
    }
}
