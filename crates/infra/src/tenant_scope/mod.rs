//! Per-request tenant scoping.
//!
//! A scope is entered once the trusted `X-Org-Id` is known and exited when
//! the request completes. What "scoped" means is up to the implementation;
//! for Postgres it is a transaction whose `app.org_id` setting is visible to
//! row-level security policies, and which the credential store runs on while
//! the request future is bound to it.

pub mod postgres;

use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use flowforge_core::OrgId;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("failed to open tenant scope: {0}")]
    Begin(String),

    #[error("failed to bind tenant {org_id}: {reason}")]
    Bind { org_id: OrgId, reason: String },
}

/// What to do with the request when entering the scope fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFailurePolicy {
    /// Log and continue unscoped.
    #[default]
    FailOpen,

    /// Reject the request with 503.
    FailClosed,
}

#[async_trait]
pub trait TenantScope: Send + Sync + 'static {
    /// Handle for the open scope, exposed to handlers as a request extension.
    type Guard: Clone + Send + Sync + 'static;

    async fn enter(&self, org_id: OrgId) -> Result<Self::Guard, ScopeError>;

    /// Run `fut` inside the open scope, so work it does lands on the scope.
    fn bind<F>(&self, _guard: &Self::Guard, fut: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
    {
        fut
    }

    /// `success` is true for 2xx responses.
    async fn exit(&self, guard: Self::Guard, success: bool);
}

/// Scope that binds nothing. Used when there is no database.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTenantScope;

#[async_trait]
impl TenantScope for NoTenantScope {
    type Guard = ();

    async fn enter(&self, _org_id: OrgId) -> Result<(), ScopeError> {
        Ok(())
    }

    async fn exit(&self, _guard: (), _success: bool) {}
}
