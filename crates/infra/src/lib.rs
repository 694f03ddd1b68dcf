//! `flowforge-infra`: Postgres adapters for the trust fabric.
//!
//! - `credential_store`: `CredentialStore` over sqlx transactions
//! - `tenant_scope`: per-request tenant scoping (`app.org_id` session setting)

pub mod credential_store;
pub mod tenant_scope;

pub use credential_store::postgres::{PgCredentialStore, migrate};
pub use tenant_scope::postgres::{PgScopedTx, PgTenantScope};
pub use tenant_scope::{NoTenantScope, ScopeError, ScopeFailurePolicy, TenantScope};
