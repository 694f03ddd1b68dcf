//! Service wiring: codec, identity service, edge verifier and propagation
//! state assembled from configuration.

use std::sync::Arc;

use flowforge_auth::{Argon2Hasher, PasswordHasher, TokenCodec};
use flowforge_identity::{CredentialStore, IdentityService, InMemoryCredentialStore};
use flowforge_infra::{NoTenantScope, TenantScope};

use crate::config::{AppConfig, ConfigError};
use crate::edge::EdgeVerifier;
use crate::propagation::PropagationState;

/// Everything `build_app` needs.
pub struct AppServices<S> {
    pub identity: Arc<IdentityService>,
    pub edge: Arc<EdgeVerifier>,
    pub propagation: PropagationState<S>,
}

pub fn token_codec(config: &AppConfig) -> Result<TokenCodec, ConfigError> {
    Ok(TokenCodec::new(config.signing_keys()?).with_lifetime(config.token_lifetime()))
}

pub fn assemble<S: TenantScope>(
    config: &AppConfig,
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    scope: Arc<S>,
) -> Result<AppServices<S>, ConfigError> {
    let codec = token_codec(config)?;

    let identity = IdentityService::new(store, hasher, codec.clone()).with_config(config.identity_config());
    let edge = EdgeVerifier::new(codec, config.public_paths());
    let propagation = PropagationState::new(scope)
        .with_failure_policy(config.propagation.on_scope_error)
        .with_require_tenant(config.propagation.require_tenant);

    Ok(AppServices {
        identity: Arc::new(identity),
        edge: Arc::new(edge),
        propagation,
    })
}

/// In-memory store, Argon2 hashing, no tenant scope.
pub fn in_memory(config: &AppConfig) -> Result<AppServices<NoTenantScope>, ConfigError> {
    assemble(
        config,
        Arc::new(InMemoryCredentialStore::new()),
        Arc::new(Argon2Hasher::new()),
        Arc::new(NoTenantScope),
    )
}
