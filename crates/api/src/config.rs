//! Application configuration.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. `flowforge.toml` in the working directory (optional)
//! 3. environment variables prefixed `FLOWFORGE__`, nested with `__`
//!    (e.g. `FLOWFORGE__TOKEN__SECRET`, `FLOWFORGE__PROPAGATION__REQUIRE_TENANT`)

use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use flowforge_auth::{KeyError, SigningKeys};
use flowforge_identity::{ExistingAccountPolicy, IdentityConfig};
use flowforge_infra::ScopeFailurePolicy;
use flowforge_observability::LogConfig;

use crate::edge::PublicPaths;

/// Signing secret used when none is configured. Refused in production.
pub const DEV_SECRET: &str = "flowforge-dev-secret-change-me";

const CONFIG_FILE: &str = "flowforge";
const ENV_PREFIX: &str = "FLOWFORGE";
const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("token.secret must be set when environment is 'production'")]
    InsecureSecret,

    #[error("invalid signing keys: {0}")]
    Keys(#[from] KeyError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `production` turns on the strict checks (no dev secret).
    pub environment: String,
    pub listen_addr: String,
    /// Postgres URL. Unset: in-memory store, no tenant scoping.
    pub database_url: Option<String>,
    pub token: TokenConfig,
    pub edge: EdgeConfig,
    pub propagation: PropagationConfig,
    pub identity: IdentitySettings,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            token: TokenConfig::default(),
            edge: EdgeConfig::default(),
            propagation: PropagationConfig::default(),
            identity: IdentitySettings::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub active_key_id: String,
    pub secret: Option<String>,
    /// Still accepted for verification, never used to sign.
    pub retired_keys: Vec<RetiredKey>,
    /// `0` issues tokens without `exp`.
    pub lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            active_key_id: "k1".to_string(),
            secret: None,
            retired_keys: Vec::new(),
            lifetime_secs: flowforge_auth::codec::DEFAULT_TOKEN_LIFETIME_SECS as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetiredKey {
    pub key_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub public_paths: Vec<String>,
    pub public_prefixes: Vec<String>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        let defaults = PublicPaths::default();
        Self {
            public_paths: defaults.exact().to_vec(),
            public_prefixes: defaults.prefixes().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub on_scope_error: ScopeFailurePolicy,
    /// Reject downstream requests that carry no trusted `X-Org-Id`.
    pub require_tenant: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub existing_account_on_accept: ExistingAccountPolicy,
}

impl AppConfig {
    /// Load from `flowforge.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse a TOML document on top of the defaults. No environment lookup.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Build the key ring, refusing the dev secret in production.
    pub fn signing_keys(&self) -> Result<SigningKeys, ConfigError> {
        let secret = match self.token.secret.as_deref() {
            Some(secret) if secret != DEV_SECRET => secret,
            _ if self.is_production() => return Err(ConfigError::InsecureSecret),
            _ => {
                warn!("token.secret not set; using insecure dev default");
                DEV_SECRET
            }
        };

        let mut keys = SigningKeys::new(self.token.active_key_id.clone(), secret)?;
        for retired in &self.token.retired_keys {
            keys = keys.with_retired(retired.key_id.clone(), &retired.secret)?;
        }
        Ok(keys)
    }

    pub fn token_lifetime(&self) -> Option<Duration> {
        match self.token.lifetime_secs {
            0 => None,
            secs => Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_LIFETIME_SECS))),
        }
    }

    pub fn public_paths(&self) -> PublicPaths {
        PublicPaths::new(self.edge.public_paths.clone(), self.edge.public_prefixes.clone())
    }

    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            existing_account_on_accept: self.identity.existing_account_on_accept,
            ..IdentityConfig::default()
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("edge.public_paths")
        .with_list_parse_key("edge.public_prefixes")
}
