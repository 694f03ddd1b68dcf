use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use flowforge_api::app::{build_app, services};
use flowforge_api::config::AppConfig;
use flowforge_auth::Argon2Hasher;
use flowforge_infra::{PgCredentialStore, PgTenantScope, migrate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    flowforge_observability::init(&config.log);

    let app = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            migrate(&pool).await.context("failed to apply migrations")?;

            let services = services::assemble(
                &config,
                Arc::new(PgCredentialStore::new(pool.clone())),
                Arc::new(Argon2Hasher::new()),
                Arc::new(PgTenantScope::new(pool)),
            )?;
            build_app(services)
        }
        None => {
            tracing::warn!("database_url not set; using in-memory credential store");
            build_app(services::in_memory(&config)?)
        }
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
