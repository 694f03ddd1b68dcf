//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: codec, store, hasher and scope wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `extract.rs`: JSON body extractor
//! - `errors.rs`: consistent error responses

use axum::{Extension, Router};
use tower::ServiceBuilder;

use flowforge_infra::TenantScope;

use crate::edge::edge_verify;
use crate::propagation::propagate_context;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// The edge verifier wraps every route. Downstream routes additionally run
/// the context propagator, which enters the tenant scope.
pub fn build_app<S: TenantScope>(services: AppServices<S>) -> Router {
    let AppServices {
        identity,
        edge,
        propagation,
    } = services;

    let downstream = routes::router().layer(axum::middleware::from_fn_with_state(
        propagation,
        propagate_context::<S>,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(downstream)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(edge, edge_verify))
                .layer(Extension(identity)),
        )
}
