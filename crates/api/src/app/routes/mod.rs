use axum::{
    Router,
    routing::{get, post},
};

pub mod identity;
pub mod system;

/// Routes the edge forwards without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/register", post(identity::register))
        .route("/auth/login", post(identity::login))
        .route("/auth/invites/accept", post(identity::accept_invite))
}

/// Routes behind the edge; they read identity from the trusted headers only.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/authz/check/:capability", get(system::check_capability))
        .route(
            "/auth/orgs/:org_id/invites",
            post(identity::create_invite).get(identity::list_invites),
        )
        .route("/auth/orgs/:org_id/members", get(identity::list_members))
}
