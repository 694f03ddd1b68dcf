//! Edge verifier: the only component that reads bearer tokens.
//!
//! Every request passes through here first. Caller-supplied trust headers are
//! always removed; on a verified request they are then set from the token
//! claims, so downstream code can treat them as authentic.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

use flowforge_auth::{TokenClaims, TokenCodec};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_ORG_ID: HeaderName = HeaderName::from_static("x-org-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// Headers only the edge may set.
pub const TRUST_HEADERS: [HeaderName; 3] = [X_USER_ID, X_ORG_ID, X_USER_ROLE];

/// Paths forwarded without a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn new(exact: Vec<String>, prefixes: Vec<String>) -> Self {
        Self { exact, prefixes }
    }

    pub fn exact(&self) -> &[String] {
        &self.exact
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path) || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl Default for PublicPaths {
    fn default() -> Self {
        let exact = ["/auth/register", "/auth/login", "/auth/invites/accept", "/health", "/metrics"];
        let prefixes = ["/actuator/", "/public/"];
        Self::new(
            exact.into_iter().map(String::from).collect(),
            prefixes.into_iter().map(String::from).collect(),
        )
    }
}

/// What the edge does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    /// Pass through unauthenticated (preflight or public path).
    Forward,
    /// Verified: forward with trust headers set from these claims.
    Inject(TokenClaims),
    /// Answer 401 with an empty body.
    Reject,
}

#[derive(Debug, Clone)]
pub struct EdgeVerifier {
    codec: TokenCodec,
    public: PublicPaths,
}

impl EdgeVerifier {
    pub fn new(codec: TokenCodec, public: PublicPaths) -> Self {
        Self { codec, public }
    }

    pub fn public_paths(&self) -> &PublicPaths {
        &self.public
    }

    /// Decide without touching the request.
    pub fn evaluate(&self, method: &Method, path: &str, headers: &HeaderMap) -> EdgeDecision {
        if *method == Method::OPTIONS || self.public.is_public(path) {
            return EdgeDecision::Forward;
        }

        let Some(token) = extract_bearer(headers) else {
            tracing::debug!(path, "missing or malformed bearer token");
            return EdgeDecision::Reject;
        };

        match self.codec.verify(token) {
            Ok(claims) => EdgeDecision::Inject(claims),
            // The codec has already logged the reason.
            Err(_) => EdgeDecision::Reject,
        }
    }
}

/// Remove every caller-supplied trust header.
pub fn strip_trust_headers(headers: &mut HeaderMap) {
    for name in TRUST_HEADERS {
        headers.remove(name);
    }
}

/// Set the trust headers from verified claims.
pub fn inject_trust_headers(headers: &mut HeaderMap, claims: &TokenClaims) -> Result<(), StatusCode> {
    let value = |s: String| HeaderValue::try_from(s).map_err(|_| StatusCode::UNAUTHORIZED);
    headers.insert(X_USER_ID, value(claims.sub.to_string())?);
    headers.insert(X_ORG_ID, value(claims.org_id.to_string())?);
    headers.insert(X_USER_ROLE, HeaderValue::from_static(claims.role.as_str()));
    Ok(())
}

pub async fn edge_verify(State(edge): State<Arc<EdgeVerifier>>, mut req: Request, next: Next) -> Response {
    let decision = edge.evaluate(req.method(), req.uri().path(), req.headers());
    strip_trust_headers(req.headers_mut());

    match decision {
        EdgeDecision::Forward => next.run(req).await,
        EdgeDecision::Inject(claims) => match inject_trust_headers(req.headers_mut(), &claims) {
            Ok(()) => next.run(req).await,
            Err(status) => status.into_response(),
        },
        EdgeDecision::Reject => StatusCode::UNAUTHORIZED.into_response(),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
