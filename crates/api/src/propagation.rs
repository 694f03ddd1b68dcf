//! Context propagator for downstream routes.
//!
//! Only trusted headers are read here; the edge guarantees they were set from
//! a verified token. The tenant scope is entered before the handler runs, the
//! handler runs bound to it, and it is exited with the handler's outcome on
//! every path.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use flowforge_auth::Role;
use flowforge_core::{OrgId, UserId};
use flowforge_infra::{ScopeFailurePolicy, TenantScope};

use crate::context::{PrincipalContext, TenantContext};
use crate::edge::{X_ORG_ID, X_USER_ID, X_USER_ROLE};

/// Identity carried by the trust headers. Absent or malformed values are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrustedHeaders {
    pub org: Option<OrgId>,
    pub user: Option<UserId>,
    pub role: Option<Role>,
}

impl TrustedHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            org: parse_header(headers, &X_ORG_ID),
            user: parse_header(headers, &X_USER_ID),
            role: parse_header(headers, &X_USER_ROLE),
        }
    }
}

fn parse_header<T>(headers: &HeaderMap, name: &HeaderName) -> Option<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw = headers.get(name)?;
    let parsed = raw
        .to_str()
        .map_err(|e| e.to_string())
        .and_then(|s| T::from_str(s).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(reason) => {
            warn!(header = %name, %reason, "ignoring malformed trusted header");
            None
        }
    }
}

pub struct PropagationState<S> {
    scope: Arc<S>,
    on_scope_error: ScopeFailurePolicy,
    require_tenant: bool,
}

impl<S> Clone for PropagationState<S> {
    fn clone(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
            on_scope_error: self.on_scope_error,
            require_tenant: self.require_tenant,
        }
    }
}

impl<S: TenantScope> PropagationState<S> {
    pub fn new(scope: Arc<S>) -> Self {
        Self {
            scope,
            on_scope_error: ScopeFailurePolicy::default(),
            require_tenant: false,
        }
    }

    pub fn with_failure_policy(mut self, policy: ScopeFailurePolicy) -> Self {
        self.on_scope_error = policy;
        self
    }

    pub fn with_require_tenant(mut self, require: bool) -> Self {
        self.require_tenant = require;
        self
    }
}

pub async fn propagate_context<S: TenantScope>(
    State(state): State<PropagationState<S>>,
    mut req: Request,
    next: Next,
) -> Response {
    let trusted = TrustedHeaders::from_headers(req.headers());

    let Some(org_id) = trusted.org else {
        if state.require_tenant {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        return next.run(req).await;
    };

    req.extensions_mut().insert(TenantContext::new(org_id));
    if let (Some(user_id), Some(role)) = (trusted.user, trusted.role) {
        req.extensions_mut()
            .insert(PrincipalContext::new(user_id, org_id, role));
    }

    let guard = match state.scope.enter(org_id).await {
        Ok(guard) => Some(guard),
        Err(e) => match state.on_scope_error {
            ScopeFailurePolicy::FailOpen => {
                error!(%org_id, error = %e, "tenant scope unavailable; continuing unscoped");
                None
            }
            ScopeFailurePolicy::FailClosed => {
                error!(%org_id, error = %e, "tenant scope unavailable; rejecting request");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
    };

    if let Some(guard) = &guard {
        req.extensions_mut().insert(guard.clone());
    }

    let response = match &guard {
        Some(guard) => state.scope.bind(guard, next.run(req)).await,
        None => next.run(req).await,
    };

    if let Some(guard) = guard {
        state.scope.exit(guard, response.status().is_success()).await;
    }
    response
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{Extension, Router, body::Body, http::Request as HttpRequest, routing::get};
    use flowforge_infra::{NoTenantScope, ScopeError};
    use tower::ServiceExt;

    use super::*;

    fn headers(pairs: &[(&HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert((*name).clone(), value.parse().unwrap());
        }
        map
    }

    #[test]
    fn parses_all_trusted_headers() {
        let (org, user) = (OrgId::new(), UserId::new());
        let (org_s, user_s) = (org.to_string(), user.to_string());
        let parsed = TrustedHeaders::from_headers(&headers(&[
            (&X_ORG_ID, org_s.as_str()),
            (&X_USER_ID, user_s.as_str()),
            (&X_USER_ROLE, "ADMIN"),
        ]));
        assert_eq!(parsed.org, Some(org));
        assert_eq!(parsed.user, Some(user));
        assert_eq!(parsed.role, Some(Role::Admin));
    }

    #[test]
    fn malformed_headers_become_none() {
        let parsed = TrustedHeaders::from_headers(&headers(&[
            (&X_ORG_ID, "not-a-uuid"),
            (&X_USER_ROLE, "SUPERUSER"),
        ]));
        assert_eq!(parsed, TrustedHeaders::default());
    }

    tokio::task_local! {
        static BOUND: OrgId;
    }

    /// Records scope calls; optionally fails on enter.
    #[derive(Default)]
    struct RecordingScope {
        fail: bool,
        exits: Mutex<Vec<(OrgId, bool)>>,
    }

    #[async_trait]
    impl TenantScope for RecordingScope {
        type Guard = OrgId;

        async fn enter(&self, org_id: OrgId) -> Result<OrgId, ScopeError> {
            if self.fail {
                return Err(ScopeError::Begin("down".to_string()));
            }
            Ok(org_id)
        }

        fn bind<F>(&self, guard: &OrgId, fut: F) -> impl Future<Output = F::Output> + Send
        where
            F: Future + Send,
        {
            BOUND.scope(*guard, fut)
        }

        async fn exit(&self, guard: OrgId, success: bool) {
            self.exits.lock().unwrap().push((guard, success));
        }
    }

    async fn tenant_echo(tenant: Option<Extension<TenantContext>>) -> Response {
        match tenant {
            Some(Extension(t)) => t.org_id().to_string().into_response(),
            None => "none".into_response(),
        }
    }

    async fn bound_echo() -> String {
        BOUND
            .try_with(|org| org.to_string())
            .unwrap_or_else(|_| "unbound".to_string())
    }

    async fn failing() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn app<S: TenantScope>(state: PropagationState<S>) -> Router {
        Router::new()
            .route("/echo", get(tenant_echo))
            .route("/bound", get(bound_echo))
            .route("/fail", get(failing))
            .layer(axum::middleware::from_fn_with_state(state, propagate_context::<S>))
    }

    fn request(path: &str, org: Option<OrgId>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(org) = org {
            builder = builder.header(X_ORG_ID, org.to_string());
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn scope_commits_on_success_and_rolls_back_on_error() {
        let scope = Arc::new(RecordingScope::default());
        let org = OrgId::new();
        let router = app(PropagationState::new(scope.clone()));

        let ok = router.clone().oneshot(request("/echo", Some(org))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let err = router.oneshot(request("/fail", Some(org))).await.unwrap();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(*scope.exits.lock().unwrap(), vec![(org, true), (org, false)]);
    }

    #[tokio::test]
    async fn handler_runs_bound_to_the_scope() {
        let scope = Arc::new(RecordingScope::default());
        let org = OrgId::new();
        let router = app(PropagationState::new(scope.clone()));

        let res = router.clone().oneshot(request("/bound", Some(org))).await.unwrap();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, org.to_string().as_bytes());

        let res = router.oneshot(request("/bound", None)).await.unwrap();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "unbound".as_bytes());

        let failing = app(PropagationState::new(Arc::new(RecordingScope { fail: true, ..Default::default() })));
        let res = failing.oneshot(request("/bound", Some(org))).await.unwrap();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "unbound".as_bytes());
    }

    #[tokio::test]
    async fn missing_tenant_passes_through_unless_required() {
        let open = app(PropagationState::new(Arc::new(NoTenantScope)));
        let res = open.oneshot(request("/echo", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let strict = app(PropagationState::new(Arc::new(NoTenantScope)).with_require_tenant(true));
        let res = strict.oneshot(request("/echo", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn scope_failure_honours_policy() {
        let failing_scope = || Arc::new(RecordingScope { fail: true, ..Default::default() });
        let org = OrgId::new();

        let open = app(PropagationState::new(failing_scope()));
        let res = open.oneshot(request("/echo", Some(org))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let closed = app(PropagationState::new(failing_scope()).with_failure_policy(ScopeFailurePolicy::FailClosed));
        let res = closed.oneshot(request("/echo", Some(org))).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
