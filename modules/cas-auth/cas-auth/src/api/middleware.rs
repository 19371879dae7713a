//! Axum adapter for the CAS handshake engine.
//!
//! For each request:
//! 1. Requests on the callback path run the return and completion phases
//! 2. Everything else goes to the wrapped service
//! 3. A 401 from the wrapped service becomes a CAS challenge when the engine
//!    is in active mode or the response carries a [`CasChallenge`]

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cas_auth_sdk::{ChallengeProperties, RequestContext, ResponseIntent, SessionSignIn};
use tracing::error;

use crate::domain::{CasAuthEngine, Completion};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Response extension requesting a CAS challenge for a 401.
///
/// Required in passive mode; in active mode it only carries properties.
#[derive(Debug, Clone, Default)]
pub struct CasChallenge(pub ChallengeProperties);

impl CasChallenge {
    /// `401 Unauthorized` asking the middleware to start a CAS round trip.
    #[must_use]
    pub fn response(properties: ChallengeProperties) -> Response {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.extensions_mut().insert(Self(properties));
        response
    }
}

/// Shared state for [`cas_auth_middleware`].
#[derive(Clone)]
pub struct CasAuthState {
    engine: Arc<CasAuthEngine>,
    session: Arc<dyn SessionSignIn>,
    default_scheme: String,
    path_base: String,
    trust_forwarded_headers: bool,
}

impl CasAuthState {
    #[must_use]
    pub fn new(engine: Arc<CasAuthEngine>, session: Arc<dyn SessionSignIn>) -> Self {
        Self {
            engine,
            session,
            default_scheme: "https".to_owned(),
            path_base: String::new(),
            trust_forwarded_headers: false,
        }
    }

    /// Scheme assumed when neither the URI nor `X-Forwarded-Proto` carry one.
    #[must_use]
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    /// Take the scheme from `X-Forwarded-Proto`. Only enable behind a proxy
    /// that overwrites the header.
    #[must_use]
    pub fn with_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    /// Prefix the application is mounted under.
    #[must_use]
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    #[must_use]
    pub fn engine(&self) -> &CasAuthEngine {
        &self.engine
    }
}

/// CAS authentication middleware.
pub async fn cas_auth_middleware(
    State(state): State<CasAuthState>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = request_context(&state, &req);
    // Cancel any in-flight backchannel call if this future is dropped.
    let _cancel_on_drop = ctx.cancellation().clone().drop_guard();

    if state.engine.is_callback(&ctx) {
        return match state
            .engine
            .invoke_return_path(&ctx, state.session.as_ref())
            .await
        {
            Ok(Completion::Respond(intent)) => into_response(intent),
            Ok(Completion::Continue(headers)) => {
                let mut response = next.run(req).await;
                for (name, value) in &headers {
                    response.headers_mut().append(name, value.clone());
                }
                response
            }
            Err(e) => {
                error!(error = %e, "CAS return path failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

    let response = next.run(req).await;
    let requested = response.extensions().get::<CasChallenge>().cloned();
    if !state
        .engine
        .should_challenge(response.status(), requested.is_some())
    {
        return response;
    }

    let properties = requested.map(|c| c.0).unwrap_or_default();
    match state.engine.build_challenge(&ctx, properties) {
        Ok(intent) => into_response(intent),
        Err(e) => {
            error!(error = %e, "failed to build CAS challenge");
            response
        }
    }
}

fn request_context(state: &CasAuthState, req: &Request) -> RequestContext {
    let uri = req.uri();
    let headers = req.headers();

    let forwarded = state
        .trust_forwarded_headers
        .then(|| header_str(headers, FORWARDED_PROTO))
        .flatten()
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    let scheme = forwarded
        .or_else(|| uri.scheme_str())
        .unwrap_or(state.default_scheme.as_str())
        .to_owned();

    let host = header_str(headers, header::HOST.as_str())
        .or_else(|| uri.authority().map(axum::http::uri::Authority::as_str))
        .unwrap_or_default()
        .to_owned();

    let mut ctx = RequestContext::new(scheme, host, uri.path())
        .with_path_base(state.path_base.clone())
        .with_headers(headers.clone());
    if let Some(query) = uri.query() {
        ctx = ctx.with_query(query);
    }
    ctx
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn into_response(intent: ResponseIntent) -> Response {
    let (status, headers) = intent.into_parts();
    (status, headers).into_response()
}
