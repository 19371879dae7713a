#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the axum adapter
//!
//! These tests verify that:
//! 1. Passive mode only challenges 401 responses that ask for it
//! 2. Active mode challenges every 401
//! 3. The callback path runs the full return flow in front of the router
//! 4. Forwarded headers are only honored when explicitly trusted

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use cas_auth::cas_auth_sdk::{
    CasAuthProvider, ChallengeProperties, HookError, NoopCasAuthProvider, ReturnEndpointContext,
};
use cas_auth::{
    AuthenticationMode, CasAuthConfig, CasAuthOptions, CasAuthState, CasChallenge,
    cas_auth_middleware,
};
use common::{CAS_BASE, HOST, RecordingSession, StubValidator};
use tower::ServiceExt;

async fn requires_cas() -> Response {
    CasChallenge::response(ChallengeProperties::default())
}

async fn plain_unauthorized() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}

async fn public() -> &'static str {
    "public"
}

async fn fallthrough() -> &'static str {
    "fallthrough"
}

fn app(config: CasAuthConfig, validator: Arc<StubValidator>) -> (Router, Arc<RecordingSession>) {
    app_with(config, validator, Arc::new(NoopCasAuthProvider), false)
}

fn app_with(
    config: CasAuthConfig,
    validator: Arc<StubValidator>,
    provider: Arc<dyn CasAuthProvider>,
    trust_forwarded: bool,
) -> (Router, Arc<RecordingSession>) {
    let engine = CasAuthOptions::new(config)
        .validator(validator)
        .provider(provider)
        .build()
        .unwrap();
    let session = RecordingSession::new();
    let state = CasAuthState::new(Arc::new(engine), session.clone())
        .with_forwarded_headers(trust_forwarded);

    let router = Router::new()
        .route("/secure", get(requires_cas))
        .route("/plain", get(plain_unauthorized))
        .route("/public", get(public))
        .route("/signin-cas", get(fallthrough))
        .layer(axum::middleware::from_fn_with_state(
            state,
            cas_auth_middleware,
        ));
    (router, session)
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header(header::HOST, HOST);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("Location header")
}

#[tokio::test]
async fn passive_mode_challenges_only_requested_401() {
    let (router, _) = app(common::config(), StubValidator::accepting("alice"));

    let plain = router
        .clone()
        .oneshot(get_request("/plain", None))
        .await
        .unwrap();
    assert_eq!(plain.status(), StatusCode::UNAUTHORIZED);

    let secure = router
        .clone()
        .oneshot(get_request("/secure?x=1", None))
        .await
        .unwrap();
    assert_eq!(secure.status(), StatusCode::FOUND);
    assert!(location(&secure).starts_with(&format!("{CAS_BASE}/login?service=")));

    let ok = router.oneshot(get_request("/public", None)).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn active_mode_challenges_every_401() {
    let config = CasAuthConfig {
        authentication_mode: AuthenticationMode::Active,
        ..common::config()
    };
    let (router, _) = app(config, StubValidator::accepting("alice"));

    let response = router.oneshot(get_request("/plain", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with(&format!("{CAS_BASE}/login?service=")));
}

#[tokio::test]
async fn callback_completes_sign_in_through_router() {
    let config = CasAuthConfig {
        sign_in_as_authentication_type: Some("Cookies".to_owned()),
        ..common::config()
    };
    let validator = StubValidator::accepting("alice");
    let (router, session) = app(config, validator.clone());

    let challenge = router
        .clone()
        .oneshot(get_request("/secure?x=1", None))
        .await
        .unwrap();
    let service_url = common::query_param(location(&challenge), "service").unwrap();
    let marker = challenge
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_owned();

    // The CAS server sends the browser back to the service URL plus a ticket.
    let callback = format!(
        "{}&ticket=ST-42",
        service_url.trim_start_matches("https://app.example.com")
    );
    let response = router
        .oneshot(get_request(&callback, Some(&marker)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://app.example.com/secure?x=1");
    assert_eq!(validator.seen(), vec![("ST-42".to_owned(), service_url)]);
    assert_eq!(session.records()[0].identity.subject(), Some("alice"));

    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("session=signed-in")));
}

#[tokio::test]
async fn callback_without_state_fails_closed() {
    let validator = StubValidator::accepting("alice");
    let (router, _) = app(common::config(), validator.clone());

    let response = router
        .oneshot(get_request("/signin-cas?ticket=ST-1", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(validator.calls(), 0);
}

fn set_cookies(response: &Response) -> Vec<&str> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

/// Cookie pair from the challenge's correlation `Set-Cookie`.
fn marker(challenge: &Response) -> String {
    set_cookies(challenge)[0].split(';').next().unwrap().to_owned()
}

/// Leaves the callback to the inner service.
struct NoRedirectProvider;

#[async_trait]
impl CasAuthProvider for NoRedirectProvider {
    async fn on_return_endpoint(
        &self,
        ctx: &mut ReturnEndpointContext<'_>,
    ) -> Result<(), HookError> {
        ctx.set_redirect_uri(None);
        Ok(())
    }
}

#[tokio::test]
async fn unhandled_callback_still_delivers_session_cookie() {
    let config = CasAuthConfig {
        sign_in_as_authentication_type: Some("Cookies".to_owned()),
        ..common::config()
    };
    let (router, session) = app_with(
        config,
        StubValidator::accepting("alice"),
        Arc::new(NoRedirectProvider),
        false,
    );

    let challenge = router
        .clone()
        .oneshot(get_request("/secure", None))
        .await
        .unwrap();
    let service_url = common::query_param(location(&challenge), "service").unwrap();
    let callback = format!(
        "{}&ticket=ST-7",
        service_url.trim_start_matches("https://app.example.com")
    );

    let response = router
        .oneshot(get_request(&callback, Some(&marker(&challenge))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session.records().len(), 1);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("session=signed-in")));
    assert!(cookies.iter().any(|c| c.starts_with(".cas.correlation.JasigCas=;")));
}

fn forwarded_http_request() -> Request<Body> {
    Request::builder()
        .uri("/secure")
        .header(header::HOST, HOST)
        .header("x-forwarded-proto", "http")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn forwarded_proto_is_ignored_unless_trusted() {
    let (router, _) = app(common::config(), StubValidator::accepting("alice"));

    let response = router.oneshot(forwarded_http_request()).await.unwrap();

    let service_url = common::query_param(location(&response), "service").unwrap();
    assert!(service_url.starts_with("https://app.example.com/signin-cas?state="));
    assert!(set_cookies(&response)[0].contains("Secure"));
}

#[tokio::test]
async fn trusted_forwarded_proto_sets_scheme() {
    let (router, _) = app_with(
        common::config(),
        StubValidator::accepting("alice"),
        Arc::new(NoopCasAuthProvider),
        true,
    );

    let response = router.oneshot(forwarded_http_request()).await.unwrap();

    let service_url = common::query_param(location(&response), "service").unwrap();
    assert!(service_url.starts_with("http://app.example.com/signin-cas?state="));
    assert!(!set_cookies(&response)[0].contains("Secure"));
}
