#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Shared fixtures: a scripted validator, a recording session layer, and a
//! tiny "browser" that carries the correlation cookie between phases.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cas_auth::CasAuthConfig;
use cas_auth::cas_auth_sdk::{
    Identity, RequestContext, ResponseIntent, SessionError, SessionSignIn, TicketValidator,
    ValidationOutcome,
};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

pub const HOST: &str = "app.example.com";
pub const CAS_BASE: &str = "https://sso.example.edu/cas";
pub const SECRET: &str = "integration-test-secret";

pub fn config() -> CasAuthConfig {
    CasAuthConfig {
        state_secret: Some(SecretString::from(SECRET)),
        ..CasAuthConfig::for_server(CAS_BASE)
    }
}

/// Validator returning a fixed outcome and recording every call.
pub struct StubValidator {
    outcome: ValidationOutcome,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl StubValidator {
    pub fn new(outcome: ValidationOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting(principal: &str) -> Arc<Self> {
        Self::new(ValidationOutcome::Success {
            principal_name: principal.to_owned(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(ticket, service_url)` pairs in call order.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketValidator for StubValidator {
    async fn validate(
        &self,
        ticket: &str,
        service_url: &str,
        _cancellation: &CancellationToken,
    ) -> ValidationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((ticket.to_owned(), service_url.to_owned()));
        self.outcome.clone()
    }
}

#[derive(Debug, Clone)]
pub struct SignInRecord {
    pub sign_in_as: String,
    pub identity: Identity,
    pub properties: BTreeMap<String, String>,
}

/// Session layer that records sign-ins and issues a `session` cookie.
#[derive(Default)]
pub struct RecordingSession {
    records: Mutex<Vec<SignInRecord>>,
    fail: bool,
}

impl RecordingSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn records(&self) -> Vec<SignInRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionSignIn for RecordingSession {
    async fn sign_in(
        &self,
        _request: &RequestContext,
        sign_in_as: &str,
        identity: &Identity,
        properties: &BTreeMap<String, String>,
    ) -> Result<HeaderMap, SessionError> {
        if self.fail {
            return Err(SessionError::new("session store unavailable"));
        }
        self.records.lock().unwrap().push(SignInRecord {
            sign_in_as: sign_in_as.to_owned(),
            identity: identity.clone(),
            properties: properties.clone(),
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            SET_COOKIE,
            HeaderValue::from_static("session=signed-in; Path=/; HttpOnly"),
        );
        Ok(headers)
    }
}

/// Request for `path_and_query` on the application host.
pub fn request(path_and_query: &str) -> RequestContext {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };
    let ctx = RequestContext::new("https", HOST, path);
    match query {
        Some(query) => ctx.with_query(query),
        None => ctx,
    }
}

/// Attach `name=value` pairs as a single `Cookie` header.
pub fn with_cookies(ctx: RequestContext, cookies: &[(&str, &str)]) -> RequestContext {
    let joined = cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&joined).unwrap());
    ctx.with_headers(headers)
}

/// `(name, value)` of the first cookie set by `intent`.
pub fn first_cookie(intent: &ResponseIntent) -> (String, String) {
    let raw = intent.set_cookies().next().expect("a Set-Cookie header");
    let pair = raw.split(';').next().unwrap();
    let (name, value) = pair.split_once('=').unwrap();
    (name.to_owned(), value.to_owned())
}

/// Single query parameter of an absolute URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// What the CAS server would hand back: the service URL from the login
/// redirect plus a `ticket` parameter.
pub struct Issued {
    pub service_url: String,
    pub state: String,
    pub cookie: (String, String),
}

impl Issued {
    pub fn from_challenge(intent: &ResponseIntent) -> Self {
        let login = intent.location().expect("login redirect");
        let service_url = query_param(login, "service").expect("service parameter");
        let state = query_param(&service_url, "state").expect("state parameter");
        Self {
            service_url,
            state,
            cookie: first_cookie(intent),
        }
    }

    /// Callback request as the browser sends it, carrying the correlation cookie.
    pub fn callback(&self, ticket: Option<&str>) -> RequestContext {
        let mut query = format!("state={}", urlencoding::encode(&self.state));
        if let Some(ticket) = ticket {
            query.push_str("&ticket=");
            query.push_str(&urlencoding::encode(ticket));
        }
        let ctx = request(&format!("/signin-cas?{query}"));
        with_cookies(ctx, &[(self.cookie.0.as_str(), self.cookie.1.as_str())])
    }
}
