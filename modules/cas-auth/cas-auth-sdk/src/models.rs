//! Domain models for the CAS handshake.

use std::collections::BTreeMap;
use std::fmt;

use http::header::{self, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Per-attempt state round-tripped through the user-agent inside the `state`
/// query parameter.
///
/// Created during the challenge phase, decoded once on return, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    /// Absolute URL the user is sent back to after completion.
    #[serde(rename = "r")]
    pub return_uri: String,

    /// Anti-CSRF nonce, mirrored in the correlation cookie.
    #[serde(rename = "x")]
    pub csrf_token: String,

    /// Caller-supplied properties, passed through unmodified.
    #[serde(rename = "p", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_properties: BTreeMap<String, String>,

    /// Unix timestamp (seconds) of the challenge that issued this state.
    #[serde(rename = "iat")]
    pub issued_at: i64,
}

/// Caller input to the challenge phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeProperties {
    /// Where to land after sign-in; defaults to the current request URL.
    pub redirect_uri: Option<String>,
    pub items: BTreeMap<String, String>,
}

impl ChallengeProperties {
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }
}

/// Kind of a [`Claim`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClaimType {
    /// Stable subject identifier.
    Subject,
    /// Display name.
    Name,
    Custom(String),
}

/// A single statement about the authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub claim_type: ClaimType,
    pub value: String,
    /// Authentication type that produced the claim.
    pub issuer: String,
}

impl Claim {
    #[must_use]
    pub fn new(claim_type: ClaimType, value: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            claim_type,
            value: value.into(),
            issuer: issuer.into(),
        }
    }
}

/// Verified identity produced by a successful ticket validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    authentication_type: String,
    claims: Vec<Claim>,
}

impl Identity {
    /// Build the fixed claim set for a CAS principal: subject and display name
    /// both carry the principal name.
    #[must_use]
    pub fn from_principal(authentication_type: &str, principal_name: &str) -> Self {
        Self {
            authentication_type: authentication_type.to_owned(),
            claims: vec![
                Claim::new(ClaimType::Subject, principal_name, authentication_type),
                Claim::new(ClaimType::Name, principal_name, authentication_type),
            ],
        }
    }

    #[must_use]
    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    #[must_use]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// First value of the given claim type.
    #[must_use]
    pub fn find_first(&self, claim_type: &ClaimType) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| &c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.find_first(&ClaimType::Subject)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.find_first(&ClaimType::Name)
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn remove_claims(&mut self, claim_type: &ClaimType) {
        self.claims.retain(|c| &c.claim_type != claim_type);
    }

    /// Same claims under a different authentication type.
    #[must_use]
    pub fn with_authentication_type(mut self, authentication_type: &str) -> Self {
        authentication_type.clone_into(&mut self.authentication_type);
        self
    }
}

/// Why a backchannel validation did not yield a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The CAS server answered `no`.
    TicketRejected,
    /// The CAS server could not be reached or answered with a non-2xx status.
    TransportError,
    /// The response body did not have the expected shape.
    MalformedResponse,
}

/// Result of a backchannel ticket check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Success { principal_name: String },
    Failure { reason: ValidationFailure },
}

impl ValidationOutcome {
    #[must_use]
    pub fn failure(reason: ValidationFailure) -> Self {
        Self::Failure { reason }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Reason a return-phase request was rejected.
///
/// Reason codes are for server-side observability only and are never placed in
/// the redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// `state` was missing, duplicated, or failed to decode.
    InvalidReturnState,
    /// `state` decoded but is older than the configured maximum age.
    StateExpired,
    /// Anti-CSRF token did not match the correlation marker.
    CorrelationFailure,
    /// No ticket was presented (denied consent or stripped ticket).
    NoTicket,
    TicketRejected,
    TransportError,
    MalformedResponse,
    /// The `on_authenticated` hook withdrew the identity.
    DeniedByHook,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidReturnState => "invalid_return_state",
            Self::StateExpired => "state_expired",
            Self::CorrelationFailure => "correlation_failure",
            Self::NoTicket => "no_ticket",
            Self::TicketRejected => "ticket_rejected",
            Self::TransportError => "transport_error",
            Self::MalformedResponse => "malformed_response",
            Self::DeniedByHook => "denied_by_hook",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ValidationFailure> for RejectReason {
    fn from(failure: ValidationFailure) -> Self {
        match failure {
            ValidationFailure::TicketRejected => Self::TicketRejected,
            ValidationFailure::TransportError => Self::TransportError,
            ValidationFailure::MalformedResponse => Self::MalformedResponse,
        }
    }
}

/// Minimal, host-independent view of an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    scheme: String,
    host: String,
    path_base: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    cancellation: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path_base: String::new(),
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Mount point of the application (e.g. `/app`), without trailing slash.
    #[must_use]
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    /// Raw query string, without the leading `?`.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// `scheme://host`
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Scheme, host, base path, path and query of the current request.
    #[must_use]
    pub fn full_url(&self) -> String {
        let mut url = self.origin();
        url.push_str(&self.path_base);
        url.push_str(&self.path);
        if let Some(query) = &self.query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// Response the host should emit on behalf of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseIntent {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseIntent {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// `302 Found` to `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if `location` is not a valid header value.
    pub fn redirect(location: &str) -> Result<Self, InvalidHeaderValue> {
        let mut intent = Self::new(StatusCode::FOUND);
        intent
            .headers
            .insert(header::LOCATION, HeaderValue::from_str(location)?);
        Ok(intent)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// All `Set-Cookie` values, in insertion order.
    pub fn set_cookies(&self) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}
