//! CAS handshake engine.
//!
//! Three entry points, one per phase:
//! 1. [`CasAuthEngine::build_challenge`] - redirect the user-agent to `/login`
//! 2. [`CasAuthEngine::handle_return`] - decode state, check correlation, validate the ticket
//! 3. [`CasAuthEngine::finalize_redirect`] - run the completion hook, sign in, redirect
//!
//! The engine keeps no per-request state. Everything belonging to one attempt
//! travels through the user-agent inside the protected `state` parameter.

use std::sync::Arc;
use std::time::Duration;

use cas_auth_sdk::{
    AttemptState, AuthenticatedContext, CasAuthError, CasAuthProvider, ChallengeProperties,
    Identity, RejectReason, RequestContext, ResponseIntent, ReturnEndpointContext, SessionSignIn,
    StateDataFormat, TicketValidator, ValidationOutcome,
};
use http::header::SET_COOKIE;
use http::{HeaderMap, StatusCode};
use tracing::{debug, info, warn};

use super::correlation::CorrelationMarker;
use super::urls;
use crate::config::AuthenticationMode;

/// Result of the return phase, consumed by the completion phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnOutcome {
    /// The ticket was confirmed and the identity survived `on_authenticated`.
    Validated {
        identity: Identity,
        state: AttemptState,
    },
    /// The attempt failed. `state` is absent when it could not be decoded.
    Rejected {
        reason: RejectReason,
        state: Option<AttemptState>,
    },
}

impl ReturnOutcome {
    fn rejected(reason: RejectReason, state: Option<AttemptState>) -> Self {
        Self::Rejected { reason, state }
    }

    #[must_use]
    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            Self::Validated { .. } => None,
            Self::Rejected { reason, .. } => Some(*reason),
        }
    }
}

/// What the host does once the completion phase is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Send this response as-is.
    Respond(ResponseIntent),
    /// The request is not handled here. The pipeline continues, and these
    /// headers (session credential, cleared marker) go onto its response.
    Continue(HeaderMap),
}

impl Completion {
    /// The response to send, or `None` when the pipeline should continue.
    #[must_use]
    pub fn into_response(self) -> Option<ResponseIntent> {
        match self {
            Self::Respond(intent) => Some(intent),
            Self::Continue(_) => None,
        }
    }
}

/// Immutable protocol settings, validated at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// CAS server base URL without trailing slash.
    pub server_base: String,
    pub callback_path: String,
    pub authentication_type: String,
    pub caption: String,
    pub authentication_mode: AuthenticationMode,
    pub sign_in_as: Option<String>,
    pub state_max_age: Option<Duration>,
    pub correlation_max_age_secs: u64,
}

/// Client side of the CAS redirect handshake.
///
/// Safe to share across concurrent requests.
pub struct CasAuthEngine {
    settings: EngineSettings,
    state_format: Arc<dyn StateDataFormat>,
    correlation: CorrelationMarker,
    validator: Arc<dyn TicketValidator>,
    provider: Arc<dyn CasAuthProvider>,
}

impl CasAuthEngine {
    #[must_use]
    pub fn new(
        settings: EngineSettings,
        state_format: Arc<dyn StateDataFormat>,
        validator: Arc<dyn TicketValidator>,
        provider: Arc<dyn CasAuthProvider>,
    ) -> Self {
        let correlation = CorrelationMarker::new(
            &settings.authentication_type,
            settings.correlation_max_age_secs,
        );
        Self {
            settings,
            state_format,
            correlation,
            validator,
            provider,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub fn caption(&self) -> &str {
        &self.settings.caption
    }

    #[must_use]
    pub fn correlation_cookie_name(&self) -> &str {
        self.correlation.cookie_name()
    }

    /// Whether the request targets the callback path (ASCII case-insensitive).
    #[must_use]
    pub fn is_callback(&self, ctx: &RequestContext) -> bool {
        ctx.path().eq_ignore_ascii_case(&self.settings.callback_path)
    }

    /// Whether a response with `status` should be turned into a challenge.
    ///
    /// `requested` is true when the application explicitly asked for a CAS
    /// challenge on this response.
    #[must_use]
    pub fn should_challenge(&self, status: StatusCode, requested: bool) -> bool {
        status == StatusCode::UNAUTHORIZED
            && (requested || self.settings.authentication_mode == AuthenticationMode::Active)
    }

    /// Challenge phase: redirect to the CAS login page.
    ///
    /// # Errors
    ///
    /// Returns [`CasAuthError::Internal`] if the state cannot be protected or
    /// the redirect cannot be encoded as headers.
    #[tracing::instrument(skip_all, fields(auth_type = %self.settings.authentication_type))]
    pub fn build_challenge(
        &self,
        ctx: &RequestContext,
        properties: ChallengeProperties,
    ) -> Result<ResponseIntent, CasAuthError> {
        let return_uri = properties
            .redirect_uri
            .filter(|uri| !uri.is_empty())
            .map_or_else(|| ctx.full_url(), |uri| urls::absolute_uri(ctx, &uri));

        let state = AttemptState {
            return_uri,
            csrf_token: CorrelationMarker::generate_token(),
            extra_properties: properties.items,
            issued_at: now_unix(),
        };

        let protected = self
            .state_format
            .protect(&state)
            .map_err(|e| CasAuthError::internal(format!("failed to protect state: {e}")))?;

        let service_url = urls::service_url(ctx, &self.settings.callback_path, &protected);
        let login_url = urls::login_url(&self.settings.server_base, &service_url);

        let mut intent = ResponseIntent::redirect(&login_url)
            .map_err(|e| CasAuthError::internal(format!("invalid login redirect: {e}")))?;
        let cookie = self
            .correlation
            .issue(ctx, &state.csrf_token)
            .map_err(|e| CasAuthError::internal(format!("invalid correlation cookie: {e}")))?;
        intent.headers_mut().append(SET_COOKIE, cookie);

        debug!(return_uri = %state.return_uri, "issued CAS challenge");
        Ok(intent)
    }

    /// Return phase: decode state, check correlation, then validate the ticket.
    ///
    /// The correlation check always precedes ticket validation; a request that
    /// fails it never reaches the CAS server.
    ///
    /// # Errors
    ///
    /// Only hook failures ([`CasAuthError::Extension`]) are errors; every
    /// protocol failure is a [`ReturnOutcome::Rejected`].
    #[tracing::instrument(skip_all, fields(auth_type = %self.settings.authentication_type))]
    pub async fn handle_return(&self, ctx: &RequestContext) -> Result<ReturnOutcome, CasAuthError> {
        let Some(protected) = urls::single_query_value(ctx.query(), "state") else {
            warn!("invalid return state: missing or repeated state parameter");
            return Ok(ReturnOutcome::rejected(RejectReason::InvalidReturnState, None));
        };

        let state = match self.state_format.unprotect(&protected) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "invalid return state");
                return Ok(ReturnOutcome::rejected(RejectReason::InvalidReturnState, None));
            }
        };

        if !self.correlation.verify(ctx, &state.csrf_token) {
            warn!(
                cookie = %self.correlation.cookie_name(),
                "correlation failure: anti-CSRF marker missing or mismatched"
            );
            return Ok(ReturnOutcome::rejected(
                RejectReason::CorrelationFailure,
                Some(state),
            ));
        }

        if self.is_expired(&state) {
            warn!(issued_at = state.issued_at, "return state expired");
            return Ok(ReturnOutcome::rejected(RejectReason::StateExpired, Some(state)));
        }

        let Some(ticket) = urls::single_query_value(ctx.query(), "ticket").filter(|t| !t.is_empty())
        else {
            debug!("returned without a ticket");
            return Ok(ReturnOutcome::rejected(RejectReason::NoTicket, Some(state)));
        };

        // Must match the service URL sent at issuance byte-for-byte.
        let service_url = urls::service_url(ctx, &self.settings.callback_path, &protected);

        let principal_name = match self
            .validator
            .validate(&ticket, &service_url, ctx.cancellation())
            .await
        {
            ValidationOutcome::Success { principal_name } => principal_name,
            ValidationOutcome::Failure { reason } => {
                debug!(?reason, "ticket validation failed");
                return Ok(ReturnOutcome::rejected(reason.into(), Some(state)));
            }
        };

        let identity = Identity::from_principal(&self.settings.authentication_type, &principal_name);
        let AttemptState {
            return_uri,
            csrf_token,
            extra_properties,
            issued_at,
        } = state;

        let mut hook_ctx = AuthenticatedContext::new(ctx, identity, extra_properties, return_uri);
        self.provider.on_authenticated(&mut hook_ctx).await?;
        let (identity, extra_properties, return_uri) = hook_ctx.into_parts();

        let state = AttemptState {
            return_uri,
            csrf_token,
            extra_properties,
            issued_at,
        };

        Ok(match identity {
            Some(identity) => ReturnOutcome::Validated { identity, state },
            None => {
                debug!("identity withdrawn by on_authenticated hook");
                ReturnOutcome::rejected(RejectReason::DeniedByHook, Some(state))
            }
        })
    }

    /// Completion phase: decide the final response.
    ///
    /// Returns [`Completion::Continue`] when the hook removed the redirect
    /// target without completing the request.
    ///
    /// # Errors
    ///
    /// Hook failures, session failures, and unencodable redirect targets.
    #[tracing::instrument(skip_all, fields(auth_type = %self.settings.authentication_type))]
    pub async fn finalize_redirect(
        &self,
        ctx: &RequestContext,
        outcome: ReturnOutcome,
        session: &dyn SessionSignIn,
    ) -> Result<Completion, CasAuthError> {
        let (identity, rejection, state) = match outcome {
            ReturnOutcome::Validated { identity, state } => (Some(identity), None, Some(state)),
            ReturnOutcome::Rejected { reason, state } => (None, Some(reason), state),
        };

        let Some(state) = state else {
            warn!("invalid return state, unable to redirect");
            let mut intent = ResponseIntent::new(StatusCode::INTERNAL_SERVER_ERROR);
            intent.headers_mut().append(SET_COOKIE, self.clear_marker(ctx)?);
            return Ok(Completion::Respond(intent));
        };

        // The return target is consumed here and never reused.
        let AttemptState {
            return_uri,
            extra_properties,
            ..
        } = state;

        let mut hook_ctx = ReturnEndpointContext::new(
            ctx,
            identity,
            extra_properties,
            Some(return_uri),
            self.settings.sign_in_as.clone(),
            rejection,
        );
        self.provider.on_return_endpoint(&mut hook_ctx).await?;
        let parts = hook_ctx.into_parts();

        if let Some(response) = parts.response {
            debug!("request completed by on_return_endpoint hook");
            return Ok(Completion::Respond(response));
        }

        let mut headers = HeaderMap::new();
        if let (Some(identity), Some(sign_in_as)) = (&parts.identity, &parts.sign_in_as) {
            let identity = if identity.authentication_type() == sign_in_as {
                identity.clone()
            } else {
                identity.clone().with_authentication_type(sign_in_as)
            };
            headers.extend(
                session
                    .sign_in(ctx, sign_in_as, &identity, &parts.properties)
                    .await?,
            );
            info!(subject = ?identity.subject(), sign_in_as = %sign_in_as, "identity signed in");
        }

        let Some(redirect_uri) = parts.redirect_uri else {
            debug!("no redirect target after completion hook");
            headers.append(SET_COOKIE, self.clear_marker(ctx)?);
            return Ok(Completion::Continue(headers));
        };

        let redirect_uri = if parts.identity.is_some() {
            redirect_uri
        } else {
            debug!(reason = ?rejection, "sign-in failed, redirecting with access_denied");
            urls::append_query_param(&redirect_uri, "error", "access_denied")
        };

        let mut intent = ResponseIntent::redirect(&redirect_uri)
            .map_err(|e| CasAuthError::internal(format!("invalid redirect target: {e}")))?;
        intent.headers_mut().extend(headers);
        intent
            .headers_mut()
            .append(SET_COOKIE, self.clear_marker(ctx)?);

        Ok(Completion::Respond(intent))
    }

    /// Return and completion phases for a request on the callback path.
    ///
    /// # Errors
    ///
    /// See [`handle_return`](Self::handle_return) and
    /// [`finalize_redirect`](Self::finalize_redirect).
    pub async fn invoke_return_path(
        &self,
        ctx: &RequestContext,
        session: &dyn SessionSignIn,
    ) -> Result<Completion, CasAuthError> {
        let outcome = self.handle_return(ctx).await?;
        self.finalize_redirect(ctx, outcome, session).await
    }

    fn clear_marker(&self, ctx: &RequestContext) -> Result<http::HeaderValue, CasAuthError> {
        self.correlation
            .clear(ctx)
            .map_err(|e| CasAuthError::internal(format!("invalid correlation cookie: {e}")))
    }

    fn is_expired(&self, state: &AttemptState) -> bool {
        let Some(max_age) = self.settings.state_max_age else {
            return false;
        };
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        now_unix().saturating_sub(state.issued_at) > max_age
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
