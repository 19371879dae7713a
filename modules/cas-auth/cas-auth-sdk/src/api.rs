//! Traits at the seams of the CAS handshake engine.
//!
//! The engine owns the protocol state machine; everything it needs from the
//! outside world (HTTP transport, session persistence, state encoding, caller
//! extensions) comes in through one of these traits at construction time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::error::{CodecError, HookError, SessionError, TransportError};
use crate::hooks::{AuthenticatedContext, ReturnEndpointContext};
use crate::models::{AttemptState, Identity, RequestContext, ValidationOutcome};

/// HTTP transport used for the backchannel call to the CAS server.
#[async_trait]
pub trait CasTransport: Send + Sync {
    /// Issue a single `GET` and return the response body.
    ///
    /// # Errors
    ///
    /// Any transport-level failure, including non-2xx status codes.
    async fn get(&self, url: &str) -> Result<String, TransportError>;
}

/// Exchanges a ticket for a principal name.
#[async_trait]
pub trait TicketValidator: Send + Sync {
    /// Validate `ticket` against the exact `service_url` it was issued for.
    ///
    /// Never fails: every problem is folded into
    /// [`ValidationOutcome::Failure`]. Cancelling `cancellation` aborts the
    /// in-flight call.
    async fn validate(
        &self,
        ticket: &str,
        service_url: &str,
        cancellation: &CancellationToken,
    ) -> ValidationOutcome;
}

/// Tamper-evident encoding of [`AttemptState`].
pub trait StateDataFormat: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if the state cannot be encoded.
    fn protect(&self, state: &AttemptState) -> Result<String, CodecError>;

    /// # Errors
    ///
    /// Any modification of a value produced by [`protect`](Self::protect)
    /// yields an error rather than different data.
    fn unprotect(&self, protected: &str) -> Result<AttemptState, CodecError>;
}

/// Caller-supplied extension points. Both hooks default to no-ops.
///
/// Hooks must complete before the engine proceeds; no timeout is imposed.
#[async_trait]
pub trait CasAuthProvider: Send + Sync {
    /// Invoked after the CAS server confirmed a ticket.
    ///
    /// # Errors
    ///
    /// A hook error aborts the handshake as [`CasAuthError::Extension`](crate::CasAuthError).
    async fn on_authenticated(&self, _ctx: &mut AuthenticatedContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Invoked before the identity is signed in and the final redirect is sent.
    ///
    /// # Errors
    ///
    /// A hook error aborts the handshake as [`CasAuthError::Extension`](crate::CasAuthError).
    async fn on_return_endpoint(
        &self,
        _ctx: &mut ReturnEndpointContext<'_>,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Provider with no behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCasAuthProvider;

impl CasAuthProvider for NoopCasAuthProvider {}

/// Host session layer that turns a verified identity into a credential.
#[async_trait]
pub trait SessionSignIn: Send + Sync {
    /// Establish `identity` under `sign_in_as`.
    ///
    /// Returned headers (typically `Set-Cookie`) are merged into the final
    /// redirect so the credential is committed before the browser follows it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the credential cannot be issued.
    async fn sign_in(
        &self,
        request: &RequestContext,
        sign_in_as: &str,
        identity: &Identity,
        properties: &BTreeMap<String, String>,
    ) -> Result<HeaderMap, SessionError>;
}
