//! Error types for the CAS auth module.

use std::error::Error as StdError;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Faults that abort a handshake instead of resolving to a rejection.
///
/// Everything else that can go wrong during the return phase is expressed as a
/// [`RejectReason`](crate::RejectReason) and ends in a well-formed redirect.
#[derive(Debug, Error)]
pub enum CasAuthError {
    /// The engine cannot be built from the supplied options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied extension hook failed.
    #[error("extension hook failed: {0}")]
    Extension(#[from] HookError),

    /// The host session layer refused to establish the identity.
    #[error("session sign-in failed: {0}")]
    Session(#[from] SessionError),

    /// An internal error occurred (e.g. a header value could not be encoded).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CasAuthError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Error raised by a [`CasAuthProvider`](crate::CasAuthProvider) hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HookError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Error raised by a [`SessionSignIn`](crate::SessionSignIn) implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SessionError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SessionError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Backchannel transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("request cancelled")]
    Cancelled,

    /// The URL is not echoed; it carries the ticket.
    #[error("invalid request url: {reason}")]
    InvalidUrl { reason: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// Failures of a [`StateDataFormat`](crate::StateDataFormat).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The protected value is not in the expected wire format.
    #[error("malformed protected state")]
    Malformed,

    /// Authentication of the protected value failed (tampered or foreign key).
    #[error("protected state failed integrity check")]
    Integrity,

    #[error("state serialization failed: {0}")]
    Serialization(String),
}
