//! CAS Auth SDK
//!
//! This crate provides the public API for the `cas_auth` module:
//!
//! - [`CasAuthProvider`] - Extension hooks invoked during the return phase
//! - [`TicketValidator`] - Backchannel ticket validation contract
//! - [`CasTransport`] - Injectable HTTP transport used to reach the CAS server
//! - [`SessionSignIn`] - Host session layer that persists a verified identity
//! - [`StateDataFormat`] - Integrity-protected encoding of [`AttemptState`]
//! - [`CasAuthError`] - Error types
//!
//! ## Usage
//!
//! Hosts adapt their own request type into a [`RequestContext`], hand it to the
//! engine, and translate the returned [`ResponseIntent`] back:
//!
//! ```ignore
//! use cas_auth_sdk::{ChallengeProperties, RequestContext};
//!
//! let ctx = RequestContext::new("https", "app.example.com", "/secure")
//!     .with_query("x=1");
//! let intent = engine.build_challenge(&ctx, ChallengeProperties::default())?;
//! assert_eq!(intent.status(), http::StatusCode::FOUND);
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod api;
pub mod error;
pub mod hooks;
pub mod models;

// Re-export main types at crate root
pub use api::{
    CasAuthProvider, CasTransport, NoopCasAuthProvider, SessionSignIn, StateDataFormat,
    TicketValidator,
};
pub use error::{CasAuthError, CodecError, HookError, SessionError, TransportError};
pub use hooks::{AuthenticatedContext, ReturnEndpointContext, ReturnEndpointParts};
pub use models::{
    AttemptState, ChallengeProperties, Claim, ClaimType, Identity, RejectReason, RequestContext,
    ResponseIntent, ValidationFailure, ValidationOutcome,
};
