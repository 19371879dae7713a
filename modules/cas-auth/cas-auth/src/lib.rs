//! CAS Auth Module
//!
//! Client side of the CAS 1.0 redirect handshake:
//!
//! - [`CasAuthEngine`] - challenge, return and completion phases
//! - [`CasAuthOptions`] - builds an engine from [`CasAuthConfig`] plus injected collaborators
//! - [`HyperTransport`] - default backchannel transport (hyper + rustls)
//! - [`cas_auth_middleware`] - axum adapter
//!
//! Traits and data types shared with hosts live in [`cas_auth_sdk`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod module;

pub use api::{CasAuthState, CasChallenge, cas_auth_middleware};
pub use config::{AuthenticationMode, CasAuthConfig};
pub use domain::{
    AesGcmStateFormat, CasAuthEngine, CasTicketValidator, Completion, EngineSettings,
    ReturnOutcome,
};
pub use infra::HyperTransport;
pub use module::CasAuthOptions;

pub use cas_auth_sdk;
