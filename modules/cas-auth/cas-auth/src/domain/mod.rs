//! Domain layer for the CAS client.

pub mod codec;
pub mod correlation;
pub mod engine;
pub mod urls;
pub mod validator;

pub use codec::AesGcmStateFormat;
pub use correlation::CorrelationMarker;
pub use engine::{CasAuthEngine, Completion, EngineSettings, ReturnOutcome};
pub use validator::{CasTicketValidator, parse_validation_response};
