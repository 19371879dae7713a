//! Host adapters.

pub mod middleware;

pub use middleware::{CasAuthState, CasChallenge, cas_auth_middleware};
