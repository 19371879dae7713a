//! Infrastructure: outbound transport to the CAS server.

pub mod transport;

pub use transport::HyperTransport;
