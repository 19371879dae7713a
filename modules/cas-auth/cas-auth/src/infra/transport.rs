//! Backchannel HTTP transport built on the hyper client stack.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cas_auth_sdk::{CasTransport, TransportError};
use http::{Request, Uri, header};
use http_body_util::{BodyExt, Empty, Limited};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::client::danger::ServerCertVerifier;
use rustls::{ClientConfig, ConfigBuilder, RootCertStore, WantsVerifier};
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("cf-cas-auth/", env!("CARGO_PKG_VERSION"));

/// Pooled HTTPS client for calls to the CAS server.
///
/// Every call is bounded by the backchannel timeout (request and body) and
/// by the maximum response size.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HyperTransport {
    /// Client trusting the platform's native root certificates.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self, rustls::Error> {
        let config = config_builder()?
            .with_root_certificates(native_roots())
            .with_no_client_auth();
        Ok(Self::with_tls_config(config, timeout, max_response_bytes))
    }

    /// Client delegating server certificate validation to `verifier`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn with_certificate_verifier(
        verifier: Arc<dyn ServerCertVerifier>,
        timeout: Duration,
        max_response_bytes: usize,
    ) -> Result<Self, rustls::Error> {
        let config = config_builder()?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        Ok(Self::with_tls_config(config, timeout, max_response_bytes))
    }

    fn with_tls_config(config: ClientConfig, timeout: Duration, max_response_bytes: usize) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .build();

        Self {
            client: Client::builder(TokioExecutor::new()).build(https),
            timeout,
            max_response_bytes,
        }
    }

    async fn fetch(&self, uri: Uri) -> Result<String, TransportError> {
        let request = Request::get(uri)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "text/plain")
            .body(Empty::<Bytes>::new())
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = Limited::new(response.into_body(), self.max_response_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    TransportError::BodyTooLarge {
                        limit: self.max_response_bytes,
                    }
                } else {
                    TransportError::InvalidBody(e.to_string())
                }
            })?
            .to_bytes();

        String::from_utf8(body.to_vec()).map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

#[async_trait]
impl CasTransport for HyperTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        let uri: Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| TransportError::InvalidUrl {
                reason: e.to_string(),
            })?;

        debug!(host = ?uri.host(), "calling CAS server");
        tokio::time::timeout(self.timeout, self.fetch(uri))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}

/// Pinned to aws-lc-rs so the process-wide default provider does not matter.
fn config_builder() -> Result<ConfigBuilder<ClientConfig, WantsVerifier>, rustls::Error> {
    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for e in &loaded.errors {
        warn!(error = %e, "failed to load a native root certificate");
    }
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(added, ignored, "loaded native root certificates");
    roots
}
