//! Engine construction from configuration and injected collaborators.

use std::sync::Arc;

use cas_auth_sdk::{
    CasAuthError, CasAuthProvider, CasTransport, NoopCasAuthProvider, StateDataFormat,
    TicketValidator,
};
use rustls::client::danger::ServerCertVerifier;
use tracing::{info, warn};

use crate::config::CasAuthConfig;
use crate::domain::{AesGcmStateFormat, CasAuthEngine, CasTicketValidator, EngineSettings};
use crate::infra::HyperTransport;

/// Configuration plus the non-serializable pieces of an engine.
///
/// Everything is fixed once [`build`](Self::build) returns; the engine never
/// mutates its collaborators afterwards.
pub struct CasAuthOptions {
    config: CasAuthConfig,
    transport: Option<Arc<dyn CasTransport>>,
    certificate_verifier: Option<Arc<dyn ServerCertVerifier>>,
    validator: Option<Arc<dyn TicketValidator>>,
    provider: Arc<dyn CasAuthProvider>,
    state_format: Option<Arc<dyn StateDataFormat>>,
}

impl CasAuthOptions {
    #[must_use]
    pub fn new(config: CasAuthConfig) -> Self {
        Self {
            config,
            transport: None,
            certificate_verifier: None,
            validator: None,
            provider: Arc::new(NoopCasAuthProvider),
            state_format: None,
        }
    }

    /// Replace the built-in hyper transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn CasTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the CAS server certificate with `verifier` (built-in transport only).
    #[must_use]
    pub fn certificate_verifier(mut self, verifier: Arc<dyn ServerCertVerifier>) -> Self {
        self.certificate_verifier = Some(verifier);
        self
    }

    /// Replace ticket validation entirely; the transport is then unused.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn TicketValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn CasAuthProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn state_format(mut self, state_format: Arc<dyn StateDataFormat>) -> Self {
        self.state_format = Some(state_format);
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// # Errors
    ///
    /// Returns [`CasAuthError::Configuration`] if the CAS server URL is
    /// missing or not an absolute http(s) URL, the callback path is invalid,
    /// or a certificate verifier is combined with a custom transport.
    #[tracing::instrument(skip_all, fields(auth_type = %self.config.authentication_type))]
    pub fn build(self) -> Result<CasAuthEngine, CasAuthError> {
        let cfg = self.config;
        let server_base = validate_server_base(cfg.cas_server_url_base.as_deref())?;
        validate_callback_path(&cfg.callback_path)?;

        if cfg.authentication_type.is_empty() {
            return Err(CasAuthError::configuration(
                "authentication_type must not be empty",
            ));
        }

        let validator = match self.validator {
            Some(validator) => validator,
            None => {
                let transport = match (self.transport, self.certificate_verifier) {
                    (Some(_), Some(_)) => {
                        return Err(CasAuthError::configuration(
                            "a certificate verifier cannot be combined with a custom transport",
                        ));
                    }
                    (Some(transport), None) => transport,
                    (None, Some(verifier)) => Arc::new(
                        HyperTransport::with_certificate_verifier(
                            verifier,
                            cfg.backchannel_timeout(),
                            cfg.max_response_bytes,
                        )
                        .map_err(tls_error)?,
                    ),
                    (None, None) => Arc::new(
                        HyperTransport::new(cfg.backchannel_timeout(), cfg.max_response_bytes)
                            .map_err(tls_error)?,
                    ),
                };
                Arc::new(CasTicketValidator::new(server_base.clone(), transport))
            }
        };

        let purpose = format!("cas-auth.state.v1:{}", cfg.authentication_type);
        let state_format: Arc<dyn StateDataFormat> = match (self.state_format, &cfg.state_secret) {
            (Some(format), _) => format,
            (None, Some(secret)) => Arc::new(AesGcmStateFormat::new(secret, purpose)),
            (None, None) => {
                warn!(
                    "no state_secret configured; using a per-process key, \
                     pending sign-ins will not survive restarts or cross instances"
                );
                Arc::new(AesGcmStateFormat::ephemeral(purpose))
            }
        };

        info!(
            server = %server_base,
            callback_path = %cfg.callback_path,
            mode = ?cfg.authentication_mode,
            "CAS authentication configured"
        );

        let state_max_age = cfg.state_max_age();
        let settings = EngineSettings {
            server_base,
            callback_path: cfg.callback_path,
            authentication_type: cfg.authentication_type,
            caption: cfg.caption,
            authentication_mode: cfg.authentication_mode,
            sign_in_as: cfg.sign_in_as_authentication_type,
            state_max_age,
            correlation_max_age_secs: cfg.correlation_cookie_max_age_secs,
        };

        Ok(CasAuthEngine::new(
            settings,
            state_format,
            validator,
            self.provider,
        ))
    }
}

fn tls_error(e: rustls::Error) -> CasAuthError {
    CasAuthError::configuration(format!("backchannel TLS setup failed: {e}"))
}

fn validate_server_base(raw: Option<&str>) -> Result<String, CasAuthError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        CasAuthError::configuration(
            "cas_server_url_base was not set - it must point to the CAS server URL",
        )
    })?;

    let parsed = url::Url::parse(raw).map_err(|e| {
        CasAuthError::configuration(format!("cas_server_url_base '{raw}' is invalid: {e}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(CasAuthError::configuration(format!(
            "cas_server_url_base '{raw}' must be an absolute http(s) URL"
        )));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(CasAuthError::configuration(format!(
            "cas_server_url_base '{raw}' must not carry a query or fragment"
        )));
    }

    Ok(raw.trim_end_matches('/').to_owned())
}

fn validate_callback_path(path: &str) -> Result<(), CasAuthError> {
    if !path.starts_with('/') || path.contains(['?', '#']) {
        return Err(CasAuthError::configuration(format!(
            "callback_path '{path}' must start with '/' and contain no query or fragment"
        )));
    }
    Ok(())
}
