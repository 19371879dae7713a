//! Configuration for the CAS auth module.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use secrecy::SecretString;
use serde::Deserialize;

/// Environment variables with this prefix override file values
/// (`CAS_AUTH__CALLBACK_PATH=/cas`).
pub const ENV_PREFIX: &str = "CAS_AUTH__";

fn default_callback_path() -> String {
    "/signin-cas".to_owned()
}

fn default_authentication_type() -> String {
    "JasigCas".to_owned()
}

fn default_caption() -> String {
    "Cas".to_owned()
}

fn default_backchannel_timeout_secs() -> u64 {
    60
}

fn default_max_response_bytes() -> usize {
    10 * 1024 * 1024
}

#[allow(clippy::unnecessary_wraps)]
fn default_state_max_age_secs() -> Option<u64> {
    Some(900)
}

fn default_correlation_cookie_max_age_secs() -> u64 {
    900
}

/// Which 401 responses turn into a CAS challenge.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMode {
    /// Every 401 from the wrapped service is challenged.
    Active,
    /// Only 401 responses that explicitly request a CAS challenge.
    #[default]
    Passive,
}

/// CAS client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CasAuthConfig {
    /// Base URL of the CAS server, e.g. `https://sso.example.edu/cas`.
    ///
    /// Required. `/login` and `/validate` are appended to it.
    #[serde(default)]
    pub cas_server_url_base: Option<String>,

    /// Path within the application's base path where the user-agent returns.
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    #[serde(default = "default_authentication_type")]
    pub authentication_type: String,

    /// Text a sign-in UI may display for this provider.
    #[serde(default = "default_caption")]
    pub caption: String,

    #[serde(default)]
    pub authentication_mode: AuthenticationMode,

    /// Authentication type the host session layer signs verified identities in as.
    #[serde(default)]
    pub sign_in_as_authentication_type: Option<String>,

    #[serde(default = "default_backchannel_timeout_secs")]
    pub backchannel_timeout_secs: u64,

    /// Upper bound on the backchannel response body.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Secret the correlation state key is derived from. A random per-process
    /// secret is used when absent.
    #[serde(default)]
    pub state_secret: Option<SecretString>,

    /// Oldest accepted `state`, in seconds. `null` accepts any decodable state.
    #[serde(default = "default_state_max_age_secs")]
    pub state_max_age_secs: Option<u64>,

    #[serde(default = "default_correlation_cookie_max_age_secs")]
    pub correlation_cookie_max_age_secs: u64,
}

impl Default for CasAuthConfig {
    fn default() -> Self {
        Self {
            cas_server_url_base: None,
            callback_path: default_callback_path(),
            authentication_type: default_authentication_type(),
            caption: default_caption(),
            authentication_mode: AuthenticationMode::default(),
            sign_in_as_authentication_type: None,
            backchannel_timeout_secs: default_backchannel_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
            state_secret: None,
            state_max_age_secs: default_state_max_age_secs(),
            correlation_cookie_max_age_secs: default_correlation_cookie_max_age_secs(),
        }
    }
}

impl CasAuthConfig {
    /// Config with only the server base URL set.
    #[must_use]
    pub fn for_server(cas_server_url_base: impl Into<String>) -> Self {
        Self {
            cas_server_url_base: Some(cas_server_url_base.into()),
            ..Self::default()
        }
    }

    /// Extract the config from a caller-assembled figment.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged sources do not deserialize.
    pub fn from_figment(figment: &Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    /// Load a YAML file and apply `CAS_AUTH__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the result does not
    /// deserialize.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let figment = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    #[must_use]
    pub fn backchannel_timeout(&self) -> Duration {
        Duration::from_secs(self.backchannel_timeout_secs)
    }

    #[must_use]
    pub fn state_max_age(&self) -> Option<Duration> {
        self.state_max_age_secs.map(Duration::from_secs)
    }
}
