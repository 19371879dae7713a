//! Double-submit correlation marker.
//!
//! The challenge phase stores the same random nonce in the encoded state and in
//! a short-lived cookie scoped to the user-agent. The return phase accepts the
//! state only if both copies match.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cas_auth_sdk::RequestContext;
use http::HeaderValue;
use http::header::{COOKIE, InvalidHeaderValue};
use rand::RngCore;
use subtle::ConstantTimeEq;

const NONCE_BYTES: usize = 32;

/// Cookie-backed anti-CSRF marker for one authentication type.
#[derive(Debug, Clone)]
pub struct CorrelationMarker {
    cookie_name: String,
    max_age_secs: u64,
}

impl CorrelationMarker {
    #[must_use]
    pub fn new(authentication_type: &str, max_age_secs: u64) -> Self {
        Self {
            cookie_name: format!(".cas.correlation.{authentication_type}"),
            max_age_secs,
        }
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Fresh 256-bit nonce, base64url encoded.
    #[must_use]
    pub fn generate_token() -> String {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut nonce);
        URL_SAFE_NO_PAD.encode(nonce)
    }

    /// `Set-Cookie` value that plants `token` on the user-agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie path contains invalid header characters.
    pub fn issue(&self, ctx: &RequestContext, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        self.set_cookie(ctx, token, self.max_age_secs)
    }

    /// `Set-Cookie` value that removes the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie path contains invalid header characters.
    pub fn clear(&self, ctx: &RequestContext) -> Result<HeaderValue, InvalidHeaderValue> {
        self.set_cookie(ctx, "", 0)
    }

    /// Whether the request carries a marker equal to `expected`.
    #[must_use]
    pub fn verify(&self, ctx: &RequestContext, expected: &str) -> bool {
        match self.read(ctx) {
            Some(actual) if !expected.is_empty() => {
                bool::from(actual.as_bytes().ct_eq(expected.as_bytes()))
            }
            _ => false,
        }
    }

    fn read<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value)
    }

    fn set_cookie(
        &self,
        ctx: &RequestContext,
        value: &str,
        max_age_secs: u64,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let path = if ctx.path_base().is_empty() {
            "/"
        } else {
            ctx.path_base()
        };
        let secure = if ctx.is_https() { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{}={value}; Path={path}; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax{secure}",
            self.cookie_name
        ))
    }
}
