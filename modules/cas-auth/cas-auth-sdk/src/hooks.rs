//! Contexts handed to [`CasAuthProvider`](crate::CasAuthProvider) hooks.

use std::collections::BTreeMap;

use crate::models::{Identity, RejectReason, RequestContext, ResponseIntent};

/// Context for `on_authenticated`, invoked after the CAS server confirmed the
/// ticket.
///
/// The anti-CSRF check has already been committed at this point; the hook can
/// only shape the identity and the pass-through properties.
#[derive(Debug)]
pub struct AuthenticatedContext<'a> {
    request: &'a RequestContext,
    identity: Option<Identity>,
    properties: BTreeMap<String, String>,
    return_uri: String,
}

impl<'a> AuthenticatedContext<'a> {
    #[must_use]
    pub fn new(
        request: &'a RequestContext,
        identity: Identity,
        properties: BTreeMap<String, String>,
        return_uri: String,
    ) -> Self {
        Self {
            request,
            identity: Some(identity),
            properties,
            return_uri,
        }
    }

    #[must_use]
    pub fn request(&self) -> &RequestContext {
        self.request
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn identity_mut(&mut self) -> Option<&mut Identity> {
        self.identity.as_mut()
    }

    pub fn replace_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Withdraw the identity; the attempt ends as a rejection.
    pub fn reject(&mut self) {
        self.identity = None;
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.properties
    }

    #[must_use]
    pub fn return_uri(&self) -> &str {
        &self.return_uri
    }

    pub fn set_return_uri(&mut self, uri: impl Into<String>) {
        self.return_uri = uri.into();
    }

    #[must_use]
    pub fn into_parts(self) -> (Option<Identity>, BTreeMap<String, String>, String) {
        (self.identity, self.properties, self.return_uri)
    }
}

/// Context for `on_return_endpoint`, invoked right before the final redirect.
#[derive(Debug)]
pub struct ReturnEndpointContext<'a> {
    request: &'a RequestContext,
    identity: Option<Identity>,
    properties: BTreeMap<String, String>,
    redirect_uri: Option<String>,
    sign_in_as: Option<String>,
    rejection: Option<RejectReason>,
    response: Option<ResponseIntent>,
}

/// Decomposed [`ReturnEndpointContext`] after the hook ran.
#[derive(Debug)]
pub struct ReturnEndpointParts {
    pub identity: Option<Identity>,
    pub properties: BTreeMap<String, String>,
    pub redirect_uri: Option<String>,
    pub sign_in_as: Option<String>,
    /// Set when the hook took over the response.
    pub response: Option<ResponseIntent>,
}

impl<'a> ReturnEndpointContext<'a> {
    #[must_use]
    pub fn new(
        request: &'a RequestContext,
        identity: Option<Identity>,
        properties: BTreeMap<String, String>,
        redirect_uri: Option<String>,
        sign_in_as: Option<String>,
        rejection: Option<RejectReason>,
    ) -> Self {
        Self {
            request,
            identity,
            properties,
            redirect_uri,
            sign_in_as,
            rejection,
            response: None,
        }
    }

    #[must_use]
    pub fn request(&self) -> &RequestContext {
        self.request
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.properties
    }

    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    pub fn set_redirect_uri(&mut self, uri: Option<String>) {
        self.redirect_uri = uri;
    }

    /// Authentication type the session layer should sign the identity in as.
    #[must_use]
    pub fn sign_in_as(&self) -> Option<&str> {
        self.sign_in_as.as_deref()
    }

    pub fn set_sign_in_as(&mut self, authentication_type: Option<String>) {
        self.sign_in_as = authentication_type;
    }

    /// Why the attempt was rejected, if it was.
    #[must_use]
    pub fn rejection(&self) -> Option<RejectReason> {
        self.rejection
    }

    /// Take over the response; the engine performs no further action.
    pub fn complete_with(&mut self, response: ResponseIntent) {
        self.response = Some(response);
    }

    #[must_use]
    pub fn is_request_completed(&self) -> bool {
        self.response.is_some()
    }

    #[must_use]
    pub fn into_parts(self) -> ReturnEndpointParts {
        ReturnEndpointParts {
            identity: self.identity,
            properties: self.properties,
            redirect_uri: self.redirect_uri,
            sign_in_as: self.sign_in_as,
            response: self.response,
        }
    }
}
