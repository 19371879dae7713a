//! URL construction for the CAS round trip.
//!
//! Escaping follows RFC 3986: everything except unreserved characters is
//! percent-encoded, so the service URL sent at issuance and rebuilt at
//! validation compare byte-for-byte.

use cas_auth_sdk::RequestContext;
use url::form_urlencoded;

/// `{scheme}://{host}{base}{callback}?state={escaped state}`
pub fn service_url(ctx: &RequestContext, callback_path: &str, protected_state: &str) -> String {
    format!(
        "{}{}{}?state={}",
        ctx.origin(),
        ctx.path_base(),
        callback_path,
        urlencoding::encode(protected_state)
    )
}

/// `{base}/login?service={escaped service url}`
pub fn login_url(server_base: &str, service_url: &str) -> String {
    format!(
        "{server_base}/login?service={}",
        urlencoding::encode(service_url)
    )
}

/// `{base}/validate?service={escaped service url}&ticket={escaped ticket}`
pub fn validate_url(server_base: &str, service_url: &str, ticket: &str) -> String {
    format!(
        "{server_base}/validate?service={}&ticket={}",
        urlencoding::encode(service_url),
        urlencoding::encode(ticket)
    )
}

/// Make a caller-supplied return target absolute.
///
/// Rooted paths (`/dashboard`) are placed under the application's base path;
/// other relative references resolve against the current request URL.
pub fn absolute_uri(ctx: &RequestContext, uri: &str) -> String {
    if url::Url::parse(uri).is_ok() {
        return uri.to_owned();
    }
    if uri.starts_with('/') && !uri.starts_with("//") {
        return format!("{}{}{uri}", ctx.origin(), ctx.path_base());
    }
    url::Url::parse(&ctx.full_url())
        .and_then(|base| base.join(uri))
        .map_or_else(|_| ctx.full_url(), String::from)
}

/// Value of a query parameter that occurs exactly once.
///
/// Zero or multiple occurrences are both treated as absent.
pub fn single_query_value(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    let mut values = form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned());
    let first = values.next()?;
    values.next().is_none().then_some(first)
}

/// Append `name=value` to `uri`, keeping any existing query and fragment.
pub fn append_query_param(uri: &str, name: &str, value: &str) -> String {
    let (base, fragment) = match uri.find('#') {
        Some(idx) => uri.split_at(idx),
        None => (uri, ""),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{separator}{}={}{fragment}",
        urlencoding::encode(name),
        urlencoding::encode(value)
    )
}
