//! Origin restrictions for client tokens.
//!
//! A token's `origins` list holds host patterns:
//!
//! - `*` matches any host.
//! - `*.example.com` matches any host ending in `.example.com`.
//! - `app.*` matches any host starting with `app.`.
//! - `*staging*` matches any host containing `staging`.
//! - Anything else must equal the host exactly.
//!
//! Matching is case-insensitive and ignores scheme, port and path of the
//! request's `Origin` or `Referer` value.

use url::Url;

/// Extract the lowercase host from an `Origin` or `Referer` header value.
///
/// Accepts full URLs as well as bare `host[:port][/path]` values.
#[must_use]
pub fn request_host(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "null" {
        return None;
    }

    if let Ok(url) = Url::parse(value)
        && let Some(host) = url.host_str()
    {
        return Some(host.to_ascii_lowercase());
    }

    let host = value
        .split(['/', '?', '#'])
        .next()
        .and_then(|authority| authority.rsplit('@').next())
        .map(|authority| authority.split(':').next().unwrap_or(authority))
        .filter(|host| !host.is_empty())?;
    Some(host.to_ascii_lowercase())
}

/// Whether a single pattern matches a host.
#[must_use]
pub fn pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }

    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(_), Some(_)) => host.contains(&pattern[1..pattern.len() - 1]),
        (Some(suffix), None) => host.ends_with(suffix),
        (None, Some(prefix)) => host.starts_with(prefix),
        (None, None) => request_host(&pattern).is_some_and(|exact| exact == host),
    }
}

/// Whether a request may use a token restricted to `allowed`.
///
/// An empty `allowed` list permits every request. Otherwise the request must
/// carry an `Origin` or `Referer` whose host matches one of the patterns.
#[must_use]
pub fn origin_allowed(allowed: &[String], origin: Option<&str>, referer: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }

    [origin, referer]
        .into_iter()
        .flatten()
        .filter_map(request_host)
        .any(|host| allowed.iter().any(|pattern| pattern_matches(pattern, &host)))
}
