//! Request authentication against the token registry.
//!
//! The credential is read, in order, from:
//! 1. the `X-Auth-Token` header,
//! 2. the `token` query parameter,
//! 3. an `Authorization: Bearer` header.
//!
//! Client secrets additionally have to pass the token's origin restrictions.
//! Server secrets are accepted from anywhere.
//!
//! # Post-conditions
//! - Requests reaching the inner handler carry an [`AuthenticatedToken`] extension.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::origin::origin_allowed;
use crate::tokens::{TokenKind, TokenRegistry, TokenSnapshot};

/// Header carrying the token secret.
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Query parameter carrying the token secret.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// The token a request was authenticated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedToken {
    /// Id of the matching token.
    pub id: String,
    /// Whether a client or a server secret was presented.
    pub kind: TokenKind,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No credential was presented.
    MissingToken,
    /// The credential matches no registered secret.
    UnknownToken,
    /// A client secret was used from an origin it is not allowed on.
    OriginNotAllowed,
}

impl AuthRejection {
    /// HTTP status for this rejection.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MissingToken | Self::UnknownToken => StatusCode::UNAUTHORIZED,
            Self::OriginNotAllowed => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingToken => write!(f, "missing token"),
            Self::UnknownToken => write!(f, "invalid token"),
            Self::OriginNotAllowed => write!(f, "origin is not allowed for this token"),
        }
    }
}

impl std::error::Error for AuthRejection {}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Pull the presented secret out of a request.
///
/// Blank values are skipped, so an empty header does not hide a credential
/// given in a later source.
#[must_use]
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_header = non_blank(header_str(headers, TOKEN_HEADER));

    let from_query = || {
        query.and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key == TOKEN_QUERY_PARAM)
                .find_map(|(_, value)| non_blank(Some(value.as_ref())))
        })
    };

    let from_bearer = || {
        let value = header_str(headers, header::AUTHORIZATION.as_str())?.trim_start();
        let (scheme, credentials) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") {
            non_blank(Some(credentials))
        } else {
            None
        }
    };

    from_header.or_else(from_query).or_else(from_bearer)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve a presented secret against a snapshot and check its origin.
///
/// # Errors
/// Returns the `AuthRejection` describing why the request may not proceed.
pub fn authorize(
    snapshot: &TokenSnapshot,
    secret: Option<&str>,
    origin: Option<&str>,
    referer: Option<&str>,
) -> Result<AuthenticatedToken, AuthRejection> {
    let secret = secret.ok_or(AuthRejection::MissingToken)?;
    let (kind, token) = snapshot
        .authenticate(secret)
        .ok_or(AuthRejection::UnknownToken)?;

    if kind == TokenKind::Client && !origin_allowed(&token.origins, origin, referer) {
        return Err(AuthRejection::OriginNotAllowed);
    }

    Ok(AuthenticatedToken {
        id: token.id.clone(),
        kind,
    })
}

/// Middleware rejecting requests that do not carry a registered token.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn require_token(
    State(registry): State<TokenRegistry>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let secret = extract_token(headers, request.uri().query());
    let origin = header_str(headers, header::ORIGIN.as_str());
    let referer = header_str(headers, header::REFERER.as_str());

    let snapshot = registry.snapshot();
    match authorize(&snapshot, secret.as_deref(), origin, referer) {
        Ok(authenticated) => {
            tracing::debug!(token_id = %authenticated.id, kind = %authenticated.kind, "request authenticated");
            request.extensions_mut().insert(authenticated);
            next.run(request).await
        }
        Err(rejection) => {
            tracing::debug!(
                path = %request.uri().path(),
                reason = %rejection,
                "request rejected"
            );
            rejection.into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
