//! Request extractors for the authenticated principal and the public URL
//! prefix of the request.

use crate::{
    errors::AppError,
    models::identity::{Credentials, Identity},
    services::auth_service::AuthError,
    state::AppState,
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose};
use tracing::{debug, warn};

/// The identity behind a request, resolved before any body is read.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let credentials = basic_credentials(&parts.headers).ok_or(AuthError::MissingCredentials)?;

        match state.authenticator.authenticate(&credentials).await {
            Ok(identity) => {
                debug!(user = %identity.login, admin = identity.is_admin, "authenticated");
                Ok(Self(identity))
            }
            Err(err) => {
                warn!(user = %credentials.username, error = %err, "failed login");
                Err(err.into())
            }
        }
    }
}

/// `<scheme>://<host>/<subpath/>`, the prefix returned image URLs start with.
#[derive(Debug, Clone)]
pub struct UrlPrefix(pub String);

impl FromRequestParts<AppState> for UrlPrefix {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        url_prefix(&parts.headers, &state.config.subpath).map(Self)
    }
}

/// Build the URL prefix from reverse-proxy headers.
///
/// `X-Forwarded-Proto` is required; the host comes from `X-Forwarded-Host`,
/// falling back to `Host`.
pub fn url_prefix(headers: &HeaderMap, subpath: &str) -> Result<String, AppError> {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };

    let scheme = value("x-forwarded-proto")
        .ok_or_else(|| AppError::bad_request("X-Forwarded-Proto header not set"))?;
    let host = value("x-forwarded-host")
        .or_else(|| value(header::HOST.as_str()))
        .ok_or_else(|| AppError::bad_request("X-Forwarded-Host or Host header not set"))?;

    Ok(format!("{}://{}/{}", scheme, host, subpath))
}

/// Decode `Authorization: Basic base64(username:token)`.
/// The scheme name is matched case-insensitively.
pub fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, token) = decoded.split_once(':')?;
    Some(Credentials {
        username: username.to_string(),
        token: token.to_string(),
    })
}
