//! Authentication against the external identity provider.
//!
//! Handlers only see the [`Authenticator`] trait; production wires in
//! [`ForgejoAuthenticator`], tests substitute fakes.

use crate::models::identity::{Credentials, Identity};
use async_trait::async_trait;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const USER_AGENT: &str = concat!("taswira/v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed basic auth credentials")]
    MissingCredentials,
    #[error("identity provider rejected token: {0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Unavailable(String),
    #[error("malformed identity provider response: {0}")]
    MalformedResponse(String),
    #[error("account `{0}` is inactive")]
    Inactive(String),
    #[error("account `{0}` is restricted")]
    Restricted(String),
    #[error("account `{0}` is prohibited from logging in")]
    LoginProhibited(String),
    #[error("token belongs to `{actual}`, not `{claimed}`")]
    LoginMismatch { claimed: String, actual: String },
}

/// Resolves client credentials into an [`Identity`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;
}

/// Subset of Forgejo's `GET /api/v1/user` response we act on.
#[derive(Debug, Deserialize)]
pub struct ForgejoUser {
    pub login: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub prohibit_login: bool,
    #[serde(default)]
    pub restricted: bool,
}

impl ForgejoUser {
    /// Turn a provider answer into an identity for the claimed login.
    pub fn into_identity(self, claimed: &str) -> Result<Identity, AuthError> {
        if self.login != claimed {
            return Err(AuthError::LoginMismatch {
                claimed: claimed.to_string(),
                actual: self.login,
            });
        }
        if self.prohibit_login {
            return Err(AuthError::LoginProhibited(self.login));
        }
        if self.restricted {
            return Err(AuthError::Restricted(self.login));
        }
        if !self.active {
            return Err(AuthError::Inactive(self.login));
        }
        Ok(Identity {
            login: self.login,
            is_admin: self.is_admin,
        })
    }
}

/// Validates access tokens by asking a Forgejo instance who they belong to.
#[derive(Clone)]
pub struct ForgejoAuthenticator {
    client: reqwest::Client,
    instance: String,
}

impl ForgejoAuthenticator {
    pub fn new(instance: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_client_builder(instance, reqwest::Client::builder())
    }

    /// Build with a caller-configured client (proxy, timeouts, TLS roots).
    /// The user agent is always set.
    pub fn with_client_builder(
        instance: impl Into<String>,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self, reqwest::Error> {
        let client = builder.user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            instance: instance.into().trim_end_matches('/').to_string(),
        })
    }

    fn user_url(&self) -> String {
        format!("{}/api/v1/user", self.instance)
    }
}

#[async_trait]
impl Authenticator for ForgejoAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let url = self.user_url();
        debug!(user = %credentials.username, %url, "verifying token with identity provider");

        let res = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("token {}", credentials.token))
            .send()
            .await
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(AuthError::Rejected(status.to_string()));
        }

        let user: ForgejoUser = res
            .json()
            .await
            .map_err(|err| AuthError::MalformedResponse(err.to_string()))?;
        user.into_identity(&credentials.username)
    }
}
