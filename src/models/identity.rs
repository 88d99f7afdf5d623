//! The authenticated principal behind a request.

/// Who made a request, as vouched for by the identity provider.
///
/// Only used to annotate logs; nothing about the uploader is stored next to
/// the image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub login: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            is_admin: false,
        }
    }
}

/// Credentials presented by the client: the claimed login plus an access
/// token for the identity provider.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
