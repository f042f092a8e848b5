//! A single authorization token record.
//!
//! # Invariants
//! - A token's `id` is never blank once it has passed through the builder.
//! - A derived id depends only on the raw secret pair, so it is stable across reloads.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Which side of the system a secret belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Browser-facing secret. Restricted by the token's origins.
    Client,
    /// Backend secret. Origins are not checked.
    Server,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// One logical credential: a client/server secret pair and the origins it may be used from.
///
/// Both secrets may be absent. Such a record carries no credential but is still
/// indexed by its id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    /// Stable identifier. Blank ids are derived from the secret pair when the
    /// token is indexed.
    pub id: String,
    /// Secret presented by browser clients.
    pub client_secret: Option<String>,
    /// Secret presented by backend services.
    pub server_secret: Option<String>,
    /// Origin patterns a client secret may be used from. Empty means any origin.
    pub origins: Vec<String>,
}

impl Token {
    /// Create a token holding only a client secret.
    #[must_use]
    pub fn client(secret: impl Into<String>) -> Self {
        Self {
            client_secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Create a token holding only a server secret.
    #[must_use]
    pub fn server(secret: impl Into<String>) -> Self {
        Self {
            server_secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the allowed origins.
    #[must_use]
    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// The client secret with surrounding whitespace removed, if non-empty.
    #[must_use]
    pub fn trimmed_client_secret(&self) -> Option<&str> {
        non_blank(self.client_secret.as_deref())
    }

    /// The server secret with surrounding whitespace removed, if non-empty.
    #[must_use]
    pub fn trimmed_server_secret(&self) -> Option<&str> {
        non_blank(self.server_secret.as_deref())
    }

    /// Fill in a derived id if the current one is blank.
    ///
    /// # Post-conditions
    /// - `self.id` is non-empty.
    pub(crate) fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = derive_token_id(self.client_secret.as_deref(), self.server_secret.as_deref());
        }
    }
}

fn non_blank(secret: Option<&str>) -> Option<&str> {
    secret.map(str::trim).filter(|s| !s.is_empty())
}

/// Derive a token id from its secret pair.
///
/// The id is the lowercase hex SHA-256 of `client_secret ++ server_secret`, with
/// absent secrets treated as empty strings. Secrets are hashed untrimmed.
#[must_use]
pub fn derive_token_id(client_secret: Option<&str>, server_secret: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_secret.unwrap_or_default().as_bytes());
    hasher.update(server_secret.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}
