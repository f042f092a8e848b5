//! Immutable lookup structure over a set of tokens.
//!
//! A [`TokenSnapshot`] is built wholesale from a token list and never mutated
//! afterwards. Reloads build a fresh snapshot and swap it in; the old one is
//! dropped once its last reader lets go.
//!
//! # Pre-conditions
//! - Callers looking up secrets may pass untrimmed input; lookups trim it the
//!   same way indexing did.
//!
//! # Post-conditions
//! - Building never fails. The same input list always produces the same snapshot.
//!
//! # Invariants
//! - Every token is reachable by its id.
//! - Secret keys are stored trimmed and are never empty.
//! - When two tokens share a secret, the later one in input order wins.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};

use super::token::{Token, TokenKind};

/// Error returned when a token payload cannot be parsed.
#[derive(Debug)]
pub enum ParseError {
    /// The payload is not JSON, or not shaped like `{"tokens": [...]}`.
    Json(serde_json::Error),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(
                f,
                "error unmarshalling tokens, payload must be json with 'tokens' key: {e}"
            ),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A secret that was claimed by more than one token during a build.
///
/// Only ids are recorded, never the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretConflict {
    /// Which index the collision happened in.
    pub kind: TokenKind,
    /// Id of the token that was overwritten.
    pub replaced_id: String,
    /// Id of the token that now owns the secret.
    pub kept_id: String,
}

/// Wire shape of a token payload. Unknown keys are ignored.
///
/// Only JSON objects are accepted, both for the payload and for each entry.
/// Arrays are rejected rather than read positionally.
#[derive(Debug, Default)]
struct TokensPayload {
    tokens: Option<Vec<TokenEntry>>,
}

#[derive(Debug, Default)]
struct TokenEntry {
    id: Option<String>,
    client_secret: Option<String>,
    server_secret: Option<String>,
    origins: Option<Vec<String>>,
}

impl<'de> Deserialize<'de> for TokensPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = TokensPayload;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an object with a 'tokens' key")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut payload = TokensPayload::default();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "tokens" {
                        payload.tokens = map.next_value()?;
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(payload)
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

impl<'de> Deserialize<'de> for TokenEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = TokenEntry;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a token object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entry = TokenEntry::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "id" => entry.id = map.next_value()?,
                        "client_secret" => entry.client_secret = map.next_value()?,
                        "server_secret" => entry.server_secret = map.next_value()?,
                        "origins" => entry.origins = map.next_value()?,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(entry)
            }
        }

        deserializer.deserialize_map(EntryVisitor)
    }
}

impl From<TokenEntry> for Token {
    fn from(entry: TokenEntry) -> Self {
        Self {
            id: entry.id.unwrap_or_default(),
            client_secret: entry.client_secret,
            server_secret: entry.server_secret,
            origins: entry.origins.unwrap_or_default(),
        }
    }
}

/// Indexed, immutable view over a token set.
#[derive(Debug, Default)]
pub struct TokenSnapshot {
    /// Every token, by id.
    by_id: HashMap<String, Arc<Token>>,
    /// Tokens by trimmed client secret.
    client_tokens: HashMap<String, Arc<Token>>,
    /// Tokens by trimmed server secret.
    server_tokens: HashMap<String, Arc<Token>>,
    /// Tokens by trimmed secret or by id.
    all: HashMap<String, Arc<Token>>,
    /// Token ids in input order.
    ids: Vec<String>,
    /// Secret collisions seen while building.
    conflicts: Vec<SecretConflict>,
}

impl TokenSnapshot {
    /// Build a snapshot from a token list.
    ///
    /// Blank ids are derived from the secret pair. Secrets that are empty after
    /// trimming are not indexed, but their token is still reachable by id.
    #[must_use]
    pub fn build(tokens: Vec<Token>) -> Self {
        let mut snapshot = Self::default();

        for mut token in tokens {
            token.ensure_id();
            let token = Arc::new(token);

            snapshot.by_id.insert(token.id.clone(), Arc::clone(&token));
            snapshot.all.insert(token.id.clone(), Arc::clone(&token));
            snapshot.ids.push(token.id.clone());

            if let Some(secret) = token.trimmed_client_secret() {
                snapshot.index_secret(TokenKind::Client, secret, &token);
            }
            if let Some(secret) = token.trimmed_server_secret() {
                snapshot.index_secret(TokenKind::Server, secret, &token);
            }
        }

        snapshot
    }

    /// Parse a `{"tokens": [...]}` payload and build a snapshot from it.
    ///
    /// A payload without a `tokens` key yields an empty snapshot.
    ///
    /// # Errors
    /// Returns `ParseError::Json` if the payload is not well-formed JSON or the
    /// `tokens` value is not an array of token objects.
    pub fn from_json(payload: &[u8]) -> Result<Self, ParseError> {
        let payload: TokensPayload = serde_json::from_slice(payload)?;
        let tokens = payload
            .tokens
            .unwrap_or_default()
            .into_iter()
            .map(Token::from)
            .collect();
        Ok(Self::build(tokens))
    }

    /// Build a snapshot from flat secret lists.
    ///
    /// Each secret becomes its own token with no origins and a derived id.
    /// Client secrets come first, then server secrets.
    #[must_use]
    pub fn from_secrets<C, S>(client_secrets: C, server_secrets: S) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let tokens = client_secrets
            .into_iter()
            .map(Token::client)
            .chain(server_secrets.into_iter().map(Token::server))
            .collect();
        Self::build(tokens)
    }

    fn index_secret(&mut self, kind: TokenKind, secret: &str, token: &Arc<Token>) {
        let index = match kind {
            TokenKind::Client => &mut self.client_tokens,
            TokenKind::Server => &mut self.server_tokens,
        };

        if let Some(previous) = index.insert(secret.to_string(), Arc::clone(token))
            && previous.id != token.id
        {
            self.conflicts.push(SecretConflict {
                kind,
                replaced_id: previous.id.clone(),
                kept_id: token.id.clone(),
            });
        }
        self.all.insert(secret.to_string(), Arc::clone(token));
    }

    /// Look up a token by secret or by id.
    ///
    /// Tries the key as given first, so ids containing whitespace still resolve,
    /// then the trimmed key.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&Arc<Token>> {
        self.all.get(key).or_else(|| self.all.get(key.trim()))
    }

    /// Look up a token by its id.
    #[must_use]
    pub fn lookup_by_id(&self, id: &str) -> Option<&Arc<Token>> {
        self.by_id.get(id)
    }

    /// The token owning the given client secret.
    #[must_use]
    pub fn client_token(&self, secret: &str) -> Option<&Arc<Token>> {
        self.client_tokens.get(secret.trim())
    }

    /// The token owning the given server secret.
    #[must_use]
    pub fn server_token(&self, secret: &str) -> Option<&Arc<Token>> {
        self.server_tokens.get(secret.trim())
    }

    /// Origins allowed for a client secret.
    #[must_use]
    pub fn origins_for_client_secret(&self, secret: &str) -> Option<&[String]> {
        self.client_token(secret).map(|t| t.origins.as_slice())
    }

    /// Origins allowed for a server secret.
    #[must_use]
    pub fn origins_for_server_secret(&self, secret: &str) -> Option<&[String]> {
        self.server_token(secret).map(|t| t.origins.as_slice())
    }

    /// Resolve a presented credential. Client secrets take precedence over
    /// server secrets when a value is registered as both.
    #[must_use]
    pub fn authenticate(&self, secret: &str) -> Option<(TokenKind, &Arc<Token>)> {
        self.client_token(secret)
            .map(|t| (TokenKind::Client, t))
            .or_else(|| self.server_token(secret).map(|t| (TokenKind::Server, t)))
    }

    /// Token ids in input order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of distinct token ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the snapshot holds no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Secret collisions recorded while building.
    #[must_use]
    pub fn conflicts(&self) -> &[SecretConflict] {
        &self.conflicts
    }
}
