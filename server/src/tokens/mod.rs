//! Token registry data model.
//!
//! - [`Token`]: one credential record.
//! - [`TokenSnapshot`]: immutable index over a token set, built wholesale on every reload.
//! - [`Fingerprint`]: content hash used to skip rebuilding unchanged payloads.
//! - [`TokenRegistry`]: the read handle request handlers hold; always points at
//!   the most recently published snapshot.

pub mod fingerprint;
pub mod registry;
pub mod snapshot;
pub mod token;

pub use fingerprint::Fingerprint;
pub use registry::TokenRegistry;
pub use snapshot::{ParseError, SecretConflict, TokenSnapshot};
pub use token::{Token, TokenKind, derive_token_id};
