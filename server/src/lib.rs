// Life of a token set:
// 1. Payload is read from its source (file or HTTP)
// 2. Fingerprint is compared with the last good payload; unchanged payloads stop here
// 3. Payload is parsed and indexed into an immutable snapshot
// 4. Snapshot is swapped into the registry
// 5. Requests resolve their secret against whichever snapshot is current
//
// System components:
//  - Token snapshot and registry
//  - Source loaders
//  - Background watcher
//  - HTTP authentication middleware

pub mod auth;
pub mod config;
pub mod server;
pub mod source;
pub mod tokens;
pub mod watcher;

#[cfg(test)]
#[allow(clippy::expect_used)]
mod testing;

pub use tokens::{Token, TokenKind, TokenRegistry, TokenSnapshot};
pub use watcher::{WatchError, WatchHandle, start_watch};
