//! Request authentication.
//!
//! This module checks inbound HTTP requests against the live token registry.
//!
//! # Pre-conditions
//! - The registry must have been primed before requests are served.
//!
//! # Post-conditions
//! - A request is either rejected or annotated with the token it presented.
//!
//! # Invariants
//! - Authentication reads one snapshot per request; a concurrent reload never
//!   mixes two token sets within a single check.

pub mod middleware;
pub mod origin;

pub use middleware::{AuthRejection, AuthenticatedToken, authorize, extract_token, require_token};
pub use origin::origin_allowed;
