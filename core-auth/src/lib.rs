//! # Authentication Module
//!
//! Session management for an Ampache-style catalog server.
//!
//! ## Overview
//!
//! - [`SessionStore`] persists the current [`Session`] and the user's
//!   [`Credentials`] in the platform secure store and notices token changes.
//! - [`Authenticator`] is the handshake seam implemented by a provider crate.
//! - [`SessionManager`] hands out valid sessions, re-authenticating at most
//!   once for any number of concurrent callers.
//!
//! Entity records carry media URLs that embed the session token, so every
//! token change purges the entity caches through a [`CacheInvalidator`].

pub mod authenticator;
pub mod error;
pub mod manager;
pub mod session_store;
pub mod types;

pub use authenticator::Authenticator;
pub use error::{AuthError, Result};
pub use manager::SessionManager;
pub use session_store::{CacheInvalidator, SessionStore};
pub use types::{sha256_hex, AuthChallenge, Credentials, Session};
