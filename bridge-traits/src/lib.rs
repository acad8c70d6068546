//! # Host Bridge Traits
//!
//! Capability traits the sync core needs from its host platform.
//!
//! ## Overview
//!
//! The core never talks to sockets, keychains or preference files directly.
//! Each capability is expressed as a trait here and implemented per platform
//! (`bridge-desktop` for macOS, Windows and Linux).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry policy and timeouts
//! - [`OfflineModeProvider`](network::OfflineModeProvider) - User-selected offline switch
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential and session persistence
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map transport failures to `Timeout`/`Connection` so the sync layer
//! can distinguish them from application errors.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{ConnectivityMode, OfflineModeProvider, StaticOfflineMode};
pub use storage::{SecureStore, SettingsStore};
pub use time::{Clock, FixedClock, SystemClock};
