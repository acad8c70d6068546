//! # Ampache Provider
//!
//! Implements the catalog's network seams against the Ampache JSON API.
//!
//! ## Overview
//!
//! - [`AmpacheAuthenticator`]: handshake by API key or time-salted password
//!   hash, `ping` and `goodbye`
//! - [`AmpacheGateway`]: `RemoteGateway` for albums, artists, playlists and
//!   songs, including relation listings, discovery feeds and mutations
//! - Ampache error codes are mapped onto the orchestrator's domain codes

pub mod auth;
pub mod client;
pub mod dto;
pub mod error;
pub mod gateway;

pub use auth::{AmpacheAuthenticator, API_VERSION};
pub use client::AmpacheClient;
pub use error::{AmpacheError, Result};
pub use gateway::{AmpacheEntity, AmpacheGateway};

use core_sync::CatalogRemotes;
use std::sync::Arc;

/// Gateways for every family on `server_url`, sharing one client.
pub fn catalog_remotes(client: Arc<AmpacheClient>, server_url: &str) -> CatalogRemotes {
    CatalogRemotes {
        albums: Arc::new(AmpacheGateway::new(client.clone(), server_url)),
        artists: Arc::new(AmpacheGateway::new(client.clone(), server_url)),
        playlists: Arc::new(AmpacheGateway::new(client.clone(), server_url)),
        songs: Arc::new(AmpacheGateway::new(client, server_url)),
    }
}
