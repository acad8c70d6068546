//! # Catalog Cache
//!
//! Entity models for the media catalog and the Cache Gateway they are
//! stored through.
//!
//! ## Overview
//!
//! - [`models`]: `Album`, `Artist`, `Playlist`, `Song` and the [`Entity`] trait
//! - [`gateway`]: the [`CacheGateway`] interface and [`CacheFilter`]
//! - [`memory`]: an in-memory gateway
//! - [`sqlite`]: a SQLite gateway over one `cached_entities` table
//! - [`db`]: connection pooling and migrations

pub mod db;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod models;
pub mod sqlite;

pub use error::{LibraryError, Result};
pub use gateway::{CacheFilter, CacheGateway, Scope};
pub use memory::InMemoryCache;
pub use models::{scope_key, Album, Artist, Entity, EntityFamily, Playlist, Song, MAX_RATING};
pub use sqlite::{SqliteCache, SqliteCacheStore};
