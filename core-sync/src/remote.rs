//! Remote Gateway interface
//!
//! The narrow view of the catalog server the orchestrator works against:
//! paginated listing, single fetch and mutations. Failures come back as
//! typed [`RemoteError`] values, never panics, so the orchestrator can
//! pattern-match on what went wrong.

use async_trait::async_trait;
use core_auth::Session;
use core_library::Entity;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structured error class reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainCode {
    /// The session token is no longer accepted.
    SessionExpired,
    AccessDenied,
    NotFound,
    /// Method or parameter not supported by this server version.
    Unsupported,
    BadRequest,
    RateLimited,
    Other(u32),
}

impl DomainCode {
    /// Failures that may succeed when retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainCode::RateLimited)
    }
}

impl fmt::Display for DomainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainCode::SessionExpired => f.write_str("session expired"),
            DomainCode::AccessDenied => f.write_str("access denied"),
            DomainCode::NotFound => f.write_str("not found"),
            DomainCode::Unsupported => f.write_str("unsupported"),
            DomainCode::BadRequest => f.write_str("bad request"),
            DomainCode::RateLimited => f.write_str("rate limited"),
            DomainCode::Other(code) => write!(f, "code {}", code),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport or I/O failure; nothing was learned from the server.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with an error payload.
    #[error("{code}: {message}")]
    Domain { code: DomainCode, message: String },

    /// The server answered but the payload could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    pub fn domain(code: DomainCode, message: impl Into<String>) -> Self {
        RemoteError::Domain {
            code,
            message: message.into(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            RemoteError::Domain {
                code: DomainCode::SessionExpired,
                ..
            }
        )
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Server-side song feeds aggregated for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Random,
    Newest,
    Recent,
    Highest,
    Frequent,
    Flagged,
}

impl FeedKind {
    pub const ALL: [FeedKind; 6] = [
        FeedKind::Random,
        FeedKind::Newest,
        FeedKind::Recent,
        FeedKind::Highest,
        FeedKind::Frequent,
        FeedKind::Flagged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Random => "random",
            FeedKind::Newest => "newest",
            FeedKind::Recent => "recent",
            FeedKind::Highest => "highest",
            FeedKind::Frequent => "frequent",
            FeedKind::Flagged => "flagged",
        }
    }
}

/// What a remote listing selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    /// Free-text search; blank browses the whole family.
    Search(String),
    /// Children of an album (songs).
    Album(String),
    /// Children of an artist (albums or songs).
    Artist(String),
    /// Entries of a playlist (songs).
    Playlist(String),
    Feed(FeedKind),
}

impl ListFilter {
    pub fn label(&self) -> String {
        match self {
            ListFilter::Search(query) if query.trim().is_empty() => "browse".to_string(),
            ListFilter::Search(_) => "search".to_string(),
            ListFilter::Album(id) => format!("album:{}", id),
            ListFilter::Artist(id) => format!("artist:{}", id),
            ListFilter::Playlist(id) => format!("playlist:{}", id),
            ListFilter::Feed(kind) => format!("feed:{}", kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub filter: ListFilter,
    pub offset: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(filter: ListFilter, offset: u32, limit: u32) -> Self {
        Self {
            filter,
            offset,
            limit,
        }
    }
}

/// One page of a remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage<T> {
    pub items: Vec<T>,
    /// Total matching items, when the server reports it.
    pub total: Option<u32>,
}

impl<T> RemotePage<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, total: None }
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total = Some(total);
        self
    }
}

/// A server-side write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Flag { flagged: bool },
    /// `None` clears the rating.
    Rate { rating: Option<u8> },
    PlaylistAddSong { song_id: String },
    PlaylistRemoveSong { song_id: String },
    /// Replace the playlist's full item list in one call.
    PlaylistReplaceItems { song_ids: Vec<String> },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Flag { .. } => "flag",
            Mutation::Rate { .. } => "rate",
            Mutation::PlaylistAddSong { .. } => "playlist_add_song",
            Mutation::PlaylistRemoveSong { .. } => "playlist_remove_song",
            Mutation::PlaylistReplaceItems { .. } => "playlist_replace_items",
        }
    }
}

/// Network access for one entity family.
#[async_trait]
pub trait RemoteGateway<T: Entity>: Send + Sync {
    async fn list_page(
        &self,
        session: &Session,
        request: &PageRequest,
    ) -> RemoteResult<RemotePage<T>>;

    async fn fetch_one(&self, session: &Session, id: &str) -> RemoteResult<T>;

    /// Apply `mutation` to the entity `target`. `Ok(false)` means the server
    /// answered without confirming success.
    async fn mutate(
        &self,
        session: &Session,
        target: &str,
        mutation: &Mutation,
    ) -> RemoteResult<bool>;
}
