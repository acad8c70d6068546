//! Cache Gateway interface
//!
//! One gateway instance per entity family. The sync orchestrator only ever
//! talks to the cache through this trait, so the in-memory and SQLite
//! backends are interchangeable.

use crate::error::Result;
use crate::models::{scope_key, Entity, EntityFamily};
use async_trait::async_trait;

/// Which slice of a family a cache read addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// Every cached entity of the family.
    #[default]
    All,
    /// Entities related to an album (songs of the album).
    Album(String),
    /// Entities related to an artist (albums or songs of the artist).
    Artist(String),
    /// Exactly these ids, returned in this order. Missing ids are skipped.
    Ids(Vec<String>),
    /// Entities the user has flagged.
    Flagged,
}

impl Scope {
    /// Relation key stored alongside entities, for relation scopes.
    pub fn relation_key(&self) -> Option<String> {
        match self {
            Scope::Album(id) => Some(scope_key(EntityFamily::Album, id)),
            Scope::Artist(id) => Some(scope_key(EntityFamily::Artist, id)),
            _ => None,
        }
    }
}

/// Cache read filter: a free-text query narrowed by a [`Scope`].
///
/// A blank query matches everything; otherwise it is a case-insensitive
/// substring match against [`Entity::search_text`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheFilter {
    pub query: String,
    pub scope: Scope,
}

impl CacheFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: Scope::All,
        }
    }

    pub fn scoped(scope: Scope) -> Self {
        Self {
            query: String::new(),
            scope,
        }
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scoped(Scope::Ids(ids.into_iter().map(Into::into).collect()))
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Lowercased, trimmed query, or `None` when blank.
    pub fn normalized_query(&self) -> Option<String> {
        let query = self.query.trim();
        if query.is_empty() {
            None
        } else {
            Some(query.to_lowercase())
        }
    }

    /// Whether `entity` passes the query and scope, ignoring id ordering.
    pub fn matches<T: Entity>(&self, entity: &T) -> bool {
        if let Some(query) = self.normalized_query() {
            if !entity.search_text().to_lowercase().contains(&query) {
                return false;
            }
        }

        match &self.scope {
            Scope::All => true,
            Scope::Flagged => entity.flagged(),
            Scope::Ids(ids) => ids.iter().any(|id| id == entity.id()),
            scope => match scope.relation_key() {
                Some(key) => entity.scope_keys().contains(&key),
                None => false,
            },
        }
    }
}

/// Narrow interface to the local store for one entity family.
///
/// Results come back in first-insertion order, except for [`Scope::Ids`]
/// which follows the requested order.
#[async_trait]
pub trait CacheGateway<T: Entity>: Send + Sync {
    /// Read the entities matching `filter`.
    async fn query(&self, filter: &CacheFilter) -> Result<Vec<T>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Insert new ids and overwrite existing ones, atomically.
    ///
    /// Every entity is validated first and the whole batch is rejected if
    /// one is malformed. Existing ids keep their position; each incoming
    /// record gets [`Entity::retain_local`] applied against the cached copy.
    async fn upsert_all(&self, entities: &[T]) -> Result<()>;

    /// Make `entities` the whole family in one atomic write.
    ///
    /// Ids missing from the batch are dropped and positions follow the batch
    /// order. Ids that survive still get [`Entity::retain_local`] applied
    /// against their previous copy. A malformed batch changes nothing.
    async fn replace_family(&self, entities: &[T]) -> Result<()>;

    /// Drop every cached entity of the family.
    async fn clear_family(&self) -> Result<()>;

    /// Returns whether an entity was removed.
    async fn delete_by_id(&self, id: &str) -> Result<bool>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Song;

    #[test]
    fn test_filter_matches_scope_and_query() {
        let song = Song {
            album_id: Some("7".to_string()),
            artist_name: Some("Miles".to_string()),
            ..Song::new("1", "So What")
        };

        assert!(CacheFilter::all().matches(&song));
        assert!(CacheFilter::search("miles").matches(&song));
        assert!(!CacheFilter::search("coltrane").matches(&song));
        assert!(CacheFilter::scoped(Scope::Album("7".to_string())).matches(&song));
        assert!(!CacheFilter::scoped(Scope::Album("8".to_string())).matches(&song));
        assert!(!CacheFilter::scoped(Scope::Flagged).matches(&song));
        assert!(CacheFilter::ids(["1"]).with_query("so").matches(&song));
    }

    #[test]
    fn test_blank_query_normalizes_to_none() {
        assert_eq!(CacheFilter::search("   ").normalized_query(), None);
        assert_eq!(
            CacheFilter::search(" AbC ").normalized_query(),
            Some("abc".to_string())
        );
    }
}
