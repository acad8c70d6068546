//! In-memory cache gateway, used when no database path is configured and
//! throughout the test suites.

use crate::error::Result;
use crate::gateway::{CacheFilter, CacheGateway, Scope};
use crate::models::Entity;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

struct State<T> {
    /// Ids in first-insertion order.
    order: Vec<String>,
    items: HashMap<String, T>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            items: HashMap::new(),
        }
    }
}

/// Insertion-ordered map guarded by an async `RwLock`. Writes take the write
/// lock for the whole batch, so a batch is never observed half-applied.
pub struct InMemoryCache<T> {
    state: RwLock<State<T>>,
}

impl<T: Entity> InMemoryCache<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T: Entity> Default for InMemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> CacheGateway<T> for InMemoryCache<T> {
    async fn query(&self, filter: &CacheFilter) -> Result<Vec<T>> {
        let state = self.state.read().await;

        if let Scope::Ids(ids) = &filter.scope {
            let mut seen = HashSet::new();
            return Ok(ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .filter_map(|id| state.items.get(id))
                .filter(|entity| filter.matches(*entity))
                .cloned()
                .collect());
        }

        Ok(state
            .order
            .iter()
            .filter_map(|id| state.items.get(id))
            .filter(|entity| filter.matches(*entity))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        Ok(self.state.read().await.items.get(id).cloned())
    }

    async fn upsert_all(&self, entities: &[T]) -> Result<()> {
        for entity in entities {
            entity.validate()?;
        }

        let mut state = self.state.write().await;
        for entity in entities {
            let mut incoming = entity.clone();
            match state.items.get(entity.id()) {
                Some(cached) => incoming.retain_local(cached),
                None => state.order.push(entity.id().to_string()),
            }
            state.items.insert(entity.id().to_string(), incoming);
        }

        debug!(family = %T::FAMILY, count = entities.len(), "Upserted into memory cache");
        Ok(())
    }

    async fn replace_family(&self, entities: &[T]) -> Result<()> {
        for entity in entities {
            entity.validate()?;
        }

        let mut state = self.state.write().await;
        let previous = std::mem::take(&mut *state);
        for entity in entities {
            let mut incoming = entity.clone();
            if let Some(cached) = previous.items.get(entity.id()) {
                incoming.retain_local(cached);
            }
            if !state.items.contains_key(entity.id()) {
                state.order.push(entity.id().to_string());
            }
            state.items.insert(entity.id().to_string(), incoming);
        }

        debug!(
            family = %T::FAMILY,
            removed = previous.order.len(),
            stored = state.order.len(),
            "Replaced memory cache family"
        );
        Ok(())
    }

    async fn clear_family(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.order.clear();
        state.items.clear();
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.items.remove(id).is_none() {
            return Ok(false);
        }
        state.order.retain(|existing| existing != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::conformance;
    use crate::models::{Album, Playlist, Song};

    #[tokio::test]
    async fn test_insertion_order_and_upsert() {
        conformance::insertion_order_and_upsert(&InMemoryCache::<Album>::new()).await;
    }

    #[tokio::test]
    async fn test_idempotent_merge() {
        conformance::idempotent_merge(&InMemoryCache::<Album>::new()).await;
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_batch() {
        conformance::duplicate_ids_in_batch(&InMemoryCache::<Album>::new()).await;
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        conformance::search_is_case_insensitive(&InMemoryCache::<Album>::new()).await;
    }

    #[tokio::test]
    async fn test_ids_scope_follows_requested_order() {
        conformance::ids_scope_follows_requested_order(&InMemoryCache::<Album>::new()).await;
    }

    #[tokio::test]
    async fn test_relation_and_flag_scopes() {
        conformance::relation_and_flag_scopes(&InMemoryCache::<Song>::new()).await;
    }

    #[tokio::test]
    async fn test_malformed_batch_is_rejected() {
        conformance::malformed_batch_is_rejected(&InMemoryCache::<Album>::new()).await;
    }

    #[tokio::test]
    async fn test_retain_local_applies() {
        conformance::retain_local_applies(&InMemoryCache::<Playlist>::new()).await;
    }

    #[tokio::test]
    async fn test_replace_keeps_local_state() {
        conformance::replace_keeps_local_state(&InMemoryCache::<Playlist>::new()).await;
    }

    #[tokio::test]
    async fn test_clear_and_delete() {
        let cache = InMemoryCache::<Album>::new();
        conformance::clear_and_delete(&cache).await;
        assert_eq!(cache.len().await, 2);
    }
}
