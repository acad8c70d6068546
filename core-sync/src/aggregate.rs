//! Multi-feed aggregation
//!
//! Fans out to several remote listings at once. Each feed is independent:
//! a failing feed is logged and skipped. Results are folded into one
//! id-deduplicated accumulator in order of completion, and the accumulator
//! is emitted after every feed so callers see results as they arrive.

use crate::error::{Result, SyncError};
use crate::orchestrator::{Completion, Operation, SyncOrchestrator};
use crate::remote::{ListFilter, PageRequest, RemoteError};
use crate::resource::{Emitter, ResourceStream};
use core_library::{CacheFilter, Entity};
use core_runtime::events::SyncEvent;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Insertion-ordered, id-deduplicated fold target.
///
/// A repeated id keeps the position where it was first seen and takes the
/// newest value.
#[derive(Debug, Clone)]
pub struct Accumulator<T> {
    items: Vec<T>,
    positions: HashMap<String, usize>,
    dedupe: bool,
}

impl<T: Entity> Accumulator<T> {
    pub fn new(dedupe: bool) -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
            dedupe,
        }
    }

    pub fn extend(&mut self, batch: impl IntoIterator<Item = T>) {
        for item in batch {
            if !self.dedupe {
                self.items.push(item);
                continue;
            }
            match self.positions.get(item.id()) {
                Some(&index) => self.items[index] = item,
                None => {
                    self.positions.insert(item.id().to_string(), self.items.len());
                    self.items.push(item);
                }
            }
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: Entity> SyncOrchestrator<T> {
    /// Aggregate several remote listings into one deduplicated result.
    ///
    /// Offline, the first `feed_size` cached entities are served instead.
    pub fn aggregate(&self, feeds: Vec<ListFilter>) -> ResourceStream<Vec<T>> {
        self.launch("aggregate", move |this, emitter, op| async move {
            this.run_aggregate(&emitter, &op, feeds).await
        })
    }

    async fn run_aggregate(
        &self,
        emitter: &Emitter<Vec<T>>,
        op: &Operation,
        feeds: Vec<ListFilter>,
    ) -> Result<Completion> {
        let feed_size = self.ctx.settings.feed_size;

        if op.offline {
            let cached: Vec<T> = self
                .cache
                .query(&CacheFilter::all())
                .await?
                .into_iter()
                .take(feed_size as usize)
                .collect();
            let count = cached.len();
            emitter.success(cached, None).await?;
            return Ok(Completion::full(count));
        }

        let session = self.session(emitter).await?;
        let total_feeds = feeds.len();

        let mut pending: FuturesUnordered<_> = feeds
            .into_iter()
            .map(|filter| {
                let session = &session;
                async move {
                    let request = PageRequest::new(filter, 0, feed_size);
                    let result = self.remote.list_page(session, &request).await;
                    (request.filter, result)
                }
            })
            .collect();

        let mut accumulator = Accumulator::new(self.policy.dedupe);
        let mut failures: Vec<RemoteError> = Vec::new();

        while let Some((filter, result)) = emitter.guard(pending.next()).await? {
            match result {
                Ok(page) => {
                    debug!(feed = %filter.label(), count = page.items.len(), "Feed completed");
                    self.publish(SyncEvent::PageFetched {
                        operation_id: op.id.clone(),
                        family: op.family.as_str().to_string(),
                        offset: 0,
                        limit: feed_size,
                        count: page.items.len() as u32,
                    });
                    accumulator.extend(page.items);
                    let snapshot = accumulator.items().to_vec();
                    emitter.success(snapshot.clone(), Some(snapshot)).await?;
                }
                Err(e) => {
                    warn!(feed = %filter.label(), error = %e, "Feed failed; continuing");
                    failures.push(e);
                }
            }
        }
        drop(pending);

        if let Some(expired) = failures.iter().find(|e| e.is_session_expired()) {
            return Err(self.remote_failure(&session, expired.clone()).await);
        }

        if accumulator.is_empty() && !failures.is_empty() && failures.len() == total_feeds {
            return Err(failures
                .pop()
                .map(SyncError::from)
                .unwrap_or_else(|| SyncError::Network("all feeds failed".to_string())));
        }

        self.merge(accumulator.items(), false).await?;
        let reread = self.cache.query(&CacheFilter::ids(accumulator.ids())).await?;
        let count = accumulator.len();
        emitter
            .success(reread, Some(accumulator.into_items()))
            .await?;

        Ok(if failures.is_empty() {
            Completion::full(count)
        } else {
            Completion::partial(count)
        })
    }
}
