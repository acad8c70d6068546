//! # Sync Orchestrator
//!
//! One generic fetch-cache-merge-reread engine, instantiated per entity
//! family with that family's Cache Gateway, Remote Gateway and
//! [`FamilyPolicy`].
//!
//! ## Operations
//!
//! - [`SyncOrchestrator::list`]: cache-first listing of one remote page
//! - [`SyncOrchestrator::fetch_all`]: adaptive paginated fetch of a whole
//!   listing (see `pagination`)
//! - [`SyncOrchestrator::aggregate`]: fan-out over several feeds (see
//!   `aggregate`)
//! - flag, rate and playlist edits (see `mutation`)
//!
//! Every operation runs as its own Tokio task and reports through a
//! [`ResourceStream`]. The offline flag is read once, when the operation is
//! started, and holds for its whole run.
//!
//! ## Usage
//!
//! ```ignore
//! let albums = SyncOrchestrator::new(album_cache, album_remote, context);
//! let mut stream = albums.list(ListRequest::search("abc", 0, true));
//! while let Some(result) = stream.next().await {
//!     render(result);
//! }
//! ```

use crate::error::{Result, SyncError};
use crate::policy::FamilyPolicy;
use crate::remote::{ListFilter, PageRequest, RemoteError, RemoteGateway};
use crate::resource::{spawn_resource, Emitter, ResourceStream};
use bridge_traits::network::OfflineModeProvider;
use core_auth::{Session, SessionManager};
use core_library::{CacheFilter, CacheGateway, Entity, EntityFamily, Scope};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Collaborators shared by every orchestrator.
#[derive(Clone)]
pub struct SyncContext {
    pub sessions: Arc<SessionManager>,
    pub offline: Arc<dyn OfflineModeProvider>,
    pub event_bus: EventBus,
    pub settings: SyncSettings,
}

impl SyncContext {
    pub fn new(
        sessions: Arc<SessionManager>,
        offline: Arc<dyn OfflineModeProvider>,
        event_bus: EventBus,
        settings: SyncSettings,
    ) -> Self {
        Self {
            sessions,
            offline,
            event_bus,
            settings,
        }
    }
}

/// Cache-first listing of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub query: String,
    pub offset: u32,
    pub fetch_remote: bool,
    pub cache_filter: CacheFilter,
    pub remote_filter: ListFilter,
}

impl ListRequest {
    /// Free-text search, or a browse of the whole family when `query` is
    /// blank.
    pub fn search(query: impl Into<String>, offset: u32, fetch_remote: bool) -> Self {
        let query = query.into();
        Self {
            cache_filter: CacheFilter::search(query.clone()),
            remote_filter: ListFilter::Search(query.clone()),
            query,
            offset,
            fetch_remote,
        }
    }

    /// Entities related to another entity, e.g. an album's songs.
    pub fn related(scope: Scope, remote_filter: ListFilter, fetch_remote: bool) -> Self {
        Self {
            query: String::new(),
            offset: 0,
            fetch_remote,
            cache_filter: CacheFilter::scoped(scope),
            remote_filter,
        }
    }

    pub fn is_browse(&self) -> bool {
        self.query.trim().is_empty()
    }

    /// First page of an unfiltered listing of the family.
    pub fn is_full_listing(&self) -> bool {
        self.offset == 0
            && matches!(&self.remote_filter, ListFilter::Search(query) if query.trim().is_empty())
    }
}

/// Bookkeeping for one running operation.
#[derive(Debug, Clone)]
pub(crate) struct Operation {
    pub id: String,
    pub kind: &'static str,
    pub family: EntityFamily,
    /// Snapshot of the offline flag taken when the call was made.
    pub offline: bool,
    started: Instant,
}

impl Operation {
    fn start(kind: &'static str, family: EntityFamily, offline: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            family,
            offline,
            started: Instant::now(),
        }
    }

    fn family_label(&self) -> String {
        self.family.as_str().to_string()
    }
}

/// How an operation ended on the non-error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    pub items: usize,
    /// Some data could not be fetched and the result was degraded.
    pub partial: bool,
}

impl Completion {
    pub fn full(items: usize) -> Self {
        Self {
            items,
            partial: false,
        }
    }

    pub fn partial(items: usize) -> Self {
        Self {
            items,
            partial: true,
        }
    }
}

pub struct SyncOrchestrator<T: Entity> {
    pub(crate) cache: Arc<dyn CacheGateway<T>>,
    pub(crate) remote: Arc<dyn RemoteGateway<T>>,
    pub(crate) ctx: SyncContext,
    pub(crate) policy: FamilyPolicy,
}

impl<T: Entity> Clone for SyncOrchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            remote: Arc::clone(&self.remote),
            ctx: self.ctx.clone(),
            policy: self.policy,
        }
    }
}

impl<T: Entity> SyncOrchestrator<T> {
    pub fn new(
        cache: Arc<dyn CacheGateway<T>>,
        remote: Arc<dyn RemoteGateway<T>>,
        ctx: SyncContext,
    ) -> Self {
        Self {
            cache,
            remote,
            ctx,
            policy: FamilyPolicy::for_family(T::FAMILY),
        }
    }

    pub fn with_policy(mut self, policy: FamilyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheGateway<T>> {
        &self.cache
    }

    pub fn policy(&self) -> FamilyPolicy {
        self.policy
    }

    /// Cache-first listing.
    ///
    /// Emits the cached matches first (for offset 0), then, unless the cache
    /// answered and `fetch_remote` is off or the app is offline, fetches one
    /// page, merges it and emits the cache re-read next to the page.
    pub fn list(&self, request: ListRequest) -> ResourceStream<Vec<T>> {
        self.launch("list", move |this, emitter, op| async move {
            this.run_list(&emitter, &op, request).await
        })
    }

    async fn run_list(
        &self,
        emitter: &Emitter<Vec<T>>,
        op: &Operation,
        request: ListRequest,
    ) -> Result<Completion> {
        let mut served_from_cache = false;

        if request.offset == 0 {
            let cached = self.cache.query(&request.cache_filter).await?;
            let cached_count = cached.len();

            if cached_count > 0 || !request.is_browse() {
                emitter.success(cached, None).await?;
                served_from_cache = true;
            }
            if cached_count > 0 && !request.fetch_remote {
                debug!(count = cached_count, "Served from cache only");
                return Ok(Completion::full(cached_count));
            }
        }

        if op.offline {
            debug!("Offline; skipping network");
            if !served_from_cache {
                emitter.success(Vec::new(), None).await?;
            }
            return Ok(Completion::full(0));
        }

        let session = self.session(emitter).await?;
        let page_request = PageRequest::new(
            request.remote_filter.clone(),
            request.offset,
            self.ctx.settings.page_size,
        );

        let page = match emitter
            .guard(self.remote.list_page(&session, &page_request))
            .await?
        {
            Ok(page) => page,
            Err(e) => return Err(self.remote_failure(&session, e).await),
        };

        self.publish(SyncEvent::PageFetched {
            operation_id: op.id.clone(),
            family: op.family_label(),
            offset: page_request.offset,
            limit: page_request.limit,
            count: page.items.len() as u32,
        });

        let items = self.prepare(page.items);
        let replace = request.is_full_listing() && self.policy.clear_before_refetch;
        self.merge(&items, replace).await?;

        let reread = self.cache.query(&request.cache_filter).await?;
        let count = items.len();
        emitter.success(reread, Some(items)).await?;
        Ok(Completion::full(count))
    }

    // -------------------------------------------------------------------------
    // Shared steps
    // -------------------------------------------------------------------------

    /// Spawn an operation: `Loading(true)`, the body, then `Loading(false)`
    /// or the body's error.
    pub(crate) fn launch<R, F, Fut>(&self, kind: &'static str, body: F) -> ResourceStream<R>
    where
        R: Send + 'static,
        F: FnOnce(Self, Emitter<R>, Operation) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Completion>> + Send + 'static,
    {
        let op = Operation::start(kind, T::FAMILY, self.ctx.offline.is_offline());
        let this = self.clone();
        let span = info_span!(
            "sync",
            family = %T::FAMILY,
            kind,
            operation_id = %op.id,
            offline = op.offline
        );

        spawn_resource(self.ctx.settings.channel_capacity, move |emitter| {
            async move {
                this.publish(SyncEvent::Started {
                    operation_id: op.id.clone(),
                    family: op.family_label(),
                    kind: kind.to_string(),
                    offline: op.offline,
                });

                let outcome = match emitter.loading(true).await {
                    Ok(()) => body(this.clone(), emitter.clone(), op.clone()).await,
                    Err(e) => Err(e),
                };

                match outcome {
                    Ok(completion) => {
                        let duration_ms = op.started.elapsed().as_millis() as u64;
                        info!(
                            items = completion.items,
                            partial = completion.partial,
                            duration_ms,
                            "Sync operation completed"
                        );
                        this.publish(SyncEvent::Completed {
                            operation_id: op.id.clone(),
                            family: op.family_label(),
                            items: completion.items as u64,
                            partial: completion.partial,
                            duration_ms,
                        });
                        if emitter.loading(false).await.is_err() {
                            debug!("Consumer left before completion");
                        }
                    }
                    Err(SyncError::Cancelled) => {
                        debug!("Sync operation cancelled by consumer");
                        this.publish(SyncEvent::Cancelled {
                            operation_id: op.id.clone(),
                            family: op.family_label(),
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Sync operation failed");
                        this.publish(SyncEvent::Failed {
                            operation_id: op.id.clone(),
                            family: op.family_label(),
                            message: e.to_string(),
                        });
                        emitter.fail(e).await;
                    }
                }
            }
            .instrument(span)
        })
    }

    /// A valid session, authenticating if needed. Cancellable.
    pub(crate) async fn session<R: Send + 'static>(&self, emitter: &Emitter<R>) -> Result<Session> {
        Ok(emitter
            .guard(self.ctx.sessions.ensure_valid_session(false))
            .await??)
    }

    /// Turn a remote failure into the operation's error, clearing the
    /// session and caches first when the server reports it expired.
    pub(crate) async fn remote_failure(&self, session: &Session, err: RemoteError) -> SyncError {
        if err.is_session_expired() {
            if let Err(e) = self.ctx.sessions.handle_session_expired(session).await {
                warn!(error = %e, "Failed to clear expired session");
            }
        }
        err.into()
    }

    /// Collapse duplicate ids when the family policy asks for it.
    pub(crate) fn prepare(&self, items: Vec<T>) -> Vec<T> {
        if self.policy.dedupe {
            dedupe_by_id(items)
        } else {
            items
        }
    }

    /// Validate the whole payload, then either replace the family or
    /// upsert into it. A malformed payload leaves the cache untouched.
    pub(crate) async fn merge(&self, items: &[T], replace: bool) -> Result<()> {
        for item in items {
            item.validate()?;
        }

        if replace {
            self.cache.replace_family(items).await?;
            self.publish_library(LibraryEvent::FamilyCleared {
                family: T::FAMILY.as_str().to_string(),
            });
        } else {
            self.cache.upsert_all(items).await?;
        }
        self.publish_library(LibraryEvent::EntitiesMerged {
            family: T::FAMILY.as_str().to_string(),
            count: items.len() as u32,
        });
        Ok(())
    }

    pub(crate) fn publish(&self, event: SyncEvent) {
        let _ = self.ctx.event_bus.emit(CoreEvent::Sync(event));
    }

    pub(crate) fn publish_library(&self, event: LibraryEvent) {
        let _ = self.ctx.event_bus.emit(CoreEvent::Library(event));
    }
}

/// Keep each id once, at its first position, with its last value.
pub fn dedupe_by_id<T: Entity>(items: Vec<T>) -> Vec<T> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        match positions.get(item.id()) {
            Some(&index) => unique[index] = item,
            None => {
                positions.insert(item.id().to_string(), unique.len());
                unique.push(item);
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::Album;

    #[test]
    fn test_dedupe_keeps_first_position_and_last_value() {
        let items = vec![
            Album::new("1", "One"),
            Album::new("2", "Two"),
            Album::new("1", "One (Remaster)"),
            Album::new("3", "Three"),
        ];
        let unique = dedupe_by_id(items);
        let ids: Vec<_> = unique.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(unique[0].name, "One (Remaster)");
    }

    #[test]
    fn test_list_request_shapes() {
        let browse = ListRequest::search("  ", 0, true);
        assert!(browse.is_browse());
        assert!(browse.is_full_listing());

        let paged = ListRequest::search("", 100, true);
        assert!(!paged.is_full_listing());

        let search = ListRequest::search("abc", 0, false);
        assert!(!search.is_browse());
        assert!(!search.is_full_listing());

        let related = ListRequest::related(
            Scope::Album("7".to_string()),
            ListFilter::Album("7".to_string()),
            true,
        );
        assert!(related.is_browse());
        assert!(!related.is_full_listing());
    }
}
