//! Adaptive paginated fetch-all
//!
//! Pages through a whole remote listing with a running `limit` and
//! `offset`. A page that fails at the transport level halves `limit` and is
//! retried; the loop ends on an empty or short page, when the offset
//! reaches the server-reported total, on a failure at the minimum page size,
//! or at the iteration cap. Whatever was collected before a failure is still
//! merged, so a full fetch degrades to a partial one rather than failing.

use crate::error::{Result, SyncError};
use crate::orchestrator::{Completion, Operation, SyncOrchestrator};
use crate::remote::{ListFilter, PageRequest, RemoteError};
use crate::resource::{Emitter, ResourceStream};
use async_trait::async_trait;
use core_auth::Session;
use core_library::{CacheFilter, Entity};
use core_runtime::events::SyncEvent;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Links a fetched listing to another entity's cached record, e.g. the
/// songs of a playlist to the playlist's song id list.
#[async_trait]
pub trait Relation: Send + Sync {
    /// Cache filter addressing the related entities.
    async fn cache_filter(&self) -> core_library::Result<CacheFilter>;

    /// Record the ids of a complete listing, in network order.
    async fn record(&self, ids: Vec<String>) -> core_library::Result<()>;
}

#[derive(Clone)]
pub struct FetchAllRequest {
    pub query: String,
    pub fetch_remote: bool,
    pub cache_filter: CacheFilter,
    pub remote_filter: ListFilter,
    pub relation: Option<Arc<dyn Relation>>,
}

impl FetchAllRequest {
    pub fn search(query: impl Into<String>, fetch_remote: bool) -> Self {
        let query = query.into();
        Self {
            cache_filter: CacheFilter::search(query.clone()),
            remote_filter: ListFilter::Search(query.clone()),
            query,
            fetch_remote,
            relation: None,
        }
    }

    pub fn related(
        relation: Arc<dyn Relation>,
        remote_filter: ListFilter,
        fetch_remote: bool,
    ) -> Self {
        Self {
            query: String::new(),
            fetch_remote,
            cache_filter: CacheFilter::all(),
            remote_filter,
            relation: Some(relation),
        }
    }

    pub fn is_browse(&self) -> bool {
        self.query.trim().is_empty()
    }

    fn is_full_listing(&self) -> bool {
        self.relation.is_none()
            && matches!(&self.remote_filter, ListFilter::Search(query) if query.trim().is_empty())
    }
}

/// Result of one pagination run.
#[derive(Debug)]
pub(crate) struct PageRun<T> {
    pub items: Vec<T>,
    /// The listing ended by one of its natural termination conditions.
    pub complete: bool,
    /// Failure that stopped the loop early, if any.
    pub failure: Option<RemoteError>,
}

impl<T: Entity> SyncOrchestrator<T> {
    /// Fetch every page of a listing, shrinking the page size on failure.
    pub fn fetch_all(&self, request: FetchAllRequest) -> ResourceStream<Vec<T>> {
        self.launch("fetch_all", move |this, emitter, op| async move {
            this.run_fetch_all(&emitter, &op, request).await
        })
    }

    async fn run_fetch_all(
        &self,
        emitter: &Emitter<Vec<T>>,
        op: &Operation,
        request: FetchAllRequest,
    ) -> Result<Completion> {
        let cache_filter = match &request.relation {
            Some(relation) => relation.cache_filter().await?,
            None => request.cache_filter.clone(),
        };

        let cached = self.cache.query(&cache_filter).await?;
        let cached_count = cached.len();
        let mut served_from_cache = false;
        if cached_count > 0 || !request.is_browse() {
            emitter.success(cached, None).await?;
            served_from_cache = true;
        }
        if cached_count > 0 && !request.fetch_remote {
            return Ok(Completion::full(cached_count));
        }

        if op.offline {
            if !served_from_cache {
                emitter.success(Vec::new(), None).await?;
            }
            return Ok(Completion::full(0));
        }

        let session = self.session(emitter).await?;
        let run = self
            .paginate(emitter, op, &session, &request.remote_filter)
            .await?;

        if let Some(failure) = &run.failure {
            if failure.is_session_expired() {
                return Err(self.remote_failure(&session, failure.clone()).await);
            }
        }

        let items = self.prepare(run.items);
        if !items.is_empty() || run.failure.is_none() {
            let replace =
                run.complete && request.is_full_listing() && self.policy.clear_before_refetch;
            self.merge(&items, replace).await?;

            if run.complete {
                if let Some(relation) = &request.relation {
                    let ids = items.iter().map(|item| item.id().to_string()).collect();
                    relation.record(ids).await?;
                }
            }

            let reread_filter = CacheFilter::ids(items.iter().map(|item| item.id().to_string()));
            let reread = self.cache.query(&reread_filter).await?;
            emitter.success(reread, Some(items.clone())).await?;
        }

        match run.failure {
            None if run.complete => Ok(Completion::full(items.len())),
            None => Ok(Completion::partial(items.len())),
            Some(RemoteError::Network(message)) if !items.is_empty() => {
                warn!(
                    collected = items.len(),
                    error = %message,
                    "Fetch-all degraded to a partial listing"
                );
                Ok(Completion::partial(items.len()))
            }
            Some(failure) => Err(SyncError::from(failure)),
        }
    }

    /// The adaptive page loop. Never merges; only collects.
    pub(crate) async fn paginate(
        &self,
        emitter: &Emitter<Vec<T>>,
        op: &Operation,
        session: &Session,
        filter: &ListFilter,
    ) -> Result<PageRun<T>> {
        let settings = &self.ctx.settings;
        let min_limit = settings.min_page_size.max(1);
        let mut limit = settings.fetch_all_page_size.max(min_limit);
        let mut offset: u32 = 0;
        let mut items: Vec<T> = Vec::new();

        for iteration in 1..=settings.max_fetch_iterations {
            let request = PageRequest::new(filter.clone(), offset, limit);

            match emitter.guard(self.remote.list_page(session, &request)).await? {
                Ok(page) => {
                    let count = page.items.len() as u32;
                    self.publish(SyncEvent::PageFetched {
                        operation_id: op.id.clone(),
                        family: op.family.as_str().to_string(),
                        offset,
                        limit,
                        count,
                    });
                    debug!(iteration, offset, limit, count, "Fetched page");

                    offset += count;
                    items.extend(page.items);

                    let exhausted = page.total.is_some_and(|total| offset >= total);
                    if count == 0 || count < limit || exhausted {
                        return Ok(PageRun {
                            items,
                            complete: true,
                            failure: None,
                        });
                    }
                }
                Err(RemoteError::Network(message)) => {
                    if limit <= min_limit {
                        warn!(limit, error = %message, "Page failed at minimum size");
                        return Ok(PageRun {
                            items,
                            complete: false,
                            failure: Some(RemoteError::Network(message)),
                        });
                    }

                    let reduced = (limit / 2).max(min_limit);
                    info!(from = limit, to = reduced, error = %message, "Reducing page size");
                    self.publish(SyncEvent::PageSizeReduced {
                        operation_id: op.id.clone(),
                        family: op.family.as_str().to_string(),
                        from: limit,
                        to: reduced,
                    });
                    limit = reduced;
                }
                Err(failure) => {
                    warn!(offset, error = %failure, "Page failed with a server error");
                    return Ok(PageRun {
                        items,
                        complete: false,
                        failure: Some(failure),
                    });
                }
            }
        }

        warn!(
            iterations = settings.max_fetch_iterations,
            collected = items.len(),
            "Fetch-all hit the iteration cap"
        );
        Ok(PageRun {
            items,
            complete: false,
            failure: None,
        })
    }
}
