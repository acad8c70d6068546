//! # Catalog Sync Engine
//!
//! Keeps the local catalog cache in step with the remote server under a
//! cache-first discipline: every read is served from the cache, network
//! results are merged into the cache and re-read before they are shown, and
//! callers observe progress as a Loading / Success / Error stream.
//!
//! ## Components
//!
//! - **Resource Emitter** (`resource`): [`SyncResult`] and the cancellable
//!   [`ResourceStream`]
//! - **Remote Gateway** (`remote`): the network seam implemented by a
//!   provider crate
//! - **Sync Orchestrator** (`orchestrator`): the generic cache-first list
//!   algorithm, with adaptive fetch-all (`pagination`), multi-feed
//!   aggregation (`aggregate`) and mutation flows (`mutation`)
//! - **Family policy** (`policy`): what differs between families
//! - **Catalog** (`catalog`): per-family wrappers and cache purging

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod mutation;
pub mod orchestrator;
pub mod pagination;
pub mod policy;
pub mod remote;
pub mod resource;

pub use aggregate::Accumulator;
pub use catalog::{Catalog, CatalogCaches, CatalogEntity, CatalogRemotes};
pub use error::{Result, SyncError};
pub use orchestrator::{dedupe_by_id, ListRequest, SyncContext, SyncOrchestrator};
pub use pagination::{FetchAllRequest, Relation};
pub use policy::FamilyPolicy;
pub use remote::{
    DomainCode, FeedKind, ListFilter, Mutation, PageRequest, RemoteError, RemoteGateway,
    RemotePage, RemoteResult,
};
pub use resource::{channel, spawn_resource, Emitter, ResourceStream, SyncResult};
