//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{SecureStore, StaticOfflineMode};
use core_auth::{
    AuthChallenge, Authenticator, Credentials, Session, SessionManager, SessionStore,
};
use core_library::{Album, Artist, Entity, Playlist, Song};
use core_runtime::config::SyncSettings;
use core_runtime::events::EventBus;
use core_sync::{
    Catalog, CatalogCaches, CatalogRemotes, Mutation, PageRequest, RemoteError, RemoteGateway,
    RemotePage, RemoteResult, ResourceStream, SyncContext, SyncResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

// ============================================================================
// Mock Implementations
// ============================================================================

#[derive(Default)]
pub struct MockSecureStore {
    storage: AsyncMutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for MockSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.storage
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.storage.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.storage.lock().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.storage.lock().await.clear();
        Ok(())
    }
}

/// Issues `token-1`, `token-2`, ... valid for one hour.
#[derive(Default)]
pub struct CountingAuthenticator {
    handshakes: AtomicUsize,
}

impl CountingAuthenticator {
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    async fn handshake(
        &self,
        _server_url: &str,
        _challenge: &AuthChallenge,
    ) -> core_auth::Result<Session> {
        let n = self.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::with_lifetime(
            format!("token-{}", n),
            chrono::Utc::now(),
            chrono::Duration::hours(1),
        ))
    }
}

type ListHandler<T> = Box<dyn Fn(&PageRequest) -> RemoteResult<RemotePage<T>> + Send + Sync>;
type FetchHandler<T> = Box<dyn Fn(&str) -> RemoteResult<T> + Send + Sync>;
type MutateHandler = Box<dyn Fn(&str, &Mutation) -> RemoteResult<bool> + Send + Sync>;
type DelayHandler = Box<dyn Fn(&PageRequest) -> Duration + Send + Sync>;

/// Remote gateway driven by per-test closures. Records every call.
pub struct ScriptedRemote<T> {
    list: AsyncMutex<ListHandler<T>>,
    fetch: AsyncMutex<FetchHandler<T>>,
    mutate: AsyncMutex<MutateHandler>,
    delay: AsyncMutex<DelayHandler>,
    list_calls: AsyncMutex<Vec<PageRequest>>,
    mutations: AsyncMutex<Vec<(String, Mutation)>>,
    tokens: AsyncMutex<Vec<String>>,
}

impl<T: Entity> ScriptedRemote<T> {
    pub fn new() -> Self {
        Self {
            list: AsyncMutex::new(Box::new(|_| Ok(RemotePage::new(Vec::new())))),
            fetch: AsyncMutex::new(Box::new(|id| {
                Err(RemoteError::domain(
                    core_sync::DomainCode::NotFound,
                    format!("{} not found", id),
                ))
            })),
            mutate: AsyncMutex::new(Box::new(|_, _| Ok(true))),
            delay: AsyncMutex::new(Box::new(|_| Duration::ZERO)),
            list_calls: AsyncMutex::new(Vec::new()),
            mutations: AsyncMutex::new(Vec::new()),
            tokens: AsyncMutex::new(Vec::new()),
        }
    }

    pub async fn on_list<F>(&self, handler: F)
    where
        F: Fn(&PageRequest) -> RemoteResult<RemotePage<T>> + Send + Sync + 'static,
    {
        *self.list.lock().await = Box::new(handler);
    }

    /// Always answer listings with `items`.
    pub async fn returns(&self, items: Vec<T>) {
        self.on_list(move |_| Ok(RemotePage::new(items.clone()))).await;
    }

    pub async fn on_fetch<F>(&self, handler: F)
    where
        F: Fn(&str) -> RemoteResult<T> + Send + Sync + 'static,
    {
        *self.fetch.lock().await = Box::new(handler);
    }

    pub async fn on_mutate<F>(&self, handler: F)
    where
        F: Fn(&str, &Mutation) -> RemoteResult<bool> + Send + Sync + 'static,
    {
        *self.mutate.lock().await = Box::new(handler);
    }

    pub async fn delay_with<F>(&self, delay: F)
    where
        F: Fn(&PageRequest) -> Duration + Send + Sync + 'static,
    {
        *self.delay.lock().await = Box::new(delay);
    }

    pub async fn list_calls(&self) -> Vec<PageRequest> {
        self.list_calls.lock().await.clone()
    }

    pub async fn mutations(&self) -> Vec<(String, Mutation)> {
        self.mutations.lock().await.clone()
    }

    pub async fn tokens(&self) -> Vec<String> {
        self.tokens.lock().await.clone()
    }
}

#[async_trait]
impl<T: Entity> RemoteGateway<T> for ScriptedRemote<T> {
    async fn list_page(
        &self,
        session: &Session,
        request: &PageRequest,
    ) -> RemoteResult<RemotePage<T>> {
        self.list_calls.lock().await.push(request.clone());
        self.tokens.lock().await.push(session.token().to_string());

        let delay = (self.delay.lock().await)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.list.lock().await)(request)
    }

    async fn fetch_one(&self, session: &Session, id: &str) -> RemoteResult<T> {
        self.tokens.lock().await.push(session.token().to_string());
        (self.fetch.lock().await)(id)
    }

    async fn mutate(
        &self,
        session: &Session,
        target: &str,
        mutation: &Mutation,
    ) -> RemoteResult<bool> {
        self.tokens.lock().await.push(session.token().to_string());
        self.mutations
            .lock()
            .await
            .push((target.to_string(), mutation.clone()));
        (self.mutate.lock().await)(target, mutation)
    }
}

/// Serve `all` page by page, failing with a network error whenever the
/// requested page is larger than `max_ok`.
pub fn paged<T: Clone>(
    all: Vec<T>,
    max_ok: u32,
) -> impl Fn(&PageRequest) -> RemoteResult<RemotePage<T>> + Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    move |request: &PageRequest| {
        if request.limit > max_ok {
            return Err(RemoteError::Network(format!(
                "timeout for page of {}",
                request.limit
            )));
        }
        let start = (request.offset as usize).min(all.len());
        let end = (start + request.limit as usize).min(all.len());
        Ok(RemotePage::new(all[start..end].to_vec()))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub catalog: Catalog,
    pub caches: CatalogCaches,
    pub albums: Arc<ScriptedRemote<Album>>,
    pub artists: Arc<ScriptedRemote<Artist>>,
    pub playlists: Arc<ScriptedRemote<Playlist>>,
    pub songs: Arc<ScriptedRemote<Song>>,
    pub authenticator: Arc<CountingAuthenticator>,
    pub sessions: Arc<SessionManager>,
    pub offline: Arc<StaticOfflineMode>,
    pub event_bus: EventBus,
}

impl Harness {
    /// Signed-in harness with default settings.
    pub async fn new() -> Self {
        Self::with_settings(SyncSettings::default()).await
    }

    pub async fn with_settings(settings: SyncSettings) -> Self {
        let harness = Self::signed_out(settings);
        harness
            .sessions
            .sign_in(Credentials::with_password(
                "https://music.example.com",
                "ann",
                "hunter2",
            ))
            .await
            .expect("sign in");
        harness
    }

    /// Harness without stored credentials.
    pub fn signed_out(settings: SyncSettings) -> Self {
        let event_bus = EventBus::new(256);
        let caches = CatalogCaches::in_memory(event_bus.clone());

        let authenticator = Arc::new(CountingAuthenticator::default());
        let store = Arc::new(
            SessionStore::new(Arc::new(MockSecureStore::default()))
                .with_invalidator(Arc::new(caches.clone())),
        );
        let sessions = Arc::new(SessionManager::new(
            store,
            authenticator.clone(),
            event_bus.clone(),
        ));

        let albums = Arc::new(ScriptedRemote::new());
        let artists = Arc::new(ScriptedRemote::new());
        let playlists = Arc::new(ScriptedRemote::new());
        let songs = Arc::new(ScriptedRemote::new());
        let remotes = CatalogRemotes {
            albums: albums.clone(),
            artists: artists.clone(),
            playlists: playlists.clone(),
            songs: songs.clone(),
        };

        let offline = Arc::new(StaticOfflineMode::new(false));
        let ctx = SyncContext::new(sessions.clone(), offline.clone(), event_bus.clone(), settings);
        let catalog = Catalog::new(&caches, remotes, ctx);

        Self {
            catalog,
            caches,
            albums,
            artists,
            playlists,
            songs,
            authenticator,
            sessions,
            offline,
            event_bus,
        }
    }
}

// ============================================================================
// Assertions
// ============================================================================

/// Drain a stream, failing the test if it does not finish promptly.
pub async fn collect<T: Send + 'static>(stream: ResourceStream<T>) -> Vec<SyncResult<T>> {
    tokio::time::timeout(Duration::from_secs(10), stream.collect_all())
        .await
        .expect("stream did not finish")
}

/// `Loading(true)` first; then successes; then one `Error` or a final
/// `Loading(false)`, and nothing after it.
pub fn assert_emission_contract<T: std::fmt::Debug>(results: &[SyncResult<T>]) {
    assert!(
        matches!(results.first(), Some(SyncResult::Loading(true))),
        "first emission must be Loading(true): {:?}",
        results
    );
    let last = results.len() - 1;
    for (index, result) in results.iter().enumerate().skip(1) {
        match result {
            SyncResult::Success { .. } => assert!(index < last, "success cannot be terminal"),
            SyncResult::Loading(false) | SyncResult::Error { .. } => {
                assert_eq!(index, last, "terminal emission must be last: {:?}", results)
            }
            SyncResult::Loading(true) => panic!("Loading(true) emitted twice: {:?}", results),
        }
    }
}

pub fn successes<T: Clone>(results: &[SyncResult<T>]) -> Vec<(T, Option<T>)> {
    results
        .iter()
        .filter_map(|result| match result {
            SyncResult::Success {
                cache_data,
                network_data,
            } => Some((cache_data.clone(), network_data.clone())),
            _ => None,
        })
        .collect()
}

pub fn error_of<T>(results: &[SyncResult<T>]) -> Option<&core_sync::SyncError> {
    results.last().and_then(|result| result.cause())
}

pub fn ids<T: Entity>(items: &[T]) -> Vec<String> {
    items.iter().map(|item| item.id().to_string()).collect()
}
