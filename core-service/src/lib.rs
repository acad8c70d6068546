//! Core service façade and bootstrap.
//!
//! [`CoreService::new`] turns a validated [`CoreConfig`] into a running
//! engine: the family caches (SQLite when a database path is configured,
//! in memory otherwise), the offline switch, the session store and manager,
//! the Ampache gateways and the [`Catalog`] that host applications call.
//!
//! ```ignore
//! use core_runtime::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .server_url("https://music.example.com")
//!     .database_path("/var/lib/catalog/cache.db")
//!     .build()?;
//! let core = CoreService::new(config).await?;
//! let mut albums = core.catalog().albums("", 0, true);
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{Credentials, Session, SessionManager};
pub use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use core_runtime::{CoreConfig, CoreEvent, EventBus, OfflineMode};
pub use core_sync::{Catalog, ResourceStream, SyncResult};

use bridge_traits::OfflineModeProvider;
use core_auth::SessionStore;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{Album, Artist, Playlist, Song, SqliteCacheStore};
use core_sync::{CatalogCaches, SyncContext};
use provider_ampache::{AmpacheAuthenticator, AmpacheClient};
use std::sync::Arc;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    catalog: Arc<Catalog>,
    sessions: Arc<SessionManager>,
    offline: Arc<OfflineMode>,
    event_bus: EventBus,
    caches: CatalogCaches,
}

impl CoreService {
    /// Build every component from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the cache database cannot
    /// be opened.
    #[instrument(skip(config), fields(server = %config.server_url))]
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::default();
        let caches = build_caches(&config, &event_bus).await?;

        let offline = Arc::new(match &config.settings_store {
            Some(settings) => OfflineMode::load(settings.clone(), config.start_offline).await,
            None => OfflineMode::new(config.start_offline),
        });

        let store = Arc::new(
            SessionStore::new(config.secure_store.clone())
                .with_invalidator(Arc::new(caches.clone())),
        );

        let client = Arc::new(
            AmpacheClient::new(config.http_client.clone())
                .with_timeout(config.auth.timeout)
                .with_user_agent(config.auth.client_name.clone()),
        );
        let fallback_lifetime = chrono::Duration::from_std(config.auth.session_lifetime)
            .map_err(|e| CoreError::InitializationFailed(format!("session lifetime: {}", e)))?;
        let authenticator = AmpacheAuthenticator::new(client.clone())
            .with_api_version(config.auth.api_version.clone())
            .with_fallback_lifetime(fallback_lifetime);

        let sessions = Arc::new(
            SessionManager::new(store, Arc::new(authenticator), event_bus.clone())
                .with_timeout(config.auth.timeout),
        );

        let ctx = SyncContext::new(
            sessions.clone(),
            offline.clone(),
            event_bus.clone(),
            config.sync.clone(),
        );
        let remotes = provider_ampache::catalog_remotes(client, &config.server_url);
        let catalog = Arc::new(Catalog::new(&caches, remotes, ctx));

        info!(offline = offline.is_offline(), "Core service ready");
        Ok(Self {
            catalog,
            sessions,
            offline,
            event_bus,
            caches,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn offline_mode(&self) -> &Arc<OfflineMode> {
        &self.offline
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Handshake with `credentials` and persist the new session.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<Session> {
        Ok(self.sessions.sign_in(credentials).await?)
    }

    /// End the session on the server and forget it locally.
    pub async fn sign_out(&self) -> Result<()> {
        Ok(self.sessions.sign_out().await?)
    }

    pub async fn set_offline(&self, offline: bool) -> Result<()> {
        Ok(self.offline.set_offline(offline).await?)
    }

    /// Drop every cached entity.
    pub async fn clear_cache(&self) -> Result<()> {
        Ok(self.caches.clear_all().await?)
    }
}

async fn build_caches(config: &CoreConfig, event_bus: &EventBus) -> Result<CatalogCaches> {
    let Some(path) = &config.database_path else {
        info!("No database path configured; caching in memory");
        return Ok(CatalogCaches::in_memory(event_bus.clone()));
    };

    let pool = create_pool(DatabaseConfig::new(path.clone())).await?;
    let store = SqliteCacheStore::new(pool);
    Ok(CatalogCaches::new(
        Arc::new(store.family::<Album>()),
        Arc::new(store.family::<Artist>()),
        Arc::new(store.family::<Playlist>()),
        Arc::new(store.family::<Song>()),
        event_bus.clone(),
    ))
}
