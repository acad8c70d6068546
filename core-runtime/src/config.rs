//! # Core Configuration Module
//!
//! Builder-based configuration for the catalog sync engine.
//!
//! ## Overview
//!
//! `CoreConfig` holds the host capabilities (HTTP, secure storage, settings)
//! and the tunables of the sync and auth layers. `build()` fails fast with an
//! actionable message when a required piece is missing or a value is out of
//! range.
//!
//! ## Required Dependencies
//!
//! - `server_url` - Base URL of the catalog server
//! - `SecureStore` - Session and credential persistence
//! - `HttpClient` - Network transport
//!
//! With the `desktop-shims` feature, `SecureStore` defaults to the OS keychain
//! and `HttpClient` to reqwest.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//!
//! let config = CoreConfig::builder()
//!     .server_url("https://music.example.com")
//!     .database_path("/var/lib/catalog/cache.db")
//!     .sync(SyncSettings { page_size: 50, ..SyncSettings::default() })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, SecureStore, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Page size for cache-first list browsing.
    pub page_size: u32,
    /// Initial page size for adaptive fetch-all.
    pub fetch_all_page_size: u32,
    /// Floor for adaptive halving. A failure at this size stops the loop.
    pub min_page_size: u32,
    /// Hard cap on page requests in one fetch-all run, retries included.
    pub max_fetch_iterations: u32,
    /// Items requested from each discovery feed.
    pub feed_size: u32,
    /// Buffered emissions per resource stream.
    pub channel_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            fetch_all_page_size: 500,
            min_page_size: 1,
            max_fetch_iterations: 64,
            feed_size: 50,
            channel_capacity: 32,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("page_size", self.page_size),
            ("fetch_all_page_size", self.fetch_all_page_size),
            ("min_page_size", self.min_page_size),
            ("max_fetch_iterations", self.max_fetch_iterations),
            ("feed_size", self.feed_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!(
                    "sync.{} must be greater than 0",
                    name
                )));
            }
        }

        if self.min_page_size > self.fetch_all_page_size {
            return Err(Error::Config(format!(
                "sync.min_page_size ({}) cannot exceed sync.fetch_all_page_size ({})",
                self.min_page_size, self.fetch_all_page_size
            )));
        }

        if self.channel_capacity < 4 {
            return Err(Error::Config(format!(
                "sync.channel_capacity must be at least 4, got {}",
                self.channel_capacity
            )));
        }

        Ok(())
    }
}

/// Tunables for the authentication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    /// Upper bound for a single handshake.
    pub timeout: Duration,
    /// Session lifetime assumed when the server does not report an expiry.
    pub session_lifetime: Duration,
    /// API version announced during the handshake.
    pub api_version: String,
    /// Client name announced during the handshake.
    pub client_name: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            session_lifetime: Duration::from_secs(60 * 60),
            api_version: "6.6.1".to_string(),
            client_name: "catalog-sync".to_string(),
        }
    }
}

impl AuthSettings {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("auth.timeout must be non-zero".to_string()));
        }
        if self.session_lifetime.is_zero() {
            return Err(Error::Config(
                "auth.session_lifetime must be non-zero".to_string(),
            ));
        }
        if self.api_version.trim().is_empty() || self.client_name.trim().is_empty() {
            return Err(Error::Config(
                "auth.api_version and auth.client_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validated engine configuration.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL of the catalog server (http or https).
    pub server_url: String,
    /// SQLite cache file. `None` keeps the cache in memory.
    pub database_path: Option<PathBuf>,
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    /// Persists the offline switch when present.
    pub settings_store: Option<Arc<dyn SettingsStore>>,
    pub sync: SyncSettings,
    pub auth: AuthSettings,
    /// Offline value used when no persisted value exists.
    pub start_offline: bool,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("server_url", &self.server_url)
            .field("database_path", &self.database_path)
            .field("http_client", &"<HttpClient>")
            .field("secure_store", &"<SecureStore>")
            .field(
                "settings_store",
                &self.settings_store.as_ref().map(|_| "<SettingsStore>"),
            )
            .field("sync", &self.sync)
            .field("auth", &self.auth)
            .field("start_offline", &self.start_offline)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The server URL is an http(s) URL
    /// - The database path, when set, is not empty
    /// - Sync and auth tunables are in range
    pub fn validate(&self) -> Result<()> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(Error::Config("Server URL cannot be empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Server URL must start with http:// or https://, got '{}'",
                url
            )));
        }

        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Database path cannot be empty. Omit it to keep the cache in memory."
                        .to_string(),
                ));
            }
        }

        self.sync.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for session persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
                 Other hosts: inject platform-native secure storage."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(auth: &AuthSettings) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(auth.timeout)?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_auth: &AuthSettings) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the catalog server. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP client."
            .to_string(),
    })
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    server_url: Option<String>,
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    sync: Option<SyncSettings>,
    auth: Option<AuthSettings>,
    start_offline: bool,
}

impl CoreConfigBuilder {
    /// Base URL of the catalog server.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Persist the cache in a SQLite file at `path`.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Settings store used to persist the offline switch.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn sync(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn auth(mut self, settings: AuthSettings) -> Self {
        self.auth = Some(settings);
        self
    }

    /// Start in offline mode unless a persisted value says otherwise.
    pub fn start_offline(mut self, offline: bool) -> Self {
        self.start_offline = offline;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the server URL is missing or a value is out of range
    /// - [`Error::CapabilityMissing`] when a required bridge has no default
    pub fn build(self) -> Result<CoreConfig> {
        let server_url = self.server_url.ok_or_else(|| {
            Error::Config("Server URL is required. Use .server_url() to set it.".to_string())
        })?;

        let auth = self.auth.unwrap_or_default();

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&auth)?,
        };

        let config = CoreConfig {
            server_url: server_url.trim_end_matches('/').to_string(),
            database_path: self.database_path,
            http_client,
            secure_store,
            settings_store: self.settings_store,
            sync: self.sync.unwrap_or_default(),
            auth,
            start_offline: self.start_offline,
        };

        config.validate()?;
        Ok(config)
    }
}
