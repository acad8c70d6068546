//! Session Store
//!
//! Persists the current [`Session`] and the user's [`Credentials`] as JSON in
//! the platform [`SecureStore`], with an in-memory copy for the hot path.
//!
//! ## Token change detection
//!
//! A SHA-256 fingerprint of the last stored token is persisted next to the
//! session. When a session with a different token is stored, every entity
//! cache is purged through the attached [`CacheInvalidator`] before the new
//! session is written, because cached records embed token-bearing media URLs.
//! The fingerprint survives restarts and session expiry; only
//! [`SessionStore::clear_all`] forgets it.

use crate::error::{AuthError, Result};
use crate::types::{Credentials, Session};
use async_trait::async_trait;
use bridge_traits::storage::SecureStore;
use bridge_traits::BridgeError;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SESSION_KEY: &str = "catalog.session";
pub const CREDENTIALS_KEY: &str = "catalog.credentials";
pub const FINGERPRINT_KEY: &str = "catalog.session_fingerprint";

/// Purges every entity cache. Implemented by the cache layer.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn purge_all(&self, reason: &str) -> Result<()>;
}

#[derive(Default)]
struct State {
    loaded: bool,
    session: Option<Session>,
    credentials: Option<Credentials>,
    fingerprint: Option<String>,
}

pub struct SessionStore {
    secure_store: Arc<dyn SecureStore>,
    invalidator: Option<Arc<dyn CacheInvalidator>>,
    state: Mutex<State>,
}

impl SessionStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self {
            secure_store,
            invalidator: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Attach the cache layer purged on token or credential changes.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Current session, valid or not.
    pub async fn get_session(&self) -> Result<Option<Session>> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.session.clone())
    }

    /// Store `session`, purging every entity cache first if its token differs
    /// from the previously stored one.
    ///
    /// Returns `true` when the token changed.
    pub async fn set_session(&self, session: Session) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        let fingerprint = session.fingerprint();
        let token_changed = state
            .fingerprint
            .as_deref()
            .is_some_and(|previous| previous != fingerprint);

        if token_changed {
            info!("Session token changed; purging cached entities");
            self.purge_caches("session token changed").await?;
        }

        self.write_json(SESSION_KEY, &session).await?;
        self.secure_store
            .set_secret(FINGERPRINT_KEY, fingerprint.as_bytes())
            .await
            .map_err(storage_error)?;

        debug!(expires_at = %session.expires_at(), "Stored session");
        state.session = Some(session);
        state.fingerprint = Some(fingerprint);
        Ok(token_changed)
    }

    /// Forget the session. The fingerprint is kept so the next token can be
    /// compared against it.
    pub async fn clear_session(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.secure_store
            .delete_secret(SESSION_KEY)
            .await
            .map_err(storage_error)?;
        state.session = None;
        debug!("Cleared session");
        Ok(())
    }

    pub async fn credentials(&self) -> Result<Option<Credentials>> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.credentials.clone())
    }

    /// Store credentials. Replacing different credentials invalidates the
    /// session and purges every entity cache.
    ///
    /// Returns `true` when previously stored credentials were replaced.
    pub async fn set_credentials(&self, credentials: Credentials) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        let replaced = state
            .credentials
            .as_ref()
            .is_some_and(|existing| *existing != credentials);

        if replaced {
            info!(username = %credentials.username, "Credentials changed; invalidating session");
            self.secure_store
                .delete_secret(SESSION_KEY)
                .await
                .map_err(storage_error)?;
            state.session = None;
            self.purge_caches("credentials changed").await?;
        }

        self.write_json(CREDENTIALS_KEY, &credentials).await?;
        state.credentials = Some(credentials);
        Ok(replaced)
    }

    /// Remove session, credentials and fingerprint.
    pub async fn clear_all(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        for key in [SESSION_KEY, CREDENTIALS_KEY, FINGERPRINT_KEY] {
            self.secure_store
                .delete_secret(key)
                .await
                .map_err(storage_error)?;
        }
        *state = State {
            loaded: true,
            ..State::default()
        };
        debug!("Cleared stored session and credentials");
        Ok(())
    }

    /// Purge every entity cache, if a cache layer is attached.
    pub async fn purge_caches(&self, reason: &str) -> Result<()> {
        match &self.invalidator {
            Some(invalidator) => invalidator.purge_all(reason).await,
            None => Ok(()),
        }
    }

    async fn ensure_loaded(&self, state: &mut State) -> Result<()> {
        if state.loaded {
            return Ok(());
        }

        let session = self.read_json::<Session>(SESSION_KEY).await?;
        let credentials = self.read_json::<Credentials>(CREDENTIALS_KEY).await?;
        let fingerprint = self
            .secure_store
            .get_secret(FINGERPRINT_KEY)
            .await
            .map_err(storage_error)?
            .and_then(|raw| String::from_utf8(raw).ok());

        state.session = session;
        state.credentials = credentials;
        state.fingerprint = fingerprint;
        state.loaded = true;
        Ok(())
    }

    /// Read a JSON entry. An unreadable entry is deleted and reported once.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self
            .secure_store
            .get_secret(key)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupted secure store entry");
                self.secure_store
                    .delete_secret(key)
                    .await
                    .map_err(storage_error)?;
                Err(AuthError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_vec(value).map_err(|e| AuthError::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.secure_store
            .set_secret(key, &raw)
            .await
            .map_err(storage_error)
    }
}

fn storage_error(e: BridgeError) -> AuthError {
    AuthError::SecureStorage(e.to_string())
}
