//! # Session Manager
//!
//! Hands out valid sessions to the sync layer.
//!
//! ## Overview
//!
//! `ensure_valid_session(force)` returns the stored session while it is valid
//! and otherwise authenticates with the stored credentials: by API key when
//! one is configured, else by username plus a time-salted password proof.
//!
//! Re-authentication is single-flight. Callers serialize on one lock and a
//! generation counter tells a waiting caller that someone else already
//! refreshed while it was queued, so N concurrent callers cause one
//! handshake, even when they all pass `force = true`.
//!
//! ## Usage
//!
//! ```ignore
//! let manager = SessionManager::new(store, authenticator, event_bus);
//! manager
//!     .sign_in(Credentials::with_password("https://music.example.com", "ann", "pw"))
//!     .await?;
//!
//! let session = manager.ensure_valid_session(false).await?;
//! ```

use crate::authenticator::Authenticator;
use crate::error::{AuthError, Result};
use crate::session_store::SessionStore;
use crate::types::{Credentials, Session};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Default upper bound for one handshake.
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SessionManager {
    store: Arc<SessionStore>,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    auth_timeout: Duration,
    refresh_lock: Mutex<()>,
    /// Bumped after every successful handshake and every sign-out.
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        authenticator: Arc<dyn Authenticator>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            authenticator,
            clock: Arc::new(SystemClock),
            event_bus,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, auth_timeout: Duration) -> Self {
        self.auth_timeout = auth_timeout;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Stored session, valid or not.
    pub async fn current_session(&self) -> Result<Option<Session>> {
        self.store.get_session().await
    }

    pub async fn has_credentials(&self) -> Result<bool> {
        Ok(self.store.credentials().await?.is_some())
    }

    /// Return a session valid right now, authenticating if `force` is set or
    /// the stored session is missing or expired.
    ///
    /// # Errors
    ///
    /// - `AuthError::NotAuthenticated` - no credentials are stored
    /// - `AuthError::InvalidCredentials` - the server rejected them; the
    ///   session is cleared
    /// - `AuthError::Network` / `AuthError::Timeout` - server unreachable
    /// - `AuthError::Server` - the server returned an error payload
    #[instrument(skip(self))]
    pub async fn ensure_valid_session(&self, force: bool) -> Result<Session> {
        let observed = self.generation.load(Ordering::Acquire);

        if !force {
            if let Some(session) = self.valid_session().await? {
                return Ok(session);
            }
        }

        let _guard = self.refresh_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(session) = self.valid_session().await? {
                debug!("Reusing session refreshed by a concurrent caller");
                return Ok(session);
            }
        }

        let session = self.authenticate().await?;
        self.generation.fetch_add(1, Ordering::AcqRel);

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SessionRefreshed {
                expires_at: session.expires_at().timestamp(),
            }));
        Ok(session)
    }

    /// Store new credentials and authenticate with them.
    ///
    /// Replacing different credentials invalidates the old session and purges
    /// every entity cache before the handshake.
    #[instrument(skip(self, credentials), fields(server_url = %credentials.server_url))]
    pub async fn sign_in(&self, credentials: Credentials) -> Result<Session> {
        info!(
            user = %redact_if_sensitive("username", &credentials.username),
            "Signing in"
        );
        let server_url = credentials.server_url.clone();
        let username = credentials
            .api_token
            .is_none()
            .then(|| credentials.username.clone());

        self.store.set_credentials(credentials).await?;
        let session = self.ensure_valid_session(true).await?;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
            server_url,
            username,
        }));
        info!("Sign-in completed successfully");
        Ok(session)
    }

    /// Best-effort server logout, then forget session and credentials and
    /// purge every entity cache.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        info!("Signing out");

        let session = self.store.get_session().await.ok().flatten();
        let credentials = self.store.credentials().await.ok().flatten();
        if let (Some(session), Some(credentials)) = (session, credentials) {
            if let Err(e) = self
                .authenticator
                .goodbye(&credentials.server_url, &session)
                .await
            {
                warn!(error = %e, "Server logout failed; clearing local state anyway");
            }
        }

        self.store.clear_all().await?;
        self.store.purge_caches("signed out").await?;
        self.generation.fetch_add(1, Ordering::AcqRel);

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut));
        Ok(())
    }

    /// React to a server-reported session expiry for `expired`.
    ///
    /// Clears the session and purges every entity cache so the next call
    /// re-authenticates. A report about a token that has already been
    /// replaced is ignored.
    #[instrument(skip(self, expired))]
    pub async fn handle_session_expired(&self, expired: &Session) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.store.get_session().await.ok().flatten();
        if current.as_ref().is_some_and(|s| s.token() != expired.token()) {
            debug!("Expiry reported for a replaced session; ignoring");
            return Ok(());
        }

        warn!("Server reported the session as expired");
        self.store.clear_session().await?;
        self.store.purge_caches("session expired").await?;

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SessionCleared {
                reason: "session expired".to_string(),
            }));
        Ok(())
    }

    async fn valid_session(&self) -> Result<Option<Session>> {
        let now = self.clock.now();
        match self.store.get_session().await {
            Ok(session) => Ok(session.filter(|s| s.is_valid_at(now))),
            Err(AuthError::Corrupted { key, .. }) => {
                warn!(key = %key, "Stored session unreadable; re-authenticating");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn authenticate(&self) -> Result<Session> {
        let credentials = self.store.credentials().await?.ok_or_else(|| {
            warn!("No stored credentials");
            AuthError::NotAuthenticated
        })?;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
            server_url: credentials.server_url.clone(),
        }));

        let challenge = credentials.challenge(self.clock.unix_timestamp());
        let result = match timeout(
            self.auth_timeout,
            self.authenticator
                .handshake(&credentials.server_url, &challenge),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout {
                operation: "handshake".to_string(),
            }),
        };

        match result {
            Ok(session) => {
                self.store.set_session(session.clone()).await?;
                debug!(expires_at = %session.expires_at(), "Handshake succeeded");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Handshake failed");
                if matches!(e, AuthError::InvalidCredentials(_)) {
                    if let Err(clear_err) = self.store.clear_session().await {
                        warn!(error = %clear_err, "Failed to clear rejected session");
                    }
                    let _ = self
                        .event_bus
                        .emit(CoreEvent::Auth(AuthEvent::SessionCleared {
                            reason: "credentials rejected".to_string(),
                        }));
                }
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                }));
                Err(e)
            }
        }
    }
}
