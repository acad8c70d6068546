//! Offline mode switch.
//!
//! A process-wide flag read by every sync operation at call start. Changes are
//! broadcast over a `watch` channel and, when a [`SettingsStore`] is attached,
//! persisted under [`OFFLINE_MODE_KEY`].

use crate::error::Result;
use bridge_traits::{OfflineModeProvider, SettingsStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Settings key holding the persisted offline switch.
pub const OFFLINE_MODE_KEY: &str = "sync.offline_mode";

pub struct OfflineMode {
    flag: AtomicBool,
    notifier: watch::Sender<bool>,
    settings: Option<Arc<dyn SettingsStore>>,
}

impl OfflineMode {
    /// In-memory flag without persistence.
    pub fn new(offline: bool) -> Self {
        let (notifier, _) = watch::channel(offline);
        Self {
            flag: AtomicBool::new(offline),
            notifier,
            settings: None,
        }
    }

    /// Restore the flag from `settings`, falling back to `default` when
    /// nothing is stored or the stored value cannot be read.
    pub async fn load(settings: Arc<dyn SettingsStore>, default: bool) -> Self {
        let offline = match settings.get_bool(OFFLINE_MODE_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted offline mode; using default");
                default
            }
        };

        debug!(offline, "Loaded offline mode");
        let mut mode = Self::new(offline);
        mode.settings = Some(settings);
        mode
    }

    /// Change the flag, persist it and notify watchers.
    ///
    /// The in-memory value changes even if persistence fails; the error is
    /// returned so the caller can surface it.
    pub async fn set_offline(&self, offline: bool) -> Result<()> {
        let previous = self.flag.swap(offline, Ordering::SeqCst);
        if previous != offline {
            info!(offline, "Offline mode changed");
            self.notifier.send_replace(offline);
        }

        if let Some(settings) = &self.settings {
            settings.set_bool(OFFLINE_MODE_KEY, offline).await?;
        }
        Ok(())
    }

    /// Watch for changes. The receiver starts with the current value.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.notifier.subscribe()
    }

    pub fn is_persistent(&self) -> bool {
        self.settings.is_some()
    }
}

impl OfflineModeProvider for OfflineMode {
    fn is_offline(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for OfflineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineMode")
            .field("offline", &self.is_offline())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemorySettings {
        bools: Mutex<HashMap<String, bool>>,
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
            self.bools.lock().await.insert(key.to_string(), value);
            Ok(())
        }

        async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
            Ok(self.bools.lock().await.get(key).copied())
        }

        async fn set_i64(&self, _key: &str, _value: i64) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_i64(&self, _key: &str) -> BridgeResult<Option<i64>> {
            Ok(None)
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.bools.lock().await.remove(key);
            Ok(())
        }

        async fn has_key(&self, key: &str) -> BridgeResult<bool> {
            Ok(self.bools.lock().await.contains_key(key))
        }
    }

    struct BrokenSettings;

    #[async_trait]
    impl SettingsStore for BrokenSettings {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn set_bool(&self, _key: &str, _value: bool) -> BridgeResult<()> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn get_bool(&self, _key: &str) -> BridgeResult<Option<bool>> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn set_i64(&self, _key: &str, _value: i64) -> BridgeResult<()> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn get_i64(&self, _key: &str) -> BridgeResult<Option<i64>> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }

        async fn has_key(&self, _key: &str) -> BridgeResult<bool> {
            Err(BridgeError::DatabaseError("locked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_in_memory_toggle_notifies_watchers() {
        let mode = OfflineMode::new(false);
        let mut rx = mode.subscribe();
        assert!(!*rx.borrow());

        mode.set_offline(true).await.unwrap();
        assert!(mode.is_offline());
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_persisted_value_survives_reload() {
        let settings = Arc::new(MemorySettings::default());

        let mode = OfflineMode::load(settings.clone(), false).await;
        assert!(!mode.is_offline());
        mode.set_offline(true).await.unwrap();

        let reloaded = OfflineMode::load(settings, false).await;
        assert!(reloaded.is_offline());
        assert!(reloaded.is_persistent());
    }

    #[tokio::test]
    async fn test_unreadable_settings_fall_back_to_default() {
        let mode = OfflineMode::load(Arc::new(BrokenSettings), true).await;
        assert!(mode.is_offline());

        // Flag flips even when the write fails.
        assert!(mode.set_offline(false).await.is_err());
        assert!(!mode.is_offline());
    }
}
