//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Keychain account that stores the list of keys written through this store.
const INDEX_KEY: &str = "__catalog_sync_index__";

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// OS keychains cannot enumerate entries, so the store keeps its own index
/// entry. `list_keys` and `clear_all` operate on that index.
pub struct KeyringSecureStore {
    service_name: String,
    index_lock: Mutex<()>,
}

impl KeyringSecureStore {
    /// Create a new secure store with default service name
    pub fn new() -> Self {
        Self::with_service_name("catalog-sync")
    }

    /// Create a new secure store with custom service name
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn load_index(&self) -> Result<BTreeSet<String>> {
        match self.read_raw(INDEX_KEY)? {
            Some(raw) => Ok(parse_index(&raw)),
            None => Ok(BTreeSet::new()),
        }
    }

    fn store_index(&self, index: &BTreeSet<String>) -> Result<()> {
        if index.is_empty() {
            return self.remove_raw(INDEX_KEY);
        }
        let raw = serde_json::to_string(index).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode key index: {}", e))
        })?;
        self.entry(INDEX_KEY)?
            .set_password(&raw)
            .map_err(Self::map_keyring_error)
    }

    async fn update_index(&self, key: &str, present: bool) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index()?;
        let changed = if present {
            index.insert(key.to_string())
        } else {
            index.remove(key)
        };
        if changed {
            self.store_index(&index)?;
        }
        Ok(())
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A corrupt index is treated as empty; the entries themselves are intact.
fn parse_index(raw: &str) -> BTreeSet<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Discarding unreadable keyring index");
        BTreeSet::new()
    })
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        // Keyring stores strings only.
        let encoded = STANDARD.encode(value);
        self.entry(key)?
            .set_password(&encoded)
            .map_err(Self::map_keyring_error)?;
        self.update_index(key, true).await?;

        debug!(key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = self.read_raw(key)? else {
            debug!(key, "Secret not found in keyring");
            return Ok(None);
        };

        let decoded = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            error!(key, error = %e, "Failed to decode secret");
            BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
        })?;
        Ok(Some(decoded))
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.remove_raw(key)?;
        self.update_index(key, false).await?;
        debug!(key, "Deleted secret from keyring");
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let _guard = self.index_lock.lock().await;
        Ok(self.load_index()?.into_iter().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let index = self.load_index()?;
        for key in &index {
            self.remove_raw(key)?;
        }
        self.remove_raw(INDEX_KEY)?;
        debug!(count = index.len(), "Cleared keyring secrets");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let store = KeyringSecureStore::new();
        assert_eq!(store.service_name(), "catalog-sync");
    }

    #[test]
    fn test_custom_service_name() {
        let store = KeyringSecureStore::with_service_name("test-service");
        assert_eq!(store.service_name(), "test-service");
    }

    #[test]
    fn test_parse_index_roundtrip_and_corruption() {
        let index = parse_index(r#"["catalog.session","catalog.credentials"]"#);
        assert_eq!(index.len(), 2);
        assert!(index.contains("catalog.session"));

        assert!(parse_index("not json").is_empty());
    }
}
