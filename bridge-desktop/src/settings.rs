//! Settings Storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::path::PathBuf;
use tracing::{debug, error};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        value_type TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// Stored value kinds. A read with the wrong kind is an error, not a coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    String,
    Bool,
    Integer,
}

impl ValueKind {
    fn as_str(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "i64",
        }
    }
}

/// SQLite-backed settings store
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) a settings database at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(BridgeError::Io)?;
            }
        }

        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);
        let store = Self::connect(&db_url, 4).await?;

        debug!(path = ?db_path, "Initialized settings store");
        Ok(store)
    }

    /// Create an in-memory settings store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps the in-memory database alive and shared.
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect: {}", e)))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| {
                BridgeError::DatabaseError(format!("Failed to create settings table: {}", e))
            })?;

        Ok(Self { pool })
    }

    async fn set_value(&self, key: &str, value: &str, kind: ValueKind) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, value_type, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                value_type = excluded.value_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to set setting: {}", e)))?;

        debug!(key, value_type = kind.as_str(), "Stored setting");
        Ok(())
    }

    async fn get_value(&self, key: &str, kind: ValueKind) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value, value_type FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get setting: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: String = row.get(0);
        let value_type: String = row.get(1);
        if value_type != kind.as_str() {
            error!(key, expected = kind.as_str(), actual = %value_type, "Type mismatch");
            return Err(BridgeError::OperationFailed(format!(
                "Type mismatch for '{}': expected {}, got {}",
                key,
                kind.as_str(),
                value_type
            )));
        }
        Ok(Some(value))
    }

    fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        raw.parse::<T>().map_err(|e| {
            BridgeError::OperationFailed(format!("Corrupt value for '{}': {}", key, e))
        })
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value, ValueKind::String).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key, ValueKind::String).await
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, &value.to_string(), ValueKind::Bool)
            .await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get_value(key, ValueKind::Bool)
            .await?
            .map(|raw| Self::parse(key, raw))
            .transpose()
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, &value.to_string(), ValueKind::Integer)
            .await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get_value(key, ValueKind::Integer)
            .await?
            .map(|raw| Self::parse(key, raw))
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to delete setting: {}", e)))?;
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to check setting: {}", e)))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bool_roundtrip() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        assert_eq!(store.get_bool("sync.offline_mode").await.unwrap(), None);
        store.set_bool("sync.offline_mode", true).await.unwrap();
        assert_eq!(store.get_bool("sync.offline_mode").await.unwrap(), Some(true));

        store.set_bool("sync.offline_mode", false).await.unwrap();
        assert_eq!(store.get_bool("sync.offline_mode").await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_typed_values_do_not_coerce() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("server", "https://music.example.com").await.unwrap();
        store.set_i64("page_size", 250).await.unwrap();

        assert_eq!(
            store.get_string("server").await.unwrap().as_deref(),
            Some("https://music.example.com")
        );
        assert_eq!(store.get_i64("page_size").await.unwrap(), Some(250));
        assert!(store.get_bool("server").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_has_key() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("theme", "dark").await.unwrap();
        assert!(store.has_key("theme").await.unwrap());

        store.delete("theme").await.unwrap();
        assert!(!store.has_key("theme").await.unwrap());
        assert_eq!(store.get_string("theme").await.unwrap(), None);
    }
}
