//! SQLite-backed cache gateway
//!
//! All families share the `cached_entities` table. Records are stored as a
//! JSON body next to the columns the gateway filters on: a lowercased
//! `search_text`, the relation keys delimited by `|`, and the flag.

use crate::error::Result;
use crate::gateway::{CacheFilter, CacheGateway, Scope};
use crate::models::Entity;
use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Shared handle to the cache database.
///
/// Hands out one [`SqliteCache`] per family. Writers across all families
/// serialize on one lock so concurrent read-then-write transactions never
/// race for the SQLite write lock.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn family<T: Entity>(&self) -> SqliteCache<T> {
        SqliteCache {
            pool: self.pool.clone(),
            write_lock: Arc::clone(&self.write_lock),
            _marker: PhantomData,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Cache gateway for one family, backed by `cached_entities`.
pub struct SqliteCache<T> {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

/// Ids bound per `IN (...)` statement. SQLite caps bound variables at 32766.
const IDS_PER_QUERY: usize = 500;

impl<T: Entity> SqliteCache<T> {
    fn decode(body: &str) -> Result<T> {
        Ok(serde_json::from_str(body)?)
    }

    /// `SELECT` over the family, narrowed by the filter's free-text query.
    fn select(filter: &CacheFilter) -> QueryBuilder<'static, Sqlite> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, body FROM cached_entities WHERE family = ");
        builder.push_bind(T::FAMILY.as_str());

        if let Some(query) = filter.normalized_query() {
            builder
                .push(" AND search_text LIKE ")
                .push_bind(format!("%{}%", escape_like(&query)))
                .push(" ESCAPE '\\'");
        }
        builder
    }

    /// Read `ids` in chunks and return them in the requested order.
    async fn query_ids(&self, filter: &CacheFilter, ids: &[String]) -> Result<Vec<T>> {
        let mut by_id: HashMap<String, String> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(IDS_PER_QUERY) {
            let mut builder = Self::select(filter);
            builder.push(" AND id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, String)> =
                builder.build_query_as().fetch_all(&self.pool).await?;
            by_id.extend(rows);
        }

        ids.iter()
            .filter_map(|id| by_id.remove(id))
            .map(|body| Self::decode(&body))
            .collect()
    }

    async fn store_row(
        conn: &mut SqliteConnection,
        entity: &T,
        position: i64,
        now: i64,
    ) -> Result<()> {
        query(
            r#"
            INSERT INTO cached_entities (
                family, id, position, search_text, scope_keys, flagged, body, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(family, id) DO UPDATE SET
                search_text = excluded.search_text,
                scope_keys = excluded.scope_keys,
                flagged = excluded.flagged,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(T::FAMILY.as_str())
        .bind(entity.id())
        .bind(position)
        .bind(entity.search_text().to_lowercase())
        .bind(encode_scope_keys(&entity.scope_keys()))
        .bind(entity.flagged())
        .bind(serde_json::to_string(entity)?)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// `|album:1|artist:2|`, so a relation matches with `LIKE '%|album:1|%'`.
fn encode_scope_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        String::new()
    } else {
        format!("|{}|", keys.join("|"))
    }
}

/// Escape `LIKE` wildcards; pairs with `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl<T: Entity> CacheGateway<T> for SqliteCache<T> {
    #[instrument(skip(self, filter), fields(family = %T::FAMILY))]
    async fn query(&self, filter: &CacheFilter) -> Result<Vec<T>> {
        if let Scope::Ids(ids) = &filter.scope {
            return self.query_ids(filter, ids).await;
        }

        let mut builder = Self::select(filter);
        match &filter.scope {
            Scope::All | Scope::Ids(_) => {}
            Scope::Flagged => {
                builder.push(" AND flagged = 1");
            }
            scope => {
                let key = scope.relation_key().unwrap_or_default();
                builder
                    .push(" AND scope_keys LIKE ")
                    .push_bind(format!("%|{}|%", escape_like(&key)))
                    .push(" ESCAPE '\\'");
            }
        }
        builder.push(" ORDER BY position ASC");

        let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.iter().map(|(_, body)| Self::decode(body)).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>> {
        let body: Option<String> =
            query_scalar("SELECT body FROM cached_entities WHERE family = ? AND id = ?")
                .bind(T::FAMILY.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        body.as_deref().map(Self::decode).transpose()
    }

    #[instrument(skip(self, entities), fields(family = %T::FAMILY, count = entities.len()))]
    async fn upsert_all(&self, entities: &[T]) -> Result<()> {
        for entity in entities {
            entity.validate()?;
        }
        if entities.is_empty() {
            return Ok(());
        }

        let family = T::FAMILY.as_str();
        let now = chrono::Utc::now().timestamp_millis();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut next_position: i64 = query_scalar(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM cached_entities WHERE family = ?",
        )
        .bind(family)
        .fetch_one(&mut *tx)
        .await?;

        for entity in entities {
            let cached: Option<String> =
                query_scalar("SELECT body FROM cached_entities WHERE family = ? AND id = ?")
                    .bind(family)
                    .bind(entity.id())
                    .fetch_optional(&mut *tx)
                    .await?;

            let mut incoming = entity.clone();
            if let Some(body) = &cached {
                incoming.retain_local(&Self::decode(body)?);
            }
            Self::store_row(&mut *tx, &incoming, next_position, now).await?;

            if cached.is_none() {
                next_position += 1;
            }
        }

        tx.commit().await?;
        debug!("Upserted into sqlite cache");
        Ok(())
    }

    #[instrument(skip(self, entities), fields(family = %T::FAMILY, count = entities.len()))]
    async fn replace_family(&self, entities: &[T]) -> Result<()> {
        for entity in entities {
            entity.validate()?;
        }

        let family = T::FAMILY.as_str();
        let now = chrono::Utc::now().timestamp_millis();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(String, String)> =
            query_as("SELECT id, body FROM cached_entities WHERE family = ?")
                .bind(family)
                .fetch_all(&mut *tx)
                .await?;
        let previous: HashMap<String, String> = rows.into_iter().collect();

        query("DELETE FROM cached_entities WHERE family = ?")
            .bind(family)
            .execute(&mut *tx)
            .await?;

        let mut stored = HashSet::new();
        for entity in entities {
            let mut incoming = entity.clone();
            if let Some(body) = previous.get(entity.id()) {
                incoming.retain_local(&Self::decode(body)?);
            }
            let position = stored.len() as i64;
            Self::store_row(&mut *tx, &incoming, position, now).await?;
            stored.insert(entity.id());
        }

        tx.commit().await?;
        debug!(removed = previous.len(), stored = stored.len(), "Replaced family");
        Ok(())
    }

    async fn clear_family(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let result = query("DELETE FROM cached_entities WHERE family = ?")
            .bind(T::FAMILY.as_str())
            .execute(&self.pool)
            .await?;
        debug!(family = %T::FAMILY, removed = result.rows_affected(), "Cleared family");
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = query("DELETE FROM cached_entities WHERE family = ? AND id = ?")
            .bind(T::FAMILY.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
