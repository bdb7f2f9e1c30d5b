//! Postgres backend.
//!
//! Each conditional write runs in its own transaction: lock the row with
//! `SELECT ... FOR UPDATE`, evaluate the [`Condition`] in Rust, then upsert.
//! An insert against an absent row uses `ON CONFLICT DO NOTHING` so a
//! concurrent insert of the same key loses with `ConditionFailed`.

use std::collections::HashMap;
use std::marker::PhantomData;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::{
    Condition, Cursor, IndexQuery, ItemStore, ItemUpdate, Page, StoreError, StoreItem,
    StoreResult,
};

/// Connect to Postgres with a bounded pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

pub struct PgItemStore<T: StoreItem> {
    pool: PgPool,
    _item: PhantomData<fn() -> T>,
}

impl<T: StoreItem> Clone for PgItemStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _item: PhantomData,
        }
    }
}

impl<T: StoreItem> PgItemStore<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _item: PhantomData,
        }
    }

    fn decode(row: &PgRow) -> StoreResult<T> {
        let body: serde_json::Value = row.try_get("body")?;
        Ok(serde_json::from_value(body)?)
    }

    async fn lock_current(tx: &mut Transaction<'_, Postgres>, key: &str) -> StoreResult<Option<T>> {
        let sql = format!("select body from {} where id = $1 for update", T::TABLE);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn upsert<'e, E>(executor: E, item: &T) -> StoreResult<u64>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            insert into {} (id, hash, enabled, origin, item_offset, index_key, body)
            values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (id) do update set
              hash = excluded.hash,
              enabled = excluded.enabled,
              origin = excluded.origin,
              item_offset = excluded.item_offset,
              index_key = excluded.index_key,
              body = excluded.body
            "#,
            T::TABLE
        );
        Self::write_row(executor, &sql, item).await
    }

    async fn insert_new<'e, E>(executor: E, item: &T) -> StoreResult<u64>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            insert into {} (id, hash, enabled, origin, item_offset, index_key, body)
            values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (id) do nothing
            "#,
            T::TABLE
        );
        Self::write_row(executor, &sql, item).await
    }

    async fn write_row<'e, E>(executor: E, sql: &str, item: &T) -> StoreResult<u64>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let v = item.version();
        let body = serde_json::to_value(item)?;
        let res = sqlx::query(sql)
            .bind(item.key())
            .bind(&v.hash)
            .bind(v.enabled)
            .bind(v.origin.as_str())
            .bind(v.offset)
            .bind(item.index_key())
            .bind(body)
            .execute(executor)
            .await?;
        Ok(res.rows_affected())
    }

    fn condition_failed(key: &str) -> StoreError {
        StoreError::ConditionFailed {
            table: T::TABLE,
            key: key.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl<T: StoreItem> ItemStore<T> for PgItemStore<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        let sql = format!("select body from {} where id = $1", T::TABLE);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn put(&self, item: T, condition: Condition) -> StoreResult<Option<T>> {
        let mut tx = self.pool.begin().await?;
        let prev = Self::lock_current(&mut tx, item.key()).await?;
        if !condition.evaluate(prev.as_ref().map(StoreItem::version).as_ref()) {
            let _ = tx.rollback().await;
            return Err(Self::condition_failed(item.key()));
        }

        let written = match prev {
            Some(_) => Self::upsert(&mut *tx, &item).await?,
            None => Self::insert_new(&mut *tx, &item).await?,
        };
        if written == 0 {
            // Lost an insert race on an absent key.
            let _ = tx.rollback().await;
            return Err(Self::condition_failed(item.key()));
        }
        tx.commit().await?;
        Ok(prev)
    }

    async fn update(&self, key: &str, update: ItemUpdate, condition: Condition) -> StoreResult<T> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_current(&mut tx, key).await?;
        if !condition.evaluate(current.as_ref().map(StoreItem::version).as_ref()) {
            let _ = tx.rollback().await;
            return Err(Self::condition_failed(key));
        }
        let Some(mut next) = current else {
            let _ = tx.rollback().await;
            return Err(StoreError::NotFound {
                table: T::TABLE,
                key: key.to_string(),
            });
        };

        next.apply_update(&update)?;
        Self::upsert(&mut *tx, &next).await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn query(
        &self,
        query: IndexQuery,
        limit: usize,
        start: Option<Cursor>,
    ) -> StoreResult<Page<T>> {
        let (cursor_offset, cursor_key) = match &start {
            Some(c) => (Some(c.offset), Some(c.key.clone())),
            None => (None, None),
        };
        let fetch = i64::try_from(limit.saturating_add(1)).unwrap_or(i64::MAX);

        let rows = match query {
            IndexQuery::OffsetAfter(bound) => {
                let sql = format!(
                    r#"
                    select body from {}
                    where item_offset > $1
                      and ($2::float8 is null or (item_offset, id) > ($2, $3))
                    order by item_offset asc, id asc
                    limit $4
                    "#,
                    T::TABLE
                );
                sqlx::query(&sql)
                    .bind(bound)
                    .bind(cursor_offset)
                    .bind(cursor_key)
                    .bind(fetch)
                    .fetch_all(&self.pool)
                    .await?
            }
            IndexQuery::IndexKeyEquals(k) => {
                let sql = format!(
                    r#"
                    select body from {}
                    where index_key = $1
                      and ($2::float8 is null or (item_offset, id) > ($2, $3))
                    order by item_offset asc, id asc
                    limit $4
                    "#,
                    T::TABLE
                );
                sqlx::query(&sql)
                    .bind(k)
                    .bind(cursor_offset)
                    .bind(cursor_key)
                    .bind(fetch)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut items = rows.iter().map(Self::decode).collect::<StoreResult<Vec<T>>>()?;
        let has_more = items.len() > limit;
        items.truncate(limit);
        let next = if has_more {
            items.last().map(Cursor::after)
        } else {
            None
        };
        Ok(Page { items, next })
    }

    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("select body from {} where id = any($1)", T::TABLE);
        let rows = sqlx::query(&sql)
            .bind(keys)
            .fetch_all(&self.pool)
            .await?;

        let mut by_key: HashMap<String, T> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let it = Self::decode(row)?;
            by_key.insert(it.key().to_string(), it);
        }
        Ok(keys.iter().filter_map(|k| by_key.get(k).cloned()).collect())
    }

    async fn batch_write(&self, items: Vec<T>) -> StoreResult<()> {
        let attempted = items.len();
        let mut failed = 0usize;
        for it in &items {
            if let Err(e) = Self::upsert(&self.pool, it).await {
                tracing::warn!(table = T::TABLE, key = it.key(), error = %e, "batch item write failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(StoreError::BatchIncomplete { attempted, failed });
        }
        Ok(())
    }
}
