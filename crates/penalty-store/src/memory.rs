use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::{
    after_cursor, Condition, Cursor, IndexQuery, ItemStore, ItemUpdate, Page, StoreError,
    StoreItem, StoreResult,
};

/// In-process store. Conditions are evaluated under the write guard, so at
/// most one of several racing conditional writes on a key can succeed.
pub struct MemoryStore<T: StoreItem> {
    items: RwLock<BTreeMap<String, T>>,
    writes: AtomicU64,
}

impl<T: StoreItem> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            writes: AtomicU64::new(0),
        }
    }
}

impl<T: StoreItem> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations (puts, updates, batch items) so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Seed items without counting writes or checking conditions.
    pub async fn seed(&self, items: impl IntoIterator<Item = T>) {
        let mut guard = self.items.write().await;
        for it in items {
            guard.insert(it.key().to_string(), it);
        }
    }
}

#[async_trait::async_trait]
impl<T: StoreItem> ItemStore<T> for MemoryStore<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn put(&self, item: T, condition: Condition) -> StoreResult<Option<T>> {
        let mut guard = self.items.write().await;
        let current = guard.get(item.key()).map(StoreItem::version);
        if !condition.evaluate(current.as_ref()) {
            return Err(StoreError::ConditionFailed {
                table: T::TABLE,
                key: item.key().to_string(),
            });
        }
        let prev = guard.insert(item.key().to_string(), item);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(prev)
    }

    async fn update(&self, key: &str, update: ItemUpdate, condition: Condition) -> StoreResult<T> {
        let mut guard = self.items.write().await;
        let current = guard.get(key).map(StoreItem::version);
        if !condition.evaluate(current.as_ref()) {
            return Err(StoreError::ConditionFailed {
                table: T::TABLE,
                key: key.to_string(),
            });
        }
        let Some(existing) = guard.get(key) else {
            return Err(StoreError::NotFound {
                table: T::TABLE,
                key: key.to_string(),
            });
        };

        let mut next = existing.clone();
        next.apply_update(&update)?;
        guard.insert(key.to_string(), next.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }

    async fn query(
        &self,
        query: IndexQuery,
        limit: usize,
        start: Option<Cursor>,
    ) -> StoreResult<Page<T>> {
        let guard = self.items.read().await;
        let mut matched: Vec<&T> = guard
            .values()
            .filter(|it| match &query {
                IndexQuery::OffsetAfter(bound) => it.version().offset > *bound,
                IndexQuery::IndexKeyEquals(k) => it.index_key().as_deref() == Some(k.as_str()),
            })
            .filter(|it| after_cursor(it.version().offset, it.key(), start.as_ref()))
            .collect();

        matched.sort_by(|a, b| {
            a.version()
                .offset
                .total_cmp(&b.version().offset)
                .then_with(|| a.key().cmp(b.key()))
        });

        let has_more = matched.len() > limit;
        let items: Vec<T> = matched.into_iter().take(limit).cloned().collect();
        let next = if has_more {
            items.last().map(Cursor::after)
        } else {
            None
        };
        Ok(Page { items, next })
    }

    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<T>> {
        let guard = self.items.read().await;
        Ok(keys.iter().filter_map(|k| guard.get(k).cloned()).collect())
    }

    async fn batch_write(&self, items: Vec<T>) -> StoreResult<()> {
        let mut guard = self.items.write().await;
        for it in items {
            guard.insert(it.key().to_string(), it);
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
