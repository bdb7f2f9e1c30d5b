use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use penalty_store::{
    Condition, Cursor, IndexQuery, ItemStore, ItemUpdate, MemoryStore, Page, StoreError,
    StoreItem, StoreResult,
};

/// Memory store that fails writes to selected keys with a backend error.
///
/// Reads always pass through. Used to drive partial-failure paths.
pub struct FlakyStore<T: StoreItem> {
    inner: Arc<MemoryStore<T>>,
    failing: Mutex<HashSet<String>>,
}

impl<T: StoreItem> FlakyStore<T> {
    pub fn new(inner: Arc<MemoryStore<T>>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn inner(&self) -> &Arc<MemoryStore<T>> {
        &self.inner
    }

    pub fn fail_writes_to(&self, key: &str) {
        self.failing_keys().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing_keys().clear();
    }

    fn failing_keys(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        if self.failing_keys().contains(key) {
            return Err(StoreError::Backend(format!("injected write failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: StoreItem> ItemStore<T> for FlakyStore<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        self.inner.get(key).await
    }

    async fn put(&self, item: T, condition: Condition) -> StoreResult<Option<T>> {
        self.check(item.key())?;
        self.inner.put(item, condition).await
    }

    async fn update(&self, key: &str, update: ItemUpdate, condition: Condition) -> StoreResult<T> {
        self.check(key)?;
        self.inner.update(key, update, condition).await
    }

    async fn query(
        &self,
        query: IndexQuery,
        limit: usize,
        start: Option<Cursor>,
    ) -> StoreResult<Page<T>> {
        self.inner.query(query, limit, start).await
    }

    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<T>> {
        self.inner.batch_get(keys).await
    }

    async fn batch_write(&self, items: Vec<T>) -> StoreResult<()> {
        let attempted = items.len();
        let (ok, bad): (Vec<T>, Vec<T>) = items
            .into_iter()
            .partition(|it| self.check(it.key()).is_ok());
        self.inner.batch_write(ok).await?;
        if !bad.is_empty() {
            return Err(StoreError::BatchIncomplete {
                attempted,
                failed: bad.len(),
            });
        }
        Ok(())
    }
}
