//! penalty-store
//!
//! Key-value item store with single-item conditional writes.
//!
//! There is no multi-item transaction anywhere in this crate. Every write
//! names at most one key and carries a [`Condition`] evaluated atomically
//! against that key's current version. Batch writes are unconditional and
//! best-effort.
//!
//! Two backends:
//! - [`MemoryStore`]: `tokio::sync::RwLock` around an ordered map.
//! - [`PgItemStore`]: one Postgres table per item type, conditions evaluated
//!   under `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use penalty_schemas::{Origin, PenaltyGroup, PenaltyRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

mod batch;
mod condition;
mod memory;
mod postgres;

pub use batch::{BestEffortBatchWriter, GroupBatchWriter};
pub use condition::Condition;
pub use memory::MemoryStore;
pub use postgres::{connect, migrate, PgItemStore};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conditional write rejected for {table}/{key}")]
    ConditionFailed { table: &'static str, key: String },
    #[error("item not found: {table}/{key}")]
    NotFound { table: &'static str, key: String },
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("item codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("batch write incomplete: {failed} of {attempted} item(s) not written")]
    BatchIncomplete { attempted: usize, failed: usize },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl StoreError {
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// The attributes a [`Condition`] can test.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemVersion {
    pub hash: String,
    pub enabled: bool,
    pub origin: Origin,
    pub offset: f64,
}

/// A type the store can hold.
///
/// Items serialize with PascalCase top-level attributes (`Hash`, `Offset`,
/// `Enabled`, `Origin`), which is what [`ItemUpdate`] writes to.
pub trait StoreItem: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Backing table (Postgres) / namespace name.
    const TABLE: &'static str;

    fn key(&self) -> &str;

    fn version(&self) -> ItemVersion;

    /// Secondary index key, if the item has one.
    fn index_key(&self) -> Option<String>;

    /// Apply `update` in place through the item's serialized form.
    fn apply_update(&mut self, update: &ItemUpdate) -> StoreResult<()> {
        let mut doc = serde_json::to_value(&*self)?;
        update.apply_to(&mut doc);
        *self = serde_json::from_value(doc)?;
        Ok(())
    }
}

impl StoreItem for PenaltyRecord {
    const TABLE: &'static str = "penalty_documents";

    fn key(&self) -> &str {
        &self.id
    }

    fn version(&self) -> ItemVersion {
        ItemVersion {
            hash: self.hash.clone(),
            enabled: self.enabled,
            origin: self.origin,
            offset: self.offset,
        }
    }

    fn index_key(&self) -> Option<String> {
        self.vehicle_registration.clone()
    }
}

impl StoreItem for PenaltyGroup {
    const TABLE: &'static str = "penalty_groups";

    fn key(&self) -> &str {
        &self.id
    }

    fn version(&self) -> ItemVersion {
        ItemVersion {
            hash: self.hash.clone(),
            enabled: self.enabled,
            origin: self.origin,
            offset: self.offset,
        }
    }

    fn index_key(&self) -> Option<String> {
        self.vehicle_registration.clone()
    }
}

/// A partial update: version attributes plus dotted-path field sets.
///
/// A path such as `Value.paymentStatus` addresses a nested field; setting
/// `Value::Null` removes the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub hash: Option<String>,
    pub offset: Option<f64>,
    pub enabled: Option<bool>,
    pub origin: Option<Origin>,
    pub set: Vec<(String, Value)>,
}

impl ItemUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.set.push((path.into(), value));
        self
    }

    fn apply_to(&self, doc: &mut Value) {
        if let Some(h) = &self.hash {
            set_path(doc, "Hash", Value::String(h.clone()));
        }
        if let Some(o) = self.offset {
            set_path(doc, "Offset", Value::from(o));
        }
        if let Some(e) = self.enabled {
            set_path(doc, "Enabled", Value::Bool(e));
        }
        if let Some(o) = self.origin {
            set_path(doc, "Origin", Value::String(o.as_str().to_string()));
        }
        for (path, v) in &self.set {
            set_path(doc, path, v.clone());
        }
    }
}

fn set_path(doc: &mut Value, path: &str, v: Value) {
    let mut cur = doc;
    let mut segments = path.split('.').peekable();
    while let Some(seg) = segments.next() {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let Value::Object(map) = cur else { return };
        if segments.peek().is_none() {
            if v.is_null() {
                map.remove(seg);
            } else {
                map.insert(seg.to_string(), v);
            }
            return;
        }
        cur = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Items with `Offset` strictly greater than the bound.
    OffsetAfter(f64),
    /// Items whose secondary index key equals the value.
    IndexKeyEquals(String),
}

/// Exclusive start position: the last item of the previous page.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub key: String,
    pub offset: f64,
}

impl Cursor {
    pub fn after<T: StoreItem>(item: &T) -> Self {
        Self {
            key: item.key().to_string(),
            offset: item.version().offset,
        }
    }
}

/// One page of a query, ascending by `(Offset, key)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ItemStore<T: StoreItem>: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<T>>;

    /// Write the whole item if `condition` holds for the current version.
    /// Returns the item it replaced.
    async fn put(&self, item: T, condition: Condition) -> StoreResult<Option<T>>;

    /// Apply `update` to an existing item if `condition` holds.
    /// Returns the item as written.
    async fn update(&self, key: &str, update: ItemUpdate, condition: Condition)
        -> StoreResult<T>;

    async fn query(
        &self,
        query: IndexQuery,
        limit: usize,
        start: Option<Cursor>,
    ) -> StoreResult<Page<T>>;

    /// Items for `keys` in input order; missing keys are omitted.
    async fn batch_get(&self, keys: &[String]) -> StoreResult<Vec<T>>;

    /// Unconditional puts. Not atomic: on error some items may be written.
    async fn batch_write(&self, items: Vec<T>) -> StoreResult<()>;
}

/// Shared ordering for query results.
pub(crate) fn after_cursor(offset: f64, key: &str, cursor: Option<&Cursor>) -> bool {
    match cursor {
        None => true,
        Some(c) => match offset.total_cmp(&c.offset) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => key > c.key.as_str(),
            std::cmp::Ordering::Less => false,
        },
    }
}
