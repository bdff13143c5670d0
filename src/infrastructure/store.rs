//! Storage interface for the single wide-column table.
//!
//! Items are schemaless JSON documents addressed by a composite
//! `(partition key, sort key)`. Handlers never join; every read pattern is a
//! single-partition query against a denormalized copy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;

/// A stored item: a flat JSON object. Items read back from the store have no
/// static shape; callers go through the fail-closed accessors below.
pub type Item = serde_json::Map<String, Value>;

/// Composite address of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// String attribute, or `None` when missing or mistyped.
pub fn field_str<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name).and_then(Value::as_str)
}

/// Numeric attribute as f64; missing or mistyped reads as `None`.
pub fn field_f64(item: &Item, name: &str) -> Option<f64> {
    item.get(name).and_then(Value::as_f64)
}

/// Integer attribute. Accepts integral floats, since store-side arithmetic
/// may widen counters to REAL.
pub fn field_i64(item: &Item, name: &str) -> Option<i64> {
    match item.get(name) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        _ => None,
    }
}

/// Query over one partition: optional sort-key predicate, order, limit, and
/// exclusive start position for continuation.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub pk: String,
    pub sk_prefix: Option<String>,
    pub sk_between: Option<(String, String)>,
    pub descending: bool,
    pub limit: Option<u32>,
    pub start_after: Option<ItemKey>,
}

impl QuerySpec {
    pub fn partition(pk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            ..Default::default()
        }
    }

    pub fn prefix(mut self, sk_prefix: impl Into<String>) -> Self {
        self.sk_prefix = Some(sk_prefix.into());
        self
    }

    pub fn between(mut self, low: impl Into<String>, high: impl Into<String>) -> Self {
        self.sk_between = Some((low.into(), high.into()));
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, key: Option<ItemKey>) -> Self {
        self.start_after = key;
        self
    }
}

/// One page of query results. `last_key` is present only when the query
/// stopped at its limit with more items remaining.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub last_key: Option<ItemKey>,
}

/// Partial update applied store-side in a single statement. The item is
/// created if absent. ADD-deltas are unconditional numeric adjustments,
/// commutative under concurrent application; they are never read-modify-write
/// in application code.
#[derive(Debug, Clone, Default)]
pub struct UpdateSpec {
    pub set: Vec<(String, Value)>,
    pub remove: Vec<String>,
    pub add: Vec<(String, f64)>,
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set.push((name.into(), value));
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    pub fn add(mut self, name: impl Into<String>, delta: f64) -> Self {
        self.add.push((name.into(), delta));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty() && self.add.is_empty()
    }
}

/// Atomic multi-item writes are limited to the items that must
/// appear-or-not-appear together; everything beyond this is independent.
pub const MAX_TRANSACT_ITEMS: usize = 2;

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point read. Returned items carry their `PK`/`SK` attributes.
    async fn get(&self, key: &ItemKey) -> AppResult<Option<Item>>;

    /// Full put (replace) of one item.
    async fn put(&self, key: &ItemKey, item: Item) -> AppResult<()>;

    /// Point delete. Returns whether an item existed.
    async fn delete(&self, key: &ItemKey) -> AppResult<bool>;

    /// Atomic multi-item put: all writes land or none do.
    async fn transact_put(&self, writes: Vec<(ItemKey, Item)>) -> AppResult<()>;

    /// Upserting partial update (SET / REMOVE / ADD-delta).
    async fn update(&self, key: &ItemKey, update: UpdateSpec) -> AppResult<()>;

    /// Single-partition range query.
    async fn query(&self, query: QuerySpec) -> AppResult<QueryPage>;

    /// Batch point-get; absent keys are simply missing from the result.
    async fn batch_get(&self, keys: &[ItemKey]) -> AppResult<Vec<Item>>;
}
