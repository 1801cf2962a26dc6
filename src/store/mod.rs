//! Record persistence: the `RecordStore` trait and its backends.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::config::ResolvedCollection;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Declared fields of one record, keyed by field name.
pub type Document = Map<String, Value>;

/// A stored record. `id` and `created_at` are assigned by the store and never change.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: Document,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Equality constraint on one field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Filter {
            field: field.into(),
            value,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field).is_some_and(|v| value_eq(v, &self.value))
    }

    /// JSON object `{field: value}` for containment queries.
    pub fn to_containment(&self) -> Value {
        let mut m = Map::new();
        m.insert(self.field.clone(), self.value.clone());
        Value::Object(m)
    }
}

/// Numbers compare by value so `100` matches `100.0`.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// Persistence over named collections. Implementations must be safe for concurrent use.
///
/// Stores do not validate payloads beyond enforcing the collection's unique fields atomically.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create backing tables and unique indexes. Idempotent.
    async fn ensure_schema(&self, collections: &[ResolvedCollection]) -> Result<(), AppError>;

    async fn insert(&self, collection: &ResolvedCollection, fields: Document) -> Result<Record, AppError>;

    async fn fetch(&self, collection: &str, id: Uuid) -> Result<Option<Record>, AppError>;

    /// Scan in creation order, optionally narrowed by one equality filter.
    /// `PgStore` streams rows from the cursor; `MemoryStore` snapshots the matches
    /// under its read lock and streams the copy.
    fn scan<'a>(&'a self, collection: &'a str, filter: Option<&Filter>) -> BoxStream<'a, Result<Record, AppError>>;

    /// Replace the fields of an existing record. `None` if it does not exist.
    async fn replace(
        &self,
        collection: &ResolvedCollection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Record>, AppError>;

    /// Returns false if the record did not exist.
    async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, AppError>;

    /// Whether a record other than `exclude` matches `filter`.
    async fn exists(&self, collection: &str, filter: &Filter, exclude: Option<Uuid>) -> Result<bool, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}
