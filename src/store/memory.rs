//! Process-local store. Unique fields are checked under the write lock.

use super::{Document, Filter, Record, RecordStore};
use crate::config::ResolvedCollection;
use crate::error::{AppError, Violation};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    /// Collection name -> records in creation order.
    collections: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique_conflicts(
    collection: &ResolvedCollection,
    records: &[Record],
    fields: &Document,
    exclude: Option<Uuid>,
) -> Vec<Violation> {
    collection
        .unique_fields()
        .filter_map(|f| {
            let value = fields.get(&f.name)?;
            let filter = Filter::new(f.name.clone(), value.clone());
            records
                .iter()
                .any(|r| Some(r.id) != exclude && filter.matches(&r.fields))
                .then(|| Violation::DuplicateValue { field: f.name.clone() })
        })
        .collect()
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_schema(&self, collections: &[ResolvedCollection]) -> Result<(), AppError> {
        let mut guard = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        for c in collections {
            guard.entry(c.name.clone()).or_default();
        }
        Ok(())
    }

    async fn insert(&self, collection: &ResolvedCollection, fields: Document) -> Result<Record, AppError> {
        let mut guard = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let records = guard.entry(collection.name.clone()).or_default();
        let conflicts = unique_conflicts(collection, records, &fields, None);
        if !conflicts.is_empty() {
            return Err(AppError::from_violations(conflicts));
        }
        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4(),
            fields,
            created_at: now,
            updated_at: now,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn fetch(&self, collection: &str, id: Uuid) -> Result<Option<Record>, AppError> {
        let guard = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .get(collection)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned())
    }

    fn scan<'a>(&'a self, collection: &'a str, filter: Option<&Filter>) -> BoxStream<'a, Result<Record, AppError>> {
        let guard = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        let rows: Vec<Record> = guard
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| filter.map_or(true, |f| f.matches(&r.fields)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(rows.into_iter().map(Ok)).boxed()
    }

    async fn replace(
        &self,
        collection: &ResolvedCollection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Record>, AppError> {
        let mut guard = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let Some(records) = guard.get_mut(&collection.name) else {
            return Ok(None);
        };
        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let conflicts = unique_conflicts(collection, records, &fields, Some(id));
        if !conflicts.is_empty() {
            return Err(AppError::from_violations(conflicts));
        }
        let record = &mut records[pos];
        record.fields = fields;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, AppError> {
        let mut guard = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let Some(records) = guard.get_mut(collection) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    async fn exists(&self, collection: &str, filter: &Filter, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let guard = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(collection).is_some_and(|records| {
            records
                .iter()
                .any(|r| Some(r.id) != exclude && filter.matches(&r.fields))
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve};
    use futures::TryStreamExt;
    use serde_json::json;

    fn person() -> ResolvedCollection {
        let model = resolve(&builtin().unwrap()).unwrap();
        model.collection_by_path("person").unwrap().clone()
    }

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn insert_then_fetch() {
        let store = MemoryStore::new();
        let c = person();
        let created = store
            .insert(&c, doc(json!({ "name": "A", "email": "a@x.com" })))
            .await
            .unwrap();
        assert_eq!(created.created_at, created.updated_at);
        let fetched = store.fetch("person", created.id).await.unwrap();
        assert_eq!(fetched, Some(created));
        assert_eq!(store.fetch("person", Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(store.fetch("menu", Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_rejects_unique_collision() {
        let store = MemoryStore::new();
        let c = person();
        store.insert(&c, doc(json!({ "email": "a@x.com" }))).await.unwrap();
        let err = store.insert(&c, doc(json!({ "email": "a@x.com" }))).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
    }

    #[tokio::test]
    async fn replace_excludes_self_from_unique_check() {
        let store = MemoryStore::new();
        let c = person();
        let a = store.insert(&c, doc(json!({ "email": "a@x.com" }))).await.unwrap();
        let b = store.insert(&c, doc(json!({ "email": "b@x.com" }))).await.unwrap();

        let updated = store
            .replace(&c, a.id, doc(json!({ "email": "a@x.com", "name": "A" })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, a.id);
        assert_eq!(updated.created_at, a.created_at);
        assert_eq!(updated.fields["name"], json!("A"));

        let err = store.replace(&c, b.id, doc(json!({ "email": "a@x.com" }))).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(store.fetch("person", b.id).await.unwrap().unwrap().fields["email"], json!("b@x.com"));

        assert!(store.replace(&c, Uuid::new_v4(), Document::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_filters_in_creation_order() {
        let store = MemoryStore::new();
        let c = person();
        for (name, work) in [("a", "chef"), ("b", "waiter"), ("c", "chef")] {
            store.insert(&c, doc(json!({ "name": name, "work": work }))).await.unwrap();
        }
        let chefs: Vec<Record> = store
            .scan("person", Some(&Filter::new("work", json!("chef"))))
            .try_collect()
            .await
            .unwrap();
        let names: Vec<_> = chefs.iter().map(|r| r.fields["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("c")]);

        let all: Vec<Record> = store.scan("person", None).try_collect().await.unwrap();
        assert_eq!(all.len(), 3);
        let none: Vec<Record> = store.scan("menu", None).try_collect().await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn scan_streams_a_snapshot() {
        let store = MemoryStore::new();
        let c = person();
        store.insert(&c, doc(json!({ "name": "a" }))).await.unwrap();
        let stream = store.scan("person", None);
        store.insert(&c, doc(json!({ "name": "b" }))).await.unwrap();
        let seen: Vec<Record> = stream.try_collect().await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn unique_values_compare_numerically() {
        let store = MemoryStore::new();
        let c = person();
        store.insert(&c, doc(json!({ "email": 100 }))).await.unwrap();
        let err = store.insert(&c, doc(json!({ "email": 100.0 }))).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
    }

    #[tokio::test]
    async fn remove_and_exists() {
        let store = MemoryStore::new();
        let c = person();
        let r = store.insert(&c, doc(json!({ "email": "a@x.com" }))).await.unwrap();
        let by_email = Filter::new("email", json!("a@x.com"));
        assert!(store.exists("person", &by_email, None).await.unwrap());
        assert!(!store.exists("person", &by_email, Some(r.id)).await.unwrap());

        assert!(store.remove("person", r.id).await.unwrap());
        assert!(!store.remove("person", r.id).await.unwrap());
        assert!(!store.exists("person", &by_email, None).await.unwrap());
    }
}
