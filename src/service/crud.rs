//! Record CRUD: validation composed with store calls.

use crate::config::ResolvedCollection;
use crate::error::AppError;
use crate::service::RecordValidator;
use crate::store::{Document, Filter, Record, RecordStore};
use futures::stream::BoxStream;
use uuid::Uuid;

/// How an update payload is applied to the stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// The payload becomes the whole record.
    Replace,
    /// Payload fields overwrite stored ones; `null` clears a field.
    Merge,
}

pub struct RecordService;

impl RecordService {
    /// Validate and insert. Returns the stored record with its assigned id.
    pub async fn create(
        store: &dyn RecordStore,
        collection: &ResolvedCollection,
        body: &Document,
    ) -> Result<Record, AppError> {
        let doc = RecordValidator::validate(store, collection, body, None).await?;
        let record = store.insert(collection, doc).await?;
        tracing::info!(collection = %collection.name, id = %record.id, "record created");
        Ok(record)
    }

    pub async fn get(store: &dyn RecordStore, collection: &ResolvedCollection, id: Uuid) -> Result<Record, AppError> {
        store
            .fetch(&collection.name, id)
            .await?
            .ok_or_else(|| not_found(collection, id))
    }

    /// Lazy sequence of matching records; empty when nothing matches.
    pub fn list<'a>(
        store: &'a dyn RecordStore,
        collection: &'a ResolvedCollection,
        filter: Option<&Filter>,
    ) -> BoxStream<'a, Result<Record, AppError>> {
        store.scan(&collection.name, filter)
    }

    /// Re-validates the resulting record; on any failure the stored record is unchanged.
    pub async fn update(
        store: &dyn RecordStore,
        collection: &ResolvedCollection,
        id: Uuid,
        patch: &Document,
        mode: UpdateMode,
    ) -> Result<Record, AppError> {
        let existing = Self::get(store, collection, id).await?;
        let candidate = match mode {
            UpdateMode::Replace => patch.clone(),
            UpdateMode::Merge => merge(existing.fields, patch),
        };
        let doc = RecordValidator::validate(store, collection, &candidate, Some(id)).await?;
        let record = store
            .replace(collection, id, doc)
            .await?
            .ok_or_else(|| not_found(collection, id))?;
        tracing::info!(collection = %collection.name, %id, ?mode, "record updated");
        Ok(record)
    }

    pub async fn delete(store: &dyn RecordStore, collection: &ResolvedCollection, id: Uuid) -> Result<(), AppError> {
        if !store.remove(&collection.name, id).await? {
            return Err(not_found(collection, id));
        }
        tracing::info!(collection = %collection.name, %id, "record deleted");
        Ok(())
    }
}

fn not_found(collection: &ResolvedCollection, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {}", collection.name, id))
}

fn merge(mut base: Document, patch: &Document) -> Document {
    for (k, v) in patch {
        if v.is_null() {
            base.remove(k);
        } else {
            base.insert(k.clone(), v.clone());
        }
    }
    base
}
