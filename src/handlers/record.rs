//! Record CRUD handlers: create, list, list-by-filter or read, replace, patch, delete.

use crate::config::{Operation, ResolvedCollection};
use crate::error::AppError;
use crate::response::{success_created, success_many, success_one};
use crate::service::{RecordService, RecordValidator, UpdateMode};
use crate::state::AppState;
use crate::store::{Document, Filter, Record};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Resolve the collection for a path segment and check the operation is enabled.
fn collection<'a>(state: &'a AppState, path_segment: &str, op: Operation) -> Result<&'a ResolvedCollection, AppError> {
    let c = state
        .model
        .collection_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("collection '{}'", path_segment)))?;
    if !c.allows(op) {
        return Err(AppError::MethodNotAllowed(format!("{} not allowed on {}", op, c.name)));
    }
    Ok(c)
}

fn parse_id(id_str: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest(format!("invalid id '{}'", id_str)))
}

fn body_to_map(value: Value) -> Result<Document, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

async fn collect(state: &AppState, c: &ResolvedCollection, filter: Option<&Filter>) -> Result<Vec<Record>, AppError> {
    RecordService::list(state.store.as_ref(), c, filter).try_collect().await
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let c = collection(&state, &path_segment, Operation::Read)?;
    if params.len() > 1 {
        return Err(AppError::BadRequest("at most one filter field is supported".into()));
    }
    let filter = params
        .iter()
        .next()
        .map(|(field, raw)| RecordValidator::parse_filter(c, field, raw))
        .transpose()?;
    let rows = collect(&state, c, filter.as_ref()).await?;
    Ok(success_many(rows))
}

/// `key` is a filter value when the collection declares a filter field, otherwise a record id.
pub async fn list_or_read(
    State(state): State<AppState>,
    Path((path_segment, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let c = collection(&state, &path_segment, Operation::Read)?;
    match &c.filter_field {
        Some(field) => {
            let filter = RecordValidator::parse_filter(c, field, &key)?;
            let rows = collect(&state, c, Some(&filter)).await?;
            Ok(success_many(rows).into_response())
        }
        None => {
            let id = parse_id(&key)?;
            let record = RecordService::get(state.store.as_ref(), c, id).await?;
            Ok(success_one(record).into_response())
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let c = collection(&state, &path_segment, Operation::Create)?;
    let Json(body) = payload?;
    let body = body_to_map(body)?;
    let record = RecordService::create(state.store.as_ref(), c, &body).await?;
    Ok(success_created(record))
}

async fn update_with(
    state: &AppState,
    path_segment: &str,
    id_str: &str,
    payload: Result<Json<Value>, JsonRejection>,
    mode: UpdateMode,
) -> Result<impl IntoResponse, AppError> {
    let c = collection(state, path_segment, Operation::Update)?;
    let id = parse_id(id_str)?;
    let Json(body) = payload?;
    let body = body_to_map(body)?;
    let record = RecordService::update(state.store.as_ref(), c, id, &body, mode).await?;
    Ok(success_one(record))
}

/// PUT: the body replaces the whole record.
pub async fn replace(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    update_with(&state, &path_segment, &id_str, payload, UpdateMode::Replace).await
}

/// PATCH: the body is merged into the stored record.
pub async fn patch(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    update_with(&state, &path_segment, &id_str, payload, UpdateMode::Merge).await
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let c = collection(&state, &path_segment, Operation::Delete)?;
    let id = parse_id(&id_str)?;
    RecordService::delete(state.store.as_ref(), c, id).await?;
    Ok(success_one(serde_json::json!({ "id": id, "deleted": true })))
}
