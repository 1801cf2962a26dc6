//! Load collection config from the built-in document or a JSON file, and resolve it.

use crate::config::resolved::{ResolvedCollection, ResolvedModel};
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_COLLECTIONS: &str = include_str!("../../config/collections.json");

/// The `person` and `menu` collections shipped with the service.
pub fn builtin() -> Result<FullConfig, ConfigError> {
    parse(BUILTIN_COLLECTIONS)
}

pub fn parse(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

pub async fn load_from_path(path: &Path) -> Result<FullConfig, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    parse(&raw)
}

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let mut collections = Vec::with_capacity(config.collections.len());
    let mut collection_by_path = HashMap::new();
    for c in &config.collections {
        let resolved = ResolvedCollection {
            name: c.name.clone(),
            path_segment: c.path_segment.clone(),
            filter_field: c.filter_field.clone(),
            operations: c.operations.iter().copied().collect(),
            fields: c.fields.clone(),
        };
        collection_by_path.insert(c.path_segment.clone(), resolved.clone());
        collections.push(resolved);
    }

    Ok(ResolvedModel {
        collections,
        collection_by_path,
    })
}
