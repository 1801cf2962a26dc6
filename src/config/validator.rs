//! Config validation: identifier rules, field constraints, route collisions.

use crate::config::{FieldType, FullConfig};
use crate::error::ConfigError;
use std::collections::HashSet;

/// Path segments owned by the service routes.
const RESERVED_PATHS: &[&str] = &["health", "ready", "version"];

/// Keys the store writes into every record.
const RESERVED_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Lowercase ASCII identifier: `[a-z_][a-z0-9_]*`. Names are interpolated into index DDL.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.collections.is_empty() {
        return Err(ConfigError::Validation("at least one collection required".into()));
    }

    let mut names = HashSet::new();
    let mut path_segments = HashSet::new();
    for c in &config.collections {
        if !is_identifier(&c.name) {
            return Err(ConfigError::InvalidName(c.name.clone()));
        }
        if !names.insert(c.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "collection",
                name: c.name.clone(),
            });
        }
        if !is_identifier(&c.path_segment) {
            return Err(ConfigError::InvalidName(c.path_segment.clone()));
        }
        if RESERVED_PATHS.contains(&c.path_segment.as_str()) {
            return Err(ConfigError::Reserved(c.path_segment.clone()));
        }
        if !path_segments.insert(c.path_segment.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "path segment",
                name: c.path_segment.clone(),
            });
        }
        if c.operations.is_empty() {
            return Err(ConfigError::Validation(format!("{}: operations must not be empty", c.name)));
        }

        let mut field_names = HashSet::new();
        for f in &c.fields {
            if !is_identifier(&f.name) {
                return Err(ConfigError::InvalidName(format!("{}.{}", c.name, f.name)));
            }
            if RESERVED_FIELDS.contains(&f.name.as_str()) {
                return Err(ConfigError::Reserved(format!("{}.{}", c.name, f.name)));
            }
            if !field_names.insert(f.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "field",
                    name: format!("{}.{}", c.name, f.name),
                });
            }
            if let Some(allowed) = &f.allowed {
                if f.type_ != FieldType::Text {
                    return Err(ConfigError::Validation(format!(
                        "{}.{}: allowed values require a text field",
                        c.name, f.name
                    )));
                }
                if allowed.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "{}.{}: allowed values must not be empty",
                        c.name, f.name
                    )));
                }
            }
        }

        if let Some(filter) = &c.filter_field {
            if !field_names.contains(filter.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "filter field",
                    id: format!("{}.{}", c.name, filter),
                });
            }
        }
    }

    Ok(())
}
