//! Raw config types matching the collections JSON document.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON value kind a field accepts. No implicit coercion between kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Number,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Enumerated values; only valid on text fields.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub path_segment: String,
    /// Field matched by `GET /<path_segment>/:value`. Without it that route reads by id.
    #[serde(default)]
    pub filter_field: Option<String>,
    pub operations: Vec<Operation>,
    pub fields: Vec<FieldConfig>,
}

/// All collection declarations in one document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub collections: Vec<CollectionConfig>,
}
