//! Resolved collection model: config validated and flattened for runtime use.

use crate::config::{FieldConfig, Operation};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct ResolvedCollection {
    pub name: String,
    pub path_segment: String,
    pub filter_field: Option<String>,
    pub operations: HashSet<Operation>,
    /// Declaration order is kept; violations are reported in this order.
    pub fields: Vec<FieldConfig>,
}

impl ResolvedCollection {
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.iter().filter(|f| f.unique)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub collections: Vec<ResolvedCollection>,
    pub collection_by_path: HashMap<String, ResolvedCollection>,
}

impl ResolvedModel {
    pub fn collection_by_path(&self, path: &str) -> Option<&ResolvedCollection> {
        self.collection_by_path.get(path)
    }
}
