//!
//! Bulk Signature Tables
//!
//! A table maps function names to `(return_type, [(type, is_pointer), ...])`
//! and is loaded from JSON or TOML:
//!
//! ```json
//! { "hypot": ["float64", [["float64", false], ["float64", false]]],
//!   "modf":  ["float64", [["float64", false], ["float64", true]]] }
//! ```
//!
//! ```toml
//! hypot = ["float64", [["float64", false], ["float64", false]]]
//! ```
//!
//! Entries keep file order so registration and reports are deterministic.
//!

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::signature::Signature;
use crate::types::{Parameter, Primitive};

use super::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry(pub Primitive, pub Vec<(Primitive, bool)>);

impl TableEntry {
    pub fn signature(&self, name: &str) -> Signature {
        Signature::new(
            name,
            self.0,
            self.1
                .iter()
                .map(|&(ty, is_pointer)| Parameter::from_flag(ty, is_pointer)),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureTable(IndexMap<String, TableEntry>);

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(source: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(source).map_err(|e| RegistryError::Table(e.to_string()))
    }

    pub fn from_toml(source: &str) -> Result<Self, RegistryError> {
        toml::from_str(source).map_err(|e| RegistryError::Table(e.to_string()))
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        return_type: Primitive,
        params: impl IntoIterator<Item = (Primitive, bool)>,
    ) {
        self.0.insert(
            name.into(),
            TableEntry(return_type, params.into_iter().collect()),
        );
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn signatures(&self) -> impl Iterator<Item = Signature> + '_ {
        self.0.iter().map(|(name, entry)| entry.signature(name))
    }
}

/// Outcome of registering a whole table. Entries are independent: a
/// failing entry is reported and the rest are still applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub registered: Vec<String>,
    pub unchanged: Vec<String>,
    pub conflicts: Vec<RegistryError>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.registered.len() + self.unchanged.len() + self.conflicts.len()
    }
}
