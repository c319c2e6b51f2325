///
/// Catalog Errors
///
/// Registration failures. A failed registration never changes the
/// catalog or the host registries.
///

use thiserror::Error;

use crate::signature::Signature;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("'{name}' is already registered as '{existing}', cannot register '{attempted}'")]
    Conflict {
        name: String,
        existing: Box<Signature>,
        attempted: Box<Signature>,
    },

    #[error("no external function named '{name}' is registered")]
    UnknownName { name: String },

    #[error("invalid signature for '{name}': {reason}")]
    InvalidSignature { name: String, reason: String },

    #[error("invalid signature table: {0}")]
    Table(String),
}

impl RegistryError {
    pub fn conflict(existing: &Signature, attempted: &Signature) -> Self {
        RegistryError::Conflict {
            name: attempted.name.clone(),
            existing: Box::new(existing.clone()),
            attempted: Box::new(attempted.clone()),
        }
    }

    pub fn unknown_name(name: impl Into<String>) -> Self {
        RegistryError::UnknownName { name: name.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::Conflict { .. })
    }
}
