///
/// Signature Catalog
///
/// Authoritative name → Signature map of one registration scope. The
/// catalog is shared between threads; `insert_with` holds the entry lock
/// of the name for the whole lookup-then-insert sequence, so concurrent
/// registrations of the same name serialize and exactly one of two
/// conflicting attempts wins. Distinct names only contend on the map's
/// shard locks.
///
/// The `install` hook passed to `insert_with` runs under the same entry
/// lock, which makes the catalog entry and the host rules it installs
/// appear together.
///

mod error;
mod table;

pub use error::RegistryError;
pub use table::{BulkReport, SignatureTable, TableEntry};

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    /// An identical signature was already registered.
    Unchanged,
}

#[derive(Debug, Default)]
pub struct SignatureCatalog {
    entries: DashMap<String, Arc<Signature>>,
}

impl SignatureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, signature: Signature) -> Result<(Arc<Signature>, RegisterOutcome), RegistryError> {
        self.insert_with(signature, |_| {})
    }

    pub fn insert_with(
        &self,
        signature: Signature,
        install: impl FnOnce(&Arc<Signature>),
    ) -> Result<(Arc<Signature>, RegisterOutcome), RegistryError> {
        signature
            .validate()
            .map_err(|reason| RegistryError::InvalidSignature {
                name: signature.name.clone(),
                reason,
            })?;

        match self.entries.entry(signature.name.clone()) {
            Entry::Occupied(existing) => {
                if **existing.get() == signature {
                    Ok((Arc::clone(existing.get()), RegisterOutcome::Unchanged))
                } else {
                    Err(RegistryError::conflict(existing.get(), &signature))
                }
            }
            Entry::Vacant(slot) => {
                let signature = Arc::new(signature);
                install(&signature);
                slot.insert(Arc::clone(&signature));
                Ok((signature, RegisterOutcome::Inserted))
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Signature>, RegistryError> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::unknown_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All signatures, ordered by name.
    pub fn signatures(&self) -> Vec<Arc<Signature>> {
        let mut sigs: Vec<Arc<Signature>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        sigs.sort_by(|a, b| a.name.cmp(&b.name));
        sigs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Parameter, Primitive};

    fn add_i32() -> Signature {
        Signature::new(
            "add_i32",
            Primitive::Int32,
            [Parameter::Value(Primitive::Int32), Parameter::Value(Primitive::Int32)],
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let catalog = SignatureCatalog::new();
        let (stored, outcome) = catalog.insert(add_i32()).unwrap();
        assert_eq!(outcome, RegisterOutcome::Inserted);
        assert_eq!(*stored, add_i32());
        assert_eq!(*catalog.lookup("add_i32").unwrap(), add_i32());
        assert!(catalog.contains("add_i32"));
    }

    #[test]
    fn test_identical_reinsert_is_unchanged() {
        let catalog = SignatureCatalog::new();
        catalog.insert(add_i32()).unwrap();
        let (_, outcome) = catalog.insert(add_i32()).unwrap();
        assert_eq!(outcome, RegisterOutcome::Unchanged);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_conflict_leaves_entry() {
        let catalog = SignatureCatalog::new();
        catalog.insert(add_i32()).unwrap();
        let other = Signature::new("add_i32", Primitive::Int64, [Parameter::Value(Primitive::Int64)]);
        let err = catalog.insert(other).unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {:?}", err);
        assert_eq!(*catalog.lookup("add_i32").unwrap(), add_i32());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_install_hook_runs_once() {
        let catalog = SignatureCatalog::new();
        let mut installs = 0;
        catalog.insert_with(add_i32(), |_| installs += 1).unwrap();
        catalog.insert_with(add_i32(), |_| installs += 1).unwrap();
        assert_eq!(installs, 1, "identical re-registration must not reinstall rules");
    }

    #[test]
    fn test_invalid_signature_is_rejected() {
        let catalog = SignatureCatalog::new();
        let bad = Signature::new("f", Primitive::Int32, [Parameter::Value(Primitive::Void)]);
        let err = catalog.insert(bad).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSignature { .. }));
        assert!(catalog.is_empty());

        let unnamed = Signature::new("1abc", Primitive::Void, []);
        assert!(catalog.insert(unnamed).is_err());
    }

    #[test]
    fn test_unknown_name() {
        let catalog = SignatureCatalog::new();
        assert_eq!(
            catalog.lookup("missing").unwrap_err(),
            RegistryError::unknown_name("missing")
        );
    }

    #[test]
    fn test_names_sorted() {
        let catalog = SignatureCatalog::new();
        for name in ["zeta", "alpha", "mid"] {
            catalog.insert(Signature::new(name, Primitive::Void, [])).unwrap();
        }
        assert_eq!(catalog.names(), vec!["alpha", "mid", "zeta"]);
        let order: Vec<_> = catalog.signatures().iter().map(|s| s.name.clone()).collect();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }
}
