//!
//! xcall-std-libm - C Math Library for xcall
//!
//! Ships the float32/float64 C math signatures as a bulk table and a `cpu`
//! external module defining each of them natively:
//!
//! ```ignore
//! let registry = Registry::new(&host, "libm");
//! xcall_std_libm::register(&registry)?;
//! let module = xcall_std_libm::cpu_module()?;
//! ```
//!

pub mod native;

use std::collections::HashMap;

use xcallc::catalog::{BulkReport, RegistryError, SignatureTable};
use xcallc::linker::{BuildError, ExternalModule};
use xcallc::registry::Registry;
use xcallc::target::Target;

pub const MODULE_NAME: &str = "libm";

const TABLE_JSON: &str = include_str!("libm.json");

pub fn table() -> Result<SignatureTable, RegistryError> {
    SignatureTable::from_json(TABLE_JSON)
}

/// Registers the whole table in `registry`. Entries already declared with
/// the same signature are reported as unchanged.
pub fn register(registry: &Registry) -> Result<BulkReport, RegistryError> {
    let table = table()?;
    let report = registry.register_bulk(&table);
    if !report.is_clean() {
        tracing::warn!(
            scope = %registry.scope(),
            conflicts = report.conflicts.len(),
            "libm table conflicts with existing declarations"
        );
    }
    Ok(report)
}

/// Builds the `cpu` module defining every table entry with its native
/// implementation.
pub fn cpu_module() -> Result<ExternalModule, BuildError> {
    let table = table().map_err(|e| invalid(e.to_string()))?;
    let natives: HashMap<_, _> = native::symbols().into_iter().collect();

    let mut module = ExternalModule::new(MODULE_NAME, Target::cpu());
    for signature in table.signatures() {
        let native = natives
            .get(signature.name.as_str())
            .copied()
            .ok_or_else(|| invalid(format!("no native definition for '{}'", signature.name)))?;
        module.define_native(signature, native)?;
    }
    tracing::debug!(definitions = table.len(), "built libm cpu module");
    Ok(module)
}

fn invalid(reason: String) -> BuildError {
    BuildError::InvalidModule {
        module: MODULE_NAME.to_string(),
        reason,
    }
}
