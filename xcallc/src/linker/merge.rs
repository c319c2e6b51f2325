///
/// Symbol Merging
///
/// Merges the symbols referenced by a lowered user function with the
/// definitions of the build's external modules. Existing definitions are
/// never overwritten: the entry function and every module definition own
/// their symbol, and a second definition is a link conflict. A symbol the
/// function imports stays Declared until some module defines it.
///
/// Module declarations that nothing defines are collected as host
/// imports: they are the external module's own dependencies and are
/// resolved by whoever loads the artifact.
///

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::signature::Signature;

use super::error::BuildError;
use super::module::{ExternalModule, NativeFn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolState {
    /// The entry function itself.
    Local,
    /// Called by the entry function, not yet defined.
    Declared(Arc<Signature>),
    Defined {
        module: String,
        signature: Option<Signature>,
        native: Option<NativeFn>,
    },
}

impl SymbolState {
    fn owner(&self) -> Option<String> {
        match self {
            SymbolState::Local => Some("the user function".to_string()),
            SymbolState::Defined { module, .. } => Some(format!("module '{}'", module)),
            SymbolState::Declared(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedModule {
    symbols: IndexMap<String, SymbolState>,
    host_imports: IndexSet<String>,
}

impl LinkedModule {
    pub fn symbols(&self) -> impl Iterator<Item = (&str, &SymbolState)> {
        self.symbols.iter().map(|(name, state)| (name.as_str(), state))
    }

    pub fn state(&self, symbol: &str) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    pub fn host_imports(&self) -> impl Iterator<Item = &str> {
        self.host_imports.iter().map(String::as_str)
    }

    /// Symbols referenced by the entry function that no module defines.
    pub fn unresolved(&self) -> Vec<String> {
        self.symbols
            .iter()
            .filter(|(_, state)| matches!(state, SymbolState::Declared(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

pub fn link(
    entry: &str,
    imports: &IndexMap<String, Arc<Signature>>,
    modules: &[ExternalModule],
) -> Result<LinkedModule, BuildError> {
    let mut linked = LinkedModule::default();
    linked.symbols.insert(entry.to_string(), SymbolState::Local);

    for (symbol, signature) in imports {
        if symbol == entry {
            return Err(BuildError::LinkConflict {
                symbol: symbol.clone(),
                module: entry.to_string(),
                existing: "the user function".to_string(),
            });
        }
        linked
            .symbols
            .insert(symbol.clone(), SymbolState::Declared(Arc::clone(signature)));
    }

    for module in modules {
        for definition in module.definitions() {
            let state = linked.symbols.get(&definition.symbol);
            if let Some(existing) = state.and_then(SymbolState::owner) {
                return Err(BuildError::LinkConflict {
                    symbol: definition.symbol.clone(),
                    module: module.name().to_string(),
                    existing,
                });
            }
            if let (Some(SymbolState::Declared(expected)), Some(found)) = (state, &definition.signature) {
                if **expected != *found {
                    return Err(BuildError::SignatureMismatch {
                        symbol: definition.symbol.clone(),
                        module: module.name().to_string(),
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
            }

            tracing::trace!(symbol = %definition.symbol, module = module.name(), "defined symbol");
            linked.host_imports.shift_remove(&definition.symbol);
            linked.symbols.insert(
                definition.symbol.clone(),
                SymbolState::Defined {
                    module: module.name().to_string(),
                    signature: definition.signature.clone(),
                    native: definition.native,
                },
            );
        }
        for symbol in module.declarations() {
            if !linked.symbols.contains_key(symbol) {
                linked.host_imports.insert(symbol.to_string());
            }
        }
    }

    Ok(linked)
}
