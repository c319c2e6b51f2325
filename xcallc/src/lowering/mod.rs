///
/// Call Lowering Bridge
///
/// Host-side lowering registry. Every registered Signature installs a
/// lowering rule keyed by its name. Given the argument values of a
/// type-checked call site, a rule marshals them to the declared parameter
/// types and emits a Cranelift `call` to an imported function whose
/// external symbol is literally the signature's name.
///
/// A LoweringContext carries the per-function state: target pointer type,
/// calling convention, buffer header layout and the table of imported
/// symbols in first-use order. Import index `n` is referenced from the IR
/// as user external name `u0:n`.
///

mod error;
mod marshal;

pub use error::LoweringError;
pub use marshal::{address_of, convert_scalar, BufferLayout};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use cranelift::prelude::*;
use cranelift_codegen::ir::{ExtFuncData, ExternalName, FuncRef, UserExternalName};
use cranelift_codegen::isa::CallConv;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::registry::ScopeId;
use crate::signature::Signature as ExternSignature;
use crate::types::{Parameter, ValueType};

#[derive(Debug, Clone)]
pub struct LoweringRule {
    scopes: SmallVec<[ScopeId; 2]>,
    signature: Arc<ExternSignature>,
}

impl LoweringRule {
    pub fn signature(&self) -> &Arc<ExternSignature> {
        &self.signature
    }

    /// Emits the foreign call. Returns the call's result, or `None` for a
    /// void function.
    pub fn emit(
        &self,
        cx: &mut LoweringContext,
        builder: &mut FunctionBuilder,
        args: &[(Value, ValueType)],
    ) -> Result<Option<Value>, LoweringError> {
        let symbol = self.signature.name.as_str();
        if args.len() != self.signature.arity() {
            return Err(LoweringError::marshal(
                symbol,
                args.len(),
                format!("expected {} argument(s)", self.signature.arity()),
            ));
        }

        let func_ref = cx.import(builder, &self.signature)?;

        let mut values: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len());
        for (index, (param, &(value, ty))) in self.signature.params.iter().zip(args).enumerate() {
            let marshaled = match (*param, ty) {
                (Parameter::Value(to), ValueType::Scalar(from)) => {
                    convert_scalar(builder, value, from, to)
                }
                (Parameter::Value(to), found) => {
                    Err(format!("expected a {} value, found {}", to, found))
                }
                (Parameter::Pointer(_), found) => {
                    address_of(builder, &cx.buffer, value, found, cx.pointer_type)
                }
            };
            values.push(marshaled.map_err(|reason| LoweringError::marshal(symbol, index + 1, reason))?);
        }

        let call = builder.ins().call(func_ref, &values);
        tracing::debug!(symbol, args = values.len(), "lowered external call");

        if self.signature.return_type.is_void() {
            return Ok(None);
        }
        builder
            .inst_results(call)
            .first()
            .copied()
            .map(Some)
            .ok_or_else(|| LoweringError::MissingResult {
                symbol: symbol.to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct LoweringRegistry {
    rules: RwLock<HashMap<String, Vec<LoweringRule>>>,
}

impl LoweringRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn install(&self, scope: ScopeId, signature: &Arc<ExternSignature>) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let overloads = rules.entry(signature.name.clone()).or_default();
        match overloads.iter_mut().find(|r| *r.signature == **signature) {
            Some(rule) => {
                if !rule.scopes.contains(&scope) {
                    rule.scopes.push(scope);
                }
            }
            None => overloads.push(LoweringRule {
                scopes: SmallVec::from_elem(scope, 1),
                signature: Arc::clone(signature),
            }),
        }
    }

    pub(crate) fn remove_scope(&self, scope: ScopeId) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.retain(|_, overloads| {
            overloads.retain_mut(|rule| {
                rule.scopes.retain(|s| *s != scope);
                !rule.scopes.is_empty()
            });
            !overloads.is_empty()
        });
    }

    /// The rule installed for exactly this signature.
    pub fn rule_for(&self, signature: &ExternSignature) -> Result<LoweringRule, LoweringError> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signature.name)
            .and_then(|overloads| overloads.iter().find(|r| *r.signature == *signature))
            .cloned()
            .ok_or_else(|| LoweringError::MissingRule {
                signature: signature.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct ImportedSymbol {
    pub signature: Arc<ExternSignature>,
    pub func_ref: FuncRef,
}

#[derive(Debug)]
pub struct LoweringContext {
    pointer_type: Type,
    call_conv: CallConv,
    buffer: BufferLayout,
    imports: IndexMap<String, ImportedSymbol>,
}

impl LoweringContext {
    pub fn new(pointer_type: Type, call_conv: CallConv, buffer: BufferLayout) -> Self {
        Self {
            pointer_type,
            call_conv,
            buffer,
            imports: IndexMap::new(),
        }
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer_type
    }

    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    pub fn imports(&self) -> &IndexMap<String, ImportedSymbol> {
        &self.imports
    }

    pub fn into_imports(self) -> IndexMap<String, Arc<ExternSignature>> {
        self.imports
            .into_iter()
            .map(|(name, import)| (name, import.signature))
            .collect()
    }

    /// Declares `signature.name` as an imported function of the function
    /// being built, once per symbol.
    pub fn import(
        &mut self,
        builder: &mut FunctionBuilder,
        signature: &Arc<ExternSignature>,
    ) -> Result<FuncRef, LoweringError> {
        if let Some(existing) = self.imports.get(&signature.name) {
            if *existing.signature != **signature {
                return Err(LoweringError::SymbolClash {
                    symbol: signature.name.clone(),
                    existing: existing.signature.to_string(),
                    attempted: signature.to_string(),
                });
            }
            return Ok(existing.func_ref);
        }

        let index = self.imports.len() as u32;
        let sig_ref = builder.import_signature(signature.clif_signature(self.call_conv, self.pointer_type));
        let name_ref = builder
            .func
            .declare_imported_user_function(UserExternalName::new(0, index));
        let func_ref = builder.import_function(ExtFuncData {
            name: ExternalName::user(name_ref),
            signature: sig_ref,
            colocated: false,
        });

        tracing::trace!(symbol = %signature.name, index, "imported external symbol");
        self.imports.insert(
            signature.name.clone(),
            ImportedSymbol {
                signature: Arc::clone(signature),
                func_ref,
            },
        );
        Ok(func_ref)
    }
}
