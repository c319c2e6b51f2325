///
/// Compilation Artifacts
///
/// The immutable result of a finalized build: the entry function's IR,
/// the ordered import table, the linked symbol table, the merged external
/// modules and, for targets with an ISA, a relocatable object. Artifacts
/// are shared as `Arc<CompilationArtifact>` and handed to whatever
/// dispatches the compiled function.
///
/// The fingerprint is a blake3 digest over the target, the entry IR, the
/// imports and every merged module payload, so two builds that would
/// behave the same produce the same fingerprint.
///

use std::path::Path;
use std::sync::Arc;

use cranelift::prelude::*;
use cranelift_codegen::ir::Function;
use cranelift_codegen::isa::{CallConv, OwnedTargetIsa};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::signature::Signature as ExternSignature;
use crate::target::Target;
use crate::types::{Primitive, ValueType};
use crate::udf::LoweredFunction;

use super::error::BuildError;
use super::merge::{LinkedModule, SymbolState};
use super::module::{ExternalModule, NativeFn, PayloadFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub symbol: String,
    pub signature: Arc<ExternSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolOrigin {
    Entry,
    Module(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSymbol {
    pub origin: SymbolOrigin,
    pub signature: Option<ExternSignature>,
    pub native: Option<NativeFn>,
}

#[derive(Debug)]
pub struct CompilationArtifact {
    target: Target,
    entry: String,
    params: Vec<ValueType>,
    return_type: Primitive,
    function: Function,
    call_conv: CallConv,
    pointer_type: Type,
    imports: Vec<ImportEntry>,
    symbols: IndexMap<String, LinkedSymbol>,
    host_imports: Vec<String>,
    modules: Vec<ExternalModule>,
    object: Option<Vec<u8>>,
    fingerprint: String,
}

pub(super) struct ArtifactParts<'a> {
    pub target: Target,
    pub lowered: &'a LoweredFunction,
    pub linked: &'a LinkedModule,
    pub modules: Vec<ExternalModule>,
    pub call_conv: CallConv,
    pub pointer_type: Type,
}

impl CompilationArtifact {
    pub(super) fn assemble(parts: ArtifactParts<'_>, isa: Option<OwnedTargetIsa>) -> Result<Self, BuildError> {
        let ArtifactParts {
            target,
            lowered,
            linked,
            modules,
            call_conv,
            pointer_type,
        } = parts;

        let imports = lowered
            .imports
            .iter()
            .map(|(symbol, signature)| ImportEntry {
                symbol: symbol.clone(),
                signature: Arc::clone(signature),
            })
            .collect();

        let mut symbols = IndexMap::new();
        for (name, state) in linked.symbols() {
            let symbol = match state {
                SymbolState::Local => LinkedSymbol {
                    origin: SymbolOrigin::Entry,
                    signature: None,
                    native: None,
                },
                SymbolState::Defined {
                    module,
                    signature,
                    native,
                } => LinkedSymbol {
                    origin: SymbolOrigin::Module(module.clone()),
                    signature: signature.clone(),
                    native: *native,
                },
                SymbolState::Declared(_) => {
                    return Err(BuildError::UnresolvedSymbol {
                        target: target.to_string(),
                        symbols: linked.unresolved(),
                    });
                }
            };
            symbols.insert(name.to_string(), symbol);
        }

        let mut artifact = Self {
            target,
            entry: lowered.name.clone(),
            params: lowered.params.clone(),
            return_type: lowered.return_type,
            function: lowered.function.clone(),
            call_conv,
            pointer_type,
            imports,
            symbols,
            host_imports: linked.host_imports().map(str::to_string).collect(),
            modules,
            object: None,
            fingerprint: String::new(),
        };

        if let Some(isa) = isa {
            let bytes = artifact.emit_object(isa)?;
            tracing::debug!(entry = %artifact.entry, bytes = bytes.len(), "emitted object code");
            artifact.object = Some(bytes);
        }
        artifact.fingerprint = artifact.digest();
        Ok(artifact)
    }

    fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.target.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(self.clif().as_bytes());
        for import in &self.imports {
            hasher.update(import.signature.to_string().as_bytes());
            hasher.update(&[0]);
        }
        for module in &self.modules {
            hasher.update(module.name().as_bytes());
            hasher.update(&[0]);
            for definition in module.definitions() {
                hasher.update(definition.symbol.as_bytes());
                hasher.update(&[0]);
            }
            if let Some(payload) = module.payload() {
                hasher.update(payload.as_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    fn emit_object(&self, isa: OwnedTargetIsa) -> Result<Vec<u8>, BuildError> {
        let builder = ObjectBuilder::new(isa, self.entry.as_str(), default_libcall_names())
            .map_err(|e| BuildError::Codegen(format!("failed to create object builder: {}", e)))?;
        let mut module = ObjectModule::new(builder);
        self.define_in(&mut module)?;
        let product = module.finish();
        product
            .emit()
            .map_err(|e| BuildError::Codegen(format!("failed to emit object file: {}", e)))
    }

    /// Declares the imports and defines the entry function in a fresh
    /// Cranelift module. Import `n` must receive FuncId `n`, so `module`
    /// must not contain other declarations yet.
    pub fn define_in<M: Module>(&self, module: &mut M) -> Result<FuncId, BuildError> {
        for (index, import) in self.imports.iter().enumerate() {
            let sig = import
                .signature
                .clif_signature(self.call_conv, self.pointer_type);
            let id = module
                .declare_function(&import.symbol, Linkage::Import, &sig)
                .map_err(|e| BuildError::Codegen(format!("failed to declare '{}': {}", import.symbol, e)))?;
            if id.as_u32() as usize != index {
                return Err(BuildError::Codegen(format!(
                    "'{}' declared as function {} instead of {}; the module must be fresh",
                    import.symbol,
                    id.as_u32(),
                    index
                )));
            }
        }

        let entry = module
            .declare_function(&self.entry, Linkage::Export, &self.function.signature)
            .map_err(|e| BuildError::Codegen(format!("failed to declare '{}': {}", self.entry, e)))?;
        let mut ctx = module.make_context();
        ctx.func = self.function.clone();
        module
            .define_function(entry, &mut ctx)
            .map_err(|e| BuildError::Codegen(format!("failed to define '{}': {}", self.entry, e)))?;
        module.clear_context(&mut ctx);
        Ok(entry)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn return_type(&self) -> Primitive {
        self.return_type
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn clif(&self) -> String {
        self.function.display().to_string()
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    pub fn symbols(&self) -> &IndexMap<String, LinkedSymbol> {
        &self.symbols
    }

    pub fn symbol(&self, name: &str) -> Option<&LinkedSymbol> {
        self.symbols.get(name)
    }

    /// Symbols defined by in-process native functions, with their address.
    pub fn native_symbols(&self) -> impl Iterator<Item = (&str, NativeFn)> {
        self.symbols
            .iter()
            .filter_map(|(name, symbol)| symbol.native.map(|native| (name.as_str(), native)))
    }

    pub fn host_imports(&self) -> &[String] {
        &self.host_imports
    }

    pub fn modules(&self) -> &[ExternalModule] {
        &self.modules
    }

    pub fn object(&self) -> Option<&[u8]> {
        self.object.as_deref()
    }

    pub fn write_object(&self, path: impl AsRef<Path>) -> Result<(), BuildError> {
        let path = path.as_ref();
        let bytes = self.object.as_ref().ok_or_else(|| {
            BuildError::Codegen(format!("target '{}' produced no object code", self.target))
        })?;
        std::fs::write(path, bytes).map_err(|e| {
            BuildError::Codegen(format!("failed to write object file {}: {}", path.display(), e))
        })?;
        tracing::info!(entry = %self.entry, path = %path.display(), "wrote object file");
        Ok(())
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn manifest(&self) -> ArtifactManifest {
        ArtifactManifest {
            entry: self.entry.clone(),
            target: self.target.clone(),
            params: self.params.iter().map(ToString::to_string).collect(),
            return_type: self.return_type,
            imports: self
                .imports
                .iter()
                .map(|import| {
                    let linked = self.symbols.get(&import.symbol);
                    ManifestImport {
                        symbol: import.symbol.clone(),
                        signature: import.signature.to_string(),
                        module: linked.and_then(|s| match &s.origin {
                            SymbolOrigin::Module(name) => Some(name.clone()),
                            SymbolOrigin::Entry => None,
                        }),
                        native: linked.is_some_and(|s| s.native.is_some()),
                    }
                })
                .collect(),
            host_imports: self.host_imports.clone(),
            modules: self
                .modules
                .iter()
                .map(|module| ManifestModule {
                    name: module.name().to_string(),
                    format: module.payload().map(|p| p.format()),
                    definitions: module.definitions().map(|d| d.symbol.clone()).collect(),
                })
                .collect(),
            object_size: self.object.as_ref().map(Vec::len),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub entry: String,
    pub target: Target,
    pub params: Vec<String>,
    pub return_type: Primitive,
    pub imports: Vec<ManifestImport>,
    pub host_imports: Vec<String>,
    pub modules: Vec<ManifestModule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_size: Option<usize>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestImport {
    pub symbol: String,
    pub signature: String,
    pub module: Option<String>,
    pub native: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestModule {
    pub name: String,
    pub format: Option<PayloadFormat>,
    pub definitions: Vec<String>,
}

impl ArtifactManifest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
