///
/// External Modules
///
/// An ExternalModule is compiled code produced outside the bridge for one
/// target: a set of symbol definitions and declarations plus an opaque
/// payload (LLVM IR text, bitcode or an object file). A definition may
/// carry the signature it was compiled with, which the linker checks
/// against the calls that reference it, and may carry the address of an
/// in-process native function.
///

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::signature::{is_identifier, Signature};
use crate::target::Target;

use super::error::BuildError;
use super::text::scan_llvm_ir;

/// Address of an in-process native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeFn(usize);

impl NativeFn {
    pub fn new(ptr: *const u8) -> Self {
        NativeFn(ptr as usize)
    }

    pub fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }

    pub fn address(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    LlvmIr,
    LlvmBitcode,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text { format: PayloadFormat, source: String },
    Binary { format: PayloadFormat, bytes: Vec<u8> },
}

impl Payload {
    pub fn format(&self) -> PayloadFormat {
        match self {
            Payload::Text { format, .. } | Payload::Binary { format, .. } => *format,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text { source, .. } => source.as_bytes(),
            Payload::Binary { bytes, .. } => bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub symbol: String,
    pub signature: Option<Signature>,
    pub native: Option<NativeFn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalModule {
    name: String,
    target: Target,
    definitions: IndexMap<String, Definition>,
    declarations: IndexSet<String>,
    payload: Option<Payload>,
}

impl ExternalModule {
    pub fn new(name: impl Into<String>, target: impl Into<Target>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            definitions: IndexMap::new(),
            declarations: IndexSet::new(),
            payload: None,
        }
    }

    /// Builds a module from LLVM-IR text; the text becomes the payload.
    pub fn from_llvm_ir(
        name: impl Into<String>,
        target: impl Into<Target>,
        source: impl Into<String>,
    ) -> Result<Self, BuildError> {
        let source = source.into();
        let symbols = scan_llvm_ir(&source);
        let mut module = Self::new(name, target);
        for symbol in symbols.defined {
            module.insert(Definition {
                symbol,
                signature: None,
                native: None,
            })?;
        }
        for symbol in symbols.declared {
            module.declare(symbol);
        }
        tracing::debug!(
            module = %module.name,
            defined = module.definitions.len(),
            declared = module.declarations.len(),
            "scanned LLVM IR module"
        );
        Ok(module.with_payload(Payload::Text {
            format: PayloadFormat::LlvmIr,
            source,
        }))
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Defines `symbol` without signature information.
    pub fn define(&mut self, symbol: impl Into<String>) -> Result<&mut Self, BuildError> {
        self.insert(Definition {
            symbol: symbol.into(),
            signature: None,
            native: None,
        })?;
        Ok(self)
    }

    /// Defines `signature.name` with a known signature.
    pub fn define_typed(&mut self, signature: Signature) -> Result<&mut Self, BuildError> {
        self.insert(Definition {
            symbol: signature.name.clone(),
            signature: Some(signature),
            native: None,
        })?;
        Ok(self)
    }

    /// Defines `signature.name` as an in-process function at `native`.
    ///
    /// The function must follow the C calling convention with parameters
    /// and result matching `signature`.
    pub fn define_native(&mut self, signature: Signature, native: NativeFn) -> Result<&mut Self, BuildError> {
        self.insert(Definition {
            symbol: signature.name.clone(),
            signature: Some(signature),
            native: Some(native),
        })?;
        Ok(self)
    }

    /// Records a symbol the module expects the host to provide.
    pub fn declare(&mut self, symbol: impl Into<String>) -> &mut Self {
        let symbol = symbol.into();
        if !self.definitions.contains_key(&symbol) {
            self.declarations.insert(symbol);
        }
        self
    }

    fn insert(&mut self, definition: Definition) -> Result<(), BuildError> {
        if definition.symbol.is_empty() || definition.symbol.contains('\0') {
            return Err(BuildError::InvalidModule {
                module: self.name.clone(),
                reason: format!("invalid symbol name {:?}", definition.symbol),
            });
        }
        if let Some(signature) = &definition.signature {
            if !is_identifier(&signature.name) {
                return Err(BuildError::InvalidModule {
                    module: self.name.clone(),
                    reason: format!("'{}' is not a valid identifier", signature.name),
                });
            }
        }
        if self.definitions.contains_key(&definition.symbol) {
            return Err(BuildError::LinkConflict {
                symbol: definition.symbol,
                module: self.name.clone(),
                existing: format!("module '{}'", self.name),
            });
        }
        self.declarations.shift_remove(&definition.symbol);
        self.definitions.insert(definition.symbol.clone(), definition);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    pub fn definition(&self, symbol: &str) -> Option<&Definition> {
        self.definitions.get(symbol)
    }

    pub fn defines(&self, symbol: &str) -> bool {
        self.definitions.contains_key(symbol)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &str> {
        self.declarations.iter().map(String::as_str)
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}
