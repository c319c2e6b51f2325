//!
//! Native Function Signatures
//!
//! A Signature is the declared name, return type and ordered parameters of
//! an externally implemented function. Its Display form is the declaration
//! grammar with canonical type names, so printing a signature and parsing
//! the result yields the same signature.
//!

use std::fmt;

use cranelift::prelude::{AbiParam, Type};
use cranelift_codegen::ir;
use cranelift_codegen::isa::CallConv;
use smallvec::SmallVec;

use crate::types::{Parameter, Primitive};

pub type Params = SmallVec<[Parameter; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: String,
    pub return_type: Primitive,
    pub params: Params,
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        return_type: Primitive,
        params: impl IntoIterator<Item = Parameter>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            params: params.into_iter().collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Rejects names that are not identifiers and `void` value parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.name) {
            return Err(format!("'{}' is not a valid identifier", self.name));
        }
        for (index, param) in self.params.iter().enumerate() {
            match param {
                Parameter::Value(Primitive::Void) => {
                    return Err(format!("parameter {} is a void value", index + 1));
                }
                Parameter::Value(_) | Parameter::Pointer(_) => {}
            }
        }
        Ok(())
    }

    /// Machine-level signature of the foreign call.
    pub fn clif_signature(&self, call_conv: CallConv, pointer_type: Type) -> ir::Signature {
        let mut sig = ir::Signature::new(call_conv);
        for param in &self.params {
            if let Some(ty) = param.clif_type(pointer_type) {
                sig.params.push(abi_param(param.primitive(), param.is_pointer(), ty));
            }
        }
        if let Some(ty) = self.return_type.clif_type() {
            sig.returns.push(abi_param(self.return_type, false, ty));
        }
        sig
    }
}

/// Narrow integers are extended to register width at the call boundary.
pub(crate) fn abi_param(primitive: Primitive, is_pointer: bool, ty: Type) -> AbiParam {
    if is_pointer {
        return AbiParam::new(ty);
    }
    match primitive {
        Primitive::Int8 | Primitive::Int16 => AbiParam::new(ty).sext(),
        Primitive::Bool => AbiParam::new(ty).uext(),
        _ => AbiParam::new(ty),
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}
