//!
//! Primitive and Value Types
//!
//! The closed type vocabulary shared by signatures, the typing bridge and
//! the lowering bridge:
//!
//! - Primitive: int8, int16, int32, int64, float32, float64, bool, void
//! - Parameter: how a native function receives an argument (by value or
//!   by pointer to a primitive)
//! - ValueType: the type of an expression inside a user function, which
//!   adds contiguous buffers on top of scalars and raw pointers
//!
//! Buffers never reach native code directly. A buffer argument decays to
//! a pointer to its element type when the parameter is a pointer.
//!

use std::fmt;
use std::str::FromStr;

use cranelift::prelude::{types, Type};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Primitive {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown primitive type '{0}'")]
pub struct UnknownPrimitive(pub String);

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Int8,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Int64,
        Primitive::Float32,
        Primitive::Float64,
        Primitive::Bool,
        Primitive::Void,
    ];

    /// Canonical name, as written back by `Signature`'s Display.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
        }
    }

    /// Resolves a canonical name or one of the C/Rust spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int8" | "i8" => Some(Primitive::Int8),
            "int16" | "i16" => Some(Primitive::Int16),
            "int32" | "i32" | "int" => Some(Primitive::Int32),
            "int64" | "i64" => Some(Primitive::Int64),
            "float32" | "f32" | "float" => Some(Primitive::Float32),
            "float64" | "f64" | "double" => Some(Primitive::Float64),
            "bool" => Some(Primitive::Bool),
            "void" => Some(Primitive::Void),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::Float32 | Primitive::Float64)
    }

    pub fn is_void(self) -> bool {
        self == Primitive::Void
    }

    pub fn bit_width(self) -> u32 {
        match self {
            Primitive::Int8 | Primitive::Bool => 8,
            Primitive::Int16 => 16,
            Primitive::Int32 | Primitive::Float32 => 32,
            Primitive::Int64 | Primitive::Float64 => 64,
            Primitive::Void => 0,
        }
    }

    /// Cranelift type of a value of this primitive; `None` for void.
    pub fn clif_type(self) -> Option<Type> {
        match self {
            Primitive::Int8 | Primitive::Bool => Some(types::I8),
            Primitive::Int16 => Some(types::I16),
            Primitive::Int32 => Some(types::I32),
            Primitive::Int64 => Some(types::I64),
            Primitive::Float32 => Some(types::F32),
            Primitive::Float64 => Some(types::F64),
            Primitive::Void => None,
        }
    }

    /// Whether a value of `self` may be implicitly converted to `target`
    /// when passed by value.
    pub fn converts_to(self, target: Primitive) -> bool {
        if self.is_void() || target.is_void() {
            return false;
        }
        if self == target {
            return true;
        }
        match (self, target) {
            (from, to) if from.is_integer() && to.is_integer() => true,
            (Primitive::Bool, to) if to.is_integer() => true,
            (from, to) if from.is_integer() && to.is_float() => true,
            (from, to) if from.is_float() && to.is_float() => true,
            _ => false,
        }
    }

    /// Whether an integer literal fits this primitive's width.
    pub fn fits_int(self, value: i64) -> bool {
        match self {
            Primitive::Int8 => i8::try_from(value).is_ok(),
            Primitive::Int16 => i16::try_from(value).is_ok(),
            Primitive::Int32 => i32::try_from(value).is_ok(),
            Primitive::Int64 => true,
            _ => false,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Primitive {
    type Err = UnknownPrimitive;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Primitive::from_name(s.trim()).ok_or_else(|| UnknownPrimitive(s.to_string()))
    }
}

impl TryFrom<String> for Primitive {
    type Error = UnknownPrimitive;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Primitive> for String {
    fn from(value: Primitive) -> Self {
        value.name().to_string()
    }
}

/// How a native function receives one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Value(Primitive),
    Pointer(Primitive),
}

impl Parameter {
    pub fn from_flag(ty: Primitive, is_pointer: bool) -> Self {
        if is_pointer {
            Parameter::Pointer(ty)
        } else {
            Parameter::Value(ty)
        }
    }

    pub fn primitive(self) -> Primitive {
        match self {
            Parameter::Value(ty) | Parameter::Pointer(ty) => ty,
        }
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, Parameter::Pointer(_))
    }

    pub fn clif_type(self, pointer_type: Type) -> Option<Type> {
        match self {
            Parameter::Value(ty) => ty.clif_type(),
            Parameter::Pointer(_) => Some(pointer_type),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Value(ty) => write!(f, "{}", ty),
            Parameter::Pointer(ty) => write!(f, "{}*", ty),
        }
    }
}

/// Type of an expression inside a user function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar(Primitive),
    Pointer(Primitive),
    /// Pointer to a buffer header; the element data is reached through
    /// the header's data pointer.
    Buffer(Primitive),
}

impl ValueType {
    pub fn is_void(self) -> bool {
        self == ValueType::Scalar(Primitive::Void)
    }

    pub fn clif_type(self, pointer_type: Type) -> Option<Type> {
        match self {
            ValueType::Scalar(ty) => ty.clif_type(),
            ValueType::Pointer(_) | ValueType::Buffer(_) => Some(pointer_type),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Scalar(ty) => write!(f, "{}", ty),
            ValueType::Pointer(ty) => write!(f, "{}*", ty),
            ValueType::Buffer(ty) => write!(f, "buffer<{}>", ty),
        }
    }
}

/// How an argument reaches a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coercion {
    Exact,
    /// Buffer passed where a pointer to its element type is expected.
    Decay,
    /// Numeric widening/truncation, or a typed pointer passed as `void*`.
    Convert,
}

impl Coercion {
    /// Exact and decayed arguments match structurally; conversions do not.
    pub fn is_structural(self) -> bool {
        matches!(self, Coercion::Exact | Coercion::Decay)
    }
}

pub fn coerce(arg: ValueType, param: Parameter) -> Option<Coercion> {
    match (param, arg) {
        (Parameter::Value(Primitive::Void), _) => None,
        (Parameter::Value(expected), ValueType::Scalar(found)) => {
            if expected == found {
                Some(Coercion::Exact)
            } else if found.converts_to(expected) {
                Some(Coercion::Convert)
            } else {
                None
            }
        }
        (Parameter::Value(_), _) => None,
        (Parameter::Pointer(expected), ValueType::Pointer(found)) => {
            if expected == found {
                Some(Coercion::Exact)
            } else if expected.is_void() {
                Some(Coercion::Convert)
            } else {
                None
            }
        }
        (Parameter::Pointer(expected), ValueType::Buffer(element)) => {
            if expected == element {
                Some(Coercion::Decay)
            } else if expected.is_void() {
                Some(Coercion::Convert)
            } else {
                None
            }
        }
        (Parameter::Pointer(_), ValueType::Scalar(_)) => None,
    }
}
