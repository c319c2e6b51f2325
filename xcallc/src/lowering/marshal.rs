//!
//! Argument Marshaling
//!
//! Scalar widening/truncation and buffer-to-pointer decay, emitted as
//! Cranelift instructions in front of a foreign call.
//!

use cranelift::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::{Primitive, ValueType};

/// Where a buffer header keeps its data pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferLayout {
    /// Byte offset of the data pointer inside the header.
    pub data_offset: i32,
}

impl BufferLayout {
    pub fn data_pointer(&self, builder: &mut FunctionBuilder, header: Value, pointer_type: Type) -> Value {
        builder
            .ins()
            .load(pointer_type, MemFlags::trusted(), header, self.data_offset)
    }
}

/// Converts a scalar of type `from` to `to`. Only conversions permitted
/// by `Primitive::converts_to` are handled.
pub fn convert_scalar(
    builder: &mut FunctionBuilder,
    value: Value,
    from: Primitive,
    to: Primitive,
) -> Result<Value, String> {
    if from == to {
        return Ok(value);
    }
    let (Some(from_ty), Some(to_ty)) = (from.clif_type(), to.clif_type()) else {
        return Err(format!("cannot convert {} to {}", from, to));
    };

    let converted = match (from, to) {
        (Primitive::Bool, to) if to.is_integer() => {
            if to_ty.bits() > from_ty.bits() {
                builder.ins().uextend(to_ty, value)
            } else {
                value
            }
        }
        (from, to) if from.is_integer() && to.is_integer() => {
            if to_ty.bits() > from_ty.bits() {
                builder.ins().sextend(to_ty, value)
            } else {
                builder.ins().ireduce(to_ty, value)
            }
        }
        (from, to) if from.is_integer() && to.is_float() => {
            let value = if from_ty.bits() < 32 {
                builder.ins().sextend(types::I32, value)
            } else {
                value
            };
            builder.ins().fcvt_from_sint(to_ty, value)
        }
        (Primitive::Float32, Primitive::Float64) => builder.ins().fpromote(to_ty, value),
        (Primitive::Float64, Primitive::Float32) => builder.ins().fdemote(to_ty, value),
        _ => return Err(format!("cannot convert {} to {}", from, to)),
    };
    Ok(converted)
}

/// Address passed for a pointer parameter.
pub fn address_of(
    builder: &mut FunctionBuilder,
    layout: &BufferLayout,
    value: Value,
    ty: ValueType,
    pointer_type: Type,
) -> Result<Value, String> {
    match ty {
        ValueType::Pointer(_) => Ok(value),
        ValueType::Buffer(_) => Ok(layout.data_pointer(builder, value, pointer_type)),
        ValueType::Scalar(found) => Err(format!("expected an address, found {}", found)),
    }
}
