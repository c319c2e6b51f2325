///
/// User Function Lowering
///
/// Builds the Cranelift IR of a type-checked user function. Calls are
/// handed to the lowering rule installed for their resolved signature;
/// the LoweringContext records every external symbol in first-use order.
///
/// Body lowering stops at the first return. Void functions without an
/// explicit return get one appended.
///

use std::sync::Arc;

use cranelift::prelude::*;
use cranelift_codegen::ir::{Function, UserFuncName};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use indexmap::IndexMap;

use crate::lowering::{convert_scalar, LoweringContext, LoweringError, LoweringRegistry};
use crate::signature::{abi_param, Signature as ExternSignature};
use crate::types::{Primitive, ValueType};

use super::check::{TypedExpr, TypedExprKind, TypedFunction, TypedStmt};

#[derive(Debug, Clone)]
pub struct LoweredFunction {
    pub name: String,
    pub params: Vec<ValueType>,
    pub return_type: Primitive,
    pub function: Function,
    /// External symbols referenced by the body, in first-use order. The
    /// position of a symbol is its `u0:n` user name in `function`.
    pub imports: IndexMap<String, Arc<ExternSignature>>,
}

impl LoweredFunction {
    pub fn clif(&self) -> String {
        self.function.display().to_string()
    }
}

pub fn lower(
    typed: &TypedFunction,
    rules: &LoweringRegistry,
    mut cx: LoweringContext,
    verify: bool,
) -> Result<LoweredFunction, LoweringError> {
    let pointer_type = cx.pointer_type();
    let mut sig = Signature::new(cx.call_conv());
    for param in &typed.params {
        let ty = param.clif_type(pointer_type).ok_or_else(|| {
            LoweringError::Unsupported(format!("parameter of type {} in '{}'", param, typed.name))
        })?;
        let abi = match param {
            ValueType::Scalar(primitive) => abi_param(*primitive, false, ty),
            ValueType::Pointer(_) | ValueType::Buffer(_) => AbiParam::new(ty),
        };
        sig.params.push(abi);
    }
    if let Some(ty) = typed.return_type.clif_type() {
        sig.returns.push(abi_param(typed.return_type, false, ty));
    }

    let mut function = Function::with_name_signature(UserFuncName::testcase(&typed.name), sig);
    let mut fctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut function, &mut fctx);

    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);
    let params = builder.block_params(entry).to_vec();

    let mut lowerer = Lowerer {
        rules,
        cx: &mut cx,
        params: &params,
    };

    let mut returned = false;
    for stmt in &typed.body {
        match stmt {
            TypedStmt::Eval(expr) => {
                lowerer.expr(&mut builder, expr)?;
            }
            TypedStmt::Return(None) => {
                builder.ins().return_(&[]);
                returned = true;
            }
            TypedStmt::Return(Some(expr)) => {
                let value = lowerer.value(&mut builder, expr)?;
                let value = match expr.ty {
                    ValueType::Scalar(from) => convert_scalar(&mut builder, value, from, typed.return_type)
                        .map_err(|reason| LoweringError::Unsupported(format!("return of '{}': {}", typed.name, reason)))?,
                    other => {
                        return Err(LoweringError::Unsupported(format!(
                            "return of {} from '{}'",
                            other, typed.name
                        )));
                    }
                };
                builder.ins().return_(&[value]);
                returned = true;
            }
        }
        if returned {
            break;
        }
    }
    if !returned {
        if !typed.return_type.is_void() {
            return Err(LoweringError::Unsupported(format!(
                "'{}' falls off the end without a value",
                typed.name
            )));
        }
        builder.ins().return_(&[]);
    }
    builder.finalize();

    if verify {
        let flags = settings::Flags::new(settings::builder());
        cranelift_codegen::verify_function(&function, &flags).map_err(|errors| {
            LoweringError::Verifier {
                function: typed.name.clone(),
                message: errors.to_string(),
            }
        })?;
    }

    let imports = cx.into_imports();
    tracing::debug!(function = %typed.name, imports = imports.len(), "lowered user function");

    Ok(LoweredFunction {
        name: typed.name.clone(),
        params: typed.params.clone(),
        return_type: typed.return_type,
        function,
        imports,
    })
}

struct Lowerer<'a> {
    rules: &'a LoweringRegistry,
    cx: &'a mut LoweringContext,
    params: &'a [Value],
}

impl Lowerer<'_> {
    fn value(&mut self, builder: &mut FunctionBuilder, expr: &TypedExpr) -> Result<Value, LoweringError> {
        match self.expr(builder, expr)? {
            Some(value) => Ok(value),
            None => Err(LoweringError::MissingResult {
                symbol: match &expr.kind {
                    TypedExprKind::Call(site) => site.signature.name.clone(),
                    _ => format!("{:?}", expr.kind),
                },
            }),
        }
    }

    fn expr(&mut self, builder: &mut FunctionBuilder, expr: &TypedExpr) -> Result<Option<Value>, LoweringError> {
        let value = match (&expr.kind, expr.ty) {
            (TypedExprKind::Arg(index), _) => self.params.get(*index).copied().ok_or_else(|| {
                LoweringError::Unsupported(format!("argument {} out of range", index))
            })?,
            (TypedExprKind::Int(value), ValueType::Scalar(ty)) => {
                let clif = ty.clif_type().ok_or_else(|| {
                    LoweringError::Unsupported(format!("integer literal of type {}", ty))
                })?;
                builder.ins().iconst(clif, *value)
            }
            (TypedExprKind::Float(value), ValueType::Scalar(Primitive::Float32)) => {
                builder.ins().f32const(*value as f32)
            }
            (TypedExprKind::Float(value), ValueType::Scalar(Primitive::Float64)) => {
                builder.ins().f64const(*value)
            }
            (TypedExprKind::Bool(value), _) => builder.ins().iconst(types::I8, i64::from(*value)),
            (TypedExprKind::Call(site), _) => {
                let mut args = Vec::with_capacity(site.args.len());
                for arg in &site.args {
                    args.push((self.value(builder, arg)?, arg.ty));
                }
                let rule = self.rules.rule_for(&site.signature)?;
                return rule.emit(self.cx, builder, &args);
            }
            (kind, ty) => {
                return Err(LoweringError::Unsupported(format!("{:?} of type {}", kind, ty)));
            }
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowering::BufferLayout;
    use crate::registry::{HostRegistries, Registry};
    use crate::udf::{check, Expr, Stmt, UserFunction};
    use cranelift_codegen::isa::CallConv;

    fn lower_udf(host: &HostRegistries, udf: &UserFunction) -> Result<LoweredFunction, LoweringError> {
        let typed = check(udf, host.typing()).unwrap();
        let cx = LoweringContext::new(types::I64, CallConv::SystemV, BufferLayout::default());
        lower(&typed, host.lowering(), cx, true)
    }

    #[test]
    fn test_lower_add_i32() {
        let host = Arc::new(HostRegistries::new());
        let registry = Registry::new(&host, "codegen");
        registry.declare("int32 add_i32(int32, int32)").unwrap();

        let udf = UserFunction::new(
            "sum",
            [ValueType::Scalar(Primitive::Int32), ValueType::Scalar(Primitive::Int32)],
            Primitive::Int32,
        )
        .with_body([Stmt::ret(Expr::call("add_i32", [Expr::arg(0), Expr::arg(1)]))]);

        let lowered = lower_udf(&host, &udf).unwrap();
        let ir = lowered.clif();
        assert!(ir.contains("call fn0(v0, v1)"), "both arguments passed by value:\n{}", ir);
        assert_eq!(lowered.imports.len(), 1);
        assert_eq!(lowered.return_type, Primitive::Int32);
    }

    #[test]
    fn test_lower_records_imports_in_first_use_order() {
        let host = Arc::new(HostRegistries::new());
        let registry = Registry::new(&host, "codegen");
        registry.declare("double outer(double)").unwrap();
        registry.declare("double inner(int32)").unwrap();
        registry.declare("void sink(double)").unwrap();

        let udf = UserFunction::new("chain", [ValueType::Scalar(Primitive::Int32)], Primitive::Float64)
            .with_body([
                Stmt::Eval(Expr::call("sink", [Expr::call("outer", [Expr::call("inner", [Expr::arg(0)])])])),
                Stmt::ret(Expr::call("outer", [Expr::float(0.5)])),
            ]);

        let lowered = lower_udf(&host, &udf).unwrap();
        let order: Vec<&str> = lowered.imports.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["inner", "outer", "sink"]);
    }

    #[test]
    fn test_lower_converts_literal_arguments() {
        let host = Arc::new(HostRegistries::new());
        let registry = Registry::new(&host, "codegen");
        registry.declare("float scale(float, int64)").unwrap();

        let udf = UserFunction::new("f", [], Primitive::Float64).with_body([Stmt::ret(Expr::call(
            "scale",
            [Expr::float(2.0), Expr::int(3)],
        ))]);
        let ir = lower_udf(&host, &udf).unwrap().clif();
        assert!(ir.contains("fdemote.f32"), "{}", ir);
        assert!(ir.contains("sextend.i64"), "{}", ir);
        assert!(ir.contains("fpromote.f64"), "return widened:\n{}", ir);
    }

    #[test]
    fn test_lower_void_function_gets_return() {
        let host = Arc::new(HostRegistries::new());
        let registry = Registry::new(&host, "codegen");
        registry.declare("void touch(bool)").unwrap();

        let udf = UserFunction::new("f", [], Primitive::Void)
            .with_body([Stmt::Eval(Expr::call("touch", [Expr::Bool(true)]))]);
        let ir = lower_udf(&host, &udf).unwrap().clif();
        assert!(ir.contains("return"), "{}", ir);
    }

    #[test]
    fn test_lower_fails_without_rule() {
        let host = Arc::new(HostRegistries::new());
        let registry = Registry::new(&host, "codegen");
        registry.declare("int32 gone(int32)").unwrap();

        let udf = UserFunction::new("f", [], Primitive::Int32)
            .with_body([Stmt::ret(Expr::call("gone", [Expr::int(1)]))]);
        let typed = check(&udf, host.typing()).unwrap();
        drop(registry);

        let cx = LoweringContext::new(types::I64, CallConv::SystemV, BufferLayout::default());
        let err = lower(&typed, host.lowering(), cx, true).unwrap_err();
        assert!(matches!(err, LoweringError::MissingRule { .. }), "got {:?}", err);
    }
}
