///
/// User Function Type Checking
///
/// Binds every call in a user function to a signature through the host
/// typing registry and annotates each expression with its ValueType. The
/// result is the only input lowering accepts, so a function that lowers
/// is always one that type-checked.
///
/// Body rules:
/// - parameters must not be void scalars
/// - literals must fit their declared type
/// - the first `Return` ends the body; statements after it are errors
/// - non-void functions must end in `Return(Some(_))` whose value
///   converts to the return type
///

use std::sync::Arc;

use crate::signature::Signature;
use crate::typing::{Coercions, TypeError, TypingRegistry};
use crate::types::{coerce, Parameter, Primitive, ValueType};

use super::{Expr, Stmt, UserFunction};

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub name: String,
    pub params: Vec<ValueType>,
    pub return_type: Primitive,
    pub body: Vec<TypedStmt>,
}

impl TypedFunction {
    pub fn call_sites(&self) -> Vec<&TypedCallSite> {
        fn walk<'a>(expr: &'a TypedExpr, out: &mut Vec<&'a TypedCallSite>) {
            if let TypedExprKind::Call(site) = &expr.kind {
                for arg in &site.args {
                    walk(arg, out);
                }
                out.push(site);
            }
        }
        let mut sites = Vec::new();
        for stmt in &self.body {
            match stmt {
                TypedStmt::Eval(expr) | TypedStmt::Return(Some(expr)) => walk(expr, &mut sites),
                TypedStmt::Return(None) => {}
            }
        }
        sites
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedStmt {
    Eval(TypedExpr),
    Return(Option<TypedExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub ty: ValueType,
    pub kind: TypedExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    Arg(usize),
    Int(i64),
    Float(f64),
    Bool(bool),
    Call(TypedCallSite),
}

/// A call bound to its resolved signature. `args` has exactly one entry
/// per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedCallSite {
    pub signature: Arc<Signature>,
    pub args: Vec<TypedExpr>,
    pub coercions: Coercions,
}

pub fn check(function: &UserFunction, typing: &TypingRegistry) -> Result<TypedFunction, TypeError> {
    for (index, param) in function.params.iter().enumerate() {
        if param.is_void() {
            return Err(TypeError::type_mismatch(
                format!("parameter {} of '{}'", index + 1, function.name),
                "a non-void type",
                param,
            ));
        }
    }

    let checker = Checker { function, typing };
    let mut body = Vec::with_capacity(function.body.len());
    let mut returned = false;

    for (index, stmt) in function.body.iter().enumerate() {
        if returned {
            return Err(TypeError::UnreachableCode {
                function: function.name.clone(),
                statement: index,
            });
        }
        let typed = match stmt {
            Stmt::Eval(expr) => TypedStmt::Eval(checker.expr(expr)?),
            Stmt::Return(value) => {
                returned = true;
                TypedStmt::Return(checker.return_value(value.as_ref())?)
            }
        };
        body.push(typed);
    }

    if !returned && !function.return_type.is_void() {
        return Err(TypeError::MissingReturn {
            function: function.name.clone(),
        });
    }

    tracing::debug!(function = %function.name, statements = body.len(), "type-checked user function");
    Ok(TypedFunction {
        name: function.name.clone(),
        params: function.params.clone(),
        return_type: function.return_type,
        body,
    })
}

struct Checker<'a> {
    function: &'a UserFunction,
    typing: &'a TypingRegistry,
}

impl Checker<'_> {
    fn return_value(&self, value: Option<&Expr>) -> Result<Option<TypedExpr>, TypeError> {
        let context = format!("return of '{}'", self.function.name);
        let expected = self.function.return_type;
        match value {
            None if expected.is_void() => Ok(None),
            None => Err(TypeError::type_mismatch(context, expected, Primitive::Void)),
            Some(expr) => {
                let typed = self.expr(expr)?;
                if expected.is_void() {
                    return Err(TypeError::type_mismatch(context, expected, typed.ty));
                }
                match coerce(typed.ty, Parameter::Value(expected)) {
                    Some(_) => Ok(Some(typed)),
                    None => Err(TypeError::type_mismatch(context, expected, typed.ty)),
                }
            }
        }
    }

    fn expr(&self, expr: &Expr) -> Result<TypedExpr, TypeError> {
        match expr {
            Expr::Arg(index) => {
                let ty = self.function.params.get(*index).copied().ok_or_else(|| {
                    TypeError::UnknownArgument {
                        function: self.function.name.clone(),
                        index: *index,
                        arity: self.function.params.len(),
                    }
                })?;
                Ok(TypedExpr {
                    ty,
                    kind: TypedExprKind::Arg(*index),
                })
            }
            Expr::Int { value, ty } => {
                if !ty.is_integer() {
                    return Err(TypeError::type_mismatch("integer literal", "an integer type", ty));
                }
                if !ty.fits_int(*value) {
                    return Err(TypeError::type_mismatch(
                        "integer literal",
                        format!("a value in range of {}", ty),
                        value,
                    ));
                }
                Ok(TypedExpr {
                    ty: ValueType::Scalar(*ty),
                    kind: TypedExprKind::Int(*value),
                })
            }
            Expr::Float { value, ty } => {
                if !ty.is_float() {
                    return Err(TypeError::type_mismatch("float literal", "a float type", ty));
                }
                Ok(TypedExpr {
                    ty: ValueType::Scalar(*ty),
                    kind: TypedExprKind::Float(*value),
                })
            }
            Expr::Bool(value) => Ok(TypedExpr {
                ty: ValueType::Scalar(Primitive::Bool),
                kind: TypedExprKind::Bool(*value),
            }),
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let arg_types: Vec<ValueType> = args.iter().map(|a| a.ty).collect();
                let resolution = self.typing.resolve(callee, &arg_types)?;
                Ok(TypedExpr {
                    ty: resolution.return_type(),
                    kind: TypedExprKind::Call(TypedCallSite {
                        signature: resolution.signature,
                        args,
                        coercions: resolution.coercions,
                    }),
                })
            }
        }
    }
}
