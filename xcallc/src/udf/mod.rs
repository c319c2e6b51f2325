//!
//! User Functions
//!
//! A minimal expression language for functions compiled by the bridge:
//! parameters, literals and calls to registered external functions. A
//! UserFunction is type-checked against the host typing registry
//! (check.rs) and lowered to a Cranelift function (codegen.rs).
//!
//! Example, equivalent to `float32 udf(buffer<float32> data, int32 m)
//! { return predict_float(data, m); }`:
//!
//! ```
//! use xcallc::udf::{Expr, Stmt, UserFunction};
//! use xcallc::types::{Primitive, ValueType};
//!
//! let udf = UserFunction::new(
//!     "udf",
//!     [ValueType::Buffer(Primitive::Float32), ValueType::Scalar(Primitive::Int32)],
//!     Primitive::Float32,
//! )
//! .with_body([Stmt::ret(Expr::call("predict_float", [Expr::arg(0), Expr::arg(1)]))]);
//! assert_eq!(udf.called_names(), vec!["predict_float"]);
//! ```
//!

mod check;
mod codegen;

pub use check::{check, TypedCallSite, TypedExpr, TypedExprKind, TypedFunction, TypedStmt};
pub use codegen::{lower, LoweredFunction};

use crate::types::{Primitive, ValueType};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Parameter by position.
    Arg(usize),
    Int { value: i64, ty: Primitive },
    Float { value: f64, ty: Primitive },
    Bool(bool),
    Call { callee: String, args: Vec<Expr> },
}

impl Expr {
    pub fn arg(index: usize) -> Self {
        Expr::Arg(index)
    }

    /// An int32 literal.
    pub fn int(value: i64) -> Self {
        Expr::Int {
            value,
            ty: Primitive::Int32,
        }
    }

    pub fn int_as(value: i64, ty: Primitive) -> Self {
        Expr::Int { value, ty }
    }

    /// A float64 literal.
    pub fn float(value: f64) -> Self {
        Expr::Float {
            value,
            ty: Primitive::Float64,
        }
    }

    pub fn float_as(value: f64, ty: Primitive) -> Self {
        Expr::Float { value, ty }
    }

    pub fn call(callee: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args: args.into_iter().collect(),
        }
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Expr::Call { callee, args } = self {
            for arg in args {
                arg.collect_calls(out);
            }
            if !out.contains(&callee.as_str()) {
                out.push(callee);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Evaluate for side effects and discard the result.
    Eval(Expr),
    Return(Option<Expr>),
}

impl Stmt {
    pub fn ret(expr: Expr) -> Self {
        Stmt::Return(Some(expr))
    }

    pub fn ret_void() -> Self {
        Stmt::Return(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<ValueType>,
    pub return_type: Primitive,
    pub body: Vec<Stmt>,
}

impl UserFunction {
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        return_type: Primitive,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            return_type,
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl IntoIterator<Item = Stmt>) -> Self {
        self.body.extend(body);
        self
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.body.push(stmt);
    }

    /// External names called anywhere in the body, in first-use order.
    pub fn called_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for stmt in &self.body {
            match stmt {
                Stmt::Eval(expr) | Stmt::Return(Some(expr)) => expr.collect_calls(&mut names),
                Stmt::Return(None) => {}
            }
        }
        names
    }
}
