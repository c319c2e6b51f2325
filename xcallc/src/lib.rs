///
/// xcallc - Bridge Between a JIT Compiler and External Native Functions
///
/// Lets JIT-compiled user functions call functions compiled elsewhere.
/// It includes:
///
/// - catalog: the name → Signature catalog and bulk signature tables
/// - registry: registration scopes installing rules into host registries
/// - typing: overload-aware typing rules for external calls
/// - lowering: argument marshaling and Cranelift call emission
/// - declare: the textual signature parser (`float f(float*, int32)`)
/// - udf: user functions, their type checker and IR generation
/// - linker: per-build state machine, external modules and artifacts
/// - config / target: bridge settings and per-target code generation
/// - diagnostic: miette rendering of declaration errors
///
/// Entry points:
/// - `Registry::declare`, `Registry::register`, `Registry::register_bulk`
/// - `Build` for step-by-step compilation, `compile` for one shot
///

pub mod catalog;
pub mod config;
pub mod declare;
pub mod diagnostic;
pub mod linker;
pub mod lowering;
pub mod registry;
pub mod signature;
pub mod source;
pub mod target;
pub mod types;
pub mod typing;
pub mod udf;

pub use catalog::{BulkReport, RegistryError, SignatureCatalog, SignatureTable};
pub use config::BridgeConfig;
pub use declare::{parse_signature, DeclareError, ExternalFn, ParseError};
pub use diagnostic::DiagnosticReporter;
pub use linker::{Build, BuildError, CompilationArtifact, ExternalModule, NativeFn, Stage};
pub use registry::{HostRegistries, Registry};
pub use signature::Signature;
pub use target::Target;
pub use types::{Parameter, Primitive, ValueType};
pub use udf::{Expr, Stmt, UserFunction};

use std::sync::Arc;

/// Type-checks, lowers, links and finalizes `function` for `target` with
/// the given external modules.
pub fn compile(
    host: &Arc<HostRegistries>,
    function: UserFunction,
    target: impl Into<Target>,
    modules: impl IntoIterator<Item = ExternalModule>,
    config: &BridgeConfig,
) -> Result<Arc<CompilationArtifact>, BuildError> {
    let mut build = Build::new(host, function, target, config)?;
    for module in modules {
        build.attach(module)?;
    }
    build.type_check()?;
    build.lower()?;
    build.finalize()
}
