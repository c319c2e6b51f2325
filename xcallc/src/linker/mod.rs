///
/// Module Linker - Per-Build State Machine
///
/// A Build compiles one user function for one target and walks through
///
///   Declared → TypeChecked → Lowered → Linked → Finalized
///
/// External modules for the build's target may be attached any time
/// before the Linked transition. Attaching checks the target and rejects
/// a module that redefines a symbol owned by the user function or by an
/// already attached module. Finalizing freezes the linked module into an
/// immutable CompilationArtifact; if a symbol referenced by the function
/// is still undefined the build goes back to Lowered with its attached
/// modules intact, so the missing module can be attached and finalize
/// retried.
///
/// Builds only read the host registries and may run in parallel.
///

mod artifact;
mod error;
mod merge;
mod module;
mod text;

pub use artifact::{
    ArtifactManifest, CompilationArtifact, ImportEntry, LinkedSymbol, ManifestImport, ManifestModule,
    SymbolOrigin,
};
pub use error::BuildError;
pub use merge::{LinkedModule, SymbolState};
pub use module::{Definition, ExternalModule, NativeFn, Payload, PayloadFormat};
pub use text::{scan_llvm_ir, IrSymbols};

use std::fmt;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::lowering::LoweringContext;
use crate::registry::HostRegistries;
use crate::target::{Target, TargetCodegen};
use crate::udf::{self, LoweredFunction, TypedFunction, UserFunction};

use artifact::ArtifactParts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Declared,
    TypeChecked,
    Lowered,
    Linked,
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Declared => "declared",
            Stage::TypeChecked => "type-checked",
            Stage::Lowered => "lowered",
            Stage::Linked => "linked",
            Stage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Build {
    host: Arc<HostRegistries>,
    function: UserFunction,
    target: Target,
    codegen: TargetCodegen,
    config: BridgeConfig,
    stage: Stage,
    typed: Option<TypedFunction>,
    lowered: Option<LoweredFunction>,
    attached: Vec<ExternalModule>,
    linked: Option<LinkedModule>,
}

impl Build {
    pub fn new(
        host: &Arc<HostRegistries>,
        function: UserFunction,
        target: impl Into<Target>,
        config: &BridgeConfig,
    ) -> Result<Self, BuildError> {
        let target = target.into();
        let codegen = TargetCodegen::resolve(&target, config)?;
        Ok(Self {
            host: Arc::clone(host),
            function,
            target,
            codegen,
            config: config.clone(),
            stage: Stage::Declared,
            typed: None,
            lowered: None,
            attached: Vec::new(),
            linked: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn function(&self) -> &UserFunction {
        &self.function
    }

    pub fn typed(&self) -> Option<&TypedFunction> {
        self.typed.as_ref()
    }

    pub fn lowered(&self) -> Option<&LoweredFunction> {
        self.lowered.as_ref()
    }

    pub fn linked(&self) -> Option<&LinkedModule> {
        self.linked.as_ref()
    }

    pub fn attached(&self) -> &[ExternalModule] {
        &self.attached
    }

    fn expect_stage(&self, expected: Stage, attempted: &'static str) -> Result<(), BuildError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(BuildError::InvalidTransition {
                stage: self.stage,
                attempted,
            })
        }
    }

    pub fn type_check(&mut self) -> Result<&TypedFunction, BuildError> {
        self.expect_stage(Stage::Declared, "type-check")?;
        let typed = udf::check(&self.function, self.host.typing())?;
        self.stage = Stage::TypeChecked;
        Ok(self.typed.insert(typed))
    }

    pub fn lower(&mut self) -> Result<&LoweredFunction, BuildError> {
        self.expect_stage(Stage::TypeChecked, "lower")?;
        let typed = self.typed.as_ref().ok_or(BuildError::InvalidTransition {
            stage: self.stage,
            attempted: "lower",
        })?;
        let cx = LoweringContext::new(
            self.codegen.pointer_type(),
            self.codegen.call_conv(),
            self.config.buffer,
        );
        let lowered = udf::lower(typed, self.host.lowering(), cx, self.config.verify_ir)?;
        self.stage = Stage::Lowered;
        Ok(self.lowered.insert(lowered))
    }

    /// Adds an external module for this build's target.
    pub fn attach(&mut self, module: ExternalModule) -> Result<(), BuildError> {
        if self.stage >= Stage::Linked {
            return Err(BuildError::InvalidTransition {
                stage: self.stage,
                attempted: "attach a module to",
            });
        }
        if module.target() != &self.target {
            return Err(BuildError::TargetMismatch {
                module: module.name().to_string(),
                expected: self.target.to_string(),
                found: module.target().to_string(),
            });
        }
        for definition in module.definitions() {
            let existing = if definition.symbol == self.function.name {
                Some("the user function".to_string())
            } else {
                self.attached
                    .iter()
                    .find(|m| m.defines(&definition.symbol))
                    .map(|m| format!("module '{}'", m.name()))
            };
            if let Some(existing) = existing {
                tracing::warn!(symbol = %definition.symbol, module = module.name(), "link conflict");
                return Err(BuildError::LinkConflict {
                    symbol: definition.symbol.clone(),
                    module: module.name().to_string(),
                    existing,
                });
            }
        }
        tracing::debug!(
            module = module.name(),
            target = %self.target,
            definitions = module.definitions().count(),
            "attached external module"
        );
        self.attached.push(module);
        Ok(())
    }

    pub fn link(&mut self) -> Result<&LinkedModule, BuildError> {
        self.expect_stage(Stage::Lowered, "link")?;
        let lowered = self.lowered.as_ref().ok_or(BuildError::InvalidTransition {
            stage: self.stage,
            attempted: "link",
        })?;
        let linked = merge::link(&lowered.name, &lowered.imports, &self.attached)?;
        tracing::debug!(
            function = %lowered.name,
            modules = self.attached.len(),
            unresolved = linked.unresolved().len(),
            "linked build"
        );
        self.stage = Stage::Linked;
        Ok(self.linked.insert(linked))
    }

    /// Symbols the lowered function calls that no attached module defines.
    pub fn unresolved(&self) -> Vec<String> {
        match &self.lowered {
            Some(lowered) => lowered
                .imports
                .keys()
                .filter(|symbol| !self.attached.iter().any(|m| m.defines(symbol)))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Freezes the build into an artifact, linking first if needed.
    pub fn finalize(&mut self) -> Result<Arc<CompilationArtifact>, BuildError> {
        if self.stage == Stage::Lowered {
            self.link()?;
        }
        self.expect_stage(Stage::Linked, "finalize")?;

        match self.assemble() {
            Ok(artifact) => {
                self.stage = Stage::Finalized;
                self.linked = None;
                tracing::info!(
                    entry = artifact.entry(),
                    target = %self.target,
                    fingerprint = artifact.fingerprint(),
                    "finalized artifact"
                );
                Ok(Arc::new(artifact))
            }
            Err(e) => {
                tracing::warn!(target = %self.target, error = %e, "finalize failed, build returned to lowered");
                self.linked = None;
                self.stage = Stage::Lowered;
                Err(e)
            }
        }
    }

    fn assemble(&mut self) -> Result<CompilationArtifact, BuildError> {
        let (Some(lowered), Some(linked)) = (self.lowered.as_ref(), self.linked.as_ref()) else {
            return Err(BuildError::InvalidTransition {
                stage: self.stage,
                attempted: "finalize",
            });
        };

        let unresolved = linked.unresolved();
        if !unresolved.is_empty() {
            return Err(BuildError::UnresolvedSymbol {
                target: self.target.to_string(),
                symbols: unresolved,
            });
        }

        let isa = if self.config.emit_object {
            self.codegen.owned_isa()
        } else {
            None
        };
        let parts = ArtifactParts {
            target: self.target.clone(),
            lowered,
            linked,
            modules: self.attached.clone(),
            call_conv: self.codegen.call_conv(),
            pointer_type: self.codegen.pointer_type(),
        };
        let artifact = CompilationArtifact::assemble(parts, isa)?;
        self.attached.clear();
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::types::{Primitive, ValueType};
    use crate::udf::{Expr, Stmt};

    fn setup() -> (Arc<HostRegistries>, Registry) {
        let host = Arc::new(HostRegistries::new());
        let registry = Registry::new(&host, "linker");
        registry.declare("int32 add_i32(int32, int32)").unwrap();
        (host, registry)
    }

    fn sum() -> UserFunction {
        UserFunction::new(
            "sum",
            [ValueType::Scalar(Primitive::Int32), ValueType::Scalar(Primitive::Int32)],
            Primitive::Int32,
        )
        .with_body([Stmt::ret(Expr::call("add_i32", [Expr::arg(0), Expr::arg(1)]))])
    }

    fn add_module(name: &str) -> ExternalModule {
        let mut module = ExternalModule::new(name, "cpu");
        module.define("add_i32").unwrap();
        module
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let (host, _registry) = setup();
        let mut build = Build::new(&host, sum(), "cpu", &BridgeConfig::ir_only()).unwrap();
        assert!(matches!(
            build.lower(),
            Err(BuildError::InvalidTransition { stage: Stage::Declared, .. })
        ));
        assert!(matches!(build.link(), Err(BuildError::InvalidTransition { .. })));
        assert!(matches!(build.finalize(), Err(BuildError::InvalidTransition { .. })));

        build.type_check().unwrap();
        assert!(matches!(build.type_check(), Err(BuildError::InvalidTransition { .. })));
        build.lower().unwrap();
        assert_eq!(build.stage(), Stage::Lowered);
    }

    #[test]
    fn test_full_pipeline() {
        let (host, _registry) = setup();
        let mut build = Build::new(&host, sum(), "cpu", &BridgeConfig::ir_only()).unwrap();
        build.attach(add_module("math")).unwrap();
        build.type_check().unwrap();
        build.lower().unwrap();
        assert!(build.unresolved().is_empty());
        build.link().unwrap();
        let artifact = build.finalize().unwrap();

        assert_eq!(build.stage(), Stage::Finalized);
        assert!(build.attached().is_empty(), "modules are consumed by the artifact");
        assert_eq!(artifact.entry(), "sum");
        assert_eq!(artifact.imports().len(), 1);
        assert_eq!(
            artifact.symbol("add_i32").map(|s| &s.origin),
            Some(&SymbolOrigin::Module("math".into()))
        );
        assert!(artifact.object().is_none(), "IR-only config emits no object");
        assert_eq!(artifact.fingerprint().len(), 64);
    }

    #[test]
    fn test_finalize_failure_rolls_back() {
        let (host, _registry) = setup();
        let mut build = Build::new(&host, sum(), "cpu", &BridgeConfig::ir_only()).unwrap();
        build.type_check().unwrap();
        build.lower().unwrap();

        let err = build.finalize().unwrap_err();
        match &err {
            BuildError::UnresolvedSymbol { target, symbols } => {
                assert_eq!(target, "cpu");
                assert_eq!(symbols, &vec!["add_i32".to_string()]);
            }
            other => panic!("expected UnresolvedSymbol, got {:?}", other),
        }
        assert_eq!(build.stage(), Stage::Lowered);

        build.attach(add_module("late")).unwrap();
        assert!(build.finalize().is_ok());
    }

    #[test]
    fn test_attach_rejects_other_target() {
        let (host, _registry) = setup();
        let mut build = Build::new(&host, sum(), "cpu", &BridgeConfig::ir_only()).unwrap();
        let mut module = ExternalModule::new("gpu-math", "gpu");
        module.define("add_i32").unwrap();
        assert!(matches!(
            build.attach(module),
            Err(BuildError::TargetMismatch { .. })
        ));
    }

    #[test]
    fn test_attach_conflicts() {
        let (host, _registry) = setup();
        let mut build = Build::new(&host, sum(), "cpu", &BridgeConfig::ir_only()).unwrap();
        build.attach(add_module("first")).unwrap();
        let err = build.attach(add_module("second")).unwrap_err();
        assert!(err.is_link_conflict());
        assert_eq!(build.attached().len(), 1);

        let mut shadow = ExternalModule::new("shadow", "cpu");
        shadow.define("sum").unwrap();
        assert!(build.attach(shadow).unwrap_err().is_link_conflict());
    }

    #[test]
    fn test_attach_after_link_is_rejected() {
        let (host, _registry) = setup();
        let mut build = Build::new(&host, sum(), "cpu", &BridgeConfig::ir_only()).unwrap();
        build.attach(add_module("math")).unwrap();
        build.type_check().unwrap();
        build.lower().unwrap();
        build.link().unwrap();
        assert!(matches!(
            build.attach(ExternalModule::new("extra", "cpu")),
            Err(BuildError::InvalidTransition { stage: Stage::Linked, .. })
        ));
    }

    #[test]
    fn test_type_error_keeps_stage() {
        let (host, _registry) = setup();
        let bad = UserFunction::new("bad", [], Primitive::Int32)
            .with_body([Stmt::ret(Expr::call("add_i32", [Expr::int(1)]))]);
        let mut build = Build::new(&host, bad, "cpu", &BridgeConfig::ir_only()).unwrap();
        assert!(matches!(build.type_check(), Err(BuildError::Type(_))));
        assert_eq!(build.stage(), Stage::Declared);
    }
}
