use std::sync::Arc;

use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::default_libcall_names;

use xcallc::config::{BridgeConfig, OptLevel};
use xcallc::linker::CompilationArtifact;
use xcallc::registry::{HostRegistries, Registry};
use xcallc::target::create_isa;
use xcallc::types::{Primitive, ValueType};
use xcallc::udf::{Expr, Stmt, UserFunction};
use xcallc::compile;

fn config() -> BridgeConfig {
    BridgeConfig {
        emit_object: false,
        ..BridgeConfig::default()
    }
}

fn jit(artifact: &CompilationArtifact) -> (JITModule, *const u8) {
    let isa = create_isa("host", OptLevel::None, false).unwrap();
    let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
    for (name, native) in artifact.native_symbols() {
        builder.symbol(name, native.as_ptr());
    }
    let mut module = JITModule::new(builder);
    let id = artifact.define_in(&mut module).unwrap();
    module.finalize_definitions().unwrap();
    let code = module.get_finalized_function(id);
    (module, code)
}

#[test]
fn test_register_twice_is_unchanged() {
    let host = Arc::new(HostRegistries::new());
    let registry = Registry::new(&host, "libm");

    let first = xcall_std_libm::register(&registry).unwrap();
    assert!(first.is_clean());
    assert_eq!(first.registered.len(), xcall_std_libm::table().unwrap().len());

    let second = xcall_std_libm::register(&registry).unwrap();
    assert!(second.registered.is_empty());
    assert_eq!(second.unchanged.len(), first.registered.len());
}

#[test]
fn test_conflicting_prior_declaration_is_reported() {
    let host = Arc::new(HostRegistries::new());
    let registry = Registry::new(&host, "libm");
    registry.declare("float32 hypot(float32, float32)").unwrap();

    let report = xcall_std_libm::register(&registry).unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert!(report.conflicts[0].is_conflict());
    assert!(report.registered.iter().all(|name| name != "hypot"));
}

#[test]
fn test_hypot_through_jit() {
    let host = Arc::new(HostRegistries::new());
    let registry = Registry::new(&host, "libm");
    xcall_std_libm::register(&registry).unwrap();

    let udf = UserFunction::new(
        "norm",
        [ValueType::Scalar(Primitive::Float64), ValueType::Scalar(Primitive::Float64)],
        Primitive::Float64,
    )
    .with_body([Stmt::ret(Expr::call("hypot", [Expr::arg(0), Expr::arg(1)]))]);

    let module = xcall_std_libm::cpu_module().unwrap();
    let artifact = compile(&host, udf, "cpu", [module], &config()).unwrap();

    let (_module, code) = jit(&artifact);
    let norm: extern "C" fn(f64, f64) -> f64 = unsafe { std::mem::transmute(code) };
    assert_eq!(norm(3.0, 4.0), 5.0);
    assert_eq!(norm(-5.0, 12.0), 13.0);
}

#[test]
fn test_float32_sqrt_through_jit() {
    let host = Arc::new(HostRegistries::new());
    let registry = Registry::new(&host, "libm");
    xcall_std_libm::register(&registry).unwrap();

    let udf = UserFunction::new("root", [ValueType::Scalar(Primitive::Float32)], Primitive::Float32)
        .with_body([Stmt::ret(Expr::call("sqrtf", [Expr::arg(0)]))]);

    let module = xcall_std_libm::cpu_module().unwrap();
    let artifact = compile(&host, udf, "cpu", [module], &config()).unwrap();

    let (_module, code) = jit(&artifact);
    let root: extern "C" fn(f32) -> f32 = unsafe { std::mem::transmute(code) };
    assert_eq!(root(16.0), 4.0);
}
