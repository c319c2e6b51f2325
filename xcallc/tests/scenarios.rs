use std::sync::Arc;

use xcallc::config::BridgeConfig;
use xcallc::linker::{Build, BuildError, ExternalModule, Stage, SymbolOrigin};
use xcallc::registry::{HostRegistries, Registry};
use xcallc::types::{Parameter, Primitive, ValueType};
use xcallc::typing::TypeError;
use xcallc::udf::{Expr, Stmt, UserFunction};
use xcallc::{compile, parse_signature, RegistryError};

fn host() -> Arc<HostRegistries> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    Arc::new(HostRegistries::new())
}

fn predict_udf() -> UserFunction {
    UserFunction::new(
        "score",
        [ValueType::Buffer(Primitive::Float32), ValueType::Scalar(Primitive::Int32)],
        Primitive::Float32,
    )
    .with_body([Stmt::ret(Expr::call(
        "predict_float",
        [Expr::arg(0), Expr::arg(1)],
    ))])
}

fn model_module(name: &str) -> ExternalModule {
    let mut module = ExternalModule::new(name, "cpu");
    module
        .define_typed(parse_signature("float predict_float(float*, int32)").unwrap())
        .unwrap();
    module
}

#[test]
fn test_add_i32_types_and_lowers_by_value() {
    let host = host();
    let registry = Registry::new(&host, "scenario-1");
    registry
        .register(
            "add_i32",
            Primitive::Int32,
            [Parameter::Value(Primitive::Int32), Parameter::Value(Primitive::Int32)],
        )
        .unwrap();

    let udf = UserFunction::new(
        "add",
        [ValueType::Scalar(Primitive::Int32), ValueType::Scalar(Primitive::Int32)],
        Primitive::Int32,
    )
    .with_body([Stmt::ret(Expr::call("add_i32", [Expr::arg(0), Expr::arg(1)]))]);

    let mut build = Build::new(&host, udf, "cpu", &BridgeConfig::ir_only()).unwrap();
    let typed = build.type_check().unwrap();
    let sites = typed.call_sites();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].signature.return_type, Primitive::Int32);

    let lowered = build.lower().unwrap();
    assert_eq!(lowered.return_type, Primitive::Int32, "lowered type equals typed type");
    let ir = lowered.clif();
    assert!(ir.contains("call fn0(v0, v1)"), "both arguments passed by value:\n{}", ir);
    assert!(!ir.contains("load"), "no indirection for value parameters:\n{}", ir);
}

#[test]
fn test_declare_predict_float() {
    let sig = parse_signature("float predict_float(float*, int32)").unwrap();
    assert_eq!(sig.name, "predict_float");
    assert_eq!(sig.return_type, Primitive::Float32);
    assert_eq!(
        sig.params.as_slice(),
        &[
            Parameter::Pointer(Primitive::Float32),
            Parameter::Value(Primitive::Int32)
        ]
    );
}

#[test]
fn test_declare_compile_attach_finalize() {
    let host = host();
    let registry = Registry::new(&host, "scenario-3");
    let predict = registry.declare("float predict_float(float*, int32)").unwrap();
    assert_eq!(predict.name(), "predict_float");

    let udf = UserFunction::new(
        "score",
        [ValueType::Buffer(Primitive::Float32), ValueType::Scalar(Primitive::Int32)],
        Primitive::Float32,
    )
    .with_body([Stmt::ret(predict.call([Expr::arg(0), Expr::arg(1)]))]);

    let mut build = Build::new(&host, udf, "cpu", &BridgeConfig::ir_only()).unwrap();
    build.type_check().unwrap();
    build.lower().unwrap();
    build.attach(model_module("model")).unwrap();
    let artifact = build.finalize().unwrap();

    assert_eq!(build.stage(), Stage::Finalized);
    assert_eq!(artifact.entry(), "score");
    assert_eq!(artifact.imports()[0].symbol, "predict_float");
    assert_eq!(
        artifact.symbol("predict_float").map(|s| s.origin.clone()),
        Some(SymbolOrigin::Module("model".into()))
    );
    assert!(artifact.host_imports().is_empty());
}

#[test]
fn test_finalize_before_attach_is_unresolved() {
    let host = host();
    let registry = Registry::new(&host, "scenario-4");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let mut build = Build::new(&host, predict_udf(), "cpu", &BridgeConfig::ir_only()).unwrap();
    build.type_check().unwrap();
    build.lower().unwrap();
    assert_eq!(build.unresolved(), vec!["predict_float"]);

    match build.finalize() {
        Err(BuildError::UnresolvedSymbol { symbols, .. }) => {
            assert_eq!(symbols, vec!["predict_float"]);
        }
        other => panic!("expected UnresolvedSymbol, got {:?}", other),
    }

    build.attach(model_module("model")).unwrap();
    let artifact = build.finalize().unwrap();
    assert_eq!(artifact.imports().len(), 1);
}

#[test]
fn test_second_module_definition_conflicts() {
    let host = host();
    let registry = Registry::new(&host, "scenario-5");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let mut build = Build::new(&host, predict_udf(), "cpu", &BridgeConfig::ir_only()).unwrap();
    build.attach(model_module("first")).unwrap();
    match build.attach(model_module("second")) {
        Err(BuildError::LinkConflict {
            symbol,
            module,
            existing,
        }) => {
            assert_eq!(symbol, "predict_float");
            assert_eq!(module, "second");
            assert_eq!(existing, "module 'first'");
        }
        other => panic!("expected LinkConflict, got {:?}", other),
    }
    assert_eq!(build.attached().len(), 1);
}

#[test]
fn test_conflicting_registration_keeps_entry() {
    let host = host();
    let registry = Registry::new(&host, "conflict");
    registry.declare("float predict_float(float*, int32)").unwrap();
    registry.declare("float predict_float(float*, int32)").unwrap();
    assert_eq!(registry.catalog().len(), 1);

    let err = registry
        .declare("double predict_float(double*, int32)")
        .unwrap_err();
    assert!(matches!(
        err,
        xcallc::DeclareError::Registry(RegistryError::Conflict { .. })
    ));
    assert_eq!(
        registry.lookup("predict_float").unwrap().to_string(),
        "float32 predict_float(float32*, int32)"
    );
}

#[test]
fn test_call_site_errors() {
    let host = host();
    let registry = Registry::new(&host, "errors");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let unknown = UserFunction::new("f", [], Primitive::Void)
        .with_body([Stmt::Eval(Expr::call("predict_double", []))]);
    let arity = UserFunction::new("f", [ValueType::Buffer(Primitive::Float32)], Primitive::Float32)
        .with_body([Stmt::ret(Expr::call("predict_float", [Expr::arg(0)]))]);
    let mismatch = UserFunction::new(
        "f",
        [ValueType::Buffer(Primitive::Float64), ValueType::Scalar(Primitive::Int32)],
        Primitive::Float32,
    )
    .with_body([Stmt::ret(Expr::call("predict_float", [Expr::arg(0), Expr::arg(1)]))]);

    let config = BridgeConfig::ir_only();
    let err = compile(&host, unknown, "cpu", [], &config).unwrap_err();
    assert!(matches!(err, BuildError::Type(TypeError::UnresolvedName { .. })), "{:?}", err);
    let err = compile(&host, arity, "cpu", [], &config).unwrap_err();
    assert!(matches!(err, BuildError::Type(TypeError::ArityMismatch { expected: 2, found: 1, .. })), "{:?}", err);
    let err = compile(&host, mismatch, "cpu", [], &config).unwrap_err();
    assert!(matches!(err, BuildError::Type(TypeError::TypeMismatch { .. })), "{:?}", err);
}

#[test]
fn test_overloads_across_scopes() {
    let host = host();
    let f32_scope = Registry::new(&host, "f32");
    let f64_scope = Registry::new(&host, "f64");
    f32_scope.declare("float norm(float*, int32)").unwrap();
    f64_scope.declare("double norm(double*, int32)").unwrap();

    let call = |element: Primitive, ret: Primitive| {
        UserFunction::new(
            "f",
            [ValueType::Buffer(element), ValueType::Scalar(Primitive::Int32)],
            ret,
        )
        .with_body([Stmt::ret(Expr::call("norm", [Expr::arg(0), Expr::arg(1)]))])
    };

    let config = BridgeConfig::ir_only();
    let mut module = ExternalModule::new("norms", "cpu");
    module.define("norm").unwrap();
    let artifact = compile(&host, call(Primitive::Float64, Primitive::Float64), "cpu", [module], &config).unwrap();
    assert_eq!(artifact.imports()[0].signature.return_type, Primitive::Float64);

    f32_scope.declare("float scale(float)").unwrap();
    f64_scope.declare("double scale(double)").unwrap();
    let ambiguous = UserFunction::new("g", [ValueType::Scalar(Primitive::Int32)], Primitive::Float64)
        .with_body([Stmt::ret(Expr::call("scale", [Expr::arg(0)]))]);
    match compile(&host, ambiguous, "cpu", [], &config) {
        Err(BuildError::Type(err)) => assert!(err.is_ambiguous(), "expected ambiguity, got {:?}", err),
        other => panic!("expected a type error, got {:?}", other),
    }

    drop(f64_scope);
    let err = compile(&host, call(Primitive::Float64, Primitive::Float64), "cpu", [], &config).unwrap_err();
    assert!(matches!(err, BuildError::Type(TypeError::TypeMismatch { .. })), "{:?}", err);
}

#[test]
fn test_llvm_ir_module_resolves_call() {
    let host = host();
    let registry = Registry::new(&host, "llvm");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let model_ir = r#"
define dso_local float @predict_float(float* %data, i32 %pred_margin) {
entry:
  %v = call float @expf(float 0.0)
  ret float %v
}
declare float @expf(float)
"#;
    let module = ExternalModule::from_llvm_ir("treelite", "cpu", model_ir).unwrap();
    let artifact = compile(&host, predict_udf(), "cpu", [module], &BridgeConfig::ir_only()).unwrap();

    assert_eq!(artifact.host_imports(), &["expf".to_string()]);
    assert_eq!(artifact.modules().len(), 1);
    let manifest = artifact.manifest();
    assert_eq!(manifest.imports[0].module.as_deref(), Some("treelite"));
    assert!(!manifest.imports[0].native);
    let json = manifest.to_json().unwrap();
    assert!(json.contains("\"llvm_ir\""), "{}", json);
}

#[test]
fn test_module_for_other_device_is_rejected() {
    let host = host();
    let registry = Registry::new(&host, "devices");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let mut gpu = ExternalModule::new("model-gpu", "gpu");
    gpu.define("predict_float").unwrap();
    let err = compile(&host, predict_udf(), "cpu", [gpu], &BridgeConfig::ir_only()).unwrap_err();
    assert!(matches!(err, BuildError::TargetMismatch { .. }), "{:?}", err);
}

#[test]
fn test_fingerprint_tracks_modules() {
    let host = host();
    let registry = Registry::new(&host, "fingerprint");
    registry.declare("float predict_float(float*, int32)").unwrap();
    let config = BridgeConfig::ir_only();

    let a = compile(&host, predict_udf(), "cpu", [model_module("model")], &config).unwrap();
    let b = compile(&host, predict_udf(), "cpu", [model_module("model")], &config).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());

    let other = ExternalModule::from_llvm_ir(
        "model",
        "cpu",
        "define float @predict_float(float* %0, i32 %1) {\n  ret float 1.0\n}\n",
    )
    .unwrap();
    let c = compile(&host, predict_udf(), "cpu", [other], &config).unwrap();
    assert_ne!(a.fingerprint(), c.fingerprint());
}

#[test]
fn test_native_target_writes_object() {
    let host = host();
    let registry = Registry::new(&host, "object");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let artifact = compile(
        &host,
        predict_udf(),
        "cpu",
        [model_module("model")],
        &BridgeConfig::default(),
    )
    .unwrap();
    let object = artifact.object().expect("host target emits object code");
    assert!(!object.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("score.o");
    artifact.write_object(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), object);
    assert_eq!(artifact.manifest().object_size, Some(object.len()));
}

#[test]
fn test_ir_only_target_has_no_object() {
    let host = host();
    let registry = Registry::new(&host, "ir-only");
    registry.declare("float predict_float(float*, int32)").unwrap();

    let mut gpu = ExternalModule::new("model-gpu", "gpu");
    gpu.define("predict_float").unwrap();
    let artifact = compile(&host, predict_udf(), "gpu", [gpu], &BridgeConfig::default()).unwrap();
    assert!(artifact.object().is_none());
    let dir = tempfile::tempdir().unwrap();
    assert!(artifact.write_object(dir.path().join("x.o")).is_err());
}

#[test]
fn test_config_from_file_drives_buffer_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xcall.toml");
    std::fs::write(&path, "emit_object = false\n\n[buffer]\ndata_offset = 16\n").unwrap();
    let config = BridgeConfig::load(&path).unwrap();

    let host = host();
    let registry = Registry::new(&host, "layout");
    registry.declare("float predict_float(float*, int32)").unwrap();
    let artifact = compile(&host, predict_udf(), "cpu", [model_module("model")], &config).unwrap();
    assert!(artifact.clif().contains("+16"), "{}", artifact.clif());
    assert!(artifact.object().is_none());
}
