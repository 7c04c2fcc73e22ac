//! End-to-end tests of the compilation pipeline

use std::fs;

use mktemp::Temp;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use pylog_hls::ir::{NodeKind, Operand};
use pylog_hls::{
    compile, compile_to_workspace, extract_arguments, lower, parse_module, ArgSpec, CompileError,
    CompileOptions, HardwareType, KernelRegistry, ParentMap, ScalarKind,
};

fn options_in(workspace: &std::path::Path) -> CompileOptions {
    CompileOptions::new(workspace)
}

fn pure_options() -> CompileOptions {
    CompileOptions {
        write_output: false,
        ..CompileOptions::default()
    }
}

fn float4() -> ArgSpec {
    ArgSpec::named("float32", &[4])
}

const VDOT: &str = "\
def vdot(a, b):
    s = 0.0
    for i in range(4):
        s += a[i] * b[i]
    return s
";

// =============================================================================
// ARGUMENT TYPES
// =============================================================================

#[test]
fn fixed_point_fields_give_32_16() {
    let args = extract_arguments(
        &["x".to_string()],
        &[ArgSpec::record(["total32bits", "dec16bits"], &[16])],
    )
    .unwrap();
    assert_eq!(args["x"].hardware_type, HardwareType::fixed(32, 16).unwrap());
    assert_eq!(args["x"].shape, vec![16]);
}

#[test]
fn record_without_bit_pattern_is_rejected() {
    let err = compile(
        "def k(x):\n    return x[0]\n",
        &[ArgSpec::record(["mantissa", "exponent"], &[4])],
        &pure_options(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::ArgumentTypeError { .. }));
}

// =============================================================================
// OPERATOR CHAINING
// =============================================================================

#[test]
fn map_into_dot_fuses_and_keeps_type() {
    let module = lower(
        "def k(a, b):\n    return a.map(lambda x: x * 3.0).dot(b)\n",
        &[float4(), float4()],
        &pure_options(),
    )
    .unwrap();
    let NodeKind::Return(Some(value)) = module.kind(module.body[0]) else {
        panic!("expected return");
    };
    let node = module.node(*value);
    let NodeKind::Fused { stages } = &node.kind else {
        panic!("expected fused operator, got {:?}", node.kind);
    };
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0].shape, vec![4]);
    assert_eq!(stages[1].operands[0], Operand::Chained);
    assert_eq!(node.ty, Some(HardwareType::scalar(ScalarKind::Float32)));
    assert!(node.shape.is_empty());
    assert_eq!(module.function.return_type, node.ty);
}

#[test]
fn map_with_two_consumers_is_not_fused() {
    let source = "\
def k(a, b):
    t = map(lambda x: x * x, a)
    return dot(t, b) + reduce(lambda p, q: p + q, t)
";
    let module = lower(source, &[float4(), float4()], &pure_options()).unwrap();
    assert!(module.function.local("t").is_some());
    let fused = module
        .preorder()
        .into_iter()
        .filter(|&id| matches!(module.kind(id), NodeKind::Fused { .. }))
        .count();
    assert_eq!(fused, 0);
}

#[test]
fn map_stays_ahead_of_later_writes_to_its_input() {
    let source = "\
def k(a, b):
    s = 0.0
    t = map(lambda x: x * 2.0, a)
    if b[0] > 0.0:
        a[0] = 0.0
        s = dot(t, b)
    return s
";
    let output = compile(source, &[float4(), float4()], &pure_options()).unwrap();
    let map = output.hls_c.find("(a[__i0] * 2.0)").expect("map body rendered");
    let write = output.hls_c.find("a[0] = 0.0;").expect("guarded write rendered");
    assert!(map < write, "map moved after the write:\n{}", output.hls_c);
}

// =============================================================================
// END TO END
// =============================================================================

#[test]
fn two_float_vectors_end_to_end() {
    let temp = Temp::new_dir().unwrap();
    let workspace = temp.as_path().join("ws");
    let output = compile_to_workspace(VDOT, &[float4(), float4()], &options_in(&workspace)).unwrap();

    assert_eq!(output.metadata.num_bundles, 2);
    assert!(!output.metadata.returns_void);
    assert_eq!(output.metadata.top_function_name, "vdot");
    assert_eq!(output.metadata.project_path, workspace.join("vdot"));

    let written = fs::read_to_string(workspace.join("vdot.cpp")).unwrap();
    assert_eq!(written, output.hls_c);
    assert!(written.contains("float vdot(float a[4], float b[4])"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(workspace.join("vdot.json")).unwrap()).unwrap();
    assert_eq!(json["top_function_name"], "vdot");
    assert_eq!(json["num_bundles"], 2);
    assert_eq!(json["board"], "pynq-z2");
}

#[test]
fn void_kernel_metadata() {
    let output = compile(
        "def vadd(a, b, c):\n    for i in range(4):\n        c[i] = a[i] + b[i]\n",
        &[float4(), float4(), float4()],
        &pure_options(),
    )
    .unwrap();
    assert!(output.metadata.returns_void);
    assert_eq!(output.metadata.num_bundles, 3);
    assert!(output.hls_c.contains("void vadd("));
    assert!(output.hls_c.contains("c[__i0] = (a[__i0] + b[__i0]);"));
}

#[test]
fn unsupported_syntax_leaves_workspace_untouched() {
    let temp = Temp::new_dir().unwrap();
    let workspace = temp.as_path().join("ws");
    let source = "def k(a):\n    with open('f') as h:\n        pass\n    return a[0]\n";

    let err = compile_to_workspace(source, &[float4()], &options_in(&workspace)).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedSyntaxError { .. }));
    assert!(!workspace.exists());
}

#[test]
fn type_error_leaves_workspace_untouched() {
    let temp = Temp::new_dir().unwrap();
    let workspace = temp.as_path().join("ws");
    let source = "def k(a, b):\n    return a + b\n";

    let err = compile_to_workspace(source, &[float4(), float4()], &options_in(&workspace)).unwrap_err();
    assert!(matches!(err, CompileError::TypeInferenceError { .. }));
    assert!(!workspace.exists());
}

#[test]
fn recompilation_is_byte_identical() {
    let first = compile(VDOT, &[float4(), float4()], &pure_options()).unwrap();
    let second = compile(VDOT, &[float4(), float4()], &pure_options()).unwrap();
    assert_eq!(first.hls_c, second.hls_c);
    assert_eq!(first.deployment.to_json().unwrap(), second.deployment.to_json().unwrap());
}

#[test]
fn registry_compiles_selected_kernel() {
    let source = format!("{}\ndef neg(a):\n    a = map(lambda x: -x, a)\n", VDOT);
    let registry = KernelRegistry::from_source(&source).unwrap();
    assert_eq!(registry.len(), 2);

    let output = registry.compile("neg", &[float4()], &pure_options()).unwrap();
    assert!(output.metadata.returns_void);
    assert!(output.hls_c.contains("a[__i0] = (-a[__i0]);"));
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// Kernel source with `n` straight-line statements and a loop
fn kernel_source() -> impl Strategy<Value = String> {
    prop::collection::vec((0usize..4, 1i64..100), 1..12).prop_map(|statements| {
        let mut source = String::from("def k(a):\n    s = 0\n");
        for (k, (index, constant)) in statements.iter().enumerate() {
            source.push_str(&format!("    t{} = a[{}] * {} + s\n", k, index, constant));
            source.push_str(&format!("    for i in range({}):\n        s += t{}\n", constant, k));
        }
        source.push_str("    return s\n");
        source
    })
}

proptest! {
    /// Linking an unchanged tree twice gives the same parent table
    #[test]
    fn linking_is_idempotent(source in kernel_source()) {
        let ast = parse_module(&source).unwrap();
        let first = ParentMap::link(&ast);
        let second = ParentMap::link(&ast);
        prop_assert_eq!(&first, &second);

        let mut module = lower(&source, &[ArgSpec::named("int32", &[4])], &pure_options()).unwrap();
        let before = module.parents().clone();
        module.relink();
        prop_assert_eq!(&before, module.parents());
    }

    /// Fixed-point addition widens to the larger format plus two guard bits
    #[test]
    fn fixed_point_binary_rule(
        (a, ia) in (1u32..60).prop_flat_map(|t| (Just(t), 0..=t)),
        (b, ib) in (1u32..60).prop_flat_map(|t| (Just(t), 0..=t))
    ) {
        let fields = |total: u32, integer: u32| {
            ArgSpec::record([format!("total{}bits", total), format!("dec{}bits", integer)], &[2])
        };
        let module = lower(
            "def k(x, y):\n    return x[0] + y[1]\n",
            &[fields(a, ia), fields(b, ib)],
            &pure_options(),
        )
        .unwrap();
        prop_assert_eq!(
            module.function.return_type,
            HardwareType::fixed(a.max(b) + 2, ia.max(ib))
        );
    }
}
