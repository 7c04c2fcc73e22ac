//! Example: Chained Operators
//!
//! A `map` feeding a single consumer is fused into it, so no
//! intermediate array is materialized. A `map` read twice is kept.
//!
//! Run with: cargo run --example chained_ops

use pylog_hls::ir::NodeKind;
use pylog_hls::{compile, lower, ArgSpec, CompileOptions};

const FUSED: &str = "\
def scaled_norm(a):
    t = map(lambda x: x * 0.5, a)
    return reduce(lambda p, q: p + q, map(lambda x: x * x, t))
";

const SHARED: &str = "\
def shared(a, b):
    t = map(lambda x: x * x, a)
    return dot(t, b) + reduce(lambda p, q: p + q, t)
";

fn fused_operators(source: &str, args: &[ArgSpec], options: &CompileOptions) -> usize {
    let module = lower(source, args, options).unwrap();
    module
        .preorder()
        .into_iter()
        .filter(|&id| matches!(module.kind(id), NodeKind::Fused { .. }))
        .count()
}

fn main() {
    println!("=== Chained Operators Example ===\n");

    let options = CompileOptions {
        write_output: false,
        ..CompileOptions::default()
    };

    // Example 1: map -> map -> reduce
    println!("Example 1: single-consumer chain");
    println!("{}", FUSED);
    let args = vec![ArgSpec::named("float32", &[256])];
    println!("Fused operators: {}", fused_operators(FUSED, &args, &options));
    let output = compile(FUSED, &args, &options).unwrap();
    println!("{}", output.hls_c);

    // Example 2: the intermediate has two readers
    println!("\nExample 2: shared intermediate");
    println!("{}", SHARED);
    let args = vec![ArgSpec::named("float32", &[256]), ArgSpec::named("float32", &[256])];
    println!("Fused operators: {}", fused_operators(SHARED, &args, &options));
    let output = compile(SHARED, &args, &options).unwrap();
    println!("{}", output.hls_c);
}
