//! Example: Vector Dot Product
//!
//! Compiles the same dot product written two ways: as an explicit
//! accumulation loop and with the `dot` operator. Both lower to the
//! same operator.
//!
//! Run with: cargo run --example vector_dot

use pylog_hls::{compile, ArgSpec, CompileOptions};

const LOOP_FORM: &str = "\
def vdot(a, b):
    s = 0.0
    for i in range(1024):
        s += a[i] * b[i]
    return s
";

const OPERATOR_FORM: &str = "\
def vdot(a, b):
    return dot(a, b)
";

fn main() {
    println!("=== Vector Dot Product Example ===\n");

    let args = vec![ArgSpec::named("float32", &[1024]), ArgSpec::named("float32", &[1024])];
    let options = CompileOptions {
        write_output: false,
        ..CompileOptions::default()
    };

    for (label, source) in [("Loop form", LOOP_FORM), ("Operator form", OPERATOR_FORM)] {
        println!("{}:", label);
        println!("{}", source);

        let output = compile(source, &args, &options).unwrap();
        println!("Memory bundles: {}", output.metadata.num_bundles);
        println!("Returns void: {}", output.metadata.returns_void);
        println!();
        println!("{}", output.hls_c);
    }
}
