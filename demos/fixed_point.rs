//! Example: Fixed-Point Kernel
//!
//! Arguments whose record fields spell `total<N>bits` and `dec<N>bits`
//! become `ap_fixed` values. Arithmetic between them widens by two guard
//! bits.
//!
//! Run with: cargo run --example fixed_point

use pylog_hls::{compile, ArgSpec, CompileOptions, RuntimeConfig};

const SAXPY: &str = "\
def saxpy(x, y, out):
    for i in range(64):
        out[i] = x[i] * 2 + y[i]
";

fn main() {
    println!("=== Fixed-Point Example ===\n");

    let args: Vec<ArgSpec> = vec![
        "{total16bits,dec8bits}[64]".parse().unwrap(),
        "{total16bits,dec8bits}[64]".parse().unwrap(),
        "{total20bits,dec8bits}[64]".parse().unwrap(),
    ];
    let options = CompileOptions {
        write_output: false,
        runtime: RuntimeConfig::for_board("aws_f1").with_timing(true),
        ..CompileOptions::default()
    };

    println!("{}", SAXPY);
    let output = compile(SAXPY, &args, &options).unwrap();
    println!("{}", output.hls_c);

    println!("Deployment configuration:");
    println!("{}", output.deployment.to_json().unwrap());
}
