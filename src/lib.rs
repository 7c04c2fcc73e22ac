//! PyLog to HLS Compiler
//!
//! This library compiles array kernels written in a Python subset (plain
//! loops plus the `map`, `dot` and `reduce` operators) into synthesizable
//! HLS C for FPGA accelerators, together with the metadata a deployment
//! step needs to build and invoke them.
//!
//! # Example
//!
//! ```rust
//! use pylog_hls::{compile, ArgSpec, CompileOptions};
//!
//! let source = "def vdot(a, b):\n    return dot(a, b)\n";
//! let args = vec![ArgSpec::named("float32", &[4]), ArgSpec::named("float32", &[4])];
//! let options = CompileOptions { write_output: false, ..CompileOptions::default() };
//! let output = compile(source, &args, &options).unwrap();
//! assert_eq!(output.metadata.num_bundles, 2);
//! println!("{}", output.hls_c);
//! ```

pub mod analyzer;
pub mod args;
pub mod ast;
pub mod chaining;
pub mod codegen;
pub mod config;
pub mod error;
pub mod hardware;
mod id;
pub mod ir;
pub mod lexer;
pub mod linker;
pub mod operators;
pub mod optimizer;
pub mod parser;
pub mod registry;
pub mod typer;
pub mod workspace;

use tracing::{debug, info, info_span};

pub use analyzer::{kernel_definition, Analyzer};
pub use args::{extract_arguments, ArgSpec, ArgumentMap};
pub use chaining::ChainRewriter;
pub use codegen::CodeGenerator;
pub use config::{CompileOptions, RuntimeConfig};
pub use error::{CompileError, CompileResult};
pub use hardware::{CompileMetadata, DeploymentConfig, HardwareType, Pragma, ScalarKind};
pub use linker::ParentMap;
pub use optimizer::{HeuristicPolicy, LoopFacts, Optimizer, PragmaPolicy};
pub use parser::parse_module;
pub use registry::KernelRegistry;
pub use typer::Typer;
pub use workspace::Workspace;

/// Result of compiling one kernel
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    /// Generated HLS C++ source
    pub hls_c: String,
    pub metadata: CompileMetadata,
    pub deployment: DeploymentConfig,
}

/// Run every pass up to code generation and return the final IR
pub fn lower(source: &str, args: &[ArgSpec], options: &CompileOptions) -> CompileResult<ir::Module> {
    let ast = parse_module(source)?;
    let parents = ParentMap::link(&ast);
    let kernel = kernel_definition(&ast)?;
    let _span = info_span!("lower", kernel = %kernel.name).entered();

    let arguments = extract_arguments(&kernel.params, args)?;
    let mut module = Analyzer::new(&parents).analyze(&ast, arguments)?;
    dump(options, "analyzed", &module);

    Typer::new().run(&mut module)?;
    dump(options, "typed", &module);

    let mut optimizer = Optimizer::new(HeuristicPolicy::new(options.unroll_limit));
    optimizer.run(&mut module);
    module.relink();
    dump(options, "optimized", &module);

    let mut chaining = ChainRewriter::new();
    chaining.run(&mut module);
    dump(options, "chained", &module);

    debug!(
        synthesized = optimizer.synthesized(),
        fused = chaining.fused(),
        "lowering complete"
    );
    Ok(module)
}

fn dump(options: &CompileOptions, stage: &str, module: &ir::Module) {
    if options.debug {
        debug!(stage, "IR after {} pass:\n{}", stage, module);
    }
}

/// Compile a kernel to HLS C without touching the filesystem
pub fn compile(source: &str, args: &[ArgSpec], options: &CompileOptions) -> CompileResult<CompileOutput> {
    let module = lower(source, args, options)?;
    let hls_c = CodeGenerator::new(&module).generate()?;

    let workspace = Workspace::new(&options.workspace);
    let metadata = codegen::kernel_metadata(&module, workspace.project_path(&module.function.name));
    let deployment = DeploymentConfig {
        workspace_base: options.workspace.clone(),
        metadata: metadata.clone(),
        runtime: options.runtime.clone(),
    };

    info!(
        kernel = %metadata.top_function_name,
        bundles = metadata.num_bundles,
        returns_void = metadata.returns_void,
        "compiled kernel"
    );
    Ok(CompileOutput {
        hls_c,
        metadata,
        deployment,
    })
}

/// Compile a kernel and, when `options.write_output` is set, write
/// `<top>.cpp` and `<top>.json` into the workspace
pub fn compile_to_workspace(
    source: &str,
    args: &[ArgSpec],
    options: &CompileOptions,
) -> CompileResult<CompileOutput> {
    let output = compile(source, args, options)?;
    if options.write_output {
        let json = output
            .deployment
            .to_json()
            .map_err(|e| CompileError::codegen(format!("cannot serialize deployment config: {}", e)))?;
        Workspace::new(&options.workspace).write_project(&output.metadata.top_function_name, &output.hls_c, &json)?;
    }
    Ok(output)
}
