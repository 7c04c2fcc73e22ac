//! PyLog to HLS Compiler CLI
//!
//! Usage:
//!   pylog-hls -f kernels.py --top vadd --arg float32[1024] --arg float32[1024] --arg float32[1024]
//!   pylog-hls -f dot.py --args-json args.json --print --no-write
//!   cat fx.py | pylog-hls --arg '{total32bits,dec16bits}[8]' --board aws_f1 --json

use clap::Parser as ClapParser;
use colored::Colorize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pylog_hls::config::{DEFAULT_BOARD, DEFAULT_UNROLL_LIMIT, WORKSPACE_ENV};
use pylog_hls::{compile_to_workspace, ArgSpec, CompileOptions, CompileOutput, KernelRegistry, RuntimeConfig};

#[derive(ClapParser, Debug)]
#[command(name = "pylog-hls")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Compiles annotated Python kernels to HLS C")]
struct Args {
    /// Read kernel source from file (default: stdin)
    #[arg(short = 'f', long = "file")]
    input_file: Option<PathBuf>,

    /// Kernel to compile when the source defines several
    #[arg(short = 't', long = "top")]
    top: Option<String>,

    /// Argument description in parameter order (e.g. "float32[4]",
    /// "{total32bits,dec16bits}[8]", "int32")
    #[arg(short = 'a', long = "arg", value_parser = parse_arg)]
    args: Vec<ArgSpec>,

    /// Read argument descriptions from a JSON array
    #[arg(long = "args-json", conflicts_with = "args")]
    args_json: Option<PathBuf>,

    /// Workspace directory for generated projects
    #[arg(short = 'w', long = "workspace", env = WORKSPACE_ENV, default_value = "pylog_workspace")]
    workspace: PathBuf,

    /// Target board
    #[arg(short = 'b', long = "board", default_value = DEFAULT_BOARD)]
    board: String,

    /// Kernel clock in MHz (default depends on the board)
    #[arg(long = "freq")]
    freq: Option<f64>,

    /// Report kernel execution time at runtime
    #[arg(long = "timing")]
    timing: bool,

    /// Fully unroll loops with at most this many iterations
    #[arg(long = "unroll-limit", default_value_t = DEFAULT_UNROLL_LIMIT)]
    unroll_limit: u64,

    /// Output the deployment configuration as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Print the generated HLS C
    #[arg(short = 'p', long = "print")]
    print_code: bool,

    /// Do not write into the workspace
    #[arg(long = "no-write")]
    no_write: bool,

    /// Dump the IR after every pass
    #[arg(long = "debug")]
    debug: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_arg(s: &str) -> Result<ArgSpec, String> {
    s.parse::<ArgSpec>().map_err(|e| e.to_string())
}

fn fail(context: &str, message: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context.red(), message);
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();

    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    // Get source from file or stdin
    let source = if let Some(file) = &args.input_file {
        fs::read_to_string(file)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read file '{}': {}", file.display(), e)))
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read stdin: {}", e)));
        buffer
    };

    let arg_specs = match &args.args_json {
        Some(path) => {
            let text = fs::read_to_string(path)
                .unwrap_or_else(|e| fail("Error", format!("Failed to read '{}': {}", path.display(), e)));
            serde_json::from_str::<Vec<ArgSpec>>(&text)
                .unwrap_or_else(|e| fail("Argument error", format!("{}: {}", path.display(), e)))
        }
        None => args.args.clone(),
    };

    let registry = KernelRegistry::from_source(&source).unwrap_or_else(|e| fail("Parse error", e));
    let top = match &args.top {
        Some(top) => top.clone(),
        None => {
            let names: Vec<&str> = registry.names().collect();
            match names.as_slice() {
                [only] => only.to_string(),
                [] => fail("Error", "source defines no kernel"),
                _ => fail(
                    "Error",
                    format!("source defines several kernels ({}); pick one with --top", names.join(", ")),
                ),
            }
        }
    };
    let kernel_source = registry
        .get(&top)
        .unwrap_or_else(|| fail("Error", format!("no kernel named `{}`", top)));

    let options = CompileOptions {
        workspace: args.workspace.clone(),
        write_output: !args.no_write,
        debug: args.debug,
        unroll_limit: args.unroll_limit,
        runtime: RuntimeConfig::for_board(args.board.clone())
            .with_freq(args.freq)
            .with_timing(args.timing),
    };

    if args.verbose {
        println!("{}", "PyLog to HLS Compiler".bold().blue());
        println!("{}", "=".repeat(35));
        println!();
        println!("{}: {}", "Kernel".green(), top);
        let described: Vec<String> = arg_specs.iter().map(ArgSpec::to_string).collect();
        println!("{}: {}", "Arguments".green(), described.join(", "));
        println!(
            "{}: {} @ {} MHz",
            "Target".green(),
            options.runtime.board,
            options.runtime.freq
        );
        println!();
    }

    let output = compile_to_workspace(kernel_source, &arg_specs, &options)
        .unwrap_or_else(|e| fail("Compilation error", e));

    if args.json_output {
        match output.deployment.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => fail("Error", format!("Failed to serialize to JSON: {}", e)),
        }
    } else {
        print_summary(&output, &options, args.verbose);
    }
    if args.print_code {
        println!("{}", output.hls_c);
    }
}

fn print_summary(output: &CompileOutput, options: &CompileOptions, verbose: bool) {
    let metadata = &output.metadata;
    println!("{}", "Compilation Results".bold().green());
    println!("{}", "=".repeat(50));
    println!();

    println!("{}: {}", "Kernel".cyan(), metadata.top_function_name);
    println!("{}: {}", "Project".cyan(), metadata.project_path.display());
    println!("{}: {}", "Memory bundles".cyan(), metadata.num_bundles);
    println!("{}: {}", "Returns void".cyan(), metadata.returns_void);
    println!(
        "{}: {} @ {} MHz{}",
        "Board".cyan(),
        output.deployment.runtime.board,
        output.deployment.runtime.freq,
        if output.deployment.runtime.timing { " (timed)" } else { "" }
    );
    if options.write_output {
        let written = options.workspace.join(format!("{}.cpp", metadata.top_function_name));
        println!("{}: {}", "Written".cyan(), written.display());
    } else {
        println!("{}", "(not written, --no-write)".dimmed());
    }
    println!();

    if verbose {
        println!("{}", "Generated HLS C".bold().yellow());
        println!("{}", "-".repeat(50));
        println!("{} lines", output.hls_c.lines().count());
    }
}
