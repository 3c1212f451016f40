//! Command-line embedding-surface demo for the Quill runtime.
//!
//! A thin driver over `quill-runtime`'s public API: `run`/`disasm`/`repl`/
//! `save`/`load` subcommands via `clap::Parser`/`Subcommand`.

use clap::{Parser as ClapParser, Subcommand};
use quill_runtime::{disassemble, format_value, loader, Level, RuntimeError, Vm, VmConfig};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "quill")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quill scripting runtime - run, disassemble, and explore Quill programs", long_about = None)]
struct Cli {
    /// Path to a quill.toml config file; defaults built in otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Quill source file and print its result
    Run {
        /// Input source file
        input: PathBuf,

        /// Print the result with `examine` instead of `display`
        #[arg(long)]
        examine: bool,
    },

    /// Print the disassembly of a Quill source file's top-level code
    Disasm {
        /// Input source file
        input: PathBuf,
    },

    /// Start an interactive read-eval-print loop
    Repl,

    /// Evaluate a source file and save the result value to a snapshot file
    Save {
        /// Input source file
        input: PathBuf,

        /// Output snapshot path
        output: PathBuf,
    },

    /// Load a snapshot file and print the value it contains
    Load {
        /// Snapshot file to load
        input: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Run { input, examine } => run_file(&input, config, examine),
        Commands::Disasm { input } => disasm_file(&input, config),
        Commands::Repl => repl(config),
        Commands::Save { input, output } => save_file(&input, &output, config),
        Commands::Load { input } => load_file(&input, config),
    };

    if let Err(message) = result {
        eprintln!("error: {message}");
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> VmConfig {
    let Some(path) = path else { return VmConfig::default() };
    match std::fs::read_to_string(path) {
        Ok(text) => VmConfig::from_toml(&text).unwrap_or_else(|e| {
            eprintln!("warning: {}: {e}, using defaults", path.display());
            VmConfig::default()
        }),
        Err(e) => {
            eprintln!("warning: could not read {}: {e}, using defaults", path.display());
            VmConfig::default()
        }
    }
}

fn read_source(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("could not read {}: {e}", path.display()))
}

fn run_file(input: &Path, config: VmConfig, examine: bool) -> Result<(), String> {
    let source = read_source(input)?;
    let mut vm = Vm::new(config);
    let result = vm.eval(&source).map_err(|e| format_runtime_error(&vm, e))?;
    let level = if examine { Level::Examine } else { Level::Display };
    println!("{}", vm.format(result, level));
    vm.maybe_report();
    Ok(())
}

fn disasm_file(input: &Path, config: VmConfig) -> Result<(), String> {
    let source = read_source(input)?;
    let mut vm = Vm::new(config);
    let compiled = quill_runtime_compile(&source, &mut vm)?;
    let code = loader::load(&mut vm.heap, &mut vm.globals, &mut vm.roots, &compiled)
        .map_err(|e| format_runtime_error(&vm, e))?;
    println!("{}", disassemble(&vm.heap, code));
    Ok(())
}

fn quill_runtime_compile(
    source: &str,
    vm: &mut Vm,
) -> Result<quill_compiler::CompiledCode, String> {
    quill_compiler::compile_source(source, &mut vm.globals).map_err(|diags| {
        diags.items().iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
    })
}

fn save_file(input: &Path, output: &Path, config: VmConfig) -> Result<(), String> {
    let source = read_source(input)?;
    let mut vm = Vm::new(config);
    let result = vm.eval(&source).map_err(|e| format_runtime_error(&vm, e))?;
    let bytes = quill_core::gc_save(&vm.heap, result);
    std::fs::write(output, bytes).map_err(|e| format!("could not write {}: {e}", output.display()))
}

fn load_file(input: &Path, config: VmConfig) -> Result<(), String> {
    let bytes = std::fs::read(input).map_err(|e| format!("could not read {}: {e}", input.display()))?;
    let mut vm = Vm::new(config);
    let value = quill_core::gc_load(&mut vm.heap, &bytes, |visit| {
        vm.globals.for_each_root(visit);
        vm.roots.for_each_root(visit);
    })
    .map_err(|e| format!("{e}"))?;
    println!("{}", vm.format(value, Level::Display));
    Ok(())
}

fn repl(config: VmConfig) -> Result<(), String> {
    let mut vm = Vm::new(config);
    let mut editor = rustyline::DefaultEditor::new().map_err(|e| format!("could not start line editor: {e}"))?;
    println!("quill {} -- interactive repl, ^D to exit", env!("CARGO_PKG_VERSION"));
    loop {
        match editor.readline("quill> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if line.trim().is_empty() {
                    continue;
                }
                match vm.eval(&line) {
                    Ok(v) => println!("{}", vm.format(v, Level::Print)),
                    Err(e) => eprintln!("error: {}", format_runtime_error(&vm, e)),
                }
            }
            Err(rustyline::error::ReadlineError::Eof) | Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(e) => return Err(format!("line editor error: {e}")),
        }
    }
    Ok(())
}

fn format_runtime_error(vm: &Vm, e: RuntimeError) -> String {
    let trace_values: Vec<String> = e
        .trace
        .iter()
        .map(|frame| format!("  at pc={} in {}", frame.pc, format_value(&vm.heap, frame.code, Level::Display)))
        .collect();
    if trace_values.is_empty() {
        e.code.to_string()
    } else {
        format!("{}\n{}", e.code, trace_values.join("\n"))
    }
}
