//! c11cc CLI
//!
//! Command-line interface for compiling C11-subset programs to x86-64
//! assembly or, via the system `cc`, to linked executables.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use std::process;

use c11cc::config::{CompilerConfig, OutputKind, ProjectFileConfig};
use c11cc::driver::{self, CompileError};

#[derive(ClapParser)]
#[command(name = "c11c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "c11cc - compile a C11 subset to x86-64 assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .c file to an executable (or to assembly with -S)
    Compile {
        /// Input C source file
        input: PathBuf,

        /// Output path (defaults to the input filename without .c, or
        /// with a .s extension under --emit-asm)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after emitting assembly; skip assemble/link
        #[arg(long = "emit-asm", short = 'S', visible_alias = "assembly-only")]
        emit_asm: bool,

        /// Add a directory to the include search path, searched ahead
        /// of the compiler's internal headers
        #[arg(short = 'I', value_name = "DIR")]
        include_dirs: Vec<PathBuf>,

        /// Treat warnings as errors
        #[arg(long = "Werror")]
        warnings_as_errors: bool,

        /// Path to a c11cc.toml project config file, merged under the
        /// flags above
        #[arg(long)]
        config: Option<PathBuf>,

        /// Reserved for future non-Linux targets; only the default is
        /// accepted today
        #[arg(long)]
        target: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            output,
            emit_asm,
            include_dirs,
            warnings_as_errors,
            config,
            target,
        } => {
            run_compile(
                &input,
                output.as_deref(),
                emit_asm,
                include_dirs,
                warnings_as_errors,
                config.as_deref(),
                target.as_deref(),
            );
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "c11c", &mut io::stdout());
}

fn run_compile(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    emit_asm: bool,
    include_dirs: Vec<PathBuf>,
    warnings_as_errors: bool,
    config_path: Option<&std::path::Path>,
    target: Option<&str>,
) {
    if let Some(target) = target {
        if target != "x86_64-linux-gnu" {
            eprintln!("error: unsupported target '{}' (only the default x86-64 Linux target is implemented)", target);
            process::exit(1);
        }
    }

    let output_kind = if emit_asm {
        OutputKind::Assembly
    } else {
        OutputKind::Executable
    };

    let mut config = CompilerConfig::new()
        .with_include_dirs(include_dirs)
        .with_warnings_as_errors(warnings_as_errors)
        .with_output(output_kind);

    if let Some(path) = config_path {
        match ProjectFileConfig::load(path) {
            Ok(file) => config = config.merge_from_file(file),
            Err(e) => {
                eprintln!("error: cannot read project config '{}': {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(input, output_kind));

    match driver::compile_file(input, &output_path, &config) {
        Ok(()) => {
            println!("Compiled {} -> {}", input.display(), output_path.display());
        }
        Err(CompileError::Diagnostics(diags)) => {
            eprint!("{}", diags.format_for_stderr());
            process::exit(1);
        }
        Err(CompileError::Io(e)) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn default_output_path(input: &std::path::Path, kind: OutputKind) -> PathBuf {
    match kind {
        OutputKind::Assembly => input.with_extension("s"),
        OutputKind::Executable => input.with_extension(""),
    }
}
