//! c11cc — a compiler for a substantial subset of C11, targeting
//! x86-64 GNU assembly.
//!
//! Pipeline: preprocess (comment stripping + `#include`) → lex → parse
//! → semantic analysis interleaved with IL lowering → liveness and
//! interference analysis → iterated register coalescing → assembly
//! emission → system `cc` for assemble/link.
//!
//! # Extending the compiler
//!
//! [`CompilerConfig`] is the extensibility seam: add include search
//! directories, turn on `-Werror`-style strictness, or choose to stop
//! after emitting assembly.
//!
//! ```rust,ignore
//! use c11cc::{CompilerConfig, compile_file};
//! use std::path::Path;
//!
//! let config = CompilerConfig::new().with_include_dir("vendor/include");
//! compile_file(Path::new("main.c"), Path::new("main"), &config)?;
//! ```

pub mod ast;
pub mod config;
pub mod diag;
pub mod driver;
pub mod emit;
pub mod il;
pub mod lexer;
pub mod liveness;
pub mod lower;
pub mod parser;
pub mod preprocessor;
pub mod regalloc;
pub mod symtab;
pub mod token;
pub mod types;

pub use ast::Program;
pub use config::{CompilerConfig, OutputKind};
pub use diag::{Diagnostic, Diagnostics, Severity, Span};
pub use driver::{CompileError, compile_file, compile_to_assembly};
pub use parser::Parser;
pub use types::Type;
