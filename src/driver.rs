//! End-to-end pipeline orchestration: source file in, assembly or
//! executable out.
//!
//! Mirrors the teacher's `lib.rs`, which shells out to `clang` as a
//! driver rather than hand-rolling an object-file writer or linker;
//! here the external tool is the system `cc`.

use crate::config::{CompilerConfig, OutputKind};
use crate::diag::Diagnostics;
use crate::emit;
use crate::lexer::Lexer;
use crate::lower;
use crate::parser::Parser;
use crate::preprocessor::Preprocessor;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

/// The internal include directory's contents, embedded at build time so
/// `#include <stdio.h>` resolves without a separate install step. These
/// are materialized into a scratch directory on disk once per process,
/// since the preprocessor resolves includes by searching real
/// directories.
const INTERNAL_HEADERS: &[(&str, &str)] = &[
    ("stdio.h", include_str!("../include/stdio.h")),
    ("stdlib.h", include_str!("../include/stdlib.h")),
    ("string.h", include_str!("../include/string.h")),
    ("ctype.h", include_str!("../include/ctype.h")),
];

/// Compile `input` per `config`, returning the generated assembly text
/// on success. Compilation failure is reported as `Err(Diagnostics)`.
pub fn compile_to_assembly(input: &Path, config: &CompilerConfig) -> Result<String, Diagnostics> {
    let mut diags = Diagnostics::new();

    let internal_dir = internal_include_dir();
    let preprocessor = Preprocessor::new(internal_dir.as_deref(), &config.include_dirs);
    let expanded = preprocessor.process_file(input, &mut diags);
    if diags.has_errors() {
        return Err(diags);
    }

    let file: Rc<str> = Rc::from(input.to_string_lossy().as_ref());
    let tokens = Lexer::new(&expanded, file).tokenize(&mut diags);
    if diags.has_errors() {
        return Err(diags);
    }

    let program = Parser::new(&tokens, &mut diags).parse_program();
    if diags.has_errors() {
        return Err(diags);
    }

    let il_program = lower::lower_program(&program, &mut diags, config.warnings_as_errors);
    if diags.has_errors() {
        return Err(diags);
    }

    Ok(emit::emit_program(&il_program))
}

/// Compile `input` and, unless `config.output` is `Assembly`, assemble
/// and link the result into `output` via the system `cc`.
pub fn compile_file(input: &Path, output: &Path, config: &CompilerConfig) -> Result<(), CompileError> {
    let asm = compile_to_assembly(input, config)?;

    match config.output {
        OutputKind::Assembly => {
            std::fs::write(output, asm)?;
            Ok(())
        }
        OutputKind::Executable => {
            let asm_path = output.with_extension("s");
            std::fs::write(&asm_path, asm)?;
            assemble_and_link(&asm_path, output)?;
            Ok(())
        }
    }
}

/// Invoke the system `cc` to assemble and link a `.s` file into an
/// executable. A missing `cc` surfaces as an `io::Error`, never as a
/// diagnostic — it's a toolchain-availability failure, not a mistake in
/// the translation unit.
fn assemble_and_link(asm_path: &Path, output: &Path) -> io::Result<()> {
    let status = Command::new("cc")
        .arg(asm_path)
        .arg("-o")
        .arg(output)
        .status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("cc exited with {}", status),
        ));
    }
    Ok(())
}

/// Write the embedded header table into a scratch directory under
/// `std::env::temp_dir()` (idempotent — the same bytes every time) and
/// return that directory, or `None` if it couldn't be created, in which
/// case `#include <...>` of an internal header simply won't resolve.
fn internal_include_dir() -> Option<PathBuf> {
    let dir = std::env::temp_dir().join("c11cc-include");
    std::fs::create_dir_all(&dir).ok()?;
    for (name, contents) in INTERNAL_HEADERS {
        std::fs::write(dir.join(name), contents).ok()?;
    }
    Some(dir)
}

/// Top-level error returned by the driver: either the compilation
/// recorded diagnostics, or an I/O failure occurred reading the source
/// or running the external assembler/linker.
#[derive(Debug)]
pub enum CompileError {
    Diagnostics(Diagnostics),
    Io(io::Error),
}

impl From<Diagnostics> for CompileError {
    fn from(d: Diagnostics) -> Self {
        CompileError::Diagnostics(d)
    }
}

impl From<io::Error> for CompileError {
    fn from(e: io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Diagnostics(d) => write!(f, "{}", d.format_for_stderr()),
            CompileError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_headers_materialize_to_a_readable_directory() {
        let dir = internal_include_dir().expect("scratch dir");
        assert!(dir.join("stdio.h").exists());
    }

    #[test]
    fn compile_error_renders_io_errors() {
        let err: CompileError = io::Error::new(io::ErrorKind::NotFound, "no cc").into();
        assert!(format!("{}", err).contains("no cc"));
    }
}
