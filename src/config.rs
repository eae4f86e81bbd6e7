//! Compiler configuration: include search path, diagnostic strictness,
//! and the optional `c11cc.toml` project file that seeds them.
//!
//! Mirrors the builder-pattern extensibility seam the rest of the
//! toolchain uses for anything that varies per invocation rather than
//! per translation unit.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// What the driver should stop at after a successful compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Stop after emitting the `.s` file (`--emit-asm`/`-S`).
    Assembly,
    /// Assemble and link into an executable via the system `cc`.
    Executable,
}

impl Default for OutputKind {
    fn default() -> Self {
        OutputKind::Executable
    }
}

/// Per-invocation compiler configuration. Built up with the chained
/// `with_*` methods and consumed by `driver::compile`.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// User include directories, searched in order, ahead of the
    /// compiler's internal directory (`-I <dir>`, repeatable).
    pub include_dirs: Vec<PathBuf>,
    /// Reserved for a future `-D name[=value]` flag. `#define` is not
    /// implemented, but the field exists the way a linking concern
    /// half out of scope still gets a place to live.
    pub defined_macros: Vec<String>,
    /// Promote warnings (e.g. lenient function-pointer parameter-list
    /// compatibility) to errors.
    pub warnings_as_errors: bool,
    pub output: OutputKind,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            include_dirs: Vec::new(),
            defined_macros: Vec::new(),
            warnings_as_errors: false,
            output: OutputKind::default(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_include_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.include_dirs.extend(dirs);
        self
    }

    pub fn with_defined_macro(mut self, name: impl Into<String>) -> Self {
        self.defined_macros.push(name.into());
        self
    }

    pub fn with_warnings_as_errors(mut self, yes: bool) -> Self {
        self.warnings_as_errors = yes;
        self
    }

    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    /// Merge a project file's settings under this config — CLI-derived
    /// fields always win, the file only fills in what wasn't already
    /// set from the command line.
    pub fn merge_from_file(mut self, file: ProjectFileConfig) -> Self {
        for dir in file.include_dirs {
            if !self.include_dirs.contains(&dir) {
                self.include_dirs.push(dir);
            }
        }
        if file.warnings_as_errors {
            self.warnings_as_errors = true;
        }
        self
    }
}

/// The `[compiler]` table of an optional `c11cc.toml` project file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFileConfig {
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub warnings_as_errors: bool,
}

impl ProjectFileConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(default)]
            compiler: ProjectFileConfig,
        }
        let wrapper: Wrapper = toml::from_str(text)?;
        Ok(wrapper.compiler)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        ProjectFileConfig::from_toml(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_links_an_executable() {
        let config = CompilerConfig::new();
        assert_eq!(config.output, OutputKind::Executable);
        assert!(!config.warnings_as_errors);
        assert!(config.include_dirs.is_empty());
    }

    #[test]
    fn builder_methods_chain() {
        let config = CompilerConfig::new()
            .with_include_dir("vendor/include")
            .with_warnings_as_errors(true)
            .with_output(OutputKind::Assembly);
        assert_eq!(config.include_dirs, vec![PathBuf::from("vendor/include")]);
        assert!(config.warnings_as_errors);
        assert_eq!(config.output, OutputKind::Assembly);
    }

    #[test]
    fn project_file_parses_include_dirs_and_strictness() {
        let toml = r#"
            [compiler]
            include_dirs = ["include", "vendor/include"]
            warnings_as_errors = true
        "#;
        let file = ProjectFileConfig::from_toml(toml).unwrap();
        assert_eq!(file.include_dirs.len(), 2);
        assert!(file.warnings_as_errors);
    }

    #[test]
    fn cli_flags_take_precedence_over_project_file() {
        let file = ProjectFileConfig {
            include_dirs: vec![PathBuf::from("from-file")],
            warnings_as_errors: false,
        };
        let config = CompilerConfig::new()
            .with_warnings_as_errors(true)
            .merge_from_file(file);
        assert!(config.warnings_as_errors);
        assert_eq!(config.include_dirs, vec![PathBuf::from("from-file")]);
    }
}
