//! Comment stripping and `#include` resolution.
//!
//! This is the light preprocessing pass spec.md describes: no macro
//! expansion, no conditional inclusion, just comments gone and includes
//! spliced in, with line numbers tracked through multi-line block
//! comments so later spans stay accurate.

use crate::diag::{Diagnostics, Span};
use std::path::{Path, PathBuf};
use std::rc::Rc;

const MAX_INCLUDE_DEPTH: usize = 32;

pub struct Preprocessor<'a> {
    internal_include_dir: Option<&'a Path>,
    user_include_dirs: &'a [PathBuf],
}

impl<'a> Preprocessor<'a> {
    pub fn new(internal_include_dir: Option<&'a Path>, user_include_dirs: &'a [PathBuf]) -> Self {
        Preprocessor {
            internal_include_dir,
            user_include_dirs,
        }
    }

    /// Strip `//` and `/* */` comments from `source`, replacing their
    /// contents with spaces (not removing the bytes outright) so every
    /// remaining token keeps its original line/column.
    fn strip_comments(source: &str, file: Rc<str>, diags: &mut Diagnostics) -> String {
        let bytes = source.as_bytes();
        let mut out = String::with_capacity(bytes.len());
        let mut i = 0;
        let mut line = 1u32;
        let mut col = 1u32;
        while i < bytes.len() {
            let c = bytes[i];
            if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(' ');
                    i += 1;
                    col += 1;
                }
                continue;
            }
            if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
                let start_line = line;
                let start_col = col;
                out.push(' ');
                out.push(' ');
                i += 2;
                col += 2;
                let mut closed = false;
                while i < bytes.len() {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        out.push(' ');
                        out.push(' ');
                        i += 2;
                        col += 2;
                        closed = true;
                        break;
                    }
                    if bytes[i] == b'\n' {
                        out.push('\n');
                        line += 1;
                        col = 1;
                    } else {
                        out.push(' ');
                        col += 1;
                    }
                    i += 1;
                }
                if !closed {
                    diags.error(
                        Span::new(file.clone(), start_line, start_col),
                        "unterminated block comment".to_string(),
                    );
                }
                continue;
            }
            out.push(c as char);
            i += 1;
            if c == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        out
    }

    fn resolve_include(
        &self,
        name: &str,
        is_quoted: bool,
        including_dir: Option<&Path>,
    ) -> Option<PathBuf> {
        if is_quoted {
            if let Some(dir) = including_dir {
                let candidate = dir.join(name);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        for dir in self.user_include_dirs {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        if let Some(dir) = self.internal_include_dir {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Run comment stripping and include resolution over `path`,
    /// returning the merged, comment-free source text with every
    /// included file's contents spliced in at the `#include` site.
    pub fn process_file(&self, path: &Path, diags: &mut Diagnostics) -> String {
        self.process_file_at_depth(path, diags, 0)
    }

    fn process_file_at_depth(&self, path: &Path, diags: &mut Diagnostics, depth: usize) -> String {
        let file_name: Rc<str> = Rc::from(path.to_string_lossy().as_ref());
        if depth > MAX_INCLUDE_DEPTH {
            diags.error(
                Span::new(file_name, 1, 1),
                format!("include depth exceeds {} (likely a cyclic #include)", MAX_INCLUDE_DEPTH),
            );
            return String::new();
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                diags.error(Span::new(file_name, 1, 1), format!("cannot read '{}': {}", path.display(), e));
                return String::new();
            }
        };
        let stripped = Self::strip_comments(&raw, file_name.clone(), diags);
        let including_dir = path.parent();

        let mut out = String::with_capacity(stripped.len());
        for line in stripped.split_inclusive('\n') {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("#include") {
                let rest = rest.trim_start();
                if let Some((target, quoted)) = parse_include_target(rest) {
                    match self.resolve_include(&target, quoted, including_dir) {
                        Some(resolved) => {
                            let included =
                                self.process_file_at_depth(&resolved, diags, depth + 1);
                            out.push_str(&included);
                            out.push('\n');
                        }
                        None => {
                            diags.error(
                                Span::new(file_name.clone(), 1, 1),
                                format!("cannot find include file '{}'", target),
                            );
                        }
                    }
                    continue;
                }
            }
            out.push_str(line);
        }
        out
    }
}

/// Parse the target of a `#include` directive: `"file"` or `<file>`,
/// returning the bare name and whether it used the quoted form.
fn parse_include_target(rest: &str) -> Option<(String, bool)> {
    let rest = rest.trim_start();
    if let Some(remainder) = rest.strip_prefix('"') {
        let end = remainder.find('"')?;
        return Some((remainder[..end].to_string(), true));
    }
    if let Some(remainder) = rest.strip_prefix('<') {
        let end = remainder.find('>')?;
        return Some((remainder[..end].to_string(), false));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments_preserving_columns() {
        let mut diags = Diagnostics::new();
        let result = Preprocessor::strip_comments(
            "int a; // trailing comment\nint b;\n",
            Rc::from("t.c"),
            &mut diags,
        );
        assert!(result.starts_with("int a; "));
        assert!(!result.contains("trailing"));
        assert!(!diags.has_errors());
    }

    #[test]
    fn strips_block_comments_preserving_line_count() {
        let mut diags = Diagnostics::new();
        let input = "int a; /* multi\nline */ int b;\n";
        let result = Preprocessor::strip_comments(input, Rc::from("t.c"), &mut diags);
        assert_eq!(result.matches('\n').count(), input.matches('\n').count());
        assert!(!result.contains("multi"));
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let mut diags = Diagnostics::new();
        Preprocessor::strip_comments("/* never closed", Rc::from("t.c"), &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn parses_quoted_and_angle_include_targets() {
        assert_eq!(
            parse_include_target("\"foo.h\"\n"),
            Some(("foo.h".to_string(), true))
        );
        assert_eq!(
            parse_include_target("<stdio.h>\n"),
            Some(("stdio.h".to_string(), false))
        );
    }
}
