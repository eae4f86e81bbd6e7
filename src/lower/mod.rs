//! Declaration, statement, and expression lowering: walks the AST
//! against a live symbol table and emits `il::ILProgram`. Type-checking
//! happens here too, interleaved with lowering rather than as a
//! separate pass, per the declarator-resolution design in `decl`.

pub mod decl;
pub mod expr;
pub mod state;
pub mod stmt;

use crate::ast::Program;
use crate::diag::Diagnostics;
use crate::il::ILProgram;
use state::LowerState;

/// Lower a whole translation unit to IL. Errors accumulate in `diags`
/// rather than aborting the walk, so a single bad declaration doesn't
/// hide problems in the rest of the file. `strict` promotes the lenient
/// incompatible-pointer-assignment warning to an error (`-Werror`).
pub fn lower_program(program: &Program, diags: &mut Diagnostics, strict: bool) -> ILProgram {
    let mut state = LowerState::new(diags, strict);
    for external_decl in &program.decls {
        decl::lower_external_decl(&mut state, external_decl);
    }
    state.program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn lower_source(src: &str) -> (ILProgram, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(src, std::rc::Rc::from("test.c")).tokenize(&mut diags);
        let parser = Parser::new(&tokens, &mut diags);
        let program = parser.parse_program();
        let mut diags2 = Diagnostics::new();
        let il = lower_program(&program, &mut diags2, false);
        (il, diags2)
    }

    #[test]
    fn lowers_a_trivial_function() {
        let (il, diags) = lower_source("int main(void) { return 0; }");
        assert!(!diags.has_errors());
        assert_eq!(il.functions.len(), 1);
        assert_eq!(il.functions[0].name, "main");
    }

    #[test]
    fn lowers_local_variable_assignment_and_use() {
        let (il, diags) = lower_source("int f(void) { int x = 1; x = x + 1; return x; }");
        assert!(!diags.has_errors());
        let f = &il.functions[0];
        assert!(f.commands.iter().any(|c| matches!(c, crate::il::Command::SetAt { .. })));
        assert!(f.commands.iter().any(|c| matches!(c, crate::il::Command::ReadAt { .. })));
    }

    #[test]
    fn lowers_a_while_loop_with_break() {
        let (il, diags) = lower_source(
            "int f(void) { int i = 0; while (i < 10) { if (i == 5) break; i = i + 1; } return i; }",
        );
        assert!(!diags.has_errors());
        let f = &il.functions[0];
        assert!(f.commands.iter().any(|c| matches!(c, crate::il::Command::JumpZero { .. })));
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let (_, diags) = lower_source("int f(void) { return y; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn repeated_tentative_definitions_coalesce_without_error() {
        let (il, diags) = lower_source("int x; int x; int main(void) { return x; }");
        assert!(!diags.has_errors());
        assert_eq!(il.statics.iter().filter(|s| s.name == "x").count(), 1);
    }

    #[test]
    fn extern_declaration_of_incomplete_array_allocates_no_storage() {
        let (il, diags) = lower_source("extern int arr[]; int main(void) { return 0; }");
        assert!(!diags.has_errors());
        assert!(il.statics.iter().all(|s| s.name != "arr"));
    }

    #[test]
    fn tentative_definition_of_incomplete_type_is_diagnosed_not_panicked() {
        let (_, diags) = lower_source("int arr[];");
        assert!(diags.has_errors());
    }
}
