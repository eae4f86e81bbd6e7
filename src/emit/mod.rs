//! x86-64 GNU-assembler emission: turns a fully lowered `il::ILProgram`
//! into AT&T-syntax text ready for `as`/`cc` to assemble.

pub mod program;
pub mod x86;

use crate::il::ILProgram;

pub fn emit_program(program: &ILProgram) -> String {
    program::emit(program)
}
