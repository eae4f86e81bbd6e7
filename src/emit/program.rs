//! Whole-program assembly assembly: one `.text` entry per defined
//! function, then `.data`/`.bss` for file-scope objects and `.rodata`
//! for interned string literals.

use crate::il::{ILProgram, StaticDatum};
use crate::emit::x86;

pub fn emit(program: &ILProgram) -> String {
    let mut out = String::new();
    out.push_str("    .text\n");
    for func in &program.functions {
        if func.is_defined {
            x86::emit_function(func, &mut out);
        }
    }
    emit_statics(&program.statics, &mut out);
    emit_string_literals(&program.string_literals, &mut out);
    out
}

fn emit_statics(statics: &[StaticDatum], out: &mut String) {
    let (initialized, zeroed): (Vec<_>, Vec<_>) =
        statics.iter().partition(|s| matches!(s.init, Some(v) if v != 0));

    if !initialized.is_empty() {
        out.push_str("    .data\n");
        for s in &initialized {
            emit_linkage(s, out);
            out.push_str(&format!("    .align {}\n", s.ty.align()));
            out.push_str(&format!("{}:\n", s.name));
            emit_scalar_datum(s, out);
        }
    }

    if !zeroed.is_empty() {
        out.push_str("    .bss\n");
        for s in &zeroed {
            emit_linkage(s, out);
            out.push_str(&format!("    .align {}\n", s.ty.align()));
            out.push_str(&format!("{}:\n", s.name));
            out.push_str(&format!("    .zero {}\n", s.ty.size()));
        }
    }
}

fn emit_linkage(s: &StaticDatum, out: &mut String) {
    if s.is_external_linkage {
        out.push_str(&format!("    .globl {}\n", s.name));
    }
}

fn emit_scalar_datum(s: &StaticDatum, out: &mut String) {
    let value = s.init.unwrap_or(0);
    let directive = match s.ty.size() {
        1 => ".byte",
        2 => ".word",
        4 => ".long",
        _ => ".quad",
    };
    out.push_str(&format!("    {} {}\n", directive, value));
}

fn emit_string_literals(strings: &[std::rc::Rc<[u8]>], out: &mut String) {
    if strings.is_empty() {
        return;
    }
    out.push_str("    .section .rodata\n");
    for (id, bytes) in strings.iter().enumerate() {
        out.push_str(&format!(".Lstr{}:\n", id));
        out.push_str("    .byte ");
        let rendered: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
        out.push_str(&rendered.join(","));
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::ILFunction;
    use crate::types::Type;
    use std::rc::Rc;

    #[test]
    fn zero_initialized_statics_land_in_bss() {
        let mut program = ILProgram::default();
        program.statics.push(StaticDatum {
            name: "counter".to_string(),
            ty: Rc::new(Type::int()),
            init: None,
            is_external_linkage: true,
        });
        let asm = emit(&program);
        assert!(asm.contains(".bss"));
        assert!(asm.contains("counter:"));
    }

    #[test]
    fn non_zero_statics_land_in_data() {
        let mut program = ILProgram::default();
        program.statics.push(StaticDatum {
            name: "limit".to_string(),
            ty: Rc::new(Type::int()),
            init: Some(42),
            is_external_linkage: false,
        });
        let asm = emit(&program);
        assert!(asm.contains(".data"));
        assert!(asm.contains(".long 42"));
    }

    #[test]
    fn defined_functions_are_emitted_but_declarations_are_not() {
        let mut program = ILProgram::default();
        let mut f = ILFunction::new("used");
        f.is_defined = true;
        program.functions.push(f);
        let mut undefined = ILFunction::new("extern_only");
        undefined.is_defined = false;
        program.functions.push(undefined);
        let asm = emit(&program);
        assert!(asm.contains("used:"));
        assert!(!asm.contains("extern_only:"));
    }
}
