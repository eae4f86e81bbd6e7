//! Shared mutable state threaded through declaration/statement/expression
//! lowering: the symbol table, the IL program being built, and the
//! per-function bookkeeping (fresh label ids, break/continue targets,
//! source-label-to-mangled-label mapping for `goto`).

use crate::diag::Diagnostics;
use crate::il::{ILFunction, ILProgram, ILValue};
use crate::symtab::SymbolTable;
use std::collections::HashMap;

pub struct LowerState<'d> {
    pub symtab: SymbolTable,
    pub program: ILProgram,
    pub diags: &'d mut Diagnostics,
    /// Enum constants fold directly to `i64` literals at the point an
    /// identifier is used; they never get an IL storage location.
    pub enum_constants: HashMap<String, i64>,
    /// Parallel to `symtab`'s scope stack: maps a name with automatic
    /// storage duration (locals, parameters) to the `ILValue` slot
    /// lowering already assigned it. File-scope/static names are
    /// resolved through `symtab` + `ILValue::named` instead.
    locals: Vec<HashMap<String, ILValue>>,
    next_label: u32,
    /// `-Werror`: promotes the lenient incompatible-pointer-assignment
    /// warning (e.g. a function pointer initialized from a function of
    /// a different prototype) to a hard error.
    pub strict: bool,
}

/// Per-function loop/label context, reset at the start of each function.
pub struct FnContext {
    pub break_targets: Vec<String>,
    pub continue_targets: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl FnContext {
    pub fn new() -> Self {
        FnContext {
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            labels: HashMap::new(),
        }
    }
}

impl<'d> LowerState<'d> {
    pub fn new(diags: &'d mut Diagnostics, strict: bool) -> Self {
        LowerState {
            symtab: SymbolTable::new(),
            program: ILProgram::default(),
            diags,
            enum_constants: HashMap::new(),
            locals: vec![HashMap::new()],
            next_label: 0,
            strict,
        }
    }

    pub fn push_scope(&mut self) {
        self.symtab.push_scope();
        self.locals.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.symtab.pop_scope();
        self.locals.pop();
    }

    pub fn declare_local(&mut self, name: String, value: ILValue) {
        self.locals.last_mut().unwrap().insert(name, value);
    }

    pub fn lookup_local(&self, name: &str) -> Option<ILValue> {
        self.locals.iter().rev().find_map(|s| s.get(name).cloned())
    }

    pub fn fresh_label(&mut self, hint: &str) -> String {
        let id = self.next_label;
        self.next_label += 1;
        format!(".L{}_{}", hint, id)
    }

    pub fn fresh_local(&mut self, func: &mut ILFunction, ty: std::rc::Rc<crate::types::Type>) -> ILValue {
        func.fresh_local(ty)
    }
}
