//! The symbol environment: nested scopes, the parallel tag namespace,
//! and linkage/redeclaration resolution.
//!
//! This is where `ast::TypeSpec`/`Declarator` pairs turn into real
//! `types::Type`s — type-checking is interleaved with lowering, not a
//! separate pass, so the symbol table is consulted directly while
//! walking the AST rather than built up front.

use crate::diag::{Diagnostics, Span};
use crate::types::{self, AggDef, AggKind, Type};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDuration {
    Static,
    Automatic,
}

/// An entry in the ordinary identifier namespace: variables, functions,
/// typedef names, and enum constants.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub ty: Rc<Type>,
    pub linkage: Linkage,
    pub duration: StorageDuration,
    pub is_typedef: bool,
    pub is_defined: bool,
    /// The link-time/emission name: for external linkage this is the
    /// identifier itself; for file-scope `static` it is still the
    /// identifier (the linker never sees it); for block-scope `static`
    /// it is a synthesized unique name so repeated calls share storage.
    pub link_name: String,
}

struct Scope {
    symbols: HashMap<String, Symbol>,
    tags: HashMap<String, Rc<AggDef>>,
}

impl Scope {
    fn new() -> Self {
        Scope {
            symbols: HashMap::new(),
            tags: HashMap::new(),
        }
    }
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
    next_tag_id: u32,
    next_static_local_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::new()],
            next_tag_id: 0,
            next_static_local_id: 0,
        }
    }

    pub fn is_file_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop file scope");
        self.scopes.pop();
    }

    /// A fresh, process-unique name for a block-scope `static` local, so
    /// every call of the enclosing function shares the same storage
    /// without colliding with another function's local of the same name.
    pub fn fresh_static_local_name(&mut self, base: &str) -> String {
        let id = self.next_static_local_id;
        self.next_static_local_id += 1;
        format!("__static_local_{}_{}", base, id)
    }

    pub fn fresh_tag_id(&mut self) -> u32 {
        let id = self.next_tag_id;
        self.next_tag_id += 1;
        id
    }

    /// Look up an identifier, searching from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.symbols.get(name))
    }

    /// Look up an identifier only in the current (innermost) scope,
    /// which is what redeclaration-compatibility checks need.
    pub fn lookup_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().unwrap().symbols.get(name)
    }

    pub fn lookup_tag(&self, name: &str) -> Option<&Rc<AggDef>> {
        self.scopes.iter().rev().find_map(|s| s.tags.get(name))
    }

    pub fn lookup_tag_current_scope(&self, name: &str) -> Option<&Rc<AggDef>> {
        self.scopes.last().unwrap().tags.get(name)
    }

    /// Declare (or merge with a prior compatible declaration of) a tag
    /// in the current scope's tag namespace, per §4.2's tag-identity
    /// rules: two `struct Foo {...}` texts are different types even if
    /// structurally identical, but redeclaring the same tag to add a
    /// member list completes a previously-incomplete one.
    pub fn declare_tag(
        &mut self,
        kind: AggKind,
        name: Option<String>,
        members: Option<Vec<crate::types::Member>>,
        diags: &mut Diagnostics,
        span: Span,
    ) -> Rc<AggDef> {
        let tag_id = match &name {
            Some(n) => {
                if let Some(existing) = self.lookup_tag_current_scope(n) {
                    if existing.kind != kind {
                        diags.error(
                            span.clone(),
                            format!("'{}' defined as wrong kind of tag", n),
                        );
                    }
                    if existing.members.is_some() && members.is_some() {
                        diags.error(span.clone(), format!("redefinition of '{}'", n));
                    }
                    existing.tag_id
                } else {
                    self.fresh_tag_id()
                }
            }
            None => self.fresh_tag_id(),
        };
        let def = Rc::new(AggDef {
            tag_id,
            kind,
            tag: name.clone(),
            members: members.map(Rc::new),
        });
        if let Some(n) = name {
            self.scopes.last_mut().unwrap().tags.insert(n, def.clone());
        }
        def
    }

    /// Compute the linkage a declaration gets from its storage-class
    /// specifiers and scope, per §4.2: file-scope `static` is internal,
    /// file-scope (no storage class, or `extern`) is external, and a
    /// block-scope `extern` inherits whatever linkage an outer
    /// declaration of the same name already has (falling back to
    /// external for a first-seen block-scope `extern`).
    pub fn compute_linkage(&self, name: &str, is_static: bool, is_extern: bool) -> Linkage {
        if self.is_file_scope() {
            if is_static {
                return Linkage::Internal;
            }
            return Linkage::External;
        }
        if is_extern {
            if let Some(outer) = self.lookup(name) {
                return outer.linkage;
            }
            return Linkage::External;
        }
        Linkage::None
    }

    /// Declare an ordinary identifier in the current scope, checking
    /// redeclaration compatibility against anything already declared
    /// for the same name in this scope (§4.2). Returns the effective
    /// symbol (which may be the merged/composite of a prior compatible
    /// declaration).
    pub fn declare(
        &mut self,
        name: String,
        ty: Rc<Type>,
        linkage: Linkage,
        duration: StorageDuration,
        is_typedef: bool,
        is_defined: bool,
        link_name: String,
        diags: &mut Diagnostics,
        span: Span,
    ) -> Symbol {
        if let Some(existing) = self.lookup_current_scope(&name) {
            if existing.is_typedef != is_typedef {
                diags.error(span.clone(), format!("'{}' redeclared with different kind", name));
            } else if existing.linkage == Linkage::None || linkage == Linkage::None {
                if !(existing.linkage == linkage) {
                    diags.error(span.clone(), format!("redeclaration of '{}' with no linkage", name));
                }
            } else if existing.linkage != linkage {
                diags.warning(
                    span.clone(),
                    format!("'{}' redeclared with different linkage", name),
                );
            }
            let composite = if types::compatible(&existing.ty, &ty) {
                Rc::new(types::compose(&existing.ty, &ty))
            } else {
                diags.error(span.clone(), format!("conflicting types for '{}'", name));
                ty.clone()
            };
            if existing.is_defined && is_defined {
                diags.error(span.clone(), format!("redefinition of '{}'", name));
            }
            let sym = Symbol {
                ty: composite,
                linkage,
                duration,
                is_typedef,
                is_defined: existing.is_defined || is_defined,
                link_name: existing.link_name.clone(),
            };
            self.scopes.last_mut().unwrap().symbols.insert(name, sym.clone());
            return sym;
        }
        let sym = Symbol {
            ty,
            linkage,
            duration,
            is_typedef,
            is_defined,
            link_name,
        };
        self.scopes.last_mut().unwrap().symbols.insert(name, sym.clone());
        sym
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::synthetic()
    }

    #[test]
    fn file_scope_declarations_default_to_external_linkage() {
        let table = SymbolTable::new();
        assert_eq!(table.compute_linkage("f", false, false), Linkage::External);
        assert_eq!(table.compute_linkage("f", true, false), Linkage::Internal);
    }

    #[test]
    fn block_scope_extern_inherits_outer_linkage() {
        let mut table = SymbolTable::new();
        table.declare(
            "x".to_string(),
            Rc::new(Type::int()),
            Linkage::Internal,
            StorageDuration::Static,
            false,
            false,
            "x".to_string(),
            &mut Diagnostics::new(),
            span(),
        );
        table.push_scope();
        assert_eq!(table.compute_linkage("x", false, true), Linkage::Internal);
    }

    #[test]
    fn redeclaring_same_tag_with_members_completes_it() {
        let mut table = SymbolTable::new();
        let mut diags = Diagnostics::new();
        table.declare_tag(AggKind::Struct, Some("Foo".to_string()), None, &mut diags, span());
        let def = table.declare_tag(
            AggKind::Struct,
            Some("Foo".to_string()),
            Some(Vec::new()),
            &mut diags,
            span(),
        );
        assert!(!diags.has_errors());
        assert!(def.members.is_some());
    }

    #[test]
    fn redefining_a_tag_with_members_twice_is_an_error() {
        let mut table = SymbolTable::new();
        let mut diags = Diagnostics::new();
        table.declare_tag(AggKind::Struct, Some("Foo".to_string()), Some(Vec::new()), &mut diags, span());
        table.declare_tag(AggKind::Struct, Some("Foo".to_string()), Some(Vec::new()), &mut diags, span());
        assert!(diags.has_errors());
    }

    #[test]
    fn incompatible_redeclaration_types_are_an_error() {
        let mut table = SymbolTable::new();
        let mut diags = Diagnostics::new();
        table.declare(
            "x".to_string(),
            Rc::new(Type::int()),
            Linkage::External,
            StorageDuration::Static,
            false,
            false,
            "x".to_string(),
            &mut diags,
            span(),
        );
        table.declare(
            "x".to_string(),
            Rc::new(Type::pointer_to(Type::int())),
            Linkage::External,
            StorageDuration::Static,
            false,
            false,
            "x".to_string(),
            &mut diags,
            span(),
        );
        assert!(diags.has_errors());
    }
}
