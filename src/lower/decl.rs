//! Turns `ast::TypeSpec` + `ast::Declarator` pairs into real `types::Type`s
//! against the live symbol table, and lowers top-level declarations and
//! function definitions into `il::ILProgram` entries.

use crate::ast::*;
use crate::diag::Span;
use crate::il::{Command, ILFunction, ILValue, StaticDatum};
use crate::lower::expr::const_eval_usize;
use crate::lower::state::{FnContext, LowerState};
use crate::lower::stmt::lower_block_items;
use crate::symtab::{Linkage, StorageDuration, Symbol};
use crate::types::{layout_members, AggKind, Type};
use std::rc::Rc;

/// Resolve a bare `TypeSpec` (no declarator) to a `Type`, declaring any
/// inline struct/union/enum it carries along the way.
pub fn resolve_type_spec(state: &mut LowerState, spec: &TypeSpec, span: &Span) -> Type {
    match spec {
        TypeSpec::Void => Type::Void,
        TypeSpec::Char => Type::char_ty(),
        TypeSpec::Short => Type::short(),
        TypeSpec::Int => Type::int(),
        TypeSpec::Long => Type::long(),
        TypeSpec::UnsignedChar => Type::uchar(),
        TypeSpec::UnsignedShort => Type::Arithmetic {
            signedness: crate::types::Signedness::Unsigned,
            width: 2,
            is_bool: false,
        },
        TypeSpec::UnsignedInt => Type::uint(),
        TypeSpec::UnsignedLong => Type::ulong(),
        TypeSpec::Bool => Type::bool_ty(),
        TypeSpec::TypedefName(name) => match state.symtab.lookup(name) {
            Some(sym) if sym.is_typedef => (*sym.ty).clone(),
            _ => {
                state.diags.error(span.clone(), format!("unknown type name '{}'", name));
                Type::poison()
            }
        },
        TypeSpec::Aggregate { kind, tag, members } => {
            let agg_kind = match kind {
                AggKeyword::Struct => AggKind::Struct,
                AggKeyword::Union => AggKind::Union,
            };
            let resolved_members = members.as_ref().map(|fields| {
                let fields: Vec<(String, Type)> = fields
                    .iter()
                    .filter_map(|f| {
                        let ty = resolve_type_spec_declarator(state, &f.spec, &f.declarator, span);
                        f.declarator.name().map(|n| (n.to_string(), ty))
                    })
                    .collect();
                layout_members(agg_kind, &fields)
            });
            let def = state
                .symtab
                .declare_tag(agg_kind, tag.clone(), resolved_members, state.diags, span.clone());
            Type::Aggregate(def)
        }
        TypeSpec::Enum { tag: _, variants } => {
            if let Some(vs) = variants {
                let mut next = 0i64;
                for (name, value_expr) in vs {
                    let value = match value_expr {
                        Some(e) => const_eval_usize(state, e).unwrap_or(next as usize) as i64,
                        None => next,
                    };
                    state.enum_constants.insert(name.clone(), value);
                    next = value + 1;
                }
            }
            Type::int()
        }
    }
}

/// Resolve a `TypeSpec`/`Declarator` pair to the type the declarator's
/// name (if any) ultimately has, recursing outside-in over the
/// declarator tree and wrapping `base` at each layer.
pub fn resolve_type_spec_declarator(
    state: &mut LowerState,
    spec: &TypeSpec,
    declarator: &Declarator,
    span: &Span,
) -> Type {
    let base = resolve_type_spec(state, spec, span);
    resolve_declarator(state, base, declarator, span)
}

fn resolve_declarator(state: &mut LowerState, base: Type, declarator: &Declarator, span: &Span) -> Type {
    match declarator {
        Declarator::Ident(_) | Declarator::Abstract => base,
        Declarator::Pointer { inner, .. } => {
            resolve_declarator(state, Type::Pointer(Rc::new(base)), inner, span)
        }
        Declarator::Array { inner, size } => {
            let length = size.as_ref().and_then(|e| const_eval_usize(state, e));
            resolve_declarator(
                state,
                Type::Array {
                    element: Rc::new(base),
                    length,
                },
                inner,
                span,
            )
        }
        Declarator::Function {
            inner,
            params,
            is_void_params,
            has_prototype,
        } => {
            let param_types = if !has_prototype {
                None
            } else if *is_void_params {
                Some(Vec::new())
            } else {
                Some(
                    params
                        .iter()
                        .map(|(pspec, pdecl)| {
                            resolve_type_spec_declarator(state, pspec, pdecl, span).decay()
                        })
                        .collect(),
                )
            };
            resolve_declarator(
                state,
                Type::Function {
                    ret: Rc::new(base),
                    params: param_types,
                },
                inner,
                span,
            )
        }
    }
}

pub fn lower_external_decl(state: &mut LowerState, decl: &ExternalDecl) {
    match decl {
        ExternalDecl::Function(f) => lower_function_def(state, f),
        ExternalDecl::Declaration(d) => lower_file_scope_declaration(state, d),
    }
}

fn lower_file_scope_declaration(state: &mut LowerState, decl: &Declaration) {
    for init_decl in &decl.declarators {
        let ty = resolve_type_spec_declarator(state, &decl.spec, &init_decl.declarator, &decl.span);
        let Some(name) = init_decl.declarator.name() else {
            continue;
        };
        if decl.storage.is_typedef {
            state.symtab.declare(
                name.to_string(),
                Rc::new(ty),
                Linkage::None,
                StorageDuration::Static,
                true,
                true,
                name.to_string(),
                state.diags,
                decl.span.clone(),
            );
            continue;
        }
        let linkage = state
            .symtab
            .compute_linkage(name, decl.storage.is_static, decl.storage.is_extern);
        // A function is "defined" only by a body (`lower_function_def`); an
        // object is "defined" only by an explicit initializer. A bare
        // `int x;` is a tentative definition, not yet a real one, and may
        // legally repeat at file scope without triggering "redefinition".
        let is_defined = !ty.is_function() && init_decl.init.is_some();
        let sym: Symbol = state.symtab.declare(
            name.to_string(),
            Rc::new(ty.clone()),
            linkage,
            StorageDuration::Static,
            false,
            is_defined,
            name.to_string(),
            state.diags,
            decl.span.clone(),
        );
        if ty.is_function() {
            continue;
        }
        // `extern` without an initializer is a pure declaration: it refers
        // to storage defined elsewhere and allocates nothing here. This is
        // also the only place an incomplete object type (`extern int arr[];`)
        // is legal.
        if decl.storage.is_extern && init_decl.init.is_none() {
            continue;
        }
        if !ty.is_complete() {
            state.diags.error(
                decl.span.clone(),
                format!("storage size of '{}' isn't known", name),
            );
            continue;
        }
        let const_init = match &init_decl.init {
            Some(Initializer::Scalar(e)) => const_eval_usize(state, e).map(|v| v as i64).or(Some(0)),
            None => None,
        };
        // Repeated tentative definitions of the same object (`int x; int
        // x;`) coalesce onto one `StaticDatum` rather than allocating
        // storage twice; a later initializer upgrades a tentative entry.
        if let Some(existing) = state.program.statics.iter_mut().find(|s| s.name == sym.link_name) {
            if const_init.is_some() {
                existing.init = const_init;
            }
            continue;
        }
        state.program.statics.push(StaticDatum {
            name: sym.link_name.clone(),
            ty: Rc::new(ty),
            init: const_init,
            is_external_linkage: linkage == Linkage::External,
        });
    }
    if decl.declarators.is_empty() {
        // A bare `struct Foo { ... };` tag declaration with no declarator.
        let _ = resolve_type_spec(state, &decl.spec, &decl.span);
    }
}

fn lower_function_def(state: &mut LowerState, def: &FunctionDef) {
    let ret_ty = resolve_type_spec(state, &def.spec, &def.span);
    let fn_ty = resolve_declarator(state, ret_ty.clone(), &def.declarator, &def.span);
    let name = def
        .declarator
        .name()
        .expect("parser only accepts named declarators for function definitions")
        .to_string();

    let linkage = state
        .symtab
        .compute_linkage(&name, def.storage.is_static, def.storage.is_extern);
    state.symtab.declare(
        name.clone(),
        Rc::new(fn_ty.clone()),
        linkage,
        StorageDuration::Static,
        false,
        true,
        name.clone(),
        state.diags,
        def.span.clone(),
    );

    let mut func = ILFunction::new(name);
    state.push_scope();

    if let Declarator::Function { params, .. } = unwrap_to_function_declarator(&def.declarator) {
        for (pspec, pdecl) in params {
            let pty = resolve_type_spec_declarator(state, pspec, pdecl, &def.span).decay();
            let pname = pdecl.name().unwrap_or("").to_string();
            // The ABI prelude deposits the incoming argument into
            // `incoming`; the parameter then behaves like any other
            // local, addressable in its own stack slot.
            let incoming = func.fresh_local(Rc::new(pty.clone()));
            func.params.push(incoming.clone());
            if pname.is_empty() {
                continue;
            }
            state.symtab.declare(
                pname.clone(),
                Rc::new(pty.clone()),
                Linkage::None,
                StorageDuration::Automatic,
                false,
                true,
                pname.clone(),
                state.diags,
                def.span.clone(),
            );
            let slot = func.fresh_local(Rc::new(pty)).as_address();
            func.push(Command::SetAt {
                addr: ILValue {
                    is_lvalue_location: false,
                    ..slot.clone()
                },
                value: incoming,
            });
            state.declare_local(pname, slot);
        }
    }

    let mut ctx = FnContext::new();
    lower_block_items(state, &mut func, &mut ctx, &def.body);
    state.pop_scope();
    state.program.functions.push(func);
}

fn unwrap_to_function_declarator(declarator: &Declarator) -> &Declarator {
    match declarator {
        Declarator::Function { .. } => declarator,
        Declarator::Pointer { inner, .. } => unwrap_to_function_declarator(inner),
        _ => declarator,
    }
}

