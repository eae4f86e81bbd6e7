//! Statement lowering: control flow and declarations-as-block-items.
//!
//! Loops and `if` lower to explicit `Label`/`Jump`/`JumpZero` commands
//! rather than any structured-control-flow IL construct, matching the
//! flat three-address model the rest of the IL uses.

use crate::ast::*;
use crate::il::{Command, ILFunction, ILValue};
use crate::lower::decl::resolve_type_spec_declarator;
use crate::lower::expr::{const_eval_usize, convert_checked, lower_rvalue};
use crate::lower::state::{FnContext, LowerState};
use crate::symtab::{Linkage, StorageDuration};
use crate::types::Type;
use std::rc::Rc;

pub fn lower_block_items(
    state: &mut LowerState,
    func: &mut ILFunction,
    ctx: &mut FnContext,
    items: &[BlockItem],
) {
    state.push_scope();
    for item in items {
        lower_block_item(state, func, ctx, item);
    }
    state.pop_scope();
}

fn lower_block_item(state: &mut LowerState, func: &mut ILFunction, ctx: &mut FnContext, item: &BlockItem) {
    match item {
        BlockItem::Decl(decl) => lower_local_declaration(state, func, decl),
        BlockItem::Stmt(stmt) => lower_stmt(state, func, ctx, stmt),
    }
}

fn lower_local_declaration(state: &mut LowerState, func: &mut ILFunction, decl: &Declaration) {
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
                StorageDuration::Automatic,
                true,
                true,
                name.to_string(),
                state.diags,
                decl.span.clone(),
            );
            continue;
        }

        if decl.storage.is_static {
            lower_static_local(state, name, ty, init_decl, &decl.span);
            continue;
        }

        let linkage = state
            .symtab
            .compute_linkage(name, decl.storage.is_static, decl.storage.is_extern);
        if decl.storage.is_extern {
            state.symtab.declare(
                name.to_string(),
                Rc::new(ty.clone()),
                linkage,
                StorageDuration::Static,
                false,
                false,
                name.to_string(),
                state.diags,
                decl.span.clone(),
            );
            continue;
        }

        state.symtab.declare(
            name.to_string(),
            Rc::new(ty.clone()),
            Linkage::None,
            StorageDuration::Automatic,
            false,
            true,
            name.to_string(),
            state.diags,
            decl.span.clone(),
        );
        // Every local gets a stack slot, not a bare SSA value: it must
        // stay addressable for `&x`, array/struct member access, and
        // the liveness pass treats `ReadAt`/`SetAt` through it uniformly
        // with file-scope objects.
        let slot = func.fresh_local(Rc::new(ty.clone())).as_address();
        state.declare_local(name.to_string(), slot.clone());
        let slot_addr = ILValue {
            is_lvalue_location: false,
            ..slot
        };

        match &init_decl.init {
            Some(Initializer::Scalar(e)) => {
                let value = lower_rvalue(state, func, e);
                let value = convert_checked(state, func, value, Rc::new(ty.clone()), &decl.span);
                func.push(Command::SetAt {
                    addr: slot_addr,
                    value,
                });
            }
            None => {
                if ty.is_complete() {
                    func.push(Command::Zero {
                        addr: slot_addr,
                        size: ty.size() as u32,
                    });
                }
            }
        }
    }
}

/// A block-scope `static` local gets file-scope storage (emitted as a
/// `StaticDatum` under a mangled unique name) but stays in the block's
/// identifier scope; its initializer is evaluated once, at compile time.
fn lower_static_local(
    state: &mut LowerState,
    name: &str,
    ty: Type,
    init_decl: &InitDeclarator,
    span: &crate::diag::Span,
) {
    let link_name = state.symtab.fresh_static_local_name(name);
    state.symtab.declare(
        name.to_string(),
        Rc::new(ty.clone()),
        Linkage::None,
        StorageDuration::Static,
        false,
        true,
        link_name.clone(),
        state.diags,
        span.clone(),
    );
    let const_init = match &init_decl.init {
        Some(Initializer::Scalar(e)) => const_eval_usize(state, e).map(|v| v as i64).or(Some(0)),
        None => Some(0),
    };
    state.program.statics.push(crate::il::StaticDatum {
        name: link_name,
        ty: Rc::new(ty),
        init: const_init,
        is_external_linkage: false,
    });
}

fn lower_stmt(state: &mut LowerState, func: &mut ILFunction, ctx: &mut FnContext, stmt: &Stmt) {
    match stmt {
        Stmt::Expr(Some(e), _) => {
            lower_rvalue(state, func, e);
        }
        Stmt::Expr(None, _) => {}
        Stmt::Compound(items, _) => lower_block_items(state, func, ctx, items),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => lower_if(state, func, ctx, cond, then_branch, else_branch.as_deref()),
        Stmt::While { cond, body, .. } => lower_while(state, func, ctx, cond, body),
        Stmt::DoWhile { body, cond, .. } => lower_do_while(state, func, ctx, body, cond),
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => lower_for(state, func, ctx, init.as_deref(), cond.as_ref(), step.as_ref(), body),
        Stmt::Break(span) => match ctx.break_targets.last().cloned() {
            Some(target) => func.push(Command::Jump(target)),
            None => state.diags.error(span.clone(), "'break' outside of a loop or switch".to_string()),
        },
        Stmt::Continue(span) => match ctx.continue_targets.last().cloned() {
            Some(target) => func.push(Command::Jump(target)),
            None => state.diags.error(span.clone(), "'continue' outside of a loop".to_string()),
        },
        Stmt::Return(value, _) => {
            let v = value.as_ref().map(|e| lower_rvalue(state, func, e));
            func.push(Command::Return(v));
        }
        Stmt::Goto(label, _) => {
            let mangled = mangled_label(state, ctx, label);
            func.push(Command::Jump(mangled));
        }
        Stmt::Label(label, inner, _) => {
            let mangled = mangled_label(state, ctx, label);
            func.push(Command::Label(mangled));
            lower_stmt(state, func, ctx, inner);
        }
    }
}

/// `goto`/label targets are resolved once per function: the first
/// reference (whichever comes first, the `goto` or the label) mints the
/// mangled name, and every later reference reuses it.
fn mangled_label(state: &mut LowerState, ctx: &mut FnContext, source_name: &str) -> String {
    if let Some(existing) = ctx.labels.get(source_name) {
        return existing.clone();
    }
    let mangled = state.fresh_label(&format!("user_{}", source_name));
    ctx.labels.insert(source_name.to_string(), mangled.clone());
    mangled
}

fn lower_if(
    state: &mut LowerState,
    func: &mut ILFunction,
    ctx: &mut FnContext,
    cond: &Expr,
    then_branch: &Stmt,
    else_branch: Option<&Stmt>,
) {
    let c = lower_rvalue(state, func, cond);
    match else_branch {
        None => {
            let end_label = state.fresh_label("if_end");
            func.push(Command::JumpZero {
                cond: c,
                target: end_label.clone(),
            });
            lower_stmt(state, func, ctx, then_branch);
            func.push(Command::Label(end_label));
        }
        Some(else_stmt) => {
            let else_label = state.fresh_label("if_else");
            let end_label = state.fresh_label("if_end");
            func.push(Command::JumpZero {
                cond: c,
                target: else_label.clone(),
            });
            lower_stmt(state, func, ctx, then_branch);
            func.push(Command::Jump(end_label.clone()));
            func.push(Command::Label(else_label));
            lower_stmt(state, func, ctx, else_stmt);
            func.push(Command::Label(end_label));
        }
    }
}

fn lower_while(state: &mut LowerState, func: &mut ILFunction, ctx: &mut FnContext, cond: &Expr, body: &Stmt) {
    let start_label = state.fresh_label("while_start");
    let end_label = state.fresh_label("while_end");

    func.push(Command::Label(start_label.clone()));
    let c = lower_rvalue(state, func, cond);
    func.push(Command::JumpZero {
        cond: c,
        target: end_label.clone(),
    });

    ctx.break_targets.push(end_label.clone());
    ctx.continue_targets.push(start_label.clone());
    lower_stmt(state, func, ctx, body);
    ctx.continue_targets.pop();
    ctx.break_targets.pop();

    func.push(Command::Jump(start_label));
    func.push(Command::Label(end_label));
}

fn lower_do_while(state: &mut LowerState, func: &mut ILFunction, ctx: &mut FnContext, body: &Stmt, cond: &Expr) {
    let start_label = state.fresh_label("do_start");
    let continue_label = state.fresh_label("do_continue");
    let end_label = state.fresh_label("do_end");

    func.push(Command::Label(start_label.clone()));

    ctx.break_targets.push(end_label.clone());
    ctx.continue_targets.push(continue_label.clone());
    lower_stmt(state, func, ctx, body);
    ctx.continue_targets.pop();
    ctx.break_targets.pop();

    func.push(Command::Label(continue_label));
    let c = lower_rvalue(state, func, cond);
    func.push(Command::JumpNotZero {
        cond: c,
        target: start_label,
    });
    func.push(Command::Label(end_label));
}

fn lower_for(
    state: &mut LowerState,
    func: &mut ILFunction,
    ctx: &mut FnContext,
    init: Option<&BlockItem>,
    cond: Option<&Expr>,
    step: Option<&Expr>,
    body: &Stmt,
) {
    // A `for` loop's own scope covers its init-declaration, condition,
    // step, and body, per C's block-scoping rules for the for-statement.
    state.push_scope();

    if let Some(init_item) = init {
        lower_block_item(state, func, ctx, init_item);
    }

    let start_label = state.fresh_label("for_start");
    let continue_label = state.fresh_label("for_continue");
    let end_label = state.fresh_label("for_end");

    func.push(Command::Label(start_label.clone()));
    if let Some(cond) = cond {
        let c = lower_rvalue(state, func, cond);
        func.push(Command::JumpZero {
            cond: c,
            target: end_label.clone(),
        });
    }

    ctx.break_targets.push(end_label.clone());
    ctx.continue_targets.push(continue_label.clone());
    lower_stmt(state, func, ctx, body);
    ctx.continue_targets.pop();
    ctx.break_targets.pop();

    func.push(Command::Label(continue_label));
    if let Some(step) = step {
        lower_rvalue(state, func, step);
    }
    func.push(Command::Jump(start_label));
    func.push(Command::Label(end_label));

    state.pop_scope();
}
