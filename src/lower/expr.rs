//! Expression lowering: AST `Expr` -> IL commands plus a resulting
//! `ILValue`, following the lvalue/address conventions described for
//! §4.4 — an lvalue expression lowers to a pointer-valued `ILValue`
//! with `is_lvalue_location` set, and the caller inserts a `ReadAt`
//! only where the rvalue is actually needed.

use crate::ast::*;
use crate::diag::Span;
use crate::il::{ArithOp, Command, CompareOp, ILFunction, ILValue, Storage};
use crate::lower::decl::resolve_type_spec_declarator;
use crate::lower::state::LowerState;
use crate::types::{self, Type};
use std::rc::Rc;

/// Fold a restricted constant-expression grammar (literals, sizeof,
/// unary +/-, and +-*/ on such subexpressions) to a `usize`, for array
/// bounds and enum-constant initializers. Returns `None` (and lets the
/// caller raise its own diagnostic) for anything more dynamic than that.
pub fn const_eval_usize(state: &mut LowerState, expr: &Expr) -> Option<usize> {
    const_eval_i64(state, expr).map(|v| v as usize)
}

fn const_eval_i64(state: &mut LowerState, expr: &Expr) -> Option<i64> {
    match expr {
        Expr::IntLiteral { value, .. } => Some(*value as i64),
        Expr::CharLiteral(c, _) => Some(*c as i64),
        Expr::Unary { op, operand, .. } => {
            let v = const_eval_i64(state, operand)?;
            Some(match op {
                UnOp::Neg => -v,
                UnOp::Plus => v,
                UnOp::Not => !v,
                UnOp::LogNot => (v == 0) as i64,
            })
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let a = const_eval_i64(state, lhs)?;
            let b = const_eval_i64(state, rhs)?;
            Some(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div if b != 0 => a / b,
                BinOp::Mod if b != 0 => a % b,
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                BinOp::BitXor => a ^ b,
                BinOp::Shl => a << b,
                BinOp::Shr => a >> b,
                _ => return None,
            })
        }
        Expr::SizeofType { spec, declarator, span } => {
            let ty = resolve_type_spec_declarator(state, spec, declarator, span);
            if ty.is_complete() {
                Some(ty.size() as i64)
            } else {
                None
            }
        }
        Expr::SizeofExpr { operand, span } => {
            let ty = type_of_expr_for_sizeof(state, operand, span);
            if ty.is_complete() {
                Some(ty.size() as i64)
            } else {
                None
            }
        }
        Expr::Ident(name, _) => state.enum_constants.get(name).copied(),
        _ => None,
    }
}

/// Compute the static type of an expression for `sizeof` purposes
/// without lowering it into IL (sizeof's operand is never evaluated).
fn type_of_expr_for_sizeof(state: &mut LowerState, expr: &Expr, span: &Span) -> Type {
    match expr {
        Expr::Ident(name, _) => state
            .symtab
            .lookup(name)
            .map(|s| (*s.ty).clone())
            .unwrap_or(Type::poison()),
        Expr::Deref { operand, .. } => {
            let t = type_of_expr_for_sizeof(state, operand, span);
            t.pointee().cloned().unwrap_or(Type::poison())
        }
        Expr::Index { base, .. } => {
            let t = type_of_expr_for_sizeof(state, base, span).decay();
            t.pointee().cloned().unwrap_or(Type::poison())
        }
        Expr::IntLiteral { .. } => Type::int(),
        Expr::CharLiteral(..) => Type::char_ty(),
        Expr::Cast { spec, declarator, .. } => {
            resolve_type_spec_declarator(state, spec, declarator, span)
        }
        _ => Type::int(),
    }
}

/// The outcome of lowering any expression: the commands needed to
/// produce `value` have already been pushed onto the current function.
pub struct Lowered {
    pub value: ILValue,
}

/// Lower `expr` to its rvalue: array/function decay applied, and any
/// lvalue-location result loaded through a `ReadAt`.
pub fn lower_rvalue(state: &mut LowerState, func: &mut ILFunction, expr: &Expr) -> ILValue {
    let v = lower_expr(state, func, expr);
    load_if_location(func, v)
}

fn load_if_location(func: &mut ILFunction, v: ILValue) -> ILValue {
    if !v.is_lvalue_location {
        return v;
    }
    // By convention an `is_lvalue_location` value's `ty` is the type of
    // the object at that location, not a pointer to it.
    let object_ty = (*v.ty).clone();
    if object_ty.is_array() || object_ty.is_function() {
        // Decays to the address itself; no load performed.
        let mut decayed = v;
        decayed.ty = Rc::new(object_ty.decay());
        decayed.is_lvalue_location = false;
        return decayed;
    }
    let dest = func.fresh_local(Rc::new(object_ty));
    func.push(Command::ReadAt {
        dest: dest.clone(),
        addr: ILValue { is_lvalue_location: false, ..v },
    });
    dest
}

/// Lower an expression that must denote an lvalue (appears on the left
/// of `=`, or as the operand of `&`/`++`/`--`), returning its address as
/// an ordinary (non-location) pointer-typed `ILValue`.
fn lower_lvalue_addr(state: &mut LowerState, func: &mut ILFunction, expr: &Expr) -> ILValue {
    let v = lower_expr(state, func, expr);
    if v.is_lvalue_location {
        ILValue {
            is_lvalue_location: false,
            ..v
        }
    } else {
        state
            .diags
            .error(expr.span(), "expression is not assignable".to_string());
        v
    }
}

/// Core dispatch: produces either an ordinary value or, for lvalue
/// expressions, a pointer value flagged `is_lvalue_location`.
fn lower_expr(state: &mut LowerState, func: &mut ILFunction, expr: &Expr) -> ILValue {
    match expr {
        Expr::IntLiteral { value, .. } => ILValue::literal(*value as i64, Rc::new(Type::int())),
        Expr::CharLiteral(c, _) => ILValue::literal(*c as i64, Rc::new(Type::char_ty())),
        Expr::StringLiteral(bytes, _) => {
            let id = state.program.intern_string(bytes.clone());
            let ty = Rc::new(Type::Array {
                element: Rc::new(Type::char_ty()),
                length: Some(bytes.len()),
            });
            ILValue {
                ty,
                storage: Storage::StringLiteral(id),
                is_lvalue_location: true,
            }
        }
        Expr::Ident(name, span) => lower_ident(state, name, span),
        Expr::Unary { op, operand, span } => lower_unary(state, func, *op, operand, span),
        Expr::IncDec {
            op,
            is_prefix,
            operand,
            span,
        } => lower_incdec(state, func, *op, *is_prefix, operand, span),
        Expr::AddrOf { operand, .. } => {
            let addr = lower_lvalue_addr(state, func, operand);
            let dest = func.fresh_local(Rc::new(Type::Pointer(Rc::new((*addr.ty).clone()))));
            func.push(Command::AddrOf {
                dest: dest.clone(),
                src: addr,
            });
            dest
        }
        Expr::Deref { operand, span } => {
            let p = lower_rvalue(state, func, operand);
            let pointee = p.ty.pointee().cloned().unwrap_or_else(|| {
                state
                    .diags
                    .error(span.clone(), "indirection requires a pointer operand".to_string());
                Type::poison()
            });
            ILValue {
                ty: Rc::new(pointee),
                storage: p.storage,
                is_lvalue_location: true,
            }
        }
        Expr::Binary { op, lhs, rhs, span } => lower_binary(state, func, *op, lhs, rhs, span),
        Expr::Assign { op, lhs, rhs, span } => lower_assign(state, func, *op, lhs, rhs, span),
        Expr::Conditional {
            cond,
            then_expr,
            else_expr,
            span,
        } => lower_conditional(state, func, cond, then_expr, else_expr, span),
        Expr::Comma { lhs, rhs, .. } => {
            lower_rvalue(state, func, lhs);
            lower_expr(state, func, rhs)
        }
        Expr::Call { callee, args, span } => lower_call(state, func, callee, args, span),
        Expr::Index { base, index, span } => lower_index(state, func, base, index, span),
        Expr::Member {
            base,
            field,
            arrow,
            span,
        } => lower_member(state, func, base, field, *arrow, span),
        Expr::Cast {
            spec,
            declarator,
            operand,
            span,
        } => lower_cast(state, func, spec, declarator, operand, span),
        Expr::SizeofExpr { span, .. } | Expr::SizeofType { span, .. } => {
            let value = const_eval_usize(state, expr).unwrap_or(0);
            let _ = span;
            ILValue::literal(value as i64, Rc::new(Type::ulong()))
        }
    }
}

fn lower_ident(state: &mut LowerState, name: &str, span: &Span) -> ILValue {
    if let Some(v) = state.lookup_local(name) {
        return v;
    }
    if let Some(&value) = state.enum_constants.get(name) {
        return ILValue::literal(value, Rc::new(Type::int()));
    }
    let Some(sym) = state.symtab.lookup(name) else {
        state.diags.error(span.clone(), format!("use of undeclared identifier '{}'", name));
        return ILValue::literal(0, Rc::new(Type::poison()));
    };
    let ty = (*sym.ty).clone();
    if ty.is_function() {
        return ILValue::named(sym.link_name.clone(), Rc::new(ty));
    }
    ILValue {
        ty: Rc::new(ty),
        storage: Storage::Named(sym.link_name.clone()),
        is_lvalue_location: true,
    }
}

fn lower_unary(
    state: &mut LowerState,
    func: &mut ILFunction,
    op: UnOp,
    operand: &Expr,
    span: &Span,
) -> ILValue {
    let v = lower_rvalue(state, func, operand);
    match op {
        UnOp::Plus => v,
        UnOp::Neg => {
            let promoted = types::promote(&v.ty);
            let src = convert(func, v, Rc::new(promoted.clone()));
            let dest = func.fresh_local(Rc::new(promoted));
            func.push(Command::Neg { dest: dest.clone(), src });
            dest
        }
        UnOp::Not => {
            let promoted = types::promote(&v.ty);
            let src = convert(func, v, Rc::new(promoted.clone()));
            let dest = func.fresh_local(Rc::new(promoted));
            func.push(Command::BitNot { dest: dest.clone(), src });
            dest
        }
        UnOp::LogNot => {
            let zero = ILValue::literal(0, v.ty.clone());
            let dest = func.fresh_local(Rc::new(Type::int()));
            func.push(Command::Compare {
                op: CompareOp::Eq,
                dest: dest.clone(),
                lhs: v,
                rhs: zero,
                is_unsigned: false,
            });
            let _ = span;
            dest
        }
    }
}

fn lower_incdec(
    state: &mut LowerState,
    func: &mut ILFunction,
    op: IncDecOp,
    is_prefix: bool,
    operand: &Expr,
    _span: &Span,
) -> ILValue {
    let addr = lower_lvalue_addr(state, func, operand);
    let pointee_ty = (*addr.ty).clone();
    let old = {
        let dest = func.fresh_local(Rc::new(pointee_ty.clone()));
        func.push(Command::ReadAt {
            dest: dest.clone(),
            addr: addr.clone(),
        });
        dest
    };
    let arith_op = match op {
        IncDecOp::Inc => ArithOp::Add,
        IncDecOp::Dec => ArithOp::Sub,
    };
    let new_val = if let Type::Pointer(pointee) = &pointee_ty {
        let dest = func.fresh_local(Rc::new(pointee_ty.clone()));
        let elem_size = if pointee.is_complete() { pointee.size() as u32 } else { 1 };
        let one = ILValue::literal(1, Rc::new(Type::long()));
        func.push(match op {
            IncDecOp::Inc => Command::PointerAdd {
                dest: dest.clone(),
                base: old.clone(),
                offset: one,
                elem_size,
            },
            IncDecOp::Dec => Command::PointerSub {
                dest: dest.clone(),
                base: old.clone(),
                offset: one,
                elem_size,
            },
        });
        dest
    } else {
        let dest = func.fresh_local(Rc::new(pointee_ty.clone()));
        let one = ILValue::literal(1, Rc::new(pointee_ty.clone()));
        func.push(Command::Arith {
            op: arith_op,
            dest: dest.clone(),
            lhs: old.clone(),
            rhs: one,
            is_unsigned: pointee_ty.is_unsigned(),
        });
        dest
    };
    func.push(Command::SetAt {
        addr,
        value: new_val.clone(),
    });
    if is_prefix {
        new_val
    } else {
        old
    }
}

/// Convert `v` to `target`, inserting a `SET` copy only when the types
/// actually differ (SET commands this way stay move-edges in liveness
/// for genuine copies, not no-op self-conversions).
fn convert(func: &mut ILFunction, v: ILValue, target: Rc<Type>) -> ILValue {
    if *v.ty == *target {
        return v;
    }
    let dest = func.fresh_local(target);
    func.push(Command::Set {
        dest: dest.clone(),
        src: v,
    });
    dest
}

/// Like `convert`, but first classifies the conversion and reports an
/// *incompatible-pointer* diagnostic at `span` when the types aren't
/// outright compatible — a warning by default (matching C's lenient
/// treatment of e.g. a function pointer initialized from a function of
/// a different prototype), promoted to an error under `state.strict`.
/// Used at assignment and initializer sites, the places §7's policy
/// calls out by name.
pub(crate) fn convert_checked(
    state: &mut LowerState,
    func: &mut ILFunction,
    v: ILValue,
    target: Rc<Type>,
    span: &Span,
) -> ILValue {
    let const_value = match v.storage {
        Storage::Literal(n) => Some(n),
        _ => None,
    };
    match types::classify_conversion(&v.ty, &target, const_value) {
        types::Conversion::Forbidden => {
            state.diags.error(
                span.clone(),
                format!("incompatible types in assignment: cannot convert '{:?}' to '{:?}'", v.ty, target),
            );
        }
        types::Conversion::IncompatiblePointerWarning => {
            let message = "incompatible pointer types in assignment".to_string();
            if state.strict {
                state.diags.error(span.clone(), message);
            } else {
                state.diags.warning(span.clone(), message);
            }
        }
        _ => {}
    }
    convert(func, v, target)
}

fn lower_binary(
    state: &mut LowerState,
    func: &mut ILFunction,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    span: &Span,
) -> ILValue {
    match op {
        BinOp::LogAnd | BinOp::LogOr => return lower_short_circuit(state, func, op, lhs, rhs),
        _ => {}
    }
    let l = lower_rvalue(state, func, lhs);
    let r = lower_rvalue(state, func, rhs);

    // Pointer arithmetic takes priority over the arithmetic ladder.
    if matches!(op, BinOp::Add | BinOp::Sub) && (l.ty.is_pointer() || r.ty.is_pointer()) {
        return lower_pointer_arith(func, op, l, r, span);
    }

    let result_ty = types::usual_arithmetic_conversions(&l.ty, &r.ty);
    let is_unsigned = result_ty.is_unsigned();
    let l = convert(func, l, Rc::new(result_ty.clone()));
    let r = convert(func, r, Rc::new(result_ty.clone()));

    if let Some(cmp) = compare_op(op) {
        let dest = func.fresh_local(Rc::new(Type::int()));
        func.push(Command::Compare {
            op: cmp,
            dest: dest.clone(),
            lhs: l,
            rhs: r,
            is_unsigned,
        });
        return dest;
    }

    let arith = arith_op(op).expect("non-compare BinOp must map to an ArithOp");
    let dest = func.fresh_local(Rc::new(result_ty));
    func.push(Command::Arith {
        op: arith,
        dest: dest.clone(),
        lhs: l,
        rhs: r,
        is_unsigned,
    });
    dest
}

fn pointee_size(ty: &Type) -> u32 {
    match ty.pointee() {
        Some(p) if p.is_complete() => p.size() as u32,
        _ => 1,
    }
}

fn lower_pointer_arith(func: &mut ILFunction, op: BinOp, l: ILValue, r: ILValue, _span: &Span) -> ILValue {
    if l.ty.is_pointer() && r.ty.is_pointer() {
        let elem_size = pointee_size(&l.ty);
        let dest = func.fresh_local(Rc::new(Type::long()));
        func.push(Command::PointerDiff {
            dest: dest.clone(),
            lhs: l,
            rhs: r,
            elem_size,
        });
        return dest;
    }
    let (base, offset) = if l.ty.is_pointer() { (l, r) } else { (r, l) };
    let elem_size = pointee_size(&base.ty);
    let dest = func.fresh_local(base.ty.clone());
    func.push(match op {
        BinOp::Add => Command::PointerAdd {
            dest: dest.clone(),
            base,
            offset,
            elem_size,
        },
        _ => Command::PointerSub {
            dest: dest.clone(),
            base,
            offset,
            elem_size,
        },
    });
    dest
}

fn compare_op(op: BinOp) -> Option<CompareOp> {
    Some(match op {
        BinOp::Eq => CompareOp::Eq,
        BinOp::Ne => CompareOp::Neq,
        BinOp::Lt => CompareOp::Lt,
        BinOp::Le => CompareOp::Le,
        BinOp::Gt => CompareOp::Gt,
        BinOp::Ge => CompareOp::Ge,
        _ => return None,
    })
}

fn arith_op(op: BinOp) -> Option<ArithOp> {
    Some(match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mult,
        BinOp::Div => ArithOp::Div,
        BinOp::Mod => ArithOp::Mod,
        BinOp::BitAnd => ArithOp::And,
        BinOp::BitOr => ArithOp::Or,
        BinOp::BitXor => ArithOp::Xor,
        BinOp::Shl => ArithOp::LShift,
        BinOp::Shr => ArithOp::RShift,
        _ => return None,
    })
}

/// `&&`/`||` lower to explicit control flow rather than a plain `Arith`
/// command, so the right-hand side is only evaluated when it can affect
/// the result (short-circuit semantics, §4.4).
fn lower_short_circuit(
    state: &mut LowerState,
    func: &mut ILFunction,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
) -> ILValue {
    let result = func.fresh_local(Rc::new(Type::int()));
    let short_circuit_value = if op == BinOp::LogAnd { 0 } else { 1 };
    let end_label = state.fresh_label("sc_end");

    let l = lower_rvalue(state, func, lhs);
    func.push(Command::Set {
        dest: result.clone(),
        src: ILValue::literal(short_circuit_value, Rc::new(Type::int())),
    });
    match op {
        BinOp::LogAnd => func.push(Command::JumpZero {
            cond: l,
            target: end_label.clone(),
        }),
        _ => func.push(Command::JumpNotZero {
            cond: l,
            target: end_label.clone(),
        }),
    }

    let r = lower_rvalue(state, func, rhs);
    let zero = ILValue::literal(0, r.ty.clone());
    let as_bool = func.fresh_local(Rc::new(Type::int()));
    func.push(Command::Compare {
        op: CompareOp::Neq,
        dest: as_bool.clone(),
        lhs: r,
        rhs: zero,
        is_unsigned: false,
    });
    func.push(Command::Set {
        dest: result.clone(),
        src: as_bool,
    });
    func.push(Command::Label(end_label));
    result
}

fn lower_assign(
    state: &mut LowerState,
    func: &mut ILFunction,
    op: AssignOp,
    lhs: &Expr,
    rhs: &Expr,
    span: &Span,
) -> ILValue {
    let addr = lower_lvalue_addr(state, func, lhs);
    let pointee_ty = (*addr.ty).clone();

    let value = if op == AssignOp::Assign {
        let r = lower_rvalue(state, func, rhs);
        convert_checked(state, func, r, Rc::new(pointee_ty.clone()), span)
    } else {
        let current = {
            let dest = func.fresh_local(Rc::new(pointee_ty.clone()));
            func.push(Command::ReadAt {
                dest: dest.clone(),
                addr: addr.clone(),
            });
            dest
        };
        let bin_op = compound_to_binop(op);
        let r = lower_rvalue(state, func, rhs);
        if matches!(bin_op, BinOp::Add | BinOp::Sub) && pointee_ty.is_pointer() {
            lower_pointer_arith(func, bin_op, current, r, span)
        } else {
            let result_ty = types::usual_arithmetic_conversions(&current.ty, &r.ty);
            let is_unsigned = result_ty.is_unsigned();
            let l = convert(func, current, Rc::new(result_ty.clone()));
            let r = convert(func, r, Rc::new(result_ty.clone()));
            let arith = arith_op(bin_op).expect("compound-assign op maps to ArithOp");
            let dest = func.fresh_local(Rc::new(result_ty));
            func.push(Command::Arith {
                op: arith,
                dest: dest.clone(),
                lhs: l,
                rhs: r,
                is_unsigned,
            });
            convert(func, dest, Rc::new(pointee_ty.clone()))
        }
    };
    func.push(Command::SetAt {
        addr,
        value: value.clone(),
    });
    value
}

fn compound_to_binop(op: AssignOp) -> BinOp {
    match op {
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Mod => BinOp::Mod,
        AssignOp::BitAnd => BinOp::BitAnd,
        AssignOp::BitOr => BinOp::BitOr,
        AssignOp::BitXor => BinOp::BitXor,
        AssignOp::Shl => BinOp::Shl,
        AssignOp::Shr => BinOp::Shr,
        AssignOp::Assign => unreachable!("plain assignment has no BinOp"),
    }
}

fn lower_conditional(
    state: &mut LowerState,
    func: &mut ILFunction,
    cond: &Expr,
    then_expr: &Expr,
    else_expr: &Expr,
    _span: &Span,
) -> ILValue {
    let else_label = state.fresh_label("cond_else");
    let end_label = state.fresh_label("cond_end");

    let c = lower_rvalue(state, func, cond);
    func.push(Command::JumpZero {
        cond: c,
        target: else_label.clone(),
    });
    let then_val = lower_rvalue(state, func, then_expr);
    let result = func.fresh_local(then_val.ty.clone());
    func.push(Command::Set {
        dest: result.clone(),
        src: then_val,
    });
    func.push(Command::Jump(end_label.clone()));
    func.push(Command::Label(else_label));
    let else_val = lower_rvalue(state, func, else_expr);
    let else_val = convert(func, else_val, result.ty.clone());
    func.push(Command::Set {
        dest: result.clone(),
        src: else_val,
    });
    func.push(Command::Label(end_label));
    result
}

fn lower_call(
    state: &mut LowerState,
    func: &mut ILFunction,
    callee: &Expr,
    args: &[Expr],
    span: &Span,
) -> ILValue {
    let callee_val = lower_rvalue(state, func, callee);
    let function_ty = match &*callee_val.ty {
        Type::Pointer(p) => match &**p {
            Type::Function { .. } => Some((**p).clone()),
            _ => None,
        },
        Type::Function { .. } => Some((*callee_val.ty).clone()),
        _ => None,
    };
    let (ret_ty, param_tys) = match &function_ty {
        Some(Type::Function { ret, params }) => ((**ret).clone(), params.clone()),
        _ => {
            state.diags.error(span.clone(), "called object is not a function".to_string());
            (Type::poison(), None)
        }
    };
    if let Some(params) = &param_tys {
        if params.len() != args.len() {
            state.diags.error(
                span.clone(),
                format!("wrong number of arguments: expected {}, got {}", params.len(), args.len()),
            );
        }
    }
    // Left-to-right argument evaluation, per §4.4. Arguments are converted
    // to their declared parameter type when a prototype is known; an
    // unprototyped or variadic-shaped mismatch just passes the argument's
    // own promoted type through.
    let lowered_args: Vec<ILValue> = args
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let v = lower_rvalue(state, func, a);
            match &param_tys {
                Some(params) if i < params.len() => {
                    convert_checked(state, func, v, Rc::new(params[i].clone()), span)
                }
                _ => v,
            }
        })
        .collect();
    let dest = if ret_ty.is_void() {
        None
    } else {
        Some(func.fresh_local(Rc::new(ret_ty)))
    };
    func.push(Command::Call {
        dest: dest.clone(),
        callee: callee_val,
        args: lowered_args,
    });
    dest.unwrap_or_else(|| ILValue::literal(0, Rc::new(Type::Void)))
}

fn lower_index(
    state: &mut LowerState,
    func: &mut ILFunction,
    base: &Expr,
    index: &Expr,
    span: &Span,
) -> ILValue {
    let base_val = lower_rvalue(state, func, base);
    let index_val = lower_rvalue(state, func, index);
    let elem_ty = base_val.ty.pointee().cloned().unwrap_or_else(|| {
        state.diags.error(span.clone(), "subscripted value is not an array or pointer".to_string());
        Type::poison()
    });
    let elem_size = if elem_ty.is_complete() { elem_ty.size() as u32 } else { 1 };
    let addr = func.fresh_local(base_val.ty.clone());
    func.push(Command::PointerAdd {
        dest: addr.clone(),
        base: base_val,
        offset: index_val,
        elem_size,
    });
    ILValue {
        ty: Rc::new(elem_ty),
        storage: addr.storage,
        is_lvalue_location: true,
    }
}

fn lower_member(
    state: &mut LowerState,
    func: &mut ILFunction,
    base: &Expr,
    field: &str,
    arrow: bool,
    span: &Span,
) -> ILValue {
    let base_addr = if arrow {
        lower_rvalue(state, func, base)
    } else {
        lower_lvalue_addr(state, func, base)
    };
    let agg_ty = if arrow {
        base_addr.ty.pointee().cloned().unwrap_or(Type::poison())
    } else {
        (*base_addr.ty).clone()
    };
    let Type::Aggregate(def) = &agg_ty else {
        state.diags.error(span.clone(), format!("not a struct or union: no member '{}'", field));
        return ILValue::literal(0, Rc::new(Type::poison()));
    };
    let Some(members) = &def.members else {
        state.diags.error(span.clone(), "member access on incomplete type".to_string());
        return ILValue::literal(0, Rc::new(Type::poison()));
    };
    let Some(member) = members.iter().find(|m| m.name == field) else {
        state.diags.error(span.clone(), format!("no member named '{}'", field));
        return ILValue::literal(0, Rc::new(Type::poison()));
    };
    let member_ty = member.ty.clone();
    let offset = member.offset as i64;
    let dest = func.fresh_local(Rc::new(Type::Pointer(Rc::new(member_ty.clone()))));
    func.push(Command::PointerAdd {
        dest: dest.clone(),
        base: ILValue {
            is_lvalue_location: false,
            ..base_addr
        },
        offset: ILValue::literal(offset, Rc::new(Type::long())),
        elem_size: 1,
    });
    ILValue {
        ty: Rc::new(member_ty),
        storage: dest.storage,
        is_lvalue_location: true,
    }
}

fn lower_cast(
    state: &mut LowerState,
    func: &mut ILFunction,
    spec: &TypeSpec,
    declarator: &Declarator,
    operand: &Expr,
    span: &Span,
) -> ILValue {
    let target = resolve_type_spec_declarator(state, spec, declarator, span);
    let v = lower_rvalue(state, func, operand);
    convert(func, v, Rc::new(target))
}
