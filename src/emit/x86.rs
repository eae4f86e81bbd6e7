//! Per-function x86-64 instruction selection, AT&T syntax, targeting the
//! System V calling convention so the assembled `.o` links against a
//! libc-provided `_start`/CRT via the system `cc`.
//!
//! Instruction selection always funnels one operand through a scratch
//! register (`%r10`/`%r11`, withheld from the allocator in
//! `regalloc::ALLOCATABLE`) rather than trying to fuse a register
//! allocation decision with addressing-mode selection — x86 allows at
//! most one memory operand per instruction, and this keeps that
//! invariant trivially true everywhere.

use crate::il::{ArithOp, Command, CompareOp, ILFunction, Storage, ValueId};
use crate::regalloc::{self, AllocationResult, Reg, Spot};
use crate::types::Type;
use std::collections::HashSet;

const ARG_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

fn ty_width(ty: &Type) -> u8 {
    match ty {
        Type::Pointer(_) => 8,
        Type::Arithmetic { width, .. } => *width,
        Type::Poison => 4,
        _ => 8,
    }
}

fn suffix(width: u8) -> &'static str {
    match width {
        1 => "b",
        2 => "w",
        4 => "l",
        _ => "q",
    }
}

struct Ctx<'a> {
    asn: &'a AllocationResult,
    defined: HashSet<ValueId>,
}

impl Ctx<'_> {
    fn spot(&self, id: ValueId) -> Spot {
        self.asn.assignment.get(&id).copied().unwrap_or(Spot::Register(Reg::Rax))
    }

    /// Operand text for using `v`'s own value (as a source or a plain
    /// scalar destination) — never an addressing computation.
    fn operand(&self, v: &crate::il::ILValue, width: u8) -> String {
        match &v.storage {
            Storage::Literal(n) => format!("${}", n),
            Storage::Named(name) => format!("{}(%rip)", name),
            Storage::StringLiteral(id) => format!(".Lstr{}(%rip)", id),
            Storage::Local(id) => match self.spot(*id) {
                Spot::Register(r) => format!("%{}", r.name(width)),
                Spot::Stack(off) => format!("{}(%rbp)", off),
            },
        }
    }

    /// Resolve an `addr`-position value per `Command::ReadAt`/`SetAt`'s
    /// convention: `Named`/`StringLiteral`/a pinned `Local` name the
    /// object directly (a memory operand); a defined `Local` holds a
    /// genuine pointer value that must be loaded before dereferencing.
    fn resolve_addr(&self, v: &crate::il::ILValue) -> Addr {
        match &v.storage {
            Storage::Named(name) => Addr::Direct(format!("{}(%rip)", name)),
            Storage::StringLiteral(id) => Addr::Direct(format!(".Lstr{}(%rip)", id)),
            Storage::Local(id) if !self.defined.contains(id) => match self.spot(*id) {
                Spot::Stack(off) => Addr::Direct(format!("{}(%rbp)", off)),
                Spot::Register(_) => unreachable!("address-taken locals are always stack-resident"),
            },
            Storage::Local(_) => Addr::Indirect(self.operand(v, 8)),
            Storage::Literal(_) => unreachable!("a literal cannot be used as an address"),
        }
    }
}

enum Addr {
    Direct(String),
    Indirect(String),
}

/// Emit a function's stack frame, ABI prelude, and instruction stream.
/// Functions declared but not defined (external prototypes) produce no
/// text at all — the linker resolves them against the C library.
pub fn emit_function(func: &ILFunction, out: &mut String) {
    let allocation = regalloc::allocate(func);
    let defined = regalloc::defined_ids(func);
    let ctx = Ctx {
        asn: &allocation,
        defined,
    };

    out.push_str(&format!("    .globl {}\n", func.name));
    out.push_str(&format!("    .type {}, @function\n", func.name));
    out.push_str(&format!("{}:\n", func.name));
    out.push_str("    push %rbp\n");
    out.push_str("    movq %rsp, %rbp\n");
    if allocation.frame_size > 0 {
        out.push_str(&format!("    subq ${}, %rsp\n", allocation.frame_size));
    }
    for r in &allocation.used_callee_saved {
        out.push_str(&format!("    push %{}\n", r.name(8)));
    }

    emit_param_prelude(func, &ctx, out);

    for cmd in &func.commands {
        emit_command(cmd, &ctx, &allocation, out);
    }

    // Fallthrough safety net: a function whose last statement isn't a
    // `return` (void functions, or UB in non-void ones) still needs a
    // valid epilogue rather than running into whatever follows in .text.
    emit_epilogue(&allocation, out);
    out.push_str(&format!("    .size {}, . - {}\n", func.name, func.name));
}

fn emit_epilogue(allocation: &AllocationResult, out: &mut String) {
    for r in allocation.used_callee_saved.iter().rev() {
        out.push_str(&format!("    pop %{}\n", r.name(8)));
    }
    out.push_str("    leave\n");
    out.push_str("    ret\n");
}

fn emit_param_prelude(func: &ILFunction, ctx: &Ctx, out: &mut String) {
    for (i, p) in func.params.iter().enumerate() {
        let w = ty_width(&p.ty);
        let dest = ctx.operand(p, w);
        if i < ARG_REGS.len() {
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), ARG_REGS[i].name(w), dest));
        } else {
            let stack_off = 16 + 8 * (i - ARG_REGS.len()) as i32;
            out.push_str(&format!("    mov{} {}(%rbp), %r10\n", suffix(w), stack_off));
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R10.name(w), dest));
        }
    }
}

fn emit_command(cmd: &Command, ctx: &Ctx, allocation: &AllocationResult, out: &mut String) {
    match cmd {
        Command::Arith { op, dest, lhs, rhs, is_unsigned } => emit_arith(*op, dest, lhs, rhs, *is_unsigned, ctx, out),
        Command::Neg { dest, src } => emit_unary("neg", dest, src, ctx, out),
        Command::BitNot { dest, src } => emit_unary("not", dest, src, ctx, out),
        Command::Compare { op, dest, lhs, rhs, is_unsigned } => emit_compare(*op, dest, lhs, rhs, *is_unsigned, ctx, out),
        Command::AddrOf { dest, src } => emit_addr_of(dest, src, ctx, out),
        Command::ReadAt { dest, addr } => emit_read_at(dest, addr, ctx, out),
        Command::SetAt { addr, value } => emit_set_at(addr, value, ctx, out),
        Command::PointerAdd { dest, base, offset, elem_size } => emit_pointer_add(dest, base, offset, *elem_size, true, ctx, out),
        Command::PointerSub { dest, base, offset, elem_size } => emit_pointer_add(dest, base, offset, *elem_size, false, ctx, out),
        Command::PointerDiff { dest, lhs, rhs, elem_size } => emit_pointer_diff(dest, lhs, rhs, *elem_size, ctx, out),
        Command::Label(name) => out.push_str(&format!(".L{}:\n", name)),
        Command::Jump(target) => out.push_str(&format!("    jmp .L{}\n", target)),
        Command::JumpZero { cond, target } => emit_cond_jump(cond, target, "je", ctx, out),
        Command::JumpNotZero { cond, target } => emit_cond_jump(cond, target, "jne", ctx, out),
        Command::Return(value) => emit_return(value.as_ref(), ctx, allocation, out),
        Command::Call { dest, callee, args } => emit_call(dest, callee, args, ctx, out),
        Command::Set { dest, src } => {
            let w = ty_width(&dest.ty);
            out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(src, w), Reg::R10.name(w)));
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R10.name(w), ctx.operand(dest, w)));
        }
        Command::StructMemberCopy { dest_addr, src_addr, size } => emit_struct_copy(dest_addr, src_addr, *size, ctx, out),
        Command::Zero { addr, size } => emit_zero(addr, *size, ctx, out),
        Command::StringLiteralDecl { .. } => {}
    }
}

fn load_effective_address(v: &crate::il::ILValue, ctx: &Ctx, scratch: Reg, out: &mut String) {
    match ctx.resolve_addr(v) {
        Addr::Direct(mem) => out.push_str(&format!("    leaq {}, %{}\n", mem, scratch.name(8))),
        Addr::Indirect(ptr) => out.push_str(&format!("    movq {}, %{}\n", ptr, scratch.name(8))),
    }
}

fn emit_arith(op: ArithOp, dest: &crate::il::ILValue, lhs: &crate::il::ILValue, rhs: &crate::il::ILValue, is_unsigned: bool, ctx: &Ctx, out: &mut String) {
    let w = ty_width(&dest.ty);
    match op {
        ArithOp::Div | ArithOp::Mod => {
            out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(lhs, w), Reg::Rax.name(w)));
            if is_unsigned {
                out.push_str(&format!("    xor{} %{}, %{}\n", suffix(w), Reg::Rdx.name(w), Reg::Rdx.name(w)));
            } else {
                out.push_str(match w {
                    8 => "    cqto\n",
                    2 => "    cwtd\n",
                    _ => "    cltd\n",
                });
            }
            let divisor = match &rhs.storage {
                Storage::Literal(_) => {
                    out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(rhs, w), Reg::R11.name(w)));
                    format!("%{}", Reg::R11.name(w))
                }
                _ => ctx.operand(rhs, w),
            };
            let mnemonic = if is_unsigned { "div" } else { "idiv" };
            out.push_str(&format!("    {}{} {}\n", mnemonic, suffix(w), divisor));
            let result_reg = if matches!(op, ArithOp::Div) { Reg::Rax } else { Reg::Rdx };
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), result_reg.name(w), ctx.operand(dest, w)));
        }
        ArithOp::LShift | ArithOp::RShift => {
            out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(lhs, w), Reg::R10.name(w)));
            let mnemonic = match op {
                ArithOp::LShift => "shl",
                ArithOp::RShift if is_unsigned => "shr",
                _ => "sar",
            };
            match &rhs.storage {
                Storage::Literal(n) => out.push_str(&format!("    {}{} ${}, %{}\n", mnemonic, suffix(w), n, Reg::R10.name(w))),
                _ => {
                    out.push_str(&format!("    movl {}, %ecx\n", ctx.operand(rhs, 4)));
                    out.push_str(&format!("    {}{} %cl, %{}\n", mnemonic, suffix(w), Reg::R10.name(w)));
                }
            }
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R10.name(w), ctx.operand(dest, w)));
        }
        _ => {
            let mnemonic = match op {
                ArithOp::Add => "add",
                ArithOp::Sub => "sub",
                ArithOp::Mult => "imul",
                ArithOp::And => "and",
                ArithOp::Or => "or",
                ArithOp::Xor => "xor",
                _ => unreachable!(),
            };
            out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(lhs, w), Reg::R10.name(w)));
            out.push_str(&format!("    {}{} {}, %{}\n", mnemonic, suffix(w), ctx.operand(rhs, w), Reg::R10.name(w)));
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R10.name(w), ctx.operand(dest, w)));
        }
    }
}

fn emit_unary(mnemonic: &str, dest: &crate::il::ILValue, src: &crate::il::ILValue, ctx: &Ctx, out: &mut String) {
    let w = ty_width(&dest.ty);
    out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(src, w), Reg::R10.name(w)));
    out.push_str(&format!("    {}{} %{}\n", mnemonic, suffix(w), Reg::R10.name(w)));
    out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R10.name(w), ctx.operand(dest, w)));
}

fn emit_compare(op: CompareOp, dest: &crate::il::ILValue, lhs: &crate::il::ILValue, rhs: &crate::il::ILValue, is_unsigned: bool, ctx: &Ctx, out: &mut String) {
    let w = ty_width(&lhs.ty);
    out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(lhs, w), Reg::R10.name(w)));
    out.push_str(&format!("    cmp{} {}, %{}\n", suffix(w), ctx.operand(rhs, w), Reg::R10.name(w)));
    let setcc = match (op, is_unsigned) {
        (CompareOp::Eq, _) => "sete",
        (CompareOp::Neq, _) => "setne",
        (CompareOp::Lt, false) => "setl",
        (CompareOp::Lt, true) => "setb",
        (CompareOp::Le, false) => "setle",
        (CompareOp::Le, true) => "setbe",
        (CompareOp::Gt, false) => "setg",
        (CompareOp::Gt, true) => "seta",
        (CompareOp::Ge, false) => "setge",
        (CompareOp::Ge, true) => "setae",
    };
    out.push_str(&format!("    {} %al\n", setcc));
    let dw = ty_width(&dest.ty);
    out.push_str(&format!("    movzbl %al, %{}\n", Reg::R10.name(4)));
    out.push_str(&format!("    mov{} %{}, {}\n", suffix(dw), Reg::R10.name(dw), ctx.operand(dest, dw)));
}

fn emit_addr_of(dest: &crate::il::ILValue, src: &crate::il::ILValue, ctx: &Ctx, out: &mut String) {
    load_effective_address(src, ctx, Reg::R10, out);
    out.push_str(&format!("    movq %r10, {}\n", ctx.operand(dest, 8)));
}

fn emit_read_at(dest: &crate::il::ILValue, addr: &crate::il::ILValue, ctx: &Ctx, out: &mut String) {
    let w = ty_width(&dest.ty);
    match ctx.resolve_addr(addr) {
        Addr::Direct(mem) => {
            out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), mem, Reg::R10.name(w)));
        }
        Addr::Indirect(ptr) => {
            out.push_str(&format!("    movq {}, %r10\n", ptr));
            out.push_str(&format!("    mov{} (%r10), %{}\n", suffix(w), Reg::R11.name(w)));
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R11.name(w), ctx.operand(dest, w)));
            return;
        }
    }
    out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R10.name(w), ctx.operand(dest, w)));
}

fn emit_set_at(addr: &crate::il::ILValue, value: &crate::il::ILValue, ctx: &Ctx, out: &mut String) {
    let w = ty_width(&value.ty);
    out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(value, w), Reg::R11.name(w)));
    match ctx.resolve_addr(addr) {
        Addr::Direct(mem) => {
            out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::R11.name(w), mem));
        }
        Addr::Indirect(ptr) => {
            out.push_str(&format!("    movq {}, %r10\n", ptr));
            out.push_str(&format!("    mov{} %{}, (%r10)\n", suffix(w), Reg::R11.name(w)));
        }
    }
}

fn extend_to_qword(v: &crate::il::ILValue, ctx: &Ctx, dest_reg: Reg, out: &mut String) {
    let w = ty_width(&v.ty);
    if w == 8 {
        out.push_str(&format!("    movq {}, %{}\n", ctx.operand(v, 8), dest_reg.name(8)));
    } else if v.ty.is_unsigned() {
        out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(v, w), dest_reg.name(4)));
    } else {
        let src = ctx.operand(v, w);
        let insn = match w {
            4 => "movslq",
            2 => "movswq",
            _ => "movsbq",
        };
        out.push_str(&format!("    {} {}, %{}\n", insn, src, dest_reg.name(8)));
    }
}

fn emit_pointer_add(
    dest: &crate::il::ILValue,
    base: &crate::il::ILValue,
    offset: &crate::il::ILValue,
    elem_size: u32,
    is_add: bool,
    ctx: &Ctx,
    out: &mut String,
) {
    out.push_str(&format!("    movq {}, %r10\n", ctx.operand(base, 8)));
    extend_to_qword(offset, ctx, Reg::R11, out);
    if elem_size != 1 {
        out.push_str(&format!("    imulq ${}, %r11, %r11\n", elem_size));
    }
    let mnemonic = if is_add { "addq" } else { "subq" };
    out.push_str(&format!("    {} %r11, %r10\n", mnemonic));
    out.push_str(&format!("    movq %r10, {}\n", ctx.operand(dest, 8)));
}

fn emit_pointer_diff(dest: &crate::il::ILValue, lhs: &crate::il::ILValue, rhs: &crate::il::ILValue, elem_size: u32, ctx: &Ctx, out: &mut String) {
    out.push_str(&format!("    movq {}, %r10\n", ctx.operand(lhs, 8)));
    out.push_str(&format!("    subq {}, %r10\n", ctx.operand(rhs, 8)));
    if elem_size > 1 {
        out.push_str("    movq %r10, %rax\n");
        out.push_str("    cqto\n");
        out.push_str(&format!("    movq ${}, %r11\n", elem_size));
        out.push_str("    idivq %r11\n");
        out.push_str("    movq %rax, %r10\n");
    }
    out.push_str(&format!("    movq %r10, {}\n", ctx.operand(dest, 8)));
}

fn emit_cond_jump(cond: &crate::il::ILValue, target: &str, mnemonic: &str, ctx: &Ctx, out: &mut String) {
    let w = ty_width(&cond.ty);
    out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(cond, w), Reg::R10.name(w)));
    out.push_str(&format!("    test{} %{}, %{}\n", suffix(w), Reg::R10.name(w), Reg::R10.name(w)));
    out.push_str(&format!("    {} .L{}\n", mnemonic, target));
}

fn emit_return(value: Option<&crate::il::ILValue>, ctx: &Ctx, allocation: &AllocationResult, out: &mut String) {
    if let Some(v) = value {
        let w = ty_width(&v.ty);
        out.push_str(&format!("    mov{} {}, %{}\n", suffix(w), ctx.operand(v, w), Reg::Rax.name(w)));
    }
    emit_epilogue(allocation, out);
}

fn emit_call(dest: &Option<crate::il::ILValue>, callee: &crate::il::ILValue, args: &[crate::il::ILValue], ctx: &Ctx, out: &mut String) {
    let reg_args = &args[..args.len().min(ARG_REGS.len())];
    let stack_args = if args.len() > ARG_REGS.len() { &args[ARG_REGS.len()..] } else { &[] };

    for a in stack_args.iter().rev() {
        extend_to_qword(a, ctx, Reg::R10, out);
        out.push_str("    push %r10\n");
    }

    // Stage every register argument through the real machine stack
    // before popping them into place — a push/pop pair is immune to any
    // clobber hazard a direct register-to-register shuffle could hit.
    for a in reg_args {
        extend_to_qword(a, ctx, Reg::R10, out);
        out.push_str("    push %r10\n");
    }
    for r in reg_args.iter().enumerate().rev().map(|(i, _)| ARG_REGS[i]) {
        out.push_str(&format!("    pop %{}\n", r.name(8)));
    }

    match &callee.storage {
        Storage::Named(name) => out.push_str(&format!("    call {}\n", name)),
        _ => {
            out.push_str(&format!("    movq {}, %r10\n", ctx.operand(callee, 8)));
            out.push_str("    call *%r10\n");
        }
    }

    if !stack_args.is_empty() {
        out.push_str(&format!("    addq ${}, %rsp\n", 8 * stack_args.len()));
    }

    if let Some(d) = dest {
        let w = ty_width(&d.ty);
        out.push_str(&format!("    mov{} %{}, {}\n", suffix(w), Reg::Rax.name(w), ctx.operand(d, w)));
    }
}

fn emit_struct_copy(dest_addr: &crate::il::ILValue, src_addr: &crate::il::ILValue, size: u32, ctx: &Ctx, out: &mut String) {
    load_effective_address(dest_addr, ctx, Reg::R10, out);
    load_effective_address(src_addr, ctx, Reg::R11, out);
    out.push_str("    movq %r10, %rdi\n");
    out.push_str("    movq %r11, %rsi\n");
    out.push_str(&format!("    movq ${}, %rcx\n", size));
    out.push_str("    rep movsb\n");
}

fn emit_zero(addr: &crate::il::ILValue, size: u32, ctx: &Ctx, out: &mut String) {
    load_effective_address(addr, ctx, Reg::R10, out);
    out.push_str("    movq %r10, %rdi\n");
    out.push_str(&format!("    movq ${}, %rcx\n", size));
    out.push_str("    xor %al, %al\n");
    out.push_str("    rep stosb\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{Command, ILFunction, ILValue};
    use std::rc::Rc;

    #[test]
    fn trivial_function_has_a_matched_prologue_and_epilogue() {
        let mut f = ILFunction::new("main");
        f.push(Command::Return(Some(ILValue::literal(0, Rc::new(Type::int())))));
        let mut out = String::new();
        emit_function(&f, &mut out);
        assert!(out.contains("push %rbp"));
        assert!(out.contains("movq %rsp, %rbp"));
        assert!(out.contains("leave"));
        assert!(out.contains("ret"));
    }

    #[test]
    fn division_moves_dividend_through_rax_and_sign_extends() {
        let mut f = ILFunction::new("f");
        let a = f.fresh_local(Rc::new(Type::int()));
        let b = f.fresh_local(Rc::new(Type::int()));
        let q = f.fresh_local(Rc::new(Type::int()));
        f.push(Command::Set { dest: a.clone(), src: ILValue::literal(10, Rc::new(Type::int())) });
        f.push(Command::Set { dest: b.clone(), src: ILValue::literal(3, Rc::new(Type::int())) });
        f.push(Command::Arith {
            op: ArithOp::Div,
            dest: q.clone(),
            lhs: a,
            rhs: b,
            is_unsigned: false,
        });
        f.push(Command::Return(Some(q)));
        let mut out = String::new();
        emit_function(&f, &mut out);
        assert!(out.contains("cltd") || out.contains("cqto"));
        assert!(out.contains("idivl") || out.contains("idivq"));
    }

    #[test]
    fn a_local_whose_address_is_taken_never_gets_a_register_operand() {
        let mut f = ILFunction::new("f");
        let ty = Rc::new(Type::int());
        let slot = f.fresh_local(ty.clone()).as_address();
        f.push(Command::Zero { addr: ILValue { is_lvalue_location: false, ..slot.clone() }, size: 4 });
        let ptr = f.fresh_local(Rc::new(Type::pointer_to((*ty).clone())));
        f.push(Command::AddrOf { dest: ptr.clone(), src: slot });
        f.push(Command::Return(None));
        let mut out = String::new();
        emit_function(&f, &mut out);
        assert!(out.contains("leaq"));
    }
}
