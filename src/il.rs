//! The flat three-address intermediate language that sits between AST
//! lowering and register allocation.
//!
//! Every `ILValue` is typed and carries a storage class describing
//! where it lives; `is_lvalue_location` distinguishes a value that
//! denotes an address (needs a `READAT`/`SETAT` to touch the object it
//! points at) from a value that denotes the object itself.

use crate::types::Type;
use std::rc::Rc;

pub type ValueId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// An integer constant baked into the instruction stream.
    Literal(i64),
    /// A stack/register-allocatable local, numbered within its function.
    Local(ValueId),
    /// A named global (function or file-scope object) referenced by its
    /// link-time symbol name.
    Named(String),
    /// A reference to an interned string literal's static storage.
    StringLiteral(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ILValue {
    pub ty: Rc<Type>,
    pub storage: Storage,
    /// `true` when this value is the *address* of an object rather than
    /// the object's value — e.g. the result of lowering an lvalue
    /// expression before a `READAT` loads from it.
    pub is_lvalue_location: bool,
}

impl ILValue {
    pub fn local(id: ValueId, ty: Rc<Type>) -> Self {
        ILValue {
            ty,
            storage: Storage::Local(id),
            is_lvalue_location: false,
        }
    }

    pub fn literal(value: i64, ty: Rc<Type>) -> Self {
        ILValue {
            ty,
            storage: Storage::Literal(value),
            is_lvalue_location: false,
        }
    }

    pub fn named(name: impl Into<String>, ty: Rc<Type>) -> Self {
        ILValue {
            ty,
            storage: Storage::Named(name.into()),
            is_lvalue_location: false,
        }
    }

    pub fn as_address(mut self) -> Self {
        self.is_lvalue_location = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    And,
    Or,
    Xor,
    LShift,
    RShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One instruction in the flat, linear IL. `dest` values are the ones
/// liveness analysis treats as definitions; every other `ILValue` field
/// is a use.
#[derive(Debug, Clone)]
pub enum Command {
    Arith {
        op: ArithOp,
        dest: ILValue,
        lhs: ILValue,
        rhs: ILValue,
        /// Whether this arithmetic is over a signed or unsigned operand
        /// type, needed to pick DIV vs IDIV / SAR vs SHR at emission.
        is_unsigned: bool,
    },
    Neg {
        dest: ILValue,
        src: ILValue,
    },
    BitNot {
        dest: ILValue,
        src: ILValue,
    },
    Compare {
        op: CompareOp,
        dest: ILValue,
        lhs: ILValue,
        rhs: ILValue,
        is_unsigned: bool,
    },
    /// Take the address of an lvalue-location value, producing an
    /// ordinary (non-location) pointer value.
    AddrOf {
        dest: ILValue,
        src: ILValue,
    },
    /// Load through a pointer value.
    ReadAt {
        dest: ILValue,
        addr: ILValue,
    },
    /// Store `value` through a pointer value.
    SetAt {
        addr: ILValue,
        value: ILValue,
    },
    /// Pointer arithmetic: `addr + n*sizeof(pointee)`.
    PointerAdd {
        dest: ILValue,
        base: ILValue,
        offset: ILValue,
        elem_size: u32,
    },
    PointerSub {
        dest: ILValue,
        base: ILValue,
        offset: ILValue,
        elem_size: u32,
    },
    /// `(p1 - p2) / sizeof(*p1)`, for pointer-difference expressions.
    PointerDiff {
        dest: ILValue,
        lhs: ILValue,
        rhs: ILValue,
        elem_size: u32,
    },
    Label(String),
    Jump(String),
    JumpZero {
        cond: ILValue,
        target: String,
    },
    JumpNotZero {
        cond: ILValue,
        target: String,
    },
    Return(Option<ILValue>),
    Call {
        dest: Option<ILValue>,
        callee: ILValue,
        args: Vec<ILValue>,
    },
    /// Plain register-to-register/slot-to-slot copy. Liveness treats
    /// this as a *move* rather than an ordinary def/use pair, which is
    /// what makes it eligible for coalescing.
    Set {
        dest: ILValue,
        src: ILValue,
    },
    /// Bulk copy of a whole struct/union object (used for aggregate
    /// assignment and by-value argument passing).
    StructMemberCopy {
        dest_addr: ILValue,
        src_addr: ILValue,
        size: u32,
    },
    /// Zero-fill `size` bytes starting at `addr` (used for
    /// default-zero-initialized aggregates and arrays).
    Zero {
        addr: ILValue,
        size: u32,
    },
    /// Declares a static string literal's bytes; collected up front so
    /// the emitter can place them in `.rodata`.
    StringLiteralDecl {
        id: u32,
        bytes: Rc<[u8]>,
    },
}

impl Command {
    /// The value this command defines, if any — used to seed liveness's
    /// def sets.
    pub fn def(&self) -> Option<&ILValue> {
        match self {
            Command::Arith { dest, .. }
            | Command::Neg { dest, .. }
            | Command::BitNot { dest, .. }
            | Command::Compare { dest, .. }
            | Command::AddrOf { dest, .. }
            | Command::ReadAt { dest, .. }
            | Command::PointerAdd { dest, .. }
            | Command::PointerSub { dest, .. }
            | Command::PointerDiff { dest, .. }
            | Command::Set { dest, .. } => Some(dest),
            Command::Call { dest: Some(dest), .. } => Some(dest),
            _ => None,
        }
    }

    /// The values this command reads — used to seed liveness's use sets.
    pub fn uses(&self) -> Vec<&ILValue> {
        match self {
            Command::Arith { lhs, rhs, .. } | Command::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            Command::Neg { src, .. } | Command::BitNot { src, .. } | Command::AddrOf { src, .. } => {
                vec![src]
            }
            Command::ReadAt { addr, .. } => vec![addr],
            Command::SetAt { addr, value } => vec![addr, value],
            Command::PointerAdd { base, offset, .. } | Command::PointerSub { base, offset, .. } => {
                vec![base, offset]
            }
            Command::PointerDiff { lhs, rhs, .. } => vec![lhs, rhs],
            Command::JumpZero { cond, .. } | Command::JumpNotZero { cond, .. } => vec![cond],
            Command::Return(Some(v)) => vec![v],
            Command::Call { callee, args, .. } => {
                let mut v = vec![callee];
                v.extend(args.iter());
                v
            }
            Command::Set { src, .. } => vec![src],
            Command::StructMemberCopy { dest_addr, src_addr, .. } => vec![dest_addr, src_addr],
            _ => Vec::new(),
        }
    }

    /// `true` for the SET copies liveness treats as coalescing
    /// candidates rather than ordinary def/use instructions.
    pub fn is_move(&self) -> bool {
        matches!(self, Command::Set { .. })
    }

    /// `true` for instructions whose x86-64 lowering clobbers fixed
    /// registers (RAX/RDX for DIV/MOD, CL for shifts, the caller-saved
    /// set for calls, RSI/RDI/RCX/RAX for the `rep movsb`/`rep stosb`
    /// sequences `StructMemberCopy`/`Zero` lower to) — these need
    /// interference edges against every value live across them even
    /// though they have no `ILValue` dest naming those registers.
    pub fn clobbers_fixed_registers(&self) -> bool {
        matches!(
            self,
            Command::Arith {
                op: ArithOp::Div | ArithOp::Mod | ArithOp::LShift | ArithOp::RShift,
                ..
            } | Command::Call { .. }
                | Command::StructMemberCopy { .. }
                | Command::Zero { .. }
        )
    }
}

/// One function's worth of IL: a flat instruction list plus the
/// parameter slots feeding it (the ABI prelude populates these).
#[derive(Debug, Clone)]
pub struct ILFunction {
    pub name: String,
    pub params: Vec<ILValue>,
    pub commands: Vec<Command>,
    pub next_value_id: ValueId,
    pub is_defined: bool,
}

impl ILFunction {
    pub fn new(name: impl Into<String>) -> Self {
        ILFunction {
            name: name.into(),
            params: Vec::new(),
            commands: Vec::new(),
            next_value_id: 0,
            is_defined: true,
        }
    }

    pub fn fresh_local(&mut self, ty: Rc<Type>) -> ILValue {
        let id = self.next_value_id;
        self.next_value_id += 1;
        ILValue::local(id, ty)
    }

    pub fn push(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }
}

/// A file-scope object with static storage duration (global/`static`),
/// carrying its optional constant initializer.
#[derive(Debug, Clone)]
pub struct StaticDatum {
    pub name: String,
    pub ty: Rc<Type>,
    pub init: Option<i64>,
    pub is_external_linkage: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ILProgram {
    pub functions: Vec<ILFunction>,
    pub statics: Vec<StaticDatum>,
    pub string_literals: Vec<Rc<[u8]>>,
}

impl ILProgram {
    pub fn intern_string(&mut self, bytes: Vec<u8>) -> u32 {
        let id = self.string_literals.len() as u32;
        self.string_literals.push(Rc::from(bytes));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn fresh_locals_get_increasing_ids() {
        let mut f = ILFunction::new("f");
        let a = f.fresh_local(Rc::new(Type::int()));
        let b = f.fresh_local(Rc::new(Type::int()));
        assert_ne!(a.storage, b.storage);
    }

    #[test]
    fn set_command_is_reported_as_a_move() {
        let ty = Rc::new(Type::int());
        let cmd = Command::Set {
            dest: ILValue::local(0, ty.clone()),
            src: ILValue::local(1, ty),
        };
        assert!(cmd.is_move());
    }

    #[test]
    fn div_clobbers_fixed_registers_but_add_does_not() {
        let ty = Rc::new(Type::int());
        let div = Command::Arith {
            op: ArithOp::Div,
            dest: ILValue::local(0, ty.clone()),
            lhs: ILValue::local(1, ty.clone()),
            rhs: ILValue::local(2, ty.clone()),
            is_unsigned: false,
        };
        let add = Command::Arith {
            op: ArithOp::Add,
            dest: ILValue::local(3, ty.clone()),
            lhs: ILValue::local(1, ty.clone()),
            rhs: ILValue::local(2, ty),
            is_unsigned: false,
        };
        assert!(div.clobbers_fixed_registers());
        assert!(!add.clobbers_fixed_registers());
    }
}
