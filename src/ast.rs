//! Abstract syntax tree produced by the parser.
//!
//! The parser deliberately does *not* resolve `TypeSpec`s into
//! `types::Type`s itself (that requires the symbol/tag environment,
//! which is the semantic analyzer's business per §4.2/§4.4); it only
//! records what was written. `lower::decl` walks `TypeSpec` + `Declarator`
//! pairs against the live `SymbolTable` to build real `Type`s, exactly
//! the way §4.4 describes type-checking as interleaved with lowering.

use crate::diag::Span;
use crate::token::IntSuffix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKeyword {
    Struct,
    Union,
}

/// An unresolved type specifier as written in source: some combination
/// of base-type keywords, or a struct/union/enum specifier, or a
/// typedef name.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    Void,
    Char,
    Short,
    Int,
    Long,
    UnsignedChar,
    UnsignedShort,
    UnsignedInt,
    UnsignedLong,
    Bool,
    /// `struct`/`union Tag { members }` or a bare `struct Tag` reference.
    Aggregate {
        kind: AggKeyword,
        tag: Option<String>,
        members: Option<Vec<FieldDecl>>,
    },
    /// `enum Tag { A, B, C }` or a bare `enum Tag` reference. Enum
    /// constants are lowered as `int` constants in the ordinary
    /// namespace; the enum carries no runtime representation of its own.
    Enum {
        tag: Option<String>,
        variants: Option<Vec<(String, Option<Expr>)>>,
    },
    /// Reference to a name previously declared via `typedef`.
    TypedefName(String),
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub spec: TypeSpec,
    pub declarator: Declarator,
}

/// Storage-class specifiers as written; linkage/storage duration is
/// computed from these by the symbol environment, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageClass {
    pub is_typedef: bool,
    pub is_extern: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qualifiers {
    pub is_const: bool,
}

/// A declarator: the part of a declaration after the base type-specifier
/// that introduces pointers/arrays/functions and, eventually, a name.
/// Nested to express e.g. `int (*fp)(int)` (pointer to function).
#[derive(Debug, Clone)]
pub enum Declarator {
    Ident(String),
    /// Abstract declarator with no name at all (used by `sizeof`/casts).
    Abstract,
    Pointer {
        qualifiers: Qualifiers,
        inner: Box<Declarator>,
    },
    Array {
        inner: Box<Declarator>,
        /// `None` for `[]` (incomplete array declarator).
        size: Option<Box<Expr>>,
    },
    Function {
        inner: Box<Declarator>,
        params: Vec<(TypeSpec, Declarator)>,
        /// `true` for an explicit `(void)` parameter list.
        is_void_params: bool,
        /// `true` when a prototype was given at all (vs. `f()`, which
        /// C treats as an unspecified-parameter-list declarator).
        has_prototype: bool,
    },
}

impl Declarator {
    /// The identifier ultimately introduced by this declarator, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Declarator::Ident(n) => Some(n),
            Declarator::Abstract => None,
            Declarator::Pointer { inner, .. }
            | Declarator::Array { inner, .. }
            | Declarator::Function { inner, .. } => inner.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,     // bitwise ~
    LogNot,  // !
    Plus,    // unary +
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral {
        value: u64,
        suffix: IntSuffix,
        span: Span,
    },
    CharLiteral(u8, Span),
    StringLiteral(Vec<u8>, Span),
    Ident(String, Span),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// Prefix (`++x`) or postfix (`x++`) increment/decrement.
    IncDec {
        op: IncDecOp,
        is_prefix: bool,
        operand: Box<Expr>,
        span: Span,
    },
    AddrOf {
        operand: Box<Expr>,
        span: Span,
    },
    Deref {
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Assign {
        op: AssignOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    Comma {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Member {
        base: Box<Expr>,
        field: String,
        arrow: bool,
        span: Span,
    },
    Cast {
        spec: TypeSpec,
        declarator: Declarator,
        operand: Box<Expr>,
        span: Span,
    },
    SizeofExpr {
        operand: Box<Expr>,
        span: Span,
    },
    SizeofType {
        spec: TypeSpec,
        declarator: Declarator,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral { span, .. }
            | Expr::CharLiteral(_, span)
            | Expr::StringLiteral(_, span)
            | Expr::Ident(_, span)
            | Expr::Unary { span, .. }
            | Expr::IncDec { span, .. }
            | Expr::AddrOf { span, .. }
            | Expr::Deref { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Comma { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Member { span, .. }
            | Expr::Cast { span, .. }
            | Expr::SizeofExpr { span, .. }
            | Expr::SizeofType { span, .. } => span.clone(),
        }
    }
}

/// An initializer: spec.md restricts these to scalar expressions and
/// string-literal initialization of `char[]` (§4.4 initializer
/// semantics); no brace initializer lists.
#[derive(Debug, Clone)]
pub enum Initializer {
    Scalar(Expr),
}

#[derive(Debug, Clone)]
pub struct InitDeclarator {
    pub declarator: Declarator,
    pub init: Option<Initializer>,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub spec: TypeSpec,
    pub storage: StorageClass,
    pub qualifiers: Qualifiers,
    pub declarators: Vec<InitDeclarator>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum BlockItem {
    Decl(Declaration),
    Stmt(Stmt),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Option<Expr>, Span),
    Compound(Vec<BlockItem>, Span),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    For {
        init: Option<Box<BlockItem>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    Return(Option<Expr>, Span),
    Goto(String, Span),
    Label(String, Box<Stmt>, Span),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub spec: TypeSpec,
    pub storage: StorageClass,
    pub declarator: Declarator,
    pub body: Vec<BlockItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExternalDecl {
    Function(FunctionDef),
    Declaration(Declaration),
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub decls: Vec<ExternalDecl>,
}
