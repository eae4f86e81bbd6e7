//! Recursive-descent parser: tokens in, `ast::Program` out.
//!
//! One token of lookahead, hand-written (no parser-generator
//! dependency), matching the teacher's own hand-written `parser.rs`.
//! Parse errors are recorded into the shared `Diagnostics` collector and
//! the parser resynchronizes at the next statement/declaration boundary
//! rather than aborting, mirroring the "poison and continue" policy
//! used throughout lowering.

use crate::ast::*;
use crate::diag::{Diagnostics, Span};
use crate::token::{Keyword, Punct, Token, TokenKind};
use std::collections::HashSet;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diags: &'a mut Diagnostics,
    /// Names the parser has seen declared via `typedef`, needed to
    /// disambiguate `T *p;` (declaration) from `T * p;` (multiplication
    /// expression statement) — the classic C "typedef ambiguity".
    typedef_names: HashSet<String>,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], diags: &'a mut Diagnostics) -> Self {
        Parser {
            tokens,
            pos: 0,
            diags,
            typedef_names: HashSet::new(),
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span.clone()
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check_punct(&self, p: &Punct) -> bool {
        matches!(self.peek(), TokenKind::Punct(x) if x == p)
    }

    fn check_kw(&self, k: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(x) if *x == k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(&p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct) -> PResult<()> {
        if self.eat_punct(p.clone()) {
            Ok(())
        } else {
            self.error(format!("expected '{:?}', found {}", p, self.peek()));
            Err(())
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if let TokenKind::Ident(name) = self.peek().clone() {
            self.advance();
            Ok(name)
        } else {
            self.error(format!("expected identifier, found {}", self.peek()));
            Err(())
        }
    }

    fn error(&mut self, message: String) {
        self.diags.error(self.span(), message);
    }

    /// Skip tokens until a likely declaration/statement boundary, so
    /// one syntax error doesn't cascade into a wall of spurious ones.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::Punct(Punct::Semi) => {
                    self.advance();
                    return;
                }
                TokenKind::Punct(Punct::RBrace) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub fn parse_program(mut self) -> Program {
        let mut program = Program::default();
        while !matches!(self.peek(), TokenKind::Eof) {
            match self.parse_external_decl() {
                Ok(decl) => program.decls.push(decl),
                Err(()) => self.synchronize(),
            }
        }
        program
    }

    fn is_type_start(&self) -> bool {
        match self.peek() {
            TokenKind::Keyword(k) => matches!(
                k,
                Keyword::Void
                    | Keyword::Int
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Long
                    | Keyword::Unsigned
                    | Keyword::Signed
                    | Keyword::Bool
                    | Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Const
            ),
            TokenKind::Ident(name) => self.typedef_names.contains(name),
            _ => false,
        }
    }

    fn parse_storage_class(&mut self) -> StorageClass {
        let mut sc = StorageClass::default();
        loop {
            match self.peek() {
                TokenKind::Keyword(Keyword::Typedef) => {
                    sc.is_typedef = true;
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Extern) => {
                    sc.is_extern = true;
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Static) => {
                    sc.is_static = true;
                    self.advance();
                }
                _ => break,
            }
        }
        sc
    }

    fn parse_qualifiers(&mut self) -> Qualifiers {
        let mut q = Qualifiers::default();
        while self.check_kw(Keyword::Const) {
            q.is_const = true;
            self.advance();
        }
        q
    }

    /// Parse a type-specifier: one of the base-type keyword
    /// combinations, a struct/union/enum specifier, or a typedef name.
    fn parse_type_spec(&mut self) -> PResult<TypeSpec> {
        match self.peek().clone() {
            TokenKind::Keyword(Keyword::Void) => {
                self.advance();
                Ok(TypeSpec::Void)
            }
            TokenKind::Keyword(Keyword::Bool) => {
                self.advance();
                Ok(TypeSpec::Bool)
            }
            TokenKind::Keyword(Keyword::Struct) | TokenKind::Keyword(Keyword::Union) => {
                let kind = if self.check_kw(Keyword::Struct) {
                    AggKeyword::Struct
                } else {
                    AggKeyword::Union
                };
                self.advance();
                let tag = if let TokenKind::Ident(name) = self.peek().clone() {
                    self.advance();
                    Some(name)
                } else {
                    None
                };
                let members = if self.eat_punct(Punct::LBrace) {
                    let mut fields = Vec::new();
                    while !self.check_punct(&Punct::RBrace) && !matches!(self.peek(), TokenKind::Eof)
                    {
                        fields.push(self.parse_field_decl()?);
                    }
                    self.expect_punct(Punct::RBrace)?;
                    Some(fields)
                } else {
                    None
                };
                if tag.is_none() && members.is_none() {
                    self.error("expected tag or '{' after struct/union".to_string());
                    return Err(());
                }
                Ok(TypeSpec::Aggregate { kind, tag, members })
            }
            TokenKind::Keyword(Keyword::Enum) => {
                self.advance();
                let tag = if let TokenKind::Ident(name) = self.peek().clone() {
                    self.advance();
                    Some(name)
                } else {
                    None
                };
                let variants = if self.eat_punct(Punct::LBrace) {
                    let mut vs = Vec::new();
                    loop {
                        if self.check_punct(&Punct::RBrace) {
                            break;
                        }
                        let name = self.expect_ident()?;
                        let value = if self.eat_punct(Punct::Assign) {
                            Some(self.parse_conditional()?)
                        } else {
                            None
                        };
                        vs.push((name, value));
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                    self.expect_punct(Punct::RBrace)?;
                    Some(vs)
                } else {
                    None
                };
                Ok(TypeSpec::Enum { tag, variants })
            }
            // Arithmetic keywords combine: `unsigned long`, `long int`, etc.
            TokenKind::Keyword(
                Keyword::Char | Keyword::Short | Keyword::Int | Keyword::Long | Keyword::Unsigned
                | Keyword::Signed,
            ) => self.parse_arithmetic_spec(),
            TokenKind::Ident(name) if self.typedef_names.contains(&name) => {
                self.advance();
                Ok(TypeSpec::TypedefName(name))
            }
            _ => {
                self.error(format!("expected a type specifier, found {}", self.peek()));
                Err(())
            }
        }
    }

    fn parse_arithmetic_spec(&mut self) -> PResult<TypeSpec> {
        let mut has_unsigned = false;
        let mut has_char = false;
        let mut has_short = false;
        let mut long_count = 0u8;
        loop {
            match self.peek() {
                TokenKind::Keyword(Keyword::Unsigned) => {
                    has_unsigned = true;
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Signed) => {
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Char) => {
                    has_char = true;
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Short) => {
                    has_short = true;
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Int) => {
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Long) => {
                    long_count += 1;
                    self.advance();
                }
                _ => break,
            }
        }
        if has_char {
            return Ok(if has_unsigned {
                TypeSpec::UnsignedChar
            } else {
                TypeSpec::Char
            });
        }
        if has_short {
            return Ok(if has_unsigned {
                TypeSpec::UnsignedShort
            } else {
                TypeSpec::Short
            });
        }
        if long_count > 0 {
            return Ok(if has_unsigned {
                TypeSpec::UnsignedLong
            } else {
                TypeSpec::Long
            });
        }
        Ok(if has_unsigned {
            TypeSpec::UnsignedInt
        } else {
            TypeSpec::Int
        })
    }

    fn parse_field_decl(&mut self) -> PResult<FieldDecl> {
        let spec = self.parse_type_spec()?;
        let declarator = self.parse_declarator()?;
        self.expect_punct(Punct::Semi)?;
        Ok(FieldDecl { spec, declarator })
    }

    /// declarator := ('*' qualifiers)* direct-declarator
    fn parse_declarator(&mut self) -> PResult<Declarator> {
        if self.eat_punct(Punct::Star) {
            let qualifiers = self.parse_qualifiers();
            let inner = self.parse_declarator()?;
            return Ok(Declarator::Pointer {
                qualifiers,
                inner: Box::new(inner),
            });
        }
        self.parse_direct_declarator()
    }

    fn parse_direct_declarator(&mut self) -> PResult<Declarator> {
        let mut base = if self.eat_punct(Punct::LParen) {
            let inner = self.parse_declarator()?;
            self.expect_punct(Punct::RParen)?;
            inner
        } else if let TokenKind::Ident(name) = self.peek().clone() {
            self.advance();
            Declarator::Ident(name)
        } else {
            Declarator::Abstract
        };

        loop {
            if self.eat_punct(Punct::LBracket) {
                let size = if self.check_punct(&Punct::RBracket) {
                    None
                } else {
                    Some(Box::new(self.parse_conditional()?))
                };
                self.expect_punct(Punct::RBracket)?;
                base = Declarator::Array {
                    inner: Box::new(base),
                    size,
                };
            } else if self.eat_punct(Punct::LParen) {
                let (params, is_void_params, has_prototype) = self.parse_param_list()?;
                base = Declarator::Function {
                    inner: Box::new(base),
                    params,
                    is_void_params,
                    has_prototype,
                };
            } else {
                break;
            }
        }
        Ok(base)
    }

    fn parse_param_list(&mut self) -> PResult<(Vec<(TypeSpec, Declarator)>, bool, bool)> {
        if self.check_punct(&Punct::RParen) {
            self.advance();
            return Ok((Vec::new(), false, false));
        }
        if self.check_kw(Keyword::Void) && matches!(self.peek_at(1), TokenKind::Punct(Punct::RParen)) {
            self.advance();
            self.advance();
            return Ok((Vec::new(), true, true));
        }
        let mut params = Vec::new();
        loop {
            let spec = self.parse_type_spec()?;
            let declarator = self.parse_declarator()?;
            params.push((spec, declarator));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok((params, false, true))
    }

    fn parse_external_decl(&mut self) -> PResult<ExternalDecl> {
        let span = self.span();
        let storage = self.parse_storage_class();
        let spec = self.parse_type_spec()?;
        let qualifiers = self.parse_qualifiers();

        if self.check_punct(&Punct::Semi) {
            self.advance();
            return Ok(ExternalDecl::Declaration(Declaration {
                spec,
                storage,
                qualifiers,
                declarators: Vec::new(),
                span,
            }));
        }

        let declarator = self.parse_declarator()?;

        if storage.is_typedef {
            if let Some(name) = declarator.name() {
                self.typedef_names.insert(name.to_string());
            }
        }

        // A function declarator immediately followed by '{' is a
        // function definition; anything else (';' or '=' then ';' or
        // further comma-separated declarators) is an ordinary declaration.
        if matches!(declarator, Declarator::Function { .. }) && self.check_punct(&Punct::LBrace) {
            self.advance();
            let body = self.parse_block_items()?;
            self.expect_punct(Punct::RBrace)?;
            return Ok(ExternalDecl::Function(FunctionDef {
                spec,
                storage,
                declarator,
                body,
                span,
            }));
        }

        let mut declarators = vec![self.parse_init_declarator_tail(declarator)?];
        while self.eat_punct(Punct::Comma) {
            let d = self.parse_declarator()?;
            if storage.is_typedef {
                if let Some(name) = d.name() {
                    self.typedef_names.insert(name.to_string());
                }
            }
            declarators.push(self.parse_init_declarator_tail(d)?);
        }
        self.expect_punct(Punct::Semi)?;
        Ok(ExternalDecl::Declaration(Declaration {
            spec,
            storage,
            qualifiers,
            declarators,
            span,
        }))
    }

    fn parse_init_declarator_tail(&mut self, declarator: Declarator) -> PResult<InitDeclarator> {
        let init = if self.eat_punct(Punct::Assign) {
            Some(Initializer::Scalar(self.parse_assignment()?))
        } else {
            None
        };
        Ok(InitDeclarator { declarator, init })
    }

    // ---- statements ----

    fn parse_block_items(&mut self) -> PResult<Vec<BlockItem>> {
        let mut items = Vec::new();
        while !self.check_punct(&Punct::RBrace) && !matches!(self.peek(), TokenKind::Eof) {
            match self.parse_block_item() {
                Ok(item) => items.push(item),
                Err(()) => self.synchronize(),
            }
        }
        Ok(items)
    }

    fn parse_block_item(&mut self) -> PResult<BlockItem> {
        if self.is_type_start()
            || self.check_kw(Keyword::Typedef)
            || self.check_kw(Keyword::Extern)
            || self.check_kw(Keyword::Static)
        {
            let span = self.span();
            let storage = self.parse_storage_class();
            let spec = self.parse_type_spec()?;
            let qualifiers = self.parse_qualifiers();
            let mut declarators = Vec::new();
            if !self.check_punct(&Punct::Semi) {
                let d = self.parse_declarator()?;
                declarators.push(self.parse_init_declarator_tail(d)?);
                while self.eat_punct(Punct::Comma) {
                    let d = self.parse_declarator()?;
                    declarators.push(self.parse_init_declarator_tail(d)?);
                }
            }
            self.expect_punct(Punct::Semi)?;
            return Ok(BlockItem::Decl(Declaration {
                spec,
                storage,
                qualifiers,
                declarators,
                span,
            }));
        }
        Ok(BlockItem::Stmt(self.parse_stmt()?))
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::Punct(Punct::LBrace) => {
                self.advance();
                let items = self.parse_block_items()?;
                self.expect_punct(Punct::RBrace)?;
                Ok(Stmt::Compound(items, span))
            }
            TokenKind::Keyword(Keyword::If) => {
                self.advance();
                self.expect_punct(Punct::LParen)?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.check_kw(Keyword::Else) {
                    self.advance();
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    span,
                })
            }
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                self.expect_punct(Punct::LParen)?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body, span })
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.advance();
                let body = Box::new(self.parse_stmt()?);
                if !self.check_kw(Keyword::While) {
                    self.error("expected 'while' after do-statement body".to_string());
                    return Err(());
                }
                self.advance();
                self.expect_punct(Punct::LParen)?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::DoWhile { body, cond, span })
            }
            TokenKind::Keyword(Keyword::For) => {
                self.advance();
                self.expect_punct(Punct::LParen)?;
                let init = if self.check_punct(&Punct::Semi) {
                    self.advance();
                    None
                } else {
                    let item = self.parse_block_item_for_init()?;
                    Some(Box::new(item))
                };
                let cond = if self.check_punct(&Punct::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi)?;
                let step = if self.check_punct(&Punct::RParen) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Break(span))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Continue(span))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.check_punct(&Punct::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Return(value, span))
            }
            TokenKind::Keyword(Keyword::Goto) => {
                self.advance();
                let label = self.expect_ident()?;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Goto(label, span))
            }
            TokenKind::Punct(Punct::Semi) => {
                self.advance();
                Ok(Stmt::Expr(None, span))
            }
            TokenKind::Ident(name)
                if matches!(self.peek_at(1), TokenKind::Punct(Punct::Colon))
                    && !self.typedef_names.contains(&name) =>
            {
                self.advance();
                self.advance();
                let inner = Box::new(self.parse_stmt()?);
                Ok(Stmt::Label(name, inner, span))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect_punct(Punct::Semi)?;
                Ok(Stmt::Expr(Some(expr), span))
            }
        }
    }

    fn parse_block_item_for_init(&mut self) -> PResult<BlockItem> {
        if self.is_type_start() {
            let span = self.span();
            let storage = self.parse_storage_class();
            let spec = self.parse_type_spec()?;
            let qualifiers = self.parse_qualifiers();
            let d = self.parse_declarator()?;
            let mut declarators = vec![self.parse_init_declarator_tail(d)?];
            while self.eat_punct(Punct::Comma) {
                let d = self.parse_declarator()?;
                declarators.push(self.parse_init_declarator_tail(d)?);
            }
            self.expect_punct(Punct::Semi)?;
            Ok(BlockItem::Decl(Declaration {
                spec,
                storage,
                qualifiers,
                declarators,
                span,
            }))
        } else {
            let span = self.span();
            let expr = self.parse_expr()?;
            self.expect_punct(Punct::Semi)?;
            Ok(BlockItem::Stmt(Stmt::Expr(Some(expr), span)))
        }
    }

    // ---- expressions, precedence-climbing from comma down to primary ----

    fn parse_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_assignment()?;
        while self.check_punct(&Punct::Comma) {
            let span = self.span();
            self.advance();
            let rhs = self.parse_assignment()?;
            lhs = Expr::Comma {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn assign_op(p: &Punct) -> Option<AssignOp> {
        Some(match p {
            Punct::Assign => AssignOp::Assign,
            Punct::PlusEq => AssignOp::Add,
            Punct::MinusEq => AssignOp::Sub,
            Punct::StarEq => AssignOp::Mul,
            Punct::SlashEq => AssignOp::Div,
            Punct::PercentEq => AssignOp::Mod,
            Punct::AmpEq => AssignOp::BitAnd,
            Punct::PipeEq => AssignOp::BitOr,
            Punct::CaretEq => AssignOp::BitXor,
            Punct::ShlEq => AssignOp::Shl,
            Punct::ShrEq => AssignOp::Shr,
            _ => return None,
        })
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional()?;
        if let TokenKind::Punct(p) = self.peek().clone() {
            if let Some(op) = Self::assign_op(&p) {
                let span = self.span();
                self.advance();
                let rhs = self.parse_assignment()?;
                return Ok(Expr::Assign {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                });
            }
        }
        Ok(lhs)
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_logor()?;
        if self.check_punct(&Punct::Question) {
            let span = self.span();
            self.advance();
            let then_expr = self.parse_expr()?;
            self.expect_punct(Punct::Colon)?;
            let else_expr = self.parse_conditional()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                span,
            });
        }
        Ok(cond)
    }

    fn parse_binop_level(
        &mut self,
        next: fn(&mut Self) -> PResult<Expr>,
        ops: &[(Punct, BinOp)],
    ) -> PResult<Expr> {
        let mut lhs = next(self)?;
        loop {
            let matched = if let TokenKind::Punct(p) = self.peek() {
                ops.iter().find(|(punct, _)| punct == p).map(|(_, op)| *op)
            } else {
                None
            };
            let Some(op) = matched else { break };
            let span = self.span();
            self.advance();
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_logor(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_logand, &[(Punct::PipePipe, BinOp::LogOr)])
    }
    fn parse_logand(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_bitor, &[(Punct::AmpAmp, BinOp::LogAnd)])
    }
    fn parse_bitor(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_bitxor, &[(Punct::Pipe, BinOp::BitOr)])
    }
    fn parse_bitxor(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_bitand, &[(Punct::Caret, BinOp::BitXor)])
    }
    fn parse_bitand(&mut self) -> PResult<Expr> {
        self.parse_binop_level(Self::parse_equality, &[(Punct::Amp, BinOp::BitAnd)])
    }
    fn parse_equality(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_relational,
            &[(Punct::EqEq, BinOp::Eq), (Punct::NotEq, BinOp::Ne)],
        )
    }
    fn parse_relational(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_shift,
            &[
                (Punct::Lt, BinOp::Lt),
                (Punct::Le, BinOp::Le),
                (Punct::Gt, BinOp::Gt),
                (Punct::Ge, BinOp::Ge),
            ],
        )
    }
    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_additive,
            &[(Punct::Shl, BinOp::Shl), (Punct::Shr, BinOp::Shr)],
        )
    }
    fn parse_additive(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_multiplicative,
            &[(Punct::Plus, BinOp::Add), (Punct::Minus, BinOp::Sub)],
        )
    }
    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        self.parse_binop_level(
            Self::parse_cast,
            &[
                (Punct::Star, BinOp::Mul),
                (Punct::Slash, BinOp::Div),
                (Punct::Percent, BinOp::Mod),
            ],
        )
    }

    /// A cast `(type) expr` is distinguished from a parenthesized
    /// expression by whether the token after `(` starts a type.
    fn parse_cast(&mut self) -> PResult<Expr> {
        if self.check_punct(&Punct::LParen) {
            let save = self.pos;
            let span = self.span();
            self.advance();
            if self.is_type_start() {
                if let Ok(spec) = self.parse_type_spec() {
                    let _ = self.parse_qualifiers();
                    if let Ok(declarator) = self.parse_declarator() {
                        if self.eat_punct(Punct::RParen) {
                            let operand = self.parse_cast()?;
                            return Ok(Expr::Cast {
                                spec,
                                declarator,
                                operand: Box::new(operand),
                                span,
                            });
                        }
                    }
                }
            }
            self.pos = save;
        }
        self.parse_unary()
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::Punct(Punct::Amp) => {
                self.advance();
                let operand = self.parse_cast()?;
                Ok(Expr::AddrOf {
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::Star) => {
                self.advance();
                let operand = self.parse_cast()?;
                Ok(Expr::Deref {
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::Plus) => {
                self.advance();
                let operand = self.parse_cast()?;
                Ok(Expr::Unary {
                    op: UnOp::Plus,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::Minus) => {
                self.advance();
                let operand = self.parse_cast()?;
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::Tilde) => {
                self.advance();
                let operand = self.parse_cast()?;
                Ok(Expr::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::Bang) => {
                self.advance();
                let operand = self.parse_cast()?;
                Ok(Expr::Unary {
                    op: UnOp::LogNot,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::PlusPlus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::IncDec {
                    op: IncDecOp::Inc,
                    is_prefix: true,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Punct(Punct::MinusMinus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::IncDec {
                    op: IncDecOp::Dec,
                    is_prefix: true,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Sizeof) => {
                self.advance();
                if self.check_punct(&Punct::LParen) {
                    let save = self.pos;
                    self.advance();
                    if self.is_type_start() {
                        if let Ok(spec) = self.parse_type_spec() {
                            let _ = self.parse_qualifiers();
                            if let Ok(declarator) = self.parse_declarator() {
                                if self.eat_punct(Punct::RParen) {
                                    return Ok(Expr::SizeofType {
                                        spec,
                                        declarator,
                                        span,
                                    });
                                }
                            }
                        }
                    }
                    self.pos = save;
                }
                let operand = self.parse_unary()?;
                Ok(Expr::SizeofExpr {
                    operand: Box::new(operand),
                    span,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.span();
            if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expr()?;
                self.expect_punct(Punct::RBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else if self.eat_punct(Punct::LParen) {
                let mut args = Vec::new();
                if !self.check_punct(&Punct::RParen) {
                    args.push(self.parse_assignment()?);
                    while self.eat_punct(Punct::Comma) {
                        args.push(self.parse_assignment()?);
                    }
                }
                self.expect_punct(Punct::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.eat_punct(Punct::Dot) {
                let field = self.expect_ident()?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    field,
                    arrow: false,
                    span,
                };
            } else if self.eat_punct(Punct::Arrow) {
                let field = self.expect_ident()?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    field,
                    arrow: true,
                    span,
                };
            } else if self.check_punct(&Punct::PlusPlus) {
                self.advance();
                expr = Expr::IncDec {
                    op: IncDecOp::Inc,
                    is_prefix: false,
                    operand: Box::new(expr),
                    span,
                };
            } else if self.check_punct(&Punct::MinusMinus) {
                self.advance();
                expr = Expr::IncDec {
                    op: IncDecOp::Dec,
                    is_prefix: false,
                    operand: Box::new(expr),
                    span,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::IntLiteral { value, suffix } => {
                self.advance();
                Ok(Expr::IntLiteral { value, suffix, span })
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                Ok(Expr::CharLiteral(c, span))
            }
            TokenKind::StringLiteral(bytes) => {
                self.advance();
                Ok(Expr::StringLiteral(bytes, span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name, span))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            _ => {
                self.error(format!("expected an expression, found {}", self.peek()));
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use std::rc::Rc;

    fn parse(src: &str) -> (Program, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(src, Rc::from("t.c")).tokenize(&mut diags);
        let program = Parser::new(&tokens, &mut diags).parse_program();
        (program, diags)
    }

    #[test]
    fn parses_simple_function_definition() {
        let (program, diags) = parse("int main(void) { return 0; }");
        assert!(!diags.has_errors());
        assert_eq!(program.decls.len(), 1);
        assert!(matches!(program.decls[0], ExternalDecl::Function(_)));
    }

    #[test]
    fn parses_pointer_declarator_and_typedef_ambiguity() {
        let (program, diags) = parse("typedef int myint; myint *p;");
        assert!(!diags.has_errors());
        assert_eq!(program.decls.len(), 2);
    }

    #[test]
    fn parses_struct_with_members_and_arrow_access() {
        let (program, diags) = parse(
            "struct Point { int x; int y; }; int f(struct Point *p) { return p->x; }",
        );
        assert!(!diags.has_errors());
        assert_eq!(program.decls.len(), 2);
    }

    #[test]
    fn parses_for_loop_with_declaration_init() {
        let (_, diags) = parse("int f(void) { int s = 0; for (int i = 0; i < 10; i++) s += i; return s; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn parses_cast_and_sizeof() {
        let (_, diags) = parse("int f(void) { return (int)sizeof(long); }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn reports_error_but_continues_after_bad_statement() {
        let (program, diags) = parse("int f(void) { @ ; } int g(void) { return 1; }");
        assert!(diags.has_errors());
        assert_eq!(program.decls.len(), 2);
    }
}
