// src/frontend/parser.rs

use crate::errors::{CompileError, ParserError};
use crate::frontend::string::{process_text, segment_text};
use crate::frontend::{Interner, Lexer, Span, Token, TokenType, ast::*};

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    peeked: Option<Token>,
    pub interner: Interner,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Result<Self, CompileError> {
        Self::with_interner(source, Interner::new())
    }

    /// Parse with an existing interner so symbols stay comparable
    /// across source units (module imports).
    pub fn with_interner(source: &'src str, interner: Interner) -> Result<Self, CompileError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            peeked: None,
            interner,
        })
    }

    pub fn into_interner(self) -> Interner {
        self.interner
    }

    pub fn parse_program(&mut self) -> Result<Program, CompileError> {
        let mut stmts = Vec::new();
        self.skip_newlines()?;
        while !self.check(TokenType::Eof) {
            stmts.push(self.statement()?);
            self.skip_newlines()?;
        }
        Ok(Program { stmts })
    }

    // --- Token plumbing ---

    fn advance(&mut self) -> Result<Token, CompileError> {
        let next = match self.peeked.take() {
            Some(tok) => tok,
            None => self.lexer.next_token()?,
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// One-token lookahead past `current`.
    fn peek_next(&mut self) -> Result<&Token, CompileError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn check(&self, ty: TokenType) -> bool {
        self.current.ty == ty
    }

    fn match_token(&mut self, ty: TokenType) -> Result<bool, CompileError> {
        if self.check(ty) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume(&mut self, ty: TokenType, expected: &str) -> Result<Token, CompileError> {
        if self.check(ty) {
            self.advance()
        } else {
            Err(self.expected_error(expected))
        }
    }

    fn expected_error(&self, expected: &str) -> CompileError {
        ParserError::ExpectedToken {
            expected: expected.to_string(),
            found: self.current.ty.as_str().to_string(),
            span: self.current.span.into(),
        }
        .into()
    }

    fn skip_newlines(&mut self) -> Result<(), CompileError> {
        while self.check(TokenType::Newline) {
            self.advance()?;
        }
        Ok(())
    }

    fn end_statement(&mut self) -> Result<(), CompileError> {
        if self.check(TokenType::Eof) || self.check(TokenType::Dedent) {
            return Ok(());
        }
        self.consume(TokenType::Newline, "end of statement")?;
        Ok(())
    }

    fn intern_ident(&mut self) -> Result<(Symbol, Span), CompileError> {
        let tok = self.consume(TokenType::Identifier, "identifier")?;
        let sym = self.interner.intern(&tok.lexeme);
        Ok((sym, tok.span))
    }

    // --- Statements ---

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        match self.current.ty {
            TokenType::KwIf => self.if_stmt(),
            TokenType::KwWhile => self.while_stmt(),
            TokenType::KwFor => self.for_stmt(),
            TokenType::KwDef | TokenType::KwInline => {
                let def = self.func_def(MethodQualifier::None)?;
                let span = def.span;
                Ok(Stmt {
                    kind: StmtKind::FuncDef(def),
                    span,
                })
            }
            TokenType::KwConst => self.const_stmt(),
            TokenType::KwEntity => self.entity_def(),
            TokenType::KwStruct => self.struct_def(),
            TokenType::KwInterface => self.interface_def(),
            TokenType::KwImport => self.import_stmt(),
            TokenType::KwPass => {
                let tok = self.advance()?;
                self.end_statement()?;
                Ok(Stmt {
                    kind: StmtKind::Pass,
                    span: tok.span,
                })
            }
            TokenType::KwResult => self.result_stmt(),
            TokenType::KwNew => self.new_call_stmt(),
            TokenType::Amp => self.ref_decl(),
            TokenType::Command => self.command_stmt(),
            _ => self.expr_led_stmt(),
        }
    }

    fn block(&mut self) -> Result<Block, CompileError> {
        let colon = self.consume(TokenType::Colon, "':'")?;
        self.consume(TokenType::Newline, "newline after ':'")?;
        if !self.check(TokenType::Indent) {
            return Err(ParserError::EmptyBlock {
                span: colon.span.into(),
            }
            .into());
        }
        self.advance()?;
        let mut stmts = Vec::new();
        self.skip_newlines()?;
        while !self.check(TokenType::Dedent) && !self.check(TokenType::Eof) {
            stmts.push(self.statement()?);
            self.skip_newlines()?;
        }
        let end = self.current.span;
        if self.check(TokenType::Dedent) {
            self.advance()?;
        }
        if stmts.is_empty() {
            return Err(ParserError::EmptyBlock {
                span: colon.span.into(),
            }
            .into());
        }
        let span = colon.span.merge(end);
        Ok(Block { stmts, span })
    }

    fn if_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span; // 'if'
        let cond = self.expression()?;
        let body = self.block()?;
        let mut arms = vec![IfArm { cond, body }];
        let mut orelse = None;
        let mut end = arms[0].body.span;

        loop {
            if self.check(TokenType::KwElif) {
                self.advance()?;
                let cond = self.expression()?;
                let body = self.block()?;
                end = body.span;
                arms.push(IfArm { cond, body });
            } else if self.check(TokenType::KwElse) {
                self.advance()?;
                let body = self.block()?;
                end = body.span;
                orelse = Some(body);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { arms, orelse },
            span: start.merge(end),
        })
    }

    fn while_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span;
        let cond = self.expression()?;
        let body = self.block()?;
        let span = start.merge(body.span);
        Ok(Stmt {
            kind: StmtKind::While { cond, body },
            span,
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span;
        let (var, _) = self.intern_ident()?;
        self.consume(TokenType::KwIn, "'in'")?;
        let iterable = self.expression()?;
        let body = self.block()?;
        let span = start.merge(body.span);
        Ok(Stmt {
            kind: StmtKind::For {
                var,
                iterable,
                body,
            },
            span,
        })
    }

    /// `const NAME [: T] = e` or `const def ...`
    fn const_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current.span;
        if self.peek_next()?.ty == TokenType::KwDef {
            let def = self.func_def(MethodQualifier::None)?;
            let span = def.span;
            return Ok(Stmt {
                kind: StmtKind::FuncDef(def),
                span,
            });
        }
        self.advance()?; // 'const'
        let (name, _) = self.intern_ident()?;
        let ty = if self.match_token(TokenType::Colon)? {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Eq, "'='")?;
        let init = self.expression()?;
        let span = start.merge(init.span);
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::ConstDecl { name, ty, init },
            span,
        })
    }

    /// `&NAME [: T] = e`
    fn ref_decl(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span; // '&'
        let (name, _) = self.intern_ident()?;
        let ty = if self.match_token(TokenType::Colon)? {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Eq, "'='")?;
        let target = self.expression()?;
        let span = start.merge(target.span);
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::RefDecl { name, ty, target },
            span,
        })
    }

    fn result_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span;
        let value = if self.check(TokenType::Newline)
            || self.check(TokenType::Eof)
            || self.check(TokenType::Dedent)
        {
            None
        } else {
            Some(self.expression()?)
        };
        let span = value
            .as_ref()
            .map(|e| start.merge(e.span))
            .unwrap_or(start);
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::Result(value),
            span,
        })
    }

    fn new_call_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span; // 'new'
        self.consume(TokenType::LParen, "'('")?;
        let (args, kwargs) = self.call_arguments()?;
        let end = self.consume(TokenType::RParen, "')'")?.span;
        let span = start.merge(end);
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::NewCall { args, kwargs },
            span,
        })
    }

    fn import_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span;
        let (first, mut end) = self.intern_ident()?;
        let mut path = vec![first];
        while self.match_token(TokenType::Dot)? {
            let (seg, span) = self.intern_ident()?;
            path.push(seg);
            end = span;
        }
        let span = start.merge(end);
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::Import { path },
            span,
        })
    }

    /// Split a raw command lexeme into text and `${name}` segments.
    fn command_stmt(&mut self) -> Result<Stmt, CompileError> {
        let tok = self.advance()?;
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = tok.lexeme.as_str();
        while let Some(pos) = rest.find("${") {
            text.push_str(&rest[..pos]);
            let after = &rest[pos + 2..];
            let Some(close) = after.find('}') else {
                return Err(ParserError::InvalidFExpr {
                    span: tok.span.into(),
                }
                .into());
            };
            let name = after[..close].trim();
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ParserError::InvalidFExpr {
                    span: tok.span.into(),
                }
                .into());
            }
            if !text.is_empty() {
                segments.push(CommandSegment::Text(std::mem::take(&mut text)));
            }
            segments.push(CommandSegment::Interp {
                name: self.interner.intern(name),
                span: tok.span,
            });
            rest = &after[close + 1..];
        }
        text.push_str(rest);
        if !text.is_empty() || segments.is_empty() {
            segments.push(CommandSegment::Text(text));
        }
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::Command(segments),
            span: tok.span,
        })
    }

    /// Statements that start with an expression: declarations with a
    /// type annotation, assignments, augmented assignments, or a bare
    /// expression statement.
    fn expr_led_stmt(&mut self) -> Result<Stmt, CompileError> {
        let expr = self.expression()?;
        let start = expr.span;

        if self.check(TokenType::Colon) {
            // `name: T [= e]`
            let ExprKind::Ident(name) = expr.kind else {
                return Err(ParserError::InvalidAssignTarget {
                    span: expr.span.into(),
                }
                .into());
            };
            self.advance()?;
            let ty = self.expression()?;
            let init = if self.match_token(TokenType::Eq)? {
                Some(self.expression()?)
            } else {
                None
            };
            let end = init.as_ref().map(|e| e.span).unwrap_or(ty.span);
            self.end_statement()?;
            return Ok(Stmt {
                kind: StmtKind::VarDecl { name, ty, init },
                span: start.merge(end),
            });
        }

        if self.check(TokenType::ColonEq) {
            let ExprKind::Ident(name) = expr.kind else {
                return Err(ParserError::InvalidAssignTarget {
                    span: expr.span.into(),
                }
                .into());
            };
            self.advance()?;
            let init = self.expression()?;
            let span = start.merge(init.span);
            self.end_statement()?;
            return Ok(Stmt {
                kind: StmtKind::AutoDecl { name, init },
                span,
            });
        }

        if self.check(TokenType::Eq) {
            if !expr.is_assign_target() {
                return Err(ParserError::InvalidAssignTarget {
                    span: expr.span.into(),
                }
                .into());
            }
            self.advance()?;
            let value = self.expression()?;
            let span = start.merge(value.span);
            self.end_statement()?;
            return Ok(Stmt {
                kind: StmtKind::Assign {
                    target: expr,
                    value,
                },
                span,
            });
        }

        let aug = match self.current.ty {
            TokenType::PlusEq => Some(BinaryOp::Add),
            TokenType::MinusEq => Some(BinaryOp::Sub),
            TokenType::StarEq => Some(BinaryOp::Mul),
            TokenType::SlashEq => Some(BinaryOp::Div),
            TokenType::PercentEq => Some(BinaryOp::Mod),
            _ => None,
        };
        if let Some(op) = aug {
            if !expr.is_assign_target() {
                return Err(ParserError::InvalidAssignTarget {
                    span: expr.span.into(),
                }
                .into());
            }
            self.advance()?;
            let value = self.expression()?;
            let span = start.merge(value.span);
            self.end_statement()?;
            return Ok(Stmt {
                kind: StmtKind::AugAssign {
                    target: expr,
                    op,
                    value,
                },
                span,
            });
        }

        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span: start,
        })
    }

    // --- Definitions ---

    /// `[virtual|override|static] [inline|const] def name(params) [-> [&|const] T]: block`
    fn func_def(&mut self, qualifier: MethodQualifier) -> Result<FuncDef, CompileError> {
        let start = self.current.span;
        let flavor = if self.match_token(TokenType::KwInline)? {
            FuncFlavor::Inline
        } else if self.match_token(TokenType::KwConst)? {
            FuncFlavor::Const
        } else {
            FuncFlavor::Runtime
        };
        self.consume(TokenType::KwDef, "'def'")?;

        let name = if self.check(TokenType::KwNew) {
            self.advance()?;
            self.interner.intern("new")
        } else {
            self.intern_ident()?.0
        };

        self.consume(TokenType::LParen, "'('")?;
        let params = self.param_list()?;
        self.consume(TokenType::RParen, "')'")?;

        let mut result_port = ParamPort::ByValue;
        let result_ty = if self.match_token(TokenType::Arrow)? {
            if self.match_token(TokenType::Amp)? {
                result_port = ParamPort::ByRef;
            } else if self.match_token(TokenType::KwConst)? {
                result_port = ParamPort::Const;
            }
            Some(self.expression()?)
        } else {
            None
        };

        let body = self.block()?;
        let span = start.merge(body.span);
        Ok(FuncDef {
            name,
            flavor,
            qualifier,
            params,
            result_ty,
            result_port,
            body,
            span,
        })
    }

    fn param_list(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        let mut saw_default = false;
        if self.check(TokenType::RParen) {
            return Ok(params);
        }
        loop {
            let start = self.current.span;
            let port = if self.match_token(TokenType::Amp)? {
                ParamPort::ByRef
            } else if self.match_token(TokenType::KwConst)? {
                ParamPort::Const
            } else {
                ParamPort::ByValue
            };
            let (name, name_span) = self.intern_ident()?;
            let ty = if self.match_token(TokenType::Colon)? {
                Some(self.expression()?)
            } else {
                None
            };
            let default = if self.match_token(TokenType::Eq)? {
                Some(self.expression()?)
            } else {
                None
            };
            if default.is_some() {
                saw_default = true;
            } else if saw_default {
                return Err(ParserError::NonDefaultAfterDefault {
                    span: name_span.into(),
                }
                .into());
            }
            let end = default
                .as_ref()
                .map(|e| e.span)
                .or_else(|| ty.as_ref().map(|e| e.span))
                .unwrap_or(name_span);
            params.push(Param {
                name,
                port,
                ty,
                default,
                span: start.merge(end),
            });
            if !self.match_token(TokenType::Comma)? {
                break;
            }
        }
        Ok(params)
    }

    fn entity_def(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span; // 'entity'
        let (name, _) = self.intern_ident()?;
        let mut bases = Vec::new();
        if self.match_token(TokenType::LParen)? {
            if !self.check(TokenType::RParen) {
                loop {
                    bases.push(self.expression()?);
                    if !self.match_token(TokenType::Comma)? {
                        break;
                    }
                }
            }
            self.consume(TokenType::RParen, "')'")?;
        }

        let colon = self.consume(TokenType::Colon, "':'")?;
        self.consume(TokenType::Newline, "newline after ':'")?;
        if !self.check(TokenType::Indent) {
            return Err(ParserError::EmptyBlock {
                span: colon.span.into(),
            }
            .into());
        }
        self.advance()?;
        self.skip_newlines()?;

        let mut metas = Vec::new();
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut end = colon.span;

        while !self.check(TokenType::Dedent) && !self.check(TokenType::Eof) {
            match self.current.ty {
                TokenType::At => {
                    let at = self.advance()?.span;
                    let (meta_name, _) = self.intern_ident()?;
                    self.consume(TokenType::Colon, "':'")?;
                    let value = self.expression()?;
                    end = value.span;
                    metas.push(EntityMeta {
                        name: meta_name,
                        value,
                        span: at.merge(end),
                    });
                    self.end_statement()?;
                }
                TokenType::KwPass => {
                    end = self.advance()?.span;
                    self.end_statement()?;
                }
                TokenType::KwVirtual | TokenType::KwOverride | TokenType::KwStatic => {
                    let qualifier = match self.current.ty {
                        TokenType::KwVirtual => MethodQualifier::Virtual,
                        TokenType::KwOverride => MethodQualifier::Override,
                        _ => MethodQualifier::Static,
                    };
                    self.advance()?;
                    let def = self.func_def(qualifier)?;
                    end = def.span;
                    methods.push(def);
                }
                TokenType::KwDef | TokenType::KwInline | TokenType::KwConst => {
                    let def = self.func_def(MethodQualifier::None)?;
                    end = def.span;
                    methods.push(def);
                }
                TokenType::Identifier => {
                    let (fname, fspan) = self.intern_ident()?;
                    self.consume(TokenType::Colon, "':'")?;
                    let ty = self.expression()?;
                    end = ty.span;
                    fields.push(FieldDecl {
                        name: fname,
                        ty,
                        span: fspan.merge(end),
                    });
                    self.end_statement()?;
                }
                _ => return Err(self.expected_error("entity body item")),
            }
            self.skip_newlines()?;
        }
        if self.check(TokenType::Dedent) {
            self.advance()?;
        }

        let span = start.merge(end);
        Ok(Stmt {
            kind: StmtKind::EntityDef(EntityDef {
                name,
                bases,
                metas,
                fields,
                methods,
                span,
            }),
            span,
        })
    }

    fn struct_def(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span; // 'struct'
        let (name, _) = self.intern_ident()?;
        let mut bases = Vec::new();
        if self.match_token(TokenType::LParen)? {
            if !self.check(TokenType::RParen) {
                loop {
                    bases.push(self.expression()?);
                    if !self.match_token(TokenType::Comma)? {
                        break;
                    }
                }
            }
            self.consume(TokenType::RParen, "')'")?;
        }

        let colon = self.consume(TokenType::Colon, "':'")?;
        self.consume(TokenType::Newline, "newline after ':'")?;
        if !self.check(TokenType::Indent) {
            return Err(ParserError::EmptyBlock {
                span: colon.span.into(),
            }
            .into());
        }
        self.advance()?;
        self.skip_newlines()?;

        let mut fields = Vec::new();
        let mut end = colon.span;
        while !self.check(TokenType::Dedent) && !self.check(TokenType::Eof) {
            if self.check(TokenType::KwPass) {
                end = self.advance()?.span;
                self.end_statement()?;
            } else {
                let (fname, fspan) = self.intern_ident()?;
                self.consume(TokenType::Colon, "':'")?;
                let ty = self.expression()?;
                end = ty.span;
                fields.push(FieldDecl {
                    name: fname,
                    ty,
                    span: fspan.merge(end),
                });
                self.end_statement()?;
            }
            self.skip_newlines()?;
        }
        if self.check(TokenType::Dedent) {
            self.advance()?;
        }

        let span = start.merge(end);
        Ok(Stmt {
            kind: StmtKind::StructDef(StructDef {
                name,
                bases,
                fields,
                span,
            }),
            span,
        })
    }

    fn interface_def(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance()?.span; // 'interface'
        let first = self.consume(TokenType::Identifier, "interface path")?;
        let mut path = vec![first.lexeme.clone()];
        while self.match_token(TokenType::Dot)? {
            let seg = self.consume(TokenType::Identifier, "path segment")?;
            path.push(seg.lexeme.clone());
        }
        let body = self.block()?;
        let span = start.merge(body.span);
        Ok(Stmt {
            kind: StmtKind::InterfaceDef { path, body },
            span,
        })
    }

    // --- Expressions ---

    pub fn expression(&mut self) -> Result<Expr, CompileError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.and_expr()?;
        while self.check(TokenType::KwOr) {
            self.advance()?;
            let rhs = self.and_expr()?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.not_expr()?;
        while self.check(TokenType::KwAnd) {
            self.advance()?;
            let rhs = self.not_expr()?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, CompileError> {
        if self.check(TokenType::KwNot) {
            let start = self.advance()?.span;
            let operand = self.not_expr()?;
            let span = start.merge(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.current.ty {
                TokenType::EqEq => CompareOp::Eq,
                TokenType::BangEq => CompareOp::Ne,
                TokenType::Lt => CompareOp::Lt,
                TokenType::LtEq => CompareOp::Le,
                TokenType::Gt => CompareOp::Gt,
                TokenType::GtEq => CompareOp::Ge,
                _ => break,
            };
            self.advance()?;
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            return Ok(first);
        }
        let span = first.span.merge(rest.last().unwrap().1.span);
        Ok(Expr {
            kind: ExprKind::Compare {
                first: Box::new(first),
                rest,
            },
            span,
        })
    }

    fn arith(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.current.ty {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let rhs = self.term()?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.current.ty {
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                TokenType::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance()?;
            let rhs = self.unary()?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.current.ty {
            TokenType::Plus => Some(UnaryOp::Pos),
            TokenType::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance()?.span;
            let operand = self.unary()?;
            let span = start.merge(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            match self.current.ty {
                TokenType::Dot => {
                    self.advance()?;
                    let (name, name_span) = self.intern_ident()?;
                    let span = expr.span.merge(name_span);
                    expr = Expr {
                        kind: ExprKind::Attribute {
                            obj: Box::new(expr),
                            name,
                            name_span,
                        },
                        span,
                    };
                }
                TokenType::LParen => {
                    self.advance()?;
                    let (args, kwargs) = self.call_arguments()?;
                    let end = self.consume(TokenType::RParen, "')'")?.span;
                    let span = expr.span.merge(end);
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            kwargs,
                        },
                        span,
                    };
                }
                TokenType::LBracket => {
                    self.advance()?;
                    let index = self.expression()?;
                    let end = self.consume(TokenType::RBracket, "']'")?.span;
                    let span = expr.span.merge(end);
                    expr = Expr {
                        kind: ExprKind::Subscript {
                            obj: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(Symbol, Expr)>), CompileError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(Symbol, Expr)> = Vec::new();
        if self.check(TokenType::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            let expr = self.expression()?;
            if self.check(TokenType::Eq) {
                let ExprKind::Ident(name) = expr.kind else {
                    return Err(ParserError::InvalidAssignTarget {
                        span: expr.span.into(),
                    }
                    .into());
                };
                self.advance()?;
                let value = self.expression()?;
                kwargs.push((name, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.expected_error("keyword argument"));
                }
                args.push(expr);
            }
            if !self.match_token(TokenType::Comma)? {
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        match self.current.ty {
            TokenType::IntLiteral => {
                let tok = self.advance()?;
                Ok(Expr {
                    kind: ExprKind::Int(
                        crate::frontend::parse_int_literal(&tok.lexeme).unwrap_or_default(),
                    ),
                    span: tok.span,
                })
            }
            TokenType::FloatLiteral => {
                let tok = self.advance()?;
                Ok(Expr {
                    kind: ExprKind::Float(tok.lexeme.parse().unwrap_or_default()),
                    span: tok.span,
                })
            }
            TokenType::KwTrue | TokenType::KwFalse => {
                let tok = self.advance()?;
                Ok(Expr {
                    kind: ExprKind::Bool(tok.ty == TokenType::KwTrue),
                    span: tok.span,
                })
            }
            TokenType::KwNone => {
                let tok = self.advance()?;
                Ok(Expr {
                    kind: ExprKind::NoneLit,
                    span: tok.span,
                })
            }
            TokenType::KwSelf => {
                let tok = self.advance()?;
                Ok(Expr {
                    kind: ExprKind::SelfRef,
                    span: tok.span,
                })
            }
            TokenType::Identifier => {
                let (sym, span) = self.intern_ident()?;
                Ok(Expr {
                    kind: ExprKind::Ident(sym),
                    span,
                })
            }
            TokenType::StringLiteral => {
                let tok = self.advance()?;
                let text = process_text(segment_text(&tok.lexeme), tok.span)?;
                Ok(Expr {
                    kind: ExprKind::Str(vec![StrPart::Literal(text)]),
                    span: tok.span,
                })
            }
            TokenType::StringBegin => self.formatted_string(),
            TokenType::LParen => {
                self.advance()?;
                let expr = self.expression()?;
                self.consume(TokenType::RParen, "')'")?;
                Ok(expr)
            }
            TokenType::LBracket => {
                let start = self.advance()?.span;
                let mut items = Vec::new();
                if !self.check(TokenType::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if !self.match_token(TokenType::Comma)? {
                            break;
                        }
                        if self.check(TokenType::RBracket) {
                            break;
                        }
                    }
                }
                let end = self.consume(TokenType::RBracket, "']'")?.span;
                Ok(Expr {
                    kind: ExprKind::List(items),
                    span: start.merge(end),
                })
            }
            TokenType::LBrace => {
                let start = self.advance()?.span;
                let mut entries = Vec::new();
                if !self.check(TokenType::RBrace) {
                    loop {
                        let key = self.expression()?;
                        self.consume(TokenType::Colon, "':'")?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if !self.match_token(TokenType::Comma)? {
                            break;
                        }
                        if self.check(TokenType::RBrace) {
                            break;
                        }
                    }
                }
                let end = self.consume(TokenType::RBrace, "'}'")?.span;
                Ok(Expr {
                    kind: ExprKind::Map(entries),
                    span: start.merge(end),
                })
            }
            TokenType::Pipe => self.score_literal(),
            _ => Err(ParserError::UnexpectedToken {
                found: self.current.ty.as_str().to_string(),
                span: self.current.span.into(),
            }
            .into()),
        }
    }

    /// `|"target": "objective"|`
    fn score_literal(&mut self) -> Result<Expr, CompileError> {
        let start = self.advance()?.span; // '|'
        let target_tok = self.consume(TokenType::StringLiteral, "selector string")?;
        let target = process_text(segment_text(&target_tok.lexeme), target_tok.span)?;
        self.consume(TokenType::Colon, "':'")?;
        let obj_tok = self.consume(TokenType::StringLiteral, "objective string")?;
        let objective = process_text(segment_text(&obj_tok.lexeme), obj_tok.span)?;
        let end = self.consume(TokenType::Pipe, "'|'")?.span;
        Ok(Expr {
            kind: ExprKind::ScoreLit { target, objective },
            span: start.merge(end),
        })
    }

    fn formatted_string(&mut self) -> Result<Expr, CompileError> {
        let begin = self.advance()?; // StringBegin
        let mut parts = Vec::new();
        let text = process_text(segment_text(&begin.lexeme), begin.span)?;
        if !text.is_empty() {
            parts.push(StrPart::Literal(text));
        }
        let end_span;
        loop {
            if self.check(TokenType::StringMid) || self.check(TokenType::StringEnd) {
                return Err(ParserError::InvalidFExpr {
                    span: self.current.span.into(),
                }
                .into());
            }
            let hole = self.expression()?;
            parts.push(StrPart::Expr(Box::new(hole)));
            if self.check(TokenType::StringMid) {
                let mid = self.advance()?;
                let text = process_text(segment_text(&mid.lexeme), mid.span)?;
                if !text.is_empty() {
                    parts.push(StrPart::Literal(text));
                }
            } else {
                let end = self.consume(TokenType::StringEnd, "end of string")?;
                let text = process_text(segment_text(&end.lexeme), end.span)?;
                if !text.is_empty() {
                    parts.push(StrPart::Literal(text));
                }
                end_span = end.span;
                break;
            }
        }
        Ok(Expr {
            kind: ExprKind::Str(parts),
            span: begin.span.merge(end_span),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        let mut parser = Parser::new(source).expect("lexer setup");
        parser.parse_program().expect("parse error")
    }

    fn parse_err(source: &str) -> CompileError {
        let mut parser = match Parser::new(source) {
            Ok(p) => p,
            Err(e) => return e,
        };
        parser.parse_program().expect_err("expected parse error")
    }

    #[test]
    fn parse_auto_decl() {
        let prog = parse("x := 1 + 2\n");
        assert_eq!(prog.stmts.len(), 1);
        assert!(matches!(prog.stmts[0].kind, StmtKind::AutoDecl { .. }));
    }

    #[test]
    fn parse_typed_decl() {
        let prog = parse("x: int = 5\n");
        match &prog.stmts[0].kind {
            StmtKind::VarDecl { ty, init, .. } => {
                assert!(matches!(ty.kind, ExprKind::Ident(_)));
                assert!(init.is_some());
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn parse_const_and_ref_decls() {
        let prog = parse("const k = 3\n&r = k\n");
        assert!(matches!(prog.stmts[0].kind, StmtKind::ConstDecl { .. }));
        assert!(matches!(prog.stmts[1].kind, StmtKind::RefDecl { .. }));
    }

    #[test]
    fn parse_if_elif_else() {
        let src = "if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n";
        let prog = parse(src);
        match &prog.stmts[0].kind {
            StmtKind::If { arms, orelse } => {
                assert_eq!(arms.len(), 2);
                assert!(orelse.is_some());
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn parse_empty_block_rejected() {
        let err = parse_err("if a:\nb := 1\n");
        assert!(matches!(
            err,
            CompileError::Parser(ParserError::EmptyBlock { .. })
        ));
    }

    #[test]
    fn parse_compare_chain() {
        let prog = parse("c := 1 < x <= 10\n");
        match &prog.stmts[0].kind {
            StmtKind::AutoDecl { init, .. } => match &init.kind {
                ExprKind::Compare { rest, .. } => assert_eq!(rest.len(), 2),
                other => panic!("expected Compare, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_function_def_with_ports() {
        let src = "def f(a: int, &b: int, const c: int = 3) -> int:\n    result a\n";
        let prog = parse(src);
        match &prog.stmts[0].kind {
            StmtKind::FuncDef(def) => {
                assert_eq!(def.flavor, FuncFlavor::Runtime);
                assert_eq!(def.params.len(), 3);
                assert_eq!(def.params[0].port, ParamPort::ByValue);
                assert_eq!(def.params[1].port, ParamPort::ByRef);
                assert_eq!(def.params[2].port, ParamPort::Const);
                assert!(def.params[2].default.is_some());
                assert!(def.result_ty.is_some());
            }
            other => panic!("expected FuncDef, got {other:?}"),
        }
    }

    #[test]
    fn parse_inline_and_const_flavors() {
        let prog = parse("inline def f():\n    pass\nconst def g():\n    result 1\n");
        match (&prog.stmts[0].kind, &prog.stmts[1].kind) {
            (StmtKind::FuncDef(f), StmtKind::FuncDef(g)) => {
                assert_eq!(f.flavor, FuncFlavor::Inline);
                assert_eq!(g.flavor, FuncFlavor::Const);
            }
            _ => panic!("expected two FuncDefs"),
        }
    }

    #[test]
    fn parse_non_default_after_default() {
        let err = parse_err("def f(a = 1, b):\n    pass\n");
        assert!(matches!(
            err,
            CompileError::Parser(ParserError::NonDefaultAfterDefault { .. })
        ));
    }

    #[test]
    fn parse_entity_with_bases_and_members() {
        let src = "entity D(B, C):\n    @type: \"minecraft:cow\"\n    hp: int\n    virtual def hit():\n        pass\n";
        let prog = parse(src);
        match &prog.stmts[0].kind {
            StmtKind::EntityDef(def) => {
                assert_eq!(def.bases.len(), 2);
                assert_eq!(def.metas.len(), 1);
                assert_eq!(def.fields.len(), 1);
                assert_eq!(def.methods.len(), 1);
                assert_eq!(def.methods[0].qualifier, MethodQualifier::Virtual);
            }
            other => panic!("expected EntityDef, got {other:?}"),
        }
    }

    #[test]
    fn parse_struct_def() {
        let prog = parse("struct P:\n    x: int\n    y: int\n");
        match &prog.stmts[0].kind {
            StmtKind::StructDef(def) => assert_eq!(def.fields.len(), 2),
            other => panic!("expected StructDef, got {other:?}"),
        }
    }

    #[test]
    fn parse_interface_path() {
        let prog = parse("interface game.start:\n    pass\n");
        match &prog.stmts[0].kind {
            StmtKind::InterfaceDef { path, .. } => {
                assert_eq!(path, &vec!["game".to_string(), "start".to_string()]);
            }
            other => panic!("expected InterfaceDef, got {other:?}"),
        }
    }

    #[test]
    fn parse_command_segments() {
        let prog = parse("/say hello ${who} and ${other}\n");
        match &prog.stmts[0].kind {
            StmtKind::Command(segments) => {
                assert_eq!(segments.len(), 4);
                assert!(matches!(segments[0], CommandSegment::Text(ref t) if t == "say hello "));
                assert!(matches!(segments[1], CommandSegment::Interp { .. }));
                assert!(matches!(segments[2], CommandSegment::Text(ref t) if t == " and "));
                assert!(matches!(segments[3], CommandSegment::Interp { .. }));
            }
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn parse_formatted_string() {
        let prog = parse("s := \"a={x} b\"\n");
        match &prog.stmts[0].kind {
            StmtKind::AutoDecl { init, .. } => match &init.kind {
                ExprKind::Str(parts) => {
                    assert_eq!(parts.len(), 3);
                    assert!(matches!(parts[1], StrPart::Expr(_)));
                }
                other => panic!("expected Str, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_empty_hole_rejected() {
        let err = parse_err("s := \"a={}\"\n");
        assert!(matches!(
            err,
            CompileError::Parser(ParserError::InvalidFExpr { .. })
        ));
    }

    #[test]
    fn parse_call_with_kwargs() {
        let prog = parse("f(1, 2, delta=3)\n");
        match &prog.stmts[0].kind {
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Call { args, kwargs, .. } => {
                    assert_eq!(args.len(), 2);
                    assert_eq!(kwargs.len(), 1);
                }
                other => panic!("expected Call, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_positional_after_keyword_rejected() {
        let err = parse_err("f(a=1, 2)\n");
        assert!(matches!(err, CompileError::Parser(_)));
    }

    #[test]
    fn parse_score_literal() {
        let prog = parse("x := |\"@p\": \"data\"|\n");
        match &prog.stmts[0].kind {
            StmtKind::AutoDecl { init, .. } => match &init.kind {
                ExprKind::ScoreLit { target, objective } => {
                    assert_eq!(target, "@p");
                    assert_eq!(objective, "data");
                }
                other => panic!("expected ScoreLit, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_assign_to_literal_rejected() {
        let err = parse_err("3 = x\n");
        assert!(matches!(
            err,
            CompileError::Parser(ParserError::InvalidAssignTarget { .. })
        ));
    }

    #[test]
    fn parse_new_call_statement() {
        let prog = parse("def new():\n    new()\n");
        match &prog.stmts[0].kind {
            StmtKind::FuncDef(def) => {
                assert!(matches!(def.body.stmts[0].kind, StmtKind::NewCall { .. }));
            }
            other => panic!("expected FuncDef, got {other:?}"),
        }
    }

    #[test]
    fn parse_subscript_and_attribute() {
        let prog = parse("v := colors[c].len\n");
        match &prog.stmts[0].kind {
            StmtKind::AutoDecl { init, .. } => {
                assert!(matches!(init.kind, ExprKind::Attribute { .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_import_dotted() {
        let prog = parse("import a.b\n");
        match &prog.stmts[0].kind {
            StmtKind::Import { path } => assert_eq!(path.len(), 2),
            other => panic!("expected Import, got {other:?}"),
        }
    }
}
