//! Recursive-descent parser for unit scripts.

use super::ast::{
    AssignOp, BinaryOp, Block, Expr, ExprKind, FnDecl, ForIter, Item, Member, Module, Span, Stmt,
    StmtKind, UnaryOp, UnitDecl,
};
use super::lexer::{Keyword, LexError, Lexer, Punct, Tok, Token};
use crate::error::{LoadError, Position};
use crate::params::ParamSpec;

/// Maximum nesting of blocks and parenthesised expressions.
const MAX_NESTING: usize = 64;

struct ParseError {
    offset: usize,
    message: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            offset: e.offset,
            message: e.message,
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// Parses module source text into a syntax tree.
pub fn parse_module(src: &str) -> Result<Module, LoadError> {
    let mut parser = Parser::new(src);
    parser.parse_module().map_err(|e| LoadError::Syntax {
        pos: Position::at(src, e.offset),
        message: e.message,
    })
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer::new(src),
            peeked: None,
            depth: 0,
        }
    }

    fn peek(&mut self) -> PResult<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn bump(&mut self) -> PResult<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => Ok(self.lexer.next_token()?),
        }
    }

    fn error<T>(&self, span: Span, message: impl Into<String>) -> PResult<T> {
        Err(ParseError {
            offset: span.start,
            message: message.into(),
        })
    }

    fn unexpected<T>(&mut self, expected: &str) -> PResult<T> {
        let token = self.bump()?;
        self.error(token.span, format!("expected {expected}, found {}", token.tok))
    }

    fn at_punct(&mut self, punct: Punct) -> PResult<bool> {
        Ok(self.peek()?.tok == Tok::Punct(punct))
    }

    fn at_keyword(&mut self, keyword: Keyword) -> PResult<bool> {
        Ok(self.peek()?.tok == Tok::Keyword(keyword))
    }

    fn eat_punct(&mut self, punct: Punct) -> PResult<bool> {
        if self.at_punct(punct)? {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> PResult<bool> {
        if self.at_keyword(keyword)? {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> PResult<Span> {
        if self.at_punct(punct)? {
            Ok(self.bump()?.span)
        } else {
            self.unexpected(&format!("'{}'", punct.as_str()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> PResult<Span> {
        if self.at_keyword(keyword)? {
            Ok(self.bump()?.span)
        } else {
            self.unexpected(&format!("'{}'", keyword.as_str()))
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Span)> {
        if matches!(self.peek()?.tok, Tok::Ident(_)) {
            let token = self.bump()?;
            if let Tok::Ident(name) = token.tok {
                return Ok((name, token.span));
            }
        }
        self.unexpected("an identifier")
    }

    fn expect_string(&mut self) -> PResult<(String, Span)> {
        if matches!(self.peek()?.tok, Tok::Str(_)) {
            let token = self.bump()?;
            if let Tok::Str(s) = token.tok {
                return Ok((s, token.span));
            }
        }
        self.unexpected("a string")
    }

    fn enter(&mut self, span: Span) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return self.error(span, "nesting too deep");
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // --- Items ---

    fn parse_module(&mut self) -> PResult<Module> {
        let mut items = Vec::new();
        loop {
            let token = self.peek()?.clone();
            match token.tok {
                Tok::Eof => return Ok(Module { items }),
                Tok::Keyword(Keyword::Unit) => items.push(Item::Unit(self.parse_unit()?)),
                Tok::Keyword(Keyword::Register) => {
                    self.bump()?;
                    let (name, _) = self.expect_string()?;
                    let (class, span) = self.expect_ident()?;
                    self.eat_punct(Punct::Semi)?;
                    items.push(Item::Register { name, class, span });
                }
                _ => return self.unexpected("'unit' or 'register'"),
            }
        }
    }

    fn parse_unit(&mut self) -> PResult<UnitDecl> {
        self.expect_keyword(Keyword::Unit)?;
        let (name, span) = self.expect_ident()?;
        self.expect_punct(Punct::LBrace)?;
        let mut members = Vec::new();
        while !self.eat_punct(Punct::RBrace)? {
            members.push(self.parse_member()?);
            self.eat_punct(Punct::Semi)?;
        }
        Ok(UnitDecl {
            name,
            span,
            members,
        })
    }

    fn parse_member(&mut self) -> PResult<Member> {
        let token = self.bump()?;
        match token.tok {
            Tok::Ident(ref word) if word == "parameters" => {
                let (specs, span) = self.lexer.take_json::<Vec<ParamSpec>>()?;
                Ok(Member::Parameters { specs, span })
            }
            Tok::Keyword(Keyword::State) => {
                let (name, span) = self.expect_ident()?;
                self.expect_punct(Punct::Assign)?;
                let init = self.parse_expr()?;
                Ok(Member::State { name, init, span })
            }
            Tok::Keyword(Keyword::On) => {
                let (message, span) = self.expect_string()?;
                let body = self.parse_block()?;
                Ok(Member::Handler {
                    message,
                    body,
                    span,
                })
            }
            Tok::Keyword(Keyword::Process) => {
                let body = self.parse_block()?;
                Ok(Member::Process {
                    body,
                    span: token.span,
                })
            }
            Tok::Keyword(Keyword::Fn) => {
                let (name, span) = self.expect_ident()?;
                self.expect_punct(Punct::LParen)?;
                let mut params = Vec::new();
                if !self.eat_punct(Punct::RParen)? {
                    loop {
                        params.push(self.expect_ident()?.0);
                        if self.eat_punct(Punct::RParen)? {
                            break;
                        }
                        self.expect_punct(Punct::Comma)?;
                    }
                }
                let body = self.parse_block()?;
                Ok(Member::Function(FnDecl {
                    name,
                    params,
                    body,
                    span,
                }))
            }
            other => self.error(
                token.span,
                format!("expected 'parameters', 'state', 'on', 'process' or 'fn', found {other}"),
            ),
        }
    }

    // --- Statements ---

    fn parse_block(&mut self) -> PResult<Block> {
        let open = self.expect_punct(Punct::LBrace)?;
        self.enter(open)?;
        let mut stmts = Vec::new();
        while !self.eat_punct(Punct::RBrace)? {
            if self.peek()?.tok == Tok::Eof {
                return self.error(open, "unclosed '{'");
            }
            stmts.push(self.parse_stmt()?);
            self.eat_punct(Punct::Semi)?;
        }
        self.leave();
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let next = self.peek()?.clone();
        let kind = match next.tok {
            Tok::Keyword(Keyword::Let | Keyword::Const) => {
                let constant = self.bump()?.tok == Tok::Keyword(Keyword::Const);
                let (name, _) = self.expect_ident()?;
                self.expect_punct(Punct::Assign)?;
                let value = self.parse_expr()?;
                StmtKind::Let {
                    name,
                    value,
                    constant,
                }
            }
            Tok::Keyword(Keyword::If) => self.parse_if()?,
            Tok::Keyword(Keyword::While) => {
                self.bump()?;
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                StmtKind::While { cond, body }
            }
            Tok::Keyword(Keyword::For) => {
                self.bump()?;
                let (var, _) = self.expect_ident()?;
                self.expect_keyword(Keyword::In)?;
                let first = self.parse_expr()?;
                let iter = if self.eat_punct(Punct::DotDot)? {
                    ForIter::Range(first, self.parse_expr()?)
                } else {
                    ForIter::Each(first)
                };
                let body = self.parse_block()?;
                StmtKind::For { var, iter, body }
            }
            Tok::Keyword(Keyword::Try) => {
                self.bump()?;
                let body = self.parse_block()?;
                self.expect_keyword(Keyword::Catch)?;
                let (binding, _) = self.expect_ident()?;
                let handler = self.parse_block()?;
                StmtKind::Try {
                    body,
                    binding,
                    handler,
                }
            }
            Tok::Keyword(Keyword::Return) => {
                self.bump()?;
                let ends = matches!(
                    self.peek()?.tok,
                    Tok::Punct(Punct::Semi | Punct::RBrace) | Tok::Eof
                );
                StmtKind::Return(if ends { None } else { Some(self.parse_expr()?) })
            }
            Tok::Keyword(Keyword::Break) => {
                self.bump()?;
                StmtKind::Break
            }
            Tok::Keyword(Keyword::Continue) => {
                self.bump()?;
                StmtKind::Continue
            }
            _ => {
                let target = self.parse_expr()?;
                let op = match self.peek()?.tok {
                    Tok::Punct(Punct::Assign) => Some(AssignOp::Set),
                    Tok::Punct(Punct::PlusAssign) => Some(AssignOp::Add),
                    Tok::Punct(Punct::MinusAssign) => Some(AssignOp::Sub),
                    Tok::Punct(Punct::StarAssign) => Some(AssignOp::Mul),
                    Tok::Punct(Punct::SlashAssign) => Some(AssignOp::Div),
                    _ => None,
                };
                if let Some(op) = op {
                    self.bump()?;
                    let value = self.parse_expr()?;
                    StmtKind::Assign { target, op, value }
                } else if self.eat_punct(Punct::PlusPlus)? {
                    StmtKind::Step { target, delta: 1.0 }
                } else if self.eat_punct(Punct::MinusMinus)? {
                    StmtKind::Step {
                        target,
                        delta: -1.0,
                    }
                } else {
                    StmtKind::Expr(target)
                }
            }
        };
        Ok(Stmt {
            kind,
            span: next.span,
        })
    }

    fn parse_if(&mut self) -> PResult<StmtKind> {
        self.expect_keyword(Keyword::If)?;
        let cond = self.parse_expr()?;
        let then = self.parse_block()?;
        let otherwise = if self.eat_keyword(Keyword::Else)? {
            if self.at_keyword(Keyword::If)? {
                let start = self.peek()?.span;
                let nested = self.parse_if()?;
                Some(Block {
                    stmts: vec![Stmt {
                        kind: nested,
                        span: start,
                    }],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    // --- Expressions ---

    fn parse_expr(&mut self) -> PResult<Expr> {
        let cond = self.parse_or()?;
        if self.eat_punct(Punct::Question)? {
            let then = self.parse_expr()?;
            self.expect_punct(Punct::Colon)?;
            let otherwise = self.parse_expr()?;
            let span = cond.span.to(otherwise.span);
            return Ok(Expr {
                kind: ExprKind::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)),
                span,
            });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_punct(Punct::OrOr)? {
            let rhs = self.parse_and()?;
            lhs = logical(false, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat_punct(Punct::AndAnd)? {
            let rhs = self.parse_equality()?;
            lhs = logical(true, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek()?.tok {
                Tok::Punct(Punct::EqEq) => BinaryOp::Eq,
                Tok::Punct(Punct::NotEq) => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.bump()?;
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek()?.tok {
                Tok::Punct(Punct::Lt) => BinaryOp::Lt,
                Tok::Punct(Punct::Le) => BinaryOp::Le,
                Tok::Punct(Punct::Gt) => BinaryOp::Gt,
                Tok::Punct(Punct::Ge) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.bump()?;
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek()?.tok {
                Tok::Punct(Punct::Plus) => BinaryOp::Add,
                Tok::Punct(Punct::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek()?.tok {
                Tok::Punct(Punct::Star) => BinaryOp::Mul,
                Tok::Punct(Punct::Slash) => BinaryOp::Div,
                Tok::Punct(Punct::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek()?.tok {
            Tok::Punct(Punct::Minus) => UnaryOp::Neg,
            Tok::Punct(Punct::Bang) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let start = self.bump()?.span;
        self.enter(start)?;
        let operand = self.parse_unary()?;
        self.leave();
        let span = start.to(operand.span);
        Ok(Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            span,
        })
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at_punct(Punct::LParen)? {
                let open = self.bump()?.span;
                let ExprKind::Ident(name) = &expr.kind else {
                    return self.error(open, "only named functions can be called");
                };
                let name = name.clone();
                let mut args = Vec::new();
                let close = loop {
                    if self.at_punct(Punct::RParen)? {
                        break self.bump()?.span;
                    }
                    args.push(self.parse_expr()?);
                    if !self.at_punct(Punct::RParen)? {
                        self.expect_punct(Punct::Comma)?;
                    }
                };
                expr = Expr {
                    kind: ExprKind::Call(name, args),
                    span: expr.span.to(close),
                };
            } else if self.eat_punct(Punct::LBracket)? {
                let index = self.parse_expr()?;
                let close = self.expect_punct(Punct::RBracket)?;
                expr = Expr {
                    span: expr.span.to(close),
                    kind: ExprKind::Index(Box::new(expr), Box::new(index)),
                };
            } else if self.eat_punct(Punct::Dot)? {
                let token = self.bump()?;
                let name = match token.tok {
                    Tok::Ident(name) => name,
                    Tok::Keyword(k) => k.as_str().to_string(),
                    other => {
                        return self.error(token.span, format!("expected a member name, found {other}"));
                    }
                };
                expr = Expr {
                    span: expr.span.to(token.span),
                    kind: ExprKind::Member(Box::new(expr), name),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.bump()?;
        let kind = match token.tok {
            Tok::Number(n) => ExprKind::Number(n),
            Tok::Keyword(Keyword::True) => ExprKind::Bool(true),
            Tok::Keyword(Keyword::False) => ExprKind::Bool(false),
            Tok::Ident(name) => ExprKind::Ident(name),
            Tok::Punct(Punct::LParen) => {
                self.enter(token.span)?;
                let inner = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                self.leave();
                return Ok(inner);
            }
            other => {
                return self.error(token.span, format!("expected an expression, found {other}"));
            }
        };
        Ok(Expr {
            kind,
            span: token.span,
        })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.to(rhs.span);
    Expr {
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
        span,
    }
}

fn logical(and: bool, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.to(rhs.span);
    Expr {
        kind: ExprKind::Logical(and, Box::new(lhs), Box::new(rhs)),
        span,
    }
}
