use super::lexer::tokenize;
use super::types::{
    BinOp, BoolOp, CmpOp, Expr, ExprKind, Span, Stmt, StmtKind, SyntaxError, Token, TokenKind,
    UnaryOp,
};

/// Parse a whole module into its top-level statements.
pub fn parse(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, SyntaxError>;

impl Parser {
    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        match self.eat(kind) {
            Some(tok) => Ok(tok),
            None => Err(SyntaxError::at(
                self.peek().span,
                format!("expected {}", what),
            )),
        }
    }

    fn invalid(&self) -> SyntaxError {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Indent => SyntaxError {
                kind: super::types::SyntaxErrorKind::Indentation,
                ..SyntaxError::at(tok.span, "unexpected indent")
            },
            _ => SyntaxError::at(tok.span, "invalid syntax"),
        }
    }

    fn module(&mut self) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::Newline).is_some() {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        match self.peek().kind {
            TokenKind::KwIf => self.if_statement(),
            TokenKind::KwWhile => self.while_statement(),
            TokenKind::KwDef => self.def_statement(),
            _ => {
                let stmt = self.simple_statement()?;
                if self.eat(&TokenKind::Newline).is_none() && !self.at(&TokenKind::Eof) {
                    return Err(self.invalid());
                }
                Ok(stmt)
            }
        }
    }

    fn simple_statement(&mut self) -> PResult<Stmt> {
        let start = self.peek().span;
        match self.peek().kind {
            TokenKind::KwPass => {
                self.bump();
                Ok(Stmt {
                    kind: StmtKind::Pass,
                    span: start,
                })
            }
            TokenKind::KwReturn => {
                self.bump();
                if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                    return Ok(Stmt {
                        kind: StmtKind::Return(None),
                        span: start,
                    });
                }
                let value = self.expression()?;
                let span = start.to(value.span);
                Ok(Stmt {
                    kind: StmtKind::Return(Some(value)),
                    span,
                })
            }
            TokenKind::Indent => Err(self.invalid()),
            _ => {
                let expr = self.expression()?;
                if self.at(&TokenKind::Assign) {
                    let assign = self.bump();
                    let ExprKind::Name(target) = expr.kind else {
                        return Err(SyntaxError::at(
                            expr.span.to(assign.span),
                            "cannot assign to expression here",
                        ));
                    };
                    let value = self.expression()?;
                    let span = expr.span.to(value.span);
                    return Ok(Stmt {
                        kind: StmtKind::Assign { target, value },
                        span,
                    });
                }
                let span = expr.span;
                Ok(Stmt {
                    kind: StmtKind::Expr(expr),
                    span,
                })
            }
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon, "':'")?;
        if self.eat(&TokenKind::Newline).is_none() {
            // Single-line suite: `while x: x = x - 1`
            let stmt = self.simple_statement()?;
            if self.eat(&TokenKind::Newline).is_none() && !self.at(&TokenKind::Eof) {
                return Err(self.invalid());
            }
            return Ok(vec![stmt]);
        }
        if self.eat(&TokenKind::Indent).is_none() {
            let tok = self.peek();
            return Err(SyntaxError {
                kind: super::types::SyntaxErrorKind::Indentation,
                ..SyntaxError::at(tok.span, "expected an indented block")
            });
        }
        let mut body = Vec::new();
        while self.eat(&TokenKind::Dedent).is_none() {
            if self.at(&TokenKind::Eof) {
                break;
            }
            if self.eat(&TokenKind::Newline).is_some() {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let start = self.bump().span;
        let test = self.expression()?;
        let header = start.to(test.span);
        let body = self.block()?;
        let mut branches = vec![(test, header, body)];
        let mut orelse = Vec::new();
        loop {
            if let Some(tok) = self.eat(&TokenKind::KwElif) {
                let test = self.expression()?;
                let span = tok.span.to(test.span);
                let body = self.block()?;
                branches.push((test, span, body));
            } else if self.eat(&TokenKind::KwElse).is_some() {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            span: header,
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        let start = self.bump().span;
        let test = self.expression()?;
        let span = start.to(test.span);
        let body = self.block()?;
        Ok(Stmt {
            kind: StmtKind::While { test, body },
            span,
        })
    }

    fn def_statement(&mut self) -> PResult<Stmt> {
        let start = self.bump().span;
        let name_tok = self.bump();
        let TokenKind::Name(name) = name_tok.kind else {
            return Err(SyntaxError::at(name_tok.span, "invalid syntax"));
        };
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let tok = self.bump();
                let TokenKind::Name(param) = tok.kind else {
                    return Err(SyntaxError::at(tok.span, "invalid syntax"));
                };
                if params.contains(&param) {
                    return Err(SyntaxError::at(
                        tok.span,
                        format!("duplicate argument '{}' in function definition", param),
                    ));
                }
                params.push(param);
                if self.eat(&TokenKind::Comma).is_none() || self.at(&TokenKind::RParen) {
                    break;
                }
            }
        }
        let close = self.expect(&TokenKind::RParen, "')'")?;
        let span = start.to(close.span);
        let body = self.block()?;
        Ok(Stmt {
            kind: StmtKind::Def { name, params, body },
            span,
        })
    }

    fn expression(&mut self) -> PResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::KwOr).is_some() {
            let right = self.and_expr()?;
            left = bool_op(BoolOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::KwAnd).is_some() {
            let right = self.not_expr()?;
            left = bool_op(BoolOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if let Some(tok) = self.eat(&TokenKind::KwNot) {
            let operand = self.not_expr()?;
            let span = tok.span.to(operand.span);
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

    fn comparison(&mut self) -> PResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::LtEq => CmpOp::LtEq,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::GtEq => CmpOp::GtEq,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.additive()?;
            let span = left.span.to(right.span);
            left = Expr {
                kind: ExprKind::Compare {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::SlashSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        match self.peek().kind {
            TokenKind::Minus => {
                let tok = self.bump();
                let operand = self.unary()?;
                let span = tok.span.to(operand.span);
                Ok(Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    span,
                })
            }
            TokenKind::Plus => {
                self.bump();
                self.unary()
            }
            _ => self.call(),
        }
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        while self.at(&TokenKind::LParen) {
            self.bump();
            let mut args = Vec::new();
            if !self.at(&TokenKind::RParen) {
                loop {
                    args.push(self.expression()?);
                    if self.eat(&TokenKind::Comma).is_none() || self.at(&TokenKind::RParen) {
                        break;
                    }
                }
            }
            let close = self.expect(&TokenKind::RParen, "')'")?;
            let span = expr.span.to(close.span);
            expr = Expr {
                kind: ExprKind::Call {
                    func: Box::new(expr),
                    args,
                },
                span,
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        let kind = match tok.kind {
            TokenKind::Int(v) => ExprKind::Int(v),
            TokenKind::Float(v) => ExprKind::Float(v),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::KwTrue => ExprKind::Bool(true),
            TokenKind::KwFalse => ExprKind::Bool(false),
            TokenKind::KwNone => ExprKind::None,
            TokenKind::Name(n) => ExprKind::Name(n),
            TokenKind::LParen => {
                self.bump();
                let inner = self.expression()?;
                let close = self.expect(&TokenKind::RParen, "')'")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: tok.span.to(close.span),
                });
            }
            _ => return Err(self.invalid()),
        };
        self.bump();
        Ok(Expr {
            kind,
            span: tok.span,
        })
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span: Span = left.span.to(right.span);
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}

fn bool_op(op: BoolOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.to(right.span);
    Expr {
        kind: ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::SyntaxErrorKind;

    #[test]
    fn test_parse_assignment_and_call() {
        let stmts = parse("x = 1\nprint(x)\n").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0].kind, StmtKind::Assign { target, .. } if target == "x"));
        assert_eq!(stmts[0].span, Span::new(1, 0, 1, 5));
        match &stmts[1].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Call { args, .. },
                span,
            }) => {
                assert_eq!(args.len(), 1);
                assert_eq!(*span, Span::new(2, 0, 2, 8));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_binary_span_covers_operands() {
        let stmts = parse("y = x / 0\n").unwrap();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(value.span, Span::new(1, 4, 1, 9));
    }

    #[test]
    fn test_precedence() {
        let stmts = parse("a = 1 + 2 * 3\n").unwrap();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        match &value.kind {
            ExprKind::Binary { op, right, .. } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_if_elif_else_blocks() {
        let src = "if a:\n    b = 1\nelif c:\n    b = 2\nelse:\n    b = 3\n";
        let stmts = parse(src).unwrap();
        assert_eq!(stmts.len(), 1);
        let StmtKind::If { branches, orelse } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
        assert_eq!(stmts[0].span, Span::new(1, 0, 1, 4));
    }

    #[test]
    fn test_def_with_params() {
        let stmts = parse("def add(a, b):\n    return a + b\n").unwrap();
        let StmtKind::Def { name, params, body } = &stmts[0].kind else {
            panic!("expected def");
        };
        assert_eq!(name, "add");
        assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_missing_block_is_indentation_error() {
        let err = parse("while True:\nx = 1\n").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::Indentation);
        assert_eq!(err.message, "expected an indented block");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_unexpected_indent() {
        let err = parse("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::Indentation);
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn test_invalid_syntax_position() {
        let err = parse("x = = 2\n").unwrap_err();
        assert_eq!(err.message, "invalid syntax");
        assert_eq!(err.line, 1);
        assert_eq!(err.column, Some(5));
    }

    #[test]
    fn test_assign_to_call_rejected() {
        let err = parse("f() = 3\n").unwrap_err();
        assert_eq!(err.message, "cannot assign to expression here");
    }
}
