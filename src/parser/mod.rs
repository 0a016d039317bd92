mod grammar;
mod lexer;
mod types;

pub use grammar::parse;
pub use lexer::tokenize;
pub use types::{
    BinOp, BoolOp, CmpOp, Expr, ExprKind, Span, Stmt, StmtKind, SyntaxError, SyntaxErrorKind,
    Token, TokenKind, UnaryOp,
};
