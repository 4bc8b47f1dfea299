//! Lexer and parser for the leaven language
//!
//! The surface syntax is expression-oriented: a program is a sequence of
//! statements (`def`, `module`, `import`) and expressions. Operators are
//! not built in; `operator('infix, 6, '+)` declarations extend the
//! parser's own syntax table while the program is being read.

mod ast;
mod lexer;
mod parser;
mod syntax;


pub use ast::{Binding, Expr, Ident, Node, Param, Stmt, Tree};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{read, read_with};
pub use syntax::Syntax;
