//! Abstract syntax tree
//!
//! A program is a flat sequence of statements and expressions. Nothing
//! here is typed: annotations are carried as plain identifiers for the
//! downstream checker.

use leaven_error::Loc;

/// A parsed program: statements and expressions in source order.
pub type Tree = Vec<Node>;

/// One top-level node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Stmt(Stmt),
    Expr(Expr),
}

/// An identifier with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub loc: Loc,
}

/// A lambda parameter: a name with an optional type annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Option<Ident>,
}

/// A `name = expr` binding inside a `let`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `def name = expr` or `def name(params) = expr`.
    Def { name: Ident, value: Expr },
    /// `module name`.
    Module { name: Ident },
    /// `import name`.
    Import { name: Ident },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal, kept as its raw lexeme.
    Num { lexeme: String, loc: Loc },
    /// A `%{ … }` string literal.
    Str { value: String, loc: Loc },
    /// A `'name` symbol.
    Symbol { name: String, loc: Loc },
    /// An identifier. Reserved words like `true` are plain identifiers
    /// until lowering.
    Id(Ident),
    /// A prefix or postfix operator application.
    Uniop { op: Ident, sub: Box<Expr> },
    /// An infix operator application.
    Binop { op: Ident, lhs: Box<Expr>, rhs: Box<Expr> },
    /// A call: `f(a, b)`.
    App { func: Box<Expr>, args: Vec<Expr>, loc: Loc },
    /// `func (p1, p2) = body`.
    Lambda { params: Vec<Param>, body: Box<Expr>, loc: Loc },
    /// `if c then p else f`; all three branches are required.
    Cond { cond: Box<Expr>, pass: Box<Expr>, fail: Box<Expr>, loc: Loc },
    /// `let b1 b2 … in body`; at least one binding.
    Let { bindings: Vec<Binding>, body: Box<Expr>, loc: Loc },
    /// `begin e1 e2 … end`; at least one expression.
    Begin { exprs: Vec<Expr>, loc: Loc },
}

impl Expr {
    /// Where this expression starts.
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Num { loc, .. }
            | Self::Str { loc, .. }
            | Self::Symbol { loc, .. }
            | Self::App { loc, .. }
            | Self::Lambda { loc, .. }
            | Self::Cond { loc, .. }
            | Self::Let { loc, .. }
            | Self::Begin { loc, .. } => loc,
            Self::Id(ident) => &ident.loc,
            Self::Uniop { op, .. } => &op.loc,
            Self::Binop { lhs, .. } => lhs.loc(),
        }
    }
}
