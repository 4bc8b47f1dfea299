//! The typeless intermediate representation
//!
//! The IR has the same shape as the AST with operators rewritten into
//! applications: `Uniop(op, x)` becomes `App(Id(op), [x])` and
//! `Binop(op, a, b)` becomes `App(Id(op), [a, b])`. Every lambda is
//! assigned a unique pointer label that later names its code section,
//! its entry label, and its constant-pool reference.

use leaven_error::Loc;
use leaven_parser::{Expr, Node, Stmt, Tree};

/// A typeless IR node.
#[derive(Debug, Clone, PartialEq)]
pub enum Ir {
    Num { lexeme: String, loc: Loc },
    Str { value: String, loc: Loc },
    Bool { value: bool, loc: Loc },
    Symbol { name: String, loc: Loc },
    Id { name: String, loc: Loc },
    App { func: Box<Ir>, args: Vec<Ir>, loc: Loc },
    Cond { cond: Box<Ir>, pass: Box<Ir>, fail: Box<Ir>, loc: Loc },
    Let { bindings: Vec<IrBinding>, body: Box<Ir>, loc: Loc },
    Lambda { ptr: String, params: Vec<IrParam>, body: Box<Ir>, loc: Loc },
    Begin { exprs: Vec<Ir>, loc: Loc },
    Def { name: String, value: Box<Ir>, loc: Loc },
    Module { name: String, loc: Loc },
    Import { name: String, loc: Loc },
}

impl Ir {
    /// Where this node starts.
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Num { loc, .. }
            | Self::Str { loc, .. }
            | Self::Bool { loc, .. }
            | Self::Symbol { loc, .. }
            | Self::Id { loc, .. }
            | Self::App { loc, .. }
            | Self::Cond { loc, .. }
            | Self::Let { loc, .. }
            | Self::Lambda { loc, .. }
            | Self::Begin { loc, .. }
            | Self::Def { loc, .. }
            | Self::Module { loc, .. }
            | Self::Import { loc, .. } => loc,
        }
    }
}

/// A `let` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct IrBinding {
    pub name: String,
    pub value: Ir,
    pub loc: Loc,
}

/// A lambda parameter. Type annotations are consumed by the external
/// checker and do not survive lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct IrParam {
    pub name: String,
    pub loc: Loc,
}

/// Lower a parsed tree into the typeless IR.
pub fn lift(tree: Tree) -> Vec<Ir> {
    let mut lift = Lift { counter: 0 };
    tree.into_iter().map(|node| lift.node(node)).collect()
}

struct Lift {
    /// Monotonic source of lambda pointers, unique per compilation.
    counter: u64,
}

impl Lift {
    fn fresh_ptr(&mut self) -> String {
        self.counter += 1;
        format!("lambda-{:016x}", self.counter)
    }

    fn node(&mut self, node: Node) -> Ir {
        match node {
            Node::Stmt(Stmt::Def { name, value }) => {
                let loc = name.loc;
                Ir::Def { name: name.name, value: Box::new(self.expr(value)), loc }
            }
            Node::Stmt(Stmt::Module { name }) => Ir::Module { name: name.name, loc: name.loc },
            Node::Stmt(Stmt::Import { name }) => Ir::Import { name: name.name, loc: name.loc },
            Node::Expr(expr) => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: Expr) -> Ir {
        match expr {
            Expr::Num { lexeme, loc } => Ir::Num { lexeme, loc },
            Expr::Str { value, loc } => Ir::Str { value, loc },
            Expr::Symbol { name, loc } => Ir::Symbol { name, loc },
            Expr::Id(ident) if ident.name == "true" => {
                Ir::Bool { value: true, loc: ident.loc }
            }
            Expr::Id(ident) if ident.name == "false" => {
                Ir::Bool { value: false, loc: ident.loc }
            }
            Expr::Id(ident) => Ir::Id { name: ident.name, loc: ident.loc },
            Expr::Uniop { op, sub } => {
                let loc = op.loc.clone();
                Ir::App {
                    func: Box::new(Ir::Id { name: op.name, loc: op.loc }),
                    args: vec![self.expr(*sub)],
                    loc,
                }
            }
            Expr::Binop { op, lhs, rhs } => {
                let loc = lhs.loc().clone();
                Ir::App {
                    func: Box::new(Ir::Id { name: op.name, loc: op.loc }),
                    args: vec![self.expr(*lhs), self.expr(*rhs)],
                    loc,
                }
            }
            Expr::App { func, args, loc } => Ir::App {
                func: Box::new(self.expr(*func)),
                args: args.into_iter().map(|arg| self.expr(arg)).collect(),
                loc,
            },
            Expr::Lambda { params, body, loc } => Ir::Lambda {
                ptr: self.fresh_ptr(),
                params: params
                    .into_iter()
                    .map(|param| IrParam { name: param.name.name, loc: param.name.loc })
                    .collect(),
                body: Box::new(self.expr(*body)),
                loc,
            },
            Expr::Cond { cond, pass, fail, loc } => Ir::Cond {
                cond: Box::new(self.expr(*cond)),
                pass: Box::new(self.expr(*pass)),
                fail: Box::new(self.expr(*fail)),
                loc,
            },
            Expr::Let { bindings, body, loc } => Ir::Let {
                bindings: bindings
                    .into_iter()
                    .map(|binding| IrBinding {
                        name: binding.name.name,
                        loc: binding.name.loc,
                        value: self.expr(binding.value),
                    })
                    .collect(),
                body: Box::new(self.expr(*body)),
                loc,
            },
            Expr::Begin { exprs, loc } => Ir::Begin {
                exprs: exprs.into_iter().map(|e| self.expr(e)).collect(),
                loc,
            },
        }
    }
}
