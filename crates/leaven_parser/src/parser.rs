//! Parser for the leaven language
//!
//! Expression parsing is Pratt-style over the operator table; the
//! statement layer handles `def`, `module`, and `import`. The top-level
//! reader threads an immutable [`Syntax`] value through a fold: an
//! `operator('fixity, N, 'name)` form extends the table and is removed
//! from the program, everything else is appended to the output tree.

use leaven_error::SyntaxError;
use tracing::debug;

use crate::ast::{Binding, Expr, Ident, Node, Param, Stmt, Tree};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::syntax::{MAX_PRECEDENCE, Syntax};

/// Reserved words that cannot start an expression.
const NON_STARTERS: &[&str] = &["then", "else", "in", "end"];

/// Read a source unit with an empty operator table.
pub fn read(name: &str, text: &str) -> Result<(Tree, Syntax), SyntaxError> {
    read_with(name, text, Syntax::new())
}

/// Read a source unit starting from an existing operator table, and
/// return the tree together with the table as extended by any
/// `operator` declarations the unit contained.
pub fn read_with(name: &str, text: &str, syntax: Syntax) -> Result<(Tree, Syntax), SyntaxError> {
    let tokens = Lexer::new(name, text)
        .tokenize()?
        .into_iter()
        .filter(|token| token.kind != TokenKind::Comment)
        .collect();

    Parser { tokens, pos: 0 }.read(syntax)
}

fn to_ident(token: Token) -> Ident {
    Ident { name: token.text, loc: token.loc }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// The current token. The token stream always ends with `Eof`, and
    /// the position never moves past it.
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// The token after the current one.
    fn peek_second(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_id(&self, lexeme: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Id && token.text == lexeme
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.bump())
        } else if token.kind == TokenKind::Eof {
            Err(SyntaxError::UnexpectedEof { loc: token.loc.clone() })
        } else {
            Err(SyntaxError::MissingExpectedToken {
                expected: expected.to_string(),
                found: token.describe(),
                loc: token.loc.clone(),
            })
        }
    }

    /// Like [`expect`](Self::expect), but reports what construct the
    /// token should have followed.
    fn expect_after(
        &mut self,
        kind: TokenKind,
        expected: &str,
        after: &str,
    ) -> Result<Token, SyntaxError> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.bump())
        } else if token.kind == TokenKind::Eof {
            Err(SyntaxError::UnexpectedEof { loc: token.loc.clone() })
        } else {
            Err(SyntaxError::MissingExpectedTokenAfter {
                expected: expected.to_string(),
                after: after.to_string(),
                loc: token.loc.clone(),
            })
        }
    }

    fn expect_keyword(&mut self, word: &str, after: &str) -> Result<Token, SyntaxError> {
        if self.at_id(word) {
            return Ok(self.bump());
        }
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            Err(SyntaxError::UnexpectedEof { loc: token.loc.clone() })
        } else {
            Err(SyntaxError::MissingExpectedTokenAfter {
                expected: format!("`{word}`"),
                after: after.to_string(),
                loc: token.loc.clone(),
            })
        }
    }

    /// The top-level fold over nodes and the syntax table.
    fn read(mut self, mut syntax: Syntax) -> Result<(Tree, Syntax), SyntaxError> {
        let mut tree = Tree::new();

        while self.peek().kind != TokenKind::Eof {
            let node = self.node(&syntax)?;
            match operator_declaration(&node) {
                Some(declaration) => {
                    let (fixity, precedence, name) = declaration?;
                    debug!(fixity, precedence, name = %name, "registering operator");
                    syntax = match fixity {
                        "prefix" => syntax.with_prefix(name, precedence),
                        "postfix" => syntax.with_postfix(name, precedence),
                        _ => syntax.with_infix(name, precedence),
                    };
                }
                None => tree.push(node),
            }
        }

        Ok((tree, syntax))
    }

    fn node(&mut self, syntax: &Syntax) -> Result<Node, SyntaxError> {
        if self.at_id("def") {
            return self.def_stmt(syntax).map(Node::Stmt);
        }
        if (self.at_id("module") || self.at_id("import"))
            && self.peek_second().kind == TokenKind::Id
        {
            let keyword = self.bump();
            let name = to_ident(self.bump());
            let stmt = if keyword.text == "module" {
                Stmt::Module { name }
            } else {
                Stmt::Import { name }
            };
            return Ok(Node::Stmt(stmt));
        }
        self.expression(syntax).map(Node::Expr)
    }

    fn def_stmt(&mut self, syntax: &Syntax) -> Result<Stmt, SyntaxError> {
        self.bump(); // Consume `def`
        let name = to_ident(self.expect(TokenKind::Id, "a definition name")?);

        let value = if self.peek().kind == TokenKind::OpenParen {
            let loc = name.loc.clone();
            let params = self.params()?;
            self.expect_after(TokenKind::Equal, "`=`", "the parameter list")?;
            let body = self.expression(syntax)?;
            Expr::Lambda { params, body: Box::new(body), loc }
        } else {
            self.expect_after(TokenKind::Equal, "`=`", "the definition name")?;
            self.expression(syntax)?
        };

        Ok(Stmt::Def { name, value })
    }

    fn params(&mut self) -> Result<Vec<Param>, SyntaxError> {
        self.expect(TokenKind::OpenParen, "`(`")?;

        let mut params = Vec::new();
        if self.peek().kind == TokenKind::CloseParen {
            self.bump();
            return Ok(params);
        }

        loop {
            let name = to_ident(self.expect(TokenKind::Id, "a parameter name")?);
            let ty = if self.peek().kind == TokenKind::Colon {
                self.bump();
                Some(to_ident(self.expect(TokenKind::Id, "a type name")?))
            } else {
                None
            };
            params.push(Param { name, ty });

            if self.peek().kind == TokenKind::Comma {
                self.bump();
                continue;
            }
            self.expect(TokenKind::CloseParen, "`)`")?;
            return Ok(params);
        }
    }

    fn expression(&mut self, syntax: &Syntax) -> Result<Expr, SyntaxError> {
        let head = self.peek();
        let mut curr = if head.kind == TokenKind::Id && syntax.is_prefix(&head.text) {
            let op = to_ident(self.bump());
            let sub = self.primary(syntax)?;
            Expr::Uniop { op, sub: Box::new(sub) }
        } else {
            self.primary(syntax)?
        };

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Id if syntax.is_postfix(&token.text) => {
                    let op = to_ident(self.bump());
                    curr = Expr::Uniop { op, sub: Box::new(curr) };
                }
                TokenKind::Id if syntax.is_infix(&token.text) => {
                    let op = to_ident(self.bump());
                    let rhs = self.expression(syntax)?;
                    curr = rotate(syntax, op, curr, rhs);
                }
                TokenKind::OpenParen => {
                    let loc = self.bump().loc;
                    let args = self.arguments(syntax)?;
                    curr = Expr::App { func: Box::new(curr), args, loc };
                }
                _ => return Ok(curr),
            }
        }
    }

    fn arguments(&mut self, syntax: &Syntax) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::CloseParen {
            self.bump();
            return Ok(args);
        }

        loop {
            args.push(self.expression(syntax)?);
            if self.peek().kind == TokenKind::Comma {
                self.bump();
                continue;
            }
            self.expect(TokenKind::CloseParen, "`)`")?;
            return Ok(args);
        }
    }

    fn primary(&mut self, syntax: &Syntax) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Id => match token.text.as_str() {
                "func" => self.lambda(syntax),
                "if" => self.cond(syntax),
                "let" => self.let_expr(syntax),
                "begin" => self.begin(syntax),
                word if NON_STARTERS.contains(&word) => Err(SyntaxError::MissingExpectedToken {
                    expected: "an expression".to_string(),
                    found: token.describe(),
                    loc: token.loc,
                }),
                _ => {
                    self.bump();
                    Ok(Expr::Id(to_ident(token)))
                }
            },
            TokenKind::Num => {
                self.bump();
                Ok(Expr::Num { lexeme: token.text, loc: token.loc })
            }
            TokenKind::Str => {
                self.bump();
                Ok(Expr::Str { value: token.text, loc: token.loc })
            }
            TokenKind::Symbol => {
                self.bump();
                Ok(Expr::Symbol { name: token.text, loc: token.loc })
            }
            TokenKind::OpenParen => {
                self.bump();
                let inner = self.expression(syntax)?;
                self.expect(TokenKind::CloseParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(SyntaxError::UnexpectedEof { loc: token.loc }),
            _ => Err(SyntaxError::UnexpectedToken { found: token.describe(), loc: token.loc }),
        }
    }

    fn lambda(&mut self, syntax: &Syntax) -> Result<Expr, SyntaxError> {
        let loc = self.bump().loc; // Consume `func`
        let params = self.params()?;
        self.expect_after(TokenKind::Equal, "`=`", "the parameter list")?;
        let body = self.expression(syntax)?;
        Ok(Expr::Lambda { params, body: Box::new(body), loc })
    }

    fn cond(&mut self, syntax: &Syntax) -> Result<Expr, SyntaxError> {
        let loc = self.bump().loc; // Consume `if`
        let cond = self.expression(syntax)?;
        self.expect_keyword("then", "the condition")?;
        let pass = self.expression(syntax)?;
        self.expect_keyword("else", "the `then` branch")?;
        let fail = self.expression(syntax)?;
        Ok(Expr::Cond {
            cond: Box::new(cond),
            pass: Box::new(pass),
            fail: Box::new(fail),
            loc,
        })
    }

    fn let_expr(&mut self, syntax: &Syntax) -> Result<Expr, SyntaxError> {
        let loc = self.bump().loc; // Consume `let`

        let mut bindings = Vec::new();
        while !self.at_id("in") && self.peek().kind == TokenKind::Id {
            let name = to_ident(self.bump());
            self.expect_after(TokenKind::Equal, "`=`", "the binding name")?;
            let value = self.expression(syntax)?;
            bindings.push(Binding { name, value });
        }

        if bindings.is_empty() {
            let token = self.peek();
            return Err(SyntaxError::MissingExpectedToken {
                expected: "a binding".to_string(),
                found: token.describe(),
                loc: token.loc.clone(),
            });
        }

        self.expect_keyword("in", "the bindings")?;
        let body = self.expression(syntax)?;
        Ok(Expr::Let { bindings, body: Box::new(body), loc })
    }

    fn begin(&mut self, syntax: &Syntax) -> Result<Expr, SyntaxError> {
        let loc = self.bump().loc; // Consume `begin`

        let mut exprs = Vec::new();
        loop {
            if self.at_id("end") {
                self.bump();
                break;
            }
            if self.peek().kind == TokenKind::Eof {
                return Err(SyntaxError::UnexpectedEof { loc: self.peek().loc.clone() });
            }
            exprs.push(self.expression(syntax)?);
        }

        if exprs.is_empty() {
            return Err(SyntaxError::EmptyBeginNotAllowed { loc });
        }
        Ok(Expr::Begin { exprs, loc })
    }
}

/// The single rotation that repairs precedence after the right-leaning
/// recursive parse: `a op b op2 c` first comes back as
/// `Binop(op, a, Binop(op2, b, c))`; when `op` binds at least as
/// tightly as `op2` the pair is rotated into
/// `Binop(op2, Binop(op, a, b), c)`. Equal precedences therefore lean
/// left.
fn rotate(syntax: &Syntax, op: Ident, lhs: Expr, rhs: Expr) -> Expr {
    let precedence = syntax.infix_precedence(&op.name).unwrap_or(0);
    match rhs {
        Expr::Binop { op: op2, lhs: lhs2, rhs: rhs2 }
            if precedence >= syntax.infix_precedence(&op2.name).unwrap_or(0) =>
        {
            let inner = Expr::Binop { op, lhs: Box::new(lhs), rhs: lhs2 };
            Expr::Binop { op: op2, lhs: Box::new(inner), rhs: rhs2 }
        }
        rhs => Expr::Binop { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
    }
}

/// Match a top-level `operator('fixity, N, 'name)` form. Returns `None`
/// for ordinary nodes, and an error when the form is shaped like an
/// operator declaration but malformed.
#[allow(clippy::type_complexity)]
fn operator_declaration(
    node: &Node,
) -> Option<Result<(&'static str, u32, String), SyntaxError>> {
    let Node::Expr(Expr::App { func, args, loc }) = node else {
        return None;
    };
    let Expr::Id(Ident { name, .. }) = func.as_ref() else {
        return None;
    };
    if name != "operator" {
        return None;
    }

    let malformed = Err(SyntaxError::BadOperatorDefinition { loc: loc.clone() });
    let [Expr::Symbol { name: fixity, .. }, Expr::Num { lexeme, .. }, Expr::Symbol { name, .. }] =
        args.as_slice()
    else {
        return Some(malformed);
    };

    let fixity = match fixity.as_str() {
        "prefix" => "prefix",
        "infix" => "infix",
        "postfix" => "postfix",
        _ => return Some(malformed),
    };
    let Ok(precedence) = lexeme.parse::<u32>() else {
        return Some(malformed);
    };
    if precedence > MAX_PRECEDENCE {
        return Some(malformed);
    }

    Some(Ok((fixity, precedence, name.clone())))
}
