//! Opcode generator
//!
//! Walks the typeless IR and emits grouped instructions plus
//! constant-pool values. Every lambda body is wrapped in the calling
//! convention:
//!
//! ```text
//! frame N                      // from frame_init, via the framed pass
//! swap; store I32 <param>      // once per parameter, in reverse order
//! stw ebp; stw esp; ldw ebp    // save caller's ebp, set ebp = esp
//! <body>
//! ldw rt; stw ebp; ldw esp; ldw ebp; stw rt; swap; ret
//! ```
//!
//! The epilogue's word order is the exact inverse of the prologue with
//! the return value shuttled through `rt`.

use std::hash::{Hash, Hasher};

use leaven_core::{Code, Instr, Operand, Register, ValueKind};
use leaven_error::{GeneratorError, Loc};
use rustc_hash::FxHasher;
use tracing::debug;

use crate::asm;
use crate::ir::{Ir, IrBinding, IrParam};
use crate::output::{self, Item, MAIN};
use crate::scope::{ScopeId, ScopeTree};

/// Generate the final code vector for a lowered program.
pub fn generate(tree: &[Ir]) -> Result<Vec<Code>, GeneratorError> {
    let (scopes, root) = ScopeTree::new(MAIN);
    let mut generator = Generator { scopes, items: Vec::new(), labels: 0 };

    for node in tree {
        generator.top_level(root, node)?;
    }

    Ok(output::layout(generator.items))
}

/// Generate the raw emission stream without running the layout passes.
/// Mostly useful to tests that inspect intermediate items.
pub fn generate_items(tree: &[Ir]) -> Result<Vec<Item>, GeneratorError> {
    let (scopes, root) = ScopeTree::new(MAIN);
    let mut generator = Generator { scopes, items: Vec::new(), labels: 0 };

    for node in tree {
        generator.top_level(root, node)?;
    }

    Ok(generator.items)
}

struct Generator {
    scopes: ScopeTree,
    items: Vec<Item>,
    /// Source of `then-XXXX`/`else-XXXX`/`done-XXXX` label suffixes.
    labels: u32,
}

impl Generator {
    fn emit(&mut self, scope: ScopeId, code: Code) {
        self.items.push(Item::Grouped(self.scopes.block(scope).to_string(), code));
    }

    fn emit_instr(&mut self, scope: ScopeId, instr: Instr) {
        self.emit(scope, Code::Instr(instr));
    }

    fn fresh_suffix(&mut self) -> String {
        self.labels += 1;
        format!("{:04x}", self.labels)
    }

    fn top_level(&mut self, root: ScopeId, node: &Ir) -> Result<(), GeneratorError> {
        match node {
            Ir::Def { name, value, loc } => self.def(root, name, value, loc),
            Ir::Module { name, .. } | Ir::Import { name, .. } => {
                // Module wiring belongs to the external resolver.
                debug!(name = %name, "skipping module statement");
                Ok(())
            }
            expr => self.expr(root, expr, true),
        }
    }

    fn def(&mut self, scope: ScopeId, name: &str, value: &Ir, _loc: &Loc) -> Result<(), GeneratorError> {
        // Define before generating so the body can refer to itself.
        self.scopes.define(scope, name, value.clone());

        match value {
            Ir::Lambda { ptr, params, body, .. } => {
                let inner = self.scopes.scoped(scope, name);
                self.function(inner, ptr, params, body)?;
                let qualified = self.scopes.qualified(scope, name);
                self.items.push(Item::Value(
                    ValueKind::Ref,
                    qualified.clone(),
                    Operand::Id(qualified),
                ));
                Ok(())
            }
            value => {
                self.expr(scope, value, false)?;
                let qualified = self.scopes.qualified(scope, name);
                self.emit_instr(scope, Instr::Store(ValueKind::I32, qualified));
                Ok(())
            }
        }
    }

    /// Emit a function's entry label, prologue, body, and epilogue into
    /// the given scope's section.
    fn function(
        &mut self,
        inner: ScopeId,
        ptr: &str,
        params: &[IrParam],
        body: &Ir,
    ) -> Result<(), GeneratorError> {
        for param in params {
            let defined_by = Ir::Id { name: param.name.clone(), loc: param.loc.clone() };
            self.scopes.define(inner, &param.name, defined_by);
        }

        self.emit(inner, Code::Label(ptr.to_string()));
        self.emit_instr(inner, Instr::FrameInit(params.len()));

        // The caller pushed arguments left to right with the return
        // address on top; each swap sinks the return address below the
        // argument about to be stored.
        for param in params.iter().rev() {
            self.emit_instr(inner, Instr::Swap);
            let slot = self.scopes.qualified(inner, &param.name);
            self.emit_instr(inner, Instr::Store(ValueKind::I32, slot));
        }

        self.emit_instr(inner, Instr::Stw(Register::Ebp));
        self.emit_instr(inner, Instr::Stw(Register::Esp));
        self.emit_instr(inner, Instr::Ldw(Register::Ebp));

        self.expr(inner, body, false)?;

        self.emit_instr(inner, Instr::Ldw(Register::Rt));
        self.emit_instr(inner, Instr::Stw(Register::Ebp));
        self.emit_instr(inner, Instr::Ldw(Register::Esp));
        self.emit_instr(inner, Instr::Ldw(Register::Ebp));
        self.emit_instr(inner, Instr::Stw(Register::Rt));
        self.emit_instr(inner, Instr::Swap);
        self.emit_instr(inner, Instr::Ret);
        Ok(())
    }

    /// Emit an anonymous lambda into its own forked section, record its
    /// constant-pool reference, and optionally push the reference at
    /// the current emission point so the enclosing expression can pick
    /// it up.
    fn lambda(
        &mut self,
        scope: ScopeId,
        ptr: &str,
        params: &[IrParam],
        body: &Ir,
        push_ref: bool,
    ) -> Result<(), GeneratorError> {
        let inner = self.scopes.forked(scope, ptr);
        self.function(inner, ptr, params, body)?;
        self.items.push(Item::Value(
            ValueKind::Ref,
            ptr.to_string(),
            Operand::Id(ptr.to_string()),
        ));
        if push_ref {
            self.emit_instr(scope, Instr::Push(ValueKind::Scope, Operand::Id(ptr.to_string())));
        }
        Ok(())
    }

    fn expr(&mut self, scope: ScopeId, ir: &Ir, top_level: bool) -> Result<(), GeneratorError> {
        match ir {
            Ir::Num { lexeme, loc } => {
                let value = lexeme.parse::<i32>().map_err(|_| GeneratorError::BadPush {
                    lexeme: lexeme.clone(),
                    loc: loc.clone(),
                })?;
                self.emit_instr(scope, Instr::Push(ValueKind::I32, Operand::I32(value)));
                Ok(())
            }
            Ir::Bool { value, .. } => {
                let operand = if *value { Operand::True } else { Operand::False };
                self.emit_instr(scope, Instr::Push(ValueKind::Bool, operand));
                Ok(())
            }
            Ir::Str { value, .. } => {
                let label = str_label(value);
                self.items.push(Item::Value(
                    ValueKind::Str,
                    label.clone(),
                    Operand::Str(value.clone()),
                ));
                self.emit_instr(scope, Instr::Push(ValueKind::Const, Operand::Id(label)));
                Ok(())
            }
            Ir::Symbol { name, .. } => {
                let label = format!("sym-{name}");
                self.items.push(Item::Value(
                    ValueKind::Symbol,
                    label.clone(),
                    Operand::Symbol(name.clone()),
                ));
                self.emit_instr(scope, Instr::Push(ValueKind::Const, Operand::Id(label)));
                Ok(())
            }
            Ir::Id { name, loc } => {
                if self.scopes.contains(scope, name) {
                    let slot = self.scopes.qualified(scope, name);
                    self.emit_instr(scope, Instr::Load(ValueKind::I32, slot));
                    Ok(())
                } else {
                    Err(GeneratorError::UndeclaredIdentifier {
                        name: name.clone(),
                        loc: loc.clone(),
                    })
                }
            }
            Ir::Lambda { ptr, params, body, .. } => {
                self.lambda(scope, ptr, params, body, !top_level)
            }
            Ir::App { func, args, loc } => self.app(scope, func, args, loc),
            Ir::Cond { cond, pass, fail, .. } => {
                let suffix = self.fresh_suffix();
                let then_label = format!("then-{suffix}");
                let else_label = format!("else-{suffix}");
                let done_label = format!("done-{suffix}");

                self.expr(scope, cond, false)?;
                self.emit_instr(scope, Instr::Jz(else_label.clone()));
                self.emit(scope, Code::Label(then_label));
                self.expr(scope, pass, false)?;
                self.emit_instr(scope, Instr::Jmp(done_label.clone()));
                self.emit(scope, Code::Label(else_label));
                self.expr(scope, fail, false)?;
                self.emit(scope, Code::Label(done_label));
                Ok(())
            }
            Ir::Let { bindings, body, .. } => {
                let inner = self.scopes.unique(scope);
                for binding in bindings {
                    self.binding(inner, binding)?;
                }
                self.expr(inner, body, false)
            }
            Ir::Begin { exprs, .. } => {
                for expr in exprs {
                    self.expr(scope, expr, false)?;
                }
                Ok(())
            }
            Ir::Def { loc, .. } => Err(GeneratorError::CannotStoreDef { loc: loc.clone() }),
            Ir::Module { .. } | Ir::Import { .. } => Ok(()),
        }
    }

    fn binding(&mut self, scope: ScopeId, binding: &IrBinding) -> Result<(), GeneratorError> {
        if let Ir::Def { loc, .. } = &binding.value {
            return Err(GeneratorError::CannotStoreDef { loc: loc.clone() });
        }

        // Define before generating so a bound lambda can recurse.
        self.scopes.define(scope, &binding.name, binding.value.clone());

        if let Ir::Lambda { ptr, params, body, .. } = &binding.value {
            self.lambda(scope, ptr, params, body, false)?;
            self.emit_instr(scope, Instr::Push(ValueKind::Ref, Operand::Id(ptr.clone())));
        } else {
            self.expr(scope, &binding.value, false)?;
        }

        let slot = self.scopes.qualified(scope, &binding.name);
        self.emit_instr(scope, Instr::Store(store_kind(&binding.value), slot));
        Ok(())
    }

    fn app(
        &mut self,
        scope: ScopeId,
        func: &Ir,
        args: &[Ir],
        loc: &Loc,
    ) -> Result<(), GeneratorError> {
        match func {
            // The inline-assembly escape hatch.
            Ir::Id { name, .. } if name == "opcode" => {
                let [Ir::Str { value, loc: str_loc }] = args else {
                    return Err(GeneratorError::OpcodeSyntax {
                        detail: "opcode takes a single string literal".to_string(),
                        loc: loc.clone(),
                    });
                };
                let codes = asm::assemble(&self.scopes, scope, value, str_loc)?;
                for code in codes {
                    self.emit(scope, code);
                }
                Ok(())
            }
            Ir::Id { name, .. } => {
                self.call_args(scope, args)?;
                let target = self.scopes.qualified(scope, name);
                self.emit_instr(scope, Instr::Call(target));
                Ok(())
            }
            // A literal lambda in call position: the call site and the
            // function body are emitted side by side.
            Ir::Lambda { ptr, params, body, .. } => {
                self.lambda(scope, ptr, params, body, false)?;
                self.call_args(scope, args)?;
                self.emit_instr(scope, Instr::Call(ptr.clone()));
                Ok(())
            }
            // Calling the result of an expression: evaluate it to land
            // a callable reference on the stack, move that into jm,
            // then call through the register.
            Ir::App { .. } | Ir::Let { .. } | Ir::Cond { .. } | Ir::Begin { .. } => {
                self.expr(scope, func, false)?;
                self.emit_instr(scope, Instr::Mov(Register::Jm, None));
                self.call_args(scope, args)?;
                self.emit_instr(scope, Instr::Call0);
                Ok(())
            }
            _ => Err(GeneratorError::BadCall { loc: loc.clone() }),
        }
    }

    /// Arguments are pushed left to right. A lambda argument emits its
    /// section first and pushes its reference here.
    fn call_args(&mut self, scope: ScopeId, args: &[Ir]) -> Result<(), GeneratorError> {
        for arg in args {
            self.expr(scope, arg, false)?;
        }
        Ok(())
    }
}

/// Static store kind of a binding value.
fn store_kind(ir: &Ir) -> ValueKind {
    match ir {
        Ir::Num { .. } => ValueKind::I32,
        Ir::Bool { .. } => ValueKind::Bool,
        Ir::Str { .. } => ValueKind::Str,
        Ir::Symbol { .. } => ValueKind::Symbol,
        Ir::Lambda { .. } => ValueKind::Ref,
        // TODO: results of let/cond/begin/app are assumed I32 until
        // stores become type-aware.
        _ => ValueKind::I32,
    }
}

/// Content-derived constant-pool label for a string, so identical
/// literals collide and the dedup pass keeps one entry.
fn str_label(value: &str) -> String {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    format!("str-{:016x}", hasher.finish())
}
