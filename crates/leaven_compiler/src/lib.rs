//! Compiler for the leaven language
//!
//! Turns a parsed tree into the flat code stream the VM executes:
//! lowering to the typeless IR, dead-lambda elimination, scope-aware
//! opcode generation, and the layout passes that arrange sections and
//! the constant pool. The embedded assembler for `opcode("…")` forms
//! lives here too.

pub mod asm;
pub mod codegen;
pub mod ir;
pub mod output;
pub mod pass;
pub mod scope;

#[cfg(test)]
mod tests;

use leaven_core::Code;
use leaven_error::CompileError;
use leaven_parser::Tree;

pub use crate::ir::{Ir, lift};
pub use crate::output::Item;

/// Definitions compiled ahead of every program.
pub const PRELUDE: &str = include_str!("prelude.lv");

/// Source-unit name the prelude is compiled under.
pub const PRELUDE_NAME: &str = "<prelude>";

/// Compile a source unit together with the prelude.
///
/// The prelude is read first so its operator declarations are in the
/// syntax table when the program is parsed, and both trees share one
/// compilation: one label counter, one scope tree, one constant pool.
pub fn compile(name: &str, source: &str) -> Result<Vec<Code>, CompileError> {
    let (mut tree, syntax) = leaven_parser::read(PRELUDE_NAME, PRELUDE)?;
    let (program, _) = leaven_parser::read_with(name, source, syntax)?;
    tree.extend(program);
    compile_tree(tree)
}

/// Compile a source unit without the prelude. Programs that want
/// operators must declare their own.
pub fn compile_bare(name: &str, source: &str) -> Result<Vec<Code>, CompileError> {
    let (tree, _) = leaven_parser::read(name, source)?;
    compile_tree(tree)
}

fn compile_tree(tree: Tree) -> Result<Vec<Code>, CompileError> {
    let lowered = lift(tree);
    let pruned = pass::eliminate_dead_lambdas(lowered);
    let codes = codegen::generate(&pruned)?;
    Ok(codes)
}
