//! Dead-lambda elimination
//!
//! Drops top-level function definitions the program never references.
//! The pass is intentionally shallow and has known limitations:
//!
//! - shadowing is not accounted for: a local binding named like a
//!   top-level definition still keeps that definition alive;
//! - a lambda referenced only by other dead lambdas survives, because
//!   references are collected from the whole tree and the pass does not
//!   iterate to a fixed point.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ir::Ir;

/// Remove top-level `Def(name, Lambda)` nodes whose name is never
/// referenced from any expression.
pub fn eliminate_dead_lambdas(tree: Vec<Ir>) -> Vec<Ir> {
    let defined: FxHashSet<String> = tree
        .iter()
        .filter_map(|node| match node {
            Ir::Def { name, value, .. } if matches!(value.as_ref(), Ir::Lambda { .. }) => {
                Some(name.clone())
            }
            _ => None,
        })
        .collect();

    let mut called = FxHashSet::default();
    for node in &tree {
        collect_ids(node, &mut called);
    }

    tree.into_iter()
        .filter(|node| match node {
            Ir::Def { name, value, .. }
                if matches!(value.as_ref(), Ir::Lambda { .. })
                    && defined.contains(name)
                    && !called.contains(name) =>
            {
                debug!(name = %name, "dropping unused definition");
                false
            }
            _ => true,
        })
        .collect()
}

/// Collect every identifier referenced anywhere under a node. A `Def`'s
/// name is a binder, not a reference; everything inside its value
/// counts.
fn collect_ids(node: &Ir, out: &mut FxHashSet<String>) {
    match node {
        Ir::Num { .. }
        | Ir::Str { .. }
        | Ir::Bool { .. }
        | Ir::Symbol { .. }
        | Ir::Module { .. }
        | Ir::Import { .. } => {}
        Ir::Id { name, .. } => {
            out.insert(name.clone());
        }
        Ir::App { func, args, .. } => {
            collect_ids(func, out);
            for arg in args {
                collect_ids(arg, out);
            }
        }
        Ir::Cond { cond, pass, fail, .. } => {
            collect_ids(cond, out);
            collect_ids(pass, out);
            collect_ids(fail, out);
        }
        Ir::Let { bindings, body, .. } => {
            for binding in bindings {
                collect_ids(&binding.value, out);
            }
            collect_ids(body, out);
        }
        Ir::Lambda { body, .. } => collect_ids(body, out),
        Ir::Begin { exprs, .. } => {
            for expr in exprs {
                collect_ids(expr, out);
            }
        }
        Ir::Def { value, .. } => collect_ids(value, out),
    }
}
