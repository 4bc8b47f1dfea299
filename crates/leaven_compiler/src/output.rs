//! The generator's emission stream and the layout passes
//!
//! The generator produces [`Item`]s: instructions grouped under a named
//! section, constant-pool values, and (late in the pipeline) bare
//! section-header labels. Four passes turn the stream into the final
//! flat code vector:
//!
//! 1. `deduped` drops every constant-pool value whose label was already
//!    seen, keeping the first;
//! 2. `framed` rewrites `FrameInit` placeholders into `Frame`;
//! 3. `labeled` gathers each section's items together, in first-emission
//!    order, and gives every section a header label;
//! 4. `sectioned` flattens everything: the `main` section first, a
//!    single `Halt`, the other sections, and the constant pool last.

use leaven_core::{Code, Instr, Operand, ValueKind};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Name of the entry section.
pub const MAIN: &str = "main";

/// One element of the intermediate emission stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// An instruction or label belonging to a section.
    Grouped(String, Code),
    /// A constant-pool entry: kind, label, payload.
    Value(ValueKind, String, Operand),
    /// A bare label not bound to a section; `labeled` introduces these
    /// as section headers.
    Label(String),
}

/// Run all four layout passes.
pub fn layout(items: Vec<Item>) -> Vec<Code> {
    sectioned(labeled(framed(deduped(items))))
}

/// Drop duplicate constant-pool values, keeping the first occurrence of
/// each label.
pub fn deduped(items: Vec<Item>) -> Vec<Item> {
    let mut seen = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| match item {
            Item::Value(_, label, _) => {
                let fresh = seen.insert(label.clone());
                if !fresh {
                    trace!(label = %label, "dropping duplicate constant");
                }
                fresh
            }
            _ => true,
        })
        .collect()
}

/// Rewrite every `FrameInit` placeholder into a `Frame` inside its
/// section. Deferred so earlier passes can reason about the
/// placeholder.
pub fn framed(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Grouped(section, Code::Instr(Instr::FrameInit(arity))) => {
                Item::Grouped(section, Code::Instr(Instr::Frame(arity)))
            }
            item => item,
        })
        .collect()
}

/// Partition grouped items by section, keeping sections in first-
/// emission order with `main` hoisted to the front, prepend a header
/// label to every section that does not already start with its own
/// label, and move constant-pool values to the end.
pub fn labeled(items: Vec<Item>) -> Vec<Item> {
    let mut sections: Vec<(String, Vec<Code>)> = vec![(MAIN.to_string(), Vec::new())];
    let mut values = Vec::new();

    for item in items {
        match item {
            Item::Grouped(section, code) => {
                let index = match sections.iter().position(|(name, _)| *name == section) {
                    Some(index) => index,
                    None => {
                        sections.push((section, Vec::new()));
                        sections.len() - 1
                    }
                };
                sections[index].1.push(code);
            }
            Item::Value(kind, label, payload) => values.push(Item::Value(kind, label, payload)),
            // Bare labels should not occur before this pass; keep them.
            Item::Label(name) => values.push(Item::Label(name)),
        }
    }

    let mut out = Vec::new();
    for (section, codes) in sections {
        let already_headed = matches!(codes.first(), Some(Code::Label(name)) if *name == section);
        if !already_headed {
            out.push(Item::Label(section.clone()));
        }
        out.extend(codes.into_iter().map(|code| Item::Grouped(section.clone(), code)));
    }
    out.extend(values);
    out
}

/// Flatten the stream into the final code vector: the `main` section,
/// one `Halt`, every other section, then the constant pool.
pub fn sectioned(items: Vec<Item>) -> Vec<Code> {
    let mut main = Vec::new();
    let mut rest = Vec::new();
    let mut values = Vec::new();

    for item in items {
        match item {
            Item::Label(name) => {
                if name == MAIN {
                    main.push(Code::Label(name));
                } else {
                    rest.push(Code::Label(name));
                }
            }
            Item::Grouped(section, code) => {
                if section == MAIN {
                    main.push(code);
                } else {
                    rest.push(code);
                }
            }
            Item::Value(kind, label, payload) => values.push(Code::Value(kind, label, payload)),
        }
    }

    main.push(Code::Instr(Instr::Halt));
    main.extend(rest);
    main.extend(values);
    main
}
