//! Lexical scope tree used during code generation
//!
//! Scopes live in an arena and point at their parents by index; the
//! only lookup direction is child-to-ancestor. Each node carries two
//! independent identifiers:
//!
//! - `module` is the name-qualification prefix: a binding `x` defined
//!   in a scope with module `main.f` owns the slot `main.f.x`;
//! - `block` is the emission section: instructions generated under this
//!   scope are grouped into that section of the output stream.
//!
//! The three child constructors differ in how they derive the pair:
//! `scoped` extends both (a `def` body emits into its own section named
//! after the definition), `forked` starts both fresh at a lambda
//! pointer, and `unique` invents a new module while inheriting the
//! parent's block, so `let` bindings get private slot names but their
//! code stays in the surrounding section.

use indexmap::IndexMap;

use crate::ir::Ir;

/// Index of a scope in the tree's arena.
pub type ScopeId = usize;

/// What kind of child a scope is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    /// A `def` body: module and block extend the parent's module.
    Scoped,
    /// A lambda body: module and block restart at the lambda pointer.
    Forked,
    /// A `let` body: fresh module, parent's block.
    Unique,
}

#[derive(Debug)]
struct ScopeNode {
    kind: ScopeKind,
    module: String,
    block: String,
    parent: Option<ScopeId>,
    /// Bindings in definition order, each with the IR that defined it.
    bindings: IndexMap<String, Ir>,
}

/// Arena of scopes for one compilation.
#[derive(Debug)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
    /// Source of `let-XXXX` module names.
    counter: u32,
}

impl ScopeTree {
    /// Create a tree with a root scope for the given module.
    pub fn new(module: &str) -> (Self, ScopeId) {
        let root = ScopeNode {
            kind: ScopeKind::Root,
            module: module.to_string(),
            block: module.to_string(),
            parent: None,
            bindings: IndexMap::new(),
        };
        (Self { nodes: vec![root], counter: 0 }, 0)
    }

    fn push(&mut self, node: ScopeNode) -> ScopeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Child for a `def` body: names and code both live under
    /// `parent_module.name`.
    pub fn scoped(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        let module = format!("{}.{name}", self.nodes[parent].module);
        self.push(ScopeNode {
            kind: ScopeKind::Scoped,
            block: module.clone(),
            module,
            parent: Some(parent),
            bindings: IndexMap::new(),
        })
    }

    /// Child for a lambda body: a fresh section rooted at the lambda
    /// pointer. The parent link remains for name lookup; slots are
    /// process-global at runtime, so an enclosing binding is still
    /// addressable from inside the fork.
    pub fn forked(&mut self, parent: ScopeId, module: &str) -> ScopeId {
        self.push(ScopeNode {
            kind: ScopeKind::Forked,
            module: module.to_string(),
            block: module.to_string(),
            parent: Some(parent),
            bindings: IndexMap::new(),
        })
    }

    /// Child for a `let` body: a synthesized module to isolate binding
    /// lifetimes, emitting into the parent's block.
    pub fn unique(&mut self, parent: ScopeId) -> ScopeId {
        self.counter += 1;
        let module = format!("{}.let-{:04x}", self.nodes[parent].module, self.counter);
        let block = self.nodes[parent].block.clone();
        self.push(ScopeNode {
            kind: ScopeKind::Unique,
            module,
            block,
            parent: Some(parent),
            bindings: IndexMap::new(),
        })
    }

    pub fn kind(&self, scope: ScopeId) -> ScopeKind {
        self.nodes[scope].kind
    }

    pub fn module(&self, scope: ScopeId) -> &str {
        &self.nodes[scope].module
    }

    pub fn block(&self, scope: ScopeId) -> &str {
        &self.nodes[scope].block
    }

    /// Record that `name` is defined in `scope` by `ir`.
    pub fn define(&mut self, scope: ScopeId, name: &str, ir: Ir) {
        self.nodes[scope].bindings.insert(name.to_string(), ir);
    }

    /// The scope that defines `name`, walking ancestors.
    fn defining_scope(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.nodes[id].bindings.contains_key(name) {
                return Some(id);
            }
            current = self.nodes[id].parent;
        }
        None
    }

    /// The IR that defined `name`, walking ancestors.
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&Ir> {
        self.defining_scope(scope, name).map(|id| &self.nodes[id].bindings[name])
    }

    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        self.defining_scope(scope, name).is_some()
    }

    /// The module-qualified slot name for `name`: the defining scope's
    /// module when one exists, the current scope's module otherwise.
    pub fn qualified(&self, scope: ScopeId, name: &str) -> String {
        let module = self
            .defining_scope(scope, name)
            .map_or(self.nodes[scope].module.as_str(), |id| self.nodes[id].module.as_str());
        format!("{module}.{name}")
    }

    /// Like [`qualified`](Self::qualified), but `None` when no ancestor
    /// binds `name`.
    pub fn qualified2(&self, scope: ScopeId, name: &str) -> Option<String> {
        self.defining_scope(scope, name)
            .map(|id| format!("{}.{name}", self.nodes[id].module))
    }
}
