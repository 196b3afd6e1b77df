//! Semantic compilation
//!
//! The compiler lowers the input AST into a tree of semantic constructs held
//! in a flat arena ([`Compilation::constructs`]) and indexed by
//! [`constructs::ConstructId`].  Alongside the constructs it builds the
//! entity table (storage descriptors), the scope chain, the class registry,
//! and the string literal pool.  The finished, immutable result is a
//! [`program::Program`].
//!
//! Compilation never fails early: semantic problems become [`notes::Note`]s
//! attached to the offending construct, and the rest of the tree keeps
//! compiling so that all diagnostics are reported in one pass.

pub mod constructs;
pub mod conversions;
pub mod deallocators;
pub mod declarations;
pub mod entities;
pub mod expressions;
pub mod initializers;
pub mod notes;
pub mod overloads;
pub mod program;
pub mod statements;

pub use program::Program;

use crate::ast::SourceLocation;
use crate::types::{ClassDefinition, ClassId};
use constructs::{Construct, ConstructId, ConstructKind};
use entities::{Entity, EntityId, Scope, ScopeId};
use notes::Note;

/// Mutable state shared by every compilation pass.  Once compilation is
/// done, [`program::Program`] takes ownership of these tables.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub constructs: Vec<Construct>,
    pub entities: Vec<Entity>,
    pub scopes: Vec<Scope>,
    pub classes: Vec<ClassDefinition>,
    /// String literal byte pools, each including the terminating null
    pub string_literals: Vec<Vec<i8>>,
    /// Diagnostics not attributable to any single construct
    pub notes: Vec<Note>,
}

impl Compilation {
    pub fn new() -> Self {
        Compilation::default()
    }

    pub fn add_construct(
        &mut self,
        kind: ConstructKind,
        location: Option<SourceLocation>,
    ) -> ConstructId {
        let id = ConstructId(self.constructs.len());
        self.constructs.push(Construct::new(kind, location));
        id
    }

    pub fn construct(&self, id: ConstructId) -> &Construct {
        &self.constructs[id.0]
    }

    pub fn construct_mut(&mut self, id: ConstructId) -> &mut Construct {
        &mut self.constructs[id.0]
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(entity);
        id
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    pub fn add_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope::new(parent));
        id
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn class(&self, id: ClassId) -> &ClassDefinition {
        &self.classes[id.0]
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Intern a string literal, returning its pool index.  The stored bytes
    /// include the terminating null character.
    pub fn intern_string(&mut self, text: &str) -> usize {
        let mut bytes: Vec<i8> = text.bytes().map(|b| b as i8).collect();
        bytes.push(0);
        self.string_literals.push(bytes);
        self.string_literals.len() - 1
    }

    /// Attach a diagnostic to a construct
    pub fn note(&mut self, at: ConstructId, note: Note) {
        let note = match self.constructs[at.0].location {
            Some(loc) if note.location.is_none() => note.at(loc),
            _ => note,
        };
        self.constructs[at.0].notes.push(note);
    }

    /// Link `child` under `parent`.
    ///
    /// This is the only linking path, and it is where full-expression
    /// boundaries are discovered: when a potentially-full-expression child
    /// (expression, initializer, or function call) is attached to a parent
    /// that is not one itself, the child is the root of a full expression.
    /// At that moment its accumulated temporaries get a temporary
    /// deallocator, and the subtree is sealed against further temporary
    /// registration.  When both sides are potentially full expressions, the
    /// child's temporaries hoist into the parent instead.
    pub fn attach(&mut self, parent: ConstructId, child: ConstructId) {
        debug_assert!(
            self.constructs[child.0].parent.is_none(),
            "construct attached twice"
        );
        self.constructs[child.0].parent = Some(parent);
        self.constructs[parent.0].children.push(child);

        if self.constructs[child.0].is_potential_full_expression() {
            if self.constructs[parent.0].is_potential_full_expression() {
                debug_assert!(!self.constructs[parent.0].sealed);
                let hoisted = std::mem::take(&mut self.constructs[child.0].temporaries);
                self.constructs[parent.0].temporaries.extend(hoisted);
            } else {
                self.seal_full_expression(child);
            }
        }
    }

    /// Record a temporary object on a construct inside a (not yet sealed)
    /// full expression.  Temporaries hoist upward on attach and are
    /// destroyed by the full expression's temporary deallocator.
    pub fn register_temporary(&mut self, at: ConstructId, temp: EntityId) {
        debug_assert!(
            !self.constructs[at.0].sealed,
            "temporary registered after full expression was sealed"
        );
        self.constructs[at.0].temporaries.push(temp);
    }

    /// Close off a full expression that will never be attached to a parent
    /// (such as the synthetic call to `main`), giving it its temporary
    /// deallocator.
    pub(crate) fn seal_full_expression(&mut self, root: ConstructId) {
        debug_assert!(self.constructs[root.0].temp_deallocator.is_none());
        let temps = self.constructs[root.0].temporaries.clone();
        let dealloc = deallocators::compile_temporary_deallocator(self, &temps);
        self.constructs[dealloc.0].parent = Some(root);
        self.constructs[root.0].children.push(dealloc);
        self.constructs[root.0].temp_deallocator = Some(dealloc);
        self.constructs[root.0].sealed = true;
    }

    /// True if the subtree rooted at `id` carries any error-severity note
    pub fn has_errors(&self, id: ConstructId) -> bool {
        let c = &self.constructs[id.0];
        c.notes.iter().any(|n| n.is_error()) || c.children.iter().any(|&ch| self.has_errors(ch))
    }

    /// Collect every note in the subtree rooted at `id`, depth-first
    pub fn collect_notes(&self, id: ConstructId, out: &mut Vec<Note>) {
        let c = &self.constructs[id.0];
        out.extend(c.notes.iter().cloned());
        for &ch in &c.children {
            self.collect_notes(ch, out);
        }
    }
}
