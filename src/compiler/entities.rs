//! Entities and scopes
//!
//! An [`Entity`] is a compile-time descriptor of a named or synthesized
//! storage location (or a function).  Entities never hold values: the same
//! local entity resolves to a different physical object in every activation
//! of its function, which is what makes recursion work.  Resolution happens
//! at runtime through `Simulation::lookup_object`.
//!
//! [`Scope`]s form the lexical chain (global → function → block) used for
//! name lookup during compilation.

use crate::compiler::constructs::ConstructId;
use crate::types::{ClassId, Type};
use rustc_hash::FxHashMap;

/// Index of an entity in the compilation's entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub usize);

/// Index of a scope in the compilation's scope table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

/// Whether a variable entity names an object or a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Object,
    Reference,
}

/// The signature of a function entity
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub return_type: Type,
    pub param_types: Vec<Type>,
}

/// What kind of function an entity names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Constructor(ClassId),
    Destructor(ClassId),
}

/// A compile-time storage location descriptor (or function)
#[derive(Debug, Clone)]
pub enum Entity {
    /// A local automatic object (including parameters as declared in the
    /// callee's scope)
    LocalObject { name: String, ty: Type },
    /// A local reference
    LocalReference { name: String, ty: Type },
    /// A global object with static storage duration
    GlobalObject { name: String, ty: Type },
    /// The i-th parameter of a call to `function`.  Resolves through the
    /// *pending* stack frame during argument initialization, before the
    /// callee itself has gained control.
    Parameter {
        function: EntityId,
        index: usize,
        ty: Type,
    },
    /// The designated return object of the containing function activation
    ReturnObject { ty: Type },
    /// The receiver (`*this`) of a member function activation
    Receiver { class: ClassId, ty: Type },
    /// A materialized temporary, owned by a full expression
    TemporaryObject { ty: Type, description: String },
    /// Element `index` of the array object named by `of`
    ArraySubobject {
        of: EntityId,
        index: usize,
        ty: Type,
    },
    /// Named member subobject of the object named by `of`
    MemberSubobject {
        of: EntityId,
        name: String,
        ty: Type,
    },
    /// Base-class subobject of the object named by `of`
    BaseSubobject {
        of: EntityId,
        class: ClassId,
        ty: Type,
    },
    /// The object created by a particular new-expression, resolved through
    /// the nearest enclosing runtime instance of that expression
    NewObject { expr: ConstructId, ty: Type },
    /// A function
    Function {
        name: String,
        signature: FunctionSignature,
        kind: FunctionKind,
        /// The FunctionDef construct, filled in once the body is compiled
        definition: Option<ConstructId>,
    },
}

impl Entity {
    /// The declared type of the entity.  For functions this is the return
    /// type; callers wanting the signature should match on the variant.
    pub fn ty(&self) -> &Type {
        match self {
            Entity::LocalObject { ty, .. }
            | Entity::LocalReference { ty, .. }
            | Entity::GlobalObject { ty, .. }
            | Entity::Parameter { ty, .. }
            | Entity::ReturnObject { ty }
            | Entity::Receiver { ty, .. }
            | Entity::TemporaryObject { ty, .. }
            | Entity::ArraySubobject { ty, .. }
            | Entity::MemberSubobject { ty, .. }
            | Entity::BaseSubobject { ty, .. }
            | Entity::NewObject { ty, .. } => ty,
            Entity::Function { signature, .. } => &signature.return_type,
        }
    }

    pub fn variable_kind(&self) -> VariableKind {
        match self {
            Entity::LocalReference { .. } => VariableKind::Reference,
            Entity::Parameter { ty, .. } if ty.is_reference() => VariableKind::Reference,
            _ => VariableKind::Object,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Entity::Function { .. })
    }

    /// Display name used in diagnostics and memory views
    pub fn describe(&self) -> String {
        match self {
            Entity::LocalObject { name, .. }
            | Entity::LocalReference { name, .. }
            | Entity::GlobalObject { name, .. }
            | Entity::Function { name, .. } => name.clone(),
            Entity::Parameter { index, .. } => format!("parameter #{index}"),
            Entity::ReturnObject { .. } => "[return object]".to_string(),
            Entity::Receiver { .. } => "*this".to_string(),
            Entity::TemporaryObject { description, .. } => description.clone(),
            Entity::ArraySubobject { index, .. } => format!("[{index}]"),
            Entity::MemberSubobject { name, .. } => format!(".{name}"),
            Entity::BaseSubobject { .. } => "[base]".to_string(),
            Entity::NewObject { .. } => "[new object]".to_string(),
        }
    }
}

/// What a name in a scope refers to: one variable, or a set of function
/// overloads
#[derive(Debug, Clone)]
pub enum Declared {
    Variable(EntityId),
    Functions(Vec<EntityId>),
}

/// A lexical scope
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    names: FxHashMap<String, Declared>,
}

impl Scope {
    pub fn new(parent: Option<ScopeId>) -> Self {
        Scope {
            parent,
            names: FxHashMap::default(),
        }
    }

    /// Declare a variable name.  Returns false on a conflicting
    /// redeclaration (the caller attaches the note).
    pub fn declare_variable(&mut self, name: &str, entity: EntityId) -> bool {
        if self.names.contains_key(name) {
            return false;
        }
        self.names
            .insert(name.to_string(), Declared::Variable(entity));
        true
    }

    /// Declare a function name, adding to the overload set if the name
    /// already names functions.  Returns false if the name is taken by a
    /// variable.
    pub fn declare_function(&mut self, name: &str, entity: EntityId) -> bool {
        match self.names.get_mut(name) {
            None => {
                self.names
                    .insert(name.to_string(), Declared::Functions(vec![entity]));
                true
            }
            Some(Declared::Functions(set)) => {
                set.push(entity);
                true
            }
            Some(Declared::Variable(_)) => false,
        }
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Declared> {
        self.names.get(name)
    }
}

/// Walk the scope chain looking for a name
pub fn lookup(scopes: &[Scope], mut scope: ScopeId, name: &str) -> Option<Declared> {
    loop {
        let s = &scopes[scope.0];
        if let Some(found) = s.lookup_local(name) {
            return Some(found.clone());
        }
        scope = s.parent?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let mut scopes = vec![Scope::new(None)];
        scopes[0].declare_variable("x", EntityId(0));
        scopes.push(Scope::new(Some(ScopeId(0))));

        match lookup(&scopes, ScopeId(1), "x") {
            Some(Declared::Variable(e)) => assert_eq!(e, EntityId(0)),
            other => panic!("unexpected lookup result: {other:?}"),
        }
        assert!(lookup(&scopes, ScopeId(1), "y").is_none());
    }

    #[test]
    fn inner_declaration_shadows_outer() {
        let mut scopes = vec![Scope::new(None), Scope::new(Some(ScopeId(0)))];
        scopes[0].declare_variable("x", EntityId(0));
        scopes[1].declare_variable("x", EntityId(1));

        match lookup(&scopes, ScopeId(1), "x") {
            Some(Declared::Variable(e)) => assert_eq!(e, EntityId(1)),
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn variable_name_conflicts_with_function() {
        let mut scope = Scope::new(None);
        assert!(scope.declare_variable("f", EntityId(0)));
        assert!(!scope.declare_function("f", EntityId(1)));
    }
}
