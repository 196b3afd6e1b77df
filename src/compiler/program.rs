//! Whole-program compilation
//!
//! [`Program::compile`] drives the two compilation passes over a translation
//! unit and produces the immutable tables the runtime executes against.
//! Pass one registers classes and function signatures; global variables are
//! then compiled in declaration order; pass two compiles every function,
//! constructor, and destructor body.  Finally the synthetic call to `main`
//! and the static-storage deallocator are built.

use tracing::debug;

use crate::ast::{DeclAst, SourceLocation, TranslationUnit};
use crate::compiler::constructs::{Construct, ConstructId, DeallocKind};
use crate::compiler::deallocators::compile_deallocator;
use crate::compiler::declarations;
use crate::compiler::entities::{Entity, EntityId, Scope, ScopeId};
use crate::compiler::expressions::compile_call;
use crate::compiler::notes::{Note, NoteKind};
use crate::compiler::Compilation;
use crate::types::{ClassDefinition, ClassId, Type};

/// A fully compiled program, ready to be simulated (if error-free)
#[derive(Debug, Clone)]
pub struct Program {
    pub constructs: Vec<Construct>,
    pub entities: Vec<Entity>,
    pub scopes: Vec<Scope>,
    pub classes: Vec<ClassDefinition>,
    pub string_literals: Vec<Vec<i8>>,
    pub global_scope: ScopeId,
    /// Global variable declaration constructs, in declaration order
    pub globals: Vec<ConstructId>,
    /// Entities of static storage duration, in initialization order
    pub static_entities: Vec<EntityId>,
    /// Destroys the statics after `main` returns
    pub static_deallocator: ConstructId,
    pub main: Option<EntityId>,
    /// The synthetic `FunctionCall` construct that starts execution
    pub main_call: Option<ConstructId>,
    /// Diagnostics not attached to any construct
    pub notes: Vec<Note>,
}

impl Program {
    pub fn compile(tu: &TranslationUnit) -> Program {
        let mut cmp = Compilation::new();
        let global_scope = cmp.add_scope(None);

        // pass 1: classes and function signatures, in declaration order
        let mut function_entities = Vec::new();
        for decl in &tu.declarations {
            match decl {
                DeclAst::Class(c) => {
                    declarations::register_class(&mut cmp, c);
                }
                DeclAst::Function(f) => {
                    let entity = declarations::register_function(&mut cmp, global_scope, f);
                    function_entities.push(entity);
                }
                DeclAst::GlobalVariable(_) => {}
            }
        }

        // globals next, so function bodies can name them
        let mut globals = Vec::new();
        let mut static_entities = Vec::new();
        for decl in &tu.declarations {
            if let DeclAst::GlobalVariable(v) = decl {
                let (node, entity) =
                    declarations::compile_global_variable(&mut cmp, global_scope, v);
                globals.push(node);
                static_entities.push(entity);
            }
        }

        // pass 2: bodies
        let mut next_function = 0;
        for decl in &tu.declarations {
            match decl {
                DeclAst::Function(f) => {
                    let entity = function_entities[next_function];
                    next_function += 1;
                    if let Some(entity) = entity {
                        declarations::compile_function_body(&mut cmp, global_scope, entity, f);
                    }
                }
                DeclAst::Class(c) => {
                    declarations::compile_class_bodies(&mut cmp, global_scope, c);
                }
                DeclAst::GlobalVariable(_) => {}
            }
        }

        let static_deallocator = compile_deallocator(
            &mut cmp,
            DeallocKind::Statics,
            &static_entities,
            SourceLocation::default(),
        );

        let main = find_main(&cmp, global_scope);
        let main_call = main.map(|entity| {
            let call = compile_call(&mut cmp, entity, Vec::new(), SourceLocation::default());
            cmp.seal_full_expression(call);
            call
        });
        if main.is_none() {
            cmp.notes.push(Note::error(
                NoteKind::NoMatchingFunction,
                "No function 'int main()' was found",
            ));
        }

        debug!(
            constructs = cmp.constructs.len(),
            entities = cmp.entities.len(),
            classes = cmp.classes.len(),
            "program compiled"
        );

        let Compilation {
            constructs,
            entities,
            scopes,
            classes,
            string_literals,
            notes,
        } = cmp;
        Program {
            constructs,
            entities,
            scopes,
            classes,
            string_literals,
            global_scope,
            globals,
            static_entities,
            static_deallocator,
            main,
            main_call,
            notes,
        }
    }

    pub fn construct(&self, id: ConstructId) -> &Construct {
        &self.constructs[id.0]
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn class(&self, id: ClassId) -> &ClassDefinition {
        &self.classes[id.0]
    }

    /// All diagnostics: free-floating notes plus every note in the construct
    /// arena
    pub fn all_notes(&self) -> Vec<Note> {
        let mut out = self.notes.clone();
        for c in &self.constructs {
            out.extend(c.notes.iter().cloned());
        }
        out
    }

    pub fn has_errors(&self) -> bool {
        self.notes.iter().any(|n| n.is_error())
            || self
                .constructs
                .iter()
                .any(|c| c.notes.iter().any(|n| n.is_error()))
    }
}

fn find_main(cmp: &Compilation, global_scope: ScopeId) -> Option<EntityId> {
    use crate::compiler::entities::Declared;
    match crate::compiler::entities::lookup(&cmp.scopes, global_scope, "main")? {
        Declared::Functions(set) => set.into_iter().find(|&f| {
            matches!(
                cmp.entity(f),
                Entity::Function { signature, .. }
                    if signature.param_types.is_empty()
                        && signature.return_type == Type::int()
            )
        }),
        Declared::Variable(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn int_main(body: Vec<StmtAst>) -> TranslationUnit {
        TranslationUnit {
            declarations: vec![DeclAst::Function(FunctionAst {
                name: "main".to_string(),
                return_type: TypeSpec::new(BaseTypeSpec::Int),
                params: vec![],
                body,
                location: SourceLocation::default(),
            })],
        }
    }

    #[test]
    fn empty_main_compiles_without_errors() {
        let program = Program::compile(&int_main(vec![]));
        assert!(!program.has_errors(), "{:?}", program.all_notes());
        assert!(program.main.is_some());
        assert!(program.main_call.is_some());
    }

    #[test]
    fn missing_main_is_an_error() {
        let program = Program::compile(&TranslationUnit::new());
        assert!(program.has_errors());
    }

    #[test]
    fn undeclared_name_in_main_is_reported() {
        let program = Program::compile(&int_main(vec![StmtAst::Expression {
            expr: ExprAst::Identifier("ghost".to_string(), SourceLocation::new(2, 5)),
            location: SourceLocation::new(2, 5),
        }]));
        assert!(program.has_errors());
        let notes = program.all_notes();
        assert!(notes
            .iter()
            .any(|n| n.kind == NoteKind::NameNotFound && n.location.map(|l| l.line) == Some(2)));
    }

    #[test]
    fn global_variables_become_static_entities() {
        let mut tu = int_main(vec![]);
        tu.declarations.insert(
            0,
            DeclAst::GlobalVariable(VarDeclAst {
                name: "g".to_string(),
                type_spec: TypeSpec::new(BaseTypeSpec::Int),
                init: InitializerAst::Copy(Box::new(ExprAst::IntLiteral(
                    3,
                    SourceLocation::default(),
                ))),
                location: SourceLocation::default(),
            }),
        );
        let program = Program::compile(&tu);
        assert!(!program.has_errors(), "{:?}", program.all_notes());
        assert_eq!(program.static_entities.len(), 1);
    }
}
