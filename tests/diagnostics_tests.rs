// Compile-time diagnostics: semantic problems become notes, compilation
// keeps going, and severity decides whether the program is simulatable.

use cppstep::ast::*;
use cppstep::compiler::notes::{NoteKind, Severity};
use cppstep::compiler::Program;

fn loc() -> SourceLocation {
    SourceLocation::default()
}

fn int_spec() -> TypeSpec {
    TypeSpec::new(BaseTypeSpec::Int)
}

fn main_with(body: Vec<StmtAst>) -> TranslationUnit {
    TranslationUnit {
        declarations: vec![DeclAst::Function(FunctionAst {
            name: "main".to_string(),
            return_type: int_spec(),
            params: vec![],
            body,
            location: loc(),
        })],
    }
}

fn with_class(class: ClassAst, body: Vec<StmtAst>) -> TranslationUnit {
    let mut tu = main_with(body);
    tu.declarations.insert(0, DeclAst::Class(class));
    tu
}

// char buf[1] = "hi";  — the literal (with its null) does not fit
#[test]
fn oversized_string_literal_is_an_error() {
    let program = Program::compile(&main_with(vec![StmtAst::Declaration(VarDeclAst {
        name: "buf".to_string(),
        type_spec: TypeSpec::new(BaseTypeSpec::Char).with_array(1),
        init: InitializerAst::Copy(Box::new(ExprAst::StringLiteral("hi".to_string(), loc()))),
        location: loc(),
    })]));
    assert!(program.has_errors());
    assert!(program
        .all_notes()
        .iter()
        .any(|n| n.kind == NoteKind::StringLiteralTooLong));
}

// A user destructor with an empty body and no copy constructor: suspicious,
// but harmless — a warning.
#[test]
fn empty_destructor_without_copy_constructor_warns() {
    let program = Program::compile(&with_class(
        ClassAst {
            name: "T".to_string(),
            base: None,
            members: vec![MemberAst::Destructor {
                body: vec![],
                location: loc(),
            }],
            location: loc(),
        },
        vec![StmtAst::Return {
            expr: Some(ExprAst::IntLiteral(0, loc())),
            location: loc(),
        }],
    ));
    assert!(!program.has_errors(), "{:?}", program.all_notes());
    let notes = program.all_notes();
    let rule = notes
        .iter()
        .find(|n| n.kind == NoteKind::RuleOfThree)
        .expect("rule-of-three note present");
    assert_eq!(rule.severity, Severity::Warning);
}

// A destructor that actually does something without a copy constructor:
// copies of the class will double-manage the resource — an error.
#[test]
fn nonempty_destructor_without_copy_constructor_is_an_error() {
    let program = Program::compile(&with_class(
        ClassAst {
            name: "T".to_string(),
            base: None,
            members: vec![MemberAst::Destructor {
                body: vec![StmtAst::Null { location: loc() }],
                location: loc(),
            }],
            location: loc(),
        },
        vec![],
    ));
    assert!(program.has_errors());
    let notes = program.all_notes();
    let rule = notes
        .iter()
        .find(|n| n.kind == NoteKind::RuleOfThree)
        .expect("rule-of-three note present");
    assert!(rule.is_error());
}

// C c = {1};  — aggregate-style list initialization of a class is not in
// the subset
#[test]
fn list_initialization_of_a_class_is_rejected() {
    let program = Program::compile(&with_class(
        ClassAst {
            name: "C".to_string(),
            base: None,
            members: vec![MemberAst::Field {
                name: "a".to_string(),
                type_spec: int_spec(),
                location: loc(),
            }],
            location: loc(),
        },
        vec![StmtAst::Declaration(VarDeclAst {
            name: "c".to_string(),
            type_spec: TypeSpec::new(BaseTypeSpec::Class("C".to_string())),
            init: InitializerAst::List(vec![ExprAst::IntLiteral(1, loc())]),
            location: loc(),
        })],
    ));
    assert!(program.has_errors());
    assert!(program
        .all_notes()
        .iter()
        .any(|n| n.kind == NoteKind::ListInitClass));
}

// delete x;  — the operand must be a pointer to a complete object type
#[test]
fn delete_of_a_non_pointer_is_an_error() {
    let program = Program::compile(&main_with(vec![
        StmtAst::Declaration(VarDeclAst {
            name: "x".to_string(),
            type_spec: int_spec(),
            init: InitializerAst::Value,
            location: loc(),
        }),
        StmtAst::Expression {
            expr: ExprAst::Delete {
                operand: Box::new(ExprAst::Identifier("x".to_string(), loc())),
                array_form: false,
                location: loc(),
            },
            location: loc(),
        },
    ]));
    assert!(program.has_errors());
    assert!(program
        .all_notes()
        .iter()
        .any(|n| n.kind == NoteKind::DeleteInvalidOperand));
}
