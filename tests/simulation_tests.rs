// End-to-end simulation tests: build a small program AST, compile it, run
// the simulation to completion, and check values, events, and faults.

use cppstep::ast::*;
use cppstep::compiler::entities::{Entity, EntityId};
use cppstep::compiler::Program;
use cppstep::memory::{StorageKind, Value};
use cppstep::runtime::{Event, FaultKind, Simulation};

fn loc() -> SourceLocation {
    SourceLocation::default()
}

fn int_spec() -> TypeSpec {
    TypeSpec::new(BaseTypeSpec::Int)
}

fn lit(v: i32) -> ExprAst {
    ExprAst::IntLiteral(v, loc())
}

fn ident(name: &str) -> ExprAst {
    ExprAst::Identifier(name.to_string(), loc())
}

fn bin(op: BinaryOp, lhs: ExprAst, rhs: ExprAst) -> ExprAst {
    ExprAst::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        location: loc(),
    }
}

fn assign(lhs: ExprAst, rhs: ExprAst) -> ExprAst {
    ExprAst::Assignment {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        location: loc(),
    }
}

fn deref(operand: ExprAst) -> ExprAst {
    ExprAst::Unary {
        op: UnaryOp::Deref,
        operand: Box::new(operand),
        location: loc(),
    }
}

fn addr_of(operand: ExprAst) -> ExprAst {
    ExprAst::Unary {
        op: UnaryOp::AddrOf,
        operand: Box::new(operand),
        location: loc(),
    }
}

fn copy_init(e: ExprAst) -> InitializerAst {
    InitializerAst::Copy(Box::new(e))
}

fn var(name: &str, spec: TypeSpec, init: InitializerAst) -> StmtAst {
    StmtAst::Declaration(VarDeclAst {
        name: name.to_string(),
        type_spec: spec,
        init,
        location: loc(),
    })
}

fn expr_stmt(e: ExprAst) -> StmtAst {
    StmtAst::Expression {
        expr: e,
        location: loc(),
    }
}

fn ret(e: ExprAst) -> StmtAst {
    StmtAst::Return {
        expr: Some(e),
        location: loc(),
    }
}

fn func(name: &str, return_type: TypeSpec, params: Vec<ParamAst>, body: Vec<StmtAst>) -> DeclAst {
    DeclAst::Function(FunctionAst {
        name: name.to_string(),
        return_type,
        params,
        body,
        location: loc(),
    })
}

fn main_with(body: Vec<StmtAst>) -> TranslationUnit {
    TranslationUnit {
        declarations: vec![func("main", int_spec(), vec![], body)],
    }
}

fn compile(tu: &TranslationUnit) -> Program {
    let program = Program::compile(tu);
    assert!(
        !program.has_errors(),
        "unexpected compile errors: {:?}",
        program.all_notes()
    );
    program
}

fn run(tu: TranslationUnit) -> Simulation {
    let mut sim = Simulation::new(compile(&tu));
    sim.step_to_end();
    sim
}

fn fault_free(sim: &Simulation) {
    let faults: Vec<_> = sim.events().faults().collect();
    assert!(faults.is_empty(), "unexpected faults: {faults:?}");
}

// int main() { int x = 5; return x; }
#[test]
fn returns_the_value_of_a_local() {
    let sim = run(main_with(vec![
        var("x", int_spec(), copy_init(lit(5))),
        ret(ident("x")),
    ]));
    assert!(sim.at_end());
    assert_eq!(sim.return_value(), Some(Value::Int(5)));
    fault_free(&sim);
}

// int main() { int x = 5; int y = 10; return x + y; }
#[test]
fn adds_two_locals() {
    let sim = run(main_with(vec![
        var("x", int_spec(), copy_init(lit(5))),
        var("y", int_spec(), copy_init(lit(10))),
        ret(bin(BinaryOp::Add, ident("x"), ident("y"))),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(15)));
    fault_free(&sim);
}

// int add(int a, int b) { return a + b; }
// int main() { int r = add(3, 4); return r; }
#[test]
fn calls_a_function_with_parameters() {
    let tu = TranslationUnit {
        declarations: vec![
            func(
                "add",
                int_spec(),
                vec![
                    ParamAst {
                        name: "a".to_string(),
                        type_spec: int_spec(),
                    },
                    ParamAst {
                        name: "b".to_string(),
                        type_spec: int_spec(),
                    },
                ],
                vec![ret(bin(BinaryOp::Add, ident("a"), ident("b")))],
            ),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "r",
                        int_spec(),
                        copy_init(ExprAst::FunctionCall {
                            name: "add".to_string(),
                            args: vec![lit(3), lit(4)],
                            location: loc(),
                        }),
                    ),
                    ret(ident("r")),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(7)));
    fault_free(&sim);
}

// void inc(int& n) { n = n + 1; }
// int main() { int x = 1; inc(x); return x; }
#[test]
fn reference_parameters_mutate_the_caller_object() {
    let tu = TranslationUnit {
        declarations: vec![
            func(
                "inc",
                TypeSpec::new(BaseTypeSpec::Void),
                vec![ParamAst {
                    name: "n".to_string(),
                    type_spec: int_spec().with_reference(),
                }],
                vec![expr_stmt(assign(
                    ident("n"),
                    bin(BinaryOp::Add, ident("n"), lit(1)),
                ))],
            ),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var("x", int_spec(), copy_init(lit(1))),
                    expr_stmt(ExprAst::FunctionCall {
                        name: "inc".to_string(),
                        args: vec![ident("x")],
                        location: loc(),
                    }),
                    ret(ident("x")),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(2)));
    fault_free(&sim);
}

// int main() { int x{}; return x; }
#[test]
fn value_initialization_zeroes_an_int() {
    let sim = run(main_with(vec![
        var("x", int_spec(), InitializerAst::Value),
        ret(ident("x")),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
    fault_free(&sim);
}

// int main() { int x; return x; }  — reading x is undefined behavior
#[test]
fn reading_an_uninitialized_local_is_undefined() {
    let sim = run(main_with(vec![
        var("x", int_spec(), InitializerAst::Default),
        ret(ident("x")),
    ]));
    assert!(sim.at_end());
    assert!(sim.events().has_fault(FaultKind::UndefinedBehavior));
    // the stand-in value after the faulting read is zero
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
}

// int main() { int x = 1; }  — implicit return 0
#[test]
fn main_without_a_return_returns_zero() {
    let sim = run(main_with(vec![var("x", int_spec(), copy_init(lit(1)))]));
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
    fault_free(&sim);
}

// int f() { }  — flowing off the end of a non-void function
#[test]
fn flowing_off_the_end_of_a_non_void_function_is_undefined() {
    let tu = TranslationUnit {
        declarations: vec![
            func("f", int_spec(), vec![], vec![]),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "x",
                        int_spec(),
                        copy_init(ExprAst::FunctionCall {
                            name: "f".to_string(),
                            args: vec![],
                            location: loc(),
                        }),
                    ),
                    ret(lit(0)),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert!(sim.at_end());
    assert!(sim.events().has_fault(FaultKind::UndefinedBehavior));
}

// int main() { int i = 0; while (i < 3) { i = i + 1; } return i; }
#[test]
fn while_loop_runs_until_the_condition_fails() {
    let sim = run(main_with(vec![
        var("i", int_spec(), copy_init(lit(0))),
        StmtAst::While {
            condition: bin(BinaryOp::Lt, ident("i"), lit(3)),
            body: Box::new(StmtAst::Block {
                statements: vec![expr_stmt(assign(
                    ident("i"),
                    bin(BinaryOp::Add, ident("i"), lit(1)),
                ))],
                location: loc(),
            }),
            location: loc(),
        },
        ret(ident("i")),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(3)));
    fault_free(&sim);
}

// int main() { int s = 0; for (int i = 0; i < 4; i = i + 1) { s = s + i; } return s; }
#[test]
fn for_loop_desugars_and_runs() {
    let sim = run(main_with(vec![
        var("s", int_spec(), copy_init(lit(0))),
        StmtAst::For {
            init: Some(Box::new(var("i", int_spec(), copy_init(lit(0))))),
            condition: Some(bin(BinaryOp::Lt, ident("i"), lit(4))),
            post: Some(assign(ident("i"), bin(BinaryOp::Add, ident("i"), lit(1)))),
            body: Box::new(StmtAst::Block {
                statements: vec![expr_stmt(assign(
                    ident("s"),
                    bin(BinaryOp::Add, ident("s"), ident("i")),
                ))],
                location: loc(),
            }),
            location: loc(),
        },
        ret(ident("s")),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(6)));
    fault_free(&sim);
}

// int main() { int x = 4; if (x > 3) { return 1; } else { return 2; } }
#[test]
fn if_takes_the_true_branch() {
    let sim = run(main_with(vec![
        var("x", int_spec(), copy_init(lit(4))),
        StmtAst::If {
            condition: bin(BinaryOp::Gt, ident("x"), lit(3)),
            then_stmt: Box::new(StmtAst::Block {
                statements: vec![ret(lit(1))],
                location: loc(),
            }),
            else_stmt: Some(Box::new(StmtAst::Block {
                statements: vec![ret(lit(2))],
                location: loc(),
            })),
            location: loc(),
        },
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(1)));
    fault_free(&sim);
}

// bool ok = false && x / 0 == 0;  — the division is never evaluated
#[test]
fn logical_and_short_circuits() {
    let sim = run(main_with(vec![
        var("x", int_spec(), copy_init(lit(1))),
        var(
            "ok",
            TypeSpec::new(BaseTypeSpec::Bool),
            copy_init(bin(
                BinaryOp::LogicalAnd,
                ExprAst::BoolLiteral(false, loc()),
                bin(
                    BinaryOp::Eq,
                    bin(BinaryOp::Div, ident("x"), lit(0)),
                    lit(0),
                ),
            )),
        ),
        ret(lit(0)),
    ]));
    fault_free(&sim);
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
}

// int y = x / 0;  — reported, execution continues
#[test]
fn division_by_zero_is_undefined_but_not_fatal() {
    let sim = run(main_with(vec![
        var("x", int_spec(), copy_init(lit(1))),
        var("y", int_spec(), copy_init(bin(BinaryOp::Div, ident("x"), lit(0)))),
        ret(ident("y")),
    ]));
    assert!(sim.at_end());
    assert!(sim.events().has_fault(FaultKind::UndefinedBehavior));
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
}

// int c = big + 1;  — signed overflow wraps, with a fault
#[test]
fn signed_overflow_is_undefined() {
    let sim = run(main_with(vec![
        var("big", int_spec(), copy_init(lit(i32::MAX))),
        var(
            "c",
            int_spec(),
            copy_init(bin(BinaryOp::Add, ident("big"), lit(1))),
        ),
        ret(lit(0)),
    ]));
    assert!(sim.at_end());
    assert!(sim.events().has_fault(FaultKind::UndefinedBehavior));
}

// bool b = &x < &y;  — ordering pointers into unrelated objects
#[test]
fn relational_comparison_of_unrelated_pointers_is_unspecified() {
    let sim = run(main_with(vec![
        var("x", int_spec(), InitializerAst::Value),
        var("y", int_spec(), InitializerAst::Value),
        var(
            "b",
            TypeSpec::new(BaseTypeSpec::Bool),
            copy_init(bin(BinaryOp::Lt, addr_of(ident("x")), addr_of(ident("y")))),
        ),
        ret(lit(0)),
    ]));
    assert!(sim.at_end());
    assert!(sim.events().has_fault(FaultKind::UnspecifiedBehavior));
    // a value is still produced and execution runs to completion
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
}

// int x = 1; int& r = x; r = 5; return x;
#[test]
fn references_alias_their_bound_object() {
    let sim = run(main_with(vec![
        var("x", int_spec(), copy_init(lit(1))),
        var("r", int_spec().with_reference(), copy_init(ident("x"))),
        expr_stmt(assign(ident("r"), lit(5))),
        ret(ident("x")),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(5)));
    let bound = sim
        .events()
        .iter()
        .any(|(_, e)| matches!(e, Event::ReferenceBound { .. }));
    let unbound = sim
        .events()
        .iter()
        .any(|(_, e)| matches!(e, Event::ReferenceUnbound { .. }));
    assert!(bound && unbound);
    fault_free(&sim);
}

// Locals die in reverse declaration order on block exit.
#[test]
fn locals_are_destroyed_in_reverse_declaration_order() {
    let sim = run(main_with(vec![
        var("a", int_spec(), copy_init(lit(1))),
        var("b", int_spec(), copy_init(lit(2))),
        var("c", int_spec(), copy_init(lit(3))),
        ret(lit(0)),
    ]));
    fault_free(&sim);
    let ended: Vec<i32> = sim
        .events()
        .iter()
        .filter_map(|(_, e)| match e {
            Event::LifetimeEnded { object } => sim.memory().object(*object).value,
            _ => None,
        })
        .filter_map(|v| match v {
            Value::Int(i) if (1..=3).contains(&i) => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![3, 2, 1]);
}

// char buf[5] = "hi";  — copied from the literal, null-padded
#[test]
fn char_array_initializes_from_a_string_literal() {
    let sim = run(main_with(vec![
        var(
            "buf",
            TypeSpec::new(BaseTypeSpec::Char).with_array(5),
            copy_init(ExprAst::StringLiteral("hi".to_string(), loc())),
        ),
        ret(ExprAst::Subscript {
            operand: Box::new(ident("buf")),
            index: Box::new(lit(1)),
            location: loc(),
        }),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(105))); // 'i'
    fault_free(&sim);
    let pad = sim
        .memory()
        .objects()
        .iter()
        .find(|o| o.name.as_deref() == Some("buf[4]"))
        .expect("padded element exists");
    assert_eq!(pad.value, Some(Value::Char(0)));
}

// class P { int x; int y; P(int a, int b) : x(a), y(b) {} };
// int main() { P p(3, 4); return p.x + p.y; }
#[test]
fn constructor_member_initializers_run() {
    let class = DeclAst::Class(ClassAst {
        name: "P".to_string(),
        base: None,
        members: vec![
            MemberAst::Field {
                name: "x".to_string(),
                type_spec: int_spec(),
                location: loc(),
            },
            MemberAst::Field {
                name: "y".to_string(),
                type_spec: int_spec(),
                location: loc(),
            },
            MemberAst::Constructor {
                params: vec![
                    ParamAst {
                        name: "a".to_string(),
                        type_spec: int_spec(),
                    },
                    ParamAst {
                        name: "b".to_string(),
                        type_spec: int_spec(),
                    },
                ],
                member_inits: vec![
                    MemberInitAst {
                        name: "x".to_string(),
                        args: vec![ident("a")],
                        location: loc(),
                    },
                    MemberInitAst {
                        name: "y".to_string(),
                        args: vec![ident("b")],
                        location: loc(),
                    },
                ],
                body: vec![],
                location: loc(),
            },
        ],
        location: loc(),
    });
    let member = |obj: &str, m: &str| ExprAst::MemberAccess {
        object: Box::new(ident(obj)),
        member: m.to_string(),
        location: loc(),
    };
    let tu = TranslationUnit {
        declarations: vec![
            class,
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "p",
                        TypeSpec::new(BaseTypeSpec::Class("P".to_string())),
                        InitializerAst::Direct(vec![lit(3), lit(4)]),
                    ),
                    ret(bin(BinaryOp::Add, member("p", "x"), member("p", "y"))),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(7)));
    fault_free(&sim);
}

// class Q { int n; };  Q q{};  — value initialization zero-fills
#[test]
fn value_initialized_class_reads_as_zero() {
    let tu = TranslationUnit {
        declarations: vec![
            DeclAst::Class(ClassAst {
                name: "Q".to_string(),
                base: None,
                members: vec![MemberAst::Field {
                    name: "n".to_string(),
                    type_spec: int_spec(),
                    location: loc(),
                }],
                location: loc(),
            }),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "q",
                        TypeSpec::new(BaseTypeSpec::Class("Q".to_string())),
                        InitializerAst::Value,
                    ),
                    ret(ExprAst::MemberAccess {
                        object: Box::new(ident("q")),
                        member: "n".to_string(),
                        location: loc(),
                    }),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
    fault_free(&sim);
}

// class B { int b; }; class D : B { int d; };  — base members reachable
// through a derived object
#[test]
fn base_class_members_are_accessible_through_derived() {
    let member = |obj: &str, m: &str| ExprAst::MemberAccess {
        object: Box::new(ident(obj)),
        member: m.to_string(),
        location: loc(),
    };
    let tu = TranslationUnit {
        declarations: vec![
            DeclAst::Class(ClassAst {
                name: "B".to_string(),
                base: None,
                members: vec![MemberAst::Field {
                    name: "b".to_string(),
                    type_spec: int_spec(),
                    location: loc(),
                }],
                location: loc(),
            }),
            DeclAst::Class(ClassAst {
                name: "D".to_string(),
                base: Some("B".to_string()),
                members: vec![MemberAst::Field {
                    name: "d".to_string(),
                    type_spec: int_spec(),
                    location: loc(),
                }],
                location: loc(),
            }),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "x",
                        TypeSpec::new(BaseTypeSpec::Class("D".to_string())),
                        InitializerAst::Default,
                    ),
                    expr_stmt(assign(member("x", "b"), lit(1))),
                    expr_stmt(assign(member("x", "d"), lit(2))),
                    ret(bin(BinaryOp::Add, member("x", "b"), member("x", "d"))),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(3)));
    fault_free(&sim);
}

// class T { ~T() {} };  T a; T b;  — destructors run back to front
#[test]
fn destructors_run_once_per_object_in_reverse_order() {
    let tu = TranslationUnit {
        declarations: vec![
            DeclAst::Class(ClassAst {
                name: "T".to_string(),
                base: None,
                members: vec![MemberAst::Destructor {
                    body: vec![],
                    location: loc(),
                }],
                location: loc(),
            }),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "a",
                        TypeSpec::new(BaseTypeSpec::Class("T".to_string())),
                        InitializerAst::Default,
                    ),
                    var(
                        "b",
                        TypeSpec::new(BaseTypeSpec::Class("T".to_string())),
                        InitializerAst::Default,
                    ),
                    ret(lit(0)),
                ],
            ),
        ],
    };
    let sim = run(tu);
    fault_free(&sim);
    let dtor = sim
        .program()
        .entities
        .iter()
        .position(|e| matches!(e, Entity::Function { name, .. } if name == "~T"))
        .map(EntityId)
        .expect("destructor entity exists");
    let calls = sim
        .events()
        .iter()
        .filter(|(_, e)| matches!(e, Event::FunctionCalled { function } if *function == dtor))
        .count();
    assert_eq!(calls, 2);
    // b's storage ends before a's
    let ended: Vec<&str> = sim
        .events()
        .iter()
        .filter_map(|(_, e)| match e {
            Event::LifetimeEnded { object } => sim.memory().object(*object).name.as_deref(),
            _ => None,
        })
        .filter(|n| *n == "a" || *n == "b")
        .collect();
    assert_eq!(ended, vec!["b", "a"]);
}

// int* p = new int(7); int v = *p; delete p; return v;
#[test]
fn new_and_delete_round_trip() {
    let sim = run(main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::New {
                target_type: int_spec(),
                init: Some(InitializerAst::Direct(vec![lit(7)])),
                location: loc(),
            }),
        ),
        var("v", int_spec(), copy_init(deref(ident("p")))),
        expr_stmt(ExprAst::Delete {
            operand: Box::new(ident("p")),
            array_form: false,
            location: loc(),
        }),
        ret(ident("v")),
    ]));
    assert_eq!(sim.return_value(), Some(Value::Int(7)));
    fault_free(&sim);
    let freed = sim
        .events()
        .iter()
        .any(|(_, e)| matches!(e, Event::ObjectDeallocated { .. }));
    assert!(freed);
}

// delete p; delete p;  — the second delete is a double free, reported once
#[test]
fn double_free_is_reported_exactly_once() {
    let delete_p = || {
        expr_stmt(ExprAst::Delete {
            operand: Box::new(ident("p")),
            array_form: false,
            location: loc(),
        })
    };
    let sim = run(main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::New {
                target_type: int_spec(),
                init: Some(InitializerAst::Direct(vec![lit(1)])),
                location: loc(),
            }),
        ),
        delete_p(),
        delete_p(),
        ret(lit(0)),
    ]));
    assert!(sim.at_end());
    assert_eq!(sim.events().fault_count(FaultKind::UndefinedBehavior), 1);
}

// delete on a null pointer does nothing
#[test]
fn deleting_a_null_pointer_is_a_noop() {
    let sim = run(main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::NullptrLiteral(loc())),
        ),
        expr_stmt(ExprAst::Delete {
            operand: Box::new(ident("p")),
            array_form: false,
            location: loc(),
        }),
        ret(lit(0)),
    ]));
    fault_free(&sim);
    assert_eq!(sim.return_value(), Some(Value::Int(0)));
}

// int* p = new int[3]; delete p;  — wrong delete form, cleanup proceeds
#[test]
fn scalar_delete_of_an_array_allocation_is_undefined() {
    let sim = run(main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::New {
                target_type: int_spec().with_array(3),
                init: None,
                location: loc(),
            }),
        ),
        expr_stmt(ExprAst::Delete {
            operand: Box::new(ident("p")),
            array_form: false,
            location: loc(),
        }),
        ret(lit(0)),
    ]));
    assert!(sim.at_end());
    assert_eq!(sim.events().fault_count(FaultKind::UndefinedBehavior), 1);
    // the allocation was still released, so nothing leaks
    assert_eq!(sim.events().fault_count(FaultKind::MemoryLeak), 0);
    let freed = sim
        .events()
        .iter()
        .any(|(_, e)| matches!(e, Event::ObjectDeallocated { .. }));
    assert!(freed);
}

// class T { ~T() {} };  T* p = new T[2]; delete[] p;  — one destructor call
// per element
#[test]
fn array_delete_runs_element_destructors() {
    let class_t = || TypeSpec::new(BaseTypeSpec::Class("T".to_string()));
    let tu = TranslationUnit {
        declarations: vec![
            DeclAst::Class(ClassAst {
                name: "T".to_string(),
                base: None,
                members: vec![MemberAst::Destructor {
                    body: vec![],
                    location: loc(),
                }],
                location: loc(),
            }),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "p",
                        class_t().with_pointer(),
                        copy_init(ExprAst::New {
                            target_type: class_t().with_array(2),
                            init: None,
                            location: loc(),
                        }),
                    ),
                    expr_stmt(ExprAst::Delete {
                        operand: Box::new(ident("p")),
                        array_form: true,
                        location: loc(),
                    }),
                    ret(lit(0)),
                ],
            ),
        ],
    };
    let sim = run(tu);
    fault_free(&sim);
    let dtor = sim
        .program()
        .entities
        .iter()
        .position(|e| matches!(e, Entity::Function { name, .. } if name == "~T"))
        .map(EntityId)
        .expect("destructor entity exists");
    let calls = sim
        .events()
        .iter()
        .filter(|(_, e)| matches!(e, Event::FunctionCalled { function } if *function == dtor))
        .count();
    assert_eq!(calls, 2);
    let freed = sim
        .events()
        .iter()
        .any(|(_, e)| matches!(e, Event::ObjectDeallocated { .. }));
    assert!(freed);
}

// Overwriting the only pointer to an allocation leaks it; so does letting
// the last pointer go out of scope.
#[test]
fn unreachable_allocations_are_reported_as_leaks() {
    let sim = run(main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::New {
                target_type: int_spec(),
                init: Some(InitializerAst::Direct(vec![lit(1)])),
                location: loc(),
            }),
        ),
        expr_stmt(assign(
            ident("p"),
            ExprAst::New {
                target_type: int_spec(),
                init: Some(InitializerAst::Direct(vec![lit(2)])),
                location: loc(),
            },
        )),
        ret(lit(0)),
    ]));
    assert!(sim.at_end());
    assert_eq!(sim.events().fault_count(FaultKind::MemoryLeak), 2);
}

// int* p = new int(5); delete p; return *p;  — use after free
#[test]
fn reading_through_a_dangling_pointer_is_undefined() {
    let sim = run(main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::New {
                target_type: int_spec(),
                init: Some(InitializerAst::Direct(vec![lit(5)])),
                location: loc(),
            }),
        ),
        expr_stmt(ExprAst::Delete {
            operand: Box::new(ident("p")),
            array_form: false,
            location: loc(),
        }),
        ret(deref(ident("p"))),
    ]));
    assert!(sim.at_end());
    assert!(sim.events().has_fault(FaultKind::UndefinedBehavior));
}

// int* p = nullptr; int v = *p;  — crash, simulation halts
#[test]
fn null_dereference_crashes_the_simulation() {
    let tu = main_with(vec![
        var(
            "p",
            int_spec().with_pointer(),
            copy_init(ExprAst::NullptrLiteral(loc())),
        ),
        var("v", int_spec(), copy_init(deref(ident("p")))),
        ret(ident("v")),
    ]);
    let mut sim = Simulation::new(compile(&tu));
    sim.step_to_end();
    assert!(sim.crashed());
    assert!(!sim.at_end());
    assert!(sim.events().has_fault(FaultKind::Crash));
    assert!(!sim.step_forward());
}

// int f() { return 3; }  — the call's temporary dies with the full expression
#[test]
fn temporaries_are_destroyed_at_full_expression_end() {
    let tu = TranslationUnit {
        declarations: vec![
            func("f", int_spec(), vec![], vec![ret(lit(3))]),
            func(
                "main",
                int_spec(),
                vec![],
                vec![
                    var(
                        "x",
                        int_spec(),
                        copy_init(ExprAst::FunctionCall {
                            name: "f".to_string(),
                            args: vec![],
                            location: loc(),
                        }),
                    ),
                    ret(ident("x")),
                ],
            ),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(3)));
    let temps: Vec<_> = sim
        .memory()
        .objects()
        .iter()
        .filter(|o| o.storage == StorageKind::Temporary)
        .collect();
    assert!(!temps.is_empty());
    assert!(temps.iter().all(|o| o.is_dead()));
}

// int g = 3;  — initialized before main runs, destroyed after it returns
#[test]
fn statics_outlive_main() {
    let tu = TranslationUnit {
        declarations: vec![
            DeclAst::GlobalVariable(VarDeclAst {
                name: "g".to_string(),
                type_spec: int_spec(),
                init: copy_init(lit(3)),
                location: loc(),
            }),
            func("main", int_spec(), vec![], vec![ret(ident("g"))]),
        ],
    };
    let sim = run(tu);
    assert_eq!(sim.return_value(), Some(Value::Int(3)));
    fault_free(&sim);

    let g_entity = sim.program().static_entities[0];
    let g_object = sim.memory().statics[&g_entity];
    let main_entity = sim.program().main.expect("main exists");
    let pos = |pred: &dyn Fn(&Event) -> bool| {
        sim.events()
            .iter()
            .position(|(_, e)| pred(e))
            .expect("event exists")
    };
    let began = pos(&|e| matches!(e, Event::LifetimeBegan { object } if *object == g_object));
    let called =
        pos(&|e| matches!(e, Event::FunctionCalled { function } if *function == main_entity));
    let returned =
        pos(&|e| matches!(e, Event::FunctionReturned { function } if *function == main_entity));
    let ended = pos(&|e| matches!(e, Event::LifetimeEnded { object } if *object == g_object));
    assert!(began < called);
    assert!(returned < ended);
}

// Stepping backward replays the deterministic execution.
#[test]
fn step_backward_restores_the_previous_state() {
    let tu = main_with(vec![
        var("x", int_spec(), copy_init(lit(5))),
        var("y", int_spec(), copy_init(lit(10))),
        ret(bin(BinaryOp::Add, ident("x"), ident("y"))),
    ]);
    let program = compile(&tu);

    let mut sim = Simulation::new(program.clone());
    for _ in 0..5 {
        assert!(sim.step_forward());
    }
    let construct = sim.current_construct();
    let events = sim.events().len();

    assert!(sim.step_forward());
    assert!(sim.step_backward());
    assert_eq!(sim.steps_taken(), 5);
    assert_eq!(sim.current_construct(), construct);
    assert_eq!(sim.events().len(), events);
}

#[test]
fn step_to_end_matches_manual_stepping() {
    let tu = main_with(vec![
        var("x", int_spec(), copy_init(lit(5))),
        ret(ident("x")),
    ]);
    let program = compile(&tu);

    let mut a = Simulation::new(program.clone());
    a.step_to_end();
    let mut b = Simulation::new(program);
    while b.step_forward() {}
    assert_eq!(a.steps_taken(), b.steps_taken());
    assert_eq!(a.events().len(), b.events().len());
    assert_eq!(a.return_value(), b.return_value());
}
