//! Expression compilation
//!
//! Turns `ExprAst` nodes into typed expression constructs, resolving names
//! against the scope chain, inserting implicit conversion nodes, and running
//! overload resolution for calls.  An expression that fails to compile still
//! produces a node (with an error note and no type) so that diagnostics
//! accumulate instead of aborting.

use crate::ast::{BinaryOp, ExprAst, SourceLocation, UnaryOp};
use crate::compiler::constructs::{
    ConstructId, ConstructKind, ExprKind, Expression, FunctionCall, ValueCategory,
};
use crate::compiler::conversions::{self, usual_arithmetic_type};
use crate::compiler::declarations;
use crate::compiler::entities::{Declared, Entity, EntityId, ScopeId};
use crate::compiler::initializers;
use crate::compiler::notes::{Note, NoteKind};
use crate::compiler::overloads::{self, OverloadResult};
use crate::compiler::Compilation;
use crate::types::Type;

/// Ambient information expression compilation needs besides the scope: the
/// receiver entity when compiling inside a member function, so bare names
/// can resolve to members.
#[derive(Debug, Clone, Copy)]
pub struct ExprContext {
    pub scope: ScopeId,
    pub receiver: Option<EntityId>,
}

/// Type and value category of a compiled expression, when it has one
pub fn expr_type(cmp: &Compilation, id: ConstructId) -> Option<(Type, ValueCategory)> {
    let expr = cmp.construct(id).as_expression()?;
    expr.ty.clone().map(|t| (t, expr.value_category))
}

fn error_expr(
    cmp: &mut Compilation,
    kind: ExprKind,
    children: &[ConstructId],
    note: Note,
    location: SourceLocation,
) -> ConstructId {
    let id = cmp.add_construct(
        ConstructKind::Expression(Expression::erroneous(kind)),
        Some(location),
    );
    for &child in children {
        cmp.attach(id, child);
    }
    cmp.note(id, note);
    id
}

fn expr_node(
    cmp: &mut Compilation,
    expr: Expression,
    children: &[ConstructId],
    location: SourceLocation,
) -> ConstructId {
    let id = cmp.add_construct(ConstructKind::Expression(expr), Some(location));
    for &child in children {
        cmp.attach(id, child);
    }
    id
}

pub fn compile_expr(cmp: &mut Compilation, ctx: ExprContext, ast: &ExprAst) -> ConstructId {
    match ast {
        ExprAst::IntLiteral(v, loc) => expr_node(
            cmp,
            Expression::prvalue(Type::int(), ExprKind::IntLiteral(*v)),
            &[],
            *loc,
        ),
        ExprAst::CharLiteral(v, loc) => expr_node(
            cmp,
            Expression::prvalue(Type::char_(), ExprKind::CharLiteral(*v)),
            &[],
            *loc,
        ),
        ExprAst::BoolLiteral(v, loc) => expr_node(
            cmp,
            Expression::prvalue(Type::bool_(), ExprKind::BoolLiteral(*v)),
            &[],
            *loc,
        ),
        ExprAst::DoubleLiteral(v, loc) => expr_node(
            cmp,
            Expression::prvalue(Type::double(), ExprKind::DoubleLiteral(*v)),
            &[],
            *loc,
        ),
        ExprAst::StringLiteral(text, loc) => {
            let index = cmp.intern_string(text);
            let len = cmp.string_literals[index].len();
            let ty = Type::array_of(Type::char_().with_const(true), len);
            expr_node(
                cmp,
                Expression::lvalue(ty, ExprKind::StringLiteral { index }),
                &[],
                *loc,
            )
        }
        ExprAst::NullptrLiteral(loc) => expr_node(
            cmp,
            Expression::prvalue(Type::pointer_to(Type::Void), ExprKind::NullptrLiteral),
            &[],
            *loc,
        ),
        ExprAst::Identifier(name, loc) => compile_identifier(cmp, ctx, name, *loc),
        ExprAst::Binary {
            op,
            lhs,
            rhs,
            location,
        } => compile_binary(cmp, ctx, *op, lhs, rhs, *location),
        ExprAst::Unary {
            op,
            operand,
            location,
        } => compile_unary(cmp, ctx, *op, operand, *location),
        ExprAst::Assignment {
            lhs,
            rhs,
            location,
        } => compile_assignment(cmp, ctx, lhs, rhs, *location),
        ExprAst::Subscript {
            operand,
            index,
            location,
        } => compile_subscript(cmp, ctx, operand, index, *location),
        ExprAst::MemberAccess {
            object,
            member,
            location,
        } => compile_member_access(cmp, ctx, object, member, *location),
        ExprAst::FunctionCall {
            name,
            args,
            location,
        } => compile_named_call(cmp, ctx, name, args, *location),
        ExprAst::New {
            target_type,
            init,
            location,
        } => compile_new(cmp, ctx, target_type, init.as_ref(), *location),
        ExprAst::Delete {
            operand,
            array_form,
            location,
        } => compile_delete(cmp, ctx, operand, *array_form, *location),
    }
}

fn compile_identifier(
    cmp: &mut Compilation,
    ctx: ExprContext,
    name: &str,
    loc: SourceLocation,
) -> ConstructId {
    match crate::compiler::entities::lookup(&cmp.scopes, ctx.scope, name) {
        Some(Declared::Variable(entity)) => {
            let declared = cmp.entity(entity).ty().clone();
            // a name bound to a reference designates the referent
            let ty = declared.peel_reference().clone();
            expr_node(
                cmp,
                Expression::lvalue(
                    ty,
                    ExprKind::Identifier {
                        name: name.to_string(),
                        entity: Some(entity),
                    },
                ),
                &[],
                loc,
            )
        }
        Some(Declared::Functions(_)) => error_expr(
            cmp,
            ExprKind::Identifier {
                name: name.to_string(),
                entity: None,
            },
            &[],
            Note::error(
                NoteKind::NotAnObject,
                format!("'{name}' names a function, not an object"),
            ),
            loc,
        ),
        None => {
            // inside a member function, a bare name may be a member
            if let Some(receiver) = ctx.receiver {
                if let Some(member) = lookup_member(cmp, receiver, name) {
                    let ty = member.1.clone();
                    let entity = cmp.add_entity(Entity::MemberSubobject {
                        of: receiver,
                        name: name.to_string(),
                        ty: ty.clone(),
                    });
                    return expr_node(
                        cmp,
                        Expression::lvalue(
                            ty.peel_reference().clone(),
                            ExprKind::Identifier {
                                name: name.to_string(),
                                entity: Some(entity),
                            },
                        ),
                        &[],
                        loc,
                    );
                }
            }
            error_expr(
                cmp,
                ExprKind::Identifier {
                    name: name.to_string(),
                    entity: None,
                },
                &[],
                Note::name_not_found(name),
                loc,
            )
        }
    }
}

/// Look up a member (walking the base chain) on the class the given entity's
/// type designates.
fn lookup_member(cmp: &Compilation, of: EntityId, member: &str) -> Option<(String, Type)> {
    let class = cmp.entity(of).ty().peel_reference().class_id()?;
    let mut current = Some(class);
    while let Some(c) = current {
        let def = cmp.class(c);
        if let Some(m) = def.member(member) {
            return Some((m.name.clone(), m.ty.clone()));
        }
        current = def.base;
    }
    None
}

fn compile_binary(
    cmp: &mut Compilation,
    ctx: ExprContext,
    op: BinaryOp,
    lhs_ast: &ExprAst,
    rhs_ast: &ExprAst,
    loc: SourceLocation,
) -> ConstructId {
    let lhs = compile_expr(cmp, ctx, lhs_ast);
    let rhs = compile_expr(cmp, ctx, rhs_ast);

    if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
        let (Some(l), Some(r)) = (
            conversions::contextual_bool(cmp, lhs),
            conversions::contextual_bool(cmp, rhs),
        ) else {
            return error_expr(
                cmp,
                ExprKind::Binary { op, lhs, rhs },
                &[lhs, rhs],
                Note::error(
                    NoteKind::InvalidOperand,
                    "Operands of a logical operator must be convertible to bool",
                ),
                loc,
            );
        };
        return expr_node(
            cmp,
            Expression::prvalue(Type::bool_(), ExprKind::Binary { op, lhs: l, rhs: r }),
            &[l, r],
            loc,
        );
    }

    let lhs = conversions::to_prvalue(cmp, lhs);
    let rhs = conversions::to_prvalue(cmp, rhs);
    let (Some((lt, _)), Some((rt, _))) = (expr_type(cmp, lhs), expr_type(cmp, rhs)) else {
        return error_expr(
            cmp,
            ExprKind::Binary { op, lhs, rhs },
            &[lhs, rhs],
            Note::error(NoteKind::InvalidOperand, "Invalid operand for binary operator"),
            loc,
        );
    };

    // pointer arithmetic and pointer comparison
    if lt.is_pointer() || rt.is_pointer() {
        return compile_pointer_binary(cmp, op, lhs, rhs, &lt, &rt, loc);
    }

    let Some(common) = usual_arithmetic_type(&lt, &rt) else {
        return error_expr(
            cmp,
            ExprKind::Binary { op, lhs, rhs },
            &[lhs, rhs],
            Note::error(NoteKind::InvalidOperand, "Invalid operand for binary operator"),
            loc,
        );
    };
    if op == BinaryOp::Mod && common != Type::int() {
        return error_expr(
            cmp,
            ExprKind::Binary { op, lhs, rhs },
            &[lhs, rhs],
            Note::error(NoteKind::InvalidOperand, "Operands of % must be integral"),
            loc,
        );
    }
    // usual_arithmetic_type only produces int or double, so these succeed
    let lhs = conversions::standard_conversion(cmp, lhs, &common).unwrap_or(lhs);
    let rhs = conversions::standard_conversion(cmp, rhs, &common).unwrap_or(rhs);
    let result = if is_comparison(op) { Type::bool_() } else { common };
    expr_node(
        cmp,
        Expression::prvalue(result, ExprKind::Binary { op, lhs, rhs }),
        &[lhs, rhs],
        loc,
    )
}

fn is_comparison(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
    )
}

fn compile_pointer_binary(
    cmp: &mut Compilation,
    op: BinaryOp,
    lhs: ConstructId,
    rhs: ConstructId,
    lt: &Type,
    rt: &Type,
    loc: SourceLocation,
) -> ConstructId {
    let invalid = |cmp: &mut Compilation| {
        error_expr(
            cmp,
            ExprKind::Binary { op, lhs, rhs },
            &[lhs, rhs],
            Note::error(NoteKind::InvalidOperand, "Invalid operand for pointer operator"),
            loc,
        )
    };
    match op {
        BinaryOp::Add | BinaryOp::Sub => {
            if lt.is_pointer() && rt.is_pointer() {
                if op == BinaryOp::Sub && lt.same_type_as(rt) {
                    // pointer difference, in elements
                    return expr_node(
                        cmp,
                        Expression::prvalue(Type::int(), ExprKind::Binary { op, lhs, rhs }),
                        &[lhs, rhs],
                        loc,
                    );
                }
                return invalid(cmp);
            }
            let (ptr_ty, other) = if lt.is_pointer() { (lt, rhs) } else { (rt, lhs) };
            if op == BinaryOp::Sub && !lt.is_pointer() {
                // int - pointer is not a thing
                return invalid(cmp);
            }
            let Some(offset) = conversions::standard_conversion(cmp, other, &Type::int()) else {
                return invalid(cmp);
            };
            let (lhs, rhs) = if lt.is_pointer() { (lhs, offset) } else { (offset, rhs) };
            expr_node(
                cmp,
                Expression::prvalue(ptr_ty.clone(), ExprKind::Binary { op, lhs, rhs }),
                &[lhs, rhs],
                loc,
            )
        }
        _ if is_comparison(op) => {
            // both sides must be pointers of the same type, or a null pointer
            let l = conversions::standard_conversion(cmp, lhs, &lt.with_const(false));
            let r = if rt.pointee() == Some(&Type::Void) {
                conversions::standard_conversion(cmp, rhs, &lt.with_const(false))
            } else if lt.pointee() == Some(&Type::Void) {
                conversions::standard_conversion(cmp, rhs, &rt.with_const(false))
            } else if lt.same_type_as(rt) {
                Some(rhs)
            } else {
                None
            };
            match (l, r) {
                (Some(l), Some(r)) => expr_node(
                    cmp,
                    Expression::prvalue(Type::bool_(), ExprKind::Binary { op, lhs: l, rhs: r }),
                    &[l, r],
                    loc,
                ),
                _ => invalid(cmp),
            }
        }
        _ => invalid(cmp),
    }
}

fn compile_unary(
    cmp: &mut Compilation,
    ctx: ExprContext,
    op: UnaryOp,
    operand_ast: &ExprAst,
    loc: SourceLocation,
) -> ConstructId {
    let operand = compile_expr(cmp, ctx, operand_ast);
    match op {
        UnaryOp::Neg => {
            let operand = conversions::to_prvalue(cmp, operand);
            let Some((ty, _)) = expr_type(cmp, operand) else {
                return error_expr(
                    cmp,
                    ExprKind::Negate { operand },
                    &[operand],
                    Note::error(NoteKind::InvalidOperand, "Invalid operand for unary minus"),
                    loc,
                );
            };
            let Some(result) = usual_arithmetic_type(&ty, &ty) else {
                return error_expr(
                    cmp,
                    ExprKind::Negate { operand },
                    &[operand],
                    Note::error(NoteKind::InvalidOperand, "Operand of unary minus must be arithmetic"),
                    loc,
                );
            };
            let operand = conversions::standard_conversion(cmp, operand, &result).unwrap_or(operand);
            expr_node(
                cmp,
                Expression::prvalue(result, ExprKind::Negate { operand }),
                &[operand],
                loc,
            )
        }
        UnaryOp::Not => match conversions::contextual_bool(cmp, operand) {
            Some(operand) => expr_node(
                cmp,
                Expression::prvalue(Type::bool_(), ExprKind::Not { operand }),
                &[operand],
                loc,
            ),
            None => error_expr(
                cmp,
                ExprKind::Not { operand },
                &[operand],
                Note::error(NoteKind::InvalidOperand, "Operand of ! must be convertible to bool"),
                loc,
            ),
        },
        UnaryOp::Deref => {
            let operand = conversions::to_prvalue(cmp, operand);
            match expr_type(cmp, operand) {
                Some((ty, _)) if ty.is_pointer() => {
                    let pointee = ty.pointee().cloned().unwrap_or(Type::Void);
                    expr_node(
                        cmp,
                        Expression::lvalue(pointee, ExprKind::Dereference { operand }),
                        &[operand],
                        loc,
                    )
                }
                _ => error_expr(
                    cmp,
                    ExprKind::Dereference { operand },
                    &[operand],
                    Note::error(
                        NoteKind::DereferenceInvalidOperand,
                        "Only a pointer can be dereferenced",
                    ),
                    loc,
                ),
            }
        }
        UnaryOp::AddrOf => match expr_type(cmp, operand) {
            Some((ty, ValueCategory::Lvalue)) => expr_node(
                cmp,
                Expression::prvalue(Type::pointer_to(ty), ExprKind::AddressOf { operand }),
                &[operand],
                loc,
            ),
            _ => error_expr(
                cmp,
                ExprKind::AddressOf { operand },
                &[operand],
                Note::error(
                    NoteKind::AddressOfRvalue,
                    "The address-of operator requires an object (an lvalue)",
                ),
                loc,
            ),
        },
    }
}

fn compile_assignment(
    cmp: &mut Compilation,
    ctx: ExprContext,
    lhs_ast: &ExprAst,
    rhs_ast: &ExprAst,
    loc: SourceLocation,
) -> ConstructId {
    let lhs = compile_expr(cmp, ctx, lhs_ast);
    let rhs = compile_expr(cmp, ctx, rhs_ast);

    let Some((lt, lcat)) = expr_type(cmp, lhs) else {
        return error_expr(
            cmp,
            ExprKind::Assignment { lhs, rhs },
            &[lhs, rhs],
            Note::error(NoteKind::InvalidOperand, "Invalid assignment target"),
            loc,
        );
    };
    let note = if lcat != ValueCategory::Lvalue {
        Some(Note::error(
            NoteKind::AssignmentToRvalue,
            "The left side of an assignment must be an object (an lvalue)",
        ))
    } else if lt.is_const() {
        Some(Note::error(
            NoteKind::AssignmentToConst,
            "A const object cannot be assigned to",
        ))
    } else if lt.is_complete_class_type() {
        Some(Note::error(
            NoteKind::AssignmentToClass,
            "Assignment of class objects is not supported",
        ))
    } else if lt.is_bounded_array() {
        Some(Note::error(
            NoteKind::InvalidOperand,
            "An array cannot be assigned to",
        ))
    } else {
        None
    };
    if let Some(note) = note {
        return error_expr(cmp, ExprKind::Assignment { lhs, rhs }, &[lhs, rhs], note, loc);
    }

    match conversions::standard_conversion(cmp, rhs, &lt) {
        Some(rhs) => expr_node(
            cmp,
            Expression::lvalue(lt, ExprKind::Assignment { lhs, rhs }),
            &[lhs, rhs],
            loc,
        ),
        None => {
            let from = expr_type(cmp, rhs)
                .map(|(t, _)| t.describe(&cmp.classes))
                .unwrap_or_else(|| "<error>".to_string());
            let to = lt.describe(&cmp.classes);
            error_expr(
                cmp,
                ExprKind::Assignment { lhs, rhs },
                &[lhs, rhs],
                Note::cannot_convert(&from, &to),
                loc,
            )
        }
    }
}

fn compile_subscript(
    cmp: &mut Compilation,
    ctx: ExprContext,
    operand_ast: &ExprAst,
    index_ast: &ExprAst,
    loc: SourceLocation,
) -> ConstructId {
    let operand = compile_expr(cmp, ctx, operand_ast);
    let operand = conversions::to_prvalue(cmp, operand);
    let index = compile_expr(cmp, ctx, index_ast);

    let pointee = match expr_type(cmp, operand) {
        Some((ty, _)) if ty.is_pointer() => ty.pointee().cloned(),
        _ => None,
    };
    let (Some(pointee), Some(index)) = (
        pointee,
        conversions::standard_conversion(cmp, index, &Type::int()),
    ) else {
        return error_expr(
            cmp,
            ExprKind::Subscript { operand, index },
            &[operand, index],
            Note::error(
                NoteKind::SubscriptInvalidOperand,
                "Subscripting requires a pointer (or array) and an integer index",
            ),
            loc,
        );
    };
    expr_node(
        cmp,
        Expression::lvalue(pointee, ExprKind::Subscript { operand, index }),
        &[operand, index],
        loc,
    )
}

fn compile_member_access(
    cmp: &mut Compilation,
    ctx: ExprContext,
    object_ast: &ExprAst,
    member: &str,
    loc: SourceLocation,
) -> ConstructId {
    let object = compile_expr(cmp, ctx, object_ast);
    let kind = ExprKind::MemberAccess {
        object,
        member: member.to_string(),
    };
    let Some((ty, ValueCategory::Lvalue)) = expr_type(cmp, object) else {
        return error_expr(
            cmp,
            kind,
            &[object],
            Note::error(NoteKind::NotAnObject, "Member access requires a class object"),
            loc,
        );
    };
    let Some(class) = ty.class_id() else {
        return error_expr(
            cmp,
            kind,
            &[object],
            Note::error(
                NoteKind::NotAClass,
                format!("'{}' is not a class type", ty.describe(&cmp.classes)),
            ),
            loc,
        );
    };
    // walk the base chain
    let mut current = Some(class);
    let mut found: Option<Type> = None;
    while let Some(c) = current {
        if let Some(m) = cmp.class(c).member(member) {
            found = Some(m.ty.clone());
            break;
        }
        current = cmp.class(c).base;
    }
    match found {
        Some(member_ty) => {
            let member_ty = if ty.is_const() {
                member_ty.with_const(true)
            } else {
                member_ty
            };
            expr_node(cmp, Expression::lvalue(member_ty, kind), &[object], loc)
        }
        None => {
            let class_name = cmp.class(class).name.clone();
            error_expr(cmp, kind, &[object], Note::member_not_found(&class_name, member), loc)
        }
    }
}

/// Compile a call to an already-selected function.  Builds one initializer
/// per parameter (targeting the pending frame) and, for return-by-value, a
/// caller-side temporary that receives the result.
pub fn compile_call(
    cmp: &mut Compilation,
    function: EntityId,
    args: Vec<ConstructId>,
    location: SourceLocation,
) -> ConstructId {
    let Entity::Function { signature, .. } = cmp.entity(function) else {
        unreachable!("compile_call on a non-function entity");
    };
    let param_types = signature.param_types.clone();
    let return_type = signature.return_type.clone();
    debug_assert_eq!(param_types.len(), args.len());

    let call = cmp.add_construct(
        ConstructKind::FunctionCall(FunctionCall {
            function,
            param_inits: Vec::new(),
            return_target: None,
        }),
        Some(location),
    );

    let mut param_inits = Vec::with_capacity(args.len());
    for (index, (arg, param_ty)) in args.into_iter().zip(param_types).enumerate() {
        let target = cmp.add_entity(Entity::Parameter {
            function,
            index,
            ty: param_ty,
        });
        let init = initializers::initializer_from_arg(cmp, target, arg, location);
        cmp.attach(call, init);
        param_inits.push(init);
    }

    let return_target = if !return_type.is_void() && !return_type.is_reference() {
        let temp = cmp.add_entity(Entity::TemporaryObject {
            ty: return_type.clone(),
            description: "[return value]".to_string(),
        });
        cmp.register_temporary(call, temp);
        Some(temp)
    } else {
        None
    };

    if let ConstructKind::FunctionCall(fc) = &mut cmp.construct_mut(call).kind {
        fc.param_inits = param_inits;
        fc.return_target = return_target;
    }
    call
}

fn compile_named_call(
    cmp: &mut Compilation,
    ctx: ExprContext,
    name: &str,
    args: &[ExprAst],
    loc: SourceLocation,
) -> ConstructId {
    let arg_exprs: Vec<ConstructId> = args.iter().map(|a| compile_expr(cmp, ctx, a)).collect();

    let candidates = match crate::compiler::entities::lookup(&cmp.scopes, ctx.scope, name) {
        Some(Declared::Functions(set)) => set,
        Some(Declared::Variable(_)) => {
            return error_expr(
                cmp,
                ExprKind::Call { call: None },
                &arg_exprs,
                Note::not_a_function(name),
                loc,
            );
        }
        None => {
            return error_expr(
                cmp,
                ExprKind::Call { call: None },
                &arg_exprs,
                Note::name_not_found(name),
                loc,
            );
        }
    };

    let mut arg_types = Vec::with_capacity(arg_exprs.len());
    for &a in &arg_exprs {
        match expr_type(cmp, a) {
            Some(info) => arg_types.push(info),
            None => {
                // the argument already carries its own error
                return error_expr(
                    cmp,
                    ExprKind::Call { call: None },
                    &arg_exprs,
                    Note::error(NoteKind::InvalidOperand, "Invalid argument in function call"),
                    loc,
                );
            }
        }
    }

    let function = match overloads::resolve(cmp, &candidates, &arg_types) {
        OverloadResult::Selected(f) => f,
        OverloadResult::NoViable => {
            return error_expr(
                cmp,
                ExprKind::Call { call: None },
                &arg_exprs,
                Note::no_matching_function(name),
                loc,
            );
        }
        OverloadResult::Ambiguous => {
            return error_expr(
                cmp,
                ExprKind::Call { call: None },
                &arg_exprs,
                Note::ambiguous_overload(name),
                loc,
            );
        }
    };

    let call = compile_call(cmp, function, arg_exprs, loc);
    let Entity::Function { signature, .. } = cmp.entity(function) else {
        unreachable!();
    };
    let return_type = signature.return_type.clone();
    let expr = if let Some(referent) = return_type.referent() {
        Expression::lvalue(referent.clone(), ExprKind::Call { call: Some(call) })
    } else {
        Expression::prvalue(return_type, ExprKind::Call { call: Some(call) })
    };
    expr_node(cmp, expr, &[call], loc)
}

fn compile_new(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target_type: &crate::ast::TypeSpec,
    init: Option<&crate::ast::InitializerAst>,
    loc: SourceLocation,
) -> ConstructId {
    let allocated = match declarations::resolve_type(cmp, target_type) {
        Ok(t) => t,
        Err(note) => {
            let entity = cmp.add_entity(Entity::NewObject {
                expr: ConstructId(0),
                ty: Type::Void,
            });
            return error_expr(
                cmp,
                ExprKind::New {
                    allocated_type: Type::Void,
                    entity,
                    init: None,
                },
                &[],
                note,
                loc,
            );
        }
    };
    if !allocated.is_complete_object_type() || allocated.is_reference() {
        let entity = cmp.add_entity(Entity::NewObject {
            expr: ConstructId(0),
            ty: allocated.clone(),
        });
        return error_expr(
            cmp,
            ExprKind::New {
                allocated_type: allocated,
                entity,
                init: None,
            },
            &[],
            Note::error(NoteKind::NewInvalidType, "This type cannot be created with new"),
            loc,
        );
    }

    // the node id is needed by the entity, so create the node first
    let node = cmp.add_construct(
        ConstructKind::Expression(Expression::erroneous(ExprKind::NullptrLiteral)),
        Some(loc),
    );
    let entity = cmp.add_entity(Entity::NewObject {
        expr: node,
        ty: allocated.clone(),
    });
    // an unwritten initializer still default-initializes the allocation
    let written = init.cloned().unwrap_or(crate::ast::InitializerAst::Default);
    let ic = initializers::compile_initializer(cmp, ctx, entity, &written, loc);
    cmp.attach(node, ic);
    let init_construct = Some(ic);

    // `new T[n]` yields a pointer to the first element
    let result_ty = match allocated.elem_type() {
        Some(elem) => Type::pointer_to(elem.clone()),
        None => Type::pointer_to(allocated.clone()),
    };
    cmp.construct_mut(node).kind = ConstructKind::Expression(Expression::prvalue(
        result_ty,
        ExprKind::New {
            allocated_type: allocated,
            entity,
            init: init_construct,
        },
    ));
    node
}

fn compile_delete(
    cmp: &mut Compilation,
    ctx: ExprContext,
    operand_ast: &ExprAst,
    array_form: bool,
    loc: SourceLocation,
) -> ConstructId {
    let operand = compile_expr(cmp, ctx, operand_ast);
    let operand = conversions::to_prvalue(cmp, operand);
    let pointee = match expr_type(cmp, operand) {
        Some((ty, _)) if ty.is_pointer() => ty.pointee().cloned(),
        _ => None,
    };
    let Some(pointee) = pointee else {
        return error_expr(
            cmp,
            ExprKind::Delete {
                operand,
                array_form,
                dtor_call: None,
            },
            &[operand],
            Note::error(NoteKind::DeleteInvalidOperand, "Only a pointer can be deleted"),
            loc,
        );
    };

    let dtor_call = match pointee.class_id() {
        Some(class) => {
            let Some(dtor) = cmp.class(class).destructor else {
                let name = pointee.describe(&cmp.classes);
                return error_expr(
                    cmp,
                    ExprKind::Delete {
                        operand,
                        array_form,
                        dtor_call: None,
                    },
                    &[operand],
                    Note::no_destructor(&name),
                    loc,
                );
            };
            Some(compile_call(cmp, dtor, Vec::new(), loc))
        }
        None => None,
    };

    let node = expr_node(
        cmp,
        Expression::prvalue(
            Type::Void,
            ExprKind::Delete {
                operand,
                array_form,
                dtor_call,
            },
        ),
        &[operand],
        loc,
    );
    if let Some(d) = dtor_call {
        cmp.attach(node, d);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprAst;

    fn ctx(cmp: &mut Compilation) -> ExprContext {
        let scope = cmp.add_scope(None);
        ExprContext {
            scope,
            receiver: None,
        }
    }

    #[test]
    fn int_literal_is_int_prvalue() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let e = compile_expr(&mut cmp, c, &ExprAst::IntLiteral(7, Default::default()));
        assert_eq!(
            expr_type(&cmp, e),
            Some((Type::int(), ValueCategory::Prvalue))
        );
        assert!(!cmp.has_errors(e));
    }

    #[test]
    fn mixed_arithmetic_computes_in_double() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let e = compile_expr(
            &mut cmp,
            c,
            &ExprAst::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(ExprAst::IntLiteral(1, Default::default())),
                rhs: Box::new(ExprAst::DoubleLiteral(2.5, Default::default())),
                location: Default::default(),
            },
        );
        assert_eq!(
            expr_type(&cmp, e),
            Some((Type::double(), ValueCategory::Prvalue))
        );
    }

    #[test]
    fn unknown_name_is_an_error_note() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let e = compile_expr(
            &mut cmp,
            c,
            &ExprAst::Identifier("nope".to_string(), Default::default()),
        );
        assert!(cmp.has_errors(e));
        assert_eq!(cmp.construct(e).notes[0].kind, NoteKind::NameNotFound);
    }

    #[test]
    fn assignment_to_rvalue_is_rejected() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let e = compile_expr(
            &mut cmp,
            c,
            &ExprAst::Assignment {
                lhs: Box::new(ExprAst::IntLiteral(1, Default::default())),
                rhs: Box::new(ExprAst::IntLiteral(2, Default::default())),
                location: Default::default(),
            },
        );
        assert!(cmp.has_errors(e));
        assert_eq!(
            cmp.construct(e).notes[0].kind,
            NoteKind::AssignmentToRvalue
        );
    }

    #[test]
    fn string_literal_is_const_char_array() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let e = compile_expr(
            &mut cmp,
            c,
            &ExprAst::StringLiteral("hi".to_string(), Default::default()),
        );
        let (ty, cat) = expr_type(&cmp, e).unwrap();
        assert_eq!(cat, ValueCategory::Lvalue);
        assert_eq!(ty.array_len(), Some(3)); // 'h', 'i', '\0'
    }
}
