//! Statement compilation
//!
//! Statements compile against a [`FnBody`] context that accumulates the
//! frame layout (every local entity the function will allocate) and knows
//! the function's return target.  Blocks open child scopes and get a local
//! deallocator for whatever they declare; `for` loops desugar into a block
//! wrapping a `while`.

use crate::ast::{ExprAst, SourceLocation, StmtAst};
use crate::compiler::constructs::{
    ConstructId, ConstructKind, DeallocKind, Declaration, ExprKind, Expression, Statement,
};
use crate::compiler::conversions;
use crate::compiler::deallocators::compile_deallocator;
use crate::compiler::declarations;
use crate::compiler::entities::{EntityId, ScopeId};
use crate::compiler::expressions::{compile_expr, ExprContext};
use crate::compiler::initializers;
use crate::compiler::notes::{Note, NoteKind};
use crate::compiler::Compilation;
use crate::types::Type;

/// Per-function compilation state
#[derive(Debug)]
pub struct FnBody {
    /// The function entity whose body is being compiled
    pub function: EntityId,
    pub return_type: Type,
    /// The designated return object; `None` for void functions
    pub return_object: Option<EntityId>,
    /// Receiver entity when compiling a member function
    pub receiver: Option<EntityId>,
    pub is_main: bool,
    /// Every automatic entity of the frame, parameters first
    pub locals: Vec<EntityId>,
}

impl FnBody {
    fn expr_ctx(&self, scope: ScopeId) -> ExprContext {
        ExprContext {
            scope,
            receiver: self.receiver,
        }
    }
}

fn stmt_node(
    cmp: &mut Compilation,
    stmt: Statement,
    children: &[ConstructId],
    loc: SourceLocation,
) -> ConstructId {
    let id = cmp.add_construct(ConstructKind::Statement(stmt), Some(loc));
    for &child in children {
        cmp.attach(id, child);
    }
    id
}

pub fn compile_stmt(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    scope: ScopeId,
    ast: &StmtAst,
) -> ConstructId {
    match ast {
        StmtAst::Expression { expr, location } => {
            let e = compile_expr(cmp, fctx.expr_ctx(scope), expr);
            stmt_node(cmp, Statement::Expression { expr: e }, &[e], *location)
        }
        StmtAst::Declaration(decl) => {
            let d = declarations::compile_local_variable(cmp, fctx, scope, decl);
            stmt_node(cmp, Statement::Declaration { decl: d }, &[d], decl.location)
        }
        StmtAst::Block {
            statements,
            location,
        } => compile_block(cmp, fctx, scope, statements, *location),
        StmtAst::If {
            condition,
            then_stmt,
            else_stmt,
            location,
        } => {
            let cond = compile_condition(cmp, fctx, scope, condition);
            let then_c = compile_scoped(cmp, fctx, scope, then_stmt);
            let else_c = else_stmt
                .as_deref()
                .map(|s| compile_scoped(cmp, fctx, scope, s));
            let mut children = vec![cond, then_c];
            children.extend(else_c);
            stmt_node(
                cmp,
                Statement::If {
                    condition: cond,
                    then_stmt: then_c,
                    else_stmt: else_c,
                },
                &children,
                *location,
            )
        }
        StmtAst::While {
            condition,
            body,
            location,
        } => {
            let cond = compile_condition(cmp, fctx, scope, condition);
            let body_c = compile_scoped(cmp, fctx, scope, body);
            stmt_node(
                cmp,
                Statement::While {
                    condition: cond,
                    body: body_c,
                },
                &[cond, body_c],
                *location,
            )
        }
        StmtAst::For {
            init,
            condition,
            post,
            body,
            location,
        } => compile_for(
            cmp,
            fctx,
            scope,
            init.as_deref(),
            condition.as_ref(),
            post.as_ref(),
            body,
            *location,
        ),
        StmtAst::Return { expr, location } => compile_return(cmp, fctx, scope, expr.as_ref(), *location),
        StmtAst::Null { location } => stmt_node(cmp, Statement::Null, &[], *location),
    }
}

fn compile_condition(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    scope: ScopeId,
    ast: &ExprAst,
) -> ConstructId {
    let e = compile_expr(cmp, fctx.expr_ctx(scope), ast);
    match conversions::contextual_bool(cmp, e) {
        Some(c) => c,
        None => {
            cmp.note(
                e,
                Note::error(
                    NoteKind::ConditionNotConvertible,
                    "This condition is not convertible to bool",
                ),
            );
            e
        }
    }
}

/// Compile a sub-statement of `if`/`while`/`for` in its own scope, so a bare
/// declaration used as a body still gets deallocated.
fn compile_scoped(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    scope: ScopeId,
    ast: &StmtAst,
) -> ConstructId {
    match ast {
        StmtAst::Block { .. } => compile_stmt(cmp, fctx, scope, ast),
        other => compile_block(
            cmp,
            fctx,
            scope,
            std::slice::from_ref(other),
            other_location(other),
        ),
    }
}

fn other_location(ast: &StmtAst) -> SourceLocation {
    match ast {
        StmtAst::Expression { location, .. }
        | StmtAst::Block { location, .. }
        | StmtAst::If { location, .. }
        | StmtAst::While { location, .. }
        | StmtAst::For { location, .. }
        | StmtAst::Return { location, .. }
        | StmtAst::Null { location } => *location,
        StmtAst::Declaration(d) => d.location,
    }
}

pub fn compile_block(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    parent_scope: ScopeId,
    statements: &[StmtAst],
    loc: SourceLocation,
) -> ConstructId {
    let scope = cmp.add_scope(Some(parent_scope));
    let node = stmt_node(
        cmp,
        Statement::Block {
            statements: Vec::new(),
            local_dealloc: None,
        },
        &[],
        loc,
    );

    let mut stmt_ids = Vec::with_capacity(statements.len());
    let mut declared = Vec::new();
    for s in statements {
        let id = compile_stmt(cmp, fctx, scope, s);
        cmp.attach(node, id);
        stmt_ids.push(id);
        if let ConstructKind::Statement(Statement::Declaration { decl }) = &cmp.construct(id).kind {
            if let ConstructKind::Declaration(Declaration::Variable { entity, .. }) =
                &cmp.construct(*decl).kind
            {
                declared.push(*entity);
            }
        }
    }

    let local_dealloc = if declared.is_empty() {
        None
    } else {
        let d = compile_deallocator(cmp, DeallocKind::Locals, &declared, loc);
        cmp.attach(node, d);
        Some(d)
    };

    if let ConstructKind::Statement(Statement::Block {
        statements,
        local_dealloc: ld,
    }) = &mut cmp.construct_mut(node).kind
    {
        *statements = stmt_ids;
        *ld = local_dealloc;
    }
    node
}

/// `for (init; cond; post) body` desugars into
/// `{ init; while (cond) { body; post; } }`, with a missing condition
/// reading as `true`.
#[allow(clippy::too_many_arguments)]
fn compile_for(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    parent_scope: ScopeId,
    init: Option<&StmtAst>,
    condition: Option<&ExprAst>,
    post: Option<&ExprAst>,
    body: &StmtAst,
    loc: SourceLocation,
) -> ConstructId {
    let scope = cmp.add_scope(Some(parent_scope));
    let outer = stmt_node(
        cmp,
        Statement::Block {
            statements: Vec::new(),
            local_dealloc: None,
        },
        &[],
        loc,
    );

    let mut outer_stmts = Vec::new();
    let mut declared = Vec::new();
    if let Some(init) = init {
        let id = compile_stmt(cmp, fctx, scope, init);
        cmp.attach(outer, id);
        outer_stmts.push(id);
        if let ConstructKind::Statement(Statement::Declaration { decl }) = &cmp.construct(id).kind {
            if let ConstructKind::Declaration(Declaration::Variable { entity, .. }) =
                &cmp.construct(*decl).kind
            {
                declared.push(*entity);
            }
        }
    }

    let cond = match condition {
        Some(c) => compile_condition(cmp, fctx, scope, c),
        None => cmp.add_construct(
            ConstructKind::Expression(Expression::prvalue(
                Type::bool_(),
                ExprKind::BoolLiteral(true),
            )),
            Some(loc),
        ),
    };

    // inner block: body then the post expression
    let inner = stmt_node(
        cmp,
        Statement::Block {
            statements: Vec::new(),
            local_dealloc: None,
        },
        &[],
        loc,
    );
    let body_c = compile_scoped(cmp, fctx, scope, body);
    cmp.attach(inner, body_c);
    let mut inner_stmts = vec![body_c];
    if let Some(post) = post {
        let e = compile_expr(cmp, fctx.expr_ctx(scope), post);
        let post_stmt = stmt_node(cmp, Statement::Expression { expr: e }, &[e], post.location());
        cmp.attach(inner, post_stmt);
        inner_stmts.push(post_stmt);
    }
    if let ConstructKind::Statement(Statement::Block { statements, .. }) =
        &mut cmp.construct_mut(inner).kind
    {
        *statements = inner_stmts;
    }

    let while_c = stmt_node(
        cmp,
        Statement::While {
            condition: cond,
            body: inner,
        },
        &[cond, inner],
        loc,
    );
    cmp.attach(outer, while_c);
    outer_stmts.push(while_c);

    let local_dealloc = if declared.is_empty() {
        None
    } else {
        let d = compile_deallocator(cmp, DeallocKind::Locals, &declared, loc);
        cmp.attach(outer, d);
        Some(d)
    };
    if let ConstructKind::Statement(Statement::Block {
        statements,
        local_dealloc: ld,
    }) = &mut cmp.construct_mut(outer).kind
    {
        *statements = outer_stmts;
        *ld = local_dealloc;
    }
    outer
}

fn compile_return(
    cmp: &mut Compilation,
    fctx: &mut FnBody,
    scope: ScopeId,
    expr: Option<&ExprAst>,
    loc: SourceLocation,
) -> ConstructId {
    match (expr, fctx.return_object) {
        (None, None) => stmt_node(cmp, Statement::Return { initializer: None }, &[], loc),
        (None, Some(_)) => {
            // main is allowed to fall back to `return 0;` elsewhere, but an
            // explicit bare return still needs a value
            let node = stmt_node(cmp, Statement::Return { initializer: None }, &[], loc);
            if !fctx.is_main {
                cmp.note(
                    node,
                    Note::error(
                        NoteKind::ReturnValueMissing,
                        "This function must return a value",
                    ),
                );
            }
            node
        }
        (Some(e), None) => {
            let arg = compile_expr(cmp, fctx.expr_ctx(scope), e);
            let node = stmt_node(cmp, Statement::Return { initializer: None }, &[arg], loc);
            cmp.note(
                node,
                Note::error(
                    NoteKind::ReturnValueInVoid,
                    "A void function cannot return a value",
                ),
            );
            node
        }
        (Some(e), Some(return_object)) => {
            let arg = compile_expr(cmp, fctx.expr_ctx(scope), e);
            let init = initializers::initializer_from_arg(cmp, return_object, arg, loc);
            stmt_node(
                cmp,
                Statement::Return {
                    initializer: Some(init),
                },
                &[init],
                loc,
            )
        }
    }
}
