//! Initializer selection
//!
//! The five syntactic initialization forms (default, value, direct, copy,
//! list) are lowered here into typed [`Initializer`] constructs, dispatched
//! on the target's type: reference binding, atomic initialization, array
//! element-wise initialization, or a constructor call.
//!
//! Completing an initializer is the only way an object's lifetime begins at
//! runtime, so every declared object, parameter, member, array element, and
//! heap object funnels through this module.

use crate::ast::{ExprAst, InitializerAst, SourceLocation};
use crate::compiler::constructs::{
    ConstructId, ConstructKind, InitKind, Initializer, ValueCategory,
};
use crate::compiler::conversions;
use crate::compiler::entities::{Entity, EntityId};
use crate::compiler::expressions::{compile_call, compile_expr, expr_type, ExprContext};
use crate::compiler::notes::Note;
use crate::compiler::overloads::{self, OverloadResult};
use crate::compiler::Compilation;
use crate::types::{reference_compatible, Type};

fn init_node(
    cmp: &mut Compilation,
    target: EntityId,
    kind: InitKind,
    children: &[ConstructId],
    loc: SourceLocation,
) -> ConstructId {
    let id = cmp.add_construct(
        ConstructKind::Initializer(Initializer { target, kind }),
        Some(loc),
    );
    for &child in children {
        cmp.attach(id, child);
    }
    id
}

fn invalid(cmp: &mut Compilation, target: EntityId, note: Note, loc: SourceLocation) -> ConstructId {
    let id = init_node(cmp, target, InitKind::Invalid, &[], loc);
    cmp.note(id, note);
    id
}

/// Compile an initializer as written in the source for `target`
pub fn compile_initializer(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target: EntityId,
    ast: &InitializerAst,
    loc: SourceLocation,
) -> ConstructId {
    let target_ty = cmp.entity(target).ty().clone();
    if target_ty.is_reference() {
        return compile_reference_init(cmp, ctx, target, &target_ty, ast, loc);
    }
    if target_ty.is_bounded_array() {
        return compile_array_init(cmp, ctx, target, &target_ty, ast, loc);
    }
    if target_ty.is_complete_class_type() {
        return compile_class_init(cmp, ctx, target, &target_ty, ast, loc);
    }
    compile_atomic_init(cmp, ctx, target, &target_ty, ast, loc)
}

/// Copy-initialize `target` from an already-compiled argument expression.
/// Used for parameters and for return values.
pub fn initializer_from_arg(
    cmp: &mut Compilation,
    target: EntityId,
    arg: ConstructId,
    loc: SourceLocation,
) -> ConstructId {
    let target_ty = cmp.entity(target).ty().clone();
    if target_ty.is_reference() {
        return reference_bind(cmp, target, &target_ty, arg, loc);
    }
    if target_ty.is_complete_class_type() {
        return class_init_from_args(cmp, target, &target_ty, vec![arg], loc);
    }
    atomic_init_from_arg(cmp, target, &target_ty, arg, loc)
}

/// Direct-initialize `target` from already-compiled arguments.  Used for
/// constructor member initializer lists.
pub fn direct_initializer_from_args(
    cmp: &mut Compilation,
    target: EntityId,
    args: Vec<ConstructId>,
    loc: SourceLocation,
) -> ConstructId {
    let target_ty = cmp.entity(target).ty().clone();
    if target_ty.is_reference() {
        if args.len() == 1 {
            let arg = args[0];
            return reference_bind(cmp, target, &target_ty, arg, loc);
        }
        return invalid(cmp, target, Note::reference_bind_multiple(), loc);
    }
    if target_ty.is_complete_class_type() {
        return class_init_from_args(cmp, target, &target_ty, args, loc);
    }
    if target_ty.is_bounded_array() {
        let ty = target_ty.describe(&cmp.classes);
        return invalid(cmp, target, Note::array_string_literal(&ty), loc);
    }
    match args.len() {
        0 => init_node(cmp, target, InitKind::AtomicValue, &[], loc),
        1 => atomic_init_from_arg(cmp, target, &target_ty, args[0], loc),
        _ => {
            let ty = target_ty.describe(&cmp.classes);
            invalid(cmp, target, Note::scalar_init_multiple_args(&ty), loc)
        }
    }
}

/// Default-initialize `target` (no initializer written)
pub fn default_initializer(cmp: &mut Compilation, target: EntityId, loc: SourceLocation) -> ConstructId {
    let ctx = dummy_ctx(cmp);
    compile_initializer(cmp, ctx, target, &InitializerAst::Default, loc)
}

/// Value-initialize `target` (empty braces)
pub fn value_initializer(cmp: &mut Compilation, target: EntityId, loc: SourceLocation) -> ConstructId {
    let ctx = dummy_ctx(cmp);
    compile_initializer(cmp, ctx, target, &InitializerAst::Value, loc)
}

// Default/value initialization never looks names up, so any scope works.
fn dummy_ctx(cmp: &mut Compilation) -> ExprContext {
    let scope = if cmp.scopes.is_empty() {
        cmp.add_scope(None)
    } else {
        crate::compiler::entities::ScopeId(0)
    };
    ExprContext {
        scope,
        receiver: None,
    }
}

// ---------------------------------------------------------------- references

fn compile_reference_init(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target: EntityId,
    target_ty: &Type,
    ast: &InitializerAst,
    loc: SourceLocation,
) -> ConstructId {
    match ast {
        InitializerAst::Default => invalid(cmp, target, Note::reference_default_init(), loc),
        InitializerAst::Value => invalid(cmp, target, Note::reference_value_init(), loc),
        InitializerAst::Copy(e) => {
            let arg = compile_expr(cmp, ctx, e);
            reference_bind(cmp, target, target_ty, arg, loc)
        }
        InitializerAst::Direct(args) | InitializerAst::List(args) => {
            if args.len() != 1 {
                return invalid(cmp, target, Note::reference_bind_multiple(), loc);
            }
            let arg = compile_expr(cmp, ctx, &args[0]);
            reference_bind(cmp, target, target_ty, arg, loc)
        }
    }
}

fn reference_bind(
    cmp: &mut Compilation,
    target: EntityId,
    target_ty: &Type,
    arg: ConstructId,
    loc: SourceLocation,
) -> ConstructId {
    let referent = target_ty.referent().cloned().unwrap_or(Type::Void);
    let Some((arg_ty, cat)) = expr_type(cmp, arg) else {
        let id = init_node(cmp, target, InitKind::Invalid, &[arg], loc);
        return id;
    };

    if cat == ValueCategory::Lvalue {
        if reference_compatible(&arg_ty, &referent, &cmp.classes) {
            return init_node(
                cmp,
                target,
                InitKind::ReferenceBind {
                    arg,
                    materialize: None,
                },
                &[arg],
                loc,
            );
        }
        let id = init_node(cmp, target, InitKind::Invalid, &[arg], loc);
        let from = arg_ty.describe(&cmp.classes);
        let to = target_ty.describe(&cmp.classes);
        cmp.note(id, Note::reference_bind_type(&from, &to));
        return id;
    }

    // a prvalue can only be bound by a reference to const, through a
    // materialized temporary that lives to the end of the full expression
    if !referent.is_const() {
        let id = init_node(cmp, target, InitKind::Invalid, &[arg], loc);
        cmp.note(id, Note::reference_prvalue_const());
        return id;
    }
    match conversions::standard_conversion(cmp, arg, &referent.with_const(false)) {
        Some(converted) => {
            let temp = cmp.add_entity(Entity::TemporaryObject {
                ty: referent.with_const(false),
                description: "[materialized temporary]".to_string(),
            });
            let id = init_node(
                cmp,
                target,
                InitKind::ReferenceBind {
                    arg: converted,
                    materialize: Some(temp),
                },
                &[converted],
                loc,
            );
            cmp.register_temporary(id, temp);
            id
        }
        None => {
            let id = init_node(cmp, target, InitKind::Invalid, &[arg], loc);
            let from = arg_ty.describe(&cmp.classes);
            let to = target_ty.describe(&cmp.classes);
            cmp.note(id, Note::reference_bind_type(&from, &to));
            id
        }
    }
}

// -------------------------------------------------------------------- atomic

fn compile_atomic_init(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target: EntityId,
    target_ty: &Type,
    ast: &InitializerAst,
    loc: SourceLocation,
) -> ConstructId {
    match ast {
        InitializerAst::Default => init_node(cmp, target, InitKind::AtomicDefault, &[], loc),
        InitializerAst::Value => init_node(cmp, target, InitKind::AtomicValue, &[], loc),
        InitializerAst::Copy(e) => {
            let arg = compile_expr(cmp, ctx, e);
            atomic_init_from_arg(cmp, target, target_ty, arg, loc)
        }
        InitializerAst::Direct(args) | InitializerAst::List(args) => match args.len() {
            0 => init_node(cmp, target, InitKind::AtomicValue, &[], loc),
            1 => {
                let arg = compile_expr(cmp, ctx, &args[0]);
                atomic_init_from_arg(cmp, target, target_ty, arg, loc)
            }
            _ => {
                let ty = target_ty.describe(&cmp.classes);
                invalid(cmp, target, Note::scalar_init_multiple_args(&ty), loc)
            }
        },
    }
}

fn atomic_init_from_arg(
    cmp: &mut Compilation,
    target: EntityId,
    target_ty: &Type,
    arg: ConstructId,
    loc: SourceLocation,
) -> ConstructId {
    match conversions::standard_conversion(cmp, arg, &target_ty.with_const(false)) {
        Some(converted) => init_node(
            cmp,
            target,
            InitKind::AtomicArg { arg: converted },
            &[converted],
            loc,
        ),
        None => {
            let id = init_node(cmp, target, InitKind::Invalid, &[arg], loc);
            let from = expr_type(cmp, arg)
                .map(|(t, _)| t.describe(&cmp.classes))
                .unwrap_or_else(|| "<error>".to_string());
            let to = target_ty.describe(&cmp.classes);
            cmp.note(id, Note::cannot_convert(&from, &to));
            id
        }
    }
}

// -------------------------------------------------------------------- arrays

fn element_entity(cmp: &mut Compilation, of: EntityId, index: usize, ty: &Type) -> EntityId {
    cmp.add_entity(Entity::ArraySubobject {
        of,
        index,
        ty: ty.clone(),
    })
}

fn compile_array_init(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target: EntityId,
    target_ty: &Type,
    ast: &InitializerAst,
    loc: SourceLocation,
) -> ConstructId {
    let elem = target_ty.elem_type().cloned().unwrap_or(Type::Void);
    let len = target_ty.array_len().unwrap_or(0);

    match ast {
        InitializerAst::Default => {
            // atomic elements stay indeterminate; class elements need their
            // default constructors run
            let element_inits = if elem.is_atomic() {
                Vec::new()
            } else {
                (0..len)
                    .map(|i| {
                        let e = element_entity(cmp, target, i, &elem);
                        default_initializer(cmp, e, loc)
                    })
                    .collect()
            };
            let id = init_node(cmp, target, InitKind::ArrayDefault { element_inits: vec![] }, &[], loc);
            attach_elements(cmp, id, element_inits, |k, e| {
                *k = InitKind::ArrayDefault { element_inits: e }
            });
            id
        }
        InitializerAst::Value => {
            let element_inits: Vec<ConstructId> = (0..len)
                .map(|i| {
                    let e = element_entity(cmp, target, i, &elem);
                    value_initializer(cmp, e, loc)
                })
                .collect();
            let id = init_node(cmp, target, InitKind::ArrayValue { element_inits: vec![] }, &[], loc);
            attach_elements(cmp, id, element_inits, |k, e| {
                *k = InitKind::ArrayValue { element_inits: e }
            });
            id
        }
        InitializerAst::Copy(e) => {
            array_init_single_arg(cmp, ctx, target, target_ty, &elem, len, e, loc)
        }
        InitializerAst::Direct(args) => {
            if args.len() == 1 {
                array_init_single_arg(cmp, ctx, target, target_ty, &elem, len, &args[0], loc)
            } else {
                let ty = target_ty.describe(&cmp.classes);
                invalid(cmp, target, Note::array_string_literal(&ty), loc)
            }
        }
        InitializerAst::List(args) => {
            let id = init_node(cmp, target, InitKind::ArrayList { element_inits: vec![] }, &[], loc);
            if args.len() > len {
                cmp.note(id, Note::aggregate_excess_initializers(args.len(), len));
            }
            let mut element_inits = Vec::with_capacity(len);
            for (i, arg_ast) in args.iter().take(len).enumerate() {
                let e = element_entity(cmp, target, i, &elem);
                let arg = compile_expr(cmp, ctx, arg_ast);
                element_inits.push(initializer_from_arg(cmp, e, arg, loc));
            }
            for i in args.len()..len {
                let e = element_entity(cmp, target, i, &elem);
                element_inits.push(value_initializer(cmp, e, loc));
            }
            attach_elements(cmp, id, element_inits, |k, e| {
                *k = InitKind::ArrayList { element_inits: e }
            });
            id
        }
    }
}

fn attach_elements(
    cmp: &mut Compilation,
    id: ConstructId,
    element_inits: Vec<ConstructId>,
    set: impl FnOnce(&mut InitKind, Vec<ConstructId>),
) {
    for &e in &element_inits {
        cmp.attach(id, e);
    }
    if let ConstructKind::Initializer(init) = &mut cmp.construct_mut(id).kind {
        set(&mut init.kind, element_inits);
    }
}

/// `char buf[N] = "...";` is the only single-argument array initialization
fn array_init_single_arg(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target: EntityId,
    target_ty: &Type,
    elem: &Type,
    len: usize,
    arg_ast: &ExprAst,
    loc: SourceLocation,
) -> ConstructId {
    let is_char_array = elem.as_atomic() == Some(crate::types::AtomicType::Char);
    if let (true, ExprAst::StringLiteral(text, _)) = (is_char_array, arg_ast) {
        let literal_index = cmp.intern_string(text);
        let literal_len = cmp.string_literals[literal_index].len();
        if literal_len > len {
            return invalid(
                cmp,
                target,
                Note::string_literal_too_long(literal_len, len),
                loc,
            );
        }
        return init_node(cmp, target, InitKind::ArrayString { literal_index }, &[], loc);
    }
    let arg = compile_expr(cmp, ctx, arg_ast);
    let ty = target_ty.describe(&cmp.classes);
    let id = init_node(cmp, target, InitKind::Invalid, &[arg], loc);
    cmp.note(id, Note::array_string_literal(&ty));
    id
}

// ------------------------------------------------------------------- classes

fn compile_class_init(
    cmp: &mut Compilation,
    ctx: ExprContext,
    target: EntityId,
    target_ty: &Type,
    ast: &InitializerAst,
    loc: SourceLocation,
) -> ConstructId {
    let class = match target_ty.class_id() {
        Some(c) => c,
        None => return invalid(cmp, target, Note::unknown_type("<class>"), loc),
    };
    match ast {
        InitializerAst::Default => class_ctor_init(cmp, target, target_ty, Vec::new(), false, loc),
        InitializerAst::Value => {
            let zero_fill = !cmp.class(class).has_user_constructor;
            class_ctor_init(cmp, target, target_ty, Vec::new(), zero_fill, loc)
        }
        InitializerAst::Direct(args) => {
            let args: Vec<ConstructId> = args.iter().map(|a| compile_expr(cmp, ctx, a)).collect();
            class_ctor_init(cmp, target, target_ty, args, false, loc)
        }
        InitializerAst::Copy(e) => {
            let arg = compile_expr(cmp, ctx, e);
            class_ctor_init(cmp, target, target_ty, vec![arg], false, loc)
        }
        InitializerAst::List(_) => {
            let name = cmp.class(class).name.clone();
            invalid(cmp, target, Note::list_init_class(&name), loc)
        }
    }
}

fn class_init_from_args(
    cmp: &mut Compilation,
    target: EntityId,
    target_ty: &Type,
    args: Vec<ConstructId>,
    loc: SourceLocation,
) -> ConstructId {
    class_ctor_init(cmp, target, target_ty, args, false, loc)
}

fn class_ctor_init(
    cmp: &mut Compilation,
    target: EntityId,
    target_ty: &Type,
    args: Vec<ConstructId>,
    zero_fill: bool,
    loc: SourceLocation,
) -> ConstructId {
    let class = match target_ty.class_id() {
        Some(c) => c,
        None => return invalid(cmp, target, Note::unknown_type("<class>"), loc),
    };
    let candidates = cmp.class(class).constructors.clone();
    let mut arg_types = Vec::with_capacity(args.len());
    for &a in &args {
        match expr_type(cmp, a) {
            Some(info) => arg_types.push(info),
            // the argument already carries its own error
            None => return init_node(cmp, target, InitKind::Invalid, &args, loc),
        }
    }
    match overloads::resolve(cmp, &candidates, &arg_types) {
        OverloadResult::Selected(ctor) => {
            let call = compile_call(cmp, ctor, args, loc);
            let id = init_node(
                cmp,
                target,
                InitKind::ClassCtor {
                    zero_fill,
                    ctor_call: call,
                },
                &[call],
                loc,
            );
            id
        }
        OverloadResult::NoViable => {
            let name = cmp.class(class).name.clone();
            let id = init_node(cmp, target, InitKind::Invalid, &args, loc);
            cmp.note(id, Note::no_matching_constructor(&name));
            id
        }
        OverloadResult::Ambiguous => {
            let name = cmp.class(class).name.clone();
            let id = init_node(cmp, target, InitKind::Invalid, &args, loc);
            cmp.note(id, Note::ambiguous_overload(&name));
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::notes::NoteKind;

    fn target(cmp: &mut Compilation, ty: Type) -> EntityId {
        cmp.add_entity(Entity::LocalObject {
            name: "x".to_string(),
            ty,
        })
    }

    fn ctx(cmp: &mut Compilation) -> ExprContext {
        let scope = cmp.add_scope(None);
        ExprContext {
            scope,
            receiver: None,
        }
    }

    #[test]
    fn atomic_default_init_has_no_argument() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let t = target(&mut cmp, Type::int());
        let init = compile_initializer(&mut cmp, c, t, &InitializerAst::Default, Default::default());
        match &cmp.construct(init).kind {
            ConstructKind::Initializer(i) => assert!(matches!(i.kind, InitKind::AtomicDefault)),
            _ => panic!("not an initializer"),
        }
    }

    #[test]
    fn reference_default_init_is_an_error() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let t = target(&mut cmp, Type::reference_to(Type::int()));
        let init = compile_initializer(&mut cmp, c, t, &InitializerAst::Default, Default::default());
        assert!(cmp.has_errors(init));
        assert_eq!(
            cmp.construct(init).notes[0].kind,
            NoteKind::ReferenceDefaultInit
        );
    }

    #[test]
    fn char_array_accepts_fitting_string_literal() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let t = target(&mut cmp, Type::array_of(Type::char_(), 5));
        let init = compile_initializer(
            &mut cmp,
            c,
            t,
            &InitializerAst::Copy(Box::new(ExprAst::StringLiteral(
                "hi".to_string(),
                Default::default(),
            ))),
            Default::default(),
        );
        assert!(!cmp.has_errors(init));
        match &cmp.construct(init).kind {
            ConstructKind::Initializer(i) => {
                assert!(matches!(i.kind, InitKind::ArrayString { .. }))
            }
            _ => panic!("not an initializer"),
        }
    }

    #[test]
    fn char_array_rejects_oversized_string_literal() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let t = target(&mut cmp, Type::array_of(Type::char_(), 1));
        let init = compile_initializer(
            &mut cmp,
            c,
            t,
            &InitializerAst::Copy(Box::new(ExprAst::StringLiteral(
                "hi".to_string(),
                Default::default(),
            ))),
            Default::default(),
        );
        assert!(cmp.has_errors(init));
        assert_eq!(
            cmp.construct(init).notes[0].kind,
            NoteKind::StringLiteralTooLong
        );
    }

    #[test]
    fn list_init_pads_remaining_elements_with_value_inits() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let t = target(&mut cmp, Type::array_of(Type::int(), 4));
        let init = compile_initializer(
            &mut cmp,
            c,
            t,
            &InitializerAst::List(vec![
                ExprAst::IntLiteral(1, Default::default()),
                ExprAst::IntLiteral(2, Default::default()),
            ]),
            Default::default(),
        );
        assert!(!cmp.has_errors(init));
        match &cmp.construct(init).kind {
            ConstructKind::Initializer(i) => match &i.kind {
                InitKind::ArrayList { element_inits } => assert_eq!(element_inits.len(), 4),
                other => panic!("unexpected init kind: {other:?}"),
            },
            _ => panic!("not an initializer"),
        }
    }

    #[test]
    fn excess_list_initializers_note_but_keep_fitting_elements() {
        let mut cmp = Compilation::new();
        let c = ctx(&mut cmp);
        let t = target(&mut cmp, Type::array_of(Type::int(), 1));
        let init = compile_initializer(
            &mut cmp,
            c,
            t,
            &InitializerAst::List(vec![
                ExprAst::IntLiteral(1, Default::default()),
                ExprAst::IntLiteral(2, Default::default()),
            ]),
            Default::default(),
        );
        assert!(cmp.has_errors(init));
        match &cmp.construct(init).kind {
            ConstructKind::Initializer(i) => match &i.kind {
                InitKind::ArrayList { element_inits } => assert_eq!(element_inits.len(), 1),
                other => panic!("unexpected init kind: {other:?}"),
            },
            _ => panic!("not an initializer"),
        }
    }
}
