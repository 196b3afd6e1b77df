//! Standard conversions
//!
//! Implicit conversions are materialized as explicit [`ExprKind::ImplicitConversion`]
//! nodes wrapped around their operand, so the runtime never converts
//! implicitly: every lvalue-to-rvalue read, array decay, promotion, and
//! numeric conversion is a visible step.
//!
//! [`rank`] answers the cheaper question the overload resolver asks: *how
//! good* would the conversion from an argument to a parameter type be,
//! without building any nodes.

use crate::compiler::constructs::{
    ConstructId, ConstructKind, ConversionKind, ExprKind, Expression, ValueCategory,
};
use crate::compiler::expressions::expr_type;
use crate::compiler::Compilation;
use crate::types::{reference_compatible, AtomicType, ClassDefinition, Type};

/// Quality of an implicit conversion sequence, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConvRank {
    Exact,
    Promotion,
    Conversion,
}

fn atomic_rank(from: AtomicType, to: AtomicType) -> ConvRank {
    if from == to {
        ConvRank::Exact
    } else if matches!(from, AtomicType::Bool | AtomicType::Char) && to == AtomicType::Int {
        ConvRank::Promotion
    } else {
        ConvRank::Conversion
    }
}

/// `nullptr` is typed as a prvalue pointer-to-void; no other expression in
/// the subset produces one.
fn is_nullptr_type(ty: &Type) -> bool {
    matches!(ty.pointee(), Some(Type::Void))
}

/// Rank the implicit conversion from an argument of type `from` (with the
/// given value category) to a parameter of type `to`.  `None` means the
/// argument cannot be converted at all.
pub fn rank(
    from: &Type,
    from_cat: ValueCategory,
    to: &Type,
    classes: &[ClassDefinition],
) -> Option<ConvRank> {
    if let Some(referent) = to.referent() {
        // Direct binding requires an lvalue of compatible type.  A reference
        // to const may additionally bind a converted temporary.
        if from_cat == ValueCategory::Lvalue && reference_compatible(from, referent, classes) {
            return Some(if from.same_type_as(referent) {
                ConvRank::Exact
            } else {
                ConvRank::Conversion
            });
        }
        if referent.is_const() {
            return rank(from, ValueCategory::Prvalue, &referent.with_const(false), classes);
        }
        return None;
    }

    // Array-to-pointer decay, then treat as a pointer argument
    if from.is_bounded_array() {
        if let (Some(elem), Some(pointee)) = (from.elem_type(), to.pointee()) {
            if elem.same_type_as(pointee) && (pointee.is_const() || !elem.is_const()) {
                return Some(ConvRank::Exact);
            }
        }
        return None;
    }

    if let (Some(from_class), Some(to_class)) = (from.class_id(), to.class_id()) {
        if from_class == to_class {
            return Some(ConvRank::Exact);
        }
        if crate::types::derives_from(from_class, to_class, classes) {
            return Some(ConvRank::Conversion);
        }
        return None;
    }

    if let (Some(f), Some(t)) = (from.as_atomic(), to.as_atomic()) {
        return Some(atomic_rank(f, t));
    }

    if to.is_pointer() {
        if is_nullptr_type(from) {
            return Some(ConvRank::Conversion);
        }
        if let (Some(fp), Some(tp)) = (from.pointee(), to.pointee()) {
            if fp == tp {
                return Some(ConvRank::Exact);
            }
            if fp.same_type_as(tp) && tp.is_const() {
                // qualification conversion
                return Some(ConvRank::Exact);
            }
        }
        return None;
    }

    None
}

fn wrap(
    cmp: &mut Compilation,
    operand: ConstructId,
    conversion: ConversionKind,
    ty: Type,
) -> ConstructId {
    let location = cmp.construct(operand).location;
    let node = cmp.add_construct(
        ConstructKind::Expression(Expression::prvalue(
            ty,
            ExprKind::ImplicitConversion {
                conversion,
                operand,
            },
        )),
        location,
    );
    cmp.attach(node, operand);
    node
}

/// Convert an expression to a prvalue: decay arrays to pointers, read
/// atomic lvalues.  Class lvalues stay as they are (copies go through
/// constructors, never through a value read).
pub fn to_prvalue(cmp: &mut Compilation, expr: ConstructId) -> ConstructId {
    let Some((ty, cat)) = expr_type(cmp, expr) else {
        return expr;
    };
    if cat == ValueCategory::Prvalue {
        return expr;
    }
    if let Some(elem) = ty.elem_type() {
        let ptr = Type::pointer_to(elem.clone());
        return wrap(cmp, expr, ConversionKind::ArrayToPointer, ptr);
    }
    if ty.is_complete_class_type() {
        return expr;
    }
    wrap(
        cmp,
        expr,
        ConversionKind::LvalueToRvalue,
        ty.with_const(false),
    )
}

/// Build the standard conversion sequence from `expr` to a prvalue of the
/// (non-reference) type `target`.  Returns `None` when no sequence exists;
/// the caller attaches the diagnostic.
pub fn standard_conversion(
    cmp: &mut Compilation,
    expr: ConstructId,
    target: &Type,
) -> Option<ConstructId> {
    debug_assert!(!target.is_reference());
    let (ty, _) = expr_type(cmp, expr)?;

    // Class targets convert via constructors, not via value conversions
    if target.is_complete_class_type() {
        if let (Some(from_class), Some(to_class)) = (ty.class_id(), target.class_id()) {
            if from_class == to_class
                || crate::types::derives_from(from_class, to_class, &cmp.classes)
            {
                return Some(expr);
            }
        }
        return None;
    }

    let cur = to_prvalue(cmp, expr);
    let (ty, _) = expr_type(cmp, cur)?;

    if ty.same_type_as(target) {
        return Some(cur);
    }

    if let (Some(f), Some(t)) = (ty.as_atomic(), target.as_atomic()) {
        let conversion = if f.is_integral() && t.is_integral() {
            match atomic_rank(f, t) {
                ConvRank::Promotion => ConversionKind::IntegralPromotion,
                _ => ConversionKind::IntegralConversion,
            }
        } else {
            ConversionKind::FloatingIntegralConversion
        };
        return Some(wrap(cmp, cur, conversion, target.with_const(false)));
    }

    if target.is_pointer() {
        if is_nullptr_type(&ty) {
            return Some(wrap(
                cmp,
                cur,
                ConversionKind::NullptrToPointer,
                target.with_const(false),
            ));
        }
        if let (Some(fp), Some(tp)) = (ty.pointee(), target.pointee()) {
            if fp.same_type_as(tp) && tp.is_const() && !fp.is_const() {
                return Some(wrap(
                    cmp,
                    cur,
                    ConversionKind::Qualification,
                    target.with_const(false),
                ));
            }
        }
    }

    None
}

/// Convert a condition expression to `bool`
pub fn contextual_bool(cmp: &mut Compilation, expr: ConstructId) -> Option<ConstructId> {
    standard_conversion(cmp, expr, &Type::bool_())
}

/// The common type two arithmetic operands are brought to before a binary
/// operation: `double` wins, otherwise everything computes in `int`.
pub fn usual_arithmetic_type(lhs: &Type, rhs: &Type) -> Option<Type> {
    let l = lhs.as_atomic()?;
    let r = rhs.as_atomic()?;
    if l.is_floating() || r.is_floating() {
        Some(Type::double())
    } else {
        Some(Type::int())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_ranks_between_exact_and_conversion() {
        assert!(ConvRank::Exact < ConvRank::Promotion);
        assert!(ConvRank::Promotion < ConvRank::Conversion);
    }

    #[test]
    fn char_to_int_is_promotion() {
        let r = rank(
            &Type::char_(),
            ValueCategory::Prvalue,
            &Type::int(),
            &[],
        );
        assert_eq!(r, Some(ConvRank::Promotion));
    }

    #[test]
    fn double_to_int_is_conversion() {
        let r = rank(
            &Type::double(),
            ValueCategory::Prvalue,
            &Type::int(),
            &[],
        );
        assert_eq!(r, Some(ConvRank::Conversion));
    }

    #[test]
    fn pointer_types_do_not_interconvert() {
        let r = rank(
            &Type::pointer_to(Type::int()),
            ValueCategory::Prvalue,
            &Type::pointer_to(Type::double()),
            &[],
        );
        assert_eq!(r, None);
    }

    #[test]
    fn nonconst_ref_rejects_prvalue() {
        let r = rank(
            &Type::int(),
            ValueCategory::Prvalue,
            &Type::reference_to(Type::int()),
            &[],
        );
        assert_eq!(r, None);
    }

    #[test]
    fn const_ref_accepts_converted_prvalue() {
        let r = rank(
            &Type::int(),
            ValueCategory::Prvalue,
            &Type::reference_to(Type::double().with_const(true)),
            &[],
        );
        assert_eq!(r, Some(ConvRank::Conversion));
    }
}
