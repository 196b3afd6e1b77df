//! Overload resolution
//!
//! Given a set of candidate function entities and the types of the argument
//! expressions, pick the unique best viable candidate by per-argument
//! conversion rank, or report that none (or more than one) exists.

use crate::compiler::constructs::ValueCategory;
use crate::compiler::conversions::{self, ConvRank};
use crate::compiler::entities::{Entity, EntityId};
use crate::compiler::Compilation;
use crate::types::Type;

/// Outcome of overload resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadResult {
    Selected(EntityId),
    NoViable,
    Ambiguous,
}

struct Viable {
    entity: EntityId,
    ranks: Vec<ConvRank>,
}

/// `a` is better than `b` if it is at least as good for every argument and
/// strictly better for at least one.
fn better_than(a: &[ConvRank], b: &[ConvRank]) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
}

pub fn resolve(
    cmp: &Compilation,
    candidates: &[EntityId],
    args: &[(Type, ValueCategory)],
) -> OverloadResult {
    let mut viable: Vec<Viable> = Vec::new();

    for &cand in candidates {
        let Entity::Function { signature, .. } = cmp.entity(cand) else {
            continue;
        };
        if signature.param_types.len() != args.len() {
            continue;
        }
        let mut ranks = Vec::with_capacity(args.len());
        let mut ok = true;
        for ((arg_ty, arg_cat), param_ty) in args.iter().zip(&signature.param_types) {
            match conversions::rank(arg_ty, *arg_cat, param_ty, &cmp.classes) {
                Some(r) => ranks.push(r),
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            viable.push(Viable {
                entity: cand,
                ranks,
            });
        }
    }

    if viable.is_empty() {
        return OverloadResult::NoViable;
    }

    let mut best = 0;
    for i in 1..viable.len() {
        if better_than(&viable[i].ranks, &viable[best].ranks) {
            best = i;
        }
    }
    // the winner must beat or tie-break every other viable candidate
    for (i, v) in viable.iter().enumerate() {
        if i != best && !better_than(&viable[best].ranks, &v.ranks) {
            return OverloadResult::Ambiguous;
        }
    }
    OverloadResult::Selected(viable[best].entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::entities::{FunctionKind, FunctionSignature};

    fn add_fn(cmp: &mut Compilation, params: Vec<Type>) -> EntityId {
        cmp.add_entity(Entity::Function {
            name: "f".to_string(),
            signature: FunctionSignature {
                return_type: Type::Void,
                param_types: params,
            },
            kind: FunctionKind::Free,
            definition: None,
        })
    }

    #[test]
    fn exact_match_beats_conversion() {
        let mut cmp = Compilation::new();
        let f_int = add_fn(&mut cmp, vec![Type::int()]);
        let f_double = add_fn(&mut cmp, vec![Type::double()]);

        let result = resolve(
            &cmp,
            &[f_int, f_double],
            &[(Type::int(), ValueCategory::Prvalue)],
        );
        assert_eq!(result, OverloadResult::Selected(f_int));
    }

    #[test]
    fn two_equal_conversions_are_ambiguous() {
        let mut cmp = Compilation::new();
        let f_int = add_fn(&mut cmp, vec![Type::int()]);
        let f_bool = add_fn(&mut cmp, vec![Type::bool_()]);

        let result = resolve(
            &cmp,
            &[f_int, f_bool],
            &[(Type::double(), ValueCategory::Prvalue)],
        );
        assert_eq!(result, OverloadResult::Ambiguous);
    }

    #[test]
    fn arity_mismatch_is_not_viable() {
        let mut cmp = Compilation::new();
        let f = add_fn(&mut cmp, vec![Type::int(), Type::int()]);

        let result = resolve(&cmp, &[f], &[(Type::int(), ValueCategory::Prvalue)]);
        assert_eq!(result, OverloadResult::NoViable);
    }
}
