//! The C++ type model
//!
//! Types are immutable descriptions used pervasively for dispatch during
//! compilation (initializer selection, conversions, overload ranking) and at
//! runtime (object layout, pointer arithmetic).
//!
//! # Type Sizes
//!
//! Sizes are fixed and platform-independent:
//! - `bool`, `char`: 1 byte
//! - `int`: 4 bytes
//! - `double`: 8 bytes
//! - pointers: 8 bytes regardless of pointee
//! - arrays: element size × length
//! - classes: base size plus the sum of member sizes (no padding)
//!
//! References have no size of their own; a reference is an alias managed by
//! the binding machinery, not a distinct runtime object.

use crate::ast::SourceLocation;
use crate::compiler::entities::EntityId;

/// Index of a class definition in the compilation's class registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

/// The atomic (non-compound) value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicType {
    Bool,
    Char,
    Int,
    Double,
}

impl AtomicType {
    pub fn size(self) -> usize {
        match self {
            AtomicType::Bool | AtomicType::Char => 1,
            AtomicType::Int => 4,
            AtomicType::Double => 8,
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(self, AtomicType::Bool | AtomicType::Char | AtomicType::Int)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, AtomicType::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            AtomicType::Bool => "bool",
            AtomicType::Char => "char",
            AtomicType::Int => "int",
            AtomicType::Double => "double",
        }
    }
}

/// A C++ type.
///
/// `is_const` on the variants that carry it is the top-level cv-qualifier;
/// nested qualification lives on the nested types.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Atomic {
        atomic: AtomicType,
        is_const: bool,
    },
    Pointer {
        pointee: Box<Type>,
        is_const: bool,
    },
    Reference {
        referent: Box<Type>,
    },
    BoundedArray {
        elem: Box<Type>,
        len: usize,
    },
    Class {
        class: ClassId,
        is_const: bool,
    },
}

impl Type {
    pub fn atomic(atomic: AtomicType) -> Type {
        Type::Atomic {
            atomic,
            is_const: false,
        }
    }

    pub fn int() -> Type {
        Type::atomic(AtomicType::Int)
    }

    pub fn char_() -> Type {
        Type::atomic(AtomicType::Char)
    }

    pub fn bool_() -> Type {
        Type::atomic(AtomicType::Bool)
    }

    pub fn double() -> Type {
        Type::atomic(AtomicType::Double)
    }

    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer {
            pointee: Box::new(pointee),
            is_const: false,
        }
    }

    pub fn reference_to(referent: Type) -> Type {
        debug_assert!(!referent.is_reference(), "reference to reference");
        Type::Reference {
            referent: Box::new(referent),
        }
    }

    pub fn array_of(elem: Type, len: usize) -> Type {
        Type::BoundedArray {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn class(class: ClassId) -> Type {
        Type::Class {
            class,
            is_const: false,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Type::Atomic { .. } | Type::Pointer { .. })
    }

    /// The scalar value kind held by an atomic object of this type, if any.
    pub fn as_atomic(&self) -> Option<AtomicType> {
        match self {
            Type::Atomic { atomic, .. } => Some(*atomic),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference { .. })
    }

    pub fn referent(&self) -> Option<&Type> {
        match self {
            Type::Reference { referent } => Some(referent),
            _ => None,
        }
    }

    /// Strips an outer reference, if present
    pub fn peel_reference(&self) -> &Type {
        match self {
            Type::Reference { referent } => referent,
            other => other,
        }
    }

    pub fn is_bounded_array(&self) -> bool {
        matches!(self, Type::BoundedArray { .. })
    }

    pub fn elem_type(&self) -> Option<&Type> {
        match self {
            Type::BoundedArray { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self {
            Type::BoundedArray { len, .. } => Some(*len),
            _ => None,
        }
    }

    pub fn is_complete_class_type(&self) -> bool {
        matches!(self, Type::Class { .. })
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            Type::Class { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Object types are everything an object can have: atomics, pointers,
    /// arrays, classes.  Not void, not references, not functions.
    pub fn is_complete_object_type(&self) -> bool {
        !matches!(self, Type::Void | Type::Reference { .. })
    }

    pub fn is_const(&self) -> bool {
        match self {
            Type::Atomic { is_const, .. }
            | Type::Pointer { is_const, .. }
            | Type::Class { is_const, .. } => *is_const,
            // array constness comes from the element type
            Type::BoundedArray { elem, .. } => elem.is_const(),
            Type::Void | Type::Reference { .. } => false,
        }
    }

    pub fn with_const(&self, value: bool) -> Type {
        match self {
            Type::Atomic { atomic, .. } => Type::Atomic {
                atomic: *atomic,
                is_const: value,
            },
            Type::Pointer { pointee, .. } => Type::Pointer {
                pointee: pointee.clone(),
                is_const: value,
            },
            Type::Class { class, .. } => Type::Class {
                class: *class,
                is_const: value,
            },
            Type::BoundedArray { elem, len } => Type::BoundedArray {
                elem: Box::new(elem.with_const(value)),
                len: *len,
            },
            other => other.clone(),
        }
    }

    /// Same type, ignoring top-level cv-qualification.
    pub fn same_type_as(&self, other: &Type) -> bool {
        self.with_const(false) == other.with_const(false)
    }

    /// Size of an object of this type in bytes
    pub fn size(&self, classes: &[ClassDefinition]) -> usize {
        match self {
            Type::Void => 0,
            Type::Atomic { atomic, .. } => atomic.size(),
            Type::Pointer { .. } => 8,
            // a bound reference occupies no storage of its own
            Type::Reference { .. } => 0,
            Type::BoundedArray { elem, len } => elem.size(classes) * len,
            Type::Class { class, .. } => classes[class.0].size(classes),
        }
    }

    /// Human-readable type name for diagnostics
    pub fn describe(&self, classes: &[ClassDefinition]) -> String {
        match self {
            Type::Void => "void".to_string(),
            Type::Atomic { atomic, is_const } => {
                if *is_const {
                    format!("const {}", atomic.name())
                } else {
                    atomic.name().to_string()
                }
            }
            Type::Pointer { pointee, is_const } => {
                let inner = pointee.describe(classes);
                if *is_const {
                    format!("{inner}* const")
                } else {
                    format!("{inner}*")
                }
            }
            Type::Reference { referent } => format!("{}&", referent.describe(classes)),
            Type::BoundedArray { elem, len } => {
                format!("{}[{}]", elem.describe(classes), len)
            }
            Type::Class { class, is_const } => {
                let name = &classes[class.0].name;
                if *is_const {
                    format!("const {name}")
                } else {
                    name.clone()
                }
            }
        }
    }
}

/// True if an lvalue of type `from` may be directly bound by a reference to
/// `to`: identical underlying type (or a derived class of it) with the
/// target at least as cv-qualified.
pub fn reference_compatible(from: &Type, to: &Type, classes: &[ClassDefinition]) -> bool {
    if to.is_const() || !from.is_const() {
        if from.same_type_as(to) {
            return true;
        }
        // derived-to-base binding
        if let (Some(from_class), Some(to_class)) = (from.class_id(), to.class_id()) {
            return derives_from(from_class, to_class, classes);
        }
    }
    false
}

/// True if `derived` is `base` or inherits (transitively) from it
pub fn derives_from(derived: ClassId, base: ClassId, classes: &[ClassDefinition]) -> bool {
    let mut current = Some(derived);
    while let Some(c) = current {
        if c == base {
            return true;
        }
        current = classes[c.0].base;
    }
    false
}

/// A non-static data member of a class
#[derive(Debug, Clone)]
pub struct ClassMember {
    pub name: String,
    pub ty: Type,
}

/// A compiled class definition: members, base, and special member functions.
///
/// Constructor/destructor references are function entities; their definitions
/// live in the construct arena like any other function.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    pub id: ClassId,
    pub name: String,
    pub base: Option<ClassId>,
    pub members: Vec<ClassMember>,
    pub constructors: Vec<EntityId>,
    pub destructor: Option<EntityId>,
    /// true if any constructor was written by the user (as opposed to the
    /// implicitly generated default constructor)
    pub has_user_constructor: bool,
    pub has_user_copy_constructor: bool,
    pub has_user_destructor: bool,
    pub location: SourceLocation,
}

impl ClassDefinition {
    pub fn size(&self, classes: &[ClassDefinition]) -> usize {
        let base_size = self
            .base
            .map(|b| classes[b.0].size(classes))
            .unwrap_or(0);
        base_size
            + self
                .members
                .iter()
                .map(|m| m.ty.size(classes))
                .sum::<usize>()
    }

    pub fn member(&self, name: &str) -> Option<&ClassMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_sizes() {
        assert_eq!(AtomicType::Bool.size(), 1);
        assert_eq!(AtomicType::Char.size(), 1);
        assert_eq!(AtomicType::Int.size(), 4);
        assert_eq!(AtomicType::Double.size(), 8);
    }

    #[test]
    fn same_type_ignores_top_level_const() {
        let a = Type::int();
        let b = Type::int().with_const(true);
        assert!(a.same_type_as(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn array_size_scales_by_length() {
        let t = Type::array_of(Type::int(), 5);
        assert_eq!(t.size(&[]), 20);
    }

    #[test]
    fn reference_compatibility_respects_const() {
        let classes = &[];
        // const int& can bind to int lvalue
        assert!(reference_compatible(
            &Type::int(),
            &Type::int().with_const(true),
            classes
        ));
        // int& cannot bind to const int lvalue
        assert!(!reference_compatible(
            &Type::int().with_const(true),
            &Type::int(),
            classes
        ));
    }
}
