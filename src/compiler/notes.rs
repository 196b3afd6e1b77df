//! Compile-time diagnostics
//!
//! Semantic problems are recorded as [`Note`]s attached to the construct
//! where they were detected.  Notes never abort compilation: sibling
//! constructs keep compiling, and the whole program's diagnostics are
//! gathered bottom-up.  A construct subtree with any error-severity note is
//! not eligible to produce runtime instances.

use crate::ast::SourceLocation;
use std::fmt;

/// How serious a note is.  Only `Error` blocks simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A symbolic identity for each diagnostic, independent of its message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    NameNotFound,
    Redeclaration,
    NotAFunction,
    NotAnObject,
    InvalidOperand,
    AssignmentToRvalue,
    AssignmentToConst,
    AssignmentToClass,
    CannotConvert,
    ReferenceDefaultInit,
    ReferenceValueInit,
    ReferenceBindMultiple,
    ReferenceBindType,
    ReferencePrvalueConst,
    ScalarInitMultipleArgs,
    ArrayStringLiteral,
    StringLiteralTooLong,
    AggregateExcessInitializers,
    ArrayDirectInit,
    NoMatchingConstructor,
    NoMatchingFunction,
    AmbiguousOverload,
    ListInitClass,
    NoDestructor,
    RuleOfThree,
    MemberNotFound,
    NotAClass,
    NewInvalidType,
    DeleteInvalidOperand,
    ReturnValueInVoid,
    ReturnValueMissing,
    ConditionNotConvertible,
    SubscriptInvalidOperand,
    DereferenceInvalidOperand,
    AddressOfRvalue,
    UnknownType,
    MemberInitUnknown,
}

/// One diagnostic message attached to a construct
#[derive(Debug, Clone)]
pub struct Note {
    pub severity: Severity,
    pub kind: NoteKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Note {
    pub fn error(kind: NoteKind, message: impl Into<String>) -> Note {
        Note {
            severity: Severity::Error,
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(kind: NoteKind, message: impl Into<String>) -> Note {
        Note {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Note {
        self.location = Some(location);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    // Constructors for the common diagnostics, so the message wording lives
    // in one place.

    pub fn name_not_found(name: &str) -> Note {
        Note::error(NoteKind::NameNotFound, format!("Name '{name}' was not found"))
    }

    pub fn redeclaration(name: &str) -> Note {
        Note::error(
            NoteKind::Redeclaration,
            format!("'{name}' was already declared in this scope"),
        )
    }

    pub fn not_a_function(name: &str) -> Note {
        Note::error(
            NoteKind::NotAFunction,
            format!("'{name}' does not name a function"),
        )
    }

    pub fn cannot_convert(from: &str, to: &str) -> Note {
        Note::error(
            NoteKind::CannotConvert,
            format!("Cannot convert from '{from}' to '{to}'"),
        )
    }

    pub fn reference_default_init() -> Note {
        Note::error(
            NoteKind::ReferenceDefaultInit,
            "A reference must be bound to something when it is declared",
        )
    }

    pub fn reference_value_init() -> Note {
        Note::error(
            NoteKind::ReferenceValueInit,
            "A reference cannot be value-initialized; it must be bound to an object",
        )
    }

    pub fn reference_bind_multiple() -> Note {
        Note::error(
            NoteKind::ReferenceBindMultiple,
            "A reference is bound to exactly one object; multiple initializer arguments are not allowed",
        )
    }

    pub fn reference_bind_type(from: &str, to: &str) -> Note {
        Note::error(
            NoteKind::ReferenceBindType,
            format!("A reference of type '{to}' cannot be bound to '{from}'"),
        )
    }

    pub fn reference_prvalue_const() -> Note {
        Note::error(
            NoteKind::ReferencePrvalueConst,
            "A temporary may only be bound to a reference to const",
        )
    }

    pub fn scalar_init_multiple_args(ty: &str) -> Note {
        Note::error(
            NoteKind::ScalarInitMultipleArgs,
            format!("An object of type '{ty}' is initialized from a single argument"),
        )
    }

    pub fn array_string_literal(ty: &str) -> Note {
        Note::error(
            NoteKind::ArrayStringLiteral,
            format!(
                "Direct initialization of an array ('{ty}') is only allowed for a char array \
                 initialized from a string literal"
            ),
        )
    }

    pub fn string_literal_too_long(literal_len: usize, array_len: usize) -> Note {
        Note::error(
            NoteKind::StringLiteralTooLong,
            format!(
                "A string literal of {literal_len} characters (including the null character) \
                 does not fit in an array of length {array_len}"
            ),
        )
    }

    pub fn aggregate_excess_initializers(given: usize, len: usize) -> Note {
        Note::error(
            NoteKind::AggregateExcessInitializers,
            format!("Too many initializers ({given}) for an array of length {len}"),
        )
    }

    pub fn array_direct_init() -> Note {
        Note::error(
            NoteKind::ArrayDirectInit,
            "An element of this array could not be initialized",
        )
    }

    pub fn no_matching_constructor(class_name: &str) -> Note {
        Note::error(
            NoteKind::NoMatchingConstructor,
            format!("No matching constructor found for class '{class_name}'"),
        )
    }

    pub fn no_matching_function(name: &str) -> Note {
        Note::error(
            NoteKind::NoMatchingFunction,
            format!("No matching function found for a call to '{name}'"),
        )
    }

    pub fn ambiguous_overload(name: &str) -> Note {
        Note::error(
            NoteKind::AmbiguousOverload,
            format!("A call to '{name}' is ambiguous between multiple viable overloads"),
        )
    }

    pub fn list_init_class(class_name: &str) -> Note {
        Note::error(
            NoteKind::ListInitClass,
            format!(
                "List initialization of class '{class_name}' requires an initializer-list \
                 constructor, and none exists"
            ),
        )
    }

    pub fn no_destructor(ty: &str) -> Note {
        Note::error(
            NoteKind::NoDestructor,
            format!("An object of type '{ty}' cannot be destroyed: no destructor is available"),
        )
    }

    pub fn rule_of_three(class_name: &str, hard: bool) -> Note {
        let message = format!(
            "Class '{class_name}' has a destructor but no copy constructor; if the destructor \
             manages a resource, copies of '{class_name}' objects will misbehave (rule of three)"
        );
        if hard {
            Note::error(NoteKind::RuleOfThree, message)
        } else {
            Note::warning(NoteKind::RuleOfThree, message)
        }
    }

    pub fn member_not_found(class_name: &str, member: &str) -> Note {
        Note::error(
            NoteKind::MemberNotFound,
            format!("Class '{class_name}' has no member named '{member}'"),
        )
    }

    pub fn unknown_type(name: &str) -> Note {
        Note::error(NoteKind::UnknownType, format!("Unknown type '{name}'"))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match self.location {
            Some(loc) => write!(f, "{}: {} (line {})", sev, self.message, loc.line),
            None => write!(f, "{}: {}", sev, self.message),
        }
    }
}
