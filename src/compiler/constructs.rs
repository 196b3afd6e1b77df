//! Semantic construct tree
//!
//! Every compiled program element — expression, statement, declaration,
//! initializer, deallocator, function call, function definition — is a
//! [`Construct`] node in a flat arena, linked to its parent and children by
//! [`ConstructId`].  The runtime walks this tree, creating one runtime
//! instance per visited node per execution.
//!
//! A construct also carries its full-expression bookkeeping: the temporary
//! objects created inside it and, for a full-expression root, the
//! deallocator that destroys them when the full expression finishes.

use crate::ast::{BinaryOp, SourceLocation};
use crate::compiler::entities::{EntityId, FunctionKind};
use crate::compiler::notes::Note;
use crate::types::Type;

/// Index of a construct in the compilation's construct arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstructId(pub usize);

/// One node of the semantic tree
#[derive(Debug, Clone)]
pub struct Construct {
    pub parent: Option<ConstructId>,
    pub children: Vec<ConstructId>,
    pub notes: Vec<Note>,
    pub location: Option<SourceLocation>,
    pub kind: ConstructKind,
    /// Temporary objects created in this subtree, hoisted upward on attach
    pub temporaries: Vec<EntityId>,
    /// Set on full-expression roots once sealed
    pub temp_deallocator: Option<ConstructId>,
    /// A sealed construct is a finished full expression; registering further
    /// temporaries on it is a compiler bug.
    pub sealed: bool,
}

impl Construct {
    pub fn new(kind: ConstructKind, location: Option<SourceLocation>) -> Self {
        Construct {
            parent: None,
            children: Vec::new(),
            notes: Vec::new(),
            location,
            kind,
            temporaries: Vec::new(),
            temp_deallocator: None,
            sealed: false,
        }
    }

    /// Expressions, initializers, and function calls may be the root of a
    /// full expression; whether one actually is depends on what it gets
    /// attached to.
    pub fn is_potential_full_expression(&self) -> bool {
        matches!(
            self.kind,
            ConstructKind::Expression(_)
                | ConstructKind::Initializer(_)
                | ConstructKind::FunctionCall(_)
        )
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match &self.kind {
            ConstructKind::Expression(e) => Some(e),
            _ => None,
        }
    }
}

/// The seven construct families
#[derive(Debug, Clone)]
pub enum ConstructKind {
    Expression(Expression),
    Statement(Statement),
    Declaration(Declaration),
    Initializer(Initializer),
    Deallocator(Deallocator),
    FunctionCall(FunctionCall),
    FunctionDef(FunctionDef),
}

/// Value category of an expression.  The subset needs only the classic two:
/// lvalues designate objects, prvalues are pure values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    Lvalue,
    Prvalue,
}

/// A typed expression node
#[derive(Debug, Clone)]
pub struct Expression {
    /// `None` when the operand was erroneous and no type could be computed
    pub ty: Option<Type>,
    pub value_category: ValueCategory,
    pub kind: ExprKind,
}

impl Expression {
    pub fn prvalue(ty: Type, kind: ExprKind) -> Expression {
        Expression {
            ty: Some(ty),
            value_category: ValueCategory::Prvalue,
            kind,
        }
    }

    pub fn lvalue(ty: Type, kind: ExprKind) -> Expression {
        Expression {
            ty: Some(ty),
            value_category: ValueCategory::Lvalue,
            kind,
        }
    }

    pub fn erroneous(kind: ExprKind) -> Expression {
        Expression {
            ty: None,
            value_category: ValueCategory::Prvalue,
            kind,
        }
    }
}

/// The specific operation an expression performs
#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral(i32),
    CharLiteral(i8),
    BoolLiteral(bool),
    DoubleLiteral(f64),
    /// Index into the string literal pool; the expression is an lvalue
    /// designating the pooled array object
    StringLiteral { index: usize },
    NullptrLiteral,
    Identifier {
        name: String,
        entity: Option<EntityId>,
    },
    Binary {
        op: BinaryOp,
        lhs: ConstructId,
        rhs: ConstructId,
    },
    /// Arithmetic negation
    Negate { operand: ConstructId },
    /// Logical not
    Not { operand: ConstructId },
    AddressOf { operand: ConstructId },
    Dereference { operand: ConstructId },
    Assignment {
        lhs: ConstructId,
        rhs: ConstructId,
    },
    /// `operand` has already decayed to a pointer
    Subscript {
        operand: ConstructId,
        index: ConstructId,
    },
    MemberAccess {
        object: ConstructId,
        member: String,
    },
    /// Wraps a [`FunctionCall`] construct; `None` when overload resolution
    /// failed
    Call { call: Option<ConstructId> },
    New {
        allocated_type: Type,
        /// The entity designating the created object, target of `init`
        entity: EntityId,
        init: Option<ConstructId>,
    },
    Delete {
        operand: ConstructId,
        array_form: bool,
        /// Destructor call pushed before deallocation, for class pointees.
        /// The receiver is supplied dynamically by the delete instance.
        dtor_call: Option<ConstructId>,
    },
    ImplicitConversion {
        conversion: ConversionKind,
        operand: ConstructId,
    },
}

/// The standard conversions modeled as explicit tree nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// Read the value out of an lvalue's object
    LvalueToRvalue,
    /// Array lvalue decays to a pointer to its first element
    ArrayToPointer,
    /// bool/char widen to int
    IntegralPromotion,
    /// Between integral types, value-preserving where possible
    IntegralConversion,
    /// int ↔ double
    FloatingIntegralConversion,
    /// `nullptr` to any object pointer type
    NullptrToPointer,
    /// Adds top-level const
    Qualification,
}

/// Statement nodes
#[derive(Debug, Clone)]
pub enum Statement {
    Expression { expr: ConstructId },
    Declaration { decl: ConstructId },
    Block {
        statements: Vec<ConstructId>,
        /// Destroys this block's locals on exit, innermost declarations
        /// first.  `None` when the block declares nothing.
        local_dealloc: Option<ConstructId>,
    },
    If {
        condition: ConstructId,
        then_stmt: ConstructId,
        else_stmt: Option<ConstructId>,
    },
    While {
        condition: ConstructId,
        body: ConstructId,
    },
    Return {
        /// Copy- or bind-initializer targeting the function's return
        /// object; `None` for `return;`
        initializer: Option<ConstructId>,
    },
    Null,
}

/// Storage duration of a declared variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDuration {
    Automatic,
    Static,
}

/// Declaration nodes
#[derive(Debug, Clone)]
pub enum Declaration {
    Variable {
        entity: EntityId,
        init: ConstructId,
        storage: StorageDuration,
    },
}

/// An initializer: the one and only way an object's lifetime begins
#[derive(Debug, Clone)]
pub struct Initializer {
    pub target: EntityId,
    pub kind: InitKind,
}

#[derive(Debug, Clone)]
pub enum InitKind {
    /// Bind a reference to the object designated by `arg`.  When `arg` is a
    /// prvalue bound by a reference to const, `materialize` names the
    /// temporary the value is stored into before binding.
    ReferenceBind {
        arg: ConstructId,
        materialize: Option<EntityId>,
    },
    /// `T x;` for atomic T: lifetime begins, value stays indeterminate
    AtomicDefault,
    /// `T x{};` for atomic T: zero-initialize
    AtomicValue,
    /// Initialize an atomic object from one converted argument
    AtomicArg { arg: ConstructId },
    /// Default-initialize each element (no-ops for atomic elements)
    ArrayDefault { element_inits: Vec<ConstructId> },
    /// Value-initialize each element
    ArrayValue { element_inits: Vec<ConstructId> },
    /// `char buf[N] = "...";` — copy the pooled literal, null-padded
    ArrayString { literal_index: usize },
    /// Braced list: copy-initializers for the given elements, then
    /// value-initializers for the rest
    ArrayList { element_inits: Vec<ConstructId> },
    /// Run a constructor.  `zero_fill` is set for value initialization of a
    /// class without a user-provided constructor.
    ClassCtor {
        zero_fill: bool,
        ctor_call: ConstructId,
    },
    /// Compilation failed; carries no runtime behavior
    Invalid,
}

/// A destructor call a deallocator will push, together with the entity that
/// resolves to its receiver object
#[derive(Debug, Clone, Copy)]
pub struct DtorCall {
    pub receiver: EntityId,
    pub call: ConstructId,
}

/// One object (or reference) a deallocator is responsible for
#[derive(Debug, Clone)]
pub struct DeallocTarget {
    pub entity: EntityId,
    /// Destructor calls for class-typed targets, in destruction order (for
    /// an array of class objects: highest index first).  Empty for atomic
    /// and reference targets.
    pub dtors: Vec<DtorCall>,
}

/// What a deallocator cleans up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeallocKind {
    /// Temporaries of a full expression
    Temporaries,
    /// Locals of a block
    Locals,
    /// Member subobjects, after a destructor body
    Members,
    /// Parameters, after a function returns
    Parameters,
    /// Objects of static storage duration, after main returns
    Statics,
}

/// Ends the lifetimes of a fixed set of targets, in reverse declaration
/// order, running destructors where the target is of class type.  Targets
/// whose lifetime never began (or already ended) are skipped.
#[derive(Debug, Clone)]
pub struct Deallocator {
    pub kind: DeallocKind,
    /// In reverse declaration order: targets[0] is destroyed first
    pub targets: Vec<DeallocTarget>,
}

/// A resolved call to a particular function
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub function: EntityId,
    /// One initializer per parameter, targeting the pending frame
    pub param_inits: Vec<ConstructId>,
    /// For return-by-value: the caller-side temporary that receives the
    /// returned value
    pub return_target: Option<EntityId>,
}

/// A compiled function body with its frame layout
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub entity: EntityId,
    pub name: String,
    pub return_type: Type,
    pub kind: FunctionKind,
    /// Parameter entities, in declaration order
    pub params: Vec<EntityId>,
    /// Every automatic entity of the frame (parameters first, then locals in
    /// declaration order).  The frame allocates all of them on push.
    pub locals: Vec<EntityId>,
    pub body: ConstructId,
    /// Constructor only: member initializers in initialization order (base
    /// first, then members in declaration order)
    pub member_inits: Vec<ConstructId>,
    /// Destructor only: destroys members (reverse declaration order) and
    /// then the base subobject, after the destructor body runs
    pub member_dealloc: Option<ConstructId>,
    /// Destroys parameters once the function finishes
    pub param_dealloc: ConstructId,
}
