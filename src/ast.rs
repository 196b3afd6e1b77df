// AST definitions for the C++ subset accepted by the compiler.
//
// The AST is the input boundary of this crate: an external parser (or a test)
// builds these nodes, and `compiler::Program::compile` turns them into a
// semantic construct tree.  Nothing here is type-checked; declarators are
// plain syntax that the compiler resolves against the class registry.

/// Source location information for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Base type syntax, before semantic resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseTypeSpec {
    Bool,
    Char,
    Int,
    Double,
    Void,
    Class(String), // class name, resolved against the class registry
}

/// Type syntax with const qualifier, pointers, reference, and array bounds.
///
/// Declarator order follows the usual C++ reading: array dimensions apply to
/// the pointed-at/declared type, `is_reference` is outermost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub base: BaseTypeSpec,
    pub is_const: bool,
    pub pointer_depth: usize, // 0 = not a pointer, 1 = *, 2 = **, ...
    pub is_reference: bool,
    pub array_dims: Vec<usize>,
}

impl TypeSpec {
    pub fn new(base: BaseTypeSpec) -> Self {
        TypeSpec {
            base,
            is_const: false,
            pointer_depth: 0,
            is_reference: false,
            array_dims: Vec::new(),
        }
    }

    pub fn with_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn with_pointer(mut self) -> Self {
        self.pointer_depth += 1;
        self
    }

    pub fn with_reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    pub fn with_array(mut self, len: usize) -> Self {
        self.array_dims.push(len);
        self
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,    // -x
    Not,    // !x
    Deref,  // *x
    AddrOf, // &x
}

/// The five C++ initialization forms, as written in the source
#[derive(Debug, Clone)]
pub enum InitializerAst {
    /// No initializer written: `T x;`
    Default,
    /// Empty braces/parens: `T x{};`
    Value,
    /// Parenthesized arguments: `T x(a, b);`
    Direct(Vec<ExprAst>),
    /// `T x = expr;`
    Copy(Box<ExprAst>),
    /// Braced list: `T x = {a, b};`
    List(Vec<ExprAst>),
}

/// Expressions
#[derive(Debug, Clone)]
pub enum ExprAst {
    IntLiteral(i32, SourceLocation),
    CharLiteral(i8, SourceLocation),
    BoolLiteral(bool, SourceLocation),
    DoubleLiteral(f64, SourceLocation),
    StringLiteral(String, SourceLocation),
    NullptrLiteral(SourceLocation),
    Identifier(String, SourceLocation),
    Binary {
        op: BinaryOp,
        lhs: Box<ExprAst>,
        rhs: Box<ExprAst>,
        location: SourceLocation,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprAst>,
        location: SourceLocation,
    },
    Assignment {
        lhs: Box<ExprAst>,
        rhs: Box<ExprAst>,
        location: SourceLocation,
    },
    Subscript {
        operand: Box<ExprAst>,
        index: Box<ExprAst>,
        location: SourceLocation,
    },
    MemberAccess {
        object: Box<ExprAst>,
        member: String,
        location: SourceLocation,
    },
    FunctionCall {
        name: String,
        args: Vec<ExprAst>,
        location: SourceLocation,
    },
    New {
        target_type: TypeSpec,
        init: Option<InitializerAst>,
        location: SourceLocation,
    },
    Delete {
        operand: Box<ExprAst>,
        array_form: bool,
        location: SourceLocation,
    },
}

impl ExprAst {
    pub fn location(&self) -> SourceLocation {
        match self {
            ExprAst::IntLiteral(_, loc)
            | ExprAst::CharLiteral(_, loc)
            | ExprAst::BoolLiteral(_, loc)
            | ExprAst::DoubleLiteral(_, loc)
            | ExprAst::StringLiteral(_, loc)
            | ExprAst::NullptrLiteral(loc)
            | ExprAst::Identifier(_, loc) => *loc,
            ExprAst::Binary { location, .. }
            | ExprAst::Unary { location, .. }
            | ExprAst::Assignment { location, .. }
            | ExprAst::Subscript { location, .. }
            | ExprAst::MemberAccess { location, .. }
            | ExprAst::FunctionCall { location, .. }
            | ExprAst::New { location, .. }
            | ExprAst::Delete { location, .. } => *location,
        }
    }
}

/// A local or global variable declaration
#[derive(Debug, Clone)]
pub struct VarDeclAst {
    pub name: String,
    pub type_spec: TypeSpec,
    pub init: InitializerAst,
    pub location: SourceLocation,
}

/// Statements
#[derive(Debug, Clone)]
pub enum StmtAst {
    Expression {
        expr: ExprAst,
        location: SourceLocation,
    },
    Declaration(VarDeclAst),
    Block {
        statements: Vec<StmtAst>,
        location: SourceLocation,
    },
    If {
        condition: ExprAst,
        then_stmt: Box<StmtAst>,
        else_stmt: Option<Box<StmtAst>>,
        location: SourceLocation,
    },
    While {
        condition: ExprAst,
        body: Box<StmtAst>,
        location: SourceLocation,
    },
    For {
        init: Option<Box<StmtAst>>,
        condition: Option<ExprAst>,
        post: Option<ExprAst>,
        body: Box<StmtAst>,
        location: SourceLocation,
    },
    Return {
        expr: Option<ExprAst>,
        location: SourceLocation,
    },
    Null {
        location: SourceLocation,
    },
}

/// Function parameter
#[derive(Debug, Clone)]
pub struct ParamAst {
    pub name: String,
    pub type_spec: TypeSpec,
}

/// Function definition (free function)
#[derive(Debug, Clone)]
pub struct FunctionAst {
    pub name: String,
    pub return_type: TypeSpec,
    pub params: Vec<ParamAst>,
    pub body: Vec<StmtAst>,
    pub location: SourceLocation,
}

/// One `name(args)` element of a constructor's member initializer list
#[derive(Debug, Clone)]
pub struct MemberInitAst {
    pub name: String,
    pub args: Vec<ExprAst>,
    pub location: SourceLocation,
}

/// Class member declarations
#[derive(Debug, Clone)]
pub enum MemberAst {
    Field {
        name: String,
        type_spec: TypeSpec,
        location: SourceLocation,
    },
    Constructor {
        params: Vec<ParamAst>,
        member_inits: Vec<MemberInitAst>,
        body: Vec<StmtAst>,
        location: SourceLocation,
    },
    Destructor {
        body: Vec<StmtAst>,
        location: SourceLocation,
    },
}

/// Class definition
#[derive(Debug, Clone)]
pub struct ClassAst {
    pub name: String,
    pub base: Option<String>,
    pub members: Vec<MemberAst>,
    pub location: SourceLocation,
}

/// Top-level declarations
#[derive(Debug, Clone)]
pub enum DeclAst {
    Function(FunctionAst),
    Class(ClassAst),
    GlobalVariable(VarDeclAst),
}

/// A whole translation unit
#[derive(Debug, Clone, Default)]
pub struct TranslationUnit {
    pub declarations: Vec<DeclAst>,
}

impl TranslationUnit {
    pub fn new() -> Self {
        TranslationUnit::default()
    }
}
