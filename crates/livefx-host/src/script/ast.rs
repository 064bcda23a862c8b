//! Syntax tree for unit scripts.

use crate::params::ParamSpec;

/// Byte range in module source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// First byte.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
}

impl Span {
    /// Creates a span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A parsed module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Top-level items in source order.
    pub items: Vec<Item>,
}

/// A top-level item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `unit Name { ... }`
    Unit(UnitDecl),
    /// `register "name" Class;`
    Register {
        /// Global registration name.
        name: String,
        /// Unit class defined in this module.
        class: String,
        /// Location of the class name.
        span: Span,
    },
}

/// A unit class definition.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDecl {
    /// Class name.
    pub name: String,
    /// Location of the name.
    pub span: Span,
    /// Members in source order.
    pub members: Vec<Member>,
}

/// A member of a unit class.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// `parameters [ ... ]`
    Parameters {
        /// Declared parameters.
        specs: Vec<ParamSpec>,
        /// Location of the JSON array.
        span: Span,
    },
    /// `state name = expr`
    State {
        /// Variable name.
        name: String,
        /// Initial value.
        init: Expr,
        /// Location of the name.
        span: Span,
    },
    /// `on "message" { ... }`
    Handler {
        /// Message that triggers the handler.
        message: String,
        /// Handler body.
        body: Block,
        /// Location of the message string.
        span: Span,
    },
    /// `process { ... }`
    Process {
        /// Entry-point body.
        body: Block,
        /// Location of the keyword.
        span: Span,
    },
    /// `fn name(params) { ... }`
    Function(FnDecl),
}

/// A script function.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    /// Function name.
    pub name: String,
    /// Parameter names.
    pub params: Vec<String>,
    /// Body.
    pub body: Block,
    /// Location of the name.
    pub span: Span,
}

/// A braced statement list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// Statements in order.
    pub stmts: Vec<Stmt>,
}

/// A statement with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Statement kind.
    pub kind: StmtKind,
    /// Location.
    pub span: Span,
}

/// Statement kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let x = e` or `const x = e`
    Let {
        /// Bound name.
        name: String,
        /// Initial value.
        value: Expr,
        /// Whether reassignment is forbidden.
        constant: bool,
    },
    /// `if c { } else { }`; `else if` nests as a block holding one `If`.
    If {
        /// Condition.
        cond: Expr,
        /// Taken branch.
        then: Block,
        /// Optional else branch.
        otherwise: Option<Block>,
    },
    /// `while c { }`
    While {
        /// Condition.
        cond: Expr,
        /// Body.
        body: Block,
    },
    /// `for x in a..b { }` or `for x in e { }`
    For {
        /// Loop variable.
        var: String,
        /// What to iterate.
        iter: ForIter,
        /// Body.
        body: Block,
    },
    /// `try { } catch f { }`
    Try {
        /// Guarded body.
        body: Block,
        /// Name bound to the fault.
        binding: String,
        /// Handler.
        handler: Block,
    },
    /// `return` with optional value.
    Return(Option<Expr>),
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `place op= value`
    Assign {
        /// Assigned place.
        target: Expr,
        /// Plain or compound operator.
        op: AssignOp,
        /// Right-hand side.
        value: Expr,
    },
    /// `place++` / `place--`
    Step {
        /// Stepped place.
        target: Expr,
        /// +1 or -1.
        delta: f32,
    },
    /// Expression evaluated for its effect.
    Expr(Expr),
}

/// Iteration source of a `for` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ForIter {
    /// Half-open numeric range.
    Range(Expr, Expr),
    /// Every element of a collection value (channels, a buffer).
    Each(Expr),
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// An expression with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Expression kind.
    pub kind: ExprKind,
    /// Location.
    pub span: Span,
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal.
    Number(f32),
    /// `true` / `false`
    Bool(bool),
    /// Name reference.
    Ident(String),
    /// Prefix operator.
    Unary(UnaryOp, Box<Expr>),
    /// Arithmetic or comparison.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `&&` (true) or `||` (false), short-circuiting.
    Logical(bool, Box<Expr>, Box<Expr>),
    /// `c ? a : b`
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Call of a named function.
    Call(String, Vec<Expr>),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `target.name`
    Member(Box<Expr>, String),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}
