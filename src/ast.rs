//! Surface abstract syntax tree for Basalt
//!
//! The parser produces this AST directly from the token stream. Nested
//! patterns and multi-equation definitions survive until the simplifier
//! compiles them away.

use std::fmt;

/// A byte range in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Literal values shared by every stage of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
}

/// The built-in operations of the language.
///
/// Binary arithmetic and comparisons work on 64-bit integers, `Concat`
/// on strings. The print builtins consume their argument and return the
/// unit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    EqualTo,
    NotEqualTo,
    Concat,
    PrintInt,
    PrintString,
    Negate,
}

impl Builtin {
    /// How many arguments the builtin must be applied to
    pub fn arity(&self) -> usize {
        match self {
            Builtin::PrintInt | Builtin::PrintString | Builtin::Negate => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Builtin::Add => "+",
            Builtin::Sub => "-",
            Builtin::Mul => "*",
            Builtin::Div => "/",
            Builtin::Less => "<",
            Builtin::LessEqual => "<=",
            Builtin::Greater => ">",
            Builtin::GreaterEqual => ">=",
            Builtin::EqualTo => "==",
            Builtin::NotEqualTo => "/=",
            Builtin::Concat => "++",
            Builtin::PrintInt => "printInt",
            Builtin::PrintString => "printString",
            Builtin::Negate => "negate",
        };
        write!(f, "{}", s)
    }
}

/// A surface type expression, as written in annotations and data
/// declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Int,
    Str,
    Bool,
    /// A type variable, e.g. `a`
    Var(String),
    /// An applied type constructor, e.g. `List a`
    Named(String, Vec<TypeExpr>),
    Function(Box<TypeExpr>, Box<TypeExpr>),
}

/// Expressions as parsed
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Literal),
    /// A lowercase name or an uppercase constructor name
    Name(String),
    /// One application node per argument; the simplifier regroups spines
    App(Box<Expr>, Box<Expr>),
    Lambda(Vec<String>, Box<Expr>),
    Let(Vec<Definition>, Box<Expr>),
    Case(Box<Expr>, Vec<(Pattern, Expr)>),
    Binary(Builtin, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
}

/// Patterns as parsed; arbitrarily nested
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Wildcard,
    Name(String),
    Lit(Literal),
    Constructor(String, Vec<Pattern>),
}

impl Pattern {
    /// A pattern that binds unconditionally: a wildcard or a bare name
    pub fn is_irrefutable(&self) -> bool {
        matches!(self, Pattern::Wildcard | Pattern::Name(_))
    }
}

/// One equation of a value definition: `name p1 p2 = body`
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub name: String,
    pub patterns: Vec<Pattern>,
    pub body: Expr,
    pub span: Span,
}

/// Things the parser can produce inside a `let` or at the top level
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// `name :: type`
    Annotation(String, TypeExpr, Span),
    Equation(Equation),
}

/// A constructor declared by a `data` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDef {
    pub name: String,
    pub fields: Vec<TypeExpr>,
}

/// Top-level declarations
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// `data T a = C1 ... | C2 ...`
    Data {
        name: String,
        params: Vec<String>,
        constructors: Vec<ConstructorDef>,
        span: Span,
    },
    Value(Definition),
}

/// A whole parsed source file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub decls: Vec<Decl>,
}
