//! Basalt compiler backend: typed AST → STG → Cmm → C
//!
//! 1. STG lowering atomizes the typed AST into lambda forms with
//!    explicit free variables and update flags
//! 2. Cmm lowering flattens lambda forms into instruction trees with
//!    allocation accounting
//! 3. C emission writes one translation unit against the fixed runtime

pub mod c_emit;
pub mod cmm;
pub mod stg;

pub use c_emit::emit_c;
pub use cmm::lower_cmm;
pub use stg::lower_stg;

use thiserror::Error;

/// Broken invariants in the backend.
///
/// Any of these indicates a bug in an earlier stage, not in user code.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("internal: literal in function position")]
    LiteralInFunctionPosition,
    #[error("internal: builtin {0} applied to {1} arguments")]
    UnsaturatedBuiltin(crate::ast::Builtin, usize),
    #[error("internal: unknown name {0} survived lowering")]
    UnknownName(String),
    #[error("internal: {0} is not addressable as a primitive")]
    NotPrimitive(String),
    #[error("internal: constructor case default binds its scrutinee")]
    BoundConstructorDefault,
}
