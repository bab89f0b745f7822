//! Basalt - a lazy, statically-typed functional language compiling to C
//!
//! The pipeline is one-way: source text is lexed, parsed, simplified
//! into shallow-case form, type-checked, lowered to STG, flattened to
//! Cmm, and emitted as a single C translation unit that includes the
//! fixed runtime.

pub mod ast;
pub mod codegen;
pub mod infer;
pub mod lexer;
pub mod parser;
pub mod simplifier;
pub mod tast;
pub mod types;

pub use ast::Program;
pub use lexer::Lexer;
pub use parser::Parser;
pub use types::{Type, TypeContext};

use thiserror::Error;

/// Everything that can stop a compilation.
///
/// The first failure wins; there is no recovery or partial output.
#[derive(Error, Debug)]
pub enum Error {
    #[error("lex error: {0}")]
    Lex(#[from] lexer::LexError),
    #[error("parse error: {0}")]
    Parse(#[from] parser::ParseError),
    #[error("resolution error: {0}")]
    Resolution(#[from] types::ResolutionError),
    #[error("simplifier error: {0}")]
    Simplify(#[from] simplifier::SimplifyError),
    #[error("type error: {0}")]
    Type(#[from] infer::TypeError),
    #[error("{0}")]
    Compile(#[from] codegen::CompileError),
}

/// Compile Basalt source text into a C translation unit
pub fn compile(source: &str) -> Result<String, Error> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let program = parser::Parser::new(tokens).parse_program()?;
    let ctx = types::TypeContext::from_program(&program)?;
    let mut names = simplifier::NameSource::new();
    let simplified = simplifier::simplify(&program, &ctx, &mut names)?;
    let typed = infer::infer(&simplified, ctx)?;
    let stg = codegen::lower_stg(&typed, &mut names)?;
    let cmm = codegen::lower_cmm(&stg)?;
    Ok(codegen::emit_c(&cmm))
}
