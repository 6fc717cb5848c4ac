//! parley_script: authoring tools for the Parley dialogue language.
//!
//! A source file is a sequence of nodes:
//!
//! ```text
//! title: Start
//! scene: garden
//! ---
//! Ada: Morning! #greeting
//! <<set $mood to Mood.Calm>>
//! -> Ask about the weather
//!     Ada: Lovely, isn't it?
//! -> Leave <<if $in_a_hurry>>
//!     <<jump Goodbye>>
//! ===
//! ```
//!
//! [`parse_document`] turns the text into an AST and [`compile`] lowers it
//! into a [`parley_data::Program`] for the engine.

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;

pub use ast::{Branch, Document, EnumDef, LineAst, NodeAst, OptionAst, Statement};
pub use compiler::{CompileOptions, OnceIdContext, compile, compile_with};
pub use parser::{ParseError, parse_document};

use parley_data::Program;

/// Parse and compile source text in one step.
///
/// # Errors
/// Returns the parse error; compilation itself cannot fail.
pub fn compile_source(source: &str) -> Result<Program, ParseError> {
    Ok(compile(&parse_document(source)?))
}
