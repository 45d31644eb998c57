//! Script language
//!
//! Model scripts are the body of `function model(cuboid, ..., mirror)`, written in a
//! small JavaScript-like subset. This module lexes, parses and evaluates them with a
//! fixed global table: the primitive bindings and `Math`, nothing else.

pub mod ast;
pub mod bindings;
pub mod heap;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

#[cfg(test)]
mod tests_interpreter;
#[cfg(test)]
mod tests_parser;

pub use bindings::{Primitive, PRIMITIVES};
pub use interpreter::{Interpreter, ScriptLimits};
pub use parser::parse_program;
pub use value::Value;

use crate::kernel::KernelOpError;
use thiserror::Error;

/// Errors raised while compiling or running a script.
///
/// The display text is what the model sees in a corrective prompt, so it follows
/// the familiar `Kind: message` shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error("SyntaxError: {message}{}", location(.line, .column))]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("Error: {0}")]
    Kernel(#[from] KernelOpError),

    #[error("Error: {0}")]
    Budget(String),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Runtime declaration errors have no source position.
fn location(line: &usize, column: &usize) -> String {
    if *line == 0 {
        String::new()
    } else {
        format!(" at line {}, column {}", line, column)
    }
}
