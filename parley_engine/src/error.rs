//! Error types raised by the evaluator, the command dispatcher and the runner.

use thiserror::Error;

/// Failure while evaluating an expression in value context.
///
/// Condition checks (`if`, `when`, option guards) never surface these; they
/// log the error and treat the condition as false.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown variable '${0}'")]
    UnknownVariable(String),
    #[error("'{case}' is not a case of enum '{name}'")]
    InvalidEnumCase { name: String, case: String },
    #[error("'{value}' is not a number (operator '{op}')")]
    NotANumber { op: &'static str, value: String },
    #[error("syntax error in '{expr}': {message}")]
    Syntax { expr: String, message: String },
    #[error("function '{name}' failed: {reason}")]
    FunctionFailed { name: String, reason: String },
    #[error("smart variable '${0}' refers to itself too deeply")]
    RecursionLimit(String),
}

/// Failure while parsing or executing a `<<command>>`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unterminated quote in command '{0}'")]
    UnterminatedQuote(String),
    #[error("command '{command}' is missing {what}")]
    MissingArgument { command: String, what: &'static str },
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Fault raised to the host while driving a dialogue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("node '{0}' does not exist")]
    UnknownNode(String),
    #[error("no member of node group '{0}' matches its conditions")]
    NoMatchingNode(String),
    #[error("an option index is required to continue")]
    OptionRequired,
    #[error("option {index} is out of range ({available} available)")]
    InvalidOption { index: usize, available: usize },
    #[error("the dialogue has already finished")]
    DialogueFinished,
    #[error(transparent)]
    Eval(#[from] EvalError),
}
