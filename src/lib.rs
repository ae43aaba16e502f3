//! minilisp - a minimal Lisp interpreter
//!
//! This crate reads parenthesized expressions, evaluates them against a chain of
//! mutable binding frames and renders the results. It is small on purpose: one
//! integer kind, four special forms, a handful of eager primitives and
//! user-defined closures.
//!
//! ```lisp
//! (define (add2 x) (+ x 2))   ; binds a closure
//! (add2 5)                    ; => 7
//! (if 0 1 2)                  ; => 1, only the false Bool is falsy
//! (car '(1 2))                ; => 1
//! (= 1 (quote a))             ; => #f, comparisons never raise type errors
//! ```
//!
//! ## Scoping
//!
//! Closures do not capture the environment they were created in. Calling a
//! closure creates a new frame whose outer link is the *caller's* frame, so free
//! symbols in a closure body resolve dynamically through the call chain.
//!
//! ## Dispatch
//!
//! The head of a list is checked against two tables held by a
//! [`builtinops::Registry`]: special forms receive their operands unevaluated,
//! eager primitives receive them evaluated left to right. A head that is in
//! neither table must evaluate to a closure.
//!
//! ## Modules
//!
//! - `ast`: the runtime value representation
//! - `reader`: text to value trees
//! - `evaluator`: the evaluation engine and the environment chain
//! - `builtinops`: the primitive registry and the standard primitives

use std::fmt;

use crate::builtinops::Arity;

/// Maximum length of an environment chain.
///
/// Every closure call adds one frame; reaching this depth is reported as
/// [`Error::StackLimit`] instead of exhausting the host stack.
pub const MAX_ENV_DEPTH: usize = 1000;

/// Maximum nesting depth accepted by the reader.
pub const MAX_PARSE_DEPTH: usize = 100;

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax
    InvalidSyntax,
    /// Input ended before the form was complete (unclosed parens, dangling quote)
    Incomplete,
    /// Form nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// A `)` with no matching `(`
    UnexpectedClose,
}

/// A structured error providing detailed information about a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 40 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 40;

        let context: String = input
            .chars()
            .skip(error_offset)
            .take(MAX_CONTEXT)
            .collect::<String>()
            .replace('\n', "\\n")
            .replace('\r', "");

        ParseError {
            kind,
            message: message.into(),
            context: (!context.is_empty()).then_some(context),
        }
    }

    /// True when more input could complete the form
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " near '{context}'")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    Parse(ParseError),

    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),

    #[error("{}", format_arity(.expected, .got, .expression))]
    Arity {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Call error: {0}")]
    Call(String),

    #[error("Stack limit: environment depth {depth} reached (max: {MAX_ENV_DEPTH})")]
    StackLimit { depth: usize },

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("EvaluationError: {0}")]
    Eval(String),
}

fn format_arity(expected: &Arity, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("ArityError: {expr}: expected {expected} arguments, got {got}"),
        None => format!("ArityError: expected {expected} arguments, got {got}"),
    }
}

impl Error {
    /// Create an arity error without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::Arity {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an arity error naming the operator that rejected the call
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: impl Into<String>) -> Self {
        Error::Arity {
            expected,
            got,
            expression: Some(expression.into()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;

pub use ast::Value;
pub use builtinops::Registry;
pub use evaluator::{Environment, Evaluator};
