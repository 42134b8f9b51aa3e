//! scmlite - a minimal cons-cell Scheme interpreter
//!
//! This crate reads a textual program, builds a tree of cons cells out of it and
//! evaluates that tree against a chain of lexical environments.
//!
//! ```scheme
//! (define (square x) (* x x))
//! (let ((a 3) (b 4)) (+ (square a) (square b)))   ; => 25
//! (cond ((eq? 1 2) "no") (else "yes"))             ; => yes
//! ```
//!
//! ## Small-language semantics
//!
//! - Numbers are a single `f64` representation; `5` and `5.0` are the same value.
//! - Booleans are the ordinary interned symbols `#t` and `#f`. Only `#f` is false.
//! - Text literals are double-quoted tokens and may not contain whitespace or parentheses.
//! - A program is a sequence of forms, read as one implicit `(begin ...)`.
//!
//! ## Errors
//!
//! Unbound symbols, operands of the wrong variant and calls with the wrong number of
//! arguments surface as [`Error`] values at the [`run`] boundary rather than silently
//! producing no value.
//!
//! ## Modules
//!
//! - `ast`: the [`Value`](ast::Value) model, cons cells and the printer
//! - `symbols`: per-interpreter symbol interning
//! - `scheme`: tokenizer and reader
//! - `evaluator`: environments, `evaluate`/`apply`/`evlis` and special forms
//! - `builtinops`: the eager built-in procedures

use std::fmt;

use crate::evaluator::Arity;

/// Default maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum depth of nested (non-tail) evaluations.
/// Tail calls are trampolined and do not count against this limit.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Input ended inside an unclosed list
    Incomplete,
    /// A stray `)` closed the program early and tokens remain
    TrailingContent,
    /// List nesting exceeded the configured reader depth
    TooDeeplyNested,
    /// The tokenizer could not make progress
    InvalidSyntax,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{message}{}{}", render_found(.found), render_context(.context))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Snippet of the source around the failure (max 100 chars)
    pub context: Option<String>,
    /// The offending token, if there was one
    pub found: Option<String>,
}

fn render_found(found: &Option<String>) -> String {
    found
        .as_ref()
        .map(|token| format!("\nFound: {token}"))
        .unwrap_or_default()
}

fn render_context(context: &Option<String>) -> String {
    context
        .as_ref()
        .map(|snippet| format!("\nContext: {snippet}"))
        .unwrap_or_default()
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a ParseError with a snippet of `input` around `error_offset`
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let char_offset = input
            .char_indices()
            .take_while(|(byte, _)| *byte < error_offset)
            .count();
        let context_start = char_offset.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error type for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    SyntaxError(#[from] ParseError),
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),
    #[error("TypeMismatch: {0}")]
    TypeMismatch(String),
    #[error("ArityMismatch: {}", render_arity(.expected, .got, .expression))]
    ArityMismatch {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },
    #[error("EvaluationError: {0}")]
    EvalError(String),
}

fn render_arity(expected: &Arity, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("{expr}: expected {expected} arguments, got {got}"),
        None => format!("expected {expected} arguments, got {got}"),
    }
}

impl Error {
    /// Create an ArityMismatch without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityMismatch {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityMismatch naming the callee
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: impl fmt::Display) -> Self {
        Error::ArityMismatch {
            expected,
            got,
            expression: Some(expression.to_string()),
        }
    }

    /// Build a TypeMismatch from the expected description and the offending value
    pub fn type_mismatch(expected: &str, found: &ast::Value) -> Self {
        Error::TypeMismatch(format!("expected {expected}, got {found}"))
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod scheme;
mod stack;
pub mod symbols;

pub use ast::Value;
pub use evaluator::{Config, Interpreter};

/// Read `source` as one implicit `(begin ...)` program and evaluate it in a freshly
/// constructed interpreter, returning the value of the last top-level form.
///
/// ```
/// let value = scmlite::run("(define (square x) (* x x)) (square 6)").unwrap();
/// assert_eq!(value, scmlite::Value::Number(36.0));
/// ```
pub fn run(source: &str) -> Result<Value, Error> {
    Interpreter::new().run(source)
}
