//! rush - a minimal Scheme-like interpreter
//!
//! This crate reads parenthesized expressions, turns them into a nested
//! expression tree and evaluates that tree against a chain of lexical
//! environments. It supports definitions, conditionals, assignment and
//! closures on top of a small fixed library of primitives.
//!
//! ```scheme
//! (define square (lambda (n) (* n n)))
//! (square 256)                 ; => 65536
//! (if (< 10 3) 5 15)           ; => 15
//! (quote (1 2 (* 3.7 10)))     ; => (1 2 (* 3.7 10))
//! (car (cons 99 2.5))          ; => 99
//! ```
//!
//! ## Data flow
//!
//! text → [`scheme::tokenize`] → tokens → [`scheme::read_tokens`] (leaves
//! classified by [`scheme::atom`]) → [`ast::Expr`] → [`evaluator::eval`] →
//! [`ast::Value`].
//!
//! ```
//! use rush::ast::Value;
//! use rush::evaluator::create_global_env;
//! use rush::interpret_once;
//!
//! let env = create_global_env();
//! assert_eq!(
//!     interpret_once("(define square (lambda (n) (* n n)))", &env).unwrap(),
//!     Value::Unspecified
//! );
//! assert_eq!(interpret_once("(square 256)", &env).unwrap(), Value::Integer(65536));
//! ```
//!
//! ## Modules
//!
//! - `scheme`: tokenizer, atom classifier, reader and paren-balance checker
//! - `ast`: expression and runtime value types
//! - `evaluator`: environments, special forms and procedure application
//! - `builtinops`: the primitive procedure library

use std::fmt;
use std::rc::Rc;

/// Maximum reader nesting depth; deeper input is rejected instead of
/// overflowing the stack.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum evaluation depth. Runaway recursion in user code fails with an
/// evaluation error once nested `eval` calls reach this bound. A user-level
/// procedure call takes about three levels, so a few thousand nested calls
/// fit. Deep programs need the stack provided by [`with_eval_stack`].
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Stack size of the thread started by [`with_eval_stack`]; enough for
/// [`MAX_EVAL_DEPTH`] nested evaluations in unoptimized builds.
pub const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Run `f` on a dedicated thread with an [`EVAL_STACK_SIZE`] stack and wait
/// for its result. A panic inside `f` is resumed on the calling thread.
///
/// Environments and values are `!Send`, so `f` creates the environment it
/// evaluates in and returns something owned, such as the printed result.
///
/// ```
/// use rush::evaluator::create_global_env;
/// use rush::{interpret_once, with_eval_stack};
///
/// let printed = with_eval_stack(|| {
///     let env = create_global_env();
///     interpret_once("(define count (lambda (n) (if (= n 0) 0 (+ 1 (count (- n 1))))))", &env)?;
///     interpret_once("(count 2000)", &env).map(|value| value.to_string())
/// })
/// .unwrap();
/// assert_eq!(printed, Ok("2000".to_owned()));
/// ```
pub fn with_eval_stack<F, T>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("rush-eval".to_owned())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(f)?;
    match handle.join() {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// A closing parenthesis without a matching opening one
    InvalidSyntax,
    /// Input ended while a list was still open (or before any token)
    Incomplete,
    /// Expression nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
}

/// A structured syntax error raised by the reader.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The offending token, if there was one
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, found: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            found,
        }
    }

    /// `unexpected ")"`
    pub fn unexpected_close() -> Self {
        Self::new(
            ParseErrorKind::InvalidSyntax,
            "unexpected \")\"",
            Some(")".to_owned()),
        )
    }

    /// `unexpected EOF while reading`
    pub fn unexpected_eof() -> Self {
        Self::new(
            ParseErrorKind::Incomplete,
            "unexpected EOF while reading",
            None,
        )
    }

    /// True when more input could complete the expression
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    SyntaxError(ParseError),
    UnboundSymbol(String),
    NotCallable(String),
    TypeError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    EvalError(String),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::SyntaxError(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SyntaxError(e) => write!(f, "SyntaxError: {}", e.message),
            Error::UnboundSymbol(name) => write!(f, "Unbound symbol: {name}"),
            Error::NotCallable(what) => write!(f, "Not callable: {what}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Parse the first complete form in `input` and evaluate it in `env`.
pub fn interpret_once(
    input: &str,
    env: &Rc<evaluator::Environment>,
) -> Result<ast::Value, Error> {
    let expr = scheme::parse(input)?;
    evaluator::eval(&expr, env)
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod scheme;
