//! Core data types of the interpreter. [`Expr`] is what the reader produces:
//! a closed tree of integers, floats, symbols and lists, representing both code
//! and quoted data. [`Value`] is what evaluation produces; it contains every
//! expression shape plus booleans, primitives, closures and the unspecified
//! result of `define`. [`Number`] is the operand type of the arithmetic and
//! ordering primitives.
//!
//! Helper functions [`val`], [`sym`] and [`nil`] keep value construction short
//! in tests, and `From` conversions accept Rust literals, arrays and vectors.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;

/// Type alias for integer values in interpreter
pub(crate) type NumberType = i64;

/// Expression tree produced by the reader
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(NumberType),
    Float(f64),
    Symbol(String),
    /// The only composite; `()` is the empty list
    List(Vec<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(n) => write!(f, "{n}"),
            Expr::Float(x) => fmt_float(*x, f),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::List(elements) => fmt_list(elements, f),
        }
    }
}

fn fmt_list<T: fmt::Display>(elements: &[T], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(")?;
    for (i, elem) in elements.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{elem}")?;
    }
    write!(f, ")")
}

// Integral floats keep their decimal point so they don't read back as integers.
fn fmt_float(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

/// Numeric operand. Mixed integer/float operations promote to float.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(NumberType),
    Float(f64),
}

macro_rules! checked_arithmetic {
    ($name:ident, $checked:ident, $op:tt, $what:literal) => {
        pub(crate) fn $name(self, rhs: Number) -> Result<Number, Error> {
            match (self, rhs) {
                (Number::Integer(a), Number::Integer(b)) => a
                    .$checked(b)
                    .map(Number::Integer)
                    .ok_or_else(|| Error::EvalError(concat!("Integer overflow in ", $what).into())),
                (a, b) => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    checked_arithmetic!(checked_add, checked_add, +, "addition");
    checked_arithmetic!(checked_sub, checked_sub, -, "subtraction");
    checked_arithmetic!(checked_mul, checked_mul, *, "multiplication");

    /// Integer division floors toward negative infinity; float division
    /// follows IEEE 754 (division by zero gives an infinity or NaN).
    pub(crate) fn checked_div(self, rhs: Number) -> Result<Number, Error> {
        match (self, rhs) {
            (Number::Integer(_), Number::Integer(0)) => {
                Err(Error::EvalError("divided by 0".into()))
            }
            (Number::Integer(a), Number::Integer(b)) => {
                let quotient = a
                    .checked_div(b)
                    .ok_or_else(|| Error::EvalError("Integer overflow in division".into()))?;
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    Ok(Number::Integer(quotient - 1))
                } else {
                    Ok(Number::Integer(quotient))
                }
            }
            (a, b) => Ok(Number::Float(a.as_f64() / b.as_f64())),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(n) => Value::Integer(n),
            Number::Float(x) => Value::Float(x),
        }
    }
}

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        match value {
            Value::Integer(n) => Ok(Number::Integer(n)),
            Value::Float(x) => Ok(Number::Float(x)),
            other => Err(Error::TypeError(format!(
                "expected number, got {} {other}",
                other.type_name()
            ))),
        }
    }
}

/// Runtime value
///
/// To build values in tests, use the helper functions:
/// - `val(42)` / `val(2.5)` / `val(true)` for scalars, `sym("name")` for symbols
/// - `val([1, 2, 3])` for homogeneous lists, `val(vec![sym("op"), val(42)])` for mixed ones
/// - `nil()` for the empty list
#[derive(Clone)]
pub enum Value {
    Integer(NumberType),
    Float(f64),
    Symbol(String),
    /// Produced by comparisons and predicates; there is no boolean literal syntax
    Bool(bool),
    List(Vec<Value>),
    /// Primitive procedure. Compared by id, not by function pointer.
    BuiltinFunction {
        id: String,
        func: Arc<OperationFn>,
    },
    /// Closure (params, body, captured defining frame)
    Function {
        params: Vec<String>,
        body: Rc<Expr>,
        env: Rc<Environment>,
    },
    /// Result of forms that produce no value (e.g. `define`)
    Unspecified,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            // The captured frame is left out: it usually contains this closure.
            Value::Function { params, body, .. } => {
                write!(f, "Function(params={params:?}, body={body})")
            }
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => fmt_float(*x, f),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => fmt_list(elements, f),
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin-function:{id}>"),
            Value::Function { .. } => write!(f, "#<function>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            (
                Value::Function {
                    params: p1,
                    body: b1,
                    env: e1,
                },
                Value::Function {
                    params: p2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && b1 == b2 && Rc::ptr_eq(e1, e2),
            (Value::Unspecified, Value::Unspecified) => true,
            _ => false, // Different variants are never equal
        }
    }
}

impl Value {
    /// Everything except `#f` is true, including `0` and `()`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Symbol(_) => "symbol",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::BuiltinFunction { .. } | Value::Function { .. } => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// Equality as seen by the `=` primitive: numbers compare across integer
    /// and float, lists compare element-wise with the same rule.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                let (Ok(a), Ok(b)) = (
                    Number::try_from(self.clone()),
                    Number::try_from(other.clone()),
                ) else {
                    return false;
                };
                a == b
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            _ => self == other,
        }
    }
}

/// Quote conversion: code becomes data without evaluation.
impl From<&Expr> for Value {
    fn from(expr: &Expr) -> Self {
        match expr {
            Expr::Integer(n) => Value::Integer(*n),
            Expr::Float(x) => Value::Float(*x),
            Expr::Symbol(s) => Value::Symbol(s.clone()),
            Expr::List(elements) => Value::List(elements.iter().map(Value::from).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists (nil)
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::List(vec![])
}
