//! Primitive procedure library.
//!
//! Every primitive is an ordinary Rust function with typed parameters,
//! wired into the erased evaluator signature through the adapters in
//! [`crate::evaluator::intooperation`]. The registry below is installed into
//! the root environment by [`crate::evaluator::create_global_env`].
//!
//! ```scheme
//! (+ 1 2)              ; arithmetic, exactly two operands
//! (< 10 3)             ; comparison => #f
//! (cons 2 50)          ; => (2 50)
//! (null? (list))       ; => #t
//! ```
//!
//! ## Arity and types
//!
//! Arithmetic and comparison take exactly two numbers; mixed integer/float
//! operands promote to float. `list` is the only variadic primitive. A wrong
//! argument count fails with an `ArityError`, a wrong operand type with a
//! `TypeError`. Integer overflow and integer division by zero fail with an
//! `EvalError`.
//!
//! Special forms (`quote`, `if`, `define`, `set!`, `lambda`) are syntax and
//! are handled by the evaluator, not registered here.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`Number`, `Value`,
//!    `ValueIter<'_>`) returning a value or `Result<_, Error>`
//! 2. **Add to BUILTIN_OPS** with its Scheme identifier and arity
//! 3. **Add test cases** to the table in this module's tests

use crate::Error;
use crate::ast::{Number, Value};
use crate::evaluator::intooperation::{
    IntoOperation, IntoVariadicOperation, OperationFn, ValueIter,
};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(self, arg_count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if arg_count != n => Err(Error::arity_error(n, arg_count)),
            Arity::AtLeast(n) if arg_count < n => Err(Error::arity_error(n, arg_count)),
            _ => Ok(()),
        }
    }
}

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    pub func: Arc<OperationFn>,
    pub arity: Arity,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("scheme_id", &self.scheme_id)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl BuiltinOp {
    /// Runtime value bound in the root environment. The arity is checked
    /// before the typed adapter runs.
    pub(crate) fn to_function_value(&self) -> Value {
        let arity = self.arity;
        let func = Arc::clone(&self.func);
        Value::BuiltinFunction {
            id: self.scheme_id.to_owned(),
            func: Arc::new(move |args: Vec<Value>| {
                arity.validate(args.len())?;
                func(args)
            }),
        }
    }
}

//
// Builtin Function Implementations
//

macro_rules! numeric_arithmetic {
    ($name:ident, $method:ident) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            a.$method(b)
        }
    };
}

numeric_arithmetic!(builtin_add, checked_add);
numeric_arithmetic!(builtin_sub, checked_sub);
numeric_arithmetic!(builtin_mul, checked_mul);
numeric_arithmetic!(builtin_div, checked_div);

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(a: Number, b: Number) -> bool {
            a $op b
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_eq(a: Value, b: Value) -> bool {
    a.loosely_equals(&b)
}

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

// A pair is a two-element list; the second operand is never spliced in.
fn builtin_cons(first: Value, second: Value) -> Value {
    Value::List(vec![first, second])
}

fn builtin_car(mut list: ValueIter<'_>) -> Result<Value, Error> {
    match list.next() {
        Some(first) => Ok(first.clone()),
        None => Err(Error::EvalError("car of empty list".into())),
    }
}

fn builtin_cdr(list: ValueIter<'_>) -> Result<Value, Error> {
    match list.as_slice() {
        [_, rest @ ..] => Ok(Value::List(rest.to_vec())),
        [] => Err(Error::EvalError("cdr of empty list".into())),
    }
}

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::List(args.cloned().collect())
}

fn builtin_is_list(value: Value) -> bool {
    matches!(value, Value::List(_))
}

fn builtin_null(list: ValueIter<'_>) -> bool {
    list.as_slice().is_empty()
}

fn builtin_is_symbol(value: Value) -> bool {
    matches!(value, Value::Symbol(_))
}

/// Global registry of all built-in operations, built once.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    fn numeric(
        scheme_id: &'static str,
        f: fn(Number, Number) -> Result<Number, Error>,
    ) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            func: builtin_fixed::<(Number, Number), _>(f),
            arity: Arity::Exact(2),
        }
    }

    fn comparison(scheme_id: &'static str, f: fn(Number, Number) -> bool) -> BuiltinOp {
        BuiltinOp {
            scheme_id,
            func: builtin_fixed::<(Number, Number), _>(f),
            arity: Arity::Exact(2),
        }
    }

    vec![
        // Arithmetic operations
        numeric("+", builtin_add),
        numeric("-", builtin_sub),
        numeric("*", builtin_mul),
        numeric("/", builtin_div),
        // Comparison operations
        comparison("<", builtin_lt),
        comparison(">", builtin_gt),
        comparison("<=", builtin_le),
        comparison(">=", builtin_ge),
        BuiltinOp {
            scheme_id: "=",
            func: builtin_fixed::<(Value, Value), _>(builtin_eq),
            arity: Arity::Exact(2),
        },
        // Logical operations
        BuiltinOp {
            scheme_id: "not",
            func: builtin_fixed::<(Value,), _>(builtin_not),
            arity: Arity::Exact(1),
        },
        // List operations
        BuiltinOp {
            scheme_id: "cons",
            func: builtin_fixed::<(Value, Value), _>(builtin_cons),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            scheme_id: "car",
            func: builtin_fixed::<(ValueIter<'static>,), _>(builtin_car),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "cdr",
            func: builtin_fixed::<(ValueIter<'static>,), _>(builtin_cdr),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "list",
            func: builtin_variadic::<(ValueIter<'static>,), _>(builtin_list),
            arity: Arity::Any,
        },
        // Type predicates
        BuiltinOp {
            scheme_id: "list?",
            func: builtin_fixed::<(Value,), _>(builtin_is_list),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "null?",
            func: builtin_fixed::<(ValueIter<'static>,), _>(builtin_null),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            scheme_id: "symbol?",
            func: builtin_fixed::<(Value,), _>(builtin_is_symbol),
            arity: Arity::Exact(1),
        },
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// All builtin operations, in registry order
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its Scheme identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}
