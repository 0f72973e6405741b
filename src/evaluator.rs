use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Expr, Value};
use crate::builtinops::{Arity, get_builtin_ops};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

pub mod intooperation;

use intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};

/// One frame of the lexical environment chain.
///
/// Frames are shared: closures keep their defining frame alive through an
/// `Rc`, and `define`/`set!` mutate bindings through a `RefCell`, so every
/// holder of a frame observes the same bindings.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn with_parent(parent: Rc<Environment>) -> Self {
        Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        }
    }

    /// New frame pairing `params` with `args` positionally, enclosed by `parent`.
    pub fn from_bindings(
        params: &[String],
        args: Vec<Value>,
        parent: Rc<Environment>,
    ) -> Result<Self, Error> {
        if params.len() != args.len() {
            return Err(Error::arity_error(params.len(), args.len()));
        }

        let bindings = params.iter().cloned().zip(args).collect();
        Ok(Environment {
            bindings: RefCell::new(bindings),
            parent: Some(parent),
        })
    }

    /// Bind `name` in this frame, replacing any existing binding here.
    /// Outer frames are never touched.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// The innermost frame, starting from this one, that binds `name`
    pub fn find(&self, name: &str) -> Option<&Environment> {
        if self.bindings.borrow().contains_key(name) {
            Some(self)
        } else {
            self.parent.as_deref()?.find(name)
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.find(name)
            .and_then(|frame| frame.bindings.borrow().get(name).cloned())
            .ok_or_else(|| Error::UnboundSymbol(name.to_owned()))
    }

    /// Overwrite the existing binding of `name` in the frame that holds it.
    /// Fails with `UnboundSymbol` rather than creating a new binding.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), Error> {
        match self.find(name) {
            Some(frame) => {
                frame.bindings.borrow_mut().insert(name.to_owned(), value);
                Ok(())
            }
            None => Err(Error::UnboundSymbol(name.to_owned())),
        }
    }

    /// Register a custom builtin function in the environment.
    ///
    /// This is the low-level API: it accepts a function that already
    /// works on `&[Value]` and returns `Result<Value, Error>`. For most new
    /// code, prefer [`Environment::register_builtin_operation`].
    ///
    /// # Example
    /// ```
    /// use rush::ast::Value;
    /// use rush::evaluator::create_global_env;
    /// use rush::{Error, interpret_once};
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len() as i64))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("count-args", count_args);
    /// assert_eq!(interpret_once("(count-args 1 2 3)", &env), Ok(Value::Integer(3)));
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// Register a strongly-typed Rust function as a builtin operation using
    /// automatic argument extraction and result conversion.
    ///
    /// Supported parameter types:
    /// - `Number` (integer or float operand)
    /// - `i64` (integer operand only)
    /// - `Value` (owned access to the raw value)
    /// - `ValueIter<'_>` (iterates over the elements of a list argument)
    ///
    /// Return types are any `R: Into<Value>` or `Result<R, Error>`.
    /// Arity is enforced automatically and conversion failures yield
    /// `TypeError`. The parameter tuple usually has to be spelled out:
    ///
    /// ```
    /// use rush::ast::Value;
    /// use rush::evaluator::create_global_env;
    /// use rush::interpret_once;
    ///
    /// fn clamp(n: i64, lo: i64, hi: i64) -> i64 {
    ///     n.clamp(lo, hi)
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_operation::<_, (i64, i64, i64)>("clamp", clamp);
    /// assert_eq!(interpret_once("(clamp 42 0 10)", &env), Ok(Value::Integer(10)));
    /// ```
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: func.into_operation(),
            },
        );
    }

    /// Register a variadic builtin operation with explicit arity metadata.
    ///
    /// The function's last parameter is a `ValueIter<'_>` over the remaining
    /// arguments, optionally after one or two typed prefix parameters. The
    /// [`Arity`] is checked against the total argument count at call time.
    pub fn register_variadic_builtin_operation<F, Args>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args>,
    {
        let inner = func.into_variadic_operation();
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            inner(args)
        });

        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = &self.parent {
            bindings.extend(parent.get_all_bindings());
        }

        for (name, value) in self.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// Syntax recognized by the evaluator before procedure application.
/// Keywords are matched on the head symbol, whatever it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialForm {
    Quote,
    If,
    Define,
    Set,
    Lambda,
}

impl SpecialForm {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "quote" => Some(SpecialForm::Quote),
            "if" => Some(SpecialForm::If),
            "define" => Some(SpecialForm::Define),
            "set!" => Some(SpecialForm::Set),
            "lambda" => Some(SpecialForm::Lambda),
            _ => None,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Define => "define",
            SpecialForm::Set => "set!",
            SpecialForm::Lambda => "lambda",
        }
    }

    fn arity_error(self, expected: usize, got: usize) -> Error {
        Error::arity_error_with_expr(expected, got, self.keyword().to_owned())
    }
}

/// Evaluate an expression in `env` (public API)
pub fn eval(expr: &Expr, env: &Rc<Environment>) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate an expression with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(
    expr: &Expr,
    env: &Rc<Environment>,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }
    match expr {
        Expr::Integer(n) => Ok(Value::Integer(*n)),
        Expr::Float(x) => Ok(Value::Float(*x)),
        Expr::Symbol(name) => env.lookup(name),
        Expr::List(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }
    }
}

/// Attach the innermost failing list expression to type and evaluation errors
fn add_context(error: Error, expr: &Expr) -> Error {
    annotate(error, "Context: while evaluating", expr)
}

fn annotate(error: Error, label: &str, expr: &Expr) -> Error {
    let already_annotated = |msg: &str| msg.contains(&format!("\n  {label}:"));
    match error {
        Error::EvalError(msg) if !already_annotated(&msg) => {
            Error::EvalError(format!("{msg}\n  {label}: {expr}"))
        }
        Error::TypeError(msg) if !already_annotated(&msg) => {
            Error::TypeError(format!("{msg}\n  {label}: {expr}"))
        }
        // Unbound symbols, arity and syntax errors carry their own context
        other => other,
    }
}

fn eval_args(args: &[Expr], env: &Rc<Environment>, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

fn eval_list(elements: &[Expr], env: &Rc<Environment>, depth: usize) -> Result<Value, Error> {
    let [head, arg_exprs @ ..] = elements else {
        return Ok(Value::List(Vec::new()));
    };

    let special_form = match head {
        Expr::Symbol(name) => SpecialForm::from_keyword(name),
        _ => None,
    };
    if let Some(form) = special_form {
        return match form {
            SpecialForm::Quote => eval_quote(arg_exprs),
            SpecialForm::If => eval_if(arg_exprs, env, depth),
            SpecialForm::Define => eval_define(arg_exprs, env, depth),
            SpecialForm::Set => eval_set(arg_exprs, env, depth),
            SpecialForm::Lambda => eval_lambda(arg_exprs, env),
        };
    }

    let func = eval_with_depth_tracking(head, env, depth + 1)?;
    let args = eval_args(arg_exprs, env, depth)?;
    apply(&func, args, depth)
}

/// Invoke a procedure value on already-evaluated arguments
fn apply(func: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction { func, .. } => func(args),
        Value::Function {
            params,
            body,
            env: closure_env,
        } => {
            trace!(?params, argc = args.len(), "applying closure");
            let frame = Rc::new(Environment::from_bindings(
                params,
                args,
                Rc::clone(closure_env),
            )?);
            eval_with_depth_tracking(body, &frame, depth + 1)
                .map_err(|err| annotate(err, "In lambda", body))
        }
        other => Err(Error::NotCallable(other.to_string())),
    }
}

fn eval_quote(args: &[Expr]) -> Result<Value, Error> {
    match args {
        [datum] => Ok(Value::from(datum)),
        _ => Err(SpecialForm::Quote.arity_error(1, args.len())),
    }
}

fn eval_if(args: &[Expr], env: &Rc<Environment>, depth: usize) -> Result<Value, Error> {
    let (condition_expr, then_expr, else_expr) = match args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => return Err(SpecialForm::If.arity_error(3, args.len())),
    };

    let condition = eval_with_depth_tracking(condition_expr, env, depth + 1)?;
    match (condition.is_truthy(), else_expr) {
        (true, _) => eval_with_depth_tracking(then_expr, env, depth + 1),
        (false, Some(else_expr)) => eval_with_depth_tracking(else_expr, env, depth + 1),
        (false, None) => Ok(Value::Unspecified),
    }
}

fn eval_define(args: &[Expr], env: &Rc<Environment>, depth: usize) -> Result<Value, Error> {
    match args {
        [Expr::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            debug!(%name, %value, "define");
            env.define(name.as_str(), value);
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("define requires a symbol".to_owned())),
        _ => Err(SpecialForm::Define.arity_error(2, args.len())),
    }
}

fn eval_set(args: &[Expr], env: &Rc<Environment>, depth: usize) -> Result<Value, Error> {
    match args {
        [Expr::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            debug!(%name, %value, "set!");
            env.assign(name, value.clone())?;
            Ok(value)
        }
        [_, _] => Err(Error::TypeError("set! requires a symbol".to_owned())),
        _ => Err(SpecialForm::Set.arity_error(2, args.len())),
    }
}

fn eval_lambda(args: &[Expr], env: &Rc<Environment>) -> Result<Value, Error> {
    match args {
        [Expr::List(param_list), body] => {
            let mut params: Vec<String> = Vec::with_capacity(param_list.len());
            for param in param_list {
                match param {
                    Expr::Symbol(name) => {
                        if params.contains(name) {
                            return Err(Error::EvalError(format!(
                                "Duplicate parameter name: {name}"
                            )));
                        }
                        params.push(name.clone());
                    }
                    other => {
                        return Err(Error::TypeError(format!(
                            "Lambda parameters must be symbols, got {other}"
                        )));
                    }
                }
            }

            // Only fixed-arity parameter lists; no rest parameters.
            Ok(Value::Function {
                params,
                body: Rc::new(body.clone()),
                env: Rc::clone(env),
            })
        }
        [_, _] => Err(Error::TypeError(
            "Lambda parameters must be a list".to_owned(),
        )),
        _ => Err(SpecialForm::Lambda.arity_error(2, args.len())),
    }
}

/// Create the root environment holding every primitive procedure
pub fn create_global_env() -> Rc<Environment> {
    let env = Environment::new();
    for builtin_op in get_builtin_ops() {
        env.define(builtin_op.scheme_id, builtin_op.to_function_value());
    }
    Rc::new(env)
}
