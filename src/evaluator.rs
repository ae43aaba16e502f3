use crate::Error;
use crate::ast::{Closure, Value};
use crate::builtinops::{Arity, Registry};

mod environment;
pub mod intooperation;

pub use environment::Environment;

/// If less than this much stack remains, evaluation switches to a new segment
const RED_ZONE: usize = 100 * 1024;

/// Size of each additional stack segment
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Evaluates expressions against an environment, dispatching list heads
/// through a [`Registry`].
///
/// The registry is borrowed for the evaluator's lifetime and never modified.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'r> {
    registry: &'r Registry,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Evaluator { registry }
    }

    /// Evaluator over [`Registry::standard`]
    pub fn standard() -> Evaluator<'static> {
        Evaluator::new(Registry::standard())
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Evaluate `expr` in `env`.
    ///
    /// Nil, booleans, integers, closures and the empty list evaluate to
    /// themselves; symbols are looked up through the chain; a non-empty list is
    /// an operator application.
    pub fn eval(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        // Runaway recursion must end in StackLimit, not a host stack overflow
        stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || match expr {
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Closure(_) => Ok(expr.clone()),
            Value::Symbol(name) => env.get(name),
            Value::List(items) if items.is_empty() => Ok(expr.clone()),
            Value::List(items) => self.eval_list(items, env),
        })
    }

    /// Evaluate argument expressions left to right, stopping at the first error
    pub fn eval_args(&self, exprs: &[Value], env: &Environment) -> Result<Vec<Value>, Error> {
        exprs.iter().map(|expr| self.eval(expr, env)).collect()
    }

    /// Call `closure` with already-evaluated arguments.
    ///
    /// The new frame is chained to `caller_env`, the environment of the call
    /// site, so free symbols in the body resolve through the caller's chain.
    pub fn call_closure(
        &self,
        closure: &Closure,
        args: Vec<Value>,
        caller_env: &Environment,
    ) -> Result<Value, Error> {
        self.invoke(closure, args, caller_env, None)
    }

    fn invoke(
        &self,
        closure: &Closure,
        args: Vec<Value>,
        caller_env: &Environment,
        name: Option<&str>,
    ) -> Result<Value, Error> {
        let frame = Environment::new(&closure.params, args, Some(caller_env)).map_err(|err| {
            match name {
                Some(name) => add_operator_context(err, name),
                None => err,
            }
        })?;

        log::trace!(
            "call {} with {} argument(s) at depth {}",
            name.unwrap_or("#<closure>"),
            closure.params.len(),
            frame.depth()
        );

        self.eval(&closure.body, &frame)
    }

    fn eval_list(&self, elements: &[Value], env: &Environment) -> Result<Value, Error> {
        let Some((head, operands)) = elements.split_first() else {
            return Ok(Value::empty_list());
        };

        match head {
            Value::Symbol(name) => {
                // Special forms shadow primitives, which shadow bindings
                if let Some(form) = self.registry.find_special_form(name) {
                    form.arity
                        .validate(operands.len())
                        .map_err(|err| add_operator_context(err, name))?;
                    return (form.func)(self, operands, env);
                }

                if let Some(primitive) = self.registry.find_primitive(name) {
                    let args = self.eval_args(operands, env)?;
                    primitive
                        .arity
                        .validate(args.len())
                        .and_then(|()| (primitive.func)(args, env))
                        .map_err(|err| add_operator_context(err, name))
                } else {
                    match env.get(name)? {
                        Value::Closure(closure) => {
                            let args = self.eval_args(operands, env)?;
                            self.invoke(&closure, args, env, Some(name))
                        }
                        other => Err(Error::Type(format!(
                            "'{name}' is not callable: bound to {} '{other}'",
                            other.type_name()
                        ))),
                    }
                }
            }
            Value::Closure(closure) => {
                let args = self.eval_args(operands, env)?;
                self.invoke(closure, args, env, None)
            }
            other => Err(Error::Call(format!(
                "head of list is not callable: {} '{other}'",
                other.type_name()
            ))),
        }
    }
}

/// Name the operator in an arity error that does not carry one yet
fn add_operator_context(error: Error, operator: &str) -> Error {
    match error {
        Error::Arity {
            expected,
            got,
            expression: None,
        } => Error::arity_error_with_expr(expected, got, operator),
        other => other,
    }
}

/// Evaluate with the standard registry (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    Evaluator::standard().eval(expr, env)
}

/// Create the empty top-level environment
pub fn create_global_env() -> Environment {
    Environment::root()
}

/// Collect parameter names, rejecting anything that is not a symbol
fn param_names(form: &str, params: &[Value]) -> Result<Vec<String>, Error> {
    params
        .iter()
        .map(|param| match param {
            Value::Symbol(name) => Ok(name.clone()),
            other => Err(Error::Structural(format!(
                "{form}: parameter must be a symbol, got {} '{other}'",
                other.type_name()
            ))),
        })
        .collect()
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _evaluator: &Evaluator<'_>,
    args: &[Value],
    _env: &Environment,
) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Evaluate if special form: only the false Bool selects the alternate
pub(crate) fn eval_if(
    evaluator: &Evaluator<'_>,
    args: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    match args {
        [test, consequent, alternate] => {
            if evaluator.eval(test, env)?.is_false() {
                evaluator.eval(alternate, env)
            } else {
                evaluator.eval(consequent, env)
            }
        }
        _ => Err(Error::arity_error(Arity::Exact(3), args.len())),
    }
}

/// Evaluate define special form
///
/// `(define name expr)` binds the value of `expr` and returns the symbol.
/// `(define (name params...) body)` binds a closure over the unevaluated body
/// and returns the closure. Both bind in `env` itself.
pub(crate) fn eval_define(
    evaluator: &Evaluator<'_>,
    args: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = evaluator.eval(expr, env)?;
            log::debug!("define {name} at depth {}", env.depth());
            env.set(name.as_str(), value);
            Ok(Value::Symbol(name.clone()))
        }
        [Value::List(signature), body] => match &signature[..] {
            [Value::Symbol(name), params @ ..] => {
                let closure = Value::closure(param_names("define", params)?, body.clone());
                log::debug!("define function {name} at depth {}", env.depth());
                env.set(name.as_str(), closure.clone());
                Ok(closure)
            }
            [] => Err(Error::Structural(
                "define: function signature must not be empty".to_owned(),
            )),
            [other, ..] => Err(Error::Structural(format!(
                "define: function name must be a symbol, got {} '{other}'",
                other.type_name()
            ))),
        },
        [other, _] => Err(Error::Structural(format!(
            "define: first argument must be a symbol or a list, got {} '{other}'",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    _evaluator: &Evaluator<'_>,
    args: &[Value],
    _env: &Environment,
) -> Result<Value, Error> {
    match args {
        [Value::List(params), body] => Ok(Value::closure(
            param_names("lambda", params)?,
            body.clone(),
        )),
        [other, _] => Err(Error::Structural(format!(
            "lambda: parameters must be a list, got {} '{other}'",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}
