//! Primitive registry: the two dispatch tables consulted by the evaluator.
//!
//! ## Special forms vs eager primitives
//!
//! - **Special forms** receive their operand expressions unevaluated together
//!   with the evaluator and the current environment, and decide themselves what
//!   to evaluate (`quote`, `if`, `define`, `lambda`).
//! - **Eager primitives** receive operands that the evaluator has already
//!   evaluated left to right (`car`, `+`, `=`, ...).
//!
//! When a name is registered in both tables the special form wins.
//!
//! ## Error conventions
//!
//! Arithmetic primitives raise a type error on a non-integer operand and an
//! evaluation error on overflow. Comparison primitives never raise type errors:
//! any non-integer operand makes the comparison `#f`.
//!
//! ## Adding new operations
//!
//! 1. Write the body as a typed Rust function (see
//!    [`crate::evaluator::intooperation`] for the accepted parameter types)
//! 2. Register it in [`Registry::standard`]'s table, or on a private
//!    [`Registry`] with [`Registry::register_builtin_operation`] /
//!    [`Registry::register_variadic_builtin_operation`]
//! 3. Add table-driven tests covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::Error;
use crate::ast::{IntType, Value};
use crate::evaluator::intooperation::{
    IntIter, IntRest, IntoOperation, IntoVariadicOperation, OperationFn, ValueIter, ValuesRest,
};
use crate::evaluator::{
    Environment, Evaluator, eval_define, eval_if, eval_lambda, eval_quote,
};

/// Argument count accepted by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check an argument count against this arity
    pub fn validate(&self, count: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(*self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Signature of a special form: the unevaluated operands and the environment
/// of the form.
pub type SpecialFormFn = fn(&Evaluator<'_>, &[Value], &Environment) -> Result<Value, Error>;

/// An operator whose operands are passed to it unevaluated
#[derive(Clone)]
pub struct SpecialForm {
    pub name: String,
    pub arity: Arity,
    pub func: SpecialFormFn,
}

/// An operator whose operands are evaluated before it runs
#[derive(Clone)]
pub struct Primitive {
    pub name: String,
    pub arity: Arity,
    pub func: Arc<OperationFn>,
}

impl fmt::Debug for SpecialForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpecialForm({}, {:?})", self.name, self.arity)
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({}, {:?})", self.name, self.arity)
    }
}

/// The two dispatch tables, keyed by symbol name.
///
/// A registry is filled before evaluation starts and only read afterwards:
/// an [`Evaluator`] borrows it immutably.
#[derive(Clone, Default, Debug)]
pub struct Registry {
    special_forms: HashMap<String, SpecialForm>,
    primitives: HashMap<String, Primitive>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry, built once per process
    pub fn standard() -> &'static Registry {
        &STANDARD
    }

    pub fn register_special_form(&mut self, name: &str, arity: Arity, func: SpecialFormFn) {
        self.special_forms.insert(
            name.to_owned(),
            SpecialForm {
                name: name.to_owned(),
                arity,
                func,
            },
        );
    }

    /// Register an eager primitive that already has the erased signature.
    ///
    /// This is the low-level API. Prefer
    /// [`Registry::register_builtin_operation`] for new code.
    pub fn register_primitive(&mut self, name: &str, arity: Arity, func: Arc<OperationFn>) {
        self.primitives.insert(
            name.to_owned(),
            Primitive {
                name: name.to_owned(),
                arity,
                func,
            },
        );
    }

    /// Register a strongly-typed fixed-arity Rust function as an eager
    /// primitive.
    ///
    /// ```
    /// use minilisp::Registry;
    ///
    /// fn add(a: i64, b: i64) -> i64 { a + b }
    ///
    /// let mut registry = Registry::standard().clone();
    /// registry.register_builtin_operation::<_, (i64, i64)>("add", add);
    /// ```
    ///
    /// Supported parameter types are `i64` and `Value`. The body may return
    /// any `R: Into<Value>` or `Result<R, Error>`.
    pub fn register_builtin_operation<F, Args>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        self.register_primitive(name, F::ARITY, func.into_operation());
    }

    /// Register a Rust function taking a rest parameter (`IntIter<'_>` or
    /// `ValueIter<'_>`) as an eager primitive. The argument count is
    /// validated against `arity` before the body runs.
    pub fn register_variadic_builtin_operation<F, Args>(
        &mut self,
        name: &str,
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args> + 'static,
    {
        self.register_primitive(name, arity, func.into_variadic_operation());
    }

    pub fn find_special_form(&self, name: &str) -> Option<&SpecialForm> {
        self.special_forms.get(name)
    }

    pub fn find_primitive(&self, name: &str) -> Option<&Primitive> {
        self.primitives.get(name)
    }

    /// Names of all special forms, sorted
    pub fn special_form_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.special_forms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of all eager primitives, sorted
    pub fn primitive_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

//
// Standard primitive implementations
//

// Comparisons chain over adjacent pairs; a non-integer anywhere makes the
// whole comparison false rather than an error.
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: ValueIter<'_>) -> bool {
            let mut prev: Option<IntType> = None;
            for arg in args {
                let Value::Int(current) = *arg else {
                    return false;
                };
                if let Some(p) = prev {
                    if !(p $op current) {
                        return false;
                    }
                }
                prev = Some(current);
            }
            true
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_add(args: IntIter<'_>) -> Result<IntType, Error> {
    let mut sum: IntType = 0;
    for n in args {
        sum = sum
            .checked_add(n)
            .ok_or_else(|| Error::Eval("Integer overflow in addition".into()))?;
    }
    Ok(sum)
}

// A single operand is returned unchanged, not negated
fn builtin_sub(mut args: IntIter<'_>) -> Result<IntType, Error> {
    let Some(first) = args.next() else {
        return Ok(0);
    };

    let mut result = first;
    for n in args {
        result = result
            .checked_sub(n)
            .ok_or_else(|| Error::Eval("Integer overflow in subtraction".into()))?;
    }
    Ok(result)
}

fn builtin_mul(args: IntIter<'_>) -> Result<IntType, Error> {
    let mut product: IntType = 1;
    for n in args {
        product = product
            .checked_mul(n)
            .ok_or_else(|| Error::Eval("Integer overflow in multiplication".into()))?;
    }
    Ok(product)
}

fn builtin_car(list: Value) -> Result<Value, Error> {
    match list {
        Value::List(items) => items
            .first()
            .cloned()
            .ok_or_else(|| Error::Eval("car of empty list".into())),
        other => Err(Error::Type(format!(
            "car requires a list, got {} '{other}'",
            other.type_name()
        ))),
    }
}

fn builtin_cdr(list: Value) -> Result<Value, Error> {
    match list {
        Value::List(items) => match &items[..] {
            [] => Err(Error::Eval("cdr of empty list".into())),
            [_] => Ok(Value::Nil),
            [_, rest @ ..] => Ok(Value::list_from(rest.iter().cloned())),
        },
        other => Err(Error::Type(format!(
            "cdr requires a list, got {} '{other}'",
            other.type_name()
        ))),
    }
}

// nil stands in for the empty list as the tail, mirroring cdr's result
fn builtin_cons(head: Value, tail: Value) -> Result<Value, Error> {
    match tail {
        Value::List(items) => Ok(Value::list_from(
            std::iter::once(head).chain(items.iter().cloned()),
        )),
        Value::Nil => Ok(Value::list_from([head])),
        other => Err(Error::Type(format!(
            "cons requires a list as second argument, got {} '{other}'",
            other.type_name()
        ))),
    }
}

/// Standard registry, built once at first use.
static STANDARD: LazyLock<Registry> = LazyLock::new(|| {
    let mut registry = Registry::new();

    registry.register_special_form("quote", Arity::Exact(1), eval_quote);
    registry.register_special_form("if", Arity::Exact(3), eval_if);
    registry.register_special_form("define", Arity::Exact(2), eval_define);
    registry.register_special_form("lambda", Arity::Exact(2), eval_lambda);

    // List operations
    registry.register_builtin_operation::<_, (Value,)>("car", builtin_car);
    registry.register_builtin_operation::<_, (Value,)>("cdr", builtin_cdr);
    registry.register_builtin_operation::<_, (Value, Value)>("cons", builtin_cons);

    // Comparison operations
    registry.register_variadic_builtin_operation::<_, (ValuesRest,)>(
        "=",
        Arity::AtLeast(2),
        builtin_eq,
    );
    registry.register_variadic_builtin_operation::<_, (ValuesRest,)>(
        ">",
        Arity::AtLeast(2),
        builtin_gt,
    );
    registry.register_variadic_builtin_operation::<_, (ValuesRest,)>(
        "<",
        Arity::AtLeast(2),
        builtin_lt,
    );
    registry.register_variadic_builtin_operation::<_, (ValuesRest,)>(
        ">=",
        Arity::AtLeast(2),
        builtin_ge,
    );
    registry.register_variadic_builtin_operation::<_, (ValuesRest,)>(
        "<=",
        Arity::AtLeast(2),
        builtin_le,
    );

    // Arithmetic operations
    registry.register_variadic_builtin_operation::<_, (IntRest,)>("+", Arity::Any, builtin_add);
    registry.register_variadic_builtin_operation::<_, (IntRest,)>("-", Arity::Any, builtin_sub);
    registry.register_variadic_builtin_operation::<_, (IntRest,)>("*", Arity::Any, builtin_mul);

    registry
});
