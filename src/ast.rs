//! This module defines the runtime value type shared by the reader and the
//! evaluator. [`Value`] is a single discriminated representation covering nil,
//! booleans, integers, symbols, lists and closures; payload access always goes
//! through a `match`, so there is no way to read a payload under the wrong tag.
//! Lists and closures are reference counted and never mutated in place, so
//! cloning a value shares its structure. Helper functions such as [`val`],
//! [`sym`] and [`list`] keep tree construction short in code and tests.

use std::fmt;
use std::rc::Rc;

use crate::Error;

/// Type alias for integer values in the interpreter
pub type IntType = i64;

/// A user-defined function: formal parameter names and a single body
/// expression.
///
/// No defining environment is captured. The body is evaluated in a frame whose
/// outer link is the environment of whoever calls the closure.
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Value,
}

/// Core value type of the interpreter
///
/// To build a tree, use the helper functions:
/// - `val(42)` for integers, `sym("name")` for symbols, `val(Value::Nil)` for nil
/// - `val([1, 2, 3])` for homogeneous lists
/// - `list([sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// The nil singleton (distinct from the empty list)
    Nil,
    /// Booleans, produced by comparisons only
    Bool(bool),
    /// Integers
    Int(IntType),
    /// Symbols (identifiers)
    Symbol(String),
    /// Lists, shared and never mutated in place
    List(Rc<[Value]>),
    /// User-defined functions
    Closure(Rc<Closure>),
}

impl Value {
    /// Build a list value from any sequence of values
    pub fn list_from<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// Build a closure value
    pub fn closure(params: Vec<String>, body: Value) -> Value {
        Value::Closure(Rc::new(Closure { params, body }))
    }

    /// The empty list
    pub fn empty_list() -> Value {
        Value::List(Rc::from([]))
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Closure(_) => "closure",
        }
    }

    /// True for the `false` Bool only; every other value is truthy
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(items) => {
                write!(f, "List(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Closure(c) => write!(f, "Closure(params={:?}, body={:?})", c.params, c.body),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Int(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Closure(_) => write!(f, "#<closure>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Closures are not introspectable, identity is all there is
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Int(IntType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list_from(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list_from(arr.into_iter().map(Into::into))
    }
}

impl TryFrom<Value> for IntType {
    type Error = Error;

    fn try_from(value: Value) -> Result<IntType, Error> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(Error::Type(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating values from Rust literals
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating mixed lists
pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
    Value::list_from(items)
}
