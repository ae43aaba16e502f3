//! Adapters that turn strongly-typed Rust functions into the erased primitive
//! signature used by the evaluator.
//!
//! A primitive body can be written as `fn(IntType, IntType) -> IntType` or
//! `fn(IntIter<'_>) -> Result<IntType, Error>` and registered through
//! [`crate::builtinops::Registry`]; the adapter checks argument count and
//! argument types before the body runs.

use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::Error;
use crate::ast::{IntType, Value};
use crate::builtinops::Arity;
use crate::evaluator::Environment;

/// Canonical erased primitive type used by the evaluator.
///
/// Primitives receive ownership of their already-evaluated arguments and the
/// environment of the call site.
pub type OperationFn = dyn Fn(Vec<Value>, &Environment) -> Result<Value, Error> + Send + Sync;

// Fixed parameters

/// Converts a single evaluated argument into a typed parameter.
pub trait FromParam {
    /// The parameter type as seen by the primitive body
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        // Arguments are owned by the adapter, move instead of clone
        Ok(std::mem::replace(value, Value::Nil))
    }
}

impl FromParam for IntType {
    type Param<'a> = IntType;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        IntType::try_from(std::mem::replace(value, Value::Nil))
    }
}

// Rest parameters

/// What an [`ArgIter`] yields: how the whole argument slice is checked up
/// front and how each element is then read.
#[doc(hidden)]
pub trait ArgKind {
    type Item<'a>;

    fn check_all(slice: &[Value]) -> Result<(), Error>;
    fn extract<'a>(v: &'a Value) -> Self::Item<'a>;
}

/// Iterator over the evaluated arguments of a variadic primitive.
#[doc(hidden)]
pub struct ArgIter<'a, K: ArgKind> {
    inner: std::slice::Iter<'a, Value>,
    _marker: PhantomData<K>,
}

impl<'a, K> ArgIter<'a, K>
where
    K: ArgKind,
{
    pub(crate) fn new(values: &'a [Value]) -> Result<Self, Error> {
        K::check_all(values)?;
        Ok(ArgIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }
}

impl<'a, K> Iterator for ArgIter<'a, K>
where
    K: ArgKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.inner.next()?;
        Some(K::extract(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> ExactSizeIterator for ArgIter<'_, K> where K: ArgKind {}
impl<K> FusedIterator for ArgIter<'_, K> where K: ArgKind {}

#[doc(hidden)]
pub struct AnyArg;

impl ArgKind for AnyArg {
    type Item<'a> = &'a Value;

    fn check_all(_slice: &[Value]) -> Result<(), Error> {
        Ok(())
    }

    fn extract<'a>(v: &'a Value) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct IntArg;

impl ArgKind for IntArg {
    type Item<'a> = IntType;

    fn check_all(slice: &[Value]) -> Result<(), Error> {
        match slice.iter().find(|v| !matches!(v, Value::Int(_))) {
            Some(bad) => Err(Error::Type(format!(
                "expected integer, got {} '{bad}'",
                bad.type_name()
            ))),
            None => Ok(()),
        }
    }

    fn extract<'a>(v: &'a Value) -> Self::Item<'a> {
        match v {
            Value::Int(n) => *n,
            _ => unreachable!("IntArg check_all admits integers only"),
        }
    }
}

/// Borrowed iterator over raw argument values.
pub type ValueIter<'a> = ArgIter<'a, AnyArg>;

/// Borrowed iterator over integer arguments. Construction fails with a type
/// error if any argument is not an integer.
pub type IntIter<'a> = ArgIter<'a, IntArg>;

/// Builds a rest parameter from the trailing argument slice.
pub trait FromTail {
    type Param<'a>;

    fn from_tail<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromTail for ArgIter<'static, K>
where
    K: ArgKind,
{
    type Param<'a> = ArgIter<'a, K>;

    fn from_tail<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error> {
        ArgIter::<K>::new(slice)
    }
}

/// Type-level marker for a rest parameter of raw values
pub type ValuesRest = ValueIter<'static>;

/// Type-level marker for a rest parameter of integers
pub type IntRest = IntIter<'static>;

// Return values

/// Normalizes primitive return types to `Result<Value, Error>`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Converts a fixed-arity typed function into an [`OperationFn`].
pub trait IntoOperation<Args> {
    /// Number of arguments the function takes
    const ARITY: Arity;

    fn into_operation(self) -> Arc<OperationFn>;
}

/// Converts a function taking a single rest parameter into an [`OperationFn`].
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromTail,
    F: for<'a> Fn(<I as FromTail>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>, _env: &Environment| {
            let tail: <I as FromTail>::Param<'_> = <I as FromTail>::from_tail(&args[..])?;
            let result: R = (self)(tail);
            result.into_value_result()
        })
    }
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    const ARITY: Arity = Arity::Exact(0);

    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>, _env: &Environment| {
            if !args.is_empty() {
                return Err(Error::arity_error(Arity::Exact(0), args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

/// Implements `IntoOperation` for one fixed arity: the owned argument vector
/// is destructured into slots so `FromParam` can move each argument out.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            const ARITY: Arity = Arity::Exact($arity);

            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>, _env: &Environment| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        [ $( $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(Error::arity_error(Arity::Exact($arity), len)),
                    }
                })
            }
        }
    };
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn call(op: &Arc<OperationFn>, args: Vec<Value>) -> Result<Value, Error> {
        op(args, &Environment::root())
    }

    #[test]
    fn test_fixed_arity_adapter_converts_and_checks() {
        fn sub(a: IntType, b: IntType) -> IntType {
            a - b
        }
        let op = IntoOperation::<(IntType, IntType)>::into_operation(sub);

        assert_eq!(call(&op, vec![val(9), val(4)]).unwrap(), val(5));
        assert!(matches!(
            call(&op, vec![val(9)]),
            Err(Error::Arity { expected: Arity::Exact(2), got: 1, .. })
        ));
        assert!(matches!(call(&op, vec![val(9), sym("x")]), Err(Error::Type(_))));
    }

    #[test]
    fn test_zero_arity_adapter() {
        fn answer() -> IntType {
            42
        }
        let op = IntoOperation::<()>::into_operation(answer);
        assert_eq!(call(&op, vec![]).unwrap(), val(42));
        assert!(call(&op, vec![val(1)]).is_err());
        assert_eq!(<fn() -> IntType as IntoOperation<()>>::ARITY, Arity::Exact(0));
    }

    #[test]
    fn test_three_arity_adapter() {
        fn clamp(x: IntType, lo: IntType, hi: IntType) -> IntType {
            x.max(lo).min(hi)
        }
        let op = IntoOperation::<(IntType, IntType, IntType)>::into_operation(clamp);

        assert_eq!(call(&op, vec![val(15), val(0), val(10)]).unwrap(), val(10));
        assert_eq!(call(&op, vec![val(-3), val(0), val(10)]).unwrap(), val(0));
        assert!(matches!(
            call(&op, vec![val(1), val(2)]),
            Err(Error::Arity { expected: Arity::Exact(3), got: 2, .. })
        ));
        assert!(matches!(
            call(&op, vec![val(1), val(2), sym("hi")]),
            Err(Error::Type(_))
        ));
        assert_eq!(
            <fn(IntType, IntType, IntType) -> IntType as IntoOperation<(
                IntType,
                IntType,
                IntType
            )>>::ARITY,
            Arity::Exact(3)
        );
    }

    #[test]
    fn test_value_params_move_arguments() {
        fn second(_a: Value, b: Value) -> Value {
            b
        }
        let op = IntoOperation::<(Value, Value)>::into_operation(second);
        assert_eq!(call(&op, vec![sym("a"), val([1, 2])]).unwrap(), val([1, 2]));
    }

    #[test]
    fn test_int_rest_rejects_non_integers() {
        fn sum(nums: IntIter<'_>) -> IntType {
            nums.sum()
        }
        let op = IntoVariadicOperation::<(IntRest,)>::into_variadic_operation(sum);

        assert_eq!(call(&op, vec![]).unwrap(), val(0));
        assert_eq!(call(&op, vec![val(1), val(2), val(3)]).unwrap(), val(6));
        let err = call(&op, vec![val(1), sym("a")]).unwrap_err();
        assert!(format!("{err}").contains("expected integer"));
    }

    #[test]
    fn test_value_rest_sees_every_argument() {
        fn count(args: ValueIter<'_>) -> IntType {
            args.len() as IntType
        }
        let op = IntoVariadicOperation::<(ValuesRest,)>::into_variadic_operation(count);
        assert_eq!(
            call(&op, vec![val(1), sym("a"), Value::Nil]).unwrap(),
            val(3)
        );
    }
}
