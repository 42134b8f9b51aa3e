use std::rc::Rc;

use crate::Error;
use crate::ast::{NumberType, Pair, Value};
use crate::evaluator::{Arity, Interpreter};
use crate::symbols::Symbol;

// NOTE: This module is the adapter layer that turns strongly-typed Rust
// functions into the erased `OperationFn` stored in `Value::Procedure`.
//
// Hosts interact with it through `Interpreter::register_builtin_operation`;
// the standard library procedures in `builtinops.rs` are wired through the
// same adapters.

/// Canonical erased procedure type used by the evaluator.
///
/// Procedures receive the interpreter (for interning result symbols such as `#t`)
/// and their already-evaluated arguments as a list. They never see the caller's
/// environment.
pub type OperationFn = dyn Fn(&Interpreter, &Value) -> Result<Value, Error>;

// =====================================================================
// Argument conversion
// =====================================================================

/// Converts one evaluated argument into a typed Rust parameter.
///
/// A variant mismatch is reported as `Error::TypeMismatch`.
pub trait FromParam: Sized {
    fn from_arg(value: &mut Value) -> Result<Self, Error>;
}

impl FromParam for Value {
    fn from_arg(value: &mut Value) -> Result<Self, Error> {
        // Move the argument out; the slot is discarded after conversion.
        Ok(std::mem::replace(value, Value::Unspecified))
    }
}

impl FromParam for NumberType {
    fn from_arg(value: &mut Value) -> Result<Self, Error> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(Error::type_mismatch("number", other)),
        }
    }
}

impl FromParam for Rc<Pair> {
    fn from_arg(value: &mut Value) -> Result<Self, Error> {
        match value {
            Value::Pair(pair) => Ok(Rc::clone(pair)),
            other => Err(Error::type_mismatch("pair", other)),
        }
    }
}

impl FromParam for Rc<str> {
    fn from_arg(value: &mut Value) -> Result<Self, Error> {
        match value {
            Value::Text(text) => Ok(Rc::clone(text)),
            other => Err(Error::type_mismatch("text", other)),
        }
    }
}

impl FromParam for Symbol {
    fn from_arg(value: &mut Value) -> Result<Self, Error> {
        match value {
            Value::Symbol(symbol) => Ok(symbol.clone()),
            other => Err(Error::type_mismatch("symbol", other)),
        }
    }
}

// =====================================================================
// Result conversion
// =====================================================================

/// Converts a builtin's Rust return value back into a `Value`.
///
/// `bool` becomes the interned `#t`/`#f` symbol of the calling interpreter.
pub trait IntoValueResult {
    fn into_value_result(self, interp: &Interpreter) -> Result<Value, Error>;
}

impl IntoValueResult for Value {
    fn into_value_result(self, _interp: &Interpreter) -> Result<Value, Error> {
        Ok(self)
    }
}

impl IntoValueResult for NumberType {
    fn into_value_result(self, _interp: &Interpreter) -> Result<Value, Error> {
        Ok(Value::Number(self))
    }
}

impl IntoValueResult for bool {
    fn into_value_result(self, interp: &Interpreter) -> Result<Value, Error> {
        Ok(interp.boolean(self))
    }
}

impl IntoValueResult for Rc<str> {
    fn into_value_result(self, _interp: &Interpreter) -> Result<Value, Error> {
        Ok(Value::Text(self))
    }
}

impl IntoValueResult for Symbol {
    fn into_value_result(self, _interp: &Interpreter) -> Result<Value, Error> {
        Ok(Value::Symbol(self))
    }
}

impl<R: IntoValueResult> IntoValueResult for Result<R, Error> {
    fn into_value_result(self, interp: &Interpreter) -> Result<Value, Error> {
        self.and_then(|value| value.into_value_result(interp))
    }
}

// =====================================================================
// Fixed-arity adapters
// =====================================================================

/// Converts a strongly-typed Rust function or closure into the erased
/// [`OperationFn`], parameterized by its argument tuple type.
pub trait IntoOperation<Args> {
    /// Arity implied by the Rust signature
    const ARITY: Arity;

    fn into_operation(self) -> Rc<OperationFn>;
}

// 0-arg functions / closures
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoValueResult,
{
    const ARITY: Arity = Arity::Exact(0);

    fn into_operation(self) -> Rc<OperationFn> {
        Rc::new(move |interp: &Interpreter, args: &Value| {
            let len = args.list_len();
            if len != 0 {
                return Err(Error::arity_error(Arity::Exact(0), len));
            }
            (self)().into_value_result(interp)
        })
    }
}

/// Implements `IntoOperation` for one arity.
///
/// The argument list is collected into local slots, its length checked, and
/// each slot converted with `FromParam` before the builtin is invoked.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: Fn( $( $A ),+ ) -> R + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            const ARITY: Arity = Arity::Exact($arity);

            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |interp: &Interpreter, args: &Value| {
                    let mut slots: Vec<Value> = args.iter().collect();
                    let len = slots.len();
                    match slots.as_mut_slice() {
                        [ $( $v ),+ ] => {
                            $(
                                let $p = <$A as FromParam>::from_arg($v)?;
                            )+
                            (self)( $( $p ),+ ).into_value_result(interp)
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
impl_into_operation_for_arity!(4, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4);
