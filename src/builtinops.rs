//! Built-in operations registry.
//!
//! Every global binding the interpreter starts with comes from [`builtin_ops`]:
//!
//! ```scheme
//! (car (cons 1 2))   ; procedures: arguments are evaluated first
//! (if (< 1 2) 3 4)   ; special forms: arguments are handed over unevaluated
//! ```
//!
//! ## Procedures vs Special Forms
//!
//! - **Procedures**: Evaluate all arguments before application (e.g., `+`, `car`, `eq?`)
//! - **Special Forms**: Control evaluation of arguments (e.g., `if`, `cond`, `define`)
//!
//! ## Error Handling
//!
//! - **Type Safety**: operands of the wrong variant are rejected (`(+ 1 "a")` errors)
//! - **Arity Checking**: every procedure takes a fixed number of arguments
//! - **Division**: `/` is real division; dividing by zero is an error
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** as a plain typed Rust function, e.g.
//!    `fn builtin_abs(n: NumberType) -> NumberType`
//! 2. **Add it to `builtin_ops`** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::fmt;
use std::rc::Rc;

use tracing::info;

use crate::Error;
use crate::ast::{NumberType, Pair, Value};
use crate::evaluator::intooperation::{IntoOperation, OperationFn};
use crate::evaluator::special_forms::{
    eval_begin, eval_cond, eval_define, eval_if, eval_lambda, eval_let, eval_set,
};
use crate::evaluator::{Arity, SpecialFormFn};

/// Represents the implementation of a built-in operation (procedure or special form)
#[derive(Clone)]
pub enum OpKind {
    /// Receives its arguments already evaluated
    Procedure(Rc<OperationFn>),
    /// Receives the raw argument forms and the calling environment
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Procedure(_) => write!(f, "Procedure(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name the operation is bound to in the global environment
    pub name: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Builtin Procedure Implementations
//

// Generates a two-operand numeric procedure
macro_rules! numeric_binary {
    ($name:ident, $op:tt, $result:ty) => {
        fn $name(a: NumberType, b: NumberType) -> $result {
            a $op b
        }
    };
}

numeric_binary!(builtin_add, +, NumberType);
numeric_binary!(builtin_sub, -, NumberType);
numeric_binary!(builtin_mul, *, NumberType);
numeric_binary!(builtin_lt, <, bool);
numeric_binary!(builtin_gt, >, bool);

fn builtin_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0.0 {
        return Err(Error::EvalError("Division by zero".into()));
    }
    Ok(a / b)
}

fn builtin_abs(n: NumberType) -> NumberType {
    n.abs()
}

fn builtin_car(pair: Rc<Pair>) -> Value {
    pair.car().clone()
}

fn builtin_cdr(pair: Rc<Pair>) -> Value {
    pair.cdr()
}

fn builtin_cons(car: Value, cdr: Value) -> Value {
    Value::cons(car, cdr)
}

fn builtin_is_atom(value: Value) -> bool {
    !matches!(value, Value::Pair(_))
}

// Only numbers are comparable; every other combination is #f
fn builtin_eq(first: Value, second: Value) -> bool {
    match (first, second) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => false,
    }
}

fn builtin_display(value: Value) -> Value {
    info!(value = %value, "display");
    value
}

/// Every built-in operation, in registration order.
///
/// Procedures are wired through the same typed adapter layer hosts use with
/// [`Interpreter::register_builtin_operation`](crate::Interpreter::register_builtin_operation).
/// The list is rebuilt per call because `Rc` handles cannot live in a shared static.
pub fn builtin_ops() -> Vec<BuiltinOp> {
    fn procedure<Args, F>(name: &'static str, f: F) -> BuiltinOp
    where
        F: IntoOperation<Args>,
    {
        BuiltinOp {
            name,
            arity: <F as IntoOperation<Args>>::ARITY,
            op_kind: OpKind::Procedure(f.into_operation()),
        }
    }

    fn special_form(name: &'static str, arity: Arity, f: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::SpecialForm(f),
            arity,
        }
    }

    vec![
        // List operations
        procedure::<(Rc<Pair>,), _>("car", builtin_car),
        procedure::<(Rc<Pair>,), _>("cdr", builtin_cdr),
        procedure::<(Value, Value), _>("cons", builtin_cons),
        // Predicates and comparison
        procedure::<(Value,), _>("atom?", builtin_is_atom),
        procedure::<(Value, Value), _>("eq?", builtin_eq),
        procedure::<(NumberType, NumberType), _>("<", builtin_lt),
        procedure::<(NumberType, NumberType), _>(">", builtin_gt),
        // Arithmetic
        procedure::<(NumberType, NumberType), _>("+", builtin_add),
        procedure::<(NumberType, NumberType), _>("-", builtin_sub),
        procedure::<(NumberType, NumberType), _>("*", builtin_mul),
        procedure::<(NumberType, NumberType), _>("/", builtin_div),
        procedure::<(NumberType,), _>("abs", builtin_abs),
        // Output
        procedure::<(Value,), _>("display", builtin_display),
        // Special forms
        special_form("begin", Arity::Any, eval_begin),
        special_form("lambda", Arity::AtLeast(1), eval_lambda),
        special_form("let", Arity::AtLeast(1), eval_let),
        special_form("define", Arity::AtLeast(1), eval_define),
        special_form("set!", Arity::Exact(2), eval_set),
        special_form("cond", Arity::Any, eval_cond),
        special_form("if", Arity::AtLeast(2), eval_if),
    ]
}

/// Find a builtin operation by name
pub fn find_op(name: &str) -> Option<BuiltinOp> {
    builtin_ops().into_iter().find(|op| op.name == name)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::Interpreter;
    use crate::ast::val;

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a builtin through the registry using the erased signature
    fn call_builtin(interp: &Interpreter, name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_op(name).unwrap();
        match &op.op_kind {
            OpKind::Procedure(func) => func(interp, &Value::list(args.iter().cloned())),
            OpKind::SpecialForm(_) => {
                panic!("expected procedure builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let car = find_op("car").unwrap();
        assert_eq!(car.arity, Arity::Exact(1));
        assert!(!car.is_special_form());

        let if_op = find_op("if").unwrap();
        assert!(if_op.is_special_form());
        assert_eq!(if_op.arity, Arity::AtLeast(2));
        assert_eq!(find_op("define").unwrap().arity, Arity::AtLeast(1));

        assert!(find_op("unknown").is_none());

        let names: Vec<&str> = builtin_ops().iter().map(|op| op.name).collect();
        for expected in [
            "car", "cdr", "cons", "atom?", "eq?", "<", ">", "+", "-", "*", "/", "abs",
            "display", "begin", "lambda", "let", "define", "set!", "cond", "if",
        ] {
            assert!(names.contains(&expected), "missing builtin {expected}");
        }
        assert_eq!(names.len(), 20);
    }

    #[test]
    fn test_builtin_procedure_implementations() {
        let interp = Interpreter::new();
        let t = Some(interp.boolean(true));
        let f = Some(interp.boolean(false));
        let pair = Value::cons(val(1), val(2));
        let list = Value::list(vec![val(1), val(2), val(3)]);

        let test_cases: Vec<(&str, Vec<Value>, Option<Value>)> = vec![
            // Arithmetic
            ("+", vec![val(2), val(3)], success(5)),
            ("+", vec![val(0.5), val(0.25)], success(0.75)),
            ("-", vec![val(10), val(3)], success(7)),
            ("-", vec![val(3), val(10)], success(-7)),
            ("*", vec![val(-2), val(3)], success(-6)),
            ("/", vec![val(7), val(2)], success(3.5)),
            ("/", vec![val(1), val(0)], None),
            ("abs", vec![val(-5)], success(5)),
            ("abs", vec![val(2.5)], success(2.5)),
            ("+", vec![val("x"), val(1)], None),
            ("+", vec![val(1)], None),
            ("abs", vec![Value::Nil], None),
            // Comparison
            ("<", vec![val(1), val(2)], t.clone()),
            ("<", vec![val(2), val(2)], f.clone()),
            (">", vec![val(3), val(-1)], t.clone()),
            (">", vec![val("a"), val(1)], None),
            ("eq?", vec![val(4), val(4.0)], t.clone()),
            ("eq?", vec![val(4), val(5)], f.clone()),
            ("eq?", vec![val("a"), val("a")], f.clone()),
            ("eq?", vec![Value::Nil, Value::Nil], f.clone()),
            ("eq?", vec![val(1)], None),
            // Lists
            ("car", vec![pair.clone()], success(1)),
            ("cdr", vec![pair.clone()], success(2)),
            ("car", vec![list.clone()], success(1)),
            ("cdr", vec![list.clone()], Some(Value::list(vec![val(2), val(3)]))),
            ("car", vec![Value::Nil], None),
            ("cdr", vec![val(5)], None),
            ("cons", vec![val(1), Value::Nil], Some(Value::list(vec![val(1)]))),
            ("cons", vec![val(1), val(2)], Some(pair.clone())),
            ("atom?", vec![val(1)], t.clone()),
            ("atom?", vec![Value::Nil], t.clone()),
            ("atom?", vec![pair.clone()], f.clone()),
            // Output returns its argument
            ("display", vec![val("hi")], success("hi")),
            ("display", vec![list.clone()], Some(list.clone())),
        ];

        for (i, (name, args, expected)) in test_cases.into_iter().enumerate() {
            let result = call_builtin(&interp, name, &args);
            match (result, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "case #{} ({name} {args:?})", i + 1);
                }
                (Err(_), None) => {}
                (Ok(actual), None) => {
                    panic!("case #{} ({name} {args:?}): expected error, got {actual:?}", i + 1)
                }
                (Err(err), Some(expected)) => panic!(
                    "case #{} ({name} {args:?}): expected {expected:?}, got error {err}",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_builtin_error_kinds() {
        let interp = Interpreter::new();

        let err = call_builtin(&interp, "/", &[val(1), val(0)]).unwrap_err();
        assert_eq!(err, Error::EvalError("Division by zero".into()));

        let err = call_builtin(&interp, "car", &[val(3)]).unwrap_err();
        assert_eq!(err, Error::TypeMismatch("expected pair, got 3".into()));

        let err = call_builtin(&interp, "cons", &[val(3)]).unwrap_err();
        assert!(matches!(
            err,
            Error::ArityMismatch {
                expected: Arity::Exact(2),
                got: 1,
                ..
            }
        ));
    }
}
