//! Special forms: operators that receive their argument forms unevaluated together
//! with the calling environment.
//!
//! Each form returns a [`Step`]. Forms whose result is the value of a sub-expression
//! (`begin`, `if`, `cond`, `let`) return `Step::Continue` for it so the evaluator
//! keeps tail calls flat.

use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::{Closure, ListBuilder, Value};
use crate::evaluator::{Arity, Environment, Interpreter, Step};
use crate::symbols::Symbol;

/// Split a non-empty argument list into its first form and the remaining forms
fn split_first(args: &Value, form: &str) -> Result<(Value, Value), Error> {
    match args {
        Value::Pair(pair) => Ok((pair.car().clone(), pair.cdr())),
        _ => Err(Error::EvalError(format!("{form}: missing operand"))),
    }
}

/// Build a closure from a parameter list form and the body forms
fn make_closure(params: &Value, body: Value, env: &Environment) -> Result<Value, Error> {
    if !params.is_proper_list() {
        return Err(Error::TypeMismatch(format!(
            "Lambda parameters must be a list, got {params}"
        )));
    }

    let mut names: Vec<Symbol> = Vec::new();
    for param in params.iter() {
        match param {
            Value::Symbol(name) => {
                if names.contains(&name) {
                    return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
                }
                names.push(name);
            }
            other => {
                return Err(Error::TypeMismatch(format!(
                    "Lambda parameters must be symbols, got {other}"
                )));
            }
        }
    }

    Ok(Value::Closure(Rc::new(Closure {
        params: names,
        body,
        env: env.clone(),
    })))
}

/// `(begin form...)`
pub(crate) fn eval_begin(
    interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    interp.begin_step(args, env)
}

/// `(lambda (param...) body...)`
pub(crate) fn eval_lambda(
    _interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    let (params, body) = split_first(args, "lambda")?;
    make_closure(&params, body, env).map(Step::Return)
}

/// `(let ((name expr)...) body...)` is evaluated as
/// `((lambda (name...) body...) expr...)`.
pub(crate) fn eval_let(
    interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    let (bindings, body) = split_first(args, "let")?;
    if !bindings.is_proper_list() {
        return Err(Error::EvalError(format!(
            "let bindings must be a list, got {bindings}"
        )));
    }

    let mut names = ListBuilder::new();
    let mut inits = ListBuilder::new();
    for binding in bindings.iter() {
        match binding.iter().collect::<Vec<_>>().as_slice() {
            [name @ Value::Symbol(_), init] if binding.is_proper_list() => {
                names.push(name.clone());
                inits.push(init.clone());
            }
            _ => {
                return Err(Error::EvalError(format!("Malformed let binding: {binding}")));
            }
        }
    }

    let lambda = Value::cons(
        Value::Symbol(interp.lambda_symbol().clone()),
        Value::cons(names.finish(), body),
    );
    Ok(Step::Continue {
        expr: Value::cons(lambda, inits.finish()),
        env: env.clone(),
    })
}

/// `(define name expr)` or `(define (name param...) body...)`.
/// Binds in the calling frame and returns the bound symbol.
pub(crate) fn eval_define(
    interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    let (target, rest) = split_first(args, "define")?;
    match target {
        Value::Symbol(name) => {
            let got = args.list_len();
            if got != 2 {
                return Err(Error::arity_error_with_expr(Arity::Exact(2), got, "define"));
            }
            let (value_form, _) = split_first(&rest, "define")?;
            let value = interp.eval(&value_form, env)?;
            debug!(name = %name, "define");
            env.bind(name.clone(), value);
            Ok(Step::Return(Value::Symbol(name)))
        }
        Value::Pair(signature) => {
            let name = signature
                .car()
                .as_symbol()
                .cloned()
                .ok_or_else(|| Error::type_mismatch("procedure name symbol", signature.car()))?;
            let closure = make_closure(&signature.cdr(), rest, env)?;
            debug!(name = %name, "define procedure");
            env.bind(name.clone(), closure);
            Ok(Step::Return(Value::Symbol(name)))
        }
        other => Err(Error::type_mismatch("symbol or (name param...)", &other)),
    }
}

/// `(set! name expr)`: evaluates `expr` and binds it in the calling frame
pub(crate) fn eval_set(
    interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    let (target, rest) = split_first(args, "set!")?;
    let name = target
        .as_symbol()
        .cloned()
        .ok_or_else(|| Error::type_mismatch("symbol", &target))?;
    let (value_form, _) = split_first(&rest, "set!")?;
    let value = interp.eval(&value_form, env)?;
    debug!(name = %name, "set!");
    env.bind(name.clone(), value);
    Ok(Step::Return(Value::Symbol(name)))
}

/// `(cond (test form...)...)`: the first clause whose test is not `#f` wins
pub(crate) fn eval_cond(
    interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    for clause in args.iter() {
        let Value::Pair(clause) = clause else {
            return Err(Error::EvalError(format!("Malformed cond clause: {clause}")));
        };
        let test = interp.eval(clause.car(), env)?;
        if !interp.is_false(&test) {
            return interp.begin_step(&clause.cdr(), env);
        }
    }
    Ok(Step::Return(Value::Unspecified))
}

/// `(if test then else...)`: the else forms run `begin`-style
pub(crate) fn eval_if(
    interp: &Interpreter,
    args: &Value,
    env: &Environment,
) -> Result<Step, Error> {
    let (test, branches) = split_first(args, "if")?;
    let (then_form, else_forms) = split_first(&branches, "if")?;

    let test = interp.eval(&test, env)?;
    if interp.is_false(&test) {
        interp.begin_step(&else_forms, env)
    } else {
        Ok(Step::Continue {
            expr: then_form,
            env: env.clone(),
        })
    }
}
