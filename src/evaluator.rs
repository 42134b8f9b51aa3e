use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Closure, ListBuilder, Value};
use crate::builtinops::{OpKind, builtin_ops};
use crate::scheme::{self, ReaderConfig};
use crate::stack::ensure_sufficient_stack;
use crate::symbols::{Symbol, SymbolTable};
use crate::{Error, MAX_EVAL_DEPTH};

mod environment;
pub mod intooperation;
pub(crate) mod special_forms;

pub use environment::Environment;
use intooperation::{IntoOperation, OperationFn};

/// Expected number of arguments for a procedure or special form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly N arguments
    Exact(usize),
    /// At least N arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid for this arity
    pub fn validate(self, got: usize) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::arity_error(self, got))
        }
    }

    pub fn accepts(self, got: usize) -> bool {
        match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Any => true,
        }
    }

    fn check(self, got: usize, callee: &str) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::arity_error_with_expr(self, got, callee))
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

/// Native signature of a special form: raw argument forms plus the calling environment
pub type SpecialFormFn = fn(&Interpreter, &Value, &Environment) -> Result<Step, Error>;

/// What a special form hands back to the evaluator.
///
/// `Continue` asks the evaluator to evaluate `expr` in `env` as the result of the
/// form, without growing the native stack (tail position).
#[derive(Debug)]
pub enum Step {
    Return(Value),
    Continue { expr: Value, env: Environment },
}

/// Interpreter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub reader: ReaderConfig,
    /// Maximum depth of nested (non-tail) evaluations
    pub max_eval_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            reader: ReaderConfig::default(),
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// One interpreter instance: its symbol table, its global environment and its limits.
///
/// Definitions made by [`Interpreter::run`] persist in the global environment, so a REPL
/// keeps a single instance alive across inputs. Independent instances share nothing.
pub struct Interpreter {
    symbols: RefCell<SymbolTable>,
    true_sym: Symbol,
    false_sym: Symbol,
    lambda_sym: Symbol,
    global: Environment,
    config: Config,
    depth: Cell<usize>,
}

/// Decrements the nesting counter when a nested evaluation finishes
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

const CONTEXT_MARKER: &str = "\n  Context: while evaluating: ";

/// Append the innermost failing expression to evaluation and type errors
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::EvalError(format!("{msg}{CONTEXT_MARKER}{expr}"))
        }
        Error::TypeMismatch(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeMismatch(format!("{msg}{CONTEXT_MARKER}{expr}"))
        }
        // Syntax, unbound symbol and arity errors carry their own context
        other => other,
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an interpreter with the default configuration and the standard library
    /// installed in its global environment
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut symbols = SymbolTable::new();
        let true_sym = symbols.intern("#t");
        let false_sym = symbols.intern("#f");
        let lambda_sym = symbols.intern("lambda");

        let interp = Interpreter {
            symbols: RefCell::new(symbols),
            true_sym,
            false_sym,
            lambda_sym,
            global: Environment::new(),
            config,
            depth: Cell::new(0),
        };
        interp.install_standard_library();
        interp
    }

    fn install_standard_library(&self) {
        for op in builtin_ops() {
            let name: Rc<str> = Rc::from(op.name);
            let value = match op.op_kind {
                OpKind::Procedure(func) => Value::Procedure {
                    name,
                    arity: op.arity,
                    func,
                },
                OpKind::SpecialForm(func) => Value::SpecialForm {
                    name,
                    arity: op.arity,
                    func,
                },
            };
            self.global.bind(self.intern(op.name), value);
        }

        // The boolean literals evaluate to themselves; `else` is simply true.
        let true_value = self.boolean(true);
        self.global.bind(self.true_sym.clone(), true_value.clone());
        self.global.bind(self.false_sym.clone(), self.boolean(false));
        self.global.bind(self.intern("else"), true_value);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The environment top-level forms are evaluated in
    pub fn global_env(&self) -> &Environment {
        &self.global
    }

    /// Intern `name` in this interpreter's symbol table
    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.borrow_mut().intern(name)
    }

    /// The `#t` or `#f` symbol
    pub fn boolean(&self, value: bool) -> Value {
        if value {
            Value::Symbol(self.true_sym.clone())
        } else {
            Value::Symbol(self.false_sym.clone())
        }
    }

    /// Only the `#f` symbol is false; every other value is true
    pub fn is_false(&self, value: &Value) -> bool {
        matches!(value, Value::Symbol(symbol) if *symbol == self.false_sym)
    }

    pub(crate) fn lambda_symbol(&self) -> &Symbol {
        &self.lambda_sym
    }

    /// Read `source` as one implicit `(begin ...)` program
    pub fn read(&self, source: &str) -> Result<Value, Error> {
        scheme::read(source, &mut self.symbols.borrow_mut(), &self.config.reader)
    }

    /// Read and evaluate `source` in the global environment, returning the value of
    /// the last top-level form
    pub fn run(&self, source: &str) -> Result<Value, Error> {
        debug!(bytes = source.len(), "run");
        let program = self.read(source)?;
        let result = self.eval(&program, &self.global);
        match &result {
            Ok(value) => debug!(result = %value, "run finished"),
            Err(err) => debug!(error = %err, "run failed"),
        }
        result
    }

    fn enter(&self) -> Result<DepthGuard<'_>, Error> {
        let depth = self.depth.get();
        if depth >= self.config.max_eval_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_eval_depth
            )));
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }

    /// Evaluate `expr` in `env`
    pub fn eval(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        let _guard = self.enter()?;
        ensure_sufficient_stack(|| self.eval_loop(expr.clone(), env.clone()))
    }

    // Tail positions hand back `Step::Continue`, so this loop replaces recursion there.
    fn eval_loop(&self, mut expr: Value, mut env: Environment) -> Result<Value, Error> {
        loop {
            let step = match &expr {
                Value::Number(_)
                | Value::Text(_)
                | Value::Procedure { .. }
                | Value::SpecialForm { .. }
                | Value::Closure(_)
                | Value::Unspecified => return Ok(expr.clone()),

                Value::Symbol(symbol) => {
                    return env
                        .find(symbol)
                        .ok_or_else(|| Error::UnboundSymbol(symbol.name().to_owned()));
                }

                Value::Nil => {
                    return Err(Error::EvalError("Cannot evaluate empty list".to_owned()));
                }

                Value::Pair(pair) => {
                    let args = pair.cdr();
                    self.eval(pair.car(), &env)
                        .and_then(|callee| self.apply_step(&callee, &args, &env))
                        .map_err(|err| add_context(err, &expr))?
                }
            };

            match step {
                Step::Return(value) => return Ok(value),
                Step::Continue {
                    expr: next,
                    env: next_env,
                } => {
                    expr = next;
                    env = next_env;
                }
            }
        }
    }

    /// Apply `callee` to the raw argument forms `args`, evaluated in `env` as needed
    pub fn apply(&self, callee: &Value, args: &Value, env: &Environment) -> Result<Value, Error> {
        let step = self.apply_step(callee, args, env)?;
        self.finish(step)
    }

    /// Run a `Step` to completion
    pub fn finish(&self, step: Step) -> Result<Value, Error> {
        match step {
            Step::Return(value) => Ok(value),
            Step::Continue { expr, env } => self.eval(&expr, &env),
        }
    }

    fn apply_step(&self, callee: &Value, args: &Value, env: &Environment) -> Result<Step, Error> {
        match callee {
            Value::Procedure { name, arity, func } => {
                let values = self.evlis(args, env)?;
                arity.check(values.list_len(), name)?;
                func(self, &values).map(Step::Return)
            }
            Value::Closure(closure) => {
                let values = self.evlis(args, env)?;
                let frame = self.bind_arguments(closure, &values)?;
                trace!(params = closure.params.len(), "apply closure");
                self.begin_step(&closure.body, &frame)
            }
            Value::SpecialForm { name, arity, func } => {
                arity.check(args.list_len(), name)?;
                trace!(form = %name, "special form");
                func(self, args, env)
            }
            other => Err(Error::TypeMismatch(format!(
                "Cannot apply non-procedure: {other}"
            ))),
        }
    }

    fn bind_arguments(&self, closure: &Closure, values: &Value) -> Result<Environment, Error> {
        let got = values.list_len();
        if got != closure.params.len() {
            return Err(Error::arity_error_with_expr(
                Arity::Exact(closure.params.len()),
                got,
                "#<closure>",
            ));
        }

        let frame = Environment::with_parent(&closure.env);
        for (param, value) in closure.params.iter().zip(values.iter()) {
            frame.bind(param.clone(), value);
        }
        Ok(frame)
    }

    /// Evaluate each argument form left to right into a new list
    pub fn evlis(&self, args: &Value, env: &Environment) -> Result<Value, Error> {
        let mut builder = ListBuilder::new();
        for arg in args.iter() {
            builder.push(self.eval(&arg, env)?);
        }
        Ok(builder.finish())
    }

    /// Evaluate all but the last of `forms`, handing the last back as a tail step.
    /// An empty sequence produces `Unspecified`.
    pub fn begin_step(&self, forms: &Value, env: &Environment) -> Result<Step, Error> {
        let mut forms = forms.iter();
        let Some(mut current) = forms.next() else {
            return Ok(Step::Return(Value::Unspecified));
        };
        for next in forms {
            self.eval(&current, env)?;
            current = next;
        }
        Ok(Step::Continue {
            expr: current,
            env: env.clone(),
        })
    }

    /// Register a procedure that works on the raw evaluated argument list.
    ///
    /// Arity is checked before `func` is called.
    ///
    /// ```
    /// use scmlite::{Interpreter, Value};
    ///
    /// let interp = Interpreter::new();
    /// interp.register_procedure("count-args", scmlite::evaluator::Arity::Any, |_, args| {
    ///     Ok(Value::Number(args.list_len() as f64))
    /// });
    /// assert_eq!(interp.run("(count-args 1 2 3)").unwrap(), Value::Number(3.0));
    /// ```
    pub fn register_procedure<F>(&self, name: &str, arity: Arity, func: F)
    where
        F: Fn(&Interpreter, &Value) -> Result<Value, Error> + 'static,
    {
        let func: Rc<OperationFn> = Rc::new(func);
        self.global.bind(
            self.intern(name),
            Value::Procedure {
                name: Rc::from(name),
                arity,
                func,
            },
        );
    }

    /// Register a strongly-typed Rust function as a procedure. Arguments are converted
    /// with [`FromParam`](intooperation::FromParam), the result with
    /// [`IntoValueResult`](intooperation::IntoValueResult), and the arity is taken from
    /// the signature.
    ///
    /// ```
    /// use scmlite::{Interpreter, Value};
    ///
    /// fn hypot(a: f64, b: f64) -> f64 {
    ///     a.hypot(b)
    /// }
    ///
    /// let interp = Interpreter::new();
    /// interp.register_builtin_operation::<(f64, f64), _>("hypot", hypot);
    /// assert_eq!(interp.run("(hypot 3 4)").unwrap(), Value::Number(5.0));
    /// ```
    pub fn register_builtin_operation<Args, F>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.global.bind(
            self.intern(name),
            Value::Procedure {
                name: Rc::from(name),
                arity: <F as IntoOperation<Args>>::ARITY,
                func: func.into_operation(),
            },
        );
    }

    /// Register a special form. It receives its argument forms unevaluated together with
    /// the calling environment.
    pub fn register_special_form(&self, name: &str, arity: Arity, func: SpecialFormFn) {
        self.global.bind(
            self.intern(name),
            Value::SpecialForm {
                name: Rc::from(name),
                arity,
                func,
            },
        );
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("symbols", &self.symbols.borrow().len())
            .field("global", &self.global)
            .field("config", &self.config)
            .finish()
    }
}
