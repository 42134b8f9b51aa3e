//! This module defines the value model shared by the reader and the evaluator.
//! Code and data have one representation: [`Value`] covers numbers, text, interned
//! symbols, cons cells and the empty list, the three kinds of callables and the
//! "no value" marker. Lists are singly-linked chains of [`Pair`] cells built in linear
//! time with [`ListBuilder`]. The `Display` impl is the canonical printer; equality is
//! structural for data and by identity for closures.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::evaluator::intooperation::OperationFn;
use crate::evaluator::{Arity, Environment, SpecialFormFn};
use crate::symbols::Symbol;

/// Type alias for number values in the interpreter
pub type NumberType = f64;

/// Core value type
#[derive(Clone)]
pub enum Value {
    /// Numbers (one floating representation, no integer/float distinction)
    Number(NumberType),
    /// Text literals, stored without their surrounding quotes
    Text(Rc<str>),
    /// Interned symbols; `#t` and `#f` are symbols too
    Symbol(Symbol),
    /// A cons cell
    Pair(Rc<Pair>),
    /// The empty list, terminating every proper list
    Nil,
    /// Built-in procedure: receives its arguments already evaluated
    Procedure {
        name: Rc<str>,
        arity: Arity,
        func: Rc<OperationFn>,
    },
    /// Built-in special form: receives raw argument forms and the calling environment
    SpecialForm {
        name: Rc<str>,
        arity: Arity,
        func: SpecialFormFn,
    },
    /// User-defined procedure closing over its defining environment
    Closure(Rc<Closure>),
    /// No value was produced (empty `begin`, unmatched `cond`, ...)
    /// Never equal to anything, itself included.
    Unspecified,
}

/// A cons cell. The head is fixed at construction; the tail slot is filled in by
/// [`ListBuilder`] while a list is being built.
pub struct Pair {
    car: Value,
    cdr: RefCell<Value>,
}

impl Pair {
    pub fn new(car: Value, cdr: Value) -> Self {
        Pair {
            car,
            cdr: RefCell::new(cdr),
        }
    }

    pub fn car(&self) -> &Value {
        &self.car
    }

    pub fn cdr(&self) -> Value {
        self.cdr.borrow().clone()
    }

    fn set_cdr(&self, value: Value) {
        *self.cdr.borrow_mut() = value;
    }
}

// Uniquely owned children are unlinked onto a worklist, so dropping deeply nested
// data does not recurse per cell along either the head or the tail.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(cell) = pending.pop() {
            if let Ok(mut pair) = Rc::try_unwrap(cell) {
                pair.detach_children(&mut pending);
            }
        }
    }
}

impl Pair {
    fn detach_children(&mut self, pending: &mut Vec<Rc<Pair>>) {
        for slot in [&mut self.car, self.cdr.get_mut()] {
            if let Value::Pair(_) = slot {
                if let Value::Pair(cell) = std::mem::replace(slot, Value::Nil) {
                    pending.push(cell);
                }
            }
        }
    }
}

/// A user-defined procedure
pub struct Closure {
    pub params: Vec<Symbol>,
    /// Body forms as a list, evaluated `begin`-style
    pub body: Value,
    /// The environment active where the `lambda` was evaluated
    pub env: Environment,
}

/// Builds a proper list front to back while keeping a handle on the last cell,
/// so each push is O(1).
#[derive(Default)]
pub struct ListBuilder {
    head: Option<Rc<Pair>>,
    tail: Option<Rc<Pair>>,
}

impl ListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) {
        let cell = Rc::new(Pair::new(value, Value::Nil));
        match &self.tail {
            Some(tail) => tail.set_cdr(Value::Pair(Rc::clone(&cell))),
            None => self.head = Some(Rc::clone(&cell)),
        }
        self.tail = Some(cell);
    }

    /// Finish the list, ending it with `Nil` (or returning `Nil` if nothing was pushed)
    pub fn finish(self) -> Value {
        self.finish_with(Value::Nil)
    }

    /// Finish the list with an explicit final tail, e.g. to splice an existing list
    pub fn finish_with(self, last: Value) -> Value {
        match (self.head, self.tail) {
            (Some(head), Some(tail)) => {
                tail.set_cdr(last);
                Value::Pair(head)
            }
            _ => last,
        }
    }
}

impl FromIterator<Value> for ListBuilder {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut builder = ListBuilder::new();
        for value in iter {
            builder.push(value);
        }
        builder
    }
}

/// Iterator over the elements of a list. Stops at the first tail that is not a Pair,
/// so an improper tail is not yielded.
pub struct ListIter {
    next: Value,
}

impl Iterator for ListIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match std::mem::replace(&mut self.next, Value::Nil) {
            Value::Pair(pair) => {
                self.next = pair.cdr();
                Some(pair.car().clone())
            }
            _ => None,
        }
    }
}

impl Value {
    /// Build a proper list from the given elements
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        items.into_iter().collect::<ListBuilder>().finish()
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair::new(car, cdr)))
    }

    pub fn text(content: &str) -> Value {
        Value::Text(Rc::from(content))
    }

    /// Iterate the elements of a list (empty for non-lists)
    pub fn iter(&self) -> ListIter {
        ListIter { next: self.clone() }
    }

    /// Number of elements before the first non-Pair tail
    pub fn list_len(&self) -> usize {
        self.iter().count()
    }

    /// True for `Nil` and for Pair chains that end in `Nil`
    pub fn is_proper_list(&self) -> bool {
        let mut current = self.clone();
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(pair) => current = pair.cdr(),
                _ => return false,
            }
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_pair(&self) -> Option<&Rc<Pair>> {
        match self {
            Value::Pair(pair) => Some(pair),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    /// Short variant name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Symbol(_) => "symbol",
            Value::Pair(_) => "pair",
            Value::Nil => "empty list",
            Value::Procedure { .. } => "procedure",
            Value::SpecialForm { .. } => "special form",
            Value::Closure(_) => "closure",
            Value::Unspecified => "unspecified",
        }
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(NumberType::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Text(s)
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Value::Symbol(symbol)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into))
    }
}

/// Helper for building values in tests
#[cfg(test)]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Pair(_) => {
                write!(f, "List(")?;
                let mut current = self.clone();
                let mut first = true;
                loop {
                    match current {
                        Value::Pair(pair) => {
                            if !first {
                                write!(f, ", ")?;
                            }
                            write!(f, "{:?}", pair.car())?;
                            first = false;
                            current = pair.cdr();
                        }
                        Value::Nil => break,
                        tail => {
                            write!(f, " . {tail:?}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Nil => write!(f, "Nil"),
            Value::Procedure { name, .. } => write!(f, "Procedure({name})"),
            Value::SpecialForm { name, .. } => write!(f, "SpecialForm({name})"),
            // The captured environment is omitted: it may contain this closure.
            Value::Closure(closure) => {
                write!(
                    f,
                    "Closure(params={:?}, body={:?})",
                    closure.params, closure.body
                )
            }
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// Pending printer work
enum Print {
    /// An element to print in full
    Value(Value),
    /// What follows a list element: more elements, `)`, or ` . tail)`
    Tail(Value),
    Close,
}

// The printer keeps its own stack, so nesting depth is bounded by memory, not the native stack.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Print::Value(self.clone())];
        while let Some(task) = pending.pop() {
            match task {
                Print::Value(value) => match value {
                    Value::Number(n) => write!(f, "{n}")?,
                    Value::Text(s) => write!(f, "{s}")?,
                    Value::Symbol(s) => write!(f, "{s}")?,
                    Value::Pair(pair) => {
                        f.write_str("(")?;
                        pending.push(Print::Tail(pair.cdr()));
                        pending.push(Print::Value(pair.car().clone()));
                    }
                    Value::Nil => f.write_str("()")?,
                    Value::Procedure { name, .. } => write!(f, "#<procedure:{name}>")?,
                    Value::SpecialForm { name, .. } => write!(f, "#<special-form:{name}>")?,
                    Value::Closure(_) => f.write_str("#<closure>")?,
                    Value::Unspecified => f.write_str("#<unspecified>")?,
                },
                Print::Tail(Value::Pair(pair)) => {
                    f.write_str(" ")?;
                    pending.push(Print::Tail(pair.cdr()));
                    pending.push(Print::Value(pair.car().clone()));
                }
                Print::Tail(Value::Nil) | Print::Close => f.write_str(")")?,
                Print::Tail(tail) => {
                    f.write_str(" . ")?;
                    pending.push(Print::Close);
                    pending.push(Print::Value(tail));
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        // Cell pairs still to visit; children that are not both pairs are compared on the spot
        let mut pending = Vec::new();
        if !shallow_eq(self, other, &mut pending) {
            return false;
        }
        while let Some((a, b)) = pending.pop() {
            if !shallow_eq(a.car(), b.car(), &mut pending)
                || !shallow_eq(&a.cdr(), &b.cdr(), &mut pending)
            {
                return false;
            }
        }
        true
    }
}

fn shallow_eq(a: &Value, b: &Value, pending: &mut Vec<(Rc<Pair>, Rc<Pair>)>) -> bool {
    match (a, b) {
        (Value::Pair(a), Value::Pair(b)) => {
            if !Rc::ptr_eq(a, b) {
                pending.push((Rc::clone(a), Rc::clone(b)));
            }
            true
        }
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Symbol(a), Value::Symbol(b)) => a == b,
        (Value::Nil, Value::Nil) => true,
        // Built-ins compare by registered name, not function pointer
        (Value::Procedure { name: a, .. }, Value::Procedure { name: b, .. })
        | (Value::SpecialForm { name: a, .. }, Value::SpecialForm { name: b, .. }) => a == b,
        (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
        // Unspecified included: it never equals anything
        _ => false,
    }
}
