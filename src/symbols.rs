//! Symbol interning.
//!
//! Every [`Symbol`] is created by a [`SymbolTable`], and a table hands out exactly one
//! symbol per distinct name. Symbols therefore compare and hash by identity: two symbols
//! are equal iff they came from the same table entry. Tables are owned by an
//! interpreter instance, so independent interpreters never share symbol identities.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// An interned symbol name
#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).cast::<u8>().hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only table mapping names to their unique [`Symbol`]
#[derive(Default)]
pub struct SymbolTable {
    symbols: FxHashMap<Rc<str>, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the symbol for `name`, registering it on first use.
    /// Lookup is by exact, case-sensitive string equality.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.symbols.get(name) {
            return symbol.clone();
        }

        let key: Rc<str> = Rc::from(name);
        let symbol = Symbol(Rc::clone(&key));
        self.symbols.insert(key, symbol.clone());
        symbol
    }

    /// Return the symbol for `name` only if it has already been interned
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("len", &self.symbols.len())
            .finish()
    }
}
