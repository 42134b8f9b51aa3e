use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::Value;
use crate::symbols::Symbol;

/// A lexical environment: one frame of bindings plus a link to the enclosing frame.
///
/// Environments are shared handles. Cloning one clones the handle, not the bindings,
/// so a closure that captures an environment observes later `define`s made in it.
#[derive(Clone, Default)]
pub struct Environment(Rc<Frame>);

#[derive(Default)]
struct Frame {
    bindings: RefCell<FxHashMap<Symbol, Value>>,
    parent: Option<Environment>,
}

impl Environment {
    /// Create a root (global) frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty frame whose lookups fall back to `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(FxHashMap::default()),
            parent: Some(parent.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Insert or overwrite `key` in this frame only
    pub fn bind(&self, key: Symbol, value: Value) {
        self.0.bindings.borrow_mut().insert(key, value);
    }

    /// Look `key` up in this frame only
    pub fn get(&self, key: &Symbol) -> Option<Value> {
        self.0.bindings.borrow().get(key).cloned()
    }

    /// Look `key` up in this frame, then each enclosing frame in turn
    pub fn find(&self, key: &Symbol) -> Option<Value> {
        let mut env = self;
        loop {
            if let Some(value) = env.get(key) {
                return Some(value);
            }
            env = env.parent()?;
        }
    }

    /// True if both handles refer to the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Get all bindings visible from this environment, inner frames shadowing
    /// outer ones, sorted by name
    pub fn get_all_bindings(&self) -> Vec<(Symbol, Value)> {
        let mut visible: FxHashMap<Symbol, Value> = FxHashMap::default();
        let mut env = Some(self);
        while let Some(current) = env {
            for (name, value) in current.0.bindings.borrow().iter() {
                visible
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            env = current.parent();
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        result
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut env = self.parent();
        while let Some(parent) = env {
            depth += 1;
            env = parent.parent();
        }
        f.debug_struct("Environment")
            .field("bindings", &self.0.bindings.borrow().len())
            .field("depth", &depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_bind_and_get_in_one_frame() {
        let mut table = SymbolTable::new();
        let x = table.intern("x");
        let env = Environment::new();

        assert_eq!(env.get(&x), None);
        env.bind(x.clone(), val(1));
        assert_eq!(env.get(&x), Some(val(1)));
        env.bind(x.clone(), val(2));
        assert_eq!(env.get(&x), Some(val(2)));
    }

    #[test]
    fn test_find_walks_parent_chain() {
        let mut table = SymbolTable::new();
        let (x, y, z) = (table.intern("x"), table.intern("y"), table.intern("z"));

        let global = Environment::new();
        global.bind(x.clone(), val(1));
        global.bind(y.clone(), val(2));

        let inner = Environment::with_parent(&global);
        inner.bind(y.clone(), val(20));

        assert_eq!(inner.find(&x), Some(val(1))); // inherited
        assert_eq!(inner.find(&y), Some(val(20))); // shadowed
        assert_eq!(global.find(&y), Some(val(2))); // outer untouched
        assert_eq!(inner.get(&x), None); // get does not search parents
        assert_eq!(inner.find(&z), None);
    }

    #[test]
    fn test_bind_never_touches_parent() {
        let mut table = SymbolTable::new();
        let x = table.intern("x");
        let global = Environment::new();
        global.bind(x.clone(), val(1));

        let inner = Environment::with_parent(&global);
        inner.bind(x.clone(), val(99));
        assert_eq!(global.get(&x), Some(val(1)));
    }

    #[test]
    fn test_clones_share_frame() {
        let mut table = SymbolTable::new();
        let x = table.intern("x");
        let env = Environment::new();
        let alias = env.clone();
        alias.bind(x.clone(), val(3));
        assert_eq!(env.get(&x), Some(val(3)));
        assert!(env.ptr_eq(&alias));
        assert!(!env.ptr_eq(&Environment::new()));
    }

    #[test]
    fn test_get_all_bindings_shadows_and_sorts() {
        let mut table = SymbolTable::new();
        let global = Environment::new();
        global.bind(table.intern("b"), val(1));
        global.bind(table.intern("a"), val(2));
        let inner = Environment::with_parent(&global);
        inner.bind(table.intern("b"), val(10));

        let bindings: Vec<(String, Value)> = inner
            .get_all_bindings()
            .into_iter()
            .map(|(name, value)| (name.name().to_owned(), value))
            .collect();
        assert_eq!(
            bindings,
            vec![("a".to_owned(), val(2)), ("b".to_owned(), val(10))]
        );
    }
}
