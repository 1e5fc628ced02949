//! Lexically scoped symbol storage.
//!
//! Tables form a tree through parent links. Lookups stay local; a name
//! ascends to the parent only when the parent lists it in `globals`, so
//! the built-in registry and explicitly global bindings are visible to
//! child scopes while ordinary locals are not.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::value::Value;

pub type SymbolTableRef = Rc<RefCell<SymbolTable>>;

#[derive(Debug, Default)]
pub struct SymbolTable {
    pub symbols: HashMap<String, Value>,
    pub globals: HashSet<String>,
    pub parent: Option<SymbolTableRef>,
}

impl SymbolTable {
    pub fn new() -> SymbolTableRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_parent(parent: &SymbolTableRef) -> SymbolTableRef {
        Rc::new(RefCell::new(Self {
            symbols: HashMap::new(),
            globals: HashSet::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Look a name up locally, ascending to the parent only for names
    /// the parent declares global. Returns a binding copy.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.symbols.get(name) {
            return Some(value.clone());
        }
        if let Some(parent) = &self.parent {
            let parent = parent.borrow();
            if parent.globals.contains(name) {
                return parent.get(name);
            }
        }
        None
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.symbols.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.symbols.remove(name);
    }
}

/// Walk the table chain the same way `get` does and return the table
/// that actually holds `name`, for in-place mutation.
pub fn owning_table(table: &SymbolTableRef, name: &str) -> Option<SymbolTableRef> {
    if table.borrow().symbols.contains_key(name) {
        return Some(Rc::clone(table));
    }
    let parent = table.borrow().parent.clone();
    if let Some(parent) = parent {
        if parent.borrow().globals.contains(name) {
            return owning_table(&parent, name);
        }
    }
    None
}

/// An execution context: a display name for tracebacks, the active
/// symbol table, and a link to the context that entered this one.
/// Display names beginning with `struct` mark struct scopes.
#[derive(Debug, Clone)]
pub struct Context {
    pub display_name: String,
    pub table: SymbolTableRef,
    pub parent: Option<Rc<Context>>,
}

impl Context {
    pub fn new(display_name: &str, table: SymbolTableRef) -> Self {
        Self {
            display_name: display_name.to_string(),
            table,
            parent: None,
        }
    }

    pub fn child(&self, display_name: &str, table: SymbolTableRef) -> Self {
        Self {
            display_name: display_name.to_string(),
            table,
            parent: Some(Rc::new(self.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_local_by_default() {
        let parent = SymbolTable::new();
        parent.borrow_mut().set("a", Value::int(1));

        let child = SymbolTable::with_parent(&parent);
        assert!(child.borrow().get("a").is_none());
    }

    #[test]
    fn test_get_ascends_for_globals() {
        let parent = SymbolTable::new();
        parent.borrow_mut().set("a", Value::int(1));
        parent.borrow_mut().globals.insert("a".to_string());

        let child = SymbolTable::with_parent(&parent);
        let value = child.borrow().get("a").unwrap();
        assert!(value.strict_eq(&Value::int(1)));
    }

    #[test]
    fn test_set_writes_locally() {
        let parent = SymbolTable::new();
        parent.borrow_mut().set("a", Value::int(1));
        parent.borrow_mut().globals.insert("a".to_string());

        let child = SymbolTable::with_parent(&parent);
        child.borrow_mut().set("a", Value::int(2));

        assert!(parent.borrow().get("a").unwrap().strict_eq(&Value::int(1)));
        assert!(child.borrow().get("a").unwrap().strict_eq(&Value::int(2)));
    }

    #[test]
    fn test_owning_table_finds_global_home() {
        let parent = SymbolTable::new();
        parent.borrow_mut().set("a", Value::int(1));
        parent.borrow_mut().globals.insert("a".to_string());

        let child = SymbolTable::with_parent(&parent);
        let owner = owning_table(&child, "a").unwrap();
        assert!(Rc::ptr_eq(&owner, &parent));
        assert!(owning_table(&child, "missing").is_none());
    }
}
