//! Provide a string interner shared by the scanners through the `symbol-table` property.

use std::{cell::RefCell, collections::HashSet, rc::Rc};

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: RefCell<HashSet<Rc<str>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the unique shared instance of `symbol`, adding it on first use.
    pub fn add_symbol(&self, symbol: &str) -> Rc<str> {
        let mut symbols = self.symbols.borrow_mut();
        if let Some(found) = symbols.get(symbol) {
            return found.clone();
        }
        let new: Rc<str> = Rc::from(symbol);
        symbols.insert(new.clone());
        new
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.borrow().contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_symbol_test() {
        let table = SymbolTable::new();
        let a = table.add_symbol("elem");
        let b = table.add_symbol("elem");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
        assert!(table.contains("elem"));
        assert!(!table.contains("other"));
    }
}
