//! Provide the per-parse validation state shared by the DTD stages, and the grammar pool.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::dtd::DtdGrammar;

/// Identifies a DTD grammar in a pool: the root element type and the external subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DtdGrammarDescription {
    pub root_element: String,
    pub public_id: Option<String>,
    pub expanded_system_id: Option<String>,
}

/// A cache of grammars that outlives a single parse.
#[doc(alias = "XMLGrammarPool")]
pub trait XmlGrammarPool {
    fn retrieve_grammar(&self, description: &DtdGrammarDescription) -> Option<Rc<DtdGrammar>>;
    fn cache_grammar(&mut self, description: DtdGrammarDescription, grammar: Rc<DtdGrammar>);
}

#[derive(Debug, Default)]
pub struct InMemoryGrammarPool {
    grammars: HashMap<DtdGrammarDescription, Rc<DtdGrammar>>,
}

impl InMemoryGrammarPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

impl XmlGrammarPool for InMemoryGrammarPool {
    fn retrieve_grammar(&self, description: &DtdGrammarDescription) -> Option<Rc<DtdGrammar>> {
        self.grammars.get(description).cloned()
    }

    fn cache_grammar(&mut self, description: DtdGrammarDescription, grammar: Rc<DtdGrammar>) {
        self.grammars.entry(description).or_insert(grammar);
    }
}

#[derive(Default)]
pub struct ValidationManager {
    grammar: Option<Rc<DtdGrammar>>,
    description: Option<DtdGrammarDescription>,
    cached_dtd: bool,
    standalone: bool,
    pool: Option<Rc<RefCell<dyn XmlGrammarPool>>>,
}

impl ValidationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything learned from the previous document. The grammar pool stays.
    pub fn reset(&mut self) {
        self.grammar = None;
        self.description = None;
        self.cached_dtd = false;
        self.standalone = false;
    }

    pub fn set_grammar_pool(&mut self, pool: Option<Rc<RefCell<dyn XmlGrammarPool>>>) {
        self.pool = pool;
    }

    pub fn grammar_pool(&self) -> Option<&Rc<RefCell<dyn XmlGrammarPool>>> {
        self.pool.as_ref()
    }

    pub fn set_grammar(&mut self, grammar: Rc<DtdGrammar>) {
        self.grammar = Some(grammar);
    }

    pub fn grammar(&self) -> Option<&Rc<DtdGrammar>> {
        self.grammar.as_ref()
    }

    pub fn is_grammar_found(&self) -> bool {
        self.grammar.is_some()
    }

    /// Record the grammar the DTD being read may be cached under.
    pub fn set_description(&mut self, description: Option<DtdGrammarDescription>) {
        self.description = description;
    }

    pub fn description(&self) -> Option<&DtdGrammarDescription> {
        self.description.as_ref()
    }

    /// Look `description` up in the pool and adopt the grammar found.
    pub fn use_cached_grammar(&mut self, description: &DtdGrammarDescription) -> bool {
        let cached = self
            .pool
            .as_ref()
            .and_then(|pool| pool.borrow().retrieve_grammar(description));
        match cached {
            Some(grammar) => {
                self.grammar = Some(grammar);
                self.cached_dtd = true;
                true
            }
            None => false,
        }
    }

    pub fn set_cached_dtd(&mut self, cached: bool) {
        self.cached_dtd = cached;
    }

    /// Whether the grammar of the current document came from the pool.
    pub fn is_cached_dtd(&self) -> bool {
        self.cached_dtd
    }

    pub fn set_standalone(&mut self, standalone: bool) {
        self.standalone = standalone;
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_grammar_test() {
        let pool = Rc::new(RefCell::new(InMemoryGrammarPool::new()));
        let description = DtdGrammarDescription {
            root_element: "doc".to_owned(),
            public_id: None,
            expanded_system_id: Some("doc.dtd".to_owned()),
        };
        let mut manager = ValidationManager::new();
        manager.set_grammar_pool(Some(pool.clone()));
        assert!(!manager.use_cached_grammar(&description));
        pool.borrow_mut()
            .cache_grammar(description.clone(), Rc::new(DtdGrammar::new()));
        assert!(manager.use_cached_grammar(&description));
        assert!(manager.is_cached_dtd());
        manager.reset();
        assert!(!manager.is_grammar_found());
        assert!(manager.grammar_pool().is_some());
    }
}
