//! Provide the DTD processor and the standalone DTD loader.
//!
//! The processor sits between the DTD scanner and the DTD handlers. It checks the
//! declarations for validity constraints a DTD imposes on itself, builds the
//! [`DtdGrammar`] of the document, and hands it to the validation manager when the DTD
//! ends, so that the validator finds it at the root element.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use tracing::debug;

use crate::{
    component::{Component, ComponentId, XmlComponent, XmlComponentManager, XmlProperty},
    constants::{
        ENTITY_MANAGER, ERROR_REPORTER, PARSER_SETTINGS, SYMBOL_TABLE, VALIDATION,
        WARN_ON_DUPLICATE_ATTDEF, WARN_ON_UNDECLARED_ELEMDEF, XmlVersion,
    },
    dtd::{AttType, DtdGrammar, XmlDtdScanner},
    entity::XmlEntityManager,
    error::{XmlConfigurationError, XmlErrorCode, XniError},
    pipeline::{DtdNext, PipelineContext},
    registry::{ComponentRegistry, ComponentSet},
    reporter::XmlErrorReporter,
    settings::BasicRules,
    symbols::SymbolTable,
    validation::ValidationManager,
    xni::{Augmentations, DtdEvent, XmlInputSource},
};

/// The version-specific rules a DTD processor applies.
#[doc(alias = "XML11DTDProcessor")]
pub trait DtdVersionStrategy {
    fn version(&self) -> XmlVersion;

    fn is_valid_name(&self, name: &str) -> bool;

    fn is_valid_nmtoken(&self, token: &str) -> bool;

    /// A DTD scanner reading this version.
    fn create_dtd_scanner(&self) -> XmlDtdScanner;
}

impl DtdVersionStrategy for XmlVersion {
    fn version(&self) -> XmlVersion {
        *self
    }

    fn is_valid_name(&self, name: &str) -> bool {
        XmlVersion::is_valid_name(self, name)
    }

    fn is_valid_nmtoken(&self, token: &str) -> bool {
        XmlVersion::is_valid_nmtoken(self, token)
    }

    fn create_dtd_scanner(&self) -> XmlDtdScanner {
        XmlDtdScanner::new(*self)
    }
}

#[doc(alias = "XMLDTDProcessor")]
pub struct XmlDtdProcessor {
    strategy: Box<dyn DtdVersionStrategy>,
    validation: bool,
    warn_duplicate_attdef: bool,
    warn_undeclared_elemdef: bool,
    configured: bool,

    grammar: Option<DtdGrammar>,
    declared_elements: HashSet<String>,
    declared_attributes: HashSet<(String, String)>,
    id_attributes: HashMap<String, String>,
    content_model_element: Option<String>,
    mixed_children: Option<Vec<String>>,
    /// `(element, child)` for every element type named in a content model.
    content_spec_elements: Vec<(String, String)>,
    /// `(declaration, notation)` for every notation a declaration refers to.
    notation_references: Vec<(String, String)>,
}

impl XmlDtdProcessor {
    const RECOGNIZED_FEATURES: &[&str] = &[
        VALIDATION,
        WARN_ON_DUPLICATE_ATTDEF,
        WARN_ON_UNDECLARED_ELEMDEF,
    ];
    const RECOGNIZED_PROPERTIES: &[&str] = &[SYMBOL_TABLE, ERROR_REPORTER];

    pub fn new(strategy: Box<dyn DtdVersionStrategy>) -> Self {
        Self {
            strategy,
            validation: false,
            warn_duplicate_attdef: false,
            warn_undeclared_elemdef: false,
            configured: false,
            grammar: None,
            declared_elements: HashSet::new(),
            declared_attributes: HashSet::new(),
            id_attributes: HashMap::new(),
            content_model_element: None,
            mixed_children: None,
            content_spec_elements: vec![],
            notation_references: vec![],
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.strategy.version()
    }

    fn clear(&mut self) {
        self.grammar = None;
        self.declared_elements.clear();
        self.declared_attributes.clear();
        self.id_attributes.clear();
        self.content_model_element = None;
        self.mixed_children = None;
        self.content_spec_elements.clear();
        self.notation_references.clear();
    }

    /// Whether `value` is a legal default for an attribute of `att_type`.
    fn is_valid_default(&self, att_type: &AttType, value: &str) -> bool {
        let tokens = || value.split(' ').filter(|t| !t.is_empty());
        match att_type {
            AttType::CData => true,
            AttType::Id | AttType::IdRef | AttType::Entity => self.strategy.is_valid_name(value),
            AttType::IdRefs | AttType::Entities => {
                !value.is_empty() && tokens().all(|t| self.strategy.is_valid_name(t))
            }
            AttType::NmToken => self.strategy.is_valid_nmtoken(value),
            AttType::NmTokens => {
                !value.is_empty() && tokens().all(|t| self.strategy.is_valid_nmtoken(t))
            }
            AttType::Notation(values) | AttType::Enumeration(values) => {
                values.iter().any(|v| v == value)
            }
        }
    }

    fn check(&mut self, event: &DtdEvent, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        match event {
            DtdEvent::StartDtd(_) => {
                self.clear();
                self.grammar = Some(DtdGrammar::new());
            }
            DtdEvent::StartContentModel(element) => {
                self.content_model_element = Some(element.clone());
                self.mixed_children = None;
            }
            DtdEvent::Pcdata => self.mixed_children = Some(vec![]),
            DtdEvent::Element(child) => {
                let element = self.content_model_element.clone().unwrap_or_default();
                if let Some(children) = self.mixed_children.as_mut() {
                    if children.contains(child) {
                        if self.validation {
                            cx.error(
                                XmlErrorCode::DuplicateTypeInMixedContent,
                                &[&element, child],
                            )?;
                        }
                    } else {
                        children.push(child.clone());
                    }
                }
                self.content_spec_elements.push((element, child.clone()));
            }
            DtdEvent::ElementDecl { name, .. } => {
                if !self.declared_elements.insert(name.clone()) && self.validation {
                    cx.error(XmlErrorCode::ElementAlreadyDeclared, &[name])?;
                }
            }
            DtdEvent::AttributeDecl(decl) => {
                let (element, attribute) = (&decl.element_name, &decl.attribute_name);
                if !self
                    .declared_attributes
                    .insert((element.clone(), attribute.clone()))
                {
                    if self.warn_duplicate_attdef {
                        cx.warning(XmlErrorCode::DuplicateAttdef, &[element, attribute])?;
                    }
                    return Ok(());
                }
                if decl.att_type == AttType::Id {
                    match self.id_attributes.get(element) {
                        Some(existing) if self.validation => {
                            let existing = existing.clone();
                            cx.error(
                                XmlErrorCode::MoreThanOneIdAttribute,
                                &[element, &existing, attribute],
                            )?;
                        }
                        Some(_) => {}
                        None => {
                            self.id_attributes.insert(element.clone(), attribute.clone());
                        }
                    }
                }
                if let AttType::Notation(notations) = &decl.att_type {
                    for notation in notations {
                        self.notation_references
                            .push((attribute.clone(), notation.clone()));
                    }
                }
                if let Some(value) = decl.default.value() {
                    if self.validation && !self.is_valid_default(&decl.att_type, value) {
                        cx.error(
                            XmlErrorCode::AttributeValueInvalid,
                            &[decl.att_type.name(), attribute, value],
                        )?;
                    }
                }
            }
            DtdEvent::UnparsedEntityDecl { name, notation, .. } => {
                self.notation_references
                    .push((name.clone(), notation.clone()));
            }
            DtdEvent::EndDtd => self.check_end_dtd(cx)?,
            _ => {}
        }
        Ok(())
    }

    fn check_end_dtd(&mut self, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        let Some(grammar) = self.grammar.as_ref() else {
            return Ok(());
        };
        if self.validation {
            let undeclared = self
                .notation_references
                .iter()
                .filter(|(_, notation)| grammar.notation(notation).is_none())
                .cloned()
                .collect::<Vec<_>>();
            for (decl, notation) in undeclared {
                cx.error(XmlErrorCode::NotationNotDeclared, &[&decl, &notation])?;
            }
        }
        if self.warn_undeclared_elemdef {
            let mut undeclared = self
                .content_spec_elements
                .iter()
                .filter(|(_, child)| grammar.element(child).is_none())
                .cloned()
                .collect::<Vec<_>>();
            undeclared.dedup();
            for (element, child) in undeclared {
                cx.warning(
                    XmlErrorCode::UndeclaredElementInContentSpec,
                    &[&element, &child],
                )?;
            }
        }
        Ok(())
    }

    /// Pass a DTD event through: check it, add it to the grammar, and forward it.
    pub fn filter_dtd(
        &mut self,
        event: DtdEvent,
        augs: &Augmentations,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        if !matches!(event, DtdEvent::EndDtd) {
            self.check(&event, cx)?;
        }
        if let Some(grammar) = self.grammar.as_mut() {
            if event.is_content_model() {
                event.deliver_content_model(grammar, augs)?;
            } else {
                event.deliver(grammar, augs)?;
            }
        }
        if matches!(event, DtdEvent::EndDtd) {
            self.check(&event, cx)?;
            if let Some(grammar) = self.grammar.take() {
                let grammar = Rc::new(grammar);
                if let (Some(description), Some(pool)) = (
                    cx.validation.description().cloned(),
                    cx.validation.grammar_pool().cloned(),
                ) {
                    debug!(root = %description.root_element, "caching DTD grammar");
                    pool.borrow_mut().cache_grammar(description, grammar.clone());
                }
                cx.validation.set_grammar(grammar);
            }
        }
        next.emit(event, augs, cx)
    }
}

impl XmlComponent for XmlDtdProcessor {
    fn recognized_features(&self) -> &[&'static str] {
        Self::RECOGNIZED_FEATURES
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        match feature_id {
            WARN_ON_DUPLICATE_ATTDEF | WARN_ON_UNDECLARED_ELEMDEF => Some(false),
            _ => None,
        }
    }

    fn recognized_properties(&self) -> &[&'static str] {
        Self::RECOGNIZED_PROPERTIES
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.clear();
        if self.configured && !manager.feature_or(PARSER_SETTINGS, true) {
            return Ok(());
        }
        self.validation = manager.feature_or(VALIDATION, false);
        self.warn_duplicate_attdef = manager.feature_or(WARN_ON_DUPLICATE_ATTDEF, false);
        self.warn_undeclared_elemdef = manager.feature_or(WARN_ON_UNDECLARED_ELEMDEF, false);
        self.configured = true;
        Ok(())
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        match feature_id {
            VALIDATION => self.validation = state,
            WARN_ON_DUPLICATE_ATTDEF => self.warn_duplicate_attdef = state,
            WARN_ON_UNDECLARED_ELEMDEF => self.warn_undeclared_elemdef = state,
            _ => {}
        }
        Ok(())
    }
}

/// Load a DTD that is not part of a document, such as a grammar to pre-populate a pool.
#[doc(alias = "XMLDTDLoader")]
pub struct XmlDtdLoader {
    registry: ComponentRegistry<BasicRules>,
    entity_manager: ComponentId,
    error_reporter: ComponentId,
    dtd_scanner: ComponentId,
    dtd_processor: ComponentId,
    validation: RefCell<ValidationManager>,
}

impl XmlDtdLoader {
    pub fn new(version: XmlVersion) -> Self {
        let mut registry = ComponentRegistry::new(BasicRules);
        registry.add_recognized_properties(&[SYMBOL_TABLE, ENTITY_MANAGER, ERROR_REPORTER]);
        registry.store_property(
            SYMBOL_TABLE,
            XmlProperty::SymbolTable(Rc::new(SymbolTable::new())),
        );
        let entity_manager =
            registry.add_common_component(Component::EntityManager(XmlEntityManager::new()));
        let error_reporter =
            registry.add_common_component(Component::ErrorReporter(XmlErrorReporter::new()));
        let dtd_scanner = registry.add_component(Component::DtdScanner(version.create_dtd_scanner()));
        let dtd_processor = registry.add_component(Component::DtdProcessor(XmlDtdProcessor::new(
            Box::new(version),
        )));
        registry.store_property(ENTITY_MANAGER, XmlProperty::Component(entity_manager));
        registry.store_property(ERROR_REPORTER, XmlProperty::Component(error_reporter));
        registry.set_config_updated(false);
        Self {
            registry,
            entity_manager,
            error_reporter,
            dtd_scanner,
            dtd_processor,
            validation: RefCell::new(ValidationManager::new()),
        }
    }

    pub fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        self.registry.set_feature(feature_id, state)
    }

    pub fn set_property(
        &mut self,
        property_id: &str,
        value: XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        self.registry.set_property(property_id, value)
    }

    /// Read `source` as an external subset and return the grammar it declares.
    pub fn load_grammar(&mut self, source: XmlInputSource) -> Result<Rc<DtdGrammar>, XniError> {
        self.validation.get_mut().reset();
        self.registry.reset_set(ComponentSet::Common)?;
        self.registry.reset_set(ComponentSet::Xml10)?;
        self.registry.set_config_updated(false);

        let arena = self.registry.arena();
        let mut entities = arena.entity_manager(self.entity_manager)?;
        let mut reporter = arena.error_reporter(self.error_reporter)?;
        let mut scanner = arena.dtd_scanner(self.dtd_scanner)?;
        let mut stages = [arena.borrow_mut(self.dtd_processor)?];
        let mut validation = self.validation.borrow_mut();
        let mut cx = PipelineContext {
            entities: &mut entities,
            reporter: &mut reporter,
            validation: &mut validation,
        };
        let mut next = DtdNext {
            stages: &mut stages,
            dtd_handler: None,
            content_model_handler: None,
        };
        let result = scanner.scan_standalone_subset(&mut cx, &mut next, source);
        cx.entities.close_readers();
        result?;
        cx.validation
            .grammar()
            .cloned()
            .ok_or_else(|| XniError::Pipeline("the DTD produced no grammar".into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        constants::{CONTINUE_AFTER_FATAL_ERROR, ERROR_HANDLER},
        error::XmlParseError,
        xni::XmlErrorHandler,
    };

    use super::*;

    #[derive(Default)]
    struct Collect {
        codes: Vec<XmlErrorCode>,
    }

    impl XmlErrorHandler for Collect {
        fn warning(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.codes.push(error.code);
            Ok(())
        }

        fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.codes.push(error.code);
            Ok(())
        }
    }

    fn collecting_loader() -> (XmlDtdLoader, Rc<RefCell<Collect>>) {
        let collect = Rc::new(RefCell::new(Collect::default()));
        let mut loader = XmlDtdLoader::new(XmlVersion::Xml10);
        loader
            .set_property(ERROR_HANDLER, XmlProperty::ErrorHandler(collect.clone()))
            .unwrap();
        (loader, collect)
    }

    #[test]
    fn version_strategy_test() {
        let strategy: Box<dyn DtdVersionStrategy> = Box::new(XmlVersion::Xml11);
        assert_eq!(strategy.version(), XmlVersion::Xml11);
        assert!(strategy.is_valid_name("\u{2070}a"));
        assert!(!DtdVersionStrategy::is_valid_name(&XmlVersion::Xml10, "\u{2070}a"));
        assert_eq!(strategy.create_dtd_scanner().version(), XmlVersion::Xml11);
    }

    #[test]
    fn load_grammar_test() {
        let mut loader = XmlDtdLoader::new(XmlVersion::Xml10);
        let grammar = loader
            .load_grammar(XmlInputSource::from_text(
                "<!ELEMENT doc (item*)>\n\
                 <!ELEMENT item EMPTY>\n\
                 <!ATTLIST item id ID #REQUIRED>\n\
                 <!NOTATION gif SYSTEM 'image/gif'>",
            ))
            .unwrap();
        assert!(grammar.element("doc").is_some());
        assert!(grammar.attribute("item", "id").is_some());
        assert!(grammar.notation("gif").is_some());

        let again = loader
            .load_grammar(XmlInputSource::from_text("<!ELEMENT other ANY>"))
            .unwrap();
        assert!(again.element("doc").is_none());
        assert!(again.element("other").is_some());
    }

    #[test]
    fn validity_checks_test() {
        let (mut loader, collect) = collecting_loader();
        loader
            .load_grammar(XmlInputSource::from_text(
                "<!ELEMENT a EMPTY><!ATTLIST a x ID #IMPLIED y ID #IMPLIED>",
            ))
            .unwrap();
        assert!(collect.borrow().codes.is_empty());

        loader.set_feature(VALIDATION, true).unwrap();
        loader
            .load_grammar(XmlInputSource::from_text(
                "<!ELEMENT a EMPTY>\n\
                 <!ELEMENT a ANY>\n\
                 <!ATTLIST a x ID #IMPLIED y ID #IMPLIED>\n\
                 <!ATTLIST a n NMTOKEN '#bad'>\n\
                 <!ELEMENT m (#PCDATA|b|b)*>\n\
                 <!ENTITY pic SYSTEM 'a.gif' NDATA gif>",
            ))
            .unwrap();
        assert_eq!(
            collect.borrow().codes,
            [
                XmlErrorCode::ElementAlreadyDeclared,
                XmlErrorCode::MoreThanOneIdAttribute,
                XmlErrorCode::AttributeValueInvalid,
                XmlErrorCode::DuplicateTypeInMixedContent,
                XmlErrorCode::NotationNotDeclared,
            ]
        );
    }

    #[test]
    fn warnings_test() {
        let (mut loader, collect) = collecting_loader();
        loader.set_feature(WARN_ON_DUPLICATE_ATTDEF, true).unwrap();
        loader.set_feature(WARN_ON_UNDECLARED_ELEMDEF, true).unwrap();
        let grammar = loader
            .load_grammar(XmlInputSource::from_text(
                "<!ELEMENT doc (head, body)>\n\
                 <!ELEMENT head EMPTY>\n\
                 <!ATTLIST doc a CDATA 'first' a CDATA 'second'>",
            ))
            .unwrap();
        assert_eq!(
            collect.borrow().codes,
            [
                XmlErrorCode::DuplicateAttdef,
                XmlErrorCode::UndeclaredElementInContentSpec,
            ]
        );
        let decl = grammar.attribute("doc", "a").unwrap();
        assert_eq!(decl.default.value(), Some("first"));
    }

    #[test]
    fn unrecognized_feature_test() {
        let mut loader = XmlDtdLoader::new(XmlVersion::Xml10);
        assert!(loader.set_feature(CONTINUE_AFTER_FATAL_ERROR, true).is_ok());
        assert!(loader.set_feature("urn:unknown", true).unwrap_err().is_not_recognized());
    }
}
