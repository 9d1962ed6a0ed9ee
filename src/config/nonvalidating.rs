//! Provide the single-version configuration that only scans.
//!
//! There is no DTD processor, no validator and no version detection: the document
//! scanner feeds the document handler and the DTD scanner feeds the DTD handlers
//! directly. Attribute defaults declared in the DTD are therefore not applied.

use std::{cell::RefCell, rc::Rc};

use tracing::debug;

use crate::{
    component::{Component, ComponentId, XmlComponentManager, XmlProperty},
    constants::{
        CONTINUE_AFTER_FATAL_ERROR, DATATYPE_VALIDATOR_FACTORY, DEFAULT_ATTRIBUTE_VALUES,
        DOCUMENT_SCANNER, DTD_SCANNER, DTD_VALIDATOR, DYNAMIC_VALIDATION, ENTITY_MANAGER,
        ERROR_REPORTER, JAXP_SCHEMA_SOURCE, LOAD_DTD_GRAMMAR, LOAD_EXTERNAL_DTD, LOCALE,
        NAMESPACE_BINDER, NAMESPACES, PARSER_SETTINGS, SYMBOL_TABLE, VALIDATE_CONTENT_MODELS,
        VALIDATE_DATATYPES, XMLGRAMMAR_POOL, XmlVersion,
    },
    dtd::{DtdDvFactory, XmlDtdScanner},
    entity::XmlEntityManager,
    error::{XmlConfigurationError, XniError},
    pipeline::{
        DocumentHandlerRef, DtdContentModelHandlerRef, DtdHandlerRef, Endpoint, LinkKind,
        PipelineHandlers, PipelineLinks, drive_scanner,
    },
    registry::{ComponentRegistry, ComponentSet},
    reporter::XmlErrorReporter,
    scanner::XmlDocumentScanner,
    settings::{ConfigurationRules, ParserConfigurationSettings},
    symbols::SymbolTable,
    validation::{ValidationManager, XmlGrammarPool},
    xni::XmlInputSource,
};

use super::{
    BASIC_FEATURES, BASIC_PROPERTIES, XmlParserConfiguration, XmlPullParserConfiguration,
    install_features,
};

const RECOGNIZED_FEATURES: &[(&str, bool)] = &[
    (PARSER_SETTINGS, true),
    (NAMESPACES, true),
    (CONTINUE_AFTER_FATAL_ERROR, false),
];

const RECOGNIZED_PROPERTIES: &[&str] = &[
    ERROR_REPORTER,
    ENTITY_MANAGER,
    DOCUMENT_SCANNER,
    DTD_SCANNER,
    DTD_VALIDATOR,
    NAMESPACE_BINDER,
    XMLGRAMMAR_POOL,
    DATATYPE_VALIDATOR_FACTORY,
    LOCALE,
];

#[derive(Debug, Default, Clone, Copy)]
pub struct NonValidatingRules;

impl ConfigurationRules for NonValidatingRules {
    fn check_feature(
        &self,
        settings: &ParserConfigurationSettings,
        feature_id: &str,
    ) -> Result<(), XmlConfigurationError> {
        match feature_id {
            DYNAMIC_VALIDATION | LOAD_DTD_GRAMMAR | LOAD_EXTERNAL_DTD => Ok(()),
            DEFAULT_ATTRIBUTE_VALUES | VALIDATE_CONTENT_MODELS | VALIDATE_DATATYPES => {
                Err(XmlConfigurationError::not_supported(feature_id))
            }
            _ => settings.check_feature(feature_id),
        }
    }

    fn check_property(
        &self,
        settings: &ParserConfigurationSettings,
        property_id: &str,
    ) -> Result<(), XmlConfigurationError> {
        match property_id {
            DTD_SCANNER | JAXP_SCHEMA_SOURCE => Ok(()),
            _ => settings.check_property(property_id),
        }
    }
}

pub struct NonValidatingConfiguration {
    registry: ComponentRegistry<NonValidatingRules>,
    links: PipelineLinks,
    handlers: PipelineHandlers,
    validation: RefCell<ValidationManager>,
    locale: Option<String>,

    entity_manager: ComponentId,
    error_reporter: ComponentId,
    dtd_scanner: ComponentId,
    namespace_scanner: Option<ComponentId>,
    plain_scanner: Option<ComponentId>,
    /// The scanner selected by the last reset.
    scanner: Option<ComponentId>,

    input_source: Option<XmlInputSource>,
    /// Set for the duration of `parse`. Behind `&mut self` a nested call cannot reach
    /// it; re-entrancy through handlers is caught when a
    /// [`SharedConfiguration`](crate::SharedConfiguration) fails to borrow.
    parse_in_progress: bool,
}

impl NonValidatingConfiguration {
    pub fn new() -> Self {
        Self::with_components(None, None)
    }

    pub fn with_components(
        symbols: Option<Rc<SymbolTable>>,
        grammar_pool: Option<Rc<RefCell<dyn XmlGrammarPool>>>,
    ) -> Self {
        let mut registry = ComponentRegistry::new(NonValidatingRules);
        install_features(&mut registry, BASIC_FEATURES);
        registry.add_recognized_properties(BASIC_PROPERTIES);
        registry.store_property(
            SYMBOL_TABLE,
            XmlProperty::SymbolTable(symbols.unwrap_or_default()),
        );
        install_features(&mut registry, RECOGNIZED_FEATURES);
        registry.add_recognized_properties(RECOGNIZED_PROPERTIES);

        let mut validation = ValidationManager::new();
        if let Some(pool) = grammar_pool {
            registry.store_property(XMLGRAMMAR_POOL, XmlProperty::GrammarPool(pool.clone()));
            validation.set_grammar_pool(Some(pool));
        }

        let entity_manager =
            registry.add_component(Component::EntityManager(XmlEntityManager::new()));
        registry.store_property(ENTITY_MANAGER, XmlProperty::Component(entity_manager));
        let error_reporter =
            registry.add_component(Component::ErrorReporter(XmlErrorReporter::new()));
        registry.store_property(ERROR_REPORTER, XmlProperty::Component(error_reporter));
        let dtd_scanner =
            registry.add_component(Component::DtdScanner(XmlDtdScanner::new(XmlVersion::Xml10)));
        registry.store_property(DTD_SCANNER, XmlProperty::Component(dtd_scanner));
        registry.store_property(
            DATATYPE_VALIDATOR_FACTORY,
            XmlProperty::DatatypeFactory(DtdDvFactory::Xml10),
        );
        registry.set_config_updated(false);

        Self {
            registry,
            links: PipelineLinks::new(),
            handlers: PipelineHandlers::default(),
            validation: RefCell::new(validation),
            locale: None,
            entity_manager,
            error_reporter,
            dtd_scanner,
            namespace_scanner: None,
            plain_scanner: None,
            scanner: None,
            input_source: None,
            parse_in_progress: false,
        }
    }

    pub fn registry(&self) -> &ComponentRegistry<NonValidatingRules> {
        &self.registry
    }

    pub fn links(&self) -> &PipelineLinks {
        &self.links
    }

    /// The scanner selected for the current document.
    pub fn scanner(&self) -> Option<ComponentId> {
        self.scanner
    }

    pub fn namespace_scanner(&self) -> Option<ComponentId> {
        self.namespace_scanner
    }

    pub fn plain_scanner(&self) -> Option<ComponentId> {
        self.plain_scanner
    }

    /// Select the scanner for the `namespaces` feature, creating it on first use, and
    /// link both chains to the application's handlers.
    fn configure_pipeline(&mut self) -> ComponentId {
        let namespaces = self.registry.settings().feature(NAMESPACES) == Some(true);
        let slot = match namespaces {
            true => &mut self.namespace_scanner,
            false => &mut self.plain_scanner,
        };
        let scanner = match *slot {
            Some(scanner) => scanner,
            None => {
                let scanner = self.registry.add_component(Component::DocumentScanner(
                    XmlDocumentScanner::new(XmlVersion::Xml10, namespaces),
                ));
                debug!(namespaces, "document scanner created");
                *slot = Some(scanner);
                scanner
            }
        };
        self.registry
            .store_property(DOCUMENT_SCANNER, XmlProperty::Component(scanner));
        self.links
            .link(LinkKind::Document, scanner, Endpoint::DocumentHandler);
        self.links
            .link(LinkKind::Dtd, self.dtd_scanner, Endpoint::DtdHandler);
        self.links.link(
            LinkKind::DtdContentModel,
            self.dtd_scanner,
            Endpoint::DtdContentModelHandler,
        );
        self.scanner = Some(scanner);
        scanner
    }

    /// Configure the pipeline and reset every component.
    fn reset(&mut self) -> Result<ComponentId, XniError> {
        let scanner = self.configure_pipeline();
        self.validation
            .try_borrow_mut()
            .map_err(|_| XniError::Pipeline("the validation manager is already in use".into()))?
            .reset();
        self.registry.reset_set(ComponentSet::Xml10)?;
        self.registry.set_config_updated(false);
        Ok(scanner)
    }
}

impl Default for NonValidatingConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlParserConfiguration for NonValidatingConfiguration {
    fn parse(&mut self, source: XmlInputSource) -> Result<(), XniError> {
        if self.parse_in_progress {
            return Err(XniError::ParseInProgress);
        }
        self.parse_in_progress = true;
        self.set_input_source(source);
        let result = self.parse_step(true);
        self.parse_in_progress = false;
        self.cleanup();
        result.map(|_| ())
    }

    fn add_recognized_features(&mut self, feature_ids: &[&str]) {
        self.registry.add_recognized_features(feature_ids);
    }

    fn add_recognized_properties(&mut self, property_ids: &[&str]) {
        self.registry.add_recognized_properties(property_ids);
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        self.registry.set_feature(feature_id, state)
    }

    fn get_feature(&self, feature_id: &str) -> Result<bool, XmlConfigurationError> {
        XmlComponentManager::get_feature(&self.registry, feature_id)
    }

    fn set_property(
        &mut self,
        property_id: &str,
        value: XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        let value = match (property_id, value) {
            (LOCALE, XmlProperty::String(locale)) => XmlProperty::Locale(locale),
            (_, value) => value,
        };
        if let (LOCALE, XmlProperty::Locale(locale)) = (property_id, &value) {
            self.set_locale(Some(locale.clone()));
        }
        self.registry.set_property(property_id, value)
    }

    fn get_property(&self, property_id: &str) -> Result<Option<XmlProperty>, XmlConfigurationError> {
        if property_id == LOCALE {
            return Ok(self.locale.clone().map(XmlProperty::Locale));
        }
        XmlComponentManager::get_property(&self.registry, property_id)
    }

    fn set_document_handler(&mut self, handler: Option<DocumentHandlerRef>) {
        self.handlers.document = handler;
    }

    fn document_handler(&self) -> Option<DocumentHandlerRef> {
        self.handlers.document.clone()
    }

    fn set_dtd_handler(&mut self, handler: Option<DtdHandlerRef>) {
        self.handlers.dtd = handler;
    }

    fn dtd_handler(&self) -> Option<DtdHandlerRef> {
        self.handlers.dtd.clone()
    }

    fn set_dtd_content_model_handler(&mut self, handler: Option<DtdContentModelHandlerRef>) {
        self.handlers.content_model = handler;
    }

    fn dtd_content_model_handler(&self) -> Option<DtdContentModelHandlerRef> {
        self.handlers.content_model.clone()
    }

    fn set_locale(&mut self, locale: Option<String>) {
        if let Ok(mut reporter) = self.registry.arena().error_reporter(self.error_reporter) {
            reporter.set_locale(locale.clone());
        }
        self.locale = locale;
    }

    fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }
}

impl XmlPullParserConfiguration for NonValidatingConfiguration {
    fn set_input_source(&mut self, source: XmlInputSource) {
        self.input_source = Some(source);
    }

    fn parse_step(&mut self, complete: bool) -> Result<bool, XniError> {
        if let Some(source) = self.input_source.take() {
            let scanner_id = self.reset()?;
            let arena = self.registry.arena();
            let mut scanner = arena.document_scanner(scanner_id)?;
            let mut entities = arena.entity_manager(self.entity_manager)?;
            entities.start_document_entity(source, &mut *scanner)?;
        }
        let Some(scanner) = self.scanner else {
            return Ok(false);
        };
        drive_scanner(
            self.registry.arena(),
            &self.links,
            scanner,
            self.entity_manager,
            self.error_reporter,
            &self.validation,
            &self.handlers,
            complete,
        )
    }

    fn cleanup(&mut self) {
        if let Ok(mut entities) = self.registry.arena().entity_manager(self.entity_manager) {
            entities.close_readers();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::xni::{Augmentations, QName, XmlAttributes, XmlDocumentHandler, XmlDtdHandler};

    use super::*;

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl XmlDocumentHandler for Trace {
        fn start_element(
            &mut self,
            element: &QName,
            attributes: &XmlAttributes,
            augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!(
                "start {} uri={:?} atts={} bindings={}",
                element.raw_name,
                element.uri.as_deref(),
                attributes.len(),
                augs.namespace_bindings.len()
            ));
            Ok(())
        }

        fn end_element(&mut self, element: &QName, _augs: &Augmentations) -> Result<(), XniError> {
            self.0.push(format!("end {}", element.raw_name));
            Ok(())
        }
    }

    impl XmlDtdHandler for Trace {
        fn element_decl(
            &mut self,
            name: &str,
            content_model: &str,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!("element {name} {content_model}"));
            Ok(())
        }
    }

    #[test]
    fn defaults_test() {
        let config = NonValidatingConfiguration::new();
        assert!(config.get_feature(NAMESPACES).unwrap());
        assert!(!config.get_feature(CONTINUE_AFTER_FATAL_ERROR).unwrap());
        assert!(!config.get_feature(PARSER_SETTINGS).unwrap());
        assert!(config.get_feature(DYNAMIC_VALIDATION).is_ok());
        assert!(config
            .get_feature(VALIDATE_DATATYPES)
            .unwrap_err()
            .is_not_supported());
        assert!(config.get_property(JAXP_SCHEMA_SOURCE).unwrap().is_none());
        assert!(config.get_property("urn:none").unwrap_err().is_not_recognized());
    }

    #[test]
    fn scan_only_test() {
        let mut config = NonValidatingConfiguration::new();
        let document = Rc::new(RefCell::new(Trace::default()));
        let dtd = Rc::new(RefCell::new(Trace::default()));
        config.set_document_handler(Some(document.clone()));
        config.set_dtd_handler(Some(dtd.clone()));
        let doc = "<!DOCTYPE p:a [<!ELEMENT p:a ANY><!ATTLIST p:a d CDATA 'x'>]>\
                   <p:a xmlns:p='urn:p'></p:a>";
        config
            .parse(XmlInputSource::from_bytes(doc.as_bytes().to_vec()))
            .unwrap();
        assert_eq!(dtd.borrow().0, ["element p:a ANY"]);
        assert_eq!(
            document.borrow().0,
            ["start p:a uri=Some(\"urn:p\") atts=1 bindings=1", "end p:a"]
        );
        assert_eq!(config.scanner(), config.namespace_scanner());
        assert_eq!(config.plain_scanner(), None);
        assert!(!config.get_feature(PARSER_SETTINGS).unwrap());
    }

    #[test]
    fn lazy_scanner_test() {
        let mut config = NonValidatingConfiguration::new();
        config.set_feature(NAMESPACES, false).unwrap();
        assert!(config.get_feature(PARSER_SETTINGS).unwrap());
        config.set_input_source(XmlInputSource::from_text("<a><b/></a>"));
        while config.parse_step(false).unwrap() {}
        config.cleanup();
        let plain = config.plain_scanner();
        assert!(plain.is_some());
        assert_eq!(config.scanner(), plain);
        assert_eq!(config.namespace_scanner(), None);

        let components = config.registry().components(ComponentSet::Xml10).len();
        config.parse(XmlInputSource::from_text("<a/>")).unwrap();
        assert_eq!(config.registry().components(ComponentSet::Xml10).len(), components);
        assert_eq!(config.plain_scanner(), plain);
    }
}
