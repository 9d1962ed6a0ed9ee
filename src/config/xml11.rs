//! Provide the validating configuration that processes XML 1.0 and XML 1.1 documents.
//!
//! The configuration owns three component sets. The common set (entity manager, error
//! reporter) serves both versions. The XML 1.0 set is created with the configuration.
//! The XML 1.1 set is created the first time a 1.1 document is detected and kept from
//! then on. Before each document, the version detector reads the XML declaration and
//! the chain of the detected version is linked in and reset.

use std::{cell::RefCell, rc::Rc};

use tracing::{debug, trace};

use crate::{
    component::{Component, ComponentId, XmlComponentManager, XmlProperty},
    constants::{
        CONTINUE_AFTER_FATAL_ERROR, DATATYPE_VALIDATOR_FACTORY, DEFAULT_ATTRIBUTE_VALUES,
        DOCUMENT_SCANNER, DTD_PROCESSOR, DTD_SCANNER, DTD_VALIDATOR, DYNAMIC_VALIDATION,
        ENTITY_MANAGER, ENTITY_RESOLVER, ERROR_HANDLER, ERROR_REPORTER, EXTERNAL_GENERAL_ENTITIES,
        EXTERNAL_PARAMETER_ENTITIES, GENERATE_SYNTHETIC_ANNOTATIONS, HONOUR_ALL_SCHEMALOCATIONS,
        ID_IDREF_CHECKING, IDENTITY_CONSTRAINT_CHECKING, IGNORE_XSI_TYPE, JAXP_SCHEMA_LANGUAGE,
        JAXP_SCHEMA_SOURCE, LOAD_DTD_GRAMMAR, LOAD_EXTERNAL_DTD, LOCALE, NAMESPACE_GROWTH,
        NAMESPACES, NORMALIZE_DATA, PARSER_SETTINGS, ROOT_ELEMENT_DECL, ROOT_TYPE_DEF,
        SCHEMA_DV_FACTORY, SCHEMA_ELEMENT_DEFAULT, SCHEMA_FULL_CHECKING, SCHEMA_LOCATION,
        SCHEMA_NONS_LOCATION, SCHEMA_VALIDATION, SCHEMA_VALIDATOR, SYMBOL_TABLE,
        TOLERATE_DUPLICATES, UNPARSED_ENTITY_CHECKING, USE_GRAMMAR_POOL_ONLY, VALIDATE_ANNOTATIONS,
        VALIDATE_CONTENT_MODELS, VALIDATE_DATATYPES, VALIDATION, VALIDATION_MANAGER,
        XML_STRING, XMLGRAMMAR_POOL, XmlVersion,
    },
    dtd::{DtdDvFactory, XmlDtdProcessor, XmlDtdScanner, XmlDtdValidator},
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
    version::XmlVersionDetector,
    xni::XmlInputSource,
};

use super::{XmlParserConfiguration, XmlPullParserConfiguration, install_features};

const RECOGNIZED_FEATURES: &[(&str, bool)] = &[
    (CONTINUE_AFTER_FATAL_ERROR, false),
    (LOAD_EXTERNAL_DTD, true),
    (VALIDATION, false),
    (NAMESPACES, true),
    (NORMALIZE_DATA, true),
    (SCHEMA_ELEMENT_DEFAULT, true),
    (GENERATE_SYNTHETIC_ANNOTATIONS, false),
    (VALIDATE_ANNOTATIONS, false),
    (HONOUR_ALL_SCHEMALOCATIONS, false),
    (NAMESPACE_GROWTH, false),
    (TOLERATE_DUPLICATES, false),
    (IGNORE_XSI_TYPE, false),
    (ID_IDREF_CHECKING, true),
    (IDENTITY_CONSTRAINT_CHECKING, true),
    (UNPARSED_ENTITY_CHECKING, true),
    (USE_GRAMMAR_POOL_ONLY, false),
    (EXTERNAL_GENERAL_ENTITIES, true),
    (EXTERNAL_PARAMETER_ENTITIES, true),
    (PARSER_SETTINGS, true),
];

const RECOGNIZED_PROPERTIES: &[&str] = &[
    SYMBOL_TABLE,
    ERROR_HANDLER,
    ENTITY_RESOLVER,
    ERROR_REPORTER,
    ENTITY_MANAGER,
    DOCUMENT_SCANNER,
    DTD_SCANNER,
    DTD_PROCESSOR,
    DTD_VALIDATOR,
    DATATYPE_VALIDATOR_FACTORY,
    VALIDATION_MANAGER,
    SCHEMA_VALIDATOR,
    XML_STRING,
    XMLGRAMMAR_POOL,
    JAXP_SCHEMA_SOURCE,
    JAXP_SCHEMA_LANGUAGE,
    SCHEMA_LOCATION,
    SCHEMA_NONS_LOCATION,
    LOCALE,
    ROOT_TYPE_DEF,
    ROOT_ELEMENT_DECL,
    SCHEMA_DV_FACTORY,
];

/// The identifiers [`Xml11Configuration`] accepts beyond the recognized ones, and those
/// it refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xml11Rules;

impl ConfigurationRules for Xml11Rules {
    fn check_feature(
        &self,
        settings: &ParserConfigurationSettings,
        feature_id: &str,
    ) -> Result<(), XmlConfigurationError> {
        match feature_id {
            DYNAMIC_VALIDATION | LOAD_DTD_GRAMMAR | LOAD_EXTERNAL_DTD | SCHEMA_VALIDATION
            | SCHEMA_FULL_CHECKING | NORMALIZE_DATA | SCHEMA_ELEMENT_DEFAULT => Ok(()),
            // only the configuration itself may answer `parser-settings`
            DEFAULT_ATTRIBUTE_VALUES | VALIDATE_CONTENT_MODELS | VALIDATE_DATATYPES
            | PARSER_SETTINGS => Err(XmlConfigurationError::not_supported(feature_id)),
            _ => settings.check_feature(feature_id),
        }
    }

    fn check_property(
        &self,
        settings: &ParserConfigurationSettings,
        property_id: &str,
    ) -> Result<(), XmlConfigurationError> {
        match property_id {
            DTD_SCANNER | SCHEMA_LOCATION | SCHEMA_NONS_LOCATION | JAXP_SCHEMA_SOURCE => Ok(()),
            XML_STRING => Err(XmlConfigurationError::not_supported(property_id)),
            _ => settings.check_property(property_id),
        }
    }
}

/// A document scanner and the DTD validator it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentChain {
    pub scanner: ComponentId,
    pub validator: ComponentId,
}

/// The components that exist once per XML version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionComponents {
    pub version: XmlVersion,
    pub factory: DtdDvFactory,
    pub dtd_scanner: ComponentId,
    pub dtd_processor: ComponentId,
    pub namespace_chain: DocumentChain,
    /// Created the first time the `namespaces` feature is off.
    pub plain_chain: Option<DocumentChain>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Xml11State {
    #[default]
    Uninitialized,
    Initialized(VersionComponents),
}

#[doc(alias = "XML11Configuration")]
pub struct Xml11Configuration {
    registry: ComponentRegistry<Xml11Rules>,
    links: PipelineLinks,
    handlers: PipelineHandlers,
    symbols: Rc<SymbolTable>,
    grammar_pool: Option<Rc<RefCell<dyn XmlGrammarPool>>>,
    validation: Rc<RefCell<ValidationManager>>,
    detector: XmlVersionDetector,
    locale: Option<String>,

    entity_manager: ComponentId,
    error_reporter: ComponentId,
    xml10: VersionComponents,
    xml11: Xml11State,

    current_scanner: Option<ComponentId>,
    current_dtd_scanner: Option<ComponentId>,
    current_factory: Option<DtdDvFactory>,
    active_version: Option<XmlVersion>,
    /// The stage the application's document handler is linked to.
    last_component: Option<ComponentId>,

    input_source: Option<XmlInputSource>,
    /// The current scanner has a document entity to read.
    scanning: bool,
    /// Set for the duration of `parse`. Behind `&mut self` a nested call cannot reach
    /// it; re-entrancy through handlers is caught when a
    /// [`SharedConfiguration`](crate::SharedConfiguration) fails to borrow.
    parse_in_progress: bool,
}

impl Xml11Configuration {
    pub fn new() -> Self {
        Self::with_components(None, None)
    }

    /// Create a configuration sharing `symbols` and caching DTD grammars in `grammar_pool`.
    pub fn with_components(
        symbols: Option<Rc<SymbolTable>>,
        grammar_pool: Option<Rc<RefCell<dyn XmlGrammarPool>>>,
    ) -> Self {
        let mut registry = ComponentRegistry::new(Xml11Rules);
        install_features(&mut registry, RECOGNIZED_FEATURES);
        registry.add_recognized_properties(RECOGNIZED_PROPERTIES);

        let symbols = symbols.unwrap_or_default();
        registry.store_property(SYMBOL_TABLE, XmlProperty::SymbolTable(symbols.clone()));
        if let Some(pool) = grammar_pool.as_ref() {
            registry.store_property(XMLGRAMMAR_POOL, XmlProperty::GrammarPool(pool.clone()));
        }

        let entity_manager =
            registry.add_common_component(Component::EntityManager(XmlEntityManager::new()));
        registry.store_property(ENTITY_MANAGER, XmlProperty::Component(entity_manager));
        let error_reporter =
            registry.add_common_component(Component::ErrorReporter(XmlErrorReporter::new()));
        registry.store_property(ERROR_REPORTER, XmlProperty::Component(error_reporter));

        let scanner = registry.add_component(Component::DocumentScanner(XmlDocumentScanner::new(
            XmlVersion::Xml10,
            true,
        )));
        registry.store_property(DOCUMENT_SCANNER, XmlProperty::Component(scanner));
        let dtd_scanner =
            registry.add_component(Component::DtdScanner(XmlDtdScanner::new(XmlVersion::Xml10)));
        registry.store_property(DTD_SCANNER, XmlProperty::Component(dtd_scanner));
        let dtd_processor = registry.add_component(Component::DtdProcessor(XmlDtdProcessor::new(
            Box::new(XmlVersion::Xml10),
        )));
        registry.store_property(DTD_PROCESSOR, XmlProperty::Component(dtd_processor));
        let validator = registry.add_component(Component::DtdValidator(XmlDtdValidator::new(
            XmlVersion::Xml10,
            true,
        )));
        registry.store_property(DTD_VALIDATOR, XmlProperty::Component(validator));

        let factory = DtdDvFactory::Xml10;
        registry.store_property(
            DATATYPE_VALIDATOR_FACTORY,
            XmlProperty::DatatypeFactory(factory),
        );
        let mut validation = ValidationManager::new();
        validation.set_grammar_pool(grammar_pool.clone());
        let validation = Rc::new(RefCell::new(validation));
        registry.store_property(
            VALIDATION_MANAGER,
            XmlProperty::ValidationManager(validation.clone()),
        );
        registry.set_config_updated(false);

        Self {
            registry,
            links: PipelineLinks::new(),
            handlers: PipelineHandlers::default(),
            symbols,
            grammar_pool,
            validation,
            detector: XmlVersionDetector::new(),
            locale: None,
            entity_manager,
            error_reporter,
            xml10: VersionComponents {
                version: XmlVersion::Xml10,
                factory,
                dtd_scanner,
                dtd_processor,
                namespace_chain: DocumentChain { scanner, validator },
                plain_chain: None,
            },
            xml11: Xml11State::Uninitialized,
            current_scanner: None,
            current_dtd_scanner: None,
            current_factory: None,
            active_version: None,
            last_component: None,
            input_source: None,
            scanning: false,
            parse_in_progress: false,
        }
    }

    pub fn registry(&self) -> &ComponentRegistry<Xml11Rules> {
        &self.registry
    }

    pub fn links(&self) -> &PipelineLinks {
        &self.links
    }

    pub fn symbol_table(&self) -> &Rc<SymbolTable> {
        &self.symbols
    }

    pub fn grammar_pool(&self) -> Option<&Rc<RefCell<dyn XmlGrammarPool>>> {
        self.grammar_pool.as_ref()
    }

    pub fn entity_manager(&self) -> ComponentId {
        self.entity_manager
    }

    pub fn error_reporter(&self) -> ComponentId {
        self.error_reporter
    }

    pub fn xml10_components(&self) -> &VersionComponents {
        &self.xml10
    }

    pub fn xml11_state(&self) -> &Xml11State {
        &self.xml11
    }

    /// The scanner the last document was routed to.
    pub fn current_scanner(&self) -> Option<ComponentId> {
        self.current_scanner
    }

    pub fn current_dtd_scanner(&self) -> Option<ComponentId> {
        self.current_dtd_scanner
    }

    pub fn current_datatype_factory(&self) -> Option<DtdDvFactory> {
        self.current_factory
    }

    /// The version of the document being parsed, or of the last one.
    pub fn active_version(&self) -> Option<XmlVersion> {
        self.active_version
    }

    pub fn last_component(&self) -> Option<ComponentId> {
        self.last_component
    }

    /// The refusals of XML 1.1 components, which never fail a setter.
    pub fn suppressed_errors(&self) -> &[XmlConfigurationError] {
        self.registry.suppressed_errors()
    }

    pub fn take_suppressed_errors(&mut self) -> Vec<XmlConfigurationError> {
        self.registry.take_suppressed_errors()
    }

    /// Add a component used for documents of both versions.
    pub fn add_common_component(&mut self, component: Component) -> ComponentId {
        self.registry.add_common_component(component)
    }

    /// Add a component used for XML 1.0 documents.
    pub fn add_component(&mut self, component: Component) -> ComponentId {
        self.registry.add_component(component)
    }

    /// Add a component used for XML 1.1 documents.
    pub fn add_xml11_component(&mut self, component: Component) -> ComponentId {
        self.registry.add_xml11_component(component)
    }

    fn init_xml11_components(&mut self) -> VersionComponents {
        if let Xml11State::Initialized(components) = self.xml11 {
            return components;
        }
        let dtd_scanner = self
            .registry
            .add_xml11_component(Component::DtdScanner(XmlDtdScanner::new(XmlVersion::Xml11)));
        let dtd_processor = self.registry.add_xml11_component(Component::DtdProcessor(
            XmlDtdProcessor::new(Box::new(XmlVersion::Xml11)),
        ));
        let scanner = self.registry.add_xml11_component(Component::DocumentScanner(
            XmlDocumentScanner::new(XmlVersion::Xml11, true),
        ));
        let validator = self.registry.add_xml11_component(Component::DtdValidator(
            XmlDtdValidator::new(XmlVersion::Xml11, true),
        ));
        let components = VersionComponents {
            version: XmlVersion::Xml11,
            factory: DtdDvFactory::Xml11,
            dtd_scanner,
            dtd_processor,
            namespace_chain: DocumentChain { scanner, validator },
            plain_chain: None,
        };
        debug!("XML 1.1 components created");
        self.xml11 = Xml11State::Initialized(components);
        components
    }

    /// The non-namespace chain of `version`, created on first use.
    fn plain_chain(&mut self, version: XmlVersion) -> DocumentChain {
        let existing = match (version, &self.xml11) {
            (XmlVersion::Xml10, _) => self.xml10.plain_chain,
            (XmlVersion::Xml11, Xml11State::Initialized(components)) => components.plain_chain,
            (XmlVersion::Xml11, Xml11State::Uninitialized) => None,
        };
        if let Some(chain) = existing {
            return chain;
        }
        let scanner = Component::DocumentScanner(XmlDocumentScanner::new(version, false));
        let validator = Component::DtdValidator(XmlDtdValidator::new(version, false));
        let chain = match version {
            XmlVersion::Xml10 => DocumentChain {
                scanner: self.registry.add_component(scanner),
                validator: self.registry.add_component(validator),
            },
            XmlVersion::Xml11 => DocumentChain {
                scanner: self.registry.add_xml11_component(scanner),
                validator: self.registry.add_xml11_component(validator),
            },
        };
        match &mut self.xml11 {
            Xml11State::Initialized(components) if version == XmlVersion::Xml11 => {
                components.plain_chain = Some(chain)
            }
            _ => self.xml10.plain_chain = Some(chain),
        }
        debug!(%version, "non-namespace components created");
        chain
    }

    /// Link the chains of `version` and point the shared properties at them.
    ///
    /// A property is set again only when the selected component changes. Links are
    /// replaced, so relinking with the same feature state changes nothing.
    fn configure_pipeline(&mut self, version: XmlVersion) -> Result<(), XmlConfigurationError> {
        let components = match version {
            XmlVersion::Xml10 => self.xml10,
            XmlVersion::Xml11 => self.init_xml11_components(),
        };
        if self.current_factory != Some(components.factory) {
            self.registry.set_property(
                DATATYPE_VALIDATOR_FACTORY,
                XmlProperty::DatatypeFactory(components.factory),
            )?;
            self.current_factory = Some(components.factory);
        }
        if self.current_dtd_scanner != Some(components.dtd_scanner) {
            self.registry
                .set_property(DTD_SCANNER, XmlProperty::Component(components.dtd_scanner))?;
            self.registry
                .set_property(DTD_PROCESSOR, XmlProperty::Component(components.dtd_processor))?;
            self.current_dtd_scanner = Some(components.dtd_scanner);
        }
        let (dtd_scanner, dtd_processor) = (components.dtd_scanner, components.dtd_processor);
        self.links
            .link(LinkKind::Dtd, dtd_scanner, Endpoint::Component(dtd_processor));
        self.links
            .link(LinkKind::Dtd, dtd_processor, Endpoint::DtdHandler);
        self.links.link(
            LinkKind::DtdContentModel,
            dtd_scanner,
            Endpoint::Component(dtd_processor),
        );
        self.links.link(
            LinkKind::DtdContentModel,
            dtd_processor,
            Endpoint::DtdContentModelHandler,
        );

        let chain = if self.registry.settings().feature(NAMESPACES) == Some(true) {
            components.namespace_chain
        } else {
            self.plain_chain(version)
        };
        if self.current_scanner != Some(chain.scanner) {
            self.registry
                .set_property(DOCUMENT_SCANNER, XmlProperty::Component(chain.scanner))?;
            self.registry
                .set_property(DTD_VALIDATOR, XmlProperty::Component(chain.validator))?;
            self.current_scanner = Some(chain.scanner);
        }
        self.links
            .link(LinkKind::Document, chain.scanner, Endpoint::Component(chain.validator));
        self.links
            .link(LinkKind::Document, chain.validator, Endpoint::DocumentHandler);
        self.last_component = Some(chain.validator);
        self.active_version = Some(version);
        trace!(%version, scanner = ?chain.scanner, "pipeline configured");
        Ok(())
    }

    /// Detect the version of `source`, set up its pipeline and announce the document
    /// entity to the scanner.
    ///
    /// Returns `false` when the version could not be detected.
    fn start_document(&mut self, source: XmlInputSource) -> Result<bool, XniError> {
        self.scanning = false;
        self.validation
            .try_borrow_mut()
            .map_err(|_| XniError::Pipeline("the validation manager is already in use".into()))?
            .reset();
        self.detector.reset();
        self.registry.reset_set(ComponentSet::Common)?;

        let version = {
            let arena = self.registry.arena();
            let mut entities = arena.entity_manager(self.entity_manager)?;
            let mut reporter = arena.error_reporter(self.error_reporter)?;
            self.detector
                .determine_doc_version(source, &mut entities, &mut reporter)?
        };
        let Some(version) = version else {
            debug!("no version could be detected, nothing to parse");
            return Ok(false);
        };

        self.configure_pipeline(version)?;
        let set = match version {
            XmlVersion::Xml10 => ComponentSet::Xml10,
            XmlVersion::Xml11 => ComponentSet::Xml11,
        };
        self.registry.reset_set(set)?;
        self.registry.set_config_updated(false);

        let scanner_id = self
            .current_scanner
            .ok_or_else(|| XniError::Pipeline("no document scanner is configured".into()))?;
        let arena = self.registry.arena();
        let mut scanner = arena.document_scanner(scanner_id)?;
        let mut entities = arena.entity_manager(self.entity_manager)?;
        self.detector
            .start_document_parsing(&mut *scanner, version, &mut entities)?;
        self.scanning = true;
        Ok(true)
    }
}

impl Default for Xml11Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlParserConfiguration for Xml11Configuration {
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
        if let Some(last) = self.last_component {
            self.links
                .link(LinkKind::Document, last, Endpoint::DocumentHandler);
        }
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

impl XmlPullParserConfiguration for Xml11Configuration {
    fn set_input_source(&mut self, source: XmlInputSource) {
        self.input_source = Some(source);
    }

    fn parse_step(&mut self, complete: bool) -> Result<bool, XniError> {
        if let Some(source) = self.input_source.take() {
            if !self.start_document(source)? {
                return Ok(false);
            }
        }
        let Some(scanner) = self.current_scanner.filter(|_| self.scanning) else {
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
    use std::cell::Cell;

    use crate::{
        component::XmlComponent,
        error::{XmlErrorCode, XmlParseError},
        xni::{Augmentations, QName, XmlAttributes, XmlDocumentHandler, XmlErrorHandler},
    };

    use super::*;

    #[derive(Default)]
    struct Elements(Vec<String>);

    impl XmlDocumentHandler for Elements {
        fn start_element(
            &mut self,
            element: &QName,
            _attributes: &XmlAttributes,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!("<{}>", element.raw_name));
            Ok(())
        }

        fn empty_element(
            &mut self,
            element: &QName,
            _attributes: &XmlAttributes,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!("<{}/>", element.raw_name));
            Ok(())
        }

        fn end_element(&mut self, element: &QName, _augs: &Augmentations) -> Result<(), XniError> {
            self.0.push(format!("</{}>", element.raw_name));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Fatal(Vec<XmlErrorCode>);

    impl XmlErrorHandler for Fatal {
        fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.0.push(error.code);
            Ok(())
        }
    }

    struct CountResets(Rc<Cell<usize>>);

    impl XmlComponent for CountResets {
        fn reset(&mut self, _manager: &dyn XmlComponentManager) -> Result<(), XniError> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    fn source(text: &str) -> XmlInputSource {
        XmlInputSource::from_bytes(text.as_bytes().to_vec())
    }

    #[test]
    fn rules_test() {
        let config = Xml11Configuration::new();
        let rules = config.registry().rules();
        let settings = config.registry().settings();
        assert!(rules.check_feature(settings, DYNAMIC_VALIDATION).is_ok());
        assert!(rules.check_feature(settings, VALIDATE_DATATYPES).unwrap_err().is_not_supported());
        assert!(rules.check_feature(settings, PARSER_SETTINGS).unwrap_err().is_not_supported());
        assert!(rules.check_feature(settings, "urn:none").unwrap_err().is_not_recognized());
        assert!(rules.check_property(settings, JAXP_SCHEMA_SOURCE).is_ok());
        assert!(rules.check_property(settings, XML_STRING).unwrap_err().is_not_supported());
    }

    #[test]
    fn version_switch_test() {
        let mut config = Xml11Configuration::new();
        let elements = Rc::new(RefCell::new(Elements::default()));
        config.set_document_handler(Some(elements.clone()));
        assert_eq!(config.xml11_state(), &Xml11State::Uninitialized);
        assert!(config.registry().components(ComponentSet::Xml11).is_empty());

        config.parse(source("<a/>")).unwrap();
        let xml10 = *config.xml10_components();
        assert_eq!(config.active_version(), Some(XmlVersion::Xml10));
        assert_eq!(config.current_scanner(), Some(xml10.namespace_chain.scanner));
        assert_eq!(config.current_dtd_scanner(), Some(xml10.dtd_scanner));
        assert_eq!(config.current_datatype_factory(), Some(DtdDvFactory::Xml10));
        assert_eq!(config.xml11_state(), &Xml11State::Uninitialized);

        config.parse(source("<?xml version='1.1'?><b/>")).unwrap();
        let Xml11State::Initialized(xml11) = *config.xml11_state() else {
            panic!("XML 1.1 components were not created");
        };
        assert_eq!(config.current_scanner(), Some(xml11.namespace_chain.scanner));
        assert_eq!(config.current_dtd_scanner(), Some(xml11.dtd_scanner));
        assert_eq!(config.current_datatype_factory(), Some(DtdDvFactory::Xml11));
        assert_eq!(config.registry().components(ComponentSet::Xml11).len(), 4);

        let arena_len = config.registry().arena().len();
        config.parse(source("<?xml version='1.1'?><c/>")).unwrap();
        assert_eq!(*config.xml11_state(), Xml11State::Initialized(xml11));
        assert_eq!(config.registry().arena().len(), arena_len);
        assert_eq!(elements.borrow().0, ["<a/>", "<b/>", "<c/>"]);
    }

    #[test]
    fn common_reset_once_test() {
        let mut config = Xml11Configuration::new();
        let common = Rc::new(Cell::new(0));
        let xml10 = Rc::new(Cell::new(0));
        let xml11 = Rc::new(Cell::new(0));
        config.add_common_component(Component::Custom(Box::new(CountResets(common.clone()))));
        config.add_component(Component::Custom(Box::new(CountResets(xml10.clone()))));
        config.add_xml11_component(Component::Custom(Box::new(CountResets(xml11.clone()))));

        config.parse(source("<a/>")).unwrap();
        assert_eq!((common.get(), xml10.get(), xml11.get()), (1, 1, 0));
        config.parse(source("<?xml version='1.1'?><a/>")).unwrap();
        assert_eq!((common.get(), xml10.get(), xml11.get()), (2, 1, 1));
    }

    #[test]
    fn plain_chain_test() {
        let mut config = Xml11Configuration::new();
        config.set_feature(NAMESPACES, false).unwrap();
        config.parse(source("<a:b/>")).unwrap();
        let plain = config.xml10_components().plain_chain.unwrap();
        assert_eq!(config.current_scanner(), Some(plain.scanner));
        assert_eq!(config.last_component(), Some(plain.validator));

        let links = config.links().clone();
        let arena_len = config.registry().arena().len();
        config.parse(source("<a:b/>")).unwrap();
        assert_eq!(config.links(), &links);
        assert_eq!(config.registry().arena().len(), arena_len);
        assert_eq!(config.xml10_components().plain_chain, Some(plain));
    }

    #[test]
    fn detection_failure_test() {
        let mut config = Xml11Configuration::new();
        let fatal = Rc::new(RefCell::new(Fatal::default()));
        config.set_error_handler(fatal.clone()).unwrap();
        config.set_input_source(source(""));
        assert!(!config.parse_step(false).unwrap());
        assert!(!config.parse_step(true).unwrap());
        assert_eq!(fatal.borrow().0, [XmlErrorCode::PrematureEof]);
        assert_eq!(config.current_scanner(), None);
    }

    #[test]
    fn locale_test() {
        let mut config = Xml11Configuration::new();
        assert!(config.get_property(LOCALE).unwrap().is_none());
        config
            .set_property(LOCALE, XmlProperty::Locale("fr".to_owned()))
            .unwrap();
        assert_eq!(config.locale(), Some("fr"));
        let reporter = config.registry().arena().error_reporter(config.error_reporter()).unwrap();
        assert_eq!(reporter.locale(), Some("fr"));
        drop(reporter);
        config.set_locale(None);
        assert!(config.get_property(LOCALE).unwrap().is_none());
    }
}
