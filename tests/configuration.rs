mod common;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use common::{Recording, source};
use xpipe::{
    NonValidatingConfiguration, SharedConfiguration, Xml11Configuration, XmlConfigurationError,
    XmlParserConfiguration, XmlPullParserConfiguration,
    component::{Component, XmlComponent, XmlComponentManager, XmlProperty},
    constants::{
        CONTINUE_AFTER_FATAL_ERROR, DEFAULT_ATTRIBUTE_VALUES, DOCUMENT_SCANNER, DTD_SCANNER,
        DYNAMIC_VALIDATION, EXTERNAL_GENERAL_ENTITIES, EXTERNAL_PARAMETER_ENTITIES,
        GENERATE_SYNTHETIC_ANNOTATIONS, HONOUR_ALL_SCHEMALOCATIONS, ID_IDREF_CHECKING,
        IDENTITY_CONSTRAINT_CHECKING, IGNORE_XSI_TYPE, JAXP_SCHEMA_SOURCE, LOAD_EXTERNAL_DTD,
        LOCALE, NAMESPACE_GROWTH, NAMESPACES, NORMALIZE_DATA, PARSER_SETTINGS,
        SCHEMA_ELEMENT_DEFAULT, TOLERATE_DUPLICATES, UNPARSED_ENTITY_CHECKING,
        USE_GRAMMAR_POOL_ONLY, VALIDATE_ANNOTATIONS, VALIDATE_CONTENT_MODELS, VALIDATE_DATATYPES,
        VALIDATION, XML_STRING,
    },
    error::XniError,
    validation::InMemoryGrammarPool,
    xni::XmlInputSource,
};

const NOT_RECOGNIZED: &str = "http://example.com/features/unknown";

/// Refuses one feature and one property.
struct Refusing;

impl Refusing {
    const FEATURE: &'static str = "http://example.com/features/refused";
    const PROPERTY: &'static str = "http://example.com/properties/refused";
}

impl XmlComponent for Refusing {
    fn recognized_features(&self) -> &[&'static str] {
        &[Self::FEATURE]
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        (feature_id == Self::FEATURE).then_some(false)
    }

    fn recognized_properties(&self) -> &[&'static str] {
        &[Self::PROPERTY]
    }

    fn reset(&mut self, _manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        Ok(())
    }

    fn set_feature(&mut self, feature_id: &str, _state: bool) -> Result<(), XmlConfigurationError> {
        if feature_id == Self::FEATURE {
            return Err(XmlConfigurationError::not_supported(feature_id));
        }
        Ok(())
    }

    fn set_property(
        &mut self,
        property_id: &str,
        _value: &XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        if property_id == Self::PROPERTY {
            return Err(XmlConfigurationError::not_supported(property_id));
        }
        Ok(())
    }
}

#[test]
fn feature_defaults_test() {
    let config = Xml11Configuration::new();
    let defaults = [
        (VALIDATION, false),
        (NAMESPACES, true),
        (EXTERNAL_GENERAL_ENTITIES, true),
        (EXTERNAL_PARAMETER_ENTITIES, true),
        (CONTINUE_AFTER_FATAL_ERROR, false),
        (LOAD_EXTERNAL_DTD, true),
        (SCHEMA_ELEMENT_DEFAULT, true),
        (NORMALIZE_DATA, true),
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
    ];
    for (feature_id, state) in defaults {
        assert_eq!(config.get_feature(feature_id), Ok(state), "{feature_id}");
    }
    // Nothing changed since construction.
    assert_eq!(config.get_feature(PARSER_SETTINGS), Ok(false));
}

#[test]
fn not_recognized_test() {
    let mut config = Xml11Configuration::new();
    let err = config.get_feature(NOT_RECOGNIZED).unwrap_err();
    assert!(err.is_not_recognized());
    assert_eq!(err.identifier(), NOT_RECOGNIZED);
    assert!(config.set_feature(NOT_RECOGNIZED, true).unwrap_err().is_not_recognized());
    assert!(
        config
            .set_property(NOT_RECOGNIZED, XmlProperty::Integer(1))
            .unwrap_err()
            .is_not_recognized()
    );
    assert!(config.get_property(NOT_RECOGNIZED).unwrap_err().is_not_recognized());

    // Recognized once declared.
    config.add_recognized_features(&[NOT_RECOGNIZED]);
    config.set_feature(NOT_RECOGNIZED, true).unwrap();
    assert_eq!(config.get_feature(NOT_RECOGNIZED), Ok(true));
}

#[test]
fn not_supported_test() {
    let mut config = Xml11Configuration::new();
    for feature_id in [VALIDATE_DATATYPES, VALIDATE_CONTENT_MODELS, DEFAULT_ATTRIBUTE_VALUES] {
        let err = config.set_feature(feature_id, true).unwrap_err();
        assert!(err.is_not_supported(), "{feature_id}");
        assert_eq!(err.identifier(), feature_id);
        // The refused value was not stored.
        assert!(config.get_feature(feature_id).unwrap_err().is_not_supported());
    }
    assert!(config.set_feature(PARSER_SETTINGS, false).unwrap_err().is_not_supported());
    assert!(
        config
            .set_property(XML_STRING, XmlProperty::String("<a/>".into()))
            .unwrap_err()
            .is_not_supported()
    );

    // Accepted although nothing declares them.
    assert_eq!(config.get_feature(DYNAMIC_VALIDATION), Ok(false));
    config.set_feature(DYNAMIC_VALIDATION, true).unwrap();
    assert_eq!(config.get_feature(DYNAMIC_VALIDATION), Ok(true));
    assert!(config.get_property(JAXP_SCHEMA_SOURCE).unwrap().is_none());
}

#[test]
fn component_properties_test() {
    let mut config = Xml11Configuration::new();
    let xml10 = *config.xml10_components();
    assert!(matches!(
        config.get_property(DOCUMENT_SCANNER),
        Ok(Some(XmlProperty::Component(id))) if id == xml10.namespace_chain.scanner
    ));
    assert!(matches!(
        config.get_property(DTD_SCANNER),
        Ok(Some(XmlProperty::Component(id))) if id == xml10.dtd_scanner
    ));

    config.parse(source("<?xml version='1.1'?><a/>")).unwrap();
    let current = config.current_dtd_scanner();
    assert_ne!(current, Some(xml10.dtd_scanner));
    assert!(matches!(
        config.get_property(DTD_SCANNER),
        Ok(Some(XmlProperty::Component(id))) if Some(id) == current
    ));
}

#[test]
fn best_effort_xml11_broadcast_test() {
    let mut config = Xml11Configuration::new();
    config.add_xml11_component(Component::Custom(Box::new(Refusing)));
    assert_eq!(config.get_feature(Refusing::FEATURE), Ok(false));

    config.set_feature(Refusing::FEATURE, true).unwrap();
    assert_eq!(config.get_feature(Refusing::FEATURE), Ok(true));
    config
        .set_property(Refusing::PROPERTY, XmlProperty::Integer(3))
        .unwrap();
    assert!(matches!(
        config.get_property(Refusing::PROPERTY),
        Ok(Some(XmlProperty::Integer(3)))
    ));

    let suppressed = config.take_suppressed_errors();
    assert_eq!(
        suppressed,
        [
            XmlConfigurationError::not_supported(Refusing::FEATURE),
            XmlConfigurationError::not_supported(Refusing::PROPERTY),
        ]
    );
    assert!(config.suppressed_errors().is_empty());
}

#[test]
fn strict_xml10_broadcast_test() {
    let mut config = Xml11Configuration::new();
    config.add_component(Component::Custom(Box::new(Refusing)));

    let err = config.set_feature(Refusing::FEATURE, true).unwrap_err();
    assert!(err.is_not_supported());
    assert_eq!(config.get_feature(Refusing::FEATURE), Ok(false));
    assert!(
        config
            .set_property(Refusing::PROPERTY, XmlProperty::Integer(3))
            .is_err()
    );
    assert!(config.get_property(Refusing::PROPERTY).unwrap().is_none());
    assert!(config.suppressed_errors().is_empty());

    let mut config = Xml11Configuration::new();
    config.add_common_component(Component::Custom(Box::new(Refusing)));
    assert!(config.set_feature(Refusing::FEATURE, true).is_err());
}

/// Refuses the first `DTD_SCANNER` it is given.
struct RefusingOnce(Rc<Cell<bool>>);

impl XmlComponent for RefusingOnce {
    fn recognized_features(&self) -> &[&'static str] {
        &[]
    }

    fn recognized_properties(&self) -> &[&'static str] {
        &[]
    }

    fn reset(&mut self, _manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        Ok(())
    }

    fn set_property(
        &mut self,
        property_id: &str,
        _value: &XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        if property_id == DTD_SCANNER && self.0.replace(false) {
            return Err(XmlConfigurationError::not_supported(property_id));
        }
        Ok(())
    }
}

#[test]
fn refused_relink_test() {
    let mut config = Xml11Configuration::new();
    let armed = Rc::new(Cell::new(false));
    config.add_common_component(Component::Custom(Box::new(RefusingOnce(armed.clone()))));
    let recording = Recording::new();
    recording.attach(&mut config);
    let xml10 = *config.xml10_components();
    armed.set(true);

    let document = "<?xml version='1.1'?><!DOCTYPE a [<!ELEMENT a ANY>]><a/>";
    assert!(config.parse(source(document)).is_err());
    assert!(!armed.get());
    assert_eq!(config.current_dtd_scanner(), Some(xml10.dtd_scanner));

    recording.clear();
    config.parse(source(document)).unwrap();
    let current = config.current_dtd_scanner();
    assert_ne!(current, Some(xml10.dtd_scanner));
    assert!(matches!(
        config.get_property(DTD_SCANNER),
        Ok(Some(XmlProperty::Component(id))) if Some(id) == current
    ));
    assert!(recording.events().iter().any(|e| e == "elementDecl a ANY"));
}

#[test]
fn locale_test() {
    let mut config = Xml11Configuration::new();
    assert_eq!(config.locale(), None);
    assert!(config.get_property(LOCALE).unwrap().is_none());

    config
        .set_property(LOCALE, XmlProperty::Locale("fr".into()))
        .unwrap();
    assert_eq!(config.locale(), Some("fr"));
    config.set_locale(Some("de".into()));
    assert!(matches!(
        config.get_property(LOCALE),
        Ok(Some(XmlProperty::Locale(locale))) if locale == "de"
    ));

    // A plain string names a locale too.
    config
        .set_property(LOCALE, XmlProperty::String("ja".into()))
        .unwrap();
    assert_eq!(config.locale(), Some("ja"));
    assert!(matches!(
        config.get_property(LOCALE),
        Ok(Some(XmlProperty::Locale(locale))) if locale == "ja"
    ));

    let mut config = NonValidatingConfiguration::new();
    config
        .set_property(LOCALE, XmlProperty::String("it".into()))
        .unwrap();
    assert!(matches!(
        config.get_property(LOCALE),
        Ok(Some(XmlProperty::Locale(locale))) if locale == "it"
    ));
}

#[test]
fn error_handler_property_test() {
    let mut config = Xml11Configuration::new();
    assert!(config.error_handler().is_none());

    let recording = Recording::new();
    recording.attach(&mut config);
    assert!(config.error_handler().is_some());
    assert!(config.get_feature(PARSER_SETTINGS).unwrap());

    assert!(config.parse(source("<a>")).is_err());
    assert!(!recording.codes().is_empty());
}

#[test]
fn nonvalidating_recognition_test() {
    let mut config = NonValidatingConfiguration::new();
    assert_eq!(config.get_feature(NAMESPACES), Ok(true));
    assert_eq!(config.get_feature(CONTINUE_AFTER_FATAL_ERROR), Ok(false));
    assert!(config.get_feature(NOT_RECOGNIZED).unwrap_err().is_not_recognized());
    assert!(config.set_feature(VALIDATE_DATATYPES, true).is_err());
    config.set_feature(CONTINUE_AFTER_FATAL_ERROR, true).unwrap();
    assert_eq!(config.get_feature(CONTINUE_AFTER_FATAL_ERROR), Ok(true));
}

#[test]
fn grammar_pool_test() {
    let pool = Rc::new(RefCell::new(InMemoryGrammarPool::new()));
    let mut config = Xml11Configuration::with_components(None, Some(pool.clone()));
    let recording = Recording::new();
    recording.attach(&mut config);

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/valid/external.xml");
    let bytes = std::fs::read(path).unwrap();
    config
        .parse(XmlInputSource::from_bytes(bytes.clone()).with_system_id(path))
        .unwrap();
    assert_eq!(pool.borrow().len(), 1);
    let first = recording.elements();

    recording.clear();
    config
        .parse(XmlInputSource::from_bytes(bytes).with_system_id(path))
        .unwrap();
    assert_eq!(pool.borrow().len(), 1);
    // The cached grammar still supplies the attribute defaults.
    assert_eq!(recording.elements(), first);
    assert!(recording.errors().is_empty());
    assert!(first.iter().any(|e| e.contains("lang=en*")));
}

#[test]
fn shared_configuration_test() {
    let shared = SharedConfiguration::new(Xml11Configuration::new());
    let recording = Recording::new();
    shared.with(|config| recording.attach(config)).unwrap();
    shared
        .with(|config| config.set_feature(NAMESPACES, false))
        .unwrap()
        .unwrap();

    shared.set_input_source(source("<x:a xmlns:x='u'/>")).unwrap();
    while shared.parse_step(false).unwrap() {}
    shared.cleanup().unwrap();
    assert_eq!(recording.elements(), ["empty x:a xmlns:x=u"]);

    let copy = shared.clone();
    assert_eq!(copy.borrow().unwrap().get_feature(NAMESPACES), Ok(false));
}
