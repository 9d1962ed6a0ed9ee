mod common;

use common::{Recording, source};
use xpipe::{
    NonValidatingConfiguration, Xml11Configuration, XmlParserConfiguration,
    XmlPullParserConfiguration, XmlVersion,
    config::Xml11State,
    constants::{CONTINUE_AFTER_FATAL_ERROR, NAMESPACES, VALIDATION},
    error::{XmlErrorCode, XmlErrorLevel, XniError},
    pipeline::{Endpoint, LinkKind},
};

#[test]
fn xml11_namespace_binding_test() {
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);

    config
        .parse(source(r#"<?xml version="1.1"?><a xmlns:x="u"/>"#))
        .unwrap();
    assert_eq!(config.active_version(), Some(XmlVersion::Xml11));
    assert_eq!(recording.elements(), ["empty a xmlns:x=u [x->u]"]);
    assert!(!recording.events().iter().any(|e| e.contains("[dtd]")));
    assert!(recording.errors().is_empty());
}

#[test]
fn version_specific_binding_test() {
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);

    // XML 1.1 may undeclare a prefix.
    config
        .parse(source(
            "<?xml version='1.1'?><a xmlns:x='u'><b xmlns:x=''/></a>",
        ))
        .unwrap();
    assert_eq!(
        recording.elements(),
        ["start a xmlns:x=u [x->u]", "empty b xmlns:x= [x->]", "end a"]
    );
    assert!(recording.errors().is_empty());

    // XML 1.0 may not.
    recording.clear();
    let err = config
        .parse(source("<a xmlns:x='u'><b xmlns:x=''/></a>"))
        .unwrap_err();
    assert!(matches!(err, XniError::Parse(e) if e.code == XmlErrorCode::EmptyPrefixedAttName));
    assert_eq!(config.active_version(), Some(XmlVersion::Xml10));
    assert_eq!(recording.codes(), [XmlErrorCode::EmptyPrefixedAttName]);
}

#[test]
fn incremental_parse_test() {
    const ITEMS: usize = 100_000;
    let mut doc = String::from("<?xml version='1.0'?><root>");
    for i in 0..ITEMS {
        doc.push_str(&format!("<item n='{i}'>text {i}</item>"));
    }
    doc.push_str("</root>");
    // Several megabytes, so the entity buffer is refilled many times.
    assert!(doc.len() > 3_000_000);

    let mut config = Xml11Configuration::new();
    let complete = Recording::new();
    complete.attach(&mut config);
    config.parse(source(&doc)).unwrap();

    let incremental = Recording::new();
    incremental.attach(&mut config);
    config.set_input_source(source(&doc));
    assert!(config.parse_step(false).unwrap());
    let mut steps = 1;
    while config.parse_step(false).unwrap() {
        steps += 1;
    }
    config.cleanup();
    config.cleanup();

    assert!(steps > 1);
    assert_eq!(incremental.events(), complete.events());
    assert_eq!(complete.elements().len(), 2 * ITEMS + 2);
    // Nothing is pending any more.
    assert!(!config.parse_step(true).unwrap());
}

#[test]
fn parser_settings_test() {
    let mut config = Xml11Configuration::new();
    assert!(!config.get_feature(xpipe::constants::PARSER_SETTINGS).unwrap());
    config.set_feature(NAMESPACES, true).unwrap();
    assert!(config.get_feature(xpipe::constants::PARSER_SETTINGS).unwrap());
    config.parse(source("<a/>")).unwrap();
    assert!(!config.get_feature(xpipe::constants::PARSER_SETTINGS).unwrap());

    // Creating the XML 1.1 set does not leave the configuration dirty.
    config.parse(source("<?xml version='1.1'?><a/>")).unwrap();
    assert!(!config.get_feature(xpipe::constants::PARSER_SETTINGS).unwrap());
}

#[test]
fn relink_on_version_switch_test() {
    let mut config = Xml11Configuration::new();
    config.parse(source("<a/>")).unwrap();
    let xml10 = *config.xml10_components();
    let links = config.links();
    assert_eq!(
        links.chain(LinkKind::Document, xml10.namespace_chain.scanner),
        (
            vec![xml10.namespace_chain.validator],
            Some(Endpoint::DocumentHandler)
        )
    );
    assert_eq!(
        links.source_of(LinkKind::Dtd, Endpoint::DtdHandler),
        Some(xml10.dtd_processor)
    );

    config.parse(source("<?xml version='1.1'?><a/>")).unwrap();
    let Xml11State::Initialized(xml11) = *config.xml11_state() else {
        panic!("XML 1.1 components were not created");
    };
    let links = config.links();
    assert_eq!(
        links.source_of(LinkKind::Document, Endpoint::DocumentHandler),
        Some(xml11.namespace_chain.validator)
    );
    assert_eq!(
        links.handler_of(LinkKind::Document, xml10.namespace_chain.validator),
        None
    );
    assert_eq!(
        links.source_of(LinkKind::Dtd, Endpoint::DtdHandler),
        Some(xml11.dtd_processor)
    );
    assert_eq!(
        links.source_of(LinkKind::DtdContentModel, Endpoint::DtdContentModelHandler),
        Some(xml11.dtd_processor)
    );
    assert_eq!(config.last_component(), Some(xml11.namespace_chain.validator));
}

#[test]
fn dtd_chain_test() {
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);
    config
        .parse(source(
            "<!DOCTYPE a [<!ELEMENT a ANY><!ATTLIST a d CDATA 'x'>]><a/>",
        ))
        .unwrap();
    let events = recording.events();
    for expected in ["contentModel a", "elementDecl a ANY", "attributeDecl a d"] {
        assert!(events.iter().any(|e| e == expected), "missing {expected}");
    }
    // Defaults are applied without validation.
    assert_eq!(recording.elements(), ["empty a d=x*"]);
}

#[test]
fn handler_replacement_test() {
    let mut config = Xml11Configuration::new();
    let first = Recording::new();
    first.attach(&mut config);
    config.parse(source("<a/>")).unwrap();

    let second = Recording::new();
    second.attach(&mut config);
    config.parse(source("<b/>")).unwrap();
    assert_eq!(first.elements(), ["empty a"]);
    assert_eq!(second.elements(), ["empty b"]);

    config.set_document_handler(None);
    config.parse(source("<c/>")).unwrap();
    assert_eq!(second.elements(), ["empty b"]);
}

#[test]
fn validation_test() {
    let doc = "<!DOCTYPE a [<!ELEMENT a (b)><!ELEMENT b EMPTY>]><a></a>";
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);

    config.parse(source(doc)).unwrap();
    assert!(recording.errors().is_empty());

    config.set_feature(VALIDATION, true).unwrap();
    config.parse(source(doc)).unwrap();
    assert_eq!(
        recording.errors(),
        [(XmlErrorLevel::Error, XmlErrorCode::ContentInvalid)]
    );
}

#[test]
fn continue_after_fatal_test() {
    let mut config = Xml11Configuration::new();
    let recording = Recording::new();
    recording.attach(&mut config);

    assert!(config.parse(source("<a x='1' x='2'/>")).is_err());
    assert!(recording.elements().is_empty());

    recording.clear();
    config.set_feature(CONTINUE_AFTER_FATAL_ERROR, true).unwrap();
    config.parse(source("<a x='1' x='2'/>")).unwrap();
    assert_eq!(recording.codes(), [XmlErrorCode::AttributeNotUnique]);
    assert_eq!(recording.elements(), ["empty a x=1"]);
}

#[test]
fn nonvalidating_version_test() {
    let mut config = NonValidatingConfiguration::new();
    let recording = Recording::new();
    recording.attach(&mut config);

    let err = config
        .parse(source("<?xml version='1.1'?><a/>"))
        .unwrap_err();
    assert!(matches!(err, XniError::Parse(e) if e.code == XmlErrorCode::VersionNotSupported));

    recording.clear();
    config.set_feature(NAMESPACES, false).unwrap();
    config.parse(source("<x:a xmlns:x='u'/>")).unwrap();
    assert_eq!(recording.elements(), ["empty x:a xmlns:x=u"]);
}
