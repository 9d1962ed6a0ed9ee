//! Provide the DTD validator, the document stage that applies the grammar of the
//! document: attribute defaulting and normalization, validity constraints, and, in a
//! namespace-aware pipeline, namespace binding.
//!
//! Binding happens here rather than in the scanner because it must see the attributes
//! the DTD defaults, `xmlns` declarations included.

use std::{collections::HashSet, rc::Rc};

use crate::{
    chars::XmlCharValid,
    component::{XmlComponent, XmlComponentManager, XmlProperty},
    constants::{
        DATATYPE_VALIDATOR_FACTORY, DYNAMIC_VALIDATION, ERROR_REPORTER, ID_IDREF_CHECKING,
        NAMESPACES, PARSER_SETTINGS, SYMBOL_TABLE, VALIDATION, VALIDATION_MANAGER, XmlVersion,
    },
    dtd::{
        AttDefault, AttType, ContentSpec, DtdDvFactory, DtdGrammar, ElementDecl,
        XmlAttributeDecl, collapse_spaces,
    },
    error::{XmlConfigurationError, XmlErrorCode, XniError},
    namespace::NamespaceContext,
    pipeline::{DocumentNext, PipelineContext},
    symbols::SymbolTable,
    xni::{Augmentations, DocumentEvent, QName, XmlAttribute, XmlAttributes},
};

#[derive(Debug)]
struct OpenElement {
    name: QName,
    /// A namespace context was pushed for this element.
    bound: bool,
    children: Vec<Rc<str>>,
    /// Character data other than ignorable whitespace was seen.
    has_text: bool,
}

#[doc(alias = "XMLDTDValidator")]
#[doc(alias = "XMLNSDTDValidator")]
pub struct XmlDtdValidator {
    version: XmlVersion,
    namespace_aware: bool,
    namespaces: bool,
    validation: bool,
    dynamic_validation: bool,
    id_idref_checking: bool,
    datatype_factory: DtdDvFactory,
    symbols: Rc<SymbolTable>,
    configured: bool,

    grammar: Option<Rc<DtdGrammar>>,
    validating: bool,
    root_seen: bool,
    doctype_root: Option<String>,
    in_cdata: bool,
    elements: Vec<OpenElement>,
    namespace_context: NamespaceContext,
    ids: HashSet<String>,
    idrefs: Vec<String>,
}

impl XmlDtdValidator {
    const RECOGNIZED_FEATURES: &[&str] =
        &[NAMESPACES, VALIDATION, DYNAMIC_VALIDATION, ID_IDREF_CHECKING];
    const RECOGNIZED_PROPERTIES: &[&str] = &[
        SYMBOL_TABLE,
        ERROR_REPORTER,
        VALIDATION_MANAGER,
        DATATYPE_VALIDATOR_FACTORY,
    ];

    /// A validator for documents of `version`. A namespace-aware validator binds the
    /// names of the elements it passes on while the `namespaces` feature is set.
    pub fn new(version: XmlVersion, namespace_aware: bool) -> Self {
        Self {
            version,
            namespace_aware,
            namespaces: namespace_aware,
            validation: false,
            dynamic_validation: false,
            id_idref_checking: true,
            datatype_factory: DtdDvFactory::for_version(version),
            symbols: Rc::new(SymbolTable::new()),
            configured: false,
            grammar: None,
            validating: false,
            root_seen: false,
            doctype_root: None,
            in_cdata: false,
            elements: vec![],
            namespace_context: NamespaceContext::new(),
            ids: HashSet::new(),
            idrefs: vec![],
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    pub fn is_namespace_aware(&self) -> bool {
        self.namespace_aware
    }

    pub fn binds_namespaces(&self) -> bool {
        self.namespace_aware && self.namespaces
    }

    pub fn datatype_factory(&self) -> DtdDvFactory {
        self.datatype_factory
    }

    fn clear(&mut self) {
        self.grammar = None;
        self.validating = false;
        self.root_seen = false;
        self.doctype_root = None;
        self.in_cdata = false;
        self.elements.clear();
        self.namespace_context.reset();
        self.ids.clear();
        self.idrefs.clear();
    }

    fn element_decl(&self, name: &str) -> Option<&ElementDecl> {
        self.grammar.as_deref().and_then(|grammar| grammar.element(name))
    }

    fn make_qname(&self, raw: &str) -> QName {
        if self.binds_namespaces() {
            QName::split(raw, &self.symbols)
        } else {
            QName::unprefixed(self.symbols.add_symbol(raw))
        }
    }

    fn start_root(&mut self, element: &str, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        self.root_seen = true;
        self.grammar = cx.validation.grammar().cloned();
        self.validating = self.validation && (!self.dynamic_validation || self.grammar.is_some());
        if !self.validating {
            return Ok(());
        }
        match self.doctype_root.as_deref() {
            _ if self.grammar.is_none() => cx.error(XmlErrorCode::GrammarNotFound, &[]),
            Some(root) if root != element => {
                let root = root.to_owned();
                cx.error(XmlErrorCode::RootElementTypeMismatch, &[&root, element])
            }
            _ => Ok(()),
        }
    }

    /// Check an attribute value against its declaration.
    fn validate_attribute(
        &mut self,
        element: &str,
        decl: &XmlAttributeDecl,
        value: &str,
        cx: &mut PipelineContext<'_>,
    ) -> Result<(), XniError> {
        let attribute = decl.attribute_name.as_str();
        if let AttDefault::Fixed(fixed) = &decl.default {
            if value != fixed {
                cx.error(
                    XmlErrorCode::FixedAttValueInvalid,
                    &[element, attribute, value, fixed],
                )?;
            }
        }
        if let AttType::Enumeration(_) | AttType::Notation(_) = decl.att_type {
            if !self.datatype_factory.validate(&decl.att_type, value) {
                cx.error(
                    XmlErrorCode::AttributeValueNotInList,
                    &[attribute, value, &decl.att_type.to_string()],
                )?;
            }
            return Ok(());
        }
        if !self.datatype_factory.validate(&decl.att_type, value) {
            return cx.error(
                XmlErrorCode::AttributeValueInvalid,
                &[decl.att_type.name(), attribute, value],
            );
        }
        let tokens = value.split(' ').filter(|t| !t.is_empty());
        match decl.att_type {
            AttType::Id if self.id_idref_checking => {
                if !self.ids.insert(value.to_owned()) {
                    cx.error(XmlErrorCode::IdNotUnique, &[value])?;
                }
            }
            AttType::IdRef | AttType::IdRefs if self.id_idref_checking => {
                self.idrefs.extend(tokens.map(str::to_owned));
            }
            AttType::Entity | AttType::Entities => {
                for token in tokens {
                    let unparsed = self
                        .grammar
                        .as_deref()
                        .is_some_and(|grammar| grammar.is_unparsed_entity(token));
                    if !unparsed {
                        cx.error(XmlErrorCode::EntityNotUnparsed, &[token])?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Type and normalize the specified attributes, then add the defaulted ones.
    fn process_attributes(
        &mut self,
        element: &str,
        attributes: &mut XmlAttributes,
        cx: &mut PipelineContext<'_>,
    ) -> Result<(), XniError> {
        let Some(grammar) = self.grammar.clone() else {
            return Ok(());
        };
        for index in 0..attributes.len() {
            let Some(attribute) = attributes.get_mut(index) else {
                break;
            };
            let name = attribute.name.raw_name.clone();
            match grammar.attribute(element, &name) {
                Some(decl) => {
                    attribute.att_type = decl.att_type.name();
                    if decl.att_type != AttType::CData {
                        attribute.value = collapse_spaces(&attribute.value);
                    }
                    if self.validating {
                        let value = attribute.value.clone();
                        self.validate_attribute(element, decl, &value, cx)?;
                    }
                }
                None if self.validating => {
                    cx.error(XmlErrorCode::AttributeNotDeclared, &[element, &name])?;
                }
                None => {}
            }
        }

        for decl in grammar.attributes(element) {
            if attributes.index_of(&decl.attribute_name).is_some() {
                continue;
            }
            match &decl.default {
                AttDefault::Required if self.validating => {
                    cx.error(
                        XmlErrorCode::RequiredAttributeNotSpecified,
                        &[element, &decl.attribute_name],
                    )?;
                }
                AttDefault::Fixed(value) | AttDefault::Default(value) => {
                    attributes.push(XmlAttribute {
                        name: self.make_qname(&decl.attribute_name),
                        att_type: decl.att_type.name(),
                        value: value.clone(),
                        non_normalized_value: decl
                            .non_normalized_default
                            .clone()
                            .unwrap_or_else(|| value.clone()),
                        specified: false,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn start_element(
        &mut self,
        element: &mut QName,
        attributes: &mut XmlAttributes,
        augs: &mut Augmentations,
        cx: &mut PipelineContext<'_>,
    ) -> Result<(), XniError> {
        let raw = element.raw_name.clone();
        if !self.root_seen {
            self.start_root(&raw, cx)?;
        }
        if self.validating {
            if let Some(parent) = self.elements.last_mut() {
                parent.children.push(raw.clone());
            }
            if self.grammar.is_some() && self.element_decl(&raw).is_none() {
                cx.error(XmlErrorCode::ElementNotDeclared, &[&raw])?;
            }
        }
        self.process_attributes(&raw, attributes, cx)?;

        let bound = self.binds_namespaces();
        if bound {
            self.namespace_context.push_context();
            let (bindings, errors) = self.namespace_context.bind_start_element(
                element,
                attributes,
                self.version,
                &self.symbols,
            );
            for error in &errors {
                let args = error.args.iter().map(String::as_str).collect::<Vec<_>>();
                cx.fatal(error.code, &args)?;
            }
            augs.namespace_bindings = bindings;
        }
        self.elements.push(OpenElement {
            name: element.clone(),
            bound,
            children: vec![],
            has_text: false,
        });
        Ok(())
    }

    /// Close the innermost element, checking its content.
    ///
    /// Returns the element name as it was passed on at the start tag.
    fn end_element(&mut self, cx: &mut PipelineContext<'_>) -> Result<Option<OpenElement>, XniError> {
        let Some(open) = self.elements.pop() else {
            return Ok(None);
        };
        if self.validating {
            self.check_content(&open, cx)?;
        }
        Ok(Some(open))
    }

    fn check_content(&self, open: &OpenElement, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        let Some(decl) = self.element_decl(&open.name.raw_name) else {
            return Ok(());
        };
        let valid = match &decl.content_spec {
            ContentSpec::Any => true,
            ContentSpec::Empty => open.children.is_empty() && !open.has_text,
            ContentSpec::Mixed(allowed) => open.children.iter().all(|c| allowed.contains(c)),
            ContentSpec::Children(particle) => !open.has_text && particle.matches(&open.children),
        };
        if valid {
            return Ok(());
        }
        let model = match decl.content_spec {
            ContentSpec::Empty => "EMPTY",
            _ => decl.content_model.as_str(),
        };
        let name = decl.name.clone();
        cx.error(XmlErrorCode::ContentInvalid, &[&name, model])
    }

    /// Classify character data by the content of the current element.
    ///
    /// Returns `true` when the text is ignorable whitespace.
    fn characters(&mut self, text: &str, cx: &mut PipelineContext<'_>) -> Result<bool, XniError> {
        let Some(current) = self.elements.last() else {
            return Ok(false);
        };
        let Some(decl) = self.element_decl(&current.name.raw_name) else {
            return Ok(false);
        };
        let whitespace = text.chars().all(|c| c.is_xml_space());
        let (element_only, empty, external) = (
            matches!(decl.content_spec, ContentSpec::Children(_)),
            decl.content_spec == ContentSpec::Empty,
            decl.external,
        );
        if element_only && whitespace && !self.in_cdata {
            if self.validating && external && cx.validation.is_standalone() {
                let name = current.name.raw_name.clone();
                cx.error(XmlErrorCode::StandaloneWhitespace, &[&name])?;
            }
            return Ok(true);
        }
        if (element_only || empty) && self.validating {
            if let Some(current) = self.elements.last_mut() {
                current.has_text = true;
            }
        }
        Ok(false)
    }

    fn end_document(&mut self, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        if !self.validating || !self.id_idref_checking {
            return Ok(());
        }
        let mut reported = HashSet::new();
        for idref in std::mem::take(&mut self.idrefs) {
            if !self.ids.contains(&idref) && reported.insert(idref.clone()) {
                cx.error(XmlErrorCode::ElementWithIdRequired, &[&idref])?;
            }
        }
        Ok(())
    }

    /// Pass a document event through: default and check it, bind its names, and forward it.
    pub fn filter_document(
        &mut self,
        event: DocumentEvent,
        augs: &Augmentations,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        match event {
            DocumentEvent::StartDocument { .. } => {
                self.clear();
                next.emit(event, augs, cx)
            }
            DocumentEvent::DoctypeDecl { ref root_element, .. } => {
                self.doctype_root = Some(root_element.clone());
                next.emit(event, augs, cx)
            }
            DocumentEvent::StartElement {
                mut element,
                mut attributes,
            } => {
                let mut augs = augs.clone();
                self.start_element(&mut element, &mut attributes, &mut augs, cx)?;
                next.emit(DocumentEvent::StartElement { element, attributes }, &augs, cx)
            }
            DocumentEvent::EmptyElement {
                mut element,
                mut attributes,
            } => {
                let mut augs = augs.clone();
                self.start_element(&mut element, &mut attributes, &mut augs, cx)?;
                next.emit(DocumentEvent::EmptyElement { element, attributes }, &augs, cx)?;
                if let Some(open) = self.end_element(cx)? {
                    if open.bound {
                        self.namespace_context.pop_context();
                    }
                }
                Ok(())
            }
            DocumentEvent::EndElement(name) => {
                let Some(open) = self.end_element(cx)? else {
                    return next.emit(DocumentEvent::EndElement(name), augs, cx);
                };
                next.emit(DocumentEvent::EndElement(open.name), augs, cx)?;
                if open.bound {
                    self.namespace_context.pop_context();
                }
                Ok(())
            }
            DocumentEvent::Characters(text) => {
                if self.characters(&text, cx)? {
                    next.emit(DocumentEvent::IgnorableWhitespace(text), augs, cx)
                } else {
                    next.emit(DocumentEvent::Characters(text), augs, cx)
                }
            }
            DocumentEvent::StartCdata => {
                self.in_cdata = true;
                next.emit(event, augs, cx)
            }
            DocumentEvent::EndCdata => {
                self.in_cdata = false;
                next.emit(event, augs, cx)
            }
            DocumentEvent::EndDocument => {
                self.end_document(cx)?;
                next.emit(event, augs, cx)
            }
            event => next.emit(event, augs, cx),
        }
    }
}

impl XmlComponent for XmlDtdValidator {
    fn recognized_features(&self) -> &[&'static str] {
        Self::RECOGNIZED_FEATURES
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        match feature_id {
            DYNAMIC_VALIDATION => Some(false),
            ID_IDREF_CHECKING => Some(true),
            _ => None,
        }
    }

    fn recognized_properties(&self) -> &[&'static str] {
        Self::RECOGNIZED_PROPERTIES
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.clear();
        if let Some(XmlProperty::DatatypeFactory(factory)) =
            manager.property(DATATYPE_VALIDATOR_FACTORY)
        {
            self.datatype_factory = factory;
        }
        if self.configured && !manager.feature_or(PARSER_SETTINGS, true) {
            return Ok(());
        }
        self.namespaces = manager.feature_or(NAMESPACES, self.namespace_aware);
        self.validation = manager.feature_or(VALIDATION, false);
        self.dynamic_validation = manager.feature_or(DYNAMIC_VALIDATION, false);
        self.id_idref_checking = manager.feature_or(ID_IDREF_CHECKING, true);
        if let Some(XmlProperty::SymbolTable(symbols)) = manager.property(SYMBOL_TABLE) {
            self.symbols = symbols;
        }
        self.configured = true;
        Ok(())
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        match feature_id {
            NAMESPACES => self.namespaces = state,
            VALIDATION => self.validation = state,
            DYNAMIC_VALIDATION => self.dynamic_validation = state,
            ID_IDREF_CHECKING => self.id_idref_checking = state,
            _ => {}
        }
        Ok(())
    }

    fn set_property(
        &mut self,
        property_id: &str,
        value: &XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        match (property_id, value) {
            (DATATYPE_VALIDATOR_FACTORY, XmlProperty::DatatypeFactory(factory)) => {
                self.datatype_factory = *factory
            }
            (DATATYPE_VALIDATOR_FACTORY, _) => {
                return Err(XmlConfigurationError::not_supported(property_id));
            }
            (SYMBOL_TABLE, XmlProperty::SymbolTable(symbols)) => self.symbols = symbols.clone(),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::{
        component::{Component, ComponentArena},
        dtd::{XmlDtdProcessor, XmlDtdScanner},
        entity::XmlEntityManager,
        error::XmlParseError,
        pipeline::{DtdNext, DtdPipeline},
        reporter::XmlErrorReporter,
        scanner::XmlDocumentScanner,
        validation::ValidationManager,
        xni::{XmlDocumentHandler, XmlErrorHandler, XmlInputSource},
    };

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
            let attrs = attributes
                .iter()
                .map(|a| format!(" {}={}{}", a.name, a.value, if a.specified { "" } else { "*" }))
                .collect::<String>();
            self.0.push(format!(
                "start {element}{attrs} bindings={}",
                augs.namespace_bindings.len()
            ));
            Ok(())
        }

        fn empty_element(
            &mut self,
            element: &QName,
            attributes: &XmlAttributes,
            augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.start_element(element, attributes, augs)?;
            self.end_element(element, augs)
        }

        fn characters(&mut self, text: &str, _augs: &Augmentations) -> Result<(), XniError> {
            self.0.push(format!("text {text}"));
            Ok(())
        }

        fn ignorable_whitespace(&mut self, _text: &str, _augs: &Augmentations) -> Result<(), XniError> {
            self.0.push("ignorable".to_owned());
            Ok(())
        }

        fn end_element(&mut self, element: &QName, _augs: &Augmentations) -> Result<(), XniError> {
            self.0.push(format!("end {element}"));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Codes(Vec<XmlErrorCode>);

    impl XmlErrorHandler for Codes {
        fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.0.push(error.code);
            Ok(())
        }
    }

    fn validate(
        doc: &str,
        configure: impl FnOnce(&mut XmlDtdValidator),
    ) -> Result<(Vec<String>, Vec<XmlErrorCode>), XniError> {
        let codes = Rc::new(RefCell::new(Codes::default()));
        let mut entities = XmlEntityManager::new();
        let mut reporter = XmlErrorReporter::new();
        reporter.set_error_handler(Some(codes.clone()));
        let mut validation = ValidationManager::new();
        let mut scanner = XmlDocumentScanner::new(XmlVersion::Xml10, true);
        let mut dtd_scanner = XmlDtdScanner::new(XmlVersion::Xml10);
        let mut validator = XmlDtdValidator::new(XmlVersion::Xml10, true);
        configure(&mut validator);

        let mut arena = ComponentArena::new();
        let processor = arena.insert(Component::DtdProcessor(XmlDtdProcessor::new(Box::new(
            XmlVersion::Xml10,
        ))));
        let validator = arena.insert(Component::DtdValidator(validator));
        let mut document_stages = arena.borrow_chain(&[validator])?;
        let mut dtd_stages = arena.borrow_chain(&[processor])?;
        let mut trace = Trace::default();

        entities.start_document_entity(XmlInputSource::from_text(doc), &mut scanner)?;
        let mut cx = PipelineContext {
            entities: &mut entities,
            reporter: &mut reporter,
            validation: &mut validation,
        };
        let mut next = DocumentNext {
            stages: &mut document_stages,
            handler: Some(&mut trace),
        };
        let mut dtd = DtdPipeline {
            scanner: Some(&mut dtd_scanner),
            next: DtdNext {
                stages: &mut dtd_stages,
                dtd_handler: None,
                content_model_handler: None,
            },
        };
        while scanner.scan_document(false, &mut cx, &mut next, &mut dtd)? {}
        let codes = codes.borrow().0.clone();
        Ok((trace.0, codes))
    }

    fn validating(validator: &mut XmlDtdValidator) {
        validator.set_feature(VALIDATION, true).unwrap();
    }

    #[test]
    fn defaulting_test() {
        let (events, codes) = validate(
            "<!DOCTYPE a [\
             <!ELEMENT a (b*)><!ELEMENT b EMPTY>\
             <!ATTLIST b t NMTOKENS #IMPLIED c CDATA 'd'>\
             ]><a> <b t=' p  q '/></a>",
            |_| {},
        )
        .unwrap();
        assert!(codes.is_empty());
        assert_eq!(
            events,
            [
                "start a bindings=0",
                "ignorable",
                "start b t=p q c=d* bindings=0",
                "end b",
                "end a",
            ]
        );
    }

    #[test]
    fn validity_test() {
        let (_, codes) = validate(
            "<!DOCTYPE r [\
             <!ELEMENT r (e+)><!ELEMENT e EMPTY>\
             <!ATTLIST e id ID #REQUIRED ref IDREF #IMPLIED kind (x|y) 'x'>\
             ]><r><e id='a' kind='z'/><e id='a' ref='nope'>text</e><u/></r>",
            validating,
        )
        .unwrap();
        assert_eq!(
            codes,
            [
                XmlErrorCode::AttributeValueNotInList,
                XmlErrorCode::IdNotUnique,
                XmlErrorCode::ContentInvalid,
                XmlErrorCode::ElementNotDeclared,
                XmlErrorCode::ContentInvalid,
                XmlErrorCode::ElementWithIdRequired,
            ]
        );
    }

    #[test]
    fn grammar_selection_test() {
        let (_, codes) = validate("<a/>", validating).unwrap();
        assert_eq!(codes, [XmlErrorCode::GrammarNotFound]);
        let (_, codes) = validate("<a/>", |v| {
            v.set_feature(VALIDATION, true).unwrap();
            v.set_feature(DYNAMIC_VALIDATION, true).unwrap();
        })
        .unwrap();
        assert!(codes.is_empty());
        let (_, codes) = validate("<!DOCTYPE x [<!ELEMENT a EMPTY>]><a/>", validating).unwrap();
        assert_eq!(codes, [XmlErrorCode::RootElementTypeMismatch]);
    }

    #[test]
    fn bind_defaulted_namespace_test() {
        let doc = "<!DOCTYPE p:a [<!ATTLIST p:a xmlns:p CDATA #FIXED 'urn:p'>]><p:a/>";
        let (events, _) = validate(doc, |_| {}).unwrap();
        assert!(events[0].starts_with("start {urn:p}a "));
        assert!(events[0].ends_with("=urn:p* bindings=1"));
        assert_eq!(events[1], "end {urn:p}a");


        let err = validate("<p:a/>", |_| {}).unwrap_err();
        assert!(matches!(err, XniError::Parse(e) if e.code == XmlErrorCode::ElementPrefixUnbound));
    }
}
