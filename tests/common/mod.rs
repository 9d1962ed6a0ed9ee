#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use xpipe::{
    XmlParserConfiguration,
    dtd::XmlAttributeDecl,
    error::{XmlErrorCode, XmlErrorLevel, XmlParseError, XniError},
    xni::{
        Augmentations, QName, XmlAttributes, XmlDocumentHandler, XmlDtdContentModelHandler,
        XmlDtdHandler, XmlErrorHandler, XmlInputSource, XmlResourceIdentifier,
    },
};

/// The events and diagnostics of a parse, one line per event.
///
/// A configuration holds every handler it delivers to for the whole parse, so each
/// handler slot gets its own sink and the sinks share this log.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    events: Rc<RefCell<Vec<String>>>,
    errors: Rc<RefCell<Vec<(XmlErrorLevel, XmlErrorCode)>>>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sink to every handler slot of `config`.
    pub fn attach(&self, config: &mut dyn XmlParserConfiguration) {
        config.set_document_handler(Some(Rc::new(RefCell::new(EventSink(self.clone())))));
        config.set_dtd_handler(Some(Rc::new(RefCell::new(EventSink(self.clone())))));
        config.set_dtd_content_model_handler(Some(Rc::new(RefCell::new(EventSink(
            self.clone(),
        )))));
        config
            .set_error_handler(Rc::new(RefCell::new(ErrorSink(self.clone()))))
            .expect("error-handler is always recognized");
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// The element events only.
    pub fn elements(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.starts_with("start ") || e.starts_with("empty ") || e.starts_with("end "))
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<(XmlErrorLevel, XmlErrorCode)> {
        self.errors.borrow().clone()
    }

    pub fn codes(&self) -> Vec<XmlErrorCode> {
        self.errors.borrow().iter().map(|&(_, code)| code).collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
        self.errors.borrow_mut().clear();
    }

    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

pub fn source(text: &str) -> XmlInputSource {
    XmlInputSource::from_bytes(text.as_bytes().to_vec())
}

pub struct EventSink(Recording);

impl EventSink {
    fn record(&self, kind: &str, element: &QName, attributes: &XmlAttributes, augs: &Augmentations) {
        let mut line = format!("{kind} {element}");
        for att in attributes.iter() {
            line.push_str(&format!(
                " {}={}{}",
                att.name.raw_name,
                att.value,
                if att.specified { "" } else { "*" }
            ));
        }
        for binding in &augs.namespace_bindings {
            line.push_str(&format!(
                " [{}->{}]",
                binding.prefix.as_deref().unwrap_or(""),
                binding.uri.as_deref().unwrap_or("")
            ));
        }
        self.0.push(line);
    }
}

impl XmlDocumentHandler for EventSink {
    fn xml_decl(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        _standalone: Option<bool>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0
            .push(format!("xmlDecl {version} {}", encoding.unwrap_or("-")));
        Ok(())
    }

    fn doctype_decl(
        &mut self,
        root_element: &str,
        _public_id: Option<&str>,
        system_id: Option<&str>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0
            .push(format!("doctype {root_element} {}", system_id.unwrap_or("-")));
        Ok(())
    }

    fn comment(&mut self, text: &str, _augs: &Augmentations) -> Result<(), XniError> {
        self.0.push(format!("comment {text}"));
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: Option<&str>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0.push(format!("pi {target} {}", data.unwrap_or("")));
        Ok(())
    }

    fn start_element(
        &mut self,
        element: &QName,
        attributes: &XmlAttributes,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.record("start", element, attributes, augs);
        Ok(())
    }

    fn empty_element(
        &mut self,
        element: &QName,
        attributes: &XmlAttributes,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.record("empty", element, attributes, augs);
        Ok(())
    }

    fn start_general_entity(
        &mut self,
        name: &str,
        _identifier: Option<&XmlResourceIdentifier>,
        _encoding: Option<&str>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0.push(format!("startEntity {name}"));
        Ok(())
    }

    fn end_general_entity(&mut self, name: &str, _augs: &Augmentations) -> Result<(), XniError> {
        self.0.push(format!("endEntity {name}"));
        Ok(())
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

    fn end_document(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        self.0.push("endDocument".to_owned());
        Ok(())
    }
}

impl XmlDtdHandler for EventSink {
    fn element_decl(
        &mut self,
        name: &str,
        content_model: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0.push(format!("elementDecl {name} {content_model}"));
        Ok(())
    }

    fn attribute_decl(
        &mut self,
        decl: &XmlAttributeDecl,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0.push(format!(
            "attributeDecl {} {}",
            decl.element_name, decl.attribute_name
        ));
        Ok(())
    }

    fn internal_entity_decl(
        &mut self,
        name: &str,
        text: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0.push(format!("entityDecl {name} {text}"));
        Ok(())
    }
}

impl XmlDtdContentModelHandler for EventSink {
    fn start_content_model(
        &mut self,
        element_name: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.0.push(format!("contentModel {element_name}"));
        Ok(())
    }
}

pub struct ErrorSink(Recording);

impl ErrorSink {
    fn record(&self, error: &XmlParseError) {
        self.0.errors.borrow_mut().push((error.level, error.code));
    }
}

impl XmlErrorHandler for ErrorSink {
    fn warning(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        self.record(error);
        Ok(())
    }

    fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        self.record(error);
        Ok(())
    }

    fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        self.record(error);
        Ok(())
    }
}
