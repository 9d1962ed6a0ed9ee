//! Provide the data structures and handler interfaces through which pipeline stages
//! talk to each other and to the application.
//!
//! Events travel downstream as [`DocumentEvent`] and [`DtdEvent`] values. The final stage
//! of each chain delivers them to the application's [`XmlDocumentHandler`],
//! [`XmlDtdHandler`] and [`XmlDtdContentModelHandler`].

use std::{
    fmt::{Debug, Display},
    io::{Cursor, Read},
    rc::Rc,
};

use crate::{
    dtd::{ConditionalKind, ContentOccurrence, ContentSeparator, XmlAttributeDecl},
    error::{XmlParseError, XniError},
    namespace::NamespaceBinding,
    symbols::SymbolTable,
};

/// A qualified name. `uri` is filled in by namespace binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<Rc<str>>,
    pub local_part: Rc<str>,
    pub raw_name: Rc<str>,
    pub uri: Option<Rc<str>>,
}

impl QName {
    /// A name that is not split into prefix and local part.
    pub fn unprefixed(raw_name: Rc<str>) -> Self {
        Self {
            prefix: None,
            local_part: raw_name.clone(),
            raw_name,
            uri: None,
        }
    }

    /// Split `raw_name` at its first colon, interning both halves.
    pub fn split(raw_name: &str, symbols: &SymbolTable) -> Self {
        let raw = symbols.add_symbol(raw_name);
        match raw_name.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => Self {
                prefix: Some(symbols.add_symbol(prefix)),
                local_part: symbols.add_symbol(local),
                raw_name: raw,
                uri: None,
            },
            _ => Self::unprefixed(raw),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
}

impl Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{{{uri}}}{}", self.local_part),
            None => write!(f, "{}", self.raw_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub name: QName,
    /// `CDATA`, `ID`, `IDREF`, ..., or `ENUMERATION`.
    pub att_type: &'static str,
    pub value: String,
    pub non_normalized_value: String,
    /// `false` when the attribute was added from a DTD default.
    pub specified: bool,
}

#[doc(alias = "XMLAttributes")]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlAttributes {
    list: Vec<XmlAttribute>,
}

impl XmlAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn push(&mut self, attribute: XmlAttribute) {
        self.list.push(attribute);
    }

    pub fn remove(&mut self, index: usize) -> XmlAttribute {
        self.list.remove(index)
    }

    pub fn get(&self, index: usize) -> Option<&XmlAttribute> {
        self.list.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut XmlAttribute> {
        self.list.get_mut(index)
    }

    pub fn index_of(&self, raw_name: &str) -> Option<usize> {
        self.list.iter().position(|a| &*a.name.raw_name == raw_name)
    }

    pub fn index_of_ns(&self, uri: Option<&str>, local_part: &str) -> Option<usize> {
        self.list
            .iter()
            .position(|a| a.name.uri() == uri && &*a.name.local_part == local_part)
    }

    pub fn value(&self, raw_name: &str) -> Option<&str> {
        self.index_of(raw_name).map(|i| self.list[i].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &XmlAttribute> {
        self.list.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut XmlAttribute> {
        self.list.iter_mut()
    }
}

#[doc(alias = "XMLResourceIdentifier")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlResourceIdentifier {
    pub public_id: Option<String>,
    pub literal_system_id: Option<String>,
    pub base_system_id: Option<String>,
    pub expanded_system_id: Option<String>,
}

impl XmlResourceIdentifier {
    pub fn new(
        public_id: Option<String>,
        literal_system_id: Option<String>,
        base_system_id: Option<String>,
    ) -> Self {
        let expanded_system_id = literal_system_id
            .as_deref()
            .map(|id| expand_system_id(id, base_system_id.as_deref()));
        Self {
            public_id,
            literal_system_id,
            base_system_id,
            expanded_system_id,
        }
    }
}

/// Resolve `system_id` against the directory of `base`.
///
/// Absolute URIs and absolute paths are returned unchanged.
pub fn expand_system_id(system_id: &str, base: Option<&str>) -> String {
    if system_id.contains("://") || system_id.starts_with('/') {
        return system_id.to_owned();
    }
    match base.and_then(|b| b.rfind('/').map(|pos| &b[..=pos])) {
        Some(dir) => format!("{dir}{system_id}"),
        None => system_id.to_owned(),
    }
}

/// Extra information attached to an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Augmentations {
    /// The entity reference was not expanded.
    pub entity_skipped: bool,
    /// Namespace declarations made on the element that carries this event.
    pub namespace_bindings: Vec<NamespaceBinding>,
}

impl Augmentations {
    pub fn skipped() -> Self {
        Self {
            entity_skipped: true,
            ..Default::default()
        }
    }
}

#[doc(alias = "XMLLocator")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlLocation {
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Display for XmlLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.system_id.as_deref().unwrap_or("(entity)"),
            self.line,
            self.column
        )
    }
}

pub enum InputStream {
    /// Raw bytes whose encoding is detected while reading.
    Bytes(Box<dyn Read>),
    /// UTF-8 text that is read without encoding detection.
    Characters(Box<dyn Read>),
}

#[doc(alias = "XMLInputSource")]
#[derive(Default)]
pub struct XmlInputSource {
    public_id: Option<String>,
    system_id: Option<String>,
    base_system_id: Option<String>,
    encoding: Option<String>,
    stream: Option<InputStream>,
}

impl XmlInputSource {
    pub fn new(
        public_id: Option<String>,
        system_id: Option<String>,
        base_system_id: Option<String>,
    ) -> Self {
        Self {
            public_id,
            system_id,
            base_system_id,
            ..Default::default()
        }
    }

    /// A source read from the file system when parsing begins.
    pub fn from_system_id(system_id: impl Into<String>) -> Self {
        Self::new(None, Some(system_id.into()), None)
    }

    pub fn from_reader(reader: impl Read + 'static) -> Self {
        Self {
            stream: Some(InputStream::Bytes(Box::new(reader))),
            ..Default::default()
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_reader(Cursor::new(bytes.into()))
    }

    /// A pre-decoded character stream. No encoding is reported for it.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            stream: Some(InputStream::Characters(Box::new(Cursor::new(
                text.into().into_bytes(),
            )))),
            ..Default::default()
        }
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    pub fn with_base_system_id(mut self, base: impl Into<String>) -> Self {
        self.base_system_id = Some(base.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn base_system_id(&self) -> Option<&str> {
        self.base_system_id.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn take_stream(&mut self) -> Option<InputStream> {
        self.stream.take()
    }

    pub fn resource_identifier(&self) -> XmlResourceIdentifier {
        XmlResourceIdentifier::new(
            self.public_id.clone(),
            self.system_id.clone(),
            self.base_system_id.clone(),
        )
    }
}

impl Debug for XmlInputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlInputSource")
            .field("public_id", &self.public_id)
            .field("system_id", &self.system_id)
            .field("base_system_id", &self.base_system_id)
            .field("encoding", &self.encoding)
            .field(
                "stream",
                &match &self.stream {
                    Some(InputStream::Bytes(_)) => "bytes",
                    Some(InputStream::Characters(_)) => "characters",
                    None => "none",
                },
            )
            .finish()
    }
}

/// Receives the document events at the end of the document pipeline.
#[allow(unused_variables)]
pub trait XmlDocumentHandler {
    fn start_document(
        &mut self,
        location: &XmlLocation,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn xml_decl(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn doctype_decl(
        &mut self,
        root_element: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn comment(&mut self, text: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn processing_instruction(
        &mut self,
        target: &str,
        data: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn start_element(
        &mut self,
        element: &QName,
        attributes: &XmlAttributes,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn empty_element(
        &mut self,
        element: &QName,
        attributes: &XmlAttributes,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn start_general_entity(
        &mut self,
        name: &str,
        identifier: Option<&XmlResourceIdentifier>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn text_decl(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn end_general_entity(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn characters(&mut self, text: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn ignorable_whitespace(&mut self, text: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn end_element(&mut self, element: &QName, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn start_cdata(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn end_cdata(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn end_document(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
}

/// Receives the DTD declaration events at the end of the DTD pipeline.
#[allow(unused_variables)]
pub trait XmlDtdHandler {
    fn start_dtd(&mut self, location: &XmlLocation, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn start_parameter_entity(
        &mut self,
        name: &str,
        identifier: Option<&XmlResourceIdentifier>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn text_decl(
        &mut self,
        version: Option<&str>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn end_parameter_entity(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn start_external_subset(
        &mut self,
        identifier: &XmlResourceIdentifier,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn end_external_subset(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn comment(&mut self, text: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn processing_instruction(
        &mut self,
        target: &str,
        data: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn element_decl(
        &mut self,
        name: &str,
        content_model: &str,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn start_attlist(&mut self, element_name: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn attribute_decl(
        &mut self,
        decl: &XmlAttributeDecl,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn end_attlist(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn internal_entity_decl(
        &mut self,
        name: &str,
        text: &str,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn external_entity_decl(
        &mut self,
        name: &str,
        identifier: &XmlResourceIdentifier,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        identifier: &XmlResourceIdentifier,
        notation: &str,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn notation_decl(
        &mut self,
        name: &str,
        identifier: &XmlResourceIdentifier,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn start_conditional(
        &mut self,
        kind: ConditionalKind,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn ignored_characters(&mut self, text: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn end_conditional(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn end_dtd(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
}

/// Receives the structure of element content models as they are declared.
#[allow(unused_variables)]
pub trait XmlDtdContentModelHandler {
    fn start_content_model(
        &mut self,
        element_name: &str,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn any(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn empty(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn start_group(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn pcdata(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn element(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn separator(
        &mut self,
        separator: ContentSeparator,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn occurrence(
        &mut self,
        occurrence: ContentOccurrence,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        Ok(())
    }
    fn end_group(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
    fn end_content_model(&mut self, augs: &Augmentations) -> Result<(), XniError> {
        Ok(())
    }
}

/// Receives diagnostics from the error reporter.
///
/// Returning `Err` from any method aborts the parse with that error.
#[allow(unused_variables)]
pub trait XmlErrorHandler {
    fn warning(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        Ok(())
    }
    fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        Ok(())
    }
    fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        Ok(())
    }
}

/// Supplies the input for external entities.
pub trait XmlEntityResolver {
    /// Return `None` to let the entity manager open the expanded system id itself.
    fn resolve_entity(
        &self,
        identifier: &XmlResourceIdentifier,
    ) -> Result<Option<XmlInputSource>, XniError>;
}

/// A document event traveling down the document pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    StartDocument {
        location: XmlLocation,
        encoding: Option<String>,
    },
    XmlDecl {
        version: String,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    DoctypeDecl {
        root_element: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
    StartElement {
        element: QName,
        attributes: XmlAttributes,
    },
    EmptyElement {
        element: QName,
        attributes: XmlAttributes,
    },
    StartGeneralEntity {
        name: String,
        identifier: Option<XmlResourceIdentifier>,
        encoding: Option<String>,
    },
    TextDecl {
        version: Option<String>,
        encoding: Option<String>,
    },
    EndGeneralEntity(String),
    Characters(String),
    IgnorableWhitespace(String),
    EndElement(QName),
    StartCdata,
    EndCdata,
    EndDocument,
}

impl DocumentEvent {
    pub fn deliver(
        &self,
        handler: &mut dyn XmlDocumentHandler,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        match self {
            Self::StartDocument { location, encoding } => {
                handler.start_document(location, encoding.as_deref(), augs)
            }
            Self::XmlDecl {
                version,
                encoding,
                standalone,
            } => handler.xml_decl(version, encoding.as_deref(), *standalone, augs),
            Self::DoctypeDecl {
                root_element,
                public_id,
                system_id,
            } => handler.doctype_decl(
                root_element,
                public_id.as_deref(),
                system_id.as_deref(),
                augs,
            ),
            Self::Comment(text) => handler.comment(text, augs),
            Self::ProcessingInstruction { target, data } => {
                handler.processing_instruction(target, data.as_deref(), augs)
            }
            Self::StartElement {
                element,
                attributes,
            } => handler.start_element(element, attributes, augs),
            Self::EmptyElement {
                element,
                attributes,
            } => handler.empty_element(element, attributes, augs),
            Self::StartGeneralEntity {
                name,
                identifier,
                encoding,
            } => handler.start_general_entity(
                name,
                identifier.as_ref(),
                encoding.as_deref(),
                augs,
            ),
            Self::TextDecl { version, encoding } => {
                handler.text_decl(version.as_deref(), encoding.as_deref(), augs)
            }
            Self::EndGeneralEntity(name) => handler.end_general_entity(name, augs),
            Self::Characters(text) => handler.characters(text, augs),
            Self::IgnorableWhitespace(text) => handler.ignorable_whitespace(text, augs),
            Self::EndElement(element) => handler.end_element(element, augs),
            Self::StartCdata => handler.start_cdata(augs),
            Self::EndCdata => handler.end_cdata(augs),
            Self::EndDocument => handler.end_document(augs),
        }
    }
}

/// A DTD or content model event traveling down the DTD pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DtdEvent {
    StartDtd(XmlLocation),
    StartParameterEntity {
        name: String,
        identifier: Option<XmlResourceIdentifier>,
        encoding: Option<String>,
    },
    TextDecl {
        version: Option<String>,
        encoding: Option<String>,
    },
    EndParameterEntity(String),
    StartExternalSubset(XmlResourceIdentifier),
    EndExternalSubset,
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
    ElementDecl {
        name: String,
        content_model: String,
    },
    StartAttlist(String),
    AttributeDecl(XmlAttributeDecl),
    EndAttlist,
    InternalEntityDecl {
        name: String,
        text: String,
    },
    ExternalEntityDecl {
        name: String,
        identifier: XmlResourceIdentifier,
    },
    UnparsedEntityDecl {
        name: String,
        identifier: XmlResourceIdentifier,
        notation: String,
    },
    NotationDecl {
        name: String,
        identifier: XmlResourceIdentifier,
    },
    StartConditional(ConditionalKind),
    IgnoredCharacters(String),
    EndConditional,
    EndDtd,
    // content model
    StartContentModel(String),
    Any,
    Empty,
    StartGroup,
    Pcdata,
    Element(String),
    Separator(ContentSeparator),
    Occurrence(ContentOccurrence),
    EndGroup,
    EndContentModel,
}

impl DtdEvent {
    pub fn is_content_model(&self) -> bool {
        matches!(
            self,
            Self::StartContentModel(_)
                | Self::Any
                | Self::Empty
                | Self::StartGroup
                | Self::Pcdata
                | Self::Element(_)
                | Self::Separator(_)
                | Self::Occurrence(_)
                | Self::EndGroup
                | Self::EndContentModel
        )
    }

    /// Deliver a declaration event to `handler`. Content model events are ignored.
    pub fn deliver(
        &self,
        handler: &mut dyn XmlDtdHandler,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        match self {
            Self::StartDtd(location) => handler.start_dtd(location, augs),
            Self::StartParameterEntity {
                name,
                identifier,
                encoding,
            } => handler.start_parameter_entity(
                name,
                identifier.as_ref(),
                encoding.as_deref(),
                augs,
            ),
            Self::TextDecl { version, encoding } => {
                handler.text_decl(version.as_deref(), encoding.as_deref(), augs)
            }
            Self::EndParameterEntity(name) => handler.end_parameter_entity(name, augs),
            Self::StartExternalSubset(identifier) => handler.start_external_subset(identifier, augs),
            Self::EndExternalSubset => handler.end_external_subset(augs),
            Self::Comment(text) => handler.comment(text, augs),
            Self::ProcessingInstruction { target, data } => {
                handler.processing_instruction(target, data.as_deref(), augs)
            }
            Self::ElementDecl {
                name,
                content_model,
            } => handler.element_decl(name, content_model, augs),
            Self::StartAttlist(element_name) => handler.start_attlist(element_name, augs),
            Self::AttributeDecl(decl) => handler.attribute_decl(decl, augs),
            Self::EndAttlist => handler.end_attlist(augs),
            Self::InternalEntityDecl { name, text } => handler.internal_entity_decl(name, text, augs),
            Self::ExternalEntityDecl { name, identifier } => {
                handler.external_entity_decl(name, identifier, augs)
            }
            Self::UnparsedEntityDecl {
                name,
                identifier,
                notation,
            } => handler.unparsed_entity_decl(name, identifier, notation, augs),
            Self::NotationDecl { name, identifier } => handler.notation_decl(name, identifier, augs),
            Self::StartConditional(kind) => handler.start_conditional(*kind, augs),
            Self::IgnoredCharacters(text) => handler.ignored_characters(text, augs),
            Self::EndConditional => handler.end_conditional(augs),
            Self::EndDtd => handler.end_dtd(augs),
            _ => Ok(()),
        }
    }

    /// Deliver a content model event to `handler`. Declaration events are ignored.
    pub fn deliver_content_model(
        &self,
        handler: &mut dyn XmlDtdContentModelHandler,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        match self {
            Self::StartContentModel(name) => handler.start_content_model(name, augs),
            Self::Any => handler.any(augs),
            Self::Empty => handler.empty(augs),
            Self::StartGroup => handler.start_group(augs),
            Self::Pcdata => handler.pcdata(augs),
            Self::Element(name) => handler.element(name, augs),
            Self::Separator(separator) => handler.separator(*separator, augs),
            Self::Occurrence(occurrence) => handler.occurrence(*occurrence, augs),
            Self::EndGroup => handler.end_group(augs),
            Self::EndContentModel => handler.end_content_model(augs),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qname_split_test() {
        let symbols = SymbolTable::new();
        let name = QName::split("x:a", &symbols);
        assert_eq!(name.prefix(), Some("x"));
        assert_eq!(&*name.local_part, "a");
        assert_eq!(&*name.raw_name, "x:a");
        let name = QName::split("plain", &symbols);
        assert_eq!(name.prefix(), None);
        assert_eq!(&*name.local_part, "plain");
        let name = QName::split(":odd", &symbols);
        assert_eq!(name.prefix(), None);
        assert_eq!(&*name.local_part, ":odd");
    }

    #[test]
    fn expand_system_id_test() {
        assert_eq!(expand_system_id("b.dtd", Some("dir/a.xml")), "dir/b.dtd");
        assert_eq!(expand_system_id("b.dtd", None), "b.dtd");
        assert_eq!(expand_system_id("/abs/b.dtd", Some("dir/a.xml")), "/abs/b.dtd");
        assert_eq!(
            expand_system_id("http://x/b.dtd", Some("dir/a.xml")),
            "http://x/b.dtd"
        );
    }

    #[test]
    fn attributes_lookup_test() {
        let symbols = SymbolTable::new();
        let mut attrs = XmlAttributes::new();
        attrs.push(XmlAttribute {
            name: QName::split("id", &symbols),
            att_type: "CDATA",
            value: "v".to_owned(),
            non_normalized_value: "v".to_owned(),
            specified: true,
        });
        assert_eq!(attrs.index_of("id"), Some(0));
        assert_eq!(attrs.value("id"), Some("v"));
        assert_eq!(attrs.index_of_ns(None, "id"), Some(0));
        assert_eq!(attrs.value("missing"), None);
    }

    #[test]
    fn input_source_debug_test() {
        let source = XmlInputSource::from_text("<a/>").with_system_id("mem.xml");
        let debug = format!("{source:?}");
        assert!(debug.contains("characters"));
        assert!(debug.contains("mem.xml"));
    }
}
