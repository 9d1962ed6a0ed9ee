//! Provide the entity manager, the common component that opens entities and keeps the
//! stack of entities being read.
//!
//! Whoever drives the manager passes itself as the [`XmlEntityHandler`] of each call that
//! starts or ends an entity, and receives the boundary notifications through it.

mod scanner;

use std::{collections::HashMap, fs::File, io::Read, rc::Rc};

pub use scanner::*;
use tracing::trace;

use crate::{
    component::{XmlComponent, XmlComponentManager, XmlProperty},
    constants::{
        ALLOW_JAVA_ENCODINGS, BUFFER_SIZE, DEFAULT_BUFFER_SIZE, DOCUMENT_ENTITY_NAME,
        DTD_ENTITY_NAME, ENTITY_RESOLVER, ERROR_REPORTER, EXTERNAL_GENERAL_ENTITIES,
        EXTERNAL_PARAMETER_ENTITIES, PARSER_SETTINGS, SYMBOL_TABLE, VALIDATION,
        VALIDATION_MANAGER, WARN_ON_DUPLICATE_ENTITYDEF, XmlVersion,
    },
    encoding::{
        EncodingError, XmlCharEncoding, XmlDecoder, detect_encoding, sniff_declared_encoding,
    },
    error::{XmlConfigurationError, XniError},
    xni::{
        Augmentations, InputStream, XmlEntityResolver, XmlInputSource, XmlLocation,
        XmlResourceIdentifier,
    },
};

/// Receives entity boundary notifications from the entity manager.
///
/// The document entity is named `[xml]`, the external DTD subset `[dtd]`, and parameter
/// entities carry a leading `%`. `encoding` is `None` when no encoding was detected,
/// which is the case for internal entities and pre-decoded character streams.
#[doc(alias = "XMLEntityHandler")]
pub trait XmlEntityHandler {
    fn start_entity(
        &mut self,
        name: &str,
        identifier: Option<&XmlResourceIdentifier>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError>;

    fn end_entity(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError>;
}

/// A declared general or parameter entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Internal {
        text: String,
        in_external_subset: bool,
    },
    External {
        identifier: XmlResourceIdentifier,
        /// Set for unparsed entities.
        notation: Option<String>,
        in_external_subset: bool,
    },
}

impl Entity {
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(
            self,
            Self::External {
                notation: Some(_),
                ..
            }
        )
    }

    pub fn in_external_subset(&self) -> bool {
        match self {
            Self::Internal {
                in_external_subset, ..
            }
            | Self::External {
                in_external_subset, ..
            } => *in_external_subset,
        }
    }
}

const PREDEFINED_ENTITIES: [(&str, &str); 5] = [
    ("lt", "<"),
    ("gt", ">"),
    ("amp", "&"),
    ("apos", "'"),
    ("quot", "\""),
];

/// The replacement character of a predefined entity.
pub fn predefined_entity(name: &str) -> Option<&'static str> {
    PREDEFINED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
}

#[doc(alias = "XMLEntityManager")]
pub struct XmlEntityManager {
    resolver: Option<Rc<dyn XmlEntityResolver>>,
    validation: bool,
    external_general_entities: bool,
    external_parameter_entities: bool,
    allow_java_encodings: bool,
    warn_duplicate_entity: bool,
    buffer_size: usize,
    version: XmlVersion,
    entities: HashMap<String, Entity>,
    stack: Vec<ScannedEntity>,
    configured: bool,
}

impl Default for XmlEntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlEntityManager {
    const RECOGNIZED_FEATURES: &[&str] = &[
        VALIDATION,
        EXTERNAL_GENERAL_ENTITIES,
        EXTERNAL_PARAMETER_ENTITIES,
        ALLOW_JAVA_ENCODINGS,
        WARN_ON_DUPLICATE_ENTITYDEF,
    ];
    const RECOGNIZED_PROPERTIES: &[&str] = &[
        SYMBOL_TABLE,
        ERROR_REPORTER,
        ENTITY_RESOLVER,
        VALIDATION_MANAGER,
        BUFFER_SIZE,
    ];

    pub fn new() -> Self {
        Self {
            resolver: None,
            validation: false,
            external_general_entities: true,
            external_parameter_entities: true,
            allow_java_encodings: false,
            warn_duplicate_entity: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            version: XmlVersion::Xml10,
            entities: HashMap::new(),
            stack: vec![],
            configured: false,
        }
    }

    pub fn set_entity_resolver(&mut self, resolver: Option<Rc<dyn XmlEntityResolver>>) {
        self.resolver = resolver;
    }

    pub fn is_validating(&self) -> bool {
        self.validation
    }

    pub fn warn_on_duplicate_entity(&self) -> bool {
        self.warn_duplicate_entity
    }

    pub fn external_general_entities(&self) -> bool {
        self.external_general_entities
    }

    pub fn external_parameter_entities(&self) -> bool {
        self.external_parameter_entities
    }

    /// Set the XML version used to read the current and any further entity.
    pub fn set_scanner_version(&mut self, version: XmlVersion) {
        self.version = version;
        for entity in &mut self.stack {
            entity.set_version(version);
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    /// Declare an internal entity. The first declaration is binding, so `false` is
    /// returned when `name` was declared already.
    pub fn add_internal_entity(&mut self, name: &str, text: &str, in_external_subset: bool) -> bool {
        self.add_entity(
            name,
            Entity::Internal {
                text: text.to_owned(),
                in_external_subset,
            },
        )
    }

    pub fn add_external_entity(
        &mut self,
        name: &str,
        identifier: XmlResourceIdentifier,
        in_external_subset: bool,
    ) -> bool {
        self.add_entity(
            name,
            Entity::External {
                identifier,
                notation: None,
                in_external_subset,
            },
        )
    }

    pub fn add_unparsed_entity(
        &mut self,
        name: &str,
        identifier: XmlResourceIdentifier,
        notation: &str,
        in_external_subset: bool,
    ) -> bool {
        self.add_entity(
            name,
            Entity::External {
                identifier,
                notation: Some(notation.to_owned()),
                in_external_subset,
            },
        )
    }

    fn add_entity(&mut self, name: &str, entity: Entity) -> bool {
        if self.entities.contains_key(name) {
            return false;
        }
        self.entities.insert(name.to_owned(), entity);
        true
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn is_declared_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Whether an entity named `name` is being read, which makes a reference to it recursive.
    pub fn is_entity_open(&self, name: &str) -> bool {
        self.stack.iter().any(|e| e.name() == name)
    }

    /// The names of the open entities, outermost first.
    pub fn entity_path(&self) -> Vec<&str> {
        self.stack.iter().map(|e| e.name()).collect()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current(&mut self) -> Option<&mut ScannedEntity> {
        self.stack.last_mut()
    }

    pub fn current_entity(&self) -> Option<&ScannedEntity> {
        self.stack.last()
    }

    /// The position in the innermost external entity, for diagnostics.
    pub fn location(&self) -> XmlLocation {
        self.stack
            .iter()
            .rev()
            .find(|e| e.is_external())
            .or(self.stack.last())
            .map(|e| e.location())
            .unwrap_or_default()
    }

    /// The expanded system id of the innermost external entity, the base of relative ids.
    pub fn base_system_id(&self) -> Option<String> {
        self.stack
            .iter()
            .rev()
            .filter_map(|e| e.identifier())
            .find_map(|id| id.expanded_system_id.clone())
    }

    pub fn open_stream_count(&self) -> usize {
        self.stack.iter().filter(|e| e.has_stream()).count()
    }

    /// Open `source` and make it the current entity without notifying anyone.
    ///
    /// Returns the name of the encoding detected for it, or `None` for character streams.
    pub fn setup_current_entity(
        &mut self,
        name: &str,
        mut source: XmlInputSource,
        literal: bool,
        external: bool,
    ) -> Result<Option<String>, XniError> {
        let mut identifier = source.resource_identifier();
        if identifier.base_system_id.is_none() {
            identifier.base_system_id = self.base_system_id();
            identifier.expanded_system_id = identifier
                .literal_system_id
                .as_deref()
                .map(|id| crate::xni::expand_system_id(id, identifier.base_system_id.as_deref()));
        }
        let (reader, characters): (Box<dyn Read>, bool) = match source.take_stream() {
            Some(InputStream::Bytes(reader)) => (reader, false),
            Some(InputStream::Characters(reader)) => (reader, true),
            None => {
                let Some(path) = identifier.expanded_system_id.as_deref() else {
                    return Err(XniError::Pipeline(
                        "the input source has neither a stream nor a system id".into(),
                    ));
                };
                let path = path.strip_prefix("file://").unwrap_or(path);
                (Box::new(File::open(path)?), false)
            }
        };
        let (decoder, encoding, pending, reader) = if characters {
            (XmlDecoder::new(XmlCharEncoding::UTF8)?, None, vec![], reader)
        } else {
            self.detect_encoding(reader, source.encoding())?
        };
        trace!(name, literal, external, encoding = ?encoding, "opening entity");
        let entity = ScannedEntity::from_stream(
            name,
            identifier,
            encoding.clone(),
            decoder,
            reader,
            pending,
            self.buffer_size,
            self.version,
        );
        self.stack.push(entity);
        Ok(encoding)
    }

    #[allow(clippy::type_complexity)]
    fn detect_encoding(
        &self,
        mut reader: Box<dyn Read>,
        declared: Option<&str>,
    ) -> Result<(XmlDecoder, Option<String>, Vec<u8>, Box<dyn Read>), XniError> {
        let mut head = vec![0; self.buffer_size.max(64)];
        let mut filled = 0;
        while filled < head.len() {
            match reader.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            // enough to see the whole declaration
            if filled >= 256 {
                break;
            }
        }
        head.truncate(filled);

        if let Some(label) = declared {
            let decoder = XmlDecoder::for_label(label, self.allow_java_encodings)?;
            let name = decoder.name().to_owned();
            return Ok((decoder, Some(name), head, reader));
        }
        let detected = detect_encoding(&head);
        let decoder = match detected {
            XmlCharEncoding::None | XmlCharEncoding::UTF8 => {
                match sniff_declared_encoding(&head) {
                    Some(label) => XmlDecoder::for_label(&label, self.allow_java_encodings)?,
                    None => XmlDecoder::new(XmlCharEncoding::UTF8)?,
                }
            }
            other => XmlDecoder::new(other)?,
        };
        let name = decoder.name().to_owned();
        Ok((decoder, Some(name), head, reader))
    }

    /// Start reading the document entity and notify `handler`.
    pub fn start_document_entity(
        &mut self,
        source: XmlInputSource,
        handler: &mut dyn XmlEntityHandler,
    ) -> Result<(), XniError> {
        self.close_readers();
        let encoding = self.setup_current_entity(DOCUMENT_ENTITY_NAME, source, false, true)?;
        self.notify_current_start(encoding.as_deref(), handler)
    }

    /// Notify `handler` that the current entity started.
    pub fn notify_current_start(
        &mut self,
        encoding: Option<&str>,
        handler: &mut dyn XmlEntityHandler,
    ) -> Result<(), XniError> {
        let Some(entity) = self.stack.last() else {
            return Err(XniError::Pipeline("no entity is being read".into()));
        };
        let name = entity.name().to_owned();
        let identifier = entity.identifier().cloned();
        handler.start_entity(&name, identifier.as_ref(), encoding, &Augmentations::default())
    }

    /// Resolve the input source of an external entity.
    pub fn resolve_entity(
        &self,
        identifier: &XmlResourceIdentifier,
    ) -> Result<XmlInputSource, XniError> {
        if let Some(resolver) = &self.resolver {
            if let Some(source) = resolver.resolve_entity(identifier)? {
                return Ok(source);
            }
        }
        Ok(XmlInputSource::new(
            identifier.public_id.clone(),
            identifier
                .literal_system_id
                .clone()
                .or_else(|| identifier.expanded_system_id.clone()),
            identifier.base_system_id.clone(),
        ))
    }

    /// Start the declared entity `name` and notify `handler`.
    ///
    /// Parameter entity names carry their leading `%`. An external entity whose kind is
    /// disabled by `external-general-entities` or `external-parameter-entities` is not
    /// read: the handler sees a skipped start and end, and `false` is returned.
    pub fn start_entity(
        &mut self,
        name: &str,
        handler: &mut dyn XmlEntityHandler,
    ) -> Result<bool, XniError> {
        let Some(entity) = self.entities.get(name).cloned() else {
            let augs = Augmentations::skipped();
            handler.start_entity(name, None, None, &augs)?;
            handler.end_entity(name, &augs)?;
            return Ok(false);
        };
        match entity {
            Entity::Internal { text, .. } => {
                trace!(name, "starting internal entity");
                self.stack
                    .push(ScannedEntity::from_text(name, &text, self.version));
                handler.start_entity(name, None, None, &Augmentations::default())?;
                Ok(true)
            }
            Entity::External { identifier, .. } => {
                let allowed = if name.starts_with('%') {
                    self.external_parameter_entities
                } else {
                    self.external_general_entities
                };
                if !allowed {
                    let augs = Augmentations::skipped();
                    handler.start_entity(name, Some(&identifier), None, &augs)?;
                    handler.end_entity(name, &augs)?;
                    return Ok(false);
                }
                let source = self.resolve_entity(&identifier)?;
                let encoding = self.setup_current_entity(name, source, false, true)?;
                handler.start_entity(name, Some(&identifier), encoding.as_deref(), &Augmentations::default())?;
                Ok(true)
            }
        }
    }

    /// Start reading the external DTD subset and notify `handler` with `[dtd]`.
    pub fn start_external_subset(
        &mut self,
        identifier: &XmlResourceIdentifier,
        handler: &mut dyn XmlEntityHandler,
    ) -> Result<(), XniError> {
        let source = self.resolve_entity(identifier)?;
        let encoding = self.setup_current_entity(DTD_ENTITY_NAME, source, false, true)?;
        handler.start_entity(
            DTD_ENTITY_NAME,
            Some(identifier),
            encoding.as_deref(),
            &Augmentations::default(),
        )
    }

    /// Close the current entity and notify `handler`.
    pub fn end_entity(&mut self, handler: &mut dyn XmlEntityHandler) -> Result<(), XniError> {
        let Some(mut entity) = self.stack.pop() else {
            return Ok(());
        };
        entity.close();
        trace!(name = entity.name(), "ending entity");
        handler.end_entity(entity.name(), &Augmentations::default())
    }

    /// Close every open stream and forget the entity stack.
    pub fn close_readers(&mut self) {
        for entity in &mut self.stack {
            entity.close();
        }
        self.stack.clear();
    }

    /// The stream failure of the current entity, mapped for the caller.
    pub fn take_current_error(&mut self) -> Option<Result<EncodingError, std::io::Error>> {
        match self.stack.last_mut()?.take_error()? {
            EntityReadError::Encoding(e) => Some(Ok(e)),
            EntityReadError::Io(e) => Some(Err(e)),
        }
    }
}

impl XmlComponent for XmlEntityManager {
    fn recognized_features(&self) -> &[&'static str] {
        Self::RECOGNIZED_FEATURES
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        match feature_id {
            EXTERNAL_GENERAL_ENTITIES | EXTERNAL_PARAMETER_ENTITIES => Some(true),
            ALLOW_JAVA_ENCODINGS | WARN_ON_DUPLICATE_ENTITYDEF => Some(false),
            _ => None,
        }
    }

    fn recognized_properties(&self) -> &[&'static str] {
        Self::RECOGNIZED_PROPERTIES
    }

    fn property_default(&self, property_id: &str) -> Option<XmlProperty> {
        (property_id == BUFFER_SIZE).then_some(XmlProperty::Integer(DEFAULT_BUFFER_SIZE))
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.entities.clear();
        self.close_readers();
        self.version = XmlVersion::Xml10;
        if self.configured && !manager.feature_or(PARSER_SETTINGS, true) {
            return Ok(());
        }
        self.validation = manager.feature_or(VALIDATION, false);
        self.external_general_entities = manager.feature_or(EXTERNAL_GENERAL_ENTITIES, true);
        self.external_parameter_entities = manager.feature_or(EXTERNAL_PARAMETER_ENTITIES, true);
        self.allow_java_encodings = manager.feature_or(ALLOW_JAVA_ENCODINGS, false);
        self.warn_duplicate_entity = manager.feature_or(WARN_ON_DUPLICATE_ENTITYDEF, false);
        self.resolver = match manager.property(ENTITY_RESOLVER) {
            Some(XmlProperty::EntityResolver(resolver)) => Some(resolver),
            _ => None,
        };
        if let Some(XmlProperty::Integer(size)) = manager.property(BUFFER_SIZE) {
            self.buffer_size = size.max(64);
        }
        self.configured = true;
        Ok(())
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        match feature_id {
            VALIDATION => self.validation = state,
            EXTERNAL_GENERAL_ENTITIES => self.external_general_entities = state,
            EXTERNAL_PARAMETER_ENTITIES => self.external_parameter_entities = state,
            ALLOW_JAVA_ENCODINGS => self.allow_java_encodings = state,
            WARN_ON_DUPLICATE_ENTITYDEF => self.warn_duplicate_entity = state,
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
            (ENTITY_RESOLVER, XmlProperty::EntityResolver(resolver)) => {
                self.resolver = Some(resolver.clone())
            }
            (BUFFER_SIZE, XmlProperty::Integer(size)) => self.buffer_size = (*size).max(64),
            (BUFFER_SIZE, _) => return Err(XmlConfigurationError::not_supported(property_id)),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Boundaries(Vec<String>);

    impl XmlEntityHandler for Boundaries {
        fn start_entity(
            &mut self,
            name: &str,
            _identifier: Option<&XmlResourceIdentifier>,
            encoding: Option<&str>,
            augs: &Augmentations,
        ) -> Result<(), XniError> {
            let skipped = if augs.entity_skipped { " skipped" } else { "" };
            self.0.push(format!("start {name} {encoding:?}{skipped}"));
            Ok(())
        }

        fn end_entity(&mut self, name: &str, _augs: &Augmentations) -> Result<(), XniError> {
            self.0.push(format!("end {name}"));
            Ok(())
        }
    }

    #[test]
    fn document_entity_encoding_test() {
        let mut manager = XmlEntityManager::new();
        let mut handler = Boundaries::default();
        let source =
            XmlInputSource::from_bytes(&b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>"[..]);
        manager.start_document_entity(source, &mut handler).unwrap();
        assert_eq!(handler.0, ["start [xml] Some(\"ISO-8859-1\")"]);
        let entity = manager.current().unwrap();
        assert!(entity.skip_string("<?xml"));
        entity.scan_until_str("?>").unwrap();
        assert_eq!(entity.scan_until_str("</a>").as_deref(), Some("<a>é"));

        let source = XmlInputSource::from_text("<a/>");
        manager.start_document_entity(source, &mut handler).unwrap();
        assert_eq!(handler.0[1], "start [xml] None");
        assert_eq!(manager.depth(), 1);
    }

    #[test]
    fn declared_entities_test() {
        let mut manager = XmlEntityManager::new();
        let mut handler = Boundaries::default();
        assert!(manager.add_internal_entity("e", "text", false));
        assert!(!manager.add_internal_entity("e", "other", false));
        manager.add_external_entity(
            "%ext",
            XmlResourceIdentifier::new(None, Some("ext.ent".to_owned()), None),
            false,
        );
        assert!(manager.start_entity("e", &mut handler).unwrap());
        assert!(manager.is_entity_open("e"));
        assert_eq!(manager.current().unwrap().scan_until(10, |_| false), "text");
        manager.end_entity(&mut handler).unwrap();
        manager.external_parameter_entities = false;
        assert!(!manager.start_entity("%ext", &mut handler).unwrap());
        assert!(!manager.start_entity("missing", &mut handler).unwrap());
        assert_eq!(
            handler.0,
            [
                "start e None",
                "end e",
                "start %ext None skipped",
                "end %ext",
                "start missing None skipped",
                "end missing"
            ]
        );
    }

    #[test]
    fn close_readers_test() {
        let mut manager = XmlEntityManager::new();
        let mut handler = Boundaries::default();
        manager
            .start_document_entity(XmlInputSource::from_bytes(&b"<a/>"[..]), &mut handler)
            .unwrap();
        assert_eq!(manager.open_stream_count(), 1);
        manager.close_readers();
        manager.close_readers();
        assert_eq!(manager.open_stream_count(), 0);
        assert_eq!(manager.depth(), 0);
    }

    #[test]
    fn predefined_entity_test() {
        assert_eq!(predefined_entity("amp"), Some("&"));
        assert_eq!(predefined_entity("nbsp"), None);
    }
}
