//! Provide the version detector, which reads the XML declaration of a document before
//! any scanner runs so that the configuration can choose the component set for it.

use tracing::debug;

use crate::{
    chars::XmlCharValid,
    constants::{DOCUMENT_ENTITY_NAME, XmlVersion},
    encoding::EncodingError,
    entity::{XmlEntityHandler, XmlEntityManager},
    error::{XmlErrorCode, XmlErrorLevel, XniError},
    reporter::XmlErrorReporter,
    xni::XmlInputSource,
};

/// Enough characters for an XML declaration with a long encoding name.
const LOOKAHEAD_LENGTH: usize = 128;

#[doc(alias = "XMLVersionDetector")]
#[derive(Debug, Default)]
pub struct XmlVersionDetector {
    /// The encoding the document entity was opened with.
    encoding: Option<String>,
    detected: Option<XmlVersion>,
}

impl XmlVersionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.encoding = None;
        self.detected = None;
    }

    /// The version found by the last detection.
    pub fn detected(&self) -> Option<XmlVersion> {
        self.detected
    }

    /// Open `source` as the document entity and read the version it declares.
    ///
    /// A document without an XML declaration is XML 1.0. `None` means the entity could
    /// not be decoded; the failure has already been reported through `reporter`.
    pub fn determine_doc_version(
        &mut self,
        source: XmlInputSource,
        entities: &mut XmlEntityManager,
        reporter: &mut XmlErrorReporter,
    ) -> Result<Option<XmlVersion>, XniError> {
        self.reset();
        entities.close_readers();
        self.encoding = match entities.setup_current_entity(DOCUMENT_ENTITY_NAME, source, false, true) {
            Ok(encoding) => encoding,
            Err(XniError::Encoding(error)) => {
                Self::report_encoding(entities, reporter, &error)?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let head = entities
            .current()
            .map(|entity| entity.lookahead(LOOKAHEAD_LENGTH))
            .unwrap_or_default();
        match entities.take_current_error() {
            Some(Ok(error)) => {
                Self::report_encoding(entities, reporter, &error)?;
                return Ok(None);
            }
            Some(Err(io)) => return Err(XniError::Io(io)),
            None => {}
        }
        if head.is_empty() {
            reporter.report_unescalated(
                entities.location(),
                XmlErrorCode::PrematureEof,
                &[],
                XmlErrorLevel::Fatal,
            )?;
            return Ok(None);
        }
        let version = declared_version(&head);
        debug!(%version, encoding = ?self.encoding, "document version detected");
        self.detected = Some(version);
        Ok(Some(version))
    }

    /// Switch the entity manager to `version` and announce the document entity to
    /// `handler`.
    pub fn start_document_parsing(
        &self,
        handler: &mut dyn XmlEntityHandler,
        version: XmlVersion,
        entities: &mut XmlEntityManager,
    ) -> Result<(), XniError> {
        entities.set_scanner_version(version);
        entities.notify_current_start(self.encoding.as_deref(), handler)
    }

    fn report_encoding(
        entities: &XmlEntityManager,
        reporter: &mut XmlErrorReporter,
        error: &EncodingError,
    ) -> Result<(), XniError> {
        let (code, arg) = match error {
            EncodingError::Unsupported { name } => (XmlErrorCode::EncodingNotSupported, name.to_string()),
            other => (XmlErrorCode::MalformedByteSequence, other.to_string()),
        };
        reporter.report_unescalated(entities.location(), code, &[&arg], XmlErrorLevel::Fatal)
    }
}

/// The version in the XML declaration at the start of `head`, or XML 1.0.
fn declared_version(head: &str) -> XmlVersion {
    let trim = |s: &str| s.trim_start_matches(|c: char| c.is_xml_space()).to_owned();
    let Some(rest) = head.strip_prefix("<?xml") else {
        return XmlVersion::Xml10;
    };
    if !rest.starts_with(|c: char| c.is_xml_space()) {
        return XmlVersion::Xml10;
    }
    let Some(rest) = trim(rest).strip_prefix("version").map(trim) else {
        return XmlVersion::Xml10;
    };
    let Some(rest) = rest.strip_prefix('=').map(trim) else {
        return XmlVersion::Xml10;
    };
    let mut chars = rest.chars();
    match (chars.next(), chars.as_str().get(..4)) {
        (Some(quote @ ('"' | '\'')), Some(value)) if value == format!("1.1{quote}") => {
            XmlVersion::Xml11
        }
        _ => XmlVersion::Xml10,
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use crate::{error::XmlParseError, xni::Augmentations, xni::XmlErrorHandler};

    use super::*;

    #[derive(Default)]
    struct Fatal(Vec<XmlErrorCode>);

    impl XmlErrorHandler for Fatal {
        fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
            self.0.push(error.code);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Starts(Vec<(String, Option<String>)>);

    impl XmlEntityHandler for Starts {
        fn start_entity(
            &mut self,
            name: &str,
            _identifier: Option<&crate::xni::XmlResourceIdentifier>,
            encoding: Option<&str>,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push((name.to_owned(), encoding.map(str::to_owned)));
            Ok(())
        }

        fn end_entity(&mut self, _name: &str, _augs: &Augmentations) -> Result<(), XniError> {
            Ok(())
        }
    }

    #[test]
    fn declared_version_test() {
        assert_eq!(declared_version("<?xml version='1.1'?><a/>"), XmlVersion::Xml11);
        assert_eq!(declared_version("<?xml\n version = \"1.1\" ?>"), XmlVersion::Xml11);
        assert_eq!(declared_version("<?xml version='1.0'?>"), XmlVersion::Xml10);
        assert_eq!(declared_version("<?xml version='1.10'?>"), XmlVersion::Xml10);
        assert_eq!(declared_version("<?xml-stylesheet version='1.1'?>"), XmlVersion::Xml10);
        assert_eq!(declared_version("<a/>"), XmlVersion::Xml10);
    }

    #[test]
    fn detect_and_start_test() {
        let mut detector = XmlVersionDetector::new();
        let mut entities = XmlEntityManager::new();
        let mut reporter = XmlErrorReporter::new();
        let version = detector
            .determine_doc_version(
                XmlInputSource::from_bytes(b"<?xml version='1.1'?><a/>".to_vec()),
                &mut entities,
                &mut reporter,
            )
            .unwrap();
        assert_eq!(version, Some(XmlVersion::Xml11));
        assert_eq!(detector.detected(), Some(XmlVersion::Xml11));

        let mut starts = Starts::default();
        detector
            .start_document_parsing(&mut starts, XmlVersion::Xml11, &mut entities)
            .unwrap();
        assert_eq!(entities.version(), XmlVersion::Xml11);
        assert_eq!(starts.0, [("[xml]".to_owned(), Some("UTF-8".to_owned()))]);
        assert_eq!(entities.current().unwrap().peek_char(), Some('<'));
    }

    #[test]
    fn detection_failure_test() {
        let fatal = Rc::new(RefCell::new(Fatal::default()));
        let mut detector = XmlVersionDetector::new();
        let mut entities = XmlEntityManager::new();
        let mut reporter = XmlErrorReporter::new();
        reporter.set_error_handler(Some(fatal.clone()));

        let version = detector
            .determine_doc_version(XmlInputSource::from_text(""), &mut entities, &mut reporter)
            .unwrap();
        assert_eq!(version, None);
        let version = detector
            .determine_doc_version(
                XmlInputSource::from_bytes(b"<a/>".to_vec()).with_encoding("x-unknown"),
                &mut entities,
                &mut reporter,
            )
            .unwrap();
        assert_eq!(version, None);
        assert_eq!(
            fatal.borrow().0,
            [XmlErrorCode::PrematureEof, XmlErrorCode::EncodingNotSupported]
        );
    }
}
