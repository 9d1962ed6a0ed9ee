//! Provide the document scanner, the first stage of the document pipeline.
//!
//! The scanner reads the document entity through the entity manager and emits
//! [`DocumentEvent`]s one markup construct at a time, so a pull parse can stop after any
//! event. The document type declaration is handed to the DTD scanner configured with
//! the `dtd-scanner` property.
//!
//! A namespace-aware scanner splits names into prefix and local part. It binds them
//! itself only when no later stage of the chain does.

use std::{collections::VecDeque, rc::Rc};

use crate::{
    chars::XmlCharValid,
    component::{ComponentId, XmlComponent, XmlComponentManager, XmlProperty},
    constants::{
        DISALLOW_DOCTYPE_DECL, DOCUMENT_ENTITY_NAME, DTD_ENTITY_NAME, DTD_SCANNER, ENTITY_MANAGER,
        ERROR_REPORTER, LOAD_EXTERNAL_DTD, NAMESPACES, NOTIFY_BUILTIN_REFS, PARSER_SETTINGS,
        SYMBOL_TABLE, VALIDATION, VALIDATION_MANAGER, XmlVersion,
    },
    encoding::is_valid_encoding_name,
    entity::{Entity, ScannedEntity, XmlEntityHandler, predefined_entity},
    error::{XmlConfigurationError, XmlErrorCode, XniError},
    namespace::NamespaceContext,
    pipeline::{DocumentNext, DtdPipeline, PipelineContext},
    symbols::SymbolTable,
    validation::DtdGrammarDescription,
    xni::{
        Augmentations, DocumentEvent, QName, XmlAttribute, XmlAttributes, XmlLocation,
        XmlResourceIdentifier,
    },
};

/// The largest run of character data emitted as one event.
const TEXT_CHUNK: usize = 4096;

/// The entity being read by `cx`.
pub(crate) fn current<'c>(cx: &'c mut PipelineContext<'_>) -> Result<&'c mut ScannedEntity, XniError> {
    cx.entities
        .current()
        .ok_or_else(|| XniError::Pipeline("no entity is being read".into()))
}

/// The pseudo-attributes of an XML declaration or a text declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlDeclInfo {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
}

/// Whether the current entity starts with an XML or text declaration.
pub(crate) fn starts_xml_decl(cx: &mut PipelineContext<'_>) -> Result<bool, XniError> {
    let entity = current(cx)?;
    Ok(entity.starts_with("<?xml") && entity.peek_raw(5).is_some_and(|c| c.is_xml_space()))
}

fn skip_past(cx: &mut PipelineContext<'_>, delimiter: char) -> Result<(), XniError> {
    let entity = current(cx)?;
    entity.scan_until(usize::MAX, |c| c == delimiter);
    entity.skip_char(delimiter);
    Ok(())
}

/// Scan an XML declaration, or a text declaration when `text_decl` is set.
pub(crate) fn scan_xml_decl(
    cx: &mut PipelineContext<'_>,
    text_decl: bool,
) -> Result<XmlDeclInfo, XniError> {
    let mut info = XmlDeclInfo::default();
    current(cx)?.skip_string("<?xml");
    loop {
        let entity = current(cx)?;
        entity.skip_spaces();
        if entity.skip_string("?>") {
            break;
        }
        let Some(name) = entity.scan_name() else {
            cx.fatal(XmlErrorCode::XmlDeclUnterminated, &[])?;
            current(cx)?.scan_until_str("?>");
            break;
        };
        entity.skip_spaces();
        if !entity.skip_char('=') {
            cx.fatal(XmlErrorCode::XmlDeclUnterminated, &[])?;
            current(cx)?.scan_until_str("?>");
            break;
        }
        entity.skip_spaces();
        let Some(value) = scan_quoted(entity) else {
            cx.fatal(XmlErrorCode::QuoteRequired, &["in the XML declaration"])?;
            current(cx)?.scan_until_str("?>");
            break;
        };
        match name.as_str() {
            "version" => info.version = Some(value),
            "encoding" => {
                if !is_valid_encoding_name(&value) {
                    cx.fatal(XmlErrorCode::EncodingDeclInvalid, &[&value])?;
                }
                info.encoding = Some(value);
            }
            "standalone" if !text_decl => match value.as_str() {
                "yes" => info.standalone = Some(true),
                "no" => info.standalone = Some(false),
                _ => cx.fatal(XmlErrorCode::SdDeclInvalid, &[&value])?,
            },
            _ => {
                cx.fatal(XmlErrorCode::XmlDeclUnterminated, &[])?;
                current(cx)?.scan_until_str("?>");
                break;
            }
        }
    }
    if text_decl && info.encoding.is_none() {
        cx.fatal(XmlErrorCode::EncodingDeclRequired, &[])?;
    }
    if !text_decl && info.version.is_none() {
        cx.fatal(XmlErrorCode::VersionInfoRequired, &[])?;
    }
    Ok(info)
}

/// Scan a quoted literal. `None` if there is no opening quote or the entity ends first.
pub(crate) fn scan_quoted(entity: &mut ScannedEntity) -> Option<String> {
    let quote = entity.peek_char().filter(|&c| c == '"' || c == '\'')?;
    entity.next_char();
    entity.scan_until_str(if quote == '"' { "\"" } else { "'" })
}

/// Scan `SYSTEM literal` or `PUBLIC literal literal`, returning `(public, system)`.
///
/// With `public_only_allowed`, the system literal after a public one may be omitted,
/// as in a notation declaration.
pub(crate) fn scan_external_id(
    cx: &mut PipelineContext<'_>,
    public_only_allowed: bool,
) -> Result<(Option<String>, Option<String>), XniError> {
    let entity = current(cx)?;
    if entity.skip_string("SYSTEM") {
        if !entity.skip_spaces() {
            cx.fatal(XmlErrorCode::SpaceRequired, &["after \"SYSTEM\""])?;
        }
        let system = scan_quoted(current(cx)?);
        if system.is_none() {
            cx.fatal(XmlErrorCode::QuoteRequired, &["for the system identifier"])?;
        }
        return Ok((None, system));
    }
    if entity.skip_string("PUBLIC") {
        if !entity.skip_spaces() {
            cx.fatal(XmlErrorCode::SpaceRequired, &["after \"PUBLIC\""])?;
        }
        let public = scan_quoted(current(cx)?);
        if public.is_none() {
            cx.fatal(XmlErrorCode::QuoteRequired, &["for the public identifier"])?;
            return Ok((None, None));
        }
        let entity = current(cx)?;
        let spaced = entity.skip_spaces();
        if public_only_allowed && !matches!(entity.peek_char(), Some('"' | '\'')) {
            return Ok((public, None));
        }
        if !spaced {
            cx.fatal(XmlErrorCode::SpaceRequired, &["between the public and system identifiers"])?;
        }
        let system = scan_quoted(current(cx)?);
        if system.is_none() {
            cx.fatal(XmlErrorCode::QuoteRequired, &["for the system identifier"])?;
        }
        return Ok((public, system));
    }
    Ok((None, None))
}

/// Scan a processing instruction after its `<?`.
pub(crate) fn scan_pi_body(
    cx: &mut PipelineContext<'_>,
) -> Result<Option<(String, Option<String>)>, XniError> {
    let Some(target) = current(cx)?.scan_name() else {
        cx.fatal(XmlErrorCode::PITargetRequired, &[])?;
        current(cx)?.scan_until_str("?>");
        return Ok(None);
    };
    if target.eq_ignore_ascii_case("xml") {
        cx.fatal(XmlErrorCode::ReservedPITarget, &[])?;
    }
    let entity = current(cx)?;
    if entity.skip_string("?>") {
        return Ok(Some((target, None)));
    }
    if !entity.skip_spaces() {
        cx.fatal(
            XmlErrorCode::SpaceRequired,
            &["between the processing instruction target and data"],
        )?;
    }
    match current(cx)?.scan_until_str("?>") {
        Some(data) => Ok(Some((target, Some(data)))),
        None => {
            cx.fatal(XmlErrorCode::PIUnterminated, &[])?;
            Ok(None)
        }
    }
}

/// Scan a comment after its `<!--`.
pub(crate) fn scan_comment_body(cx: &mut PipelineContext<'_>) -> Result<Option<String>, XniError> {
    let Some(mut text) = current(cx)?.scan_until_str("--") else {
        cx.fatal(XmlErrorCode::CommentUnterminated, &[])?;
        return Ok(None);
    };
    if !current(cx)?.skip_char('>') {
        cx.fatal(XmlErrorCode::DashDashInComment, &[])?;
        match current(cx)?.scan_until_str("-->") {
            Some(rest) => {
                text.push_str("--");
                text.push_str(&rest);
            }
            None => {
                cx.fatal(XmlErrorCode::CommentUnterminated, &[])?;
                return Ok(None);
            }
        }
    }
    Ok(Some(text))
}

/// Scan a character reference after its `&#`.
///
/// Returns the reference as written between `&#` and `;`, and the character if it is
/// a legal one.
pub(crate) fn scan_char_ref(
    cx: &mut PipelineContext<'_>,
    version: XmlVersion,
) -> Result<(String, Option<char>), XniError> {
    let entity = current(cx)?;
    let hex = entity.skip_char('x');
    let digits = entity.scan_until(16, |c| {
        if hex {
            !c.is_ascii_hexdigit()
        } else {
            !c.is_ascii_digit()
        }
    });
    let terminated = entity.skip_char(';');
    let reference = if hex { format!("x{digits}") } else { digits.clone() };
    let value = u32::from_str_radix(&digits, if hex { 16 } else { 10 })
        .ok()
        .and_then(char::from_u32)
        .filter(|c| c.is_xml_char(version));
    match value {
        Some(c) if terminated => Ok((reference, Some(c))),
        _ => {
            cx.fatal(XmlErrorCode::InvalidCharRef, &[&reference])?;
            Ok((reference, None))
        }
    }
}

/// Append the normalized replacement text of the general entity `name` to `value`.
///
/// Returns `false` without reporting anything when `name` is not declared.
pub(crate) fn expand_attribute_entity(
    cx: &mut PipelineContext<'_>,
    version: XmlVersion,
    name: &str,
    context: [&str; 2],
    value: &mut String,
    path: &mut Vec<String>,
) -> Result<bool, XniError> {
    if let Some(text) = predefined_entity(name) {
        value.push_str(text);
        return Ok(true);
    }
    let text = match cx.entities.entity(name).cloned() {
        None => return Ok(false),
        Some(Entity::External { notation: Some(_), .. }) => {
            cx.fatal(XmlErrorCode::ReferenceToUnparsedEntity, &[name])?;
            return Ok(true);
        }
        Some(Entity::External { .. }) => {
            cx.fatal(XmlErrorCode::ReferenceToExternalEntity, &[name])?;
            return Ok(true);
        }
        Some(Entity::Internal { text, .. }) => text,
    };
    if path.iter().any(|open| open == name) {
        let chain = format!("{} -> {name}", path.join(" -> "));
        cx.fatal(XmlErrorCode::RecursiveReference, &[name, &chain])?;
        return Ok(true);
    }
    path.push(name.to_owned());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '<' => cx.fatal(XmlErrorCode::LessthanInAttValue, &context)?,
            '&' => {
                let reference = chars.by_ref().take_while(|&c| c != ';').collect::<String>();
                if let Some(number) = reference.strip_prefix('#') {
                    let (digits, radix) = match number.strip_prefix('x') {
                        Some(hex) => (hex, 16),
                        None => (number, 10),
                    };
                    match u32::from_str_radix(digits, radix)
                        .ok()
                        .and_then(char::from_u32)
                        .filter(|c| c.is_xml_char(version))
                    {
                        Some(c) => value.push(c),
                        None => cx.fatal(XmlErrorCode::InvalidCharRef, &[number])?,
                    }
                } else if !expand_attribute_entity(cx, version, &reference, context, value, path)? {
                    cx.fatal(XmlErrorCode::EntityNotDeclared, &[&reference])?;
                }
            }
            c if c.is_xml_space() => value.push(' '),
            c => value.push(c),
        }
    }
    path.pop();
    Ok(true)
}

/// Collects the entity boundaries the entity manager reports while the document is read.
#[derive(Debug, Default)]
struct DocumentEntityEvents {
    queue: VecDeque<(DocumentEvent, Augmentations)>,
}

impl XmlEntityHandler for DocumentEntityEvents {
    fn start_entity(
        &mut self,
        name: &str,
        identifier: Option<&XmlResourceIdentifier>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        let event = if name == DOCUMENT_ENTITY_NAME {
            DocumentEvent::StartDocument {
                location: XmlLocation {
                    public_id: identifier.and_then(|id| id.public_id.clone()),
                    system_id: identifier.and_then(|id| id.expanded_system_id.clone()),
                    line: 1,
                    column: 1,
                },
                encoding: encoding.map(str::to_owned),
            }
        } else if name.starts_with('%') || name == DTD_ENTITY_NAME {
            return Ok(());
        } else {
            DocumentEvent::StartGeneralEntity {
                name: name.to_owned(),
                identifier: identifier.cloned(),
                encoding: encoding.map(str::to_owned),
            }
        };
        self.queue.push_back((event, augs.clone()));
        Ok(())
    }

    fn end_entity(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError> {
        let event = if name == DOCUMENT_ENTITY_NAME {
            DocumentEvent::EndDocument
        } else if name.starts_with('%') || name == DTD_ENTITY_NAME {
            return Ok(());
        } else {
            DocumentEvent::EndGeneralEntity(name.to_owned())
        };
        self.queue.push_back((event, augs.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScannerState {
    XmlDecl,
    Prolog,
    Content,
    TrailingMisc,
    Done,
}

#[derive(Debug)]
struct OpenElement {
    name: QName,
    entity_depth: usize,
    /// The scanner pushed a namespace context for this element.
    bound: bool,
}

#[doc(alias = "XMLDocumentScannerImpl")]
#[doc(alias = "XMLNSDocumentScannerImpl")]
pub struct XmlDocumentScanner {
    version: XmlVersion,
    namespace_aware: bool,
    namespaces: bool,
    validation: bool,
    load_external_dtd: bool,
    disallow_doctype: bool,
    notify_builtin_refs: bool,
    symbols: Rc<SymbolTable>,
    dtd_scanner: Option<ComponentId>,
    configured: bool,

    state: ScannerState,
    events: DocumentEntityEvents,
    elements: Vec<OpenElement>,
    namespace_context: NamespaceContext,
    seen_doctype: bool,
    has_external_dtd: bool,
    has_pe_references: bool,
    standalone: bool,
}

impl XmlDocumentScanner {
    const RECOGNIZED_FEATURES: &[&str] = &[
        NAMESPACES,
        VALIDATION,
        LOAD_EXTERNAL_DTD,
        DISALLOW_DOCTYPE_DECL,
        NOTIFY_BUILTIN_REFS,
    ];
    const RECOGNIZED_PROPERTIES: &[&str] = &[
        SYMBOL_TABLE,
        ERROR_REPORTER,
        ENTITY_MANAGER,
        DTD_SCANNER,
        VALIDATION_MANAGER,
    ];

    /// A scanner for documents of `version`. An XML 1.1 scanner reads 1.0 documents too.
    pub fn new(version: XmlVersion, namespace_aware: bool) -> Self {
        Self {
            version,
            namespace_aware,
            namespaces: namespace_aware,
            validation: false,
            load_external_dtd: true,
            disallow_doctype: false,
            notify_builtin_refs: false,
            symbols: Rc::new(SymbolTable::new()),
            dtd_scanner: None,
            configured: false,
            state: ScannerState::XmlDecl,
            events: DocumentEntityEvents::default(),
            elements: vec![],
            namespace_context: NamespaceContext::new(),
            seen_doctype: false,
            has_external_dtd: false,
            has_pe_references: false,
            standalone: false,
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    pub fn is_namespace_aware(&self) -> bool {
        self.namespace_aware
    }

    /// The DTD scanner the document type declaration is handed to.
    pub fn dtd_scanner(&self) -> Option<ComponentId> {
        self.dtd_scanner
    }

    pub fn set_dtd_scanner(&mut self, dtd_scanner: Option<ComponentId>) {
        self.dtd_scanner = dtd_scanner;
    }

    pub fn is_done(&self) -> bool {
        self.state == ScannerState::Done
    }

    /// Scan one markup construct, or everything up to the end of the document when
    /// `complete` is set.
    ///
    /// Returns whether more of the document remains.
    pub fn scan_document(
        &mut self,
        complete: bool,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
        dtd: &mut DtdPipeline<'_, '_>,
    ) -> Result<bool, XniError> {
        loop {
            self.flush(cx, next)?;
            if self.state == ScannerState::Done {
                return Ok(false);
            }
            cx.check_entity_error()?;
            match self.state {
                ScannerState::XmlDecl => self.scan_xml_decl(cx, next)?,
                ScannerState::Prolog => self.scan_prolog(cx, next, dtd)?,
                ScannerState::Content => self.scan_content(cx, next)?,
                ScannerState::TrailingMisc => self.scan_trailing_misc(cx, next)?,
                ScannerState::Done => {}
            }
            if !complete {
                self.flush(cx, next)?;
                return Ok(self.state != ScannerState::Done);
            }
        }
    }

    fn flush(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        while let Some((event, augs)) = self.events.queue.pop_front() {
            next.emit(event, &augs, cx)?;
        }
        Ok(())
    }

    fn binds_namespaces(&self, next: &DocumentNext<'_, '_>) -> bool {
        self.namespace_aware && self.namespaces && !next.has_namespace_binder()
    }

    fn make_qname(&self, raw: &str, cx: &mut PipelineContext<'_>) -> Result<QName, XniError> {
        if self.namespace_aware && self.namespaces {
            if !self.version.is_valid_qname(raw) {
                cx.fatal(XmlErrorCode::InvalidQName, &[raw])?;
            }
            return Ok(QName::split(raw, &self.symbols));
        }
        Ok(QName::unprefixed(self.symbols.add_symbol(raw)))
    }

    /// Close every open entity, ending the document.
    fn finish(&mut self, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        while cx.entities.depth() > 0 {
            cx.entities.end_entity(&mut self.events)?;
        }
        self.state = ScannerState::Done;
        Ok(())
    }

    fn scan_xml_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.state = ScannerState::Prolog;
        if !starts_xml_decl(cx)? {
            return Ok(());
        }
        let info = scan_xml_decl(cx, false)?;
        if let Some(version) = info.version.as_deref() {
            match XmlVersion::from_declared(version) {
                Some(XmlVersion::Xml11) if self.version == XmlVersion::Xml10 => {
                    cx.fatal(XmlErrorCode::VersionNotSupported, &[version])?
                }
                None => cx.fatal(XmlErrorCode::VersionNotSupported, &[version])?,
                _ => {}
            }
        }
        if let Some(standalone) = info.standalone {
            self.standalone = standalone;
            cx.validation.set_standalone(standalone);
        }
        next.emit(
            DocumentEvent::XmlDecl {
                version: info.version.unwrap_or_default(),
                encoding: info.encoding,
                standalone: info.standalone,
            },
            &Augmentations::default(),
            cx,
        )
    }

    fn scan_prolog(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
        dtd: &mut DtdPipeline<'_, '_>,
    ) -> Result<(), XniError> {
        let version = self.version;
        let entity = current(cx)?;
        entity.skip_spaces();
        if entity.at_eof() {
            cx.fatal(XmlErrorCode::RootElementRequired, &[])?;
            return self.finish(cx);
        }
        if entity.skip_string("<?") {
            return self.scan_pi(cx, next);
        }
        if entity.skip_string("<!--") {
            return self.scan_comment(cx, next);
        }
        if entity.skip_string("<!DOCTYPE") {
            return self.scan_doctype(cx, next, dtd);
        }
        if entity.peek_char() == Some('<')
            && entity.peek_raw(1).is_some_and(|c| c.is_name_start_char(version))
        {
            entity.next_char();
            self.state = ScannerState::Content;
            return self.scan_start_tag(cx, next);
        }
        let code = if entity.peek_char() == Some('<') {
            XmlErrorCode::MarkupNotRecognizedInProlog
        } else {
            XmlErrorCode::ContentIllegalInProlog
        };
        cx.fatal(code, &[])?;
        current(cx)?.next_char();
        Ok(())
    }

    fn scan_trailing_misc(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let entity = current(cx)?;
        entity.skip_spaces();
        if entity.at_eof() {
            return self.finish(cx);
        }
        if entity.skip_string("<?") {
            return self.scan_pi(cx, next);
        }
        if entity.skip_string("<!--") {
            return self.scan_comment(cx, next);
        }
        let code = if entity.peek_char() == Some('<') {
            XmlErrorCode::MarkupNotRecognizedInMisc
        } else {
            XmlErrorCode::ContentIllegalInTrailingMisc
        };
        cx.fatal(code, &[])?;
        current(cx)?.next_char();
        Ok(())
    }

    fn scan_content(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let version = self.version;
        let entity = current(cx)?;
        match entity.peek_char() {
            None => self.end_of_entity(cx),
            Some('<') => {
                if entity.skip_string("</") {
                    return self.scan_end_tag(cx, next);
                }
                if entity.skip_string("<!--") {
                    return self.scan_comment(cx, next);
                }
                if entity.skip_string("<![CDATA[") {
                    return self.scan_cdata(cx, next);
                }
                if entity.skip_string("<?") {
                    return self.scan_pi(cx, next);
                }
                if entity.peek_raw(1).is_some_and(|c| c.is_name_start_char(version)) {
                    entity.next_char();
                    return self.scan_start_tag(cx, next);
                }
                cx.fatal(XmlErrorCode::MarkupNotRecognizedInContent, &[])?;
                current(cx)?.next_char();
                Ok(())
            }
            Some('&') => {
                entity.next_char();
                self.scan_reference(cx, next)
            }
            Some(_) => self.scan_text(cx, next),
        }
    }

    fn end_of_entity(&mut self, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        let depth = cx.entities.depth();
        if depth > 1 {
            if let Some(open) = self.elements.last().filter(|e| e.entity_depth == depth) {
                let name = open.name.raw_name.clone();
                cx.fatal(XmlErrorCode::ElementEntityMismatch, &[&name])?;
            }
            return cx.entities.end_entity(&mut self.events);
        }
        match self.elements.last() {
            Some(open) => {
                let name = open.name.raw_name.clone();
                cx.fatal(XmlErrorCode::ETagRequired, &[&name])?;
            }
            None => cx.fatal(XmlErrorCode::PrematureEof, &[])?,
        }
        self.finish(cx)
    }

    fn check_text(&self, cx: &mut PipelineContext<'_>, text: &mut String) -> Result<(), XniError> {
        let version = self.version;
        let illegal = |c: &char| !c.is_xml_char(version) || c.is_restricted_char(version);
        if let Some(c) = text.chars().find(illegal) {
            cx.fatal(
                XmlErrorCode::InvalidChar,
                &[&format!("{:x}", c as u32), "the element content of the document"],
            )?;
            text.retain(|c| !illegal(&c));
        }
        Ok(())
    }

    fn scan_text(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let mut text = String::new();
        loop {
            let entity = current(cx)?;
            text.push_str(&entity.scan_until(TEXT_CHUNK - text.len().min(TEXT_CHUNK), |c| {
                matches!(c, '<' | '&' | ']')
            }));
            if entity.peek_char() != Some(']') || text.len() >= TEXT_CHUNK {
                break;
            }
            if entity.skip_string("]]>") {
                text.push_str("]]>");
                cx.fatal(XmlErrorCode::CDEndInContent, &[])?;
            } else {
                entity.next_char();
                text.push(']');
            }
        }
        self.check_text(cx, &mut text)?;
        if text.is_empty() {
            return Ok(());
        }
        next.emit(DocumentEvent::Characters(text), &Augmentations::default(), cx)
    }

    fn scan_pi(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        if let Some((target, data)) = scan_pi_body(cx)? {
            next.emit(
                DocumentEvent::ProcessingInstruction { target, data },
                &Augmentations::default(),
                cx,
            )?;
        }
        Ok(())
    }

    fn scan_comment(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        if let Some(text) = scan_comment_body(cx)? {
            next.emit(DocumentEvent::Comment(text), &Augmentations::default(), cx)?;
        }
        Ok(())
    }

    fn scan_cdata(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let Some(mut text) = current(cx)?.scan_until_str("]]>") else {
            return cx.fatal(XmlErrorCode::CDSectUnterminated, &[]);
        };
        let augs = Augmentations::default();
        next.emit(DocumentEvent::StartCdata, &augs, cx)?;
        self.check_text(cx, &mut text)?;
        if !text.is_empty() {
            next.emit(DocumentEvent::Characters(text), &augs, cx)?;
        }
        next.emit(DocumentEvent::EndCdata, &augs, cx)
    }

    fn scan_start_tag(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let version = self.version;
        let Some(raw) = current(cx)?.scan_name() else {
            return cx.fatal(XmlErrorCode::MarkupNotRecognizedInContent, &[]);
        };
        let mut element = self.make_qname(&raw, cx)?;
        let mut attributes = XmlAttributes::new();
        let empty = loop {
            let entity = current(cx)?;
            let spaced = entity.skip_spaces();
            if entity.skip_string("/>") {
                break true;
            }
            if entity.skip_char('>') {
                break false;
            }
            match entity.peek_char() {
                Some(c) if spaced && c.is_name_start_char(version) => {
                    let name = entity.scan_name().unwrap_or_default();
                    self.scan_attribute(cx, &raw, name, &mut attributes)?;
                }
                _ => {
                    cx.fatal(XmlErrorCode::ElementUnterminated, &[&raw])?;
                    skip_past(cx, '>')?;
                    break false;
                }
            }
        };

        let bound = self.binds_namespaces(next);
        let mut augs = Augmentations::default();
        if bound {
            self.namespace_context.push_context();
            let (bindings, errors) = self.namespace_context.bind_start_element(
                &mut element,
                &mut attributes,
                version,
                &self.symbols,
            );
            for error in &errors {
                let args = error.args.iter().map(String::as_str).collect::<Vec<_>>();
                cx.fatal(error.code, &args)?;
            }
            augs.namespace_bindings = bindings;
        }

        if empty {
            next.emit(DocumentEvent::EmptyElement { element, attributes }, &augs, cx)?;
            if bound {
                self.namespace_context.pop_context();
            }
            if self.elements.is_empty() {
                self.state = ScannerState::TrailingMisc;
            }
            return Ok(());
        }
        self.elements.push(OpenElement {
            name: element.clone(),
            entity_depth: cx.entities.depth(),
            bound,
        });
        next.emit(DocumentEvent::StartElement { element, attributes }, &augs, cx)
    }

    fn scan_attribute(
        &mut self,
        cx: &mut PipelineContext<'_>,
        element: &str,
        name: String,
        attributes: &mut XmlAttributes,
    ) -> Result<(), XniError> {
        let entity = current(cx)?;
        entity.skip_spaces();
        if !entity.skip_char('=') {
            return cx.fatal(XmlErrorCode::EqRequiredInAttribute, &[element, &name]);
        }
        entity.skip_spaces();
        let Some((value, non_normalized_value)) = self.scan_attribute_value(cx, element, &name)?
        else {
            return Ok(());
        };
        if attributes.index_of(&name).is_some() {
            return cx.fatal(XmlErrorCode::AttributeNotUnique, &[element, &name]);
        }
        let name = self.make_qname(&name, cx)?;
        attributes.push(XmlAttribute {
            name,
            att_type: "CDATA",
            value,
            non_normalized_value,
            specified: true,
        });
        Ok(())
    }

    /// Scan a quoted attribute value, normalized as for `CDATA`.
    ///
    /// Returns the normalized and the non-normalized value.
    fn scan_attribute_value(
        &mut self,
        cx: &mut PipelineContext<'_>,
        element: &str,
        attribute: &str,
    ) -> Result<Option<(String, String)>, XniError> {
        let version = self.version;
        let context = [element, attribute];
        let entity = current(cx)?;
        let Some(quote) = entity.peek_char().filter(|&c| c == '"' || c == '\'') else {
            cx.fatal(XmlErrorCode::OpenQuoteExpected, &context)?;
            return Ok(None);
        };
        entity.next_char();
        let mut value = String::new();
        let mut raw = String::new();
        loop {
            let entity = current(cx)?;
            let Some(c) = entity.next_char() else {
                cx.fatal(XmlErrorCode::CloseQuoteExpected, &context)?;
                return Ok(None);
            };
            match c {
                c if c == quote => break,
                '<' => {
                    raw.push(c);
                    cx.fatal(XmlErrorCode::LessthanInAttValue, &context)?;
                }
                '&' if entity.skip_char('#') => {
                    let (reference, c) = scan_char_ref(cx, version)?;
                    raw.push_str(&format!("&#{reference};"));
                    value.extend(c);
                }
                '&' => {
                    let Some(name) = entity.scan_name() else {
                        cx.fatal(XmlErrorCode::NameRequiredInReference, &[])?;
                        continue;
                    };
                    if !entity.skip_char(';') {
                        cx.fatal(XmlErrorCode::SemicolonRequiredInReference, &[&name])?;
                    }
                    raw.push_str(&format!("&{name};"));
                    if !expand_attribute_entity(cx, version, &name, context, &mut value, &mut vec![])? {
                        self.undeclared_entity(cx, &name)?;
                    }
                }
                c if c.is_xml_space() => {
                    raw.push(c);
                    value.push(' ');
                }
                c => {
                    raw.push(c);
                    if !c.is_xml_char(version) || c.is_restricted_char(version) {
                        cx.fatal(
                            XmlErrorCode::InvalidChar,
                            &[&format!("{:x}", c as u32), "an attribute value"],
                        )?;
                    } else {
                        value.push(c);
                    }
                }
            }
        }
        Ok(Some((value, raw)))
    }

    /// Report a reference to an undeclared general entity.
    ///
    /// It is a well-formedness error unless a DTD the scanner could not see may declare it.
    fn undeclared_entity(&self, cx: &mut PipelineContext<'_>, name: &str) -> Result<(), XniError> {
        if (self.has_external_dtd || self.has_pe_references) && !self.standalone {
            if self.validation {
                cx.error(XmlErrorCode::EntityNotDeclared, &[name])?;
            }
            return Ok(());
        }
        cx.fatal(XmlErrorCode::EntityNotDeclared, &[name])
    }

    fn scan_reference(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let augs = Augmentations::default();
        let entity = current(cx)?;
        if entity.skip_char('#') {
            if let (_, Some(c)) = scan_char_ref(cx, self.version)? {
                next.emit(DocumentEvent::Characters(c.to_string()), &augs, cx)?;
            }
            return Ok(());
        }
        let Some(name) = entity.scan_name() else {
            return cx.fatal(XmlErrorCode::NameRequiredInReference, &[]);
        };
        if !entity.skip_char(';') {
            cx.fatal(XmlErrorCode::SemicolonRequiredInReference, &[&name])?;
        }
        if let Some(text) = predefined_entity(&name) {
            let characters = DocumentEvent::Characters(text.to_owned());
            if !self.notify_builtin_refs {
                return next.emit(characters, &augs, cx);
            }
            next.emit(
                DocumentEvent::StartGeneralEntity {
                    name: name.clone(),
                    identifier: None,
                    encoding: None,
                },
                &augs,
                cx,
            )?;
            next.emit(characters, &augs, cx)?;
            return next.emit(DocumentEvent::EndGeneralEntity(name), &augs, cx);
        }

        match cx.entities.entity(&name).map(|e| (e.is_unparsed(), e.is_external())) {
            None => {
                self.undeclared_entity(cx, &name)?;
                cx.entities.start_entity(&name, &mut self.events)?;
                Ok(())
            }
            Some((true, _)) => cx.fatal(XmlErrorCode::ReferenceToUnparsedEntity, &[&name]),
            Some((false, external)) => {
                if cx.entities.is_entity_open(&name) {
                    let path = cx
                        .entities
                        .entity_path()
                        .into_iter()
                        .filter(|open| *open != DOCUMENT_ENTITY_NAME)
                        .chain([name.as_str()])
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    return cx.fatal(XmlErrorCode::RecursiveReference, &[&name, &path]);
                }
                let started = cx.entities.start_entity(&name, &mut self.events)?;
                self.flush(cx, next)?;
                if started && external && starts_xml_decl(cx)? {
                    let info = scan_xml_decl(cx, true)?;
                    next.emit(
                        DocumentEvent::TextDecl {
                            version: info.version,
                            encoding: info.encoding,
                        },
                        &augs,
                        cx,
                    )?;
                }
                Ok(())
            }
        }
    }

    fn scan_end_tag(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        let entity = current(cx)?;
        let name = entity.scan_name().unwrap_or_default();
        entity.skip_spaces();
        if !entity.skip_char('>') {
            cx.fatal(XmlErrorCode::ETagUnterminated, &[&name])?;
            skip_past(cx, '>')?;
        }
        let Some(open) = self.elements.pop() else {
            return cx.fatal(XmlErrorCode::MarkupNotRecognizedInContent, &[]);
        };
        if *open.name.raw_name != *name {
            cx.fatal(XmlErrorCode::ETagRequired, &[&open.name.raw_name])?;
        }
        if open.entity_depth != cx.entities.depth() {
            cx.fatal(XmlErrorCode::ElementEntityMismatch, &[&open.name.raw_name])?;
        }
        next.emit(DocumentEvent::EndElement(open.name), &Augmentations::default(), cx)?;
        if open.bound {
            self.namespace_context.pop_context();
        }
        if self.elements.is_empty() {
            self.state = ScannerState::TrailingMisc;
        }
        Ok(())
    }

    fn scan_doctype(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
        dtd: &mut DtdPipeline<'_, '_>,
    ) -> Result<(), XniError> {
        if self.disallow_doctype {
            cx.fatal(XmlErrorCode::DoctypeNotAllowed, &[DISALLOW_DOCTYPE_DECL])?;
        }
        if self.seen_doctype {
            cx.fatal(XmlErrorCode::AlreadySeenDoctype, &[])?;
        }
        self.seen_doctype = true;
        if !current(cx)?.skip_spaces() {
            cx.fatal(XmlErrorCode::SpaceRequired, &["after \"<!DOCTYPE\""])?;
        }
        let Some(root) = current(cx)?.scan_name() else {
            cx.fatal(XmlErrorCode::RootElementTypeRequired, &[])?;
            return skip_past(cx, '>');
        };
        current(cx)?.skip_spaces();
        let (public_id, system_id) = scan_external_id(cx, false)?;
        current(cx)?.skip_spaces();
        next.emit(
            DocumentEvent::DoctypeDecl {
                root_element: root.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            },
            &Augmentations::default(),
            cx,
        )?;

        let identifier = XmlResourceIdentifier::new(
            public_id.clone(),
            system_id.clone(),
            cx.entities.base_system_id(),
        );
        self.has_external_dtd = system_id.is_some();
        let internal_subset = current(cx)?.peek_char() == Some('[');
        let mut cached = false;
        if self.has_external_dtd && !internal_subset {
            let description = DtdGrammarDescription {
                root_element: root.clone(),
                public_id,
                expanded_system_id: identifier.expanded_system_id.clone(),
            };
            cached = cx.validation.use_cached_grammar(&description);
            cx.validation.set_description(Some(description));
        }
        let read_external =
            self.has_external_dtd && (self.load_external_dtd || self.validation) && !cached;
        if !internal_subset && !read_external {
            return self.end_doctype(cx, &root);
        }

        let Some(scanner) = dtd.scanner.as_deref_mut() else {
            return Err(XniError::Pipeline("no DTD scanner is configured".into()));
        };
        scanner.start_dtd(cx, &mut dtd.next)?;
        if internal_subset {
            current(cx)?.next_char();
            scanner.scan_internal_subset(cx, &mut dtd.next)?;
            current(cx)?.skip_spaces();
        }
        self.end_doctype(cx, &root)?;
        if read_external {
            scanner.scan_external_subset(cx, &mut dtd.next, &identifier)?;
        }
        scanner.end_dtd(cx, &mut dtd.next)?;
        self.has_pe_references = scanner.saw_pe_references();
        Ok(())
    }

    fn end_doctype(&mut self, cx: &mut PipelineContext<'_>, root: &str) -> Result<(), XniError> {
        if !current(cx)?.skip_char('>') {
            cx.fatal(XmlErrorCode::DoctypedeclUnterminated, &[root])?;
            skip_past(cx, '>')?;
        }
        Ok(())
    }
}

impl XmlEntityHandler for XmlDocumentScanner {
    fn start_entity(
        &mut self,
        name: &str,
        identifier: Option<&XmlResourceIdentifier>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.events.start_entity(name, identifier, encoding, augs)
    }

    fn end_entity(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError> {
        self.events.end_entity(name, augs)
    }
}

impl XmlComponent for XmlDocumentScanner {
    fn recognized_features(&self) -> &[&'static str] {
        Self::RECOGNIZED_FEATURES
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        match feature_id {
            LOAD_EXTERNAL_DTD => Some(true),
            DISALLOW_DOCTYPE_DECL | NOTIFY_BUILTIN_REFS => Some(false),
            _ => None,
        }
    }

    fn recognized_properties(&self) -> &[&'static str] {
        Self::RECOGNIZED_PROPERTIES
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.state = ScannerState::XmlDecl;
        self.events.queue.clear();
        self.elements.clear();
        self.namespace_context.reset();
        self.seen_doctype = false;
        self.has_external_dtd = false;
        self.has_pe_references = false;
        self.standalone = false;
        if let Some(XmlProperty::Component(id)) = manager.property(DTD_SCANNER) {
            self.dtd_scanner = Some(id);
        }
        if self.configured && !manager.feature_or(PARSER_SETTINGS, true) {
            return Ok(());
        }
        self.namespaces = manager.feature_or(NAMESPACES, self.namespace_aware);
        self.validation = manager.feature_or(VALIDATION, false);
        self.load_external_dtd = manager.feature_or(LOAD_EXTERNAL_DTD, true);
        self.disallow_doctype = manager.feature_or(DISALLOW_DOCTYPE_DECL, false);
        self.notify_builtin_refs = manager.feature_or(NOTIFY_BUILTIN_REFS, false);
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
            LOAD_EXTERNAL_DTD => self.load_external_dtd = state,
            DISALLOW_DOCTYPE_DECL => self.disallow_doctype = state,
            NOTIFY_BUILTIN_REFS => self.notify_builtin_refs = state,
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
            (DTD_SCANNER, XmlProperty::Component(id)) => self.dtd_scanner = Some(*id),
            (SYMBOL_TABLE, XmlProperty::SymbolTable(symbols)) => self.symbols = symbols.clone(),
            _ => {}
        }
        Ok(())
    }
}
