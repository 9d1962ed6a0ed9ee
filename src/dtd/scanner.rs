//! Provide the DTD scanner.
//!
//! The scanner reads the internal subset in place, inside the document entity, and the
//! external subset as the `[dtd]` entity. Entity declarations are registered with the
//! entity manager as they are read, so later references in the same DTD resolve.
//! Everything else only travels down the DTD chain as [`DtdEvent`]s.

use std::collections::VecDeque;

use crate::{
    chars::XmlCharValid,
    component::{XmlComponent, XmlComponentManager},
    constants::{
        DTD_ENTITY_NAME, ENTITY_MANAGER, ERROR_REPORTER, PARSER_SETTINGS, SYMBOL_TABLE,
        VALIDATION, XmlVersion,
    },
    dtd::{
        AttDefault, AttType, ConditionalKind, ContentOccurrence, ContentSeparator,
        XmlAttributeDecl,
    },
    entity::{Entity, XmlEntityHandler, predefined_entity},
    error::{XmlConfigurationError, XmlErrorCode, XniError},
    pipeline::{DtdNext, PipelineContext},
    scanner::{
        current, expand_attribute_entity, scan_char_ref, scan_comment_body, scan_external_id,
        scan_pi_body, scan_xml_decl, starts_xml_decl,
    },
    xni::{Augmentations, DtdEvent, XmlInputSource, XmlResourceIdentifier},
};

/// Collects the subset and parameter entity boundaries reported by the entity manager.
#[derive(Debug, Default)]
struct DtdEntityEvents {
    queue: VecDeque<(DtdEvent, Augmentations)>,
}

impl XmlEntityHandler for DtdEntityEvents {
    fn start_entity(
        &mut self,
        name: &str,
        identifier: Option<&XmlResourceIdentifier>,
        encoding: Option<&str>,
        augs: &Augmentations,
    ) -> Result<(), XniError> {
        let event = if name == DTD_ENTITY_NAME {
            DtdEvent::StartExternalSubset(identifier.cloned().unwrap_or_default())
        } else if name.starts_with('%') {
            DtdEvent::StartParameterEntity {
                name: name.to_owned(),
                identifier: identifier.cloned(),
                encoding: encoding.map(str::to_owned),
            }
        } else {
            return Ok(());
        };
        self.queue.push_back((event, augs.clone()));
        Ok(())
    }

    fn end_entity(&mut self, name: &str, augs: &Augmentations) -> Result<(), XniError> {
        let event = if name == DTD_ENTITY_NAME {
            DtdEvent::EndExternalSubset
        } else if name.starts_with('%') {
            DtdEvent::EndParameterEntity(name.to_owned())
        } else {
            return Ok(());
        };
        self.queue.push_back((event, augs.clone()));
        Ok(())
    }
}

/// Collapse runs of spaces in a normalized value, as for every type but `CDATA`.
pub(crate) fn collapse_spaces(value: &str) -> String {
    value.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

#[doc(alias = "XMLDTDScannerImpl")]
pub struct XmlDtdScanner {
    version: XmlVersion,
    validation: bool,
    configured: bool,

    events: DtdEntityEvents,
    /// The entity depth of the subset being read. Deeper entities are parameter entities.
    base_depth: usize,
    include_depth: usize,
    in_external_subset: bool,
    saw_pe_references: bool,
}

impl XmlDtdScanner {
    const RECOGNIZED_FEATURES: &[&str] = &[VALIDATION];
    const RECOGNIZED_PROPERTIES: &[&str] = &[SYMBOL_TABLE, ERROR_REPORTER, ENTITY_MANAGER];

    pub fn new(version: XmlVersion) -> Self {
        Self {
            version,
            validation: false,
            configured: false,
            events: DtdEntityEvents::default(),
            base_depth: 0,
            include_depth: 0,
            in_external_subset: false,
            saw_pe_references: false,
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    /// Whether the DTD read so far referenced any parameter entity.
    pub fn saw_pe_references(&self) -> bool {
        self.saw_pe_references
    }

    pub fn start_dtd(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.events.queue.clear();
        self.include_depth = 0;
        self.in_external_subset = false;
        self.saw_pe_references = false;
        let location = cx.entities.location();
        next.emit(DtdEvent::StartDtd(location), &Augmentations::default(), cx)
    }

    /// Scan the internal subset after its `[`, up to and including the closing `]`.
    pub fn scan_internal_subset(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.base_depth = cx.entities.depth();
        self.scan_decls(cx, next, true)
    }

    /// Open the external subset named by `identifier` and scan all of it.
    pub fn scan_external_subset(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        identifier: &XmlResourceIdentifier,
    ) -> Result<(), XniError> {
        cx.entities.start_external_subset(identifier, &mut self.events)?;
        self.scan_opened_subset(cx, next)
    }

    pub fn end_dtd(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.flush(cx, next)?;
        next.emit(DtdEvent::EndDtd, &Augmentations::default(), cx)
    }

    /// Scan `source` as a complete external subset with no document around it.
    pub fn scan_standalone_subset(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        source: XmlInputSource,
    ) -> Result<(), XniError> {
        self.start_dtd(cx, next)?;
        let encoding = cx
            .entities
            .setup_current_entity(DTD_ENTITY_NAME, source, false, true)?;
        cx.entities
            .notify_current_start(encoding.as_deref(), &mut self.events)?;
        self.scan_opened_subset(cx, next)?;
        self.end_dtd(cx, next)
    }

    fn scan_opened_subset(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.flush(cx, next)?;
        self.in_external_subset = true;
        self.base_depth = cx.entities.depth();
        self.scan_text_decl(cx, next)?;
        self.scan_decls(cx, next, false)?;
        if cx.entities.depth() == self.base_depth {
            cx.entities.end_entity(&mut self.events)?;
        }
        self.flush(cx, next)?;
        self.in_external_subset = false;
        Ok(())
    }

    fn flush(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        while let Some((event, augs)) = self.events.queue.pop_front() {
            next.emit(event, &augs, cx)?;
        }
        Ok(())
    }

    fn emit(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        event: DtdEvent,
    ) -> Result<(), XniError> {
        next.emit(event, &Augmentations::default(), cx)
    }

    fn scan_text_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        if starts_xml_decl(cx)? {
            let info = scan_xml_decl(cx, true)?;
            self.emit(
                cx,
                next,
                DtdEvent::TextDecl {
                    version: info.version,
                    encoding: info.encoding,
                },
            )?;
        }
        Ok(())
    }

    /// Whether the markup being read comes from an external entity, where parameter
    /// entity references may occur inside declarations.
    fn in_external_scope(&self, cx: &PipelineContext<'_>) -> bool {
        self.in_external_subset
            || cx
                .entities
                .current_entity()
                .is_some_and(|e| e.is_external() && e.name().starts_with('%'))
    }

    fn skip_past_decl(&self, cx: &mut PipelineContext<'_>) -> Result<(), XniError> {
        let entity = current(cx)?;
        entity.scan_until(usize::MAX, |c| c == '>');
        entity.skip_char('>');
        Ok(())
    }

    fn scan_decls(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        internal: bool,
    ) -> Result<(), XniError> {
        loop {
            self.flush(cx, next)?;
            cx.check_entity_error()?;
            let depth = cx.entities.depth();
            let entity = current(cx)?;
            entity.skip_spaces();
            if entity.at_eof() {
                if depth > self.base_depth {
                    cx.entities.end_entity(&mut self.events)?;
                    continue;
                }
                if internal {
                    cx.fatal(XmlErrorCode::PrematureEof, &[])?;
                }
                if self.include_depth > 0 {
                    self.include_depth = 0;
                    cx.fatal(XmlErrorCode::CondSectUnterminated, &[])?;
                }
                return Ok(());
            }
            if internal && depth == self.base_depth && entity.skip_char(']') {
                return Ok(());
            }
            if self.include_depth > 0 && entity.skip_string("]]>") {
                self.include_depth -= 1;
                self.emit(cx, next, DtdEvent::EndConditional)?;
                continue;
            }
            if entity.skip_char('%') {
                self.scan_pe_reference(cx, next)?;
            } else if entity.skip_string("<!ELEMENT") {
                self.scan_element_decl(cx, next)?;
            } else if entity.skip_string("<!ATTLIST") {
                self.scan_attlist_decl(cx, next)?;
            } else if entity.skip_string("<!ENTITY") {
                self.scan_entity_decl(cx, next)?;
            } else if entity.skip_string("<!NOTATION") {
                self.scan_notation_decl(cx, next)?;
            } else if entity.skip_string("<!--") {
                if let Some(text) = scan_comment_body(cx)? {
                    self.emit(cx, next, DtdEvent::Comment(text))?;
                }
            } else if entity.skip_string("<![") {
                self.scan_conditional(cx, next)?;
            } else if entity.skip_string("<?") {
                if let Some((target, data)) = scan_pi_body(cx)? {
                    self.emit(cx, next, DtdEvent::ProcessingInstruction { target, data })?;
                }
            } else {
                cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
                current(cx)?.next_char();
                self.skip_past_decl(cx)?;
            }
        }
    }

    /// Scan a parameter entity reference between declarations, after its `%`.
    fn scan_pe_reference(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        let entity = current(cx)?;
        let Some(name) = entity.scan_name() else {
            return cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[]);
        };
        if !entity.skip_char(';') {
            cx.fatal(XmlErrorCode::SemicolonRequiredInReference, &[&name])?;
        }
        self.start_pe(cx, next, &name)?;
        Ok(())
    }

    /// Start reading the parameter entity `name`. Returns whether it was entered.
    fn start_pe(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        name: &str,
    ) -> Result<bool, XniError> {
        self.saw_pe_references = true;
        let key = format!("%{name}");
        let Some(external) = cx.entities.entity(&key).map(Entity::is_external) else {
            if cx.validation.is_standalone() {
                cx.fatal(XmlErrorCode::EntityNotDeclared, &[&key])?;
            } else if self.validation {
                cx.error(XmlErrorCode::EntityNotDeclared, &[&key])?;
            }
            cx.entities.start_entity(&key, &mut self.events)?;
            self.flush(cx, next)?;
            return Ok(false);
        };
        if cx.entities.is_entity_open(&key) {
            let path = cx
                .entities
                .entity_path()
                .into_iter()
                .filter(|open| open.starts_with('%'))
                .chain([key.as_str()])
                .collect::<Vec<_>>()
                .join(" -> ");
            cx.fatal(XmlErrorCode::RecursiveReference, &[&key, &path])?;
            return Ok(false);
        }
        let started = cx.entities.start_entity(&key, &mut self.events)?;
        self.flush(cx, next)?;
        if started && external {
            self.scan_text_decl(cx, next)?;
        }
        Ok(started)
    }

    /// Skip white space inside a declaration, entering and leaving parameter entities.
    ///
    /// Returns whether any separation was found. A parameter entity boundary counts as
    /// separation.
    fn skip_decl_spaces(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<bool, XniError> {
        let version = self.version;
        let mut found = false;
        loop {
            let depth = cx.entities.depth();
            let entity = current(cx)?;
            found |= entity.skip_spaces();
            if depth > self.base_depth && entity.name().starts_with('%') && entity.at_eof() {
                cx.entities.end_entity(&mut self.events)?;
                self.flush(cx, next)?;
                found = true;
                continue;
            }
            if entity.peek_char() != Some('%')
                || !entity.peek_raw(1).is_some_and(|c| c.is_name_start_char(version))
            {
                return Ok(found);
            }
            entity.next_char();
            let name = entity.scan_name().unwrap_or_default();
            if !entity.skip_char(';') {
                cx.fatal(XmlErrorCode::SemicolonRequiredInReference, &[&name])?;
            }
            if !self.in_external_scope(cx) {
                cx.fatal(XmlErrorCode::PEReferenceWithinMarkup, &[&name])?;
                continue;
            }
            self.start_pe(cx, next, &name)?;
            found = true;
        }
    }

    fn require_decl_spaces(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        context: &str,
    ) -> Result<(), XniError> {
        if !self.skip_decl_spaces(cx, next)? {
            cx.fatal(XmlErrorCode::SpaceRequired, &[context])?;
        }
        Ok(())
    }

    fn end_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        code: XmlErrorCode,
        name: &str,
    ) -> Result<(), XniError> {
        self.skip_decl_spaces(cx, next)?;
        if !current(cx)?.skip_char('>') {
            cx.fatal(code, &[name])?;
            self.skip_past_decl(cx)?;
        }
        Ok(())
    }

    fn scan_element_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.require_decl_spaces(cx, next, "after \"<!ELEMENT\"")?;
        let Some(name) = current(cx)?.scan_name() else {
            cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
            return self.skip_past_decl(cx);
        };
        self.require_decl_spaces(cx, next, "before the content specification")?;
        self.emit(cx, next, DtdEvent::StartContentModel(name.clone()))?;
        let mut model = String::new();
        let entity = current(cx)?;
        let well_formed = if entity.skip_string("EMPTY") {
            model.push_str("EMPTY");
            self.emit(cx, next, DtdEvent::Empty)?;
            true
        } else if entity.skip_string("ANY") {
            model.push_str("ANY");
            self.emit(cx, next, DtdEvent::Any)?;
            true
        } else if entity.skip_char('(') {
            model.push('(');
            self.skip_decl_spaces(cx, next)?;
            if current(cx)?.skip_string("#PCDATA") {
                self.scan_mixed(cx, next, &name, &mut model)?
            } else {
                self.scan_children(cx, next, &name, &mut model)?
            }
        } else {
            cx.fatal(XmlErrorCode::ContentModelInvalid, &[&name])?;
            false
        };
        self.emit(cx, next, DtdEvent::EndContentModel)?;
        if !well_formed {
            return self.skip_past_decl(cx);
        }
        self.end_decl(cx, next, XmlErrorCode::ElementDeclUnterminated, &name)?;
        self.emit(
            cx,
            next,
            DtdEvent::ElementDecl {
                name,
                content_model: model,
            },
        )
    }

    /// Scan a mixed content model after its `(#PCDATA`.
    fn scan_mixed(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        name: &str,
        model: &mut String,
    ) -> Result<bool, XniError> {
        model.push_str("#PCDATA");
        self.emit(cx, next, DtdEvent::StartGroup)?;
        self.emit(cx, next, DtdEvent::Pcdata)?;
        let mut children = 0;
        loop {
            self.skip_decl_spaces(cx, next)?;
            let entity = current(cx)?;
            if entity.skip_char('|') {
                model.push('|');
                self.emit(cx, next, DtdEvent::Separator(ContentSeparator::Choice))?;
                self.skip_decl_spaces(cx, next)?;
                let Some(child) = current(cx)?.scan_name() else {
                    cx.fatal(XmlErrorCode::ContentModelInvalid, &[name])?;
                    return Ok(false);
                };
                model.push_str(&child);
                self.emit(cx, next, DtdEvent::Element(child))?;
                children += 1;
            } else if entity.skip_char(')') {
                model.push(')');
                self.emit(cx, next, DtdEvent::EndGroup)?;
                if current(cx)?.skip_char('*') {
                    model.push('*');
                    self.emit(cx, next, DtdEvent::Occurrence(ContentOccurrence::ZeroOrMore))?;
                } else if children > 0 {
                    cx.fatal(XmlErrorCode::ContentModelInvalid, &[name])?;
                    return Ok(false);
                }
                return Ok(true);
            } else {
                cx.fatal(XmlErrorCode::ContentModelInvalid, &[name])?;
                return Ok(false);
            }
        }
    }

    /// Scan a group of an element content model after its `(`.
    fn scan_children(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        name: &str,
        model: &mut String,
    ) -> Result<bool, XniError> {
        self.emit(cx, next, DtdEvent::StartGroup)?;
        let mut separator = None;
        loop {
            self.skip_decl_spaces(cx, next)?;
            let entity = current(cx)?;
            if entity.skip_char('(') {
                model.push('(');
                if !self.scan_children(cx, next, name, model)? {
                    return Ok(false);
                }
            } else if let Some(child) = entity.scan_name() {
                model.push_str(&child);
                self.emit(cx, next, DtdEvent::Element(child))?;
                self.scan_occurrence(cx, next, model)?;
            } else {
                cx.fatal(XmlErrorCode::ContentModelInvalid, &[name])?;
                return Ok(false);
            }

            self.skip_decl_spaces(cx, next)?;
            let entity = current(cx)?;
            match entity.peek_char() {
                Some(c @ (',' | '|')) => {
                    if separator.is_some_and(|s| s != c) {
                        cx.fatal(XmlErrorCode::ContentModelInvalid, &[name])?;
                        return Ok(false);
                    }
                    separator = Some(c);
                    entity.next_char();
                    model.push(c);
                    let separator = if c == ',' {
                        ContentSeparator::Sequence
                    } else {
                        ContentSeparator::Choice
                    };
                    self.emit(cx, next, DtdEvent::Separator(separator))?;
                }
                Some(')') => {
                    entity.next_char();
                    model.push(')');
                    self.emit(cx, next, DtdEvent::EndGroup)?;
                    self.scan_occurrence(cx, next, model)?;
                    return Ok(true);
                }
                _ => {
                    cx.fatal(XmlErrorCode::ContentModelInvalid, &[name])?;
                    return Ok(false);
                }
            }
        }
    }

    fn scan_occurrence(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        model: &mut String,
    ) -> Result<(), XniError> {
        let entity = current(cx)?;
        let occurrence = match entity.peek_char() {
            Some('?') => ContentOccurrence::ZeroOrOne,
            Some('*') => ContentOccurrence::ZeroOrMore,
            Some('+') => ContentOccurrence::OneOrMore,
            _ => return Ok(()),
        };
        entity.next_char();
        model.push(occurrence.as_char());
        self.emit(cx, next, DtdEvent::Occurrence(occurrence))
    }

    fn scan_attlist_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.require_decl_spaces(cx, next, "after \"<!ATTLIST\"")?;
        let Some(element) = current(cx)?.scan_name() else {
            cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
            return self.skip_past_decl(cx);
        };
        self.emit(cx, next, DtdEvent::StartAttlist(element.clone()))?;
        loop {
            let spaced = self.skip_decl_spaces(cx, next)?;
            let entity = current(cx)?;
            if entity.skip_char('>') {
                break;
            }
            let Some(attribute) = entity.scan_name().filter(|_| spaced) else {
                cx.fatal(XmlErrorCode::AttlistDeclUnterminated, &[&element])?;
                self.skip_past_decl(cx)?;
                break;
            };
            let context = [element.as_str(), attribute.as_str()];
            if !self.skip_decl_spaces(cx, next)? {
                cx.fatal(XmlErrorCode::AttTypeRequired, &context)?;
            }
            let Some(att_type) = self.scan_att_type(cx, next, context)? else {
                self.skip_past_decl(cx)?;
                break;
            };
            if !self.skip_decl_spaces(cx, next)? {
                cx.fatal(XmlErrorCode::AttDefaultRequired, &context)?;
            }
            let Some((default, non_normalized_default)) =
                self.scan_att_default(cx, next, context, &att_type)?
            else {
                self.skip_past_decl(cx)?;
                break;
            };
            let decl = XmlAttributeDecl {
                element_name: element.clone(),
                attribute_name: attribute,
                att_type,
                default,
                non_normalized_default,
            };
            self.emit(cx, next, DtdEvent::AttributeDecl(decl))?;
        }
        self.emit(cx, next, DtdEvent::EndAttlist)
    }

    fn scan_att_type(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        context: [&str; 2],
    ) -> Result<Option<AttType>, XniError> {
        let entity = current(cx)?;
        let att_type = if entity.skip_string("CDATA") {
            AttType::CData
        } else if entity.skip_string("IDREFS") {
            AttType::IdRefs
        } else if entity.skip_string("IDREF") {
            AttType::IdRef
        } else if entity.skip_string("ID") {
            AttType::Id
        } else if entity.skip_string("ENTITIES") {
            AttType::Entities
        } else if entity.skip_string("ENTITY") {
            AttType::Entity
        } else if entity.skip_string("NMTOKENS") {
            AttType::NmTokens
        } else if entity.skip_string("NMTOKEN") {
            AttType::NmToken
        } else if entity.skip_string("NOTATION") {
            self.require_decl_spaces(cx, next, "after \"NOTATION\"")?;
            if !current(cx)?.skip_char('(') {
                cx.fatal(XmlErrorCode::AttTypeRequired, &context)?;
                return Ok(None);
            }
            match self.scan_enumeration(cx, next, context, true)? {
                Some(values) => AttType::Notation(values),
                None => return Ok(None),
            }
        } else if entity.skip_char('(') {
            match self.scan_enumeration(cx, next, context, false)? {
                Some(values) => AttType::Enumeration(values),
                None => return Ok(None),
            }
        } else {
            cx.fatal(XmlErrorCode::AttTypeRequired, &context)?;
            return Ok(None);
        };
        Ok(Some(att_type))
    }

    /// Scan the values of an enumerated type after its `(`.
    fn scan_enumeration(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        context: [&str; 2],
        names: bool,
    ) -> Result<Option<Vec<String>>, XniError> {
        let mut values = vec![];
        loop {
            self.skip_decl_spaces(cx, next)?;
            let entity = current(cx)?;
            let token = if names {
                entity.scan_name()
            } else {
                entity.scan_nmtoken()
            };
            let Some(token) = token else {
                cx.fatal(XmlErrorCode::AttTypeRequired, &context)?;
                return Ok(None);
            };
            values.push(token);
            self.skip_decl_spaces(cx, next)?;
            let entity = current(cx)?;
            if entity.skip_char('|') {
                continue;
            }
            if entity.skip_char(')') {
                return Ok(Some(values));
            }
            cx.fatal(XmlErrorCode::AttTypeRequired, &context)?;
            return Ok(None);
        }
    }

    fn scan_att_default(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        context: [&str; 2],
        att_type: &AttType,
    ) -> Result<Option<(AttDefault, Option<String>)>, XniError> {
        let entity = current(cx)?;
        if entity.skip_string("#REQUIRED") {
            return Ok(Some((AttDefault::Required, None)));
        }
        if entity.skip_string("#IMPLIED") {
            return Ok(Some((AttDefault::Implied, None)));
        }
        let fixed = entity.skip_string("#FIXED");
        if fixed {
            self.require_decl_spaces(cx, next, "after \"#FIXED\"")?;
        }
        let Some((value, non_normalized)) = self.scan_default_value(cx, context)? else {
            return Ok(None);
        };
        let value = match att_type {
            AttType::CData => value,
            _ => collapse_spaces(&value),
        };
        let default = if fixed {
            AttDefault::Fixed(value)
        } else {
            AttDefault::Default(value)
        };
        Ok(Some((default, Some(non_normalized))))
    }

    /// Scan a default attribute value, normalized as for `CDATA`.
    fn scan_default_value(
        &mut self,
        cx: &mut PipelineContext<'_>,
        context: [&str; 2],
    ) -> Result<Option<(String, String)>, XniError> {
        let version = self.version;
        let entity = current(cx)?;
        let Some(quote) = entity.peek_char().filter(|&c| c == '"' || c == '\'') else {
            cx.fatal(XmlErrorCode::AttDefaultRequired, &context)?;
            return Ok(None);
        };
        entity.next_char();
        let (mut value, mut raw) = (String::new(), String::new());
        loop {
            let entity = current(cx)?;
            let Some(c) = entity.next_char() else {
                cx.fatal(XmlErrorCode::LiteralUnterminated, &[])?;
                return Ok(None);
            };
            match c {
                c if c == quote => return Ok(Some((value, raw))),
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
                    let name = entity.scan_name().unwrap_or_default();
                    if !entity.skip_char(';') {
                        cx.fatal(XmlErrorCode::SemicolonRequiredInReference, &[&name])?;
                    }
                    raw.push_str(&format!("&{name};"));
                    if !expand_attribute_entity(cx, version, &name, context, &mut value, &mut vec![])? {
                        cx.fatal(XmlErrorCode::EntityNotDeclared, &[&name])?;
                    }
                }
                c if c.is_xml_space() => {
                    raw.push(c);
                    value.push(' ');
                }
                c => {
                    raw.push(c);
                    value.push(c);
                }
            }
        }
    }

    fn scan_entity_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.require_decl_spaces(cx, next, "after \"<!ENTITY\"")?;
        let entity = current(cx)?;
        let parameter = entity.peek_char() == Some('%')
            && entity.peek_raw(1).is_some_and(|c| c.is_xml_space());
        if parameter {
            entity.next_char();
            self.require_decl_spaces(cx, next, "after the '%' of a parameter entity declaration")?;
        }
        let Some(name) = current(cx)?.scan_name() else {
            cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
            return self.skip_past_decl(cx);
        };
        self.require_decl_spaces(cx, next, "after the entity name")?;
        let key = if parameter {
            format!("%{name}")
        } else {
            name.clone()
        };
        let in_external = self.in_external_scope(cx);

        let (event, added) = if matches!(current(cx)?.peek_char(), Some('"' | '\'')) {
            let Some(text) = self.scan_entity_value(cx, next)? else {
                return self.skip_past_decl(cx);
            };
            let added = cx.entities.add_internal_entity(&key, &text, in_external);
            (DtdEvent::InternalEntityDecl { name: key.clone(), text }, added)
        } else {
            let (public_id, system_id) = scan_external_id(cx, false)?;
            if system_id.is_none() {
                cx.fatal(XmlErrorCode::ExternalIdRequired, &[])?;
                return self.skip_past_decl(cx);
            }
            let identifier =
                XmlResourceIdentifier::new(public_id, system_id, cx.entities.base_system_id());
            let spaced = self.skip_decl_spaces(cx, next)?;
            let notation = if !parameter && current(cx)?.skip_string("NDATA") {
                if !spaced {
                    cx.fatal(XmlErrorCode::SpaceRequired, &["before \"NDATA\""])?;
                }
                self.require_decl_spaces(cx, next, "after \"NDATA\"")?;
                match current(cx)?.scan_name() {
                    Some(notation) => Some(notation),
                    None => {
                        cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
                        return self.skip_past_decl(cx);
                    }
                }
            } else {
                None
            };
            match notation {
                Some(notation) => {
                    let added = cx.entities.add_unparsed_entity(
                        &key,
                        identifier.clone(),
                        &notation,
                        in_external,
                    );
                    let event = DtdEvent::UnparsedEntityDecl {
                        name: key.clone(),
                        identifier,
                        notation,
                    };
                    (event, added)
                }
                None => {
                    let added = cx
                        .entities
                        .add_external_entity(&key, identifier.clone(), in_external);
                    let event = DtdEvent::ExternalEntityDecl {
                        name: key.clone(),
                        identifier,
                    };
                    (event, added)
                }
            }
        };
        if !added && predefined_entity(&key).is_none() && cx.entities.warn_on_duplicate_entity() {
            cx.warning(XmlErrorCode::DuplicateEntityDef, &[&key])?;
        }
        self.end_decl(cx, next, XmlErrorCode::EntityDeclUnterminated, &key)?;
        self.emit(cx, next, event)
    }

    /// Scan a quoted entity value. Character and parameter entity references are
    /// replaced, general entity references are kept as written.
    fn scan_entity_value(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<Option<String>, XniError> {
        let version = self.version;
        let entity = current(cx)?;
        let Some(quote) = entity.next_char() else {
            return Ok(None);
        };
        let mut value = String::new();
        loop {
            let entity = current(cx)?;
            let Some(c) = entity.next_char() else {
                cx.fatal(XmlErrorCode::LiteralUnterminated, &[])?;
                return Ok(None);
            };
            match c {
                c if c == quote => return Ok(Some(value)),
                '&' if entity.skip_char('#') => {
                    if let (_, Some(c)) = scan_char_ref(cx, version)? {
                        value.push(c);
                    }
                }
                '%' => {
                    let name = entity.scan_name().unwrap_or_default();
                    if !entity.skip_char(';') {
                        cx.fatal(XmlErrorCode::SemicolonRequiredInReference, &[&name])?;
                    }
                    if !self.in_external_scope(cx) {
                        cx.fatal(XmlErrorCode::PEReferenceWithinMarkup, &[&name])?;
                        continue;
                    }
                    self.append_pe_text(cx, next, &name, &mut value)?;
                }
                c => value.push(c),
            }
        }
    }

    fn append_pe_text(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
        name: &str,
        value: &mut String,
    ) -> Result<(), XniError> {
        self.saw_pe_references = true;
        let key = format!("%{name}");
        if cx.entities.is_entity_open(&key) {
            return cx.fatal(XmlErrorCode::RecursiveReference, &[&key, &key]);
        }
        match cx.entities.entity(&key).cloned() {
            None => {
                if self.validation {
                    cx.error(XmlErrorCode::EntityNotDeclared, &[&key])?;
                }
                Ok(())
            }
            Some(Entity::Internal { text, .. }) => {
                value.push_str(&text);
                Ok(())
            }
            Some(Entity::External { .. }) => {
                let depth = cx.entities.depth();
                if !cx.entities.start_entity(&key, &mut self.events)? {
                    return self.flush(cx, next);
                }
                if starts_xml_decl(cx)? {
                    scan_xml_decl(cx, true)?;
                }
                while cx.entities.depth() > depth {
                    match current(cx)?.next_char() {
                        Some(c) => value.push(c),
                        None => cx.entities.end_entity(&mut self.events)?,
                    }
                }
                self.flush(cx, next)
            }
        }
    }

    fn scan_notation_decl(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        self.require_decl_spaces(cx, next, "after \"<!NOTATION\"")?;
        let Some(name) = current(cx)?.scan_name() else {
            cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
            return self.skip_past_decl(cx);
        };
        self.require_decl_spaces(cx, next, "after the notation name")?;
        let (public_id, system_id) = scan_external_id(cx, true)?;
        if public_id.is_none() && system_id.is_none() {
            cx.fatal(XmlErrorCode::ExternalIdRequired, &[])?;
            return self.skip_past_decl(cx);
        }
        let identifier =
            XmlResourceIdentifier::new(public_id, system_id, cx.entities.base_system_id());
        self.end_decl(cx, next, XmlErrorCode::NotationDeclUnterminated, &name)?;
        self.emit(cx, next, DtdEvent::NotationDecl { name, identifier })
    }

    /// Scan a conditional section after its `<![`.
    fn scan_conditional(
        &mut self,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        if !self.in_external_scope(cx) {
            cx.fatal(XmlErrorCode::CondSectInInternalSubset, &[])?;
        }
        self.skip_decl_spaces(cx, next)?;
        let entity = current(cx)?;
        let kind = if entity.skip_string("INCLUDE") {
            ConditionalKind::Include
        } else if entity.skip_string("IGNORE") {
            ConditionalKind::Ignore
        } else {
            cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
            return self.skip_past_decl(cx);
        };
        self.skip_decl_spaces(cx, next)?;
        if !current(cx)?.skip_char('[') {
            cx.fatal(XmlErrorCode::MarkupNotRecognizedInDtd, &[])?;
            return self.skip_past_decl(cx);
        }
        self.emit(cx, next, DtdEvent::StartConditional(kind))?;
        if kind == ConditionalKind::Include {
            self.include_depth += 1;
            return Ok(());
        }

        let mut nesting = 1;
        let mut text = String::new();
        loop {
            let entity = current(cx)?;
            if entity.skip_string("<![") {
                nesting += 1;
                text.push_str("<![");
            } else if entity.skip_string("]]>") {
                nesting -= 1;
                if nesting == 0 {
                    break;
                }
                text.push_str("]]>");
            } else if let Some(c) = entity.next_char() {
                text.push(c);
            } else {
                return cx.fatal(XmlErrorCode::CondSectUnterminated, &[]);
            }
        }
        self.emit(cx, next, DtdEvent::IgnoredCharacters(text))?;
        self.emit(cx, next, DtdEvent::EndConditional)
    }
}

impl XmlEntityHandler for XmlDtdScanner {
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

impl XmlComponent for XmlDtdScanner {
    fn recognized_features(&self) -> &[&'static str] {
        Self::RECOGNIZED_FEATURES
    }

    fn recognized_properties(&self) -> &[&'static str] {
        Self::RECOGNIZED_PROPERTIES
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.events.queue.clear();
        self.base_depth = 0;
        self.include_depth = 0;
        self.in_external_subset = false;
        self.saw_pe_references = false;
        if self.configured && !manager.feature_or(PARSER_SETTINGS, true) {
            return Ok(());
        }
        self.validation = manager.feature_or(VALIDATION, false);
        self.configured = true;
        Ok(())
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        if feature_id == VALIDATION {
            self.validation = state;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        entity::XmlEntityManager, reporter::XmlErrorReporter, validation::ValidationManager,
        xni::XmlDtdHandler,
    };

    use super::*;

    #[derive(Default)]
    struct Declarations(Vec<String>);

    impl XmlDtdHandler for Declarations {
        fn element_decl(
            &mut self,
            name: &str,
            content_model: &str,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!("element {name} {content_model}"));
            Ok(())
        }

        fn attribute_decl(
            &mut self,
            decl: &XmlAttributeDecl,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!(
                "attribute {} {} {} {:?}",
                decl.element_name,
                decl.attribute_name,
                decl.att_type,
                decl.default.value()
            ));
            Ok(())
        }

        fn internal_entity_decl(
            &mut self,
            name: &str,
            text: &str,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!("entity {name} {text}"));
            Ok(())
        }

        fn start_conditional(
            &mut self,
            kind: ConditionalKind,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            self.0.push(format!("conditional {kind:?}"));
            Ok(())
        }
    }

    fn scan_subset(text: &str) -> Result<(Vec<String>, XmlEntityManager), XniError> {
        let mut entities = XmlEntityManager::new();
        let mut reporter = XmlErrorReporter::new();
        let mut validation = ValidationManager::new();
        let mut declarations = Declarations::default();
        let mut scanner = XmlDtdScanner::new(XmlVersion::Xml10);
        let mut cx = PipelineContext {
            entities: &mut entities,
            reporter: &mut reporter,
            validation: &mut validation,
        };
        let mut next = DtdNext {
            stages: &mut [],
            dtd_handler: Some(&mut declarations),
            content_model_handler: None,
        };
        scanner.scan_standalone_subset(&mut cx, &mut next, XmlInputSource::from_text(text))?;
        Ok((declarations.0, entities))
    }

    #[test]
    fn declarations_test() {
        let (decls, entities) = scan_subset(
            "<!ELEMENT doc (a, (b | c)*)>\n\
             <!ELEMENT a (#PCDATA | b)*>\n\
             <!ATTLIST a id ID #IMPLIED kind (x|y) 'x' n NMTOKENS '  p  q '>\n\
             <!ENTITY e 'v&#65;'>",
        )
        .unwrap();
        assert_eq!(
            decls,
            [
                "element doc (a,(b|c)*)",
                "element a (#PCDATA|b)*",
                "attribute a id ID None",
                "attribute a kind (x|y) Some(\"x\")",
                "attribute a n NMTOKENS Some(\"p q\")",
                "entity e vA",
            ]
        );
        assert!(entities.is_declared_entity("e"));
    }

    #[test]
    fn parameter_entity_test() {
        let (decls, entities) = scan_subset(
            "<!ENTITY % model '(#PCDATA)'>\n\
             <!ELEMENT doc %model;>\n\
             <!ENTITY % skip 'IGNORE'>\n\
             <![%skip;[<!ENTITY out 'x'> <![INCLUDE[ ]]>]]>\n\
             <![INCLUDE[<!ENTITY in 'y'>]]>",
        )
        .unwrap();
        assert_eq!(decls[0], "entity %model (#PCDATA)");
        assert_eq!(decls[1], "element doc (#PCDATA)");
        assert_eq!(decls[3], "conditional Ignore");
        assert_eq!(decls[4], "conditional Include");
        assert!(entities.is_declared_entity("%model"));
        assert!(entities.is_declared_entity("in"));
        assert!(!entities.is_declared_entity("out"));
    }

    #[test]
    fn malformed_declaration_test() {
        let err = scan_subset("<!ELEMENT doc (a|b,c)>").err().unwrap();
        assert!(matches!(err, XniError::Parse(e) if e.code == XmlErrorCode::ContentModelInvalid));
        let err = scan_subset("<!BOGUS>").err().unwrap();
        assert!(
            matches!(err, XniError::Parse(e) if e.code == XmlErrorCode::MarkupNotRecognizedInDtd)
        );
    }

    #[test]
    fn collapse_spaces_test() {
        assert_eq!(collapse_spaces("  a  b "), "a b");
        assert_eq!(collapse_spaces(""), "");
    }
}
