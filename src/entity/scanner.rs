//! Provide the character-level reader of one entity.
//!
//! A [`ScannedEntity`] decodes its byte stream in chunks and exposes the scanning
//! primitives the document and DTD scanners are built on. End-of-line handling is applied
//! while reading: `#xD #xA` and a lone `#xD` read as `#xA`, and in XML 1.1 external
//! entities `#x85` and `#x2028` do as well.
//!
//! Read and decode failures do not surface from the primitives. The entity stops at the
//! failure as if it had ended, and the failure is kept until [`ScannedEntity::take_error`].

use std::io::{self, Read};

use crate::{
    chars::XmlCharValid,
    constants::XmlVersion,
    encoding::{EncodingError, XmlDecoder},
    xni::{XmlLocation, XmlResourceIdentifier},
};

/// A failure of the underlying stream, kept until the scanner asks for it.
#[derive(Debug)]
pub enum EntityReadError {
    Io(io::Error),
    Encoding(EncodingError),
}

pub struct ScannedEntity {
    name: String,
    identifier: Option<XmlResourceIdentifier>,
    encoding: Option<String>,
    literal: bool,
    reader: Option<Box<dyn Read>>,
    decoder: Option<XmlDecoder>,
    /// Bytes read ahead while the encoding was detected.
    pending: Vec<u8>,
    buf: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    version: XmlVersion,
    chunk_size: usize,
    exhausted: bool,
    error: Option<EntityReadError>,
}

impl ScannedEntity {
    /// An entity whose replacement text is already in memory.
    pub fn from_text(name: impl Into<String>, text: &str, version: XmlVersion) -> Self {
        Self {
            name: name.into(),
            identifier: None,
            encoding: None,
            literal: true,
            reader: None,
            decoder: None,
            pending: vec![],
            buf: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            version,
            chunk_size: 0,
            exhausted: true,
            error: None,
        }
    }

    /// An external entity decoded from `reader`.
    ///
    /// `pending` holds the bytes already consumed from `reader` to detect the encoding.
    pub fn from_stream(
        name: impl Into<String>,
        identifier: XmlResourceIdentifier,
        encoding: Option<String>,
        decoder: XmlDecoder,
        reader: Box<dyn Read>,
        pending: Vec<u8>,
        chunk_size: usize,
        version: XmlVersion,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: Some(identifier),
            encoding,
            literal: false,
            reader: Some(reader),
            decoder: Some(decoder),
            pending,
            buf: vec![],
            pos: 0,
            line: 1,
            column: 1,
            version,
            chunk_size: chunk_size.max(64),
            exhausted: false,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> Option<&XmlResourceIdentifier> {
        self.identifier.as_ref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Whether the entity is an internal entity read from its replacement text.
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn is_external(&self) -> bool {
        !self.literal
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    pub fn set_version(&mut self, version: XmlVersion) {
        self.version = version;
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn location(&self) -> XmlLocation {
        XmlLocation {
            public_id: self.identifier.as_ref().and_then(|id| id.public_id.clone()),
            system_id: self
                .identifier
                .as_ref()
                .and_then(|id| id.expanded_system_id.clone()),
            line: self.line,
            column: self.column,
        }
    }

    /// Whether the entity still holds an open stream.
    pub fn has_stream(&self) -> bool {
        self.reader.is_some()
    }

    /// Drop the underlying stream. Characters already decoded stay readable.
    pub fn close(&mut self) {
        self.reader = None;
        self.exhausted = true;
    }

    pub fn take_error(&mut self) -> Option<EntityReadError> {
        self.error.take()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Make at least `need` characters available after the current position,
    /// unless the entity ends first.
    fn fill(&mut self, need: usize) -> bool {
        while self.buf.len() - self.pos < need {
            if self.exhausted {
                return false;
            }
            if self.pos > 0 && self.pos * 2 >= self.buf.len() {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            self.load();
        }
        true
    }

    fn load(&mut self) {
        let (Some(reader), Some(decoder)) = (self.reader.as_mut(), self.decoder.as_mut()) else {
            self.exhausted = true;
            return;
        };
        let mut bytes = std::mem::take(&mut self.pending);
        let mut last = false;
        if bytes.is_empty() {
            bytes.resize(self.chunk_size, 0);
            let read = loop {
                match reader.read(&mut bytes) {
                    Ok(read) => break read,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.error = Some(EntityReadError::Io(e));
                        self.exhausted = true;
                        return;
                    }
                }
            };
            bytes.truncate(read);
            last = read == 0;
        }
        let mut text = String::new();
        if let Err(e) = decoder.decode(&bytes, &mut text, last) {
            self.buf.extend(text.chars());
            self.error = Some(EntityReadError::Encoding(e));
            self.exhausted = true;
            return;
        }
        self.buf.extend(text.chars());
        if last {
            self.exhausted = true;
        }
    }

    fn raw(&mut self, offset: usize) -> Option<char> {
        self.fill(offset + 1).then(|| self.buf[self.pos + offset])
    }

    fn is_line_break(&self, c: char) -> bool {
        !self.literal && self.version == XmlVersion::Xml11 && matches!(c, '\u{85}' | '\u{2028}')
    }

    /// The next character, after end-of-line handling.
    pub fn peek_char(&mut self) -> Option<char> {
        let c = self.raw(0)?;
        if (c == '\r' && !self.literal) || self.is_line_break(c) {
            return Some('\n');
        }
        Some(c)
    }

    /// The character `offset` positions ahead without end-of-line handling.
    pub fn peek_raw(&mut self, offset: usize) -> Option<char> {
        self.raw(offset)
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.raw(0)?;
        self.pos += 1;
        if c == '\r' && !self.literal {
            let follows = self.raw(0);
            if follows == Some('\n')
                || (self.version == XmlVersion::Xml11 && follows == Some('\u{85}'))
            {
                self.pos += 1;
            }
            self.new_line();
            return Some('\n');
        }
        if c == '\n' || self.is_line_break(c) {
            self.new_line();
            return Some('\n');
        }
        self.column += 1;
        Some(c)
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    pub fn at_eof(&mut self) -> bool {
        self.raw(0).is_none()
    }

    pub fn skip_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.next_char();
            true
        } else {
            false
        }
    }

    /// Whether the input continues with `s`. `s` must not contain line breaks.
    pub fn starts_with(&mut self, s: &str) -> bool {
        let len = s.chars().count();
        self.fill(len) && self.buf[self.pos..self.pos + len].iter().copied().eq(s.chars())
    }

    pub fn skip_string(&mut self, s: &str) -> bool {
        if !self.starts_with(s) {
            return false;
        }
        let len = s.chars().count();
        self.pos += len;
        self.column += len;
        true
    }

    /// Skip white space, returning whether any was found.
    pub fn skip_spaces(&mut self) -> bool {
        let mut found = false;
        while self.peek_char().is_some_and(|c| c.is_xml_space()) {
            self.next_char();
            found = true;
        }
        found
    }

    pub fn scan_name(&mut self) -> Option<String> {
        let version = self.version;
        if !self.peek_char()?.is_name_start_char(version) {
            return None;
        }
        let mut name = String::new();
        while let Some(c) = self.peek_char().filter(|c| c.is_name_char(version)) {
            name.push(c);
            self.next_char();
        }
        Some(name)
    }

    pub fn scan_nmtoken(&mut self) -> Option<String> {
        let version = self.version;
        let mut token = String::new();
        while let Some(c) = self.peek_char().filter(|c| c.is_name_char(version)) {
            token.push(c);
            self.next_char();
        }
        (!token.is_empty()).then_some(token)
    }

    /// Read characters until `stop` matches one, the entity ends, or `limit`
    /// characters have been read. The stopping character is not consumed.
    pub fn scan_until(&mut self, limit: usize, stop: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        let mut count = 0;
        while count < limit {
            match self.peek_char() {
                Some(c) if !stop(c) => {
                    text.push(c);
                    self.next_char();
                    count += 1;
                }
                _ => break,
            }
        }
        text
    }

    /// Read characters up to `delimiter` and consume it.
    ///
    /// Returns `None` when the entity ends first. The characters read are lost then.
    pub fn scan_until_str(&mut self, delimiter: &str) -> Option<String> {
        let first = delimiter.chars().next()?;
        let mut text = String::new();
        loop {
            if self.peek_char()? == first && self.skip_string(delimiter) {
                return Some(text);
            }
            text.extend(self.next_char());
        }
    }

    /// Up to `max` characters ahead, without consuming them or applying end-of-line handling.
    pub fn lookahead(&mut self, max: usize) -> String {
        self.fill(max);
        let end = (self.pos + max).min(self.buf.len());
        self.buf[self.pos..end].iter().collect()
    }
}
