//! Provide the character class predicates that differ between XML 1.0 and XML 1.1.
//!
//! XML 1.0 names are checked with the Letter/Digit/CombiningChar/Extender productions of
//! the pre-fifth-edition grammar. XML 1.1 names use the simplified ranges of the 1.1
//! Recommendation, which also admits the C0 and C1 control characters as references.

use crate::constants::XmlVersion;

pub trait XmlCharValid {
    /// `Char` production.
    fn is_xml_char(&self, version: XmlVersion) -> bool;
    /// A character that must be written as a character reference (XML 1.1 only).
    fn is_restricted_char(&self, version: XmlVersion) -> bool;
    fn is_name_start_char(&self, version: XmlVersion) -> bool;
    fn is_name_char(&self, version: XmlVersion) -> bool;
    /// `S` production.
    fn is_xml_space(&self) -> bool;
}

impl XmlCharValid for char {
    fn is_xml_char(&self, version: XmlVersion) -> bool {
        let c = *self as u32;
        match version {
            XmlVersion::Xml10 => {
                matches!(c, 0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
            }
            XmlVersion::Xml11 => {
                matches!(c, 0x1..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
            }
        }
    }

    fn is_restricted_char(&self, version: XmlVersion) -> bool {
        version == XmlVersion::Xml11
            && matches!(*self as u32, 0x1..=0x8 | 0xB..=0xC | 0xE..=0x1F | 0x7F..=0x84 | 0x86..=0x9F)
    }

    fn is_name_start_char(&self, version: XmlVersion) -> bool {
        let c = *self;
        if c.is_ascii() {
            return c.is_ascii_alphabetic() || c == '_' || c == ':';
        }
        match version {
            XmlVersion::Xml10 => is_letter(c),
            XmlVersion::Xml11 => matches!(
                c as u32,
                0xC0..=0xD6
                    | 0xD8..=0xF6
                    | 0xF8..=0x2FF
                    | 0x370..=0x37D
                    | 0x37F..=0x1FFF
                    | 0x200C..=0x200D
                    | 0x2070..=0x218F
                    | 0x2C00..=0x2FEF
                    | 0x3001..=0xD7FF
                    | 0xF900..=0xFDCF
                    | 0xFDF0..=0xFFFD
                    | 0x10000..=0xEFFFF
            ),
        }
    }

    fn is_name_char(&self, version: XmlVersion) -> bool {
        let c = *self;
        if c.is_ascii() {
            return c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-' | '.');
        }
        match version {
            XmlVersion::Xml10 => is_letter(c) || c.is_numeric() || is_combining(c) || is_extender(c),
            XmlVersion::Xml11 => {
                c.is_name_start_char(version)
                    || matches!(c as u32, 0xB7 | 0x300..=0x36F | 0x203F..=0x2040)
            }
        }
    }

    fn is_xml_space(&self) -> bool {
        matches!(*self, ' ' | '\t' | '\r' | '\n')
    }
}

/// `Letter ::= BaseChar | Ideographic`
fn is_letter(c: char) -> bool {
    c.is_alphabetic() && !is_combining(c)
}

fn is_combining(c: char) -> bool {
    matches!(
        c as u32,
        0x300..=0x345
            | 0x360..=0x361
            | 0x483..=0x486
            | 0x591..=0x5C4
            | 0x64B..=0x652
            | 0x670
            | 0x6D6..=0x6ED
            | 0x901..=0x903
            | 0x93C..=0x94D
            | 0x951..=0x954
            | 0x962..=0x963
            | 0x981..=0x983
            | 0xE31
            | 0xE34..=0xE3A
            | 0xE47..=0xE4E
            | 0x20D0..=0x20DC
            | 0x20E1
            | 0x302A..=0x302F
            | 0x3099..=0x309A
    )
}

fn is_extender(c: char) -> bool {
    matches!(
        c as u32,
        0xB7 | 0x2D0
            | 0x2D1
            | 0x387
            | 0x640
            | 0xE46
            | 0xEC6
            | 0x3005
            | 0x3031..=0x3035
            | 0x309D..=0x309E
            | 0x30FC..=0x30FE
    )
}

impl XmlVersion {
    /// `Name ::= NameStartChar (NameChar)*`
    pub fn is_valid_name(&self, name: &str) -> bool {
        let mut chars = name.chars();
        chars.next().is_some_and(|c| c.is_name_start_char(*self))
            && chars.all(|c| c.is_name_char(*self))
    }

    /// `Nmtoken ::= (NameChar)+`
    pub fn is_valid_nmtoken(&self, token: &str) -> bool {
        !token.is_empty() && token.chars().all(|c| c.is_name_char(*self))
    }

    /// A `Name` without any colon.
    pub fn is_valid_ncname(&self, name: &str) -> bool {
        !name.contains(':') && self.is_valid_name(name)
    }

    /// A `QName`: one optional `NCName` prefix followed by an `NCName` local part.
    pub fn is_valid_qname(&self, name: &str) -> bool {
        match name.split_once(':') {
            Some((prefix, local)) => self.is_valid_ncname(prefix) && self.is_valid_ncname(local),
            None => self.is_valid_ncname(name),
        }
    }
}
