//! Provide the datatype validators for DTD attribute types.
//!
//! The two factories differ only in the name rules they apply: `ID`, `IDREF` and `ENTITY`
//! values must be `NCName`s, `NMTOKEN` values `Nmtoken`s, each under the character
//! classes of the factory's XML version.

use std::fmt::Display;

use crate::{constants::XmlVersion, dtd::AttType};

#[doc(alias = "DTDDVFactory")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtdDvFactory {
    Xml10,
    Xml11,
}

impl DtdDvFactory {
    pub fn for_version(version: XmlVersion) -> Self {
        match version {
            XmlVersion::Xml10 => Self::Xml10,
            XmlVersion::Xml11 => Self::Xml11,
        }
    }

    pub fn version(&self) -> XmlVersion {
        match self {
            Self::Xml10 => XmlVersion::Xml10,
            Self::Xml11 => XmlVersion::Xml11,
        }
    }

    /// Check the lexical form of a normalized attribute value.
    ///
    /// `ENTITY` values are only checked to be names here. Whether they name an unparsed
    /// entity is up to the caller, which owns the grammar.
    pub fn validate(&self, att_type: &AttType, value: &str) -> bool {
        let version = self.version();
        match att_type {
            AttType::CData => true,
            AttType::Id | AttType::IdRef | AttType::Entity => version.is_valid_ncname(value),
            AttType::IdRefs | AttType::Entities => {
                Self::tokens(value).all(|token| version.is_valid_ncname(token))
            }
            AttType::NmToken => version.is_valid_nmtoken(value),
            AttType::NmTokens => Self::tokens(value).all(|token| version.is_valid_nmtoken(token)),
            AttType::Notation(values) | AttType::Enumeration(values) => {
                values.iter().any(|v| v == value)
            }
        }
    }

    /// Split a list value. An empty list is never valid, so it yields one empty token.
    fn tokens(value: &str) -> impl Iterator<Item = &str> {
        let empty = value.is_empty().then_some("");
        empty.into_iter().chain(value.split(' ').filter(|t| !t.is_empty()))
    }
}

impl Display for DtdDvFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DTD datatype factory (XML {})", self.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_id_test() {
        let dv = DtdDvFactory::Xml10;
        assert!(dv.validate(&AttType::Id, "a1"));
        assert!(!dv.validate(&AttType::Id, "1a"));
        assert!(!dv.validate(&AttType::Id, "x:a"));
        assert!(dv.validate(&AttType::IdRefs, "a b c"));
        assert!(!dv.validate(&AttType::IdRefs, ""));
        assert!(dv.validate(&AttType::NmTokens, "1 2"));
    }

    #[test]
    fn validate_version_test() {
        let name = "\u{2070}x";
        assert!(!DtdDvFactory::Xml10.validate(&AttType::Id, name));
        assert!(DtdDvFactory::Xml11.validate(&AttType::Id, name));
        let values = AttType::Enumeration(vec!["yes".to_owned(), "no".to_owned()]);
        assert!(DtdDvFactory::Xml11.validate(&values, "no"));
        assert!(!DtdDvFactory::Xml11.validate(&values, "maybe"));
    }
}
