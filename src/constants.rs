//! Provide the frozen feature and property identifiers recognized by the pipeline,
//! and the XML version codes shared by every component.
//!
//! Identifiers are URI-shaped strings. Renaming or removing one is a breaking change
//! for every caller, so they are defined here once and referenced everywhere else.

use std::fmt::Display;

use const_format::concatcp;

pub const SAX_FEATURE_PREFIX: &str = "http://xml.org/sax/features/";
pub const SAX_PROPERTY_PREFIX: &str = "http://xml.org/sax/properties/";
pub const XERCES_FEATURE_PREFIX: &str = "http://apache.org/xml/features/";
pub const XERCES_PROPERTY_PREFIX: &str = "http://apache.org/xml/properties/";
pub const JAXP_PROPERTY_PREFIX: &str = "http://java.sun.com/xml/jaxp/properties/";

// SAX features

pub const NAMESPACES: &str = concatcp!(SAX_FEATURE_PREFIX, "namespaces");
pub const VALIDATION: &str = concatcp!(SAX_FEATURE_PREFIX, "validation");
pub const EXTERNAL_GENERAL_ENTITIES: &str =
    concatcp!(SAX_FEATURE_PREFIX, "external-general-entities");
pub const EXTERNAL_PARAMETER_ENTITIES: &str =
    concatcp!(SAX_FEATURE_PREFIX, "external-parameter-entities");

// Vendor features

pub const CONTINUE_AFTER_FATAL_ERROR: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "continue-after-fatal-error");
pub const LOAD_EXTERNAL_DTD: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "nonvalidating/load-external-dtd");
pub const LOAD_DTD_GRAMMAR: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "nonvalidating/load-dtd-grammar");
pub const DYNAMIC_VALIDATION: &str = concatcp!(XERCES_FEATURE_PREFIX, "validation/dynamic");
pub const DEFAULT_ATTRIBUTE_VALUES: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/default-attribute-values");
pub const VALIDATE_CONTENT_MODELS: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/validate-content-models");
pub const VALIDATE_DATATYPES: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/validate-datatypes");
pub const SCHEMA_VALIDATION: &str = concatcp!(XERCES_FEATURE_PREFIX, "validation/schema");
pub const SCHEMA_FULL_CHECKING: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/schema-full-checking");
pub const NORMALIZE_DATA: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/schema/normalized-value");
pub const SCHEMA_ELEMENT_DEFAULT: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/schema/element-default");
/// Pseudo-feature answering whether the configuration changed since the last parse began.
pub const PARSER_SETTINGS: &str = concatcp!(XERCES_FEATURE_PREFIX, "internal/parser-settings");
pub const WARN_ON_DUPLICATE_ATTDEF: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/warn-on-duplicate-attdef");
pub const WARN_ON_UNDECLARED_ELEMDEF: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/warn-on-undeclared-elemdef");
pub const WARN_ON_DUPLICATE_ENTITYDEF: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "warn-on-duplicate-entitydef");
pub const ALLOW_JAVA_ENCODINGS: &str = concatcp!(XERCES_FEATURE_PREFIX, "allow-java-encodings");
pub const NOTIFY_BUILTIN_REFS: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "scanner/notify-builtin-refs");
pub const NOTIFY_CHAR_REFS: &str = concatcp!(XERCES_FEATURE_PREFIX, "scanner/notify-char-refs");
pub const DISALLOW_DOCTYPE_DECL: &str = concatcp!(XERCES_FEATURE_PREFIX, "disallow-doctype-decl");
pub const GENERATE_SYNTHETIC_ANNOTATIONS: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "generate-synthetic-annotations");
pub const VALIDATE_ANNOTATIONS: &str = concatcp!(XERCES_FEATURE_PREFIX, "validate-annotations");
pub const HONOUR_ALL_SCHEMALOCATIONS: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "honour-all-schemaLocations");
pub const NAMESPACE_GROWTH: &str = concatcp!(XERCES_FEATURE_PREFIX, "namespace-growth");
pub const TOLERATE_DUPLICATES: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "internal/tolerate-duplicates");
pub const IGNORE_XSI_TYPE: &str = concatcp!(
    XERCES_FEATURE_PREFIX,
    "validation/schema/ignore-xsi-type-until-elemdecl"
);
pub const ID_IDREF_CHECKING: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/id-idref-checking");
pub const IDENTITY_CONSTRAINT_CHECKING: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/identity-constraint-checking");
pub const UNPARSED_ENTITY_CHECKING: &str =
    concatcp!(XERCES_FEATURE_PREFIX, "validation/unparsed-entity-checking");
pub const USE_GRAMMAR_POOL_ONLY: &str = concatcp!(
    XERCES_FEATURE_PREFIX,
    "internal/validation/schema/use-grammar-pool-only"
);

// Vendor properties

pub const SYMBOL_TABLE: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/symbol-table");
pub const ERROR_HANDLER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/error-handler");
pub const ENTITY_RESOLVER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/entity-resolver");
pub const ERROR_REPORTER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/error-reporter");
pub const ENTITY_MANAGER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/entity-manager");
pub const DOCUMENT_SCANNER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/document-scanner");
pub const DTD_SCANNER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/dtd-scanner");
pub const DTD_PROCESSOR: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/dtd-processor");
pub const DTD_VALIDATOR: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/validator/dtd");
pub const NAMESPACE_BINDER: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/namespace-binder");
pub const DATATYPE_VALIDATOR_FACTORY: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "internal/datatype-validator-factory");
pub const VALIDATION_MANAGER: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "internal/validation-manager");
pub const SCHEMA_VALIDATOR: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/validator/schema");
pub const XMLGRAMMAR_POOL: &str = concatcp!(XERCES_PROPERTY_PREFIX, "internal/grammar-pool");
pub const SCHEMA_LOCATION: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "schema/external-schemaLocation");
pub const SCHEMA_NONS_LOCATION: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "schema/external-noNamespaceSchemaLocation");
pub const LOCALE: &str = concatcp!(XERCES_PROPERTY_PREFIX, "locale");
pub const ROOT_TYPE_DEF: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "validation/schema/root-type-definition");
pub const ROOT_ELEMENT_DECL: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "validation/schema/root-element-declaration");
pub const SCHEMA_DV_FACTORY: &str =
    concatcp!(XERCES_PROPERTY_PREFIX, "internal/validation/schema/dv-factory");
pub const BUFFER_SIZE: &str = concatcp!(XERCES_PROPERTY_PREFIX, "input-buffer-size");

// Standard properties

pub const XML_STRING: &str = concatcp!(SAX_PROPERTY_PREFIX, "xml-string");
pub const JAXP_SCHEMA_LANGUAGE: &str = concatcp!(JAXP_PROPERTY_PREFIX, "schemaLanguage");
pub const JAXP_SCHEMA_SOURCE: &str = concatcp!(JAXP_PROPERTY_PREFIX, "schemaSource");

pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE_URI: &str = "http://www.w3.org/2000/xmlns/";

/// Default size of the byte chunks read from an entity's stream.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Reserved entity names used by entity start/end notifications.
pub const DOCUMENT_ENTITY_NAME: &str = "[xml]";
pub const DTD_ENTITY_NAME: &str = "[dtd]";

/// The XML grammar version a document is processed with.
#[doc(alias = "XML_VERSION_1_0")]
#[doc(alias = "XML_VERSION_1_1")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XmlVersion {
    #[default]
    Xml10 = 1,
    Xml11 = 2,
}

impl XmlVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xml10 => "1.0",
            Self::Xml11 => "1.1",
        }
    }

    /// Map a declared `VersionNum` to the grammar used to process it.
    ///
    /// Any `1.x` other than `1.1` is processed as 1.0, like an XML 1.0 processor
    /// is required to do. Anything else is not a version this pipeline can handle.
    pub fn from_declared(version: &str) -> Option<Self> {
        match version {
            "1.1" => Some(Self::Xml11),
            "1.0" => Some(Self::Xml10),
            v if v.starts_with("1.") && v.len() > 2 && v[2..].bytes().all(|b| b.is_ascii_digit()) => {
                Some(Self::Xml10)
            }
            _ => None,
        }
    }
}

impl Display for XmlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for XmlVersion {
    type Error = anyhow::Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Xml10),
            2 => Ok(Self::Xml11),
            _ => Err(anyhow::anyhow!(
                "Invalid convert from value '{value}' to {}",
                std::any::type_name::<Self>()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_strings_test() {
        assert_eq!(NAMESPACES, "http://xml.org/sax/features/namespaces");
        assert_eq!(
            PARSER_SETTINGS,
            "http://apache.org/xml/features/internal/parser-settings"
        );
        assert_eq!(
            DTD_SCANNER,
            "http://apache.org/xml/properties/internal/dtd-scanner"
        );
        assert_eq!(
            JAXP_SCHEMA_SOURCE,
            "http://java.sun.com/xml/jaxp/properties/schemaSource"
        );
        assert_eq!(XML_STRING, "http://xml.org/sax/properties/xml-string");
    }

    #[test]
    fn version_code_test() {
        assert_eq!(XmlVersion::try_from(1).unwrap(), XmlVersion::Xml10);
        assert_eq!(XmlVersion::try_from(2).unwrap(), XmlVersion::Xml11);
        assert!(XmlVersion::try_from(3).is_err());
        assert_eq!(XmlVersion::from_declared("1.1"), Some(XmlVersion::Xml11));
        assert_eq!(XmlVersion::from_declared("1.7"), Some(XmlVersion::Xml10));
        assert_eq!(XmlVersion::from_declared("2.0"), None);
        assert_eq!(XmlVersion::from_declared("1."), None);
    }
}
