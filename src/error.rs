//! Provide the error types shared by the configuration layer and the pipeline components.
//!
//! There are three families:
//! - [`XmlConfigurationError`]: an identifier nobody recognizes, or one this build cannot honor.
//! - [`XmlParseError`]: a diagnostic produced while scanning, delivered through the error reporter.
//! - [`XniError`]: everything a parse entry point can return to its caller.

use std::{borrow::Cow, fmt::Display, io};

use crate::{encoding::EncodingError, xni::XmlLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigErrorKind {
    /// No component and no configuration claims the identifier.
    NotRecognized,
    /// The identifier is known, but the requested value or state cannot be honored.
    NotSupported,
}

/// A configuration contract violation, naming the offending identifier.
#[doc(alias = "XMLConfigurationException")]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlConfigurationError {
    kind: ConfigErrorKind,
    identifier: String,
}

impl XmlConfigurationError {
    pub fn not_recognized(identifier: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::NotRecognized,
            identifier: identifier.into(),
        }
    }

    pub fn not_supported(identifier: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::NotSupported,
            identifier: identifier.into(),
        }
    }

    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_not_recognized(&self) -> bool {
        self.kind == ConfigErrorKind::NotRecognized
    }

    pub fn is_not_supported(&self) -> bool {
        self.kind == ConfigErrorKind::NotSupported
    }
}

impl Display for XmlConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ConfigErrorKind::NotRecognized => write!(f, "'{}' is not recognized.", self.identifier),
            ConfigErrorKind::NotSupported => write!(f, "'{}' is not supported.", self.identifier),
        }
    }
}

impl std::error::Error for XmlConfigurationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum XmlErrorLevel {
    Warning = 0,
    Error = 1,
    Fatal = 2,
}

impl Display for XmlErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error | Self::Fatal => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlErrorDomain {
    /// Well-formedness of the document and its DTD.
    Parser,
    /// Namespaces in XML.
    Namespace,
    /// DTD validity constraints.
    Validity,
}

impl Display for XmlErrorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parser => write!(f, "parser"),
            Self::Namespace => write!(f, "namespace"),
            Self::Validity => write!(f, "validity"),
        }
    }
}

macro_rules! impl_xml_error_codes {
    ( $( $variant:ident => ($domain:ident, $message:literal) ),* $(,)? ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum XmlErrorCode {
            $( $variant ),*
        }

        impl XmlErrorCode {
            pub fn domain(&self) -> XmlErrorDomain {
                match self {
                    $( Self::$variant => XmlErrorDomain::$domain ),*
                }
            }

            /// The message template. `{0}`, `{1}`, ... are replaced by the report arguments.
            pub fn message_template(&self) -> &'static str {
                match self {
                    $( Self::$variant => $message ),*
                }
            }

            pub fn key(&self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant) ),*
                }
            }
        }

        impl TryFrom<&str> for XmlErrorCode {
            type Error = anyhow::Error;

            fn try_from(key: &str) -> Result<Self, Self::Error> {
                $(
                    if key == stringify!($variant) {
                        return Ok(Self::$variant);
                    }
                )*
                Err(anyhow::anyhow!("Invalid convert from key '{key}' to {}", std::any::type_name::<Self>()))
            }
        }
    };
}

impl_xml_error_codes!(
    // XML declaration and encoding
    VersionNotSupported => (Parser, "XML version \"{0}\" is not supported, only XML 1.0 and XML 1.1 are supported."),
    VersionInfoRequired => (Parser, "The version is required in the XML declaration."),
    XmlDeclUnterminated => (Parser, "The XML declaration must end with \"?>\"."),
    EncodingDeclRequired => (Parser, "The encoding declaration is required in the text declaration."),
    EncodingDeclInvalid => (Parser, "Invalid encoding name \"{0}\"."),
    EncodingNotSupported => (Parser, "The encoding \"{0}\" is not supported."),
    MalformedByteSequence => (Parser, "Malformed byte sequence in the input: {0}"),
    SdDeclInvalid => (Parser, "The standalone document declaration value must be \"yes\" or \"no\", not \"{0}\"."),
    SpaceRequired => (Parser, "White space is required {0}."),
    IoError => (Parser, "I/O error while reading \"{0}\": {1}"),
    // Document structure
    PrematureEof => (Parser, "Premature end of file."),
    RootElementRequired => (Parser, "The markup in the document preceding the root element must be well-formed."),
    MarkupNotRecognizedInProlog => (Parser, "The markup in the document preceding the root element must be well-formed."),
    MarkupNotRecognizedInMisc => (Parser, "The markup in the document following the root element must be well-formed."),
    MarkupNotRecognizedInContent => (Parser, "The content of elements must consist of well-formed character data or markup."),
    ContentIllegalInProlog => (Parser, "Content is not allowed in prolog."),
    ContentIllegalInTrailingMisc => (Parser, "Content is not allowed in trailing section."),
    ElementUnterminated => (Parser, "Element type \"{0}\" must be followed by either attribute specifications, \">\" or \"/>\"."),
    ETagRequired => (Parser, "The element type \"{0}\" must be terminated by the matching end-tag \"</{0}>\"."),
    ETagUnterminated => (Parser, "The end-tag for element type \"{0}\" must end with a '>' delimiter."),
    ElementEntityMismatch => (Parser, "The element \"{0}\" must start and end within the same entity."),
    AttributeNotUnique => (Parser, "Attribute \"{1}\" was already specified for element \"{0}\"."),
    EqRequiredInAttribute => (Parser, "Attribute name \"{1}\" associated with an element type \"{0}\" must be followed by the ' = ' character."),
    OpenQuoteExpected => (Parser, "Open quote is expected for attribute \"{1}\" associated with an element type \"{0}\"."),
    CloseQuoteExpected => (Parser, "Close quote is expected for attribute \"{1}\" associated with an element type \"{0}\"."),
    LessthanInAttValue => (Parser, "The value of attribute \"{1}\" associated with an element type \"{0}\" must not contain the '<' character."),
    InvalidChar => (Parser, "An invalid XML character (Unicode: 0x{0}) was found in {1}."),
    InvalidCharRef => (Parser, "Character reference \"&#{0}\" is an invalid XML character."),
    CDEndInContent => (Parser, "The character sequence \"]]>\" must not appear in content unless used to mark the end of a CDATA section."),
    CommentUnterminated => (Parser, "The comment must end with \"-->\"."),
    DashDashInComment => (Parser, "The string \"--\" is not permitted within comments."),
    PIUnterminated => (Parser, "The processing instruction must end with \"?>\"."),
    PITargetRequired => (Parser, "The processing instruction must begin with the name of the target."),
    ReservedPITarget => (Parser, "The processing instruction target matching \"[xX][mM][lL]\" is not allowed."),
    CDSectUnterminated => (Parser, "The CDATA section must end with \"]]>\"."),
    // References
    NameRequiredInReference => (Parser, "The entity name must immediately follow the '&' in the entity reference."),
    SemicolonRequiredInReference => (Parser, "The reference to entity \"{0}\" must end with the ';' delimiter."),
    EntityNotDeclared => (Parser, "The entity \"{0}\" was referenced, but not declared."),
    ReferenceToUnparsedEntity => (Parser, "The unparsed entity reference \"&{0};\" is not permitted."),
    ReferenceToExternalEntity => (Parser, "The external entity reference \"&{0};\" is not permitted in an attribute value."),
    RecursiveReference => (Parser, "Recursive entity reference \"{0}\". (Reference path: {1})"),
    // Document type declaration
    AlreadySeenDoctype => (Parser, "Already seen doctype."),
    DoctypeNotAllowed => (Parser, "DOCTYPE is disallowed when the feature \"{0}\" set to true."),
    RootElementTypeRequired => (Parser, "The document type declaration must begin with the root element type."),
    DoctypedeclUnterminated => (Parser, "The document type declaration for root element type \"{0}\" must end with '>'."),
    MarkupNotRecognizedInDtd => (Parser, "The markup declarations contained or pointed to by the document type declaration must be well-formed."),
    PEReferenceWithinMarkup => (Parser, "The parameter entity reference \"%{0};\" cannot occur within markup in the internal subset of the DTD."),
    ElementDeclUnterminated => (Parser, "The declaration for element type \"{0}\" must end with '>'."),
    ContentModelInvalid => (Parser, "The content model of element type \"{0}\" is malformed."),
    AttlistDeclUnterminated => (Parser, "The attribute-list declaration for element type \"{0}\" must end with '>'."),
    AttTypeRequired => (Parser, "The attribute type is required in the declaration of attribute \"{1}\" for element type \"{0}\"."),
    AttDefaultRequired => (Parser, "The attribute default is required in the declaration of attribute \"{1}\" for element type \"{0}\"."),
    EntityDeclUnterminated => (Parser, "The declaration for the entity \"{0}\" must end with '>'."),
    NotationDeclUnterminated => (Parser, "The declaration for the notation \"{0}\" must end with '>'."),
    ExternalIdRequired => (Parser, "The external ID is required."),
    QuoteRequired => (Parser, "A quoted string is required {0}."),
    LiteralUnterminated => (Parser, "The literal must end with its opening quote character."),
    CondSectUnterminated => (Parser, "The conditional section must end with \"]]>\"."),
    CondSectInInternalSubset => (Parser, "Conditional sections are not allowed in the internal subset."),
    InvalidName => (Parser, "\"{0}\" is not a legal name."),
    InvalidNmtoken => (Parser, "\"{0}\" is not a legal name token."),
    // Namespaces
    ElementPrefixUnbound => (Namespace, "The prefix \"{1}\" for element \"{0}\" is not bound."),
    AttributePrefixUnbound => (Namespace, "The prefix \"{2}\" for attribute \"{1}\" associated with an element type \"{0}\" is not bound."),
    CantBindXmlns => (Namespace, "The prefix \"xmlns\" cannot be bound to any namespace explicitly; neither can the namespace for \"xmlns\" be bound to any prefix explicitly."),
    CantBindXml => (Namespace, "The prefix \"xml\" cannot be bound to any namespace other than its usual namespace; neither can the namespace for \"xml\" be bound to any prefix other than \"xml\"."),
    EmptyPrefixedAttName => (Namespace, "The value of the attribute \"{0}\" is invalid. Prefixed namespace bindings may not be empty."),
    AttributeNSNotUnique => (Namespace, "Attribute \"{1}\" bound to namespace \"{2}\" was already specified for element \"{0}\"."),
    InvalidQName => (Namespace, "\"{0}\" is not a legal qualified name."),
    // Validity
    GrammarNotFound => (Validity, "Document is invalid: no grammar found."),
    RootElementTypeMismatch => (Validity, "Document root element \"{1}\", must match DOCTYPE root \"{0}\"."),
    ElementNotDeclared => (Validity, "Element type \"{0}\" must be declared."),
    ElementAlreadyDeclared => (Validity, "Element type \"{0}\" must not be declared more than once."),
    ContentInvalid => (Validity, "The content of element type \"{0}\" must match \"{1}\"."),
    ContentIncomplete => (Validity, "The content of element type \"{0}\" is incomplete, it must match \"{1}\"."),
    DuplicateTypeInMixedContent => (Validity, "The element type \"{1}\" was already specified in the content model of the element decl \"{0}\"."),
    RequiredAttributeNotSpecified => (Validity, "Attribute \"{1}\" is required and must be specified for element type \"{0}\"."),
    AttributeNotDeclared => (Validity, "Attribute \"{1}\" must be declared for element type \"{0}\"."),
    FixedAttValueInvalid => (Validity, "Attribute \"{1}\" with value \"{2}\" must have a value of \"{3}\"."),
    AttributeValueNotInList => (Validity, "Attribute \"{0}\" with value \"{1}\" must have a value from the list \"{2}\"."),
    AttributeValueInvalid => (Validity, "Attribute \"{1}\" with value \"{2}\" is not a valid {0}."),
    IdNotUnique => (Validity, "Attribute value \"{0}\" of type ID must be unique within the document."),
    ElementWithIdRequired => (Validity, "An element with the identifier \"{0}\" must appear in the document."),
    MoreThanOneIdAttribute => (Validity, "Element type \"{0}\" already has attribute \"{1}\" of type ID, a second attribute \"{2}\" of type ID is not permitted."),
    EntityNotUnparsed => (Validity, "Attribute value \"{0}\" of type ENTITY must be the name of an unparsed entity."),
    NotationNotDeclared => (Validity, "The notation \"{1}\" must be declared when referenced in the declaration of \"{0}\"."),
    DuplicateAttdef => (Validity, "Attribute \"{1}\" is already declared for element type \"{0}\"."),
    DuplicateEntityDef => (Validity, "Entity \"{0}\" is declared more than once."),
    UndeclaredElementInContentSpec => (Validity, "The content model of element \"{0}\" refers to the undeclared element \"{1}\"."),
    StandaloneWhitespace => (Validity, "White space must not occur in element \"{0}\" of a standalone document with element-only content declared externally."),
);

impl XmlErrorCode {
    /// Render the message template with `args`.
    pub fn format(&self, args: &[&str]) -> String {
        let mut message = self.message_template().to_owned();
        for (i, arg) in args.iter().enumerate() {
            message = message.replace(&format!("{{{i}}}"), arg);
        }
        message
    }
}

/// A diagnostic produced while scanning or validating a document.
#[doc(alias = "XMLParseException")]
#[derive(Debug, Clone, PartialEq)]
pub struct XmlParseError {
    pub code: XmlErrorCode,
    pub level: XmlErrorLevel,
    pub message: String,
    pub location: XmlLocation,
}

impl XmlParseError {
    pub fn domain(&self) -> XmlErrorDomain {
        self.code.domain()
    }
}

impl Display for XmlParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {} : {}",
            self.location,
            self.code.domain(),
            self.level,
            self.message
        )
    }
}

impl std::error::Error for XmlParseError {}

/// The error returned by the parse entry points and by component callbacks.
#[doc(alias = "XNIException")]
#[derive(Debug)]
pub enum XniError {
    Configuration(XmlConfigurationError),
    /// `parse` was invoked while a parse on the same configuration was running.
    ParseInProgress,
    /// A fatal error, or an error a handler chose to escalate.
    Parse(XmlParseError),
    Encoding(EncodingError),
    Io(io::Error),
    /// The component graph is not in a state the operation can run on.
    Pipeline(Cow<'static, str>),
    /// An error raised by an application handler.
    Handler(Box<dyn std::error::Error>),
}

impl XniError {
    pub fn is_parse_in_progress(&self) -> bool {
        matches!(self, Self::ParseInProgress)
    }
}

impl Display for XniError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "{e}"),
            Self::ParseInProgress => write!(f, "FWK005 parse may not be called while parsing."),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Encoding(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Pipeline(msg) => write!(f, "Pipeline Error: {msg}"),
            Self::Handler(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for XniError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Encoding(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Handler(e) => Some(e.as_ref()),
            Self::ParseInProgress | Self::Pipeline(_) => None,
        }
    }
}

impl From<XmlConfigurationError> for XniError {
    fn from(value: XmlConfigurationError) -> Self {
        Self::Configuration(value)
    }
}

impl From<XmlParseError> for XniError {
    fn from(value: XmlParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<EncodingError> for XniError {
    fn from(value: EncodingError) -> Self {
        Self::Encoding(value)
    }
}

impl From<io::Error> for XniError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
