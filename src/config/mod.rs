//! Provide the parser configurations: the objects that own every component, hold the
//! feature/property store, assemble the pipeline and drive a parse.
//!
//! - [`Xml11Configuration`]: the validating configuration. It detects the version of
//!   each document and switches between an XML 1.0 and an XML 1.1 component set.
//! - [`NonValidatingConfiguration`]: a single-version configuration without DTD
//!   processing or validation.
//! - [`SharedConfiguration`]: a reference-counted handle so handlers can reach the
//!   configuration that is calling them.

mod nonvalidating;
mod shared;
mod xml11;

pub use nonvalidating::*;
pub use shared::*;
pub use xml11::*;

use std::rc::Rc;

use crate::{
    component::XmlProperty,
    constants::{
        ENTITY_RESOLVER, ERROR_HANDLER, EXTERNAL_GENERAL_ENTITIES, EXTERNAL_PARAMETER_ENTITIES,
        NAMESPACES, SYMBOL_TABLE, VALIDATION,
    },
    error::{XmlConfigurationError, XniError},
    pipeline::{DocumentHandlerRef, DtdContentModelHandlerRef, DtdHandlerRef, ErrorHandlerRef},
    registry::ComponentRegistry,
    settings::ConfigurationRules,
    xni::{XmlEntityResolver, XmlInputSource},
};

/// Features every configuration recognizes, with their defaults.
pub(crate) const BASIC_FEATURES: &[(&str, bool)] = &[
    (VALIDATION, false),
    (NAMESPACES, true),
    (EXTERNAL_GENERAL_ENTITIES, true),
    (EXTERNAL_PARAMETER_ENTITIES, true),
];
pub(crate) const BASIC_PROPERTIES: &[&str] = &[SYMBOL_TABLE, ERROR_HANDLER, ENTITY_RESOLVER];

/// Recognize `features` and store their defaults without touching the dirty flag.
pub(crate) fn install_features<R: ConfigurationRules>(
    registry: &mut ComponentRegistry<R>,
    features: &[(&str, bool)],
) {
    for &(feature_id, state) in features {
        registry.add_recognized_features(&[feature_id]);
        registry.store_feature(feature_id, state);
    }
}

/// A configuration that parses a whole document in one call.
#[doc(alias = "XMLParserConfiguration")]
pub trait XmlParserConfiguration {
    /// Parse `source` to the end. Streams opened for it are closed before returning,
    /// whatever the outcome.
    fn parse(&mut self, source: XmlInputSource) -> Result<(), XniError>;

    fn add_recognized_features(&mut self, feature_ids: &[&str]);
    fn add_recognized_properties(&mut self, property_ids: &[&str]);

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError>;
    fn get_feature(&self, feature_id: &str) -> Result<bool, XmlConfigurationError>;
    fn set_property(
        &mut self,
        property_id: &str,
        value: XmlProperty,
    ) -> Result<(), XmlConfigurationError>;
    fn get_property(&self, property_id: &str) -> Result<Option<XmlProperty>, XmlConfigurationError>;

    fn set_document_handler(&mut self, handler: Option<DocumentHandlerRef>);
    fn document_handler(&self) -> Option<DocumentHandlerRef>;
    fn set_dtd_handler(&mut self, handler: Option<DtdHandlerRef>);
    fn dtd_handler(&self) -> Option<DtdHandlerRef>;
    fn set_dtd_content_model_handler(&mut self, handler: Option<DtdContentModelHandlerRef>);
    fn dtd_content_model_handler(&self) -> Option<DtdContentModelHandlerRef>;

    fn set_error_handler(&mut self, handler: ErrorHandlerRef) -> Result<(), XmlConfigurationError> {
        self.set_property(ERROR_HANDLER, XmlProperty::ErrorHandler(handler))
    }

    fn error_handler(&self) -> Option<ErrorHandlerRef> {
        match self.get_property(ERROR_HANDLER) {
            Ok(Some(XmlProperty::ErrorHandler(handler))) => Some(handler),
            _ => None,
        }
    }

    fn set_entity_resolver(
        &mut self,
        resolver: Rc<dyn XmlEntityResolver>,
    ) -> Result<(), XmlConfigurationError> {
        self.set_property(ENTITY_RESOLVER, XmlProperty::EntityResolver(resolver))
    }

    fn entity_resolver(&self) -> Option<Rc<dyn XmlEntityResolver>> {
        match self.get_property(ENTITY_RESOLVER) {
            Ok(Some(XmlProperty::EntityResolver(resolver))) => Some(resolver),
            _ => None,
        }
    }

    /// Set the locale diagnostics are formatted for.
    fn set_locale(&mut self, locale: Option<String>);
    fn locale(&self) -> Option<&str>;
}

/// A configuration that can also be driven one step at a time.
#[doc(alias = "XMLPullParserConfiguration")]
pub trait XmlPullParserConfiguration: XmlParserConfiguration {
    /// Remember `source` for the next [`parse_step`](Self::parse_step). Nothing is read
    /// and no component is reset yet.
    fn set_input_source(&mut self, source: XmlInputSource);

    /// Parse the pending source, if any, then scan one step, or the rest of the document
    /// when `complete` is set.
    ///
    /// Returns whether more of the document remains.
    fn parse_step(&mut self, complete: bool) -> Result<bool, XniError>;

    /// Close every stream opened by the configuration. Calling it twice is harmless.
    fn cleanup(&mut self);
}
