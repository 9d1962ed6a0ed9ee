//! Provide the feature/property store of a configuration.
//!
//! The store holds the recognized identifiers and the current values. Which recognized
//! identifiers a configuration can actually honor is decided by its
//! [`ConfigurationRules`], consulted before a value is stored.

use std::collections::{HashMap, HashSet};

use crate::{component::XmlProperty, error::XmlConfigurationError};

#[derive(Debug, Default)]
pub struct ParserConfigurationSettings {
    recognized_features: HashSet<String>,
    recognized_properties: HashSet<String>,
    features: HashMap<String, bool>,
    properties: HashMap<String, XmlProperty>,
}

impl ParserConfigurationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the recognized features. No value is assigned.
    pub fn add_recognized_features(&mut self, feature_ids: &[&str]) {
        for &id in feature_ids {
            if !self.recognized_features.contains(id) {
                self.recognized_features.insert(id.to_owned());
            }
        }
    }

    pub fn add_recognized_properties(&mut self, property_ids: &[&str]) {
        for &id in property_ids {
            if !self.recognized_properties.contains(id) {
                self.recognized_properties.insert(id.to_owned());
            }
        }
    }

    pub fn is_feature_recognized(&self, feature_id: &str) -> bool {
        self.recognized_features.contains(feature_id)
    }

    pub fn is_property_recognized(&self, property_id: &str) -> bool {
        self.recognized_properties.contains(property_id)
    }

    pub fn check_feature(&self, feature_id: &str) -> Result<(), XmlConfigurationError> {
        if !self.is_feature_recognized(feature_id) {
            return Err(XmlConfigurationError::not_recognized(feature_id));
        }
        Ok(())
    }

    pub fn check_property(&self, property_id: &str) -> Result<(), XmlConfigurationError> {
        if !self.is_property_recognized(property_id) {
            return Err(XmlConfigurationError::not_recognized(property_id));
        }
        Ok(())
    }

    /// The stored state of `feature_id`, if any.
    pub fn feature(&self, feature_id: &str) -> Option<bool> {
        self.features.get(feature_id).copied()
    }

    pub fn property(&self, property_id: &str) -> Option<&XmlProperty> {
        self.properties.get(property_id)
    }

    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.features.contains_key(feature_id)
    }

    pub fn has_property(&self, property_id: &str) -> bool {
        self.properties.contains_key(property_id)
    }

    /// Store a value without any recognition check.
    pub fn store_feature(&mut self, feature_id: &str, state: bool) {
        self.features.insert(feature_id.to_owned(), state);
    }

    pub fn store_property(&mut self, property_id: &str, value: XmlProperty) {
        self.properties.insert(property_id.to_owned(), value);
    }

    /// Install a default, unless a value is already stored.
    ///
    /// Returns `true` when the default was installed.
    pub fn install_feature_default(&mut self, feature_id: &str, state: bool) -> bool {
        if self.features.contains_key(feature_id) {
            return false;
        }
        self.features.insert(feature_id.to_owned(), state);
        true
    }

    pub fn install_property_default(&mut self, property_id: &str, value: XmlProperty) -> bool {
        if self.properties.contains_key(property_id) {
            return false;
        }
        self.properties.insert(property_id.to_owned(), value);
        true
    }
}

/// Decide whether a configuration accepts an identifier.
///
/// Both checks default to plain recognition: anything in the recognized sets is
/// accepted, anything else is not recognized.
pub trait ConfigurationRules {
    fn check_feature(
        &self,
        settings: &ParserConfigurationSettings,
        feature_id: &str,
    ) -> Result<(), XmlConfigurationError> {
        settings.check_feature(feature_id)
    }

    fn check_property(
        &self,
        settings: &ParserConfigurationSettings,
        property_id: &str,
    ) -> Result<(), XmlConfigurationError> {
        settings.check_property(property_id)
    }
}

/// Accept exactly the recognized identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRules;

impl ConfigurationRules for BasicRules {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognition_test() {
        let mut settings = ParserConfigurationSettings::new();
        settings.add_recognized_features(&["urn:a", "urn:a", "urn:b"]);
        assert!(settings.is_feature_recognized("urn:a"));
        assert!(settings.check_feature("urn:b").is_ok());
        let err = settings.check_feature("urn:c").unwrap_err();
        assert!(err.is_not_recognized());
        assert_eq!(err.identifier(), "urn:c");
        assert!(BasicRules.check_property(&settings, "urn:a").is_err());
    }

    #[test]
    fn defaults_do_not_overwrite_test() {
        let mut settings = ParserConfigurationSettings::new();
        settings.store_feature("urn:a", false);
        assert!(!settings.install_feature_default("urn:a", true));
        assert_eq!(settings.feature("urn:a"), Some(false));
        assert!(settings.install_feature_default("urn:b", true));
        assert_eq!(settings.feature("urn:b"), Some(true));
        assert!(settings.install_property_default("urn:p", XmlProperty::Integer(1)));
        assert!(!settings.install_property_default("urn:p", XmlProperty::Integer(2)));
        assert!(matches!(settings.property("urn:p"), Some(XmlProperty::Integer(1))));
    }
}
