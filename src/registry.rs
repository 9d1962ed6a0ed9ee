//! Provide the component registry: the feature/property store, the components of a
//! configuration grouped into sets, and the broadcast of every setting change to them.
//!
//! Components are grouped into three disjoint sets. The common set and the XML 1.0 set
//! are strict: a component refusing a change fails the setter. The XML 1.1 set is
//! best-effort: a refusal is recorded in [`ComponentRegistry::suppressed_errors`] and
//! the change goes on.

use tracing::{debug, trace};

use crate::{
    component::{Component, ComponentArena, ComponentId, XmlComponent, XmlComponentManager, XmlProperty},
    constants::PARSER_SETTINGS,
    error::{XmlConfigurationError, XniError},
    settings::{ConfigurationRules, ParserConfigurationSettings},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentSet {
    /// Shared by both XML versions.
    Common,
    Xml10,
    Xml11,
}

pub struct ComponentRegistry<R> {
    settings: ParserConfigurationSettings,
    rules: R,
    arena: ComponentArena,
    common: Vec<ComponentId>,
    xml10: Vec<ComponentId>,
    xml11: Vec<ComponentId>,
    config_updated: bool,
    suppressed: Vec<XmlConfigurationError>,
}

impl<R: ConfigurationRules> ComponentRegistry<R> {
    pub fn new(rules: R) -> Self {
        Self {
            settings: ParserConfigurationSettings::new(),
            rules,
            arena: ComponentArena::new(),
            common: vec![],
            xml10: vec![],
            xml11: vec![],
            config_updated: false,
            suppressed: vec![],
        }
    }

    pub fn settings(&self) -> &ParserConfigurationSettings {
        &self.settings
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn arena(&self) -> &ComponentArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ComponentArena {
        &mut self.arena
    }

    pub fn components(&self, set: ComponentSet) -> &[ComponentId] {
        match set {
            ComponentSet::Common => &self.common,
            ComponentSet::Xml10 => &self.xml10,
            ComponentSet::Xml11 => &self.xml11,
        }
    }

    /// The set `id` belongs to, if it was added to one.
    pub fn set_of(&self, id: ComponentId) -> Option<ComponentSet> {
        [ComponentSet::Common, ComponentSet::Xml10, ComponentSet::Xml11]
            .into_iter()
            .find(|&set| self.components(set).contains(&id))
    }

    /// Put `component` in the arena without adding it to any set.
    pub fn insert(&mut self, component: Component) -> ComponentId {
        self.arena.insert(component)
    }

    pub fn add_common_component(&mut self, component: Component) -> ComponentId {
        let id = self.arena.insert(component);
        self.add_to_set(ComponentSet::Common, id);
        id
    }

    pub fn add_component(&mut self, component: Component) -> ComponentId {
        let id = self.arena.insert(component);
        self.add_to_set(ComponentSet::Xml10, id);
        id
    }

    pub fn add_xml11_component(&mut self, component: Component) -> ComponentId {
        let id = self.arena.insert(component);
        self.add_to_set(ComponentSet::Xml11, id);
        id
    }

    /// Add the component `id` to `set`, merging its recognized identifiers and defaults.
    ///
    /// A component already in any set is left alone and `false` is returned.
    pub fn add_to_set(&mut self, set: ComponentSet, id: ComponentId) -> bool {
        if self.set_of(id).is_some() {
            return false;
        }
        let Some(component) = self.arena.get_mut(id) else {
            return false;
        };
        let component: &Component = component;
        let features = component.recognized_features();
        self.settings.add_recognized_features(features);
        for &feature_id in features {
            if let Some(state) = component.feature_default(feature_id) {
                // a component added late must still get to read its defaults
                if self.settings.install_feature_default(feature_id, state) {
                    self.config_updated = true;
                }
            }
        }
        let properties = component.recognized_properties();
        self.settings.add_recognized_properties(properties);
        for &property_id in properties {
            if let Some(value) = component.property_default(property_id) {
                if self.settings.install_property_default(property_id, value) {
                    self.config_updated = true;
                }
            }
        }
        trace!(component = component.kind(), ?set, "component added");
        match set {
            ComponentSet::Common => self.common.push(id),
            ComponentSet::Xml10 => self.xml10.push(id),
            ComponentSet::Xml11 => self.xml11.push(id),
        }
        true
    }

    pub fn add_recognized_features(&mut self, feature_ids: &[&str]) {
        self.settings.add_recognized_features(feature_ids);
    }

    pub fn add_recognized_properties(&mut self, property_ids: &[&str]) {
        self.settings.add_recognized_properties(property_ids);
    }

    /// Set a feature and broadcast it: common, then XML 1.0, then XML 1.1.
    ///
    /// The value is stored only when every strict component and the rules accept it.
    pub fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        self.config_updated = true;
        for &id in self.common.iter().chain(&self.xml10) {
            if let Some(component) = self.arena.get_mut(id) {
                component.set_feature(feature_id, state)?;
            }
        }
        for &id in &self.xml11 {
            if let Some(component) = self.arena.get_mut(id) {
                if let Err(err) = component.set_feature(feature_id, state) {
                    debug!(feature = feature_id, error = %err, "XML 1.1 component refused a feature");
                    self.suppressed.push(err);
                }
            }
        }
        self.rules.check_feature(&self.settings, feature_id)?;
        self.settings.store_feature(feature_id, state);
        Ok(())
    }

    pub fn set_property(
        &mut self,
        property_id: &str,
        value: XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        self.config_updated = true;
        for &id in self.common.iter().chain(&self.xml10) {
            if let Some(component) = self.arena.get_mut(id) {
                component.set_property(property_id, &value)?;
            }
        }
        for &id in &self.xml11 {
            if let Some(component) = self.arena.get_mut(id) {
                if let Err(err) = component.set_property(property_id, &value) {
                    debug!(property = property_id, error = %err, "XML 1.1 component refused a property");
                    self.suppressed.push(err);
                }
            }
        }
        self.rules.check_property(&self.settings, property_id)?;
        self.settings.store_property(property_id, value);
        Ok(())
    }

    /// Store a feature without broadcasting it or marking the configuration changed.
    pub fn store_feature(&mut self, feature_id: &str, state: bool) {
        self.settings.store_feature(feature_id, state);
    }

    pub fn store_property(&mut self, property_id: &str, value: XmlProperty) {
        self.settings.store_property(property_id, value);
    }

    /// Whether a setting changed since the last parse began.
    pub fn config_updated(&self) -> bool {
        self.config_updated
    }

    pub fn set_config_updated(&mut self, updated: bool) {
        self.config_updated = updated;
    }

    /// Reset every component of `set`, in the order they were added.
    pub fn reset_set(&self, set: ComponentSet) -> Result<(), XniError> {
        for &id in self.components(set) {
            let mut component = self.arena.borrow_mut(id)?;
            trace!(component = component.kind(), ?set, "resetting component");
            component.reset(self)?;
        }
        Ok(())
    }

    /// The failures the XML 1.1 components raised during broadcasts.
    pub fn suppressed_errors(&self) -> &[XmlConfigurationError] {
        &self.suppressed
    }

    pub fn take_suppressed_errors(&mut self) -> Vec<XmlConfigurationError> {
        std::mem::take(&mut self.suppressed)
    }
}

impl<R: ConfigurationRules> XmlComponentManager for ComponentRegistry<R> {
    /// `parser-settings` answers whether the configuration changed since the last
    /// parse began. Any other feature answers its stored state, or `false` when it is
    /// accepted but unset.
    fn get_feature(&self, feature_id: &str) -> Result<bool, XmlConfigurationError> {
        if feature_id == PARSER_SETTINGS {
            return Ok(self.config_updated);
        }
        match self.settings.feature(feature_id) {
            Some(state) => Ok(state),
            None => {
                self.rules.check_feature(&self.settings, feature_id)?;
                Ok(false)
            }
        }
    }

    fn get_property(&self, property_id: &str) -> Result<Option<XmlProperty>, XmlConfigurationError> {
        match self.settings.property(property_id) {
            Some(value) => Ok(Some(value.clone())),
            None => {
                self.rules.check_property(&self.settings, property_id)?;
                Ok(None)
            }
        }
    }
}
