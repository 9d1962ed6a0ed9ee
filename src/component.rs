//! Provide the resettable-component contract and the arena that owns every component of
//! a configuration.
//!
//! Components are addressed by [`ComponentId`]. A property whose value is another
//! component holds its id, never a reference, so relinking the pipeline or switching the
//! active version is a plain data update.

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt::Debug,
    rc::Rc,
};

use crate::{
    dtd::{DtdDvFactory, XmlDtdProcessor, XmlDtdScanner, XmlDtdValidator},
    entity::XmlEntityManager,
    error::{XmlConfigurationError, XniError},
    pipeline::{DocumentNext, DtdNext, PipelineContext},
    reporter::XmlErrorReporter,
    scanner::XmlDocumentScanner,
    symbols::SymbolTable,
    validation::{ValidationManager, XmlGrammarPool},
    xni::{Augmentations, DocumentEvent, DtdEvent, XmlEntityResolver, XmlErrorHandler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(usize);

impl ComponentId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The value of a property.
#[derive(Clone)]
pub enum XmlProperty {
    Component(ComponentId),
    SymbolTable(Rc<SymbolTable>),
    ErrorHandler(Rc<RefCell<dyn XmlErrorHandler>>),
    EntityResolver(Rc<dyn XmlEntityResolver>),
    GrammarPool(Rc<RefCell<dyn XmlGrammarPool>>),
    DatatypeFactory(DtdDvFactory),
    ValidationManager(Rc<RefCell<ValidationManager>>),
    Locale(String),
    String(String),
    Integer(usize),
}

impl XmlProperty {
    pub fn as_component(&self) -> Option<ComponentId> {
        match self {
            Self::Component(id) => Some(*id),
            _ => None,
        }
    }
}

impl Debug for XmlProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Component(id) => f.debug_tuple("Component").field(id).finish(),
            Self::SymbolTable(table) => write!(f, "SymbolTable({} symbols)", table.len()),
            Self::ErrorHandler(_) => write!(f, "ErrorHandler"),
            Self::EntityResolver(_) => write!(f, "EntityResolver"),
            Self::GrammarPool(_) => write!(f, "GrammarPool"),
            Self::DatatypeFactory(factory) => f.debug_tuple("DatatypeFactory").field(factory).finish(),
            Self::ValidationManager(_) => write!(f, "ValidationManager"),
            Self::Locale(locale) => f.debug_tuple("Locale").field(locale).finish(),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
        }
    }
}

/// Read access to the configuration a component is reset against.
#[doc(alias = "XMLComponentManager")]
pub trait XmlComponentManager {
    fn get_feature(&self, feature_id: &str) -> Result<bool, XmlConfigurationError>;
    fn get_property(&self, property_id: &str) -> Result<Option<XmlProperty>, XmlConfigurationError>;

    /// The state of `feature_id`, or `default` when it cannot be read.
    fn feature_or(&self, feature_id: &str, default: bool) -> bool {
        self.get_feature(feature_id).unwrap_or(default)
    }

    fn property(&self, property_id: &str) -> Option<XmlProperty> {
        self.get_property(property_id).ok().flatten()
    }
}

/// The contract of every pipeline stage.
///
/// A component declares the identifiers it understands and the defaults it wants for
/// them, is reset once per parse, and receives every feature and property change
/// broadcast by its configuration.
#[doc(alias = "XMLComponent")]
#[allow(unused_variables)]
pub trait XmlComponent {
    fn recognized_features(&self) -> &[&'static str] {
        &[]
    }

    /// `None` when the component has no opinion.
    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        None
    }

    fn recognized_properties(&self) -> &[&'static str] {
        &[]
    }

    fn property_default(&self, property_id: &str) -> Option<XmlProperty> {
        None
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError>;

    /// Apply a feature change. Identifiers the component does not use are ignored.
    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        Ok(())
    }

    fn set_property(
        &mut self,
        property_id: &str,
        value: &XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        Ok(())
    }
}

/// One concrete stage of the pipeline.
pub enum Component {
    EntityManager(XmlEntityManager),
    ErrorReporter(XmlErrorReporter),
    DocumentScanner(XmlDocumentScanner),
    DtdScanner(XmlDtdScanner),
    DtdProcessor(XmlDtdProcessor),
    DtdValidator(XmlDtdValidator),
    Custom(Box<dyn XmlComponent>),
}

impl Component {
    fn as_component(&self) -> &dyn XmlComponent {
        match self {
            Self::EntityManager(c) => c,
            Self::ErrorReporter(c) => c,
            Self::DocumentScanner(c) => c,
            Self::DtdScanner(c) => c,
            Self::DtdProcessor(c) => c,
            Self::DtdValidator(c) => c,
            Self::Custom(c) => c.as_ref(),
        }
    }

    fn as_component_mut(&mut self) -> &mut dyn XmlComponent {
        match self {
            Self::EntityManager(c) => c,
            Self::ErrorReporter(c) => c,
            Self::DocumentScanner(c) => c,
            Self::DtdScanner(c) => c,
            Self::DtdProcessor(c) => c,
            Self::DtdValidator(c) => c,
            Self::Custom(c) => c.as_mut(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntityManager(_) => "entity manager",
            Self::ErrorReporter(_) => "error reporter",
            Self::DocumentScanner(_) => "document scanner",
            Self::DtdScanner(_) => "DTD scanner",
            Self::DtdProcessor(_) => "DTD processor",
            Self::DtdValidator(_) => "DTD validator",
            Self::Custom(_) => "custom component",
        }
    }

    /// Whether this stage binds namespaces for the stages before it.
    pub fn is_namespace_binder(&self) -> bool {
        matches!(self, Self::DtdValidator(validator) if validator.binds_namespaces())
    }

    /// Pass a document event through this stage.
    pub fn filter_document(
        &mut self,
        event: DocumentEvent,
        augs: &Augmentations,
        cx: &mut PipelineContext<'_>,
        next: &mut DocumentNext<'_, '_>,
    ) -> Result<(), XniError> {
        match self {
            Self::DtdValidator(validator) => validator.filter_document(event, augs, cx, next),
            _ => next.emit(event, augs, cx),
        }
    }

    /// Pass a DTD or content model event through this stage.
    pub fn filter_dtd(
        &mut self,
        event: DtdEvent,
        augs: &Augmentations,
        cx: &mut PipelineContext<'_>,
        next: &mut DtdNext<'_, '_>,
    ) -> Result<(), XniError> {
        match self {
            Self::DtdProcessor(processor) => processor.filter_dtd(event, augs, cx, next),
            _ => next.emit(event, augs, cx),
        }
    }
}

impl XmlComponent for Component {
    fn recognized_features(&self) -> &[&'static str] {
        self.as_component().recognized_features()
    }

    fn feature_default(&self, feature_id: &str) -> Option<bool> {
        self.as_component().feature_default(feature_id)
    }

    fn recognized_properties(&self) -> &[&'static str] {
        self.as_component().recognized_properties()
    }

    fn property_default(&self, property_id: &str) -> Option<XmlProperty> {
        self.as_component().property_default(property_id)
    }

    fn reset(&mut self, manager: &dyn XmlComponentManager) -> Result<(), XniError> {
        self.as_component_mut().reset(manager)
    }

    fn set_feature(&mut self, feature_id: &str, state: bool) -> Result<(), XmlConfigurationError> {
        self.as_component_mut().set_feature(feature_id, state)
    }

    fn set_property(
        &mut self,
        property_id: &str,
        value: &XmlProperty,
    ) -> Result<(), XmlConfigurationError> {
        self.as_component_mut().set_property(property_id, value)
    }
}

/// Owns the components of one configuration.
///
/// Components are never removed, so an id stays valid for the life of the arena.
#[derive(Default)]
pub struct ComponentArena {
    slots: Vec<RefCell<Component>>,
}

macro_rules! impl_typed_access {
    ( $( $name:ident => $variant:ident($ty:ty) ),* $(,)? ) => {
        impl ComponentArena {
            $(
                pub fn $name(&self, id: ComponentId) -> Result<RefMut<'_, $ty>, XniError> {
                    RefMut::filter_map(self.borrow_mut(id)?, |component| match component {
                        Component::$variant(inner) => Some(inner),
                        _ => None,
                    })
                    .map_err(|component| {
                        XniError::Pipeline(
                            format!(
                                "component {} is a {}, not a {}",
                                id.0,
                                component.kind(),
                                stringify!($variant)
                            )
                            .into(),
                        )
                    })
                }
            )*
        }
    };
}

impl_typed_access!(
    entity_manager => EntityManager(XmlEntityManager),
    error_reporter => ErrorReporter(XmlErrorReporter),
    document_scanner => DocumentScanner(XmlDocumentScanner),
    dtd_scanner => DtdScanner(XmlDtdScanner),
    dtd_processor => DtdProcessor(XmlDtdProcessor),
    dtd_validator => DtdValidator(XmlDtdValidator),
);

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: Component) -> ComponentId {
        self.slots.push(RefCell::new(component));
        ComponentId(self.slots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.slots.get_mut(id.0).map(|slot| slot.get_mut())
    }

    pub fn borrow(&self, id: ComponentId) -> Result<Ref<'_, Component>, XniError> {
        self.slot(id)?
            .try_borrow()
            .map_err(|_| XniError::Pipeline(format!("component {} is in use", id.0).into()))
    }

    pub fn borrow_mut(&self, id: ComponentId) -> Result<RefMut<'_, Component>, XniError> {
        self.slot(id)?
            .try_borrow_mut()
            .map_err(|_| XniError::Pipeline(format!("component {} is in use", id.0).into()))
    }

    /// Borrow every component of a chain, in order.
    pub fn borrow_chain(&self, ids: &[ComponentId]) -> Result<Vec<RefMut<'_, Component>>, XniError> {
        ids.iter().map(|&id| self.borrow_mut(id)).collect()
    }

    fn slot(&self, id: ComponentId) -> Result<&RefCell<Component>, XniError> {
        self.slots
            .get(id.0)
            .ok_or_else(|| XniError::Pipeline(format!("no component has id {}", id.0).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_test() {
        let mut arena = ComponentArena::new();
        let reporter = arena.insert(Component::ErrorReporter(XmlErrorReporter::new()));
        let entities = arena.insert(Component::EntityManager(XmlEntityManager::new()));
        assert_eq!(arena.len(), 2);
        assert!(arena.error_reporter(reporter).is_ok());
        let err = arena.error_reporter(entities).err().unwrap();
        assert!(err.to_string().contains("entity manager"));

        let held = arena.entity_manager(entities).unwrap();
        assert!(arena.borrow_mut(entities).is_err());
        drop(held);
        assert_eq!(arena.borrow_chain(&[reporter, entities]).unwrap().len(), 2);
        assert!(arena.borrow_chain(&[reporter, reporter]).is_err());
    }

    #[test]
    fn property_debug_test() {
        let property = XmlProperty::DatatypeFactory(DtdDvFactory::Xml11);
        assert_eq!(format!("{property:?}"), "DatatypeFactory(Xml11)");
        assert_eq!(XmlProperty::Integer(3).as_component(), None);
    }
}
