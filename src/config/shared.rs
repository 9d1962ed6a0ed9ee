use std::{
    cell::{Ref, RefCell, RefMut},
    rc::{Rc, Weak},
};

use crate::{error::XniError, xni::XmlInputSource};

use super::XmlPullParserConfiguration;

/// A reference-counted configuration.
///
/// Handlers that must reach the configuration driving them keep a
/// [`WeakConfiguration`]. While a parse runs the configuration is mutably borrowed, so a
/// nested `parse` through any handle fails with [`XniError::ParseInProgress`] instead of
/// panicking.
pub struct SharedConfiguration<C>(Rc<RefCell<C>>);

impl<C> SharedConfiguration<C> {
    pub fn new(config: C) -> Self {
        Self(Rc::new(RefCell::new(config)))
    }

    pub fn downgrade(&self) -> WeakConfiguration<C> {
        WeakConfiguration(Rc::downgrade(&self.0))
    }

    /// Borrow the configuration, or fail if a parse is running.
    pub fn borrow(&self) -> Result<Ref<'_, C>, XniError> {
        self.0.try_borrow().map_err(|_| XniError::ParseInProgress)
    }

    pub fn borrow_mut(&self) -> Result<RefMut<'_, C>, XniError> {
        self.0.try_borrow_mut().map_err(|_| XniError::ParseInProgress)
    }

    /// Run `f` on the configuration, or fail if a parse is running.
    pub fn with<T>(&self, f: impl FnOnce(&mut C) -> T) -> Result<T, XniError> {
        Ok(f(&mut *self.borrow_mut()?))
    }
}

impl<C: XmlPullParserConfiguration> SharedConfiguration<C> {
    pub fn parse(&self, source: XmlInputSource) -> Result<(), XniError> {
        self.borrow_mut()?.parse(source)
    }

    pub fn set_input_source(&self, source: XmlInputSource) -> Result<(), XniError> {
        self.with(|config| config.set_input_source(source))
    }

    pub fn parse_step(&self, complete: bool) -> Result<bool, XniError> {
        self.borrow_mut()?.parse_step(complete)
    }

    pub fn cleanup(&self) -> Result<(), XniError> {
        self.with(|config| config.cleanup())
    }
}

impl<C> Clone for SharedConfiguration<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C: Default> Default for SharedConfiguration<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

pub struct WeakConfiguration<C>(Weak<RefCell<C>>);

impl<C> WeakConfiguration<C> {
    pub fn upgrade(&self) -> Option<SharedConfiguration<C>> {
        self.0.upgrade().map(SharedConfiguration)
    }
}

impl<C> Clone for WeakConfiguration<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{NonValidatingConfiguration, XmlParserConfiguration},
        xni::{Augmentations, QName, XmlAttributes, XmlDocumentHandler},
    };

    use super::*;

    struct Nested {
        config: WeakConfiguration<NonValidatingConfiguration>,
        outcomes: Vec<bool>,
    }

    impl XmlDocumentHandler for Nested {
        fn start_element(
            &mut self,
            _element: &QName,
            _attributes: &XmlAttributes,
            _augs: &Augmentations,
        ) -> Result<(), XniError> {
            let config = self
                .config
                .upgrade()
                .ok_or(XniError::Pipeline("configuration dropped".into()))?;
            let result = config.parse(XmlInputSource::from_text("<b/>"));
            self.outcomes
                .push(result.is_err_and(|e| e.is_parse_in_progress()));
            Ok(())
        }
    }

    #[test]
    fn nested_parse_test() {
        let config = SharedConfiguration::new(NonValidatingConfiguration::new());
        let nested = Rc::new(RefCell::new(Nested {
            config: config.downgrade(),
            outcomes: vec![],
        }));
        config
            .with(|c| c.set_document_handler(Some(nested.clone())))
            .unwrap();

        config
            .parse(XmlInputSource::from_text("<a><a></a></a>"))
            .unwrap();
        assert_eq!(nested.borrow().outcomes, [true, true]);

        // The configuration is usable again once the outer parse returned.
        config.with(|c| c.set_document_handler(None)).unwrap();
        config.parse(XmlInputSource::from_text("<a/>")).unwrap();
        assert!(config.borrow().is_ok());
    }

    #[test]
    fn weak_handle_test() {
        let config = SharedConfiguration::new(NonValidatingConfiguration::new());
        let weak = config.downgrade();
        assert!(weak.upgrade().is_some());
        drop(config);
        assert!(weak.upgrade().is_none());
    }
}
