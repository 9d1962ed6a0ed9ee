//! A streaming XML processor assembled from resettable components.
//!
//! A parser configuration owns every component (entity manager, error reporter,
//! scanners, DTD processor, DTD validator), keeps the feature/property store and links
//! the components into a document chain and a DTD chain ending at the application's
//! handlers. [`Xml11Configuration`] reads the version of each document before any
//! scanner runs and switches between an XML 1.0 and an XML 1.1 component set.
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//!
//! use xpipe::{
//!     Xml11Configuration, XmlParserConfiguration,
//!     error::XniError,
//!     xni::{Augmentations, QName, XmlAttributes, XmlDocumentHandler, XmlInputSource},
//! };
//!
//! #[derive(Default)]
//! struct Names(Vec<String>);
//!
//! impl XmlDocumentHandler for Names {
//!     fn start_element(
//!         &mut self,
//!         element: &QName,
//!         _attributes: &XmlAttributes,
//!         _augs: &Augmentations,
//!     ) -> Result<(), XniError> {
//!         self.0.push(element.raw_name.to_string());
//!         Ok(())
//!     }
//! }
//!
//! let names = Rc::new(RefCell::new(Names::default()));
//! let mut config = Xml11Configuration::new();
//! config.set_document_handler(Some(names.clone()));
//! config
//!     .parse(XmlInputSource::from_text("<?xml version='1.1'?><a><b></b></a>"))
//!     .unwrap();
//! assert_eq!(names.borrow().0, ["a", "b"]);
//! ```

#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]
#![warn(unused_mut)]
#![warn(unused_imports)]
#![warn(unused_variables)]

pub mod chars;
pub mod component;
pub mod config;
pub mod constants;
pub mod dtd;
pub mod encoding;
pub mod entity;
pub mod error;
pub mod namespace;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod scanner;
pub mod settings;
pub mod symbols;
pub mod validation;
pub mod version;
pub mod xni;

pub use config::{
    NonValidatingConfiguration, SharedConfiguration, WeakConfiguration, Xml11Configuration,
    XmlParserConfiguration, XmlPullParserConfiguration,
};
pub use constants::XmlVersion;
pub use error::{XmlConfigurationError, XmlParseError, XniError};
