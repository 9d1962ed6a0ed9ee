//! Provide the namespace context used to bind element and attribute names.
//!
//! The context is a stack of prefix bindings tagged with the element depth that declared
//! them. `xml` and `xmlns` are bound at depth zero and can never be rebound.

use std::rc::Rc;

use crate::{
    constants::{XML_NAMESPACE_URI, XMLNS_NAMESPACE_URI, XmlVersion},
    error::XmlErrorCode,
    symbols::SymbolTable,
    xni::{QName, XmlAttributes},
};

/// A namespace declaration made on an element.
///
/// `prefix` is `None` for the default namespace, `uri` is `None` when the
/// declaration undeclares the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: Option<Rc<str>>,
    pub uri: Option<Rc<str>>,
}

/// A namespace constraint violated while binding a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceError {
    pub code: XmlErrorCode,
    pub args: Vec<String>,
}

impl NamespaceError {
    fn new(code: XmlErrorCode, args: &[&str]) -> Self {
        Self {
            code,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    prefix: Option<Rc<str>>,
    uri: Option<Rc<str>>,
    depth: usize,
}

#[doc(alias = "NamespaceSupport")]
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    bindings: Vec<Binding>,
    depth: usize,
    xml_uri: Rc<str>,
    xmlns_uri: Rc<str>,
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceContext {
    pub fn new() -> Self {
        let mut context = Self {
            bindings: vec![],
            depth: 0,
            xml_uri: Rc::from(XML_NAMESPACE_URI),
            xmlns_uri: Rc::from(XMLNS_NAMESPACE_URI),
        };
        context.reset();
        context
    }

    /// Drop every binding except the two predefined ones.
    pub fn reset(&mut self) {
        self.depth = 0;
        self.bindings.clear();
        self.bindings.push(Binding {
            prefix: Some(Rc::from("xml")),
            uri: Some(self.xml_uri.clone()),
            depth: 0,
        });
        self.bindings.push(Binding {
            prefix: Some(Rc::from("xmlns")),
            uri: Some(self.xmlns_uri.clone()),
            depth: 0,
        });
    }

    pub fn push_context(&mut self) {
        self.depth += 1;
    }

    pub fn pop_context(&mut self) {
        while self.bindings.last().is_some_and(|b| b.depth >= self.depth && b.depth > 0) {
            self.bindings.pop();
        }
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn declare_prefix(&mut self, prefix: Option<Rc<str>>, uri: Option<Rc<str>>) {
        self.bindings.push(Binding {
            prefix,
            uri,
            depth: self.depth,
        });
    }

    /// Look up the URI bound to `prefix`, or to the default namespace for `None`.
    pub fn get_uri(&self, prefix: Option<&str>) -> Option<Rc<str>> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix.as_deref() == prefix)
            .and_then(|b| b.uri.clone())
    }

    /// Bind the names of a start tag in place.
    ///
    /// A new context must have been pushed for the element. Returns the
    /// declarations found on the element and every constraint violation.
    pub fn bind_start_element(
        &mut self,
        element: &mut QName,
        attributes: &mut XmlAttributes,
        version: XmlVersion,
        symbols: &SymbolTable,
    ) -> (Vec<NamespaceBinding>, Vec<NamespaceError>) {
        let mut declared = vec![];
        let mut errors = vec![];

        for attr in attributes.iter_mut() {
            let (prefix, raw) = (attr.name.prefix.clone(), attr.name.raw_name.clone());
            let declared_prefix = if &*raw == "xmlns" {
                None
            } else if prefix.as_deref() == Some("xmlns") {
                Some(attr.name.local_part.clone())
            } else {
                continue;
            };
            attr.name.uri = Some(self.xmlns_uri.clone());
            let value = attr.value.as_str();

            if declared_prefix.as_deref() == Some("xmlns") || value == XMLNS_NAMESPACE_URI {
                errors.push(NamespaceError::new(XmlErrorCode::CantBindXmlns, &[]));
                continue;
            }
            let is_xml_prefix = declared_prefix.as_deref() == Some("xml");
            if is_xml_prefix != (value == XML_NAMESPACE_URI) {
                errors.push(NamespaceError::new(XmlErrorCode::CantBindXml, &[]));
                continue;
            }
            if is_xml_prefix {
                continue;
            }
            let uri = if value.is_empty() {
                if declared_prefix.is_some() && version == XmlVersion::Xml10 {
                    errors.push(NamespaceError::new(XmlErrorCode::EmptyPrefixedAttName, &[&*raw]));
                    continue;
                }
                None
            } else {
                Some(symbols.add_symbol(value))
            };
            self.declare_prefix(declared_prefix.clone(), uri.clone());
            declared.push(NamespaceBinding {
                prefix: declared_prefix,
                uri,
            });
        }

        element.uri = self.get_uri(element.prefix());
        if let Some(prefix) = element.prefix() {
            if element.uri.is_none() {
                errors.push(NamespaceError::new(
                    XmlErrorCode::ElementPrefixUnbound,
                    &[&*element.raw_name, prefix],
                ));
            }
        }

        for attr in attributes.iter_mut() {
            if attr.name.uri.is_some() {
                continue;
            }
            if let Some(prefix) = attr.name.prefix.clone() {
                attr.name.uri = self.get_uri(Some(&prefix));
                if attr.name.uri.is_none() {
                    errors.push(NamespaceError::new(
                        XmlErrorCode::AttributePrefixUnbound,
                        &[&*element.raw_name, &*attr.name.raw_name, &*prefix],
                    ));
                }
            }
        }

        for (i, attr) in attributes.iter().enumerate() {
            if attr.name.uri.is_none() {
                continue;
            }
            let duplicate = attributes.iter().skip(i + 1).any(|other| {
                other.name.uri == attr.name.uri && other.name.local_part == attr.name.local_part
            });
            if duplicate {
                errors.push(NamespaceError::new(
                    XmlErrorCode::AttributeNSNotUnique,
                    &[
                        &*element.raw_name,
                        &*attr.name.local_part,
                        attr.name.uri().unwrap_or_default(),
                    ],
                ));
            }
        }

        (declared, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xni::XmlAttribute;

    fn attribute(name: &str, value: &str, symbols: &SymbolTable) -> XmlAttribute {
        XmlAttribute {
            name: QName::split(name, symbols),
            att_type: "CDATA",
            value: value.to_owned(),
            non_normalized_value: value.to_owned(),
            specified: true,
        }
    }

    #[test]
    fn predefined_prefix_test() {
        let context = NamespaceContext::new();
        assert_eq!(context.get_uri(Some("xml")).as_deref(), Some(XML_NAMESPACE_URI));
        assert_eq!(context.get_uri(Some("xmlns")).as_deref(), Some(XMLNS_NAMESPACE_URI));
        assert_eq!(context.get_uri(None), None);
    }

    #[test]
    fn bind_and_pop_test() {
        let symbols = SymbolTable::new();
        let mut context = NamespaceContext::new();
        context.push_context();
        let mut element = QName::split("x:a", &symbols);
        let mut attrs = XmlAttributes::new();
        attrs.push(attribute("xmlns:x", "u", &symbols));
        attrs.push(attribute("x:b", "1", &symbols));
        let (declared, errors) =
            context.bind_start_element(&mut element, &mut attrs, XmlVersion::Xml10, &symbols);
        assert!(errors.is_empty());
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].prefix.as_deref(), Some("x"));
        assert_eq!(declared[0].uri.as_deref(), Some("u"));
        assert_eq!(element.uri(), Some("u"));
        assert_eq!(attrs.get(1).unwrap().name.uri(), Some("u"));
        context.pop_context();
        assert_eq!(context.get_uri(Some("x")), None);
    }

    #[test]
    fn unbound_prefix_test() {
        let symbols = SymbolTable::new();
        let mut context = NamespaceContext::new();
        context.push_context();
        let mut element = QName::split("y:a", &symbols);
        let mut attrs = XmlAttributes::new();
        let (_, errors) =
            context.bind_start_element(&mut element, &mut attrs, XmlVersion::Xml10, &symbols);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, XmlErrorCode::ElementPrefixUnbound);
    }

    #[test]
    fn undeclare_prefix_test() {
        let symbols = SymbolTable::new();
        let mut context = NamespaceContext::new();
        context.push_context();
        context.declare_prefix(Some(Rc::from("p")), Some(Rc::from("u")));
        context.push_context();
        let mut element = QName::split("a", &symbols);
        let mut attrs = XmlAttributes::new();
        attrs.push(attribute("xmlns:p", "", &symbols));
        let (_, errors) = context.bind_start_element(
            &mut element,
            &mut attrs.clone(),
            XmlVersion::Xml10,
            &symbols,
        );
        assert_eq!(errors[0].code, XmlErrorCode::EmptyPrefixedAttName);
        let (declared, errors) =
            context.bind_start_element(&mut element, &mut attrs, XmlVersion::Xml11, &symbols);
        assert!(errors.is_empty());
        assert_eq!(declared[0].uri, None);
        assert_eq!(context.get_uri(Some("p")), None);
    }
}
