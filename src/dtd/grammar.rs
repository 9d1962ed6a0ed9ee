//! Provide the DTD grammar model and its construction from DTD events.
//!
//! [`DtdGrammar`] is itself a DTD handler and content model handler: the DTD processor
//! forwards every event it accepts into the grammar of the current document.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
    rc::Rc,
};

use crate::{
    error::XniError,
    xni::{Augmentations, XmlDtdContentModelHandler, XmlDtdHandler, XmlResourceIdentifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionalKind {
    Include,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentSeparator {
    /// `,`
    Sequence,
    /// `|`
    Choice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentOccurrence {
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl ContentOccurrence {
    pub fn as_char(&self) -> char {
        match self {
            Self::ZeroOrOne => '?',
            Self::ZeroOrMore => '*',
            Self::OneOrMore => '+',
        }
    }
}

/// A node of an element-content model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentParticle {
    Element(Rc<str>),
    Sequence(Vec<ContentParticle>),
    Choice(Vec<ContentParticle>),
    Repeat(Box<ContentParticle>, ContentOccurrence),
}

impl ContentParticle {
    /// Whether `children` is a sentence of this model.
    pub fn matches(&self, children: &[Rc<str>]) -> bool {
        let start = BTreeSet::from([0]);
        self.advance(children, &start).contains(&children.len())
    }

    /// Whether the model accepts no children at all.
    pub fn is_nullable(&self) -> bool {
        self.matches(&[])
    }

    fn advance(&self, children: &[Rc<str>], from: &BTreeSet<usize>) -> BTreeSet<usize> {
        match self {
            Self::Element(name) => from
                .iter()
                .filter(|&&i| children.get(i).is_some_and(|child| child == name))
                .map(|&i| i + 1)
                .collect(),
            Self::Sequence(particles) => particles
                .iter()
                .fold(from.clone(), |acc, p| p.advance(children, &acc)),
            Self::Choice(particles) => particles
                .iter()
                .flat_map(|p| p.advance(children, from))
                .collect(),
            Self::Repeat(particle, occurrence) => match occurrence {
                ContentOccurrence::ZeroOrOne => {
                    let mut reached = from.clone();
                    reached.extend(particle.advance(children, from));
                    reached
                }
                ContentOccurrence::ZeroOrMore => particle.closure(children, from.clone()),
                ContentOccurrence::OneOrMore => {
                    let first = particle.advance(children, from);
                    particle.closure(children, first)
                }
            },
        }
    }

    fn closure(&self, children: &[Rc<str>], mut reached: BTreeSet<usize>) -> BTreeSet<usize> {
        let mut frontier = reached.clone();
        loop {
            let next = self.advance(children, &frontier);
            let new = next.difference(&reached).copied().collect::<BTreeSet<_>>();
            if new.is_empty() {
                return reached;
            }
            reached.extend(new.iter().copied());
            frontier = new;
        }
    }

    fn collect_names(&self, out: &mut Vec<Rc<str>>) {
        match self {
            Self::Element(name) => out.push(name.clone()),
            Self::Sequence(ps) | Self::Choice(ps) => ps.iter().for_each(|p| p.collect_names(out)),
            Self::Repeat(p, _) => p.collect_names(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSpec {
    Empty,
    Any,
    /// `(#PCDATA | a | b)*`, with the element names allowed between the text.
    Mixed(Vec<Rc<str>>),
    Children(ContentParticle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    pub name: Rc<str>,
    pub content_spec: ContentSpec,
    /// The content model as written in the declaration, without white space.
    pub content_model: String,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

impl AttType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CData => "CDATA",
            Self::Id => "ID",
            Self::IdRef => "IDREF",
            Self::IdRefs => "IDREFS",
            Self::Entity => "ENTITY",
            Self::Entities => "ENTITIES",
            Self::NmToken => "NMTOKEN",
            Self::NmTokens => "NMTOKENS",
            Self::Notation(_) => "NOTATION",
            Self::Enumeration(_) => "ENUMERATION",
        }
    }

    pub fn enumeration(&self) -> Option<&[String]> {
        match self {
            Self::Notation(values) | Self::Enumeration(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::IdRefs | Self::Entities | Self::NmTokens)
    }
}

impl Display for AttType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notation(values) => write!(f, "NOTATION ({})", values.join("|")),
            Self::Enumeration(values) => write!(f, "({})", values.join("|")),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttDefault {
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

impl AttDefault {
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Fixed(value) | Self::Default(value) => Some(value),
            _ => None,
        }
    }
}

/// One attribute definition of an `<!ATTLIST ...>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttributeDecl {
    pub element_name: String,
    pub attribute_name: String,
    pub att_type: AttType,
    pub default: AttDefault,
    /// The default value before attribute-value normalization.
    pub non_normalized_default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    /// Parameter entity names keep their leading `%`.
    pub name: String,
    pub value: Option<String>,
    pub identifier: Option<XmlResourceIdentifier>,
    pub notation: Option<String>,
    pub external_subset: bool,
}

impl EntityDecl {
    pub fn is_unparsed(&self) -> bool {
        self.notation.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDecl {
    pub name: String,
    pub identifier: XmlResourceIdentifier,
}

#[derive(Debug, Clone, Default)]
struct ContentModelBuilder {
    groups: Vec<(Vec<ContentParticle>, ContentSeparator)>,
    root: Option<ContentParticle>,
    spec: Option<ContentSpec>,
    mixed: bool,
}

impl ContentModelBuilder {
    fn push(&mut self, particle: ContentParticle) {
        match self.groups.last_mut() {
            Some((particles, _)) => particles.push(particle),
            None => self.root = Some(particle),
        }
    }

    fn last_particle(&mut self) -> Option<&mut ContentParticle> {
        match self.groups.last_mut() {
            Some((particles, _)) => particles.last_mut(),
            None => self.root.as_mut(),
        }
    }
}

/// The declarations of one document's DTD.
#[doc(alias = "DTDGrammar")]
#[derive(Debug, Clone, Default)]
pub struct DtdGrammar {
    elements: HashMap<Rc<str>, ElementDecl>,
    attlists: HashMap<String, Vec<XmlAttributeDecl>>,
    entities: HashMap<String, EntityDecl>,
    notations: HashMap<String, NotationDecl>,
    builder: ContentModelBuilder,
    in_external_subset: bool,
}

impl DtdGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementDecl> {
        self.elements.values()
    }

    pub fn attributes(&self, element: &str) -> &[XmlAttributeDecl] {
        self.attlists.get(element).map_or(&[], |list| list.as_slice())
    }

    pub fn attribute(&self, element: &str, attribute: &str) -> Option<&XmlAttributeDecl> {
        self.attributes(element)
            .iter()
            .find(|decl| decl.attribute_name == attribute)
    }

    pub fn attlist_elements(&self) -> impl Iterator<Item = &str> {
        self.attlists.keys().map(|k| k.as_str())
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.get(name)
    }

    pub fn is_unparsed_entity(&self, name: &str) -> bool {
        self.entities.get(name).is_some_and(|e| e.is_unparsed())
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDecl> {
        self.entities.values()
    }

    pub fn notation(&self, name: &str) -> Option<&NotationDecl> {
        self.notations.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
            && self.attlists.is_empty()
            && self.entities.is_empty()
            && self.notations.is_empty()
    }

    fn add_entity(&mut self, decl: EntityDecl) {
        // the first declaration is binding
        self.entities.entry(decl.name.clone()).or_insert(decl);
    }
}

impl XmlDtdHandler for DtdGrammar {
    fn start_external_subset(
        &mut self,
        _identifier: &XmlResourceIdentifier,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.in_external_subset = true;
        Ok(())
    }

    fn end_external_subset(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        self.in_external_subset = false;
        Ok(())
    }

    fn element_decl(
        &mut self,
        name: &str,
        content_model: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        let spec = self.builder.spec.take().unwrap_or(ContentSpec::Any);
        if !self.elements.contains_key(name) {
            let name: Rc<str> = Rc::from(name);
            self.elements.insert(
                name.clone(),
                ElementDecl {
                    name,
                    content_spec: spec,
                    content_model: content_model.to_owned(),
                    external: self.in_external_subset,
                },
            );
        }
        Ok(())
    }

    fn attribute_decl(
        &mut self,
        decl: &XmlAttributeDecl,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        let list = self.attlists.entry(decl.element_name.clone()).or_default();
        if !list.iter().any(|d| d.attribute_name == decl.attribute_name) {
            list.push(decl.clone());
        }
        Ok(())
    }

    fn internal_entity_decl(
        &mut self,
        name: &str,
        text: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.add_entity(EntityDecl {
            name: name.to_owned(),
            value: Some(text.to_owned()),
            identifier: None,
            notation: None,
            external_subset: self.in_external_subset,
        });
        Ok(())
    }

    fn external_entity_decl(
        &mut self,
        name: &str,
        identifier: &XmlResourceIdentifier,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.add_entity(EntityDecl {
            name: name.to_owned(),
            value: None,
            identifier: Some(identifier.clone()),
            notation: None,
            external_subset: self.in_external_subset,
        });
        Ok(())
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        identifier: &XmlResourceIdentifier,
        notation: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.add_entity(EntityDecl {
            name: name.to_owned(),
            value: None,
            identifier: Some(identifier.clone()),
            notation: Some(notation.to_owned()),
            external_subset: self.in_external_subset,
        });
        Ok(())
    }

    fn notation_decl(
        &mut self,
        name: &str,
        identifier: &XmlResourceIdentifier,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.notations
            .entry(name.to_owned())
            .or_insert_with(|| NotationDecl {
                name: name.to_owned(),
                identifier: identifier.clone(),
            });
        Ok(())
    }
}

impl XmlDtdContentModelHandler for DtdGrammar {
    fn start_content_model(
        &mut self,
        _element_name: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        self.builder = ContentModelBuilder::default();
        Ok(())
    }

    fn any(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        self.builder.spec = Some(ContentSpec::Any);
        Ok(())
    }

    fn empty(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        self.builder.spec = Some(ContentSpec::Empty);
        Ok(())
    }

    fn start_group(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        self.builder.groups.push((vec![], ContentSeparator::Sequence));
        Ok(())
    }

    fn pcdata(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        self.builder.mixed = true;
        Ok(())
    }

    fn element(&mut self, name: &str, _augs: &Augmentations) -> Result<(), XniError> {
        self.builder.push(ContentParticle::Element(Rc::from(name)));
        Ok(())
    }

    fn separator(
        &mut self,
        separator: ContentSeparator,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        if let Some(group) = self.builder.groups.last_mut() {
            group.1 = separator;
        }
        Ok(())
    }

    fn occurrence(
        &mut self,
        occurrence: ContentOccurrence,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        if let Some(last) = self.builder.last_particle() {
            let inner = std::mem::replace(last, ContentParticle::Sequence(vec![]));
            *last = ContentParticle::Repeat(Box::new(inner), occurrence);
        }
        Ok(())
    }

    fn end_group(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        if let Some((particles, separator)) = self.builder.groups.pop() {
            let group = match separator {
                ContentSeparator::Sequence => ContentParticle::Sequence(particles),
                ContentSeparator::Choice => ContentParticle::Choice(particles),
            };
            self.builder.push(group);
        }
        Ok(())
    }

    fn end_content_model(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        if self.builder.spec.is_some() {
            return Ok(());
        }
        let root = self.builder.root.take();
        let spec = if self.builder.mixed {
            let mut names = vec![];
            if let Some(root) = &root {
                root.collect_names(&mut names);
            }
            ContentSpec::Mixed(names)
        } else {
            ContentSpec::Children(root.unwrap_or(ContentParticle::Sequence(vec![])))
        };
        self.builder.spec = Some(spec);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<Rc<str>> {
        list.iter().map(|&n| Rc::from(n)).collect()
    }

    fn build(grammar: &mut DtdGrammar, events: impl FnOnce(&mut DtdGrammar)) -> ContentSpec {
        let augs = Augmentations::default();
        grammar.start_content_model("e", &augs).unwrap();
        events(grammar);
        grammar.end_content_model(&augs).unwrap();
        grammar.element_decl("e", "", &augs).unwrap();
        DtdGrammar::element(grammar, "e").unwrap().content_spec.clone()
    }

    #[test]
    fn content_particle_match_test() {
        use ContentOccurrence::*;
        use ContentParticle::*;
        let a = || Element(Rc::from("a"));
        let b = || Element(Rc::from("b"));
        // (a, b*)
        let model = Sequence(vec![a(), Repeat(Box::new(b()), ZeroOrMore)]);
        assert!(model.matches(&names(&["a"])));
        assert!(model.matches(&names(&["a", "b", "b"])));
        assert!(!model.matches(&names(&["b"])));
        assert!(!model.matches(&names(&[])));
        // (a | b)+
        let model = Repeat(Box::new(Choice(vec![a(), b()])), OneOrMore);
        assert!(model.matches(&names(&["b", "a", "b"])));
        assert!(!model.is_nullable());
        // (a?, b)
        let model = Sequence(vec![Repeat(Box::new(a()), ZeroOrOne), b()]);
        assert!(model.matches(&names(&["b"])));
        assert!(!model.matches(&names(&["a", "a", "b"])));
    }

    #[test]
    fn build_content_model_test() {
        let augs = Augmentations::default();
        let mut grammar = DtdGrammar::new();
        // (a, (b | c)*)
        let spec = build(&mut grammar, |g| {
            g.start_group(&augs).unwrap();
            g.element("a", &augs).unwrap();
            g.separator(ContentSeparator::Sequence, &augs).unwrap();
            g.start_group(&augs).unwrap();
            g.element("b", &augs).unwrap();
            g.separator(ContentSeparator::Choice, &augs).unwrap();
            g.element("c", &augs).unwrap();
            g.end_group(&augs).unwrap();
            g.occurrence(ContentOccurrence::ZeroOrMore, &augs).unwrap();
            g.end_group(&augs).unwrap();
        });
        let ContentSpec::Children(model) = spec else {
            panic!("expected children content");
        };
        assert!(model.matches(&names(&["a", "c", "b"])));
        assert!(!model.matches(&names(&["c"])));
    }

    #[test]
    fn build_mixed_model_test() {
        let augs = Augmentations::default();
        let mut grammar = DtdGrammar::new();
        let spec = build(&mut grammar, |g| {
            g.start_group(&augs).unwrap();
            g.pcdata(&augs).unwrap();
            g.separator(ContentSeparator::Choice, &augs).unwrap();
            g.element("b", &augs).unwrap();
            g.end_group(&augs).unwrap();
            g.occurrence(ContentOccurrence::ZeroOrMore, &augs).unwrap();
        });
        assert_eq!(spec, ContentSpec::Mixed(names(&["b"])));
    }

    #[test]
    fn first_declaration_binding_test() {
        let augs = Augmentations::default();
        let mut grammar = DtdGrammar::new();
        grammar.internal_entity_decl("e", "first", &augs).unwrap();
        grammar.internal_entity_decl("e", "second", &augs).unwrap();
        assert_eq!(grammar.entity("e").unwrap().value.as_deref(), Some("first"));
        let decl = XmlAttributeDecl {
            element_name: "a".to_owned(),
            attribute_name: "x".to_owned(),
            att_type: AttType::CData,
            default: AttDefault::Default("1".to_owned()),
            non_normalized_default: Some("1".to_owned()),
        };
        grammar.attribute_decl(&decl, &augs).unwrap();
        let mut second = decl.clone();
        second.default = AttDefault::Implied;
        grammar.attribute_decl(&second, &augs).unwrap();
        assert_eq!(grammar.attributes("a").len(), 1);
        assert_eq!(grammar.attribute("a", "x").unwrap().default.value(), Some("1"));
    }
}
