//! Provide the pipeline link graph and the plumbing that carries events along it.
//!
//! Links are edges `source -> handler` kept in both directions, so a stage can be asked
//! for its handler and a handler for its source. Relinking replaces edges. It never
//! leaves an edge behind that points at a stage no longer in the chain.
//!
//! While the scanner runs, the stages of a chain are borrowed from the arena in chain
//! order and an event is pushed through them with [`DocumentNext::emit`] or
//! [`DtdNext::emit`]. Each stage decides what, if anything, to pass on.

use std::{
    cell::{RefCell, RefMut},
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use tracing::trace;

use crate::{
    component::{Component, ComponentArena, ComponentId},
    dtd::XmlDtdScanner,
    entity::XmlEntityManager,
    error::{XmlErrorCode, XmlErrorLevel, XniError},
    reporter::XmlErrorReporter,
    validation::ValidationManager,
    xni::{
        Augmentations, DocumentEvent, DtdEvent, XmlDocumentHandler, XmlDtdContentModelHandler,
        XmlDtdHandler, XmlErrorHandler,
    },
};

pub type DocumentHandlerRef = Rc<RefCell<dyn XmlDocumentHandler>>;
pub type DtdHandlerRef = Rc<RefCell<dyn XmlDtdHandler>>;
pub type DtdContentModelHandlerRef = Rc<RefCell<dyn XmlDtdContentModelHandler>>;
pub type ErrorHandlerRef = Rc<RefCell<dyn XmlErrorHandler>>;

/// One end of a pipeline link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Component(ComponentId),
    /// The application's document handler.
    DocumentHandler,
    DtdHandler,
    DtdContentModelHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkKind {
    Document,
    Dtd,
    DtdContentModel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLinks {
    handlers: BTreeMap<(LinkKind, ComponentId), Endpoint>,
    sources: BTreeMap<(LinkKind, Endpoint), ComponentId>,
}

impl PipelineLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handler` the `kind` handler of `source`, and `source` the source of `handler`.
    pub fn link(&mut self, kind: LinkKind, source: ComponentId, handler: Endpoint) {
        if let Some(old) = self.handlers.insert((kind, source), handler) {
            if old != handler && self.sources.get(&(kind, old)) == Some(&source) {
                self.sources.remove(&(kind, old));
            }
        }
        if let Some(old) = self.sources.insert((kind, handler), source) {
            if old != source && self.handlers.get(&(kind, old)) == Some(&handler) {
                self.handlers.remove(&(kind, old));
            }
        }
        trace!(?kind, ?source, ?handler, "linked");
    }

    /// Remove the `kind` edge leaving `source`.
    pub fn unlink(&mut self, kind: LinkKind, source: ComponentId) {
        if let Some(handler) = self.handlers.remove(&(kind, source)) {
            self.sources.remove(&(kind, handler));
        }
    }

    pub fn handler_of(&self, kind: LinkKind, source: ComponentId) -> Option<Endpoint> {
        self.handlers.get(&(kind, source)).copied()
    }

    pub fn source_of(&self, kind: LinkKind, handler: Endpoint) -> Option<ComponentId> {
        self.sources.get(&(kind, handler)).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
        self.sources.clear();
    }

    /// Follow the `kind` edges from `start`.
    ///
    /// Returns the stages after `start`, in order, and the endpoint the chain ends in.
    /// The endpoint is `None` when the last stage has no handler.
    pub fn chain(&self, kind: LinkKind, start: ComponentId) -> (Vec<ComponentId>, Option<Endpoint>) {
        let mut stages = vec![];
        let mut visited = BTreeSet::from([start]);
        let mut current = start;
        loop {
            match self.handler_of(kind, current) {
                Some(Endpoint::Component(next)) if visited.insert(next) => {
                    stages.push(next);
                    current = next;
                }
                Some(Endpoint::Component(_)) => return (stages, None),
                terminal => return (stages, terminal),
            }
        }
    }
}

/// The application handlers at the ends of the chains.
#[derive(Clone, Default)]
pub struct PipelineHandlers {
    pub document: Option<DocumentHandlerRef>,
    pub dtd: Option<DtdHandlerRef>,
    pub content_model: Option<DtdContentModelHandlerRef>,
}

/// The common components every stage may use while an event is processed.
pub struct PipelineContext<'a> {
    pub entities: &'a mut XmlEntityManager,
    pub reporter: &'a mut XmlErrorReporter,
    pub validation: &'a mut ValidationManager,
}

impl PipelineContext<'_> {
    /// Report at the current position of the entity manager.
    pub fn report(
        &mut self,
        code: XmlErrorCode,
        args: &[&str],
        level: XmlErrorLevel,
    ) -> Result<(), XniError> {
        let location = self.entities.location();
        self.reporter.report(location, code, args, level)
    }

    pub fn fatal(&mut self, code: XmlErrorCode, args: &[&str]) -> Result<(), XniError> {
        self.report(code, args, XmlErrorLevel::Fatal)
    }

    pub fn error(&mut self, code: XmlErrorCode, args: &[&str]) -> Result<(), XniError> {
        self.report(code, args, XmlErrorLevel::Error)
    }

    pub fn warning(&mut self, code: XmlErrorCode, args: &[&str]) -> Result<(), XniError> {
        self.report(code, args, XmlErrorLevel::Warning)
    }

    /// Surface a read failure of the current entity.
    ///
    /// I/O failures are returned as they are. Decoding failures are fatal errors.
    pub fn check_entity_error(&mut self) -> Result<(), XniError> {
        match self.entities.take_current_error() {
            Some(Err(io)) => Err(XniError::Io(io)),
            Some(Ok(encoding)) => {
                self.fatal(XmlErrorCode::MalformedByteSequence, &[&encoding.to_string()])
            }
            None => Ok(()),
        }
    }
}

/// The rest of the document chain, seen from one stage.
pub struct DocumentNext<'n, 's> {
    pub stages: &'n mut [RefMut<'s, Component>],
    pub handler: Option<&'n mut (dyn XmlDocumentHandler + 'static)>,
}

impl DocumentNext<'_, '_> {
    /// Pass `event` to the next stage, or to the handler after the last stage.
    pub fn emit(
        &mut self,
        event: DocumentEvent,
        augs: &Augmentations,
        cx: &mut PipelineContext<'_>,
    ) -> Result<(), XniError> {
        match self.stages.split_first_mut() {
            Some((first, rest)) => {
                let mut next = DocumentNext {
                    stages: rest,
                    handler: self.handler.as_deref_mut(),
                };
                first.filter_document(event, augs, cx, &mut next)
            }
            None => match self.handler.as_deref_mut() {
                Some(handler) => event.deliver(handler, augs),
                None => Ok(()),
            },
        }
    }

    /// Whether a later stage binds namespaces.
    pub fn has_namespace_binder(&self) -> bool {
        self.stages.iter().any(|stage| stage.is_namespace_binder())
    }
}

/// The rest of the DTD chain, seen from one stage.
pub struct DtdNext<'n, 's> {
    pub stages: &'n mut [RefMut<'s, Component>],
    pub dtd_handler: Option<&'n mut (dyn XmlDtdHandler + 'static)>,
    pub content_model_handler: Option<&'n mut (dyn XmlDtdContentModelHandler + 'static)>,
}

impl DtdNext<'_, '_> {
    pub fn emit(
        &mut self,
        event: DtdEvent,
        augs: &Augmentations,
        cx: &mut PipelineContext<'_>,
    ) -> Result<(), XniError> {
        match self.stages.split_first_mut() {
            Some((first, rest)) => {
                let mut next = DtdNext {
                    stages: rest,
                    dtd_handler: self.dtd_handler.as_deref_mut(),
                    content_model_handler: self.content_model_handler.as_deref_mut(),
                };
                first.filter_dtd(event, augs, cx, &mut next)
            }
            None if event.is_content_model() => match self.content_model_handler.as_deref_mut() {
                Some(handler) => event.deliver_content_model(handler, augs),
                None => Ok(()),
            },
            None => match self.dtd_handler.as_deref_mut() {
                Some(handler) => event.deliver(handler, augs),
                None => Ok(()),
            },
        }
    }
}

/// The DTD scanner the document scanner hands the document type declaration to, and
/// the chain it feeds.
pub struct DtdPipeline<'n, 's> {
    pub scanner: Option<&'n mut XmlDtdScanner>,
    pub next: DtdNext<'n, 's>,
}

fn in_use(what: &'static str) -> XniError {
    XniError::Pipeline(format!("the {what} is already in use").into())
}

/// Run one scanner step, or the whole document when `complete` is set.
///
/// Every stage of both chains is borrowed for the duration of the call. Application
/// handlers are used only where a chain actually ends in them.
#[allow(clippy::too_many_arguments)]
pub fn drive_scanner(
    arena: &ComponentArena,
    links: &PipelineLinks,
    scanner_id: ComponentId,
    entity_manager_id: ComponentId,
    error_reporter_id: ComponentId,
    validation: &RefCell<ValidationManager>,
    handlers: &PipelineHandlers,
    complete: bool,
) -> Result<bool, XniError> {
    let mut scanner = arena.document_scanner(scanner_id)?;
    let mut entities = arena.entity_manager(entity_manager_id)?;
    let mut reporter = arena.error_reporter(error_reporter_id)?;
    let mut validation = validation
        .try_borrow_mut()
        .map_err(|_| in_use("validation manager"))?;

    let (document_ids, document_end) = links.chain(LinkKind::Document, scanner_id);
    let mut document_stages = arena.borrow_chain(&document_ids)?;
    let mut document_handler = match (document_end, &handlers.document) {
        (Some(Endpoint::DocumentHandler), Some(handler)) => Some(
            handler
                .try_borrow_mut()
                .map_err(|_| in_use("document handler"))?,
        ),
        _ => None,
    };

    let dtd_scanner_id = scanner.dtd_scanner();
    let mut dtd_scanner = dtd_scanner_id
        .map(|id| arena.dtd_scanner(id))
        .transpose()?;
    let (dtd_ids, dtd_end) = dtd_scanner_id
        .map(|id| links.chain(LinkKind::Dtd, id))
        .unwrap_or_default();
    let content_model_end = dtd_scanner_id.and_then(|id| links.chain(LinkKind::DtdContentModel, id).1);
    let mut dtd_stages = arena.borrow_chain(&dtd_ids)?;
    let mut dtd_handler = match (dtd_end, &handlers.dtd) {
        (Some(Endpoint::DtdHandler), Some(handler)) => {
            Some(handler.try_borrow_mut().map_err(|_| in_use("DTD handler"))?)
        }
        _ => None,
    };
    let mut content_model_handler = match (content_model_end, &handlers.content_model) {
        (Some(Endpoint::DtdContentModelHandler), Some(handler)) => Some(
            handler
                .try_borrow_mut()
                .map_err(|_| in_use("content model handler"))?,
        ),
        _ => None,
    };

    let mut cx = PipelineContext {
        entities: &mut entities,
        reporter: &mut reporter,
        validation: &mut validation,
    };
    let mut next = DocumentNext {
        stages: &mut document_stages,
        handler: document_handler.as_deref_mut(),
    };
    let mut dtd = DtdPipeline {
        scanner: dtd_scanner.as_deref_mut(),
        next: DtdNext {
            stages: &mut dtd_stages,
            dtd_handler: dtd_handler.as_deref_mut(),
            content_model_handler: content_model_handler.as_deref_mut(),
        },
    };
    scanner.scan_document(complete, &mut cx, &mut next, &mut dtd)
}

#[cfg(test)]
mod tests {
    use crate::reporter::XmlErrorReporter;

    use super::*;

    fn ids(n: usize) -> Vec<ComponentId> {
        let mut arena = ComponentArena::new();
        (0..n)
            .map(|_| arena.insert(Component::ErrorReporter(XmlErrorReporter::new())))
            .collect()
    }

    #[test]
    fn relink_test() {
        let id = ids(4);
        let mut links = PipelineLinks::new();
        links.link(LinkKind::Document, id[0], Endpoint::Component(id[1]));
        links.link(LinkKind::Document, id[1], Endpoint::DocumentHandler);
        assert_eq!(
            links.chain(LinkKind::Document, id[0]),
            (vec![id[1]], Some(Endpoint::DocumentHandler))
        );

        // swap the whole chain for another one
        links.link(LinkKind::Document, id[2], Endpoint::Component(id[3]));
        links.link(LinkKind::Document, id[3], Endpoint::DocumentHandler);
        assert_eq!(links.source_of(LinkKind::Document, Endpoint::DocumentHandler), Some(id[3]));
        assert_eq!(links.handler_of(LinkKind::Document, id[1]), None);
        assert_eq!(links.chain(LinkKind::Document, id[0]), (vec![id[1]], None));

        let snapshot = links.clone();
        links.link(LinkKind::Document, id[2], Endpoint::Component(id[3]));
        links.link(LinkKind::Document, id[3], Endpoint::DocumentHandler);
        assert_eq!(links, snapshot);
    }

    #[test]
    fn chain_cycle_test() {
        let id = ids(2);
        let mut links = PipelineLinks::new();
        links.link(LinkKind::Dtd, id[0], Endpoint::Component(id[1]));
        links.link(LinkKind::Dtd, id[1], Endpoint::Component(id[0]));
        assert_eq!(links.chain(LinkKind::Dtd, id[0]), (vec![id[1]], None));
        links.unlink(LinkKind::Dtd, id[1]);
        assert_eq!(links.len(), 1);
    }
}
