//! The receiver protocol: a SAX-like event sink for result-tree
//! construction. Every node-creating instruction is a pure client of
//! [`Receiver`]; concrete sinks build trees, collect sequences, or hand
//! events to a downstream serializer.

mod complex;
mod sequence;

pub use complex::ComplexContentOutputter;
pub use sequence::SequenceCollector;

use crate::error::Error;
use crate::location::LocationId;
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::Item;

/// Per-event property bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverProps(pub u32);

impl ReceiverProps {
    pub const NONE: ReceiverProps = ReceiverProps(0);
    /// Duplicate attribute names are an error rather than last-wins.
    pub const REJECT_DUPLICATE_ATTRIBUTES: ReceiverProps = ReceiverProps(1);
    /// The element does not pass its namespaces on to its children.
    pub const DISINHERIT_NAMESPACES: ReceiverProps = ReceiverProps(2);

    pub fn contains(self, other: ReceiverProps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ReceiverProps {
    type Output = ReceiverProps;
    fn bitor(self, rhs: ReceiverProps) -> ReceiverProps {
        ReceiverProps(self.0 | rhs.0)
    }
}

/// Event sink for document construction. Events for one element must arrive
/// as: `start_element`, namespaces and attributes, then content, then
/// `end_element`; [`ComplexContentOutputter`] polices that ordering for
/// instruction output.
pub trait Receiver<N: XdmNode> {
    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn start_document(&mut self, props: ReceiverProps) -> Result<(), Error>;
    fn end_document(&mut self) -> Result<(), Error>;

    fn start_element(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error>;
    fn namespace(&mut self, prefix: &str, uri: &str, props: ReceiverProps) -> Result<(), Error>;
    fn attribute(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        value: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error>;
    fn end_element(&mut self) -> Result<(), Error>;

    fn characters(&mut self, value: &str, loc: LocationId, props: ReceiverProps)
    -> Result<(), Error>;
    fn comment(&mut self, value: &str, loc: LocationId, props: ReceiverProps) -> Result<(), Error>;
    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error>;

    /// Append a pre-existing item to the stream. Sequence-valued sinks keep
    /// the item as-is; tree-building sinks decompose nodes into events.
    fn append(&mut self, item: &Item<N>, loc: LocationId) -> Result<(), Error>;
}

impl<N: XdmNode, R: Receiver<N> + ?Sized> Receiver<N> for Box<R> {
    fn open(&mut self) -> Result<(), Error> {
        (**self).open()
    }
    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }
    fn start_document(&mut self, props: ReceiverProps) -> Result<(), Error> {
        (**self).start_document(props)
    }
    fn end_document(&mut self) -> Result<(), Error> {
        (**self).end_document()
    }
    fn start_element(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        (**self).start_element(name, type_annotation, loc, props)
    }
    fn namespace(&mut self, prefix: &str, uri: &str, props: ReceiverProps) -> Result<(), Error> {
        (**self).namespace(prefix, uri, props)
    }
    fn attribute(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        value: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        (**self).attribute(name, type_annotation, value, loc, props)
    }
    fn end_element(&mut self) -> Result<(), Error> {
        (**self).end_element()
    }
    fn characters(&mut self, value: &str, loc: LocationId, props: ReceiverProps)
    -> Result<(), Error> {
        (**self).characters(value, loc, props)
    }
    fn comment(&mut self, value: &str, loc: LocationId, props: ReceiverProps) -> Result<(), Error> {
        (**self).comment(value, loc, props)
    }
    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        (**self).processing_instruction(target, data, loc, props)
    }
    fn append(&mut self, item: &Item<N>, loc: LocationId) -> Result<(), Error> {
        (**self).append(item, loc)
    }
}

/// Shared handle to a sink: lets the caller install a receiver as the
/// active output destination while keeping a handle to read results back
/// afterwards.
pub struct SharedSink<R>(pub std::rc::Rc<std::cell::RefCell<R>>);

impl<R> SharedSink<R> {
    pub fn new(inner: R) -> Self {
        Self(std::rc::Rc::new(std::cell::RefCell::new(inner)))
    }

    pub fn handle(&self) -> Self {
        Self(std::rc::Rc::clone(&self.0))
    }
}

impl<N: XdmNode, R: Receiver<N>> Receiver<N> for SharedSink<R> {
    fn open(&mut self) -> Result<(), Error> {
        self.0.borrow_mut().open()
    }
    fn close(&mut self) -> Result<(), Error> {
        self.0.borrow_mut().close()
    }
    fn start_document(&mut self, props: ReceiverProps) -> Result<(), Error> {
        self.0.borrow_mut().start_document(props)
    }
    fn end_document(&mut self) -> Result<(), Error> {
        self.0.borrow_mut().end_document()
    }
    fn start_element(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .start_element(name, type_annotation, loc, props)
    }
    fn namespace(&mut self, prefix: &str, uri: &str, props: ReceiverProps) -> Result<(), Error> {
        self.0.borrow_mut().namespace(prefix, uri, props)
    }
    fn attribute(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        value: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .attribute(name, type_annotation, value, loc, props)
    }
    fn end_element(&mut self) -> Result<(), Error> {
        self.0.borrow_mut().end_element()
    }
    fn characters(&mut self, value: &str, loc: LocationId, props: ReceiverProps)
    -> Result<(), Error> {
        self.0.borrow_mut().characters(value, loc, props)
    }
    fn comment(&mut self, value: &str, loc: LocationId, props: ReceiverProps) -> Result<(), Error> {
        self.0.borrow_mut().comment(value, loc, props)
    }
    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .processing_instruction(target, data, loc, props)
    }
    fn append(&mut self, item: &Item<N>, loc: LocationId) -> Result<(), Error> {
        self.0.borrow_mut().append(item, loc)
    }
}

/// Streams an existing node into a receiver as construction events.
pub fn copy_node_events<N: XdmNode>(
    node: &N,
    out: &mut dyn Receiver<N>,
    copy_namespaces: bool,
    preserve_types: bool,
    loc: LocationId,
) -> Result<(), Error> {
    match node.kind() {
        NodeKind::Document => {
            out.start_document(ReceiverProps::NONE)?;
            for child in node.children() {
                copy_node_events(&child, out, copy_namespaces, preserve_types, loc)?;
            }
            out.end_document()
        }
        NodeKind::Element => {
            let name = node.name().expect("element has a name");
            let type_ann = if preserve_types {
                node.type_annotation()
            } else {
                None
            };
            out.start_element(&name, type_ann.as_ref(), loc, ReceiverProps::NONE)?;
            if copy_namespaces {
                for (prefix, uri) in node.namespace_declarations() {
                    out.namespace(&prefix, &uri, ReceiverProps::NONE)?;
                }
            }
            for attr in node.attributes() {
                let aname = attr.name().expect("attribute has a name");
                let atype = if preserve_types {
                    attr.type_annotation()
                } else {
                    None
                };
                out.attribute(
                    &aname,
                    atype.as_ref(),
                    &attr.string_value(),
                    loc,
                    ReceiverProps::NONE,
                )?;
            }
            for child in node.children() {
                copy_node_events(&child, out, copy_namespaces, preserve_types, loc)?;
            }
            out.end_element()
        }
        NodeKind::Attribute => {
            let name = node.name().expect("attribute has a name");
            let type_ann = if preserve_types {
                node.type_annotation()
            } else {
                None
            };
            out.attribute(
                &name,
                type_ann.as_ref(),
                &node.string_value(),
                loc,
                ReceiverProps::NONE,
            )
        }
        NodeKind::Text => out.characters(&node.string_value(), loc, ReceiverProps::NONE),
        NodeKind::Comment => out.comment(&node.string_value(), loc, ReceiverProps::NONE),
        NodeKind::ProcessingInstruction => {
            let target = node.name().map(|q| q.local.to_string()).unwrap_or_default();
            out.processing_instruction(&target, &node.string_value(), loc, ReceiverProps::NONE)
        }
    }
}
