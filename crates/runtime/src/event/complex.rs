//! Ordering enforcement for instruction output.
//!
//! `ComplexContentOutputter` sits between the node-constructing instructions
//! and the real sink. It buffers each start tag until the first content
//! event so attributes and namespaces can still be added, rejects attribute
//! events that arrive after child content, and handles duplicate attribute
//! names per host-language policy (last wins, or rejected when
//! `REJECT_DUPLICATE_ATTRIBUTES` is set).

use smallvec::SmallVec;

use crate::error::{Error, ErrorCode};
use crate::location::LocationId;
use crate::model::{QName, XdmNode};
use crate::xdm::Item;

use super::{Receiver, ReceiverProps, copy_node_events};

struct PendingAttribute {
    name: QName,
    type_annotation: Option<QName>,
    value: String,
    loc: LocationId,
    props: ReceiverProps,
}

struct PendingTag {
    name: QName,
    type_annotation: Option<QName>,
    loc: LocationId,
    props: ReceiverProps,
    namespaces: SmallVec<[(String, String); 4]>,
    attributes: SmallVec<[PendingAttribute; 8]>,
}

pub struct ComplexContentOutputter<N: XdmNode> {
    inner: Box<dyn Receiver<N>>,
    pending: Option<PendingTag>,
    element_depth: usize,
    document_depth: usize,
    /// Orphan attributes/namespaces are legal at the very top of a plain
    /// sequence, but not under a document constructor.
    allow_top_level_attributes: bool,
    previous_atomic: bool,
}

impl<N: XdmNode> ComplexContentOutputter<N> {
    pub fn new(inner: Box<dyn Receiver<N>>, allow_top_level_attributes: bool) -> Self {
        Self {
            inner,
            pending: None,
            element_depth: 0,
            document_depth: 0,
            allow_top_level_attributes,
            previous_atomic: false,
        }
    }

    pub fn into_inner(self) -> Box<dyn Receiver<N>> {
        self.inner
    }

    /// Close the pending start tag, if any, releasing buffered namespaces
    /// and attributes to the sink.
    fn flush_pending(&mut self) -> Result<(), Error> {
        if let Some(tag) = self.pending.take() {
            self.inner
                .start_element(&tag.name, tag.type_annotation.as_ref(), tag.loc, tag.props)?;
            for (prefix, uri) in &tag.namespaces {
                self.inner.namespace(prefix, uri, ReceiverProps::NONE)?;
            }
            for a in &tag.attributes {
                self.inner
                    .attribute(&a.name, a.type_annotation.as_ref(), &a.value, a.loc, a.props)?;
            }
        }
        Ok(())
    }
}

impl<N: XdmNode> Receiver<N> for ComplexContentOutputter<N> {
    fn open(&mut self) -> Result<(), Error> {
        self.inner.open()
    }
    fn close(&mut self) -> Result<(), Error> {
        self.flush_pending()?;
        self.inner.close()
    }

    fn start_document(&mut self, props: ReceiverProps) -> Result<(), Error> {
        // Document events nested inside element content are transparent
        if self.element_depth == 0 && self.pending.is_none() {
            self.inner.start_document(props)?;
            self.document_depth += 1;
        } else {
            self.flush_pending()?;
        }
        self.previous_atomic = false;
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), Error> {
        if self.element_depth == 0 {
            self.inner.end_document()?;
            self.document_depth = self.document_depth.saturating_sub(1);
        }
        self.previous_atomic = false;
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        self.flush_pending()?;
        self.pending = Some(PendingTag {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            loc,
            props,
            namespaces: SmallVec::new(),
            attributes: SmallVec::new(),
        });
        self.element_depth += 1;
        self.previous_atomic = false;
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str, props: ReceiverProps) -> Result<(), Error> {
        match &mut self.pending {
            Some(tag) => {
                if !tag.namespaces.iter().any(|(p, _)| p == prefix) {
                    tag.namespaces.push((prefix.to_string(), uri.to_string()));
                }
                Ok(())
            }
            None if self.element_depth > 0 => Err(Error::from_code(
                ErrorCode::XTDE0410,
                format!("namespace node (prefix {prefix:?}) written after child content"),
            )),
            None if self.document_depth > 0 || !self.allow_top_level_attributes => {
                Err(Error::from_code(
                    ErrorCode::XTDE0420,
                    "namespace node not allowed at the top level of a document",
                ))
            }
            None => self.inner.namespace(prefix, uri, props),
        }
    }

    fn attribute(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        value: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        match &mut self.pending {
            Some(tag) => {
                if let Some(existing) = tag.attributes.iter_mut().find(|a| &a.name == name) {
                    if props.contains(ReceiverProps::REJECT_DUPLICATE_ATTRIBUTES) {
                        return Err(Error::from_code(
                            ErrorCode::XQDY0025,
                            format!("duplicate attribute name {name}"),
                        ));
                    }
                    // XSLT: the attribute written last wins
                    existing.type_annotation = type_annotation.cloned();
                    existing.value = value.to_string();
                    existing.loc = loc;
                    existing.props = props;
                } else {
                    tag.attributes.push(PendingAttribute {
                        name: name.clone(),
                        type_annotation: type_annotation.cloned(),
                        value: value.to_string(),
                        loc,
                        props,
                    });
                }
                Ok(())
            }
            None if self.element_depth > 0 => Err(Error::from_code(
                ErrorCode::XTDE0410,
                format!("attribute {name} written after child content"),
            )),
            None if self.document_depth > 0 || !self.allow_top_level_attributes => {
                Err(Error::from_code(
                    ErrorCode::XTDE0420,
                    format!("attribute {name} not allowed at the top level of a document"),
                ))
            }
            None => self.inner.attribute(name, type_annotation, value, loc, props),
        }
    }

    fn end_element(&mut self) -> Result<(), Error> {
        self.flush_pending()?;
        self.element_depth = self.element_depth.saturating_sub(1);
        self.previous_atomic = false;
        self.inner.end_element()
    }

    fn characters(
        &mut self,
        value: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }
        self.flush_pending()?;
        self.previous_atomic = false;
        self.inner.characters(value, loc, props)
    }

    fn comment(&mut self, value: &str, loc: LocationId, props: ReceiverProps) -> Result<(), Error> {
        self.flush_pending()?;
        self.previous_atomic = false;
        self.inner.comment(value, loc, props)
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        self.flush_pending()?;
        self.previous_atomic = false;
        self.inner.processing_instruction(target, data, loc, props)
    }

    fn append(&mut self, item: &Item<N>, loc: LocationId) -> Result<(), Error> {
        match item {
            Item::Node(n) => {
                self.previous_atomic = false;
                copy_node_events(n, self, true, true, loc)
            }
            Item::Atomic(a) => {
                // Adjacent atomic values are separated by a single space
                if self.previous_atomic {
                    self.characters(" ", loc, ReceiverProps::NONE)?;
                }
                self.characters(&a.string_value(), loc, ReceiverProps::NONE)?;
                self.previous_atomic = true;
                Ok(())
            }
        }
    }
}
