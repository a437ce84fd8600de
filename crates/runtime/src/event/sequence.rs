//! Materializes push-mode output as a sequence of items.
//!
//! Push-only instructions are pulled from by processing them into a
//! `SequenceCollector`: top-level events become free-standing nodes (built
//! through the tree model), `append` passes items through unchanged, and
//! element/document events open a nested tree build.

use std::sync::Arc;

use crate::error::{Error, ErrorCode};
use crate::location::LocationId;
use crate::model::{QName, XdmNode};
use crate::tree::{TreeBuilder, TreeModel};
use crate::xdm::{Item, Sequence};

use super::{Receiver, ReceiverProps};

pub struct SequenceCollector<N: XdmNode> {
    model: Arc<dyn TreeModel<N>>,
    items: Sequence<N>,
    pending_text: String,
    builder: Option<Box<dyn TreeBuilder<N>>>,
    depth: usize,
}

impl<N: XdmNode> SequenceCollector<N> {
    pub fn new(model: Arc<dyn TreeModel<N>>) -> Self {
        Self {
            model,
            items: Vec::new(),
            pending_text: String::new(),
            builder: None,
            depth: 0,
        }
    }

    fn flush_text(&mut self) {
        if !self.pending_text.is_empty() {
            let text = std::mem::take(&mut self.pending_text);
            self.items.push(Item::Node(self.model.make_text(&text)));
        }
    }

    fn close_builder_if_done(&mut self) -> Result<(), Error> {
        if self.depth == 0 {
            if let Some(mut b) = self.builder.take() {
                self.items.push(Item::Node(b.take_root()?));
            }
        }
        Ok(())
    }

    /// The collected sequence. Errors if an element or document is still
    /// open.
    pub fn take_items(&mut self) -> Result<Sequence<N>, Error> {
        if self.builder.is_some() || self.depth != 0 {
            return Err(Error::from_code(
                ErrorCode::Unknown,
                "sequence collector closed with unfinished content",
            ));
        }
        self.flush_text();
        Ok(std::mem::take(&mut self.items))
    }
}

impl<N: XdmNode> Receiver<N> for SequenceCollector<N> {
    fn start_document(&mut self, props: ReceiverProps) -> Result<(), Error> {
        self.flush_text();
        if self.builder.is_none() {
            self.builder = Some(self.model.make_builder());
        }
        self.depth += 1;
        self.builder
            .as_mut()
            .expect("builder open")
            .start_document(props)
    }

    fn end_document(&mut self) -> Result<(), Error> {
        self.builder.as_mut().expect("builder open").end_document()?;
        self.depth -= 1;
        self.close_builder_if_done()
    }

    fn start_element(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        self.flush_text();
        if self.builder.is_none() {
            self.builder = Some(self.model.make_builder());
        }
        self.depth += 1;
        self.builder
            .as_mut()
            .expect("builder open")
            .start_element(name, type_annotation, loc, props)
    }

    fn namespace(&mut self, prefix: &str, uri: &str, props: ReceiverProps) -> Result<(), Error> {
        if let Some(b) = self.builder.as_mut() {
            b.namespace(prefix, uri, props)
        } else {
            // Namespace outside any element contributes nothing to a sequence
            Ok(())
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
        match self.builder.as_mut() {
            Some(b) => b.attribute(name, type_annotation, value, loc, props),
            None => {
                // Free-standing attribute node at the top of the sequence
                self.flush_text();
                self.items.push(Item::Node(self.model.make_attribute(
                    name,
                    value,
                    type_annotation,
                )));
                Ok(())
            }
        }
    }

    fn end_element(&mut self) -> Result<(), Error> {
        self.builder.as_mut().expect("builder open").end_element()?;
        self.depth -= 1;
        self.close_builder_if_done()
    }

    fn characters(
        &mut self,
        value: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        match self.builder.as_mut() {
            Some(b) => b.characters(value, loc, props),
            None => {
                // Adjacent top-level text merges into one text node
                self.pending_text.push_str(value);
                Ok(())
            }
        }
    }

    fn comment(&mut self, value: &str, loc: LocationId, props: ReceiverProps) -> Result<(), Error> {
        match self.builder.as_mut() {
            Some(b) => b.comment(value, loc, props),
            None => {
                self.flush_text();
                self.items.push(Item::Node(self.model.make_comment(value)));
                Ok(())
            }
        }
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        loc: LocationId,
        props: ReceiverProps,
    ) -> Result<(), Error> {
        match self.builder.as_mut() {
            Some(b) => b.processing_instruction(target, data, loc, props),
            None => {
                self.flush_text();
                self.items.push(Item::Node(self.model.make_pi(target, data)));
                Ok(())
            }
        }
    }

    fn append(&mut self, item: &Item<N>, loc: LocationId) -> Result<(), Error> {
        match self.builder.as_mut() {
            Some(b) => b.append(item, loc),
            None => {
                self.flush_text();
                self.items.push(item.clone());
                Ok(())
            }
        }
    }
}
