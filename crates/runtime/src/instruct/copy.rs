//! Deep copy of existing items (`copy-of`).

use crate::context::{Context, ValidationMode};
use crate::error::Error;
use crate::location::LocationId;
use crate::model::{NodeKind, XdmNode};
use crate::xdm::Item;

use super::element::validate_element;
use super::Expression;
use crate::event::copy_node_events;

#[derive(Debug, Clone, PartialEq)]
pub struct CopyOf {
    pub select: Expression,
    /// Whether in-scope namespace declarations travel with copied elements.
    pub copy_namespaces: bool,
    pub validation: ValidationMode,
    pub loc: LocationId,
}

impl CopyOf {
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let preserve = matches!(self.validation, ValidationMode::Preserve);
        let mut iter = self.select.iterate(ctx)?;
        while let Some(item) = iter.next_item()? {
            match &item {
                Item::Node(node) => {
                    if self.validation.requires_validator()
                        && matches!(node.kind(), NodeKind::Element | NodeKind::Document)
                    {
                        self.copy_validated(node, ctx)?;
                    } else {
                        ctx.emit(|out| {
                            copy_node_events(node, out, self.copy_namespaces, preserve, self.loc)
                        })?;
                    }
                }
                Item::Atomic(_) => ctx.emit(|out| out.append(&item, self.loc))?,
            }
        }
        Ok(())
    }

    /// Copy an element through the validator: the copy carries the type
    /// annotation the validator derives instead of the original's. A
    /// document node validates through its document element.
    fn copy_validated<N: XdmNode>(&self, node: &N, ctx: &mut Context<N>) -> Result<(), Error> {
        if node.kind() == NodeKind::Document {
            ctx.emit(|out| out.start_document(crate::event::ReceiverProps::NONE))?;
            for child in node.children() {
                if child.kind() == NodeKind::Element {
                    self.copy_validated(&child, ctx)?;
                } else {
                    ctx.emit(|out| {
                        copy_node_events(&child, out, self.copy_namespaces, false, self.loc)
                    })?;
                }
            }
            return ctx.emit(|out| out.end_document());
        }
        let name = node.name().expect("element has a name");
        let annotation =
            validate_element(ctx, &name, &node.string_value(), &self.validation)?;
        ctx.emit(|out| {
            out.start_element(
                &name,
                annotation.as_ref(),
                self.loc,
                crate::event::ReceiverProps::NONE,
            )?;
            if self.copy_namespaces {
                for (prefix, uri) in node.namespace_declarations() {
                    out.namespace(&prefix, &uri, crate::event::ReceiverProps::NONE)?;
                }
            }
            for attr in node.attributes() {
                let aname = attr.name().expect("attribute has a name");
                out.attribute(
                    &aname,
                    None,
                    &attr.string_value(),
                    self.loc,
                    crate::event::ReceiverProps::NONE,
                )?;
            }
            for child in node.children() {
                copy_node_events(&child, out, self.copy_namespaces, false, self.loc)?;
            }
            out.end_element()
        })
    }
}
