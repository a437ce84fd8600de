//! Secondary result documents (`xsl:result-document`).

use std::sync::Arc;

use crate::context::{Context, ValidationMode};
use crate::error::Error;
use crate::event::{ComplexContentOutputter, Receiver, ReceiverProps, SharedSink};
use crate::location::LocationId;
use crate::model::XdmNode;

use super::{Expression, atomized_join};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultDocument {
    /// Output URI, resolved against the controller's base output URI.
    /// Absent means the principal destination URI ("").
    pub href: Option<Expression>,
    pub validation: ValidationMode,
    pub content: Expression,
    pub loc: LocationId,
}

impl ResultDocument {
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let href = match &self.href {
            Some(expr) => {
                let seq = expr.evaluate_sequence(ctx)?;
                atomized_join(&seq, "")
            }
            None => String::new(),
        };
        let controller = Arc::clone(ctx.controller());
        let uri = controller.resolve_output_uri(&href)?;
        controller
            .check_output_destination(&uri)
            .map_err(|e| e.with_location(ctx.origin_location()))?;
        tracing::debug!(uri = %uri, "opening result document");

        match controller.output_resolver() {
            Some(resolver) => {
                let sink = resolver.open(&uri)?;
                self.write_document(ctx, Box::new(ComplexContentOutputter::new(sink, false)))
            }
            None => {
                // No resolver: build the document as a tree and register it
                // on the controller
                let builder = SharedSink::new(controller.tree_model().make_builder());
                let handle = builder.handle();
                let outputter =
                    ComplexContentOutputter::new(Box::new(builder), false);
                self.write_document(ctx, Box::new(outputter))?;
                let root = handle.0.borrow_mut().take_root()?;
                controller.register_secondary_result(&uri, root);
                Ok(())
            }
        }
    }

    fn write_document<N: XdmNode>(
        &self,
        ctx: &mut Context<N>,
        out: Box<dyn Receiver<N>>,
    ) -> Result<(), Error> {
        let mut inner = ctx.new_minor();
        inner.with_output(out, |c| {
            c.emit(|out| {
                out.open()?;
                out.start_document(ReceiverProps::NONE)
            })?;
            let mut body = c.new_minor();
            self.content.process(&mut body)?;
            c.emit(|out| {
                out.end_document()?;
                out.close()
            })
        })
    }
}
