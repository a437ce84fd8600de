//! Document node construction.

use crate::context::{Context, ValidationMode};
use crate::error::{Error, ErrorCode};
use crate::event::ReceiverProps;
use crate::location::LocationId;
use crate::model::XdmNode;
use crate::xdm::{BoxIter, DeferredIter, Item, Sequence, VecIter};

use super::element::lazy_eligible;
use super::{Expression, collect_events};

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentCtor {
    pub content: Expression,
    pub validation: ValidationMode,
    pub loc: LocationId,
}

impl DocumentCtor {
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        ctx.emit(|out| out.start_document(ReceiverProps::NONE))?;
        let mut inner = ctx.new_minor();
        self.content.process(&mut inner)?;
        ctx.emit(|out| out.end_document())
    }

    fn pull<N: XdmNode>(&self, ctx: &Context<N>) -> Result<Sequence<N>, Error> {
        let items = collect_events(ctx, |c| {
            c.emit(|out| out.start_document(ReceiverProps::NONE))?;
            let mut inner = c.new_minor();
            self.content.process(&mut inner)?;
            c.emit(|out| out.end_document())
        })?;
        match items.as_slice() {
            [Item::Node(_)] => Ok(items),
            _ => Err(Error::from_code(
                ErrorCode::Unknown,
                "document constructor did not produce a single node",
            )),
        }
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        if lazy_eligible(ctx, &self.content, &self.validation) {
            let deferred = ctx.new_minor();
            Ok(Box::new(DeferredIter::new(move || {
                Ok(Box::new(VecIter::new(self.pull(&deferred)?)) as BoxIter<'a, N>)
            })))
        } else {
            Ok(Box::new(VecIter::new(self.pull(ctx)?)))
        }
    }
}
