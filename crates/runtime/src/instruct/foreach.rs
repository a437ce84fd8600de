//! Focus-mapping iteration (`for-each`).

use crate::context::Context;
use crate::error::Error;
use crate::location::LocationId;
use crate::model::XdmNode;
use crate::xdm::{BoxIter, Item, Sequence, SequenceIter};

use super::Expression;

/// Evaluates the body once per item of the input sequence, with the focus
/// set to (item, position, size). The input is materialized up front so the
/// focus size is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    pub select: Expression,
    pub body: Expression,
    pub loc: LocationId,
}

impl ForEach {
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let items = self.select.evaluate_sequence(ctx)?;
        let size = items.len();
        let mut inner = ctx.new_minor();
        for (i, item) in items.into_iter().enumerate() {
            inner.set_focus(item, i + 1, size);
            self.body.process(&mut inner)?;
        }
        Ok(())
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        let items = self.select.evaluate_sequence(ctx)?;
        Ok(Box::new(ForEachIterator {
            body: &self.body,
            size: items.len(),
            items: items.into_iter(),
            position: 0,
            ctx: ctx.new_minor(),
            current: None,
        }))
    }
}

struct ForEachIterator<'a, N: XdmNode> {
    body: &'a Expression,
    items: std::vec::IntoIter<Item<N>>,
    position: usize,
    size: usize,
    ctx: Context<N>,
    current: Option<BoxIter<'a, N>>,
}

impl<N: XdmNode> SequenceIter<N> for ForEachIterator<'_, N> {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error> {
        loop {
            if let Some(current) = &mut self.current {
                if let Some(item) = current.next_item()? {
                    return Ok(Some(item));
                }
                self.current = None;
            }
            let Some(item) = self.items.next() else {
                return Ok(None);
            };
            self.position += 1;
            self.ctx.set_focus(item, self.position, self.size);
            self.current = Some(self.body.iterate(&self.ctx)?);
        }
    }
}

/// Materialize a selection while giving each evaluation of `f` the focus
/// over the selection; shared by grouping and sorting code that needs a
/// per-item key.
pub(crate) fn with_item_focus<N: XdmNode, T>(
    items: &Sequence<N>,
    ctx: &Context<N>,
    mut f: impl FnMut(&Context<N>) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    let size = items.len();
    let mut inner = ctx.new_minor();
    let mut out = Vec::with_capacity(size);
    for (i, item) in items.iter().enumerate() {
        inner.set_focus(item.clone(), i + 1, size);
        out.push(f(&inner)?);
    }
    Ok(out)
}
