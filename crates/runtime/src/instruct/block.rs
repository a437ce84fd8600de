//! Sequence blocks and conditional choice.

use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{AtomicValue, BoxIter, EmptyIter, Item, SequenceIter};

use super::{Expression, TailCall};

/// Normalizing constructor for a block: nested blocks are flattened,
/// adjacent literal text constructors merge into one, and a single-child
/// block collapses to its child. Applying it twice yields the same tree as
/// applying it once.
///
/// A block whose children mix updating and non-updating expressions is
/// rejected; a block of all-updating or all-non-updating children is fine.
pub fn make_block(children: Vec<Expression>) -> Result<Expression, Error> {
    let mut flat = Vec::with_capacity(children.len());
    flatten_into(children, &mut flat);
    let mut flat = merge_literal_text(flat);
    let updating = flat.iter().filter(|c| c.is_updating()).count();
    if updating != 0 && updating != flat.len() {
        return Err(Error::from_code(
            ErrorCode::XUST0001,
            "a sequence may not mix updating and non-updating expressions",
        ));
    }
    match flat.len() {
        1 => Ok(flat.pop().expect("one child")),
        _ => Ok(Expression::Block(flat)),
    }
}

fn flatten_into(children: Vec<Expression>, out: &mut Vec<Expression>) {
    for child in children {
        match child {
            Expression::Block(nested) => flatten_into(nested, out),
            other => out.push(other),
        }
    }
}

/// Consecutive text constructors whose select is a literal string combine
/// into one constructor carrying the concatenated string. The combined
/// constructor emits exactly the characters the originals would have,
/// because adjacent text is a single text node in the result.
fn merge_literal_text(children: Vec<Expression>) -> Vec<Expression> {
    let mut out: Vec<Expression> = Vec::with_capacity(children.len());
    for child in children {
        if let Some(next) = literal_text(&child) {
            if let Some(Expression::ValueOf(prev)) = out.last_mut() {
                if let Expression::Literal(AtomicValue::String(acc)) = &mut prev.select {
                    acc.push_str(next);
                    continue;
                }
            }
        }
        out.push(child);
    }
    out
}

fn literal_text(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::ValueOf(v) => match &v.select {
            Expression::Literal(AtomicValue::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

/// Push a block: every child except the last is driven to completion; only
/// the last child may leave a tail call for the enclosing driver.
pub fn process_block<N: XdmNode>(
    children: &[Expression],
    ctx: &mut Context<N>,
) -> Result<Option<TailCall<N>>, Error> {
    let Some((last, init)) = children.split_last() else {
        return Ok(None);
    };
    for child in init {
        child.process(ctx)?;
    }
    last.process_leaving_tail(ctx)
}

/// Pull iterator over a block: children are iterated in order, each one
/// opened only when the previous is exhausted.
pub struct BlockIterator<'a, N: XdmNode> {
    children: &'a [Expression],
    index: usize,
    ctx: Context<N>,
    current: Option<BoxIter<'a, N>>,
}

impl<'a, N: XdmNode> BlockIterator<'a, N> {
    pub fn new(children: &'a [Expression], ctx: Context<N>) -> Self {
        Self {
            children,
            index: 0,
            ctx,
            current: None,
        }
    }
}

impl<N: XdmNode> SequenceIter<N> for BlockIterator<'_, N> {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error> {
        loop {
            if let Some(current) = &mut self.current {
                if let Some(item) = current.next_item()? {
                    return Ok(Some(item));
                }
                self.current = None;
            }
            let Some(child) = self.children.get(self.index) else {
                return Ok(None);
            };
            self.index += 1;
            self.current = Some(child.iterate(&self.ctx)?);
        }
    }
}

/// A chain of (condition, action) branches. An `otherwise` branch is a
/// final pair whose condition is the literal `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Choose {
    pub branches: Vec<(Expression, Expression)>,
}

impl Choose {
    pub fn new(branches: Vec<(Expression, Expression)>) -> Self {
        Self { branches }
    }

    fn chosen<N: XdmNode>(&self, ctx: &Context<N>) -> Result<Option<&Expression>, Error> {
        for (condition, action) in &self.branches {
            if condition.effective_boolean(ctx)? {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    /// The chosen branch is evaluated in tail position.
    pub fn process_leaving_tail<N: XdmNode>(
        &self,
        ctx: &mut Context<N>,
    ) -> Result<Option<TailCall<N>>, Error> {
        match self.chosen(ctx)? {
            Some(action) => action.process_leaving_tail(ctx),
            None => Ok(None),
        }
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        match self.chosen(ctx)? {
            Some(action) => action.iterate(ctx),
            None => Ok(Box::new(EmptyIter)),
        }
    }
}
