//! The tail-call trampoline.
//!
//! A template-invoking instruction in tail position does not invoke its
//! target natively. It prepares the callee's context (fresh frame, bound
//! parameters) and returns a [`TailCall`] package; the nearest driving loop
//! steps packages until one returns `None`. A chain of a million tail calls
//! therefore consumes constant native stack.

use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::model::{QName, XdmNode};
use crate::xdm::Sequence;

use super::apply;
use super::template::Template;

/// A deferred invocation of one template body.
pub struct TemplateCall<N: XdmNode> {
    pub template: Arc<Template>,
    pub context: Context<N>,
}

/// A deferred apply-templates over a materialized sequence. Parameters
/// travel inside the packaged context.
pub struct ApplyCall<N: XdmNode> {
    pub items: Sequence<N>,
    pub mode: Option<QName>,
    pub context: Context<N>,
}

/// One step of deferred work handed back by `process_leaving_tail`.
pub enum TailCall<N: XdmNode> {
    Template(TemplateCall<N>),
    Apply(ApplyCall<N>),
}

impl<N: XdmNode> TailCall<N> {
    /// Run this package at the given native depth, returning the next
    /// package if its body ended in another tail call.
    fn step(self, depth: usize) -> Result<Option<TailCall<N>>, Error> {
        match self {
            TailCall::Template(mut call) => {
                call.context.rebase_depth(depth)?;
                call.template.expand(&mut call.context)
            }
            TailCall::Apply(mut call) => {
                call.context.rebase_depth(depth)?;
                apply::apply_to_items(call.items, call.mode, &mut call.context)
            }
        }
    }
}

/// Drive a chain of tail calls to completion. Every package in the chain
/// runs at the same native depth, so only the caller that entered the loop
/// occupies stack.
pub fn drive<N: XdmNode>(first: TailCall<N>, depth: usize) -> Result<(), Error> {
    let mut steps = 0usize;
    let mut next = Some(first);
    while let Some(call) = next.take() {
        steps += 1;
        next = call.step(depth)?;
    }
    tracing::debug!(steps, depth, "tail-call chain drained");
    Ok(())
}
