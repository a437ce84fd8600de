//! `apply-templates`: per-item rule dispatch.
//!
//! The instruction itself only prepares the packaged work (materialized
//! selection, resolved mode, evaluated parameters) and hands it to the
//! trampoline; [`apply_to_items`] does the dispatch. Items before the last
//! drive their tail chains locally; the last item's tail call escapes to
//! the enclosing driver, so a rule whose last action is another
//! apply-templates recurses in constant stack.

use crate::context::Context;
use crate::error::Error;
use crate::location::LocationId;
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::Item;

use super::tail::{ApplyCall, TailCall, TemplateCall, drive};
use super::template::{WithParam, assemble_params, assemble_tunnel_params};

/// Mode selector: the unnamed default mode, a named mode, or the mode the
/// calling rule was invoked in.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeTarget {
    Unnamed,
    Named(QName),
    Current,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyTemplates {
    pub select: super::Expression,
    pub mode: ModeTarget,
    pub params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub loc: LocationId,
}

impl ApplyTemplates {
    pub fn process_leaving_tail<N: XdmNode>(
        &self,
        ctx: &mut Context<N>,
    ) -> Result<Option<TailCall<N>>, Error> {
        ctx.set_origin(self.loc);
        let mode = match &self.mode {
            ModeTarget::Unnamed => None,
            ModeTarget::Named(name) => Some(name.clone()),
            ModeTarget::Current => ctx.current_mode().cloned(),
        };
        let items = self.select.evaluate_sequence(ctx)?;
        if items.is_empty() {
            return Ok(None);
        }
        let params = assemble_params(&self.params, ctx)?;
        let tunnel = assemble_tunnel_params(&self.tunnel_params, ctx)?;
        let mut context = ctx.new_minor();
        context.set_local_params(params);
        context.set_tunnel_params(tunnel);
        Ok(Some(TailCall::Apply(ApplyCall {
            items,
            mode,
            context,
        })))
    }
}

/// Dispatch one rule per item. Returns the last item's tail call for the
/// driving loop.
pub(crate) fn apply_to_items<N: XdmNode>(
    items: crate::xdm::Sequence<N>,
    mode: Option<QName>,
    ctx: &mut Context<N>,
) -> Result<Option<TailCall<N>>, Error> {
    let size = items.len();
    let last = size.saturating_sub(1);
    let mut pending: Option<TailCall<N>> = None;
    for (i, item) in items.into_iter().enumerate() {
        let mut inner = ctx.new_minor();
        inner.set_focus(item.clone(), i + 1, size);
        inner.set_current_mode(mode.clone());

        let rule = match inner.controller().rules() {
            Some(rules) => rules.match_item(&item, mode.as_ref(), inner.controller())?,
            None => None,
        };
        let tail = match rule {
            Some(template) => {
                let trace = inner.controller().trace_listener().cloned();
                if let Some(listener) = &trace {
                    listener.start_current_item(&item);
                }
                let mut callee = inner.new_major(template.slots);
                // The last item's call is deferred to the enclosing driver;
                // tracing needs the invocation bracketed, so it disables
                // the deferral
                let tail = if i == last && trace.is_none() {
                    Some(TailCall::Template(TemplateCall {
                        template,
                        context: callee,
                    }))
                } else {
                    callee.rebase_depth(ctx.depth() + 1)?;
                    if let Some(tc) = template.expand(&mut callee)? {
                        drive(tc, ctx.depth() + 1)?;
                    }
                    None
                };
                if let Some(listener) = &trace {
                    listener.end_current_item(&item);
                }
                tail
            }
            None => {
                builtin_rule(&item, mode.as_ref(), &mut inner)?;
                None
            }
        };
        pending = tail;
    }
    Ok(pending)
}

/// The built-in rules used when no rule matches: documents and elements
/// apply-templates to their children in the same mode, text and attribute
/// nodes emit their string value, comments and processing instructions
/// produce nothing, and atomic values are appended as-is.
fn builtin_rule<N: XdmNode>(
    item: &Item<N>,
    mode: Option<&QName>,
    ctx: &mut Context<N>,
) -> Result<(), Error> {
    match item {
        Item::Node(node) => match node.kind() {
            NodeKind::Document | NodeKind::Element => {
                let children: crate::xdm::Sequence<N> =
                    node.children().into_iter().map(Item::Node).collect();
                if children.is_empty() {
                    return Ok(());
                }
                let mut inner = ctx.new_minor();
                inner.enter_nested_call()?;
                if let Some(tc) = apply_to_items(children, mode.cloned(), &mut inner)? {
                    drive(tc, inner.depth())?;
                }
                Ok(())
            }
            NodeKind::Text | NodeKind::Attribute => {
                let value = node.string_value();
                ctx.emit(|out| out.characters(&value, LocationId::NONE, Default::default()))
            }
            NodeKind::Comment | NodeKind::ProcessingInstruction => Ok(()),
        },
        Item::Atomic(_) => ctx.emit(|out| out.append(item, LocationId::NONE)),
    }
}
