//! Templates and their parameter machinery.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::location::LocationId;
use crate::model::{QName, XdmNode};
use crate::param::{ParamId, ParameterSet};

use super::{Expression, TailCall};

/// An actual parameter of `apply-templates`/`call-template`, evaluated in
/// the caller's context.
#[derive(Debug, Clone, PartialEq)]
pub struct WithParam {
    pub id: ParamId,
    pub name: QName,
    pub select: Expression,
}

/// A formal parameter declared by a template.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalParamDef {
    pub id: ParamId,
    pub name: QName,
    /// Frame slot the bound value lands in.
    pub slot: usize,
    pub required: bool,
    pub tunnel: bool,
    /// Default value, evaluated in the callee when no value was supplied.
    pub default: Option<Expression>,
}

/// A compiled template: a body plus formal parameters and the size of the
/// local frame its body needs.
#[derive(Debug, PartialEq)]
pub struct Template {
    /// Present for named templates; match-only rules have no name.
    pub name: Option<QName>,
    pub params: Vec<LocalParamDef>,
    /// Local slots the body uses, parameters included.
    pub slots: usize,
    pub body: Expression,
    pub loc: LocationId,
}

impl Template {
    /// Bind formal parameters from the context's parameter sets and run the
    /// body, passing any tail call back to the driving loop. The context
    /// must be a major context owning a fresh frame.
    pub fn expand<N: XdmNode>(
        self: &Arc<Self>,
        ctx: &mut Context<N>,
    ) -> Result<Option<TailCall<N>>, Error> {
        ctx.set_origin(self.loc);
        if let Some(name) = &self.name {
            tracing::trace!(template = %name, "expanding template");
        }
        for param in &self.params {
            let supplied = if param.tunnel {
                ctx.tunnel_params().get(param.id).cloned()
            } else {
                ctx.local_params().get(param.id).cloned()
            };
            match supplied {
                Some(value) => ctx.set_local_variable(param.slot, value),
                None => match &param.default {
                    Some(default) => {
                        let value = default.evaluate_sequence(ctx)?;
                        ctx.set_local_variable(param.slot, value);
                    }
                    None if param.required => {
                        return Err(Error::from_code(
                            ErrorCode::XTDE0700,
                            format!("no value supplied for required parameter ${}", param.name),
                        )
                        .with_location(ctx.origin_location()));
                    }
                    None => ctx.set_local_variable(param.slot, Vec::new()),
                },
            }
        }
        let tail = self.body.process_leaving_tail(ctx)?;
        if tail.is_some() {
            // The frame is dead once the tail call escapes this body
            ctx.clear_frame();
        }
        Ok(tail)
    }
}

/// Evaluate a caller's `with-param` list into a parameter set.
pub(crate) fn assemble_params<N: XdmNode>(
    params: &[WithParam],
    ctx: &Context<N>,
) -> Result<Arc<ParameterSet<N>>, Error> {
    if params.is_empty() {
        return Ok(ParameterSet::empty());
    }
    let mut set = ParameterSet::new();
    for p in params {
        let value = p.select.evaluate_sequence(ctx)?;
        set.put(p.id, value, false);
    }
    Ok(Arc::new(set))
}

/// Tunnel parameters accumulate: the callee sees the caller's tunnel set
/// with this call's additions layered on top.
pub(crate) fn assemble_tunnel_params<N: XdmNode>(
    additions: &[WithParam],
    ctx: &Context<N>,
) -> Result<Arc<ParameterSet<N>>, Error> {
    if additions.is_empty() {
        return Ok(Arc::clone(ctx.tunnel_params()));
    }
    let mut set = ParameterSet::new();
    for (id, value, checked) in ctx.tunnel_params().iter() {
        set.put(id, value.clone(), checked);
    }
    for p in additions {
        let value = p.select.evaluate_sequence(ctx)?;
        set.put(p.id, value, false);
    }
    Ok(Arc::new(set))
}
