//! `call-template`: invocation of a named template.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::location::LocationId;
use crate::model::{QName, XdmNode, parse_lexical_qname};
use crate::xdm::AtomicValue;

use super::tail::{TailCall, TemplateCall};
use super::template::{Template, WithParam, assemble_params, assemble_tunnel_params};
use super::{Expression, singleton_atomic};

/// The call target: bound at compile time, or a name computed at run time
/// and looked up in the executable's named-template table.
#[derive(Debug, Clone)]
pub enum CallTarget {
    Fixed(Arc<Template>),
    Computed(Box<Expression>),
}

impl PartialEq for CallTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CallTarget::Fixed(a), CallTarget::Fixed(b)) => Arc::ptr_eq(a, b),
            (CallTarget::Computed(a), CallTarget::Computed(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallTemplate {
    pub target: CallTarget,
    pub params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub loc: LocationId,
}

impl CallTemplate {
    fn resolve_target<N: XdmNode>(&self, ctx: &Context<N>) -> Result<Arc<Template>, Error> {
        match &self.target {
            CallTarget::Fixed(t) => Ok(Arc::clone(t)),
            CallTarget::Computed(name_expr) => {
                let value = singleton_atomic(name_expr, ctx)?.ok_or_else(|| {
                    Error::from_code(
                        ErrorCode::XTDE0040,
                        "computed template name is an empty sequence",
                    )
                    .with_location(ctx.origin_location())
                })?;
                let name = match value {
                    AtomicValue::QName(q) => q,
                    other => {
                        let lexical = other.string_value();
                        let (prefix, local) =
                            parse_lexical_qname(&lexical).ok_or_else(|| {
                                Error::from_code(
                                    ErrorCode::XTDE0040,
                                    format!("invalid template name {lexical:?}"),
                                )
                                .with_location(ctx.origin_location())
                            })?;
                        // Computed names resolve in no namespace; a prefixed
                        // name cannot be resolved without a static context
                        if prefix.is_some() {
                            return Err(Error::from_code(
                                ErrorCode::XTDE0040,
                                format!("cannot resolve prefixed template name {lexical:?}"),
                            )
                            .with_location(ctx.origin_location()));
                        }
                        QName::local(local)
                    }
                };
                ctx.controller()
                    .executable()
                    .named_template(&name)
                    .cloned()
                    .ok_or_else(|| {
                        Error::from_code(
                            ErrorCode::XTDE0040,
                            format!("no template named {name}"),
                        )
                        .with_location(ctx.origin_location())
                    })
            }
        }
    }

    /// Prepare the callee's context and hand the invocation to the
    /// trampoline as a package.
    pub fn process_leaving_tail<N: XdmNode>(
        &self,
        ctx: &mut Context<N>,
    ) -> Result<Option<TailCall<N>>, Error> {
        ctx.set_origin(self.loc);
        let template = self.resolve_target(ctx)?;
        let params = assemble_params(&self.params, ctx)?;
        let tunnel = assemble_tunnel_params(&self.tunnel_params, ctx)?;
        let mut callee = ctx.new_major(template.slots);
        callee.set_local_params(params);
        callee.set_tunnel_params(tunnel);
        Ok(Some(TailCall::Template(TemplateCall {
            template,
            context: callee,
        })))
    }
}
