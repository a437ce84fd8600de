//! `xsl:message`: out-of-band messages and explicit termination.

use crate::context::Context;
use crate::error::Error;
use crate::location::LocationId;
use crate::model::{QName, XdmNode, parse_lexical_qname};
use crate::xdm::AtomicValue;

use super::{Expression, atomized_join, singleton_atomic};

#[derive(Debug, Clone, PartialEq)]
pub struct MessageInstr {
    pub select: Expression,
    /// Effective boolean; absent means "no".
    pub terminate: Option<Expression>,
    /// Error code reported when terminating.
    pub error_code: Option<Expression>,
    pub loc: LocationId,
}

impl MessageInstr {
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let seq = self.select.evaluate_sequence(ctx)?;
        let content = atomized_join(&seq, " ");
        let terminate = match &self.terminate {
            Some(t) => t.effective_boolean(ctx)?,
            None => false,
        };
        ctx.controller().message_emitter().message(&content, terminate);
        if terminate {
            let user_code = self.user_code(ctx)?;
            return Err(Error::termination(content, user_code)
                .with_location(ctx.origin_location()));
        }
        Ok(())
    }

    fn user_code<N: XdmNode>(&self, ctx: &Context<N>) -> Result<Option<QName>, Error> {
        let Some(expr) = &self.error_code else {
            return Ok(None);
        };
        let Some(value) = singleton_atomic(expr, ctx)? else {
            return Ok(None);
        };
        Ok(match value {
            AtomicValue::QName(q) => Some(q),
            other => {
                let lexical = other.string_value();
                parse_lexical_qname(&lexical)
                    .map(|(prefix, local)| QName::new(None, prefix, local))
            }
        })
    }
}
