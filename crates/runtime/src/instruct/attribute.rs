//! Attribute construction.

use crate::consts::XML_URI;
use crate::context::{Context, HostLanguage, ValidationMode};
use crate::error::{Error, ErrorCode};
use crate::event::ReceiverProps;
use crate::location::LocationId;
use crate::model::{QName, XdmNode};
use crate::xdm::{BoxIter, Item, OnceIter};

use super::element::check_attribute_name;
use super::{Expression, NameSource, atomized_join};

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeCtor {
    pub name: NameSource,
    /// Value content; atomized and joined with a single space.
    pub select: Expression,
    pub validation: ValidationMode,
    pub loc: LocationId,
}

impl AttributeCtor {
    fn evaluate<N: XdmNode>(
        &self,
        ctx: &Context<N>,
    ) -> Result<(QName, String, Option<QName>), Error> {
        let name = self.name.resolve(ctx, ErrorCode::XTDE0850)?;
        check_attribute_name(&name).map_err(|e| e.with_location(ctx.origin_location()))?;

        let seq = self.select.evaluate_sequence(ctx)?;
        let mut value = atomized_join(&seq, " ");

        // xml:id values are whitespace-collapsed on construction
        if name.ns_uri_str() == Some(XML_URI) && &*name.local == "id" {
            value = collapse_whitespace(&value);
        }

        let annotation = if self.validation.requires_validator() {
            let validator = ctx.controller().validator().ok_or_else(|| {
                Error::from_code(
                    self.validation.failure_code(),
                    format!(
                        "validation requested for attribute {name} but no schema validator is configured"
                    ),
                )
                .with_location(ctx.origin_location())
            })?;
            validator
                .validate_attribute(&name, &value, &self.validation)
                .map_err(|failure| {
                    Error::from_code(
                        self.validation.failure_code(),
                        format!("attribute {name} failed validation: {}", failure.message),
                    )
                    .with_location(ctx.origin_location())
                })?
        } else {
            None
        };
        Ok((name, value, annotation))
    }

    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let (name, value, annotation) = self.evaluate(ctx)?;
        let props = if ctx.controller().host_language() == HostLanguage::Xquery {
            ReceiverProps::REJECT_DUPLICATE_ATTRIBUTES
        } else {
            ReceiverProps::NONE
        };
        ctx.emit(|out| out.attribute(&name, annotation.as_ref(), &value, self.loc, props))
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        let (name, value, annotation) = self.evaluate(ctx)?;
        let node = ctx
            .controller()
            .tree_model()
            .make_attribute(&name, &value, annotation.as_ref());
        Ok(Box::new(OnceIter(Some(Item::Node(node)))))
    }
}

/// XML whitespace collapse: leading and trailing whitespace removed,
/// internal runs replaced by a single space.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
