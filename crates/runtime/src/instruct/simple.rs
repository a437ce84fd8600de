//! Text-valued constructors: `value-of`, comments and processing
//! instructions.

use crate::context::{Context, HostLanguage};
use crate::error::{Error, ErrorCode};
use crate::event::ReceiverProps;
use crate::location::LocationId;
use crate::model::{XdmNode, is_valid_ncname};
use crate::xdm::{BoxIter, Item, OnceIter};

use super::{Expression, atomized_join, singleton_atomic};

/// Emits the atomized string value of its select expression as a text node.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueOf {
    pub select: Expression,
    pub separator: String,
    pub loc: LocationId,
}

impl ValueOf {
    fn value<N: XdmNode>(&self, ctx: &Context<N>) -> Result<String, Error> {
        let seq = self.select.evaluate_sequence(ctx)?;
        Ok(atomized_join(&seq, &self.separator))
    }

    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let value = self.value(ctx)?;
        ctx.emit(|out| out.characters(&value, self.loc, ReceiverProps::NONE))
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        let value = self.value(ctx)?;
        let node = ctx.controller().tree_model().make_text(&value);
        Ok(Box::new(OnceIter(Some(Item::Node(node)))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentCtor {
    pub select: Expression,
    pub loc: LocationId,
}

impl CommentCtor {
    fn value<N: XdmNode>(&self, ctx: &Context<N>) -> Result<String, Error> {
        let seq = self.select.evaluate_sequence(ctx)?;
        let content = atomized_join(&seq, "");
        match ctx.controller().host_language() {
            HostLanguage::Xslt => Ok(repair_comment(&content)),
            HostLanguage::Xquery => {
                if content.contains("--") || content.ends_with('-') {
                    Err(Error::from_code(
                        ErrorCode::XQDY0072,
                        "comment content contains \"--\" or ends with \"-\"",
                    )
                    .with_location(ctx.origin_location()))
                } else {
                    Ok(content)
                }
            }
        }
    }

    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let value = self.value(ctx)?;
        ctx.emit(|out| out.comment(&value, self.loc, ReceiverProps::NONE))
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        let value = self.value(ctx)?;
        let node = ctx.controller().tree_model().make_comment(&value);
        Ok(Box::new(OnceIter(Some(Item::Node(node)))))
    }
}

/// Make comment content well-formed: every "--" becomes "- -" and a
/// trailing "-" gets a space after it. Well-formed content passes through
/// unchanged, so repairing twice equals repairing once.
pub(crate) fn repair_comment(content: &str) -> String {
    let mut repaired = content.to_string();
    while repaired.contains("--") {
        repaired = repaired.replace("--", "- -");
    }
    if repaired.ends_with('-') {
        repaired.push(' ');
    }
    repaired
}

/// A processing instruction target: a fixed NCName or a computed one.
#[derive(Debug, Clone, PartialEq)]
pub enum PiTarget {
    Fixed(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PiCtor {
    pub target: PiTarget,
    pub select: Expression,
    pub loc: LocationId,
}

impl PiCtor {
    fn evaluate<N: XdmNode>(&self, ctx: &Context<N>) -> Result<(String, String), Error> {
        let target = match &self.target {
            PiTarget::Fixed(t) => t.clone(),
            PiTarget::Computed(expr) => singleton_atomic(expr, ctx)?
                .map(|a| a.string_value())
                .unwrap_or_default(),
        };
        if !is_valid_ncname(&target) || target.eq_ignore_ascii_case("xml") {
            return Err(Error::from_code(
                ErrorCode::XTDE0890,
                format!("invalid processing instruction target {target:?}"),
            )
            .with_location(ctx.origin_location()));
        }

        let seq = self.select.evaluate_sequence(ctx)?;
        let content = atomized_join(&seq, " ");
        // Leading whitespace is not part of PI data
        let content = content.trim_start().to_string();
        let data = match ctx.controller().host_language() {
            HostLanguage::Xslt => {
                let mut repaired = content;
                while repaired.contains("?>") {
                    repaired = repaired.replace("?>", "? >");
                }
                repaired
            }
            HostLanguage::Xquery => {
                if content.contains("?>") {
                    return Err(Error::from_code(
                        ErrorCode::XQDY0026,
                        "processing instruction data contains \"?>\"",
                    )
                    .with_location(ctx.origin_location()));
                }
                content
            }
        };
        Ok((target, data))
    }

    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let (target, data) = self.evaluate(ctx)?;
        ctx.emit(|out| out.processing_instruction(&target, &data, self.loc, ReceiverProps::NONE))
    }

    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        let (target, data) = self.evaluate(ctx)?;
        let node = ctx.controller().tree_model().make_pi(&target, &data);
        Ok(Box::new(OnceIter(Some(Item::Node(node)))))
    }
}
