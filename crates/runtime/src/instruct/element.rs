//! Element construction (literal result elements, `xsl:element`, computed
//! constructors).

use crate::consts::{XML_URI, XSLT_NS};
use crate::context::{Context, HostLanguage, ValidationMode};
use crate::error::{Error, ErrorCode};
use crate::event::{ReceiverProps, copy_node_events};
use crate::location::LocationId;
use crate::model::{QName, XdmNode};
use crate::xdm::{BoxIter, DeferredIter, Item, Sequence, VecIter};

use super::{Expression, NameSource, collect_events};

#[derive(Debug, Clone, PartialEq)]
pub struct ElementCtor {
    pub name: NameSource,
    /// Namespace declarations written on the element at compile time.
    pub namespaces: Vec<(String, String)>,
    pub content: Expression,
    pub inherit_namespaces: bool,
    pub validation: ValidationMode,
    pub loc: LocationId,
}

impl ElementCtor {
    fn element_props<N: XdmNode>(&self, ctx: &Context<N>) -> ReceiverProps {
        let mut props = ReceiverProps::NONE;
        if !self.inherit_namespaces {
            props = props | ReceiverProps::DISINHERIT_NAMESPACES;
        }
        if ctx.controller().host_language() == HostLanguage::Xquery {
            props = props | ReceiverProps::REJECT_DUPLICATE_ATTRIBUTES;
        }
        props
    }

    fn resolve_name<N: XdmNode>(&self, ctx: &Context<N>) -> Result<QName, Error> {
        let name = self.name.resolve(ctx, ErrorCode::XTDE0820)?;
        // The XSLT namespace is not usable for constructed elements
        if name.ns_uri_str() == Some(XSLT_NS) {
            return Err(Error::from_code(
                ErrorCode::XTDE0820,
                format!("constructed element {name} is in the XSLT namespace"),
            )
            .with_location(ctx.origin_location()));
        }
        Ok(name)
    }

    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let name = self.resolve_name(ctx)?;
        let props = self.element_props(ctx);

        if self.validation.requires_validator() {
            return self.process_validated(&name, props, ctx);
        }

        ctx.emit(|out| {
            out.start_element(&name, None, self.loc, props)?;
            for (prefix, uri) in &self.namespaces {
                out.namespace(prefix, uri, ReceiverProps::NONE)?;
            }
            Ok(())
        })?;
        let mut inner = ctx.new_minor();
        self.content.process(&mut inner)?;
        ctx.emit(|out| out.end_element())
    }

    /// Validated construction is two-pass: the element is first built as a
    /// tree, the validator derives its type annotation, and the annotated
    /// element is then replayed into the real output.
    fn process_validated<N: XdmNode>(
        &self,
        name: &QName,
        props: ReceiverProps,
        ctx: &mut Context<N>,
    ) -> Result<(), Error> {
        let node = self.build(name, props, ctx)?;
        let annotation = validate_element(ctx, name, &node.string_value(), &self.validation)?;
        ctx.emit(|out| {
            out.start_element(name, annotation.as_ref(), self.loc, props)?;
            for (prefix, uri) in node.namespace_declarations() {
                out.namespace(&prefix, &uri, ReceiverProps::NONE)?;
            }
            for attr in node.attributes() {
                let aname = attr.name().expect("attribute has a name");
                out.attribute(&aname, None, &attr.string_value(), self.loc, props)?;
            }
            for child in node.children() {
                copy_node_events(&child, out, true, false, self.loc)?;
            }
            out.end_element()
        })
    }

    /// Build this element as a free-standing node.
    fn build<N: XdmNode>(
        &self,
        name: &QName,
        props: ReceiverProps,
        ctx: &Context<N>,
    ) -> Result<N, Error> {
        let mut items = collect_events(ctx, |c| {
            c.emit(|out| {
                out.start_element(name, None, self.loc, props)?;
                for (prefix, uri) in &self.namespaces {
                    out.namespace(prefix, uri, ReceiverProps::NONE)?;
                }
                Ok(())
            })?;
            let mut inner = c.new_minor();
            self.content.process(&mut inner)?;
            c.emit(|out| out.end_element())
        })?;
        match items.pop() {
            Some(Item::Node(n)) if items.is_empty() => Ok(n),
            _ => Err(Error::from_code(
                ErrorCode::Unknown,
                "element constructor did not produce a single node",
            )),
        }
    }

    fn pull<N: XdmNode>(&self, ctx: &Context<N>) -> Result<Sequence<N>, Error> {
        let name = self.resolve_name(ctx)?;
        let props = self.element_props(ctx);
        if self.validation.requires_validator() {
            // Route through the validated push path so the annotation lands
            // on the constructed node
            return collect_events(ctx, |c| self.process_validated(&name, props, c));
        }
        Ok(vec![Item::Node(self.build(&name, props, ctx)?)])
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

/// Whether a constructor may defer building until the item is first
/// demanded. Local variable slots are shared with the enclosing frame and
/// may be cleared by a tail call before the demand arrives, so a body that
/// reads them is built eagerly.
pub(super) fn lazy_eligible<N: XdmNode>(
    ctx: &Context<N>,
    content: &Expression,
    validation: &ValidationMode,
) -> bool {
    ctx.controller().construction_mode() == crate::context::ConstructionMode::Lazy
        && !validation.requires_validator()
        && !content.depends_on_local_variables()
}

/// Run the controller's validator over element content.
pub(super) fn validate_element<N: XdmNode>(
    ctx: &Context<N>,
    name: &QName,
    content: &str,
    mode: &ValidationMode,
) -> Result<Option<QName>, Error> {
    let validator = ctx.controller().validator().ok_or_else(|| {
        Error::from_code(
            mode.failure_code(),
            format!("validation requested for element {name} but no schema validator is configured"),
        )
        .with_location(ctx.origin_location())
    })?;
    validator
        .validate_element(name, content, mode)
        .map_err(|failure| {
            Error::from_code(
                mode.failure_code(),
                format!("element {name} failed validation: {}", failure.message),
            )
            .with_location(ctx.origin_location())
        })
}

/// Reserved-name check shared with the attribute constructor: `xmlns` is
/// never a usable constructed name, and the `xml` prefix must map to the
/// XML namespace.
pub(super) fn check_attribute_name(name: &QName) -> Result<(), Error> {
    if &*name.local == "xmlns" && name.ns_uri.is_none() {
        return Err(Error::from_code(
            ErrorCode::XTDE0850,
            "an attribute named xmlns cannot be constructed",
        ));
    }
    if name.prefix.as_deref() == Some("xmlns") {
        return Err(Error::from_code(
            ErrorCode::XTDE0850,
            format!("attribute {name} is a namespace declaration, not an attribute"),
        ));
    }
    if name.prefix.as_deref() == Some("xml") && name.ns_uri_str() != Some(XML_URI) {
        return Err(Error::from_code(
            ErrorCode::XTDE0850,
            format!("the xml prefix of {name} is not bound to the XML namespace"),
        ));
    }
    Ok(())
}
