//! The compiled instruction tree and its evaluation protocols.
//!
//! Every instruction and expression leaf is a variant of [`Expression`].
//! Three protocols evaluate a node:
//!
//! * **push** — [`Expression::process`] writes receiver events to the
//!   context's output. [`Expression::process_leaving_tail`] is the variant
//!   used inside template bodies: an instruction in tail position may return
//!   a [`TailCall`] package instead of invoking the next template natively,
//!   and the caller drives packages in a flat loop.
//! * **pull** — [`Expression::iterate`] yields items one at a time.
//! * **item** — [`Expression::evaluate_item`] for single-valued leaves.
//!
//! Each node supports all three; the ones it does not implement natively
//! fall back through a conversion (push instructions are pulled from by
//! processing into a [`SequenceCollector`], pull expressions are pushed by
//! appending their items).

mod apply;
mod attribute;
mod block;
mod call;
mod copy;
mod document;
mod element;
mod foreach;
mod group;
mod message;
mod result_doc;
mod simple;
mod tail;
mod template;

pub use apply::{ApplyTemplates, ModeTarget};
pub(crate) use apply::apply_to_items;
pub use attribute::AttributeCtor;
pub use block::{BlockIterator, Choose, make_block};
pub use call::{CallTarget, CallTemplate};
pub use copy::CopyOf;
pub use document::DocumentCtor;
pub use element::ElementCtor;
pub use foreach::ForEach;
pub use group::{ForEachGroup, GroupingAlgorithm, SortKey};
pub use message::MessageInstr;
pub use result_doc::ResultDocument;
pub use simple::{CommentCtor, PiCtor, PiTarget, ValueOf};
pub use tail::{ApplyCall, TailCall, TemplateCall, drive};
pub use template::{LocalParamDef, Template, WithParam};

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::event::{ComplexContentOutputter, Receiver, SequenceCollector, SharedSink};
use crate::location::LocationId;
use crate::model::{NodeKind, QName, XdmNode, parse_lexical_qname};
use crate::xdm::{
    AtomicValue, BoxIter, EmptyIter, Item, OnceIter, SequenceIter, Sequence, VecIter,
    effective_boolean_value,
};

/// Which protocol evaluates a node most directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMethod {
    Process,
    Iterate,
    EvaluateItem,
}

/// Node test applied by the axis leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Any,
    Kind(NodeKind),
    Name(QName),
}

impl NodeTest {
    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        match self {
            NodeTest::Any => true,
            NodeTest::Kind(k) => node.kind() == *k,
            NodeTest::Name(q) => node.name().as_ref() == Some(q),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A constructed node's name: fixed at compile time, or computed at run
/// time from a name expression and an optional namespace expression.
#[derive(Debug, Clone, PartialEq)]
pub enum NameSource {
    Fixed(QName),
    Computed {
        name: Box<Expression>,
        namespace: Option<Box<Expression>>,
    },
}

impl NameSource {
    /// Resolve to an expanded name. `bad_name` is the host error code for an
    /// unusable computed name (element, attribute and PI each have their
    /// own).
    pub(crate) fn resolve<N: XdmNode>(
        &self,
        ctx: &Context<N>,
        bad_name: ErrorCode,
    ) -> Result<QName, Error> {
        match self {
            NameSource::Fixed(q) => Ok(q.clone()),
            NameSource::Computed { name, namespace } => {
                let item = name.evaluate_item(ctx)?.ok_or_else(|| {
                    Error::from_code(bad_name, "computed name is an empty sequence")
                        .with_location(ctx.origin_location())
                })?;
                let ns = match namespace {
                    Some(e) => {
                        let seq = e.evaluate_sequence(ctx)?;
                        Some(atomized_join(&seq, ""))
                    }
                    None => None,
                };
                match item.atomize() {
                    AtomicValue::QName(q) => Ok(match ns {
                        Some(uri) if !uri.is_empty() => {
                            QName::new(Some(&uri), q.prefix.as_deref(), &q.local)
                        }
                        Some(_) => QName::new(None, None, &q.local),
                        None => q,
                    }),
                    other => {
                        let lexical = other.string_value();
                        let (prefix, local) =
                            parse_lexical_qname(&lexical).ok_or_else(|| {
                                Error::from_code(
                                    bad_name,
                                    format!("invalid lexical QName {lexical:?}"),
                                )
                                .with_location(ctx.origin_location())
                            })?;
                        match (&prefix, &ns) {
                            (Some(p), None) => Err(Error::from_code(
                                bad_name,
                                format!("no namespace bound to prefix {p:?} in computed name"),
                            )
                            .with_location(ctx.origin_location())),
                            _ => Ok(QName::new(
                                ns.as_deref().filter(|s| !s.is_empty()),
                                prefix,
                                local,
                            )),
                        }
                    }
                }
            }
        }
    }

    fn subexpressions<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        if let NameSource::Computed { name, namespace } = self {
            out.push(name);
            if let Some(ns) = namespace {
                out.push(ns);
            }
        }
    }
}

/// One node of the compiled tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // ---- value leaves ----
    Literal(AtomicValue),
    ContextItem,
    Position,
    Last,
    LocalVariable { slot: usize, name: QName },
    GlobalVariable { slot: usize, name: QName },
    ChildAxis(NodeTest),
    AttributeAxis(NodeTest),
    Arithmetic {
        op: ArithOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    StringJoin {
        select: Box<Expression>,
        separator: String,
    },
    CurrentGroup,
    CurrentGroupingKey,

    // ---- control ----
    Block(Vec<Expression>),
    Choose(Box<Choose>),
    ForEach(Box<ForEach>),
    ForEachGroup(Box<ForEachGroup>),
    ApplyTemplates(Box<ApplyTemplates>),
    CallTemplate(Box<CallTemplate>),

    // ---- node constructors ----
    Element(Box<ElementCtor>),
    Attribute(Box<AttributeCtor>),
    Document(Box<DocumentCtor>),
    ValueOf(Box<ValueOf>),
    Comment(Box<CommentCtor>),
    ProcessingInstruction(Box<PiCtor>),
    CopyOf(Box<CopyOf>),

    // ---- side-effecting ----
    Message(Box<MessageInstr>),
    ResultDocument(Box<ResultDocument>),
}

impl Expression {
    /// Push evaluation: write this node's result to the context's output,
    /// driving any tail calls to completion.
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        if let Some(tc) = self.process_leaving_tail(ctx)? {
            drive(tc, ctx.depth() + 1)?;
        }
        Ok(())
    }

    /// Push evaluation inside a template body: an instruction in tail
    /// position may hand back a package instead of making a native call.
    pub fn process_leaving_tail<N: XdmNode>(
        &self,
        ctx: &mut Context<N>,
    ) -> Result<Option<TailCall<N>>, Error> {
        match self {
            Expression::Block(children) => block::process_block(children, ctx),
            Expression::Choose(c) => c.process_leaving_tail(ctx),
            Expression::ForEach(f) => f.process(ctx).map(|()| None),
            Expression::ForEachGroup(g) => g.process(ctx).map(|()| None),
            Expression::ApplyTemplates(a) => a.process_leaving_tail(ctx),
            Expression::CallTemplate(c) => c.process_leaving_tail(ctx),
            Expression::Element(e) => e.process(ctx).map(|()| None),
            Expression::Attribute(a) => a.process(ctx).map(|()| None),
            Expression::Document(d) => d.process(ctx).map(|()| None),
            Expression::ValueOf(v) => v.process(ctx).map(|()| None),
            Expression::Comment(c) => c.process(ctx).map(|()| None),
            Expression::ProcessingInstruction(p) => p.process(ctx).map(|()| None),
            Expression::CopyOf(c) => c.process(ctx).map(|()| None),
            Expression::Message(m) => m.process(ctx).map(|()| None),
            Expression::ResultDocument(r) => r.process(ctx).map(|()| None),
            // Value leaves: pull and append
            _ => {
                let mut iter = self.iterate(ctx)?;
                while let Some(item) = iter.next_item()? {
                    ctx.emit(|out| out.append(&item, LocationId::NONE))?;
                }
                Ok(None)
            }
        }
    }

    /// Pull evaluation: a lazy stream of items.
    pub fn iterate<'a, N: XdmNode>(
        &'a self,
        ctx: &Context<N>,
    ) -> Result<BoxIter<'a, N>, Error> {
        match self {
            Expression::Literal(a) => Ok(Box::new(OnceIter(Some(Item::Atomic(a.clone()))))),
            Expression::ContextItem => {
                Ok(Box::new(OnceIter(Some(ctx.current_item()?.clone()))))
            }
            Expression::Position => match ctx.focus() {
                Some(f) => Ok(Box::new(OnceIter(Some(Item::Atomic(
                    AtomicValue::Integer(f.position as i64),
                ))))),
                None => Ok(Box::new(EmptyIter)),
            },
            Expression::Last => match ctx.focus() {
                Some(f) => Ok(Box::new(OnceIter(Some(Item::Atomic(
                    AtomicValue::Integer(f.size as i64),
                ))))),
                None => Ok(Box::new(EmptyIter)),
            },
            Expression::LocalVariable { slot, .. } => {
                Ok(Box::new(VecIter::new(ctx.local_variable(*slot))))
            }
            Expression::GlobalVariable { slot, name } => {
                let value = evaluate_global(ctx, *slot, name)?;
                Ok(Box::new(VecIter::new(value)))
            }
            Expression::ChildAxis(test) => {
                let node = context_node(ctx)?;
                let items = node
                    .children()
                    .into_iter()
                    .filter(|c| test.matches(c))
                    .map(Item::Node)
                    .collect();
                Ok(Box::new(VecIter::new(items)))
            }
            Expression::AttributeAxis(test) => {
                let node = context_node(ctx)?;
                let items = node
                    .attributes()
                    .into_iter()
                    .filter(|a| test.matches(a))
                    .map(Item::Node)
                    .collect();
                Ok(Box::new(VecIter::new(items)))
            }
            Expression::Arithmetic { op, lhs, rhs } => {
                match arithmetic(*op, lhs, rhs, ctx)? {
                    Some(v) => Ok(Box::new(OnceIter(Some(Item::Atomic(v))))),
                    None => Ok(Box::new(EmptyIter)),
                }
            }
            Expression::Compare { op, lhs, rhs } => match compare(*op, lhs, rhs, ctx)? {
                Some(b) => Ok(Box::new(OnceIter(Some(Item::Atomic(
                    AtomicValue::Boolean(b),
                ))))),
                None => Ok(Box::new(EmptyIter)),
            },
            Expression::StringJoin { select, separator } => {
                let seq = select.evaluate_sequence(ctx)?;
                Ok(Box::new(OnceIter(Some(Item::Atomic(AtomicValue::String(
                    atomized_join(&seq, separator),
                ))))))
            }
            Expression::CurrentGroup => match ctx.current_group() {
                Some(g) => Ok(Box::new(VecIter::new(g.items.clone()))),
                None => Ok(Box::new(EmptyIter)),
            },
            Expression::CurrentGroupingKey => match ctx.current_group() {
                Some(g) => Ok(Box::new(OnceIter(
                    g.key.clone().map(Item::Atomic),
                ))),
                None => Ok(Box::new(EmptyIter)),
            },
            Expression::Block(children) => Ok(Box::new(block::BlockIterator::new(
                children,
                ctx.new_minor(),
            ))),
            Expression::Choose(c) => c.iterate(ctx),
            Expression::ForEach(f) => f.iterate(ctx),
            Expression::Element(e) => e.iterate(ctx),
            Expression::Document(d) => d.iterate(ctx),
            Expression::Attribute(a) => a.iterate(ctx),
            Expression::ValueOf(v) => v.iterate(ctx),
            Expression::Comment(c) => c.iterate(ctx),
            Expression::ProcessingInstruction(p) => p.iterate(ctx),
            // Push-only instructions: evaluate through a collector
            _ => {
                let items = collect_push_output(self, ctx)?;
                Ok(Box::new(VecIter::new(items)))
            }
        }
    }

    /// Single-item evaluation: the first item of the pull stream.
    pub fn evaluate_item<N: XdmNode>(
        &self,
        ctx: &Context<N>,
    ) -> Result<Option<Item<N>>, Error> {
        self.iterate(ctx)?.next_item()
    }

    /// Fully materialized pull evaluation.
    pub fn evaluate_sequence<N: XdmNode>(
        &self,
        ctx: &Context<N>,
    ) -> Result<Sequence<N>, Error> {
        self.iterate(ctx)?.materialize()
    }

    /// Effective boolean value of this expression's result.
    pub fn effective_boolean<N: XdmNode>(&self, ctx: &Context<N>) -> Result<bool, Error> {
        let seq = self.evaluate_sequence(ctx)?;
        effective_boolean_value(&seq)
    }

    /// The protocol that evaluates this node without a conversion.
    pub fn preferred_eval_method(&self) -> EvalMethod {
        match self {
            Expression::Literal(_)
            | Expression::ContextItem
            | Expression::Position
            | Expression::Last
            | Expression::Arithmetic { .. }
            | Expression::Compare { .. }
            | Expression::StringJoin { .. }
            | Expression::CurrentGroupingKey => EvalMethod::EvaluateItem,
            Expression::LocalVariable { .. }
            | Expression::GlobalVariable { .. }
            | Expression::ChildAxis(_)
            | Expression::AttributeAxis(_)
            | Expression::CurrentGroup => EvalMethod::Iterate,
            _ => EvalMethod::Process,
        }
    }

    /// Immediate sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        match self {
            Expression::Literal(_)
            | Expression::ContextItem
            | Expression::Position
            | Expression::Last
            | Expression::LocalVariable { .. }
            | Expression::GlobalVariable { .. }
            | Expression::ChildAxis(_)
            | Expression::AttributeAxis(_)
            | Expression::CurrentGroup
            | Expression::CurrentGroupingKey => {}
            Expression::Arithmetic { lhs, rhs, .. } | Expression::Compare { lhs, rhs, .. } => {
                out.push(lhs.as_ref());
                out.push(rhs.as_ref());
            }
            Expression::StringJoin { select, .. } => out.push(select.as_ref()),
            Expression::Block(children) => out.extend(children.iter()),
            Expression::Choose(c) => {
                for (cond, action) in &c.branches {
                    out.push(cond);
                    out.push(action);
                }
            }
            Expression::ForEach(f) => {
                out.push(&f.select);
                out.push(&f.body);
            }
            Expression::ForEachGroup(g) => {
                out.push(&g.select);
                match &g.algorithm {
                    GroupingAlgorithm::ByKey(k)
                    | GroupingAlgorithm::AdjacentKey(k)
                    | GroupingAlgorithm::StartingWhen(k)
                    | GroupingAlgorithm::EndingWhen(k) => out.push(k),
                }
                if let Some(c) = &g.collation {
                    out.push(c);
                }
                for key in &g.sort_keys {
                    out.push(&key.select);
                }
                out.push(&g.body);
            }
            Expression::ApplyTemplates(a) => {
                out.push(&a.select);
                for p in a.params.iter().chain(a.tunnel_params.iter()) {
                    out.push(&p.select);
                }
            }
            Expression::CallTemplate(c) => {
                if let CallTarget::Computed(name) = &c.target {
                    out.push(name);
                }
                for p in c.params.iter().chain(c.tunnel_params.iter()) {
                    out.push(&p.select);
                }
            }
            Expression::Element(e) => {
                e.name.subexpressions(&mut out);
                out.push(&e.content);
            }
            Expression::Attribute(a) => {
                a.name.subexpressions(&mut out);
                out.push(&a.select);
            }
            Expression::Document(d) => out.push(&d.content),
            Expression::ValueOf(v) => out.push(&v.select),
            Expression::Comment(c) => out.push(&c.select),
            Expression::ProcessingInstruction(p) => {
                if let PiTarget::Computed(t) = &p.target {
                    out.push(t);
                }
                out.push(&p.select);
            }
            Expression::CopyOf(c) => out.push(&c.select),
            Expression::Message(m) => {
                out.push(&m.select);
                if let Some(t) = &m.terminate {
                    out.push(t);
                }
                if let Some(c) = &m.error_code {
                    out.push(c);
                }
            }
            Expression::ResultDocument(r) => {
                if let Some(h) = &r.href {
                    out.push(h);
                }
                out.push(&r.content);
            }
        }
        out
    }

    /// Whether evaluation reads the focus (context item, position or size),
    /// directly or in any sub-expression.
    pub fn depends_on_focus(&self) -> bool {
        match self {
            Expression::ContextItem
            | Expression::Position
            | Expression::Last
            | Expression::ChildAxis(_)
            | Expression::AttributeAxis(_)
            | Expression::CurrentGroup
            | Expression::CurrentGroupingKey => true,
            _ => self.children().iter().any(|c| c.depends_on_focus()),
        }
    }

    /// Whether evaluation reads a local variable slot anywhere in the tree.
    pub fn depends_on_local_variables(&self) -> bool {
        match self {
            Expression::LocalVariable { .. } => true,
            _ => self
                .children()
                .iter()
                .any(|c| c.depends_on_local_variables()),
        }
    }

    /// Global variable slots read anywhere in the tree; used for the static
    /// circularity check.
    pub fn global_references(&self, out: &mut Vec<usize>) {
        if let Expression::GlobalVariable { slot, .. } = self {
            if !out.contains(slot) {
                out.push(*slot);
            }
        }
        for c in self.children() {
            c.global_references(out);
        }
    }

    /// Whether this is an updating expression. The core carries the
    /// classification for the block-mixture check; no updating instruction
    /// variants exist yet.
    pub fn is_updating(&self) -> bool {
        false
    }
}

// ---- shared evaluation helpers ----

fn context_node<N: XdmNode>(ctx: &Context<N>) -> Result<N, Error> {
    match ctx.current_item()? {
        Item::Node(n) => Ok(n.clone()),
        Item::Atomic(_) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            "an axis step requires a node as the context item",
        )
        .with_location(ctx.origin_location())),
    }
}

/// Atomize a sequence and join the string values.
pub(crate) fn atomized_join<N: XdmNode>(seq: &Sequence<N>, separator: &str) -> String {
    let mut out = String::new();
    for (i, item) in seq.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        out.push_str(&item.atomize().string_value());
    }
    out
}

/// Evaluate to at most one atomic value; more than one item is a type error.
pub(crate) fn singleton_atomic<N: XdmNode>(
    expr: &Expression,
    ctx: &Context<N>,
) -> Result<Option<AtomicValue>, Error> {
    let mut iter = expr.iterate(ctx)?;
    let first = match iter.next_item()? {
        Some(item) => item,
        None => return Ok(None),
    };
    if iter.next_item()?.is_some() {
        return Err(Error::from_code(
            ErrorCode::XPTY0004,
            "a sequence of more than one item where a single value is required",
        )
        .with_location(ctx.origin_location()));
    }
    Ok(Some(first.atomize()))
}

/// Pull fallback for push-only instructions: run them against a sequence
/// collector and return the collected items.
pub(crate) fn collect_push_output<N: XdmNode>(
    expr: &Expression,
    ctx: &Context<N>,
) -> Result<Sequence<N>, Error> {
    let sink = SharedSink::new(SequenceCollector::new(Arc::clone(
        ctx.controller().tree_model(),
    )));
    let handle = sink.handle();
    let mut inner = ctx.new_minor();
    inner.with_output(Box::new(sink), |c| expr.process(c))?;
    handle.0.borrow_mut().take_items()
}

/// Pull fallback for node constructors: run a push-mode body against a
/// collector with content ordering enforced, so an attribute event arriving
/// after child content fails the same way it would in push mode.
pub(crate) fn collect_events<N: XdmNode>(
    ctx: &Context<N>,
    f: impl FnOnce(&mut Context<N>) -> Result<(), Error>,
) -> Result<Sequence<N>, Error> {
    let sink = SharedSink::new(SequenceCollector::new(Arc::clone(
        ctx.controller().tree_model(),
    )));
    let handle = sink.handle();
    let mut outputter = ComplexContentOutputter::new(Box::new(sink), true);
    outputter.open()?;
    let mut inner = ctx.new_minor();
    inner.with_output(Box::new(outputter), |c| {
        f(c)?;
        c.emit(|out| out.close())
    })?;
    handle.0.borrow_mut().take_items()
}

fn evaluate_global<N: XdmNode>(
    ctx: &Context<N>,
    slot: usize,
    name: &QName,
) -> Result<Sequence<N>, Error> {
    let ctrl = Arc::clone(ctx.controller());
    let def = ctrl.executable().global(slot).ok_or_else(|| {
        Error::from_code(
            ErrorCode::Unknown,
            format!("no global variable in slot {slot}"),
        )
    })?;
    ctrl.bindery().global_value(slot, name, || {
        if def.is_param {
            if let Some(value) = ctrl.supplied_param(&def.name) {
                return Ok(value);
            }
            if def.required {
                return Err(Error::from_code(
                    ErrorCode::XTDE0050,
                    format!("no value supplied for required parameter ${}", def.name),
                ));
            }
        }
        // Globals are evaluated with no focus, in their own frame
        let sink: SequenceCollector<N> =
            SequenceCollector::new(Arc::clone(ctrl.tree_model()));
        let gctx = ctrl.new_context(Box::new(sink)).new_major(def.slots);
        def.select.evaluate_sequence(&gctx)
    })
}

enum Num {
    Int(i64),
    Dbl(f64),
}

fn as_number(a: &AtomicValue, ctx_loc: &Option<crate::location::SourceLocation>) -> Result<Num, Error> {
    match a {
        AtomicValue::Integer(i) => Ok(Num::Int(*i)),
        AtomicValue::Double(d) => Ok(Num::Dbl(*d)),
        AtomicValue::UntypedAtomic(s) => s.trim().parse::<f64>().map(Num::Dbl).map_err(|_| {
            Error::from_code(
                ErrorCode::FORG0001,
                format!("cannot convert {s:?} to a number"),
            )
            .with_location(ctx_loc.clone())
        }),
        other => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("{} is not a number", other.string_value()),
        )
        .with_location(ctx_loc.clone())),
    }
}

fn arithmetic<N: XdmNode>(
    op: ArithOp,
    lhs: &Expression,
    rhs: &Expression,
    ctx: &Context<N>,
) -> Result<Option<AtomicValue>, Error> {
    let (Some(a), Some(b)) = (singleton_atomic(lhs, ctx)?, singleton_atomic(rhs, ctx)?) else {
        return Ok(None);
    };
    let loc = ctx.origin_location();
    let a = as_number(&a, &loc)?;
    let b = as_number(&b, &loc)?;
    let value = match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            ArithOp::Add => int_or_double(x.checked_add(y), x as f64 + y as f64),
            ArithOp::Subtract => int_or_double(x.checked_sub(y), x as f64 - y as f64),
            ArithOp::Multiply => int_or_double(x.checked_mul(y), x as f64 * y as f64),
            ArithOp::Divide => {
                if y == 0 {
                    return Err(Error::from_code(ErrorCode::FOAR0001, "division by zero")
                        .with_location(loc));
                }
                if x % y == 0 {
                    AtomicValue::Integer(x / y)
                } else {
                    AtomicValue::Double(x as f64 / y as f64)
                }
            }
            ArithOp::Modulo => {
                if y == 0 {
                    return Err(Error::from_code(ErrorCode::FOAR0001, "division by zero")
                        .with_location(loc));
                }
                AtomicValue::Integer(x % y)
            }
        },
        (a, b) => {
            let x = match a {
                Num::Int(i) => i as f64,
                Num::Dbl(d) => d,
            };
            let y = match b {
                Num::Int(i) => i as f64,
                Num::Dbl(d) => d,
            };
            AtomicValue::Double(match op {
                ArithOp::Add => x + y,
                ArithOp::Subtract => x - y,
                ArithOp::Multiply => x * y,
                ArithOp::Divide => x / y,
                ArithOp::Modulo => x % y,
            })
        }
    };
    Ok(Some(value))
}

fn int_or_double(exact: Option<i64>, approx: f64) -> AtomicValue {
    match exact {
        Some(i) => AtomicValue::Integer(i),
        None => AtomicValue::Double(approx),
    }
}

fn compare<N: XdmNode>(
    op: CompareOp,
    lhs: &Expression,
    rhs: &Expression,
    ctx: &Context<N>,
) -> Result<Option<bool>, Error> {
    let (Some(a), Some(b)) = (singleton_atomic(lhs, ctx)?, singleton_atomic(rhs, ctx)?) else {
        return Ok(None);
    };
    // Numeric comparison when both sides are (or parse as) numbers; NaN
    // compares false to everything except via `ne`
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        if x.is_nan() || y.is_nan() {
            return Ok(Some(op == CompareOp::Ne));
        }
        return Ok(Some(match op {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        }));
    }
    let collation = ctx.controller().collations().resolve(None)?;
    let ord = collation.compare(&a.string_value(), &b.string_value());
    Ok(Some(match op {
        CompareOp::Eq => ord.is_eq(),
        CompareOp::Ne => ord.is_ne(),
        CompareOp::Lt => ord.is_lt(),
        CompareOp::Le => ord.is_le(),
        CompareOp::Gt => ord.is_gt(),
        CompareOp::Ge => ord.is_ge(),
    }))
}
