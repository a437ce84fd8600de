//! Tail-call trampolining: deep tail recursion runs in constant stack,
//! and runaway non-tail recursion is converted into a diagnostic.

use std::sync::Arc;

use xslt_runtime::instruct::*;
use xslt_runtime::*;

fn lit_int(i: i64) -> Expression {
    Expression::Literal(AtomicValue::Integer(i))
}

fn lit_str(s: &str) -> Expression {
    Expression::Literal(AtomicValue::String(s.to_string()))
}

fn local(slot: usize, name: &str) -> Expression {
    Expression::LocalVariable {
        slot,
        name: QName::local(name),
    }
}

fn call_by_name(name: &str, params: Vec<WithParam>) -> Expression {
    Expression::CallTemplate(Box::new(CallTemplate {
        target: CallTarget::Computed(Box::new(lit_str(name))),
        params,
        tunnel_params: vec![],
        loc: LocationId::NONE,
    }))
}

fn value_of(select: Expression) -> Expression {
    Expression::ValueOf(Box::new(ValueOf {
        select,
        separator: " ".to_string(),
        loc: LocationId::NONE,
    }))
}

/// countdown(n): if n > 0 then countdown(n - 1) else emit "done". The
/// recursive call is the last action of the chosen branch, so the whole
/// descent is one trampoline chain.
fn countdown(start: i64, tail_position: bool) -> Arc<Executable> {
    let mut builder = Executable::builder();
    let n = QName::local("n");
    let pid = builder.param_id(&n);

    let recurse = call_by_name(
        "countdown",
        vec![WithParam {
            id: pid,
            name: n.clone(),
            select: Expression::Arithmetic {
                op: ArithOp::Subtract,
                lhs: Box::new(local(0, "n")),
                rhs: Box::new(lit_int(1)),
            },
        }],
    );
    let recursive_branch = if tail_position {
        recurse
    } else {
        // A trailing sibling keeps the call out of tail position
        make_block(vec![recurse, value_of(lit_str("x"))]).unwrap()
    };
    let body = Expression::Choose(Box::new(Choose::new(vec![
        (
            Expression::Compare {
                op: CompareOp::Gt,
                lhs: Box::new(local(0, "n")),
                rhs: Box::new(lit_int(0)),
            },
            recursive_branch,
        ),
        (
            Expression::Literal(AtomicValue::Boolean(true)),
            value_of(lit_str("done")),
        ),
    ])));

    builder.add_named_template(Arc::new(Template {
        name: Some(QName::local("countdown")),
        params: vec![LocalParamDef {
            id: pid,
            name: n,
            slot: 0,
            required: false,
            tunnel: false,
            default: Some(lit_int(start)),
        }],
        slots: 1,
        body,
        loc: LocationId::NONE,
    }));
    builder.build().unwrap()
}

fn run_named(
    controller: &Arc<Controller<TreeNode>>,
    name: &str,
) -> Result<Vec<Item<TreeNode>>, Error> {
    let sink = SharedSink::new(SequenceCollector::new(Arc::new(StdTreeModel)));
    let handle = sink.handle();
    controller.call_template(&QName::local(name), Box::new(sink))?;
    handle.0.borrow_mut().take_items()
}

#[test]
fn a_million_tail_calls_complete() {
    let controller =
        ControllerBuilder::new(countdown(1_000_000, true), Arc::new(StdTreeModel)).build();
    let items = run_named(&controller, "countdown").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].string_value(), "done");
}

#[test]
fn non_tail_recursion_hits_the_depth_guard() {
    let controller = ControllerBuilder::new(countdown(10_000, false), Arc::new(StdTreeModel))
        .with_recursion_limit(500)
        .build();
    let err = run_named(&controller, "countdown").unwrap_err();
    assert_eq!(err.code, ErrorCode::SXLM0001);
}

#[test]
fn unknown_template_name_is_reported() {
    let controller =
        ControllerBuilder::new(countdown(1, true), Arc::new(StdTreeModel)).build();
    let err = run_named(&controller, "missing").unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE0040);
}

/// Discards every event, remembering only whether it was closed.
struct ClosableSink {
    closed: bool,
}

impl Receiver<TreeNode> for ClosableSink {
    fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        Ok(())
    }
    fn start_document(&mut self, _props: ReceiverProps) -> Result<(), Error> {
        Ok(())
    }
    fn end_document(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn start_element(
        &mut self,
        _name: &QName,
        _type_annotation: Option<&QName>,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        Ok(())
    }
    fn namespace(&mut self, _prefix: &str, _uri: &str, _props: ReceiverProps) -> Result<(), Error> {
        Ok(())
    }
    fn attribute(
        &mut self,
        _name: &QName,
        _type_annotation: Option<&QName>,
        _value: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        Ok(())
    }
    fn end_element(&mut self) -> Result<(), Error> {
        Ok(())
    }
    fn characters(
        &mut self,
        _value: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        Ok(())
    }
    fn comment(
        &mut self,
        _value: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        Ok(())
    }
    fn processing_instruction(
        &mut self,
        _target: &str,
        _data: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        Ok(())
    }
    fn append(&mut self, _item: &Item<TreeNode>, _loc: LocationId) -> Result<(), Error> {
        Ok(())
    }
}

#[test]
fn receiver_is_closed_when_the_body_errors() {
    // The body reads the context item, which the entry context never has
    let mut builder = Executable::builder();
    builder.add_named_template(Arc::new(Template {
        name: Some(QName::local("fails")),
        params: vec![],
        slots: 0,
        body: value_of(Expression::ContextItem),
        loc: LocationId::NONE,
    }));
    let controller =
        ControllerBuilder::new(builder.build().unwrap(), Arc::new(StdTreeModel)).build();

    let sink = SharedSink::new(ClosableSink { closed: false });
    let handle = sink.handle();
    let err = controller
        .call_template(&QName::local("fails"), Box::new(sink))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert!(handle.0.borrow().closed);
}
