//! Secondary result documents and messages.

use std::sync::{Arc, Mutex};

use xslt_runtime::instruct::*;
use xslt_runtime::*;

fn lit(s: &str) -> Expression {
    Expression::Literal(AtomicValue::String(s.to_string()))
}

fn value_of(select: Expression) -> Expression {
    Expression::ValueOf(Box::new(ValueOf {
        select,
        separator: " ".to_string(),
        loc: LocationId::NONE,
    }))
}

fn elem(name: &str, content: Expression) -> Expression {
    Expression::Element(Box::new(ElementCtor {
        name: NameSource::Fixed(QName::local(name)),
        namespaces: vec![],
        content,
        inherit_namespaces: true,
        validation: ValidationMode::Strip,
        loc: LocationId::NONE,
    }))
}

fn result_doc(href: &str, content: Expression) -> Expression {
    Expression::ResultDocument(Box::new(ResultDocument {
        href: Some(lit(href)),
        validation: ValidationMode::Strip,
        content,
        loc: LocationId::NONE,
    }))
}

fn controller_with_base() -> Arc<Controller<TreeNode>> {
    let exec = Executable::builder().build().unwrap();
    ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_base_output_uri("file:///out/")
        .unwrap()
        .build()
}

fn process(controller: &Arc<Controller<TreeNode>>, expr: &Expression) -> Result<(), Error> {
    let mut ctx =
        controller.new_context(Box::new(SequenceCollector::new(Arc::new(StdTreeModel))));
    expr.process(&mut ctx)
}

#[test]
fn secondary_result_is_registered_under_the_resolved_uri() {
    let controller = controller_with_base();
    let expr = result_doc("report.xml", elem("report", value_of(lit("ok"))));
    process(&controller, &expr).unwrap();

    let root = controller.secondary_result("file:///out/report.xml").unwrap();
    assert_eq!(root.kind(), NodeKind::Document);
    let children = root.children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name().unwrap(), QName::local("report"));
    assert_eq!(children[0].string_value(), "ok");
}

#[test]
fn writing_the_same_uri_twice_is_an_error() {
    let controller = controller_with_base();
    let expr = result_doc("dup.xml", elem("r", value_of(lit("x"))));
    process(&controller, &expr).unwrap();
    let err = process(&controller, &expr).unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE1490);
}

#[test]
fn writing_over_a_document_read_as_source_is_an_error() {
    let controller = controller_with_base();
    controller.add_read_document("file:///out/input.xml", TreeNode::document());
    let expr = result_doc("input.xml", elem("r", value_of(lit("x"))));
    let err = process(&controller, &expr).unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE1500);
}

/// Resolver-backed output: events go to the caller's receiver instead of
/// a registered tree.
struct CollectingResolver {
    opened: Mutex<Vec<String>>,
}

impl OutputResolver<TreeNode> for CollectingResolver {
    fn open(&self, uri: &str) -> Result<Box<dyn Receiver<TreeNode>>, Error> {
        self.opened.lock().expect("resolver lock").push(uri.to_string());
        Ok(Box::new(TreeNodeBuilder::new()))
    }
}

#[test]
fn output_resolver_receives_the_resolved_uri() {
    let resolver = Arc::new(CollectingResolver {
        opened: Mutex::new(Vec::new()),
    });
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_base_output_uri("file:///out/")
        .unwrap()
        .with_output_resolver(Arc::clone(&resolver) as Arc<dyn OutputResolver<TreeNode>>)
        .build();

    let expr = result_doc("a/b.xml", elem("r", value_of(lit("x"))));
    process(&controller, &expr).unwrap();

    let opened = resolver.opened.lock().unwrap();
    assert_eq!(&*opened, &["file:///out/a/b.xml".to_string()]);
    // Resolver-backed writes are not registered on the controller
    assert!(controller.secondary_result("file:///out/a/b.xml").is_none());
}

struct CollectingEmitter {
    messages: Mutex<Vec<(String, bool)>>,
}

impl MessageEmitter for CollectingEmitter {
    fn message(&self, content: &str, terminate: bool) {
        self.messages
            .lock()
            .expect("emitter lock")
            .push((content.to_string(), terminate));
    }
}

fn message(select: Expression, terminate: Option<Expression>, error_code: Option<Expression>) -> Expression {
    Expression::Message(Box::new(MessageInstr {
        select,
        terminate,
        error_code,
        loc: LocationId::NONE,
    }))
}

#[test]
fn messages_reach_the_configured_emitter() {
    let emitter = Arc::new(CollectingEmitter {
        messages: Mutex::new(Vec::new()),
    });
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_message_emitter(Arc::clone(&emitter) as Arc<dyn MessageEmitter>)
        .build();

    process(&controller, &message(lit("progress"), None, None)).unwrap();
    let messages = emitter.messages.lock().unwrap();
    assert_eq!(&*messages, &[("progress".to_string(), false)]);
}

#[test]
fn terminating_message_raises_after_emitting() {
    let emitter = Arc::new(CollectingEmitter {
        messages: Mutex::new(Vec::new()),
    });
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_message_emitter(Arc::clone(&emitter) as Arc<dyn MessageEmitter>)
        .build();

    let err = process(
        &controller,
        &message(
            lit("fatal"),
            Some(Expression::Literal(AtomicValue::Boolean(true))),
            None,
        ),
    )
    .unwrap_err();
    assert!(err.is_termination());
    assert_eq!(err.format_code(), "err:XTMM9000");
    let messages = emitter.messages.lock().unwrap();
    assert_eq!(&*messages, &[("fatal".to_string(), true)]);
}

#[test]
fn termination_carries_a_user_error_code() {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    let err = process(
        &controller,
        &message(
            lit("giving up"),
            Some(Expression::Literal(AtomicValue::Boolean(true))),
            Some(lit("oops")),
        ),
    )
    .unwrap_err();
    assert!(err.is_termination());
    assert_eq!(err.user_code, Some(QName::local("oops")));
    assert_eq!(err.format_code(), "oops");
}
