//! Sequence-constructor blocks: flattening, collapsing and iteration order.

use std::sync::Arc;

use xslt_runtime::instruct::*;
use xslt_runtime::*;

fn lit(i: i64) -> Expression {
    Expression::Literal(AtomicValue::Integer(i))
}

fn text(s: &str) -> Expression {
    Expression::ValueOf(Box::new(ValueOf {
        select: Expression::Literal(AtomicValue::String(s.to_string())),
        separator: String::new(),
        loc: LocationId::NONE,
    }))
}

fn empty_context() -> Context<TreeNode> {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    controller.new_context(Box::new(SequenceCollector::new(Arc::new(StdTreeModel))))
}

fn push_values(expr: &Expression) -> Vec<String> {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    let sink = SharedSink::new(SequenceCollector::new(Arc::new(StdTreeModel)));
    let handle = sink.handle();
    let mut ctx = controller.new_context(Box::new(sink));
    expr.process(&mut ctx).unwrap();
    let items = handle.0.borrow_mut().take_items().unwrap();
    items.iter().map(|i| i.string_value()).collect()
}

#[test]
fn nested_blocks_flatten_to_one_level() {
    let inner = make_block(vec![lit(2), lit(3)]).unwrap();
    let outer = make_block(vec![lit(1), inner, lit(4)]).unwrap();
    assert_eq!(
        outer,
        Expression::Block(vec![lit(1), lit(2), lit(3), lit(4)])
    );
}

#[test]
fn flattening_is_idempotent() {
    let once = make_block(vec![lit(1), make_block(vec![lit(2), lit(3)]).unwrap()]).unwrap();
    let children = match &once {
        Expression::Block(children) => children.clone(),
        other => panic!("expected a block, got {other:?}"),
    };
    let twice = make_block(children).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn adjacent_literal_text_merges_into_one_constructor() {
    let merged = make_block(vec![text("ab"), text("cd"), lit(1)]).unwrap();
    match &merged {
        Expression::Block(children) => {
            assert_eq!(children.len(), 2);
            assert_eq!(children[0], text("abcd"));
        }
        other => panic!("expected a block, got {other:?}"),
    }
    // The merged tree pushes the same output as the unmerged children
    let unmerged = Expression::Block(vec![text("ab"), text("cd"), lit(1)]);
    assert_eq!(push_values(&merged), push_values(&unmerged));
}

#[test]
fn all_literal_text_collapses_to_one_constructor() {
    assert_eq!(
        make_block(vec![text("a"), text("b"), text("c")]).unwrap(),
        text("abc")
    );
}

#[test]
fn non_literal_text_is_not_merged() {
    let computed = Expression::ValueOf(Box::new(ValueOf {
        select: lit(1),
        separator: String::new(),
        loc: LocationId::NONE,
    }));
    let block = make_block(vec![text("a"), computed.clone()]).unwrap();
    assert_eq!(block, Expression::Block(vec![text("a"), computed]));
}

#[test]
fn single_child_collapses_to_the_child() {
    assert_eq!(make_block(vec![lit(7)]).unwrap(), lit(7));
}

#[test]
fn empty_block_yields_nothing() {
    let block = make_block(vec![]).unwrap();
    let ctx = empty_context();
    let items = block.evaluate_sequence(&ctx).unwrap();
    assert!(items.is_empty());
}

#[test]
fn iteration_preserves_document_order_of_children() {
    let block = make_block(vec![lit(1), lit(2), lit(3)]).unwrap();
    let ctx = empty_context();
    let items = block.evaluate_sequence(&ctx).unwrap();
    let values: Vec<String> = items.iter().map(|i| i.string_value()).collect();
    assert_eq!(values, ["1", "2", "3"]);
}

#[test]
fn choose_takes_the_first_true_branch() {
    let choose = Expression::Choose(Box::new(Choose::new(vec![
        (Expression::Literal(AtomicValue::Boolean(false)), lit(1)),
        (Expression::Literal(AtomicValue::Boolean(true)), lit(2)),
        (Expression::Literal(AtomicValue::Boolean(true)), lit(3)),
    ])));
    let ctx = empty_context();
    let items = choose.evaluate_sequence(&ctx).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].string_value(), "2");
}

#[test]
fn choose_with_no_true_branch_is_empty() {
    let choose = Expression::Choose(Box::new(Choose::new(vec![(
        Expression::Literal(AtomicValue::Boolean(false)),
        lit(1),
    )])));
    let ctx = empty_context();
    assert!(choose.evaluate_sequence(&ctx).unwrap().is_empty());
}
