//! Comment and processing-instruction construction: content repair under
//! the XSLT rules, rejection under the XQuery rules.

use std::sync::Arc;

use rstest::rstest;
use xslt_runtime::instruct::*;
use xslt_runtime::*;

fn lit(s: &str) -> Expression {
    Expression::Literal(AtomicValue::String(s.to_string()))
}

fn comment(select: Expression) -> Expression {
    Expression::Comment(Box::new(CommentCtor {
        select,
        loc: LocationId::NONE,
    }))
}

fn pi(target: PiTarget, select: Expression) -> Expression {
    Expression::ProcessingInstruction(Box::new(PiCtor {
        target,
        select,
        loc: LocationId::NONE,
    }))
}

fn context(host: HostLanguage) -> Context<TreeNode> {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_host_language(host)
        .build();
    controller.new_context(Box::new(SequenceCollector::new(Arc::new(StdTreeModel))))
}

fn eval_node(expr: &Expression, ctx: &Context<TreeNode>) -> TreeNode {
    let items = expr.evaluate_sequence(ctx).unwrap();
    assert_eq!(items.len(), 1);
    match items.into_iter().next().unwrap() {
        Item::Node(n) => n,
        Item::Atomic(a) => panic!("expected a node, got atomic {a:?}"),
    }
}

#[rstest]
#[case("plain text", "plain text")]
#[case("a--b", "a- -b")]
#[case("a----b", "a- - - -b")]
#[case("ends with-", "ends with- ")]
#[case("--", "- - ")]
#[case("", "")]
fn comment_content_is_repaired(#[case] input: &str, #[case] expected: &str) {
    let ctx = context(HostLanguage::Xslt);
    let node = eval_node(&comment(lit(input)), &ctx);
    assert_eq!(node.kind(), NodeKind::Comment);
    assert_eq!(node.string_value(), expected);
}

#[rstest]
#[case("a--b")]
#[case("trailing-")]
fn repairing_repaired_content_changes_nothing(#[case] input: &str) {
    let ctx = context(HostLanguage::Xslt);
    let once = eval_node(&comment(lit(input)), &ctx).string_value();
    let twice = eval_node(&comment(lit(&once)), &ctx).string_value();
    assert_eq!(once, twice);
}

#[rstest]
#[case("a--b")]
#[case("trailing-")]
fn xquery_rejects_ill_formed_comment_content(#[case] input: &str) {
    let ctx = context(HostLanguage::Xquery);
    let err = comment(lit(input)).evaluate_sequence(&ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XQDY0072);
}

#[test]
fn pi_carries_target_and_trimmed_data() {
    let ctx = context(HostLanguage::Xslt);
    let node = eval_node(
        &pi(PiTarget::Fixed("style".to_string()), lit("  href=x ")),
        &ctx,
    );
    assert_eq!(node.kind(), NodeKind::ProcessingInstruction);
    assert_eq!(node.name().unwrap(), QName::local("style"));
    assert_eq!(node.string_value(), "href=x ");
}

#[rstest]
#[case("xml")]
#[case("XML")]
#[case("Xml")]
#[case("not a name")]
#[case("")]
fn reserved_or_invalid_pi_targets_are_rejected(#[case] target: &str) {
    let ctx = context(HostLanguage::Xslt);
    let err = pi(PiTarget::Fixed(target.to_string()), lit("data"))
        .evaluate_sequence(&ctx)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE0890);
}

#[test]
fn computed_pi_target_is_checked_too() {
    let ctx = context(HostLanguage::Xslt);
    let err = pi(PiTarget::Computed(Box::new(lit("xml"))), lit("data"))
        .evaluate_sequence(&ctx)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE0890);
}

#[test]
fn pi_data_close_sequence_is_repaired_for_xslt() {
    let ctx = context(HostLanguage::Xslt);
    let node = eval_node(&pi(PiTarget::Fixed("p".to_string()), lit("a?>b")), &ctx);
    assert_eq!(node.string_value(), "a? >b");
}

#[test]
fn pi_data_close_sequence_is_rejected_for_xquery() {
    let ctx = context(HostLanguage::Xquery);
    let err = pi(PiTarget::Fixed("p".to_string()), lit("a?>b"))
        .evaluate_sequence(&ctx)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::XQDY0026);
}
