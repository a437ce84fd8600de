//! The four grouping algorithms, group sorting and collation handling.

use std::sync::Arc;

use xslt_runtime::instruct::*;
use xslt_runtime::*;

fn lit(s: &str) -> Expression {
    Expression::Literal(AtomicValue::String(s.to_string()))
}

fn int(i: i64) -> Expression {
    Expression::Literal(AtomicValue::Integer(i))
}

fn strings(values: &[&str]) -> Expression {
    make_block(values.iter().map(|s| lit(s)).collect()).unwrap()
}

/// Wraps per-group output in an element so adjacent groups stay distinct
/// items in the collected sequence.
fn group_elem(content: Expression) -> Expression {
    Expression::Element(Box::new(ElementCtor {
        name: NameSource::Fixed(QName::local("g")),
        namespaces: vec![],
        content,
        inherit_namespaces: true,
        validation: ValidationMode::Strip,
        loc: LocationId::NONE,
    }))
}

/// Emits one element per group holding the group's members joined with "+".
fn join_group_body() -> Expression {
    group_elem(Expression::ValueOf(Box::new(ValueOf {
        select: Expression::CurrentGroup,
        separator: "+".to_string(),
        loc: LocationId::NONE,
    })))
}

fn grouping(
    select: Expression,
    algorithm: GroupingAlgorithm,
    collation: Option<Expression>,
    sort_keys: Vec<SortKey>,
    body: Expression,
) -> Expression {
    Expression::ForEachGroup(Box::new(ForEachGroup {
        select,
        algorithm,
        collation,
        sort_keys,
        body,
        loc: LocationId::NONE,
    }))
}

fn context() -> Context<TreeNode> {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    controller.new_context(Box::new(SequenceCollector::new(Arc::new(StdTreeModel))))
}

fn run(expr: &Expression) -> Vec<String> {
    let ctx = context();
    expr.evaluate_sequence(&ctx)
        .unwrap()
        .iter()
        .map(|i| i.string_value())
        .collect()
}

#[test]
fn group_by_uses_first_appearance_order() {
    let expr = grouping(
        strings(&["b", "a", "b", "c", "a"]),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["b+b", "a+a", "c"]);
}

#[test]
fn group_by_merges_numerically_equal_keys() {
    // An integer 1 and a double 1.0 carry the same key
    let expr = grouping(
        make_block(vec![
            int(1),
            int(2),
            Expression::Literal(AtomicValue::Double(1.0)),
            int(3),
        ])
        .unwrap(),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["1+1", "2", "3"]);
}

#[test]
fn group_by_keeps_large_integer_keys_distinct() {
    // Neighbouring i64 values above 2^53 are indistinguishable as doubles
    let a = 9_007_199_254_740_993i64;
    let b = 9_007_199_254_740_994i64;
    let expr = grouping(
        make_block(vec![int(a), int(b), int(a)]).unwrap(),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), [format!("{a}+{a}"), b.to_string()]);
}

#[test]
fn group_adjacent_splits_on_key_change() {
    let expr = grouping(
        strings(&["a", "a", "b", "a"]),
        GroupingAlgorithm::AdjacentKey(Expression::ContextItem),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["a+a", "b", "a"]);
}

#[test]
fn group_starting_when_opens_on_each_match() {
    let header = Expression::Compare {
        op: CompareOp::Eq,
        lhs: Box::new(Expression::ContextItem),
        rhs: Box::new(lit("h")),
    };
    let expr = grouping(
        strings(&["h", "p", "q", "h", "x"]),
        GroupingAlgorithm::StartingWhen(header),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["h+p+q", "h+x"]);
}

#[test]
fn leading_items_before_the_first_match_form_their_own_group() {
    let header = Expression::Compare {
        op: CompareOp::Eq,
        lhs: Box::new(Expression::ContextItem),
        rhs: Box::new(lit("h")),
    };
    let expr = grouping(
        strings(&["intro", "h", "a"]),
        GroupingAlgorithm::StartingWhen(header),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["intro", "h+a"]);
}

#[test]
fn group_ending_when_closes_on_each_match() {
    let terminator = Expression::Compare {
        op: CompareOp::Eq,
        lhs: Box::new(Expression::ContextItem),
        rhs: Box::new(lit("end")),
    };
    let expr = grouping(
        strings(&["a", "end", "b", "c", "end", "d"]),
        GroupingAlgorithm::EndingWhen(terminator),
        None,
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["a+end", "b+c+end", "d"]);
}

#[test]
fn groups_are_sorted_by_their_initial_items() {
    let asc = grouping(
        strings(&["b", "a", "c", "a"]),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        None,
        vec![SortKey {
            select: Expression::ContextItem,
            descending: false,
        }],
        join_group_body(),
    );
    assert_eq!(run(&asc), ["a+a", "b", "c"]);

    let desc = grouping(
        strings(&["b", "a", "c", "a"]),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        None,
        vec![SortKey {
            select: Expression::ContextItem,
            descending: true,
        }],
        join_group_body(),
    );
    assert_eq!(run(&desc), ["c", "b", "a+a"]);
}

#[test]
fn case_blind_collation_merges_case_variants() {
    let expr = grouping(
        strings(&["A", "a", "b"]),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        Some(lit(consts::CASE_BLIND_URI)),
        vec![],
        join_group_body(),
    );
    assert_eq!(run(&expr), ["A+a", "b"]);
}

#[test]
fn unknown_collation_uri_is_an_error() {
    let expr = grouping(
        strings(&["a"]),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        Some(lit("urn:x-test:no-such-collation")),
        vec![],
        join_group_body(),
    );
    let ctx = context();
    let err = expr.evaluate_sequence(&ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE1110);
}

#[test]
fn grouping_key_is_visible_inside_the_body() {
    let expr = grouping(
        strings(&["a", "b", "a"]),
        GroupingAlgorithm::ByKey(Expression::ContextItem),
        None,
        vec![],
        group_elem(Expression::ValueOf(Box::new(ValueOf {
            select: Expression::CurrentGroupingKey,
            separator: " ".to_string(),
            loc: LocationId::NONE,
        }))),
    );
    assert_eq!(run(&expr), ["a", "b"]);
}

#[test]
fn group_focus_numbers_the_groups() {
    let expr = grouping(
        strings(&["a", "b", "b"]),
        GroupingAlgorithm::AdjacentKey(Expression::ContextItem),
        None,
        vec![],
        group_elem(Expression::ValueOf(Box::new(ValueOf {
            select: Expression::Position,
            separator: " ".to_string(),
            loc: LocationId::NONE,
        }))),
    );
    assert_eq!(run(&expr), ["1", "2"]);
}

#[test]
fn current_group_outside_grouping_is_empty() {
    let ctx = context();
    assert!(
        Expression::CurrentGroup
            .evaluate_sequence(&ctx)
            .unwrap()
            .is_empty()
    );
    assert!(
        Expression::CurrentGroupingKey
            .evaluate_sequence(&ctx)
            .unwrap()
            .is_empty()
    );
}
