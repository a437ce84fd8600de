//! Rule dispatch: built-in rules, a caller-supplied rule resolver, and
//! mode propagation.

use std::collections::HashMap;
use std::sync::Arc;

use xslt_runtime::instruct::*;
use xslt_runtime::*;

/// <doc><a>hello</a><b>world</b></doc>
fn sample_doc() -> TreeNode {
    let doc = TreeNode::document();
    let root = TreeNode::element(QName::local("doc"));
    let a = TreeNode::element(QName::local("a"));
    a.push_child(TreeNode::text("hello"));
    let b = TreeNode::element(QName::local("b"));
    b.push_child(TreeNode::text("world"));
    root.push_child(a);
    root.push_child(b);
    doc.push_child(root);
    doc
}

fn apply(
    controller: &Arc<Controller<TreeNode>>,
    items: Sequence<TreeNode>,
    mode: Option<QName>,
) -> Vec<Item<TreeNode>> {
    let sink = SharedSink::new(SequenceCollector::new(Arc::new(StdTreeModel)));
    let handle = sink.handle();
    controller
        .apply_templates(items, mode, Box::new(sink))
        .unwrap();
    let items = handle.0.borrow_mut().take_items().unwrap();
    items
}

/// Maps element names to templates; ignores everything else so the
/// built-in rules take over.
struct NameRules {
    by_name: HashMap<QName, Arc<Template>>,
    mode: Option<QName>,
}

impl TemplateRules<TreeNode> for NameRules {
    fn match_item(
        &self,
        item: &Item<TreeNode>,
        mode: Option<&QName>,
        _controller: &Controller<TreeNode>,
    ) -> Result<Option<Arc<Template>>, Error> {
        if mode != self.mode.as_ref() {
            return Ok(None);
        }
        match item {
            Item::Node(n) if n.kind() == NodeKind::Element => {
                Ok(n.name().and_then(|q| self.by_name.get(&q)).cloned())
            }
            _ => Ok(None),
        }
    }
}

fn wrap_in(elem_name: &str) -> Arc<Template> {
    Arc::new(Template {
        name: None,
        params: vec![],
        slots: 0,
        body: Expression::Element(Box::new(ElementCtor {
            name: NameSource::Fixed(QName::local(elem_name)),
            namespaces: vec![],
            content: Expression::ValueOf(Box::new(ValueOf {
                select: Expression::ContextItem,
                separator: " ".to_string(),
                loc: LocationId::NONE,
            })),
            inherit_namespaces: true,
            validation: ValidationMode::Strip,
            loc: LocationId::NONE,
        })),
        loc: LocationId::NONE,
    })
}

#[test]
fn builtin_rules_emit_the_text_of_the_tree() {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    let out = apply(&controller, vec![Item::Node(sample_doc())], None);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].string_value(), "helloworld");
}

#[test]
fn builtin_rules_skip_comments_and_pis() {
    let doc = TreeNode::document();
    doc.push_child(TreeNode::comment("ignore me"));
    doc.push_child(TreeNode::text("keep"));
    doc.push_child(TreeNode::pi("skip", "me too"));

    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    let out = apply(&controller, vec![Item::Node(doc)], None);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].string_value(), "keep");
}

#[test]
fn matched_rules_replace_the_builtin_behavior() {
    let mut by_name = HashMap::new();
    by_name.insert(QName::local("a"), wrap_in("matched"));
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_rules(Arc::new(NameRules {
            by_name,
            mode: None,
        }))
        .build();

    let out = apply(&controller, vec![Item::Node(sample_doc())], None);
    // <a> was wrapped by its rule, <b> fell through to the built-in rule
    assert_eq!(out.len(), 2);
    match &out[0] {
        Item::Node(n) => {
            assert_eq!(n.name().unwrap(), QName::local("matched"));
            assert_eq!(n.string_value(), "hello");
        }
        other => panic!("expected an element, got {other:?}"),
    }
    assert_eq!(out[1].string_value(), "world");
}

#[test]
fn rules_bound_to_a_mode_only_fire_in_that_mode() {
    let loud = QName::local("loud");
    let mut by_name = HashMap::new();
    by_name.insert(QName::local("a"), wrap_in("shout"));
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel))
        .with_rules(Arc::new(NameRules {
            by_name,
            mode: Some(loud.clone()),
        }))
        .build();

    // Default mode: nothing matches, built-ins flatten the tree
    let out = apply(&controller, vec![Item::Node(sample_doc())], None);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].string_value(), "helloworld");

    // The named mode propagates through the built-in rules to <a>
    let out = apply(&controller, vec![Item::Node(sample_doc())], Some(loud));
    assert_eq!(out.len(), 2);
    match &out[0] {
        Item::Node(n) => assert_eq!(n.name().unwrap(), QName::local("shout")),
        other => panic!("expected an element, got {other:?}"),
    }
}

#[test]
fn atomic_items_pass_through_with_space_separation() {
    let exec = Executable::builder().build().unwrap();
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    let out = apply(
        &controller,
        vec![
            Item::Atomic(AtomicValue::Integer(1)),
            Item::Atomic(AtomicValue::Integer(2)),
        ],
        None,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].string_value(), "1 2");
}
