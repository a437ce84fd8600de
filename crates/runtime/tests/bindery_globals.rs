//! Global variables: lazy evaluation, circularity detection (both the
//! static freeze-time check and the dynamic one) and supplied parameters.

use std::sync::Arc;

use xslt_runtime::instruct::*;
use xslt_runtime::*;

fn lit(s: &str) -> Expression {
    Expression::Literal(AtomicValue::String(s.to_string()))
}

fn global_ref(slot: usize, name: &str) -> Expression {
    Expression::GlobalVariable {
        slot,
        name: QName::local(name),
    }
}

fn pull_context(exec: Arc<Executable>) -> (Arc<Controller<TreeNode>>, Context<TreeNode>) {
    let controller = ControllerBuilder::new(exec, Arc::new(StdTreeModel)).build();
    let ctx =
        controller.new_context(Box::new(SequenceCollector::new(Arc::new(StdTreeModel))));
    (controller, ctx)
}

#[test]
fn global_variable_evaluates_through_the_bindery() {
    let mut builder = Executable::builder();
    let slot = builder.add_global(GlobalVariableDef {
        name: QName::local("greeting"),
        select: lit("hello"),
        is_param: false,
        required: false,
        slots: 0,
        loc: LocationId::NONE,
    });
    let (_, ctx) = pull_context(builder.build().unwrap());
    let items = global_ref(slot, "greeting").evaluate_sequence(&ctx).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].string_value(), "hello");
}

#[test]
fn one_global_may_read_another() {
    let mut builder = Executable::builder();
    let base = builder.add_global(GlobalVariableDef {
        name: QName::local("base"),
        select: lit("x"),
        is_param: false,
        required: false,
        slots: 0,
        loc: LocationId::NONE,
    });
    let derived = builder.add_global(GlobalVariableDef {
        name: QName::local("derived"),
        select: Expression::StringJoin {
            select: Box::new(global_ref(base, "base")),
            separator: String::new(),
        },
        is_param: false,
        required: false,
        slots: 0,
        loc: LocationId::NONE,
    });
    let (_, ctx) = pull_context(builder.build().unwrap());
    let items = global_ref(derived, "derived").evaluate_sequence(&ctx).unwrap();
    assert_eq!(items[0].string_value(), "x");
}

#[test]
fn mutually_recursive_globals_fail_at_freeze_time() {
    let mut builder = Executable::builder();
    // Slot numbers are allocated in registration order
    builder.add_global(GlobalVariableDef {
        name: QName::local("a"),
        select: global_ref(1, "b"),
        is_param: false,
        required: false,
        slots: 0,
        loc: LocationId::NONE,
    });
    builder.add_global(GlobalVariableDef {
        name: QName::local("b"),
        select: global_ref(0, "a"),
        is_param: false,
        required: false,
        slots: 0,
        loc: LocationId::NONE,
    });
    let err = builder.build().unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE0640);
    assert!(err.is_circularity());
}

#[test]
fn same_thread_reentry_is_a_circular_definition() {
    let bindery: Bindery<TreeNode> = Bindery::new(1);
    let name = QName::local("x");
    let err = bindery
        .global_value(0, &name, || bindery.global_value(0, &name, || Ok(vec![])))
        .unwrap_err();
    assert!(err.is_circularity());
}

#[test]
fn concurrent_readers_converge_on_one_value() {
    let bindery: Arc<Bindery<TreeNode>> = Arc::new(Bindery::new(1));
    let name = QName::local("shared");
    let results = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bindery = Arc::clone(&bindery);
                let name = name.clone();
                s.spawn(move || {
                    bindery.global_value(0, &name, || {
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        Ok(vec![Item::Atomic(AtomicValue::Integer(i))])
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("reader thread"))
            .collect::<Vec<_>>()
    });
    let first = results[0].as_ref().unwrap()[0].string_value();
    for r in &results {
        let value = r.as_ref().unwrap();
        assert_eq!(value.len(), 1);
        assert_eq!(value[0].string_value(), first);
    }
}

#[test]
fn required_stylesheet_parameter_must_be_supplied() {
    let mut builder = Executable::builder();
    let slot = builder.add_global(GlobalVariableDef {
        name: QName::local("input"),
        select: make_block(vec![]).unwrap(),
        is_param: true,
        required: true,
        slots: 0,
        loc: LocationId::NONE,
    });
    let (controller, ctx) = pull_context(builder.build().unwrap());

    let err = global_ref(slot, "input").evaluate_sequence(&ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XTDE0050);

    // Supplying the parameter resets the bindery so the next read succeeds
    controller.set_parameter(
        QName::local("input"),
        vec![Item::Atomic(AtomicValue::String("supplied".to_string()))],
    );
    let items = global_ref(slot, "input").evaluate_sequence(&ctx).unwrap();
    assert_eq!(items[0].string_value(), "supplied");
}

#[test]
fn optional_parameter_uses_its_default_until_supplied() {
    let mut builder = Executable::builder();
    let slot = builder.add_global(GlobalVariableDef {
        name: QName::local("mode"),
        select: lit("default"),
        is_param: true,
        required: false,
        slots: 0,
        loc: LocationId::NONE,
    });
    let (controller, ctx) = pull_context(builder.build().unwrap());

    let items = global_ref(slot, "mode").evaluate_sequence(&ctx).unwrap();
    assert_eq!(items[0].string_value(), "default");

    controller.set_parameter(
        QName::local("mode"),
        vec![Item::Atomic(AtomicValue::String("strict".to_string()))],
    );
    let items = global_ref(slot, "mode").evaluate_sequence(&ctx).unwrap();
    assert_eq!(items[0].string_value(), "strict");
}
