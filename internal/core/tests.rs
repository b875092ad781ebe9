// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

//! End-to-end scenarios driving the whole pipeline: write → updater →
//! microtask → renderer → host tree. Each test runs on its own thread,
//! so the thread-local registries are isolated per test.

use crate::component::{self, ComponentClass, ComponentEngine, register_component};
use crate::dom::Node;
use crate::errors::ErrorCode;
use crate::filters::{FilterFn, register_filter};
use crate::microtask::process_microtasks;
use crate::state_class::StateClass;
use crate::template::register_template;
use crate::updater::take_unhandled_errors;
use crate::value::Value;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn bound(tag: &str, bind: &str) -> Node {
    let node = Node::element(tag);
    node.set_attribute("data-bind", bind);
    node
}

fn fragment_of(children: &[Node]) -> Node {
    let fragment = Node::fragment();
    for child in children {
        fragment.append_child(child);
    }
    fragment
}

fn mount(tag: &str, template_id: usize, class: Rc<StateClass>) -> (Rc<ComponentEngine>, Node) {
    register_component(ComponentClass::new(tag, template_id, class));
    let host = Node::element(tag);
    let engine = component::upgrade_element(&host).expect("component mounts");
    (engine, host)
}

fn assert_no_unhandled() {
    let errors = take_unhandled_errors();
    assert!(errors.is_empty(), "unhandled engine errors: {errors:?}");
}

/// The root nodes mounted for the component, placeholder excluded.
fn mounted_children(host: &Node) -> Vec<Node> {
    host.children().into_iter().filter(|node| !node.is_comment()).collect()
}

#[test]
fn counter_batches_same_tick_writes_into_one_render() {
    register_template(1, fragment_of(&[bound("span", "textContent:count")])).unwrap();
    let class = StateClass::builder("counter")
        .data(|| Value::object([(SmolStr::new("count"), Value::from(0.0))]))
        .build();
    let (engine, host) = mount("x-counter", 1, class);
    let span = mounted_children(&host).remove(0);
    assert_eq!(span.text_content(), "0");

    engine
        .update(|state| {
            state.set("count", Value::from(5.0))?;
            state.set("count", Value::from(7.0))
        })
        .unwrap();
    assert_eq!(span.text_content(), "0");
    // Two writes, one microtask, one render.
    assert_eq!(process_microtasks(), 1);
    assert_eq!(span.text_content(), "7");
    assert_no_unhandled();
}

#[test]
fn writes_outside_update_sessions_are_refused() {
    register_template(1, fragment_of(&[bound("span", "textContent:count")])).unwrap();
    let class = StateClass::builder("counter")
        .data(|| Value::object([(SmolStr::new("count"), Value::from(0.0))]))
        .getter("sneaky", |state| {
            state.set("count", Value::from(9.0))?;
            Ok(Value::Undefined)
        })
        .build();
    let (engine, _host) = mount("x-readonly", 1, class);
    // Getters run on a read-only accessor; their writes must fail.
    let err = engine.get_property_value("sneaky").unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateInvalidWrite);
    // Unknown properties surface the stable lookup code.
    let err = engine.get_property_value("missing").unwrap_err();
    assert_eq!(err.code(), ErrorCode::StatePropertyNotFound);
    process_microtasks();
    assert_no_unhandled();
}

fn item(n: &str) -> Value {
    Value::object([(SmolStr::new("n"), Value::from(n))])
}

fn list_template() -> (usize, usize) {
    // 20: <ul>@@|21 for:items</ul>; 21: <li data-bind="textContent:items.*.n"/>
    register_template(21, fragment_of(&[bound("li", "textContent:items.*.n")])).unwrap();
    let ul = Node::element("ul");
    ul.append_child(&Node::comment("@@|21 for:items"));
    register_template(20, fragment_of(&[ul])).unwrap();
    (20, 21)
}

fn list_class() -> Rc<StateClass> {
    StateClass::builder("list")
        .data(|| Value::object([(SmolStr::new("items"), Value::list(vec![item("a"), item("b")]))]))
        .build()
}

fn li_texts(ul: &Node) -> Vec<String> {
    ul.children()
        .into_iter()
        .filter(|node| !node.is_comment())
        .map(|node| node.text_content().to_string())
        .collect()
}

#[test]
fn list_append_reuses_existing_slots() {
    let (template_id, _) = list_template();
    let (engine, host) = mount("x-list", template_id, list_class());
    let ul = mounted_children(&host).remove(0);
    assert_eq!(li_texts(&ul), vec!["a", "b"]);

    let before: Vec<usize> =
        engine.get_list_indexes("items").unwrap().iter().map(|li| li.id()).collect();

    engine
        .update(|state| {
            let items = state.get("items")?;
            items.as_list().unwrap().borrow_mut().push(item("c"));
            state.set("items", items)
        })
        .unwrap();
    process_microtasks();

    assert_eq!(li_texts(&ul), vec!["a", "b", "c"]);
    let after: Vec<usize> =
        engine.get_list_indexes("items").unwrap().iter().map(|li| li.id()).collect();
    assert_eq!(after.len(), 3);
    // The two existing identities survived the append.
    assert_eq!(&after[..2], &before[..]);
    assert_no_unhandled();
}

#[test]
fn elementwise_permutation_reorders_without_rebuilding() {
    let (template_id, _) = list_template();
    let class = StateClass::builder("list")
        .data(|| {
            Value::object([(
                SmolStr::new("items"),
                Value::list(vec![item("a"), item("b"), item("c")]),
            )])
        })
        .build();
    let (engine, host) = mount("x-swap", template_id, class);
    let ul = mounted_children(&host).remove(0);
    assert_eq!(li_texts(&ul), vec!["a", "b", "c"]);
    let nodes_before: Vec<usize> =
        ul.children().iter().filter(|n| !n.is_comment()).map(|n| n.id()).collect();
    let ids_before: Vec<usize> =
        engine.get_list_indexes("items").unwrap().iter().map(|li| li.id()).collect();

    // splice(0, len, c, a, b) expressed as element writes.
    engine
        .update(|state| {
            let items = state.get("items")?.items();
            let (a, b, c) = (items[0].clone(), items[1].clone(), items[2].clone());
            state.resolve_set("items.*", &[0], c)?;
            state.resolve_set("items.*", &[1], a)?;
            state.resolve_set("items.*", &[2], b)
        })
        .unwrap();
    process_microtasks();

    assert_eq!(li_texts(&ul), vec!["c", "a", "b"]);
    // No <li> was destroyed, they moved.
    let mut nodes_after: Vec<usize> =
        ul.children().iter().filter(|n| !n.is_comment()).map(|n| n.id()).collect();
    assert_eq!(nodes_after.len(), 3);
    nodes_after.sort_unstable();
    let mut nodes_before_sorted = nodes_before;
    nodes_before_sorted.sort_unstable();
    assert_eq!(nodes_after, nodes_before_sorted);

    // The identities were permuted and renumbered 0,1,2 in value order.
    let after = engine.get_list_indexes("items").unwrap();
    let ids_after: Vec<usize> = after.iter().map(|li| li.id()).collect();
    assert_eq!(ids_after, vec![ids_before[2], ids_before[0], ids_before[1]]);
    for (position, li) in after.iter().enumerate() {
        assert_eq!(li.index(), position);
    }
    assert_no_unhandled();
}

#[test]
fn clearing_and_refilling_a_list_reuses_the_pool() {
    let (template_id, _) = list_template();
    let (engine, host) = mount("x-pool", template_id, list_class());
    let ul = mounted_children(&host).remove(0);
    let li_node_ids: Vec<usize> =
        ul.children().iter().filter(|n| !n.is_comment()).map(|n| n.id()).collect();

    engine.update(|state| state.set("items", Value::list(vec![]))).unwrap();
    process_microtasks();
    // All-remove fast path: only the anchor survives.
    assert_eq!(ul.child_count(), 1);
    assert!(ul.first_child().unwrap().is_comment());

    engine.update(|state| state.set("items", Value::list(vec![item("z")]))).unwrap();
    process_microtasks();
    assert_eq!(li_texts(&ul), vec!["z"]);
    // The refilled slot reuses a pooled node instead of a fresh one.
    let refilled = ul.children().into_iter().find(|n| !n.is_comment()).unwrap();
    assert!(li_node_ids.contains(&refilled.id()));
    assert_no_unhandled();
}

#[test]
fn conditional_mounts_and_unmounts_after_its_marker() {
    register_template(31, fragment_of(&[bound("p", "textContent:open")])).unwrap();
    let div = Node::element("div");
    div.append_child(&Node::comment("@@|31 if:open"));
    register_template(30, fragment_of(&[div])).unwrap();
    let class = StateClass::builder("toggle")
        .data(|| Value::object([(SmolStr::new("open"), Value::from(false))]))
        .build();
    let (engine, host) = mount("x-toggle", 30, class);
    let div = mounted_children(&host).remove(0);
    assert_eq!(div.child_count(), 1, "only the marker while closed");

    engine.update(|state| state.set("open", Value::from(true))).unwrap();
    process_microtasks();
    let children = div.children();
    assert_eq!(children.len(), 2);
    assert!(children[0].is_comment());
    assert_eq!(children[1].tag().unwrap(), "p");
    assert_eq!(children[1].text_content(), "true");

    engine.update(|state| state.set("open", Value::from(false))).unwrap();
    process_microtasks();
    assert_eq!(div.child_count(), 1);
    assert_no_unhandled();
}

#[test]
fn conditional_rejects_non_boolean_values() {
    register_template(33, fragment_of(&[bound("p", "textContent:open")])).unwrap();
    let div = Node::element("div");
    div.append_child(&Node::comment("@@|33 if:open"));
    register_template(32, fragment_of(&[div])).unwrap();
    let class = StateClass::builder("toggle")
        .data(|| Value::object([(SmolStr::new("open"), Value::from(1.0))]))
        .build();
    register_component(ComponentClass::new("x-badif", 32, class));
    let host = Node::element("x-badif");
    let err = component::upgrade_element(&host).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BindContract);
}

#[test]
fn getter_reads_record_dynamic_dependencies() {
    register_template(40, fragment_of(&[bound("span", "textContent:full")])).unwrap();
    let evaluations = Rc::new(Cell::new(0usize));
    let spy = evaluations.clone();
    let class = StateClass::builder("name")
        .data(|| {
            Value::object([
                (SmolStr::new("first"), Value::from("A")),
                (SmolStr::new("last"), Value::from("B")),
            ])
        })
        .getter("full", move |state| {
            spy.set(spy.get() + 1);
            let first = state.get("first")?.to_text();
            let last = state.get("last")?.to_text();
            Ok(Value::from(format!("{first} {last}").as_str()))
        })
        .build();
    let (engine, host) = mount("x-name", 40, class);
    let span = mounted_children(&host).remove(0);
    assert_eq!(span.text_content(), "A B");
    let after_mount = evaluations.get();

    // No static edge `first -> full` exists; the dynamic edge recorded
    // during the first evaluation carries the update.
    engine.update(|state| state.set("first", Value::from("C"))).unwrap();
    process_microtasks();
    assert_eq!(span.text_content(), "C B");
    assert!(evaluations.get() > after_mount);

    // A stale cache entry is never served: external reads recompute too.
    engine.update(|state| state.set("last", Value::from("D"))).unwrap();
    assert_eq!(engine.get_property_value("full").unwrap().to_text(), "C D");
    process_microtasks();
    assert_eq!(span.text_content(), "C D");
    assert_no_unhandled();
}

#[test]
fn each_binding_applies_at_most_once_per_render() {
    let applications = Rc::new(Cell::new(0usize));
    let spy = applications.clone();
    register_filter(
        "spy",
        Rc::new(move |_options| {
            let spy = spy.clone();
            Ok(Rc::new(move |value: &Value| {
                spy.set(spy.get() + 1);
                Ok(value.clone())
            }) as FilterFn)
        }),
    );
    register_template(50, fragment_of(&[bound("span", "textContent:count|spy")])).unwrap();
    let class = StateClass::builder("counter")
        .data(|| Value::object([(SmolStr::new("count"), Value::from(0.0))]))
        .build();
    let (engine, _host) = mount("x-once", 50, class);
    let after_mount = applications.get();
    assert_eq!(after_mount, 1);

    engine
        .update(|state| {
            state.set("count", Value::from(1.0))?;
            state.set("count", Value::from(2.0))?;
            state.set("count", Value::from(3.0))
        })
        .unwrap();
    process_microtasks();
    assert_eq!(applications.get(), after_mount + 1);
    assert_no_unhandled();
}

#[test]
fn updated_callback_sees_written_paths_and_indexes() {
    let (template_id, _) = list_template();
    let seen: Rc<RefCell<Vec<(Vec<String>, usize)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let class = StateClass::builder("list")
        .data(|| Value::object([(SmolStr::new("items"), Value::list(vec![item("a"), item("b")]))]))
        .on_updated(move |_state, paths, indexes_by_path| {
            let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
            let indexed = indexes_by_path.values().map(Vec::len).sum();
            sink.borrow_mut().push((paths, indexed));
            Ok(())
        })
        .build();
    let (engine, _host) = mount("x-updated", template_id, class);

    engine
        .update(|state| {
            let items = state.get("items")?.items();
            let (a, b) = (items[0].clone(), items[1].clone());
            state.resolve_set("items.*", &[0], b)?;
            state.resolve_set("items.*", &[1], a)
        })
        .unwrap();
    process_microtasks();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    let (paths, indexed_writes) = &seen[0];
    assert_eq!(paths, &vec!["items.*".to_string()]);
    assert_eq!(*indexed_writes, 2);
    assert_no_unhandled();
}

#[test]
fn events_run_methods_with_the_loop_scope_installed() {
    // 61: <button data-bind="textContent:items.*.n; onClick:pick"/>
    register_template(61, fragment_of(&[bound("button", "textContent:items.*.n; onClick:pick")]))
        .unwrap();
    let ul = Node::element("ul");
    ul.append_child(&Node::comment("@@|61 for:items"));
    register_template(
        60,
        fragment_of(&[ul, bound("span", "textContent:picked")]),
    )
    .unwrap();
    let class = StateClass::builder("picker")
        .data(|| {
            Value::object([
                (SmolStr::new("items"), Value::list(vec![item("a"), item("b")])),
                (SmolStr::new("picked"), Value::from("")),
            ])
        })
        .method("pick", |state, _args| {
            let n = state.get("items.*.n")?;
            state.set("picked", n)?;
            Ok(Value::Undefined)
        })
        .build();
    let (_engine, host) = mount("x-picker", 60, class);
    let children = mounted_children(&host);
    let (ul, span) = (children[0].clone(), children[1].clone());
    let second = ul.children().into_iter().filter(|n| !n.is_comment()).nth(1).unwrap();

    second.dispatch_event("click", Value::Undefined);
    process_microtasks();
    assert_eq!(span.text_content(), "b");
    assert_no_unhandled();
}

#[test]
fn child_component_forwarding_translates_paths() {
    // Child: <span data-bind="textContent:user.name"/>
    register_template(71, fragment_of(&[bound("span", "textContent:user.name")])).unwrap();
    // Parent: <child-el data-bind="state.user:profile.user"/>
    register_template(70, fragment_of(&[bound("child-el", "state.user:profile.user")])).unwrap();
    let parent_class = StateClass::builder("parent")
        .data(|| {
            Value::object([(
                SmolStr::new("profile"),
                Value::object([(
                    SmolStr::new("user"),
                    Value::object([(SmolStr::new("name"), Value::from("Ada"))]),
                )]),
            )])
        })
        .build();
    let (parent, host) = mount("x-parent", 70, parent_class);
    let child_host = mounted_children(&host).remove(0);

    // The child tag is defined only now: the when_defined waiter fires.
    let child_class = StateClass::builder("child").data(|| Value::object([])).build();
    register_component(ComponentClass::new("child-el", 71, child_class));
    process_microtasks();
    let span = mounted_children(&child_host).remove(0);
    assert_eq!(span.text_content(), "Ada");

    // A deep write at the parent reaches the child translated.
    parent
        .update(|state| state.set("profile.user.name", Value::from("Grace")))
        .unwrap();
    process_microtasks();
    assert_eq!(span.text_content(), "Grace");

    // A wholesale write forwards the bound ref unchanged.
    parent
        .update(|state| {
            state.set(
                "profile.user",
                Value::object([(SmolStr::new("name"), Value::from("Edsger"))]),
            )
        })
        .unwrap();
    process_microtasks();
    assert_eq!(span.text_content(), "Edsger");
    assert_no_unhandled();
}

#[test]
fn data_state_json_seeds_the_instance() {
    register_template(80, fragment_of(&[bound("span", "textContent:count")])).unwrap();
    let class = StateClass::builder("seeded")
        .data(|| Value::object([(SmolStr::new("count"), Value::from(0.0))]))
        .build();
    register_component(ComponentClass::new("x-seeded", 80, class));
    let host = Node::element("x-seeded");
    host.set_attribute("data-state", r#"{"count": 41}"#);
    let engine = component::upgrade_element(&host).unwrap();
    let span = mounted_children(&host).remove(0);
    assert_eq!(span.text_content(), "41");

    engine.set_property_value("count", Value::from(42.0)).unwrap();
    process_microtasks();
    assert_eq!(span.text_content(), "42");
    assert_eq!(engine.get_property_value("count").unwrap(), Value::from(42.0));
    assert_no_unhandled();
}
