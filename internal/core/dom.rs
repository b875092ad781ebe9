// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Retained host tree.

    The engine renders into an in-memory node tree with the same surface
    a browser document offers to the binding layer: elements with
    attributes, properties, a class list and inline style, text nodes and
    comment markers. Keeping the tree in process makes the whole pipeline
    testable headless; a real document backend is an embedding concern.
*/

use crate::value::Value;
use smol_str::{SmolStr, ToSmolStr};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

fn next_node_id() -> usize {
    thread_local!(static NEXT_ID: Cell<usize> = const { Cell::new(1) });
    NEXT_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

type EventHandler = Rc<dyn Fn(&Event)>;

/// Payload of an element node.
pub struct ElementData {
    tag: SmolStr,
    attributes: RefCell<BTreeMap<SmolStr, SmolStr>>,
    properties: RefCell<BTreeMap<SmolStr, Value>>,
    classes: RefCell<Vec<SmolStr>>,
    styles: RefCell<BTreeMap<SmolStr, SmolStr>>,
    listeners: RefCell<BTreeMap<SmolStr, Vec<EventHandler>>>,
}

/// What a node is.
pub enum NodeKind {
    /// An element with a tag name.
    Element(ElementData),
    /// A text node.
    Text(RefCell<SmolStr>),
    /// A comment marker.
    Comment(RefCell<SmolStr>),
    /// A detached container whose children move when it is inserted.
    Fragment,
}

struct NodeData {
    id: usize,
    kind: NodeKind,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
}

/// A handle to one node of the retained tree. Clones share the node.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeData>,
}

/// An event dispatched on a node.
pub struct Event {
    name: SmolStr,
    target: Node,
    detail: Value,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl Event {
    /// The event name.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// The node the event was dispatched on.
    pub fn target(&self) -> &Node {
        &self.target
    }

    /// The payload given to [`Node::dispatch_event`].
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Mark the default action as cancelled.
    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    /// True when [`Event::prevent_default`] was called.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Stop the event from bubbling further up.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }
}

impl Node {
    fn new(kind: NodeKind) -> Node {
        Node {
            inner: Rc::new(NodeData {
                id: next_node_id(),
                kind,
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create an element node.
    pub fn element(tag: impl Into<SmolStr>) -> Node {
        Node::new(NodeKind::Element(ElementData {
            tag: tag.into(),
            attributes: RefCell::new(BTreeMap::new()),
            properties: RefCell::new(BTreeMap::new()),
            classes: RefCell::new(Vec::new()),
            styles: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(BTreeMap::new()),
        }))
    }

    /// Create a text node.
    pub fn text(content: impl Into<SmolStr>) -> Node {
        Node::new(NodeKind::Text(RefCell::new(content.into())))
    }

    /// Create a comment marker.
    pub fn comment(content: impl Into<SmolStr>) -> Node {
        Node::new(NodeKind::Comment(RefCell::new(content.into())))
    }

    /// Create a detached fragment container.
    pub fn fragment() -> Node {
        Node::new(NodeKind::Fragment)
    }

    /// A process-unique id, stable for the node's lifetime.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// True when both handles point at the same node.
    pub fn is_same(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The tag name, for element nodes.
    pub fn tag(&self) -> Option<SmolStr> {
        match &self.inner.kind {
            NodeKind::Element(e) => Some(e.tag.clone()),
            _ => None,
        }
    }

    /// True for element nodes.
    pub fn is_element(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Element(_))
    }

    /// True for comment markers.
    pub fn is_comment(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Comment(_))
    }

    /// True for fragments.
    pub fn is_fragment(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Fragment)
    }

    /// The data of a text or comment node.
    pub fn data(&self) -> Option<SmolStr> {
        match &self.inner.kind {
            NodeKind::Text(t) => Some(t.borrow().clone()),
            NodeKind::Comment(c) => Some(c.borrow().clone()),
            _ => None,
        }
    }

    /// Overwrite the data of a text or comment node.
    pub fn set_data(&self, content: impl Into<SmolStr>) {
        match &self.inner.kind {
            NodeKind::Text(t) => *t.borrow_mut() = content.into(),
            NodeKind::Comment(c) => *c.borrow_mut() = content.into(),
            _ => {}
        }
    }

    /// The parent node, when attached.
    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.borrow().upgrade().map(|inner| Node { inner })
    }

    /// A snapshot of the child list.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.borrow().clone()
    }

    /// The number of children.
    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    /// The first child, if any.
    pub fn first_child(&self) -> Option<Node> {
        self.inner.children.borrow().first().cloned()
    }

    /// The last child, if any.
    pub fn last_child(&self) -> Option<Node> {
        self.inner.children.borrow().last().cloned()
    }

    /// The next sibling in the parent's child list.
    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let children = parent.inner.children.borrow();
        let pos = children.iter().position(|c| c.is_same(self))?;
        children.get(pos + 1).cloned()
    }

    /// Walk a child-index path from this node.
    pub fn child_at_path(&self, path: &[usize]) -> Option<Node> {
        let mut current = self.clone();
        for &index in path {
            let next = current.inner.children.borrow().get(index).cloned()?;
            current = next;
        }
        Some(current)
    }

    /// The child-index path of `descendant` relative to this node.
    pub fn path_of(&self, descendant: &Node) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = descendant.clone();
        while !current.is_same(self) {
            let parent = current.parent()?;
            let pos = parent.inner.children.borrow().iter().position(|c| c.is_same(&current))?;
            path.push(pos);
            current = parent;
        }
        path.reverse();
        Some(path)
    }

    fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.inner.children.borrow_mut().retain(|c| !c.is_same(self));
        }
        *self.inner.parent.borrow_mut() = Weak::new();
    }

    /// Append a child. Appending a fragment moves the fragment's children.
    pub fn append_child(&self, child: &Node) {
        if child.is_fragment() {
            for c in child.children() {
                self.append_child(&c);
            }
            return;
        }
        // Detach first: moving a node within the same parent must not
        // work with stale positions.
        child.detach();
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
        self.inner.children.borrow_mut().push(child.clone());
    }

    /// Insert `child` before `reference`; with no reference this appends.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if child.is_fragment() {
            for c in child.children() {
                self.insert_before(&c, reference);
            }
            return;
        }
        if reference.is_some_and(|r| r.is_same(child)) {
            return;
        }
        child.detach();
        let position = match reference {
            Some(r) => self
                .inner
                .children
                .borrow()
                .iter()
                .position(|c| c.is_same(r))
                .unwrap_or_else(|| self.inner.children.borrow().len()),
            None => self.inner.children.borrow().len(),
        };
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
        self.inner.children.borrow_mut().insert(position, child.clone());
    }

    /// Insert `child` immediately after `reference`.
    pub fn insert_after(&self, child: &Node, reference: &Node) {
        let next = reference.next_sibling();
        self.insert_before(child, next.as_ref());
    }

    /// Detach a child. Returns false when `child` is not a child of this
    /// node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let is_child = self.inner.children.borrow().iter().any(|c| c.is_same(child));
        if is_child {
            child.detach();
        }
        is_child
    }

    /// Detach this node from its parent, if attached.
    pub fn remove(&self) {
        self.detach();
    }

    /// The concatenated text of this subtree. Comment data is skipped.
    pub fn text_content(&self) -> SmolStr {
        fn collect(node: &Node, out: &mut String) {
            match &node.inner.kind {
                NodeKind::Text(t) => out.push_str(t.borrow().as_str()),
                NodeKind::Comment(_) => {}
                _ => {
                    for child in node.inner.children.borrow().iter() {
                        collect(child, out);
                    }
                }
            }
        }
        let mut out = String::new();
        collect(self, &mut out);
        out.to_smolstr()
    }

    /// Replace the subtree with a single text node (or nothing for "").
    /// On text and comment nodes this overwrites the data.
    pub fn set_text_content(&self, content: impl Into<SmolStr>) {
        let content = content.into();
        match &self.inner.kind {
            NodeKind::Text(_) | NodeKind::Comment(_) => self.set_data(content),
            _ => {
                for child in self.children() {
                    child.detach();
                }
                if !content.is_empty() {
                    self.append_child(&Node::text(content));
                }
            }
        }
    }

    fn element_data(&self) -> Option<&ElementData> {
        match &self.inner.kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Read an attribute.
    pub fn attribute(&self, name: &str) -> Option<SmolStr> {
        self.element_data()?.attributes.borrow().get(name).cloned()
    }

    /// Write an attribute.
    pub fn set_attribute(&self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        if let Some(e) = self.element_data() {
            e.attributes.borrow_mut().insert(name.into(), value.into());
        }
    }

    /// Remove an attribute.
    pub fn remove_attribute(&self, name: &str) {
        if let Some(e) = self.element_data() {
            e.attributes.borrow_mut().remove(name);
        }
    }

    /// Read a node property.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.element_data()?.properties.borrow().get(name).cloned()
    }

    /// Write a node property.
    pub fn set_property(&self, name: impl Into<SmolStr>, value: Value) {
        if let Some(e) = self.element_data() {
            e.properties.borrow_mut().insert(name.into(), value);
        }
    }

    /// The class list, in insertion order.
    pub fn classes(&self) -> Vec<SmolStr> {
        self.element_data().map(|e| e.classes.borrow().clone()).unwrap_or_default()
    }

    /// True when the class list contains `name`.
    pub fn has_class(&self, name: &str) -> bool {
        self.element_data().is_some_and(|e| e.classes.borrow().iter().any(|c| c == name))
    }

    /// Add or remove one class.
    pub fn set_class(&self, name: impl Into<SmolStr>, on: bool) {
        let Some(e) = self.element_data() else { return };
        let name = name.into();
        let mut classes = e.classes.borrow_mut();
        let present = classes.iter().position(|c| *c == name);
        match (on, present) {
            (true, None) => classes.push(name),
            (false, Some(pos)) => {
                classes.remove(pos);
            }
            _ => {}
        }
    }

    /// Replace the whole class list from a whitespace separated string.
    pub fn set_class_name(&self, names: &str) {
        if let Some(e) = self.element_data() {
            *e.classes.borrow_mut() = names.split_whitespace().map(SmolStr::new).collect();
        }
    }

    /// Read one inline style entry.
    pub fn style(&self, name: &str) -> Option<SmolStr> {
        self.element_data()?.styles.borrow().get(name).cloned()
    }

    /// Write one inline style entry. An empty value removes the entry.
    pub fn set_style(&self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let Some(e) = self.element_data() else { return };
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            e.styles.borrow_mut().remove(&name);
        } else {
            e.styles.borrow_mut().insert(name, value);
        }
    }

    /// Register an event handler.
    pub fn add_event_listener(&self, name: impl Into<SmolStr>, handler: EventHandler) {
        if let Some(e) = self.element_data() {
            e.listeners.borrow_mut().entry(name.into()).or_default().push(handler);
        }
    }

    /// Dispatch an event on this node and bubble it to the ancestors.
    ///
    /// Returns false when a handler called [`Event::prevent_default`].
    pub fn dispatch_event(&self, name: impl Into<SmolStr>, detail: Value) -> bool {
        let event = Event {
            name: name.into(),
            target: self.clone(),
            detail,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        };
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let handlers = node
                .element_data()
                .map(|e| e.listeners.borrow().get(&event.name).cloned().unwrap_or_default())
                .unwrap_or_default();
            for handler in handlers {
                handler(&event);
            }
            if event.propagation_stopped.get() {
                break;
            }
            current = node.parent();
        }
        !event.default_prevented.get()
    }

    /// Clone this subtree. Attributes, properties, classes and styles are
    /// copied; listeners are not.
    pub fn deep_clone(&self) -> Node {
        let clone = match &self.inner.kind {
            NodeKind::Element(e) => {
                let node = Node::element(e.tag.clone());
                let data = node.element_data().expect("just created an element");
                *data.attributes.borrow_mut() = e.attributes.borrow().clone();
                *data.properties.borrow_mut() = e.properties.borrow().clone();
                *data.classes.borrow_mut() = e.classes.borrow().clone();
                *data.styles.borrow_mut() = e.styles.borrow().clone();
                node
            }
            NodeKind::Text(t) => Node::text(t.borrow().clone()),
            NodeKind::Comment(c) => Node::comment(c.borrow().clone()),
            NodeKind::Fragment => Node::fragment(),
        };
        for child in self.inner.children.borrow().iter() {
            clone.append_child(&child.deep_clone());
        }
        clone
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.inner.kind {
            NodeKind::Element(e) => write!(f, "<{} #{}>", e.tag, self.inner.id),
            NodeKind::Text(t) => write!(f, "#text({:?})", t.borrow()),
            NodeKind::Comment(c) => write!(f, "<!--{}-->", c.borrow()),
            NodeKind::Fragment => write!(f, "#fragment #{}", self.inner.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_insertion_and_siblings() {
        let ul = Node::element("ul");
        let a = Node::element("li");
        let c = Node::element("li");
        ul.append_child(&a);
        ul.append_child(&c);
        let b = Node::element("li");
        ul.insert_before(&b, Some(&c));
        assert_eq!(ul.child_count(), 3);
        assert!(a.next_sibling().unwrap().is_same(&b));
        assert!(b.next_sibling().unwrap().is_same(&c));
        assert!(c.next_sibling().is_none());

        ul.insert_after(&a, &c);
        let order: Vec<_> = ul.children().iter().map(|n| n.id()).collect();
        assert_eq!(order, vec![b.id(), c.id(), a.id()]);

        // Same-parent moves are position-safe in both directions.
        ul.insert_before(&a, Some(&b));
        let order: Vec<_> = ul.children().iter().map(|n| n.id()).collect();
        assert_eq!(order, vec![a.id(), b.id(), c.id()]);
        ul.insert_before(&a, Some(&a));
        assert_eq!(ul.child_count(), 3);
    }

    #[test]
    fn reinsertion_moves_instead_of_duplicating() {
        let parent = Node::element("div");
        let other = Node::element("div");
        let child = Node::text("x");
        parent.append_child(&child);
        other.append_child(&child);
        assert_eq!(parent.child_count(), 0);
        assert!(child.parent().unwrap().is_same(&other));
    }

    #[test]
    fn fragment_insertion_moves_children() {
        let fragment = Node::fragment();
        fragment.append_child(&Node::text("a"));
        fragment.append_child(&Node::text("b"));
        let host = Node::element("div");
        host.append_child(&fragment);
        assert_eq!(host.text_content(), "ab");
        assert_eq!(fragment.child_count(), 0);
    }

    #[test]
    fn text_content_skips_comments_and_clears_on_set() {
        let div = Node::element("div");
        div.append_child(&Node::text("a"));
        div.append_child(&Node::comment("marker"));
        let span = Node::element("span");
        span.append_child(&Node::text("b"));
        div.append_child(&span);
        assert_eq!(div.text_content(), "ab");
        div.set_text_content("");
        assert_eq!(div.child_count(), 0);
        div.set_text_content("z");
        assert_eq!(div.text_content(), "z");
    }

    #[test]
    fn node_paths_round_trip() {
        let root = Node::element("div");
        let ul = Node::element("ul");
        root.append_child(&Node::comment("head"));
        root.append_child(&ul);
        let li = Node::element("li");
        ul.append_child(&li);
        let path = root.path_of(&li).unwrap();
        assert_eq!(path, vec![1, 0]);
        assert!(root.child_at_path(&path).unwrap().is_same(&li));
    }

    #[test]
    fn class_and_style_surface() {
        let el = Node::element("p");
        el.set_class("a", true);
        el.set_class("b", true);
        el.set_class("a", true);
        assert_eq!(el.classes(), vec![SmolStr::new("a"), SmolStr::new("b")]);
        el.set_class("a", false);
        assert!(!el.has_class("a"));
        el.set_class_name("x  y");
        assert_eq!(el.classes().len(), 2);

        el.set_style("color", "red");
        assert_eq!(el.style("color").unwrap(), "red");
        el.set_style("color", "");
        assert!(el.style("color").is_none());
    }

    #[test]
    fn events_bubble_and_honor_flags() {
        let outer = Node::element("div");
        let inner = Node::element("button");
        outer.append_child(&inner);
        let seen = Rc::new(Cell::new(0));
        {
            let seen = seen.clone();
            inner.add_event_listener("click", Rc::new(move |e: &Event| {
                seen.set(seen.get() + 1);
                e.prevent_default();
            }));
        }
        {
            let seen = seen.clone();
            outer.add_event_listener("click", Rc::new(move |_e: &Event| {
                seen.set(seen.get() + 10);
            }));
        }
        assert!(!inner.dispatch_event("click", Value::Undefined));
        assert_eq!(seen.get(), 11);

        inner.add_event_listener("press", Rc::new(|e: &Event| e.stop_propagation()));
        let outer_hits = Rc::new(Cell::new(0));
        {
            let outer_hits = outer_hits.clone();
            outer.add_event_listener("press", Rc::new(move |_| outer_hits.set(1)));
        }
        assert!(inner.dispatch_event("press", Value::Undefined));
        assert_eq!(outer_hits.get(), 0);
    }

    #[test]
    fn deep_clone_copies_decoration_not_listeners() {
        let el = Node::element("input");
        el.set_attribute("type", "text");
        el.set_property("value", Value::from("v"));
        el.add_event_listener("input", Rc::new(|_| panic!("listener must not be cloned")));
        el.append_child(&Node::text("t"));
        let clone = el.deep_clone();
        assert_eq!(clone.attribute("type").unwrap(), "text");
        assert_eq!(clone.property("value"), Some(Value::from("v")));
        assert_eq!(clone.text_content(), "t");
        assert!(clone.dispatch_event("input", Value::Undefined));
    }
}
