// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Instantiated templates.

    A [`BindContent`] is one instantiation of a registered template: the
    cloned nodes, one binding per compiled entry, and — when the
    instance stands for a list element — a loop context. Contents move
    as a unit (mount/unmount), can be re-slotted (`assign_list_index`)
    and are pooled by the loop binding instead of being dropped.
*/

use crate::binding::Binding;
use crate::component::ComponentEngine;
use crate::dom::Node;
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::loop_context::LoopContext;
use crate::renderer::Renderer;
use crate::state_ref::StateRef;
use crate::template::get_template;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

fn next_content_id() -> usize {
    thread_local!(static NEXT_ID: Cell<usize> = const { Cell::new(1) });
    NEXT_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

/// One instantiation of a template.
pub struct BindContent {
    id: usize,
    template_id: usize,
    engine: Weak<ComponentEngine>,
    parent_binding: RefCell<Option<Weak<Binding>>>,
    child_nodes: Vec<Node>,
    bindings: RefCell<Vec<Rc<Binding>>>,
    loop_context: RefCell<Option<Rc<LoopContext>>>,
    is_active: Cell<bool>,
}

impl BindContent {
    /// Instantiate template `template_id`: clone the fragment, create a
    /// loop context when `root_ref` carries a list index, and build one
    /// binding per compiled entry.
    pub fn new(
        engine: &Rc<ComponentEngine>,
        template_id: usize,
        parent_binding: Option<&Rc<Binding>>,
        root_ref: Option<&StateRef>,
    ) -> Result<Rc<BindContent>, StructiveError> {
        let template = get_template(template_id)?;
        let fragment = template.fragment.deep_clone();
        let content = Rc::new(BindContent {
            id: next_content_id(),
            template_id,
            engine: Rc::downgrade(engine),
            parent_binding: RefCell::new(parent_binding.map(Rc::downgrade)),
            child_nodes: fragment.children(),
            bindings: RefCell::new(Vec::new()),
            loop_context: RefCell::new(None),
            is_active: Cell::new(false),
        });
        if let Some(root_ref) = root_ref {
            if root_ref.list_index().is_some() {
                *content.loop_context.borrow_mut() =
                    Some(LoopContext::new(root_ref, Rc::downgrade(&content)));
            }
        }
        let mut bindings = Vec::new();
        for compiled in &template.binds {
            let node = fragment.child_at_path(&compiled.node_path).ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::BindMetadataMissing,
                    format!("template {template_id}: bound node vanished from the fragment"),
                )
                .with_context("where", "BindContent::new")
            })?;
            for entry in &compiled.entries {
                bindings.push(Binding::new(engine, &content, node.clone(), entry.clone())?);
            }
        }
        *content.bindings.borrow_mut() = bindings;
        Ok(content)
    }

    /// A process-unique id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The template this content instantiates.
    pub fn template_id(&self) -> usize {
        self.template_id
    }

    /// The instantiated root nodes, in document order.
    pub fn child_nodes(&self) -> &[Node] {
        &self.child_nodes
    }

    /// The first instantiated root node.
    pub fn first_child_node(&self) -> Option<&Node> {
        self.child_nodes.first()
    }

    /// The last instantiated root node.
    pub fn last_child_node(&self) -> Option<&Node> {
        self.child_nodes.last()
    }

    /// The bindings of this instance.
    pub fn bindings(&self) -> Vec<Rc<Binding>> {
        self.bindings.borrow().clone()
    }

    /// The structural binding this content hangs under, if any.
    pub fn parent_binding(&self) -> Option<Rc<Binding>> {
        self.parent_binding.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Attach or detach the parent binding (pool reuse).
    pub fn set_parent_binding(&self, binding: Option<&Rc<Binding>>) {
        *self.parent_binding.borrow_mut() = binding.map(Rc::downgrade);
    }

    /// The loop context of this instance, if it stands for a list
    /// element.
    pub fn loop_context(&self) -> Option<Rc<LoopContext>> {
        self.loop_context.borrow().clone()
    }

    /// The innermost loop context in scope: the own one, or the nearest
    /// one up the parent-binding chain.
    pub fn current_loop_context(&self) -> Option<Rc<LoopContext>> {
        if let Some(context) = self.loop_context.borrow().clone() {
            return Some(context);
        }
        self.parent_binding()
            .and_then(|binding| binding.parent_content())
            .and_then(|content| content.current_loop_context())
    }

    /// True when the root nodes are attached to a parent.
    pub fn is_mounted(&self) -> bool {
        self.child_nodes.first().is_some_and(|node| node.parent().is_some())
    }

    /// Append the content's nodes to `parent`.
    pub fn mount(&self, parent: &Node) {
        for node in &self.child_nodes {
            parent.append_child(node);
        }
    }

    /// Insert the content's nodes before `reference`.
    pub fn mount_before(&self, parent: &Node, reference: Option<&Node>) {
        for node in &self.child_nodes {
            parent.insert_before(node, reference);
        }
    }

    /// Insert the content's nodes immediately after `reference`.
    pub fn mount_after(&self, parent: &Node, reference: &Node) {
        let mut previous = reference.clone();
        for node in &self.child_nodes {
            parent.insert_after(node, &previous);
            previous = node.clone();
        }
    }

    /// Detach the content's nodes. Idempotent; a vanished parent is a
    /// no-op.
    pub fn unmount(&self) {
        for node in &self.child_nodes {
            node.remove();
        }
    }

    /// The deepest last node of this content, following the last
    /// structural binding's contents. The insertion point for content
    /// mounted "after" this one. BIND-104 when a declared child is
    /// missing.
    pub fn get_last_node(&self) -> Result<Node, StructiveError> {
        let last = self
            .child_nodes
            .last()
            .ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::BindNodeMissing,
                    format!("template {} instantiated no nodes", self.template_id),
                )
                .with_context("where", "get_last_node")
            })?
            .clone();
        if let Some(binding) = self.bindings.borrow().last() {
            if binding.node().is_same(&last) {
                if let Some(content) = binding.bind_contents().last() {
                    if content.is_mounted() {
                        return content.get_last_node();
                    }
                }
            }
        }
        Ok(last)
    }

    /// Re-slot this instance to another list element.
    pub fn assign_list_index(&self, list_index: ListIndex) -> Result<(), StructiveError> {
        let context = self.loop_context.borrow().clone().ok_or_else(|| {
            StructiveError::new(
                ErrorCode::ListContextCleared,
                format!("template {} content has no loop context", self.template_id),
            )
            .with_context("where", "assign_list_index")
        })?;
        context.assign_list_index(list_index);
        for binding in self.bindings() {
            binding.reregister()?;
        }
        Ok(())
    }

    /// Apply every binding of this instance (each at most once per
    /// render).
    pub fn apply_change(&self, renderer: &mut Renderer) -> Result<(), StructiveError> {
        for binding in self.bindings() {
            renderer.apply_binding(&binding)?;
        }
        Ok(())
    }

    /// True between activate and inactivate.
    pub fn is_active(&self) -> bool {
        self.is_active.get()
    }

    /// Activate every binding.
    pub fn activate(&self) -> Result<(), StructiveError> {
        self.is_active.set(true);
        for binding in self.bindings() {
            binding.activate()?;
        }
        Ok(())
    }

    /// Inactivate every binding and clear the loop slot.
    pub fn inactivate(&self) -> Result<(), StructiveError> {
        self.is_active.set(false);
        for binding in self.bindings() {
            binding.inactivate()?;
        }
        if let Some(context) = self.loop_context.borrow().clone() {
            context.clear_list_index();
        }
        Ok(())
    }
}

impl core::fmt::Debug for BindContent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BindContent(#{} template {})", self.id, self.template_id)
    }
}
