// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Bindings.

    A [`Binding`] pairs one node operation (a [`BindingNode`] trait
    object) with one state cell. The state side resolves its ref against
    the surrounding loop scope and applies the declared filter chain;
    the node side is whatever the bind text named: a property, an
    attribute, a class, an event, or one of the structural nodes.
*/

use crate::bind_content::BindContent;
use crate::binding_nodes;
use crate::component::ComponentEngine;
use crate::dom::Node;
use crate::errors::{ErrorCode, StructiveError};
use crate::filters::{FilterFn, apply_filters, resolve_filters};
use crate::loop_context::LoopContext;
use crate::path::{PathInfo, get_structured_path_info};
use crate::renderer::Renderer;
use crate::state_ref::{RefKey, StateRef, get_state_property_ref};
use crate::template::{BindText, NodeProperty};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

fn next_binding_id() -> usize {
    thread_local!(static NEXT_ID: Cell<usize> = const { Cell::new(1) });
    NEXT_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

/// The node side of a binding. The renderer only ever calls
/// `apply_change`, `notify_redraw` and the activation pair; everything
/// else is node-private.
pub trait BindingNode {
    /// The binding went live (content mounted or reused).
    fn activate(&self, binding: &Rc<Binding>) -> Result<(), StructiveError> {
        let _ = binding;
        Ok(())
    }

    /// The binding went out of service (content unmounted or pooled).
    fn inactivate(&self, binding: &Rc<Binding>) -> Result<(), StructiveError> {
        let _ = binding;
        Ok(())
    }

    /// Bring the node in line with the bound state.
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        renderer: &mut Renderer,
    ) -> Result<(), StructiveError>;

    /// Forward a batch of parent refs (child-component nodes only).
    fn notify_redraw(
        &self,
        binding: &Rc<Binding>,
        refs: &[StateRef],
    ) -> Result<(), StructiveError> {
        let _ = (binding, refs);
        Ok(())
    }

    /// The live child bind contents (structural nodes only).
    fn bind_contents(&self) -> Vec<Rc<BindContent>> {
        Vec::new()
    }

    /// Write a value back into the node (two-way nodes only).
    fn assign_value(&self, binding: &Rc<Binding>, value: Value) -> Result<(), StructiveError> {
        let _ = (binding, value);
        Err(StructiveError::new(
            ErrorCode::BindNotImplemented,
            "this binding node cannot assign values",
        ))
    }
}

/// One node operation paired with one state cell.
pub struct Binding {
    id: usize,
    engine: Weak<ComponentEngine>,
    parent_content: Weak<BindContent>,
    node: Node,
    entry: BindText,
    info: Option<Rc<PathInfo>>,
    state_filters: Vec<FilterFn>,
    node_impl: Box<dyn BindingNode>,
    is_active: Cell<bool>,
    registered_key: RefCell<Option<RefKey>>,
}

impl Binding {
    /// Build the binding for one compiled bind entry. The state path is
    /// registered with the path manager (as a list for `for` entries);
    /// event entries bind a method instead of a path.
    pub fn new(
        engine: &Rc<ComponentEngine>,
        parent_content: &Rc<BindContent>,
        node: Node,
        entry: BindText,
    ) -> Result<Rc<Binding>, StructiveError> {
        let info = match &entry.prop {
            NodeProperty::Event(_) => None,
            NodeProperty::For => {
                engine.path_manager().add_path(&entry.state_path, true)?;
                Some(get_structured_path_info(&entry.state_path)?)
            }
            _ => {
                engine.path_manager().add_path(&entry.state_path, false)?;
                Some(get_structured_path_info(&entry.state_path)?)
            }
        };
        let state_filters = resolve_filters(&entry.state_filters)?;
        let node_impl = binding_nodes::create_binding_node(&entry, &node)?;
        Ok(Rc::new(Binding {
            id: next_binding_id(),
            engine: Rc::downgrade(engine),
            parent_content: Rc::downgrade(parent_content),
            node,
            entry,
            info,
            state_filters,
            node_impl,
            is_active: Cell::new(false),
            registered_key: RefCell::new(None),
        }))
    }

    /// A process-unique binding id; the renderer's dedup key.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The bound host node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The compiled bind entry.
    pub fn entry(&self) -> &BindText {
        &self.entry
    }

    /// The bound path info; `None` for event bindings.
    pub fn state_info(&self) -> Option<&Rc<PathInfo>> {
        self.info.as_ref()
    }

    /// The owning engine, or UPD-001 when it is gone.
    pub fn engine(&self) -> Result<Rc<ComponentEngine>, StructiveError> {
        self.engine.upgrade().ok_or_else(|| {
            StructiveError::new(ErrorCode::UpdaterEngineGone, "binding outlived its engine")
        })
    }

    /// The bind content this binding belongs to.
    pub fn parent_content(&self) -> Option<Rc<BindContent>> {
        self.parent_content.upgrade()
    }

    /// The loop scope surrounding this binding, if any.
    pub fn loop_context(&self) -> Option<Rc<LoopContext>> {
        self.parent_content()?.current_loop_context()
    }

    /// Resolve the bound cell against the surrounding loop scope.
    pub fn resolve_ref(&self) -> Result<StateRef, StructiveError> {
        let info = self.info.as_ref().ok_or_else(|| {
            StructiveError::new(ErrorCode::BindCreatorMissing, "event bindings have no state ref")
        })?;
        let list_index = if info.wildcard_count == 0 {
            None
        } else {
            let wildcard_path =
                info.last_wildcard_path().expect("wildcard paths have a wildcard prefix");
            match self.loop_context().and_then(|context| context.find(wildcard_path)) {
                Some(found) => Some(found.list_index()?),
                None => None,
            }
        };
        Ok(get_state_property_ref(info, list_index))
    }

    /// The bound value after the state-side filter chain.
    pub fn value(&self) -> Result<Value, StructiveError> {
        let engine = self.engine()?;
        let state_ref = self.resolve_ref()?;
        let raw = engine.state().get_by_ref(&engine, &state_ref)?;
        apply_filters(raw, &self.state_filters)
    }

    /// Apply this binding. Callers go through
    /// [`Renderer::apply_binding`] which enforces at-most-once.
    pub fn apply_change(self: &Rc<Self>, renderer: &mut Renderer) -> Result<(), StructiveError> {
        self.node_impl.apply_change(self, renderer)
    }

    /// Forward a parent batch (child-component bindings).
    pub fn notify_redraw(self: &Rc<Self>, refs: &[StateRef]) -> Result<(), StructiveError> {
        self.node_impl.notify_redraw(self, refs)
    }

    /// The live child contents of a structural binding.
    pub fn bind_contents(&self) -> Vec<Rc<BindContent>> {
        self.node_impl.bind_contents()
    }

    /// True between activate and inactivate.
    pub fn is_active(&self) -> bool {
        self.is_active.get()
    }

    /// Go live: register under the resolved ref and activate the node.
    pub fn activate(self: &Rc<Self>) -> Result<(), StructiveError> {
        if self.is_active.replace(true) {
            return Ok(());
        }
        if self.info.is_some() {
            let engine = self.engine()?;
            let key = self.resolve_ref()?.key();
            engine.register_binding(key, self);
            *self.registered_key.borrow_mut() = Some(key);
        }
        self.node_impl.activate(self)
    }

    /// Go out of service: drop the registration, deactivate the node.
    pub fn inactivate(self: &Rc<Self>) -> Result<(), StructiveError> {
        if !self.is_active.replace(false) {
            return Ok(());
        }
        self.node_impl.inactivate(self)?;
        if let Some(key) = self.registered_key.borrow_mut().take() {
            if let Some(engine) = self.engine.upgrade() {
                engine.unregister_binding(key, self.id);
            }
        }
        Ok(())
    }

    /// Re-register after the surrounding loop scope moved to another
    /// slot.
    pub fn reregister(self: &Rc<Self>) -> Result<(), StructiveError> {
        if !self.is_active.get() || self.info.is_none() {
            return Ok(());
        }
        let engine = self.engine()?;
        if let Some(previous) = self.registered_key.borrow_mut().take() {
            engine.unregister_binding(previous, self.id);
        }
        let key = self.resolve_ref()?.key();
        engine.register_binding(key, self);
        *self.registered_key.borrow_mut() = Some(key);
        Ok(())
    }
}

impl core::fmt::Debug for Binding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Binding(#{} {:?} <- `{}`)", self.id, self.entry.prop, self.entry.state_path)
    }
}
