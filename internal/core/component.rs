// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Component classes and the per-instance engine.

    A [`ComponentClass`] ties a tag name to a template and a state
    class; the registry plays the part of the host's custom-element
    registry, including `when_defined` waiters. The [`ComponentEngine`]
    is the per-instance glue: it owns the state handle and the rotating
    updater, keeps the binding registrations, wires parent↔child state
    and drives mount/unmount.
*/

use crate::bind_content::BindContent;
use crate::binding::Binding;
use crate::dom::Node;
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::path::get_structured_path_info;
use crate::path_manager::PathManager;
use crate::state::StateHandle;
use crate::state_class::StateClass;
use crate::state_ref::{RefKey, StateRef, get_state_property_ref};
use crate::updater::Updater;
use crate::value::Value;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// One component kind: a tag, a template and a state class.
pub struct ComponentClass {
    /// The custom-element tag name.
    pub tag: SmolStr,
    /// The registered template instantiated for each instance.
    pub template_id: usize,
    /// The state class instantiated for each instance.
    pub state_class: Rc<StateClass>,
    /// Mount into a shadow container instead of the light DOM.
    pub shadow: bool,
}

impl ComponentClass {
    /// Create a class description.
    pub fn new(
        tag: impl Into<SmolStr>,
        template_id: usize,
        state_class: Rc<StateClass>,
    ) -> Rc<ComponentClass> {
        Rc::new(ComponentClass { tag: tag.into(), template_id, state_class, shadow: false })
    }

    /// Create a class description mounting into a shadow container.
    pub fn new_shadow(
        tag: impl Into<SmolStr>,
        template_id: usize,
        state_class: Rc<StateClass>,
    ) -> Rc<ComponentClass> {
        Rc::new(ComponentClass { tag: tag.into(), template_id, state_class, shadow: true })
    }
}

type DefinedWaiter = Box<dyn FnOnce(Rc<ComponentClass>)>;

thread_local! {
    static REGISTRY: RefCell<HashMap<SmolStr, Rc<ComponentClass>>> = RefCell::new(HashMap::new());
    static WAITERS: RefCell<HashMap<SmolStr, Vec<DefinedWaiter>>> = RefCell::new(HashMap::new());
    static ENGINES_BY_NODE: RefCell<HashMap<usize, Rc<ComponentEngine>>> =
        RefCell::new(HashMap::new());
}

/// Define a component class under its tag and release the waiters.
pub fn register_component(class: Rc<ComponentClass>) {
    REGISTRY.with(|registry| {
        registry.borrow_mut().insert(class.tag.clone(), class.clone());
    });
    let waiting =
        WAITERS.with(|waiters| waiters.borrow_mut().remove(&class.tag)).unwrap_or_default();
    for waiter in waiting {
        waiter(class.clone());
    }
}

/// The class defined for `tag`, if any.
pub fn lookup_component(tag: &str) -> Option<Rc<ComponentClass>> {
    REGISTRY.with(|registry| registry.borrow().get(tag).cloned())
}

/// Run `f` once `tag` is defined: immediately when it already is,
/// otherwise when [`register_component`] defines it.
pub fn when_defined(tag: &str, f: impl FnOnce(Rc<ComponentClass>) + 'static) {
    if let Some(class) = lookup_component(tag) {
        f(class);
        return;
    }
    WAITERS.with(|waiters| {
        waiters.borrow_mut().entry(SmolStr::new(tag)).or_default().push(Box::new(f));
    });
}

/// The engine upgraded onto `node`, if one exists. The registry keeps
/// instances alive until they disconnect, like a document does.
pub fn engine_for_node(node: &Node) -> Option<Rc<ComponentEngine>> {
    ENGINES_BY_NODE.with(|engines| engines.borrow().get(&node.id()).cloned())
}

/// The engine for an element, created (but not connected) when none
/// exists yet. COMP-402 when the tag has no defined class.
pub fn ensure_engine(node: &Node) -> Result<Rc<ComponentEngine>, StructiveError> {
    if let Some(existing) = engine_for_node(node) {
        return Ok(existing);
    }
    let tag = node.tag().ok_or_else(|| {
        StructiveError::new(ErrorCode::ComponentIdentification, "cannot upgrade a non-element node")
    })?;
    let class = lookup_component(&tag).ok_or_else(|| {
        StructiveError::new(ErrorCode::ComponentNotDefined, format!("`{tag}` was never defined"))
            .with_context("where", "ensure_engine")
            .with_context("tag", tag.clone())
    })?;
    ComponentEngine::new(class, node.clone())
}

/// Upgrade an element into a live, connected component instance of its
/// tag's class; an already-upgraded element returns its engine.
pub fn upgrade_element(node: &Node) -> Result<Rc<ComponentEngine>, StructiveError> {
    let engine = ensure_engine(node)?;
    engine.connected_callback()?;
    Ok(engine)
}

struct ParentMapping {
    sub_path: SmolStr,
    binding: Weak<Binding>,
}

/// The per-instance glue of one mounted component.
pub struct ComponentEngine {
    class: Rc<ComponentClass>,
    host: Node,
    container: Node,
    placeholder: RefCell<Option<Node>>,
    state: Rc<StateHandle>,
    updater: RefCell<Option<Rc<Updater>>>,
    bindings_by_ref: RefCell<HashMap<RefKey, Vec<Weak<Binding>>>>,
    child_bindings: RefCell<Vec<Weak<Binding>>>,
    parent_mappings: RefCell<Vec<ParentMapping>>,
    root_bind_content: RefCell<Option<Rc<BindContent>>>,
    navigate_hook: RefCell<Option<Box<dyn Fn(&str)>>>,
    connected: Cell<bool>,
}

impl ComponentEngine {
    /// Create the engine for one host element: instantiate the state,
    /// register its properties and build the root bind content.
    pub fn new(class: Rc<ComponentClass>, host: Node) -> Result<Rc<ComponentEngine>, StructiveError> {
        if !host.is_element() {
            return Err(StructiveError::new(
                ErrorCode::ComponentIdentification,
                "component hosts must be elements",
            )
            .with_context("where", "ComponentEngine::new"));
        }
        let state = Rc::new(StateHandle::new(class.state_class.clone())?);
        let container =
            if class.shadow { Node::element("#shadow-root") } else { host.clone() };
        if class.shadow {
            host.append_child(&container);
        }
        let engine = Rc::new(ComponentEngine {
            class,
            host: host.clone(),
            container,
            placeholder: RefCell::new(None),
            state,
            updater: RefCell::new(None),
            bindings_by_ref: RefCell::new(HashMap::new()),
            child_bindings: RefCell::new(Vec::new()),
            parent_mappings: RefCell::new(Vec::new()),
            root_bind_content: RefCell::new(None),
            navigate_hook: RefCell::new(None),
            connected: Cell::new(false),
        });
        engine.setup()?;
        ENGINES_BY_NODE.with(|engines| engines.borrow_mut().insert(host.id(), engine.clone()));
        Ok(engine)
    }

    fn setup(self: &Rc<Self>) -> Result<(), StructiveError> {
        if let Some(object) = self.state.target().as_object() {
            let entries: Vec<(SmolStr, Value)> =
                object.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            for (key, value) in entries {
                self.path_manager().add_path(&key, value.is_list())?;
            }
        }
        let root = BindContent::new(self, self.class.template_id, None, None)?;
        *self.root_bind_content.borrow_mut() = Some(root);
        Ok(())
    }

    /// The component class.
    pub fn class(&self) -> &Rc<ComponentClass> {
        &self.class
    }

    /// The state class.
    pub fn state_class(&self) -> &Rc<StateClass> {
        &self.class.state_class
    }

    /// The state handle.
    pub fn state(&self) -> &Rc<StateHandle> {
        &self.state
    }

    /// The per-class path manager.
    pub fn path_manager(&self) -> &Rc<PathManager> {
        self.state.path_manager()
    }

    /// The host element.
    pub fn host(&self) -> &Node {
        &self.host
    }

    /// Where the root content mounts: the shadow container or the host.
    pub fn container(&self) -> &Node {
        &self.container
    }

    /// The root bind content, once set up.
    pub fn root_bind_content(&self) -> Option<Rc<BindContent>> {
        self.root_bind_content.borrow().clone()
    }

    /// The current updater; reads compare their cache stamps against it.
    pub fn updater(self: &Rc<Self>) -> Rc<Updater> {
        if let Some(updater) = self.updater.borrow().clone() {
            return updater;
        }
        let updater = Updater::new(self);
        *self.updater.borrow_mut() = Some(updater.clone());
        updater
    }

    /// The updater accepting writes: the current one while it is open,
    /// a fresh one once it closed.
    pub fn updater_for_write(self: &Rc<Self>) -> Rc<Updater> {
        let current = self.updater();
        if !current.is_closed() {
            return current;
        }
        let fresh = Updater::new(self);
        *self.updater.borrow_mut() = Some(fresh.clone());
        fresh
    }

    /// Queue a written ref on the open updater.
    pub fn enqueue_ref(self: &Rc<Self>, state_ref: StateRef) {
        self.updater_for_write().enqueue_ref(state_ref);
    }

    /// Register a binding under its resolved ref key.
    pub fn register_binding(&self, key: RefKey, binding: &Rc<Binding>) {
        self.bindings_by_ref.borrow_mut().entry(key).or_default().push(Rc::downgrade(binding));
    }

    /// Drop one binding's registration.
    pub fn unregister_binding(&self, key: RefKey, binding_id: usize) {
        let mut bindings = self.bindings_by_ref.borrow_mut();
        if let Some(list) = bindings.get_mut(&key) {
            list.retain(|weak| weak.upgrade().is_some_and(|b| b.id() != binding_id));
            if list.is_empty() {
                bindings.remove(&key);
            }
        }
    }

    /// The live bindings registered under a ref key.
    pub fn bindings_for(&self, key: RefKey) -> Vec<Rc<Binding>> {
        self.bindings_by_ref
            .borrow()
            .get(&key)
            .map(|list| list.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Register a child-component binding for render forwarding.
    pub fn register_child_binding(&self, binding: &Rc<Binding>) {
        let mut children = self.child_bindings.borrow_mut();
        if !children.iter().any(|weak| weak.upgrade().is_some_and(|b| b.id() == binding.id())) {
            children.push(Rc::downgrade(binding));
        }
    }

    /// The live child-component bindings.
    pub fn child_bindings(&self) -> Vec<Rc<Binding>> {
        let mut children = self.child_bindings.borrow_mut();
        children.retain(|weak| weak.strong_count() > 0);
        children.iter().filter_map(Weak::upgrade).collect()
    }

    /// Map one state input (`sub_path`) of this component to a parent
    /// binding. A second mapping for the same input is STATE-303.
    pub fn bind_parent_state(
        &self,
        sub_path: &SmolStr,
        binding: &Rc<Binding>,
    ) -> Result<(), StructiveError> {
        let mut mappings = self.parent_mappings.borrow_mut();
        if mappings.iter().any(|mapping| mapping.sub_path == *sub_path) {
            return Err(StructiveError::new(
                ErrorCode::StateDuplicateMapping,
                format!("state input `{sub_path}` is already mapped"),
            )
            .with_context("where", "bind_parent_state"));
        }
        mappings.push(ParentMapping { sub_path: sub_path.clone(), binding: Rc::downgrade(binding) });
        Ok(())
    }

    /// Resolve a ref against the parent mappings: a ref at or under a
    /// mapped input, with no intersecting getter, reads and writes the
    /// parent's state.
    pub fn delegate_to_parent(
        &self,
        state_ref: &StateRef,
    ) -> Result<Option<(Rc<ComponentEngine>, StateRef)>, StructiveError> {
        let pattern = state_ref.pattern().clone();
        let best = {
            let mappings = self.parent_mappings.borrow();
            let mut best: Option<(SmolStr, Weak<Binding>)> = None;
            for mapping in mappings.iter() {
                let matches = pattern == mapping.sub_path
                    || pattern.starts_with(&format!("{}.", mapping.sub_path));
                if matches
                    && best
                        .as_ref()
                        .is_none_or(|(sub, _)| mapping.sub_path.len() > sub.len())
                {
                    best = Some((mapping.sub_path.clone(), mapping.binding.clone()));
                }
            }
            best
        };
        let Some((sub_path, binding)) = best else { return Ok(None) };
        // A getter anywhere on the path keeps the read local.
        let path_manager = self.path_manager();
        if state_ref.info().cumulative_paths.iter().any(|prefix| path_manager.is_getter(prefix)) {
            return Ok(None);
        }
        let binding = binding.upgrade().ok_or_else(|| {
            StructiveError::new(
                ErrorCode::ChildStateParentGone,
                format!("parent binding for `{sub_path}` is gone"),
            )
        })?;
        let parent_engine = binding.engine().map_err(|error| {
            StructiveError::new(
                ErrorCode::ChildStateParentGone,
                format!("parent engine for `{sub_path}` is gone"),
            )
            .with_cause(error)
        })?;
        let binding_ref = binding.resolve_ref()?;
        let parent_pattern =
            format!("{}{}", binding_ref.pattern(), &pattern[sub_path.len()..]);
        let parent_info = get_structured_path_info(&parent_pattern)?;
        parent_engine.path_manager().add_path(&parent_pattern, false)?;
        let parent_li = if parent_info.wildcard_count == 0 {
            None
        } else {
            state_ref.list_index().cloned().or_else(|| binding_ref.list_index().cloned())
        };
        Ok(Some((parent_engine, get_state_property_ref(&parent_info, parent_li))))
    }

    /// Queue a render of one mapped state input (the child side of
    /// `apply_change` forwarding).
    pub fn assign_parent_input(self: &Rc<Self>, sub_path: &SmolStr) -> Result<(), StructiveError> {
        self.path_manager().add_path(sub_path, false)?;
        let info = get_structured_path_info(sub_path)?;
        self.enqueue_ref(get_state_property_ref(&info, None));
        Ok(())
    }

    /// Receive translated refs forwarded by a parent render.
    pub fn notify_redraw(self: &Rc<Self>, refs: Vec<StateRef>) {
        for state_ref in refs {
            if let Err(error) = self.path_manager().add_path(state_ref.pattern(), false) {
                crate::updater::report_unhandled_error(error);
                continue;
            }
            self.enqueue_ref(state_ref);
        }
    }

    /// Install the router hook backing `$navigate`.
    pub fn set_navigate_hook(&self, hook: impl Fn(&str) + 'static) {
        *self.navigate_hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Forward a `$navigate` call to the embedder. Without a hook this
    /// is a no-op.
    pub fn navigate(&self, to: &str) {
        match &*self.navigate_hook.borrow() {
            Some(hook) => hook(to),
            None => log::debug!("$navigate({to}) ignored: no router hook installed"),
        }
    }

    /// Mount and go live: placeholder/shadow mounting, `data-state`
    /// assignment, initial render, `$connectedCallback`.
    pub fn connected_callback(self: &Rc<Self>) -> Result<(), StructiveError> {
        if self.connected.replace(true) {
            return Ok(());
        }
        let root = self.root_bind_content().ok_or_else(|| {
            StructiveError::new(ErrorCode::UpdaterEngineGone, "engine was not set up")
        })?;
        if !self.class.shadow {
            let placeholder = Node::comment(format!("structive:{}", self.class.tag));
            self.container.append_child(&placeholder);
            *self.placeholder.borrow_mut() = Some(placeholder);
        }
        if let Some(json_text) = self.host.attribute("data-state") {
            let json: serde_json::Value = serde_json::from_str(&json_text).map_err(|error| {
                StructiveError::new(
                    ErrorCode::StateInvalidWrite,
                    format!("bad data-state JSON: {error}"),
                )
                .with_context("where", "connected_callback")
            })?;
            if let (Some(target), serde_json::Value::Object(entries)) =
                (self.state.target().as_object(), json)
            {
                for (key, value) in entries {
                    let value = Value::from_json(&value);
                    self.path_manager().add_path(&key, value.is_list())?;
                    target.borrow_mut().insert(SmolStr::new(&key), value);
                }
            }
        }
        root.mount(&self.container);
        root.activate()?;
        Updater::initial_render(self)?;
        if let Some(callback) = self.class.state_class.connected_callback() {
            Updater::update(self, None, |accessor| callback(accessor))?;
        }
        Ok(())
    }

    /// Tear down: `$disconnectedCallback`, placeholder removal,
    /// inactivation, registry cleanup.
    pub fn disconnected_callback(self: &Rc<Self>) -> Result<(), StructiveError> {
        if !self.connected.replace(false) {
            return Ok(());
        }
        if let Some(callback) = self.class.state_class.disconnected_callback() {
            Updater::update(self, None, |accessor| callback(accessor))?;
        }
        *self.parent_mappings.borrow_mut() = Vec::new();
        if let Some(placeholder) = self.placeholder.borrow_mut().take() {
            placeholder.remove();
        }
        if let Some(root) = self.root_bind_content() {
            root.unmount();
            root.inactivate()?;
        }
        ENGINES_BY_NODE.with(|engines| engines.borrow_mut().remove(&self.host.id()));
        Ok(())
    }

    /// Run one writable session against this component's state.
    pub fn update(
        self: &Rc<Self>,
        f: impl FnOnce(&crate::state::StateAccessor) -> Result<(), StructiveError>,
    ) -> Result<(), StructiveError> {
        Updater::update(self, None, f)
    }

    /// External read bridge.
    pub fn get_property_value(self: &Rc<Self>, path: &str) -> Result<Value, StructiveError> {
        let info = get_structured_path_info(path)?;
        let state_ref = get_state_property_ref(&info, None);
        self.state.get_by_ref(self, &state_ref)
    }

    /// External write bridge; runs a full update session.
    pub fn set_property_value(self: &Rc<Self>, path: &str, value: Value) -> Result<(), StructiveError> {
        Updater::update(self, None, |accessor| accessor.set(path, value))
    }

    /// External list-index bridge.
    pub fn get_list_indexes(self: &Rc<Self>, path: &str) -> Result<Vec<ListIndex>, StructiveError> {
        let info = get_structured_path_info(path)?;
        let state_ref = get_state_property_ref(&info, None);
        Ok((*self.state.get_list_indexes(self, &state_ref)?).clone())
    }
}

impl core::fmt::Debug for ComponentEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ComponentEngine(<{}>)", self.class.tag)
    }
}
