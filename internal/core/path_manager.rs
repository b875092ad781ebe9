// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Per-component path classification.

    The path manager knows, for one component class, which paths exist,
    which are lists, which are computed, and how paths depend on each
    other. Static dependencies come from prefix structure; dynamic ones
    are recorded while getters run. Deep paths without a user getter get
    a synthesised accessor that re-resolves the remainder segment by
    segment.
*/

use crate::errors::{ErrorCode, StructiveError};
use crate::path::{PathInfo, WILDCARD, get_structured_path_info};
use crate::path_tree::{PathTreeNode, add_path_node, find_path_node_by_path};
use crate::state_class::StateClass;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A synthesised deep-path accessor: read the base, then walk the tail.
pub struct SynthesizedAccessor {
    /// The longest getter prefix, or the first-segment path.
    pub base: Rc<PathInfo>,
    /// The segments after the base, wildcards included.
    pub tail: Vec<SmolStr>,
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Path classification and dependency graph of one component class.
pub struct PathManager {
    alls: RefCell<HashSet<SmolStr>>,
    lists: RefCell<HashSet<SmolStr>>,
    elements: RefCell<HashSet<SmolStr>>,
    funcs: RefCell<HashSet<SmolStr>>,
    getters: RefCell<HashSet<SmolStr>>,
    setters: RefCell<HashSet<SmolStr>>,
    only_getters: RefCell<HashSet<SmolStr>>,
    getter_setters: RefCell<HashSet<SmolStr>>,
    optimizes: RefCell<HashMap<SmolStr, Rc<SynthesizedAccessor>>>,
    static_dependencies: RefCell<HashMap<SmolStr, Vec<SmolStr>>>,
    dynamic_dependencies: RefCell<HashMap<SmolStr, Vec<SmolStr>>>,
    has_connected_callback: Cell<bool>,
    has_disconnected_callback: Cell<bool>,
    has_updated_callback: Cell<bool>,
    root: Rc<PathTreeNode>,
    find_memo: RefCell<HashMap<SmolStr, Option<Rc<PathTreeNode>>>>,
}

impl PathManager {
    /// Build the manager for a state class: methods, getters, setters and
    /// all their prefixes are classified; accessors are synthesised for
    /// deep paths without user-defined access.
    pub fn new(class: &StateClass) -> Result<Rc<PathManager>, StructiveError> {
        let manager = Rc::new(PathManager {
            alls: RefCell::new(HashSet::new()),
            lists: RefCell::new(HashSet::new()),
            elements: RefCell::new(HashSet::new()),
            funcs: RefCell::new(HashSet::new()),
            getters: RefCell::new(HashSet::new()),
            setters: RefCell::new(HashSet::new()),
            only_getters: RefCell::new(HashSet::new()),
            getter_setters: RefCell::new(HashSet::new()),
            optimizes: RefCell::new(HashMap::new()),
            static_dependencies: RefCell::new(HashMap::new()),
            dynamic_dependencies: RefCell::new(HashMap::new()),
            has_connected_callback: Cell::new(class.connected_callback().is_some()),
            has_disconnected_callback: Cell::new(class.disconnected_callback().is_some()),
            has_updated_callback: Cell::new(class.updated_callback().is_some()),
            root: PathTreeNode::root(),
            find_memo: RefCell::new(HashMap::new()),
        });

        for name in class.method_names() {
            manager.funcs.borrow_mut().insert(name.clone());
        }
        for path in class.getter_paths() {
            manager.register_path(path)?;
            manager.getters.borrow_mut().insert(path.clone());
        }
        for path in class.setter_paths() {
            manager.register_path(path)?;
            manager.setters.borrow_mut().insert(path.clone());
        }
        for path in class.getter_paths() {
            if class.setter(path).is_some() {
                manager.getter_setters.borrow_mut().insert(path.clone());
            } else {
                manager.only_getters.borrow_mut().insert(path.clone());
            }
        }
        let known: Vec<SmolStr> = manager.alls.borrow().iter().cloned().collect();
        for path in known {
            manager.maybe_synthesize(&path)?;
        }
        Ok(manager)
    }

    /// The path tree root.
    pub fn root_node(&self) -> Rc<PathTreeNode> {
        self.root.clone()
    }

    /// Memoised path tree lookup.
    pub fn find_path_node(&self, path: &str) -> Option<Rc<PathTreeNode>> {
        if let Some(found) = self.find_memo.borrow().get(path) {
            return found.clone();
        }
        let found = find_path_node_by_path(&self.root, path);
        self.find_memo.borrow_mut().insert(SmolStr::new(path), found.clone());
        found
    }

    fn register_path(&self, path: &str) -> Result<Rc<PathInfo>, StructiveError> {
        let info = get_structured_path_info(path)?;
        for prefix_info in info.cumulative_infos() {
            let prefix = &prefix_info.pattern;
            if self.alls.borrow().contains(prefix) {
                continue;
            }
            self.alls.borrow_mut().insert(prefix.clone());
            self.find_memo.borrow_mut().remove(prefix);
            add_path_node(&self.root, prefix);
            if let Some(parent) = &prefix_info.parent_info {
                let mut deps = self.static_dependencies.borrow_mut();
                let children = deps.entry(parent.pattern.clone()).or_default();
                if !children.contains(prefix) {
                    children.push(prefix.clone());
                }
            }
            if prefix_info.last_segment == WILDCARD {
                self.elements.borrow_mut().insert(prefix.clone());
                let parent =
                    prefix_info.parent_info.as_ref().expect("wildcard paths have a parent");
                self.lists.borrow_mut().insert(parent.pattern.clone());
            }
        }
        Ok(info)
    }

    fn maybe_synthesize(&self, path: &str) -> Result<(), StructiveError> {
        if self.getters.borrow().contains(path)
            || self.setters.borrow().contains(path)
            || self.optimizes.borrow().contains_key(path)
        {
            return Ok(());
        }
        let info = get_structured_path_info(path)?;
        if info.path_segments.len() < 2 {
            return Ok(());
        }
        // The longest getter prefix anchors the accessor; without one the
        // first segment does.
        let strict_prefixes = &info.cumulative_paths[..info.cumulative_paths.len() - 1];
        let base_path = strict_prefixes
            .iter()
            .rev()
            .find(|prefix| self.getters.borrow().contains(*prefix))
            .cloned()
            .unwrap_or_else(|| info.cumulative_paths[0].clone());
        let base = get_structured_path_info(&base_path)?;
        let tail: Vec<SmolStr> = info.path_segments[base.path_segments.len()..].to_vec();
        for segment in &tail {
            if segment != WILDCARD && !is_identifier(segment) {
                return Err(StructiveError::new(
                    ErrorCode::StateInvalidWrite,
                    format!("segment `{segment}` of `{path}` is not a valid identifier"),
                )
                .with_context("where", "create_accessor_functions"));
            }
        }
        self.optimizes
            .borrow_mut()
            .insert(SmolStr::new(path), Rc::new(SynthesizedAccessor { base, tail }));
        Ok(())
    }

    /// Register a path discovered at runtime (binding creation, engine
    /// setup). `is_list` additionally classifies the path as a list and
    /// creates its `*` element path.
    pub fn add_path(&self, path: &str, is_list: bool) -> Result<(), StructiveError> {
        self.register_path(path)?;
        self.maybe_synthesize(path)?;
        if is_list && !self.lists.borrow().contains(path) {
            let element_path = format!("{path}.{WILDCARD}");
            self.register_path(&element_path)?;
            self.maybe_synthesize(&element_path)?;
        }
        Ok(())
    }

    /// Record a runtime dependency: `source` (a getter path) read
    /// `target`. Deduplicated; lookup is by referent.
    pub fn add_dynamic_dependency(&self, source: &SmolStr, target: &SmolStr) {
        let mut map = self.dynamic_dependencies.borrow_mut();
        let sources = map.entry(target.clone()).or_default();
        if !sources.contains(source) {
            log::debug!("dynamic dependency {source} -> {target}");
            sources.push(source.clone());
        }
    }

    /// The getter paths that dynamically depend on `path`.
    pub fn dynamic_dependents(&self, path: &str) -> Vec<SmolStr> {
        self.dynamic_dependencies.borrow().get(path).cloned().unwrap_or_default()
    }

    /// The statically derived children of `path`.
    pub fn static_children(&self, path: &str) -> Vec<SmolStr> {
        self.static_dependencies.borrow().get(path).cloned().unwrap_or_default()
    }

    /// True when the path is known.
    pub fn is_known(&self, path: &str) -> bool {
        self.alls.borrow().contains(path)
    }

    /// True when the path's value is a list.
    pub fn is_list(&self, path: &str) -> bool {
        self.lists.borrow().contains(path)
    }

    /// True when the path is a `<list>.*` element path.
    pub fn is_element(&self, path: &str) -> bool {
        self.elements.borrow().contains(path)
    }

    /// True when the path has a user getter.
    pub fn is_getter(&self, path: &str) -> bool {
        self.getters.borrow().contains(path)
    }

    /// True when the path has a user setter.
    pub fn is_setter(&self, path: &str) -> bool {
        self.setters.borrow().contains(path)
    }

    /// True when the path has a getter but no setter.
    pub fn is_only_getter(&self, path: &str) -> bool {
        self.only_getters.borrow().contains(path)
    }

    /// True when `name` is a declared method.
    pub fn is_func(&self, name: &str) -> bool {
        self.funcs.borrow().contains(name)
    }

    /// The synthesised accessor for `path`, when one exists.
    pub fn accessor(&self, path: &str) -> Option<Rc<SynthesizedAccessor>> {
        self.optimizes.borrow().get(path).cloned()
    }

    /// Whether the class declared `$connectedCallback`.
    pub fn has_connected_callback(&self) -> bool {
        self.has_connected_callback.get()
    }

    /// Whether the class declared `$disconnectedCallback`.
    pub fn has_disconnected_callback(&self) -> bool {
        self.has_disconnected_callback.get()
    }

    /// Whether the class declared `$updatedCallback`.
    pub fn has_updated_callback(&self) -> bool {
        self.has_updated_callback.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn manager_for(class: &Rc<StateClass>) -> Rc<PathManager> {
        PathManager::new(class).unwrap()
    }

    #[test]
    fn classifies_class_surface() {
        let class = StateClass::builder("test")
            .data(|| Value::object([]))
            .getter("full", |_| Ok(Value::Undefined))
            .getter("rw", |_| Ok(Value::Undefined))
            .setter("rw", |_, _| Ok(()))
            .method("increment", |_, _| Ok(Value::Undefined))
            .on_updated(|_, _, _| Ok(()))
            .build();
        let pm = manager_for(&class);
        assert!(pm.is_getter("full"));
        assert!(pm.is_only_getter("full"));
        assert!(pm.is_getter("rw") && pm.is_setter("rw"));
        assert!(!pm.is_only_getter("rw"));
        assert!(pm.is_func("increment"));
        assert!(pm.has_updated_callback());
        assert!(!pm.has_connected_callback());
        assert!(pm.is_known("full"));
    }

    #[test]
    fn add_path_builds_tree_lists_and_dependencies() {
        let class = StateClass::builder("test").build();
        let pm = manager_for(&class);
        pm.add_path("items", true).unwrap();
        pm.add_path("items.*.n", false).unwrap();

        assert!(pm.is_list("items"));
        assert!(pm.is_element("items.*"));
        assert!(pm.is_known("items.*.n"));
        assert!(pm.find_path_node("items.*.n").is_some());
        assert!(pm.find_path_node("items.*.missing").is_none());

        assert_eq!(pm.static_children("items"), vec![SmolStr::new("items.*")]);
        assert_eq!(pm.static_children("items.*"), vec![SmolStr::new("items.*.n")]);

        // Deep non-getter paths get a synthesised accessor.
        let accessor = pm.accessor("items.*.n").unwrap();
        assert_eq!(accessor.base.pattern, "items");
        assert_eq!(accessor.tail, vec![SmolStr::new("*"), SmolStr::new("n")]);
        assert!(pm.accessor("items").is_none());
    }

    #[test]
    fn accessor_anchors_on_the_longest_getter_prefix() {
        let class = StateClass::builder("test")
            .getter("profile.user", |_| Ok(Value::Undefined))
            .build();
        let pm = manager_for(&class);
        pm.add_path("profile.user.name", false).unwrap();
        let accessor = pm.accessor("profile.user.name").unwrap();
        assert_eq!(accessor.base.pattern, "profile.user");
        assert_eq!(accessor.tail, vec![SmolStr::new("name")]);
    }

    #[test]
    fn dynamic_dependencies_dedupe_and_look_up_by_referent() {
        let class = StateClass::builder("test").build();
        let pm = manager_for(&class);
        let full = SmolStr::new("full");
        let first = SmolStr::new("first");
        pm.add_dynamic_dependency(&full, &first);
        pm.add_dynamic_dependency(&full, &first);
        assert_eq!(pm.dynamic_dependents("first"), vec![full]);
        assert!(pm.dynamic_dependents("full").is_empty());
    }
}
