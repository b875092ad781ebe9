// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    The render walk.

    A [`Renderer`] lives for one queue drain. Element refs are handled
    first, grouped under their parent list (the reorder-only path); the
    general pass then walks the path tree from every remaining ref:
    own bindings, static children (new list slots only, for lists),
    dynamic dependents. Two sets make the walk linear: a ref renders at
    most once, a binding applies at most once.
*/

use crate::binding::Binding;
use crate::component::ComponentEngine;
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::path::{WILDCARD, get_structured_path_info, PathInfo};
use crate::path_tree::PathTreeNode;
use crate::state_ref::{RefKey, StateRef, get_state_property_ref};
use crate::updater::Updater;
use std::collections::HashSet;
use std::rc::Rc;

/// The transient state of one render.
pub struct Renderer {
    engine: Rc<ComponentEngine>,
    updater: Rc<Updater>,
    updating: Vec<StateRef>,
    updating_keys: HashSet<RefKey>,
    processed: HashSet<RefKey>,
    updated_bindings: HashSet<usize>,
}

impl Renderer {
    /// A renderer for one drain of `updater`'s queue.
    pub fn new(engine: Rc<ComponentEngine>, updater: Rc<Updater>) -> Renderer {
        Renderer {
            engine,
            updater,
            updating: Vec::new(),
            updating_keys: HashSet::new(),
            processed: HashSet::new(),
            updated_bindings: HashSet::new(),
        }
    }

    /// The engine being rendered.
    pub fn engine(&self) -> &Rc<ComponentEngine> {
        &self.engine
    }

    /// The updater whose batch is being rendered.
    pub fn updater(&self) -> &Rc<Updater> {
        &self.updater
    }

    /// The refs of the current batch.
    pub fn updating_refs(&self) -> &[StateRef] {
        &self.updating
    }

    /// The list slots of batch refs written under `element_path`.
    pub fn updating_element_indexes(&self, element_path: &str) -> Vec<ListIndex> {
        self.updating
            .iter()
            .filter(|state_ref| state_ref.pattern() == element_path)
            .filter_map(|state_ref| state_ref.list_index().cloned())
            .collect()
    }

    /// Apply one binding, at most once per render. Bindings inactivated
    /// earlier in the same render (a closed conditional, a pooled loop
    /// slot) are skipped.
    pub fn apply_binding(&mut self, binding: &Rc<Binding>) -> Result<(), StructiveError> {
        if !binding.is_active() {
            return Ok(());
        }
        if !self.updated_bindings.insert(binding.id()) {
            return Ok(());
        }
        binding.apply_change(self)
    }

    /// Render one batch.
    pub fn render(&mut self, items: &[StateRef]) -> Result<(), StructiveError> {
        self.updating = items.to_vec();
        self.updating_keys = items.iter().map(|state_ref| state_ref.key()).collect();
        let path_manager = self.engine.path_manager().clone();

        // Elementwise pass: writes to `<list>.*` slots reorder existing
        // content through the parent list's bindings. When the list ref
        // itself is in the batch the general pass re-diffs it anyway, so
        // the slots are only marked processed.
        let mut reorder_groups: Vec<StateRef> = Vec::new();
        for state_ref in items {
            if !path_manager.is_element(state_ref.pattern()) {
                continue;
            }
            let parent_ref = state_ref.parent_ref()?.ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::UpdaterElementParentMissing,
                    format!("element ref `{}` has no parent", state_ref.pattern()),
                )
            })?;
            self.processed.insert(state_ref.key());
            if self.updating_keys.contains(&parent_ref.key()) {
                continue;
            }
            if !reorder_groups.iter().any(|existing| existing.key() == parent_ref.key()) {
                reorder_groups.push(parent_ref);
            }
        }
        for parent_ref in reorder_groups {
            for binding in self.engine.bindings_for(parent_ref.key()) {
                self.apply_binding(&binding)?;
            }
            self.processed.insert(parent_ref.key());
        }

        // General pass.
        for state_ref in items.to_vec() {
            if self.processed.contains(&state_ref.key()) {
                continue;
            }
            let node = path_manager.find_path_node(state_ref.pattern()).ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::PathNodeMissing,
                    format!("no path node for `{}`", state_ref.pattern()),
                )
                .with_context("where", "render")
            })?;
            self.render_item(&state_ref, &node)?;
        }

        // Registered child components see the whole batch; the
        // child-component bindings filter and translate.
        for binding in self.engine.child_bindings() {
            binding.notify_redraw(&self.updating)?;
        }
        Ok(())
    }

    fn render_item(
        &mut self,
        state_ref: &StateRef,
        node: &Rc<PathTreeNode>,
    ) -> Result<(), StructiveError> {
        if !self.processed.insert(state_ref.key()) {
            return Ok(());
        }
        let engine = self.engine.clone();
        let path_manager = engine.path_manager().clone();
        let pattern = state_ref.pattern().clone();
        let is_list = path_manager.is_list(&pattern);

        // The pre-binding snapshot is the diff base: bindings reading the
        // list below reconcile the bookkeeping to the new slots.
        let old_indexes =
            if is_list { engine.state().remembered_list_indexes(state_ref.key()) } else { None };

        for binding in engine.bindings_for(state_ref.key()) {
            self.apply_binding(&binding)?;
        }

        let children = node.children();
        if !children.is_empty() {
            let appeared: Vec<ListIndex> = if is_list {
                let current = engine.state().get_list_indexes(&engine, state_ref)?;
                match old_indexes {
                    Some(old) => {
                        let old_ids: HashSet<usize> = old.iter().map(|li| li.id()).collect();
                        current.iter().filter(|li| !old_ids.contains(&li.id())).cloned().collect()
                    }
                    None => (*current).clone(),
                }
            } else {
                Vec::new()
            };
            for (segment, child_node) in children {
                let child_info = get_structured_path_info(&child_node.path)?;
                if segment == WILDCARD {
                    for li in &appeared {
                        let child_ref = get_state_property_ref(&child_info, Some(li.clone()));
                        self.render_item(&child_ref, &child_node)?;
                    }
                } else {
                    let child_ref =
                        get_state_property_ref(&child_info, state_ref.list_index().cloned());
                    self.render_item(&child_ref, &child_node)?;
                }
            }
        }

        for dependent in path_manager.dynamic_dependents(&pattern) {
            let dependent_info = get_structured_path_info(&dependent)?;
            let dependent_node = path_manager.find_path_node(&dependent).ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::PathNodeMissing,
                    format!("no path node for dependent `{dependent}`"),
                )
                .with_context("where", "render_item")
            })?;
            self.render_dependent(&dependent_info, &dependent_node, 0, None)?;
        }
        Ok(())
    }

    /// Render a dynamic dependent, expanding every list-index level of a
    /// wildcard-bearing path.
    fn render_dependent(
        &mut self,
        info: &Rc<PathInfo>,
        node: &Rc<PathTreeNode>,
        level: usize,
        li: Option<ListIndex>,
    ) -> Result<(), StructiveError> {
        if level == info.wildcard_count {
            let dependent_ref = get_state_property_ref(info, li);
            return self.render_item(&dependent_ref, node);
        }
        let engine = self.engine.clone();
        let list_ref = get_state_property_ref(&info.wildcard_parent_infos[level], li);
        let indexes = engine.state().get_list_indexes(&engine, &list_ref)?;
        for next in indexes.iter() {
            self.render_dependent(info, node, level + 1, Some(next.clone()))?;
        }
        Ok(())
    }
}
