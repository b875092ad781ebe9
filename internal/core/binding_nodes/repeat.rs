// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    The loop binding.

    One bind content per list slot, pooled on removal and reused before
    new allocation. The diff between the previous and the current slot
    identities decides between three shapes: a full clear (all-remove), a
    rebuild with pool reuse (anything added or removed, with a detached
    fragment when everything is new), and a reorder that only moves
    already-instantiated content.
*/

use crate::bind_content::BindContent;
use crate::binding::{Binding, BindingNode};
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::path::{WILDCARD, get_structured_path_info};
use crate::renderer::Renderer;
use crate::state_ref::get_state_property_ref;
use crate::value::Value;
use crate::dom::Node;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub(crate) struct RepeatBindingNode {
    template_id: usize,
    contents: RefCell<Vec<Rc<BindContent>>>,
    content_by_li: RefCell<HashMap<usize, Rc<BindContent>>>,
    pool: RefCell<Vec<Rc<BindContent>>>,
    old_values: RefCell<Vec<Value>>,
    old_indexes: RefCell<Vec<ListIndex>>,
}

impl RepeatBindingNode {
    pub(crate) fn new(template_id: usize) -> RepeatBindingNode {
        RepeatBindingNode {
            template_id,
            contents: RefCell::new(Vec::new()),
            content_by_li: RefCell::new(HashMap::new()),
            pool: RefCell::new(Vec::new()),
            old_values: RefCell::new(Vec::new()),
            old_indexes: RefCell::new(Vec::new()),
        }
    }

    fn content_for(&self, li: &ListIndex) -> Result<Rc<BindContent>, StructiveError> {
        self.content_by_li.borrow().get(&li.id()).cloned().ok_or_else(|| {
            StructiveError::new(
                ErrorCode::UpdaterLoopContentMissing,
                format!("no bind content for list slot {}", li.index()),
            )
            .with_context("where", "repeat")
        })
    }

    /// Take an instance from the pool (re-slotted) or build a fresh one.
    fn take_or_create(
        &self,
        binding: &Rc<Binding>,
        li: &ListIndex,
    ) -> Result<Rc<BindContent>, StructiveError> {
        let engine = binding.engine()?;
        let pooled = self.pool.borrow_mut().pop();
        let content = match pooled {
            Some(content) => {
                content.set_parent_binding(Some(binding));
                content.assign_list_index(li.clone())?;
                content
            }
            None => {
                let element_path = format!("{}.{}", binding.entry().state_path, WILDCARD);
                let element_info = get_structured_path_info(&element_path)?;
                let element_ref = get_state_property_ref(&element_info, Some(li.clone()));
                BindContent::new(&engine, self.template_id, Some(binding), Some(&element_ref))?
            }
        };
        content.activate()?;
        self.content_by_li.borrow_mut().insert(li.id(), content.clone());
        Ok(content)
    }

    fn retire(&self, content: &Rc<BindContent>) -> Result<(), StructiveError> {
        content.unmount();
        content.inactivate()?;
        content.set_parent_binding(None);
        self.pool.borrow_mut().push(content.clone());
        Ok(())
    }

    fn save_snapshot(&self, values: Vec<Value>, indexes: Vec<ListIndex>) {
        *self.old_values.borrow_mut() = values;
        *self.old_indexes.borrow_mut() = indexes;
    }

    /// True when `parent` holds nothing but the loop anchor and this
    /// loop's own content.
    fn owns_whole_parent(&self, parent: &Node, anchor: &Node) -> bool {
        let mut ours: HashSet<usize> = HashSet::new();
        ours.insert(anchor.id());
        for content in self.contents.borrow().iter() {
            for node in content.child_nodes() {
                ours.insert(node.id());
            }
        }
        parent.children().iter().all(|child| ours.contains(&child.id()))
    }
}

impl BindingNode for RepeatBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let engine = binding.engine()?;
        let list_ref = binding.resolve_ref()?;
        let list_value = engine.state().get_by_ref(&engine, &list_ref)?;
        if !list_value.is_list() {
            return Err(StructiveError::new(
                ErrorCode::BindContract,
                format!("`{}` is bound to a loop but is not a list", list_ref.pattern()),
            )
            .with_context("where", "repeat"));
        }
        let new_indexes = engine.state().get_list_indexes(&engine, &list_ref)?;
        let old_indexes = self.old_indexes.borrow().clone();
        let old_ids: HashSet<usize> = old_indexes.iter().map(|li| li.id()).collect();
        let new_ids: HashSet<usize> = new_indexes.iter().map(|li| li.id()).collect();
        let removes: Vec<ListIndex> =
            old_indexes.iter().filter(|li| !new_ids.contains(&li.id())).cloned().collect();
        let adds: HashSet<usize> =
            new_indexes.iter().filter(|li| !old_ids.contains(&li.id())).map(|li| li.id()).collect();

        // Slots written this batch: still-known identities are reorders,
        // unknown ones are overwrites.
        let element_path = format!("{}.{}", binding.entry().state_path, WILDCARD);
        let mut change_indexes: Vec<ListIndex> = Vec::new();
        let mut overwrites: Vec<ListIndex> = Vec::new();
        for li in renderer.updating_element_indexes(&element_path) {
            if old_ids.contains(&li.id()) {
                change_indexes.push(li);
            } else {
                overwrites.push(li);
            }
        }

        let anchor = binding.node().clone();
        let Some(parent) = anchor.parent() else {
            log::warn!("loop anchor for `{}` is detached; skipping", binding.entry().state_path);
            return Ok(());
        };

        // All-remove fast path: the parent only contains this loop, so
        // one text-content clear beats unmounting slot by slot.
        if new_indexes.is_empty() && !old_indexes.is_empty() && self.owns_whole_parent(&parent, &anchor)
        {
            parent.set_text_content("");
            parent.append_child(&anchor);
            for content in self.contents.borrow_mut().drain(..) {
                content.inactivate()?;
                content.set_parent_binding(None);
                self.pool.borrow_mut().push(content);
            }
            self.content_by_li.borrow_mut().clear();
            self.save_snapshot(list_value.items(), (*new_indexes).clone());
            return Ok(());
        }

        for li in &removes {
            let content = self.content_by_li.borrow_mut().remove(&li.id());
            if let Some(content) = content {
                self.retire(&content)?;
            }
        }

        if !adds.is_empty() || !removes.is_empty() {
            // Rebuild: walk the new order, reusing what exists and
            // mounting right after the previous slot's last node.
            let all_append = !new_indexes.is_empty()
                && new_indexes.iter().all(|li| adds.contains(&li.id()));
            let mut rebuilt: Vec<Rc<BindContent>> = Vec::with_capacity(new_indexes.len());
            if all_append {
                let fragment = Node::fragment();
                for li in new_indexes.iter() {
                    let content = self.take_or_create(binding, li)?;
                    content.mount(&fragment);
                    content.apply_change(renderer)?;
                    rebuilt.push(content);
                }
                parent.insert_after(&fragment, &anchor);
            } else {
                let mut moved: Vec<Rc<BindContent>> = Vec::new();
                let mut previous = anchor.clone();
                for li in new_indexes.iter() {
                    if adds.contains(&li.id()) {
                        let content = self.take_or_create(binding, li)?;
                        content.mount_after(&parent, &previous);
                        content.apply_change(renderer)?;
                        previous = content.get_last_node()?;
                        rebuilt.push(content);
                    } else {
                        let content = self.content_for(li)?;
                        let in_place = content
                            .first_child_node()
                            .and_then(|first| previous.next_sibling().map(|n| n.is_same(first)))
                            .unwrap_or(false);
                        if !in_place {
                            content.mount_after(&parent, &previous);
                            moved.push(content.clone());
                        }
                        previous = content.get_last_node()?;
                        rebuilt.push(content);
                    }
                }
                for content in moved {
                    content.apply_change(renderer)?;
                }
            }
            *self.contents.borrow_mut() = rebuilt;
        } else if !change_indexes.is_empty() || !overwrites.is_empty() {
            // Reorder only: nothing appeared or disappeared, so content
            // is moved into its new slot and overwritten slots re-apply.
            change_indexes.sort_by_key(|li| li.index());
            let mut previous = anchor.clone();
            let mut rebuilt: Vec<Rc<BindContent>> = Vec::with_capacity(new_indexes.len());
            let change_ids: HashSet<usize> = change_indexes.iter().map(|li| li.id()).collect();
            for li in new_indexes.iter() {
                let content = self.content_for(li)?;
                if change_ids.contains(&li.id()) {
                    let in_place = content
                        .first_child_node()
                        .and_then(|first| previous.next_sibling().map(|n| n.is_same(first)))
                        .unwrap_or(false);
                    if !in_place {
                        content.mount_after(&parent, &previous);
                    }
                }
                previous = content.get_last_node()?;
                rebuilt.push(content.clone());
            }
            *self.contents.borrow_mut() = rebuilt;
            for li in &overwrites {
                if let Ok(content) = self.content_for(li) {
                    content.apply_change(renderer)?;
                }
            }
        }

        self.save_snapshot(list_value.items(), (*new_indexes).clone());
        Ok(())
    }

    fn inactivate(&self, _binding: &Rc<Binding>) -> Result<(), StructiveError> {
        for content in self.contents.borrow_mut().drain(..) {
            content.unmount();
            content.inactivate()?;
            content.set_parent_binding(None);
            self.pool.borrow_mut().push(content);
        }
        self.content_by_li.borrow_mut().clear();
        self.old_values.borrow_mut().clear();
        self.old_indexes.borrow_mut().clear();
        Ok(())
    }

    fn bind_contents(&self) -> Vec<Rc<BindContent>> {
        self.contents.borrow().clone()
    }
}
