// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    The child-component binding.

    A `state.<sub>:parent.path` entry wires one input of a nested
    component to a parent state path. The wiring waits for the child's
    tag to be defined; once it is, the element is upgraded, the
    parent↔child relation registered, and parent renders are forwarded —
    filtered to the refs that actually lie under the bound path and
    translated into the child's namespace.
*/

use crate::binding::{Binding, BindingNode};
use crate::component;
use crate::errors::{ErrorCode, StructiveError};
use crate::path::get_structured_path_info;
use crate::renderer::Renderer;
use crate::state_ref::{StateRef, get_state_property_ref};
use crate::updater::report_unhandled_error;
use smol_str::SmolStr;
use std::cell::Cell;
use std::rc::Rc;

pub(crate) struct ComponentBindingNode {
    sub_path: SmolStr,
    attached: Cell<bool>,
}

impl ComponentBindingNode {
    pub(crate) fn new(sub_path: SmolStr) -> ComponentBindingNode {
        ComponentBindingNode { sub_path, attached: Cell::new(false) }
    }
}

impl BindingNode for ComponentBindingNode {
    fn activate(&self, binding: &Rc<Binding>) -> Result<(), StructiveError> {
        if self.attached.replace(true) {
            return Ok(());
        }
        let tag = binding.node().tag().ok_or_else(|| {
            StructiveError::new(
                ErrorCode::ComponentIdentification,
                "child-component binding on a non-element node",
            )
        })?;
        let weak_binding = Rc::downgrade(binding);
        let sub_path = self.sub_path.clone();
        component::when_defined(&tag, move |_class| {
            let Some(binding) = weak_binding.upgrade() else { return };
            let result = (|| -> Result<(), StructiveError> {
                let parent_engine = binding.engine()?;
                // Wire the parent relation before the child connects so
                // its very first render already reads through it.
                let child = component::ensure_engine(binding.node())?;
                parent_engine.register_child_binding(&binding);
                child.bind_parent_state(&sub_path, &binding)?;
                child.connected_callback()?;
                // An input wired after connect still renders once.
                child.assign_parent_input(&sub_path)
            })();
            if let Err(error) = result {
                report_unhandled_error(error);
            }
        });
        Ok(())
    }

    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        // Forward the bound ref wholesale, gated on the tag definition.
        let Some(child) = component::engine_for_node(binding.node()) else {
            return Ok(());
        };
        child.assign_parent_input(&self.sub_path)
    }

    fn notify_redraw(&self, binding: &Rc<Binding>, refs: &[StateRef]) -> Result<(), StructiveError> {
        let Some(child) = component::engine_for_node(binding.node()) else {
            return Ok(());
        };
        let own_info = binding.state_info().ok_or_else(|| {
            StructiveError::new(ErrorCode::BindCreatorMissing, "component binding without a path")
        })?;
        let own_pattern = own_info.pattern.clone();
        let own_ref = binding.resolve_ref()?;
        let wildcard_count = own_info.wildcard_count;

        let mut forwarded: Vec<StateRef> = Vec::new();
        for state_ref in refs {
            // Only strict descendants of the bound path are the child's
            // business; the bound path itself goes through apply_change.
            if state_ref.pattern() == &own_pattern {
                continue;
            }
            if !state_ref.info().cumulative_path_set.contains(&own_pattern) {
                continue;
            }
            if wildcard_count > 0 {
                let depth = wildcard_count as isize - 1;
                let own_slot = own_ref.list_index().and_then(|li| li.at(depth));
                let ref_slot = state_ref.list_index().and_then(|li| li.at(depth));
                match (own_slot, ref_slot) {
                    (Some(a), Some(b)) if a == b => {}
                    _ => continue,
                }
            }
            let child_pattern =
                format!("{}{}", self.sub_path, &state_ref.pattern()[own_pattern.len()..]);
            let child_info = get_structured_path_info(&child_pattern)?;
            let child_li = if child_info.wildcard_count == 0 {
                None
            } else {
                state_ref.list_index().cloned()
            };
            forwarded.push(get_state_property_ref(&child_info, child_li));
        }
        if !forwarded.is_empty() {
            child.notify_redraw(forwarded);
        }
        Ok(())
    }
}
