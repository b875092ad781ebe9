// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

//! The conditional binding: one child bind content, mounted after the
//! anchor marker exactly while the bound value is true.

use crate::bind_content::BindContent;
use crate::binding::{Binding, BindingNode};
use crate::errors::{ErrorCode, StructiveError};
use crate::renderer::Renderer;
use crate::state_ref::get_state_property_ref;
use std::cell::RefCell;
use std::rc::Rc;

pub(crate) struct ConditionalBindingNode {
    template_id: usize,
    content: RefCell<Option<Rc<BindContent>>>,
}

impl ConditionalBindingNode {
    pub(crate) fn new(template_id: usize) -> ConditionalBindingNode {
        ConditionalBindingNode { template_id, content: RefCell::new(None) }
    }

    fn ensure_content(&self, binding: &Rc<Binding>) -> Result<Rc<BindContent>, StructiveError> {
        if let Some(content) = self.content.borrow().clone() {
            return Ok(content);
        }
        let engine = binding.engine()?;
        let info = binding
            .state_info()
            .ok_or_else(|| {
                StructiveError::new(ErrorCode::BindCreatorMissing, "`if` binding without a path")
            })?
            .clone();
        // The child content is rooted at a bare ref: the conditional
        // itself introduces no loop scope.
        let root_ref = get_state_property_ref(&info, None);
        let content = BindContent::new(&engine, self.template_id, Some(binding), Some(&root_ref))?;
        *self.content.borrow_mut() = Some(content.clone());
        Ok(content)
    }
}

impl BindingNode for ConditionalBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let value = binding.value()?;
        let on = value.as_bool().ok_or_else(|| {
            StructiveError::new(
                ErrorCode::BindContract,
                format!("`if` binding on `{}` expects a boolean", binding.entry().state_path),
            )
            .with_context("where", "conditional")
        })?;
        let content = self.ensure_content(binding)?;
        if on {
            content.activate()?;
            if !content.is_mounted() {
                let Some(parent) = binding.node().parent() else {
                    log::warn!(
                        "conditional anchor for `{}` is detached; skipping",
                        binding.entry().state_path
                    );
                    return Ok(());
                };
                content.mount_after(&parent, binding.node());
            }
            content.apply_change(renderer)?;
        } else {
            content.unmount();
            content.inactivate()?;
        }
        Ok(())
    }

    fn inactivate(&self, _binding: &Rc<Binding>) -> Result<(), StructiveError> {
        if let Some(content) = self.content.borrow().clone() {
            content.unmount();
            content.inactivate()?;
        }
        Ok(())
    }

    fn bind_contents(&self) -> Vec<Rc<BindContent>> {
        match self.content.borrow().clone() {
            Some(content) if content.is_active() => vec![content],
            _ => Vec::new(),
        }
    }
}
