// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Loop contexts.

    A bind content instantiated for one list element carries a loop
    context: the element path plus the list slot the instance is bound
    to. Contexts chain outward through the parent bindings, which is how
    `$1…$N` and wildcard path resolution find the right slots.
*/

use crate::bind_content::BindContent;
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::path::PathInfo;
use crate::state_ref::{StateRef, get_state_property_ref};
use smol_str::SmolStr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// The loop scope of one instantiated list element.
pub struct LoopContext {
    info: Rc<PathInfo>,
    list_index: RefCell<Option<ListIndex>>,
    bind_content: Weak<BindContent>,
    parent_cache: RefCell<Option<Option<Rc<LoopContext>>>>,
    find_cache: RefCell<HashMap<SmolStr, Option<Rc<LoopContext>>>>,
}

impl LoopContext {
    /// Create the context for a bind content rooted at `root_ref` (an
    /// element path carrying a list index).
    pub fn new(root_ref: &StateRef, bind_content: Weak<BindContent>) -> Rc<LoopContext> {
        Rc::new(LoopContext {
            info: root_ref.info().clone(),
            list_index: RefCell::new(root_ref.list_index().cloned()),
            bind_content,
            parent_cache: RefCell::new(None),
            find_cache: RefCell::new(HashMap::new()),
        })
    }

    /// The element path of the loop (`items.*`).
    pub fn path(&self) -> &SmolStr {
        &self.info.pattern
    }

    /// The path info of the loop's element path.
    pub fn info(&self) -> &Rc<PathInfo> {
        &self.info
    }

    /// The slot the surrounding bind content is currently bound to.
    /// A context whose content was pooled has no slot (LIST-202).
    pub fn list_index(&self) -> Result<ListIndex, StructiveError> {
        self.list_index.borrow().clone().ok_or_else(|| {
            StructiveError::new(
                ErrorCode::ListContextCleared,
                format!("loop context `{}` has no list index", self.info.pattern),
            )
            .with_context("where", "loop_context")
        })
    }

    /// The current ref of the loop element.
    pub fn current_ref(&self) -> Result<StateRef, StructiveError> {
        Ok(get_state_property_ref(&self.info, Some(self.list_index()?)))
    }

    /// Rebind the content to another slot, so the same instance can be
    /// reused at a different position.
    pub fn assign_list_index(&self, list_index: ListIndex) {
        *self.list_index.borrow_mut() = Some(list_index);
    }

    /// Drop the slot when the content is pooled.
    pub fn clear_list_index(&self) {
        *self.list_index.borrow_mut() = None;
    }

    /// The enclosing loop context, walking outward through the parent
    /// bindings. Cached after the first walk.
    pub fn parent(&self) -> Option<Rc<LoopContext>> {
        if let Some(cached) = self.parent_cache.borrow().as_ref() {
            return cached.clone();
        }
        let mut content = self.bind_content.upgrade();
        let mut found = None;
        while let Some(current) = content {
            let Some(binding) = current.parent_binding() else { break };
            let Some(parent_content) = binding.parent_content() else { break };
            if let Some(context) = parent_content.loop_context() {
                found = Some(context);
                break;
            }
            content = Some(parent_content);
        }
        *self.parent_cache.borrow_mut() = Some(found.clone());
        found
    }

    /// Find the context for an element path (`items.*`) in this chain,
    /// innermost first. Memoised per queried path.
    pub fn find(self: &Rc<Self>, path: &str) -> Option<Rc<LoopContext>> {
        if let Some(cached) = self.find_cache.borrow().get(path) {
            return cached.clone();
        }
        let found = if self.info.pattern == path {
            Some(self.clone())
        } else {
            self.parent().and_then(|parent| parent.find(path))
        };
        self.find_cache.borrow_mut().insert(SmolStr::new(path), found.clone());
        found
    }

    /// The slots of the whole chain, outermost first.
    pub fn list_indexes(self: &Rc<Self>) -> Result<Vec<ListIndex>, StructiveError> {
        let mut chain = Vec::new();
        let mut current = Some(self.clone());
        while let Some(context) = current {
            chain.push(context.list_index()?);
            current = context.parent();
        }
        chain.reverse();
        Ok(chain)
    }
}

impl core::fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "LoopContext({} @{:?})",
            self.info.pattern,
            self.list_index.borrow().as_ref().map(|li| li.index())
        )
    }
}
