// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Interned `(path info, list index)` pairs.

    A [`StateRef`] identifies one cell of reactive state. Refs carrying a
    list index are interned weakly so they die with their slot; refs
    without one live for the process, like the path infos they wrap.
*/

use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::path::PathInfo;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// The interning key of a ref: path id and list index id.
pub type RefKey = (usize, Option<usize>);

/// One cell of reactive state: a path plus the list slot it is bound to.
pub struct StatePropertyRef {
    info: Rc<PathInfo>,
    list_index: Option<ListIndex>,
}

/// Shared handle to an interned [`StatePropertyRef`].
pub type StateRef = Rc<StatePropertyRef>;

impl StatePropertyRef {
    /// The canonical path info.
    pub fn info(&self) -> &Rc<PathInfo> {
        &self.info
    }

    /// The list slot, for wildcard-bearing paths.
    pub fn list_index(&self) -> Option<&ListIndex> {
        self.list_index.as_ref()
    }

    /// The path string.
    pub fn pattern(&self) -> &smol_str::SmolStr {
        &self.info.pattern
    }

    /// The interning key.
    pub fn key(&self) -> RefKey {
        (self.info.id, self.list_index.as_ref().map(|li| li.id()))
    }

    /// The ref of the parent path, stripping one list-index level iff the
    /// parent has fewer wildcards. `None` for single-segment paths.
    ///
    /// A parent that still needs a list index which this ref cannot
    /// provide raises LIST-201.
    pub fn parent_ref(&self) -> Result<Option<StateRef>, StructiveError> {
        let Some(parent_info) = &self.info.parent_info else {
            return Ok(None);
        };
        let parent_list_index = if parent_info.wildcard_count == 0 {
            None
        } else {
            let li = self.list_index.as_ref().ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::ListIndexMissing,
                    format!("path `{}` needs a list index for its parent", self.info.pattern),
                )
                .with_context("where", "parent_ref")
                .with_context("path", self.info.pattern.clone())
            })?;
            let depth = parent_info.wildcard_count as isize - 1;
            Some(li.at(depth).ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::ListIndexMissing,
                    format!(
                        "list index of `{}` is shallower than its parent `{}`",
                        self.info.pattern, parent_info.pattern
                    ),
                )
                .with_context("where", "parent_ref")
            })?)
        };
        Ok(Some(get_state_property_ref(parent_info, parent_list_index)))
    }
}

impl core::fmt::Debug for StatePropertyRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.list_index {
            Some(li) => write!(f, "StateRef({}#{})", self.info.pattern, li.id()),
            None => write!(f, "StateRef({})", self.info.pattern),
        }
    }
}

thread_local! {
    static PLAIN_INTERN: RefCell<HashMap<usize, StateRef>> = RefCell::new(HashMap::new());
    static INDEXED_INTERN: RefCell<HashMap<RefKey, Weak<StatePropertyRef>>> =
        RefCell::new(HashMap::new());
}

/// Return the canonical ref for `(info, list_index)`.
pub fn get_state_property_ref(info: &Rc<PathInfo>, list_index: Option<ListIndex>) -> StateRef {
    match list_index {
        None => PLAIN_INTERN.with(|table| {
            table
                .borrow_mut()
                .entry(info.id)
                .or_insert_with(|| {
                    Rc::new(StatePropertyRef { info: info.clone(), list_index: None })
                })
                .clone()
        }),
        Some(li) => INDEXED_INTERN.with(|table| {
            let key = (info.id, Some(li.id()));
            let mut table = table.borrow_mut();
            if let Some(existing) = table.get(&key).and_then(Weak::upgrade) {
                return existing;
            }
            let created =
                Rc::new(StatePropertyRef { info: info.clone(), list_index: Some(li) });
            table.insert(key, Rc::downgrade(&created));
            if table.len() % 1024 == 0 {
                table.retain(|_, weak| weak.strong_count() > 0);
            }
            created
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::get_structured_path_info;

    #[test]
    fn refs_are_interned_per_pair() {
        let info = get_structured_path_info("items.*.n").unwrap();
        let li = ListIndex::new(None, 0);
        let a = get_state_property_ref(&info, Some(li.clone()));
        let b = get_state_property_ref(&info, Some(li.clone()));
        assert!(Rc::ptr_eq(&a, &b));

        let other = get_state_property_ref(&info, Some(ListIndex::new(None, 1)));
        assert!(!Rc::ptr_eq(&a, &other));

        let plain_info = get_structured_path_info("count").unwrap();
        let p1 = get_state_property_ref(&plain_info, None);
        let p2 = get_state_property_ref(&plain_info, None);
        assert!(Rc::ptr_eq(&p1, &p2));
    }

    #[test]
    fn parent_ref_strips_one_level_exactly_when_needed() {
        let outer = ListIndex::new(None, 1);
        let inner = ListIndex::new(Some(outer.clone()), 2);

        let label = get_structured_path_info("items.*.tags.*.label").unwrap();
        let label_ref = get_state_property_ref(&label, Some(inner.clone()));

        // items.*.tags.* keeps both wildcard levels.
        let tags_star = label_ref.parent_ref().unwrap().unwrap();
        assert_eq!(tags_star.pattern(), "items.*.tags.*");
        assert_eq!(tags_star.list_index(), Some(&inner));

        // items.*.tags drops down to the outer slot.
        let tags = tags_star.parent_ref().unwrap().unwrap();
        assert_eq!(tags.pattern(), "items.*.tags");
        assert_eq!(tags.list_index(), Some(&outer));

        let star = tags.parent_ref().unwrap().unwrap();
        assert_eq!(star.pattern(), "items.*");
        assert_eq!(star.list_index(), Some(&outer));

        let items = star.parent_ref().unwrap().unwrap();
        assert_eq!(items.pattern(), "items");
        assert_eq!(items.list_index(), None);
        assert!(items.parent_ref().unwrap().is_none());
    }

    #[test]
    fn parent_ref_without_a_needed_list_index_fails() {
        let info = get_structured_path_info("rows.*.cells.*").unwrap();
        let bare = get_state_property_ref(&info, None);
        let err = bare.parent_ref().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ListIndexMissing);
    }
}
