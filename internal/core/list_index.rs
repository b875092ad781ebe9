// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Stable identity for list elements.

    Every element slot of a reactive list gets a [`ListIndex`] when it is
    first observed. The handle survives list mutations as long as the
    element value stays identity-equal, which is what lets the loop
    binding reuse instantiated content instead of rebuilding it.

    A thread-global version counter advances whenever any index is
    reassigned; each handle lazily recomputes its cached root→self
    position vector when an ancestor moved.
*/

use crate::value::Value;
use smol_str::{SmolStr, ToSmolStr};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

thread_local! {
    static GLOBAL_VERSION: Cell<u64> = const { Cell::new(1) };
    static NEXT_ID: Cell<usize> = const { Cell::new(1) };
}

fn global_version() -> u64 {
    GLOBAL_VERSION.with(|v| v.get())
}

fn bump_global_version() -> u64 {
    GLOBAL_VERSION.with(|v| {
        let next = v.get() + 1;
        v.set(next);
        next
    })
}

struct ListIndexData {
    id: usize,
    parent: Option<ListIndex>,
    /// 1-based nesting level; the root list is level 1.
    level: usize,
    index: Cell<usize>,
    cached_version: Cell<u64>,
    cached_indexes: RefCell<Vec<usize>>,
}

/// A stable handle identifying one element slot of a reactive list.
/// Clones share the slot; equality and hashing use the numeric id.
#[derive(Clone)]
pub struct ListIndex {
    inner: Rc<ListIndexData>,
}

impl ListIndex {
    /// Create a handle for a new element at `index`, nested under
    /// `parent` for inner lists.
    pub fn new(parent: Option<ListIndex>, index: usize) -> ListIndex {
        let level = parent.as_ref().map_or(1, |p| p.level() + 1);
        ListIndex {
            inner: Rc::new(ListIndexData {
                id: NEXT_ID.with(|n| {
                    let id = n.get();
                    n.set(id + 1);
                    id
                }),
                parent,
                level,
                index: Cell::new(index),
                cached_version: Cell::new(0),
                cached_indexes: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The process-unique id.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// The id in string form.
    pub fn sid(&self) -> SmolStr {
        self.inner.id.to_smolstr()
    }

    /// The current position in the owning list.
    pub fn index(&self) -> usize {
        self.inner.index.get()
    }

    /// Move the slot to a new position. Advances the global version so
    /// dependent caches recompute.
    pub fn set_index(&self, index: usize) {
        self.inner.index.set(index);
        bump_global_version();
    }

    /// The enclosing list's slot, for nested lists.
    pub fn parent(&self) -> Option<&ListIndex> {
        self.inner.parent.as_ref()
    }

    /// The 1-based nesting level; the root list is level 1.
    pub fn level(&self) -> usize {
        self.inner.level
    }

    /// True when an ancestor (or this slot) moved since `indexes` was
    /// last materialised.
    pub fn dirty(&self) -> bool {
        self.inner.cached_version.get() < global_version()
    }

    /// The root→self position vector, recomputed lazily when dirty.
    pub fn indexes(&self) -> Vec<usize> {
        if self.dirty() {
            let mut positions = Vec::with_capacity(self.inner.level);
            let mut chain: Vec<ListIndex> = Vec::with_capacity(self.inner.level);
            let mut current = Some(self.clone());
            while let Some(li) = current {
                current = li.parent().cloned();
                chain.push(li);
            }
            for li in chain.iter().rev() {
                positions.push(li.index());
            }
            *self.inner.cached_indexes.borrow_mut() = positions;
            self.inner.cached_version.set(global_version());
        }
        self.inner.cached_indexes.borrow().clone()
    }

    /// The ancestor at the given 0-based nesting depth; negative depths
    /// count back from this slot (`-1` is this slot). Out of range
    /// returns `None`.
    pub fn at(&self, pos: isize) -> Option<ListIndex> {
        let level = self.inner.level as isize;
        let absolute = if pos < 0 { level + pos } else { pos };
        if absolute < 0 || absolute >= level {
            return None;
        }
        let mut current = self.clone();
        for _ in 0..(level - 1 - absolute) {
            current = current.parent()?.clone();
        }
        Some(current)
    }
}

impl PartialEq for ListIndex {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}
impl Eq for ListIndex {}

impl core::hash::Hash for ListIndex {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl core::fmt::Debug for ListIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ListIndex(#{} @{})", self.inner.id, self.inner.index.get())
    }
}

/// Reconcile the list indexes of a list path after its value changed.
///
/// `old_values`/`old_indexes` are the last observed snapshot,
/// `new_values` the list as read now. Slots whose value is still present
/// (identity-equal) keep their handle, repositioned only when the
/// position changed; new values get fresh handles. Duplicate values
/// reuse the last old occurrence.
pub fn create_list_indexes(
    parent: Option<&ListIndex>,
    old_values: &[Value],
    new_values: &[Value],
    old_indexes: &[ListIndex],
) -> Vec<ListIndex> {
    if new_values.is_empty() {
        return Vec::new();
    }
    if old_values.is_empty() {
        return new_values
            .iter()
            .enumerate()
            .map(|(i, _)| ListIndex::new(parent.cloned(), i))
            .collect();
    }
    if old_values.len() == new_values.len()
        && old_values.iter().zip(new_values).all(|(a, b)| a == b)
    {
        return old_indexes.to_vec();
    }

    let mut index_by_value: HashMap<crate::value::ValueKey, usize> =
        HashMap::with_capacity(old_values.len());
    for (i, value) in old_values.iter().enumerate() {
        // Duplicates keep the last occurrence.
        index_by_value.insert(value.key(), i);
    }

    new_values
        .iter()
        .enumerate()
        .map(|(position, value)| match index_by_value.get(&value.key()) {
            Some(&old_position) => {
                let reused = old_indexes[old_position].clone();
                if reused.index() != position {
                    reused.set_index(position);
                }
                reused
            }
            None => ListIndex::new(parent.cloned(), position),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    fn strings(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn indexes_follow_the_parent_chain() {
        let outer = ListIndex::new(None, 2);
        let inner = ListIndex::new(Some(outer.clone()), 5);
        assert_eq!(inner.level(), 2);
        assert_eq!(inner.indexes(), vec![2, 5]);

        outer.set_index(3);
        assert!(inner.dirty());
        assert_eq!(inner.indexes(), vec![3, 5]);
        assert!(!inner.dirty());
    }

    #[test]
    fn at_addresses_depths_both_ways() {
        let a = ListIndex::new(None, 0);
        let b = ListIndex::new(Some(a.clone()), 1);
        let c = ListIndex::new(Some(b.clone()), 2);
        assert_eq!(c.at(0), Some(a.clone()));
        assert_eq!(c.at(1), Some(b.clone()));
        assert_eq!(c.at(2), Some(c.clone()));
        assert_eq!(c.at(-1), Some(c.clone()));
        assert_eq!(c.at(-3), Some(a));
        assert_eq!(c.at(3), None);
        assert_eq!(c.at(-4), None);
    }

    #[test]
    fn equal_lists_return_the_same_handles() {
        let shared = Value::object([(SmolStr::new("n"), Value::from("a"))]);
        let old_values = vec![shared.clone(), Value::from("x")];
        let old_indexes = vec![ListIndex::new(None, 0), ListIndex::new(None, 1)];
        let new_values = vec![shared, Value::from("x")];
        let result = create_list_indexes(None, &old_values, &new_values, &old_indexes);
        assert_eq!(result, old_indexes);
        assert_eq!(result[0].index(), 0);
        assert_eq!(result[1].index(), 1);
    }

    #[test]
    fn disjoint_lists_get_fresh_handles() {
        let old_values = strings(&["a", "b"]);
        let old_indexes = vec![ListIndex::new(None, 0), ListIndex::new(None, 1)];
        let new_values = strings(&["c", "d", "e"]);
        let result = create_list_indexes(None, &old_values, &new_values, &old_indexes);
        assert_eq!(result.len(), 3);
        for (i, li) in result.iter().enumerate() {
            assert_eq!(li.index(), i);
            assert!(!old_indexes.contains(li));
        }
    }

    #[test]
    fn overlapping_lists_reuse_and_reposition() {
        let old_values = strings(&["a", "b", "c"]);
        let old_indexes: Vec<_> = (0..3).map(|i| ListIndex::new(None, i)).collect();
        // c moves to the front, a and b shift down, d is new.
        let new_values = strings(&["c", "a", "b", "d"]);
        let result = create_list_indexes(None, &old_values, &new_values, &old_indexes);
        assert_eq!(result[0], old_indexes[2]);
        assert_eq!(result[1], old_indexes[0]);
        assert_eq!(result[2], old_indexes[1]);
        assert_eq!(result[0].index(), 0);
        assert_eq!(result[1].index(), 1);
        assert_eq!(result[2].index(), 2);
        assert_eq!(result[3].index(), 3);
        assert!(!old_indexes.contains(&result[3]));
    }

    #[test]
    fn duplicates_reuse_the_last_occurrence() {
        let old_values = strings(&["a", "a"]);
        let old_indexes = vec![ListIndex::new(None, 0), ListIndex::new(None, 1)];
        let new_values = strings(&["a"]);
        let result = create_list_indexes(None, &old_values, &new_values, &old_indexes);
        assert_eq!(result[0], old_indexes[1]);
        assert_eq!(result[0].index(), 0);
    }
}
