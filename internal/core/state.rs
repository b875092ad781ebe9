// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Ref-based state access.

    The [`StateHandle`] owns one component's state object and mediates
    every read and write through `(path, list-index)` refs: a ref stack
    tracks what is being evaluated (dynamic dependencies and `$1…$N`
    come from it), a per-ref cache short-circuits repeated reads, and
    element writes are interpreted against swap bookkeeping so list
    permutations keep their element identities.

    User code never touches the handle; it gets a [`StateAccessor`],
    the Rust rendering of the original's state proxy. Writable accessors
    exist only inside an update session; everything else refuses writes.
*/

use crate::component::ComponentEngine;
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::{ListIndex, create_list_indexes};
use crate::loop_context::LoopContext;
use crate::path::{PathInfo, WILDCARD, get_structured_path_info};
use crate::path_manager::{PathManager, SynthesizedAccessor};
use crate::state_class::StateClass;
use crate::state_ref::{RefKey, StateRef, get_state_property_ref};
use crate::value::{Value, ValueKey};
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

struct CacheEntry {
    value: Value,
    version: u64,
    revision: u64,
}

#[derive(Default)]
struct ListSnapshot {
    values: Vec<Value>,
    indexes: Rc<Vec<ListIndex>>,
}

fn property_missing(path: &str, hint: &str) -> StructiveError {
    StructiveError::new(ErrorCode::StatePropertyNotFound, format!("no such property: `{path}`"))
        .with_context("where", hint)
        .with_context("path", path)
}

fn list_index_missing(path: &str, hint: &str) -> StructiveError {
    StructiveError::new(ErrorCode::ListIndexMissing, format!("no list index for `{path}`"))
        .with_context("where", hint)
        .with_context("path", path)
}

fn multiset_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<ValueKey, isize> = HashMap::with_capacity(a.len());
    for value in a {
        *counts.entry(value.key()).or_default() += 1;
    }
    for value in b {
        *counts.entry(value.key()).or_default() -= 1;
    }
    counts.values().all(|count| *count == 0)
}

/// One component's state: the target object, the ref stack, the cache
/// and the list bookkeeping.
pub struct StateHandle {
    class: Rc<StateClass>,
    target: Value,
    path_manager: Rc<PathManager>,
    ref_stack: RefCell<Vec<Option<StateRef>>>,
    ref_index: Cell<isize>,
    cache: RefCell<HashMap<RefKey, CacheEntry>>,
    list_snapshots: RefCell<HashMap<RefKey, ListSnapshot>>,
    loop_context: RefCell<Option<Rc<LoopContext>>>,
}

impl StateHandle {
    /// Instantiate the state of `class` and classify its surface.
    pub fn new(class: Rc<StateClass>) -> Result<StateHandle, StructiveError> {
        let path_manager = PathManager::new(&class)?;
        let target = class.instantiate();
        Ok(StateHandle {
            class,
            target,
            path_manager,
            ref_stack: RefCell::new(Vec::new()),
            ref_index: Cell::new(-1),
            cache: RefCell::new(HashMap::new()),
            list_snapshots: RefCell::new(HashMap::new()),
            loop_context: RefCell::new(None),
        })
    }

    /// The state object.
    pub fn target(&self) -> &Value {
        &self.target
    }

    /// The state class.
    pub fn class(&self) -> &Rc<StateClass> {
        &self.class
    }

    /// The per-class path manager.
    pub fn path_manager(&self) -> &Rc<PathManager> {
        &self.path_manager
    }

    /// The ref currently being evaluated, if any.
    pub fn last_ref(&self) -> Option<StateRef> {
        let index = self.ref_index.get();
        if index < 0 {
            return None;
        }
        self.ref_stack.borrow().get(index as usize).cloned().flatten()
    }

    fn with_ref_on_stack<R>(&self, state_ref: &StateRef, f: impl FnOnce() -> R) -> R {
        let index = {
            let mut stack = self.ref_stack.borrow_mut();
            let index = (self.ref_index.get() + 1) as usize;
            if stack.len() <= index {
                stack.resize(index + 1, None);
            }
            stack[index] = Some(state_ref.clone());
            index
        };
        self.ref_index.set(index as isize);
        // The stack unwinds even when `f` fails or panics.
        let _pop = scopeguard::guard((), |_| {
            self.ref_stack.borrow_mut()[index] = None;
            self.ref_index.set(index as isize - 1);
        });
        f()
    }

    /// The innermost loop context installed for the current callback.
    pub fn current_loop_context(&self) -> Option<Rc<LoopContext>> {
        self.loop_context.borrow().clone()
    }

    /// Run `f` with `context` installed as the current loop scope, the
    /// context's ref on the stack and guaranteed unwinding.
    pub fn with_loop_context<R>(
        &self,
        context: Option<Rc<LoopContext>>,
        f: impl FnOnce() -> Result<R, StructiveError>,
    ) -> Result<R, StructiveError> {
        let context_ref = match &context {
            Some(context) => Some(context.current_ref()?),
            None => None,
        };
        let previous = self.loop_context.replace(context);
        let restore = RefCell::new(Some(previous));
        let _reset = scopeguard::guard((), |_| {
            *self.loop_context.borrow_mut() = restore.borrow_mut().take().flatten();
        });
        match context_ref {
            Some(context_ref) => self.with_ref_on_stack(&context_ref, f),
            None => f(),
        }
    }

    /// Derive the list index for a path from the evaluation context: the
    /// ref stack first, the installed loop context chain second.
    pub fn resolve_list_index(
        &self,
        info: &Rc<PathInfo>,
    ) -> Result<Option<ListIndex>, StructiveError> {
        if info.wildcard_count == 0 {
            return Ok(None);
        }
        let wildcard_path =
            info.last_wildcard_path().expect("wildcard-bearing paths have a wildcard prefix");
        if let Some(top) = self.last_ref() {
            if let Some(&depth) = top.info().index_by_wildcard_path.get(wildcard_path) {
                if let Some(li) = top.list_index() {
                    return Ok(li.at(depth as isize));
                }
            }
        }
        if let Some(context) = self.current_loop_context() {
            if let Some(found) = context.find(wildcard_path) {
                return Ok(Some(found.list_index()?));
            }
        }
        Ok(None)
    }

    fn record_dynamic_dependency(&self, target: &SmolStr) {
        if let Some(last) = self.last_ref() {
            let source = last.pattern();
            if source != target && self.path_manager.is_only_getter(source) {
                self.path_manager.add_dynamic_dependency(source, target);
            }
        }
    }

    fn cache_lookup(&self, engine: &Rc<ComponentEngine>, state_ref: &StateRef) -> Option<Value> {
        let cache = self.cache.borrow();
        let entry = cache.get(&state_ref.key())?;
        let updater = engine.updater();
        if entry.version > updater.version() {
            return Some(entry.value.clone());
        }
        let fresh = match updater.stamp_for(state_ref.pattern()) {
            Some((version, revision)) => {
                entry.version > version || (entry.version == version && entry.revision >= revision)
            }
            None => entry.version == updater.version(),
        };
        fresh.then(|| entry.value.clone())
    }

    fn cache_store(&self, engine: &Rc<ComponentEngine>, state_ref: &StateRef, value: &Value) {
        let updater = engine.updater();
        self.cache.borrow_mut().insert(
            state_ref.key(),
            CacheEntry { value: value.clone(), version: updater.version(), revision: updater.revision() },
        );
    }

    /// Read one state cell.
    pub fn get_by_ref(
        &self,
        engine: &Rc<ComponentEngine>,
        state_ref: &StateRef,
    ) -> Result<Value, StructiveError> {
        let pattern = state_ref.pattern().clone();
        self.record_dynamic_dependency(&pattern);

        let cacheable = self.path_manager.is_list(&pattern)
            || state_ref.info().wildcard_count > 0
            || self.path_manager.is_getter(&pattern);
        if cacheable {
            if let Some(value) = self.cache_lookup(engine, state_ref) {
                return Ok(value);
            }
        }

        if let Some((parent_engine, parent_ref)) = engine.delegate_to_parent(state_ref)? {
            return parent_engine.state().get_by_ref(&parent_engine, &parent_ref);
        }

        let value = self.resolve_on_target(engine, state_ref)?;
        if cacheable {
            self.cache_store(engine, state_ref, &value);
        }
        Ok(value)
    }

    fn resolve_on_target(
        &self,
        engine: &Rc<ComponentEngine>,
        state_ref: &StateRef,
    ) -> Result<Value, StructiveError> {
        let info = state_ref.info().clone();
        let pattern = info.pattern.clone();
        if let Some(getter) = self.class.getter(&pattern) {
            let accessor = StateAccessor::readonly(engine.clone());
            return self.with_ref_on_stack(state_ref, || getter(&accessor));
        }
        if info.path_segments.len() == 1 {
            return self.with_ref_on_stack(state_ref, || {
                self.target.get_property(&pattern).ok_or_else(|| property_missing(&pattern, "get_by_ref"))
            });
        }
        if let Some(accessor) = self.path_manager.accessor(&pattern) {
            return self
                .with_ref_on_stack(state_ref, || self.accessor_get(engine, state_ref, &accessor));
        }
        Err(property_missing(&pattern, "get_by_ref"))
    }

    fn accessor_base_ref(
        &self,
        state_ref: &StateRef,
        accessor: &SynthesizedAccessor,
    ) -> Result<StateRef, StructiveError> {
        let base_list_index = if accessor.base.wildcard_count == 0 {
            None
        } else {
            let li = state_ref
                .list_index()
                .ok_or_else(|| list_index_missing(state_ref.pattern(), "accessor"))?;
            Some(
                li.at(accessor.base.wildcard_count as isize - 1)
                    .ok_or_else(|| list_index_missing(state_ref.pattern(), "accessor"))?,
            )
        };
        Ok(get_state_property_ref(&accessor.base, base_list_index))
    }

    fn accessor_get(
        &self,
        engine: &Rc<ComponentEngine>,
        state_ref: &StateRef,
        accessor: &SynthesizedAccessor,
    ) -> Result<Value, StructiveError> {
        let base_ref = self.accessor_base_ref(state_ref, accessor)?;
        let mut value = self.get_by_ref(engine, &base_ref)?;
        let mut wildcard_level = accessor.base.wildcard_count;
        for segment in &accessor.tail {
            value = self.step_into(state_ref, &value, segment, &mut wildcard_level)?;
        }
        Ok(value)
    }

    fn step_into(
        &self,
        state_ref: &StateRef,
        value: &Value,
        segment: &SmolStr,
        wildcard_level: &mut usize,
    ) -> Result<Value, StructiveError> {
        if segment == WILDCARD {
            let li = state_ref
                .list_index()
                .ok_or_else(|| list_index_missing(state_ref.pattern(), "accessor"))?;
            let positions = li.indexes();
            let position = *positions
                .get(*wildcard_level)
                .ok_or_else(|| list_index_missing(state_ref.pattern(), "accessor"))?;
            *wildcard_level += 1;
            value.item(position).ok_or_else(|| property_missing(state_ref.pattern(), "accessor"))
        } else {
            value
                .get_property(segment)
                .ok_or_else(|| property_missing(state_ref.pattern(), "accessor"))
        }
    }

    fn accessor_set(
        &self,
        engine: &Rc<ComponentEngine>,
        state_ref: &StateRef,
        accessor: &SynthesizedAccessor,
        value: Value,
    ) -> Result<(), StructiveError> {
        let base_ref = self.accessor_base_ref(state_ref, accessor)?;
        let mut current = self.get_by_ref(engine, &base_ref)?;
        let mut wildcard_level = accessor.base.wildcard_count;
        let (last, walk) = accessor.tail.split_last().expect("accessor tails are non-empty");
        for segment in walk {
            current = self.step_into(state_ref, &current, segment, &mut wildcard_level)?;
        }
        let done = if last == WILDCARD {
            let li = state_ref
                .list_index()
                .ok_or_else(|| list_index_missing(state_ref.pattern(), "accessor"))?;
            let positions = li.indexes();
            let position = *positions
                .get(wildcard_level)
                .ok_or_else(|| list_index_missing(state_ref.pattern(), "accessor"))?;
            current.set_item(position, value)
        } else {
            current.set_property(last, value)
        };
        if done { Ok(()) } else { Err(property_missing(state_ref.pattern(), "accessor")) }
    }

    /// Write one state cell. The written ref is always enqueued on the
    /// updater; element writes additionally run the swap bookkeeping.
    pub fn set_by_ref(
        &self,
        engine: &Rc<ComponentEngine>,
        state_ref: &StateRef,
        value: Value,
    ) -> Result<(), StructiveError> {
        let pattern = state_ref.pattern().clone();
        let is_element = self.path_manager.is_element(&pattern);
        if is_element {
            self.init_swap_info(engine, state_ref)?;
        }
        let result = (|| -> Result<(), StructiveError> {
            if let Some((parent_engine, parent_ref)) = engine.delegate_to_parent(state_ref)? {
                return parent_engine.state().set_by_ref(&parent_engine, &parent_ref, value.clone());
            }
            if let Some(setter) = self.class.setter(&pattern) {
                let accessor = StateAccessor::writable(engine.clone());
                return self
                    .with_ref_on_stack(state_ref, || setter(&accessor, value.clone()));
            }
            if state_ref.info().path_segments.len() == 1 {
                self.target.set_property(&pattern, value.clone());
                return Ok(());
            }
            if let Some(accessor) = self.path_manager.accessor(&pattern) {
                return self.with_ref_on_stack(state_ref, || {
                    self.accessor_set(engine, state_ref, &accessor, value.clone())
                });
            }
            // No declared access: go through the parent value.
            let parent_ref = state_ref
                .parent_ref()?
                .ok_or_else(|| property_missing(&pattern, "set_by_ref"))?;
            let parent_value = self.get_by_ref(engine, &parent_ref)?;
            let done = if state_ref.info().last_segment == WILDCARD {
                let li = state_ref
                    .list_index()
                    .ok_or_else(|| list_index_missing(&pattern, "set_by_ref"))?;
                parent_value.set_item(li.index(), value.clone())
            } else {
                parent_value.set_property(&state_ref.info().last_segment, value.clone())
            };
            if done { Ok(()) } else { Err(property_missing(&pattern, "set_by_ref")) }
        })();
        // `finally`: bookkeeping and enqueueing happen even on failure.
        if is_element {
            self.note_element_write(engine, state_ref, &value);
        }
        engine.enqueue_ref(state_ref.clone());
        result
    }

    fn init_swap_info(
        &self,
        engine: &Rc<ComponentEngine>,
        state_ref: &StateRef,
    ) -> Result<(), StructiveError> {
        let parent_ref = state_ref.parent_ref()?.ok_or_else(|| {
            StructiveError::new(
                ErrorCode::UpdaterElementParentMissing,
                format!("element path `{}` has no parent list", state_ref.pattern()),
            )
        })?;
        let updater = engine.updater_for_write();
        if updater.has_swap_info(parent_ref.key()) {
            return Ok(());
        }
        let list_value = self.get_by_ref(engine, &parent_ref)?;
        let indexes = self.get_list_indexes(engine, &parent_ref)?;
        updater.init_swap_info(parent_ref.key(), list_value.items(), (*indexes).clone());
        Ok(())
    }

    fn note_element_write(&self, engine: &Rc<ComponentEngine>, state_ref: &StateRef, value: &Value) {
        let Ok(Some(parent_ref)) = state_ref.parent_ref() else { return };
        let key = parent_ref.key();
        let updater = engine.updater_for_write();
        let Some(swap) = updater.swap_info(key) else { return };
        let Some(li) = state_ref.list_index() else { return };
        let slot = li.index();

        let mut snapshots = self.list_snapshots.borrow_mut();
        let Some(snapshot) = snapshots.get_mut(&key) else { return };
        if slot >= snapshot.values.len() {
            return;
        }
        match swap.values.iter().rposition(|old| old == value) {
            Some(position) => {
                // A known value moved here: its identity follows it. The
                // slot's previous identity stays parked until a later
                // write claims its position.
                let mut indexes = (*snapshot.indexes).clone();
                indexes[slot] = swap.list_indexes[position].clone();
                snapshot.indexes = Rc::new(indexes);
                snapshot.values[slot] = value.clone();
            }
            None => {
                // A genuine overwrite; the next list read mints a fresh
                // identity for this slot.
                return;
            }
        }
        if multiset_eq(&snapshot.values, &swap.values) {
            for (position, li) in snapshot.indexes.iter().enumerate() {
                if li.index() != position {
                    li.set_index(position);
                }
            }
            updater.remove_swap_info(key);
        } else {
            log::debug!("swap info for {} still open after slot {slot}", parent_ref.pattern());
        }
    }

    /// The reconciled list indexes of a list ref, delegating to the
    /// parent component for mapped paths. LIST-203 when the value is not
    /// a list.
    pub fn get_list_indexes(
        &self,
        engine: &Rc<ComponentEngine>,
        list_ref: &StateRef,
    ) -> Result<Rc<Vec<ListIndex>>, StructiveError> {
        if let Some((parent_engine, parent_ref)) = engine.delegate_to_parent(list_ref)? {
            return parent_engine.state().get_list_indexes(&parent_engine, &parent_ref);
        }
        let value = self.get_by_ref(engine, list_ref)?;
        if !value.is_list() {
            return Err(StructiveError::new(
                ErrorCode::ListStateMissing,
                format!("`{}` is not a list", list_ref.pattern()),
            )
            .with_context("where", "get_list_indexes"));
        }
        let new_values = value.items();
        let mut snapshots = self.list_snapshots.borrow_mut();
        let snapshot = snapshots.entry(list_ref.key()).or_default();
        if snapshot.values.len() == new_values.len()
            && snapshot.values.iter().zip(&new_values).all(|(a, b)| a == b)
        {
            return Ok(snapshot.indexes.clone());
        }
        let new_indexes = create_list_indexes(
            list_ref.list_index(),
            &snapshot.values,
            &new_values,
            &snapshot.indexes,
        );
        snapshot.values = new_values;
        snapshot.indexes = Rc::new(new_indexes);
        Ok(snapshot.indexes.clone())
    }

    /// The last reconciled indexes of a list ref, without re-reading.
    pub fn remembered_list_indexes(&self, key: RefKey) -> Option<Rc<Vec<ListIndex>>> {
        self.list_snapshots.borrow().get(&key).map(|snapshot| snapshot.indexes.clone())
    }

    /// Resolve `(path, positions)` to a concrete ref, interning the list
    /// indexes level by level. Fewer positions than wildcards is the
    /// unsupported partial case (STATE-202).
    pub fn resolve_indexed_ref(
        &self,
        engine: &Rc<ComponentEngine>,
        path: &str,
        positions: &[usize],
    ) -> Result<StateRef, StructiveError> {
        let info = get_structured_path_info(path)?;
        if positions.len() < info.wildcard_count {
            return Err(StructiveError::new(
                ErrorCode::StateInvalidWrite,
                format!(
                    "`{path}` needs {} indexes, got {}",
                    info.wildcard_count,
                    positions.len()
                ),
            )
            .with_context("where", "resolve"));
        }
        let mut li: Option<ListIndex> = None;
        for (level, parent_info) in info.wildcard_parent_infos.iter().enumerate() {
            let list_ref = get_state_property_ref(parent_info, li.clone());
            let indexes = self.get_list_indexes(engine, &list_ref)?;
            let position = positions[level];
            let next = indexes.get(position).ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::ListStateMissing,
                    format!("index {position} out of range for `{}`", parent_info.pattern),
                )
                .with_context("where", "resolve")
            })?;
            li = Some(next.clone());
        }
        Ok(get_state_property_ref(&info, li))
    }

    fn get_all_walk(
        &self,
        engine: &Rc<ComponentEngine>,
        info: &Rc<PathInfo>,
        positions: &[usize],
        level: usize,
        li: Option<ListIndex>,
        out: &mut Vec<Value>,
    ) -> Result<(), StructiveError> {
        if level == info.wildcard_count {
            let leaf = get_state_property_ref(info, li);
            out.push(self.get_by_ref(engine, &leaf)?);
            return Ok(());
        }
        let list_ref = get_state_property_ref(&info.wildcard_parent_infos[level], li);
        let indexes = self.get_list_indexes(engine, &list_ref)?;
        match positions.get(level) {
            Some(&position) => {
                let next = indexes.get(position).ok_or_else(|| {
                    StructiveError::new(
                        ErrorCode::ListStateMissing,
                        format!("index {position} out of range for `{}`", list_ref.pattern()),
                    )
                    .with_context("where", "get_all")
                })?;
                self.get_all_walk(engine, info, positions, level + 1, Some(next.clone()), out)
            }
            None => {
                for next in indexes.iter() {
                    self.get_all_walk(engine, info, positions, level + 1, Some(next.clone()), out)?;
                }
                Ok(())
            }
        }
    }

    /// Read every cell of a wildcard path, expanding unbound levels.
    pub fn get_all(
        &self,
        engine: &Rc<ComponentEngine>,
        path: &str,
        positions: &[usize],
    ) -> Result<Vec<Value>, StructiveError> {
        let info = get_structured_path_info(path)?;
        self.record_dynamic_dependency(&info.pattern);
        let mut out = Vec::new();
        self.get_all_walk(engine, &info, positions, 0, None, &mut out)?;
        Ok(out)
    }
}

/// The state surface handed to user code (`this` of the original).
pub struct StateAccessor {
    engine: Rc<ComponentEngine>,
    writable: bool,
}

impl StateAccessor {
    pub(crate) fn readonly(engine: Rc<ComponentEngine>) -> StateAccessor {
        StateAccessor { engine, writable: false }
    }

    pub(crate) fn writable(engine: Rc<ComponentEngine>) -> StateAccessor {
        StateAccessor { engine, writable: true }
    }

    /// The component engine behind this accessor.
    pub fn engine(&self) -> &Rc<ComponentEngine> {
        &self.engine
    }

    fn resolve_named_ref(&self, path: &str) -> Result<StateRef, StructiveError> {
        let state = self.engine.state();
        let info = get_structured_path_info(path)?;
        let li = state.resolve_list_index(&info)?;
        Ok(get_state_property_ref(&info, li))
    }

    /// Read a path, resolving wildcards against the current loop scope.
    /// `$1`…`$N` short-cut to the loop indexes.
    pub fn get(&self, path: &str) -> Result<Value, StructiveError> {
        if let Some(rest) = path.strip_prefix('$') {
            if let Ok(n) = rest.parse::<usize>() {
                return self.index(n).map(|position| Value::Number(position as f64));
            }
        }
        let state_ref = self.resolve_named_ref(path)?;
        self.engine.state().get_by_ref(&self.engine, &state_ref)
    }

    /// Write a path. Outside an update session this raises STATE-202.
    pub fn set(&self, path: &str, value: Value) -> Result<(), StructiveError> {
        self.ensure_writable(path)?;
        let state_ref = self.resolve_named_ref(path)?;
        self.engine.state().set_by_ref(&self.engine, &state_ref, value)
    }

    fn ensure_writable(&self, path: &str) -> Result<(), StructiveError> {
        if self.writable {
            return Ok(());
        }
        Err(StructiveError::new(
            ErrorCode::StateInvalidWrite,
            format!("cannot write `{path}` outside an update session"),
        )
        .with_context("where", "StateAccessor::set"))
    }

    /// The 1-based loop index `$n`, outermost first.
    pub fn index(&self, n: usize) -> Result<usize, StructiveError> {
        if n == 0 {
            return Err(StructiveError::new(ErrorCode::StateInvalidWrite, "loop indexes are 1-based"));
        }
        let state = self.engine.state();
        let top = state.last_ref().ok_or_else(|| list_index_missing("$index", "index"))?;
        let li = top.list_index().ok_or_else(|| list_index_missing(top.pattern(), "index"))?;
        li.indexes().get(n - 1).copied().ok_or_else(|| list_index_missing(top.pattern(), "index"))
    }

    /// `$resolve(path, indexes)`: read a cell addressed by positions.
    pub fn resolve(&self, path: &str, positions: &[usize]) -> Result<Value, StructiveError> {
        let state = self.engine.state();
        state.record_dynamic_dependency(&SmolStr::new(path));
        let state_ref = state.resolve_indexed_ref(&self.engine, path, positions)?;
        state.get_by_ref(&self.engine, &state_ref)
    }

    /// `$resolve(path, indexes, value)`: write a cell addressed by
    /// positions.
    pub fn resolve_set(
        &self,
        path: &str,
        positions: &[usize],
        value: Value,
    ) -> Result<(), StructiveError> {
        self.ensure_writable(path)?;
        let state = self.engine.state();
        let state_ref = state.resolve_indexed_ref(&self.engine, path, positions)?;
        state.set_by_ref(&self.engine, &state_ref, value)
    }

    /// `$getAll(path, indexes?)`.
    pub fn get_all(&self, path: &str, positions: &[usize]) -> Result<Vec<Value>, StructiveError> {
        self.engine.state().get_all(&self.engine, path, positions)
    }

    /// `$trackDependency(path)`: record an explicit dynamic edge from
    /// the getter being evaluated.
    pub fn track_dependency(&self, path: &str) -> Result<(), StructiveError> {
        let info = get_structured_path_info(path)?;
        self.engine.state().record_dynamic_dependency(&info.pattern);
        Ok(())
    }

    /// `$navigate(to)`: forwarded to the embedder's router hook.
    pub fn navigate(&self, to: &str) {
        self.engine.navigate(to);
    }

    /// `$component`: the host element of the component.
    pub fn component(&self) -> crate::dom::Node {
        self.engine.host().clone()
    }
}
