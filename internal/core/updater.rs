// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Write coalescing.

    One [`Updater`] collects every write of one synchronous burst. The
    first enqueue schedules a single render microtask; the render drains
    the queue until it stays empty, then the updater is closed and the
    next write starts a fresh one with the next version.

    Each enqueue stamps the set of paths whose caches the write
    invalidates (path-tree descent, static children, dynamic dependents)
    with the current `(version, revision)`; readers compare their cache
    entries against these stamps.
*/

use crate::component::ComponentEngine;
use crate::errors::{ErrorCode, StructiveError};
use crate::list_index::ListIndex;
use crate::loop_context::LoopContext;
use crate::microtask::queue_microtask;
use crate::renderer::Renderer;
use crate::state::StateAccessor;
use crate::state_ref::{RefKey, StateRef};
use crate::value::Value;
use itertools::Itertools;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

thread_local! {
    static NEXT_VERSION: Cell<u64> = const { Cell::new(1) };
    static UNHANDLED: RefCell<Vec<StructiveError>> = const { RefCell::new(Vec::new()) };
}

/// Record an error that escaped the pipeline. The embedder inspects
/// these with [`take_unhandled_errors`]; the engine never retries.
pub fn report_unhandled_error(error: StructiveError) {
    log::error!("unhandled engine error: {error}");
    UNHANDLED.with(|sink| sink.borrow_mut().push(error));
}

/// Drain the errors that escaped the pipeline so far.
pub fn take_unhandled_errors() -> Vec<StructiveError> {
    UNHANDLED.with(|sink| std::mem::take(&mut *sink.borrow_mut()))
}

/// Snapshot of a list taken when its first element write of a burst
/// arrives; later element writes are interpreted against it.
#[derive(Clone)]
pub struct SwapInfo {
    /// The element values at snapshot time.
    pub values: Vec<Value>,
    /// The element identities at snapshot time, same order.
    pub list_indexes: Vec<ListIndex>,
}

/// One write burst: queue, version stamps and swap bookkeeping.
pub struct Updater {
    engine: Weak<ComponentEngine>,
    version: u64,
    revision: Cell<u64>,
    queue: RefCell<Vec<StateRef>>,
    save_queue: RefCell<Vec<StateRef>>,
    version_revision_by_path: RefCell<HashMap<SmolStr, (u64, u64)>>,
    affected_memo: RefCell<HashMap<SmolStr, Rc<Vec<SmolStr>>>>,
    swap_infos: RefCell<HashMap<RefKey, SwapInfo>>,
    render_scheduled: Cell<bool>,
    rendering: Cell<bool>,
    closed: Cell<bool>,
}

impl Updater {
    /// Create the updater for the next burst of an engine.
    pub fn new(engine: &Rc<ComponentEngine>) -> Rc<Updater> {
        let version = NEXT_VERSION.with(|v| {
            let version = v.get();
            v.set(version + 1);
            version
        });
        Rc::new(Updater {
            engine: Rc::downgrade(engine),
            version,
            revision: Cell::new(0),
            queue: RefCell::new(Vec::new()),
            save_queue: RefCell::new(Vec::new()),
            version_revision_by_path: RefCell::new(HashMap::new()),
            affected_memo: RefCell::new(HashMap::new()),
            swap_infos: RefCell::new(HashMap::new()),
            render_scheduled: Cell::new(false),
            rendering: Cell::new(false),
            closed: Cell::new(false),
        })
    }

    /// The monotonically increasing version of this burst.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The revision of the latest enqueue.
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// True once this updater's render ran; the engine then rotates in a
    /// fresh updater on the next write.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// The invalidation stamp of a path, if a write of this burst
    /// touched it.
    pub fn stamp_for(&self, path: &str) -> Option<(u64, u64)> {
        self.version_revision_by_path.borrow().get(path).copied()
    }

    /// Queue a written ref, stamp everything it invalidates and make
    /// sure a render is scheduled.
    pub fn enqueue_ref(self: &Rc<Self>, state_ref: StateRef) {
        self.revision.set(self.revision.get() + 1);
        self.stamp_affected(state_ref.pattern());
        self.queue.borrow_mut().push(state_ref.clone());
        self.save_queue.borrow_mut().push(state_ref);

        if !self.render_scheduled.get() {
            self.render_scheduled.set(true);
            let updater = Rc::downgrade(self);
            let engine = self.engine.clone();
            queue_microtask(move || {
                let (Some(updater), Some(engine)) = (updater.upgrade(), engine.upgrade()) else {
                    return;
                };
                if let Err(error) = updater.render(&engine) {
                    report_unhandled_error(error);
                }
            });
        }
    }

    fn affected_paths(&self, source: &SmolStr) -> Rc<Vec<SmolStr>> {
        if let Some(memo) = self.affected_memo.borrow().get(source) {
            return memo.clone();
        }
        let Some(engine) = self.engine.upgrade() else { return Rc::new(Vec::new()) };
        let path_manager = engine.path_manager();
        let source_is_element = path_manager.is_element(source);
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![source.clone()];
        while let Some(path) = stack.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }
            let is_source = path == *source;
            // An element write is a per-slot assignment; stamping the
            // element path or its subtree would invalidate the siblings.
            if !(source_is_element && is_source) {
                out.push(path.clone());
                stack.extend(path_manager.static_children(&path));
            }
            stack.extend(path_manager.dynamic_dependents(&path));
        }
        let out = Rc::new(out);
        self.affected_memo.borrow_mut().insert(source.clone(), out.clone());
        out
    }

    fn stamp_affected(&self, source: &SmolStr) {
        let affected = self.affected_paths(source);
        let stamp = (self.version, self.revision.get());
        let mut stamps = self.version_revision_by_path.borrow_mut();
        for path in affected.iter() {
            stamps.insert(path.clone(), stamp);
        }
    }

    /// True when the burst already snapshot the list behind `key`.
    pub fn has_swap_info(&self, key: RefKey) -> bool {
        self.swap_infos.borrow().contains_key(&key)
    }

    /// Record the swap snapshot for the list behind `key`.
    pub fn init_swap_info(&self, key: RefKey, values: Vec<Value>, list_indexes: Vec<ListIndex>) {
        self.swap_infos.borrow_mut().insert(key, SwapInfo { values, list_indexes });
    }

    /// The swap snapshot for `key`, if one is open.
    pub fn swap_info(&self, key: RefKey) -> Option<SwapInfo> {
        self.swap_infos.borrow().get(&key).cloned()
    }

    /// Retire the swap snapshot for `key`.
    pub fn remove_swap_info(&self, key: RefKey) {
        self.swap_infos.borrow_mut().remove(&key);
    }

    /// Run one user callback in a writable session, the given loop
    /// context installed.
    pub fn update<R>(
        engine: &Rc<ComponentEngine>,
        loop_context: Option<Rc<LoopContext>>,
        f: impl FnOnce(&StateAccessor) -> Result<R, StructiveError>,
    ) -> Result<R, StructiveError> {
        let accessor = StateAccessor::writable(engine.clone());
        engine.state().with_loop_context(loop_context, || f(&accessor))
    }

    /// The render microtask body: drain the queue until it stays empty,
    /// one fresh renderer per drain, then close.
    pub fn render(self: &Rc<Self>, engine: &Rc<ComponentEngine>) -> Result<(), StructiveError> {
        if self.rendering.get() {
            return Err(StructiveError::new(
                ErrorCode::UpdaterReentrantRender,
                "render entered while a render is running",
            ));
        }
        self.rendering.set(true);
        // A failing render must not leave the flags behind, or the next
        // enqueue would never reschedule.
        let _clear = scopeguard::guard((), |_| {
            self.rendering.set(false);
            self.render_scheduled.set(false);
        });
        let result = (|| {
            loop {
                let batch: Vec<StateRef> = std::mem::take(&mut *self.queue.borrow_mut());
                if batch.is_empty() {
                    break;
                }
                log::debug!("render v{}: {} refs", self.version, batch.len());
                let mut renderer = Renderer::new(engine.clone(), self.clone());
                renderer.render(&batch)?;
            }
            Ok(())
        })();
        self.closed.set(true);
        if result.is_ok() {
            self.schedule_updated_callback(engine);
        }
        result
    }

    fn schedule_updated_callback(&self, engine: &Rc<ComponentEngine>) {
        if !engine.path_manager().has_updated_callback() {
            return;
        }
        let saved: Vec<StateRef> = std::mem::take(&mut *self.save_queue.borrow_mut());
        if saved.is_empty() {
            return;
        }
        let engine = Rc::downgrade(engine);
        queue_microtask(move || {
            let Some(engine) = engine.upgrade() else { return };
            let Some(callback) = engine.state_class().updated_callback() else { return };
            let paths: Vec<SmolStr> =
                saved.iter().map(|state_ref| state_ref.pattern().clone()).unique().collect();
            let mut indexes_by_path: HashMap<SmolStr, Vec<Vec<usize>>> = HashMap::new();
            for state_ref in &saved {
                if let Some(li) = state_ref.list_index() {
                    indexes_by_path
                        .entry(state_ref.pattern().clone())
                        .or_default()
                        .push(li.indexes());
                }
            }
            let result = Updater::update(&engine, None, |accessor| {
                callback(accessor, &paths, &indexes_by_path)
            });
            if let Err(error) = result {
                report_unhandled_error(error);
            }
        });
    }

    /// Apply the freshly built root bind content of an engine once, at
    /// connect time.
    pub fn initial_render(engine: &Rc<ComponentEngine>) -> Result<(), StructiveError> {
        let root = engine.root_bind_content().ok_or_else(|| {
            StructiveError::new(ErrorCode::UpdaterEngineGone, "engine has no root bind content")
        })?;
        let mut renderer = Renderer::new(engine.clone(), engine.updater());
        root.apply_change(&mut renderer)
    }
}

impl core::fmt::Debug for Updater {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Updater(v{} r{})", self.version, self.revision.get())
    }
}
