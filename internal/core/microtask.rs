// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Deferred closure queue.

    The updater needs exactly one primitive from the host: run a closure
    after the current synchronous region, before the next macrotask. The
    queue lives in a thread local and is drained by the embedder's event
    loop ([`process_microtasks`]); tests drain it directly.
*/

#![warn(missing_docs)]

use std::cell::RefCell;
use std::collections::VecDeque;

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
}

/// Queue a closure to run after the current synchronous region.
///
/// Closures run in queue order. A closure queued while the queue is being
/// processed runs in the same processing pass, after the ones already
/// queued.
pub fn queue_microtask(f: impl FnOnce() + 'static) {
    QUEUE.with(|q| q.borrow_mut().push_back(Box::new(f)));
}

/// True when at least one closure is waiting.
pub fn has_pending_microtasks() -> bool {
    QUEUE.with(|q| !q.borrow().is_empty())
}

/// Drain the queue, including closures queued while draining.
///
/// Returns the number of closures run. A panicking closure leaves the
/// remaining queue intact.
pub fn process_microtasks() -> usize {
    let mut count = 0;
    loop {
        let Some(task) = QUEUE.with(|q| q.borrow_mut().pop_front()) else {
            return count;
        };
        task();
        count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_in_queue_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue_microtask(move || log.borrow_mut().push(i));
        }
        assert!(has_pending_microtasks());
        assert_eq!(process_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(!has_pending_microtasks());
    }

    #[test]
    fn tasks_queued_while_draining_run_in_the_same_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            queue_microtask(move || {
                log.borrow_mut().push("outer");
                let log = log.clone();
                queue_microtask(move || log.borrow_mut().push("inner"));
            });
        }
        assert_eq!(process_microtasks(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }
}
