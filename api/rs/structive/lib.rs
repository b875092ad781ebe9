// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
# Structive

Structive is a reactive engine for declarative component templates: a
state object authored as a [`StateClass`], templates whose `data-bind`
texts pair host-node operations with state paths, and an update
pipeline that coalesces state writes into one render per synchronous
burst and applies the minimal ordered mutations to the host tree.

## Quick start

```rust
use structive::{
    ComponentClass, Node, StateClass, Value, process_microtasks, register_component,
    register_template, upgrade_element,
};
use smol_str::SmolStr;

// A template: one <span> bound to `count`.
let fragment = Node::fragment();
let span = Node::element("span");
span.set_attribute("data-bind", "textContent:count");
fragment.append_child(&span);
register_template(1, fragment).unwrap();

// A state class with one property.
let state = StateClass::builder("counter")
    .data(|| Value::object([(SmolStr::new("count"), Value::from(0.0))]))
    .build();
register_component(ComponentClass::new("my-counter", 1, state));

// Mount an instance and drive it.
let host = Node::element("my-counter");
let counter = upgrade_element(&host).unwrap();
counter.update(|state| state.set("count", Value::from(7.0))).unwrap();
process_microtasks();
assert_eq!(host.text_content(), "7");
```

The engine is host-agnostic: it renders into the in-memory node tree of
[`Node`], and an embedding maps that tree onto a real document.
*/

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use i_structive_core::component::{
    ComponentClass, ComponentEngine, engine_for_node, lookup_component, register_component,
    upgrade_element, when_defined,
};
pub use i_structive_core::dom::{Event, Node};
pub use i_structive_core::errors::{ErrorCode, Severity, StructiveError};
pub use i_structive_core::filters::{FilterFn, FilterSpec, register_filter};
pub use i_structive_core::microtask::{has_pending_microtasks, process_microtasks, queue_microtask};
pub use i_structive_core::state::StateAccessor;
pub use i_structive_core::state_class::{StateClass, StateClassBuilder};
pub use i_structive_core::template::{parse_bind_text, register_template};
pub use i_structive_core::updater::take_unhandled_errors;
pub use i_structive_core::value::Value;

/// Re-export of `smol_str`, the string type used across the API.
pub use smol_str;
