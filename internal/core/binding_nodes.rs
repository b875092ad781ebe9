// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Binding node implementations.

    [`create_binding_node`] turns a compiled bind entry into the trait
    object driving the bound node. The plain nodes (property, attribute,
    class, style, event) live here; the structural ones — loop,
    conditional and child component — have their own modules, their
    logic being inseparable from the engine.
*/

use crate::binding::{Binding, BindingNode};
use crate::dom::{Event, Node};
use crate::errors::{ErrorCode, StructiveError};
use crate::renderer::Renderer;
use crate::template::{BindText, NodeProperty};
use crate::updater::{Updater, report_unhandled_error};
use crate::value::Value;
use smol_str::SmolStr;
use std::cell::Cell;
use std::rc::Rc;

pub mod component;
pub mod conditional;
pub mod repeat;

/// Instantiate the node side of a bind entry.
pub fn create_binding_node(
    entry: &BindText,
    node: &Node,
) -> Result<Box<dyn BindingNode>, StructiveError> {
    Ok(match &entry.prop {
        NodeProperty::Property(name) => Box::new(PropertyBindingNode { name: name.clone() }),
        NodeProperty::Attribute(name) => Box::new(AttributeBindingNode { name: name.clone() }),
        NodeProperty::ClassList => Box::new(ClassListBindingNode),
        NodeProperty::ClassName(name) => Box::new(ClassNameBindingNode { name: name.clone() }),
        NodeProperty::Style(name) => Box::new(StyleBindingNode { name: name.clone() }),
        NodeProperty::Event(name) => Box::new(EventBindingNode {
            event: entry.event_override().unwrap_or_else(|| name.clone()),
            attached: Cell::new(false),
        }),
        NodeProperty::If => {
            let template_id = entry.embedded_template_id.ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::BindCreatorMissing,
                    "`if` binding without an embedded template",
                )
            })?;
            Box::new(conditional::ConditionalBindingNode::new(template_id))
        }
        NodeProperty::For => {
            let template_id = entry.embedded_template_id.ok_or_else(|| {
                StructiveError::new(
                    ErrorCode::BindCreatorMissing,
                    "`for` binding without an embedded template",
                )
            })?;
            Box::new(repeat::RepeatBindingNode::new(template_id))
        }
        NodeProperty::ComponentState(sub) => {
            if node.tag().is_none() {
                return Err(StructiveError::new(
                    ErrorCode::ComponentIdentification,
                    "`state.*` bindings need a custom element host",
                ));
            }
            Box::new(component::ComponentBindingNode::new(sub.clone()))
        }
    })
}

/// Drives a plain node property; `textContent` replaces the subtree.
struct PropertyBindingNode {
    name: SmolStr,
}

impl BindingNode for PropertyBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let value = binding.value()?;
        if self.name == "textContent" {
            binding.node().set_text_content(value.to_text());
        } else {
            binding.node().set_property(self.name.clone(), value);
        }
        Ok(())
    }

    fn assign_value(&self, binding: &Rc<Binding>, value: Value) -> Result<(), StructiveError> {
        if self.name == "textContent" {
            binding.node().set_text_content(value.to_text());
        } else {
            binding.node().set_property(self.name.clone(), value);
        }
        Ok(())
    }
}

struct AttributeBindingNode {
    name: SmolStr,
}

impl BindingNode for AttributeBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let value = binding.value()?;
        match value {
            Value::Undefined | Value::Null => binding.node().remove_attribute(&self.name),
            other => binding.node().set_attribute(self.name.clone(), other.to_text()),
        }
        Ok(())
    }
}

/// Replaces the whole class list from a string or a list of strings.
struct ClassListBindingNode;

impl BindingNode for ClassListBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let value = binding.value()?;
        let names = match &value {
            Value::List(items) => {
                items.borrow().iter().map(|v| v.to_text()).collect::<Vec<_>>().join(" ")
            }
            other => other.to_text().to_string(),
        };
        binding.node().set_class_name(&names);
        Ok(())
    }
}

/// Toggles one class by truthiness.
struct ClassNameBindingNode {
    name: SmolStr,
}

impl BindingNode for ClassNameBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let value = binding.value()?;
        binding.node().set_class(self.name.clone(), value.is_truthy());
        Ok(())
    }
}

struct StyleBindingNode {
    name: SmolStr,
}

impl BindingNode for StyleBindingNode {
    fn apply_change(
        &self,
        binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        let value = binding.value()?;
        binding.node().set_style(self.name.clone(), value.to_text());
        Ok(())
    }
}

/// Invokes a state method when the bound event fires. The handler runs
/// in a writable session with the binding's loop scope installed, so
/// `$1…$N` and wildcard paths resolve to the firing element.
struct EventBindingNode {
    event: SmolStr,
    attached: Cell<bool>,
}

impl BindingNode for EventBindingNode {
    fn activate(&self, binding: &Rc<Binding>) -> Result<(), StructiveError> {
        if self.attached.replace(true) {
            return Ok(());
        }
        let weak = Rc::downgrade(binding);
        binding.node().add_event_listener(
            self.event.clone(),
            Rc::new(move |event: &Event| {
                let Some(binding) = weak.upgrade() else { return };
                if !binding.is_active() {
                    return;
                }
                if binding.entry().prevents_default() {
                    event.prevent_default();
                }
                if binding.entry().stops_propagation() {
                    event.stop_propagation();
                }
                let Ok(engine) = binding.engine() else { return };
                let method_name = binding.entry().state_path.clone();
                let loop_context = binding.loop_context();
                let detail = event.detail().clone();
                let result = Updater::update(&engine, loop_context, |accessor| {
                    let method = engine.state_class().method(&method_name).ok_or_else(|| {
                        StructiveError::new(
                            ErrorCode::StatePropertyNotFound,
                            format!("no such method: `{method_name}`"),
                        )
                        .with_context("where", "event binding")
                    })?;
                    method(accessor, &[detail.clone()]).map(|_| ())
                });
                if let Err(error) = result {
                    report_unhandled_error(error);
                }
            }),
        );
        Ok(())
    }

    fn apply_change(
        &self,
        _binding: &Rc<Binding>,
        _renderer: &mut Renderer,
    ) -> Result<(), StructiveError> {
        // Listeners are wired at activation; there is nothing to render.
        Ok(())
    }
}
