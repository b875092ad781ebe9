// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Template registry and bind-text compilation.

    Templates arrive pre-built (the single-file-component loader and the
    mustache preprocessing are external): a fragment of host nodes whose
    `data-bind` attributes and comment markers are compiled here into
    per-node bind metadata. A registered template is instantiated by id,
    any number of times.

    Comment markers:
    - `@@:path` binds the text content at that position,
    - `@@|<template-id> <bind-text>` anchors an embedded template
      (`if:…`, `for:…`).
*/

use crate::dom::Node;
use crate::errors::{ErrorCode, StructiveError};
use crate::filters::FilterSpec;
use smol_str::SmolStr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// What part of a node a bind entry drives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeProperty {
    /// A plain node property (`textContent`, `value`, `checked`, …).
    Property(SmolStr),
    /// An attribute (`attr.<name>`).
    Attribute(SmolStr),
    /// The whole class list (`class`).
    ClassList,
    /// One class toggled by truthiness (`class.<name>`).
    ClassName(SmolStr),
    /// One inline style entry (`style.<name>`).
    Style(SmolStr),
    /// An event handler (`on<Event>`).
    Event(SmolStr),
    /// Structural conditional (`if`).
    If,
    /// Structural loop (`for`).
    For,
    /// A child component state input (`state.<sub>`).
    ComponentState(SmolStr),
}

/// One compiled `nodeProp:statePath` entry of a bind text.
#[derive(Clone, Debug)]
pub struct BindText {
    /// The driven node property.
    pub prop: NodeProperty,
    /// The state path (or method name, for events).
    pub state_path: SmolStr,
    /// Filters on the node side of the colon.
    pub node_filters: Vec<FilterSpec>,
    /// Filters on the state side of the colon.
    pub state_filters: Vec<FilterSpec>,
    /// Trailing `@decorator` list.
    pub decorators: Vec<SmolStr>,
    /// The embedded template id, for `if`/`for` comment markers.
    pub embedded_template_id: Option<usize>,
}

impl BindText {
    /// True when a `readonly`/`ro` decorator is present.
    pub fn is_readonly(&self) -> bool {
        self.decorators.iter().any(|d| d == "readonly" || d == "ro")
    }

    /// True when a `prevent-default` decorator is present.
    pub fn prevents_default(&self) -> bool {
        self.decorators.iter().any(|d| d == "prevent-default" || d == "preventDefault")
    }

    /// True when a `stop-propagation` decorator is present.
    pub fn stops_propagation(&self) -> bool {
        self.decorators.iter().any(|d| d == "stop-propagation" || d == "stopPropagation")
    }

    /// An `on<event>` decorator overriding the trigger event.
    pub fn event_override(&self) -> Option<SmolStr> {
        self.decorators
            .iter()
            .find(|d| d.starts_with("on") && d.len() > 2)
            .map(|d| SmolStr::new(d[2..].to_lowercase()))
    }
}

/// Compiled bind metadata for one node of a template fragment.
#[derive(Clone, Debug)]
pub struct CompiledBind {
    /// Child-index path from the fragment root to the node.
    pub node_path: Vec<usize>,
    /// The parsed entries of the node's bind text.
    pub entries: Vec<BindText>,
}

/// A registered template: the pristine fragment plus compiled metadata.
pub struct Template {
    /// The registry id.
    pub id: usize,
    /// The pristine fragment; instantiation deep-clones it.
    pub fragment: Node,
    /// Compiled binds, in document order.
    pub binds: Vec<CompiledBind>,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<usize, Rc<Template>>> = RefCell::new(HashMap::new());
}

fn syntax_error(text: &str, detail: &str) -> StructiveError {
    StructiveError::new(ErrorCode::TemplateSyntax, format!("bad bind text `{text}`: {detail}"))
        .with_context("where", "parse_bind_text")
}

fn parse_filters(parts: &mut core::str::Split<'_, char>) -> Vec<FilterSpec> {
    parts
        .map(|filter| {
            let mut options = filter.split(',').map(str::trim);
            let name = SmolStr::new(options.next().unwrap_or_default());
            FilterSpec { name, options: options.map(SmolStr::new).collect() }
        })
        .collect()
}

fn parse_node_property(text: &str, prop: &str) -> Result<NodeProperty, StructiveError> {
    Ok(match prop {
        "" => return Err(syntax_error(text, "empty node property")),
        "if" => NodeProperty::If,
        "for" => NodeProperty::For,
        "class" => NodeProperty::ClassList,
        _ => {
            if let Some(name) = prop.strip_prefix("attr.") {
                NodeProperty::Attribute(SmolStr::new(name))
            } else if let Some(name) = prop.strip_prefix("class.") {
                NodeProperty::ClassName(SmolStr::new(name))
            } else if let Some(name) = prop.strip_prefix("style.") {
                NodeProperty::Style(SmolStr::new(name))
            } else if let Some(name) = prop.strip_prefix("state.") {
                NodeProperty::ComponentState(SmolStr::new(name))
            } else if prop.len() > 2 && prop.starts_with("on") {
                NodeProperty::Event(SmolStr::new(prop[2..].to_lowercase()))
            } else {
                NodeProperty::Property(SmolStr::new(prop))
            }
        }
    })
}

/// Parse a `data-bind` text into its entries.
///
/// Grammar per entry:
/// `nodeProp[|filter,opt,…]:statePath[|filter,…][@decorator,…]`, entries
/// separated by `;`. Malformed text raises TMP-102.
pub fn parse_bind_text(text: &str) -> Result<Vec<BindText>, StructiveError> {
    let mut entries = Vec::new();
    for raw_entry in text.split(';') {
        let entry = raw_entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (node_side, state_side) =
            entry.split_once(':').ok_or_else(|| syntax_error(text, "missing `:`"))?;

        let mut node_parts = node_side.trim().split('|');
        let prop = parse_node_property(text, node_parts.next().unwrap_or_default().trim())?;
        let node_filters = parse_filters(&mut node_parts);

        let (state_side, decorators) = match state_side.split_once('@') {
            Some((path, decorators)) => {
                (path, decorators.split(',').map(str::trim).map(SmolStr::new).collect())
            }
            None => (state_side, Vec::new()),
        };
        let mut state_parts = state_side.trim().split('|');
        let state_path = SmolStr::new(state_parts.next().unwrap_or_default().trim());
        if state_path.is_empty() {
            return Err(syntax_error(text, "empty state path"));
        }
        let state_filters = parse_filters(&mut state_parts);

        entries.push(BindText {
            prop,
            state_path,
            node_filters,
            state_filters,
            decorators,
            embedded_template_id: None,
        });
    }
    if entries.is_empty() {
        return Err(syntax_error(text, "no entries"));
    }
    Ok(entries)
}

fn compile_fragment(fragment: &Node, binds: &mut Vec<CompiledBind>) -> Result<(), StructiveError> {
    // Text markers are replaced by text nodes first so that recorded node
    // paths stay valid.
    fn compile_node(
        fragment: &Node,
        node: &Node,
        binds: &mut Vec<CompiledBind>,
    ) -> Result<(), StructiveError> {
        if let Some(data) = node.data().filter(|_| node.is_comment()) {
            if let Some(path) = data.strip_prefix("@@:") {
                let text = Node::text("");
                let parent = node.parent().ok_or_else(|| {
                    StructiveError::new(ErrorCode::TemplateSyntax, "text marker without a parent")
                })?;
                parent.insert_before(&text, Some(node));
                node.remove();
                binds.push(CompiledBind {
                    node_path: fragment.path_of(&text).ok_or_else(|| {
                        StructiveError::new(ErrorCode::TemplateSyntax, "marker outside fragment")
                    })?,
                    entries: parse_bind_text(&format!("textContent:{}", path.trim()))?,
                });
                return Ok(());
            }
            if let Some(marker) = data.strip_prefix("@@|") {
                let (id, bind_text) = marker
                    .split_once(' ')
                    .ok_or_else(|| syntax_error(&data, "embedded marker needs a bind text"))?;
                let id: usize =
                    id.trim().parse().map_err(|_| syntax_error(&data, "bad template id"))?;
                let mut entries = parse_bind_text(bind_text)?;
                for entry in &mut entries {
                    if !matches!(entry.prop, NodeProperty::If | NodeProperty::For) {
                        return Err(syntax_error(&data, "embedded marker must bind `if` or `for`"));
                    }
                    entry.embedded_template_id = Some(id);
                }
                binds.push(CompiledBind {
                    node_path: fragment.path_of(node).ok_or_else(|| {
                        StructiveError::new(ErrorCode::TemplateSyntax, "marker outside fragment")
                    })?,
                    entries,
                });
                return Ok(());
            }
            return Ok(());
        }
        if let Some(text) = node.attribute("data-bind") {
            binds.push(CompiledBind {
                node_path: fragment.path_of(node).ok_or_else(|| {
                    StructiveError::new(ErrorCode::TemplateSyntax, "bound node outside fragment")
                })?,
                entries: parse_bind_text(&text)?,
            });
        }
        for child in node.children() {
            compile_node(fragment, &child, binds)?;
        }
        Ok(())
    }
    for child in fragment.children() {
        compile_node(fragment, &child, binds)?;
    }
    Ok(())
}

/// Compile and register a template fragment under `id`. Re-registration
/// replaces the previous template.
pub fn register_template(id: usize, fragment: Node) -> Result<(), StructiveError> {
    let mut binds = Vec::new();
    compile_fragment(&fragment, &mut binds)?;
    REGISTRY.with(|r| {
        r.borrow_mut().insert(id, Rc::new(Template { id, fragment, binds }));
    });
    Ok(())
}

/// Look up a registered template. Unknown ids raise BIND-101.
pub fn get_template(id: usize) -> Result<Rc<Template>, StructiveError> {
    REGISTRY.with(|r| r.borrow().get(&id).cloned()).ok_or_else(|| {
        StructiveError::new(ErrorCode::BindTemplateMissing, format!("no template with id {id}"))
            .with_context("where", "get_template")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_full_grammar() {
        let entries = parse_bind_text(
            "textContent:count; attr.title:name|eq,x; class.active:open@ro; onClick:increment@prevent-default,onDblclick",
        )
        .unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].prop, NodeProperty::Property(SmolStr::new("textContent")));
        assert_eq!(entries[0].state_path, "count");
        assert_eq!(entries[1].prop, NodeProperty::Attribute(SmolStr::new("title")));
        assert_eq!(entries[1].state_filters.len(), 1);
        assert_eq!(entries[1].state_filters[0].name, "eq");
        assert_eq!(entries[1].state_filters[0].options, vec![SmolStr::new("x")]);
        assert_eq!(entries[2].prop, NodeProperty::ClassName(SmolStr::new("active")));
        assert!(entries[2].is_readonly());
        assert_eq!(entries[3].prop, NodeProperty::Event(SmolStr::new("click")));
        assert!(entries[3].prevents_default());
        assert_eq!(entries[3].event_override().unwrap(), "dblclick");
    }

    #[test]
    fn rejects_malformed_text() {
        for text in ["", "textContent", ":count", "textContent:"] {
            let err = parse_bind_text(text).unwrap_err();
            assert_eq!(err.code(), ErrorCode::TemplateSyntax, "{text:?}");
        }
    }

    #[test]
    fn compiles_fragments_with_markers() {
        let fragment = Node::fragment();
        let ul = Node::element("ul");
        ul.append_child(&Node::comment("@@|7 for:items"));
        fragment.append_child(&ul);
        let span = Node::element("span");
        span.set_attribute("data-bind", "textContent:count");
        span.append_child(&Node::comment("@@:name"));
        fragment.append_child(&span);

        register_template(91, fragment).unwrap();
        let template = get_template(91).unwrap();
        assert_eq!(template.binds.len(), 3);

        let marker = &template.binds[0];
        assert_eq!(marker.node_path, vec![0, 0]);
        assert_eq!(marker.entries[0].prop, NodeProperty::For);
        assert_eq!(marker.entries[0].embedded_template_id, Some(7));
        assert_eq!(marker.entries[0].state_path, "items");

        let span_bind = &template.binds[1];
        assert_eq!(span_bind.node_path, vec![1]);

        // The @@: marker was replaced by an empty text node.
        let text_bind = &template.binds[2];
        assert_eq!(text_bind.entries[0].prop, NodeProperty::Property(SmolStr::new("textContent")));
        assert_eq!(text_bind.entries[0].state_path, "name");
        let replaced = template.fragment.child_at_path(&text_bind.node_path).unwrap();
        assert!(!replaced.is_comment());

        match get_template(404) {
            Err(e) => assert_eq!(e.code(), ErrorCode::BindTemplateMissing),
            Ok(_) => panic!("expected error"),
        }
    }
}
