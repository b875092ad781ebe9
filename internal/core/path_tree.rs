// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

//! Per-component tree of known paths, used to drive static dependency
//! walks during rendering. Children are keyed by segment name, literal
//! or `*`.

use smol_str::SmolStr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One node of the per-component path tree.
pub struct PathTreeNode {
    /// The segment this node is reached by; empty for the root.
    pub segment: SmolStr,
    /// The full path down to this node; empty for the root.
    pub path: SmolStr,
    children: RefCell<HashMap<SmolStr, Rc<PathTreeNode>>>,
}

impl PathTreeNode {
    /// Create a tree root.
    pub fn root() -> Rc<PathTreeNode> {
        Rc::new(PathTreeNode {
            segment: SmolStr::default(),
            path: SmolStr::default(),
            children: RefCell::new(HashMap::new()),
        })
    }

    /// The child reached by `segment`, if present.
    pub fn child(&self, segment: &str) -> Option<Rc<PathTreeNode>> {
        self.children.borrow().get(segment).cloned()
    }

    /// Snapshot of the children, as `(segment, node)` pairs.
    pub fn children(&self) -> Vec<(SmolStr, Rc<PathTreeNode>)> {
        self.children.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl core::fmt::Debug for PathTreeNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PathTreeNode({})", if self.path.is_empty() { "<root>" } else { &self.path })
    }
}

/// Insert `path` below `root`, creating the missing nodes, and return the
/// final node.
pub fn add_path_node(root: &Rc<PathTreeNode>, path: &str) -> Rc<PathTreeNode> {
    let mut current = root.clone();
    let mut walked = String::new();
    for segment in path.split('.') {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
        let existing = current.child(segment);
        let next = match existing {
            Some(node) => node,
            None => {
                let node = Rc::new(PathTreeNode {
                    segment: SmolStr::new(segment),
                    path: SmolStr::new(&walked),
                    children: RefCell::new(HashMap::new()),
                });
                current.children.borrow_mut().insert(SmolStr::new(segment), node.clone());
                node
            }
        };
        current = next;
    }
    current
}

/// Find the node for `path` below `root` without creating anything.
///
/// The per-root memo is the caller's ([`crate::path_manager::PathManager`]
/// keeps one).
pub fn find_path_node_by_path(root: &Rc<PathTreeNode>, path: &str) -> Option<Rc<PathTreeNode>> {
    let mut current = root.clone();
    for segment in path.split('.') {
        current = current.child(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_and_lookup() {
        let root = PathTreeNode::root();
        let leaf = add_path_node(&root, "items.*.n");
        assert_eq!(leaf.path, "items.*.n");
        assert_eq!(leaf.segment, "n");

        let again = add_path_node(&root, "items.*.n");
        assert!(Rc::ptr_eq(&leaf, &again));

        add_path_node(&root, "items.*.tags");
        let star = find_path_node_by_path(&root, "items.*").unwrap();
        let mut segments: Vec<_> = star.children().into_iter().map(|(s, _)| s).collect();
        segments.sort();
        assert_eq!(segments, vec!["n", "tags"]);
        assert!(find_path_node_by_path(&root, "items.*.missing").is_none());
    }
}
