// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Structured path info.

    A state path like `items.*.tags.*.label` is canonicalised into one
    interned [`PathInfo`] per distinct string, carrying every prefix, the
    wildcard bookkeeping and the parent link. The intern table is process
    wide; infos are immutable once created.
*/

use crate::errors::{ErrorCode, StructiveError};
use once_cell::sync::Lazy;
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Segment names that can never appear in a state path.
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "constructor",
        "prototype",
        "__proto__",
        "toString",
        "toLocaleString",
        "valueOf",
        "hasOwnProperty",
        "isPrototypeOf",
        "propertyIsEnumerable",
        "class",
        "const",
        "delete",
        "export",
        "extends",
        "function",
        "import",
        "in",
        "instanceof",
        "let",
        "new",
        "return",
        "static",
        "super",
        "this",
        "typeof",
        "var",
        "void",
        "while",
        "with",
        "yield",
    ]
    .into_iter()
    .collect()
});

/// The wildcard segment.
pub const WILDCARD: &str = "*";

/// Canonical representation of one state path.
pub struct PathInfo {
    /// Monotonically assigned id, unique per distinct path string.
    pub id: usize,
    /// The full path string.
    pub pattern: SmolStr,
    /// The dot-separated segments.
    pub path_segments: Vec<SmolStr>,
    /// The final segment.
    pub last_segment: SmolStr,
    /// The info of the path with the final segment removed.
    pub parent_info: Option<Rc<PathInfo>>,
    /// Every prefix, shortest first, ending with the path itself.
    pub cumulative_paths: Vec<SmolStr>,
    /// [`PathInfo::cumulative_paths`] as a set.
    pub cumulative_path_set: HashSet<SmolStr>,
    /// Every prefix whose final segment is `*`, outermost first.
    pub wildcard_paths: Vec<SmolStr>,
    /// The prefix immediately preceding each `*`, outermost first.
    pub wildcard_parent_infos: Vec<Rc<PathInfo>>,
    /// Zero-based wildcard depth by wildcard prefix.
    pub index_by_wildcard_path: HashMap<SmolStr, usize>,
    /// How many `*` segments the path has.
    pub wildcard_count: usize,
    children: RefCell<HashMap<SmolStr, Rc<PathInfo>>>,
}

impl PathInfo {
    /// The infos of every prefix, shortest first, ending with this info.
    pub fn cumulative_infos(&self) -> Vec<Rc<PathInfo>> {
        self.cumulative_paths
            .iter()
            .map(|p| get_structured_path_info(p).expect("prefix of an interned path interns"))
            .collect()
    }

    /// The info of the innermost wildcard prefix, if the path has one.
    pub fn last_wildcard_path(&self) -> Option<&SmolStr> {
        self.wildcard_paths.last()
    }

    /// The interned child info for a segment, when one was created.
    pub fn child(&self, segment: &str) -> Option<Rc<PathInfo>> {
        self.children.borrow().get(segment).cloned()
    }
}

impl core::fmt::Debug for PathInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PathInfo({} #{})", self.pattern, self.id)
    }
}

impl PartialEq for PathInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for PathInfo {}

thread_local! {
    static INTERN: RefCell<HashMap<SmolStr, Rc<PathInfo>>> = RefCell::new(HashMap::new());
    static NEXT_ID: Cell<usize> = const { Cell::new(1) };
}

fn validate_segment(path: &str, segment: &str) -> Result<(), StructiveError> {
    if segment.is_empty() {
        return Err(StructiveError::new(ErrorCode::StateInvalidWrite, format!("empty segment in path `{path}`"))
            .with_context("where", "get_structured_path_info"));
    }
    if RESERVED_WORDS.contains(segment) {
        return Err(StructiveError::new(
            ErrorCode::StateInvalidWrite,
            format!("reserved word `{segment}` in path `{path}`"),
        )
        .with_context("where", "get_structured_path_info")
        .with_context("path", path));
    }
    Ok(())
}

/// Return the canonical [`PathInfo`] for a path string, interning it and
/// all of its prefixes on first use. Reserved segment names are rejected
/// with STATE-202.
pub fn get_structured_path_info(path: &str) -> Result<Rc<PathInfo>, StructiveError> {
    if let Some(found) = INTERN.with(|t| t.borrow().get(path).cloned()) {
        return Ok(found);
    }

    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments {
        validate_segment(path, segment)?;
    }

    let parent_info = if segments.len() > 1 {
        let parent_path = path.rsplit_once('.').expect("more than one segment").0;
        Some(get_structured_path_info(parent_path)?)
    } else {
        None
    };

    let pattern = SmolStr::new(path);
    let last_segment = SmolStr::new(*segments.last().expect("segments are non-empty"));

    let mut cumulative_paths =
        parent_info.as_ref().map(|p| p.cumulative_paths.clone()).unwrap_or_default();
    cumulative_paths.push(pattern.clone());
    let cumulative_path_set: HashSet<SmolStr> = cumulative_paths.iter().cloned().collect();

    let mut wildcard_paths =
        parent_info.as_ref().map(|p| p.wildcard_paths.clone()).unwrap_or_default();
    let mut wildcard_parent_infos =
        parent_info.as_ref().map(|p| p.wildcard_parent_infos.clone()).unwrap_or_default();
    let mut index_by_wildcard_path =
        parent_info.as_ref().map(|p| p.index_by_wildcard_path.clone()).unwrap_or_default();
    if last_segment == WILDCARD {
        // Wildcard depth is assigned strictly left to right.
        index_by_wildcard_path.insert(pattern.clone(), wildcard_paths.len());
        wildcard_paths.push(pattern.clone());
        wildcard_parent_infos
            .push(parent_info.clone().expect("a wildcard path always has a parent"));
    }
    let wildcard_count = wildcard_paths.len();

    let info = Rc::new(PathInfo {
        id: NEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        }),
        pattern: pattern.clone(),
        path_segments: segments.iter().map(|s| SmolStr::new(s)).collect(),
        last_segment: last_segment.clone(),
        parent_info: parent_info.clone(),
        cumulative_paths,
        cumulative_path_set,
        wildcard_paths,
        wildcard_parent_infos,
        index_by_wildcard_path,
        wildcard_count,
        children: RefCell::new(HashMap::new()),
    });

    if let Some(parent) = &parent_info {
        parent.children.borrow_mut().insert(last_segment, info.clone());
    }
    INTERN.with(|t| t.borrow_mut().insert(pattern, info.clone()));
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_canonical() {
        let a = get_structured_path_info("items.*.tags.*.label").unwrap();
        let b = get_structured_path_info("items.*.tags.*.label").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.path_segments.join("."), a.pattern);
        assert_eq!(a.last_segment, "label");
        assert_eq!(a.parent_info.as_ref().unwrap().pattern, "items.*.tags.*");
    }

    #[test]
    fn prefix_completeness() {
        let info = get_structured_path_info("a.b.c").unwrap();
        assert_eq!(info.cumulative_paths, vec!["a", "a.b", "a.b.c"]);
        for prefix in ["a", "a.b", "a.b.c"] {
            assert!(info.cumulative_path_set.contains(prefix));
        }
        assert_eq!(info.cumulative_path_set.len(), 3);
        let infos = info.cumulative_infos();
        assert_eq!(infos.len(), 3);
        assert!(Rc::ptr_eq(&infos[2], &info));
    }

    #[test]
    fn wildcard_accounting() {
        let info = get_structured_path_info("items.*.tags.*.label").unwrap();
        assert_eq!(info.wildcard_count, 2);
        assert_eq!(info.wildcard_paths, vec!["items.*", "items.*.tags.*"]);
        assert_eq!(info.index_by_wildcard_path["items.*"], 0);
        assert_eq!(info.index_by_wildcard_path["items.*.tags.*"], 1);
        let parents: Vec<_> =
            info.wildcard_parent_infos.iter().map(|p| p.pattern.clone()).collect();
        assert_eq!(parents, vec!["items", "items.*.tags"]);
        assert_eq!(
            info.wildcard_count,
            info.path_segments.iter().filter(|s| *s == WILDCARD).count()
        );
    }

    #[test]
    fn reserved_words_are_rejected() {
        for path in ["constructor", "prototype", "__proto__", "toString", "a.constructor"] {
            let err = get_structured_path_info(path).unwrap_err();
            assert_eq!(err.code(), ErrorCode::StateInvalidWrite, "{path}");
        }
        assert!(get_structured_path_info("a..b").is_err());
    }

    #[test]
    fn children_link_to_interned_infos() {
        let parent = get_structured_path_info("profile").unwrap();
        let child = get_structured_path_info("profile.user").unwrap();
        assert!(Rc::ptr_eq(&parent.child("user").unwrap(), &child));
        assert!(parent.child("missing").is_none());
    }
}
