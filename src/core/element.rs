//! Hierarchical element identifiers.
//!
//! Elements are addressed by slash-delimited paths such as
//! `src/main/java/org/Foo.java/Foo/bar`. Containment is purely textual: `a`
//! contains `b` when `b` starts with `a` followed by the separator.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub const PATH_SEPARATOR: char = '/';

/// Identifier of a code element at any granularity (package, file, class, method)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// True when `other` lies strictly below this element
    pub fn is_ancestor_of(&self, other: &ElementId) -> bool {
        is_ancestor(&self.0, &other.0)
    }

    /// Equal, ancestor or descendant. Such pairs are never coupling candidates.
    pub fn is_related_to(&self, other: &ElementId) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    pub fn parent(&self) -> Option<ElementId> {
        parent_path(&self.0).map(ElementId::new)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.0
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ElementId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ElementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for ElementId {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// `ancestor` contains `path` (strictly)
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == PATH_SEPARATOR as u8
}

pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(PATH_SEPARATOR).map(|idx| &path[..idx])
}

/// Number of tree edges between two paths (0 for equal paths)
pub fn module_distance(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let steps_a: Vec<&str> = a.split(PATH_SEPARATOR).collect();
    let steps_b: Vec<&str> = b.split(PATH_SEPARATOR).collect();
    let common = steps_a
        .iter()
        .zip(steps_b.iter())
        .take_while(|(x, y)| x == y)
        .count();
    steps_a.len() + steps_b.len() - common * 2
}

/// Granularity of an element, guessed from its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Package,
    File,
    Class,
    Method,
}

impl ElementKind {
    /// The first segment carrying a file extension marks the file level;
    /// its direct children are classes and anything deeper is a method.
    pub fn classify(path: &str) -> Self {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        match segments.iter().position(|s| looks_like_file(s)) {
            None => ElementKind::Package,
            Some(file_idx) => match segments.len() - 1 - file_idx {
                0 => ElementKind::File,
                1 => ElementKind::Class,
                _ => ElementKind::Method,
            },
        }
    }
}

fn looks_like_file(segment: &str) -> bool {
    match segment.rfind('.') {
        Some(idx) => idx > 0 && idx + 1 < segment.len(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_requires_separator() {
        let pkg = ElementId::from("src/Foo");
        assert!(pkg.is_ancestor_of(&"src/Foo/bar".into()));
        assert!(!pkg.is_ancestor_of(&"src/FooBar".into()));
        assert!(!pkg.is_ancestor_of(&"src/Foo".into()));
        assert!(!ElementId::from("src/Foo/bar").is_ancestor_of(&pkg));
    }

    #[test]
    fn test_related_pairs() {
        let a = ElementId::from("a/B.java/B");
        let b = ElementId::from("a/B.java/B/m");
        assert!(a.is_related_to(&b));
        assert!(b.is_related_to(&a));
        assert!(a.is_related_to(&a.clone()));
        assert!(!a.is_related_to(&"a/C.java/C".into()));
    }

    #[test]
    fn test_parent_and_name() {
        let m = ElementId::from("a/B.java/B/m");
        assert_eq!(m.parent(), Some(ElementId::from("a/B.java/B")));
        assert_eq!(m.name(), "m");
        assert_eq!(m.depth(), 4);
        assert_eq!(ElementId::from("root").parent(), None);
    }

    #[test]
    fn test_module_distance() {
        assert_eq!(module_distance("a/b/c", "a/b/c"), 0);
        assert_eq!(module_distance("a/b/c", "a/b/d"), 2);
        assert_eq!(module_distance("a/b", "a/b/c/d"), 2);
        assert_eq!(module_distance("x/y", "a/b"), 4);
    }

    #[test]
    fn test_classify_kinds() {
        assert_eq!(ElementKind::classify("src/org"), ElementKind::Package);
        assert_eq!(ElementKind::classify("src/org/Foo.java"), ElementKind::File);
        assert_eq!(ElementKind::classify("src/org/Foo.java/Foo"), ElementKind::Class);
        assert_eq!(
            ElementKind::classify("src/org/Foo.java/Foo/bar"),
            ElementKind::Method
        );
        assert_eq!(ElementKind::classify(".hidden/x"), ElementKind::Package);
    }
}
