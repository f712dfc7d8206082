//! Absolute, normalized item paths.
//!
//! Paths are parsed from their textual form (`/a/ns:b[2]/c`). `.` segments
//! are dropped and `..` segments are resolved while parsing, so a [`Path`] is
//! always a plain sequence of named elements below the root.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::name::{Name, NamespaceResolver};

/// One named step of a path with its 1-based same-name-sibling index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct PathElement {
    /// Element name.
    pub name: Name,
    /// Same-name-sibling index, 1 when not given explicitly.
    pub index: u32,
}

impl PathElement {
    /// Create an element with the default index.
    pub fn new(name: Name) -> Self {
        Self { name, index: 1 }
    }

    /// Create an element with an explicit index.
    pub fn with_index(name: Name, index: u32) -> Self {
        Self { name, index: index.max(1) }
    }

    fn format(&self, resolver: &dyn NamespaceResolver) -> Result<String, Error> {
        let name = self.name.format(resolver)?;
        if self.index > 1 {
            Ok(format!("{}[{}]", name, self.index))
        } else {
            Ok(name)
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index > 1 {
            write!(f, "{}[{}]", self.name, self.index)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// An absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    /// The root path `/`.
    pub fn root() -> Self {
        Self { elements: Vec::new() }
    }

    /// Parse an absolute path.
    pub fn parse(text: &str, resolver: &dyn NamespaceResolver) -> Result<Self, Error> {
        let body = text
            .strip_prefix('/')
            .ok_or_else(|| Error::malformed_path(text, "not an absolute path"))?;
        if body.is_empty() {
            return Ok(Self::root());
        }

        let mut elements = Vec::new();
        for segment in split_segments(body) {
            match segment {
                "" => return Err(Error::malformed_path(text, "empty path segment")),
                "." => {}
                ".." => {
                    if elements.pop().is_none() {
                        return Err(Error::malformed_path(text, "path escapes the root"));
                    }
                }
                segment => elements.push(parse_element(text, segment, resolver)?),
            }
        }
        Ok(Self { elements })
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements below the root.
    pub fn depth(&self) -> usize {
        self.elements.len()
    }

    /// Elements below the root, outermost first.
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// The last element, `None` for the root.
    pub fn name_element(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// Name of the last element, `None` for the root.
    pub fn name(&self) -> Option<&Name> {
        self.name_element().map(|e| &e.name)
    }

    /// The ancestor `degree` levels up (`ancestor(0)` is the path itself).
    pub fn ancestor(&self, degree: usize) -> Result<Path, Error> {
        if degree > self.depth() {
            return Err(Error::malformed_path(
                &self.to_string(),
                format!("no ancestor of degree {}", degree),
            ));
        }
        Ok(Self {
            elements: self.elements[..self.depth() - degree].to_vec(),
        })
    }

    /// Shorthand for `ancestor(1)`.
    pub fn parent(&self) -> Result<Path, Error> {
        self.ancestor(1)
    }

    /// Append a child element.
    pub fn child(&self, element: PathElement) -> Path {
        let mut elements = self.elements.clone();
        elements.push(element);
        Self { elements }
    }

    /// Whether `self` lies strictly below `other`.
    pub fn is_descendant_of(&self, other: &Path) -> bool {
        other.depth() < self.depth() && self.elements[..other.depth()] == other.elements[..]
    }

    /// Whether `self` lies strictly above `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        other.is_descendant_of(self)
    }

    /// Render the path with prefixed names.
    pub fn format(&self, resolver: &dyn NamespaceResolver) -> Result<String, Error> {
        if self.is_root() {
            return Ok("/".to_string());
        }
        let mut out = String::new();
        for element in &self.elements {
            out.push('/');
            out.push_str(&element.format(resolver)?);
        }
        Ok(out)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for element in &self.elements {
            write!(f, "/{}", element)?;
        }
        Ok(())
    }
}

/// Split on `/` outside of `{...}` so expanded names may carry URIs.
fn split_segments(body: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                segments.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&body[start..]);
    segments
}

fn parse_element(
    text: &str,
    segment: &str,
    resolver: &dyn NamespaceResolver,
) -> Result<PathElement, Error> {
    let (name, index) = match segment.strip_suffix(']') {
        Some(head) => {
            let open = head
                .rfind('[')
                .ok_or_else(|| Error::malformed_path(text, "unbalanced index brackets"))?;
            let index: u32 = head[open + 1..]
                .parse()
                .map_err(|_| Error::malformed_path(text, "invalid same-name-sibling index"))?;
            if index == 0 {
                return Err(Error::malformed_path(text, "same-name-sibling index must be >= 1"));
            }
            (&head[..open], index)
        }
        None => (segment, 1),
    };
    Ok(PathElement::with_index(Name::parse(name, resolver)?, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{NamespaceRegistry, NS_JCR_URI};

    fn parse(text: &str) -> Result<Path, Error> {
        Path::parse(text, &NamespaceRegistry::new())
    }

    #[test]
    fn test_parse_root() {
        let root = parse("/").unwrap();
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);
        assert!(root.name().is_none());
        assert_eq!(root.to_string(), "/");
    }

    #[test]
    fn test_parse_nested_path() {
        let path = parse("/a/jcr:content/b[2]").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.elements()[1].name, Name::new(NS_JCR_URI, "content"));
        assert_eq!(path.name_element().unwrap().index, 2);
        assert_eq!(path.format(&NamespaceRegistry::new()).unwrap(), "/a/jcr:content/b[2]");
    }

    #[test]
    fn test_default_index_is_normalized() {
        assert_eq!(parse("/a[1]/b").unwrap(), parse("/a/b").unwrap());
    }

    #[test]
    fn test_dot_segments_are_resolved() {
        assert_eq!(parse("/a/./b/../c").unwrap(), parse("/a/c").unwrap());
        assert!(parse("/..").is_err());
    }

    #[test]
    fn test_expanded_names_may_contain_slashes() {
        let path = parse("/{http://example.com/ns}item/child").unwrap();
        assert_eq!(path.depth(), 2);
        assert_eq!(path.elements()[0].name, Name::new("http://example.com/ns", "item"));
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["relative/path", "", "/a//b", "/a/", "/a[0]", "/a[x]", "/a]"] {
            assert!(parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_unknown_prefix_propagates() {
        assert_eq!(
            parse("/a/acme:b").unwrap_err(),
            Error::UnknownPrefix("acme".to_string())
        );
    }

    #[test]
    fn test_ancestors() {
        let path = parse("/a/b/c").unwrap();
        assert_eq!(path.ancestor(0).unwrap(), path);
        assert_eq!(path.parent().unwrap(), parse("/a/b").unwrap());
        assert!(path.ancestor(3).unwrap().is_root());
        assert!(path.ancestor(4).is_err());
        assert!(Path::root().parent().is_err());
    }

    #[test]
    fn test_descendant_checks() {
        let a = parse("/a").unwrap();
        let abc = parse("/a/b/c").unwrap();
        let ax = parse("/ax").unwrap();

        assert!(abc.is_descendant_of(&a));
        assert!(a.is_ancestor_of(&abc));
        assert!(abc.is_descendant_of(&Path::root()));
        assert!(!a.is_descendant_of(&a));
        assert!(!ax.is_descendant_of(&a));
    }
}
