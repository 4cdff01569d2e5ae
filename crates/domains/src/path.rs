//! Materialized thread paths.
//!
//! A path is the chain of post ids from the thread root down to a post,
//! written `/root/child/grandchild`. Paths compare component-wise as
//! integers, so `/2` sorts before `/10` and every parent sorts immediately
//! before its own subtree.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::models::PostId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadPath(Vec<PostId>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePathError {
    #[error("path must start with '/': {0:?}")]
    MissingLeadingSlash(String),
    #[error("invalid path segment {segment:?} in {path:?}")]
    BadSegment { path: String, segment: String },
}

impl ThreadPath {
    /// Path of a thread root.
    pub fn root(id: PostId) -> Self {
        Self(vec![id])
    }

    /// Path of a direct reply to the post at `self`.
    pub fn child(&self, id: PostId) -> Self {
        let mut segments = self.0.clone();
        segments.push(id);
        Self(segments)
    }

    pub fn root_id(&self) -> Option<PostId> {
        self.0.first().copied()
    }

    /// True when `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &ThreadPath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for ThreadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in &self.0 {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

impl FromStr for ThreadPath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| ParsePathError::MissingLeadingSlash(s.to_string()))?;
        let segments = rest
            .split('/')
            .map(|seg| {
                seg.parse::<PostId>().map_err(|_| ParsePathError::BadSegment {
                    path: s.to_string(),
                    segment: seg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_parses() {
        let path = ThreadPath::root(3).child(17).child(42);
        assert_eq!(path.to_string(), "/3/17/42");
        assert_eq!("/3/17/42".parse::<ThreadPath>().unwrap(), path);
        assert_eq!(path.root_id(), Some(3));
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            "3/4".parse::<ThreadPath>(),
            Err(ParsePathError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            "/3//4".parse::<ThreadPath>(),
            Err(ParsePathError::BadSegment { .. })
        ));
        assert!("/".parse::<ThreadPath>().is_err());
    }

    #[test]
    fn numeric_segments_order_numerically() {
        // As raw strings "/1/10" < "/1/2"; component-wise it is the reverse.
        let two = ThreadPath::root(1).child(2);
        let ten = ThreadPath::root(1).child(10);
        assert!(two < ten);
        assert!("/1/10" < "/1/2");
    }

    #[test]
    fn sorting_yields_preorder() {
        let root = ThreadPath::root(1);
        let a = root.child(2);
        let a_child = a.child(10);
        let b = root.child(3);
        let mut paths = vec![b.clone(), a_child.clone(), root.clone(), a.clone()];
        paths.sort();
        assert_eq!(paths, vec![root, a, a_child, b]);
    }

    #[test]
    fn ancestry_is_strict_prefix() {
        let root = ThreadPath::root(5);
        let reply = root.child(9);
        assert!(root.is_ancestor_of(&reply));
        assert!(!reply.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert!(!ThreadPath::root(50).is_ancestor_of(&ThreadPath::root(5).child(1)));
    }
}
