//! Leaf records of the iteration tree: iterators and computations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an iterator by name and depth.
///
/// Inside a tree `name` is the iterator's own name. Callers may also put a
/// computation name there; binding an action then resolves the pair to the
/// iterator found at `level` in that computation's loop nest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IteratorId {
    /// Iterator name (or a computation name for unresolved references)
    pub name: String,
    /// Depth of the iterator, 0 for roots
    pub level: usize,
}

impl IteratorId {
    /// Create a new identifier.
    pub fn new(name: impl Into<String>, level: usize) -> Self {
        Self { name: name.into(), level }
    }
}

impl fmt::Display for IteratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.name, self.level)
    }
}

impl From<(&str, usize)> for IteratorId {
    fn from((name, level): (&str, usize)) -> Self {
        Self::new(name, level)
    }
}

/// A loop bound, either a known integer or a symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    /// Integer bound
    Concrete(i64),
    /// Symbolic bound such as `N` or `N - 2`
    Symbolic(String),
}

impl Bound {
    /// Get the integer value if the bound is concrete.
    pub fn as_concrete(&self) -> Option<i64> {
        match self {
            Bound::Concrete(v) => Some(*v),
            Bound::Symbolic(_) => None,
        }
    }
}

impl Default for Bound {
    fn default() -> Self {
        Bound::Concrete(0)
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Concrete(v)
    }
}

impl From<&str> for Bound {
    fn from(s: &str) -> Self {
        match s.trim().parse::<i64>() {
            Ok(v) => Bound::Concrete(v),
            Err(_) => Bound::Symbolic(s.trim().to_string()),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Concrete(v) => write!(f, "{}", v),
            Bound::Symbolic(s) => write!(f, "{}", s),
        }
    }
}

/// A loop of the source program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorNode {
    /// Name, unique within a tree
    pub name: String,
    /// Depth: parent's level + 1, or 0 for roots
    pub level: usize,
    /// Inclusive lower bound
    pub lower_bound: Bound,
    /// Exclusive upper bound
    pub upper_bound: Bound,
    /// Name of the enclosing iterator
    pub parent: Option<String>,
    /// Names of directly nested iterators, in program order
    pub child_iterators: Vec<String>,
    /// Computations whose innermost iterator is this one, in absolute order
    pub computations: Vec<String>,
    /// Tagged for parallel execution
    pub parallel: bool,
    /// Unroll factor, if unrolled
    pub unroll_factor: Option<u32>,
    /// Iterates in reverse
    pub reversed: bool,
}

impl IteratorNode {
    /// Create a detached iterator with no parent, children or computations.
    pub fn new(name: impl Into<String>, level: usize, lower_bound: Bound, upper_bound: Bound) -> Self {
        Self {
            name: name.into(),
            level,
            lower_bound,
            upper_bound,
            parent: None,
            child_iterators: Vec::new(),
            computations: Vec::new(),
            parallel: false,
            unroll_factor: None,
            reversed: false,
        }
    }

    /// The identifier of this iterator.
    pub fn id(&self) -> IteratorId {
        IteratorId::new(self.name.clone(), self.level)
    }

    /// Check if this iterator has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Check if this iterator has no nested iterators.
    pub fn is_innermost(&self) -> bool {
        self.child_iterators.is_empty()
    }

    /// Trip count, when both bounds are concrete.
    pub fn extent(&self) -> Option<i64> {
        Some(self.upper_bound.as_concrete()? - self.lower_bound.as_concrete()?)
    }
}

/// A statement scheduled under a chain of iterators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    /// Unique name
    pub name: String,
    /// Statement payload, opaque to the tree
    pub expression: String,
}

impl Computation {
    /// Create a computation record.
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self { name: name.into(), expression: expression.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_from_str() {
        assert_eq!(Bound::from("64"), Bound::Concrete(64));
        assert_eq!(Bound::from(" N "), Bound::Symbolic("N".to_string()));
    }

    #[test]
    fn test_extent() {
        let node = IteratorNode::new("i", 0, Bound::Concrete(2), Bound::Concrete(34));
        assert_eq!(node.extent(), Some(32));
        let node = IteratorNode::new("j", 1, Bound::Concrete(0), Bound::from("N"));
        assert_eq!(node.extent(), None);
    }

    #[test]
    fn test_iterator_id_display() {
        assert_eq!(IteratorId::from(("comp_blur", 1)).to_string(), "(comp_blur,1)");
    }
}
