//! Structural description of a program, as provided by the compiler backend.
//!
//! ```text
//! {
//!   "iterators": [
//!     { "name": "i0", "level": 0, "lower_bound": 0, "upper_bound": "N", "parent": null,
//!       "child_iterators": ["i1"] },
//!     ...
//!   ],
//!   "computations": [
//!     { "name": "comp_blur", "absolute_order": 1, "iterators": ["i0", "i1"] }
//!   ]
//! }
//! ```

use super::node::{Bound, Computation, IteratorNode};
use super::tree::IterationTree;
use crate::utils::errors::TreeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Loop structure of a program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramStructure {
    /// Program name
    #[serde(default)]
    pub name: String,
    /// Every iterator, parents before children is not required
    pub iterators: Vec<IteratorSpec>,
    /// Every computation
    pub computations: Vec<ComputationSpec>,
}

/// One iterator of a [`ProgramStructure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratorSpec {
    /// Unique name
    pub name: String,
    /// Depth, 0 for roots
    pub level: usize,
    /// Inclusive lower bound
    #[serde(default)]
    pub lower_bound: Bound,
    /// Exclusive upper bound
    pub upper_bound: Bound,
    /// Enclosing iterator
    #[serde(default)]
    pub parent: Option<String>,
    /// Nested iterators in program order; derived from `parent` links when empty
    #[serde(default)]
    pub child_iterators: Vec<String>,
}

/// One computation of a [`ProgramStructure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationSpec {
    /// Unique name
    pub name: String,
    /// Rank in execution order; only the relative order matters
    pub absolute_order: usize,
    /// Iterator names from the outermost to the innermost loop
    pub iterators: Vec<String>,
    /// Statement payload
    #[serde(default)]
    pub expression: String,
}

impl ProgramStructure {
    /// Parse a structure from JSON text.
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl IterationTree {
    /// Build a tree from a program structure, checking every invariant.
    pub fn from_structure(structure: &ProgramStructure) -> Result<Self, TreeError> {
        let mut iterators: HashMap<String, IteratorNode> = HashMap::new();
        let mut roots = Vec::new();

        for spec in &structure.iterators {
            let mut node = IteratorNode::new(
                spec.name.clone(),
                spec.level,
                spec.lower_bound.clone(),
                spec.upper_bound.clone(),
            );
            node.parent = spec.parent.clone();
            node.child_iterators = spec.child_iterators.clone();
            if node.parent.is_none() {
                roots.push(node.name.clone());
            }
            if iterators.insert(spec.name.clone(), node).is_some() {
                return Err(TreeError::Malformed(format!("duplicate iterator `{}`", spec.name)));
            }
        }

        // Fill in children lists that were left out, in declaration order.
        for spec in &structure.iterators {
            let Some(parent) = spec.parent.as_ref() else { continue };
            let parent_node = iterators
                .get_mut(parent)
                .ok_or_else(|| TreeError::IteratorNotFound(parent.clone()))?;
            let declared = structure
                .iterators
                .iter()
                .any(|s| &s.name == parent && !s.child_iterators.is_empty());
            if !declared {
                parent_node.child_iterators.push(spec.name.clone());
            }
        }

        let mut ranked: Vec<&ComputationSpec> = structure.computations.iter().collect();
        ranked.sort_by_key(|c| c.absolute_order);
        if ranked.windows(2).any(|w| w[0].absolute_order == w[1].absolute_order) {
            return Err(TreeError::Malformed("two computations share an absolute order".to_string()));
        }

        let mut computations = HashMap::new();
        let mut order = HashMap::new();
        let mut innermost = HashMap::new();
        for (rank, spec) in ranked.into_iter().enumerate() {
            check_chain(&iterators, spec)?;
            let Some(leaf) = spec.iterators.last() else {
                return Err(TreeError::Malformed(format!("computation `{}` has no iterators", spec.name)));
            };
            if computations
                .insert(spec.name.clone(), Computation::new(spec.name.clone(), spec.expression.clone()))
                .is_some()
            {
                return Err(TreeError::Malformed(format!("duplicate computation `{}`", spec.name)));
            }
            order.insert(spec.name.clone(), rank);
            innermost.insert(spec.name.clone(), leaf.clone());
            if let Some(node) = iterators.get_mut(leaf) {
                node.computations.push(spec.name.clone());
            }
        }

        IterationTree::from_parts(iterators, roots, computations, order, innermost)
    }

    /// Build a tree from JSON text.
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        Self::from_structure(&ProgramStructure::from_json(json)?)
    }

    /// Build a tree from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// A computation's iterator list must be a root-to-leaf path.
fn check_chain(iterators: &HashMap<String, IteratorNode>, spec: &ComputationSpec) -> Result<(), TreeError> {
    let mut expected_parent: Option<&str> = None;
    for name in &spec.iterators {
        let node = iterators
            .get(name)
            .ok_or_else(|| TreeError::IteratorNotFound(name.clone()))?;
        if node.parent.as_deref() != expected_parent {
            return Err(TreeError::Malformed(format!(
                "iterators of `{}` do not form a chain at `{}`",
                spec.name, name
            )));
        }
        expected_parent = Some(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IteratorId;

    const BLUR: &str = r#"{
        "name": "blur",
        "iterators": [
            { "name": "i0", "level": 0, "lower_bound": 0, "upper_bound": "N - 2", "parent": null },
            { "name": "i1", "level": 1, "lower_bound": 0, "upper_bound": "M - 2", "parent": "i0" },
            { "name": "i2", "level": 2, "lower_bound": 0, "upper_bound": 3, "parent": "i1" }
        ],
        "computations": [
            { "name": "comp_blur", "absolute_order": 1, "iterators": ["i0", "i1", "i2"],
              "expression": "(bx(i0, i1, i2) + bx(i0 + 1, i1, i2)) / 3" }
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let tree = IterationTree::from_json(BLUR).unwrap();
        assert_eq!(tree.iterator_count(), 3);
        assert_eq!(tree.computation_count(), 1);
        assert_eq!(tree.absolute_order("comp_blur"), Some(0));
        let i2 = tree.iterator(&IteratorId::new("i2", 2)).unwrap();
        assert_eq!(i2.upper_bound, Bound::Concrete(3));
        assert_eq!(i2.computations, vec!["comp_blur"]);
        let i0 = tree.iterator(&IteratorId::new("i0", 0)).unwrap();
        assert_eq!(i0.upper_bound, Bound::Symbolic("N - 2".to_string()));
        assert_eq!(i0.child_iterators, vec!["i1"]);
    }

    #[test]
    fn test_broken_chain_is_rejected() {
        let json = BLUR.replace(r#"["i0", "i1", "i2"]"#, r#"["i0", "i2"]"#);
        assert!(matches!(IterationTree::from_json(&json), Err(TreeError::Malformed(_))));
    }

    #[test]
    fn test_wrong_level_is_rejected() {
        let json = BLUR.replace(r#""name": "i2", "level": 2"#, r#""name": "i2", "level": 4"#);
        assert!(matches!(IterationTree::from_json(&json), Err(TreeError::Malformed(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(IterationTree::from_json("{"), Err(TreeError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = IterationTree::from_json_file("/nonexistent/structure.json");
        assert!(matches!(result, Err(TreeError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
