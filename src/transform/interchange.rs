//! Loop interchange.
//!
//! Interchanging two loops of one nest swaps their positions:
//!
//! ```text
//! for i:              for j:
//!   for j:     ==>      for i:
//!     S(i, j)             S(i, j)
//! ```
//!
//! Computations stay at their depth; only the iterators above them move.
//! When a loop from the outer iterator down to the inner one's parent holds
//! a computation or a second branch, those computations keep their original
//! loops while the targets' loops swap. The tree cannot express that split,
//! so the snapshot keeps its shape and only the backend statements change.

use super::{expect_arity, format_comps, iterator_param, ActionParam, ActionType, Candidates, Transformation};
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};
use log::debug;
use std::collections::HashMap;

/// Interchange of two iterators on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interchange {
    iterators: [IteratorId; 2],
}

impl Interchange {
    /// Interchange `first` and `second`.
    pub fn new(first: IteratorId, second: IteratorId) -> Self {
        Self { iterators: [first, second] }
    }
}

impl Transformation for Interchange {
    const ACTION_TYPE: ActionType = ActionType::Interchange;
    const INTRODUCED_LEVELS: usize = 0;
    type Candidate = [IteratorId; 2];

    fn from_params(params: &[ActionParam]) -> Result<Self, ActionError> {
        expect_arity(Self::ACTION_TYPE, params, 2)?;
        Ok(Self::new(
            iterator_param(Self::ACTION_TYPE, params, 0)?,
            iterator_param(Self::ACTION_TYPE, params, 1)?,
        ))
    }

    fn params(&self) -> Vec<ActionParam> {
        self.iterators.iter().cloned().map(ActionParam::Iterator).collect()
    }

    fn iterators(&self) -> &[IteratorId] {
        &self.iterators
    }

    fn iterators_mut(&mut self) -> &mut [IteratorId] {
        &mut self.iterators
    }

    fn check_iterators(&self, tree: &IterationTree) -> Result<(), ActionError> {
        let [a, b] = &self.iterators;
        let incompatible = |message: String| ActionError::IncompatibleIterators {
            action: Self::ACTION_TYPE,
            message,
        };
        if a.level == b.level {
            return Err(incompatible(format!("{} and {} are at the same level", a, b)));
        }
        if !tree.is_ancestor(&a.name, &b.name) && !tree.is_ancestor(&b.name, &a.name) {
            return Err(incompatible(format!("{} and {} are not in one loop nest", a, b)));
        }
        Ok(())
    }

    fn statement(&self, comp: &str) -> Option<String> {
        Some(format!(
            "{}.interchange({}, {})",
            comp, self.iterators[0].level, self.iterators[1].level
        ))
    }

    fn signature(&self, comps: &[String]) -> String {
        format!(
            "I(L{},L{},comps={})",
            self.iterators[0].level,
            self.iterators[1].level,
            format_comps(comps)
        )
    }

    /// Swap bounds and annotations, then swap the names so each node keeps
    /// its position in the tree.
    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError> {
        let [a, b] = &self.iterators;
        let (outer, inner) = if a.level < b.level { (a, b) } else { (b, a) };
        if !swaps_cleanly(tree, &outer.name, &inner.name) {
            debug!("{} and {} enclose other loops' computations, snapshot left unchanged", outer, inner);
            return Ok(());
        }
        let a_node = tree.node_mut(&a.name)?;
        let mut payload = (
            a_node.lower_bound.clone(),
            a_node.upper_bound.clone(),
            a_node.parallel,
            a_node.unroll_factor,
            a_node.reversed,
        );
        {
            let b_node = tree.node_mut(&b.name)?;
            std::mem::swap(&mut payload.0, &mut b_node.lower_bound);
            std::mem::swap(&mut payload.1, &mut b_node.upper_bound);
            std::mem::swap(&mut payload.2, &mut b_node.parallel);
            std::mem::swap(&mut payload.3, &mut b_node.unroll_factor);
            std::mem::swap(&mut payload.4, &mut b_node.reversed);
        }
        let a_node = tree.node_mut(&a.name)?;
        a_node.lower_bound = payload.0;
        a_node.upper_bound = payload.1;
        a_node.parallel = payload.2;
        a_node.unroll_factor = payload.3;
        a_node.reversed = payload.4;

        let renames = HashMap::from([(a.name.clone(), b.name.clone()), (b.name.clone(), a.name.clone())]);
        tree.rename_iterators(&renames);
        Ok(())
    }

    /// Every ordered pair of iterators inside one section.
    fn get_candidates(tree: &IterationTree) -> Candidates<[IteratorId; 2]> {
        tree.get_candidate_sections()
            .into_iter()
            .map(|(root, sections)| {
                let mut pairs = Vec::new();
                for section in &sections {
                    for (idx, outer) in section.iter().enumerate() {
                        for inner in &section[idx + 1..] {
                            pairs.push([outer.clone(), inner.clone()]);
                        }
                    }
                }
                (root, pairs)
            })
            .collect()
    }
}

/// Every loop from `outer` down to the parent of `inner` has no computation
/// and a single child.
fn swaps_cleanly(tree: &IterationTree, outer: &str, inner: &str) -> bool {
    let mut current = tree.node(inner).parent.as_deref();
    while let Some(name) = current {
        let node = tree.node(name);
        if !node.computations.is_empty() || node.child_iterators.len() != 1 {
            return false;
        }
        if name == outer {
            return true;
        }
        current = node.parent.as_deref();
    }
    false
}
