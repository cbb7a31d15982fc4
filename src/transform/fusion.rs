//! Loop fusion.
//!
//! Two sibling loops at the same level are merged into the first one:
//!
//! ```text
//! for i:            for i:
//!   S0(i)    ==>      S0(i)
//! for j:              S1(i)
//!   S1(j)
//! ```
//!
//! Fusion has no per-computation statement: the backend learns about it
//! entirely through the re-linearization, where computations of the two
//! loops become fused at the loops' level.

use super::{expect_arity, format_comps, iterator_param, ActionParam, ActionType, Candidates, Transformation};
use crate::analysis::FusionLevel;
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};

/// Fuse the second iterator into the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fusion {
    iterators: [IteratorId; 2],
}

impl Fusion {
    /// Fuse `second` into `first`.
    pub fn new(first: IteratorId, second: IteratorId) -> Self {
        Self { iterators: [first, second] }
    }
}

impl Transformation for Fusion {
    const ACTION_TYPE: ActionType = ActionType::Fusion;
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
        if a.name == b.name {
            return Err(incompatible(format!("cannot fuse {} with itself", a)));
        }
        if a.level != b.level {
            return Err(incompatible(format!("{} and {} are at different levels", a, b)));
        }
        let parent = |id: &IteratorId| {
            tree.iterator(id)
                .map(|node| node.parent.clone())
                .ok_or_else(|| TreeError::IteratorNotFound(id.to_string()))
        };
        if parent(a)? != parent(b)? {
            return Err(incompatible(format!("{} and {} do not share a parent", a, b)));
        }
        Ok(())
    }

    /// Everything under either loop.
    fn target_computations(&self, tree: &IterationTree) -> Result<Vec<String>, ActionError> {
        let [a, b] = &self.iterators;
        let mut comps = tree.get_iterator_subtree_computations(a)?;
        comps.extend(tree.get_iterator_subtree_computations(b)?);
        tree.sort_by_absolute_order(&mut comps);
        Ok(comps)
    }

    fn statement(&self, _comp: &str) -> Option<String> {
        None
    }

    fn signature(&self, comps: &[String]) -> String {
        format!(
            "F(L{},L{},comps={})",
            self.iterators[0].level,
            self.iterators[1].level,
            format_comps(comps)
        )
    }

    /// Adjacent computations split across the two loops become fused at the
    /// loops' level.
    fn adjust_fusion_levels(
        &self,
        tree: &IterationTree,
        ordered: &[String],
        levels: &mut [FusionLevel],
    ) -> Result<(), TreeError> {
        let [a, b] = &self.iterators;
        let under_a = tree.get_iterator_subtree_computations(a)?;
        let under_b = tree.get_iterator_subtree_computations(b)?;
        for (pair, level) in ordered.windows(2).zip(levels.iter_mut()) {
            let split = (under_a.contains(&pair[0]) && under_b.contains(&pair[1]))
                || (under_b.contains(&pair[0]) && under_a.contains(&pair[1]));
            if split {
                *level = FusionLevel::Shared(a.level);
            }
        }
        Ok(())
    }

    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError> {
        let [a, b] = &self.iterators;
        let removed = tree.remove_node(&b.name)?;
        for child in &removed.child_iterators {
            tree.node_mut(child)?.parent = Some(a.name.clone());
        }
        tree.node_mut(&a.name)?
            .child_iterators
            .extend(removed.child_iterators.iter().cloned());
        tree.move_computations(&removed.computations, &a.name)
    }

    /// Adjacent roots, and adjacent children of every branching iterator.
    fn get_candidates(tree: &IterationTree) -> Candidates<[IteratorId; 2]> {
        let mut candidates: Candidates<[IteratorId; 2]> = Candidates::new();
        let roots: Vec<IteratorId> = tree.roots().map(|r| r.id()).collect();
        for pair in roots.windows(2) {
            candidates
                .entry(pair[0].clone())
                .or_default()
                .push([pair[0].clone(), pair[1].clone()]);
        }

        for (root, sections) in tree.get_candidate_sections() {
            let entry = candidates.entry(root).or_default();
            for last in sections.iter().filter_map(|section| section.last()) {
                let children: Vec<IteratorId> = tree
                    .node(&last.name)
                    .child_iterators
                    .iter()
                    .map(|c| tree.node(c).id())
                    .collect();
                entry.extend(children.windows(2).map(|w| [w[0].clone(), w[1].clone()]));
            }
        }
        candidates
    }
}
