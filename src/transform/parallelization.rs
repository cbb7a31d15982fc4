//! Loop parallelization.

use super::{expect_arity, format_comps, iterator_param, ActionParam, ActionType, Candidates, Transformation};
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};

/// Tag one loop as parallel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parallelization {
    iterators: [IteratorId; 1],
}

impl Parallelization {
    /// Parallelize `iterator`.
    pub fn new(iterator: IteratorId) -> Self {
        Self { iterators: [iterator] }
    }
}

impl Transformation for Parallelization {
    const ACTION_TYPE: ActionType = ActionType::Parallelization;
    const INTRODUCED_LEVELS: usize = 0;
    type Candidate = IteratorId;

    fn from_params(params: &[ActionParam]) -> Result<Self, ActionError> {
        expect_arity(Self::ACTION_TYPE, params, 1)?;
        Ok(Self::new(iterator_param(Self::ACTION_TYPE, params, 0)?))
    }

    fn params(&self) -> Vec<ActionParam> {
        vec![ActionParam::Iterator(self.iterators[0].clone())]
    }

    fn iterators(&self) -> &[IteratorId] {
        &self.iterators
    }

    fn iterators_mut(&mut self) -> &mut [IteratorId] {
        &mut self.iterators
    }

    fn statement(&self, comp: &str) -> Option<String> {
        Some(format!("{}.tag_parallel_level({})", comp, self.iterators[0].level))
    }

    fn signature(&self, comps: &[String]) -> String {
        format!("P(L{},comps={})", self.iterators[0].level, format_comps(comps))
    }

    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError> {
        tree.node_mut(&self.iterators[0].name)?.parallel = true;
        Ok(())
    }

    fn get_candidates(tree: &IterationTree) -> Candidates<IteratorId> {
        tree.get_candidate_sections()
            .into_iter()
            .map(|(root, sections)| (root, sections.into_iter().flatten().collect()))
            .collect()
    }
}
