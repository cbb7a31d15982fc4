//! Loop unrolling.
//!
//! Only innermost loops that carry computations are worth unrolling; those
//! are the candidates offered to a search.

use super::{
    expect_arity, format_comps, iterator_param, positive_param, ActionParam, ActionType, Candidates, Transformation,
};
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};

/// Unroll one loop by a factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unrolling {
    iterators: [IteratorId; 1],
    factor: u32,
}

impl Unrolling {
    /// Unroll `iterator` by `factor`.
    pub fn new(iterator: IteratorId, factor: u32) -> Result<Self, ActionError> {
        if factor == 0 {
            return Err(ActionError::InvalidParameterShape {
                action: Self::ACTION_TYPE,
                message: "unroll factor must be positive".to_string(),
            });
        }
        Ok(Self { iterators: [iterator], factor })
    }

    /// Unroll factor.
    pub fn factor(&self) -> u32 {
        self.factor
    }
}

impl Transformation for Unrolling {
    const ACTION_TYPE: ActionType = ActionType::Unrolling;
    const INTRODUCED_LEVELS: usize = 0;
    type Candidate = IteratorId;

    fn from_params(params: &[ActionParam]) -> Result<Self, ActionError> {
        expect_arity(Self::ACTION_TYPE, params, 2)?;
        Ok(Self {
            iterators: [iterator_param(Self::ACTION_TYPE, params, 0)?],
            factor: positive_param(Self::ACTION_TYPE, params, 1)?,
        })
    }

    fn params(&self) -> Vec<ActionParam> {
        vec![
            ActionParam::Iterator(self.iterators[0].clone()),
            ActionParam::Int(i64::from(self.factor)),
        ]
    }

    fn iterators(&self) -> &[IteratorId] {
        &self.iterators
    }

    fn iterators_mut(&mut self) -> &mut [IteratorId] {
        &mut self.iterators
    }

    fn statement(&self, comp: &str) -> Option<String> {
        Some(format!("{}.unroll({}, {})", comp, self.iterators[0].level, self.factor))
    }

    fn signature(&self, comps: &[String]) -> String {
        format!(
            "U(L{},{},comps={})",
            self.iterators[0].level,
            self.factor,
            format_comps(comps)
        )
    }

    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError> {
        tree.node_mut(&self.iterators[0].name)?.unroll_factor = Some(self.factor);
        Ok(())
    }

    fn get_candidates(tree: &IterationTree) -> Candidates<IteratorId> {
        tree.get_candidate_sections()
            .into_iter()
            .map(|(root, sections)| {
                let innermost = sections
                    .iter()
                    .filter_map(|section| section.last())
                    .filter(|id| {
                        let node = tree.node(&id.name);
                        node.is_innermost() && !node.computations.is_empty()
                    })
                    .cloned()
                    .collect();
                (root, innermost)
            })
            .collect()
    }
}
