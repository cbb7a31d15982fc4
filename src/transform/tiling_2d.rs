//! 2D loop tiling.

use super::{format_comps, tiling, ActionParam, ActionType, Candidates, Transformation};
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};

/// 2D tiling action: two iterators of one loop nest and their tile sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling2D {
    iterators: [IteratorId; 2],
    tile_sizes: [u32; 2],
}

impl Tiling2D {
    /// Create a 2D tiling of `iterators` with the given tile sizes.
    pub fn new(iterators: [IteratorId; 2], tile_sizes: [u32; 2]) -> Result<Self, ActionError> {
        tiling::check_tile_sizes(Self::ACTION_TYPE, &tile_sizes)?;
        Ok(Self { iterators, tile_sizes })
    }

    /// Tile sizes, paired positionally with the iterators.
    pub fn tile_sizes(&self) -> [u32; 2] {
        self.tile_sizes
    }
}

impl Transformation for Tiling2D {
    const ACTION_TYPE: ActionType = ActionType::Tiling2D;
    const INTRODUCED_LEVELS: usize = 2;
    type Candidate = [IteratorId; 2];

    fn from_params(params: &[ActionParam]) -> Result<Self, ActionError> {
        let (iterators, tile_sizes) = tiling::iterators_and_sizes::<2>(Self::ACTION_TYPE, params)?;
        Ok(Self { iterators, tile_sizes })
    }

    fn params(&self) -> Vec<ActionParam> {
        self.iterators
            .iter()
            .cloned()
            .map(ActionParam::Iterator)
            .chain(self.tile_sizes.iter().map(|&s| ActionParam::Int(i64::from(s))))
            .collect()
    }

    fn iterators(&self) -> &[IteratorId] {
        &self.iterators
    }

    fn iterators_mut(&mut self) -> &mut [IteratorId] {
        &mut self.iterators
    }

    fn statement(&self, comp: &str) -> Option<String> {
        let [l1, l2] = [self.iterators[0].level, self.iterators[1].level];
        let [s1, s2] = self.tile_sizes;
        Some(format!("{}.tile({}, {}, {}, {})", comp, l1, l2, s1, s2))
    }

    fn signature(&self, comps: &[String]) -> String {
        format!(
            "T2(L{},L{},{},{},comps={})",
            self.iterators[0].level,
            self.iterators[1].level,
            self.tile_sizes[0],
            self.tile_sizes[1],
            format_comps(comps)
        )
    }

    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError> {
        tiling::tile_band(tree, &self.iterators, &self.tile_sizes)
    }

    fn get_candidates(tree: &IterationTree) -> Candidates<[IteratorId; 2]> {
        tiling::consecutive_windows::<2>(tree)
    }
}
