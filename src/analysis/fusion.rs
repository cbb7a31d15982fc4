//! Fusion-level resolution between computations.
//!
//! The fusion level of two computations is the depth of the deepest iterator
//! they both execute under. Re-linearization statements use it to keep every
//! computation ordered after its predecessor while sharing as much of the
//! loop nest as the program already shares.

use crate::ir::IterationTree;
use crate::utils::errors::TreeError;
use std::fmt;

/// Depth at which two computations share their loop nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FusionLevel {
    /// No common ancestor; the computations run in separate loop nests
    Independent,
    /// Loops up to and including this level are shared
    Shared(usize),
}

impl FusionLevel {
    /// Value written to the backend for [`FusionLevel::Independent`].
    pub const INDEPENDENT: i64 = -1;

    /// Backend encoding: the level, or `-1` when independent.
    pub fn as_i64(self) -> i64 {
        match self {
            FusionLevel::Independent => Self::INDEPENDENT,
            FusionLevel::Shared(level) => level as i64,
        }
    }

    /// Shift the level down by `levels` introduced loops.
    ///
    /// The shift applies to the backend encoding, so an independent pair
    /// moves from `-1` to `levels - 1`.
    pub fn deeper(self, levels: usize) -> Self {
        match (self, levels) {
            (level, 0) => level,
            (FusionLevel::Independent, levels) => FusionLevel::Shared(levels - 1),
            (FusionLevel::Shared(level), levels) => FusionLevel::Shared(level + levels),
        }
    }
}

impl fmt::Display for FusionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Find the shared iterator level of two computations.
///
/// Both innermost iterators walk upwards, the deeper one first (the second
/// one on ties), until they meet. Reaching a root first means there is no
/// common ancestor.
pub fn shared_fusion_level(tree: &IterationTree, comp1: &str, comp2: &str) -> Result<FusionLevel, TreeError> {
    let mut iter1 = tree.get_iterator_of_computation(comp1, None)?;
    let mut iter2 = tree.get_iterator_of_computation(comp2, None)?;

    while iter1.name != iter2.name {
        let first_is_deeper = iter1.level > iter2.level;
        let deeper = if first_is_deeper { iter1 } else { iter2 };
        let Some(parent) = deeper.parent.as_deref() else {
            return Ok(FusionLevel::Independent);
        };
        if first_is_deeper {
            iter1 = tree.node(parent);
        } else {
            iter2 = tree.node(parent);
        }
    }
    Ok(FusionLevel::Shared(iter1.level))
}

/// Fusion levels of every adjacent pair in `ordered`.
///
/// Pairs where both computations are in `targets` are shifted down by
/// `introduced_levels`, the number of loops the action inserts above them.
pub fn fusion_levels(
    tree: &IterationTree,
    ordered: &[String],
    targets: &[String],
    introduced_levels: usize,
) -> Result<Vec<FusionLevel>, TreeError> {
    ordered
        .windows(2)
        .map(|pair| {
            let level = shared_fusion_level(tree, &pair[0], &pair[1])?;
            if targets.contains(&pair[0]) && targets.contains(&pair[1]) {
                Ok(level.deeper(introduced_levels))
            } else {
                Ok(level)
            }
        })
        .collect()
}
