//! Machinery shared by the tiling actions.
//!
//! Tiling a band of `n` perfectly nested loops inserts `n` tile loops above
//! the band:
//!
//! ```text
//! for i = 0 to N:                  for i_tile = 0 to ceil(N / Ti):
//!   for j = 0 to M:        ==>       for j_tile = 0 to ceil(M / Tj):
//!     S(i, j)                          for i (within tile):
//!                                        for j (within tile):
//!                                          S(i, j)
//! ```
//!
//! The original loops keep their names and move `n` levels deeper.

use super::{expect_arity, iterator_param, positive_param, ActionType, Candidates};
use crate::ir::{Bound, IterationTree, IteratorId, IteratorNode};
use crate::utils::errors::{ActionError, TreeError};
use log::debug;

/// Read `n` iterators followed by `n` tile sizes.
pub(crate) fn iterators_and_sizes<const N: usize>(
    action: ActionType,
    params: &[super::ActionParam],
) -> Result<([IteratorId; N], [u32; N]), ActionError> {
    expect_arity(action, params, 2 * N)?;
    let mut iterators = Vec::with_capacity(N);
    for idx in 0..N {
        iterators.push(iterator_param(action, params, idx)?);
    }
    let mut sizes = [0u32; N];
    for (idx, size) in sizes.iter_mut().enumerate() {
        *size = positive_param(action, params, N + idx)?;
    }
    let iterators: [IteratorId; N] = iterators.try_into().map_err(|_| ActionError::InvalidParameterShape {
        action,
        message: format!("expected {} iterators", N),
    })?;
    Ok((iterators, sizes))
}

/// Tile sizes must be positive.
pub(crate) fn check_tile_sizes(action: ActionType, sizes: &[u32]) -> Result<(), ActionError> {
    if sizes.iter().any(|&s| s == 0) {
        return Err(ActionError::InvalidParameterShape {
            action,
            message: "tile sizes must be positive".to_string(),
        });
    }
    Ok(())
}

/// Order the band by level and pair each iterator with its tile size.
///
/// Returns `None` unless the ordered iterators form a parent-child chain.
/// The outer loops of the chain may still branch.
pub(crate) fn ordered_band(
    tree: &IterationTree,
    iterators: &[IteratorId],
    sizes: &[u32],
) -> Option<(Vec<IteratorId>, Vec<u32>)> {
    let mut band: Vec<(IteratorId, u32)> = iterators.iter().cloned().zip(sizes.iter().copied()).collect();
    band.sort_by_key(|(id, _)| id.level);
    for pair in band.windows(2) {
        let inner = tree.iterator(&pair[1].0)?;
        if inner.parent.as_deref() != Some(pair[0].0.name.as_str()) {
            return None;
        }
    }
    Some(band.into_iter().unzip())
}

/// Bounds of the tile loop for `node` with tiles of `size` iterations.
fn tile_bounds(node: &IteratorNode, size: u32) -> (Bound, Bound) {
    let size = i64::from(size);
    let upper = match node.extent() {
        Some(extent) => Bound::Concrete((extent.max(0) + size - 1) / size),
        None => Bound::Symbolic(format!(
            "floor(({} - {} + {}) / {})",
            node.upper_bound,
            node.lower_bound,
            size - 1,
            size
        )),
    };
    (Bound::Concrete(0), upper)
}

/// Insert tile loops above the band.
///
/// Iterators may be given in any order. A band that is not a chain once
/// ordered by level leaves the tree unchanged; the backend still receives
/// the statement and decides what it means.
pub(crate) fn tile_band(tree: &mut IterationTree, iterators: &[IteratorId], sizes: &[u32]) -> Result<(), TreeError> {
    let Some((iterators, sizes)) = ordered_band(tree, iterators, sizes) else {
        debug!("band {:?} is not a loop chain, snapshot left untiled", iterators);
        return Ok(());
    };
    let Some(outer) = iterators.first() else {
        return Ok(());
    };
    let n = iterators.len();
    let (parent, base_level) = {
        let node = tree.node(&outer.name);
        (node.parent.clone(), node.level)
    };

    let mut tile_names: Vec<String> = Vec::with_capacity(n);
    for (k, (id, &size)) in iterators.iter().zip(&sizes).enumerate() {
        let name = tree.fresh_iterator_name(&format!("{}_tile", id.name));
        let (lower, upper) = tile_bounds(tree.node(&id.name), size);
        let mut node = IteratorNode::new(name.clone(), base_level + k, lower, upper);
        node.parent = match k {
            0 => parent.clone(),
            _ => Some(tile_names[k - 1].clone()),
        };
        tree.insert_node(node);
        tile_names.push(name);
    }

    for pair in tile_names.windows(2) {
        tree.node_mut(&pair[0])?.child_iterators.push(pair[1].clone());
    }
    let innermost_tile = tile_names[n - 1].clone();
    tree.node_mut(&innermost_tile)?.child_iterators.push(outer.name.clone());
    tree.replace_in_parent(&outer.name, &tile_names[0], parent.as_deref())?;
    tree.shift_subtree_levels(&outer.name, n)?;
    tree.node_mut(&outer.name)?.parent = Some(innermost_tile);
    Ok(())
}

/// Every run of `N` consecutive iterators inside one section.
pub(crate) fn consecutive_windows<const N: usize>(tree: &IterationTree) -> Candidates<[IteratorId; N]> {
    tree.get_candidate_sections()
        .into_iter()
        .map(|(root, sections)| {
            let windows = sections
                .iter()
                .filter(|section| section.len() >= N)
                .flat_map(|section| {
                    section
                        .windows(N)
                        .map(|w| std::array::from_fn(|i| w[i].clone()))
                })
                .collect();
            (root, windows)
        })
        .collect()
}
