//! 3D loop tiling.
//!
//! Parameters are three iterators of one loop nest and one tile size per
//! iterator. The backend statement lists the three levels in parameter
//! order, then the three sizes:
//!
//! ```text
//! comp.tile(0, 1, 2, 32, 32, 32);
//! ```

use super::{format_comps, tiling, ActionParam, ActionType, Candidates, Transformation};
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};

/// 3D tiling action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling3D {
    iterators: [IteratorId; 3],
    tile_sizes: [u32; 3],
}

impl Tiling3D {
    /// Create a 3D tiling of `iterators` with the given tile sizes.
    pub fn new(iterators: [IteratorId; 3], tile_sizes: [u32; 3]) -> Result<Self, ActionError> {
        tiling::check_tile_sizes(Self::ACTION_TYPE, &tile_sizes)?;
        Ok(Self { iterators, tile_sizes })
    }

    /// Tile sizes, paired positionally with the iterators.
    pub fn tile_sizes(&self) -> [u32; 3] {
        self.tile_sizes
    }

    fn levels_and_sizes(&self) -> Vec<String> {
        self.iterators
            .iter()
            .map(|it| it.level.to_string())
            .chain(self.tile_sizes.iter().map(|s| s.to_string()))
            .collect()
    }
}

impl Transformation for Tiling3D {
    const ACTION_TYPE: ActionType = ActionType::Tiling3D;
    const INTRODUCED_LEVELS: usize = 3;
    type Candidate = [IteratorId; 3];

    fn from_params(params: &[ActionParam]) -> Result<Self, ActionError> {
        let (iterators, tile_sizes) = tiling::iterators_and_sizes::<3>(Self::ACTION_TYPE, params)?;
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
        Some(format!("{}.tile({})", comp, self.levels_and_sizes().join(", ")))
    }

    fn signature(&self, comps: &[String]) -> String {
        let parts = self.levels_and_sizes();
        format!(
            "T3(L{},L{},L{},{},{},{},comps={})",
            parts[0],
            parts[1],
            parts[2],
            parts[3],
            parts[4],
            parts[5],
            format_comps(comps)
        )
    }

    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError> {
        tiling::tile_band(tree, &self.iterators, &self.tile_sizes)
    }

    /// Every three consecutive iterators of every section. Tile sizes are
    /// left to the caller.
    fn get_candidates(tree: &IterationTree) -> Candidates<[IteratorId; 3]> {
        tiling::consecutive_windows::<3>(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FusionLevel;
    use crate::ir::TreeBuilder;
    use crate::transform::{Action, ActionKind};

    fn ids(names: [(&str, usize); 3]) -> [IteratorId; 3] {
        names.map(|(n, l)| IteratorId::new(n, l))
    }

    fn chain_tree() -> IterationTree {
        TreeBuilder::new()
            .iterator("i0", None, 1024)
            .iterator("i1", Some("i0"), 1024)
            .iterator("i2", Some("i1"), 1024)
            .computation("comp", "i2", "")
            .build()
            .unwrap()
    }

    /// Two nests under one root: `a` under i0 -> i1 -> i2 -> i3, `b` under i0 -> j1.
    fn two_nest_tree() -> IterationTree {
        TreeBuilder::new()
            .iterator("i0", None, 256)
            .iterator("i1", Some("i0"), 256)
            .iterator("i2", Some("i1"), 256)
            .iterator("i3", Some("i2"), 256)
            .iterator("j1", Some("i0"), 256)
            .computation("a", "i3", "")
            .computation("b", "j1", "")
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_computation_program() {
        let tree = chain_tree();
        let mut action: Action = Tiling3D::new(ids([("i0", 0), ("i1", 1), ("i2", 2)]), [32, 32, 32])
            .unwrap()
            .into();
        action.initialize_action_for_tree(&tree).unwrap();

        assert_eq!(action.comps().unwrap(), ["comp".to_string()]);
        assert_eq!(action.optim_str().unwrap(), "comp.tile(0, 1, 2, 32, 32, 32);\n");
        assert_eq!(action.legality_check_string().unwrap(), action.optim_str().unwrap());
        assert_eq!(action.signature().unwrap(), "T3(L0,L1,L2,32,32,32,comps=['comp'])");
    }

    #[test]
    fn test_symbolic_iterators_resolve() {
        let tree = chain_tree();
        let params = vec![
            ActionParam::Iterator(IteratorId::new("comp", 0)),
            ActionParam::Iterator(IteratorId::new("comp", 1)),
            ActionParam::Iterator(IteratorId::new("comp", 2)),
            ActionParam::Int(16),
            ActionParam::Int(8),
            ActionParam::Int(4),
        ];
        let mut action = Action::new(ActionType::Tiling3D, params, None).unwrap();
        action.initialize_action_for_tree(&tree).unwrap();
        assert_eq!(action.iterators(), &ids([("i0", 0), ("i1", 1), ("i2", 2)]));
        assert_eq!(action.optim_str().unwrap(), "comp.tile(0, 1, 2, 16, 8, 4);\n");
    }

    #[test]
    fn test_relinearization_with_offset_between_targets() {
        let tree = two_nest_tree();
        let mut action: Action = Tiling3D::new(ids([("i1", 1), ("i2", 2), ("i3", 3)]), [32, 32, 32])
            .unwrap()
            .into();
        action.initialize_action_for_tree(&tree).unwrap();
        assert_eq!(action.comps().unwrap(), ["a".to_string()]);
        assert_eq!(
            action.optim_str().unwrap(),
            "a.tile(1, 2, 3, 32, 32, 32);\n\
             clear_implicit_function_sched_graph();\n    a.then(b,0);\n"
        );
    }

    #[test]
    fn test_offset_applied_when_both_are_targets() {
        let tree = two_nest_tree();
        let mut action: Action = Tiling3D::new(ids([("i1", 1), ("i2", 2), ("i3", 3)]), [32, 32, 32])
            .unwrap()
            .into();
        action = action.with_comps(vec!["a".to_string(), "b".to_string()]);
        action.initialize_action_for_tree(&tree).unwrap();
        assert!(action.optim_str().unwrap().ends_with(&format!("a.then(b,{});\n", FusionLevel::Shared(3))));
    }

    #[test]
    fn test_independent_targets_shift_sentinel() {
        let tree = TreeBuilder::new()
            .iterator("i0", None, 64)
            .iterator("i1", Some("i0"), 64)
            .iterator("i2", Some("i1"), 64)
            .iterator("j0", None, 64)
            .computation("a", "i2", "")
            .computation("b", "j0", "")
            .build()
            .unwrap();
        let mut action = Action::new(
            ActionType::Tiling3D,
            crate::parse_params("i0:0,i1:1,i2:2,32,32,32").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()]),
        )
        .unwrap();
        action.initialize_action_for_tree(&tree).unwrap();
        assert!(action.optim_str().unwrap().ends_with("a.then(b,2);\n"));
    }

    fn branching_tree() -> IterationTree {
        TreeBuilder::new()
            .iterator("x", None, 64)
            .iterator("y", Some("x"), 64)
            .iterator("z", Some("y"), 64)
            .iterator("w", Some("x"), 64)
            .computation("c0", "z", "")
            .computation("c1", "w", "")
            .build()
            .unwrap()
    }

    #[test]
    fn test_outermost_by_level_derives_comps() {
        let tree = branching_tree();
        let mut action = Action::new(
            ActionType::Tiling3D,
            crate::parse_params("y:1,x:0,z:2,8,8,8").unwrap(),
            None,
        )
        .unwrap();
        action.initialize_action_for_tree(&tree).unwrap();
        assert_eq!(action.comps().unwrap(), ["c0".to_string(), "c1".to_string()]);
    }

    #[test]
    fn test_outermost_tie_goes_to_first_parameter() {
        let tree = branching_tree();
        let mut action = Action::new(
            ActionType::Tiling3D,
            crate::parse_params("y:1,w:1,z:2,8,8,8").unwrap(),
            None,
        )
        .unwrap();
        action.initialize_action_for_tree(&tree).unwrap();
        assert_eq!(action.comps().unwrap(), ["c0".to_string()]);
        assert_eq!(action.tree().unwrap(), &tree);
    }

    #[test]
    fn test_binding_transforms_only_the_snapshot() {
        let tree = chain_tree();
        let mut action: Action = Tiling3D::new(ids([("i0", 0), ("i1", 1), ("i2", 2)]), [32, 32, 32])
            .unwrap()
            .into();
        action.initialize_action_for_tree(&tree).unwrap();

        assert_eq!(tree, chain_tree());
        let snapshot = action.tree().unwrap();
        assert_eq!(snapshot.iterator_count(), 6);
        assert_eq!(snapshot.iterator_by_name("i2").unwrap().level, 5);
        assert_eq!(snapshot.get_iterator_of_computation("comp", Some(0)).unwrap().name, "i0_tile");
    }

    #[test]
    fn test_out_of_order_iterators_bind() {
        let tree = chain_tree();
        let mut action = Action::new(
            ActionType::Tiling3D,
            crate::parse_params("i1:1,i0:0,i2:2,8,16,32").unwrap(),
            None,
        )
        .unwrap();
        action.initialize_action_for_tree(&tree).unwrap();

        assert_eq!(action.optim_str().unwrap(), "comp.tile(1, 0, 2, 8, 16, 32);\n");
        assert_eq!(action.signature().unwrap(), "T3(L1,L0,L2,8,16,32,comps=['comp'])");
        let tiled = action.tree().unwrap();
        let i0_tile = tiled.iterator_by_name("i0_tile").unwrap();
        assert!(i0_tile.is_root());
        assert_eq!(i0_tile.upper_bound, crate::ir::Bound::Concrete(64));
        assert_eq!(tiled.iterator_by_name("i1_tile").unwrap().upper_bound, crate::ir::Bound::Concrete(128));
        assert_eq!(tiled.iterator_by_name("i0").unwrap().level, 3);
    }

    #[test]
    fn test_gapped_iterators_bind_without_restructuring() {
        let tree = two_nest_tree();
        let mut action: Action = Tiling3D::new(ids([("i0", 0), ("i1", 1), ("i3", 3)]), [4, 4, 4])
            .unwrap()
            .into();
        action.initialize_action_for_tree(&tree).unwrap();
        assert_eq!(
            action.optim_str().unwrap(),
            "a.tile(0, 1, 3, 4, 4, 4);\nb.tile(0, 1, 3, 4, 4, 4);\n\
             clear_implicit_function_sched_graph();\n    a.then(b,3);\n"
        );
        assert_eq!(action.tree().unwrap(), &tree);
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(Tiling3D::new(ids([("i0", 0), ("i1", 1), ("i2", 2)]), [32, 0, 32]).is_err());
        let params = vec![
            ActionParam::Iterator(IteratorId::new("i0", 0)),
            ActionParam::Int(1),
            ActionParam::Iterator(IteratorId::new("i2", 2)),
            ActionParam::Int(32),
            ActionParam::Int(32),
            ActionParam::Int(32),
        ];
        assert!(matches!(
            Tiling3D::from_params(&params),
            Err(ActionError::InvalidParameterShape { action: ActionType::Tiling3D, .. })
        ));
    }

    #[test]
    fn test_candidates() {
        let tree = chain_tree();
        let candidates = Tiling3D::get_candidates(&tree);
        assert_eq!(candidates[&IteratorId::new("i0", 0)], vec![ids([("i0", 0), ("i1", 1), ("i2", 2)])]);

        let shallow = TreeBuilder::new()
            .iterator("i0", None, 10)
            .computation("comp_blur", "i0", "")
            .build()
            .unwrap();
        assert!(Tiling3D::get_candidates(&shallow)[&IteratorId::new("i0", 0)].is_empty());
    }

    #[test]
    fn test_kind_round_trip() {
        let tiling = Tiling3D::new(ids([("i0", 0), ("i1", 1), ("i2", 2)]), [2, 4, 8]).unwrap();
        let action = Action::new(ActionType::Tiling3D, tiling.params(), None).unwrap();
        assert_eq!(action.kind(), &ActionKind::Tiling3D(tiling));
    }
}
