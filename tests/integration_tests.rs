//! Integration tests for the loop tree, actions and schedules.

use looptree::prelude::*;
use looptree::parse_params;
use looptree::transform::{Fusion, Interchange, Parallelization, Tiling3D, Unrolling};

const BLUR: &str = r#"{
    "name": "blur",
    "iterators": [
        { "name": "i0", "level": 0, "lower_bound": 0, "upper_bound": "N", "parent": null }
    ],
    "computations": [
        { "name": "comp_blur", "absolute_order": 1, "iterators": ["i0"] }
    ]
}"#;

const TWO_STAGE: &str = r#"{
    "name": "two_stage",
    "iterators": [
        { "name": "i0", "level": 0, "upper_bound": 1024 },
        { "name": "i1", "level": 1, "upper_bound": 1024, "parent": "i0" },
        { "name": "i2", "level": 2, "upper_bound": 1024, "parent": "i1" },
        { "name": "j0", "level": 0, "upper_bound": 1024 },
        { "name": "j1", "level": 1, "upper_bound": 1024, "parent": "j0" },
        { "name": "j2", "level": 2, "upper_bound": 1024, "parent": "j1" }
    ],
    "computations": [
        { "name": "producer", "absolute_order": 1, "iterators": ["i0", "i1", "i2"] },
        { "name": "consumer", "absolute_order": 2, "iterators": ["j0", "j1", "j2"] }
    ]
}"#;

fn chain_tree() -> IterationTree {
    TreeBuilder::new()
        .iterator("i0", None, 1024)
        .iterator("i1", Some("i0"), 1024)
        .iterator("i2", Some("i1"), 1024)
        .computation("comp", "i2", "")
        .build()
        .expect("Failed to build chain")
}

/// A deeper tree with branches, mid-chain computations and several roots.
fn mixed_tree() -> IterationTree {
    TreeBuilder::new()
        .iterator("a0", None, 64)
        .iterator("a1", Some("a0"), 64)
        .iterator("a2", Some("a1"), 64)
        .iterator("a3", Some("a2"), 64)
        .iterator("b2", Some("a1"), 64)
        .iterator("b3", Some("b2"), 64)
        .iterator("b4", Some("b3"), 64)
        .iterator("r0", None, 64)
        .iterator("r1", Some("r0"), 64)
        .computation("init", "a1", "")
        .computation("left", "a3", "")
        .computation("right", "b4", "")
        .computation("mid", "b2", "")
        .computation("tail", "r1", "")
        .build()
        .expect("Failed to build mixed tree")
}

#[test]
fn test_single_root_blur_has_no_tiling_candidates() {
    let tree = IterationTree::from_json(BLUR).expect("Failed to load structure");
    let candidates = ActionType::Tiling3D.get_candidates(&tree);
    assert_eq!(candidates.len(), 1);
    assert!(candidates[&IteratorId::new("i0", 0)].is_empty());
}

#[test]
fn test_chain_tiling_end_to_end() {
    let tree = chain_tree();
    let params = parse_params("i0:0,i1:1,i2:2,32,32,32").unwrap();
    let mut action = Action::new(ActionType::Tiling3D, params, None).unwrap();
    action.initialize_action_for_tree(&tree).unwrap();

    assert_eq!(action.comps().unwrap(), ["comp".to_string()]);
    assert_eq!(action.optim_str().unwrap(), "comp.tile(0, 1, 2, 32, 32, 32);\n");
    assert!(!action.optim_str().unwrap().contains("then"));
    assert_eq!(action.signature().unwrap(), "T3(L0,L1,L2,32,32,32,comps=['comp'])");
}

#[test]
fn test_sibling_chain_fusion_level_without_offset() {
    let tree = TreeBuilder::new()
        .iterator("i0", None, 100)
        .iterator("i1", Some("i0"), 100)
        .iterator("i2", Some("i0"), 100)
        .iterator("x0", None, 100)
        .iterator("x1", Some("x0"), 100)
        .iterator("x2", Some("x1"), 100)
        .computation("c1", "i1", "")
        .computation("c2", "i2", "")
        .computation("target", "x2", "")
        .build()
        .unwrap();
    assert_eq!(shared_fusion_level(&tree, "c1", "c2").unwrap(), FusionLevel::Shared(0));

    let mut action: Action = Tiling3D::new(
        [IteratorId::new("x0", 0), IteratorId::new("x1", 1), IteratorId::new("x2", 2)],
        [32, 32, 32],
    )
    .unwrap()
    .into();
    action.initialize_action_for_tree(&tree).unwrap();
    assert_eq!(
        action.optim_str().unwrap(),
        "target.tile(0, 1, 2, 32, 32, 32);\n\
         clear_implicit_function_sched_graph();\n    c1.then(c2,0).then(target,-1);\n"
    );
}

#[test]
fn test_sections_are_simple_chains() {
    let tree = mixed_tree();
    for (root, sections) in tree.get_candidate_sections() {
        assert_eq!(sections[0][0], root);
        for section in sections {
            for pair in section.windows(2) {
                let outer = tree.iterator(&pair[0]).unwrap();
                let inner = tree.iterator(&pair[1]).unwrap();
                assert_eq!(outer.child_iterators, vec![inner.name.clone()]);
                assert_eq!(inner.level, outer.level + 1);
            }
        }
    }
}

#[test]
fn test_tiling_candidate_count_matches_section_length() {
    let tree = mixed_tree();
    let sections = tree.get_candidate_sections();
    let candidates = ActionType::Tiling3D.get_candidates(&tree);
    for (root, sections) in &sections {
        let expected: usize = sections.iter().map(|s| s.len().saturating_sub(2)).sum();
        assert_eq!(candidates[root].len(), expected);
        for triple in &candidates[root] {
            assert_eq!(triple.len(), 3);
            assert_eq!(triple[1].level, triple[0].level + 1);
            assert_eq!(triple[2].level, triple[1].level + 1);
        }
    }
}

#[test]
fn test_derived_targets_follow_absolute_order() {
    let tree = mixed_tree();
    for (_, candidates) in ActionType::Parallelization.get_candidates(&tree) {
        for candidate in candidates {
            let mut action = Action::new(
                ActionType::Parallelization,
                vec![ActionParam::Iterator(candidate[0].clone())],
                None,
            )
            .unwrap();
            action.initialize_action_for_tree(&tree).unwrap();
            let ranks: Vec<usize> = action
                .comps()
                .unwrap()
                .iter()
                .map(|c| tree.absolute_order(c).unwrap())
                .collect();
            assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "{:?}", ranks);
        }
    }
}

#[test]
fn test_binding_never_touches_the_source_tree() {
    let tree = mixed_tree();
    let original = tree.clone();
    for action_type in ActionType::ALL {
        for (_, candidates) in action_type.get_candidates(&tree) {
            for candidate in candidates {
                let mut params: Vec<ActionParam> = candidate.into_iter().map(ActionParam::Iterator).collect();
                match action_type {
                    ActionType::Tiling2D => params.extend([ActionParam::Int(8), ActionParam::Int(8)]),
                    ActionType::Tiling3D => params.extend([ActionParam::Int(8), ActionParam::Int(8), ActionParam::Int(8)]),
                    ActionType::Unrolling => params.push(ActionParam::Int(4)),
                    _ => {}
                }
                let mut action = Action::new(action_type, params, None).unwrap();
                action.initialize_action_for_tree(&tree).unwrap();
                assert_eq!(tree, original, "{} modified its source tree", action);
                action.tree().unwrap().validate().unwrap();
            }
        }
    }
}

#[test]
fn test_fusion_symmetry_over_all_pairs() {
    let tree = mixed_tree();
    let comps = tree.computations_in_order();
    for c1 in &comps {
        for c2 in &comps {
            assert_eq!(
                shared_fusion_level(&tree, c1, c2).unwrap(),
                shared_fusion_level(&tree, c2, c1).unwrap()
            );
        }
    }
    assert_eq!(shared_fusion_level(&tree, "left", "right").unwrap(), FusionLevel::Shared(1));
    assert_eq!(shared_fusion_level(&tree, "right", "tail").unwrap(), FusionLevel::Independent);
}

#[test]
fn test_symbolic_parameters_resolve_against_the_tree() {
    let tree = IterationTree::from_json(TWO_STAGE).unwrap();
    let params = parse_params("consumer:0,consumer:1,consumer:2,16,16,16").unwrap();
    let mut action = Action::new(ActionType::Tiling3D, params, None).unwrap();
    action.initialize_action_for_tree(&tree).unwrap();
    assert_eq!(
        action.iterators(),
        [IteratorId::new("j0", 0), IteratorId::new("j1", 1), IteratorId::new("j2", 2)]
    );
    assert_eq!(
        action.optim_str().unwrap(),
        "consumer.tile(0, 1, 2, 16, 16, 16);\n\
         clear_implicit_function_sched_graph();\n    producer.then(consumer,-1);\n"
    );
}

#[test]
fn test_unresolvable_symbolic_parameter() {
    let tree = IterationTree::from_json(TWO_STAGE).unwrap();
    let params = parse_params("consumer:5").unwrap();
    let mut action = Action::new(ActionType::Reversal, params, None).unwrap();
    let err = action.initialize_action_for_tree(&tree).unwrap_err();
    assert!(matches!(err, ActionError::NotFound(ref e) if e.is_not_found()));
}

/// Accepts everything except programs that parallelize a tile loop.
#[derive(Default)]
struct ScriptedBackend {
    runs: usize,
}

impl CompilerBackend for ScriptedBackend {
    fn check_legality(&mut self, program: &str, legality: &str) -> Result<Legality, BackendError> {
        assert_eq!(program, legality);
        if program.contains("tag_parallel_level(3)") {
            Ok(Legality::Illegal("loop carries a dependence".to_string()))
        } else {
            Ok(Legality::Legal)
        }
    }

    fn execute(&mut self, _program: &str, runs: usize) -> Result<Vec<f64>, BackendError> {
        self.runs += runs;
        Ok((0..runs).map(|r| 10.0 + r as f64).collect())
    }
}

#[test]
fn test_schedule_fuse_tile_parallelize() {
    let tree = IterationTree::from_json(TWO_STAGE).unwrap();
    let mut schedule = Schedule::new(tree, ScriptedBackend::default());

    let fusion = Fusion::new(IteratorId::new("i0", 0), IteratorId::new("j0", 0));
    assert!(schedule.apply_action(fusion.into()).unwrap().is_accepted());
    assert_eq!(schedule.tree().roots().count(), 1);

    let tiling = Action::new(
        ActionType::Tiling3D,
        parse_params("producer:0,producer:1,producer:2,32,32,32").unwrap(),
        None,
    )
    .unwrap();
    assert!(schedule.apply_action(tiling).unwrap().is_accepted());

    // i0 now carries the consumer's loops too, so both are tiled.
    let tiled = schedule.actions()[1].comps().unwrap().to_vec();
    assert_eq!(tiled, vec!["producer", "consumer"]);

    let rejected = schedule
        .apply_action(Parallelization::new(IteratorId::new("producer", 3)).into())
        .unwrap();
    assert!(matches!(rejected, ApplyOutcome::Rejected { .. }));
    assert_eq!(schedule.actions().len(), 2);

    let accepted = schedule
        .apply_action(Parallelization::new(IteratorId::new("producer", 0)).into())
        .unwrap();
    assert!(accepted.is_accepted());

    assert_eq!(
        schedule.to_string(),
        "S(producer,consumer)=F(L0,L0,comps=['producer', 'consumer'])\
         |T3(L0,L1,L2,32,32,32,comps=['producer', 'consumer'])\
         |P(L0,comps=['producer', 'consumer'])"
    );
    assert_eq!(schedule.execute(2).unwrap(), vec![10.0, 11.0]);
    assert_eq!(schedule.backend().runs, 2);
}

#[test]
fn test_schedule_add_optimizations_sequential_binding() {
    let tree = chain_tree();
    let mut schedule = Schedule::new(tree, ScriptedBackend::default());
    schedule
        .add_optimizations(vec![
            Interchange::new(IteratorId::new("i0", 0), IteratorId::new("i2", 2)).into(),
            Unrolling::new(IteratorId::new("comp", 2), 4).unwrap().into(),
        ])
        .unwrap();

    // After the interchange the innermost loop of `comp` is `i0`.
    assert_eq!(schedule.actions()[1].iterators()[0], IteratorId::new("i0", 2));
    assert_eq!(
        schedule.optim_str(),
        "comp.interchange(0, 2);\ncomp.unroll(2, 4);\n"
    );
    assert_eq!(schedule.tree().iterator_by_name("i0").unwrap().unroll_factor, Some(4));
    assert!(schedule.is_legal().unwrap());
}

#[test]
fn test_config_round_trip() {
    let config = ScheduleConfig::new().execution_runs(7).check_legality_per_action(true);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: ScheduleConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_load_demo_structure_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/blur.json");
    let tree = IterationTree::from_json_file(path).expect("Failed to load demo");
    assert_eq!(tree.computations_in_order(), vec!["bx", "by"]);
    assert_eq!(ActionType::Tiling3D.get_candidates(&tree).values().map(Vec::len).sum::<usize>(), 2);
    assert_eq!(ActionType::Fusion.get_candidates(&tree)[&IteratorId::new("i0", 0)].len(), 1);
}
