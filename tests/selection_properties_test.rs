mod common;

use batch_modelgen::core::downselect::{stride_indices, Downselector};
use batch_modelgen::core::filter::ConstraintFilter;
use batch_modelgen::core::naming::NamingConvention;
use batch_modelgen::core::space::ParameterSpace;
use batch_modelgen::domain::model::ParameterDefinition;
use batch_modelgen::{BatchEngine, BatchPipeline};
use common::{cube_config, MockStorage};
use std::collections::HashSet;

fn definitions() -> Vec<ParameterDefinition> {
    vec![
        ParameterDefinition::values("K_ch", [1.0, 2.0, 3.0, 4.0]).with_unit("mm"),
        ParameterDefinition::range("W_ch", 1.5, 4.5, 1.0).with_unit("mm"),
        ParameterDefinition::values("mode", ["laminar", "turbulent"]),
    ]
}

#[test]
fn test_space_size_is_product_of_axis_lengths() {
    let space = ParameterSpace::build(&definitions()).unwrap();
    assert_eq!(space.len(), 4 * 4 * 2);

    let ordinals: Vec<u64> = space.iter().map(|c| c.ordinal()).collect();
    assert_eq!(ordinals, (0..32).collect::<Vec<_>>());

    let first = space.iter().next().unwrap();
    assert_eq!(first.get("mode").unwrap().to_string(), "laminar");
    let second = space.combination_at(1).unwrap();
    assert_eq!(second.get("mode").unwrap().to_string(), "turbulent");
    assert!(space.combination_at(32).is_none());
}

#[test]
fn test_filter_is_idempotent() {
    let defs = definitions();
    let space = ParameterSpace::build(&defs).unwrap();
    let filter =
        ConstraintFilter::compile(Some("K_ch < W_ch and mode == 'laminar'"), &defs).unwrap();

    let once = filter.apply(space.iter()).unwrap();
    let twice = filter.apply(once.clone()).unwrap();
    assert_eq!(once, twice);
    assert!(!once.is_empty());
    assert!(once.len() < space.len() as usize);
}

#[test]
fn test_filter_type_errors_are_reported_at_compile_time() {
    let defs = definitions();
    assert!(ConstraintFilter::compile(Some("mode + 1 > 2"), &defs).is_err());
    assert!(ConstraintFilter::compile(Some("K_ch * 2"), &defs).is_err());
    assert!(ConstraintFilter::compile(Some("K_ch <"), &defs).is_err());
}

#[test]
fn test_downselect_hits_target_and_keeps_endpoints() {
    for len in 1..120usize {
        for target in 1..=len + 3 {
            let indices = stride_indices(len, target);
            assert_eq!(indices.len(), target.min(len), "len {len} target {target}");
            assert_eq!(indices[0], 0);
            if target > 1 {
                assert_eq!(*indices.last().unwrap(), len - 1, "len {len} target {target}");
            }
            assert!(indices.windows(2).all(|w| w[0] < w[1]), "len {len} target {target}");
        }
    }
}

#[test]
fn test_downselect_without_target_is_identity() {
    let space = ParameterSpace::build(&definitions()).unwrap();
    let all: Vec<_> = space.iter().collect();
    let kept = Downselector::new(None).apply(all.clone());
    assert_eq!(kept, all);
}

#[tokio::test]
async fn test_cube_with_868_targets_spans_whole_space() {
    let engine = BatchEngine::new(
        BatchPipeline::new(MockStorage::new(), cube_config(10, Some(868))).unwrap(),
    );
    let plan = engine.plan().await.unwrap();

    assert_eq!(plan.total_combinations, 1000);
    assert_eq!(plan.entries.len(), 868);
    assert_eq!(plan.entries.first().unwrap().combination.ordinal(), 0);
    assert_eq!(plan.entries.last().unwrap().combination.ordinal(), 999);
}

#[tokio::test]
async fn test_plan_is_deterministic() {
    let plan = |workers: usize| async move {
        let mut config = cube_config(6, Some(50));
        config.output.workers = Some(workers);
        BatchEngine::new(BatchPipeline::new(MockStorage::new(), config).unwrap())
            .plan()
            .await
            .unwrap()
    };
    let first = plan(1).await;
    let second = plan(8).await;

    let summarize = |p: &batch_modelgen::domain::model::BatchPlan| {
        p.entries
            .iter()
            .map(|e| (e.combination.ordinal(), e.name.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(summarize(&first), summarize(&second));
}

#[test]
fn test_assigned_names_are_unique() {
    let defs = vec![
        ParameterDefinition::values("gap", [1.0001, 1.0002, 1.0003]).with_precision(1),
        ParameterDefinition::values("flag", [true, false]),
    ];
    let naming = NamingConvention::from_config(&Default::default(), "m", &defs).unwrap();
    let space = ParameterSpace::build(&defs).unwrap();
    let named = naming.assign(space.iter().collect());

    let unique: HashSet<&str> = named.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(unique.len(), named.len());
    assert!(named.iter().any(|n| n.disambiguation.is_some()));
}
