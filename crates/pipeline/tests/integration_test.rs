//! Integration tests for the ranking engine.
//!
//! These tests drive `SearchEngine` end to end: Stage A, heavy-predicate
//! precomputation, Stage B, relaxation and fallback tiers.

use data_loader::{DataSource, Dataset, ItemId, ItemRecord};
use pipeline::job::score_candidate;
use pipeline::models;
use pipeline::{kappa, AggregateGate, JobState, PredicateCache, SearchEngine};
use predicates::builtin::{GroupPredicate, RangePredicate, TagPredicate};
use predicates::{
    EvalContext, FallbackTier, Importance, PredicateRegistry, ScoringModelKind, SearchConfig,
    SearchFile, SearchParams,
};
use proptest::prelude::*;
use std::sync::Arc;

/// N = 10 with P1 = {1,2,3,4} and P2 = {2,3,4,5}.
fn create_small_setup(heavy_p2: bool) -> SearchEngine {
    let records = (0..10)
        .map(|i| {
            let mut record = ItemRecord::new(i);
            if (1..=4).contains(&i) {
                record = record.with_tag("p1");
            }
            if (2..=5).contains(&i) {
                record = record.with_tag("p2");
            }
            record
        })
        .collect();
    let dataset = Arc::new(Dataset::from_records(records).unwrap());
    let p2 = TagPredicate::new("p2", "p2");
    let registry = PredicateRegistry::new()
        .with(Arc::new(TagPredicate::new("p1", "p1")))
        .unwrap()
        .with(if heavy_p2 { Arc::new(p2.heavy()) } else { Arc::new(p2) })
        .unwrap();
    SearchEngine::new(dataset, registry)
}

/// 200 items with a numeric temperature, a quality score in [0,1] and
/// three heavy tags.
fn create_large_setup() -> SearchEngine {
    let records = (0..200)
        .map(|i| {
            let mut record = ItemRecord::new(i)
                .with_number("temp", (i % 40) as f32)
                .with_number("quality", (i % 10) as f32 / 10.0)
                .with_text("biome", ["forest", "desert", "tundra"][i as usize % 3]);
            for (tag, modulus) in [("cave", 2), ("river", 3), ("ruins", 5)] {
                if i % modulus == 0 {
                    record = record.with_tag(tag);
                }
            }
            if i == 199 {
                record = record.excluded();
            }
            record
        })
        .collect();
    let dataset = Arc::new(Dataset::from_records(records).unwrap());
    let registry = PredicateRegistry::new()
        .with(Arc::new(RangePredicate::new("temperature", "temp")))
        .unwrap()
        .with(Arc::new(TagPredicate::new("cave", "cave").heavy()))
        .unwrap()
        .with(Arc::new(TagPredicate::new("river", "river").heavy()))
        .unwrap()
        .with(Arc::new(TagPredicate::new("ruins", "ruins").heavy()))
        .unwrap();
    SearchEngine::new(dataset, registry)
}

fn sorted(mut items: Vec<ItemId>) -> Vec<ItemId> {
    items.sort_unstable();
    items
}

#[test]
fn test_two_must_have_scenario() {
    let mut engine = create_small_setup(false);
    let config = SearchConfig::new()
        .with_importance("p1", Importance::MustHave)
        .with_importance("p2", Importance::MustHave);

    engine.create_job(config).unwrap();
    engine.run_to_completion(3);

    let results: Vec<ItemId> = engine.results().unwrap().iter().map(|r| r.item).collect();
    let near: Vec<ItemId> = engine.near_misses().iter().map(|c| c.item).collect();
    assert_eq!(sorted(results), vec![2, 3, 4]);
    assert_eq!(sorted(near), vec![1, 5]);
}

#[test]
fn test_two_must_have_scenario_with_heavy_predicate() {
    // P2 heavy: Stage A only sees P1, Stage B rejects 1 at full strictness
    let mut engine = create_small_setup(true);
    let config = SearchConfig::new()
        .with_importance("p1", Importance::MustHave)
        .with_importance("p2", Importance::MustHave);

    engine.create_job(config).unwrap();
    engine.run_to_completion(1);

    let results: Vec<ItemId> = engine.results().unwrap().iter().map(|r| r.item).collect();
    assert_eq!(sorted(results), vec![2, 3, 4]);
    assert_eq!(engine.stats().unwrap().below_strictness, 1);
    assert_eq!(engine.stats().unwrap().relaxations, 0);
}

#[test]
fn test_kappa_values() {
    assert!((kappa(5, 2) - 0.857).abs() < 1e-3);
    assert_eq!(kappa(0, 4), 0.0);
    assert_eq!(kappa(3, 0), 1.0);
}

#[test]
fn test_auto_relax_single_step() {
    let mut engine = create_large_setup();
    // cave, river and ruins together only on multiples of 30, whose
    // temperatures (0, 10, 20, 30) all fall outside the range
    let config = SearchConfig::new()
        .with_range("temperature", 11.0, 19.0)
        .with_importance("temperature", Importance::MustHave)
        .with_importance("cave", Importance::MustHave)
        .with_importance("river", Importance::MustHave)
        .with_importance("ruins", Importance::MustHave);

    engine.create_job(config).unwrap();
    engine.run_to_completion(16);

    let job = engine.job().unwrap();
    assert_eq!(job.state(), JobState::Completed);
    assert!(job.is_relaxed());
    assert_eq!(job.stats().relaxations, 1);
    assert!((job.strictness() - 0.75).abs() < 1e-6);
    for result in job.results() {
        assert!(result.breakdown.hard_fraction >= 0.75 - 1e-6);
    }
    assert!(!job.results().is_empty());
}

#[test]
fn test_cache_reused_and_rebuilt() {
    let mut engine = create_large_setup();
    let base = SearchConfig::new()
        .with_importance("cave", Importance::MustHave)
        .with_importance("river", Importance::Priority);

    engine.create_job(base.clone()).unwrap();
    engine.run_to_completion(50);
    assert_eq!(engine.stats().unwrap().cache_misses, 2);

    // Same heavy parameters, different cheap ones: reused
    let cheap_change = base
        .clone()
        .with_range("temperature", 0.0, 10.0)
        .with_importance("temperature", Importance::Preferred);
    engine.create_job(cheap_change).unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!((stats.cache_hits, stats.cache_misses), (2, 0));
    // Bitmaps ready: the first step already evaluates
    engine.step(1);
    assert_eq!(engine.state(), Some(JobState::Evaluating));
    engine.run_to_completion(50);

    // A predicate configured for the first time misses
    let new_heavy = base.with_importance("ruins", Importance::Preferred);
    engine.create_job(new_heavy).unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!((stats.cache_hits, stats.cache_misses), (2, 1));
}

#[test]
fn test_range_change_rebuilds_heavy_range() {
    let records = (0..50)
        .map(|i| ItemRecord::new(i).with_number("depth", i as f32))
        .collect();
    let dataset = Arc::new(Dataset::from_records(records).unwrap());
    let registry = PredicateRegistry::new()
        .with(Arc::new(RangePredicate::new("depth", "depth").heavy()))
        .unwrap();
    let mut engine = SearchEngine::new(dataset, registry);

    let config = SearchConfig::new()
        .with_importance("depth", Importance::MustHave)
        .with_range("depth", 10.0, 19.0);
    engine.create_job(config.clone()).unwrap();
    engine.run_to_completion(100);
    assert_eq!(engine.results().unwrap().len(), 10);

    engine.create_job(config.clone()).unwrap();
    assert_eq!(engine.stats().unwrap().cache_hits, 1);

    let widened = config.with_range("depth", 10.0, 29.0);
    engine.create_job(widened).unwrap();
    assert_eq!(engine.stats().unwrap().cache_misses, 1);
    engine.run_to_completion(100);
    assert_eq!(engine.results().unwrap().len(), 20);
}

#[test]
fn test_fallback_tiers_in_order() {
    let mut engine = create_large_setup();
    let config = SearchConfig::new()
        .with_range("temperature", 100.0, 200.0)
        .with_importance("temperature", Importance::MustHave)
        .with_fallback(FallbackTier {
            ranges: [("temperature".to_string(), predicates::RangeSpec { min: 50.0, max: 60.0 })].into(),
            ..FallbackTier::default()
        })
        .with_fallback(FallbackTier {
            ranges: [("temperature".to_string(), predicates::RangeSpec { min: 5.0, max: 6.0 })].into(),
            ..FallbackTier::default()
        });

    engine.create_job(config).unwrap();
    engine.run_to_completion(100);

    assert_eq!(engine.stats().unwrap().fallback_tier, Some(1));
    let results = engine.results().unwrap();
    assert!(!results.is_empty());
    let source = engine.source();
    for result in results {
        let temp = source.numeric("temp", result.item).unwrap();
        assert!((5.0..=6.0).contains(&temp));
    }
}

#[test]
fn test_superseded_job_is_never_stepped() {
    let mut engine = create_large_setup();
    let slow = SearchConfig::new()
        .with_importance("cave", Importance::MustHave)
        .with_params(SearchParams {
            chunk_size: 8,
            ..SearchParams::default()
        });
    let first = engine.create_job(slow).unwrap();
    engine.step(1);
    assert_eq!(engine.state(), Some(JobState::Precomputing));

    let second = engine
        .create_job(SearchConfig::new().with_importance("temperature", Importance::Priority).with_range("temperature", 0.0, 5.0))
        .unwrap();
    assert_ne!(first, second);
    engine.run_to_completion(100);
    assert_eq!(engine.current_job_id(), Some(second));
    assert_eq!(engine.stats().unwrap().cache_misses, 0);
    assert!(engine.results().unwrap().iter().all(|r| r.score > 0.0));
}

#[test]
fn test_group_must_not_have_member_excludes_item() {
    let records = vec![
        ItemRecord::new(0).with_tag("ruins"),
        ItemRecord::new(1).with_tag("ruins").with_tag("geyser"),
        ItemRecord::new(2).with_tag("geyser"),
        ItemRecord::new(3),
    ];
    let dataset = Arc::new(Dataset::from_records(records).unwrap());
    let registry = PredicateRegistry::new()
        .with(Arc::new(GroupPredicate::tags("features")))
        .unwrap();
    let mut engine = SearchEngine::new(dataset, registry);

    let config = SearchConfig::new()
        .with_group_member("features", "ruins", Importance::MustHave)
        .with_group_member("features", "geyser", Importance::MustNotHave);
    engine.create_job(config).unwrap();
    engine.run_to_completion(100);

    let items: Vec<ItemId> = engine.results().unwrap().iter().map(|r| r.item).collect();
    assert_eq!(items, vec![0]);
}

#[test]
fn test_empty_result_is_not_an_error() {
    let mut engine = create_large_setup();
    let config = SearchConfig::new()
        .with_range("temperature", 500.0, 600.0)
        .with_importance("temperature", Importance::MustHave);

    engine.create_job(config).unwrap();
    assert!(engine.step(10));
    assert!(engine.results().unwrap().is_empty());
    assert_eq!(engine.progress(), 1.0);
}

#[test]
fn test_continuous_model_uses_membership_and_aux() {
    let mut engine = create_large_setup();
    let mut params = SearchParams {
        scoring_model: ScoringModelKind::Continuous,
        auxiliary_column: Some("quality".to_string()),
        max_results: 10,
        ..SearchParams::default()
    };
    params.membership_margin = 0.5;
    let config = SearchConfig::new()
        .with_params(params)
        .with_range("temperature", 10.0, 20.0)
        .with_importance("temperature", Importance::Priority)
        .with_importance("cave", Importance::MustHave);

    engine.create_job(config).unwrap();
    engine.run_to_completion(25);

    let results = engine.results().unwrap();
    assert_eq!(results.len(), 10);
    let source = engine.source();
    for result in results {
        assert_eq!(result.breakdown.model, ScoringModelKind::Continuous);
        assert_eq!(result.item % 2, 0);
        let temp = source.numeric("temp", result.item).unwrap();
        assert!((10.0..=20.0).contains(&temp));
        // Even items in range with quality 0.8 (i % 40 == 18) or 0.6 (i % 40 == 16)
        assert!(result.breakdown.auxiliary >= 0.6 - 1e-6);
    }
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_search_file_end_to_end() {
    let file = SearchFile::from_toml_str(
        r#"
        [[predicate]]
        id = "temperature"
        kind = "range"
        column = "temp"

        [[predicate]]
        id = "biome"
        kind = "group"
        column = "biome"

        [[predicate]]
        id = "river"
        kind = "tag"
        tag = "river"
        heavy = true

        [params]
        max_results = 5
        chunk_size = 16

        [ranges.temperature]
        min = 0.0
        max = 9.0

        [importance]
        temperature = "must_have"
        river = "priority"

        [groups.biome]
        members = { forest = "must_have", tundra = "must_have" }
        "#,
    )
    .unwrap();

    let records = (0..60)
        .map(|i| {
            let mut record = ItemRecord::new(i)
                .with_number("temp", (i % 20) as f32)
                .with_text("biome", ["forest", "desert", "tundra"][i as usize % 3]);
            if i % 3 == 0 {
                record = record.with_tag("river");
            }
            record
        })
        .collect();
    let dataset = Arc::new(Dataset::from_records(records).unwrap());
    let mut engine = SearchEngine::new(dataset, file.registry().unwrap());

    let report = engine.estimate(&file.config).unwrap();
    assert_eq!(report.predicates.len(), 2);

    engine.create_job(file.config.clone()).unwrap();
    engine.run_to_completion(8);
    let results = engine.results().unwrap();
    assert_eq!(results.len(), 5);
    // Forest items are multiples of 3 and carry the river tag
    for result in results {
        assert_eq!(result.item % 3, 0);
        assert!((result.score - 1.0).abs() < 1e-6);
    }
}

// Property tests

fn importance_from(code: u8) -> Importance {
    match code % 5 {
        0 => Importance::MustHave,
        1 => Importance::MustNotHave,
        2 => Importance::Priority,
        3 => Importance::Preferred,
        _ => Importance::Ignored,
    }
}

/// Items carry tags t0..t3 from the bits of `mask`; t0 and t1 are cheap,
/// t2 and t3 heavy. `v` drives a cheap range predicate.
fn build_random(items: &[(u8, f32, bool)]) -> (Arc<Dataset>, PredicateRegistry) {
    let records = items
        .iter()
        .enumerate()
        .map(|(i, (mask, v, excluded))| {
            let mut record = ItemRecord::new(i as ItemId).with_number("v", *v);
            for bit in 0..4 {
                if mask & (1 << bit) != 0 {
                    record = record.with_tag(format!("t{bit}"));
                }
            }
            if *excluded { record.excluded() } else { record }
        })
        .collect();
    let dataset = Arc::new(Dataset::from_records(records).unwrap());
    let registry = PredicateRegistry::new()
        .with(Arc::new(TagPredicate::new("t0", "t0")))
        .unwrap()
        .with(Arc::new(TagPredicate::new("t1", "t1")))
        .unwrap()
        .with(Arc::new(TagPredicate::new("t2", "t2").heavy()))
        .unwrap()
        .with(Arc::new(TagPredicate::new("t3", "t3").heavy()))
        .unwrap()
        .with(Arc::new(RangePredicate::new("v", "v")))
        .unwrap();
    (dataset, registry)
}

fn build_config(codes: &[u8], max_results: usize, continuous: bool) -> SearchConfig {
    let params = SearchParams {
        max_results,
        chunk_size: 7,
        scoring_model: if continuous {
            ScoringModelKind::Continuous
        } else {
            ScoringModelKind::Binary
        },
        ..SearchParams::default()
    };
    let mut config = SearchConfig::new().with_params(params).with_range("v", 0.3, 0.6);
    for (id, code) in ["t0", "t1", "t2", "t3", "v"].iter().zip(codes) {
        config = config.with_importance(*id, importance_from(*code));
    }
    config
}

fn random_items() -> impl Strategy<Value = Vec<(u8, f32, bool)>> {
    proptest::collection::vec((0u8..16, 0.0f32..1.0, proptest::bool::weighted(0.1)), 1..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pruning_matches_exhaustive_scoring(
        items in random_items(),
        codes in proptest::collection::vec(0u8..5, 5),
        max_results in 1usize..8,
        continuous in any::<bool>(),
        iterations in 1usize..20,
    ) {
        let (dataset, registry) = build_random(&items);
        let config = build_config(&codes, max_results, continuous);

        let mut engine = SearchEngine::new(dataset.clone(), registry.clone());
        engine.create_job(config.clone()).unwrap();
        engine.run_to_completion(iterations);
        let job = engine.job().unwrap();
        let pruned_scores: Vec<f32> = job.results().iter().map(|r| r.score).collect();

        // Exhaustive: score every candidate with fully built bitmaps
        let partition = registry.partition(&config);
        let model = models::for_params(&config.params, partition.total_counts());
        let ctx = EvalContext::new(dataset.as_ref(), &config);
        let gate = AggregateGate::new(&partition, model.as_ref(), config.params.max_candidates).run(&ctx);
        let mut cache = PredicateCache::new();
        for resolved in &partition.heavy {
            cache.start_evaluation(&resolved.predicate, &ctx);
        }
        while !cache.step_all(&ctx, 1000) {}

        let mut exhaustive: Vec<f32> = gate
            .candidates
            .iter()
            .filter_map(|c| score_candidate(model.as_ref(), &partition.heavy, &cache, c))
            .filter(|b| b.hard_fraction + 1e-6 >= job.strictness())
            .map(|b| b.total)
            .collect();
        exhaustive.sort_by(|a, b| b.total_cmp(a));
        exhaustive.truncate(max_results);

        prop_assert_eq!(pruned_scores, exhaustive);
    }

    #[test]
    fn prop_upper_bounds_sorted_and_sound(
        items in random_items(),
        codes in proptest::collection::vec(0u8..5, 5),
        continuous in any::<bool>(),
    ) {
        let (dataset, registry) = build_random(&items);
        let config = build_config(&codes, 5, continuous);
        let partition = registry.partition(&config);
        let model = models::for_params(&config.params, partition.total_counts());
        let ctx = EvalContext::new(dataset.as_ref(), &config);
        let gate = AggregateGate::new(&partition, model.as_ref(), 5000).run(&ctx);

        let mut cache = PredicateCache::new();
        for resolved in &partition.heavy {
            cache.start_evaluation(&resolved.predicate, &ctx);
        }
        while !cache.step_all(&ctx, 1000) {}

        for pair in gate.candidates.windows(2) {
            prop_assert!(pair[0].upper_bound >= pair[1].upper_bound);
        }
        for candidate in &gate.candidates {
            if let Some(breakdown) = score_candidate(model.as_ref(), &partition.heavy, &cache, candidate) {
                prop_assert!(breakdown.total <= candidate.upper_bound + 1e-6);
            }
        }
    }

    #[test]
    fn prop_must_have_and_must_not_have_or(
        items in random_items(),
        codes in proptest::collection::vec(0u8..2, 2),
    ) {
        let (dataset, registry) = build_random(&items);
        let config = build_config(&[codes[0], codes[1], 4, 4, 4], 5, false);
        let partition = registry.partition(&config);
        let model = models::for_params(&config.params, partition.total_counts());
        let ctx = EvalContext::new(dataset.as_ref(), &config);
        let gate = AggregateGate::new(&partition, model.as_ref(), 5000).run(&ctx);

        let mut expected: Vec<ItemId> = Vec::new();
        for item in 0..dataset.len() as ItemId {
            if dataset.is_excluded(item) {
                continue;
            }
            let mut keep = true;
            for (tag, code) in [("t0", codes[0]), ("t1", codes[1])] {
                let has = dataset.has_tag(tag, item);
                match importance_from(code) {
                    Importance::MustHave => keep &= has,
                    Importance::MustNotHave => keep &= !has,
                    _ => {}
                }
            }
            if keep {
                expected.push(item);
            }
        }
        let actual = sorted(gate.candidates.iter().map(|c| c.item).collect());
        prop_assert_eq!(actual, expected);
    }
}
