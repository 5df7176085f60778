use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use glam::{UVec3, Vec3};
use gridphase_common::{Collider, ColliderBody, EntityId, RigidTransform};
use gridphase_layer::{BuildCollisionLayer, CollisionLayer, LayerSettings};
use gridphase_pairs::{
    CrossCache, FindPairsProcessor, FindPairsResult, find_pairs, find_pairs_between,
};
use proptest::prelude::*;

#[derive(Default)]
struct Collect(Mutex<Vec<(usize, usize)>>);

impl FindPairsProcessor for Collect {
    fn execute(&self, result: &FindPairsResult<'_>) {
        self.0
            .lock()
            .unwrap()
            .push((result.source_index_a(), result.source_index_b()));
    }
}

impl Collect {
    fn pairs(self) -> Vec<(usize, usize)> {
        self.0.into_inner().unwrap()
    }
}

fn settings() -> LayerSettings {
    LayerSettings::new(Vec3::splat(-50.0), Vec3::splat(25.0), UVec3::new(4, 4, 4))
}

fn body_strategy() -> impl Strategy<Value = (f32, f32, f32, f32)> {
    prop_oneof![
        18 => (-60.0f32..60.0, -60.0f32..60.0, -60.0f32..60.0, 0.1f32..12.0),
        1 => (-60.0f32..60.0, -60.0f32..60.0, -60.0f32..60.0, Just(0.0f32)),
        1 => Just((f32::NAN, 0.0, 0.0, 1.0)),
    ]
}

fn bodies_from(raw: &[(f32, f32, f32, f32)]) -> Vec<ColliderBody> {
    raw.iter()
        .enumerate()
        .map(|(i, &(x, y, z, half))| {
            ColliderBody::new(
                Collider::cube(half),
                RigidTransform::from_position(Vec3::new(x, y, z)),
                EntityId(i as u32),
            )
        })
        .collect()
}

fn build(bodies: &[ColliderBody]) -> CollisionLayer {
    BuildCollisionLayer::new(bodies)
        .with_settings(settings())
        .run_parallel()
        .unwrap()
}

/// Overflow bodies are inert, so the reference skips non-finite bounds.
fn brute_force_self(bodies: &[ColliderBody]) -> BTreeSet<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for i in 0..bodies.len() {
        for j in i + 1..bodies.len() {
            let (a, b) = (bodies[i].aabb(), bodies[j].aabb());
            if a.is_finite() && b.is_finite() && a.overlaps(&b) {
                pairs.insert((i, j));
            }
        }
    }
    pairs
}

fn brute_force_between(a: &[ColliderBody], b: &[ColliderBody]) -> BTreeSet<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for (i, body_a) in a.iter().enumerate() {
        for (j, body_b) in b.iter().enumerate() {
            let (x, y) = (body_a.aabb(), body_b.aabb());
            if x.is_finite() && y.is_finite() && x.overlaps(&y) {
                pairs.insert((i, j));
            }
        }
    }
    pairs
}

fn unordered(pairs: &[(usize, usize)]) -> BTreeSet<(usize, usize)> {
    pairs.iter().map(|&(a, b)| (a.min(b), a.max(b))).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn self_query_matches_brute_force(raw in prop::collection::vec(body_strategy(), 0..200)) {
        let bodies = bodies_from(&raw);
        let layer = build(&bodies);
        let pairs = find_pairs(&layer, Collect::default()).run_parallel().pairs();

        let found = unordered(&pairs);
        prop_assert_eq!(found.len(), pairs.len(), "a pair was reported twice");
        prop_assert!(pairs.iter().all(|&(a, b)| a != b));
        prop_assert_eq!(found, brute_force_self(&bodies));
    }

    #[test]
    fn between_query_matches_brute_force(
        raw_a in prop::collection::vec(body_strategy(), 0..120),
        raw_b in prop::collection::vec(body_strategy(), 0..120),
    ) {
        let bodies_a = bodies_from(&raw_a);
        let bodies_b = bodies_from(&raw_b);
        let layer_a = build(&bodies_a);
        let layer_b = build(&bodies_b);
        let pairs = find_pairs_between(&layer_a, &layer_b, Collect::default())
            .unwrap()
            .run_parallel()
            .pairs();

        let found: BTreeSet<(usize, usize)> = pairs.iter().copied().collect();
        prop_assert_eq!(found.len(), pairs.len(), "a pair was reported twice");
        prop_assert_eq!(found, brute_force_between(&bodies_a, &bodies_b));
    }
}

#[test]
fn every_strategy_reports_the_same_set() {
    let mut rng = gridphase_common::SplitMix64::new(2024);
    let raw: Vec<(f32, f32, f32, f32)> = (0..400)
        .map(|_| {
            (
                rng.range_f32(-55.0, 55.0),
                rng.range_f32(-55.0, 55.0),
                rng.range_f32(-55.0, 55.0),
                rng.range_f32(0.5, 9.0),
            )
        })
        .collect();
    let bodies = bodies_from(&raw);
    let layer = Arc::new(build(&bodies));
    let expected = brute_force_self(&bodies);
    assert!(!expected.is_empty());

    let runs: Vec<(&str, Vec<(usize, usize)>)> = vec![
        ("immediate", find_pairs(&*layer, Collect::default()).run_immediate().pairs()),
        ("run", find_pairs(&*layer, Collect::default()).run().pairs()),
        ("parallel", find_pairs(&*layer, Collect::default()).run_parallel().pairs()),
        (
            "parallel tracked",
            find_pairs(&*layer, Collect::default())
                .with_alias_tracking()
                .run_parallel()
                .pairs(),
        ),
        (
            "parallel cached",
            find_pairs(&*layer, Collect::default())
                .with_cross_cache()
                .run_parallel()
                .pairs(),
        ),
        (
            "parallel unsafe",
            find_pairs(&*layer, Collect::default())
                .run_parallel_unsafe()
                .pairs(),
        ),
        (
            "single scheduled",
            find_pairs(Arc::clone(&layer), Collect::default())
                .schedule_single()
                .complete()
                .unwrap()
                .pairs(),
        ),
        (
            "parallel scheduled",
            find_pairs(Arc::clone(&layer), Collect::default())
                .schedule_parallel()
                .complete()
                .unwrap()
                .pairs(),
        ),
        (
            "unsafe scheduled",
            find_pairs(Arc::clone(&layer), Collect::default())
                .schedule_parallel_unsafe()
                .complete()
                .unwrap()
                .pairs(),
        ),
    ];
    for (name, pairs) in runs {
        assert_eq!(pairs.len(), expected.len(), "{name}");
        assert_eq!(unordered(&pairs), expected, "{name}");
    }
}

#[test]
fn serial_strategies_report_in_identical_order() {
    let mut rng = gridphase_common::SplitMix64::new(5);
    let raw: Vec<(f32, f32, f32, f32)> = (0..250)
        .map(|_| {
            (
                rng.range_f32(-50.0, 50.0),
                rng.range_f32(-50.0, 50.0),
                rng.range_f32(-50.0, 50.0),
                rng.range_f32(0.5, 8.0),
            )
        })
        .collect();
    let layer = build(&bodies_from(&raw));
    let immediate = find_pairs(&layer, Collect::default()).run_immediate().pairs();
    let run = find_pairs(&layer, Collect::default()).run().pairs();
    let rebuilt = build(&bodies_from(&raw));
    let again = find_pairs(&rebuilt, Collect::default()).run_immediate().pairs();
    assert_eq!(immediate, run);
    assert_eq!(immediate, again);
}

fn random_bodies(seed: u64, count: usize) -> Vec<ColliderBody> {
    let mut rng = gridphase_common::SplitMix64::new(seed);
    let raw: Vec<(f32, f32, f32, f32)> = (0..count)
        .map(|_| {
            (
                rng.range_f32(-55.0, 55.0),
                rng.range_f32(-55.0, 55.0),
                rng.range_f32(-55.0, 55.0),
                rng.range_f32(0.5, 9.0),
            )
        })
        .collect();
    bodies_from(&raw)
}

fn between_runs(
    a: &Arc<CollisionLayer>,
    b: &Arc<CollisionLayer>,
) -> Vec<(&'static str, Vec<(usize, usize)>)> {
    let query = || find_pairs_between(&**a, &**b, Collect::default()).unwrap();
    let scheduled = || {
        find_pairs_between(Arc::clone(a), Arc::clone(b), Collect::default()).unwrap()
    };
    vec![
        ("immediate", query().run_immediate().pairs()),
        ("run", query().run().pairs()),
        ("parallel", query().run_parallel().pairs()),
        ("parallel tracked", query().with_alias_tracking().run_parallel().pairs()),
        ("parallel cached", query().with_cross_cache().run_parallel().pairs()),
        ("parallel unsafe", query().run_parallel_unsafe().pairs()),
        ("single scheduled", scheduled().schedule_single().complete().unwrap().pairs()),
        ("parallel scheduled", scheduled().schedule_parallel().complete().unwrap().pairs()),
        (
            "tracked scheduled",
            scheduled()
                .with_alias_tracking()
                .schedule_parallel()
                .complete()
                .unwrap()
                .pairs(),
        ),
        (
            "unsafe scheduled",
            scheduled()
                .schedule_parallel_unsafe()
                .complete()
                .unwrap()
                .pairs(),
        ),
    ]
}

#[test]
fn every_strategy_reports_the_same_set_between_layers() {
    let bodies_a = random_bodies(31, 300);
    let bodies_b = random_bodies(32, 300);
    let layer_a = Arc::new(build(&bodies_a));
    let layer_b = Arc::new(build(&bodies_b));
    let expected = brute_force_between(&bodies_a, &bodies_b);
    assert!(!expected.is_empty());

    for (name, pairs) in between_runs(&layer_a, &layer_b) {
        let found: BTreeSet<(usize, usize)> = pairs.iter().copied().collect();
        assert_eq!(pairs.len(), expected.len(), "{name}");
        assert_eq!(found, expected, "{name}");
    }
}

#[test]
fn a_layer_queried_against_itself_reports_every_ordered_pair() {
    let bodies = random_bodies(33, 300);
    let layer = Arc::new(build(&bodies));
    let clone = Arc::new((*layer).clone());
    let expected = brute_force_between(&bodies, &bodies);
    assert!(expected.iter().any(|&(a, b)| a != b));

    for (other, label) in [(&layer, "same"), (&clone, "clone")] {
        for (name, pairs) in between_runs(&layer, other) {
            let found: BTreeSet<(usize, usize)> = pairs.iter().copied().collect();
            assert_eq!(pairs.len(), expected.len(), "{label} {name}");
            assert_eq!(found, expected, "{label} {name}");
        }
    }
}

#[derive(Default)]
struct Tagged(Mutex<Vec<(usize, usize, bool, bool)>>);

impl FindPairsProcessor for Tagged {
    fn execute(&self, result: &FindPairsResult<'_>) {
        self.0.lock().unwrap().push((
            result.index_a(),
            result.index_b(),
            result.entity_a().is_exclusive(),
            result.entity_b().is_exclusive(),
        ));
    }
}

#[test]
fn tracked_between_marks_cross_sides_shared() {
    let layer_a = build(&random_bodies(41, 300));
    let layer_b = build(&random_bodies(42, 300));
    let cross = layer_a.cross_bucket_index();

    let tagged = find_pairs_between(&layer_a, &layer_b, Tagged::default())
        .unwrap()
        .with_alias_tracking()
        .run_parallel();
    let results = tagged.0.into_inner().unwrap();
    assert!(!results.is_empty());
    for (a, b, exclusive_a, exclusive_b) in results {
        let a_cross = layer_a.bucket_of(a) == cross;
        let b_cross = layer_b.bucket_of(b) == cross;
        if a_cross != b_cross {
            assert_eq!(exclusive_a, !a_cross, "pair ({a}, {b})");
            assert_eq!(exclusive_b, !b_cross, "pair ({a}, {b})");
        } else {
            assert!(exclusive_a && exclusive_b, "pair ({a}, {b})");
        }
    }

    let aliased = find_pairs_between(&layer_a, &layer_a, Tagged::default())
        .unwrap()
        .with_alias_tracking()
        .run_parallel();
    for (a, b, exclusive_a, exclusive_b) in aliased.0.into_inner().unwrap() {
        let a_cross = layer_a.bucket_of(a) == cross;
        let b_cross = layer_a.bucket_of(b) == cross;
        if a_cross != b_cross {
            assert!(!exclusive_a && !exclusive_b, "pair ({a}, {b})");
        }
    }
}

#[test]
fn cross_cache_replays_between_layers() {
    let layer_a = build(&random_bodies(51, 300));
    let layer_b = build(&random_bodies(52, 300));
    let cross = layer_a.cross_bucket_index();

    let all = find_pairs_between(&layer_a, &layer_b, Tagged::default())
        .unwrap()
        .run_immediate();
    let expected: BTreeSet<(usize, usize)> = all
        .0
        .into_inner()
        .unwrap()
        .into_iter()
        .filter(|&(a, b, _, _)| {
            (layer_a.bucket_of(a) == cross) != (layer_b.bucket_of(b) == cross)
        })
        .map(|(a, b, _, _)| (a, b))
        .collect();
    assert!(!expected.is_empty());

    let cache = CrossCache::build_between(&layer_a, &layer_b).unwrap();
    assert!(cache.is_valid_for(&layer_a, &layer_b));
    assert_eq!(cache.len(), expected.len());

    let replayed = Tagged::default();
    cache.replay_between(&layer_a, &layer_b, &replayed).unwrap();
    let replayed = replayed.0.into_inner().unwrap();
    assert!(replayed.iter().all(|&(_, _, ea, eb)| ea && eb));
    let found: BTreeSet<(usize, usize)> = replayed.iter().map(|&(a, b, _, _)| (a, b)).collect();
    assert_eq!(found, expected);
    assert!(cache.replay(&layer_a, &Collect::default()).is_err());
}
