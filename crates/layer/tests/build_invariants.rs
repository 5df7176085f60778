use glam::{UVec3, Vec3};
use gridphase_common::{Collider, ColliderBody, EntityId, RigidTransform};
use gridphase_layer::{BuildCollisionLayer, CollisionLayer, LayerSettings};
use proptest::prelude::*;

fn settings() -> LayerSettings {
    LayerSettings::new(Vec3::splat(-40.0), Vec3::splat(20.0), UVec3::new(4, 4, 4))
}

fn body_strategy() -> impl Strategy<Value = (f32, f32, f32, f32)> {
    prop_oneof![
        9 => (-50.0f32..50.0, -50.0f32..50.0, -50.0f32..50.0, 0.01f32..15.0),
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

proptest! {
    #[test]
    fn every_body_lands_in_one_bucket(raw in prop::collection::vec(body_strategy(), 0..300)) {
        let bodies = bodies_from(&raw);
        let layer = build(&bodies);

        let total: usize = layer.bucket_ranges().iter().map(|r| r.count).sum();
        prop_assert_eq!(total, bodies.len());

        let mut seen = vec![false; bodies.len()];
        for i in 0..layer.body_count() {
            let src = layer.source_index(i);
            prop_assert!(!seen[src]);
            seen[src] = true;
            prop_assert_eq!(layer.body(i).entity, bodies[src].entity);
        }
        prop_assert!(seen.iter().all(|&s| s));

        let mut expected_start = 0;
        for range in layer.bucket_ranges() {
            prop_assert_eq!(range.start, expected_start);
            expected_start += range.count;
        }
    }

    #[test]
    fn buckets_are_sorted_and_trees_sound(raw in prop::collection::vec(body_strategy(), 0..300)) {
        let layer = build(&bodies_from(&raw));
        for bucket in 0..layer.bucket_count() {
            if bucket == layer.overflow_bucket_index() {
                continue;
            }
            let slices = layer.bucket(bucket);
            prop_assert!(slices.xmins.windows(2).all(|w| w[0] <= w[1]));
            let tree = slices.tree;
            for k in 0..tree.len() {
                let mut max = f32::NEG_INFINITY;
                let mut stack = vec![k];
                while let Some(j) = stack.pop() {
                    if j < tree.len() {
                        max = max.max(tree[j].xmax);
                        stack.push(2 * j + 1);
                        stack.push(2 * j + 2);
                    }
                }
                prop_assert_eq!(tree[k].subtree_xmax, max);
                let node = tree[k];
                prop_assert_eq!(slices.xmins[node.bucket_relative_index as usize], node.xmin);
            }
        }
    }

    #[test]
    fn cached_bounds_match_body_bounds(raw in prop::collection::vec(body_strategy(), 1..100)) {
        let bodies = bodies_from(&raw);
        let layer = build(&bodies);
        for i in 0..layer.body_count() {
            let expected = bodies[layer.source_index(i)].aabb();
            if expected.is_finite() {
                prop_assert_eq!(layer.aabb(i), expected);
            }
        }
    }

    #[test]
    fn rebuilding_is_deterministic(raw in prop::collection::vec(body_strategy(), 0..200)) {
        let bodies = bodies_from(&raw);
        let a = build(&bodies);
        let b = BuildCollisionLayer::new(&bodies)
            .with_settings(settings())
            .run_immediate()
            .unwrap();
        prop_assert_eq!(a.bucket_ranges(), b.bucket_ranges());
        prop_assert_eq!(a.source_indices(), b.source_indices());
        prop_assert_eq!(a.xmins().len(), b.xmins().len());
        for (x, y) in a.xmins().iter().zip(b.xmins()) {
            prop_assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}

#[test]
fn single_cell_grid_keeps_everything_in_one_bucket() {
    let settings = LayerSettings::new(Vec3::splat(-100.0), Vec3::splat(200.0), UVec3::ONE);
    let bodies = bodies_from(&[
        (4.0, 0.0, 0.0, 0.6),
        (0.0, 0.0, 0.0, 0.6),
        (2.0, 0.0, 0.0, 0.6),
    ]);
    let layer = BuildCollisionLayer::new(&bodies)
        .with_settings(settings)
        .run()
        .unwrap();
    assert_eq!(layer.bucket_count(), 3);
    assert_eq!(layer.bucket_range(0).count, 3);
    assert_eq!(layer.source_indices(), &[1, 2, 0]);
}
