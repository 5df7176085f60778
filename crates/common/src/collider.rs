use std::sync::Arc;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::types::{Aabb, EntityId, RigidTransform};

/// Collision geometry in the body's local space.
///
/// AABB derivation is a single `match` over the variants; there is no
/// per-shape trait object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    Sphere { center: Vec3, radius: f32 },
    /// Segment `a..b` swept by `radius`.
    Capsule { a: Vec3, b: Vec3, radius: f32 },
    Box { center: Vec3, half_size: Vec3 },
    Compound(Arc<CompoundCollider>),
}

/// A set of child colliders sharing one body, with a uniform scale applied to
/// child shapes and child offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundCollider {
    pub children: Vec<(Collider, RigidTransform)>,
    pub scale: f32,
}

impl Default for Collider {
    fn default() -> Self {
        Self::Box {
            center: Vec3::ZERO,
            half_size: Vec3::splat(0.5),
        }
    }
}

impl Collider {
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere {
            center: Vec3::ZERO,
            radius,
        }
    }

    pub fn cube(half_size: f32) -> Self {
        Self::Box {
            center: Vec3::ZERO,
            half_size: Vec3::splat(half_size),
        }
    }

    pub fn compound(children: Vec<(Collider, RigidTransform)>) -> Self {
        Self::Compound(Arc::new(CompoundCollider {
            children,
            scale: 1.0,
        }))
    }

    /// World-space bounds of this collider placed at `transform`.
    pub fn aabb(&self, transform: &RigidTransform) -> Aabb {
        match self {
            Collider::Sphere { center, radius } => {
                Aabb::from_center_extents(transform.transform_point(*center), Vec3::splat(*radius))
            }
            Collider::Capsule { a, b, radius } => {
                let a = transform.transform_point(*a);
                let b = transform.transform_point(*b);
                let r = Vec3::splat(*radius);
                Aabb::new(a.min(b) - r, a.max(b) + r)
            }
            Collider::Box { center, half_size } => {
                let m = Mat3::from_quat(transform.rotation);
                let extents = m.x_axis.abs() * half_size.x
                    + m.y_axis.abs() * half_size.y
                    + m.z_axis.abs() * half_size.z;
                Aabb::from_center_extents(transform.transform_point(*center), extents)
            }
            Collider::Compound(compound) => compound.aabb(transform),
        }
    }

    /// Uniformly scales the shape about its local origin.
    pub fn scaled(&self, factor: f32) -> Collider {
        match self {
            Collider::Sphere { center, radius } => Collider::Sphere {
                center: *center * factor,
                radius: radius * factor.abs(),
            },
            Collider::Capsule { a, b, radius } => Collider::Capsule {
                a: *a * factor,
                b: *b * factor,
                radius: radius * factor.abs(),
            },
            Collider::Box { center, half_size } => Collider::Box {
                center: *center * factor,
                half_size: *half_size * factor.abs(),
            },
            Collider::Compound(compound) => Collider::Compound(Arc::new(CompoundCollider {
                children: compound.children.clone(),
                scale: compound.scale * factor,
            })),
        }
    }
}

impl CompoundCollider {
    fn aabb(&self, transform: &RigidTransform) -> Aabb {
        let mut children = self.children.iter().map(|(child, local)| {
            let local = RigidTransform::new(local.rotation, local.position * self.scale);
            child.scaled(self.scale).aabb(&transform.mul(&local))
        });
        match children.next() {
            Some(first) => children.fold(first, |acc, b| acc.union(&b)),
            None => Aabb::from_center_extents(transform.position, Vec3::ZERO),
        }
    }
}

/// One input record for the layer builder: geometry, placement, identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColliderBody {
    pub collider: Collider,
    pub transform: RigidTransform,
    pub entity: EntityId,
}

impl ColliderBody {
    pub fn new(collider: Collider, transform: RigidTransform, entity: EntityId) -> Self {
        Self {
            collider,
            transform,
            entity,
        }
    }

    pub fn aabb(&self) -> Aabb {
        self.collider.aabb(&self.transform)
    }
}
