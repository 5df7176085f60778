use gridphase_common::{Aabb, Collider, ColliderBody, EntityId, RigidTransform};
use gridphase_layer::CollisionLayer;

/// Caller logic run once per candidate pair.
///
/// The finder shares one processor between every task of a query, so any
/// state it accumulates needs interior mutability (atomics, a mutex, or a
/// [`SafeLookup`](crate::SafeLookup)). Closures taking `&FindPairsResult`
/// are processors too.
pub trait FindPairsProcessor: Sync {
    fn execute(&self, result: &FindPairsResult<'_>);
}

impl<F> FindPairsProcessor for F
where
    F: Fn(&FindPairsResult<'_>) + Sync,
{
    fn execute(&self, result: &FindPairsResult<'_>) {
        self(result)
    }
}

/// Identifier of one side of a reported pair, plus whether this task is the
/// only one that can currently report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SafeEntity {
    entity: EntityId,
    exclusive: bool,
}

impl SafeEntity {
    pub fn new(entity: EntityId, exclusive: bool) -> Self {
        Self { entity, exclusive }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// `false` when a concurrently running task may report the same body.
    /// Writes to per-entity state through a non-exclusive handle are refused
    /// by [`SafeLookup`](crate::SafeLookup).
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

/// One candidate pair. Only valid for the duration of a single
/// [`FindPairsProcessor::execute`] call.
///
/// For a self query both layers are the same layer. For a query between two
/// layers, side `a` always comes from the first layer passed in.
#[derive(Debug, Clone, Copy)]
pub struct FindPairsResult<'a> {
    layer_a: &'a CollisionLayer,
    layer_b: &'a CollisionLayer,
    index_a: usize,
    index_b: usize,
    job_index: usize,
    exclusive_a: bool,
    exclusive_b: bool,
}

impl<'a> FindPairsResult<'a> {
    pub(crate) fn new(
        layer_a: &'a CollisionLayer,
        layer_b: &'a CollisionLayer,
        index_a: usize,
        index_b: usize,
        job_index: usize,
        exclusive_a: bool,
        exclusive_b: bool,
    ) -> Self {
        Self {
            layer_a,
            layer_b,
            index_a,
            index_b,
            job_index,
            exclusive_a,
            exclusive_b,
        }
    }

    pub fn layer_a(&self) -> &'a CollisionLayer {
        self.layer_a
    }

    pub fn layer_b(&self) -> &'a CollisionLayer {
        self.layer_b
    }

    /// Absolute body index in `layer_a`.
    pub fn index_a(&self) -> usize {
        self.index_a
    }

    /// Absolute body index in `layer_b`.
    pub fn index_b(&self) -> usize {
        self.index_b
    }

    /// Index of the task that produced this pair.
    pub fn job_index(&self) -> usize {
        self.job_index
    }

    pub fn body_a(&self) -> &'a ColliderBody {
        self.layer_a.body(self.index_a)
    }

    pub fn body_b(&self) -> &'a ColliderBody {
        self.layer_b.body(self.index_b)
    }

    pub fn collider_a(&self) -> &'a Collider {
        &self.body_a().collider
    }

    pub fn collider_b(&self) -> &'a Collider {
        &self.body_b().collider
    }

    pub fn transform_a(&self) -> RigidTransform {
        self.body_a().transform
    }

    pub fn transform_b(&self) -> RigidTransform {
        self.body_b().transform
    }

    pub fn aabb_a(&self) -> Aabb {
        self.layer_a.aabb(self.index_a)
    }

    pub fn aabb_b(&self) -> Aabb {
        self.layer_b.aabb(self.index_b)
    }

    /// Position of body `a` in the sequence `layer_a` was built from.
    pub fn source_index_a(&self) -> usize {
        self.layer_a.source_index(self.index_a)
    }

    pub fn source_index_b(&self) -> usize {
        self.layer_b.source_index(self.index_b)
    }

    pub fn entity_a(&self) -> SafeEntity {
        SafeEntity::new(self.body_a().entity, self.exclusive_a)
    }

    pub fn entity_b(&self) -> SafeEntity {
        SafeEntity::new(self.body_b().entity, self.exclusive_b)
    }
}
