use gridphase_common::{Aabb, EntityId};
use gridphase_layer::{BucketKind, CollisionLayer};
use serde::Serialize;
use tracing::trace;

/// Read-only views of a built collision layer, for debugging and drawing.
///
/// Nothing here mutates the layer, so it can run while queries are in flight.
pub struct LayerInspector;

impl LayerInspector {
    /// Produce a summary of the layer.
    pub fn summary(layer: &CollisionLayer) -> LayerSummary {
        let settings = layer.settings();
        let cells = settings.cell_count();
        let ranges = layer.bucket_ranges();
        LayerSummary {
            bodies: layer.body_count(),
            buckets: layer.bucket_count(),
            subdivisions: settings.subdivisions.to_array(),
            origin: settings.origin.to_array(),
            cell_size: settings.cell_size.to_array(),
            occupied_cells: ranges[..cells].iter().filter(|r| r.count > 0).count(),
            largest_cell: ranges[..cells].iter().map(|r| r.count).max().unwrap_or(0),
            cross: ranges[layer.cross_bucket_index()].count,
            overflow: ranges[layer.overflow_bucket_index()].count,
        }
    }

    /// Every bucket, including empty ones, in bucket order.
    pub fn buckets(layer: &CollisionLayer) -> Vec<BucketInfo> {
        (0..layer.bucket_count())
            .map(|index| {
                let range = layer.bucket_range(index);
                let (kind, cell, bounds) = match layer.bucket_kind(index) {
                    BucketKind::Cell(coords) => (
                        "cell",
                        Some(coords.to_array()),
                        Some(layer.settings().cell_bounds(index)),
                    ),
                    BucketKind::Cross => ("cross", None, None),
                    BucketKind::Overflow => ("overflow", None, None),
                };
                BucketInfo {
                    index,
                    kind,
                    cell,
                    start: range.start,
                    count: range.count,
                    bounds,
                }
            })
            .collect()
    }

    /// Bodies stored in one bucket, in layer order. Empty for an unknown bucket.
    pub fn bodies_in_bucket(layer: &CollisionLayer, bucket: usize) -> Vec<BodyInfo> {
        if bucket >= layer.bucket_count() {
            return Vec::new();
        }
        layer
            .bucket_range(bucket)
            .range()
            .map(|index| BodyInfo {
                index,
                source_index: layer.source_index(index),
                entity: layer.body(index).entity,
                aabb: layer.aabb(index),
            })
            .collect()
    }

    /// Boxes to draw: one per occupied cell, then one per body colored by
    /// its bucket. Overflow bodies have no usable bounds and are skipped.
    pub fn debug_boxes(layer: &CollisionLayer) -> Vec<DebugBox> {
        let settings = layer.settings();
        let mut boxes: Vec<DebugBox> = (0..settings.cell_count())
            .filter(|&cell| layer.bucket_range(cell).count > 0)
            .map(|cell| DebugBox {
                aabb: settings.cell_bounds(cell),
                color: bucket_color(cell, 0.25),
                bucket: cell,
                kind: DebugBoxKind::Cell,
            })
            .collect();
        for bucket in 0..layer.bucket_count() {
            if bucket == layer.overflow_bucket_index() {
                continue;
            }
            let color = if bucket == layer.cross_bucket_index() {
                [1.0, 1.0, 1.0, 1.0]
            } else {
                bucket_color(bucket, 1.0)
            };
            boxes.extend(layer.bucket_range(bucket).range().map(|index| DebugBox {
                aabb: layer.aabb(index),
                color,
                bucket,
                kind: DebugBoxKind::Body,
            }));
        }
        trace!(boxes = boxes.len(), "debug boxes collected");
        boxes
    }

    /// Summary and bucket table as pretty JSON.
    pub fn to_json(layer: &CollisionLayer) -> serde_json::Result<String> {
        let report = LayerReport {
            summary: Self::summary(layer),
            buckets: Self::buckets(layer)
                .into_iter()
                .filter(|b| b.count > 0)
                .collect(),
        };
        serde_json::to_string_pretty(&report)
    }
}

const PALETTE: [[f32; 3]; 8] = [
    [0.90, 0.30, 0.25],
    [0.95, 0.60, 0.20],
    [0.95, 0.85, 0.25],
    [0.45, 0.80, 0.30],
    [0.25, 0.75, 0.75],
    [0.30, 0.50, 0.95],
    [0.60, 0.40, 0.90],
    [0.90, 0.40, 0.70],
];

fn bucket_color(bucket: usize, alpha: f32) -> [f32; 4] {
    let [r, g, b] = PALETTE[bucket % PALETTE.len()];
    [r, g, b, alpha]
}

/// Summary of a collision layer for the inspector.
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub bodies: usize,
    pub buckets: usize,
    pub subdivisions: [u32; 3],
    pub origin: [f32; 3],
    pub cell_size: [f32; 3],
    pub occupied_cells: usize,
    pub largest_cell: usize,
    pub cross: usize,
    pub overflow: usize,
}

impl std::fmt::Display for LayerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Layer: bodies={} grid={}x{}x{} occupied_cells={} largest_cell={} cross={} overflow={}",
            self.bodies,
            self.subdivisions[0],
            self.subdivisions[1],
            self.subdivisions[2],
            self.occupied_cells,
            self.largest_cell,
            self.cross,
            self.overflow
        )
    }
}

/// One bucket of a layer.
#[derive(Debug, Clone, Serialize)]
pub struct BucketInfo {
    pub index: usize,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<[u32; 3]>,
    pub start: usize,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Aabb>,
}

/// One body as stored in the layer.
#[derive(Debug, Clone, Serialize)]
pub struct BodyInfo {
    pub index: usize,
    pub source_index: usize,
    pub entity: EntityId,
    pub aabb: Aabb,
}

impl std::fmt::Display for BodyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Body #{} (source {}, entity {}) x=[{:.2}, {:.2}] y=[{:.2}, {:.2}] z=[{:.2}, {:.2}]",
            self.index,
            self.source_index,
            self.entity.0,
            self.aabb.min.x,
            self.aabb.max.x,
            self.aabb.min.y,
            self.aabb.max.y,
            self.aabb.min.z,
            self.aabb.max.z,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DebugBoxKind {
    Cell,
    Body,
}

/// A colored wireframe box for a debug renderer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DebugBox {
    pub aabb: Aabb,
    pub color: [f32; 4],
    pub bucket: usize,
    pub kind: DebugBoxKind,
}

#[derive(Serialize)]
struct LayerReport {
    summary: LayerSummary,
    buckets: Vec<BucketInfo>,
}
