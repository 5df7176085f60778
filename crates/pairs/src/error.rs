use gridphase_common::EntityId;
use gridphase_layer::LayerSettings;

/// Errors reported by pair queries and the per-entity storage they feed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FindPairsError {
    #[error("layers have different grids: {a:?} vs {b:?}")]
    IncompatibleLayers {
        a: LayerSettings,
        b: LayerSettings,
    },
    #[error("entity {0:?} may be reported by another task running concurrently")]
    AliasViolation(EntityId),
    #[error("entity {0:?} has no slot in this lookup")]
    UnknownEntity(EntityId),
    #[error("cross cache was built for different layers")]
    StaleCache,
}
