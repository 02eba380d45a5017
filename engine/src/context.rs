//! Collaborator interfaces consumed by the engine
//!
//! These traits are implemented by the surrounding system and injected via
//! plain constructor injection. The engine itself owns no picking-process,
//! profile or movement data.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::{PickingProcessContext, PickingProfile, StockMovement};
use thiserror::Error;
use uuid::Uuid;

use crate::error::EngineResult;

/// Provides the engine's view of a picking process: its deliveries, their
/// line-item demand, the stock already present in delivery containers, and
/// any pre-collecting container contents.
#[async_trait]
pub trait PickingContextProvider: Send + Sync {
    async fn picking_process_context(&self, process_id: Uuid)
        -> EngineResult<PickingProcessContext>;
}

/// Resolves a picking profile's policy surface.
#[async_trait]
pub trait PickingProfileProvider: Send + Sync {
    async fn picking_profile(&self, profile_id: Uuid) -> EngineResult<PickingProfile>;
}

/// Resolves the minimum remaining shelf life (in days) demanded per product.
/// Consulted only when batch-aware picking is active.
#[async_trait]
pub trait ShelfLifePolicyProvider: Send + Sync {
    async fn min_shelf_life_days(&self, product_ids: &[Uuid])
        -> EngineResult<HashMap<Uuid, i64>>;
}

/// Validation failure raised by the external stock-movement executor.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MovementValidation(pub String);

/// Performs a validated stock movement. The engine does not duplicate the
/// executor's stock validation; it translates any failure into a
/// "movement not possible" error.
#[async_trait]
pub trait StockMovementExecutor: Send + Sync {
    async fn execute(&self, movement: &StockMovement) -> Result<(), MovementValidation>;
}
