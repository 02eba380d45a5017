//! Picking strategies
//!
//! A strategy turns a `PickingRequest` into a concrete allocation across
//! locations and batches, or reports a shortage carrying the best partial
//! allocation it could compute. A shortage is a structured alternative
//! result, not a fatal error: the caller decides whether to accept it.
//!
//! Tie-break order between equally suitable locations or batches is policy,
//! not algorithm: every strategy takes an [`AllocationOrder`] parameter
//! instead of hard-coding a preference.

pub mod bin_location;
pub mod shelf_life;

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{PickingRequest, ProductQuantityLocation, StockLocationReference};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::providers::PickableStockProvider;

pub use bin_location::BinLocationStrategy;
pub use shelf_life::ShelfLifeBatchStrategy;

/// Tie-break order between locations (or batches with equal expiry) that
/// could satisfy the same demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOrder {
    /// Prefer locations holding the most stock (fewest picks).
    #[default]
    LargestStockFirst,
    /// Prefer locations holding the least stock (clears fragments first).
    SmallestStockFirst,
    /// Prefer bin locations, then containers, then unbinned warehouse stock,
    /// then inbound locations.
    LocationKindPriority,
}

fn location_rank(location: &StockLocationReference) -> u8 {
    match location {
        StockLocationReference::BinLocation(_) => 0,
        StockLocationReference::Container(_) => 1,
        StockLocationReference::Warehouse(_) => 2,
        StockLocationReference::GoodsReceipt(_) => 3,
        StockLocationReference::SupplierOrder(_) => 4,
    }
}

impl AllocationOrder {
    /// Compare two (quantity, location) candidates. Falls back to the
    /// location's total order so results are deterministic.
    pub fn compare(
        &self,
        a: (i64, &StockLocationReference),
        b: (i64, &StockLocationReference),
    ) -> Ordering {
        match self {
            AllocationOrder::LargestStockFirst => b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)),
            AllocationOrder::SmallestStockFirst => a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)),
            AllocationOrder::LocationKindPriority => location_rank(a.1)
                .cmp(&location_rank(b.1))
                .then_with(|| b.0.cmp(&a.0))
                .then_with(|| a.1.cmp(b.1)),
        }
    }
}

/// Best partial allocation when demand exceeds available-to-pick stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortage {
    /// The allocation computed so far (per-product sums below demand for at
    /// least one product).
    pub allocation: Vec<ProductQuantityLocation>,
    /// Unsatisfiable quantity per product.
    pub missing: HashMap<Uuid, i64>,
}

/// Result of one strategy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Per-product sums equal the demand.
    Complete(Vec<ProductQuantityLocation>),
    /// Demand could not be fully satisfied.
    Short(Shortage),
}

impl AllocationOutcome {
    pub fn allocation(&self) -> &[ProductQuantityLocation] {
        match self {
            AllocationOutcome::Complete(allocation) => allocation,
            AllocationOutcome::Short(shortage) => &shortage.allocation,
        }
    }
}

/// Pure allocation capability with multiple implementations.
#[async_trait]
pub trait PickingStrategy: Send + Sync {
    async fn allocate(
        &self,
        request: &PickingRequest,
        stock: &dyn PickableStockProvider,
    ) -> EngineResult<AllocationOutcome>;
}
