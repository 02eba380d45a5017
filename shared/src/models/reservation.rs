//! Stock reservation records
//!
//! A reservation promises a quantity of product at a location (and optionally
//! a batch) to one picking process, making it unavailable to every other
//! process. Rows are created in bulk when a process reserves, decremented or
//! deleted as picked stock is moved, and bulk-deleted when a process clears.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::StockLocationReference;
use super::quantity::{BatchQuantityMap, ProductQuantityLocation};

/// One persisted stock reservation row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockReservation {
    pub id: Uuid,
    pub picking_process_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub location: StockLocationReference,
    pub warehouse_id: Uuid,
    pub quantity: i64,
    /// Ascending creation order within the owning process, starting at 1.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a reservation row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewStockReservation {
    pub picking_process_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub location: StockLocationReference,
    pub warehouse_id: Uuid,
    pub quantity: i64,
    pub position: i32,
}

/// Collapse reservation rows into one quantity-location entry per
/// (product, location), with batch-bound rows contributing to the batch map.
pub fn reservations_to_quantities(rows: &[StockReservation]) -> Vec<ProductQuantityLocation> {
    let mut grouped: BTreeMap<(Uuid, StockLocationReference), (i64, BTreeMap<Uuid, i64>)> =
        BTreeMap::new();

    for row in rows {
        let slot = grouped.entry((row.product_id, row.location)).or_default();
        slot.0 += row.quantity;
        if let Some(batch_id) = row.batch_id {
            *slot.1.entry(batch_id).or_default() += row.quantity;
        }
    }

    grouped
        .into_iter()
        .map(|((product_id, location), (quantity, batches))| ProductQuantityLocation {
            product_id,
            location,
            quantity,
            batches: if batches.is_empty() {
                None
            } else {
                Some(BatchQuantityMap::new(batches))
            },
        })
        .collect()
}
