//! Physical stock rows
//!
//! A `StockEntry` is the store-level shape of one stock row: one product at
//! one location, optionally bound to a batch. Grouping entries by
//! (product, location) yields the `ProductQuantityLocation` collections the
//! engine computes with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::StockLocationReference;
use super::quantity::{BatchQuantityMap, ProductQuantityLocation};

/// One physical stock row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub location: StockLocationReference,
    pub batch_id: Option<Uuid>,
    pub quantity: i64,
}

/// Group raw stock rows into one entry per (product, location), with the
/// per-batch breakdown assembled from batch-bound rows.
pub fn group_stock_entries(entries: &[StockEntry]) -> Vec<ProductQuantityLocation> {
    let mut grouped: BTreeMap<(Uuid, StockLocationReference), (i64, BTreeMap<Uuid, i64>)> =
        BTreeMap::new();

    for entry in entries {
        let slot = grouped
            .entry((entry.product_id, entry.location))
            .or_default();
        slot.0 += entry.quantity;
        if let Some(batch_id) = entry.batch_id {
            *slot.1.entry(batch_id).or_default() += entry.quantity;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        product_id: Uuid,
        location: StockLocationReference,
        batch_id: Option<Uuid>,
        quantity: i64,
    ) -> StockEntry {
        StockEntry {
            id: Uuid::new_v4(),
            product_id,
            warehouse_id: Uuid::new_v4(),
            location,
            batch_id,
            quantity,
        }
    }

    #[test]
    fn groups_rows_by_product_and_location() {
        let product = Uuid::new_v4();
        let bin = StockLocationReference::BinLocation(Uuid::new_v4());
        let batch = Uuid::new_v4();

        let grouped = group_stock_entries(&[
            entry(product, bin, None, 6),
            entry(product, bin, Some(batch), 4),
        ]);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].quantity, 10);
        assert_eq!(grouped[0].batches.as_ref().unwrap().get(batch), 4);
        assert_eq!(grouped[0].unbatched_remainder(), 6);
    }

    #[test]
    fn distinct_locations_stay_separate() {
        let product = Uuid::new_v4();
        let bin_a = StockLocationReference::BinLocation(Uuid::new_v4());
        let bin_b = StockLocationReference::BinLocation(Uuid::new_v4());

        let grouped =
            group_stock_entries(&[entry(product, bin_a, None, 2), entry(product, bin_b, None, 3)]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.iter().map(|e| e.quantity).sum::<i64>(), 5);
    }
}
