//! Product quantity models
//!
//! Quantities are signed 64-bit integers: negative values are legal
//! intermediate results of multiset arithmetic, but anything handed to a
//! store or a stock movement must be non-negative.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::StockLocationReference;

/// A demanded or available quantity of one product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductQuantity {
    pub product_id: Uuid,
    pub quantity: i64,
}

impl ProductQuantity {
    pub fn new(product_id: Uuid, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// An immutable per-batch quantity breakdown.
///
/// The batch sums need not equal the total quantity of the entry carrying the
/// map; the difference is implicitly attributed to "no batch".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BatchQuantityMap(BTreeMap<Uuid, i64>);

impl BatchQuantityMap {
    pub fn new(quantities: BTreeMap<Uuid, i64>) -> Self {
        Self(quantities)
    }

    pub fn get(&self, batch_id: Uuid) -> i64 {
        self.0.get(&batch_id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, i64)> + '_ {
        self.0.iter().map(|(id, qty)| (*id, *qty))
    }

    pub fn batch_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all batch quantities.
    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    /// A copy with every quantity sign-flipped.
    pub fn negated(&self) -> Self {
        Self(self.0.iter().map(|(id, qty)| (*id, -qty)).collect())
    }
}

impl FromIterator<(Uuid, i64)> for BatchQuantityMap {
    fn from_iter<T: IntoIterator<Item = (Uuid, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A quantity of one product at one location, optionally broken down per
/// batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductQuantityLocation {
    pub product_id: Uuid,
    pub location: StockLocationReference,
    pub quantity: i64,
    pub batches: Option<BatchQuantityMap>,
}

impl ProductQuantityLocation {
    pub fn new(product_id: Uuid, location: StockLocationReference, quantity: i64) -> Self {
        Self {
            product_id,
            location,
            quantity,
            batches: None,
        }
    }

    pub fn with_batches(
        product_id: Uuid,
        location: StockLocationReference,
        quantity: i64,
        batches: BatchQuantityMap,
    ) -> Self {
        Self {
            product_id,
            location,
            quantity,
            batches: Some(batches),
        }
    }

    /// The part of the quantity not attributed to any batch.
    pub fn unbatched_remainder(&self) -> i64 {
        match &self.batches {
            Some(batches) => self.quantity - batches.total(),
            None => self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negated_flips_every_batch() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let map: BatchQuantityMap = [(a, 3), (b, -2)].into_iter().collect();
        let negated = map.negated();
        assert_eq!(negated.get(a), -3);
        assert_eq!(negated.get(b), 2);
        // the original is untouched
        assert_eq!(map.get(a), 3);
    }

    #[test]
    fn unbatched_remainder_is_total_minus_batch_sum() {
        let location = StockLocationReference::Warehouse(Uuid::new_v4());
        let batch = Uuid::new_v4();
        let entry = ProductQuantityLocation::with_batches(
            Uuid::new_v4(),
            location,
            10,
            [(batch, 4)].into_iter().collect(),
        );
        assert_eq!(entry.unbatched_remainder(), 6);
    }
}
