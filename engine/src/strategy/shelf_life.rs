//! Shelf-life-aware batch picking strategy

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use shared::{
    BatchQuantityMap, PickingRequest, ProductQuantityLocation, StockLocationReference,
};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::providers::PickableStockProvider;
use crate::stores::StockStore;
use crate::strategy::{AllocationOrder, AllocationOutcome, PickingStrategy, Shortage};

/// Batch-aware strategy allocating oldest-expiry-first (first expired, first
/// out), honoring per-product minimum-remaining-shelf-life demands.
///
/// When a minimum shelf life is demanded for a product, only batches with a
/// known, sufficient best-before date qualify. Without such a demand, batches
/// are still preferred oldest-first, and unbatched remainders are used last.
pub struct ShelfLifeBatchStrategy<S> {
    store: Arc<S>,
    order: AllocationOrder,
}

struct Candidate {
    location: StockLocationReference,
    batch: Option<Uuid>,
    quantity: i64,
    expiry: Option<NaiveDate>,
}

impl<S> ShelfLifeBatchStrategy<S> {
    pub fn new(store: Arc<S>, order: AllocationOrder) -> Self {
        Self { store, order }
    }
}

#[async_trait]
impl<S: StockStore> PickingStrategy for ShelfLifeBatchStrategy<S> {
    async fn allocate(
        &self,
        request: &PickingRequest,
        stock: &dyn PickableStockProvider,
    ) -> EngineResult<AllocationOutcome> {
        let product_ids = request.product_ids();
        let available = stock.available_to_pick(&product_ids, &request.area).await?;

        let batch_ids: Vec<Uuid> = available
            .iter()
            .filter_map(|entry| entry.batches.as_ref())
            .flat_map(BatchQuantityMap::batch_ids)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let expiries = self.store.batch_expiry_dates(&batch_ids).await?;
        let today = Utc::now().date_naive();

        let mut allocation: Vec<ProductQuantityLocation> = Vec::new();
        let mut missing: HashMap<Uuid, i64> = HashMap::new();

        for demand in &request.demand {
            let mut remaining = demand.quantity;
            if remaining <= 0 {
                continue;
            }

            let earliest_allowed = request
                .min_shelf_life_days
                .get(&demand.product_id)
                .map(|days| today + Duration::days(*days));

            let mut candidates: Vec<Candidate> = Vec::new();
            for entry in available
                .iter()
                .filter(|entry| entry.product_id == demand.product_id)
            {
                if let Some(batches) = &entry.batches {
                    for (batch_id, quantity) in batches.iter().filter(|(_, q)| *q > 0) {
                        let expiry = expiries.get(&batch_id).copied();
                        if let Some(cutoff) = earliest_allowed {
                            match expiry {
                                Some(date) if date >= cutoff => {}
                                // unknown or insufficient shelf life
                                _ => continue,
                            }
                        }
                        candidates.push(Candidate {
                            location: entry.location,
                            batch: Some(batch_id),
                            quantity,
                            expiry,
                        });
                    }
                }
                let remainder = entry.unbatched_remainder();
                if remainder > 0 && earliest_allowed.is_none() {
                    candidates.push(Candidate {
                        location: entry.location,
                        batch: None,
                        quantity: remainder,
                        expiry: None,
                    });
                }
            }

            candidates.sort_by(|a, b| {
                match (a.expiry, b.expiry) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    // known expiry before unknown: unbatched stock last
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
                .then_with(|| {
                    self.order
                        .compare((a.quantity, &a.location), (b.quantity, &b.location))
                })
                .then_with(|| a.batch.cmp(&b.batch))
            });

            let mut taken: BTreeMap<StockLocationReference, (i64, BTreeMap<Uuid, i64>)> =
                BTreeMap::new();
            for candidate in candidates {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(candidate.quantity);
                let slot = taken.entry(candidate.location).or_default();
                slot.0 += take;
                if let Some(batch_id) = candidate.batch {
                    *slot.1.entry(batch_id).or_default() += take;
                }
                remaining -= take;
            }

            for (location, (quantity, batches)) in taken {
                allocation.push(ProductQuantityLocation {
                    product_id: demand.product_id,
                    location,
                    quantity,
                    batches: if batches.is_empty() {
                        None
                    } else {
                        Some(BatchQuantityMap::new(batches))
                    },
                });
            }

            if remaining > 0 {
                missing.insert(demand.product_id, remaining);
            }
        }

        if missing.is_empty() {
            Ok(AllocationOutcome::Complete(allocation))
        } else {
            Ok(AllocationOutcome::Short(Shortage {
                allocation,
                missing,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ProductQuantity, StockArea};

    use crate::stores::InMemoryStockStore;

    struct FixedStock(Vec<ProductQuantityLocation>);

    #[async_trait]
    impl PickableStockProvider for FixedStock {
        async fn available_to_pick(
            &self,
            product_ids: &[Uuid],
            _area: &StockArea,
        ) -> EngineResult<Vec<ProductQuantityLocation>> {
            Ok(self
                .0
                .iter()
                .filter(|entry| product_ids.contains(&entry.product_id))
                .cloned()
                .collect())
        }
    }

    fn store_with_expiries(expiries: &[(Uuid, NaiveDate)]) -> Arc<InMemoryStockStore> {
        let store = InMemoryStockStore::new();
        for (batch_id, date) in expiries {
            store.seed_batch_expiry(*batch_id, *date).unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn oldest_batch_is_allocated_first() {
        let product = Uuid::new_v4();
        let bin = StockLocationReference::BinLocation(Uuid::new_v4());
        let old_batch = Uuid::new_v4();
        let fresh_batch = Uuid::new_v4();
        let today = Utc::now().date_naive();

        let store = store_with_expiries(&[
            (old_batch, today + Duration::days(30)),
            (fresh_batch, today + Duration::days(300)),
        ]);
        let stock = FixedStock(vec![ProductQuantityLocation::with_batches(
            product,
            bin,
            10,
            [(old_batch, 4), (fresh_batch, 6)].into_iter().collect(),
        )]);

        let strategy = ShelfLifeBatchStrategy::new(store, AllocationOrder::LargestStockFirst);
        let request = PickingRequest::new(
            vec![ProductQuantity::new(product, 5)],
            StockArea::Everywhere,
        );
        let outcome = strategy.allocate(&request, &stock).await.unwrap();

        match outcome {
            AllocationOutcome::Complete(allocation) => {
                assert_eq!(allocation.len(), 1);
                let batches = allocation[0].batches.as_ref().unwrap();
                assert_eq!(batches.get(old_batch), 4);
                assert_eq!(batches.get(fresh_batch), 1);
            }
            AllocationOutcome::Short(_) => panic!("expected a complete allocation"),
        }
    }

    #[tokio::test]
    async fn min_shelf_life_excludes_short_dated_batches() {
        let product = Uuid::new_v4();
        let bin = StockLocationReference::BinLocation(Uuid::new_v4());
        let short_dated = Uuid::new_v4();
        let long_dated = Uuid::new_v4();
        let today = Utc::now().date_naive();

        let store = store_with_expiries(&[
            (short_dated, today + Duration::days(5)),
            (long_dated, today + Duration::days(120)),
        ]);
        // 3 units short-dated, 4 long-dated, 5 unbatched
        let stock = FixedStock(vec![ProductQuantityLocation::with_batches(
            product,
            bin,
            12,
            [(short_dated, 3), (long_dated, 4)].into_iter().collect(),
        )]);

        let strategy = ShelfLifeBatchStrategy::new(store, AllocationOrder::LargestStockFirst);
        let request = PickingRequest::new(
            vec![ProductQuantity::new(product, 6)],
            StockArea::Everywhere,
        )
        .with_min_shelf_life([(product, 30)].into_iter().collect());
        let outcome = strategy.allocate(&request, &stock).await.unwrap();

        // only the long-dated batch qualifies: 4 of 6
        match outcome {
            AllocationOutcome::Short(shortage) => {
                assert_eq!(shortage.missing.get(&product), Some(&2));
                assert_eq!(
                    shortage.allocation[0].batches.as_ref().unwrap().get(long_dated),
                    4
                );
            }
            AllocationOutcome::Complete(_) => panic!("expected a shortage"),
        }
    }

    #[tokio::test]
    async fn unbatched_remainder_is_used_last() {
        let product = Uuid::new_v4();
        let bin = StockLocationReference::BinLocation(Uuid::new_v4());
        let batch = Uuid::new_v4();
        let today = Utc::now().date_naive();

        let store = store_with_expiries(&[(batch, today + Duration::days(60))]);
        // 4 batched, 6 unbatched
        let stock = FixedStock(vec![ProductQuantityLocation::with_batches(
            product,
            bin,
            10,
            [(batch, 4)].into_iter().collect(),
        )]);

        let strategy = ShelfLifeBatchStrategy::new(store, AllocationOrder::LargestStockFirst);
        let request = PickingRequest::new(
            vec![ProductQuantity::new(product, 7)],
            StockArea::Everywhere,
        );
        let outcome = strategy.allocate(&request, &stock).await.unwrap();

        match outcome {
            AllocationOutcome::Complete(allocation) => {
                assert_eq!(allocation.len(), 1);
                assert_eq!(allocation[0].quantity, 7);
                // batch first, remainder covers the rest
                assert_eq!(allocation[0].batches.as_ref().unwrap().get(batch), 4);
                assert_eq!(allocation[0].unbatched_remainder(), 3);
            }
            AllocationOutcome::Short(_) => panic!("expected a complete allocation"),
        }
    }
}
