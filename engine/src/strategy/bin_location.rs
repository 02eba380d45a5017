//! Bin-location picking strategy

use std::collections::HashMap;

use async_trait::async_trait;
use shared::{PickingRequest, ProductQuantityLocation};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::providers::PickableStockProvider;
use crate::strategy::{AllocationOrder, AllocationOutcome, PickingStrategy, Shortage};

/// Warehouse/bin-location-aware strategy without batch awareness.
///
/// Visits a product's locations in the configured [`AllocationOrder`] and
/// takes greedily until demand is met.
pub struct BinLocationStrategy {
    order: AllocationOrder,
}

impl BinLocationStrategy {
    pub fn new(order: AllocationOrder) -> Self {
        Self { order }
    }
}

#[async_trait]
impl PickingStrategy for BinLocationStrategy {
    async fn allocate(
        &self,
        request: &PickingRequest,
        stock: &dyn PickableStockProvider,
    ) -> EngineResult<AllocationOutcome> {
        let product_ids = request.product_ids();
        let available = stock.available_to_pick(&product_ids, &request.area).await?;

        let mut allocation: Vec<ProductQuantityLocation> = Vec::new();
        let mut missing: HashMap<Uuid, i64> = HashMap::new();

        for demand in &request.demand {
            let mut remaining = demand.quantity;
            if remaining <= 0 {
                continue;
            }

            let mut candidates: Vec<&ProductQuantityLocation> = available
                .iter()
                .filter(|entry| entry.product_id == demand.product_id && entry.quantity > 0)
                .collect();
            candidates.sort_by(|a, b| {
                self.order
                    .compare((a.quantity, &a.location), (b.quantity, &b.location))
            });

            for candidate in candidates {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(candidate.quantity);
                allocation.push(ProductQuantityLocation::new(
                    demand.product_id,
                    candidate.location,
                    take,
                ));
                remaining -= take;
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
