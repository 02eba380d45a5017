//! Reservation-excluding stock provider

use async_trait::async_trait;
use shared::{
    multiset, reservations_to_quantities, ProductQuantityLocation, StockArea,
};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::providers::PickableStockProvider;
use crate::stores::{StockFilter, StockReadSource};

/// Decorator subtracting every persisted reservation (any picking process)
/// from the wrapped provider's result.
///
/// Batch awareness is fixed at construction: when batch tracking is active,
/// the batch-aware `remove_matching` is used; otherwise the legacy variant
/// that ignores batch breakdowns entirely.
pub struct ReservationExcludingProvider<P, R> {
    inner: P,
    source: R,
    batch_tracking: bool,
}

impl<P, R> ReservationExcludingProvider<P, R> {
    pub fn new(inner: P, source: R, batch_tracking: bool) -> Self {
        Self {
            inner,
            source,
            batch_tracking,
        }
    }
}

#[async_trait]
impl<P, R> PickableStockProvider for ReservationExcludingProvider<P, R>
where
    P: PickableStockProvider,
    R: StockReadSource,
{
    async fn available_to_pick(
        &self,
        product_ids: &[Uuid],
        area: &StockArea,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        let physical = self.inner.available_to_pick(product_ids, area).await?;
        let reservation_rows = self
            .source
            .reservations_matching(&StockFilter::products_in_area(
                product_ids.to_vec(),
                area.clone(),
            ))
            .await?;
        let reserved = reservations_to_quantities(&reservation_rows);

        let available = if self.batch_tracking {
            multiset::remove_matching(&physical, &reserved)
        } else {
            multiset::remove_matching_ignoring_batches(&physical, &reserved)
        };
        Ok(available)
    }
}
