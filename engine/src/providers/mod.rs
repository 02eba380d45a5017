//! Pickable stock providers
//!
//! A provider answers "how much of these products can be picked right now in
//! this area". The chain is assembled per operation:
//!
//! `OnHandStockProvider` (physical stock) →
//! `ReservationExcludingProvider` (minus everything promised to any process) →
//! `InProcessReservationProvider` (minus quantities reserved earlier within
//! the same logical operation, before they are durably persisted).
//!
//! Providers read through a `StockReadSource`, so the same chain works over
//! plain store reads and over an open transaction (`SharedTxn`). Inside a
//! reservation the transaction-backed source guarantees availability is
//! computed against the very rows the transaction has locked.

pub mod in_process;
pub mod reservation_excluding;

use async_trait::async_trait;
use shared::{ProductQuantityLocation, StockArea};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::stores::{StockFilter, StockReadSource};

pub use in_process::{InProcessReservationLedger, InProcessReservationProvider};
pub use reservation_excluding::ReservationExcludingProvider;

/// Read-only query capability: currently available-to-pick quantities.
#[async_trait]
pub trait PickableStockProvider: Send + Sync {
    async fn available_to_pick(
        &self,
        product_ids: &[Uuid],
        area: &StockArea,
    ) -> EngineResult<Vec<ProductQuantityLocation>>;
}

/// Base provider: physical on-hand stock, not yet net of any reservations.
pub struct OnHandStockProvider<R> {
    source: R,
}

impl<R> OnHandStockProvider<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<R: StockReadSource> PickableStockProvider for OnHandStockProvider<R> {
    async fn available_to_pick(
        &self,
        product_ids: &[Uuid],
        area: &StockArea,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        self.source
            .stock_on_hand(&StockFilter::products_in_area(
                product_ids.to_vec(),
                area.clone(),
            ))
            .await
    }
}
