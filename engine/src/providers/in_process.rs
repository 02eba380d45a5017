//! In-process reservation ledger
//!
//! During one logical operation (one reserve call spanning several
//! deliveries, or a speculative planning pass), quantities allocated earlier
//! must be treated as unavailable before they are durably persisted. The
//! ledger is an explicit value created at the start of the bounded operation
//! and discarded at the end, never shared mutable state on a long-lived
//! service. Recording into a ledger whose scope was not activated is a caller
//! bug and fails loudly.

use async_trait::async_trait;
use shared::{multiset, ProductQuantityLocation, StockArea};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::providers::PickableStockProvider;

/// Caller-scoped accumulator of quantities reserved within one bounded unit
/// of work.
#[derive(Debug, Default)]
pub struct InProcessReservationLedger {
    active: bool,
    reserved: Vec<ProductQuantityLocation>,
}

impl InProcessReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the ledger for one bounded unit of work.
    pub fn begin_scope(&mut self) -> EngineResult<()> {
        if self.active {
            return Err(EngineError::Internal(
                "in-process reservation ledger scope is already active".into(),
            ));
        }
        self.active = true;
        Ok(())
    }

    /// Deactivate the ledger and drain its accumulated quantities.
    pub fn finish_scope(&mut self) -> Vec<ProductQuantityLocation> {
        self.active = false;
        std::mem::take(&mut self.reserved)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record quantities reserved within the active scope.
    pub fn add(&mut self, allocation: &[ProductQuantityLocation]) -> EngineResult<()> {
        if !self.active {
            return Err(EngineError::LedgerNotActive);
        }
        self.reserved = multiset::add(&self.reserved, allocation);
        Ok(())
    }

    /// Quantities reserved so far within the active scope.
    pub fn reserved(&self) -> &[ProductQuantityLocation] {
        &self.reserved
    }
}

/// Decorator subtracting the ledger's accumulated quantities from the wrapped
/// provider's result. Outside an active scope it is a pure pass-through.
pub struct InProcessReservationProvider<'a, P> {
    inner: &'a P,
    ledger: &'a InProcessReservationLedger,
    batch_tracking: bool,
}

impl<'a, P> InProcessReservationProvider<'a, P> {
    pub fn new(inner: &'a P, ledger: &'a InProcessReservationLedger, batch_tracking: bool) -> Self {
        Self {
            inner,
            ledger,
            batch_tracking,
        }
    }
}

#[async_trait]
impl<'a, P> PickableStockProvider for InProcessReservationProvider<'a, P>
where
    P: PickableStockProvider,
{
    async fn available_to_pick(
        &self,
        product_ids: &[Uuid],
        area: &StockArea,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        let available = self.inner.available_to_pick(product_ids, area).await?;
        if !self.ledger.is_active() || self.ledger.reserved().is_empty() {
            return Ok(available);
        }
        let net = if self.batch_tracking {
            multiset::remove_matching(&available, self.ledger.reserved())
        } else {
            multiset::remove_matching_ignoring_batches(&available, self.ledger.reserved())
        };
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_outside_scope_fails_loudly() {
        let mut ledger = InProcessReservationLedger::new();
        let result = ledger.add(&[]);
        assert!(matches!(result, Err(EngineError::LedgerNotActive)));
    }

    #[test]
    fn finish_scope_drains_and_deactivates() {
        let mut ledger = InProcessReservationLedger::new();
        ledger.begin_scope().unwrap();
        ledger
            .add(&[ProductQuantityLocation::new(
                Uuid::new_v4(),
                shared::StockLocationReference::Warehouse(Uuid::new_v4()),
                3,
            )])
            .unwrap();
        let drained = ledger.finish_scope();
        assert_eq!(drained.len(), 1);
        assert!(!ledger.is_active());
        assert!(ledger.add(&[]).is_err());
    }

    #[test]
    fn reactivating_an_active_scope_is_rejected() {
        let mut ledger = InProcessReservationLedger::new();
        ledger.begin_scope().unwrap();
        assert!(ledger.begin_scope().is_err());
    }
}
