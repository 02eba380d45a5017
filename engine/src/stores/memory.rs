//! In-memory stock store
//!
//! Embedded implementation of the store traits, used by the test suite and
//! by deployments without a relational database. Transactions are serialized
//! through an async gate; competing callers block there the way they would
//! block on row locks in Postgres, and a caller entering after a commit sees
//! that commit's reservations. This is coarser than row-level locking:
//! transactions over disjoint keys also serialize.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::future::BoxFuture;
use shared::{
    group_stock_entries, validate_reservation, NewStockReservation, ProductQuantityLocation,
    StockEntry, StockReservation,
};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::stores::{StockFilter, StockStore, StockTxn};

#[derive(Debug, Default, Clone)]
struct StoreState {
    stock: Vec<StockEntry>,
    reservations: Vec<StockReservation>,
    batch_expiries: HashMap<Uuid, NaiveDate>,
}

/// In-memory implementation of [`StockStore`].
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<StoreState>>,
    txn_gate: Arc<tokio::sync::Mutex<()>>,
}

/// Transaction over a working copy of the store state. Committed back
/// atomically on success, discarded on error.
pub struct InMemoryStockTxn {
    working: StoreState,
}

fn stock_matches(entry: &StockEntry, filter: &StockFilter) -> bool {
    filter.product_ids.contains(&entry.product_id)
        && filter.area.includes_warehouse(entry.warehouse_id)
        && filter.location.map_or(true, |location| entry.location == location)
        && filter.batch.map_or(true, |batch| entry.batch_id == batch)
}

fn reservation_matches(row: &StockReservation, filter: &StockFilter) -> bool {
    filter.product_ids.contains(&row.product_id)
        && filter.area.includes_warehouse(row.warehouse_id)
        && filter.location.map_or(true, |location| row.location == location)
        && filter.batch.map_or(true, |batch| row.batch_id == batch)
}

fn on_hand(state: &StoreState, filter: &StockFilter) -> Vec<ProductQuantityLocation> {
    let matching: Vec<StockEntry> = state
        .stock
        .iter()
        .filter(|entry| stock_matches(entry, filter))
        .cloned()
        .collect();
    group_stock_entries(&matching)
}

fn reservations(state: &StoreState, filter: &StockFilter) -> Vec<StockReservation> {
    state
        .reservations
        .iter()
        .filter(|row| reservation_matches(row, filter))
        .cloned()
        .collect()
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> EngineResult<std::sync::MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Internal("store state mutex poisoned".into()))
    }

    /// Add a physical stock row.
    pub fn seed_stock(&self, entry: StockEntry) -> EngineResult<()> {
        self.locked()?.stock.push(entry);
        Ok(())
    }

    /// Record the best-before date of a batch.
    pub fn seed_batch_expiry(&self, batch_id: Uuid, best_before: NaiveDate) -> EngineResult<()> {
        self.locked()?.batch_expiries.insert(batch_id, best_before);
        Ok(())
    }

    /// Snapshot of all stock rows.
    pub fn stock_rows(&self) -> EngineResult<Vec<StockEntry>> {
        Ok(self.locked()?.stock.clone())
    }

    /// Snapshot of all reservation rows.
    pub fn reservation_rows(&self) -> EngineResult<Vec<StockReservation>> {
        Ok(self.locked()?.reservations.clone())
    }
}

#[async_trait]
impl StockTxn for InMemoryStockTxn {
    async fn lock_stock(&mut self, filter: &StockFilter) -> EngineResult<Vec<StockEntry>> {
        // The transaction gate already serializes writers; locking is a
        // filtered read here.
        Ok(self
            .working
            .stock
            .iter()
            .filter(|entry| stock_matches(entry, filter))
            .cloned()
            .collect())
    }

    async fn stock_on_hand(
        &mut self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        Ok(on_hand(&self.working, filter))
    }

    async fn reservations_matching(
        &mut self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        Ok(reservations(&self.working, filter))
    }

    async fn insert_reservations(
        &mut self,
        rows: &[NewStockReservation],
    ) -> EngineResult<Vec<StockReservation>> {
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            validate_reservation(row).map_err(|e| EngineError::Validation(e.into()))?;
            let reservation = StockReservation {
                id: Uuid::new_v4(),
                picking_process_id: row.picking_process_id,
                product_id: row.product_id,
                batch_id: row.batch_id,
                location: row.location,
                warehouse_id: row.warehouse_id,
                quantity: row.quantity,
                position: row.position,
                created_at: Utc::now(),
            };
            self.working.reservations.push(reservation.clone());
            created.push(reservation);
        }
        Ok(created)
    }

    async fn update_reservation_quantity(&mut self, id: Uuid, quantity: i64) -> EngineResult<()> {
        if quantity < 0 {
            return Err(EngineError::Validation(
                "reservation quantity must not be negative".into(),
            ));
        }
        let row = self
            .working
            .reservations
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("stock reservation {id}")))?;
        row.quantity = quantity;
        Ok(())
    }

    async fn delete_reservation(&mut self, id: Uuid) -> EngineResult<()> {
        let before = self.working.reservations.len();
        self.working.reservations.retain(|row| row.id != id);
        if self.working.reservations.len() == before {
            return Err(EngineError::NotFound(format!("stock reservation {id}")));
        }
        Ok(())
    }

    async fn delete_reservations_of_process(&mut self, process_id: Uuid) -> EngineResult<u64> {
        let before = self.working.reservations.len();
        self.working
            .reservations
            .retain(|row| row.picking_process_id != process_id);
        Ok((before - self.working.reservations.len()) as u64)
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Txn = InMemoryStockTxn;

    async fn with_retrying_transaction<R, F>(&self, work: F) -> EngineResult<R>
    where
        R: Send + 'static,
        F: for<'t> Fn(&'t mut Self::Txn) -> BoxFuture<'t, EngineResult<R>> + Send + Sync,
    {
        let _gate = self.txn_gate.lock().await;
        let working = self.locked()?.clone();
        let mut txn = InMemoryStockTxn { working };
        let result = work(&mut txn).await?;
        // Commit: the working copy becomes the new committed state. On error
        // the working copy is simply dropped.
        *self.locked()? = txn.working;
        Ok(result)
    }

    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        let state = self.locked()?;
        Ok(on_hand(&state, filter))
    }

    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        let state = self.locked()?;
        Ok(reservations(&state, filter))
    }

    async fn batch_expiry_dates(
        &self,
        batch_ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, NaiveDate>> {
        let state = self.locked()?;
        Ok(batch_ids
            .iter()
            .filter_map(|id| state.batch_expiries.get(id).map(|date| (*id, *date)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{StockArea, StockLocationReference};

    fn entry(product_id: Uuid, warehouse_id: Uuid, quantity: i64) -> StockEntry {
        StockEntry {
            id: Uuid::new_v4(),
            product_id,
            warehouse_id,
            location: StockLocationReference::Warehouse(warehouse_id),
            batch_id: None,
            quantity,
        }
    }

    #[tokio::test]
    async fn failed_transactions_leave_no_trace() {
        let store = InMemoryStockStore::new();
        let process = Uuid::new_v4();
        let product = Uuid::new_v4();
        let warehouse = Uuid::new_v4();

        let result: EngineResult<()> = store
            .with_retrying_transaction(|txn| {
                Box::pin(async move {
                    txn.insert_reservations(&[NewStockReservation {
                        picking_process_id: process,
                        product_id: product,
                        batch_id: None,
                        location: StockLocationReference::Warehouse(warehouse),
                        warehouse_id: warehouse,
                        quantity: 1,
                        position: 1,
                    }])
                    .await?;
                    Err(EngineError::Internal("boom".into()))
                })
            })
            .await;

        assert!(result.is_err());
        assert!(store.reservation_rows().unwrap().is_empty());
    }

    #[tokio::test]
    async fn area_scoping_filters_warehouses() {
        let store = InMemoryStockStore::new();
        let product = Uuid::new_v4();
        let warehouse_a = Uuid::new_v4();
        let warehouse_b = Uuid::new_v4();
        store.seed_stock(entry(product, warehouse_a, 5)).unwrap();
        store.seed_stock(entry(product, warehouse_b, 7)).unwrap();

        let scoped = StockStore::stock_on_hand(
            &store,
            &StockFilter::products_in_area(vec![product], StockArea::Warehouse(warehouse_a)),
        )
        .await
        .unwrap();
        assert_eq!(scoped.iter().map(|e| e.quantity).sum::<i64>(), 5);

        let everywhere = StockStore::stock_on_hand(
            &store,
            &StockFilter::products_in_area(vec![product], StockArea::Everywhere),
        )
        .await
        .unwrap();
        assert_eq!(everywhere.iter().map(|e| e.quantity).sum::<i64>(), 12);
    }
}
