//! Stock and reservation storage
//!
//! The engine talks to storage through the `StockStore`/`StockTxn` pair:
//! typed query methods plus a retrying transactional scope. Two
//! implementations exist: `PostgresStockStore` (relational, pessimistic row
//! locks via `SELECT ... FOR UPDATE`) and `InMemoryStockStore` (embedded,
//! used in tests and lightweight deployments).

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use shared::{
    NewStockReservation, ProductQuantityLocation, StockArea, StockEntry, StockLocationReference,
    StockReservation,
};
use uuid::Uuid;

use crate::error::EngineResult;

pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

/// Row scope for queries and pessimistic locks.
///
/// Locks are taken on exactly the rows a logical operation needs: filtered by
/// product set and area for a reservation, narrowed further to one location
/// (and batch, when batch tracking is active) for a movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockFilter {
    pub product_ids: Vec<Uuid>,
    pub area: StockArea,
    /// Exact location, when the operation targets a single one.
    pub location: Option<StockLocationReference>,
    /// `Some(Some(id))` filters to one batch, `Some(None)` to unbatched rows,
    /// `None` leaves batches unfiltered.
    pub batch: Option<Option<Uuid>>,
}

impl StockFilter {
    pub fn products_in_area(product_ids: Vec<Uuid>, area: StockArea) -> Self {
        Self {
            product_ids,
            area,
            location: None,
            batch: None,
        }
    }

    pub fn at_location(
        product_id: Uuid,
        location: StockLocationReference,
        batch: Option<Option<Uuid>>,
    ) -> Self {
        Self {
            product_ids: vec![product_id],
            area: StockArea::Everywhere,
            location: Some(location),
            batch,
        }
    }
}

/// A transactional view over stock and reservation rows.
///
/// All mutations of reservation rows happen here, inside the transaction
/// whose row lock protects the corresponding stock key.
#[async_trait]
pub trait StockTxn: Send {
    /// Pessimistically lock the matching stock rows and return them. This is
    /// the serialization point between competing picking processes.
    async fn lock_stock(&mut self, filter: &StockFilter) -> EngineResult<Vec<StockEntry>>;

    /// Physical on-hand stock matching the filter, grouped per
    /// (product, location).
    async fn stock_on_hand(
        &mut self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>>;

    /// All reservation rows (any process) matching the filter.
    async fn reservations_matching(
        &mut self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>>;

    /// Bulk-insert reservation rows, returning the created records.
    async fn insert_reservations(
        &mut self,
        rows: &[NewStockReservation],
    ) -> EngineResult<Vec<StockReservation>>;

    /// Set the quantity of one reservation row.
    async fn update_reservation_quantity(&mut self, id: Uuid, quantity: i64) -> EngineResult<()>;

    /// Delete one reservation row.
    async fn delete_reservation(&mut self, id: Uuid) -> EngineResult<()>;

    /// Delete all reservation rows of a process, returning the count.
    async fn delete_reservations_of_process(&mut self, process_id: Uuid) -> EngineResult<u64>;
}

/// Storage engine behind the reservation engine.
///
/// `with_retrying_transaction` re-runs the work closure on transient
/// serialization conflicts; fatal errors roll back and propagate, so no
/// partial reservation state is ever visible outside a transaction.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Txn: StockTxn;

    async fn with_retrying_transaction<R, F>(&self, work: F) -> EngineResult<R>
    where
        R: Send + 'static,
        F: for<'t> Fn(&'t mut Self::Txn) -> BoxFuture<'t, EngineResult<R>> + Send + Sync;

    /// Non-transactional read of physical on-hand stock.
    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>>;

    /// Non-transactional read of reservation rows.
    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>>;

    /// Best-before dates of the given batches, where known.
    async fn batch_expiry_dates(
        &self,
        batch_ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, NaiveDate>>;
}

/// Read access to stock and reservation rows, independent of where the reads
/// run. Stores implement it with pool reads; `SharedTxn` implements it with
/// reads inside an open transaction, so availability computed while rows are
/// locked reflects that same transaction and needs no extra connection.
#[async_trait]
pub trait StockReadSource: Send + Sync {
    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>>;

    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>>;
}

#[async_trait]
impl<R: StockReadSource + ?Sized> StockReadSource for &R {
    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        (**self).stock_on_hand(filter).await
    }

    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        (**self).reservations_matching(filter).await
    }
}

#[async_trait]
impl<S: StockStore> StockReadSource for Arc<S> {
    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        StockStore::stock_on_hand(self.as_ref(), filter).await
    }

    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        StockStore::reservations_matching(self.as_ref(), filter).await
    }
}

/// A transaction behind an async lock, so read-only collaborators can query
/// it while the owner takes it back for writes afterwards.
pub struct SharedTxn<'a, T: StockTxn> {
    inner: tokio::sync::Mutex<&'a mut T>,
}

impl<'a, T: StockTxn> SharedTxn<'a, T> {
    pub fn new(txn: &'a mut T) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(txn),
        }
    }

    pub fn into_inner(self) -> &'a mut T {
        self.inner.into_inner()
    }
}

#[async_trait]
impl<'a, T: StockTxn> StockReadSource for SharedTxn<'a, T> {
    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        self.inner.lock().await.stock_on_hand(filter).await
    }

    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        self.inner.lock().await.reservations_matching(filter).await
    }
}
