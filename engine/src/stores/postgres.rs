//! PostgreSQL stock store
//!
//! Relational implementation of the store traits. Pessimistic locks are
//! taken with `SELECT ... FOR UPDATE` on the exact rows an operation needs;
//! serialization failures and deadlocks (SQLSTATE 40001/40P01) are retried
//! with a small, attempt-scaled backoff.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use shared::{
    validate_reservation, NewStockReservation, ProductQuantityLocation, StockArea, StockEntry,
    StockLocationReference, StockReservation,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::config::{DatabaseConfig, TransactionConfig};
use crate::error::{EngineError, EngineResult};
use crate::stores::{StockFilter, StockStore, StockTxn};

/// PostgreSQL implementation of [`StockStore`].
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    transaction: TransactionConfig,
}

/// One open database transaction.
pub struct PostgresStockTxn {
    tx: Transaction<'static, Postgres>,
}

#[derive(Debug, FromRow)]
struct StockRow {
    id: Uuid,
    product_id: Uuid,
    warehouse_id: Uuid,
    location_type: String,
    location_id: Uuid,
    batch_id: Option<Uuid>,
    quantity: i64,
}

impl StockRow {
    fn into_entry(self) -> EngineResult<StockEntry> {
        let location = StockLocationReference::from_kind(&self.location_type, self.location_id)
            .map_err(EngineError::Internal)?;
        Ok(StockEntry {
            id: self.id,
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            location,
            batch_id: self.batch_id,
            quantity: self.quantity,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    picking_process_id: Uuid,
    product_id: Uuid,
    batch_id: Option<Uuid>,
    location_type: String,
    location_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    position: i32,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> EngineResult<StockReservation> {
        let location = StockLocationReference::from_kind(&self.location_type, self.location_id)
            .map_err(EngineError::Internal)?;
        Ok(StockReservation {
            id: self.id,
            picking_process_id: self.picking_process_id,
            product_id: self.product_id,
            batch_id: self.batch_id,
            location,
            warehouse_id: self.warehouse_id,
            quantity: self.quantity,
            position: self.position,
            created_at: self.created_at,
        })
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &StockFilter) {
    qb.push(" WHERE product_id = ANY(");
    qb.push_bind(filter.product_ids.clone());
    qb.push(")");
    match &filter.area {
        StockArea::Warehouse(id) => {
            qb.push(" AND warehouse_id = ");
            qb.push_bind(*id);
        }
        StockArea::Warehouses(ids) => {
            qb.push(" AND warehouse_id = ANY(");
            qb.push_bind(ids.clone());
            qb.push(")");
        }
        StockArea::Everywhere => {}
    }
    if let Some(location) = &filter.location {
        qb.push(" AND location_type = ");
        qb.push_bind(location.kind());
        qb.push(" AND location_id = ");
        qb.push_bind(location.location_id());
    }
    match filter.batch {
        Some(Some(batch_id)) => {
            qb.push(" AND batch_id = ");
            qb.push_bind(batch_id);
        }
        Some(None) => {
            qb.push(" AND batch_id IS NULL");
        }
        None => {}
    }
}

async fn fetch_stock<'e, E>(
    executor: E,
    filter: &StockFilter,
    lock: bool,
) -> EngineResult<Vec<StockEntry>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut qb = QueryBuilder::new(
        "SELECT id, product_id, warehouse_id, location_type, location_id, batch_id, quantity \
         FROM stock",
    );
    push_filter(&mut qb, filter);
    // Deterministic lock order keeps deadlocks between overlapping
    // reservations rare.
    qb.push(" ORDER BY id");
    if lock {
        qb.push(" FOR UPDATE");
    }
    let rows: Vec<StockRow> = qb.build_query_as().fetch_all(executor).await?;
    rows.into_iter().map(StockRow::into_entry).collect()
}

async fn fetch_reservations<'e, E>(
    executor: E,
    filter: &StockFilter,
) -> EngineResult<Vec<StockReservation>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let mut qb = QueryBuilder::new(
        "SELECT id, picking_process_id, product_id, batch_id, location_type, location_id, \
         warehouse_id, quantity, position, created_at FROM stock_reservations",
    );
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY position");
    let rows: Vec<ReservationRow> = qb.build_query_as().fetch_all(executor).await?;
    rows.into_iter().map(ReservationRow::into_reservation).collect()
}

impl PostgresStockStore {
    pub fn new(pool: PgPool, transaction: TransactionConfig) -> Self {
        Self { pool, transaction }
    }

    /// Create a connection pool from configuration.
    pub async fn connect(
        database: &DatabaseConfig,
        transaction: TransactionConfig,
    ) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .min_connections(database.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&database.url)
            .await?;
        Ok(Self::new(pool, transaction))
    }

    /// Apply the stock schema migrations.
    pub async fn run_migrations(&self) -> EngineResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::Internal(format!("migration failed: {e}")))
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.transaction.retry_backoff_ms * u64::from(attempt);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

#[async_trait]
impl StockTxn for PostgresStockTxn {
    async fn lock_stock(&mut self, filter: &StockFilter) -> EngineResult<Vec<StockEntry>> {
        fetch_stock(&mut *self.tx, filter, true).await
    }

    async fn stock_on_hand(
        &mut self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        let entries = fetch_stock(&mut *self.tx, filter, false).await?;
        Ok(shared::group_stock_entries(&entries))
    }

    async fn reservations_matching(
        &mut self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        fetch_reservations(&mut *self.tx, filter).await
    }

    async fn insert_reservations(
        &mut self,
        rows: &[NewStockReservation],
    ) -> EngineResult<Vec<StockReservation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        for row in rows {
            validate_reservation(row).map_err(|e| EngineError::Validation(e.into()))?;
        }

        let mut qb = QueryBuilder::new(
            "INSERT INTO stock_reservations \
             (picking_process_id, product_id, batch_id, location_type, location_id, \
              warehouse_id, quantity, position) ",
        );
        qb.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.picking_process_id)
                .push_bind(row.product_id)
                .push_bind(row.batch_id)
                .push_bind(row.location.kind())
                .push_bind(row.location.location_id())
                .push_bind(row.warehouse_id)
                .push_bind(row.quantity)
                .push_bind(row.position);
        });
        qb.push(
            " RETURNING id, picking_process_id, product_id, batch_id, location_type, \
             location_id, warehouse_id, quantity, position, created_at",
        );

        let created: Vec<ReservationRow> = qb.build_query_as().fetch_all(&mut *self.tx).await?;
        created
            .into_iter()
            .map(ReservationRow::into_reservation)
            .collect()
    }

    async fn update_reservation_quantity(&mut self, id: Uuid, quantity: i64) -> EngineResult<()> {
        if quantity < 0 {
            return Err(EngineError::Validation(
                "reservation quantity must not be negative".into(),
            ));
        }
        let result = sqlx::query("UPDATE stock_reservations SET quantity = $1 WHERE id = $2")
            .bind(quantity)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("stock reservation {id}")));
        }
        Ok(())
    }

    async fn delete_reservation(&mut self, id: Uuid) -> EngineResult<()> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("stock reservation {id}")));
        }
        Ok(())
    }

    async fn delete_reservations_of_process(&mut self, process_id: Uuid) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE picking_process_id = $1")
            .bind(process_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Txn = PostgresStockTxn;

    async fn with_retrying_transaction<R, F>(&self, work: F) -> EngineResult<R>
    where
        R: Send + 'static,
        F: for<'t> Fn(&'t mut Self::Txn) -> BoxFuture<'t, EngineResult<R>> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let tx = self.pool.begin().await?;
            let mut txn = PostgresStockTxn { tx };
            match work(&mut txn).await {
                Ok(value) => match txn.tx.commit().await {
                    Ok(()) => return Ok(value),
                    Err(e) => {
                        let e = EngineError::from(e);
                        if e.is_transient_conflict() {
                            if attempt < self.transaction.max_attempts {
                                tracing::warn!(attempt, "commit conflict, retrying transaction");
                                self.backoff(attempt).await;
                                continue;
                            }
                            return Err(EngineError::RetriesExhausted { attempts: attempt });
                        }
                        return Err(e);
                    }
                },
                Err(e) => {
                    let _ = txn.tx.rollback().await;
                    if e.is_transient_conflict() {
                        if attempt < self.transaction.max_attempts {
                            tracing::warn!(
                                attempt,
                                "serialization conflict, retrying transaction"
                            );
                            self.backoff(attempt).await;
                            continue;
                        }
                        return Err(EngineError::RetriesExhausted { attempts: attempt });
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn stock_on_hand(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<ProductQuantityLocation>> {
        let entries = fetch_stock(&self.pool, filter, false).await?;
        Ok(shared::group_stock_entries(&entries))
    }

    async fn reservations_matching(
        &self,
        filter: &StockFilter,
    ) -> EngineResult<Vec<StockReservation>> {
        fetch_reservations(&self.pool, filter).await
    }

    async fn batch_expiry_dates(
        &self,
        batch_ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, NaiveDate>> {
        if batch_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, NaiveDate)> = sqlx::query_as(
            "SELECT id, best_before_date FROM stock_batches \
             WHERE id = ANY($1) AND best_before_date IS NOT NULL",
        )
        .bind(batch_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
