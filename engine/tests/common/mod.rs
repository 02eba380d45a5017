//! Shared test fixtures: fake collaborators and seeding helpers around the
//! in-memory stock store.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shared::{
    DeliveryContext, NewStockReservation, PickingProcessContext, PickingProfile, ProductQuantity,
    StockEntry, StockLocationReference, StockMovement, StockReservation,
};
use uuid::Uuid;
use warehouse_picking_engine::context::{
    MovementValidation, PickingContextProvider, PickingProfileProvider, ShelfLifePolicyProvider,
    StockMovementExecutor,
};
use warehouse_picking_engine::error::{EngineError, EngineResult};
use warehouse_picking_engine::stores::InMemoryStockStore;
use warehouse_picking_engine::strategy::PickingStrategy;
use warehouse_picking_engine::StockReservationService;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warehouse_picking_engine=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Context provider serving exactly one picking process.
pub struct FixedContextProvider(pub PickingProcessContext);

#[async_trait]
impl PickingContextProvider for FixedContextProvider {
    async fn picking_process_context(
        &self,
        process_id: Uuid,
    ) -> EngineResult<PickingProcessContext> {
        if process_id != self.0.process_id {
            return Err(EngineError::NotFound(format!("picking process {process_id}")));
        }
        Ok(self.0.clone())
    }
}

/// Profile provider answering every profile id with one fixed policy.
pub struct FixedProfileProvider {
    pub partial_delivery_allowed: bool,
}

#[async_trait]
impl PickingProfileProvider for FixedProfileProvider {
    async fn picking_profile(&self, profile_id: Uuid) -> EngineResult<PickingProfile> {
        Ok(PickingProfile {
            profile_id,
            partial_delivery_allowed: self.partial_delivery_allowed,
        })
    }
}

/// Shelf-life policy provider backed by a fixed per-product map.
#[derive(Default)]
pub struct FixedShelfLifeProvider(pub HashMap<Uuid, i64>);

#[async_trait]
impl ShelfLifePolicyProvider for FixedShelfLifeProvider {
    async fn min_shelf_life_days(
        &self,
        product_ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, i64>> {
        Ok(self
            .0
            .iter()
            .filter(|(id, _)| product_ids.contains(id))
            .map(|(id, days)| (*id, *days))
            .collect())
    }
}

/// Executor recording every movement it is handed; optionally fails every
/// call with a fixed validation message.
#[derive(Default)]
pub struct RecordingMovementExecutor {
    executed: Mutex<Vec<StockMovement>>,
    pub fail_with: Option<String>,
}

impl RecordingMovementExecutor {
    pub fn failing(message: &str) -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn executed(&self) -> Vec<StockMovement> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StockMovementExecutor for RecordingMovementExecutor {
    async fn execute(&self, movement: &StockMovement) -> Result<(), MovementValidation> {
        if let Some(message) = &self.fail_with {
            return Err(MovementValidation(message.clone()));
        }
        self.executed.lock().unwrap().push(movement.clone());
        Ok(())
    }
}

pub fn stock_entry(
    product_id: Uuid,
    warehouse_id: Uuid,
    location: StockLocationReference,
    batch_id: Option<Uuid>,
    quantity: i64,
) -> StockEntry {
    StockEntry {
        id: Uuid::new_v4(),
        product_id,
        warehouse_id,
        location,
        batch_id,
        quantity,
    }
}

pub fn delivery(line_items: Vec<ProductQuantity>) -> DeliveryContext {
    DeliveryContext {
        delivery_id: Uuid::new_v4(),
        line_items,
        container_stock: Vec::new(),
    }
}

pub fn process_context(
    warehouse_id: Uuid,
    deliveries: Vec<DeliveryContext>,
) -> PickingProcessContext {
    PickingProcessContext {
        process_id: Uuid::new_v4(),
        warehouse_id,
        deliveries,
        pre_collect_stock: Vec::new(),
    }
}

/// Wire a service over the in-memory store with fixed collaborators.
pub fn build_service(
    store: Arc<InMemoryStockStore>,
    context: PickingProcessContext,
    partial_delivery_allowed: bool,
    shelf_life: HashMap<Uuid, i64>,
    executor: Arc<RecordingMovementExecutor>,
    strategy: Arc<dyn PickingStrategy>,
    batch_tracking: bool,
) -> StockReservationService<InMemoryStockStore> {
    init_tracing();
    StockReservationService::new(
        store,
        Arc::new(FixedContextProvider(context)),
        Arc::new(FixedProfileProvider {
            partial_delivery_allowed,
        }),
        Arc::new(FixedShelfLifeProvider(shelf_life)),
        executor,
        strategy,
        batch_tracking,
    )
}

/// Insert a reservation row directly, bypassing the service.
pub async fn insert_reservation(
    store: &InMemoryStockStore,
    row: NewStockReservation,
) -> StockReservation {
    use warehouse_picking_engine::stores::{StockStore, StockTxn};

    store
        .with_retrying_transaction(|txn| {
            let row = row.clone();
            Box::pin(async move {
                let mut created = txn.insert_reservations(std::slice::from_ref(&row)).await?;
                Ok(created.remove(0))
            })
        })
        .await
        .expect("inserting a reservation row")
}
