//! Stock reservation service
//!
//! The central write path of the engine: reserving stock for a picking
//! process, clearing those reservations, and moving reserved or free stock
//! out of a location. Every operation runs inside one retrying transaction
//! with pessimistic locks on the stock rows it touches, so competing picking
//! processes are serialized per stock key and the reservation conservation
//! invariant holds at all times.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use shared::{
    validation, NewStockReservation, PickedItem, PickingProcessContext, PickingRequest,
    ProductQuantity, ProductQuantityLocation, StockArea, StockLocationReference, StockMovement,
    StockReservation,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{
    PickingContextProvider, PickingProfileProvider, ShelfLifePolicyProvider, StockMovementExecutor,
};
use crate::error::{EngineError, EngineResult};
use crate::providers::{
    InProcessReservationLedger, InProcessReservationProvider, OnHandStockProvider,
    ReservationExcludingProvider,
};
use crate::stores::{SharedTxn, StockFilter, StockStore, StockTxn};
use crate::strategy::{AllocationOutcome, PickingStrategy};

/// Reserves, clears and releases stock on behalf of picking processes.
///
/// Cheap to clone; all collaborators sit behind `Arc`.
pub struct StockReservationService<S> {
    store: Arc<S>,
    context_provider: Arc<dyn PickingContextProvider>,
    profile_provider: Arc<dyn PickingProfileProvider>,
    shelf_life_provider: Arc<dyn ShelfLifePolicyProvider>,
    movement_executor: Arc<dyn StockMovementExecutor>,
    strategy: Arc<dyn PickingStrategy>,
    batch_tracking: bool,
}

impl<S> Clone for StockReservationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            context_provider: Arc::clone(&self.context_provider),
            profile_provider: Arc::clone(&self.profile_provider),
            shelf_life_provider: Arc::clone(&self.shelf_life_provider),
            movement_executor: Arc::clone(&self.movement_executor),
            strategy: Arc::clone(&self.strategy),
            batch_tracking: self.batch_tracking,
        }
    }
}

impl<S: StockStore + 'static> StockReservationService<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        context_provider: Arc<dyn PickingContextProvider>,
        profile_provider: Arc<dyn PickingProfileProvider>,
        shelf_life_provider: Arc<dyn ShelfLifePolicyProvider>,
        movement_executor: Arc<dyn StockMovementExecutor>,
        strategy: Arc<dyn PickingStrategy>,
        batch_tracking: bool,
    ) -> Self {
        Self {
            store,
            context_provider,
            profile_provider,
            shelf_life_provider,
            movement_executor,
            strategy,
            batch_tracking,
        }
    }

    /// Reserve stock for every delivery of a picking process.
    ///
    /// Demand is computed per delivery (line items minus stock already in the
    /// delivery's containers), with the process's pre-collecting container
    /// contents credited across deliveries in order. All deliveries are
    /// allocated inside one transaction holding locks on the affected stock
    /// rows; an in-process ledger makes earlier deliveries' allocations
    /// unavailable to later ones before anything is persisted.
    ///
    /// A shortage aborts the whole operation with
    /// [`EngineError::PartialDeliveryNotAllowed`] when the picking profile
    /// forbids partial delivery; otherwise the partial allocation is kept.
    pub async fn reserve_stock_for_picking_process(
        &self,
        process_id: Uuid,
        profile_id: Uuid,
    ) -> EngineResult<Vec<StockReservation>> {
        let context = self
            .context_provider
            .picking_process_context(process_id)
            .await?;
        let profile = self.profile_provider.picking_profile(profile_id).await?;

        let demands = delivery_demands(&context);
        let product_ids: Vec<Uuid> = demands
            .iter()
            .flat_map(|(_, demand)| demand.iter().map(|d| d.product_id))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        if product_ids.is_empty() {
            debug!(%process_id, "no outstanding demand, nothing to reserve");
            return Ok(Vec::new());
        }
        for (_, demand) in &demands {
            validation::validate_demand(demand)
                .map_err(|msg| EngineError::Validation(msg.to_string()))?;
        }

        let min_shelf_life = if self.batch_tracking {
            self.shelf_life_provider
                .min_shelf_life_days(&product_ids)
                .await?
        } else {
            HashMap::new()
        };
        let area = StockArea::Warehouse(context.warehouse_id);
        let warehouse_id = context.warehouse_id;

        let created = self
            .store
            .with_retrying_transaction(|txn| {
                // the closure re-runs on transient conflicts, so every
                // attempt gets its own owned copies
                let service = self.clone();
                let demands = demands.clone();
                let product_ids = product_ids.clone();
                let area = area.clone();
                let min_shelf_life = min_shelf_life.clone();
                Box::pin(async move {
                    txn.lock_stock(&StockFilter::products_in_area(
                        product_ids,
                        area.clone(),
                    ))
                    .await?;

                    // availability is read through the same transaction that
                    // holds the row locks
                    let shared = SharedTxn::new(txn);
                    let on_hand = OnHandStockProvider::new(&shared);
                    let excluding = ReservationExcludingProvider::new(
                        on_hand,
                        &shared,
                        service.batch_tracking,
                    );
                    let mut ledger = InProcessReservationLedger::new();
                    ledger.begin_scope()?;

                    let mut rows: Vec<NewStockReservation> = Vec::new();
                    let mut position = 1i32;
                    for (delivery_id, demand) in &demands {
                        if demand.is_empty() {
                            continue;
                        }
                        let request = PickingRequest::new(demand.clone(), area.clone())
                            .with_min_shelf_life(min_shelf_life.clone());
                        let provider = InProcessReservationProvider::new(
                            &excluding,
                            &ledger,
                            service.batch_tracking,
                        );
                        let outcome = service.strategy.allocate(&request, &provider).await?;

                        let allocation = match outcome {
                            AllocationOutcome::Complete(allocation) => allocation,
                            AllocationOutcome::Short(shortage) => {
                                if !profile.partial_delivery_allowed {
                                    warn!(
                                        %process_id,
                                        %delivery_id,
                                        missing_products = shortage.missing.len(),
                                        "shortage with partial delivery forbidden, aborting"
                                    );
                                    return Err(EngineError::PartialDeliveryNotAllowed {
                                        process_id,
                                        missing: shortage.missing,
                                    });
                                }
                                warn!(
                                    %process_id,
                                    %delivery_id,
                                    missing_products = shortage.missing.len(),
                                    "accepting partial allocation"
                                );
                                shortage.allocation
                            }
                        };

                        ledger.add(&allocation)?;
                        rows.extend(reservation_rows(
                            process_id,
                            warehouse_id,
                            &allocation,
                            &mut position,
                        ));
                    }
                    ledger.finish_scope();

                    for row in &rows {
                        validation::validate_reservation(row)
                            .map_err(|msg| EngineError::Validation(msg.to_string()))?;
                    }
                    let txn = shared.into_inner();
                    txn.insert_reservations(&rows).await
                })
            })
            .await?;

        info!(
            %process_id,
            reservations = created.len(),
            "reserved stock for picking process"
        );
        Ok(created)
    }

    /// Delete every reservation held by a picking process. Idempotent;
    /// returns the number of deleted rows.
    pub async fn clear_stock_reservations_of_picking_process(
        &self,
        process_id: Uuid,
    ) -> EngineResult<u64> {
        let deleted = self
            .store
            .with_retrying_transaction(|txn| {
                Box::pin(async move { txn.delete_reservations_of_process(process_id).await })
            })
            .await?;
        info!(%process_id, deleted, "cleared stock reservations of picking process");
        Ok(deleted)
    }

    /// Move picked stock out of its source location, consuming the process's
    /// own reservations at that key.
    ///
    /// Stock reserved by other processes is untouchable: the move fails with
    /// [`EngineError::ReservationConflict`] when it would eat into their
    /// share. Moving free stock the process never reserved is legal. When
    /// physical stock is already below the requested quantity the conflict
    /// checks are skipped and the movement executor raises its own
    /// insufficient-stock error.
    pub async fn move_reserved_or_free_stock(
        &self,
        process_id: Uuid,
        item: &PickedItem,
        destination: StockLocationReference,
    ) -> EngineResult<()> {
        validation::validate_movement_quantity(item.quantity)
            .map_err(|msg| EngineError::Validation(msg.to_string()))?;

        let movement = StockMovement {
            product_id: item.product_id,
            quantity: item.quantity,
            batch_id: item.batch_id,
            source: item.source,
            destination,
        };

        self.store
            .with_retrying_transaction(|txn| {
                let service = self.clone();
                let movement = movement.clone();
                let item = item.clone();
                Box::pin(async move {
                    let batch = service.batch_tracking.then_some(item.batch_id);
                    let filter = StockFilter::at_location(item.product_id, item.source, batch);
                    let stock = txn.lock_stock(&filter).await?;
                    let physical: i64 = stock.iter().map(|entry| entry.quantity).sum();

                    if physical >= item.quantity {
                        let reservations = txn.reservations_matching(&filter).await?;
                        let reserved_by_others: i64 = reservations
                            .iter()
                            .filter(|row| row.picking_process_id != process_id)
                            .map(|row| row.quantity)
                            .sum();
                        let available = physical - reserved_by_others;
                        if item.quantity > available {
                            return Err(EngineError::ReservationConflict {
                                product_id: item.product_id,
                                location: item.source,
                                requested: item.quantity,
                                available,
                            });
                        }

                        let mut own: Vec<StockReservation> = reservations
                            .into_iter()
                            .filter(|row| row.picking_process_id == process_id)
                            .collect();
                        own.sort_by_key(|row| row.position);

                        let mut remaining = item.quantity;
                        for row in own {
                            if remaining == 0 {
                                break;
                            }
                            if row.quantity <= remaining {
                                remaining -= row.quantity;
                                txn.delete_reservation(row.id).await?;
                            } else {
                                txn.update_reservation_quantity(row.id, row.quantity - remaining)
                                    .await?;
                                remaining = 0;
                            }
                        }
                    } else {
                        // the executor owns the canonical insufficient-stock
                        // error for this case
                        debug!(
                            product_id = %item.product_id,
                            physical,
                            requested = item.quantity,
                            "physical stock below requested quantity, delegating to executor"
                        );
                    }

                    service
                        .movement_executor
                        .execute(&movement)
                        .await
                        .map_err(|failure| EngineError::MovementNotPossible(failure.0))
                })
            })
            .await?;

        debug!(
            %process_id,
            product_id = %item.product_id,
            quantity = item.quantity,
            "moved stock out of {}",
            item.source
        );
        Ok(())
    }
}

/// Outstanding demand per delivery: line items minus the delivery's own
/// container stock, then minus the process-wide pre-collect credit, consumed
/// in delivery order. Negative pre-collect quantities increase demand.
fn delivery_demands(context: &PickingProcessContext) -> Vec<(Uuid, Vec<ProductQuantity>)> {
    let mut credit: HashMap<Uuid, i64> = HashMap::new();
    for entry in &context.pre_collect_stock {
        *credit.entry(entry.product_id).or_default() += entry.quantity;
    }

    context
        .deliveries
        .iter()
        .map(|delivery| {
            let mut per_product: BTreeMap<Uuid, i64> = BTreeMap::new();
            for item in &delivery.line_items {
                *per_product.entry(item.product_id).or_default() += item.quantity;
            }
            for stock in &delivery.container_stock {
                *per_product.entry(stock.product_id).or_default() -= stock.quantity;
            }

            let demand = per_product
                .into_iter()
                .filter_map(|(product_id, outstanding)| {
                    // container surplus never refunds the pre-collect credit
                    let mut outstanding = outstanding.max(0);
                    if let Some(credit) = credit.get_mut(&product_id) {
                        let used = (*credit).min(outstanding);
                        outstanding -= used;
                        *credit -= used;
                    }
                    (outstanding > 0).then_some(ProductQuantity::new(product_id, outstanding))
                })
                .collect();
            (delivery.delivery_id, demand)
        })
        .collect()
}

/// One reservation row per allocated (location, batch) tuple, plus one for
/// the unbatched remainder, positions ascending in allocation order.
fn reservation_rows(
    process_id: Uuid,
    warehouse_id: Uuid,
    allocation: &[ProductQuantityLocation],
    position: &mut i32,
) -> Vec<NewStockReservation> {
    let mut rows = Vec::new();
    let mut push = |product_id, location, batch_id, quantity, position: &mut i32| {
        if quantity <= 0 {
            return;
        }
        rows.push(NewStockReservation {
            picking_process_id: process_id,
            product_id,
            batch_id,
            location,
            warehouse_id,
            quantity,
            position: *position,
        });
        *position += 1;
    };

    for entry in allocation {
        if let Some(batches) = &entry.batches {
            for (batch_id, quantity) in batches.iter() {
                push(
                    entry.product_id,
                    entry.location,
                    Some(batch_id),
                    quantity,
                    position,
                );
            }
        }
        push(
            entry.product_id,
            entry.location,
            None,
            entry.unbatched_remainder(),
            position,
        );
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BatchQuantityMap, DeliveryContext};

    fn context(
        deliveries: Vec<DeliveryContext>,
        pre_collect: Vec<ProductQuantityLocation>,
    ) -> PickingProcessContext {
        PickingProcessContext {
            process_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            deliveries,
            pre_collect_stock: pre_collect,
        }
    }

    #[test]
    fn container_stock_reduces_delivery_demand() {
        let product = Uuid::new_v4();
        let container = StockLocationReference::Container(Uuid::new_v4());
        let ctx = context(
            vec![DeliveryContext {
                delivery_id: Uuid::new_v4(),
                line_items: vec![ProductQuantity::new(product, 10)],
                container_stock: vec![ProductQuantityLocation::new(product, container, 4)],
            }],
            vec![],
        );

        let demands = delivery_demands(&ctx);
        assert_eq!(demands[0].1, vec![ProductQuantity::new(product, 6)]);
    }

    #[test]
    fn pre_collect_credit_is_consumed_in_delivery_order() {
        let product = Uuid::new_v4();
        let pre_collect = StockLocationReference::Container(Uuid::new_v4());
        let delivery = |quantity| DeliveryContext {
            delivery_id: Uuid::new_v4(),
            line_items: vec![ProductQuantity::new(product, quantity)],
            container_stock: vec![],
        };
        let ctx = context(
            vec![delivery(5), delivery(5)],
            vec![ProductQuantityLocation::new(product, pre_collect, 7)],
        );

        let demands = delivery_demands(&ctx);
        // first delivery fully covered, second gets the remaining 2 credits
        assert!(demands[0].1.is_empty());
        assert_eq!(demands[1].1, vec![ProductQuantity::new(product, 3)]);
    }

    #[test]
    fn negative_pre_collect_increases_demand() {
        let product = Uuid::new_v4();
        let pre_collect = StockLocationReference::Container(Uuid::new_v4());
        let ctx = context(
            vec![DeliveryContext {
                delivery_id: Uuid::new_v4(),
                line_items: vec![ProductQuantity::new(product, 5)],
                container_stock: vec![],
            }],
            vec![ProductQuantityLocation::new(product, pre_collect, -3)],
        );

        let demands = delivery_demands(&ctx);
        assert_eq!(demands[0].1, vec![ProductQuantity::new(product, 8)]);
    }

    #[test]
    fn container_surplus_does_not_refund_credit() {
        let product = Uuid::new_v4();
        let container = StockLocationReference::Container(Uuid::new_v4());
        let pre_collect = StockLocationReference::Container(Uuid::new_v4());
        let covered = DeliveryContext {
            delivery_id: Uuid::new_v4(),
            line_items: vec![ProductQuantity::new(product, 2)],
            container_stock: vec![ProductQuantityLocation::new(product, container, 6)],
        };
        let open = DeliveryContext {
            delivery_id: Uuid::new_v4(),
            line_items: vec![ProductQuantity::new(product, 5)],
            container_stock: vec![],
        };
        let ctx = context(
            vec![covered, open],
            vec![ProductQuantityLocation::new(product, pre_collect, 1)],
        );

        let demands = delivery_demands(&ctx);
        assert!(demands[0].1.is_empty());
        // only the 1 real credit applies to the second delivery
        assert_eq!(demands[1].1, vec![ProductQuantity::new(product, 4)]);
    }

    #[test]
    fn rows_expand_batches_and_remainder_with_ascending_positions() {
        let process = Uuid::new_v4();
        let warehouse = Uuid::new_v4();
        let product = Uuid::new_v4();
        let bin = StockLocationReference::BinLocation(Uuid::new_v4());
        let batch = Uuid::new_v4();
        let allocation = vec![ProductQuantityLocation::with_batches(
            product,
            bin,
            10,
            [(batch, 4)].into_iter().collect::<BatchQuantityMap>(),
        )];

        let mut position = 1;
        let rows = reservation_rows(process, warehouse, &allocation, &mut position);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].batch_id, Some(batch));
        assert_eq!(rows[0].quantity, 4);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[1].batch_id, None);
        assert_eq!(rows[1].quantity, 6);
        assert_eq!(rows[1].position, 2);
        assert_eq!(position, 3);
    }

    #[test]
    fn zero_quantity_allocations_produce_no_rows() {
        let product = Uuid::new_v4();
        let bin = StockLocationReference::BinLocation(Uuid::new_v4());
        let allocation = vec![ProductQuantityLocation::new(product, bin, 0)];

        let mut position = 1;
        let rows = reservation_rows(Uuid::new_v4(), Uuid::new_v4(), &allocation, &mut position);
        assert!(rows.is_empty());
        assert_eq!(position, 1);
    }
}
