//! Validation utilities for the Warehouse Picking Platform
//!
//! Boundary checks applied before quantities are handed to a store or a
//! stock movement. Multiset arithmetic itself is free to produce negative
//! intermediates; these checks guard the edges.

use crate::models::{NewStockReservation, ProductQuantity, ProductQuantityLocation};

/// Validate a quantity handed to storage or a movement (units, never
/// fractional, never negative).
pub fn validate_storage_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Quantity handed to storage must not be negative");
    }
    Ok(())
}

/// Validate a movement quantity (must move at least one unit).
pub fn validate_movement_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Movement quantity must be positive");
    }
    Ok(())
}

/// Validate demanded quantities (non-negative integers).
pub fn validate_demand(demand: &[ProductQuantity]) -> Result<(), &'static str> {
    if demand.iter().any(|d| d.quantity < 0) {
        return Err("Demand quantities must not be negative");
    }
    Ok(())
}

/// Validate a reservation row before insertion.
pub fn validate_reservation(row: &NewStockReservation) -> Result<(), &'static str> {
    validate_storage_quantity(row.quantity)?;
    if row.position < 1 {
        return Err("Reservation positions start at 1");
    }
    Ok(())
}

/// Validate that an allocation entry is storable: non-negative total and
/// non-negative batch quantities.
pub fn validate_allocation_entry(entry: &ProductQuantityLocation) -> Result<(), &'static str> {
    validate_storage_quantity(entry.quantity)?;
    if let Some(batches) = &entry.batches {
        if batches.iter().any(|(_, quantity)| quantity < 0) {
            return Err("Batch quantities handed to storage must not be negative");
        }
        if batches.total() > entry.quantity {
            return Err("Batch quantities must not exceed the entry total");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StockLocationReference;
    use uuid::Uuid;

    #[test]
    fn negative_storage_quantity_is_rejected() {
        assert!(validate_storage_quantity(-1).is_err());
        assert!(validate_storage_quantity(0).is_ok());
    }

    #[test]
    fn zero_movement_is_rejected() {
        assert!(validate_movement_quantity(0).is_err());
        assert!(validate_movement_quantity(1).is_ok());
    }

    #[test]
    fn reservation_positions_start_at_one() {
        let row = NewStockReservation {
            picking_process_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            batch_id: None,
            location: StockLocationReference::Warehouse(Uuid::new_v4()),
            warehouse_id: Uuid::new_v4(),
            quantity: 1,
            position: 0,
        };
        assert!(validate_reservation(&row).is_err());
    }

    #[test]
    fn over_batched_allocation_entry_is_rejected() {
        let entry = ProductQuantityLocation::with_batches(
            Uuid::new_v4(),
            StockLocationReference::BinLocation(Uuid::new_v4()),
            3,
            [(Uuid::new_v4(), 5)].into_iter().collect(),
        );
        assert!(validate_allocation_entry(&entry).is_err());
    }
}
