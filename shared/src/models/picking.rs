//! Picking process models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::StockLocationReference;
use super::quantity::{ProductQuantity, ProductQuantityLocation};
use crate::types::StockArea;

/// A request to allocate stock against outstanding demand.
///
/// Created per reservation attempt, immutable, discarded after use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickingRequest {
    /// Outstanding demand per product (non-negative).
    pub demand: Vec<ProductQuantity>,
    /// The area within which demand must be satisfied.
    pub area: StockArea,
    /// Minimum remaining shelf life in days per product. Empty unless
    /// batch-aware picking is active and a policy applies.
    pub min_shelf_life_days: HashMap<Uuid, i64>,
}

impl PickingRequest {
    pub fn new(demand: Vec<ProductQuantity>, area: StockArea) -> Self {
        Self {
            demand,
            area,
            min_shelf_life_days: HashMap::new(),
        }
    }

    pub fn with_min_shelf_life(mut self, min_shelf_life_days: HashMap<Uuid, i64>) -> Self {
        self.min_shelf_life_days = min_shelf_life_days;
        self
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.demand.iter().map(|d| d.product_id).collect()
    }
}

/// One delivery of a picking process, as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryContext {
    pub delivery_id: Uuid,
    /// Demanded quantity per line item.
    pub line_items: Vec<ProductQuantity>,
    /// Stock already physically present in the delivery's containers.
    pub container_stock: Vec<ProductQuantityLocation>,
}

/// Everything the engine needs to know about a picking process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickingProcessContext {
    pub process_id: Uuid,
    pub warehouse_id: Uuid,
    pub deliveries: Vec<DeliveryContext>,
    /// Stock set aside in a pre-collecting container, shared by the whole
    /// process. Negative quantities increase demand.
    pub pre_collect_stock: Vec<ProductQuantityLocation>,
}

/// The policy surface of a picking profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickingProfile {
    pub profile_id: Uuid,
    pub partial_delivery_allowed: bool,
}

/// One picked item to convert from a reservation into a real stock movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickedItem {
    pub product_id: Uuid,
    pub quantity: i64,
    pub batch_id: Option<Uuid>,
    pub source: StockLocationReference,
}

/// A validated stock movement request handed to the movement executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub quantity: i64,
    pub batch_id: Option<Uuid>,
    pub source: StockLocationReference,
    pub destination: StockLocationReference,
}
