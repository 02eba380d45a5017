//! Stock location references
//!
//! A `StockLocationReference` identifies one physical or logical place where
//! stock can sit. It is used as a grouping key in the quantity-location
//! multiset, so it derives `Hash`, `Eq` and `Ord` with stable semantics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reference to a physical or logical stock location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case", tag = "location_type", content = "location_id")]
pub enum StockLocationReference {
    /// The default (unbinned) area of a warehouse.
    Warehouse(Uuid),
    /// A bin location inside a warehouse.
    BinLocation(Uuid),
    /// A stock container (e.g. a picking trolley or delivery box).
    Container(Uuid),
    /// Stock still attached to an inbound goods receipt.
    GoodsReceipt(Uuid),
    /// Stock expected from an open supplier order.
    SupplierOrder(Uuid),
}

impl StockLocationReference {
    /// Stable kind tag, also used as the persisted discriminator column.
    pub fn kind(&self) -> &'static str {
        match self {
            StockLocationReference::Warehouse(_) => "warehouse",
            StockLocationReference::BinLocation(_) => "bin_location",
            StockLocationReference::Container(_) => "container",
            StockLocationReference::GoodsReceipt(_) => "goods_receipt",
            StockLocationReference::SupplierOrder(_) => "supplier_order",
        }
    }

    /// The id of the referenced location entity.
    pub fn location_id(&self) -> Uuid {
        match self {
            StockLocationReference::Warehouse(id)
            | StockLocationReference::BinLocation(id)
            | StockLocationReference::Container(id)
            | StockLocationReference::GoodsReceipt(id)
            | StockLocationReference::SupplierOrder(id) => *id,
        }
    }

    /// Reconstruct a reference from its persisted kind tag and id.
    pub fn from_kind(kind: &str, location_id: Uuid) -> Result<Self, String> {
        match kind {
            "warehouse" => Ok(StockLocationReference::Warehouse(location_id)),
            "bin_location" => Ok(StockLocationReference::BinLocation(location_id)),
            "container" => Ok(StockLocationReference::Container(location_id)),
            "goods_receipt" => Ok(StockLocationReference::GoodsReceipt(location_id)),
            "supplier_order" => Ok(StockLocationReference::SupplierOrder(location_id)),
            other => Err(format!("unknown stock location kind: {other}")),
        }
    }

    /// The ordered `(column, value)` pairs a store persists for this
    /// reference.
    pub fn storage_fields(&self) -> [(&'static str, String); 2] {
        [
            ("location_type", self.kind().to_string()),
            ("location_id", self.location_id().to_string()),
        ]
    }
}

impl std::fmt::Display for StockLocationReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.location_id())
    }
}
