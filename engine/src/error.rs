//! Error handling for the Warehouse Picking Engine
//!
//! Fatal errors abort the enclosing transaction so that no partial
//! reservation state becomes visible. Transient serialization conflicts are
//! retried inside the store and only surface as `RetriesExhausted`.

use std::collections::HashMap;

use shared::StockLocationReference;
use thiserror::Error;
use uuid::Uuid;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Partial delivery is not allowed for picking process {process_id}")]
    PartialDeliveryNotAllowed {
        process_id: Uuid,
        /// Unsatisfiable quantity per product.
        missing: HashMap<Uuid, i64>,
    },

    #[error(
        "Stock of product {product_id} at {location} is reserved by other picking processes \
         (requested {requested}, free {available})"
    )]
    ReservationConflict {
        product_id: Uuid,
        location: StockLocationReference,
        requested: i64,
        available: i64,
    },

    #[error("Stock movement not possible: {0}")]
    MovementNotPossible(String),

    // Misuse errors
    #[error("In-process reservation ledger used outside an active scope")]
    LedgerNotActive,

    // Storage errors
    #[error("Transaction retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Internal errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error is a transient storage conflict that the store may
    /// retry transparently (serialization failure or deadlock).
    pub fn is_transient_conflict(&self) -> bool {
        match self {
            EngineError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

/// Convenience result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
