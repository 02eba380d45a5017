//! Warehouse Picking Engine
//!
//! In-process inventory reservation and allocation: pickable-stock providers,
//! pluggable picking strategies, and a transactional reservation service over
//! a Postgres or in-memory stock store. The surrounding system supplies
//! picking-process context, profiles, shelf-life policy and stock movement
//! execution through the collaborator traits in [`context`].

pub mod config;
pub mod context;
pub mod error;
pub mod providers;
pub mod services;
pub mod stores;
pub mod strategy;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use services::StockReservationService;
