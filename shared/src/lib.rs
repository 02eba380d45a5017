//! Shared types and models for the Warehouse Picking Platform
//!
//! This crate contains the pure domain types used by the reservation engine
//! and any other component of the system: stock location references, product
//! quantity collections, reservation records, and the quantity-location
//! multiset arithmetic. No I/O lives here.

pub mod models;
pub mod multiset;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
