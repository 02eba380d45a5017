//! Domain models for the Warehouse Picking Platform

pub mod location;
pub mod picking;
pub mod quantity;
pub mod reservation;
pub mod stock;

pub use location::*;
pub use picking::*;
pub use quantity::*;
pub use reservation::*;
pub use stock::*;
