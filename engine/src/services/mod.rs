//! Engine services

pub mod reservation;

pub use reservation::StockReservationService;
