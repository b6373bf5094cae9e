//! # Booking
//!
//! Core booking domain for the rental platform: the order model, the
//! reservation conflict checker, the order state machine, and the order
//! store that holds the atomic check-then-insert boundary and the
//! notification outbox.

/// Types for orders and booking requests
mod order_types;
pub use order_types::*;

/// Reservation intervals and the conflict checker
mod availability;
pub use availability::*;

/// Legal status transitions and their planned side effects
mod state_machine;
pub use state_machine::*;

/// Order persistence seam and the in-memory store
mod order_store;
pub use order_store::*;
