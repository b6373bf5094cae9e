//! # Web Handlers for the Rental Booking API
//!
//! This crate provides the HTTP handlers for the booking, order
//! transition, and queue status endpoints, plus the service glue that
//! relays the notification outbox into the job queue.

/// Service tying the order store to the notification queue
mod booking_service;
pub use booking_service::*;

/// Handlers for availability checks and order creation
mod booking_handlers;
pub use booking_handlers::*;

/// Handlers for order fetch, transition, and payment reminders
mod order_handlers;
pub use order_handlers::*;

/// Handler for the dashboard queue snapshot
mod queue_handlers;
pub use queue_handlers::*;
