//! # Notification Queue
//!
//! In-process notification scheduling for the rental platform: a stable
//! priority queue with a bounded processing set, a dispatch loop with
//! per-attempt timeouts and retry/backoff, and typed message templates.
//! The actual transport lives behind the [`DeliveryClient`] trait.

/// Job value object, templates enum, and order context payload
mod job;
pub use job::*;

/// Priority queue, processing set, and retry accounting
mod queue;
pub use queue::*;

/// Dispatch loop and worker pool
mod dispatcher;
pub use dispatcher::*;

/// Delivery transport seam and its mock
mod delivery;
pub use delivery::*;

/// Typed message templates
pub mod template;
pub use template::TemplateParams;
