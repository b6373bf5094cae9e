use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use booking::{
    Actor, AvailabilityCheck, BookingError, CheckAvailabilityRequest, CreateOrderRequest, Order,
    OrderStatus, OrderStore,
};
use notification_queue::{PriorityJobQueue, QueueStatus};

/// Service tying the order store to the notification queue
///
/// All order mutations flow through here: the store commits the status
/// change together with an outbox entry, and this service relays the
/// outbox into the job queue. Relay failures never undo a committed
/// transition; the entry stays in the outbox and is swept again later.
pub struct BookingService {
    store: Arc<dyn OrderStore>,
    queue: Arc<PriorityJobQueue>,
}

impl BookingService {
    /// Creates the service over a store and the shared job queue
    pub fn new(store: Arc<dyn OrderStore>, queue: Arc<PriorityJobQueue>) -> Self {
        Self { store, queue }
    }

    /// Pure availability query for a candidate booking
    pub async fn check_availability(
        &self,
        request: &CheckAvailabilityRequest,
    ) -> Result<AvailabilityCheck, BookingError> {
        self.store
            .check_availability(request.resource_id, request.start_date, request.end_date)
            .await
    }

    /// Creates a PENDING order after the atomic availability check
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BookingError> {
        self.store.create_order(request).await
    }

    /// Fetches one order
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, BookingError> {
        self.store.get_order(order_id).await
    }

    /// Applies a status transition and relays the resulting notification
    /// into the queue
    pub async fn transition_order(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Order, BookingError> {
        let order = self.store.transition_order(order_id, target, actor).await?;
        self.relay_outbox().await;
        Ok(order)
    }

    /// Queues a synthetic payment-reminder notification for a PENDING order
    pub async fn send_payment_reminder(&self, order_id: Uuid) -> Result<Order, BookingError> {
        let order = self.store.queue_payment_reminder(order_id).await?;
        self.relay_outbox().await;
        Ok(order)
    }

    /// Moves every pending outbox entry into the job queue
    ///
    /// At-least-once: an entry is acknowledged only after the enqueue, and
    /// a duplicate drain of the same entry is absorbed by the queue's
    /// dedupe key. Called after every transition and periodically as a
    /// sweep.
    pub async fn relay_outbox(&self) {
        let entries = self.store.pending_notifications().await;
        if entries.is_empty() {
            return;
        }

        debug!(count = entries.len(), "Relaying notification outbox");
        for entry in entries {
            let job_id = entry.job.id;
            let outcome = self.queue.enqueue(entry.job).await;
            debug!(%job_id, ?outcome, "Outbox entry relayed");
            self.store.ack_notification(entry.id).await;
        }
    }

    /// Attaches the payment-provider session reference to an order
    pub async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: String,
    ) -> Result<Order, BookingError> {
        self.store.attach_payment_session(order_id, session_id).await
    }

    /// Seeds the stock level for a package
    pub async fn set_stock(&self, package_id: Uuid, quantity: u32) {
        self.store.set_stock(package_id, quantity).await;
    }

    /// Read-only queue snapshot for the dashboard
    pub async fn queue_status(&self, limit: usize) -> QueueStatus {
        self.queue.snapshot(limit).await
    }

    /// Validates and parses the API string form of a status
    pub fn parse_status(value: &str) -> Result<OrderStatus, BookingError> {
        OrderStatus::parse(value).ok_or_else(|| {
            warn!(status = value, "Rejected unknown order status");
            BookingError::Validation(format!("Unknown order status: {value}"))
        })
    }
}
