use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use notification_queue::{NotificationJob, TemplateStatus};

use crate::availability::{ReservationInterval, find_conflicts, validate_date_range};
use crate::order_types::{
    Actor, AvailabilityCheck, BookingError, CreateOrderRequest, Order, OrderStatus,
};
use crate::state_machine::{OrderStateMachine, StockEffect};

/// A notification produced by a committed transition, waiting to be
/// relayed into the job queue
///
/// Entries are appended in the same critical section as the status write
/// and removed only after a successful enqueue, so the relay is
/// at-least-once; the queue's dedupe key absorbs the duplicates.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Identifier used to acknowledge the entry after enqueue
    pub id: Uuid,
    /// The job to enqueue
    pub job: NotificationJob,
}

/// Trait for order persistence
///
/// The store owns the atomic boundary of the booking flow: availability
/// check plus insert run under one lock, and a transition's status write,
/// stock change, and outbox append commit as a unit.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// Pure availability query for a resource and candidate range
    async fn check_availability(
        &self,
        resource_id: Uuid,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<AvailabilityCheck, BookingError>;

    /// Atomically checks availability and creates a PENDING order
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BookingError>;

    /// Fetches one order
    async fn get_order(&self, order_id: Uuid) -> Result<Order, BookingError>;

    /// Applies a status transition through the state machine; the status
    /// write, stock change, and notification outbox append are atomic
    async fn transition_order(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Order, BookingError>;

    /// Queues a synthetic payment-reminder notification for a PENDING order
    async fn queue_payment_reminder(&self, order_id: Uuid) -> Result<Order, BookingError>;

    /// Attaches the payment-provider session reference to an order
    async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: String,
    ) -> Result<Order, BookingError>;

    /// Seeds the stock level for a package
    async fn set_stock(&self, package_id: Uuid, quantity: u32);

    /// Current stock level for a package
    async fn stock(&self, package_id: Uuid) -> Option<u32>;

    /// Outbox entries not yet relayed into the queue
    async fn pending_notifications(&self) -> Vec<OutboxEntry>;

    /// Removes an outbox entry after it was enqueued
    async fn ack_notification(&self, entry_id: Uuid);
}

struct StoreState {
    orders: HashMap<Uuid, Order>,
    stock: HashMap<Uuid, u32>,
    outbox: Vec<OutboxEntry>,
}

/// In-memory order store; one lock serializes every mutation so the
/// check-then-insert race of concurrent bookings cannot occur
pub struct InMemoryOrderStore {
    state: Mutex<StoreState>,
    tax_rate: f64,
}

impl InMemoryOrderStore {
    /// Creates an empty store applying `tax_rate` to new orders
    pub fn new(tax_rate: f64) -> Self {
        Self {
            state: Mutex::new(StoreState {
                orders: HashMap::new(),
                stock: HashMap::new(),
                outbox: Vec::new(),
            }),
            tax_rate,
        }
    }

    fn active_intervals(state: &StoreState, resource_id: Uuid) -> Vec<ReservationInterval> {
        state
            .orders
            .values()
            .filter(|order| order.resource.id() == resource_id)
            .filter_map(ReservationInterval::from_order)
            .collect()
    }

    fn push_outbox(state: &mut StoreState, order: &Order, template: TemplateStatus) {
        let job = OrderStateMachine::notification(order, template);
        debug!(order_id = %order.id, template = %template, "Outbox entry recorded");
        state.outbox.push(OutboxEntry {
            id: Uuid::new_v4(),
            job,
        });
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn check_availability(
        &self,
        resource_id: Uuid,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<AvailabilityCheck, BookingError> {
        validate_date_range(start, end, Utc::now().date_naive())?;

        let state = self.state.lock().await;
        let intervals = Self::active_intervals(&state, resource_id);
        Ok(find_conflicts(start, end, &intervals))
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BookingError> {
        validate_date_range(
            request.start_date,
            request.end_date,
            Utc::now().date_naive(),
        )?;

        // Check and insert under the same lock; two concurrent bookings
        // for overlapping ranges cannot both pass the check
        let mut state = self.state.lock().await;
        let intervals = Self::active_intervals(&state, request.resource_id);
        let check = find_conflicts(request.start_date, request.end_date, &intervals);
        if !check.available {
            return Err(BookingError::Conflict(check.conflicts));
        }

        let order = Order::new(request, request.resource(), self.tax_rate);
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            resource_id = %order.resource.id(),
            "Order created"
        );
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Order, BookingError> {
        let state = self.state.lock().await;
        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(BookingError::OrderNotFound)
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Order, BookingError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(BookingError::OrderNotFound)?;

        let plan = OrderStateMachine::plan(&order, target, actor)?;

        // Validate the stock effect before touching anything so a failed
        // transition leaves no partial side effect
        let mut updated = order;
        match plan.stock_effect {
            StockEffect::Decrement => {
                let package_id = updated.resource.id();
                let available = state.stock.get(&package_id).copied().unwrap_or(0);
                if available == 0 {
                    return Err(BookingError::OutOfStock);
                }
                state.stock.insert(package_id, available - 1);
                updated.stock_decremented = true;
            }
            StockEffect::Restore => {
                let package_id = updated.resource.id();
                let current = state.stock.get(&package_id).copied().unwrap_or(0);
                state.stock.insert(package_id, current + 1);
                updated.stock_decremented = false;
            }
            StockEffect::None => {}
        }

        let from = updated.status;
        updated.status = plan.target;
        updated.updated_at = Utc::now();

        Self::push_outbox(&mut state, &updated, plan.template);
        state.orders.insert(order_id, updated.clone());

        info!(
            order_id = %order_id,
            %from,
            to = %plan.target,
            actor = ?actor,
            "Order transitioned"
        );
        Ok(updated)
    }

    async fn queue_payment_reminder(&self, order_id: Uuid) -> Result<Order, BookingError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(BookingError::OrderNotFound)?;

        if order.status != OrderStatus::Pending {
            return Err(BookingError::Validation(
                "Payment reminders only apply to pending orders".to_string(),
            ));
        }

        Self::push_outbox(&mut state, &order, TemplateStatus::PaymentReminder);
        Ok(order)
    }

    async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: String,
    ) -> Result<Order, BookingError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(BookingError::OrderNotFound)?;

        order.payment_session_id = Some(session_id);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn set_stock(&self, package_id: Uuid, quantity: u32) {
        let mut state = self.state.lock().await;
        state.stock.insert(package_id, quantity);
    }

    async fn stock(&self, package_id: Uuid) -> Option<u32> {
        let state = self.state.lock().await;
        state.stock.get(&package_id).copied()
    }

    async fn pending_notifications(&self) -> Vec<OutboxEntry> {
        let state = self.state.lock().await;
        state.outbox.clone()
    }

    async fn ack_notification(&self, entry_id: Uuid) {
        let mut state = self.state.lock().await;
        state.outbox.retain(|entry| entry.id != entry_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use std::sync::Arc;

    fn future_date(days: i64) -> NaiveDate {
        Utc::now().date_naive() + Duration::days(days)
    }

    fn request_for(resource: &str, resource_id: Uuid, start: NaiveDate, end: NaiveDate) -> CreateOrderRequest {
        CreateOrderRequest {
            resource_id,
            resource_type: resource.to_string(),
            store_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            customer_name: "Ana Souza".to_string(),
            customer_email: "ana@example.com".to_string(),
            language: None,
            start_date: start,
            end_date: end,
            price_per_day: 59.90,
        }
    }

    #[tokio::test]
    async fn overlapping_booking_is_rejected_with_the_conflicting_order() {
        let store = InMemoryOrderStore::new(0.10);
        let vehicle = Uuid::new_v4();

        let existing = store
            .create_order(&request_for("vehicle", vehicle, future_date(10), future_date(14)))
            .await
            .unwrap();

        let err = store
            .create_order(&request_for("vehicle", vehicle, future_date(13), future_date(15)))
            .await;

        match err {
            Err(BookingError::Conflict(conflicts)) => assert_eq!(conflicts, vec![existing.id]),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn back_to_back_booking_is_accepted() {
        let store = InMemoryOrderStore::new(0.10);
        let vehicle = Uuid::new_v4();

        store
            .create_order(&request_for("vehicle", vehicle, future_date(10), future_date(14)))
            .await
            .unwrap();

        let check = store
            .check_availability(vehicle, future_date(14), future_date(16))
            .await
            .unwrap();
        assert!(check.available);

        store
            .create_order(&request_for("vehicle", vehicle, future_date(14), future_date(16)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_orders_release_their_reservation() {
        let store = InMemoryOrderStore::new(0.10);
        let vehicle = Uuid::new_v4();

        let order = store
            .create_order(&request_for("vehicle", vehicle, future_date(10), future_date(14)))
            .await
            .unwrap();
        store
            .transition_order(order.id, OrderStatus::Cancelled, Actor::Customer)
            .await
            .unwrap();

        let check = store
            .check_availability(vehicle, future_date(10), future_date(14))
            .await
            .unwrap();
        assert!(check.available);
    }

    #[tokio::test]
    async fn concurrent_overlapping_bookings_cannot_both_succeed() {
        let store = Arc::new(InMemoryOrderStore::new(0.10));
        let vehicle = Uuid::new_v4();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_order(&request_for("vehicle", vehicle, future_date(10), future_date(14)))
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_order(&request_for("vehicle", vehicle, future_date(12), future_date(16)))
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn transition_commits_status_and_exactly_one_outbox_entry() {
        let store = InMemoryOrderStore::new(0.10);
        let order = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(10),
                future_date(14),
            ))
            .await
            .unwrap();

        let updated = store
            .transition_order(order.id, OrderStatus::Confirmed, Actor::System)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);

        let outbox = store.pending_notifications().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].job.template_status, TemplateStatus::Confirmed);
        assert_eq!(outbox[0].job.payload.order_id, order.id);
        assert_eq!(outbox[0].job.recipient, "ana@example.com");
    }

    #[tokio::test]
    async fn failed_transition_leaves_order_and_outbox_untouched() {
        let store = InMemoryOrderStore::new(0.10);
        let order = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(10),
                future_date(14),
            ))
            .await
            .unwrap();

        let err = store
            .transition_order(order.id, OrderStatus::Completed, Actor::Admin)
            .await;
        assert!(matches!(
            err,
            Err(BookingError::InvalidStateTransition { .. })
        ));

        let unchanged = store.get_order(order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Pending);
        assert!(store.pending_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn confirming_a_package_decrements_stock() {
        let store = InMemoryOrderStore::new(0.10);
        let package = Uuid::new_v4();
        store.set_stock(package, 2).await;

        let order = store
            .create_order(&request_for("package", package, future_date(30), future_date(34)))
            .await
            .unwrap();
        let updated = store
            .transition_order(order.id, OrderStatus::Confirmed, Actor::System)
            .await
            .unwrap();

        assert!(updated.stock_decremented);
        assert_eq!(store.stock(package).await, Some(1));
    }

    #[tokio::test]
    async fn confirming_with_no_stock_fails_without_side_effects() {
        let store = InMemoryOrderStore::new(0.10);
        let package = Uuid::new_v4();
        store.set_stock(package, 0).await;

        let order = store
            .create_order(&request_for("package", package, future_date(30), future_date(34)))
            .await
            .unwrap();
        let err = store
            .transition_order(order.id, OrderStatus::Confirmed, Actor::System)
            .await;

        assert!(matches!(err, Err(BookingError::OutOfStock)));
        let unchanged = store.get_order(order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Pending);
        assert!(store.pending_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_confirmed_package_order_restores_stock() {
        let store = InMemoryOrderStore::new(0.10);
        let package = Uuid::new_v4();
        store.set_stock(package, 1).await;

        let order = store
            .create_order(&request_for("package", package, future_date(30), future_date(34)))
            .await
            .unwrap();
        store
            .transition_order(order.id, OrderStatus::Confirmed, Actor::System)
            .await
            .unwrap();
        assert_eq!(store.stock(package).await, Some(0));

        store
            .transition_order(order.id, OrderStatus::Cancelled, Actor::Admin)
            .await
            .unwrap();
        assert_eq!(store.stock(package).await, Some(1));
    }

    #[tokio::test]
    async fn payment_reminder_queues_without_touching_status() {
        let store = InMemoryOrderStore::new(0.10);
        let order = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(10),
                future_date(14),
            ))
            .await
            .unwrap();

        store.queue_payment_reminder(order.id).await.unwrap();

        let outbox = store.pending_notifications().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(
            outbox[0].job.template_status,
            TemplateStatus::PaymentReminder
        );
        assert_eq!(
            store.get_order(order.id).await.unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn reminder_on_a_confirmed_order_is_rejected() {
        let store = InMemoryOrderStore::new(0.10);
        let order = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(10),
                future_date(14),
            ))
            .await
            .unwrap();
        store
            .transition_order(order.id, OrderStatus::Confirmed, Actor::System)
            .await
            .unwrap();

        assert!(matches!(
            store.queue_payment_reminder(order.id).await,
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn acked_outbox_entries_are_not_drained_again() {
        let store = InMemoryOrderStore::new(0.10);
        let order = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(10),
                future_date(14),
            ))
            .await
            .unwrap();
        store
            .transition_order(order.id, OrderStatus::Confirmed, Actor::System)
            .await
            .unwrap();

        let outbox = store.pending_notifications().await;
        store.ack_notification(outbox[0].id).await;
        assert!(store.pending_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn payment_session_is_attached_to_the_order() {
        let store = InMemoryOrderStore::new(0.10);
        let order = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(10),
                future_date(14),
            ))
            .await
            .unwrap();
        assert_eq!(order.payment_session_id, None);

        let updated = store
            .attach_payment_session(order.id, "cs_test_123".to_string())
            .await
            .unwrap();
        assert_eq!(updated.payment_session_id.as_deref(), Some("cs_test_123"));

        let err = store
            .attach_payment_session(Uuid::new_v4(), "cs_test_456".to_string())
            .await;
        assert!(matches!(err, Err(BookingError::OrderNotFound)));
    }

    #[tokio::test]
    async fn past_start_date_is_rejected() {
        let store = InMemoryOrderStore::new(0.10);
        let err = store
            .create_order(&request_for(
                "vehicle",
                Uuid::new_v4(),
                future_date(-1),
                future_date(3),
            ))
            .await;

        assert!(matches!(err, Err(BookingError::Validation(_))));
    }
}
