use notification_queue::{NotificationJob, OrderContext, TemplateStatus};

use crate::order_types::{Actor, BookingError, Order, OrderStatus};

/// Effect a transition has on package stock; applied atomically with the
/// status write by the order store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// No stock change
    None,
    /// Confirmation consumes one unit of package stock
    Decrement,
    /// Cancellation returns the unit consumed at confirmation
    Restore,
}

/// A validated transition, ready to be applied by the order store
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    /// Status the order moves to
    pub target: OrderStatus,
    /// Stock change coupled to the status write
    pub stock_effect: StockEffect,
    /// Template of the single notification this transition produces
    pub template: TemplateStatus,
}

/// The one place that decides which order-status transitions are legal and
/// which notification each transition produces
///
/// The decision is pure; the order store executes a returned plan inside
/// its critical section so the status write, the stock change, and the
/// outbox append land atomically.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Whether `(from, to)` is in the legal transition table
    pub fn is_legal(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (from, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Ongoing)
                | (Confirmed, Cancelled)
                | (Ongoing, Completed)
                | (Pending, Refunded)
                | (Confirmed, Refunded)
                | (Ongoing, Refunded)
        )
    }

    /// Validates a requested transition and plans its side effects;
    /// the order is left untouched on failure
    pub fn plan(
        order: &Order,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<TransitionPlan, BookingError> {
        if !Self::is_legal(order.status, target) {
            return Err(BookingError::InvalidStateTransition {
                from: order.status,
                to: target,
            });
        }

        if target == OrderStatus::Refunded && actor != Actor::Admin {
            return Err(BookingError::Validation(
                "Refunds are admin-initiated".to_string(),
            ));
        }

        let stock_effect = if target == OrderStatus::Confirmed && order.resource.is_stock_bearing()
        {
            StockEffect::Decrement
        } else if target == OrderStatus::Cancelled && order.stock_decremented {
            StockEffect::Restore
        } else {
            StockEffect::None
        };

        Ok(TransitionPlan {
            target,
            stock_effect,
            template: template_for(target),
        })
    }

    /// Builds the notification a transition (or synthetic event) produces,
    /// parameterized by the order's language preference
    pub fn notification(order: &Order, template: TemplateStatus) -> NotificationJob {
        NotificationJob::new(
            order.customer_email.clone(),
            template,
            order.language,
            OrderContext {
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_name: order.customer_name.clone(),
                start_date: order.start_date,
                end_date: order.end_date,
                total_days: order.total_days,
                total_amount: order.total_amount,
            },
        )
    }
}

/// Maps a target status to the message template its transition sends
fn template_for(target: OrderStatus) -> TemplateStatus {
    match target {
        OrderStatus::Confirmed => TemplateStatus::Confirmed,
        OrderStatus::Ongoing => TemplateStatus::Ongoing,
        OrderStatus::Completed => TemplateStatus::Completed,
        OrderStatus::Cancelled => TemplateStatus::Cancelled,
        // PENDING is never a transition target
        OrderStatus::Pending => TemplateStatus::PaymentReminder,
        OrderStatus::Refunded => TemplateStatus::Refunded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_types::{CreateOrderRequest, ResourceRef};
    use chrono::NaiveDate;
    use uuid::Uuid;

    const ALL_STATUSES: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Ongoing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    fn order_in(status: OrderStatus, resource: ResourceRef) -> Order {
        let request = CreateOrderRequest {
            resource_id: resource.id(),
            resource_type: if resource.is_stock_bearing() {
                "package".to_string()
            } else {
                "vehicle".to_string()
            },
            store_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            customer_name: "Ana Souza".to_string(),
            customer_email: "ana@example.com".to_string(),
            language: None,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            price_per_day: 59.90,
        };
        let mut order = Order::new(&request, resource, 0.10);
        order.status = status;
        order
    }

    #[test]
    fn legal_transitions_match_the_table() {
        use OrderStatus::*;
        let legal = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, Ongoing),
            (Confirmed, Cancelled),
            (Ongoing, Completed),
            (Pending, Refunded),
            (Confirmed, Refunded),
            (Ongoing, Refunded),
        ];

        for from in ALL_STATUSES {
            for to in ALL_STATUSES {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    OrderStateMachine::is_legal(from, to),
                    expected,
                    "({from}, {to})"
                );
            }
        }
    }

    #[test]
    fn illegal_transition_plans_fail_and_identify_the_pair() {
        let order = order_in(OrderStatus::Completed, ResourceRef::Vehicle(Uuid::new_v4()));
        let err = OrderStateMachine::plan(&order, OrderStatus::Confirmed, Actor::Admin);

        match err {
            Err(BookingError::InvalidStateTransition { from, to }) => {
                assert_eq!(from, OrderStatus::Completed);
                assert_eq!(to, OrderStatus::Confirmed);
            }
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }
    }

    #[test]
    fn terminal_statuses_admit_no_transition() {
        for terminal in [
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            for to in ALL_STATUSES {
                assert!(!OrderStateMachine::is_legal(terminal, to), "({terminal}, {to})");
            }
        }
    }

    #[test]
    fn refunds_require_an_admin() {
        let order = order_in(OrderStatus::Confirmed, ResourceRef::Vehicle(Uuid::new_v4()));

        assert!(matches!(
            OrderStateMachine::plan(&order, OrderStatus::Refunded, Actor::Customer),
            Err(BookingError::Validation(_))
        ));
        assert!(OrderStateMachine::plan(&order, OrderStatus::Refunded, Actor::Admin).is_ok());
    }

    #[test]
    fn confirming_a_package_consumes_stock() {
        let order = order_in(OrderStatus::Pending, ResourceRef::Package(Uuid::new_v4()));
        let plan = OrderStateMachine::plan(&order, OrderStatus::Confirmed, Actor::System).unwrap();

        assert_eq!(plan.stock_effect, StockEffect::Decrement);
        assert_eq!(plan.template, TemplateStatus::Confirmed);
    }

    #[test]
    fn confirming_a_vehicle_leaves_stock_alone() {
        let order = order_in(OrderStatus::Pending, ResourceRef::Vehicle(Uuid::new_v4()));
        let plan = OrderStateMachine::plan(&order, OrderStatus::Confirmed, Actor::System).unwrap();

        assert_eq!(plan.stock_effect, StockEffect::None);
    }

    #[test]
    fn cancelling_a_stock_decremented_order_restores_stock() {
        let mut order = order_in(OrderStatus::Confirmed, ResourceRef::Package(Uuid::new_v4()));
        order.stock_decremented = true;
        let plan = OrderStateMachine::plan(&order, OrderStatus::Cancelled, Actor::Admin).unwrap();

        assert_eq!(plan.stock_effect, StockEffect::Restore);
    }

    #[test]
    fn cancelling_a_pending_order_restores_nothing() {
        let order = order_in(OrderStatus::Pending, ResourceRef::Package(Uuid::new_v4()));
        let plan = OrderStateMachine::plan(&order, OrderStatus::Cancelled, Actor::Customer).unwrap();

        assert_eq!(plan.stock_effect, StockEffect::None);
    }

    #[test]
    fn notification_carries_the_order_context_and_language() {
        let order = order_in(OrderStatus::Pending, ResourceRef::Vehicle(Uuid::new_v4()));
        let job = OrderStateMachine::notification(&order, TemplateStatus::Confirmed);

        assert_eq!(job.recipient, order.customer_email);
        assert_eq!(job.language, order.language);
        assert_eq!(job.payload.order_id, order.id);
        assert_eq!(job.payload.order_number, order.order_number);
        assert_eq!(job.payload.total_amount, order.total_amount);
    }
}
