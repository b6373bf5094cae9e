use chrono::NaiveDate;
use uuid::Uuid;

use crate::order_types::{AvailabilityCheck, BookingError, Order};

/// One active reservation on a resource, derived from an order
///
/// Intervals are half-open `[start, end)`, so a booking that starts the
/// day another ends does not conflict with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInterval {
    /// Resource the reservation holds
    pub resource_id: Uuid,
    /// First reserved day (inclusive)
    pub start: NaiveDate,
    /// Day the resource becomes free again (exclusive)
    pub end: NaiveDate,
    /// Order that owns the reservation
    pub order_id: Uuid,
}

impl ReservationInterval {
    /// The interval an order holds while its status keeps the reservation
    /// active; None once the order has left the active status set
    pub fn from_order(order: &Order) -> Option<ReservationInterval> {
        if !order.status.holds_reservation() {
            return None;
        }
        Some(ReservationInterval {
            resource_id: order.resource.id(),
            start: order.start_date,
            end: order.end_date,
            order_id: order.id,
        })
    }
}

/// Validates a candidate booking range: the end must come after the start
/// and the start must not lie in the past (same-day starts are allowed)
pub fn validate_date_range(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<(), BookingError> {
    if start >= end {
        return Err(BookingError::Validation(
            "End date must be after start date".to_string(),
        ));
    }
    if start < today {
        return Err(BookingError::Validation(
            "Start date is in the past".to_string(),
        ));
    }
    Ok(())
}

/// Tests a candidate `[start, end)` range against the active reservations
/// of one resource and collects every overlapping order
///
/// Two half-open intervals `[s1, e1)` and `[s2, e2)` overlap iff
/// `s1 < e2 && s2 < e1`. Side-effect free; the check-then-insert
/// combination is serialized by the order store.
pub fn find_conflicts(
    start: NaiveDate,
    end: NaiveDate,
    active: &[ReservationInterval],
) -> AvailabilityCheck {
    let conflicts: Vec<Uuid> = active
        .iter()
        .filter(|interval| start < interval.end && interval.start < end)
        .map(|interval| interval.order_id)
        .collect();

    AvailabilityCheck {
        available: conflicts.is_empty(),
        conflicts,
    }
}
