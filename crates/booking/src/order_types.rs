use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use notification_queue::Language;

/// Lifecycle status of a rental order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Created by the booking flow, payment not yet captured
    Pending,
    /// Payment captured
    Confirmed,
    /// Vehicle picked up, rental in progress
    Ongoing,
    /// Vehicle dropped off (terminal)
    Completed,
    /// Cancelled by user, admin, or payment timeout (terminal)
    Cancelled,
    /// Refunded by an admin (terminal)
    Refunded,
}

impl OrderStatus {
    /// Whether this status is terminal; a terminal order never changes again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Whether an order in this status holds its reservation interval
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Ongoing
        )
    }

    /// Stable string form used in API payloads and dedupe keys
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Ongoing => "ONGOING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    /// Parses the API string form of a status
    pub fn parse(value: &str) -> Option<OrderStatus> {
        match value {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "ONGOING" => Some(OrderStatus::Ongoing),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "REFUNDED" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the rented resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resource_type", content = "resource_id", rename_all = "lowercase")]
pub enum ResourceRef {
    /// A single vehicle; at most one active reservation per date
    Vehicle(Uuid),
    /// A limited-inventory rental package; stock-bearing
    Package(Uuid),
}

impl ResourceRef {
    /// The underlying resource id
    pub fn id(&self) -> Uuid {
        match self {
            ResourceRef::Vehicle(id) | ResourceRef::Package(id) => *id,
        }
    }

    /// Whether confirming an order on this resource consumes stock
    pub fn is_stock_bearing(&self) -> bool {
        matches!(self, ResourceRef::Package(_))
    }
}

/// Who requested a status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// The customer who owns the order
    Customer,
    /// A back-office administrator
    Admin,
    /// Automated flows (payment webhook, timeout sweeper)
    System,
}

/// A rental order
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Unique identifier for the order
    pub id: Uuid,
    /// Human-readable order number (e.g. `RNT-20240601-3F2A`)
    pub order_number: String,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// The rented vehicle or package
    pub resource: ResourceRef,
    /// Rental store the resource belongs to
    pub store_id: Uuid,
    /// Customer who placed the order
    pub user_id: Uuid,
    /// Customer display name, denormalized for notifications
    pub customer_name: String,
    /// Customer email address, denormalized for notifications
    pub customer_email: String,
    /// Customer language preference for notifications
    pub language: Language,
    /// First rental day (inclusive)
    pub start_date: NaiveDate,
    /// Day the resource is returned (exclusive)
    pub end_date: NaiveDate,
    /// Number of billable days, computed from the date range
    pub total_days: i64,
    /// Price per rental day
    pub price_per_day: f64,
    /// Sum of daily prices
    pub subtotal: f64,
    /// Tax on the subtotal
    pub tax_amount: f64,
    /// Grand total; always `subtotal + tax_amount`
    pub total_amount: f64,
    /// Payment-provider session reference, attached after checkout hand-off
    pub payment_session_id: Option<String>,
    /// Whether confirming this order decremented package stock
    #[serde(skip_serializing)]
    pub stock_decremented: bool,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// When the order was last updated
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new PENDING order, computing the derived money fields
    pub fn new(request: &CreateOrderRequest, resource: ResourceRef, tax_rate: f64) -> Order {
        let now = Utc::now();
        let total_days = (request.end_date - request.start_date).num_days();
        let subtotal = round_money(request.price_per_day * total_days as f64);
        let tax_amount = round_money(subtotal * tax_rate);
        let id = Uuid::new_v4();

        Order {
            id,
            order_number: format_order_number(id, request.start_date),
            status: OrderStatus::Pending,
            resource,
            store_id: request.store_id,
            user_id: request.user_id,
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            language: request.language.unwrap_or_default(),
            start_date: request.start_date,
            end_date: request.end_date,
            total_days,
            price_per_day: request.price_per_day,
            subtotal,
            tax_amount,
            total_amount: round_money(subtotal + tax_amount),
            payment_session_id: None,
            stock_decremented: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Rounds a money amount to cents
fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Derives the human-readable order number from the id and start date
fn format_order_number(id: Uuid, start_date: NaiveDate) -> String {
    let short = id.simple().to_string();
    format!(
        "RNT-{}-{}",
        start_date.format("%Y%m%d"),
        short[..4].to_uppercase()
    )
}

/// Request structure for an availability check
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckAvailabilityRequest {
    /// ID of the vehicle or package to check
    pub resource_id: Uuid,

    /// Kind of resource ("vehicle" or "package")
    #[validate(custom(function = "validate_resource_type"))]
    pub resource_type: String,

    /// First rental day (inclusive)
    pub start_date: NaiveDate,

    /// Day the resource would be returned (exclusive)
    pub end_date: NaiveDate,
}

impl CheckAvailabilityRequest {
    /// The typed resource reference for this request
    pub fn resource(&self) -> ResourceRef {
        resource_ref_from_parts(&self.resource_type, self.resource_id)
    }
}

/// Request structure for creating an order
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// ID of the vehicle or package to rent
    pub resource_id: Uuid,

    /// Kind of resource ("vehicle" or "package")
    #[validate(custom(function = "validate_resource_type"))]
    pub resource_type: String,

    /// Rental store the resource belongs to
    pub store_id: Uuid,

    /// Customer placing the order
    pub user_id: Uuid,

    /// Customer display name
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,

    /// Customer email address
    #[validate(email(message = "A valid customer email is required"))]
    pub customer_email: String,

    /// Customer language preference; defaults to English
    pub language: Option<Language>,

    /// First rental day (inclusive)
    pub start_date: NaiveDate,

    /// Day the resource is returned (exclusive)
    pub end_date: NaiveDate,

    /// Price per rental day
    #[validate(range(min = 0.0, message = "Price per day must not be negative"))]
    pub price_per_day: f64,
}

impl CreateOrderRequest {
    /// The typed resource reference for this request
    pub fn resource(&self) -> ResourceRef {
        resource_ref_from_parts(&self.resource_type, self.resource_id)
    }
}

/// Request structure for an order status transition
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransitionRequest {
    /// Target status in API string form
    #[validate(custom(function = "validate_order_status"))]
    pub status: String,

    /// Who is requesting the transition; defaults to system
    pub actor: Option<Actor>,
}

/// Request structure for attaching a payment-provider session to an order
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttachPaymentSessionRequest {
    /// Opaque session reference issued by the payment provider
    #[validate(length(min = 1, message = "Session id is required"))]
    pub session_id: String,
}

/// Request structure for seeding package stock
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetStockRequest {
    /// Units available for the package
    #[validate(range(max = 100_000, message = "Stock quantity is out of range"))]
    pub quantity: u32,
}

/// Result of an availability check
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityCheck {
    /// Whether the requested range is free of conflicts
    pub available: bool,
    /// Ids of orders whose reservation overlaps the requested range
    pub conflicts: Vec<Uuid>,
}

/// Custom error type for booking operations
#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    /// Bad date range or malformed request field
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested range overlaps existing active reservations
    #[error("Reservation conflict with {} existing order(s)", .0.len())]
    Conflict(Vec<Uuid>),

    /// The requested status change is not in the legal transition table
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Status the order is currently in
        from: OrderStatus,
        /// Status that was requested
        to: OrderStatus,
    },

    /// Order not found
    #[error("Order not found")]
    OrderNotFound,

    /// Package stock exhausted at confirmation time
    #[error("Package is out of stock")]
    OutOfStock,
}

impl actix_web::ResponseError for BookingError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            BookingError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            BookingError::Conflict(conflicts) => HttpResponse::Conflict().json(serde_json::json!({
                "error": "reservation_conflict",
                "message": "The requested dates overlap an existing reservation",
                "conflicts": conflicts
            })),
            BookingError::InvalidStateTransition { from, to } => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "invalid_state_transition",
                    "message": format!("Cannot transition order from {} to {}", from, to)
                }))
            }
            BookingError::OrderNotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "order_not_found",
                "message": "Order not found"
            })),
            BookingError::OutOfStock => HttpResponse::Conflict().json(serde_json::json!({
                "error": "out_of_stock",
                "message": "The selected package is out of stock"
            })),
        }
    }
}

/// Custom validation function for resource types
fn validate_resource_type(resource_type: &str) -> Result<(), validator::ValidationError> {
    match resource_type {
        "vehicle" | "package" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_resource_type")),
    }
}

/// Custom validation function for order statuses
fn validate_order_status(status: &str) -> Result<(), validator::ValidationError> {
    match OrderStatus::parse(status) {
        Some(_) => Ok(()),
        None => Err(validator::ValidationError::new("invalid_order_status")),
    }
}

/// Builds a `ResourceRef` from the validated string form
fn resource_ref_from_parts(resource_type: &str, id: Uuid) -> ResourceRef {
    match resource_type {
        "package" => ResourceRef::Package(id),
        _ => ResourceRef::Vehicle(id),
    }
}
