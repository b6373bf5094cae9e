use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer language preference for outbound messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    En,
    /// Spanish
    Es,
    /// Portuguese
    Pt,
}

/// Which message template a job renders; mirrors an order status or a
/// synthetic event such as a payment reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateStatus {
    /// Order confirmed after payment capture
    Confirmed,
    /// Rental started at pickup
    Ongoing,
    /// Rental finished at drop-off
    Completed,
    /// Order cancelled
    Cancelled,
    /// Order refunded
    Refunded,
    /// Reminder that a pending order still awaits payment
    PaymentReminder,
}

impl TemplateStatus {
    /// Stable string form used in dedupe keys and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Confirmed => "CONFIRMED",
            TemplateStatus::Ongoing => "ONGOING",
            TemplateStatus::Completed => "COMPLETED",
            TemplateStatus::Cancelled => "CANCELLED",
            TemplateStatus::Refunded => "REFUNDED",
            TemplateStatus::PaymentReminder => "PAYMENT_REMINDER",
        }
    }

    /// Default urgency for jobs created for this template; higher is more
    /// urgent
    pub fn default_priority(&self) -> u8 {
        match self {
            TemplateStatus::PaymentReminder => 9,
            TemplateStatus::Confirmed => 8,
            TemplateStatus::Cancelled => 7,
            TemplateStatus::Refunded => 7,
            TemplateStatus::Ongoing => 5,
            TemplateStatus::Completed => 4,
        }
    }
}

impl std::fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of a notification job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Waiting in the queue (possibly backoff-gated)
    Queued,
    /// Claimed by a worker
    Processing,
    /// Delivered successfully (terminal)
    Completed,
    /// Exhausted all retries (terminal)
    Failed,
}

/// Denormalized order/customer context needed to render a message,
/// captured at job-creation time so rendering never reads the order again
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderContext {
    /// Order the notification is about
    pub order_id: Uuid,
    /// Human-readable order number
    pub order_number: String,
    /// Customer display name
    pub customer_name: String,
    /// First rental day (inclusive)
    pub start_date: NaiveDate,
    /// Day the resource is returned (exclusive)
    pub end_date: NaiveDate,
    /// Number of billable days
    pub total_days: i64,
    /// Grand total charged for the order
    pub total_amount: f64,
}

/// A unit of pending notification work
#[derive(Debug, Clone, Serialize)]
pub struct NotificationJob {
    /// Unique identifier for the job
    pub id: Uuid,
    /// Email address the message is sent to
    pub recipient: String,
    /// Template the job renders
    pub template_status: TemplateStatus,
    /// Language the message is rendered in
    pub language: Language,
    /// Order context captured at creation time
    pub payload: OrderContext,
    /// Urgency; higher is claimed first
    pub priority: u8,
    /// Number of failed delivery attempts so far
    pub retry_count: u32,
    /// Failure count at which the job becomes terminally failed
    pub max_retries: u32,
    /// Current processing state
    pub state: JobState,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Earliest instant the job may be claimed (backoff gate)
    pub next_eligible_at: DateTime<Utc>,
    /// Detail of the most recent delivery failure
    pub last_error: Option<String>,
}

impl NotificationJob {
    /// Creates a queued job with the template's default priority
    pub fn new(
        recipient: String,
        template_status: TemplateStatus,
        language: Language,
        payload: OrderContext,
    ) -> NotificationJob {
        let now = Utc::now();
        NotificationJob {
            id: Uuid::new_v4(),
            recipient,
            template_status,
            language,
            payload,
            priority: template_status.default_priority(),
            retry_count: 0,
            max_retries: 3,
            state: JobState::Queued,
            created_at: now,
            next_eligible_at: now,
            last_error: None,
        }
    }

    /// Deterministic key identifying the logical event this job delivers;
    /// duplicate jobs sharing a key within the same hour are suppressed
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.payload.order_id,
            self.template_status,
            self.created_at.format("%Y%m%d%H")
        )
    }
}
