use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use uuid::Uuid;

/// Custom error type for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The delivery channel rejected or dropped the message
    #[error("Transport error: {0}")]
    Transport(String),

    /// The delivery attempt exceeded its timeout
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// One outbound message, fully rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Recipient email address
    pub to: String,
    /// Message subject line
    pub subject: String,
    /// Plain-text message body
    pub body: String,
}

/// Trait for delivery transports (SES, SMTP relay, ...)
///
/// Template rendering and localization happen before this seam; a client
/// only moves one envelope and returns the transport's message id.
#[async_trait::async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Sends one message, returning the transport message id
    async fn send(&self, envelope: &MessageEnvelope) -> Result<String, NotificationError>;
}

/// In-memory delivery client used in tests and when no transport is
/// configured; records every envelope it accepts
pub struct MockDeliveryClient {
    sent: Mutex<Vec<MessageEnvelope>>,
    fail_first: AtomicU32,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDeliveryClient {
    /// Creates a client that accepts every message
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(0),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Creates a client that fails the first `n` sends, then accepts
    pub fn failing_first(n: u32) -> Self {
        let client = Self::new();
        client.fail_first.store(n, Ordering::SeqCst);
        client
    }

    /// Adds an artificial delay to every send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Envelopes accepted so far, in delivery order
    pub fn sent(&self) -> Vec<MessageEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    /// Highest number of concurrent sends observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeliveryClient for MockDeliveryClient {
    async fn send(&self, envelope: &MessageEnvelope) -> Result<String, NotificationError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(NotificationError::Transport(
                "simulated delivery failure".to_string(),
            ))
        } else {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(format!("mock-{}", Uuid::new_v4().simple()))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> MessageEnvelope {
        MessageEnvelope {
            to: "ana@example.com".to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_client_records_accepted_sends() {
        let client = MockDeliveryClient::new();
        let id = client.send(&envelope()).await.unwrap();

        assert!(id.starts_with("mock-"));
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn mock_client_fails_first_n_sends() {
        let client = MockDeliveryClient::failing_first(2);

        assert!(client.send(&envelope()).await.is_err());
        assert!(client.send(&envelope()).await.is_err());
        assert!(client.send(&envelope()).await.is_ok());
        assert_eq!(client.sent().len(), 1);
    }
}
