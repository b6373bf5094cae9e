use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info};

use crate::delivery::{DeliveryClient, NotificationError};
use crate::queue::{PriorityJobQueue, RetryOutcome, RetryPolicy};
use crate::template;

/// Configuration for the notification dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often the dispatch loop looks for claimable jobs
    /// (default: 500 ms)
    pub dispatch_tick_interval: Duration,

    /// Upper bound on a single delivery attempt; a hang counts as a
    /// failure (default: 10 seconds)
    pub delivery_timeout: Duration,

    /// Backoff schedule for failed attempts
    pub retry_policy: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dispatch_tick_interval: Duration::from_millis(500),
            delivery_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Drains the job queue through the delivery client
///
/// A single loop claims work; each claimed job's delivery runs as its own
/// task, bounded by the queue's processing-set limit. A failure inside a
/// worker is routed through the retry policy and never stops the loop.
pub struct Dispatcher {
    queue: Arc<PriorityJobQueue>,
    client: Arc<dyn DeliveryClient>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher over the shared queue and a delivery client
    pub fn new(
        queue: Arc<PriorityJobQueue>,
        client: Arc<dyn DeliveryClient>,
        config: Option<DispatcherConfig>,
    ) -> Self {
        Self {
            queue,
            client,
            config: config.unwrap_or_default(),
        }
    }

    /// Runs the dispatch loop forever
    pub async fn start(&self) {
        info!(
            workers = self.queue.concurrency_limit(),
            tick_ms = self.config.dispatch_tick_interval.as_millis() as u64,
            "Starting notification dispatcher"
        );

        let mut tick = interval(self.config.dispatch_tick_interval);
        loop {
            tick.tick().await;
            self.dispatch_eligible().await;
        }
    }

    /// Claims every currently eligible job up to the concurrency limit and
    /// hands each to its own worker task
    pub async fn dispatch_eligible(&self) {
        while let Some(job) = self.queue.claim(Utc::now()).await {
            debug!(job_id = %job.id, priority = job.priority, "Claimed notification job");

            let queue = self.queue.clone();
            let client = self.client.clone();
            let delivery_timeout = self.config.delivery_timeout;
            let retry_policy = self.config.retry_policy.clone();

            tokio::spawn(async move {
                Self::process_job(queue, client, delivery_timeout, retry_policy, job).await;
            });
        }
    }

    /// Delivers one claimed job and applies the retry policy on failure
    ///
    /// Rendering and the send run in their own task so a panic surfaces as
    /// a `JoinError` and is classified as a transport failure instead of
    /// leaking the processing slot.
    async fn process_job(
        queue: Arc<PriorityJobQueue>,
        client: Arc<dyn DeliveryClient>,
        delivery_timeout: Duration,
        retry_policy: RetryPolicy,
        job: crate::job::NotificationJob,
    ) {
        let attempt_job = job.clone();
        let mut attempt = tokio::spawn(async move {
            let envelope = template::render(&attempt_job);
            client.send(&envelope).await
        });

        let outcome = timeout(delivery_timeout, &mut attempt).await;
        let attempt = match outcome {
            Ok(Ok(Ok(message_id))) => Ok(message_id),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => {
                Err(NotificationError::Transport(format!("delivery task panicked: {e}")).to_string())
            }
            Err(_) => {
                attempt.abort();
                Err(NotificationError::Timeout(delivery_timeout).to_string())
            }
        };

        match attempt {
            Ok(message_id) => {
                info!(
                    job_id = %job.id,
                    recipient = %job.recipient,
                    template = %job.template_status,
                    %message_id,
                    "Notification delivered"
                );
                queue.complete(job.id).await;
            }
            Err(reason) => {
                let backoff = retry_policy.backoff(job.retry_count + 1);
                match queue.record_failure(job.id, &reason, backoff).await {
                    Some(RetryOutcome::Requeued { retry_count, .. }) => {
                        debug!(job_id = %job.id, retry_count, "Job requeued for retry");
                    }
                    Some(RetryOutcome::Failed) => {
                        error!(job_id = %job.id, "Job failed terminally: {}", reason);
                    }
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{MessageEnvelope, MockDeliveryClient};
    use crate::job::{JobState, Language, NotificationJob, OrderContext, TemplateStatus};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            dispatch_tick_interval: Duration::from_millis(5),
            delivery_timeout: Duration::from_millis(100),
            retry_policy: RetryPolicy {
                backoff_base: Duration::from_millis(1),
                backoff_cap: Duration::from_millis(2),
            },
        }
    }

    fn job(order_id: Uuid) -> NotificationJob {
        NotificationJob::new(
            "ana@example.com".to_string(),
            TemplateStatus::Confirmed,
            Language::En,
            OrderContext {
                order_id,
                order_number: "RNT-20240601-0001".to_string(),
                customer_name: "Ana Souza".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
                total_days: 4,
                total_amount: 263.56,
            },
        )
    }

    /// Runs the dispatch loop by hand until the queue has drained or the
    /// iteration budget runs out
    async fn drain(dispatcher: &Dispatcher, queue: &PriorityJobQueue) {
        for _ in 0..500 {
            dispatcher.dispatch_eligible().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            let stats = queue.snapshot(0).await.stats;
            if stats.pending_jobs == 0 && stats.processing_jobs == 0 {
                return;
            }
        }
        panic!("queue did not drain");
    }

    #[tokio::test]
    async fn delivers_a_job_and_marks_it_completed() {
        let queue = Arc::new(PriorityJobQueue::new(3, 3));
        let client = Arc::new(MockDeliveryClient::new());
        let dispatcher = Dispatcher::new(queue.clone(), client.clone(), Some(test_config()));

        queue.enqueue(job(Uuid::new_v4())).await;
        drain(&dispatcher, &queue).await;

        let stats = queue.snapshot(0).await.stats;
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 0);
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn job_completes_on_third_attempt_after_two_failures() {
        // Scenario: fail twice, succeed on the 3rd attempt
        let queue = Arc::new(PriorityJobQueue::new(3, 3));
        let client = Arc::new(MockDeliveryClient::failing_first(2));
        let dispatcher = Dispatcher::new(queue.clone(), client.clone(), Some(test_config()));

        queue.enqueue(job(Uuid::new_v4())).await;
        drain(&dispatcher, &queue).await;

        let stats = queue.snapshot(0).await.stats;
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 0);
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn job_fails_terminally_when_every_attempt_fails() {
        let queue = Arc::new(PriorityJobQueue::new(3, 3));
        let client = Arc::new(MockDeliveryClient::failing_first(u32::MAX));
        let dispatcher = Dispatcher::new(queue.clone(), client.clone(), Some(test_config()));

        queue.enqueue(job(Uuid::new_v4())).await;
        drain(&dispatcher, &queue).await;

        let stats = queue.snapshot(0).await.stats;
        assert_eq!(stats.completed_jobs, 0);
        assert_eq!(stats.failed_jobs, 1);
        assert!(client.sent().is_empty());

        let failed = queue.failed_jobs().await;
        assert_eq!(failed[0].state, JobState::Failed);
        assert_eq!(failed[0].retry_count, 3);
    }

    #[tokio::test]
    async fn concurrent_deliveries_never_exceed_the_worker_limit() {
        let queue = Arc::new(PriorityJobQueue::new(2, 3));
        let client =
            Arc::new(MockDeliveryClient::new().with_delay(Duration::from_millis(30)));
        let dispatcher = Dispatcher::new(queue.clone(), client.clone(), Some(test_config()));

        for _ in 0..6 {
            queue.enqueue(job(Uuid::new_v4())).await;
        }
        drain(&dispatcher, &queue).await;

        assert_eq!(queue.snapshot(0).await.stats.completed_jobs, 6);
        assert!(client.max_in_flight() <= 2);
    }

    struct PanickingClient;

    #[async_trait::async_trait]
    impl DeliveryClient for PanickingClient {
        async fn send(&self, _envelope: &MessageEnvelope) -> Result<String, NotificationError> {
            panic!("transport wiring bug");
        }
    }

    #[tokio::test]
    async fn a_panicking_delivery_does_not_leak_a_worker_slot() {
        let queue = Arc::new(PriorityJobQueue::new(3, 3));
        let dispatcher = Dispatcher::new(queue.clone(), Arc::new(PanickingClient), Some(test_config()));

        queue.enqueue(job(Uuid::new_v4())).await;
        drain(&dispatcher, &queue).await;

        // The panic is classified as a transport failure: the slot is
        // released, the job retries, and it ends terminally failed
        let stats = queue.snapshot(0).await.stats;
        assert_eq!(stats.processing_jobs, 0);
        assert_eq!(stats.failed_jobs, 1);

        let failed = queue.failed_jobs().await;
        assert_eq!(failed[0].retry_count, 3);
        assert!(
            failed[0]
                .last_error
                .as_deref()
                .unwrap()
                .contains("panicked")
        );
    }

    #[tokio::test]
    async fn a_hung_delivery_counts_as_a_failure() {
        let queue = Arc::new(PriorityJobQueue::new(3, 3));
        let client =
            Arc::new(MockDeliveryClient::new().with_delay(Duration::from_millis(500)));
        let mut config = test_config();
        config.delivery_timeout = Duration::from_millis(10);
        let dispatcher = Dispatcher::new(queue.clone(), client.clone(), Some(config));

        queue.enqueue(job(Uuid::new_v4())).await;

        // Each attempt times out, so the job must end terminally failed
        for _ in 0..200 {
            dispatcher.dispatch_eligible().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
            if queue.snapshot(0).await.stats.failed_jobs == 1 {
                break;
            }
        }

        let failed = queue.failed_jobs().await;
        assert_eq!(failed.len(), 1);
        assert!(
            failed[0]
                .last_error
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }
}
