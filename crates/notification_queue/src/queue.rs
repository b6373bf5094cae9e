use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::job::{JobState, NotificationJob};

/// Backoff schedule applied to failed delivery attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Backoff for the first retry
    pub backoff_base: Duration,
    /// Upper bound on any single backoff
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given attempt: exponential in the retry count,
    /// capped, with up to 10% downward jitter to spread retry bursts
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let shift = retry_count.saturating_sub(1).min(16);
        let exp = self.backoff_base.saturating_mul(1u32 << shift);
        let capped = exp.min(self.backoff_cap);
        capped.mul_f64(0.9 + 0.1 * rand::random::<f64>())
    }
}

/// Outcome of handing a job to `enqueue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The job was added to the queue
    Enqueued,
    /// A sibling with the same dedupe key is already queued, in flight,
    /// or completed; the job was dropped
    Duplicate,
}

/// Outcome of recording a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job returned to the queue, demoted and backoff-gated
    Requeued {
        /// Failed attempts so far, after this failure
        retry_count: u32,
        /// Earliest instant the job may be claimed again
        next_eligible_at: DateTime<Utc>,
    },
    /// The job exhausted its retries and is terminally failed
    Failed,
}

/// Aggregate queue counters for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// All jobs the queue has seen and still accounts for
    pub total_jobs: usize,
    /// Jobs waiting in the queue (including backoff-gated ones)
    pub pending_jobs: usize,
    /// Jobs currently claimed by workers
    pub processing_jobs: usize,
    /// Jobs delivered successfully
    pub completed_jobs: usize,
    /// Jobs that exhausted their retries
    pub failed_jobs: usize,
}

/// Bounded listing entry for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    /// Job id
    pub id: Uuid,
    /// Current urgency
    pub priority: u8,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Failed attempts so far
    pub retry_count: u32,
}

impl From<&NotificationJob> for JobSummary {
    fn from(job: &NotificationJob) -> Self {
        JobSummary {
            id: job.id,
            priority: job.priority,
            created_at: job.created_at,
            retry_count: job.retry_count,
        }
    }
}

/// Read-only snapshot of the queue for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Queued jobs in claim order, bounded
    pub queue: Vec<JobSummary>,
    /// Jobs currently claimed by workers, bounded
    pub processing: Vec<JobSummary>,
    /// Aggregate counters
    pub stats: QueueStats,
}

/// Most recent terminally failed jobs retained for manual inspection
const MAX_FAILED_RETAINED: usize = 100;

/// All mutable queue state, owned by a single lock so no caller can ever
/// observe a job half-claimed
struct QueueState {
    /// Queued jobs with their insertion sequence (FIFO tie-break)
    queued: Vec<(u64, NotificationJob)>,
    /// Claimed jobs keyed by id, keeping the sequence for requeue
    processing: HashMap<Uuid, (u64, NotificationJob)>,
    /// Dedupe keys of completed jobs with the creation time the key's
    /// hour bucket came from; stale keys are evicted on enqueue
    completed_keys: HashMap<String, DateTime<Utc>>,
    completed_count: usize,
    /// Newest terminally failed jobs, bounded by `MAX_FAILED_RETAINED`
    failed: Vec<NotificationJob>,
    failed_count: usize,
    next_seq: u64,
}

/// Stable priority queue of notification jobs with a bounded processing set
///
/// Ordering contract: among queued jobs, highest `priority` first, ties
/// broken by insertion order. The processing set never exceeds the
/// concurrency limit, and claim is an atomic remove-from-queue /
/// add-to-processing step under the single internal lock.
pub struct PriorityJobQueue {
    state: Mutex<QueueState>,
    concurrency_limit: usize,
    max_retries: u32,
}

impl PriorityJobQueue {
    /// Creates an empty queue with the given worker concurrency limit and
    /// retry budget; `max_retries` is stamped onto every accepted job
    pub fn new(concurrency_limit: usize, max_retries: u32) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queued: Vec::new(),
                processing: HashMap::new(),
                completed_keys: HashMap::new(),
                completed_count: 0,
                failed: Vec::new(),
                failed_count: 0,
                next_seq: 0,
            }),
            concurrency_limit,
            max_retries,
        }
    }

    /// The configured worker concurrency limit
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Adds a job to the queue unless a sibling with the same dedupe key
    /// is already queued, in flight, or completed
    pub async fn enqueue(&self, mut job: NotificationJob) -> EnqueueOutcome {
        job.max_retries = self.max_retries;
        let key = job.dedupe_key();
        let mut state = self.state.lock().await;

        // A key's hour bucket cannot recur after two hours, so older
        // entries can never match again
        let cutoff = Utc::now() - chrono::Duration::hours(2);
        state
            .completed_keys
            .retain(|_, completed_at| *completed_at >= cutoff);

        let duplicate = state.completed_keys.contains_key(&key)
            || state.queued.iter().any(|(_, j)| j.dedupe_key() == key)
            || state.processing.values().any(|(_, j)| j.dedupe_key() == key);
        if duplicate {
            debug!(job_id = %job.id, dedupe_key = %key, "Dropping duplicate notification job");
            return EnqueueOutcome::Duplicate;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(job_id = %job.id, priority = job.priority, "Enqueued notification job");
        state.queued.push((seq, job));
        EnqueueOutcome::Enqueued
    }

    /// Claims the highest-priority eligible job, moving it into the
    /// processing set; returns None when the set is at its limit or no
    /// queued job is eligible at `now`
    pub async fn claim(&self, now: DateTime<Utc>) -> Option<NotificationJob> {
        let mut state = self.state.lock().await;

        loop {
            if state.processing.len() >= self.concurrency_limit {
                return None;
            }

            let best = state
                .queued
                .iter()
                .enumerate()
                .filter(|(_, (_, job))| job.next_eligible_at <= now)
                .max_by(|(_, (seq_a, a)), (_, (seq_b, b))| {
                    a.priority.cmp(&b.priority).then(seq_b.cmp(seq_a))
                })
                .map(|(idx, _)| idx)?;

            let (seq, mut job) = state.queued.remove(best);

            // A sibling may have completed while this job sat in backoff
            if state.completed_keys.contains_key(&job.dedupe_key()) {
                debug!(job_id = %job.id, "Skipping job whose event was already delivered");
                continue;
            }

            job.state = JobState::Processing;
            state.processing.insert(job.id, (seq, job.clone()));
            return Some(job);
        }
    }

    /// Marks a claimed job as delivered and releases its slot
    pub async fn complete(&self, job_id: Uuid) {
        let mut state = self.state.lock().await;
        match state.processing.remove(&job_id) {
            Some((_, job)) => {
                let key = job.dedupe_key();
                state.completed_keys.insert(key, job.created_at);
                state.completed_count += 1;
                info!(job_id = %job_id, "Notification job completed");
            }
            None => warn!(job_id = %job_id, "Completed job was not in the processing set"),
        }
    }

    /// Records a failed delivery attempt for a claimed job: requeues it
    /// demoted and backoff-gated, or terminally fails it once retries are
    /// exhausted
    pub async fn record_failure(
        &self,
        job_id: Uuid,
        error: &str,
        backoff: Duration,
    ) -> Option<RetryOutcome> {
        let mut state = self.state.lock().await;
        let (seq, mut job) = match state.processing.remove(&job_id) {
            Some(entry) => entry,
            None => {
                warn!(job_id = %job_id, "Failed job was not in the processing set");
                return None;
            }
        };

        job.retry_count += 1;
        job.last_error = Some(error.to_string());

        if job.retry_count < job.max_retries {
            job.state = JobState::Queued;
            job.priority = job.priority.saturating_sub(1);
            job.next_eligible_at = Utc::now()
                + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
            let outcome = RetryOutcome::Requeued {
                retry_count: job.retry_count,
                next_eligible_at: job.next_eligible_at,
            };
            warn!(
                job_id = %job_id,
                retry_count = job.retry_count,
                priority = job.priority,
                "Delivery failed, job requeued: {}", error
            );
            state.queued.push((seq, job));
            Some(outcome)
        } else {
            job.state = JobState::Failed;
            warn!(
                job_id = %job_id,
                retry_count = job.retry_count,
                "Delivery failed terminally: {}", error
            );
            state.failed_count += 1;
            state.failed.push(job);
            if state.failed.len() > MAX_FAILED_RETAINED {
                state.failed.remove(0);
            }
            Some(RetryOutcome::Failed)
        }
    }

    /// Read-only snapshot for the dashboard; listings bounded by `limit`
    pub async fn snapshot(&self, limit: usize) -> QueueStatus {
        let state = self.state.lock().await;

        let mut queued: Vec<&(u64, NotificationJob)> = state.queued.iter().collect();
        queued.sort_by(|(seq_a, a), (seq_b, b)| b.priority.cmp(&a.priority).then(seq_a.cmp(seq_b)));

        let stats = QueueStats {
            total_jobs: state.queued.len()
                + state.processing.len()
                + state.completed_count
                + state.failed_count,
            pending_jobs: state.queued.len(),
            processing_jobs: state.processing.len(),
            completed_jobs: state.completed_count,
            failed_jobs: state.failed_count,
        };

        QueueStatus {
            queue: queued
                .into_iter()
                .take(limit)
                .map(|(_, job)| JobSummary::from(job))
                .collect(),
            processing: state
                .processing
                .values()
                .take(limit)
                .map(|(_, job)| JobSummary::from(job))
                .collect(),
            stats,
        }
    }

    /// Most recent terminally failed jobs, for manual inspection
    pub async fn failed_jobs(&self) -> Vec<NotificationJob> {
        self.state.lock().await.failed.clone()
    }

    /// Number of jobs currently claimed by workers
    pub async fn processing_count(&self) -> usize {
        self.state.lock().await.processing.len()
    }
}
