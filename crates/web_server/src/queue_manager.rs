use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use notification_queue::{DeliveryClient, Dispatcher, DispatcherConfig, PriorityJobQueue};
use web_handlers::BookingService;

/// How often the outbox sweep retries entries a crashed relay left behind
const OUTBOX_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Manager for the notification dispatch system
/// Integrates with the web server to run delivery in the background
pub struct QueueManager {
    dispatcher_handle: Option<JoinHandle<()>>,
    sweep_handle: Option<JoinHandle<()>>,
}

impl QueueManager {
    /// Create a new queue manager
    pub fn new() -> Self {
        Self {
            dispatcher_handle: None,
            sweep_handle: None,
        }
    }

    /// Start the dispatch loop and the outbox sweep
    pub fn start(
        &mut self,
        queue: Arc<PriorityJobQueue>,
        client: Arc<dyn DeliveryClient>,
        config: DispatcherConfig,
        service: Arc<BookingService>,
    ) {
        info!("Starting notification dispatch system");

        let dispatcher = Dispatcher::new(queue, client, Some(config));
        self.dispatcher_handle = Some(tokio::spawn(async move {
            dispatcher.start().await;
            error!("Notification dispatcher stopped unexpectedly");
        }));

        self.sweep_handle = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(OUTBOX_SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                service.relay_outbox().await;
            }
        }));

        info!("Notification dispatch system started successfully");
    }

    /// Stop the dispatch loop and the outbox sweep
    pub async fn stop(&mut self) {
        info!("Stopping notification dispatch system");

        for handle in [
            self.dispatcher_handle.take(),
            self.sweep_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
            let _ = handle.await;
        }

        info!("Notification dispatch system stopped");
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        for handle in [
            self.dispatcher_handle.take(),
            self.sweep_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}
