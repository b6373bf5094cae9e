//! Main entry point for the rental booking backend server.
//! Wires the order store, notification queue, and dispatcher together and
//! exposes the booking, order transition, and queue status endpoints.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};

use booking::InMemoryOrderStore;
use notification_queue::{
    DeliveryClient, DispatcherConfig, MockDeliveryClient, PriorityJobQueue, RetryPolicy,
};
use web_handlers::*;

mod queue_manager;
use queue_manager::QueueManager;

/// Server settings read from the environment, with sensible defaults
#[derive(Debug, Clone)]
struct ServerConfig {
    bind_addr: String,
    tax_rate: f64,
    max_concurrent_workers: usize,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    dispatch_tick_interval: Duration,
    delivery_timeout: Duration,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            tax_rate: env_parse("TAX_RATE", 0.10),
            max_concurrent_workers: env_parse("MAX_CONCURRENT_WORKERS", 3),
            max_retries: env_parse("MAX_RETRIES", 3),
            backoff_base: Duration::from_millis(env_parse("BACKOFF_BASE_MS", 500)),
            backoff_cap: Duration::from_millis(env_parse("BACKOFF_CAP_MS", 60_000)),
            dispatch_tick_interval: Duration::from_millis(env_parse("DISPATCH_TICK_MS", 500)),
            delivery_timeout: Duration::from_millis(env_parse("DELIVERY_TIMEOUT_MS", 10_000)),
        }
    }
}

/// Reads an env var, falling back to the default on absence or parse error
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

async fn api_hello() -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Rental booking backend",
        "status": "running"
    })))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting rental booking server...");

    let config = ServerConfig::from_env();
    log::info!(
        "⚙️ Dispatcher: {} workers, {} retries, tick {:?}",
        config.max_concurrent_workers,
        config.max_retries,
        config.dispatch_tick_interval
    );

    // Shared state: order store and job queue
    let store = Arc::new(InMemoryOrderStore::new(config.tax_rate));
    let queue = Arc::new(PriorityJobQueue::new(
        config.max_concurrent_workers,
        config.max_retries,
    ));

    // No real mail transport is wired here; the mock client records sends
    let client: Arc<dyn DeliveryClient> = Arc::new(MockDeliveryClient::new());
    log::warn!("📧 No delivery transport configured, using the mock client");

    let service = Arc::new(BookingService::new(store, queue.clone()));

    let dispatcher_config = DispatcherConfig {
        dispatch_tick_interval: config.dispatch_tick_interval,
        delivery_timeout: config.delivery_timeout,
        retry_policy: RetryPolicy {
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
        },
    };

    let mut queue_manager = QueueManager::new();
    queue_manager.start(queue, client, dispatcher_config, service.clone());

    let service_data = web::Data::from(service);

    log::info!("🌐 Server will be available at: http://{}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(service_data.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route("/hello", web::get().to(api_hello))
                    .service(
                        web::scope("/bookings")
                            .route("/check", web::post().to(check_availability))
                            .route("", web::post().to(create_booking)),
                    )
                    .service(
                        web::scope("/orders")
                            .route("/{order_id}", web::get().to(get_order))
                            .route("/{order_id}/transition", web::post().to(transition_order))
                            .route(
                                "/{order_id}/payment-session",
                                web::post().to(attach_payment_session),
                            )
                            .route(
                                "/{order_id}/payment-reminder",
                                web::post().to(send_payment_reminder),
                            ),
                    )
                    .route(
                        "/packages/{package_id}/stock",
                        web::put().to(set_package_stock),
                    )
                    .route("/queue/status", web::get().to(queue_status)),
            )
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .bind(config.bind_addr.clone())?
    .run()
    .await
}
