use actix_web::{HttpResponse, Result, web};
use serde::Deserialize;

use crate::booking_service::BookingService;

/// How many queued/processing jobs a snapshot lists by default
const DEFAULT_LISTING_LIMIT: usize = 50;

/// Query parameters for the queue status endpoint
#[derive(Debug, Deserialize)]
pub struct QueueStatusQuery {
    /// Upper bound on the number of jobs listed per section
    pub limit: Option<usize>,
}

/// Returns the live queue snapshot for the dashboard
///
/// Read-only; polled by the admin dashboard every few seconds.
pub async fn queue_status(
    service: web::Data<BookingService>,
    query: web::Query<QueueStatusQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LISTING_LIMIT);
    let status = service.queue_status(limit).await;
    Ok(HttpResponse::Ok().json(status))
}
