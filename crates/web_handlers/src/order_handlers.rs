use actix_web::{HttpResponse, Result, web};
use validator::Validate;

use booking::{Actor, AttachPaymentSessionRequest, BookingError, TransitionRequest};

use crate::booking_service::BookingService;

/// Gets a specific order by ID
pub async fn get_order(
    service: web::Data<BookingService>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, BookingError> {
    let order = service.get_order(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Applies a status transition to an order
///
/// The only sanctioned mutator of order status; consumed by the admin UI
/// and the payment webhook.
pub async fn transition_order(
    service: web::Data<BookingService>,
    path: web::Path<uuid::Uuid>,
    request: web::Json<TransitionRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    let target = BookingService::parse_status(&request.status)?;
    let actor = request.actor.unwrap_or(Actor::System);
    let order = service
        .transition_order(path.into_inner(), target, actor)
        .await?;

    Ok(HttpResponse::Ok().json(order))
}

/// Attaches the payment-provider session reference after checkout hand-off
pub async fn attach_payment_session(
    service: web::Data<BookingService>,
    path: web::Path<uuid::Uuid>,
    request: web::Json<AttachPaymentSessionRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    let order = service
        .attach_payment_session(path.into_inner(), request.session_id.clone())
        .await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Queues a payment-reminder notification for a PENDING order
pub async fn send_payment_reminder(
    service: web::Data<BookingService>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, BookingError> {
    let order = service.send_payment_reminder(path.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "order_id": order.id,
        "status": order.status,
    })))
}
