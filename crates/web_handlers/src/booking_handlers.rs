use actix_web::{HttpResponse, Result, web};
use validator::Validate;

use booking::{BookingError, CheckAvailabilityRequest, CreateOrderRequest, SetStockRequest};

use crate::booking_service::BookingService;

/// Checks whether a resource is free for a candidate date range
pub async fn check_availability(
    service: web::Data<BookingService>,
    request: web::Json<CheckAvailabilityRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    let check = service.check_availability(&request).await?;
    Ok(HttpResponse::Ok().json(check))
}

/// Creates a PENDING order for the requested range
///
/// The availability check and the insert run inside the store's atomic
/// boundary, so two concurrent requests for overlapping ranges cannot
/// both succeed.
pub async fn create_booking(
    service: web::Data<BookingService>,
    request: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    let order = service.create_order(&request).await?;
    Ok(HttpResponse::Created().json(order))
}

/// Seeds the available stock for a limited-inventory package
pub async fn set_package_stock(
    service: web::Data<BookingService>,
    path: web::Path<uuid::Uuid>,
    request: web::Json<SetStockRequest>,
) -> Result<HttpResponse, BookingError> {
    request
        .validate()
        .map_err(|e| BookingError::Validation(format!("Validation error: {}", e)))?;

    service.set_stock(path.into_inner(), request.quantity).await;
    Ok(HttpResponse::NoContent().finish())
}
