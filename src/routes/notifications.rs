use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Contact, ListNotificationsQuery, MarkReadRequest, NotificationsResponse, NotifyRequest, Page, Pagination,
    ProviderStatusRequest,
};
use crate::routes::{ApiError, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/notifications", web::post().to(create_notification))
        .route("/notifications", web::get().to(list_notifications))
        .route("/notifications/{id}/read", web::patch().to(mark_read))
        .route("/notifications/{id}/retry", web::post().to(retry_delivery))
        .route("/webhooks/voice", web::post().to(voice_status));
}

/// Create and dispatch one notification
///
/// POST /api/v1/notifications
///
/// ```json
/// {
///   "recipientId": "string",
///   "type": "APPLICATION_ACCEPTED",
///   "title": "string",
///   "body": "string",
///   "payload": {},
///   "deliveryMethod": "IN_APP",
///   "eventKey": "application:123:decision",
///   "contact": { "phone": "+15551234" }
/// }
/// ```
async fn create_notification(
    state: web::Data<AppState>,
    req: web::Json<NotifyRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    let notification = state.dispatcher.notify(req.into_inner()).await?;

    Ok(HttpResponse::Created().json(notification))
}

/// GET /api/v1/notifications?recipientId=..&page=1&limit=20&unreadOnly=false
async fn list_notifications(
    state: web::Data<AppState>,
    query: web::Query<ListNotificationsQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let size = query
        .limit
        .unwrap_or(state.settings.listing.page_size as i64)
        .min(state.settings.listing.max_page_size as i64);
    let page = Page::new(query.page.unwrap_or(1), size)?;

    let (notifications, total) = state
        .notifications
        .list_for_recipient(&query.recipient_id, query.unread_only.unwrap_or(false), page)
        .await?;
    let unread_count = state.notifications.unread_count(&query.recipient_id).await?;

    Ok(HttpResponse::Ok().json(NotificationsResponse {
        notifications,
        unread_count,
        pagination: Pagination::new(page.number, page.size, total),
    }))
}

/// PATCH /api/v1/notifications/{id}/read
async fn mark_read(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<MarkReadRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let id = path.into_inner();

    if !state.notifications.mark_read(id, &req.recipient_id).await? {
        return Err(ApiError::NotFound(format!("Notification {}", id)));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// Re-send a failed notification
///
/// POST /api/v1/notifications/{id}/retry with the recipient's contact
/// details as the body.
async fn retry_delivery(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    contact: web::Json<Contact>,
) -> Result<HttpResponse, ApiError> {
    let notification = state
        .dispatcher
        .retry_delivery(path.into_inner(), Some(contact.into_inner()))
        .await?;

    Ok(HttpResponse::Ok().json(notification))
}

/// Call status callback from the voice provider
///
/// POST /api/v1/webhooks/voice
///
/// ```json
/// {
///   "call_id": "string",
///   "status": "completed",
///   "metadata": { "notificationId": "uuid", "userId": "string" },
///   "user_response": { "action": "apply_to_job", "jobId": "string" }
/// }
/// ```
///
/// The status is recorded first; a user response is then acted on for
/// the notification's recipient.
async fn voice_status(
    state: web::Data<AppState>,
    req: web::Json<ProviderStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;

    tracing::info!(call_id = %req.call_id, "Voice call status {}", req.status);

    let notification = state
        .dispatcher
        .record_provider_status(req.metadata.notification_id, &req.status)
        .await?;

    if let Some(response) = &req.user_response {
        let outcome = state
            .voice_actions
            .handle(&notification.recipient_id, response)
            .await?;
        tracing::debug!(call_id = %req.call_id, "Voice response handled: {:?}", outcome);
    }

    Ok(HttpResponse::Ok().json(notification))
}
