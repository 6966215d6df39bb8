// Route exports
pub mod jobs;
pub mod notifications;

use actix_web::{error, http::StatusCode, web, HttpResponse};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::core::{ListingRanker, MatchFinder};
use crate::models::{ErrorResponse, HealthResponse, InputError};
use crate::notifications::{DispatchError, MatchNotifier, NotificationDispatcher, VoiceActionHandler};
use crate::services::{NotificationStore, PostgresClient, PostingStore, StoreError, WorkerStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub postings: Arc<dyn PostingStore>,
    pub workers: Arc<dyn WorkerStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub notifier: Arc<MatchNotifier>,
    pub voice_actions: Arc<VoiceActionHandler>,
    pub ranker: ListingRanker,
    pub finder: MatchFinder,
    pub settings: Arc<Settings>,
    /// Present when backed by PostgreSQL; used by the health check
    pub postgres: Option<Arc<PostgresClient>>,
    /// Cancelled on shutdown; long scans run on child tokens
    pub shutdown: CancellationToken,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(jobs::configure)
            .configure(notifications::configure),
    );
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Errors returned by handlers, rendered as [`ErrorResponse`]
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Input(_) => "invalid_input",
            ApiError::Validation(_) => "validation_failed",
            ApiError::NotFound(_) | ApiError::Dispatch(DispatchError::NotFound(_)) => "not_found",
            ApiError::Dispatch(DispatchError::InvalidTransition(_)) => "invalid_transition",
            ApiError::Store(_) | ApiError::Dispatch(DispatchError::Store(_)) => "store_error",
        }
    }
}

impl error::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Input(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::Dispatch(DispatchError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Dispatch(DispatchError::InvalidTransition(_)) => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Dispatch(DispatchError::Store(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

/// JSON error response for extractor errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}
