//! HTTP query surface over the flag service.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::config::Listener as ListenerConfig;
use crate::service::FlagService;
use crate::types::{ApplicationId, ClassificationResult, Flag, ServiceError};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(listener: ListenerConfig, service: FlagService) -> Result<(), ApiError> {
    let app = router(service);

    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(service: FlagService) -> Router {
    Router::new()
        .route("/", get(stats))
        .route("/api/application/{app_id}", get(application_flags))
        .route("/api/check", post(check_flags))
        .with_state(service)
}

#[derive(Serialize)]
struct FlagsResponse {
    success: bool,
    flags: Vec<Flag>,
}

#[derive(Deserialize)]
struct CheckRequest {
    flags: Vec<String>,
    applications: Vec<String>,
}

#[derive(Serialize)]
struct CheckResponse {
    success: bool,
    #[serde(flatten)]
    result: ClassificationResult,
}

#[derive(Serialize)]
struct StatsResponse {
    success: bool,
    uptime: u64,
    last_fetch: Option<u64>,
    cache_size: usize,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_applications: Option<Vec<&'static str>>,
}

async fn application_flags(
    State(service): State<FlagService>,
    Path(app_id): Path<String>,
) -> Result<Json<FlagsResponse>, ServiceError> {
    let flags = service.list_flags(&app_id)?;
    Ok(Json(FlagsResponse {
        success: true,
        flags,
    }))
}

async fn check_flags(
    State(service): State<FlagService>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ServiceError> {
    let result = service.classify(&request.flags, &request.applications)?;
    Ok(Json(CheckResponse {
        success: true,
        result,
    }))
}

async fn stats(State(service): State<FlagService>) -> Json<StatsResponse> {
    let stats = service.stats();
    Json(StatsResponse {
        success: true,
        uptime: stats.uptime_secs,
        last_fetch: stats.last_fetch,
        cache_size: stats.cache_size,
    })
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let valid_applications = match &self {
            ServiceError::InvalidApplication(_) => Some(
                ApplicationId::FETCHABLE
                    .iter()
                    .map(ApplicationId::as_str)
                    .collect(),
            ),
            ServiceError::InvalidInput(_) => None,
        };

        let body = Json(ApiErrorResponse {
            error: self.to_string(),
            valid_applications,
        });

        (StatusCode::BAD_REQUEST, body).into_response()
    }
}
