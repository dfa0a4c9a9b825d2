//! Inbound HTTP API.

pub mod handlers;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::PredictError;
use crate::service::PredictionService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

/// Error body: `{status: "error", error: <kind>, message}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    error: &'static str,
    message: String,
}

/// Wrapper that renders a [`PredictError`] as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub PredictError);

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = ErrorBody {
            status: "error",
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/predictions/:token_address", get(handlers::predictions))
        .route("/timeframes", get(handlers::timeframes))
        .route("/search", post(handlers::search))
        .route("/trending", get(handlers::trending))
        .route("/health", get(handlers::health))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> Response {
    let body = ErrorBody {
        status: "error",
        error: "not_found",
        message: "no such route".to_string(),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Bind and serve until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<PredictionService>,
    cache_sweep: Option<Duration>,
) -> anyhow::Result<()> {
    if let Some(period) = cache_sweep {
        spawn_cache_sweep(Arc::clone(&service), period);
    }

    let app = router(AppState { service });

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_cache_sweep(service: Arc<PredictionService>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = service.purge_expired();
            if purged > 0 {
                debug!("Purged {} expired cache entries", purged);
            }
        }
    });
}
