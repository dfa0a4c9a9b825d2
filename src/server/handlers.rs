//! Route handlers. Request and response bodies use camelCase field names.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::error::PredictError;
use crate::models::{PredictionReport, Timeframe, TokenListing};
use crate::service::{HealthReport, PredictRequest};

/// Default and upper bound for search/trending result counts.
pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictBody {
    #[serde(default)]
    pub token_address: String,
    pub timeframe: Option<String>,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub detailed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub status: &'static str,
    pub cached: bool,
    pub prediction: PredictionReport,
}

pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictBody>, JsonRejection>,
) -> ApiResult<PredictResponse> {
    let Json(body) = body.map_err(bad_body)?;

    let timeframe = match body.timeframe.as_deref() {
        Some(raw) => raw
            .parse::<Timeframe>()
            .map_err(PredictError::InvalidRequest)?,
        None => Timeframe::default(),
    };

    let outcome = state
        .service
        .predict(PredictRequest {
            token_address: body.token_address,
            timeframe,
            refresh: body.refresh,
            detailed: body.detailed,
        })
        .await?;

    Ok(Json(PredictResponse {
        status: "success",
        cached: outcome.cached,
        prediction: outcome.report,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionsResponse {
    pub status: &'static str,
    pub token_address: String,
    pub count: usize,
    pub predictions: Vec<PredictionReport>,
}

pub async fn predictions(
    State(state): State<AppState>,
    Path(token_address): Path<String>,
) -> ApiResult<PredictionsResponse> {
    let predictions = state.service.history(&token_address)?;

    Ok(Json(PredictionsResponse {
        status: "success",
        token_address: token_address.trim().to_string(),
        count: predictions.len(),
        predictions,
    }))
}

#[derive(Debug, Serialize)]
pub struct TimeframeInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TimeframesResponse {
    pub status: &'static str,
    pub timeframes: Vec<TimeframeInfo>,
}

pub async fn timeframes() -> Json<TimeframesResponse> {
    Json(TimeframesResponse {
        status: "success",
        timeframes: Timeframe::ALL
            .into_iter()
            .map(|tf| TimeframeInfo {
                id: tf.id(),
                name: tf.name(),
                description: tf.description(),
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub status: &'static str,
    pub query: String,
    pub count: usize,
    pub tokens: Vec<TokenListing>,
}

pub async fn search(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> ApiResult<SearchResponse> {
    let Json(body) = body.map_err(bad_body)?;
    let query = body.query.trim().to_string();

    let tokens = state.service.search(&query, clamp_limit(body.limit)).await?;

    Ok(Json(SearchResponse {
        status: "success",
        query,
        count: tokens.len(),
        tokens,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub status: &'static str,
    pub count: usize,
    pub tokens: Vec<TokenListing>,
}

pub async fn trending(
    State(state): State<AppState>,
    params: Result<Query<TrendingQuery>, QueryRejection>,
) -> ApiResult<TrendingResponse> {
    let Query(params) = params.map_err(bad_query)?;
    let tokens = state.service.trending(clamp_limit(params.limit)).await?;

    Ok(Json(TrendingResponse {
        status: "success",
        count: tokens.len(),
        tokens,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError(PredictError::InvalidRequest(rejection.body_text()))
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    ApiError(PredictError::InvalidRequest(rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{service_with, FakeMarket, TOKEN, UP_REPLY};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::Value;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn state(market: Arc<FakeMarket>) -> AppState {
        AppState {
            service: Arc::new(service_with(market, Some(UP_REPLY))),
        }
    }

    /// Serve the router on an ephemeral port and return its base URL.
    async fn spawn_app(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, super::super::router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn error_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(25)), 25);
        assert_eq!(clamp_limit(Some(500)), 50);
    }

    #[tokio::test]
    async fn test_predict_empty_address_is_400_before_io() {
        let market = Arc::new(FakeMarket::default());
        let body = PredictBody {
            token_address: String::new(),
            timeframe: None,
            refresh: false,
            detailed: false,
        };

        let err = predict(State(state(Arc::clone(&market))), Ok(Json(body)))
            .await
            .unwrap_err();
        let (status, json) = error_json(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "invalid_request");
        assert_eq!(market.snapshot_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_predict_unknown_timeframe_is_400() {
        let body = PredictBody {
            token_address: TOKEN.to_string(),
            timeframe: Some("3d".to_string()),
            refresh: false,
            detailed: false,
        };

        let err = predict(State(state(Arc::new(FakeMarket::default()))), Ok(Json(body)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_empty_query_is_400() {
        let body = SearchBody {
            query: "   ".to_string(),
            limit: None,
        };

        let err = search(State(state(Arc::new(FakeMarket::default()))), Ok(Json(body)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_timeframes() {
        let Json(response) = timeframes().await;
        let ids: Vec<&str> = response.timeframes.iter().map(|tf| tf.id).collect();
        assert_eq!(ids, vec!["1h", "4h", "24h", "7d"]);
        assert_eq!(response.timeframes[2].name, "24 Hours");
    }

    #[tokio::test]
    async fn test_predict_route() {
        let base = spawn_app(state(Arc::new(FakeMarket::default()))).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/predict", base))
            .json(&serde_json::json!({"tokenAddress": TOKEN, "timeframe": "4h"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["cached"], false);
        assert_eq!(json["prediction"]["timeframe"], "4h");
        assert_eq!(json["prediction"]["consensus"]["direction"], "UP");
        assert_eq!(json["prediction"]["recommendation"]["action"], "BUY");
        assert_eq!(json["prediction"]["token"]["currentPrice"], 0.0042);

        let again: Value = client
            .post(format!("{}/predict", base))
            .json(&serde_json::json!({"tokenAddress": TOKEN, "timeframe": "4h"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again["cached"], true);

        let history: Value = client
            .get(format!("{}/predictions/{}", base, TOKEN))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history["tokenAddress"], TOKEN);
        assert_eq!(history["count"], 1);
    }

    #[tokio::test]
    async fn test_trending_route_clamps_limit() {
        let base = spawn_app(state(Arc::new(FakeMarket::default()))).await;

        let json: Value = reqwest::get(format!("{}/trending?limit=0", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_trending_bad_limit_is_json_400() {
        let base = spawn_app(state(Arc::new(FakeMarket::default()))).await;

        let response = reqwest::get(format!("{}/trending?limit=abc", base))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let base = spawn_app(state(Arc::new(FakeMarket::default()))).await;

        let response = reqwest::Client::new()
            .post(format!("{}/search", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let base = spawn_app(state(Arc::new(FakeMarket::default()))).await;

        let response = reqwest::get(format!("{}/nope", base)).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_health_route() {
        let base = spawn_app(state(Arc::new(FakeMarket::default()))).await;

        let json: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime"].is_number());
        assert!(json["dependencies"]["breakers"].is_array());
    }
}
