//! Error taxonomy for the prediction pipeline.
//!
//! Component-local failures (a single model, a single cache miss) are
//! absorbed where they happen. Request-level failures propagate to the
//! HTTP boundary and are classified by [`PredictError::status_code`].

use axum::http::StatusCode;
use thiserror::Error;

/// Typed errors raised by the connector, fan-out, resilience layer and service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    // -- Request ------------------------------------------------------------
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // -- Market data ----------------------------------------------------------
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    // -- Models ---------------------------------------------------------------
    #[error("model {model} failed: {reason}")]
    ModelQueryFailed { model: String, reason: String },

    #[error("no predictions available: all {attempted} model(s) failed")]
    NoPredictionsAvailable { attempted: usize },

    // -- Resilience -----------------------------------------------------------
    #[error("circuit open for {endpoint}")]
    CircuitOpen { endpoint: String },

    // -- Transport ------------------------------------------------------------
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PredictError>;

impl PredictError {
    /// Whether the retry policy may attempt the call again.
    ///
    /// Only server-side (5xx) and network-level failures qualify; 4xx and
    /// everything above the transport layer are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            PredictError::Upstream { status, .. } => *status >= 500,
            PredictError::Network(_) | PredictError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Whether this failure should count against a circuit breaker.
    ///
    /// Client errors say nothing about the health of the remote endpoint.
    pub fn trips_breaker(&self) -> bool {
        match self {
            PredictError::Upstream { status, .. } => *status >= 500,
            PredictError::Network(_) | PredictError::Timeout(_) | PredictError::Malformed(_) => {
                true
            }
            _ => false,
        }
    }

    /// HTTP status used when the error reaches the inbound boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PredictError::DataUnavailable(_) => StatusCode::BAD_GATEWAY,
            PredictError::NoPredictionsAvailable { .. } | PredictError::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind for error response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::InvalidRequest(_) => "invalid_request",
            PredictError::DataUnavailable(_) => "data_unavailable",
            PredictError::ModelQueryFailed { .. } => "model_query_failed",
            PredictError::NoPredictionsAvailable { .. } => "no_predictions_available",
            PredictError::CircuitOpen { .. } => "circuit_open",
            PredictError::Upstream { .. } => "upstream_error",
            PredictError::Network(_) => "network_error",
            PredictError::Timeout(_) => "timeout",
            PredictError::Malformed(_) => "malformed_payload",
        }
    }

    /// Map a reqwest transport error, keeping timeouts distinguishable.
    pub fn from_reqwest(err: reqwest::Error, timeout_seconds: u64) -> Self {
        if err.is_timeout() {
            PredictError::Timeout(timeout_seconds)
        } else if err.is_decode() {
            PredictError::Malformed(err.to_string())
        } else {
            PredictError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PredictError {
    fn from(err: serde_json::Error) -> Self {
        PredictError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PredictError::Upstream { status: 503, body: String::new() }.is_retryable());
        assert!(PredictError::Network("reset".into()).is_retryable());
        assert!(PredictError::Timeout(10).is_retryable());

        assert!(!PredictError::Upstream { status: 404, body: String::new() }.is_retryable());
        assert!(!PredictError::Upstream { status: 429, body: String::new() }.is_retryable());
        assert!(!PredictError::InvalidRequest("x".into()).is_retryable());
        assert!(!PredictError::CircuitOpen { endpoint: "x".into() }.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PredictError::InvalidRequest("missing".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PredictError::DataUnavailable("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            PredictError::NoPredictionsAvailable { attempted: 3 }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PredictError::CircuitOpen { endpoint: "llm:a".into() }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PredictError::Malformed("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_errors_do_not_trip_breaker() {
        assert!(!PredictError::Upstream { status: 400, body: String::new() }.trips_breaker());
        assert!(PredictError::Upstream { status: 502, body: String::new() }.trips_breaker());
        assert!(PredictError::Malformed("x".into()).trips_breaker());
    }
}
