//! Concurrent model-query fan-out and reply parsing.

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::provider::ModelProvider;
use crate::error::{PredictError, Result};
use crate::models::{Direction, ModelPrediction};
use crate::resilience::ResilienceContext;

/// Key factors kept per model reply.
pub const MAX_KEY_FACTORS: usize = 5;

/// Sends one prompt to many models and keeps whatever comes back usable.
pub struct ModelFanout {
    provider: Arc<dyn ModelProvider>,
    resilience: Arc<ResilienceContext>,
}

impl ModelFanout {
    pub fn new(provider: Arc<dyn ModelProvider>, resilience: Arc<ResilienceContext>) -> Self {
        Self {
            provider,
            resilience,
        }
    }

    /// Query every model concurrently.
    ///
    /// Individual failures are logged and dropped; the call only fails when
    /// no model produced a usable prediction.
    pub async fn query_models(
        &self,
        prompt: &str,
        model_ids: &[String],
    ) -> Result<Vec<ModelPrediction>> {
        info!(
            "Querying {} model(s) via {}",
            model_ids.len(),
            self.provider.name()
        );

        let calls = model_ids.iter().map(|model_id| self.query_one(model_id, prompt));
        let settled = join_all(calls).await;

        let predictions: Vec<ModelPrediction> = settled
            .into_iter()
            .filter_map(|result| match result {
                Ok(prediction) => Some(prediction),
                Err(e) => {
                    warn!("Excluding model from consensus: {}", e);
                    None
                }
            })
            .collect();

        if predictions.is_empty() {
            return Err(PredictError::NoPredictionsAvailable {
                attempted: model_ids.len(),
            });
        }

        info!(
            "{}/{} model(s) returned usable predictions",
            predictions.len(),
            model_ids.len()
        );
        Ok(predictions)
    }

    async fn query_one(&self, model_id: &str, prompt: &str) -> Result<ModelPrediction> {
        let endpoint = format!("llm:{}", model_id);
        let provider = &self.provider;

        let raw = self
            .resilience
            .call(&endpoint, || async move { provider.query_model(model_id, prompt).await })
            .await
            .map_err(|e| PredictError::ModelQueryFailed {
                model: model_id.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Raw reply from {}: {}", model_id, raw);
        parse_prediction(model_id, &raw)
    }
}

/// Parse one model's JSON reply.
///
/// Requires `direction` and `confidence`. Direction is upper-cased and
/// anything unrecognised becomes SIDEWAYS; confidence is clamped to 0-100.
pub fn parse_prediction(model_id: &str, raw: &str) -> Result<ModelPrediction> {
    let failed = |reason: String| PredictError::ModelQueryFailed {
        model: model_id.to_string(),
        reason,
    };

    let json: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| failed(format!("reply is not valid JSON: {}", e)))?;

    let direction = json
        .get("direction")
        .and_then(Value::as_str)
        .map(Direction::normalize)
        .ok_or_else(|| failed("reply has no direction".to_string()))?;

    let confidence = json
        .get("confidence")
        .and_then(parse_confidence)
        .ok_or_else(|| failed("reply has no numeric confidence".to_string()))?;

    let reasoning = json
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let key_factors = string_list(&json, "keyFactors", "key_factors");
    let risk_factors = string_list(&json, "riskFactors", "risk_factors");

    let technical_indicators = json
        .get("technicalIndicators")
        .or_else(|| json.get("technical_indicators"))
        .and_then(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(_) | Value::Array(_) => Some(value.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty());

    Ok(ModelPrediction {
        model: model_id.to_string(),
        direction,
        confidence,
        reasoning,
        key_factors,
        risk_factors,
        technical_indicators,
        timestamp: Utc::now(),
    })
}

/// Non-empty strings under `camel` or `snake`, at most [`MAX_KEY_FACTORS`].
fn string_list(json: &Value, camel: &str, snake: &str) -> Vec<String> {
    json.get(camel)
        .or_else(|| json.get(snake))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(MAX_KEY_FACTORS)
                .collect()
        })
        .unwrap_or_default()
}

/// Accept numbers and numeric strings ("85", "85%"); round and clamp to 0-100.
fn parse_confidence(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}

/// Remove a surrounding ```json ... ``` fence if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}
