//! Prediction pipeline.
//!
//! Ties the market connector, prompt builder, model fan-out, aggregator and
//! recommendation mapper together, and keeps the recent-prediction log.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{build_prompt, ModelFanout, PromptOptions};
use crate::analysis::{aggregate, recommend, Thresholds};
use crate::error::{PredictError, Result};
use crate::market::{summarize_history, validate_address, MarketDataSource};
use crate::models::{AnalysisMode, PredictionReport, Timeframe, TokenListing};
use crate::resilience::{BreakerSnapshot, BreakerState, CacheStats, ResilienceContext};

/// Cost weight recorded for cached prediction reports.
const PREDICTION_CACHE_COST: u64 = 5;

/// Pipeline settings resolved from the configuration file and CLI.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub model_ids: Vec<String>,
    pub thresholds: Thresholds,
    pub prediction_ttl: Duration,
    pub history_limit: usize,
    pub history_tokens: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_ids: vec!["gpt-4o-mini".to_string()],
            thresholds: Thresholds::default(),
            prediction_ttl: Duration::from_secs(300),
            history_limit: 50,
            history_tokens: 1000,
        }
    }
}

impl From<&crate::config::Config> for ServiceConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            model_ids: config.models.ids.clone(),
            thresholds: Thresholds::from(&config.thresholds),
            prediction_ttl: Duration::from_secs(config.server.prediction_ttl_seconds),
            history_limit: config.server.history_limit,
            history_tokens: config.server.history_tokens,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredictRequest {
    pub token_address: String,
    pub timeframe: Timeframe,
    /// Skip the prediction cache.
    pub refresh: bool,
    pub detailed: bool,
}

#[derive(Debug, Clone)]
pub struct PredictOutcome {
    /// Served from the prediction cache.
    pub cached: bool,
    pub report: PredictionReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    pub breakers: Vec<BreakerSnapshot>,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub dependencies: Dependencies,
    /// Seconds since the service was created.
    pub uptime: u64,
}

/// Bounded per-token log of recent predictions, newest first.
struct PredictionLog {
    limit: usize,
    max_tokens: usize,
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    reports: HashMap<String, VecDeque<PredictionReport>>,
    /// Tracked tokens, least recently predicted first.
    order: VecDeque<String>,
}

impl PredictionLog {
    fn new(limit: usize, max_tokens: usize) -> Self {
        Self {
            limit: limit.max(1),
            max_tokens: max_tokens.max(1),
            state: Mutex::new(LogState::default()),
        }
    }

    fn record(&self, report: &PredictionReport) {
        let mut state = self.state.lock();
        let address = &report.token.address;

        let existing = state.order.iter().position(|a| a == address);
        if let Some(pos) = existing {
            state.order.remove(pos);
        } else if state.reports.len() >= self.max_tokens {
            if let Some(evicted) = state.order.pop_front() {
                debug!("Dropping prediction log for {}", evicted);
                state.reports.remove(&evicted);
            }
        }
        state.order.push_back(address.clone());

        let log = state.reports.entry(address.clone()).or_default();
        log.push_front(report.clone());
        log.truncate(self.limit);
    }

    fn recent(&self, address: &str) -> Vec<PredictionReport> {
        self.state
            .lock()
            .reports
            .get(address)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn tracked_tokens(&self) -> usize {
        self.state.lock().reports.len()
    }
}

pub struct PredictionService {
    market: Arc<dyn MarketDataSource>,
    fanout: ModelFanout,
    resilience: Arc<ResilienceContext>,
    config: ServiceConfig,
    log: PredictionLog,
    started_at: Instant,
}

impl PredictionService {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        fanout: ModelFanout,
        resilience: Arc<ResilienceContext>,
        config: ServiceConfig,
    ) -> Self {
        info!(
            "Prediction service ready with {} model(s): {}",
            config.model_ids.len(),
            config.model_ids.join(", ")
        );

        Self {
            market,
            fanout,
            resilience,
            log: PredictionLog::new(config.history_limit, config.history_tokens),
            config,
            started_at: Instant::now(),
        }
    }

    /// Run the full pipeline for one token, or serve a cached report.
    pub async fn predict(&self, request: PredictRequest) -> Result<PredictOutcome> {
        let address = validate_address(&request.token_address)?;
        let mode = if request.detailed {
            AnalysisMode::Detailed
        } else {
            AnalysisMode::Standard
        };
        let cache_key = format!("prediction:{}:{}:{}", address, request.timeframe, mode);

        if !request.refresh {
            if let Some(report) = self.cached_report(&cache_key) {
                info!("Serving cached prediction for {}", address);
                return Ok(PredictOutcome {
                    cached: true,
                    report,
                });
            }
        }

        info!(
            "Predicting {} over {} ({} mode)",
            address, request.timeframe, mode
        );

        let window = request.timeframe.history_window();
        let (snapshot, samples) = tokio::try_join!(
            self.market.fetch_token_market_data(address),
            self.market.fetch_historical_prices(address, window),
        )?;

        let history = summarize_history(&samples);
        debug!(
            "History for {}: {} sample(s), trend {}, volatility {}",
            address,
            samples.len(),
            history.trend,
            history.volatility
        );

        let options = PromptOptions {
            timeframe: request.timeframe,
            mode,
        };
        let prompt = build_prompt(&snapshot, &history, options);

        let predictions = self
            .fanout
            .query_models(&prompt, &self.config.model_ids)
            .await?;

        let consensus = aggregate(&predictions);
        let recommendation = recommend(&consensus, &self.config.thresholds);
        let created_at = Utc::now();

        let report = PredictionReport {
            id: Uuid::new_v4().to_string(),
            token: snapshot,
            history,
            timeframe: request.timeframe,
            analysis_mode: mode,
            consensus,
            recommendation,
            predictions,
            models_queried: self.config.model_ids.len(),
            created_at,
        };

        if report.is_degraded() {
            warn!(
                "Prediction for {} used {}/{} model(s)",
                address, report.consensus.model_count, report.models_queried
            );
        }
        info!(
            "Consensus for {}: {} at {}% confidence, {}% agreement -> {}",
            address,
            report.consensus.direction,
            report.consensus.confidence,
            report.consensus.agreement,
            report.recommendation.action
        );

        self.store(&cache_key, &report);

        Ok(PredictOutcome {
            cached: false,
            report,
        })
    }

    /// Recent predictions for a token, newest first.
    pub fn history(&self, address: &str) -> Result<Vec<PredictionReport>> {
        let address = validate_address(address)?;
        Ok(self.log.recent(address))
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<TokenListing>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PredictError::InvalidRequest(
                "search query is required".to_string(),
            ));
        }
        self.market.search_tokens(query, limit).await
    }

    pub async fn trending(&self, limit: usize) -> Result<Vec<TokenListing>> {
        self.market.trending_tokens(limit).await
    }

    pub fn health(&self) -> HealthReport {
        let breakers = self.resilience.breaker_snapshots();
        let status = if breakers.iter().all(|b| b.state == BreakerState::Closed) {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            timestamp: Utc::now(),
            dependencies: Dependencies {
                breakers,
                cache: self.resilience.cache().stats(),
            },
            uptime: self.started_at.elapsed().as_secs(),
        }
    }

    /// Drop expired cache entries, including ones kept as stale fallbacks.
    pub fn purge_expired(&self) -> usize {
        self.resilience.cache().purge_expired()
    }

    fn cached_report(&self, key: &str) -> Option<PredictionReport> {
        let hit = self.resilience.cache().get(key, false)?;
        match serde_json::from_value(hit.value) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Discarding undecodable cached prediction {}: {}", key, e);
                self.resilience.cache().remove(key);
                None
            }
        }
    }

    fn store(&self, key: &str, report: &PredictionReport) {
        match serde_json::to_value(report) {
            Ok(json) => self.resilience.cache().set(
                key,
                json,
                self.config.prediction_ttl,
                PREDICTION_CACHE_COST,
            ),
            Err(e) => warn!("Not caching prediction {}: {}", key, e),
        }
        self.log.record(report);
    }
}
