//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.consensus.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::resilience::{BreakerConfig, ResilienceConfig, RetryPolicy};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".consensus.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server and prediction cache settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Market-data provider settings.
    #[serde(default)]
    pub market: MarketConfig,

    /// Language-model settings.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Retry and circuit-breaker settings.
    #[serde(default)]
    pub resilience: ResilienceSettings,

    /// Recommendation confidence thresholds.
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a finished prediction is served from cache.
    #[serde(default = "default_prediction_ttl")]
    pub prediction_ttl_seconds: u64,

    /// Predictions kept per token for `/predictions/{tokenAddress}`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Distinct tokens tracked in the prediction log; the least recently
    /// predicted token is dropped beyond this.
    #[serde(default = "default_history_tokens")]
    pub history_tokens: usize,

    /// Interval for dropping expired cache entries; 0 disables the sweep.
    #[serde(default = "default_cache_sweep")]
    pub cache_sweep_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            prediction_ttl_seconds: default_prediction_ttl(),
            history_limit: default_history_limit(),
            history_tokens: default_history_tokens(),
            cache_sweep_seconds: default_cache_sweep(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_prediction_ttl() -> u64 {
    300
}

fn default_history_limit() -> usize {
    50
}

fn default_history_tokens() -> usize {
    1000
}

fn default_cache_sweep() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_market_url")]
    pub base_url: String,

    /// Usually supplied through `BIRDEYE_API_KEY` rather than the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chain")]
    pub chain: String,

    #[serde(default = "default_market_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_seconds: u64,

    #[serde(default = "default_history_ttl")]
    pub history_ttl_seconds: u64,

    /// TTL for search and trending listings.
    #[serde(default = "default_listing_ttl")]
    pub listing_ttl_seconds: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_url(),
            api_key: None,
            chain: default_chain(),
            timeout_seconds: default_market_timeout(),
            snapshot_ttl_seconds: default_snapshot_ttl(),
            history_ttl_seconds: default_history_ttl(),
            listing_ttl_seconds: default_listing_ttl(),
        }
    }
}

fn default_market_url() -> String {
    "https://public-api.birdeye.so".to_string()
}

fn default_chain() -> String {
    "solana".to_string()
}

fn default_market_timeout() -> u64 {
    10
}

fn default_snapshot_ttl() -> u64 {
    30
}

fn default_history_ttl() -> u64 {
    120
}

fn default_listing_ttl() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    /// Usually supplied through `OPENAI_API_KEY` rather than the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Models queried for every prediction.
    #[serde(default = "default_model_ids")]
    pub ids: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            api_key: None,
            ids: default_model_ids(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_ids() -> Vec<String> {
    vec!["gpt-4o-mini", "gpt-4o", "gpt-3.5-turbo"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> Option<u32> {
    Some(600)
}

fn default_llm_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_seconds: u64,

    #[serde(default = "default_half_open_calls")]
    pub half_open_max_calls: u32,

    /// Upper bound on any single outbound attempt.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            failure_threshold: default_failure_threshold(),
            reset_timeout_seconds: default_reset_timeout(),
            half_open_max_calls: default_half_open_calls(),
            call_timeout_seconds: default_call_timeout(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    30
}

fn default_half_open_calls() -> u32 {
    2
}

fn default_call_timeout() -> u64 {
    30
}

impl From<&ResilienceSettings> for ResilienceConfig {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: settings.max_retries.max(1),
                initial_delay: Duration::from_millis(settings.initial_delay_ms),
            },
            breaker: BreakerConfig {
                failure_threshold: settings.failure_threshold.max(1),
                reset_timeout: Duration::from_secs(settings.reset_timeout_seconds),
                half_open_max_calls: settings.half_open_max_calls.max(1),
            },
            call_timeout: Duration::from_secs(settings.call_timeout_seconds.max(1)),
        }
    }
}

/// Confidence cut-offs as fractions of 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_high")]
    pub high: f64,

    #[serde(default = "default_medium")]
    pub medium: f64,

    #[serde(default = "default_low")]
    pub low: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

fn default_high() -> f64 {
    0.75
}

fn default_medium() -> f64 {
    0.5
}

fn default_low() -> f64 {
    0.25
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if self.models.ids.iter().all(|id| id.trim().is_empty()) {
            return Err("[models] ids must name at least one model".to_string());
        }

        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.low)
            || !(0.0..=1.0).contains(&t.medium)
            || !(0.0..=1.0).contains(&t.high)
        {
            return Err("[thresholds] values must be between 0.0 and 1.0".to_string());
        }
        if !(t.low <= t.medium && t.medium <= t.high) {
            return Err("[thresholds] must satisfy low <= medium <= high".to_string());
        }

        if !(0.0..=2.0).contains(&self.models.temperature) {
            return Err("[models] temperature must be between 0.0 and 2.0".to_string());
        }

        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref key) = args.market_api_key {
            self.market.api_key = Some(key.clone());
        }
        if let Some(ref url) = args.market_url {
            self.market.base_url = url.clone();
        }

        if let Some(ref key) = args.llm_api_key {
            self.models.api_key = Some(key.clone());
        }
        if let Some(ref url) = args.llm_url {
            self.models.base_url = url.clone();
        }
        if let Some(ref models) = args.models {
            self.models.ids = models
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(temperature) = args.temperature {
            self.models.temperature = temperature;
        }

        if let Some(timeout) = args.timeout {
            self.models.timeout_seconds = timeout;
            self.resilience.call_timeout_seconds = timeout;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
