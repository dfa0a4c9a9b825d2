//! Birdeye market-data connector.
//!
//! Every request goes through the shared [`ResilienceContext`] under the
//! `market-data` endpoint key. Provider payloads are normalised into the
//! crate's models here; anything missing or malformed surfaces as
//! `DataUnavailable`.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{validate_address, MarketDataSource, MARKET_ENDPOINT};
use crate::error::{PredictError, Result};
use crate::models::{HistoryWindow, PricePoint, TokenListing, TokenSnapshot};
use crate::resilience::ResilienceContext;

/// Connector settings.
#[derive(Debug, Clone)]
pub struct BirdeyeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Value of the `x-chain` header.
    pub chain: String,
    pub timeout_seconds: u64,
    pub snapshot_ttl: Duration,
    pub history_ttl: Duration,
    pub listing_ttl: Duration,
}

impl Default for BirdeyeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://public-api.birdeye.so".to_string(),
            api_key: None,
            chain: "solana".to_string(),
            timeout_seconds: 10,
            snapshot_ttl: Duration::from_secs(30),
            history_ttl: Duration::from_secs(120),
            listing_ttl: Duration::from_secs(60),
        }
    }
}

impl From<&crate::config::MarketConfig> for BirdeyeConfig {
    fn from(config: &crate::config::MarketConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chain: config.chain.clone(),
            timeout_seconds: config.timeout_seconds,
            snapshot_ttl: Duration::from_secs(config.snapshot_ttl_seconds),
            history_ttl: Duration::from_secs(config.history_ttl_seconds),
            listing_ttl: Duration::from_secs(config.listing_ttl_seconds),
        }
    }
}

/// Standard `{ success, data }` response wrapper.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverviewData {
    address: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
    price: Option<f64>,
    #[serde(rename = "v24hUSD")]
    volume_24h_usd: Option<f64>,
    #[serde(rename = "priceChange24hPercent")]
    price_change_24h_pct: Option<f64>,
    liquidity: Option<f64>,
    holder: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    #[serde(rename = "unixTime")]
    unix_time: i64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<SearchGroup>,
}

#[derive(Debug, Deserialize)]
struct SearchGroup {
    #[serde(rename = "type")]
    group_type: String,
    #[serde(default)]
    result: Vec<SearchToken>,
}

#[derive(Debug, Deserialize)]
struct SearchToken {
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    price: Option<f64>,
    volume_24h_usd: Option<f64>,
    liquidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TrendingData {
    #[serde(default)]
    tokens: Vec<TrendingToken>,
}

#[derive(Debug, Deserialize)]
struct TrendingToken {
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    rank: Option<u32>,
    price: Option<f64>,
    #[serde(rename = "volume24hUSD")]
    volume_24h_usd: Option<f64>,
    liquidity: Option<f64>,
}

/// HTTP client for the Birdeye public API.
pub struct BirdeyeClient {
    config: BirdeyeConfig,
    http_client: reqwest::Client,
    resilience: Arc<ResilienceContext>,
}

impl BirdeyeClient {
    pub fn new(config: BirdeyeConfig, resilience: Arc<ResilienceContext>) -> Self {
        info!("Initializing market-data connector for {}", config.base_url);

        if config.api_key.is_none() {
            warn!("No market-data API key configured; requests may be rejected");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
            resilience,
        }
    }

    /// GET `path` and return the raw body as JSON. Non-2xx becomes `Upstream`.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!("GET {} {:?}", url, query);

        let mut request = self
            .http_client
            .get(&url)
            .query(query)
            .header("accept", "application/json")
            .header("x-chain", &self.config.chain);

        if let Some(ref key) = self.config.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PredictError::from_reqwest(e, self.config.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PredictError::Upstream { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| PredictError::from_reqwest(e, self.config.timeout_seconds))
    }

    /// Cached, resilient fetch-and-parse. Transport failures become `DataUnavailable`.
    async fn fetch<T, P>(&self, request: ProviderRequest, parse: P) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        P: Fn(&serde_json::Value) -> Result<T>,
    {
        let ProviderRequest {
            what,
            cache_key,
            ttl,
            cost,
            path,
            query,
        } = request;
        let query = &query;
        let parse = &parse;

        let fetched = self
            .resilience
            .fetch_with_cache(MARKET_ENDPOINT, &cache_key, ttl, cost, || async move {
                let body = self.get_json(path, query).await?;
                parse(&body)
            })
            .await
            .map_err(|e| match e {
                PredictError::CircuitOpen { .. } | PredictError::DataUnavailable(_) => e,
                other => PredictError::DataUnavailable(format!("{}: {}", what, other)),
            })?;

        if fetched.fetch_failed() {
            warn!("Serving stale {} for {}", what, cache_key);
        }

        Ok(fetched.into_inner())
    }
}

/// One provider call: what to fetch, where, and how long to cache it.
struct ProviderRequest {
    what: &'static str,
    cache_key: String,
    ttl: Duration,
    cost: u64,
    path: &'static str,
    query: Vec<(&'static str, String)>,
}

#[async_trait]
impl MarketDataSource for BirdeyeClient {
    async fn fetch_token_market_data(&self, address: &str) -> Result<TokenSnapshot> {
        let address = validate_address(address)?;
        let query = vec![("address", address.to_string())];

        let request = ProviderRequest {
            what: "token overview",
            cache_key: format!("snapshot:{}", address),
            ttl: self.config.snapshot_ttl,
            cost: 1,
            path: "/defi/token_overview",
            query,
        };

        self.fetch(request, |body| parse_token_overview(address, body))
            .await
    }

    async fn fetch_historical_prices(
        &self,
        address: &str,
        window: HistoryWindow,
    ) -> Result<Vec<PricePoint>> {
        let address = validate_address(address)?;
        let time_to = Utc::now().timestamp();
        let time_from = time_to - window.lookback.as_secs() as i64;

        let query = vec![
            ("address", address.to_string()),
            ("address_type", "token".to_string()),
            ("type", window.interval.to_string()),
            ("time_from", time_from.to_string()),
            ("time_to", time_to.to_string()),
        ];

        let request = ProviderRequest {
            what: "price history",
            cache_key: format!("history:{}:{}", address, window.interval),
            ttl: self.config.history_ttl,
            cost: 4,
            path: "/defi/history_price",
            query,
        };

        self.fetch(request, parse_price_history).await
    }

    async fn search_tokens(&self, query: &str, limit: usize) -> Result<Vec<TokenListing>> {
        let keyword = query.trim();
        if keyword.is_empty() {
            return Err(PredictError::InvalidRequest(
                "search query is required".to_string(),
            ));
        }

        let params = vec![
            ("keyword", keyword.to_string()),
            ("target", "token".to_string()),
            ("sort_by", "volume_24h_usd".to_string()),
            ("sort_type", "desc".to_string()),
            ("limit", limit.to_string()),
        ];

        let request = ProviderRequest {
            what: "token search",
            cache_key: format!("search:{}:{}", keyword.to_lowercase(), limit),
            ttl: self.config.listing_ttl,
            cost: 2,
            path: "/defi/v3/search",
            query: params,
        };

        let mut tokens = self.fetch(request, parse_search_results).await?;
        tokens.truncate(limit);
        Ok(tokens)
    }

    async fn trending_tokens(&self, limit: usize) -> Result<Vec<TokenListing>> {
        let params = vec![
            ("sort_by", "rank".to_string()),
            ("sort_type", "asc".to_string()),
            ("offset", "0".to_string()),
            ("limit", limit.to_string()),
        ];

        let request = ProviderRequest {
            what: "trending tokens",
            cache_key: format!("trending:{}", limit),
            ttl: self.config.listing_ttl,
            cost: 2,
            path: "/defi/token_trending",
            query: params,
        };

        let mut tokens = self.fetch(request, parse_trending).await?;
        tokens.truncate(limit);
        Ok(tokens)
    }
}

/// Unwrap a `{success, data}` envelope into `T`.
fn unwrap_envelope<T: DeserializeOwned>(body: &serde_json::Value) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_value(body.clone())?;

    if !envelope.success {
        return Err(PredictError::DataUnavailable(
            envelope
                .message
                .unwrap_or_else(|| "provider reported failure".to_string()),
        ));
    }

    envelope
        .data
        .ok_or_else(|| PredictError::Malformed("response has no data".to_string()))
}

fn parse_token_overview(address: &str, body: &serde_json::Value) -> Result<TokenSnapshot> {
    let data: OverviewData = unwrap_envelope(body)?;

    let price = data
        .price
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| PredictError::Malformed("token overview has no valid price".to_string()))?;

    let symbol = data
        .symbol
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| PredictError::Malformed("token overview has no symbol".to_string()))?;

    Ok(TokenSnapshot {
        address: data.address.unwrap_or_else(|| address.to_string()),
        name: data.name.unwrap_or_else(|| symbol.clone()),
        symbol: symbol.to_uppercase(),
        current_price: price,
        volume_24h: data.volume_24h_usd.unwrap_or(0.0),
        price_change_24h_pct: data.price_change_24h_pct.unwrap_or(0.0),
        liquidity: data.liquidity.unwrap_or(0.0),
        holders: data.holder.unwrap_or(0),
    })
}

fn parse_price_history(body: &serde_json::Value) -> Result<Vec<PricePoint>> {
    let data: HistoryData = unwrap_envelope(body)?;

    if let Some(bad) = data.items.iter().find(|i| !i.value.is_finite() || i.value < 0.0) {
        return Err(PredictError::Malformed(format!(
            "invalid price {} at {}",
            bad.value, bad.unix_time
        )));
    }

    let mut points: Vec<PricePoint> = data
        .items
        .into_iter()
        .map(|i| PricePoint {
            time: i.unix_time,
            price: i.value,
        })
        .collect();
    points.sort_by_key(|p| p.time);

    Ok(points)
}

fn parse_search_results(body: &serde_json::Value) -> Result<Vec<TokenListing>> {
    let data: SearchData = unwrap_envelope(body)?;

    Ok(data
        .items
        .into_iter()
        .filter(|group| group.group_type == "token")
        .flat_map(|group| group.result)
        .map(|t| TokenListing {
            address: t.address,
            symbol: t.symbol.to_uppercase(),
            name: t.name,
            price: t.price,
            volume_24h: t.volume_24h_usd,
            liquidity: t.liquidity,
            rank: None,
        })
        .collect())
}

fn parse_trending(body: &serde_json::Value) -> Result<Vec<TokenListing>> {
    let data: TrendingData = unwrap_envelope(body)?;

    Ok(data
        .tokens
        .into_iter()
        .map(|t| TokenListing {
            address: t.address,
            symbol: t.symbol.to_uppercase(),
            name: t.name,
            price: t.price,
            volume_24h: t.volume_24h_usd,
            liquidity: t.liquidity,
            rank: t.rank,
        })
        .collect())
}
